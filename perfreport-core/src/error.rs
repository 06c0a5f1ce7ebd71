use crate::engine::Format;
use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid format \"{0}\"")]
    InvalidFormat(String),

    #[error("Invalid template \"{name}\" for {format}")]
    UnknownTemplate { name: String, format: Format },

    #[error("data must be an object")]
    InvalidData,

    #[error("Failed to compile template \"{name}\": {source}")]
    Template {
        name: String,
        #[source]
        source: handlebars::TemplateError,
    },

    #[error(transparent)]
    Render(#[from] handlebars::RenderError),

    #[error("HTML parse error: {0}")]
    Html(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
