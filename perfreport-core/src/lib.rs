//! perfreport core library - render performance report data into HTML and text

// Global invariants enforced in this crate:
// - No global mutable state; engines and id registries are owned values
// - Hooks run in registration order
// - Metric ids that do not resolve are logged and rendered as absent
// - Identical data and templates yield byte-for-byte identical output

pub mod color;
pub mod config;
pub mod engine;
mod entities;
pub mod error;
pub mod helpers;
pub mod host;
pub mod metrics;
pub mod radar;
pub mod report;
pub mod templates;
pub mod text;
pub mod units;
pub mod util;

pub use config::ResolvedConfig;
pub use engine::{Format, InvokeConfig, PartialFormat, ReportEngine};
pub use error::{ReportError, ReportResult};
pub use host::{ReportHost, StaticPage, TemplateScript};
pub use text::{html_to_text, text_to_html, HtmlToTextOptions};

use serde_json::Value;

/// Element the main template is rendered into
pub const REPORT_ELEMENT: &str = "report";

pub struct RenderOptions {
    /// Partial rendered as the report body
    pub main_template: String,
    pub format: Format,
    /// Do not log hook failures
    pub quiet: bool,
    /// Title used when no title template is registered
    pub title: Option<String>,
}

impl RenderOptions {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        RenderOptions {
            main_template: config.main_template.clone(),
            format: config.format,
            quiet: config.quiet,
            title: config.title.clone(),
        }
    }
}

/// Output of [`render_report`]
#[derive(Debug)]
pub struct RenderedReport {
    /// Complete HTML document, or the rendered text
    pub document: String,
    /// Hook failure; the document then shows the error template
    pub error: Option<ReportError>,
}

/// Render report data with a set of template scripts
///
/// HTML output runs the full page lifecycle: init hooks load the templates
/// and render the main template into the [`REPORT_ELEMENT`] element, then
/// the after-render hooks set the title and insert the color style sheet.
/// Text output renders the main template directly.
pub fn render_report(
    data: &Value,
    scripts: Vec<TemplateScript>,
    options: &RenderOptions,
) -> ReportResult<RenderedReport> {
    if !data.is_object() {
        return Err(ReportError::InvalidData);
    }

    let mut engine = ReportEngine::new()?;
    report::install(&mut engine);

    let mut page = StaticPage::with_title(options.title.as_deref().unwrap_or_default());
    for script in scripts {
        page.add_template_script(script);
    }

    match options.format {
        Format::Html => {
            let main_template = options.main_template.clone();
            engine.on_init(move |engine, host, data| {
                let html = engine.render(&main_template, Format::Html, data)?;
                host.set_element_html(REPORT_ELEMENT, &html);
                Ok(())
            });

            let invoke = InvokeConfig {
                quiet: options.quiet,
            };
            let outcome = engine
                .invoke_init_functions(&mut page, data, invoke)
                .and_then(|_| engine.invoke_after_render_functions(&mut page, data, invoke));

            Ok(RenderedReport {
                document: page.to_document(),
                error: outcome.err(),
            })
        }
        Format::Text => {
            engine.load_html_templates(&mut page)?;
            let document = engine.render(&options.main_template, Format::Text, data)?;
            Ok(RenderedReport {
                document,
                error: None,
            })
        }
    }
}
