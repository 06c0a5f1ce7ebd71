//! Report rendering engine
//!
//! An engine holds one Handlebars registry per output format. HTML output
//! is escaped, text output is not. A partial registered for one format is
//! converted for the other unless that format already has its own version.
//!
//! Global invariants enforced:
//! - Every engine is constructed explicitly; there is no shared instance
//! - Hooks run in registration order and the first failure stops the run
//! - A failed hook replaces the host document with the error template

use crate::error::{ReportError, ReportResult};
use crate::helpers::{builtin_helpers, HelperSet};
use crate::host::ReportHost;
use crate::text::{html_partial_to_text, text_partial_to_html};
use crate::util::IdRegistry;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Script type of templates shared by every format
pub const TEMPLATE_MIME_TYPE: &str = "text/x.perfreport-template";

/// Name of the partial rendered when a hook fails
pub const ERROR_TEMPLATE: &str = "errorTemplate";

const ERROR_TEMPLATE_SOURCE: &str = "{{{message}}}\n\n{{#if stack}}<pre>{{{stack}}}</pre>{{/if}}";

/// Output format of a render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Html,
    Text,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Html, Format::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Html => "html",
            Format::Text => "text",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Html => "text/html",
            Format::Text => "text/plain",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Format::Html),
            "text" => Ok(Format::Text),
            other => Err(ReportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Formats a partial is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialFormat {
    All,
    Only(Format),
}

impl PartialFormat {
    /// Formats of a template script block, by its `type` attribute
    pub fn from_mime_type(mime: &str) -> Option<PartialFormat> {
        match mime {
            "text/html" => Some(PartialFormat::Only(Format::Html)),
            "text/plain" => Some(PartialFormat::Only(Format::Text)),
            TEMPLATE_MIME_TYPE => Some(PartialFormat::All),
            _ => None,
        }
    }
}

impl FromStr for PartialFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PartialFormat::All),
            other => other.parse().map(PartialFormat::Only),
        }
    }
}

impl From<Format> for PartialFormat {
    fn from(format: Format) -> Self {
        PartialFormat::Only(format)
    }
}

/// Options for invoking hooks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeConfig {
    /// Do not log hook failures
    pub quiet: bool,
}

/// Function run when a report is initialised or after it has rendered
pub type Hook = Box<dyn FnMut(&mut ReportEngine, &mut dyn ReportHost, &Value) -> ReportResult<()>>;

#[derive(Debug, Clone, Copy)]
enum HookList {
    Init,
    AfterRender,
}

pub struct ReportEngine {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
    partials: BTreeMap<Format, BTreeSet<String>>,
    init_hooks: Vec<Hook>,
    after_render_hooks: Vec<Hook>,
    ids: Arc<Mutex<IdRegistry>>,
}

impl ReportEngine {
    /// Create an engine with the builtin helpers, the error template and an
    /// init hook that loads templates from the host's script blocks
    pub fn new() -> ReportResult<Self> {
        let mut text = Handlebars::new();
        text.register_escape_fn(handlebars::no_escape);

        let ids = Arc::new(Mutex::new(IdRegistry::new()));
        let mut engine = ReportEngine {
            html: Handlebars::new(),
            text,
            partials: Format::ALL.iter().map(|f| (*f, BTreeSet::new())).collect(),
            init_hooks: Vec::new(),
            after_render_hooks: Vec::new(),
            ids: Arc::clone(&ids),
        };

        engine.register_helpers(&builtin_helpers(ids));
        engine.register_partial(ERROR_TEMPLATE, PartialFormat::Only(Format::Text), ERROR_TEMPLATE_SOURCE)?;
        engine.on_init(|engine, host, _| engine.load_html_templates(host).map(|_| ()));
        Ok(engine)
    }

    fn registry(&self, format: Format) -> &Handlebars<'static> {
        match format {
            Format::Html => &self.html,
            Format::Text => &self.text,
        }
    }

    fn registry_mut(&mut self, format: Format) -> &mut Handlebars<'static> {
        match format {
            Format::Html => &mut self.html,
            Format::Text => &mut self.text,
        }
    }

    fn compile(&mut self, name: &str, format: Format, source: &str) -> ReportResult<()> {
        self.registry_mut(format)
            .register_template_string(name, source)
            .map_err(|source| ReportError::Template {
                name: name.to_string(),
                source,
            })?;
        self.partials.entry(format).or_default().insert(name.to_string());
        debug!("registered {} partial \"{}\"", format, name);
        Ok(())
    }

    /// Register a partial for one format or for all of them
    ///
    /// A partial for a single format is also converted for every other
    /// format that does not have a partial of that name yet.
    pub fn register_partial(
        &mut self,
        name: &str,
        format: PartialFormat,
        source: &str,
    ) -> ReportResult<()> {
        match format {
            PartialFormat::All => {
                for format in Format::ALL {
                    self.compile(name, format, source)?;
                }
            }
            PartialFormat::Only(format) => {
                self.compile(name, format, source)?;
                for other in Format::ALL {
                    if other == format || self.has_partial(name, Some(other)) {
                        continue;
                    }
                    let converted = match (format, other) {
                        (Format::Html, Format::Text) => html_partial_to_text(source)?,
                        (Format::Text, Format::Html) => text_partial_to_html(source),
                        _ => continue,
                    };
                    self.compile(name, other, &converted)?;
                }
            }
        }
        Ok(())
    }

    /// Whether a partial exists for `format`, or for every format when
    /// `None`
    pub fn has_partial(&self, name: &str, format: Option<Format>) -> bool {
        let registered = |format: Format| {
            self.partials
                .get(&format)
                .is_some_and(|names| names.contains(name))
        };
        match format {
            Some(format) => registered(format),
            None => Format::ALL.into_iter().all(registered),
        }
    }

    /// Names of the partials registered for a format
    pub fn partial_names(&self, format: Format) -> Vec<String> {
        self.partials
            .get(&format)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn register_helpers(&mut self, helpers: &HelperSet) {
        for format in Format::ALL {
            helpers.install(format, self.registry_mut(format));
        }
    }

    /// Render a registered partial
    pub fn render(&self, name: &str, format: Format, data: &Value) -> ReportResult<String> {
        if !self.has_partial(name, Some(format)) {
            return Err(ReportError::UnknownTemplate {
                name: name.to_string(),
                format,
            });
        }
        if !data.is_object() {
            return Err(ReportError::InvalidData);
        }
        Ok(self.registry(format).render(name, data)?)
    }

    /// Forget every id handed out by the `makeId` helper
    pub fn reset_ids(&self) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.clear();
        }
    }

    pub fn on_init<F>(&mut self, hook: F)
    where
        F: FnMut(&mut ReportEngine, &mut dyn ReportHost, &Value) -> ReportResult<()> + 'static,
    {
        self.init_hooks.push(Box::new(hook));
    }

    pub fn after_render<F>(&mut self, hook: F)
    where
        F: FnMut(&mut ReportEngine, &mut dyn ReportHost, &Value) -> ReportResult<()> + 'static,
    {
        self.after_render_hooks.push(Box::new(hook));
    }

    pub fn invoke_init_functions(
        &mut self,
        host: &mut dyn ReportHost,
        data: &Value,
        config: InvokeConfig,
    ) -> ReportResult<()> {
        self.invoke(HookList::Init, host, data, config)
    }

    pub fn invoke_after_render_functions(
        &mut self,
        host: &mut dyn ReportHost,
        data: &Value,
        config: InvokeConfig,
    ) -> ReportResult<()> {
        self.invoke(HookList::AfterRender, host, data, config)
    }

    fn hooks_mut(&mut self, list: HookList) -> &mut Vec<Hook> {
        match list {
            HookList::Init => &mut self.init_hooks,
            HookList::AfterRender => &mut self.after_render_hooks,
        }
    }

    fn invoke(
        &mut self,
        list: HookList,
        host: &mut dyn ReportHost,
        data: &Value,
        config: InvokeConfig,
    ) -> ReportResult<()> {
        // hooks may register further hooks while running
        let mut hooks = std::mem::take(self.hooks_mut(list));
        let outcome = hooks.iter_mut().try_for_each(|hook| hook(self, host, data));
        let added = std::mem::replace(self.hooks_mut(list), hooks);
        self.hooks_mut(list).extend(added);

        if let Err(err) = outcome {
            if !config.quiet {
                error!("report hook failed: {}", err);
            }
            self.show_error(host, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Replace the host document with the rendered error template
    pub fn show_error(&self, host: &mut dyn ReportHost, err: &ReportError) {
        let context = json!({ "message": err.to_string() });
        match self.render(ERROR_TEMPLATE, Format::Html, &context) {
            Ok(body) => host.set_body(&body),
            Err(render_err) => error!("failed to render error template: {}", render_err),
        }
    }

    /// Register every template script block of the host and remove the
    /// blocks from it, returning how many were loaded
    pub fn load_html_templates(&mut self, host: &mut dyn ReportHost) -> ReportResult<usize> {
        let mut loaded = Vec::new();
        for script in host.template_scripts() {
            if script.id.is_empty() || script.content.is_empty() {
                continue;
            }
            let Some(format) = PartialFormat::from_mime_type(&script.mime_type) else {
                debug!("skipping script \"{}\" of type {}", script.id, script.mime_type);
                continue;
            };
            self.register_partial(&script.id, format, script.content.trim())?;
            loaded.push(script.id);
        }
        host.remove_template_scripts(&loaded);
        Ok(loaded.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("html".parse::<Format>().unwrap(), Format::Html);
        assert_eq!("all".parse::<PartialFormat>().unwrap(), PartialFormat::All);
        assert!(matches!(
            "pdf".parse::<PartialFormat>(),
            Err(ReportError::InvalidFormat(f)) if f == "pdf"
        ));
    }

    #[test]
    fn test_error_template_registered_for_both_formats() {
        let engine = ReportEngine::new().unwrap();
        assert!(engine.has_partial(ERROR_TEMPLATE, None));
        let html = engine
            .render(ERROR_TEMPLATE, Format::Html, &json!({"message": "a < b"}))
            .unwrap();
        assert_eq!(html, "<span style=\"white-space:pre-line\">a &lt; b\n\n</span>");
    }

    #[test]
    fn test_partial_derived_for_other_format() {
        let mut engine = ReportEngine::new().unwrap();
        engine
            .register_partial("greeting", PartialFormat::Only(Format::Html), "<p>Hi {{name}}</p>")
            .unwrap();
        assert!(engine.has_partial("greeting", None));
        assert_eq!(
            engine.partial_names(Format::Text),
            vec![ERROR_TEMPLATE.to_string(), "greeting".to_string()]
        );
        assert_eq!(
            engine.render("greeting", Format::Text, &json!({"name": "<b>"})).unwrap(),
            "Hi <b>\n\n"
        );
    }

    #[test]
    fn test_render_rejects_unknown_and_non_object() {
        let mut engine = ReportEngine::new().unwrap();
        engine
            .register_partial("hello", PartialFormat::All, "hi {{name}}")
            .unwrap();
        assert!(matches!(
            engine.render("nope", Format::Html, &json!({})),
            Err(ReportError::UnknownTemplate { .. })
        ));
        assert!(matches!(
            engine.render("hello", Format::Text, &json!([1])),
            Err(ReportError::InvalidData)
        ));
        assert_eq!(
            engine.render("hello", Format::Text, &json!({"name": "<b>"})).unwrap(),
            "hi <b>"
        );
        assert_eq!(
            engine.render("hello", Format::Html, &json!({"name": "<b>"})).unwrap(),
            "hi &lt;b&gt;"
        );
    }
}
