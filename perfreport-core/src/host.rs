//! The document a report is rendered into
//!
//! [`ReportHost`] is the small part of a page the engine and its hooks
//! touch: named elements, the title, the body, a style sheet and template
//! script blocks. [`StaticPage`] keeps all of it in memory and writes a
//! standalone HTML document.

use crate::error::ReportResult;
use crate::util::remove_cdata;
use handlebars::html_escape;
use serde_json::Value;

/// A `<script>` block holding a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateScript {
    pub id: String,
    pub mime_type: String,
    pub content: String,
}

impl TemplateScript {
    pub fn new(id: &str, mime_type: &str, content: &str) -> Self {
        TemplateScript {
            id: id.to_string(),
            mime_type: mime_type.to_string(),
            content: content.to_string(),
        }
    }
}

pub trait ReportHost {
    /// Inner HTML of the element with the given id
    fn element_html(&self, id: &str) -> Option<String>;

    /// Parse the content of an element as JSON, ignoring CDATA wrappers
    fn element_json(&self, id: &str) -> ReportResult<Option<Value>> {
        match self.element_html(id) {
            Some(html) => Ok(Some(serde_json::from_str(&remove_cdata(&html))?)),
            None => Ok(None),
        }
    }

    fn set_element_html(&mut self, id: &str, html: &str);

    fn set_title(&mut self, title: &str);

    /// Replace the whole document body
    fn set_body(&mut self, html: &str);

    fn insert_css_rule(&mut self, rule: &str);

    fn template_scripts(&self) -> Vec<TemplateScript>;

    fn remove_template_scripts(&mut self, ids: &[String]);
}

/// In-memory page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticPage {
    title: String,
    elements: Vec<(String, String)>,
    body: Option<String>,
    css_rules: Vec<String>,
    scripts: Vec<TemplateScript>,
}

impl StaticPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: &str) -> Self {
        StaticPage {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn add_template_script(&mut self, script: TemplateScript) {
        self.scripts.push(script);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn css_rules(&self) -> &[String] {
        &self.css_rules
    }

    /// Body markup: the replacement body if one was set, else every
    /// element in insertion order
    pub fn body(&self) -> String {
        if let Some(body) = &self.body {
            return body.clone();
        }
        self.elements
            .iter()
            .map(|(id, html)| format!("<div id=\"{}\">{}</div>", id, html))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Serialize the page as a complete HTML document
    pub fn to_document(&self) -> String {
        let mut doc = String::new();
        doc.push_str("<!DOCTYPE html>\n");
        doc.push_str("<html lang=\"en\">\n");
        doc.push_str("<head>\n");
        doc.push_str("<meta charset=\"UTF-8\">\n");
        doc.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        doc.push_str(&format!("<title>{}</title>\n", html_escape(&self.title)));
        if !self.css_rules.is_empty() {
            doc.push_str("<style>\n");
            for rule in &self.css_rules {
                doc.push_str(rule);
                doc.push('\n');
            }
            doc.push_str("</style>\n");
        }
        doc.push_str("</head>\n");
        doc.push_str("<body>\n");
        doc.push_str(&self.body());
        doc.push_str("\n</body>\n");
        doc.push_str("</html>\n");
        doc
    }
}

impl ReportHost for StaticPage {
    fn element_html(&self, id: &str) -> Option<String> {
        self.elements
            .iter()
            .find(|(element, _)| element == id)
            .map(|(_, html)| html.clone())
    }

    fn set_element_html(&mut self, id: &str, html: &str) {
        match self.elements.iter_mut().find(|(element, _)| element == id) {
            Some((_, content)) => *content = html.to_string(),
            None => self.elements.push((id.to_string(), html.to_string())),
        }
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    fn set_body(&mut self, html: &str) {
        self.body = Some(html.to_string());
    }

    fn insert_css_rule(&mut self, rule: &str) {
        self.css_rules.push(rule.to_string());
    }

    fn template_scripts(&self) -> Vec<TemplateScript> {
        self.scripts.clone()
    }

    fn remove_template_scripts(&mut self, ids: &[String]) {
        self.scripts.retain(|script| !ids.contains(&script.id));
    }
}
