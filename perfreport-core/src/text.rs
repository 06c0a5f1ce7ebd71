//! Conversion between HTML fragments and plain text
//!
//! HTML is parsed into a small [`HtmlNode`] tree and walked to produce
//! text: block elements start and end lines, paragraphs are followed by a
//! blank line and `<br>` breaks a line. Everything else contributes only
//! its text.

use crate::entities::named_entity;
use crate::error::{ReportError, ReportResult};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Parsed HTML: elements with their children, and text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Tag { name: String, children: Vec<HtmlNode> },
    Text { data: String },
}

/// Options for [`html_to_text`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlToTextOptions {
    /// Column to wrap text at
    pub wrap: Option<usize>,
    /// Replace runs of spaces, tabs and newlines with one space
    pub collapse_whitespace: bool,
}

impl Default for HtmlToTextOptions {
    fn default() -> Self {
        HtmlToTextOptions {
            wrap: None,
            collapse_whitespace: true,
        }
    }
}

const BLOCK_ELEMENTS: &[&str] = &["p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "pre"];

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

fn self_closing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([A-Za-z][A-Za-z0-9-]*)/>").unwrap())
}

/// Parse an HTML fragment, keeping elements and text in source order
///
/// Comments are dropped. Unclosed elements extend to the end of their
/// parent. `<br/>` is read like `<br />`: tl takes the slash as part of
/// the name otherwise.
pub fn parse_html(html: &str) -> ReportResult<Vec<HtmlNode>> {
    let html = self_closing_regex().replace_all(html, "<$1 />");
    let dom = tl::parse(&html, tl::ParserOptions::default())
        .map_err(|e| ReportError::Html(format!("{:?}", e)))?;
    let parser = dom.parser();
    Ok(convert_nodes(dom.children().iter(), parser))
}

fn convert_nodes<'h>(
    handles: impl Iterator<Item = &'h tl::NodeHandle>,
    parser: &tl::Parser<'_>,
) -> Vec<HtmlNode> {
    handles
        .filter_map(|handle| match handle.get(parser)? {
            tl::Node::Tag(tag) => Some(HtmlNode::Tag {
                name: tag.name().as_utf8_str().to_lowercase(),
                children: convert_nodes(tag.children().top().iter(), parser),
            }),
            tl::Node::Raw(raw) => Some(HtmlNode::Text {
                data: raw.as_utf8_str().into_owned(),
            }),
            tl::Node::Comment(_) => None,
        })
        .collect()
}

fn named_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&([a-zA-Z0-9]+);").unwrap())
}

fn decimal_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#([0-9]+);").unwrap())
}

fn hex_entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#x([0-9a-fA-F]+);").unwrap())
}

/// Decode named, decimal and hexadecimal character references. Unknown
/// names and invalid code points are left as written.
pub fn decode_entities(text: &str) -> String {
    let keep = |caps: &Captures<'_>, c: Option<char>| {
        c.map(String::from).unwrap_or_else(|| caps[0].to_string())
    };

    let named = named_entity_regex().replace_all(text, |caps: &Captures<'_>| {
        keep(caps, named_entity(&caps[1]))
    });
    let decimal = decimal_entity_regex().replace_all(&named, |caps: &Captures<'_>| {
        let c = caps[1].parse::<u32>().ok().and_then(char::from_u32);
        keep(caps, c)
    });
    hex_entity_regex()
        .replace_all(&decimal, |caps: &Captures<'_>| {
            let c = u32::from_str_radix(&caps[1], 16).ok().and_then(char::from_u32);
            keep(caps, c)
        })
        .into_owned()
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \r\n\t]+").unwrap())
}

/// Replace every run of spaces, tabs and line breaks with a single space.
/// Non-breaking and fixed width spaces are kept.
pub fn collapse_whitespace(text: &str) -> String {
    whitespace_regex().replace_all(text, " ").into_owned()
}

fn is_wrappable(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{2000}'..='\u{200b}' | '\u{205f}' | '\u{3000}')
}

/// Greedy word wrap: once a line exceeds `column` characters, the last
/// space-like character on it becomes a line break. Lines without such a
/// character are left long.
pub fn wrap_text(text: &str, column: usize) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut line_start = 0;
    let mut last_space: Option<usize> = None;

    for i in 0..chars.len() {
        let c = chars[i];
        if c == '\n' {
            line_start = i + 1;
            last_space = None;
        } else if is_wrappable(c) {
            last_space = Some(i);
        }

        if i + 1 > line_start + column {
            if let Some(space) = last_space.take() {
                chars[space] = '\n';
                line_start = space + 1;
            }
        }
    }
    chars.into_iter().collect()
}

/// Convert parsed HTML to plain text
pub fn nodes_to_text(nodes: &[HtmlNode], options: &HtmlToTextOptions) -> String {
    let mut result = String::new();
    for node in nodes {
        match node {
            HtmlNode::Tag { name, children } => {
                let block = is_block(name);
                if name == "br" {
                    result.push('\n');
                } else if block && !result.is_empty() && !result.ends_with('\n') {
                    result.push('\n');
                }

                result.push_str(&nodes_to_text(children, options));

                if name == "p" {
                    result.push_str("\n\n");
                } else if block && !result.ends_with('\n') {
                    result.push('\n');
                }
            }
            HtmlNode::Text { data } => {
                let mut text = decode_entities(data);
                if options.collapse_whitespace {
                    text = collapse_whitespace(&text);
                }
                if let Some(column) = options.wrap {
                    text = wrap_text(&text, column);
                }
                result.push_str(&text);
            }
        }
    }
    result
}

/// Convert an HTML fragment to plain text, stripping tags
pub fn html_to_text(html: &str, options: &HtmlToTextOptions) -> ReportResult<String> {
    Ok(nodes_to_text(&parse_html(html)?, options))
}

/// Escape text for HTML and wrap it in a span that preserves its line breaks
pub fn text_to_html(text: &str) -> String {
    format!(
        "<span style=\"white-space:pre-line\">{}</span>",
        handlebars::html_escape(text)
    )
}

fn double_stash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^>#/{}][^{}]*?)\}\}").unwrap())
}

fn triple_stash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\{(.*?)\}\}\}").unwrap())
}

/// Derive a text template from an HTML one
///
/// Escaped expressions become raw ones, since text output is never
/// HTML-escaped, and the markup is then converted to text. Block, closing,
/// partial and `else` tags are kept as they are.
pub fn html_partial_to_text(partial: &str) -> ReportResult<String> {
    let re = double_stash_regex();
    let mut converted = String::with_capacity(partial.len());
    let mut copied = 0;
    let mut search = 0;

    while let Some(caps) = re.captures_at(partial, search) {
        let Some(whole) = caps.get(0) else {
            break;
        };
        // part of a triple-stash expression
        if partial[whole.end()..].starts_with('}') {
            search = whole.start() + 1;
            continue;
        }

        let key = &caps[1];
        converted.push_str(&partial[copied..whole.start()]);
        if key == "else" {
            converted.push_str(whole.as_str());
        } else {
            converted.push_str("{{{");
            converted.push_str(key);
            converted.push_str("}}}");
        }
        copied = whole.end();
        search = whole.end();
    }
    converted.push_str(&partial[copied..]);

    html_to_text(&converted, &HtmlToTextOptions::default())
}

/// Derive an HTML template from a text one: raw expressions become escaped
/// ones and the text is wrapped with [`text_to_html`]
pub fn text_partial_to_html(partial: &str) -> String {
    text_to_html(&triple_stash_regex().replace_all(partial, "{{$1}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_text(html: &str) -> String {
        html_to_text(html, &HtmlToTextOptions::default()).unwrap()
    }

    #[test]
    fn test_parse_html_tree() {
        let nodes = parse_html("<div>a<b>bold</b></div>tail").unwrap();
        assert_eq!(
            nodes,
            vec![
                HtmlNode::Tag {
                    name: "div".to_string(),
                    children: vec![
                        HtmlNode::Text {
                            data: "a".to_string()
                        },
                        HtmlNode::Tag {
                            name: "b".to_string(),
                            children: vec![HtmlNode::Text {
                                data: "bold".to_string()
                            }],
                        },
                    ],
                },
                HtmlNode::Text {
                    data: "tail".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_paragraph_then_break() {
        assert_eq!(to_text("<p>a  b</p><br>c"), "a b\n\n\nc");
    }

    #[test]
    fn test_self_closing_tags() {
        assert_eq!(to_text("<p>a<br/>b</p>c"), "a\nb\n\nc");
        assert_eq!(to_text("<p>a<br />b</p>c"), to_text("<p>a<br>b</p>c"));
        assert_eq!(
            parse_html("a<br/>b").unwrap(),
            vec![
                HtmlNode::Text {
                    data: "a".to_string()
                },
                HtmlNode::Tag {
                    name: "br".to_string(),
                    children: Vec::new(),
                },
                HtmlNode::Text {
                    data: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_block_elements_start_lines() {
        assert_eq!(to_text("x<div>y</div>z"), "x\ny\nz");
        assert_eq!(to_text("<h1>Title</h1><div>body</div>"), "Title\nbody\n");
        assert_eq!(to_text("<span>a</span><span>b</span>"), "ab");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(to_text("a &amp; b &lt;c&gt; &#65;&#x42;"), "a & b <c> AB");
        assert_eq!(decode_entities("&bogus; &nbsp;"), "&bogus; \u{a0}");
    }

    #[test]
    fn test_collapse_can_be_disabled() {
        let options = HtmlToTextOptions {
            wrap: None,
            collapse_whitespace: false,
        };
        assert_eq!(html_to_text("a \n  b", &options).unwrap(), "a \n  b");
        assert_eq!(collapse_whitespace("a \r\n\t b"), "a b");
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("aaa bbb ccc", 5), "aaa\nbbb\nccc");
        assert_eq!(wrap_text("aaaaaaaa bb", 4), "aaaaaaaa\nbb");
        assert_eq!(wrap_text("ab\ncd ef", 4), "ab\ncd\nef");
        assert_eq!(wrap_text("ab\ncd", 4), "ab\ncd");
        assert_eq!(wrap_text("short", 80), "short");
    }

    #[test]
    fn test_wrap_option() {
        let options = HtmlToTextOptions {
            wrap: Some(10),
            collapse_whitespace: true,
        };
        assert_eq!(
            html_to_text("<p>the quick brown fox</p>", &options).unwrap(),
            "the quick\nbrown fox\n\n"
        );
    }

    #[test]
    fn test_text_to_html_escapes() {
        assert_eq!(
            text_to_html("a < b & c"),
            "<span style=\"white-space:pre-line\">a &lt; b &amp; c</span>"
        );
    }

    #[test]
    fn test_html_to_text_fixed_point() {
        let once = to_text("<div>one two</div><p>three</p>");
        assert_eq!(once, "one two\nthree\n\n");
        let twice = to_text(&once);
        assert_eq!(twice, "one two three ");
        assert_eq!(to_text(&twice), twice);
    }

    #[test]
    fn test_html_partial_to_text() {
        let partial = "<p>{{name}} {{{raw}}}</p>{{#if x}}{{value}}{{else}}none{{/if}}{{> other}}";
        assert_eq!(
            html_partial_to_text(partial).unwrap(),
            "{{{name}}} {{{raw}}}\n\n{{#if x}}{{{value}}}{{else}}none{{/if}}{{> other}}"
        );
    }

    #[test]
    fn test_text_partial_to_html() {
        assert_eq!(
            text_partial_to_html("{{{name}}}: {{value}}"),
            "<span style=\"white-space:pre-line\">{{name}}: {{value}}</span>"
        );
    }
}
