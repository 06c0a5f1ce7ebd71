//! Handlebars helper adapters and the builtin helpers of every engine
//!
//! Helpers come in three shapes:
//! - [`ValueHelper`]: returns a JSON value, usable inline and as a
//!   subexpression; strings are escaped in HTML output
//! - [`RawHelper`]: like `ValueHelper` but its output is never escaped
//! - [`BlockHelper`]: transforms its rendered block content
//!
//! Helper misuse (wrong argument count or type) fails the render with a
//! message such as "invalid usage of trim".

use crate::engine::{Format, TEMPLATE_MIME_TYPE};
use crate::text::{html_to_text, text_to_html, HtmlToTextOptions};
use crate::units::{to_fixed, to_precision};
use crate::util::{
    compare, find_by_path, lookup, number_value, replace_all, strict_equals, to_bool,
    to_display_string, to_number, to_number_or_zero, IdRegistry,
};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, Renderable, ScopedJson, StringOutput, Template,
};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

static NULL: Value = Value::Null;

/// Build the error raised for a failing helper
pub fn helper_error(message: impl Into<String>) -> RenderError {
    RenderErrorReason::Other(message.into()).into()
}

/// Evaluated arguments of one helper call
pub struct HelperArgs<'a> {
    name: &'a str,
    params: Vec<&'a Value>,
    hash: BTreeMap<&'a str, &'a Value>,
    root: &'a Value,
}

impl<'a> HelperArgs<'a> {
    fn new(h: &'a Helper<'_>, ctx: &'a Context) -> Self {
        HelperArgs {
            name: h.name(),
            params: h.params().iter().map(|p| p.value()).collect(),
            hash: h.hash().iter().map(|(k, v)| (*k, v.value())).collect(),
            root: ctx.data(),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Positional argument, null when not given
    pub fn param(&self, index: usize) -> &'a Value {
        self.params.get(index).copied().unwrap_or(&NULL)
    }

    pub fn params(&self) -> &[&'a Value] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn hash(&self, key: &str) -> Option<&'a Value> {
        self.hash.get(key).copied()
    }

    /// The root render context
    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Fail unless called with exactly `count` positional arguments
    pub fn expect_params(&self, count: usize) -> Result<(), RenderError> {
        if self.params.len() == count {
            Ok(())
        } else {
            Err(self.usage_error())
        }
    }

    pub fn usage_error(&self) -> RenderError {
        helper_error(format!("invalid usage of {}", self.name))
    }

    /// Non-negative integer width argument; anything unusable is 0
    pub fn width(&self, index: usize) -> usize {
        to_number_or_zero(self.param(index)).max(0.0).trunc() as usize
    }
}

/// Text a helper writes for a value: empty for null, the string itself
/// for strings
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => to_display_string(other),
    }
}

type ValueFn = dyn Fn(&HelperArgs<'_>) -> Result<Value, RenderError> + Send + Sync;
type BlockFn = dyn Fn(&str, &HelperArgs<'_>) -> Result<String, RenderError> + Send + Sync;

pub struct ValueHelper(Box<ValueFn>);

impl ValueHelper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        ValueHelper(Box::new(f))
    }
}

impl HelperDef for ValueHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        (self.0)(&HelperArgs::new(h, ctx)).map(ScopedJson::Derived)
    }
}

/// Helper whose output is already markup
pub struct RawHelper(Box<ValueFn>);

impl RawHelper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HelperArgs<'_>) -> Result<Value, RenderError> + Send + Sync + 'static,
    {
        RawHelper(Box::new(f))
    }
}

impl HelperDef for RawHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        (self.0)(&HelperArgs::new(h, ctx)).map(ScopedJson::Derived)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = (self.0)(&HelperArgs::new(h, ctx))?;
        out.write(&render_value(&value))?;
        Ok(())
    }
}

#[derive(Default)]
struct Capture(String);

impl Output for Capture {
    fn write(&mut self, seg: &str) -> Result<(), std::io::Error> {
        self.0.push_str(seg);
        Ok(())
    }
}

fn render_block<'reg: 'rc, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
) -> Result<String, RenderError> {
    let template = h
        .template()
        .ok_or_else(|| helper_error(format!("invalid usage of {}", h.name())))?;
    let mut body = Capture::default();
    template.render(r, ctx, rc, &mut body)?;
    Ok(body.0)
}

/// Block helper transforming its rendered content
pub struct BlockHelper(Box<BlockFn>);

impl BlockHelper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &HelperArgs<'_>) -> Result<String, RenderError> + Send + Sync + 'static,
    {
        BlockHelper(Box::new(f))
    }
}

impl HelperDef for BlockHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let body = render_block(h, r, ctx, rc)?;
        let result = (self.0)(&body, &HelperArgs::new(h, ctx))?;
        out.write(&result)?;
        Ok(())
    }
}

/// Renders a template string given as an argument, in the engine and
/// format of the calling template
///
/// `{{eval text ctx key=value}}` renders `text` against `ctx` (the current
/// context by default) extended with the hash arguments. An array of
/// templates renders to an array of results.
struct EvalHelper;

impl EvalHelper {
    fn evaluate<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<Value, RenderError> {
        let args = HelperArgs::new(h, ctx);
        if args.len() > 2 {
            return Err(args.usage_error());
        }

        let mut context = match h.param(1) {
            Some(param) => param.value().clone(),
            None => rc.evaluate(ctx, "this")?.as_json().clone(),
        };
        if let Value::Object(fields) = &mut context {
            for (key, value) in h.hash() {
                fields.insert(key.to_string(), value.value().clone());
            }
        }

        let render_one = |template: &Value| -> Result<Value, RenderError> {
            match template {
                Value::String(text) => render_with_root(r, ctx, text, &context).map(Value::String),
                other if !to_bool(other) => Ok(Value::String(String::new())),
                _ => Err(helper_error("eval expects a template string")),
            }
        };

        match args.param(0) {
            Value::Array(templates) => templates
                .iter()
                .map(render_one)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            template => render_one(template),
        }
    }
}

/// Render `source` with `local` as `this` while `@root` still refers to
/// the outer render context
fn render_with_root<'reg>(
    registry: &'reg Handlebars<'reg>,
    root: &Context,
    source: &str,
    local: &Value,
) -> Result<String, RenderError> {
    let template = Template::compile(source)?;
    let mut rc = RenderContext::new(None);
    if let Some(block) = rc.block_mut() {
        block.set_base_value(local.clone());
    }
    let mut out = StringOutput::new();
    template.render(registry, root, &mut rc, &mut out)?;
    out.into_string().map_err(RenderError::from)
}

impl HelperDef for EvalHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.evaluate(h, r, ctx, rc).map(ScopedJson::Derived)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = self.evaluate(h, r, ctx, rc)?;
        out.write(&render_value(&value))?;
        Ok(())
    }
}

/// A helper registered in several registries at once
struct SharedHelper(Arc<dyn HelperDef + Send + Sync>);

impl HelperDef for SharedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.0.call_inner(h, r, ctx, rc)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        self.0.call(h, r, ctx, rc, out)
    }
}

/// Which registries a helper is installed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperScope {
    All,
    Only(Format),
}

impl HelperScope {
    fn includes(self, format: Format) -> bool {
        match self {
            HelperScope::All => true,
            HelperScope::Only(only) => only == format,
        }
    }
}

/// A collection of named helpers, each for all formats or for one
#[derive(Clone, Default)]
pub struct HelperSet {
    entries: Vec<(HelperScope, String, Arc<dyn HelperDef + Send + Sync>)>,
}

impl HelperSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        mut self,
        scope: HelperScope,
        name: &str,
        helper: impl HelperDef + Send + Sync + 'static,
    ) -> Self {
        self.entries.push((scope, name.to_string(), Arc::new(helper)));
        self
    }

    pub fn all(self, name: &str, helper: impl HelperDef + Send + Sync + 'static) -> Self {
        self.add(HelperScope::All, name, helper)
    }

    pub fn html(self, name: &str, helper: impl HelperDef + Send + Sync + 'static) -> Self {
        self.add(HelperScope::Only(Format::Html), name, helper)
    }

    pub fn text(self, name: &str, helper: impl HelperDef + Send + Sync + 'static) -> Self {
        self.add(HelperScope::Only(Format::Text), name, helper)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install into the registry of `format`. Helpers for all formats go in
    /// first so format-specific ones of the same name take precedence.
    pub(crate) fn install(&self, format: Format, registry: &mut Handlebars<'static>) {
        let (general, specific): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .filter(|(scope, _, _)| scope.includes(format))
            .partition(|(scope, _, _)| *scope == HelperScope::All);

        for (_, name, helper) in general.into_iter().chain(specific) {
            registry.register_helper(name, Box::new(SharedHelper(Arc::clone(helper))));
        }
    }
}

fn condense_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn trim_function(args: &HelperArgs<'_>, trim: fn(&str) -> &str) -> Result<Value, RenderError> {
    args.expect_params(1)?;
    let text = to_display_string(args.param(0));
    Ok(Value::String(trim(&text).to_string()))
}

fn number_arithmetic(args: &HelperArgs<'_>, op: fn(f64, f64) -> f64) -> Result<Value, RenderError> {
    args.expect_params(2)?;
    let lhs = to_number_or_zero(args.param(0));
    let rhs = to_number_or_zero(args.param(1));
    Ok(number_value(op(lhs, rhs)))
}

fn text_options(args: &HelperArgs<'_>) -> HtmlToTextOptions {
    let mut options = HtmlToTextOptions::default();
    if let Some(wrap) = args.hash("wrap") {
        let column = to_number_or_zero(wrap);
        options.wrap = (to_bool(wrap) && column > 0.0).then_some(column as usize);
    }
    if let Some(collapse) = args.hash("collapseWhitespace") {
        options.collapse_whitespace = to_bool(collapse);
    }
    options
}

fn mime_type(format: &str) -> &'static str {
    match format {
        "html" => Format::Html.mime_type(),
        "text" => Format::Text.mime_type(),
        "all" => TEMPLATE_MIME_TYPE,
        _ => "",
    }
}

/// Builtin helpers available to every engine
pub fn builtin_helpers(ids: Arc<Mutex<IdRegistry>>) -> HelperSet {
    HelperSet::new()
        .all(
            "condenseSpace",
            BlockHelper::new(|body, _| {
                Ok(condense_regex().replace_all(body.trim(), " ").into_owned())
            }),
        )
        .all("trim", ValueHelper::new(|args| trim_function(args, str::trim)))
        .all("trimBlock", BlockHelper::new(|body, _| Ok(body.trim().to_string())))
        .all(
            "trimLeft",
            ValueHelper::new(|args| trim_function(args, str::trim_start)),
        )
        .all(
            "trimLeftBlock",
            BlockHelper::new(|body, _| Ok(body.trim_start().to_string())),
        )
        .all(
            "toFixed",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let digits = to_number_or_zero(args.param(1)).max(0.0) as usize;
                Ok(Value::String(to_fixed(to_number_or_zero(args.param(0)), digits)))
            }),
        )
        .all(
            "toPrecision",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let value = to_number_or_zero(args.param(0));
                let precision = to_number(args.param(1));
                let text = if precision.is_finite() {
                    to_precision(value, precision as usize)
                } else {
                    to_display_string(&number_value(value))
                };
                Ok(Value::String(text))
            }),
        )
        .all(
            "makeId",
            BlockHelper::new(move |body, _| {
                let mut ids = ids
                    .lock()
                    .map_err(|_| helper_error("id registry is unavailable"))?;
                Ok(ids.make_id(body))
            }),
        )
        .all(
            "toBool",
            ValueHelper::new(|args| Ok(Value::Bool(to_bool(args.param(0))))),
        )
        .all(
            "greater",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let ordering = compare(args.param(0), args.param(1));
                Ok(Value::Bool(ordering == Some(Ordering::Greater)))
            }),
        )
        .all(
            "less",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let ordering = compare(args.param(0), args.param(1));
                Ok(Value::Bool(ordering == Some(Ordering::Less)))
            }),
        )
        .all(
            "isEqual",
            ValueHelper::new(|args| {
                let equal = args.len() >= 2 && strict_equals(args.param(0), args.param(1));
                Ok(Value::Bool(equal))
            }),
        )
        .all("add", ValueHelper::new(|args| number_arithmetic(args, |a, b| a + b)))
        .all("sub", ValueHelper::new(|args| number_arithmetic(args, |a, b| a - b)))
        .all("div", ValueHelper::new(|args| number_arithmetic(args, |a, b| a / b)))
        .all(
            "anyNotNull",
            ValueHelper::new(|args| Ok(Value::Bool(args.params().iter().any(|v| !v.is_null())))),
        )
        .all(
            "allNull",
            ValueHelper::new(|args| Ok(Value::Bool(args.params().iter().all(|v| v.is_null())))),
        )
        .all(
            "isOdd",
            ValueHelper::new(|args| {
                args.expect_params(1)?;
                Ok(Value::Bool(to_number(args.param(0)).abs() % 2.0 == 1.0))
            }),
        )
        .all(
            "lookup",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let path = match args.param(1) {
                    Value::String(path) => path.as_str(),
                    other if !to_bool(other) => "",
                    _ => return Err(args.usage_error()),
                };
                Ok(lookup(args.param(0), path).cloned().unwrap_or(Value::Null))
            }),
        )
        .all(
            "find",
            ValueHelper::new(|args| {
                if !(3..=4).contains(&args.len()) {
                    return Err(args.usage_error());
                }
                let Value::Array(items) = args.param(0) else {
                    return Err(helper_error("find expects an array"));
                };
                let key_path = render_value(args.param(1));
                let result_path = render_value(args.param(3));
                Ok(find_by_path(items, &key_path, args.param(2), &result_path)
                    .cloned()
                    .unwrap_or(Value::Null))
            }),
        )
        .all(
            "textToHtml",
            RawHelper::new(|args| match args.param(0) {
                Value::String(text) => Ok(Value::String(text_to_html(text))),
                _ => Err(helper_error("textToHtml expected string argument")),
            }),
        )
        .all(
            "htmlToText",
            ValueHelper::new(|args| {
                let html = match args.param(0) {
                    Value::String(html) => html.clone(),
                    value @ (Value::Object(_) | Value::Array(_)) => to_display_string(value),
                    _ => return Err(helper_error("htmlToText expected string argument")),
                };
                let text = html_to_text(&html, &text_options(args))
                    .map_err(|e| helper_error(e.to_string()))?;
                Ok(Value::String(text))
            }),
        )
        .all("isHtml", ValueHelper::new(|_| Ok(Value::Bool(false))))
        .html("isHtml", ValueHelper::new(|_| Ok(Value::Bool(true))))
        .all(
            "wrappablePath",
            ValueHelper::new(|args| Ok(Value::String(render_value(args.param(0))))),
        )
        .html(
            "wrappablePath",
            RawHelper::new(|args| {
                let escaped = handlebars::html_escape(&render_value(args.param(0)));
                Ok(Value::String(replace_all(&escaped, "/", "/&#x200b;")))
            }),
        )
        .all(
            "formatToMimeType",
            ValueHelper::new(|args| {
                args.expect_params(1)?;
                Ok(Value::String(mime_type(&render_value(args.param(0))).to_string()))
            }),
        )
        .all("eval", EvalHelper)
}
