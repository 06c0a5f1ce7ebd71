//! Template helper behaviour, exercised through an engine

use perfreport_core::report;
use perfreport_core::{Format, PartialFormat, ReportEngine, ReportError};
use serde_json::{json, Value};

fn engine() -> ReportEngine {
    let mut engine = ReportEngine::new().unwrap();
    report::install(&mut engine);
    engine
}

fn render_with(format: Format, source: &str, data: &Value) -> Result<String, ReportError> {
    let mut engine = engine();
    engine.register_partial("t", PartialFormat::All, source)?;
    engine.render("t", format, data)
}

fn text(source: &str) -> String {
    render_with(Format::Text, source, &context()).unwrap()
}

fn html(source: &str) -> String {
    render_with(Format::Html, source, &context()).unwrap()
}

fn context() -> Value {
    json!({
        "name": "world",
        "tpl": "Hello {{name}}",
        "rootTpl": "{{id}} of {{@root.name}}",
        "items": [{"id": "a", "size": 1}, {"id": "b", "size": 2}],
        "metricData": {
            "rss": {"value": "memory.rss", "displayName": "Resident memory", "units": "bytes"},
            "calls": {"value": "counts.calls"}
        },
        "data": {
            "memory": {"rss": 2048},
            "counts": {"calls": {"plain": {"value": 1}}}
        },
        "colorData": {
            "time": {"default": [0, 50, 50], "mpi": [240, 0, 0]}
        },
        "rows": [
            {"metricId": "rss", "group": "mem"}
        ]
    })
}

#[test]
fn test_number_formatting_helpers() {
    assert_eq!(text("{{number 5}}|{{number 12.34}}|{{number 234.9}}"), "5.00|12.3|235");
    assert_eq!(text("{{number \"x\"}}"), "not supported ");
    assert_eq!(text("{{preciseNumber 1.23456789}}"), "1.23457");
    assert_eq!(text("{{toFixed 0.125 2}}|{{toPrecision 123.456 4}}"), "0.13|123.5");
    assert_eq!(text("{{percent 12.345}}|{{percent 0.05}}"), "12.3|<0.1");
    assert_eq!(html("{{percent 0.05}}"), "&lt;0.1");
    assert_eq!(text("{{barWidth 150}}|{{barWidth 42}}"), "100|42");
}

#[test]
fn test_rounding_follows_exact_values() {
    assert_eq!(text("{{number 0.015}}|{{number 10.35}}"), "0.01|10.3");
    assert_eq!(text("{{toFixed 0.285 2}}|{{percent 0.35}}"), "0.28|0.3");
    assert_eq!(text("{{toPrecision 2.5 1}}|{{toPrecision 0.125 2}}"), "3|0.13");
    assert_eq!(text("{{preciseNumber 12345.25}}"), "12345.3");
}

#[test]
fn test_unit_helpers() {
    assert_eq!(text("{{siValue 1500000}} {{siUnits 1500000 units=\"bytes\"}}"), "1.5 MB");
    assert_eq!(text("{{iecValue 2048}} {{iecUnits 2048 symbol=\"B\"}}"), "2 kiB");
    assert_eq!(text("{{siUnits 12 units=\"bytes\"}}"), "bytes");
    assert_eq!(text("{{customUnits 1 \"calls/s\"}}|{{customUnits 2 \"calls/s\"}}"), "call/s|calls/s");
}

#[test]
fn test_layout_helpers() {
    assert_eq!(text("[{{padLeft \"ab\" 4}}]"), "[  ab]");
    assert_eq!(text("[{{#padRightBlock 4}}ab{{/padRightBlock}}]"), "[ab  ]");
    assert_eq!(text("[{{padRight \"abcdef\" 3}}]"), "[abc]");
    assert_eq!(text("{{csvEscape \"a,b\"}}"), "\"a,b\"");
    assert_eq!(text("{{percentToBar 50}}"), "|====|");
    assert_eq!(text("{{percentToBar 0}}"), "|");
}

#[test]
fn test_string_helpers() {
    assert_eq!(text("[{{#trimBlock}}  hi  {{/trimBlock}}]"), "[hi]");
    assert_eq!(text("[{{trimLeft \"  hi \"}}]"), "[hi ]");
    assert_eq!(text("[{{trim 5}}]|{{trimLeft true}}"), "[5]|true");
    assert_eq!(text("[{{#condenseSpace}} a \n  b {{/condenseSpace}}]"), "[a b]");
    assert_eq!(
        html("{{textToHtml \"a<b\"}}"),
        "<span style=\"white-space:pre-line\">a&lt;b</span>"
    );
    assert_eq!(text("{{wrappablePath \"a/b\"}}"), "a/b");
    assert_eq!(html("{{wrappablePath \"a/b\"}}"), "a/&#x200b;b");
}

#[test]
fn test_format_helpers() {
    assert_eq!(text("{{isHtml}}"), "false");
    assert_eq!(html("{{isHtml}}"), "true");
    assert_eq!(text("{{formatToMimeType \"all\"}}"), "text/x.perfreport-template");
    assert_eq!(text("{{formatToMimeType \"text\"}}"), "text/plain");
}

#[test]
fn test_logic_and_arithmetic_helpers() {
    assert_eq!(text("{{add 1 2}}|{{sub \"5\" 2}}|{{div 1 4}}"), "3|3|0.25");
    assert_eq!(text("{{#if (greater 3 2)}}yes{{/if}}{{#if (less 3 2)}}no{{/if}}"), "yes");
    assert_eq!(text("{{isEqual 1 \"1\"}}|{{isEqual 1 1}}"), "false|true");
    assert_eq!(text("{{isEqual 1}}|{{isEqual 1 1 2}}"), "false|true");
    assert_eq!(text("{{toBool \"false\"}}|{{toBool \"0\"}}|{{toBool \"x\"}}"), "false|false|true");
    assert_eq!(text("{{anyNotNull null 1}}|{{allNull null missing}}"), "true|true");
    assert_eq!(text("{{isOdd 3}}|{{isOdd 4}}"), "true|false");
}

#[test]
fn test_lookup_and_find() {
    assert_eq!(text("{{lookup data \"memory.rss\"}}"), "2048");
    assert_eq!(text("{{find items \"id\" \"b\" \"size\"}}"), "2");
    assert_eq!(text("[{{find items \"id\" \"z\" \"size\"}}]"), "[]");
}

#[test]
fn test_metric_helpers() {
    assert_eq!(text("{{lookupMetric \"rss\"}}|{{lookupMetric \"calls\"}}"), "2048|1");
    assert_eq!(text("{{lookupMetricDisplayName \"rss\"}}"), "Resident memory");
    assert_eq!(text("{{lookupMetricUnits \"rss\"}}"), "bytes");
    assert_eq!(text("[{{lookupMetricUnits \"calls\"}}]"), "[]");
    assert_eq!(
        text("{{#each (normaliseMetrics rows)}}{{metricId}}:{{noBar}}:{{value.mean}}{{/each}}"),
        "rss:true:2048.0"
    );
    assert_eq!(text("{{computeColor \"time.mpi\"}}"), "rgb(64, 64, 191)");
}

#[test]
fn test_make_id_is_unique_per_engine() {
    let mut engine = engine();
    engine
        .register_partial(
            "ids",
            PartialFormat::All,
            "{{#makeId}}Sec 1{{/makeId}} {{#makeId}}sec{{/makeId}}",
        )
        .unwrap();
    let rendered = engine.render("ids", Format::Text, &json!({})).unwrap();
    assert_eq!(rendered, "sec sec2");

    assert_eq!(engine.render("ids", Format::Text, &json!({})).unwrap(), "sec3 sec4");
    engine.reset_ids();
    assert_eq!(engine.render("ids", Format::Text, &json!({})).unwrap(), "sec sec2");
}

#[test]
fn test_eval_renders_template_values() {
    assert_eq!(text("{{eval tpl}}"), "Hello world");
    assert_eq!(text("{{eval tpl name=\"there\"}}"), "Hello there");
}

#[test]
fn test_eval_keeps_root_context() {
    assert_eq!(
        text("{{#each items}}{{eval @root.rootTpl}};{{/each}}"),
        "a of world;b of world;"
    );
}

#[test]
fn test_html_to_text_helper() {
    let data = json!({"fragment": "<p>a  b</p><br>c"});
    let rendered = render_with(Format::Text, "{{htmlToText fragment}}", &data).unwrap();
    assert_eq!(rendered, "a b\n\n\nc");

    let rendered = render_with(
        Format::Text,
        "{{htmlToText fragment collapseWhitespace=false}}",
        &data,
    )
    .unwrap();
    assert_eq!(rendered, "a  b\n\n\nc");

    let data = json!({"fragment": "<p>a<br/>b</p>c"});
    let rendered = render_with(Format::Text, "{{htmlToText fragment}}", &data).unwrap();
    assert_eq!(rendered, "a\nb\n\nc");
}

#[test]
fn test_helper_misuse_fails_render() {
    let err = render_with(Format::Text, "{{trim}}", &context()).unwrap_err();
    assert!(matches!(err, ReportError::Render(_)));
    assert!(err.to_string().contains("invalid usage of trim"));

    let err = render_with(Format::Text, "{{lookupMetric}}", &context()).unwrap_err();
    assert!(err.to_string().contains("lookupMetric requires one argument"));

    let err = render_with(Format::Text, "{{textToHtml 1}}", &context()).unwrap_err();
    assert!(err.to_string().contains("textToHtml expected string argument"));
}
