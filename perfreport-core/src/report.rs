//! Performance report helpers and hooks
//!
//! [`install`] adds the value formatting, metric and color helpers used by
//! performance report templates to an engine, together with the
//! after-render hooks that finish the page: the document title, the color
//! style sheet and the radar legend colors.

use crate::color::{compute_color, css_color_rules, ColorSpec};
use crate::engine::{Format, ReportEngine};
use crate::helpers::{
    helper_error, render_value, BlockHelper, HelperArgs, HelperSet, ValueHelper,
};
use crate::metrics::{
    is_visible, lookup_metric, lookup_metric_display_name, lookup_metric_units, normalise_metrics,
};
use crate::radar::make_radar_data;
use crate::units::{
    bar_width, csv_escape_block, csv_escape_value, custom_units, factor_units, factor_value,
    format_number, format_precise_number, pad_left_block, pad_left_value, pad_right_block,
    pad_right_value, percent, percent_to_bar, Factor, UnitOptions, IEC_FACTORS, SI_FACTORS,
};
use crate::util::{finite_number, number_value, to_display_string, to_number};
use handlebars::RenderError;
use serde_json::Value;
use tracing::debug;

/// Partial rendered into the document title, when registered
pub const TITLE_TEMPLATE: &str = "titleTemplate";

fn single_metric_id(args: &HelperArgs<'_>) -> Result<String, RenderError> {
    if args.len() != 1 {
        return Err(helper_error(format!("{} requires one argument", args.name())));
    }
    Ok(match args.param(0) {
        Value::String(id) => id.clone(),
        other => to_display_string(other),
    })
}

fn scaled_value(args: &HelperArgs<'_>, factors: &'static [Factor]) -> Value {
    let value = args.param(0);
    let raw = (!value.is_null()).then(|| to_number(value));
    factor_value(raw, factors).map(number_value).unwrap_or(Value::Null)
}

fn scaled_units(args: &HelperArgs<'_>, factors: &'static [Factor]) -> Value {
    let option = |key: &str| {
        args.hash(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let options = UnitOptions {
        symbol: option("symbol"),
        units: option("units"),
    };
    Value::String(factor_units(to_number(args.param(0)), factors, &options))
}

fn metric_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(fields) => fields.values().cloned().collect(),
        _ => Vec::new(),
    }
}

/// Helpers for performance report templates
pub fn report_helpers() -> HelperSet {
    HelperSet::new()
        .all(
            "number",
            ValueHelper::new(|args| Ok(Value::String(format_number(finite_number(args.param(0)))))),
        )
        .all(
            "preciseNumber",
            ValueHelper::new(|args| {
                Ok(Value::String(format_precise_number(finite_number(args.param(0)))))
            }),
        )
        .all(
            "percent",
            ValueHelper::new(|args| Ok(Value::String(percent(finite_number(args.param(0)))))),
        )
        .all(
            "barWidth",
            ValueHelper::new(|args| Ok(number_value(bar_width(finite_number(args.param(0)))))),
        )
        .all(
            "isVisible",
            ValueHelper::new(|args| Ok(Value::Bool(is_visible(args.param(0), args.root())))),
        )
        .all(
            "normaliseMetrics",
            ValueHelper::new(|args| {
                let metrics = normalise_metrics(&metric_list(args.param(0)), args.root());
                serde_json::to_value(metrics).map_err(|e| helper_error(e.to_string()))
            }),
        )
        .all(
            "lookupMetric",
            ValueHelper::new(|args| {
                let id = single_metric_id(args)?;
                Ok(lookup_metric(args.root(), &id).unwrap_or(Value::Null))
            }),
        )
        .all(
            "lookupMetricDisplayName",
            ValueHelper::new(|args| {
                let id = single_metric_id(args)?;
                Ok(Value::String(lookup_metric_display_name(args.root(), &id)))
            }),
        )
        .all(
            "lookupMetricUnits",
            ValueHelper::new(|args| {
                let id = single_metric_id(args)?;
                Ok(Value::String(lookup_metric_units(args.root(), &id)))
            }),
        )
        .all("siValue", ValueHelper::new(|args| Ok(scaled_value(args, &SI_FACTORS))))
        .all("siUnits", ValueHelper::new(|args| Ok(scaled_units(args, &SI_FACTORS))))
        .all("iecValue", ValueHelper::new(|args| Ok(scaled_value(args, &IEC_FACTORS))))
        .all("iecUnits", ValueHelper::new(|args| Ok(scaled_units(args, &IEC_FACTORS))))
        .all(
            "customUnits",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                let value = args.param(0).as_f64();
                let units = render_value(args.param(1));
                Ok(Value::String(custom_units(value, &units)))
            }),
        )
        .all(
            "percentToBar",
            ValueHelper::new(|args| Ok(Value::String(percent_to_bar(to_number(args.param(0)))))),
        )
        .all(
            "padLeft",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                Ok(Value::String(pad_left_value(args.param(0), args.width(1))))
            }),
        )
        .all(
            "padLeftBlock",
            BlockHelper::new(|body, args| {
                args.expect_params(1)?;
                Ok(pad_left_block(body, args.width(0)))
            }),
        )
        .all(
            "padRight",
            ValueHelper::new(|args| {
                args.expect_params(2)?;
                Ok(Value::String(pad_right_value(args.param(0), args.width(1))))
            }),
        )
        .all(
            "padRightBlock",
            BlockHelper::new(|body, args| {
                args.expect_params(1)?;
                Ok(pad_right_block(body, args.width(0)))
            }),
        )
        .all(
            "csvEscape",
            ValueHelper::new(|args| {
                args.expect_params(1)?;
                Ok(Value::String(csv_escape_value(args.param(0))))
            }),
        )
        .all(
            "csvEscapeBlock",
            BlockHelper::new(|body, _| Ok(csv_escape_block(body))),
        )
        .all(
            "computeColor",
            ValueHelper::new(|args| {
                args.expect_params(1)?;
                let colors = args.root().get("colorData").map(ColorSpec::from_value);
                let name = render_value(args.param(0));
                Ok(Value::String(compute_color(colors.as_ref(), &name).to_string()))
            }),
        )
}

/// Add the report helpers and after-render hooks to an engine
pub fn install(engine: &mut ReportEngine) {
    engine.register_helpers(&report_helpers());

    engine.after_render(|engine, host, data| {
        if engine.has_partial(TITLE_TEMPLATE, Some(Format::Html)) {
            let title = engine.render(TITLE_TEMPLATE, Format::Html, data)?;
            host.set_title(&title);
        }
        Ok(())
    });

    engine.after_render(|_, host, data| {
        if let Some(colors) = data.get("colorData") {
            let rules = css_color_rules(&ColorSpec::from_value(colors));
            debug!("inserting {} color rules", rules.len());
            for rule in rules {
                host.insert_css_rule(&rule);
            }
        }
        Ok(())
    });

    engine.after_render(|_, host, data| {
        if let Some(radar) = make_radar_data(data) {
            for rule in radar.legend_rules() {
                host.insert_css_rule(&rule);
            }
        }
        Ok(())
    });
}
