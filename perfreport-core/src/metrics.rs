//! Metric lookup and normalisation
//!
//! The render context carries `metricData` (definitions keyed by metric
//! id) and `data` (the measured values). A definition's `value` is a
//! dotted path into `data`.
//!
//! Global invariants enforced:
//! - References sharing a group are scaled against one group maximum
//! - Group maxima start from 0 and include every min, mean, max and
//!   maxBarValue seen for the group
//! - Non-finite values are null and never take part in arithmetic
//! - No division by a zero maximum: present values scale to 0 instead

use crate::util::{is_metric_value_valid, lookup, to_bool, to_display_string, to_number};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Static description of a metric, as found under `metricData`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDefinition {
    /// Dotted path into the report `data`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetricDefinition {
    pub fn from_value(value: &Value) -> Option<MetricDefinition> {
        let mut fields = value.as_object()?.clone();
        Some(MetricDefinition {
            value: take_string(&mut fields, "value"),
            display_name: take_string(&mut fields, "displayName"),
            units: take_string(&mut fields, "units"),
            extra: fields,
        })
    }
}

/// One displayed row referring to a metric
///
/// Fields the normaliser does not know about are kept in `extra` and
/// handed back to the template untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bar_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MetricReference {
    /// Read a reference from a template value. Non-object values yield an
    /// empty reference.
    pub fn from_value(value: &Value) -> MetricReference {
        let Some(fields) = value.as_object() else {
            return MetricReference::default();
        };
        let mut fields = fields.clone();

        let group = fields
            .remove("group")
            .filter(|g| !g.is_null())
            .map(|g| to_display_string(&g));
        let max_bar_value = fields
            .remove("maxBarValue")
            .filter(|v| !v.is_null())
            .map(|v| to_number(&v))
            .filter(|v| !v.is_nan());

        MetricReference {
            metric_id: take_string(&mut fields, "metricId"),
            group,
            max_bar_value,
            chart_label: take_string(&mut fields, "chartLabel"),
            heading: take_string(&mut fields, "heading"),
            color_name: take_string(&mut fields, "colorName"),
            extra: fields,
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(to_display_string(&other)),
    }
}

/// Statistics for one metric. Absent or non-finite fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricValue {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
}

fn finite(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

impl MetricValue {
    /// A bare number is a mean on its own; an object carries the four
    /// statistics
    pub fn from_value(value: &Value) -> MetricValue {
        match value {
            Value::Object(fields) => MetricValue {
                mean: finite(fields.get("mean")),
                min: finite(fields.get("min")),
                max: finite(fields.get("max")),
                stdev: finite(fields.get("stdev")),
            },
            other => MetricValue {
                mean: finite(Some(other)),
                ..MetricValue::default()
            },
        }
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> MetricValue {
        MetricValue {
            mean: self.mean.map(&f),
            min: self.min.map(&f),
            max: self.max.map(&f),
            stdev: self.stdev.map(&f),
        }
    }

    /// Percentage of `maximum`. A zero or non-finite maximum maps present
    /// values to 0.
    fn scale_to(&self, maximum: f64) -> MetricValue {
        if maximum == 0.0 || !maximum.is_finite() {
            self.map(|_| 0.0)
        } else {
            self.map(|v| 100.0 * v / maximum)
        }
    }
}

/// A reference with its definition and value resolved, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMetric {
    #[serde(flatten)]
    pub reference: MetricReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub def: Option<MetricDefinition>,
    pub value: MetricValue,
    pub normalised_value: MetricValue,
    pub no_bar: bool,
}

/// Definition of a metric id from the root context's `metricData`
pub fn metric_definition(root: &Value, metric_id: &str) -> Option<MetricDefinition> {
    root.get("metricData")
        .and_then(|defs| defs.get(metric_id))
        .and_then(MetricDefinition::from_value)
}

fn definition_value<'a>(root: &'a Value, def: &MetricDefinition) -> Option<&'a Value> {
    let path = def.value.as_deref()?;
    lookup(root.get("data")?, path)
}

/// Raw value of a metric. Unwraps `{plain: ..}` and then `{value: ..}`
/// wrappers; `None` for unknown ids and definitions without a value path.
pub fn lookup_metric(root: &Value, metric_id: &str) -> Option<Value> {
    let def = metric_definition(root, metric_id)?;
    let mut value = definition_value(root, &def)?;
    if let Some(plain) = value.get("plain") {
        value = plain;
    }
    if let Some(inner) = value.get("value") {
        value = inner;
    }
    Some(value.clone())
}

pub fn lookup_metric_display_name(root: &Value, metric_id: &str) -> String {
    metric_definition(root, metric_id)
        .and_then(|def| def.display_name)
        .unwrap_or_default()
}

pub fn lookup_metric_units(root: &Value, metric_id: &str) -> String {
    metric_definition(root, metric_id)
        .and_then(|def| def.units)
        .unwrap_or_default()
}

fn visibility(flag: &Value, root: &Value) -> bool {
    match flag {
        Value::String(path) => lookup(root, path).is_some_and(is_metric_value_valid),
        other => to_bool(other),
    }
}

/// Whether a row is shown. `visible` wins over `hidden`; a string flag is
/// a dotted path into the root context naming a value that must be valid.
pub fn is_visible(row: &Value, root: &Value) -> bool {
    if let Some(visible) = row.get("visible") {
        return visibility(visible, root);
    }
    if let Some(hidden) = row.get("hidden") {
        return !visibility(hidden, root);
    }
    true
}

#[derive(Debug, Default, Clone, Copy)]
struct GroupStats {
    maximum: f64,
    members: usize,
}

/// Resolve and scale a list of metric references for display
///
/// Grouped references are expressed as a percentage of the largest value
/// seen in their group, ungrouped ones with a `maxBarValue` as a
/// percentage of it, and the rest keep their raw values.
pub fn normalise_metrics(references: &[Value], root: &Value) -> Vec<NormalizedMetric> {
    let mut groups: HashMap<String, GroupStats> = HashMap::new();

    let resolved: Vec<(MetricReference, Option<MetricDefinition>, MetricValue)> = references
        .iter()
        .map(|raw| {
            let mut reference = MetricReference::from_value(raw);
            for key in ["def", "value", "normalisedValue", "noBar"] {
                reference.extra.remove(key);
            }
            let def = reference.metric_id.as_deref().and_then(|id| {
                let def = metric_definition(root, id);
                if def.is_none() {
                    warn!("unknown metric: {}", id);
                }
                def
            });
            let value = def
                .as_ref()
                .and_then(|def| definition_value(root, def))
                .map(MetricValue::from_value)
                .unwrap_or_default();

            if let Some(group) = &reference.group {
                let stats = groups.entry(group.clone()).or_default();
                stats.maximum = [
                    value.min,
                    value.mean,
                    value.max,
                    reference.max_bar_value,
                ]
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .fold(stats.maximum, f64::max);
                stats.members += 1;
            }
            (reference, def, value)
        })
        .collect();

    resolved
        .into_iter()
        .map(|(reference, def, value)| {
            let group = reference.group.as_ref().and_then(|g| groups.get(g));
            let (normalised_value, no_bar) = match (group, reference.max_bar_value) {
                (Some(stats), _) => (value.scale_to(stats.maximum), stats.members <= 1),
                (None, Some(max_bar_value)) => (value.scale_to(max_bar_value), false),
                (None, None) => (value, false),
            };
            NormalizedMetric {
                reference,
                def,
                value,
                normalised_value,
                no_bar,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report() -> Value {
        json!({
            "metricData": {
                "cpu": {"value": "summary.cpu", "displayName": "CPU", "units": "%"},
                "mem": {"value": "summary.mem", "displayName": "Memory", "units": "bytes"},
                "io": {"value": "summary.io"},
                "wrapped": {"value": "summary.wrapped"},
                "blank": {"displayName": "No value"}
            },
            "data": {
                "summary": {
                    "cpu": 50,
                    "mem": {"mean": 100, "min": 20, "max": 80, "stdev": null},
                    "io": {"mean": 0},
                    "wrapped": {"plain": {"value": 7}}
                }
            },
            "flags": {"zero": 0, "empty": null}
        })
    }

    #[test]
    fn test_group_normalisation() {
        let root = report();
        let refs = vec![
            json!({"metricId": "cpu", "group": "g"}),
            json!({"metricId": "mem", "group": "g"}),
        ];
        let metrics = normalise_metrics(&refs, &root);
        assert_eq!(metrics[0].normalised_value.mean, Some(50.0));
        assert_eq!(metrics[1].normalised_value.mean, Some(100.0));
        assert_eq!(metrics[1].normalised_value.min, Some(20.0));
        assert_eq!(metrics[1].normalised_value.stdev, None);
        assert!(!metrics[0].no_bar);
    }

    #[test]
    fn test_lone_group_member_has_no_bar() {
        let root = report();
        let metrics = normalise_metrics(&[json!({"metricId": "cpu", "group": "solo"})], &root);
        assert!(metrics[0].no_bar);
        assert_eq!(metrics[0].normalised_value.mean, Some(100.0));
    }

    #[test]
    fn test_max_bar_value_scaling() {
        let root = report();
        let refs = vec![
            json!({"metricId": "cpu", "maxBarValue": 200}),
            json!({"metricId": "cpu", "group": "g", "maxBarValue": 500}),
            json!({"metricId": "cpu"}),
        ];
        let metrics = normalise_metrics(&refs, &root);
        assert_eq!(metrics[0].normalised_value.mean, Some(25.0));
        assert_eq!(metrics[1].normalised_value.mean, Some(10.0));
        assert_eq!(metrics[2].normalised_value.mean, Some(50.0));
    }

    #[test]
    fn test_zero_group_maximum() {
        let root = report();
        let refs = vec![
            json!({"metricId": "io", "group": "z"}),
            json!({"metricId": "io", "group": "z"}),
        ];
        let metrics = normalise_metrics(&refs, &root);
        assert_eq!(metrics[0].normalised_value.mean, Some(0.0));
        assert_eq!(metrics[0].normalised_value.max, None);
    }

    #[test]
    fn test_unknown_metric_has_no_value() {
        let root = report();
        let metrics = normalise_metrics(&[json!({"metricId": "nope", "group": "g"})], &root);
        assert_eq!(metrics[0].def, None);
        assert_eq!(metrics[0].value, MetricValue::default());
    }

    #[test]
    fn test_normalised_metric_serialises_for_templates() {
        let root = report();
        let metrics = normalise_metrics(&[json!({"metricId": "cpu", "custom": "kept"})], &root);
        let json = serde_json::to_value(&metrics[0]).unwrap();
        assert_eq!(json["metricId"], "cpu");
        assert_eq!(json["custom"], "kept");
        assert_eq!(json["def"]["displayName"], "CPU");
        assert_eq!(json["value"]["mean"], 50.0);
        assert_eq!(json["normalisedValue"]["mean"], 50.0);
        assert_eq!(json["noBar"], false);
    }

    #[test]
    fn test_lookup_metric_unwraps() {
        let root = report();
        assert_eq!(lookup_metric(&root, "cpu"), Some(json!(50)));
        assert_eq!(lookup_metric(&root, "wrapped"), Some(json!(7)));
        assert_eq!(lookup_metric(&root, "blank"), None);
        assert_eq!(lookup_metric(&root, "missing"), None);
        assert_eq!(lookup_metric_display_name(&root, "mem"), "Memory");
        assert_eq!(lookup_metric_units(&root, "io"), "");
    }

    #[test]
    fn test_is_visible() {
        let root = report();
        assert!(is_visible(&json!({}), &root));
        assert!(is_visible(&json!({"visible": "flags.zero"}), &root));
        assert!(!is_visible(&json!({"visible": "flags.empty"}), &root));
        assert!(!is_visible(&json!({"visible": "false"}), &root));
        assert!(!is_visible(&json!({"hidden": true}), &root));
        assert!(is_visible(&json!({"hidden": "flags.empty"}), &root));
        assert!(is_visible(&json!({"visible": true, "hidden": true}), &root));
    }
}
