//! Radar chart data for the report summary
//!
//! Each visible summary row becomes one axis. The chart is only drawn with
//! three or more axes.

use crate::color::{compute_color, ColorSpec};
use crate::metrics::{is_visible, lookup_metric, MetricReference};
use crate::util::{lookup, to_bool, to_display_string, to_number};
use serde::Serialize;
use serde_json::Value;

/// Element id of the radar chart in report pages
pub const RADAR_ELEMENT: &str = "time_radar";

const MIN_AXES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarOptions {
    pub w: u32,
    pub h: u32,
    pub factor: f64,
    pub font_size: u32,
    pub radius: f64,
    pub opacity_area: f64,
    pub max_value: f64,
    pub color: String,
}

impl Default for RadarOptions {
    fn default() -> Self {
        RadarOptions {
            w: 200,
            h: 200,
            factor: 0.7,
            font_size: 16,
            radius: 0.0,
            opacity_area: 0.64,
            max_value: 100.0,
            color: "#bb58d6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarAxis {
    pub axis: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarData {
    pub data: Vec<RadarAxis>,
    pub axis_colors: Vec<String>,
    pub max_axis: Option<usize>,
    pub options: RadarOptions,
}

impl RadarData {
    /// CSS rules coloring each axis label of the chart legend
    pub fn legend_rules(&self) -> Vec<String> {
        self.axis_colors
            .iter()
            .enumerate()
            .map(|(i, color)| format!("#{} .legend_axis{}{{ fill: {}}}", RADAR_ELEMENT, i, color))
            .collect()
    }
}

/// Build radar data from `summaryData.rows` of the render context
///
/// The chart takes the color of the class named by the `primaryBound`
/// path when one is given, otherwise the color of the largest axis.
pub fn make_radar_data(root: &Value) -> Option<RadarData> {
    let rows = root.get("summaryData")?.get("rows")?.as_array()?;
    let colors = root.get("colorData").map(ColorSpec::from_value);

    let mut radar = RadarData {
        data: Vec::new(),
        axis_colors: Vec::new(),
        max_axis: None,
        options: RadarOptions::default(),
    };
    let mut max_value = f64::NEG_INFINITY;

    for row in rows.iter().filter(|row| is_visible(row, root)) {
        let reference = MetricReference::from_value(row);
        let value = reference
            .metric_id
            .as_deref()
            .and_then(|id| lookup_metric(root, id))
            .unwrap_or(Value::Null);

        let numeric = to_number(&value);
        if radar.max_axis.is_none() || numeric > max_value {
            radar.max_axis = Some(radar.data.len());
            max_value = numeric;
        }

        let color_name = reference.color_name.as_deref().unwrap_or_default();
        radar
            .axis_colors
            .push(compute_color(colors.as_ref(), color_name).to_string());
        radar.data.push(RadarAxis {
            axis: reference.chart_label.or(reference.heading).unwrap_or_default(),
            value,
        });
    }

    // A primary bound that names nothing keeps the default color
    let primary_bound = root
        .get("summaryData")
        .and_then(|summary| summary.get("primaryBound"))
        .filter(|path| to_bool(path));

    if let Some(path) = primary_bound {
        let bound = root
            .get("data")
            .and_then(|data| lookup(data, &to_display_string(path)))
            .filter(|bound| to_bool(bound));
        if let Some(bound) = bound {
            radar.options.color =
                compute_color(colors.as_ref(), &to_display_string(bound)).to_string();
        }
    } else if let Some(color) = radar.max_axis.and_then(|i| radar.axis_colors.get(i)) {
        radar.options.color = color.clone();
    }

    (radar.data.len() >= MIN_AXES).then_some(radar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(primary_bound: Option<&str>) -> Value {
        json!({
            "metricData": {
                "compute": {"value": "summary.compute"},
                "mpi": {"value": "summary.mpi"},
                "io": {"value": "summary.io"}
            },
            "data": {
                "summary": {"compute": 70, "mpi": 20, "io": 10},
                "bound": "time.mpi"
            },
            "colorData": {
                "time": {"default": [0, 50, 50], "compute": [120, 0, 0], "mpi": [240, 0, 0]}
            },
            "summaryData": {
                "primaryBound": primary_bound,
                "rows": [
                    {"metricId": "compute", "heading": "Compute", "colorName": "time.compute"},
                    {"metricId": "mpi", "chartLabel": "MPI", "heading": "MPI time", "colorName": "time.mpi"},
                    {"metricId": "io", "heading": "I/O", "colorName": "time.io"}
                ]
            }
        })
    }

    #[test]
    fn test_radar_axes_and_colors() {
        let radar = make_radar_data(&context(None)).unwrap();
        let labels: Vec<&str> = radar.data.iter().map(|a| a.axis.as_str()).collect();
        assert_eq!(labels, vec!["Compute", "MPI", "I/O"]);
        assert_eq!(radar.max_axis, Some(0));
        assert_eq!(radar.axis_colors[0], "rgb(64, 191, 64)");
        assert_eq!(radar.axis_colors[2], "rgb(0, 0, 0)");
        assert_eq!(radar.options.color, "rgb(64, 191, 64)");
    }

    #[test]
    fn test_primary_bound_sets_chart_color() {
        let radar = make_radar_data(&context(Some("bound"))).unwrap();
        assert_eq!(radar.options.color, "rgb(64, 64, 191)");
    }

    #[test]
    fn test_unresolved_primary_bound_keeps_default_color() {
        let radar = make_radar_data(&context(Some("summary.missing"))).unwrap();
        assert_eq!(radar.options.color, "#bb58d6");
    }

    #[test]
    fn test_needs_three_axes() {
        let mut ctx = context(None);
        ctx["summaryData"]["rows"][2]["visible"] = json!(false);
        assert!(make_radar_data(&ctx).is_none());
    }

    #[test]
    fn test_legend_rules() {
        let radar = make_radar_data(&context(None)).unwrap();
        assert_eq!(
            radar.legend_rules()[1],
            "#time_radar .legend_axis1{ fill: rgb(64, 64, 191)}"
        );
    }
}
