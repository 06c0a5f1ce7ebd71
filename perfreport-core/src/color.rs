//! Hierarchical HSL color resolution
//!
//! A color table is a tree keyed by path segment. Leaves are HSL deltas
//! `[h, s, l]`; inner levels may carry a `"default"` delta. Resolving a
//! dotted class name such as `"cpu.vector"` adds up the deltas met along
//! the path.
//!
//! Global invariants enforced:
//! - Resolution never mutates the table; every merge yields a new triple
//! - Hue stays within [0, 360], saturation and lightness within [0, 100]
//! - Unresolvable names render as black

use crate::util::to_number_or_zero;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Hue (degrees), saturation and lightness (percent)
pub type Hsl = [f64; 3];

const DEFAULT_KEY: &str = "default";

/// One node of a color table
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpec {
    Hsl(Hsl),
    Group(BTreeMap<String, ColorSpec>),
}

impl ColorSpec {
    /// Build a color table from report JSON. Arrays become HSL triples
    /// (missing or non-numeric components are 0), objects become groups and
    /// anything else an empty group.
    pub fn from_value(value: &Value) -> ColorSpec {
        match value {
            Value::Array(items) => {
                let mut hsl = [0.0; 3];
                for (slot, item) in hsl.iter_mut().zip(items) {
                    *slot = to_number_or_zero(item);
                }
                ColorSpec::Hsl(hsl)
            }
            Value::Object(map) => ColorSpec::Group(
                map.iter()
                    .map(|(key, child)| (key.clone(), ColorSpec::from_value(child)))
                    .collect(),
            ),
            _ => ColorSpec::Group(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ColorSpec> {
        match self {
            ColorSpec::Group(children) => children.get(key),
            ColorSpec::Hsl(_) => None,
        }
    }

    /// The `"default"` delta of a group, zero when there is none
    fn default_delta(&self) -> Hsl {
        match self.get(DEFAULT_KEY) {
            Some(ColorSpec::Hsl(hsl)) => *hsl,
            _ => [0.0; 3],
        }
    }

    /// Resolve a dotted class name to its composed HSL value
    pub fn resolve(&self, name: &str) -> Option<Hsl> {
        if let Some(ColorSpec::Hsl(hsl)) = self.get(name) {
            return Some(*hsl);
        }

        let mut color = [0.0; 3];
        let mut current = self;
        for segment in name.split('.') {
            current = current.get(segment)?;
            let delta = match current {
                ColorSpec::Hsl(hsl) => *hsl,
                ColorSpec::Group(_) => current.default_delta(),
            };
            color = merge_color(&color, &delta);
        }
        Some(color)
    }
}

/// An sRGB color as rendered into CSS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.0, self.1, self.2)
    }
}

/// Add two HSL deltas, clamping the result to the valid ranges
pub fn merge_color(c1: &Hsl, c2: &Hsl) -> Hsl {
    [
        (c1[0] + c2[0]).clamp(0.0, 360.0),
        (c1[1] + c2[1]).clamp(0.0, 100.0),
        (c1[2] + c2[2]).clamp(0.0, 100.0),
    ]
}

/// Color for a class name, black when the name does not resolve
pub fn compute_color(color_data: Option<&ColorSpec>, name: &str) -> Rgb {
    color_data
        .and_then(|table| table.resolve(name))
        .map(|[h, s, l]| hsl_to_rgb(h / 360.0, s / 100.0, l / 100.0))
        .unwrap_or(Rgb::BLACK)
}

fn hue_to_rgb(p: f64, q: f64, t: f64) -> f64 {
    let mut t = t;
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn to_channel(v: f64) -> u8 {
    // single precision first, matching the browser-side chart colors
    let scaled = f64::from(v as f32) * 255.0;
    (scaled + 0.5).floor().clamp(0.0, 255.0) as u8
}

/// Convert HSL components in [0, 1] to RGB
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    Rgb(
        to_channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
        to_channel(hue_to_rgb(p, q, h)),
        to_channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
    )
}

/// CSS rules coloring every class named in a color table, both as text
/// color and as the background of bars
///
/// Nested levels inherit the merged defaults of their parents; a level's
/// own `"default"` entry styles the level's class name itself.
pub fn css_color_rules(color_data: &ColorSpec) -> Vec<String> {
    let mut rules = Vec::new();
    collect_rules(color_data, None, [0.0; 3], &mut rules);
    rules
}

fn collect_rules(spec: &ColorSpec, name: Option<&str>, inherited: Hsl, rules: &mut Vec<String>) {
    match spec {
        ColorSpec::Hsl(_) => {
            let Some(name) = name else {
                return;
            };
            let [h, s, l] = inherited;
            let rgb = hsl_to_rgb(h / 360.0, s / 100.0, l / 100.0);
            rules.push(format!("[class='{}'] {{ color : {}; }}", name, rgb));
            rules.push(format!(
                "[class='bar'] [class='{}'] {{ background-color : {}; }}",
                name, rgb
            ));
        }
        ColorSpec::Group(children) => {
            let base = merge_color(&inherited, &spec.default_delta());
            for (key, child) in children {
                if key == DEFAULT_KEY {
                    collect_rules(child, name, base, rules);
                    continue;
                }
                let child_name = match name {
                    Some(parent) => format!("{}.{}", parent, key),
                    None => key.clone(),
                };
                let delta = match child {
                    ColorSpec::Hsl(hsl) => *hsl,
                    ColorSpec::Group(_) => [0.0; 3],
                };
                collect_rules(child, Some(&child_name), merge_color(&base, &delta), rules);
            }
        }
    }
}
