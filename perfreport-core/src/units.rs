//! Number and unit formatting for report values
//!
//! Global invariants enforced:
//! - Absent and non-finite inputs render as [`UNSUPPORTED`], never as "NaN"
//! - Decimal places shrink as magnitude grows (2, then 1, then 0)
//! - Magnitude scaling picks the largest factor not exceeding |value|

use crate::util::{number_to_string, to_display_string};
use serde_json::Value;

/// Marker rendered in place of values the report cannot display
pub const UNSUPPORTED: &str = "not supported ";

/// A magnitude divisor and the prefix written in front of the unit symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factor {
    pub factor: f64,
    pub prefix: &'static str,
}

impl Factor {
    pub const UNIT: Factor = Factor {
        factor: 1.0,
        prefix: "",
    };
}

/// Decimal prefixes, largest first
pub const SI_FACTORS: [Factor; 4] = [
    Factor {
        factor: 1e9,
        prefix: "G",
    },
    Factor {
        factor: 1e6,
        prefix: "M",
    },
    Factor {
        factor: 1e3,
        prefix: "k",
    },
    Factor::UNIT,
];

/// Binary prefixes, largest first
pub const IEC_FACTORS: [Factor; 4] = [
    Factor {
        factor: 1_073_741_824.0,
        prefix: "Gi",
    },
    Factor {
        factor: 1_048_576.0,
        prefix: "Mi",
    },
    Factor {
        factor: 1024.0,
        prefix: "ki",
    },
    Factor::UNIT,
];

/// Unit naming for [`factor_units`]. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOptions {
    pub symbol: Option<String>,
    pub units: Option<String>,
}

impl UnitOptions {
    pub fn symbol(symbol: &str) -> Self {
        UnitOptions {
            symbol: Some(symbol.to_string()),
            units: None,
        }
    }

    pub fn units(units: &str) -> Self {
        UnitOptions {
            symbol: None,
            units: Some(units.to_string()),
        }
    }
}

fn known_units(symbol: &str) -> Option<&'static str> {
    match symbol {
        "B" => Some("bytes"),
        "B/s" => Some("bytes/s"),
        _ => None,
    }
}

fn known_symbol(units: &str) -> Option<&'static str> {
    match units {
        "bytes" => Some("B"),
        "bytes/s" => Some("B/s"),
        _ => None,
    }
}

/// Exact decimal digits of a non-negative finite value, without the
/// decimal point, and the number of integer digits among them
///
/// 1100 fractional digits cover the longest expansion an `f64` has.
fn exact_digits(abs: f64) -> (Vec<u8>, usize) {
    let text = format!("{:.1100}", abs);
    match text.split_once('.') {
        Some((int, frac)) => {
            let mut digits = int.as_bytes().to_vec();
            digits.extend_from_slice(frac.as_bytes());
            (digits, int.len())
        }
        None => (text.as_bytes().to_vec(), text.len()),
    }
}

/// Keep the first `keep` digits, rounding half up on the digit after them.
/// A carry out of the first digit makes the result one digit longer.
fn round_half_up(digits: &[u8], keep: usize) -> Vec<u8> {
    let mut kept: Vec<u8> = digits.iter().copied().take(keep).collect();
    kept.resize(keep, b'0');

    if digits.get(keep).is_some_and(|&d| d >= b'5') {
        let mut carry = true;
        for digit in kept.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            kept.insert(0, b'1');
        }
    }
    kept
}

fn digits_to_string(digits: &[u8]) -> String {
    digits.iter().copied().map(char::from).collect()
}

/// Fixed-point rendering with ties rounded away from zero
///
/// Rounding is decided on the exact binary value: 0.015 is stored as
/// 0.01499.. and gives "0.01", while an exact tie such as 0.125 gives
/// "0.13". Magnitudes from 1e21 up use the plain number form.
pub fn to_fixed(value: f64, digits: usize) -> String {
    let digits = digits.min(100);
    if !value.is_finite() || value.abs() >= 1e21 {
        return number_to_string(value);
    }

    let (exact, int_len) = exact_digits(value.abs());
    let rounded = round_half_up(&exact, int_len + digits);
    let split = rounded.len() - digits;

    // -0.0 prints without a sign
    let sign = if value < 0.0 { "-" } else { "" };
    if digits == 0 {
        format!("{}{}", sign, digits_to_string(&rounded))
    } else {
        format!(
            "{}{}.{}",
            sign,
            digits_to_string(&rounded[..split]),
            digits_to_string(&rounded[split..])
        )
    }
}

/// Rendering with `precision` significant digits (clamped to 1..=21),
/// switching to exponent notation when the exponent is below -6 or at
/// least the precision
///
/// Of two equally close representations the larger one is chosen.
pub fn to_precision(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return number_to_string(value);
    }
    let precision = precision.clamp(1, 21);
    let sign = if value < 0.0 { "-" } else { "" };

    let (mantissa, exp) = if value == 0.0 {
        (vec![b'0'; precision], 0)
    } else {
        let (exact, int_len) = exact_digits(value.abs());
        let first = exact.iter().position(|&d| d != b'0').unwrap_or(0);
        let mut exp = int_len as i32 - 1 - first as i32;
        let mut mantissa = round_half_up(&exact[first..], precision);
        if mantissa.len() > precision {
            mantissa.truncate(precision);
            exp += 1;
        }
        (mantissa, exp)
    };

    if exp < -6 || exp >= precision as i32 {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        let mut text = digits_to_string(&mantissa[..1]);
        if precision > 1 {
            text.push('.');
            text.push_str(&digits_to_string(&mantissa[1..]));
        }
        format!("{}{}e{}{}", sign, text, exp_sign, exp.abs())
    } else if exp >= 0 {
        let split = exp as usize + 1;
        let int = digits_to_string(&mantissa[..split]);
        if split == precision {
            format!("{}{}", sign, int)
        } else {
            format!("{}{}.{}", sign, int, digits_to_string(&mantissa[split..]))
        }
    } else {
        let zeros = "0".repeat((-exp - 1) as usize);
        format!("{}0.{}{}", sign, zeros, digits_to_string(&mantissa))
    }
}

/// Fixed-point formatting with precision depending on magnitude:
/// no decimals from 100 up, one from 10 up, two below
pub fn format_number(value: Option<f64>) -> String {
    match value {
        Some(x) if x.is_finite() => {
            let abs = x.abs();
            let digits = if abs >= 100.0 {
                0
            } else if abs >= 10.0 {
                1
            } else {
                2
            };
            to_fixed(x, digits)
        }
        _ => UNSUPPORTED.to_string(),
    }
}

/// Six significant digits with trailing zeros removed, used when it is at
/// least as long as [`format_number`]'s output (i.e. carries at least as
/// much detail)
pub fn format_precise_number(value: Option<f64>) -> String {
    let formatted = format_number(value);
    let Some(x) = value.filter(|x| x.is_finite()) else {
        return formatted;
    };

    let rounded: f64 = to_precision(x, 6).parse().unwrap_or(x);
    let accurate = number_to_string(rounded);
    if accurate.chars().count() >= formatted.chars().count() {
        accurate
    } else {
        formatted
    }
}

/// First factor whose magnitude does not exceed |value|, or the last entry
pub fn choose_factor(value: f64, factors: &[Factor]) -> Factor {
    let abs = value.abs();
    factors
        .iter()
        .find(|f| abs >= f.factor)
        .or(factors.last())
        .copied()
        .unwrap_or(Factor::UNIT)
}

/// Value divided by its chosen factor; `None` passes through
pub fn factor_value(value: Option<f64>, factors: &[Factor]) -> Option<f64> {
    value.map(|v| v / choose_factor(v, factors).factor)
}

/// Unit label for a value scaled by [`factor_value`]
///
/// With a prefix the symbol is used (`MB`); without one the long units are
/// used (`bytes`).
pub fn factor_units(value: f64, factors: &[Factor], options: &UnitOptions) -> String {
    let given_symbol = options.symbol.as_deref().filter(|s| !s.is_empty());
    let given_units = options.units.as_deref().filter(|s| !s.is_empty());

    let symbol = given_symbol
        .or_else(|| given_units.and_then(known_symbol))
        .or(given_units)
        .unwrap_or("");
    let units = given_units
        .or_else(|| known_units(symbol))
        .or(Some(symbol).filter(|s| !s.is_empty()))
        .unwrap_or("");

    let prefix = choose_factor(value, factors).prefix;
    if prefix.is_empty() {
        units.to_string()
    } else {
        format!("{}{}", prefix, symbol)
    }
}

/// Percentage with one decimal; tiny positive values show as "<0.1"
pub fn percent(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if v > 0.0 && v < 0.1 {
                "<0.1".to_string()
            } else {
                to_fixed(v, 1)
            }
        }
        _ => UNSUPPORTED.to_string(),
    }
}

/// Width of a percentage bar, capped at 100
pub fn bar_width(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.min(100.0),
        _ => 0.0,
    }
}

/// Singular form of a unit for a value of exactly one, e.g. "calls/s" to
/// "call/s" and "passes" to "pass"
pub fn custom_units(value: Option<f64>, units: &str) -> String {
    if value != Some(1.0) {
        return units.to_string();
    }
    units
        .split('/')
        .map(|unit| {
            if unit.chars().count() == 1 {
                unit
            } else if let Some(stem) = unit.strip_suffix("ses") {
                // "passes" keeps one "s"
                &unit[..stem.len() + 1]
            } else if let Some(stem) = unit.strip_suffix('s') {
                stem
            } else {
                unit
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Text-mode bar for a 0-100 percentage, at most 20 characters wide
pub fn percent_to_bar(value: f64) -> String {
    let value = if value.is_nan() { 0.0 } else { value.max(0.0) };
    let segments = ((value / 10.0 + 0.5).floor()).min(20.0) as usize;

    let mut bar = String::from("|");
    bar.push_str(&"=".repeat(segments.saturating_sub(1)));
    if value > 0.0 {
        bar.push('|');
    }
    bar
}

fn pad_left(text: &str, width: usize) -> String {
    let padded = format!("{}{}", " ".repeat(width), text);
    let skip = padded.chars().count() - width;
    padded.chars().skip(skip).collect()
}

fn pad_right(text: &str, width: usize) -> String {
    format!("{}{}", text, " ".repeat(width))
        .chars()
        .take(width)
        .collect()
}

fn csv_escape(text: &str) -> String {
    let escaped = text.replace('"', "\"\"");
    if escaped.contains([',', ' ', '\n', '"']) {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

/// Right-align a value in a column of `width` characters, keeping the
/// rightmost characters when it does not fit
pub fn pad_left_value(value: &Value, width: usize) -> String {
    pad_left(&to_display_string(value), width)
}

/// [`pad_left_value`] applied to already rendered block content
pub fn pad_left_block(rendered: &str, width: usize) -> String {
    pad_left(rendered, width)
}

/// Left-align a value in a column of `width` characters, truncating it
/// when it does not fit
pub fn pad_right_value(value: &Value, width: usize) -> String {
    pad_right(&to_display_string(value), width)
}

pub fn pad_right_block(rendered: &str, width: usize) -> String {
    pad_right(rendered, width)
}

/// Quote a value for a CSV cell
pub fn csv_escape_value(value: &Value) -> String {
    csv_escape(&to_display_string(value))
}

pub fn csv_escape_block(rendered: &str) -> String {
    csv_escape(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number_precision_by_magnitude() {
        assert_eq!(format_number(Some(5.0)), "5.00");
        assert_eq!(format_number(Some(12.34)), "12.3");
        assert_eq!(format_number(Some(234.9)), "235");
        assert_eq!(format_number(Some(-234.9)), "-235");
        assert_eq!(format_number(Some(0.125)), "0.13");
        assert_eq!(format_number(Some(f64::NAN)), UNSUPPORTED);
        assert_eq!(format_number(None), UNSUPPORTED);
    }

    #[test]
    fn test_format_precise_number() {
        assert_eq!(format_precise_number(Some(1.23456789)), "1.23457");
        // "5" is shorter than "5.00"
        assert_eq!(format_precise_number(Some(5.0)), "5.00");
        assert_eq!(format_precise_number(Some(1234.5678)), "1234.57");
        assert_eq!(format_precise_number(None), UNSUPPORTED);
    }

    #[test]
    fn test_to_fixed_ties_round_up() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(-2.5, 0), "-3");
        assert_eq!(to_fixed(1.0, 2), "1.00");
        assert_eq!(to_fixed(-0.0, 1), "0.0");
        assert_eq!(to_fixed(0.05, 3), "0.050");
    }

    #[test]
    fn test_to_fixed_uses_exact_binary_value() {
        // stored slightly below the written tie
        assert_eq!(to_fixed(0.015, 2), "0.01");
        assert_eq!(to_fixed(10.35, 1), "10.3");
        assert_eq!(to_fixed(0.285, 2), "0.28");
        assert_eq!(to_fixed(0.35, 1), "0.3");
        // exact ties
        assert_eq!(to_fixed(0.125, 2), "0.13");
        assert_eq!(to_fixed(99.5, 0), "100");
        assert_eq!(to_fixed(-0.001, 2), "-0.00");
        assert_eq!(to_fixed(1e21, 2), "1e+21");
    }

    #[test]
    fn test_format_number_inexact_ties() {
        assert_eq!(format_number(Some(0.015)), "0.01");
        assert_eq!(format_number(Some(0.045)), "0.04");
        assert_eq!(format_number(Some(10.35)), "10.3");
        assert_eq!(percent(Some(0.35)), "0.3");
        assert_eq!(percent(Some(0.15)), "0.1");
    }

    #[test]
    fn test_to_precision_ties_round_up() {
        assert_eq!(to_precision(2.5, 1), "3");
        assert_eq!(to_precision(0.125, 2), "0.13");
        assert_eq!(to_precision(1000.125, 6), "1000.13");
        assert_eq!(to_precision(9.96, 2), "10");
        assert_eq!(to_precision(-2.5, 1), "-3");
        assert_eq!(to_precision(0.0, 3), "0.00");
        assert_eq!(format_precise_number(Some(12345.25)), "12345.3");
    }

    #[test]
    fn test_to_precision() {
        assert_eq!(to_precision(123.456, 4), "123.5");
        assert_eq!(to_precision(0.000123, 2), "0.00012");
        assert_eq!(to_precision(123456.0, 2), "1.2e+5");
        assert_eq!(to_precision(5.0, 0), "5");
        assert_eq!(to_precision(1.5e-7, 2), "1.5e-7");
    }

    #[test]
    fn test_si_scaling() {
        let factor = choose_factor(1_500_000.0, &SI_FACTORS);
        assert_eq!(factor.prefix, "M");
        assert_eq!(factor_value(Some(1_500_000.0), &SI_FACTORS), Some(1.5));
        assert_eq!(factor_value(None, &SI_FACTORS), None);
        assert_eq!(choose_factor(12.0, &SI_FACTORS).prefix, "");
        assert_eq!(choose_factor(-2048.0, &IEC_FACTORS).prefix, "ki");
    }

    #[test]
    fn test_factor_units_known_names() {
        assert_eq!(
            factor_units(1_500_000.0, &SI_FACTORS, &UnitOptions::units("bytes")),
            "MB"
        );
        assert_eq!(
            factor_units(12.0, &SI_FACTORS, &UnitOptions::symbol("B")),
            "bytes"
        );
        assert_eq!(
            factor_units(3.0 * 1_048_576.0, &IEC_FACTORS, &UnitOptions::symbol("B/s")),
            "MiB/s"
        );
        assert_eq!(
            factor_units(5000.0, &SI_FACTORS, &UnitOptions::units("calls")),
            "kcalls"
        );
        assert_eq!(factor_units(5.0, &SI_FACTORS, &UnitOptions::default()), "");
    }

    #[test]
    fn test_percent_and_bar_width() {
        assert_eq!(percent(Some(0.05)), "<0.1");
        assert_eq!(percent(Some(0.0)), "0.0");
        assert_eq!(percent(Some(42.26)), "42.3");
        assert_eq!(percent(None), UNSUPPORTED);
        assert_eq!(bar_width(Some(140.0)), 100.0);
        assert_eq!(bar_width(Some(40.0)), 40.0);
        assert_eq!(bar_width(None), 0.0);
    }

    #[test]
    fn test_custom_units_singular() {
        assert_eq!(custom_units(Some(1.0), "calls/s"), "call/s");
        assert_eq!(custom_units(Some(1.0), "passes"), "pass");
        assert_eq!(custom_units(Some(1.0), "B/s"), "B/s");
        assert_eq!(custom_units(Some(2.0), "calls/s"), "calls/s");
    }

    #[test]
    fn test_percent_to_bar() {
        assert_eq!(percent_to_bar(0.0), "|");
        assert_eq!(percent_to_bar(4.0), "||");
        assert_eq!(percent_to_bar(50.0), "|====|");
        assert_eq!(percent_to_bar(100.0), "|=========|");
        assert_eq!(percent_to_bar(500.0), "|===================|");
        assert_eq!(percent_to_bar(-3.0), "|");
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_left_value(&json!(42), 5), "   42");
        assert_eq!(pad_left_value(&json!("abcdef"), 3), "def");
        assert_eq!(pad_right_value(&json!("ab"), 4), "ab  ");
        assert_eq!(pad_right_block("abcdef", 3), "abc");
        assert_eq!(pad_left_block("x", 0), "");
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape_value(&json!("plain")), "plain");
        assert_eq!(csv_escape_value(&json!("a,b")), "\"a,b\"");
        assert_eq!(csv_escape_block("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape_value(&json!(1.5)), "1.5");
    }
}
