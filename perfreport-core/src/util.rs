//! Small helpers shared by the formatter, normalizer and template helpers
//!
//! Report data arrives as loosely typed JSON, so most of these functions
//! coerce values the way the report templates expect: missing and null
//! behave alike, numeric strings count as numbers and stringified falsy
//! values ("false", "0", "null", ...) count as false.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

/// True for JSON objects and arrays (anything that can be indexed by a path segment)
pub fn is_object(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

pub fn is_array(value: &Value) -> bool {
    value.is_array()
}

pub fn is_string(value: &Value) -> bool {
    value.is_string()
}

/// Look up a member using dot notation, e.g. `"summary.cpu.mean"`
///
/// An empty path returns the value itself. Array elements are addressed by
/// their index (`"rows.0.heading"`). Returns `None` as soon as a segment is
/// missing or a non-container value is indexed.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Convert a value to a boolean, tolerating falsy values that have been
/// converted to strings
pub fn to_bool(value: &Value) -> bool {
    const FALSY_STRINGS: &[&str] = &["", "false", "0", "null", "undefined", "NaN"];

    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !FALSY_STRINGS.contains(&s.as_str()),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Like [`to_bool`], except that a zero metric value still counts as valid
pub fn is_metric_value_valid(value: &Value) -> bool {
    match value {
        Value::Number(n) if n.as_f64() == Some(0.0) => true,
        Value::String(s) if s == "0" => true,
        _ => to_bool(value),
    }
}

/// Numeric coercion used by the template helpers. Returns NaN when the
/// value has no numeric reading.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Coerce to a number, with NaN and infinities mapped to zero
pub fn to_number_or_zero(value: &Value) -> f64 {
    let n = to_number(value);
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// A finite number, or `None` for null, empty strings and anything that is
/// not numeric
pub fn finite_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        _ => Some(to_number(value)).filter(|n| n.is_finite()),
    }
}

/// JSON number for a helper result. Integral values are stored as integers
/// so templates render `2` rather than `2.0`; non-finite values become null.
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        // -0.0 collapses to 0 here as well
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// Shortest decimal rendering of a number, switching to exponent notation
/// outside `[1e-6, 1e21)` like template output does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let s = format!("{:e}", n);
        return match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => s,
        };
    }
    format!("{}", n)
}

/// String conversion of a value as it appears when interpolated into text
pub fn to_display_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n
            .as_f64()
            .map(number_to_string)
            .unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_display_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Strict equality: numbers compare by value regardless of their JSON
/// representation, everything else structurally
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Relational comparison: strings compare lexically, everything else
/// numerically. `None` when either side is not comparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// Find the first element whose `key_path` equals `value`, returning its
/// `result_path` (the element itself for an empty path)
pub fn find_by_path<'a>(
    items: &'a [Value],
    key_path: &str,
    value: &Value,
    result_path: &str,
) -> Option<&'a Value> {
    items
        .iter()
        .find(|item| lookup(item, key_path).is_some_and(|found| strict_equals(found, value)))
        .and_then(|item| lookup(item, result_path))
}

/// Remove every element matching `predicate`, returning the removed
/// elements in their original order
pub fn remove_where<T, F>(items: &mut Vec<T>, mut predicate: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    let mut removed = Vec::new();
    let mut kept = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if predicate(&item) {
            removed.push(item);
        } else {
            kept.push(item);
        }
    }
    *items = kept;
    removed
}

/// Replace every occurrence of `from`. An empty pattern inserts `with`
/// between characters.
pub fn replace_all(input: &str, from: &str, with: &str) -> String {
    if from.is_empty() {
        return input
            .chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(with);
    }
    input.replace(from, with)
}

fn cdata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap())
}

/// Remove CDATA wrappers from a string, keeping their content
pub fn remove_cdata(s: &str) -> String {
    cdata_regex().replace_all(s, "$1").into_owned()
}

/// Generates ids suitable for the HTML `id` attribute, unique per registry
///
/// Asking twice for the same name yields `name`, then `name2`, `name3`...
/// Trailing digits are stripped from the input so a generated suffix can
/// never collide with a literal one.
#[derive(Debug, Default, Clone)]
pub struct IdRegistry {
    counters: HashMap<String, u32>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_id(&mut self, name: &str) -> String {
        let cleaned: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            .collect::<String>()
            .to_lowercase();
        let mut id = cleaned.trim_end_matches(|c: char| c.is_ascii_digit()).to_string();

        if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
            id.insert(0, 'x');
        }

        match self.counters.get_mut(&id) {
            Some(counter) => {
                *counter += 1;
                format!("{}{}", id, counter)
            }
            None => {
                self.counters.insert(id.clone(), 1);
                id
            }
        }
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_predicates() {
        assert!(is_object(&json!({})));
        assert!(is_object(&json!([])));
        assert!(!is_object(&json!("x")));
        assert!(is_array(&json!([1])));
        assert!(!is_array(&json!({})));
        assert!(is_string(&json!("")));
        assert!(!is_string(&json!(null)));
    }

    #[test]
    fn test_lookup_dotted_paths() {
        let data = json!({"a": {"b": [10, {"c": "deep"}]}, "n": null});
        assert_eq!(lookup(&data, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup(&data, "a.b.1.c"), Some(&json!("deep")));
        assert_eq!(lookup(&data, ""), Some(&data));
        assert_eq!(lookup(&data, "n"), Some(&Value::Null));
        assert_eq!(lookup(&data, "n.x"), None);
        assert_eq!(lookup(&data, "a.missing.c"), None);
        assert_eq!(lookup(&data, "a.b.0.x"), None);
    }

    #[test]
    fn test_to_bool_stringified_falsy() {
        for falsy in ["", "false", "0", "null", "undefined", "NaN"] {
            assert!(!to_bool(&json!(falsy)), "{:?} should be falsy", falsy);
        }
        assert!(!to_bool(&json!(0)));
        assert!(!to_bool(&Value::Null));
        assert!(to_bool(&json!("no")));
        assert!(to_bool(&json!(0.5)));
        assert!(to_bool(&json!({})));
    }

    #[test]
    fn test_metric_value_zero_is_valid() {
        assert!(is_metric_value_valid(&json!(0)));
        assert!(is_metric_value_valid(&json!("0")));
        assert!(is_metric_value_valid(&json!(12.5)));
        assert!(!is_metric_value_valid(&Value::Null));
        assert!(!is_metric_value_valid(&json!("null")));
    }

    #[test]
    fn test_number_value_integral() {
        assert_eq!(number_value(2.0), json!(2));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::INFINITY), Value::Null);
    }

    #[test]
    fn test_number_to_string_shapes() {
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(100.0), "100");
        assert_eq!(number_to_string(0.000123), "0.000123");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(1e21), "1e+21");
    }

    #[test]
    fn test_find_by_path() {
        let rows = vec![
            json!({"id": "a", "info": {"label": "first"}}),
            json!({"id": "b", "info": {"label": "second"}}),
        ];
        assert_eq!(
            find_by_path(&rows, "id", &json!("b"), "info.label"),
            Some(&json!("second"))
        );
        assert_eq!(find_by_path(&rows, "id", &json!("z"), ""), None);
    }

    #[test]
    fn test_remove_where_keeps_order() {
        let mut values = vec![1, 2, 3, 4, 5, 6];
        let removed = remove_where(&mut values, |v| v % 2 == 0);
        assert_eq!(removed, vec![2, 4, 6]);
        assert_eq!(values, vec![1, 3, 5]);
    }

    #[test]
    fn test_replace_all_empty_pattern() {
        assert_eq!(replace_all("a/b/c", "/", "-"), "a-b-c");
        assert_eq!(replace_all("abc", "", "-"), "a-b-c");
    }

    #[test]
    fn test_remove_cdata() {
        assert_eq!(
            remove_cdata("<![CDATA[{\"a\": 1}]]>"),
            "{\"a\": 1}"
        );
        assert_eq!(remove_cdata("plain"), "plain");
    }

    #[test]
    fn test_make_id_uniqueness() {
        let mut ids = IdRegistry::new();
        assert_eq!(ids.make_id("CPU Time"), "cputime");
        assert_eq!(ids.make_id("cpu time"), "cputime2");
        assert_eq!(ids.make_id("name2"), "name");
        assert_eq!(ids.make_id("name"), "name2");
        assert_eq!(ids.make_id("42 things"), "x42things");
        assert_eq!(ids.make_id("9"), "x");
    }
}
