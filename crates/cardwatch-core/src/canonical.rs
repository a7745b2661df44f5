//! Value canonicalisation and dotted field paths.
//!
//! Proposals arrive from a language model, so the same fact can come back as
//! `95`, `95.0` or `"95"`, and objects can list their keys in any order.
//! Comparison always goes through [`canonicalize`] so that none of those
//! differences count as a change.
//!
//! # Rules
//!
//! - Object keys are sorted.
//! - Floats with no fractional part become integers.
//! - Strings are trimmed; strings that parse as a finite number become that number.
//! - Arrays keep their order (order is meaningful for reward tiers).

use std::fmt;

use serde_json::{Map, Number, Value};

/// Canonical form of a value, suitable for equality checks and stable printing.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() && !trimmed.is_empty() => match Number::from_f64(f) {
                    Some(n) => canonical_number(&n),
                    None => Value::String(trimmed.to_string()),
                },
                _ => Value::String(trimmed.to_string()),
            }
        }
        other => other.clone(),
    }
}

fn canonical_number(n: &Number) -> Value {
    if n.is_i64() || n.is_u64() {
        return Value::Number(n.clone());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::Number(Number::from(f as i64)),
        _ => Value::Number(n.clone()),
    }
}

/// True when two values are the same fact once canonicalised.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Canonical compact JSON text for a value.
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

// ── Field paths ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A dot-addressed location inside a record, e.g. `signup_bonus.amount` or
/// `rewards.0.rate`. The first segment is always a top-level key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a dotted path. Returns `None` for empty paths, empty segments, or
    /// a path whose first segment is numeric.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for (i, part) in path.split('.').enumerate() {
            if part.is_empty() {
                return None;
            }
            match part.parse::<usize>() {
                Ok(idx) if i > 0 => segments.push(Segment::Index(idx)),
                Ok(_) => return None,
                Err(_) => segments.push(Segment::Key(part.to_string())),
            }
        }
        Some(Self { segments })
    }

    /// The top-level field this path lives under.
    pub fn top(&self) -> &str {
        match &self.segments[0] {
            Segment::Key(k) => k,
            Segment::Index(_) => unreachable!("first segment is always a key"),
        }
    }

    /// Segments below the top-level field.
    pub fn rest(&self) -> &[Segment] {
        &self.segments[1..]
    }

    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match seg {
                Segment::Key(k) => f.write_str(k)?,
                Segment::Index(idx) => write!(f, "{idx}")?,
            }
        }
        Ok(())
    }
}

/// Resolve a path against a value.
pub fn lookup_path<'a>(root: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = root;
    for seg in &path.segments {
        current = match seg {
            Segment::Key(k) => current.get(k.as_str())?,
            Segment::Index(idx) => current.get(*idx)?,
        };
    }
    Some(current)
}

/// Set `value` at `rest` below `root`, creating intermediate objects for
/// missing keys. Returns `false` when the path cannot be created, e.g. it
/// indexes past the end of an array or walks through a scalar.
pub fn assign_path(root: &mut Value, rest: &[Segment], value: Value) -> bool {
    let Some((head, tail)) = rest.split_first() else {
        *root = value;
        return true;
    };
    match head {
        Segment::Key(k) => {
            if root.is_null() {
                *root = Value::Object(Map::new());
            }
            let Some(map) = root.as_object_mut() else {
                return false;
            };
            let slot = map.entry(k.clone()).or_insert(Value::Null);
            assign_path(slot, tail, value)
        }
        Segment::Index(idx) => {
            let Some(items) = root.as_array_mut() else {
                return false;
            };
            match items.get_mut(*idx) {
                Some(slot) => assign_path(slot, tail, value),
                None => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reordered_objects_are_equal() {
        let a = json!({"category": "dining", "rate": 4});
        let b = json!({"rate": 4, "category": "dining"});
        assert!(values_equal(&a, &b));
        assert_eq!(canonical_string(&a), canonical_string(&b));
    }

    #[test]
    fn numeric_forms_are_equal() {
        assert!(values_equal(&json!(95), &json!(95.0)));
        assert!(values_equal(&json!(95), &json!("95")));
        assert!(values_equal(&json!(" 95 "), &json!(95)));
        assert!(!values_equal(&json!(95), &json!(250)));
        assert!(values_equal(&json!(1.5), &json!("1.5")));
    }

    #[test]
    fn strings_are_trimmed_but_case_sensitive() {
        assert!(values_equal(&json!("Visa "), &json!("Visa")));
        assert!(!values_equal(&json!("visa"), &json!("Visa")));
    }

    #[test]
    fn array_order_is_significant() {
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(values_equal(
            &json!([{"a": 1, "b": 2}]),
            &json!([{"b": 2.0, "a": "1"}])
        ));
    }

    #[test]
    fn null_differs_from_missing_value_types() {
        assert!(!values_equal(&json!(null), &json!(0)));
        assert!(!values_equal(&json!(null), &json!("")));
    }

    #[test]
    fn parse_paths() {
        let p = FieldPath::parse("signup_bonus.amount").unwrap();
        assert_eq!(p.top(), "signup_bonus");
        assert!(p.is_nested());
        assert_eq!(p.rest(), &[Segment::Key("amount".into())]);

        let p = FieldPath::parse("rewards.0.rate").unwrap();
        assert_eq!(p.rest()[0], Segment::Index(0));
        assert_eq!(p.to_string(), "rewards.0.rate");

        assert!(!FieldPath::parse("annual_fee").unwrap().is_nested());
        assert!(FieldPath::parse("").is_none());
        assert!(FieldPath::parse("a..b").is_none());
        assert!(FieldPath::parse("0.a").is_none());
    }

    #[test]
    fn assign_creates_missing_keys() {
        let mut v = json!({"amount": 60000});
        let p = FieldPath::parse("bonus.spend.amount").unwrap();
        assert!(assign_path(&mut v, &p.rest()[..1], json!(4000)));
        assert_eq!(v, json!({"amount": 60000, "spend": 4000}));

        let mut v = Value::Null;
        let p = FieldPath::parse("bonus.terms.months").unwrap();
        assert!(assign_path(&mut v, p.rest(), json!(3)));
        assert_eq!(v, json!({"terms": {"months": 3}}));
    }

    #[test]
    fn assign_rejects_out_of_range_index() {
        let mut v = json!([{"rate": 1}]);
        let p = FieldPath::parse("rewards.3.rate").unwrap();
        assert!(!assign_path(&mut v, p.rest(), json!(2)));
        let p = FieldPath::parse("rewards.0.rate").unwrap();
        assert!(assign_path(&mut v, p.rest(), json!(2)));
        assert_eq!(v, json!([{"rate": 2}]));
    }

    #[test]
    fn lookup_through_arrays() {
        let v = json!({"rewards": [{"rate": 3}, {"rate": 1}]});
        let p = FieldPath::parse("rewards.1.rate").unwrap();
        assert_eq!(lookup_path(&v, &p), Some(&json!(1)));
        let p = FieldPath::parse("rewards.5.rate").unwrap();
        assert_eq!(lookup_path(&v, &p), None);
    }
}
