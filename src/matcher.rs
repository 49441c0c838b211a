//! Key-path and value matchers used to configure the filters.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

/// Default separator joining path components for string comparison.
pub const DEFAULT_SEPARATOR: &str = ".";

/// A key-path filter: a literal joined path, a regular expression matched
/// against the joined path, or an ordered list tried first-match-wins.
#[derive(Debug, Clone)]
pub enum KeyMatcher {
    Literal(String),
    Pattern(Regex),
    Any(Vec<KeyMatcher>),
}

impl KeyMatcher {
    /// Test a joined key path. On a match, returns the display form of the
    /// matching filter (recorded as `matcher` on synthetic tokens).
    pub fn matches(&self, path: &str) -> Option<String> {
        match self {
            KeyMatcher::Literal(expected) => (expected == path).then(|| expected.clone()),
            KeyMatcher::Pattern(re) => re.is_match(path).then(|| re.as_str().to_string()),
            KeyMatcher::Any(list) => list.iter().find_map(|m| m.matches(path)),
        }
    }

    /// True when this matcher can only ever accept a single literal path.
    /// The object sieve uses this to discard conclusively unmatched objects
    /// early.
    pub fn is_single_literal(&self) -> bool {
        match self {
            KeyMatcher::Literal(_) => true,
            KeyMatcher::Pattern(_) => false,
            KeyMatcher::Any(list) => list.len() == 1 && list[0].is_single_literal(),
        }
    }
}

impl fmt::Display for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatcher::Literal(s) => write!(f, "{s}"),
            KeyMatcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
            KeyMatcher::Any(list) => {
                for (i, m) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for KeyMatcher {
    fn from(s: &str) -> Self {
        KeyMatcher::Literal(s.to_string())
    }
}

impl From<String> for KeyMatcher {
    fn from(s: String) -> Self {
        KeyMatcher::Literal(s)
    }
}

impl From<Regex> for KeyMatcher {
    fn from(re: Regex) -> Self {
        KeyMatcher::Pattern(re)
    }
}

impl<M: Into<KeyMatcher>> From<Vec<M>> for KeyMatcher {
    fn from(list: Vec<M>) -> Self {
        KeyMatcher::Any(list.into_iter().map(Into::into).collect())
    }
}

/// A value filter for the object sieve: scalar equality, deep-subset
/// structural inclusion, or an arbitrary predicate.
#[derive(Clone)]
pub enum ValueMatcher {
    Equal(Value),
    Contains(Value),
    Predicate(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

impl ValueMatcher {
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        ValueMatcher::Predicate(Arc::new(f))
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueMatcher::Equal(expected) => expected == value,
            ValueMatcher::Contains(subset) => deep_subset(subset, value),
            ValueMatcher::Predicate(test) => test(value),
        }
    }
}

impl fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueMatcher::Equal(v) => f.debug_tuple("Equal").field(v).finish(),
            ValueMatcher::Contains(v) => f.debug_tuple("Contains").field(v).finish(),
            ValueMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<Value> for ValueMatcher {
    fn from(v: Value) -> Self {
        ValueMatcher::Equal(v)
    }
}

impl From<&str> for ValueMatcher {
    fn from(s: &str) -> Self {
        ValueMatcher::Equal(Value::String(s.to_string()))
    }
}

/// Structural inclusion: every key of a needle object must exist in the
/// haystack with a matching value; every element of a needle array must be
/// matched by some element of the haystack array; scalars compare equal.
fn deep_subset(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (Value::Object(sub), Value::Object(sup)) => sub
            .iter()
            .all(|(k, v)| sup.get(k).map_or(false, |h| deep_subset(v, h))),
        (Value::Array(sub), Value::Array(sup)) => sub
            .iter()
            .all(|v| sup.iter().any(|h| deep_subset(v, h))),
        _ => needle == haystack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_matches_whole_path_only() {
        let m = KeyMatcher::from("a.b");
        assert_eq!(m.matches("a.b"), Some("a.b".to_string()));
        assert_eq!(m.matches("a.b.c"), None);
    }

    #[test]
    fn list_is_first_match_wins() {
        let m = KeyMatcher::from(vec![
            KeyMatcher::from("x"),
            KeyMatcher::Pattern(Regex::new("^x$").unwrap()),
        ]);
        assert_eq!(m.matches("x"), Some("x".to_string()));
    }

    #[test]
    fn single_literal_detection() {
        assert!(KeyMatcher::from("a").is_single_literal());
        assert!(!KeyMatcher::Pattern(Regex::new("a").unwrap()).is_single_literal());
        assert!(!KeyMatcher::from(vec!["a", "b"]).is_single_literal());
    }

    #[test]
    fn deep_subset_objects_and_arrays() {
        let m = ValueMatcher::Contains(json!({"tags": ["x"]}));
        assert!(m.accepts(&json!({"tags": ["y", "x"], "id": 3})));
        assert!(!m.accepts(&json!({"tags": ["y"]})));
    }

    #[test]
    fn predicate_matcher() {
        let m = ValueMatcher::predicate(|v| v.as_i64().map_or(false, |n| n > 10));
        assert!(m.accepts(&json!(11)));
        assert!(!m.accepts(&json!(3)));
    }
}
