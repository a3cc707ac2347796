//! Named validation rules.
//!
//! The registry maps rule names used in validation declarations (for
//! example `isEmail` or `isLength`) to rule implementations. Rules work on
//! strings; numbers and booleans are checked through their JSON text, any
//! other value fails.

use regex::Regex;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("email pattern is valid")
});

static INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?(?:0|[1-9][0-9]*)$").expect("int pattern is valid"));

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?[0-9]+(?:\.[0-9]+)?$").expect("numeric pattern is valid")
});

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});

/// Result of applying one rule to one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The value satisfies the rule.
    Pass,
    /// The value does not satisfy the rule.
    Fail,
    /// The rule rejected the value and reported structured detail.
    Detail(Value),
}

impl Verdict {
    /// Whether the rule passed.
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

/// A named validation rule.
///
/// `value` is the payload field (or `null` when absent), `options` is
/// whatever the declaration attached to the rule name.
pub trait Rule: Send + Sync {
    /// Apply the rule to `value`.
    fn check(&self, value: &Value, options: &Value) -> Verdict;
}

impl<F> Rule for F
where
    F: Fn(&Value, &Value) -> Verdict + Send + Sync,
{
    fn check(&self, value: &Value, options: &Value) -> Verdict {
        self(value, options)
    }
}

/// Registry of named rules.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: HashMap<String, Arc<dyn Rule>>,
}

impl RuleRegistry {
    /// Create a registry with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Register a rule, replacing any rule with the same name.
    pub fn register(&mut self, name: impl Into<String>, rule: impl Rule + 'static) -> &mut Self {
        self.rules.insert(name.into(), Arc::new(rule));
        self
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Rule>> {
        self.rules.get(name)
    }

    /// Check if a rule is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered rule names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("isEmail", text_rule(|s, _| EMAIL.is_match(s)))
            .register("isLength", text_rule(is_length))
            .register("isInt", text_rule(|s, _| INT.is_match(s)))
            .register("isNumeric", text_rule(|s, _| NUMERIC.is_match(s)))
            .register(
                "isAlpha",
                text_rule(|s, _| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())),
            )
            .register(
                "isAlphanumeric",
                text_rule(|s, _| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())),
            )
            .register("isUUID", text_rule(|s, _| UUID.is_match(s)))
            .register("isIn", text_rule(is_in))
            .register(
                "equals",
                text_rule(|s, opts| as_text(opts).is_some_and(|o| o == s)),
            )
            .register(
                "contains",
                text_rule(|s, opts| as_text(opts).is_some_and(|o| s.contains(&*o))),
            )
            .register("notEmpty", text_rule(|s, _| !s.trim().is_empty()))
            .register("matches", matches);
        registry
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.names())
            .finish()
    }
}

/// Textual form of a JSON scalar.
fn as_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(s.as_str().into()),
        Value::Number(n) => Some(n.to_string().into()),
        Value::Bool(b) => Some(b.to_string().into()),
        _ => None,
    }
}

/// Adapt a string predicate into a rule; non-text values fail.
fn text_rule(
    check: impl Fn(&str, &Value) -> bool + Send + Sync,
) -> impl Fn(&Value, &Value) -> Verdict + Send + Sync {
    move |value: &Value, options: &Value| -> Verdict {
        match as_text(value) {
            Some(text) => check(text.as_ref(), options).into(),
            None => Verdict::Fail,
        }
    }
}

fn is_length(s: &str, options: &Value) -> bool {
    let len = s.chars().count() as u64;
    let min = options.get("min").and_then(Value::as_u64).unwrap_or(0);
    let max = options.get("max").and_then(Value::as_u64);
    len >= min && max.map_or(true, |max| len <= max)
}

fn is_in(s: &str, options: &Value) -> bool {
    options
        .as_array()
        .is_some_and(|allowed| allowed.iter().filter_map(as_text).any(|o| o == s))
}

/// Regex match; an invalid pattern rejects with the compile error as detail.
fn matches(value: &Value, options: &Value) -> Verdict {
    let Some(pattern) = options.as_str() else {
        return Verdict::Detail(json!({"rule": "matches", "error": "pattern must be a string"}));
    };
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            return Verdict::Detail(json!({"rule": "matches", "error": e.to_string()}))
        }
    };
    match as_text(value) {
        Some(text) => re.is_match(&text).into(),
        None => Verdict::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, value: Value, options: Value) -> Verdict {
        RuleRegistry::default()
            .get(name)
            .unwrap_or_else(|| panic!("rule {name} missing"))
            .check(&value, &options)
    }

    #[test]
    fn test_is_email() {
        assert_eq!(check("isEmail", json!("a@b.com"), json!(true)), Verdict::Pass);
        assert_eq!(
            check("isEmail", json!("first.last+tag@mail.example.org"), json!(true)),
            Verdict::Pass
        );
        assert_eq!(check("isEmail", json!("a @ 1 2 3 4"), json!(true)), Verdict::Fail);
        assert_eq!(check("isEmail", json!("a@b"), json!(true)), Verdict::Fail);
        assert_eq!(check("isEmail", Value::Null, json!(true)), Verdict::Fail);
    }

    #[test]
    fn test_is_length() {
        let opts = json!({"min": 2, "max": 4});
        assert!(check("isLength", json!("ab"), opts.clone()).is_pass());
        assert!(check("isLength", json!("abcd"), opts.clone()).is_pass());
        assert!(!check("isLength", json!("a"), opts.clone()).is_pass());
        assert!(!check("isLength", json!("abcde"), opts).is_pass());
        assert!(check("isLength", json!("héé"), json!({"max": 3})).is_pass());
    }

    #[test]
    fn test_numeric_rules_accept_numbers() {
        assert!(check("isInt", json!(42), Value::Null).is_pass());
        assert!(check("isInt", json!("-7"), Value::Null).is_pass());
        assert!(!check("isInt", json!("4.2"), Value::Null).is_pass());
        assert!(check("isNumeric", json!("4.2"), Value::Null).is_pass());
        assert!(!check("isNumeric", json!("4.2.1"), Value::Null).is_pass());
    }

    #[test]
    fn test_character_classes() {
        assert!(check("isAlpha", json!("abc"), Value::Null).is_pass());
        assert!(!check("isAlpha", json!("abc1"), Value::Null).is_pass());
        assert!(check("isAlphanumeric", json!("abc1"), Value::Null).is_pass());
        assert!(!check("isAlphanumeric", json!(""), Value::Null).is_pass());
        assert!(check(
            "isUUID",
            json!("123e4567-e89b-12d3-a456-426614174000"),
            Value::Null
        )
        .is_pass());
    }

    #[test]
    fn test_option_rules() {
        assert!(check("isIn", json!("red"), json!(["red", "green"])).is_pass());
        assert!(check("isIn", json!(2), json!([1, 2])).is_pass());
        assert!(!check("isIn", json!("blue"), json!(["red", "green"])).is_pass());
        assert!(check("equals", json!("x"), json!("x")).is_pass());
        assert!(check("contains", json!("hello world"), json!("lo w")).is_pass());
        assert!(!check("notEmpty", json!("   "), Value::Null).is_pass());
    }

    #[test]
    fn test_matches() {
        assert!(check("matches", json!("abc123"), json!("^[a-z]+[0-9]+$")).is_pass());
        assert_eq!(check("matches", json!("abc"), json!("^[0-9]+$")), Verdict::Fail);
        assert!(matches!(
            check("matches", json!("abc"), json!("(")),
            Verdict::Detail(_)
        ));
    }

    #[test]
    fn test_custom_rule_registration() {
        let mut registry = RuleRegistry::empty();
        assert!(!registry.contains("isEven"));

        registry.register("isEven", |value: &Value, _: &Value| -> Verdict {
            value.as_i64().map(|n| n % 2 == 0).unwrap_or(false).into()
        });

        let rule = registry.get("isEven").unwrap();
        assert!(rule.check(&json!(4), &Value::Null).is_pass());
        assert!(!rule.check(&json!(3), &Value::Null).is_pass());
        assert_eq!(registry.names(), vec!["isEven"]);
    }
}
