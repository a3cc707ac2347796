//! Connection-scoped authorization.
//!
//! An auth rule is a JSON object of expected attributes. It passes when every
//! attribute is present in the connection's [`AuthContext`] with a value that
//! is structurally equal to the expected one.

use crate::channel::AuthContext;
use serde_json::Value;
use tracing::trace;

/// Structural equality used to compare auth attributes.
pub type EqualityFn = fn(&Value, &Value) -> bool;

/// Deep structural equality.
///
/// Numbers compare by value regardless of representation (`1` equals `1.0`),
/// objects compare by key set ignoring order, arrays compare element-wise.
#[must_use]
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            x.as_f64() == y.as_f64()
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Evaluate an auth rule against a connection's auth context.
///
/// A rule that is not a JSON object never passes.
#[must_use]
pub fn authorize(rule: &Value, context: &AuthContext, eq: EqualityFn) -> bool {
    let Value::Object(expected) = rule else {
        trace!("Auth rule is not an object");
        return false;
    };

    expected.iter().all(|(attribute, want)| {
        let passed = context
            .get(attribute)
            .is_some_and(|have| eq(&have, want));
        if !passed {
            trace!(attribute = %attribute, "Auth attribute mismatch");
        }
        passed
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(attrs: Value) -> AuthContext {
        let ctx = AuthContext::new();
        if let Value::Object(map) = attrs {
            for (k, v) in map {
                ctx.insert(k, v);
            }
        }
        ctx
    }

    #[test]
    fn test_deep_equal() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(deep_equal(&json!("a"), &json!("a")));
        assert!(!deep_equal(&json!("1"), &json!(1)));
        assert!(deep_equal(
            &json!({"a": [1, {"b": true}], "c": null}),
            &json!({"c": null, "a": [1, {"b": true}]})
        ));
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(deep_equal(
            &json!(9_007_199_254_740_993u64),
            &json!(9_007_199_254_740_993u64)
        ));
        assert!(!deep_equal(
            &json!(9_007_199_254_740_993u64),
            &json!(9_007_199_254_740_992u64)
        ));
    }

    #[test]
    fn test_authorize_matching_flag() {
        let ctx = context(json!({"flag": true, "role": "admin"}));
        assert!(authorize(&json!({"flag": true}), &ctx, deep_equal));
        assert!(authorize(
            &json!({"flag": true, "role": "admin"}),
            &ctx,
            deep_equal
        ));
    }

    #[test]
    fn test_authorize_mismatch_or_missing() {
        let ctx = context(json!({"flag": false}));
        assert!(!authorize(&json!({"flag": true}), &ctx, deep_equal));

        let empty = AuthContext::new();
        assert!(!authorize(&json!({"flag": true}), &empty, deep_equal));
    }

    #[test]
    fn test_authorize_empty_rule_passes() {
        assert!(authorize(&json!({}), &AuthContext::new(), deep_equal));
    }

    #[test]
    fn test_authorize_malformed_rule_fails_closed() {
        assert!(!authorize(&json!("admin"), &AuthContext::new(), deep_equal));
    }

    #[test]
    fn test_authorize_custom_equality() {
        fn case_insensitive(a: &Value, b: &Value) -> bool {
            match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => a == b,
            }
        }

        let ctx = context(json!({"role": "ADMIN"}));
        assert!(!authorize(&json!({"role": "admin"}), &ctx, deep_equal));
        assert!(authorize(&json!({"role": "admin"}), &ctx, case_insensitive));
    }
}
