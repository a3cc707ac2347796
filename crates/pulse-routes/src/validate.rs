//! Payload validation.
//!
//! A validation declaration maps payload attributes to the named rules they
//! must satisfy, each with its options:
//!
//! ```json
//! { "email": { "isEmail": true }, "name": { "isLength": { "min": 1, "max": 64 } } }
//! ```
//!
//! Every rule of every attribute must pass. Declarations are only
//! interpreted when an event arrives, so a malformed one fails the event
//! rather than the declaration.

use crate::error::RouteError;
use crate::rules::{RuleRegistry, Verdict};
use serde_json::Value;
use tracing::trace;

/// Validate a payload against a declaration.
///
/// # Errors
///
/// - [`RouteError::InvalidData`] when a rule fails.
/// - [`RouteError::InvalidDataDetail`] when a rule fails and reports detail.
/// - [`RouteError::InvalidRule`] when the declaration is malformed or names
///   an unregistered rule.
pub fn validate(rules: &Value, payload: &Value, registry: &RuleRegistry) -> Result<(), RouteError> {
    let Value::Object(attributes) = rules else {
        return Err(RouteError::InvalidRule(
            "validation rules must be an object".to_string(),
        ));
    };

    for (attribute, checks) in attributes {
        let Value::Object(checks) = checks else {
            return Err(RouteError::InvalidRule(format!(
                "rules for '{attribute}' must be an object"
            )));
        };

        let field = payload.get(attribute).unwrap_or(&Value::Null);

        for (name, options) in checks {
            let rule = registry
                .get(name)
                .ok_or_else(|| RouteError::InvalidRule(format!("unknown rule '{name}'")))?;

            match rule.check(field, options) {
                Verdict::Pass => {}
                Verdict::Fail => {
                    trace!(attribute = %attribute, rule = %name, "Validation failed");
                    return Err(RouteError::InvalidData);
                }
                Verdict::Detail(detail) => {
                    trace!(attribute = %attribute, rule = %name, "Validation failed with detail");
                    return Err(RouteError::InvalidDataDetail(detail));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(rules: Value, payload: Value) -> Result<(), RouteError> {
        validate(&rules, &payload, &RuleRegistry::default())
    }

    #[test]
    fn test_valid_email() {
        let rules = json!({"email": {"isEmail": true}});
        assert!(run(rules, json!({"email": "a@b.com"})).is_ok());
    }

    #[test]
    fn test_invalid_email() {
        let rules = json!({"email": {"isEmail": true}});
        let err = run(rules, json!({"email": "a @ 1 2 3 4"})).unwrap_err();
        assert!(matches!(err, RouteError::InvalidData));
        assert_eq!(err.to_string(), "Invalid data");
    }

    #[test]
    fn test_every_rule_must_pass() {
        let rules = json!({
            "email": {"isEmail": true, "isLength": {"max": 7}},
            "name": {"isAlpha": true}
        });
        assert!(run(rules.clone(), json!({"email": "a@b.com", "name": "ann"})).is_ok());
        assert!(run(rules.clone(), json!({"email": "ab@c.com", "name": "ann"})).is_err());
        assert!(run(rules, json!({"email": "a@b.com", "name": "ann1"})).is_err());
    }

    #[test]
    fn test_missing_field_is_null() {
        let rules = json!({"email": {"isEmail": true}});
        assert!(matches!(
            run(rules, json!({})),
            Err(RouteError::InvalidData)
        ));
    }

    #[test]
    fn test_empty_rules_pass() {
        assert!(run(json!({}), json!("anything")).is_ok());
    }

    #[test]
    fn test_detail_is_preserved() {
        let mut registry = RuleRegistry::default();
        registry.register("isAvailable", |value: &Value, _: &Value| -> Verdict {
            Verdict::Detail(json!({"taken": value}))
        });

        let err = validate(
            &json!({"username": {"isAvailable": true}}),
            &json!({"username": "root"}),
            &registry,
        )
        .unwrap_err();

        match err {
            RouteError::InvalidDataDetail(detail) => assert_eq!(detail, json!({"taken": "root"})),
            other => panic!("Expected InvalidDataDetail, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_rules() {
        assert!(matches!(
            run(json!(["email"]), json!({})),
            Err(RouteError::InvalidRule(_))
        ));
        assert!(matches!(
            run(json!({"email": true}), json!({})),
            Err(RouteError::InvalidRule(_))
        ));
        assert!(matches!(
            run(json!({"email": {"isMagic": true}}), json!({"email": "a@b.com"})),
            Err(RouteError::InvalidRule(_))
        ));
    }
}
