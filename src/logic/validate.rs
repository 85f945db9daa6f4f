use log::debug;
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{ConfigError, Result, Violation};
use crate::model::{Condition, Operand, Override, VariantState};

const MAX_NAME_LENGTH: usize = 100;

/// Validates JSON documents against JSON Schema.
///
/// The draft is taken from `$schema` and defaults to 2020-12. Every violation
/// is reported with its JSON pointer inside the validated document.
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(value: &Value, schema: &Value) -> Vec<Violation> {
        let validator = match jsonschema::validator_for(schema) {
            Ok(validator) => validator,
            Err(error) => {
                debug!("schema failed to compile: {}", error);
                return vec![Violation::new("", format!("schema is malformed: {}", error))];
            }
        };
        validator
            .iter_errors(value)
            .map(|error| Violation::new(error.instance_path.to_string(), error.to_string()))
            .collect()
    }

    pub fn is_valid(value: &Value, schema: &Value) -> bool {
        Self::validate(value, schema).is_empty()
    }

    /// Checks that a schema document is itself usable
    pub fn check_schema(schema: &Value) -> Vec<Violation> {
        match jsonschema::validator_for(schema) {
            Ok(_) => Vec::new(),
            Err(error) => vec![Violation::new(
                error.instance_path.to_string(),
                error.to_string(),
            )],
        }
    }
}

/// Write-time validation for names, condition trees, overrides and variant states
pub struct WriteValidator;

impl WriteValidator {
    /// Config and environment names: ASCII letters, digits and underscores,
    /// starting with a letter or underscore.
    pub fn validate_name(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest {
            return Err(ConfigError::validation(format!(
                "invalid name '{}': use letters, digits and underscores, starting with a letter or underscore",
                name
            )));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(ConfigError::validation(format!(
                "invalid name '{}': longer than {} characters",
                name, MAX_NAME_LENGTH
            )));
        }
        Ok(())
    }

    pub fn check_condition(condition: &Condition) -> Vec<Violation> {
        let mut violations = Vec::new();
        Self::check_condition_at(condition, "", &mut violations);
        violations
    }

    fn check_condition_at(condition: &Condition, path: &str, violations: &mut Vec<Violation>) {
        match condition {
            Condition::Literal(_) => {}
            Condition::All { all: children } | Condition::Any { any: children } => {
                let keyword = if matches!(condition, Condition::All { .. }) { "all" } else { "any" };
                if children.is_empty() {
                    violations.push(Violation::new(
                        format!("{}/{}", path, keyword),
                        format!("'{}' needs at least one condition", keyword),
                    ));
                }
                for (i, child) in children.iter().enumerate() {
                    Self::check_condition_at(child, &format!("{}/{}/{}", path, keyword, i), violations);
                }
            }
            Condition::Not { not } => Self::check_condition_at(not, &format!("{}/not", path), violations),
            Condition::Compare(cmp) => {
                if cmp.property.trim().is_empty() {
                    violations.push(Violation::new(format!("{}/property", path), "property must not be empty"));
                }
                let value_path = format!("{}/value", path);
                match &cmp.value {
                    Operand::Reference(reference) => {
                        if reference.property.trim().is_empty() {
                            violations.push(Violation::new(value_path, "referenced property must not be empty"));
                        }
                    }
                    Operand::Literal(literal) => {
                        if cmp.operator.is_membership() && !literal.is_array() {
                            violations.push(Violation::new(value_path, "in/not_in need an array of values"));
                        } else if cmp.operator.is_ordering()
                            && !(literal.is_number() || literal.is_string())
                        {
                            violations.push(Violation::new(
                                value_path,
                                "ordering operators need a number or string",
                            ));
                        } else if !cmp.operator.is_presence_check()
                            && !cmp.operator.is_membership()
                            && literal.is_null()
                        {
                            violations.push(Violation::new(value_path, "comparison value is missing"));
                        }
                    }
                }
            }
        }
    }

    /// Override labels must be non-empty and unique; conditions well-formed;
    /// values must satisfy the schema when one is set.
    pub fn check_overrides(overrides: &[Override], schema: Option<&Value>) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut seen = HashSet::new();
        for (i, item) in overrides.iter().enumerate() {
            let path = format!("/overrides/{}", i);
            if item.name.trim().is_empty() {
                violations.push(Violation::new(format!("{}/name", path), "override name must not be empty"));
            } else if !seen.insert(item.name.as_str()) {
                violations.push(Violation::new(
                    format!("{}/name", path),
                    format!("duplicate override name '{}'", item.name),
                ));
            }
            for v in Self::check_condition(&item.condition) {
                violations.push(Violation::new(format!("{}/condition{}", path, v.path), v.message));
            }
            if let Some(schema) = schema {
                for v in SchemaValidator::validate(&item.value, schema) {
                    violations.push(Violation::new(format!("{}/value{}", path, v.path), v.message));
                }
            }
        }
        violations
    }

    /// Full check of a state about to be written
    pub fn validate_state(state: &VariantState) -> Result<()> {
        let mut violations = Vec::new();
        if let Some(schema) = &state.schema {
            let schema_violations = SchemaValidator::check_schema(schema);
            if !schema_violations.is_empty() {
                for v in schema_violations {
                    violations.push(Violation::new(format!("/schema{}", v.path), v.message));
                }
                return Err(ConfigError::violations("schema is malformed", violations));
            }
            for v in SchemaValidator::validate(&state.value, schema) {
                violations.push(Violation::new(format!("/value{}", v.path), v.message));
            }
        }
        violations.extend(Self::check_overrides(&state.overrides, state.schema.as_ref()));

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::violations("value does not satisfy its constraints", violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operator;
    use serde_json::json;

    #[test]
    fn test_schema_type_and_required() {
        let schema = json!({
            "type": "object",
            "properties": {"enabled": {"type": "boolean"}, "limit": {"type": "integer", "minimum": 0}},
            "required": ["enabled"],
            "additionalProperties": false
        });
        assert!(SchemaValidator::is_valid(&json!({"enabled": true, "limit": 3}), &schema));

        // Missing and unexpected properties are reported on the object itself
        let violations = SchemaValidator::validate(&json!({"limit": -1, "extra": 1}), &schema);
        let paths: Vec<&str> = violations.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(violations.len(), 3);
        assert_eq!(paths.iter().filter(|p| p.is_empty()).count(), 2);
        assert!(paths.contains(&"/limit"));
    }

    #[test]
    fn test_schema_integer_rejects_fractions() {
        let schema = json!({"type": "integer"});
        assert!(SchemaValidator::is_valid(&json!(3), &schema));
        assert!(!SchemaValidator::is_valid(&json!(3.5), &schema));
        assert!(!SchemaValidator::is_valid(&json!("3"), &schema));
    }

    #[test]
    fn test_schema_pattern_and_unique_items() {
        let code = json!({"type": "string", "pattern": "^[A-Z]{2}$"});
        assert!(SchemaValidator::is_valid(&json!("SE"), &code));
        assert!(!SchemaValidator::is_valid(&json!("not-a-code"), &code));

        let tags = json!({"type": "array", "uniqueItems": true});
        assert!(SchemaValidator::is_valid(&json!(["a", "b"]), &tags));
        let violations = SchemaValidator::validate(&json!(["a", "a"]), &tags);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "");
    }

    #[test]
    fn test_schema_refs_and_object_bounds() {
        let schema = json!({
            "$defs": {"percent": {"type": "integer", "minimum": 0, "maximum": 100}},
            "type": "object",
            "properties": {"rollout": {"$ref": "#/$defs/percent"}},
            "minProperties": 1,
            "dependentRequired": {"rollout": ["seed"]}
        });
        assert!(SchemaValidator::is_valid(&json!({"rollout": 10, "seed": 1}), &schema));
        assert!(!SchemaValidator::is_valid(&json!({}), &schema));
        assert!(!SchemaValidator::is_valid(&json!({"rollout": 10}), &schema));

        let violations = SchemaValidator::validate(&json!({"rollout": 150, "seed": 1}), &schema);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "/rollout");
    }

    #[test]
    fn test_schema_multiple_of_and_conditionals() {
        let schema = json!({
            "type": "object",
            "properties": {"step": {"multipleOf": 5}},
            "if": {"properties": {"mode": {"const": "strict"}}, "required": ["mode"]},
            "then": {"required": ["limit"]}
        });
        assert!(SchemaValidator::is_valid(&json!({"step": 10}), &schema));
        assert!(!SchemaValidator::is_valid(&json!({"step": 7}), &schema));
        assert!(!SchemaValidator::is_valid(&json!({"mode": "strict"}), &schema));
        assert!(SchemaValidator::is_valid(&json!({"mode": "strict", "limit": 1}), &schema));
    }

    #[test]
    fn test_schema_composition_keywords() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "number", "maximum": 10}]});
        assert!(SchemaValidator::is_valid(&json!("x"), &schema));
        assert!(SchemaValidator::is_valid(&json!(5), &schema));
        assert!(!SchemaValidator::is_valid(&json!(50), &schema));

        let one_of = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        assert!(SchemaValidator::is_valid(&json!(1.5), &one_of));
        assert!(!SchemaValidator::is_valid(&json!(1), &one_of));

        let not = json!({"not": {"const": "forbidden"}});
        assert!(!SchemaValidator::is_valid(&json!("forbidden"), &not));
    }

    #[test]
    fn test_schema_arrays_and_strings() {
        let schema = json!({"type": "array", "items": {"type": "string", "maxLength": 3}, "maxItems": 2});
        assert!(SchemaValidator::is_valid(&json!(["ab", "cd"]), &schema));
        let violations = SchemaValidator::validate(&json!(["abcd", "a", "b"]), &schema);
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.path == "/0"));
    }

    #[test]
    fn test_check_schema_flags_malformed_documents() {
        assert!(SchemaValidator::check_schema(&json!({"type": "object"})).is_empty());
        assert!(!SchemaValidator::check_schema(&json!({"type": "text"})).is_empty());
        assert!(!SchemaValidator::check_schema(&json!("string")).is_empty());
        assert!(!SchemaValidator::check_schema(&json!({"required": "enabled"})).is_empty());
    }

    #[test]
    fn test_name_validation() {
        assert!(WriteValidator::validate_name("flag_x").is_ok());
        assert!(WriteValidator::validate_name("_private").is_ok());
        assert!(WriteValidator::validate_name("Feature2").is_ok());
        assert!(WriteValidator::validate_name("").is_err());
        assert!(WriteValidator::validate_name("2fast").is_err());
        assert!(WriteValidator::validate_name("with-dash").is_err());
        assert!(WriteValidator::validate_name("with space").is_err());
        assert!(WriteValidator::validate_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_condition_validation() {
        let ok = Condition::All {
            all: vec![
                Condition::equals("region", "EU"),
                Condition::compare(Operator::In, "plan", Operand::Literal(json!(["pro"]))),
                Condition::compare(Operator::IsPresent, "user", Operand::default()),
            ],
        };
        assert!(WriteValidator::check_condition(&ok).is_empty());

        let bad = Condition::Any {
            any: vec![
                Condition::compare(Operator::In, "plan", Operand::Literal(json!("pro"))),
                Condition::compare(Operator::GreaterThan, "age", Operand::Literal(json!({"a": 1}))),
                Condition::compare(Operator::Equals, "", Operand::Literal(json!(1))),
                Condition::All { all: vec![] },
            ],
        };
        assert_eq!(WriteValidator::check_condition(&bad).len(), 4);
    }

    #[test]
    fn test_validate_state_checks_overrides_against_schema() {
        let state = VariantState {
            value: json!({"enabled": false}),
            schema: Some(json!({"type": "object", "required": ["enabled"]})),
            overrides: vec![
                Override {
                    name: "eu".to_string(),
                    condition: Condition::equals("region", "EU"),
                    value: json!({"enabled": true}),
                },
                Override {
                    name: "eu".to_string(),
                    condition: Condition::Literal(true),
                    value: json!("not an object"),
                },
            ],
        };
        match WriteValidator::validate_state(&state) {
            Err(ConfigError::Validation { violations, .. }) => {
                assert!(violations.iter().any(|v| v.path == "/overrides/1/name"));
                assert!(violations.iter().any(|v| v.path == "/overrides/1/value"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}
