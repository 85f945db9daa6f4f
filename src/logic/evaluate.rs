use log::debug;

use crate::logic::ConditionMatcher;
use crate::model::{ConfigVariant, EvaluationContext, Resolution};

/// Computes the effective value of a variant for a request context
pub struct OverrideEvaluator;

impl OverrideEvaluator {
    /// First override (in stored order) whose condition matches wins; otherwise the base value.
    /// Reads never validate against the schema; that happens when a value is written.
    pub fn resolve(variant: &ConfigVariant, context: &EvaluationContext) -> Resolution {
        let matched = variant
            .overrides
            .iter()
            .find(|o| ConditionMatcher::matches(&o.condition, context));

        match matched {
            Some(found) => {
                debug!(
                    "variant {} v{}: override '{}' matched",
                    variant.id, variant.version, found.name
                );
                Resolution {
                    value: found.value.clone(),
                    matched_override: Some(found.name.clone()),
                    variant_id: variant.id.clone(),
                    version: variant.version,
                }
            }
            None => Resolution {
                value: variant.value.clone(),
                matched_override: None,
                variant_id: variant.id.clone(),
                version: variant.version,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Override, VariantState};
    use serde_json::{json, Value};

    fn variant(overrides: Vec<Override>) -> ConfigVariant {
        ConfigVariant::new(
            "cfg".to_string(),
            None,
            VariantState {
                value: json!("base"),
                schema: None,
                overrides,
            },
            None,
        )
    }

    fn ctx(value: Value) -> EvaluationContext {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_base_value_when_nothing_matches() {
        let v = variant(vec![Override {
            name: "eu".to_string(),
            condition: Condition::equals("region", "EU"),
            value: json!("A"),
        }]);
        let resolution = OverrideEvaluator::resolve(&v, &ctx(json!({"region": "US"})));
        assert_eq!(resolution.value, json!("base"));
        assert_eq!(resolution.matched_override, None);
        assert_eq!(resolution.version, 1);
    }

    #[test]
    fn test_region_fallthrough_scenario() {
        let v = variant(vec![
            Override {
                name: "eu".to_string(),
                condition: Condition::equals("region", "EU"),
                value: json!("A"),
            },
            Override {
                name: "everyone".to_string(),
                condition: Condition::Literal(true),
                value: json!("B"),
            },
        ]);

        let eu = OverrideEvaluator::resolve(&v, &ctx(json!({"region": "EU"})));
        assert_eq!(eu.value, json!("A"));
        assert_eq!(eu.matched_override.as_deref(), Some("eu"));

        let us = OverrideEvaluator::resolve(&v, &ctx(json!({"region": "US"})));
        assert_eq!(us.value, json!("B"));
        assert_eq!(us.matched_override.as_deref(), Some("everyone"));

        let missing = OverrideEvaluator::resolve(&v, &ctx(json!({})));
        assert_eq!(missing.value, json!("B"));
    }

    #[test]
    fn test_array_order_is_the_only_tie_break() {
        let first = Override {
            name: "first".to_string(),
            condition: Condition::equals("plan", "pro"),
            value: json!(1),
        };
        let second = Override {
            name: "second".to_string(),
            condition: Condition::equals("plan", "pro"),
            value: json!(2),
        };
        let context = ctx(json!({"plan": "pro"}));

        let forward = variant(vec![first.clone(), second.clone()]);
        assert_eq!(OverrideEvaluator::resolve(&forward, &context).value, json!(1));

        let reversed = variant(vec![second, first]);
        assert_eq!(OverrideEvaluator::resolve(&reversed, &context).value, json!(2));
    }
}
