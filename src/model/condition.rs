use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Boolean condition tree attached to an override.
///
/// JSON forms:
/// - `true` / `false`
/// - `{"all": [...]}`, `{"any": [...]}`, `{"not": {...}}`
/// - `{"operator": "equals", "property": "region", "value": "EU"}`
/// - `{"operator": "equals", "property": "region", "value": {"ref": "home_region"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Constant result
    Literal(bool),
    /// Logical AND, stops at the first false child
    All { all: Vec<Condition> },
    /// Logical OR, stops at the first true child
    Any { any: Vec<Condition> },
    /// Logical NOT
    Not { not: Box<Condition> },
    /// Leaf comparison against a context property
    Compare(Comparison),
}

impl Condition {
    pub fn compare(operator: Operator, property: &str, value: Operand) -> Self {
        Condition::Compare(Comparison {
            operator,
            property: property.to_string(),
            value,
        })
    }

    pub fn equals(property: &str, value: impl Into<Value>) -> Self {
        Self::compare(Operator::Equals, property, Operand::Literal(value.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub operator: Operator,
    /// Dotted path into the evaluation context, e.g. `user.country`
    pub property: String,
    #[serde(default)]
    pub value: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    IsPresent,
    IsNotPresent,
}

impl Operator {
    /// Operators that ignore the right-hand operand
    pub fn is_presence_check(&self) -> bool {
        matches!(self, Operator::IsPresent | Operator::IsNotPresent)
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual
        )
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

/// Right-hand side of a comparison: a literal, or a reference to another context property.
/// An object with a single `ref` key is always read as a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Reference(PropertyRef),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyRef {
    #[serde(rename = "ref")]
    pub property: String,
}

impl Operand {
    pub fn reference(property: &str) -> Self {
        Operand::Reference(PropertyRef {
            property: property.to_string(),
        })
    }
}

impl Default for Operand {
    fn default() -> Self {
        Operand::Literal(Value::Null)
    }
}

/// Request context an override condition is evaluated against
pub type EvaluationContext = serde_json::Map<String, Value>;
