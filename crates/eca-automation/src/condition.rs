//! Condition types
//!
//! Conditions are side-effect-free gates evaluated after a trigger fires.
//! All conditions of a rule must pass for its actions to execute.

use serde::{Deserialize, Serialize};

/// Condition definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    /// String signal must equal one of the listed values
    StateEquals(StateEqualsCondition),

    /// Numeric signal compared against a literal
    NumericCompare(NumericCompareCondition),
}

/// State equality condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEqualsCondition {
    /// Entity whose string value is checked
    pub entity: String,

    /// Accepted values
    pub one_of: Vec<String>,
}

/// Numeric comparison condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericCompareCondition {
    /// Entity whose numeric value is checked
    pub entity: String,

    /// Comparison operator
    pub op: CompareOp,

    /// Literal to compare against
    pub value: f64,
}

/// Comparison operator
///
/// A closed set: an unrecognized operator fails at deserialization time,
/// which is the load-time validation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl CompareOp {
    /// Apply the operator
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_equals_deserialize() {
        let json = r#"{
            "condition": "state_equals",
            "entity": "mode",
            "one_of": ["home", "away"]
        }"#;

        let cond: Condition = serde_json::from_str(json).unwrap();
        if let Condition::StateEquals(c) = cond {
            assert_eq!(c.entity, "mode");
            assert_eq!(c.one_of, vec!["home", "away"]);
        } else {
            panic!("Expected state_equals condition");
        }
    }

    #[test]
    fn test_numeric_compare_deserialize() {
        let json = r#"{
            "condition": "numeric_compare",
            "entity": "temperature",
            "op": ">=",
            "value": 21.5
        }"#;

        let cond: Condition = serde_json::from_str(json).unwrap();
        if let Condition::NumericCompare(c) = cond {
            assert_eq!(c.op, CompareOp::Ge);
            assert_eq!(c.value, 21.5);
        } else {
            panic!("Expected numeric_compare condition");
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let json = r#"{
            "condition": "numeric_compare",
            "entity": "x",
            "op": "~=",
            "value": 1.0
        }"#;

        assert!(serde_json::from_str::<Condition>(json).is_err());
    }

    #[test]
    fn test_compare_op_apply() {
        assert!(CompareOp::Eq.apply(1.0, 1.0));
        assert!(CompareOp::Ne.apply(1.0, 2.0));
        assert!(CompareOp::Gt.apply(2.0, 1.0));
        assert!(CompareOp::Ge.apply(1.0, 1.0));
        assert!(CompareOp::Lt.apply(1.0, 2.0));
        assert!(CompareOp::Le.apply(2.0, 2.0));
        assert!(!CompareOp::Gt.apply(1.0, 1.0));
    }
}
