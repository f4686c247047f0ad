use crate::rules::ActionType;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_action() -> ActionType {
    ActionType::Block
}

/// Boolean expression over catalog predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionExpr {
    /// A single named predicate from the protocol's catalog entry
    Predicate {
        predicate: String,
        #[serde(default)]
        value: Value,
    },
    /// Negate an expression
    Not { expr: Box<ConditionExpr> },
    /// All expressions must match
    All { exprs: Vec<ConditionExpr> },
    /// Any expression must match
    Any { exprs: Vec<ConditionExpr> },
}

impl ConditionExpr {
    pub fn predicate(predicate: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Predicate {
            predicate: predicate.into(),
            value: value.into(),
        }
    }

    pub fn not(expr: ConditionExpr) -> Self {
        Self::Not {
            expr: Box::new(expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ConditionRule {
    pub order: i64,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub enabled: bool,
    /// Overwritten with the owning service's protocol on every write
    #[serde(default)]
    #[builder(default)]
    pub protocol: String,
    #[serde(default = "default_action")]
    #[builder(default = ActionType::Block)]
    pub action_type: ActionType,
    pub expression: ConditionExpr,
}
