use crate::rules::{ActionType, BooleanOperator};
use bon::Builder;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct ScriptRule {
    #[serde(default)]
    #[builder(default, into)]
    pub name: String,
    #[builder(into)]
    pub script: String,
    pub action_type: ActionType,
    #[serde(default)]
    #[builder(default)]
    pub boolean_operator: BooleanOperator,
    pub order: i64,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub enabled: bool,
    #[serde(default)]
    #[builder(default, into)]
    pub protocol: String,
}
