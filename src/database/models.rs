use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A protected service and the protocol its rules are bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder, sqlx::FromRow)]
pub struct ServiceRecord {
    #[builder(into)]
    pub name: String,
    #[builder(into)]
    pub protocol: String,
    pub port: Option<i64>,
    pub proxy_port: Option<i64>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

/// Which rule collection an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTable {
    Condition,
    Script,
}

impl RuleTable {
    pub fn label(&self) -> &'static str {
        match self {
            RuleTable::Condition => "condition",
            RuleTable::Script => "script",
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ConditionRuleRow {
    pub service_name: String,
    pub seq: i64,
    pub rule_order: i64,
    pub enabled: bool,
    pub protocol: String,
    pub action_type: String,
    /// JSON-encoded expression tree
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ScriptRuleRow {
    pub service_name: String,
    pub seq: i64,
    pub rule_order: i64,
    pub enabled: bool,
    pub protocol: String,
    pub name: String,
    pub script: String,
    pub action_type: String,
    pub boolean_operator: String,
}

/// A stored rule of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleRow {
    Condition(ConditionRuleRow),
    Script(ScriptRuleRow),
}
