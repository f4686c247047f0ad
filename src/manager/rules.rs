use super::RuleManager;
use super::error::ManagerError;
use crate::{
    Result,
    catalog::ConditionCatalog,
    database::{
        ConditionRuleRow, DbOp, DbOpResult, RuleRow, RuleTable, ScriptRuleRow, ServiceRecord,
        error::DatabaseError,
    },
    rules::{
        ActionType, ChainOutcome, ConditionOutcome, ConditionRule, ScriptExecutor, ScriptRule,
        TrafficUnit, ValidationError, evaluate_conditions, evaluate::strongest, run_script_chain,
        validation::{validate_condition_rules, validate_script_rules},
    },
    server,
};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A rule kind with its own stored collection per service.
pub trait RuleKind: Serialize + DeserializeOwned + Send + Sync + Sized {
    const TABLE: RuleTable;

    fn stamp_protocol(&mut self, protocol: &str);

    fn validate_set(rules: &[Self], catalog: &ConditionCatalog) -> Result<()>;

    fn to_row(&self, service_name: &str, seq: i64) -> Result<RuleRow>;

    fn from_row(row: RuleRow) -> Result<Self>;
}

fn wrong_table(expected: RuleTable) -> crate::Error {
    ManagerError::unexpected_result(format!("decoding {} rule row", expected.label())).into()
}

fn parse_column<T: std::str::FromStr<Err = ValidationError>>(
    data_type: &str,
    column: &str,
    raw: &str,
    seq: i64,
) -> Result<T> {
    raw.parse::<T>().map_err(|e| {
        DatabaseError::deserialization_failed(data_type, e.to_string(), column, Some(seq)).into()
    })
}

impl RuleKind for ConditionRule {
    const TABLE: RuleTable = RuleTable::Condition;

    fn stamp_protocol(&mut self, protocol: &str) {
        self.protocol = protocol.to_string();
    }

    fn validate_set(rules: &[Self], catalog: &ConditionCatalog) -> Result<()> {
        validate_condition_rules(rules, catalog)
    }

    fn to_row(&self, service_name: &str, seq: i64) -> Result<RuleRow> {
        Ok(RuleRow::Condition(ConditionRuleRow {
            service_name: service_name.to_string(),
            seq,
            rule_order: self.order,
            enabled: self.enabled,
            protocol: self.protocol.clone(),
            action_type: self.action_type.to_string(),
            expression: serde_json::to_string(&self.expression)?,
        }))
    }

    fn from_row(row: RuleRow) -> Result<Self> {
        let RuleRow::Condition(row) = row else {
            return Err(wrong_table(Self::TABLE));
        };

        let expression = serde_json::from_str(&row.expression).map_err(|e| {
            DatabaseError::deserialization_failed(
                "condition expression",
                e.to_string(),
                "expression",
                Some(row.seq),
            )
        })?;

        Ok(Self {
            order: row.rule_order,
            enabled: row.enabled,
            action_type: parse_column("action type", "action_type", &row.action_type, row.seq)?,
            protocol: row.protocol,
            expression,
        })
    }
}

impl RuleKind for ScriptRule {
    const TABLE: RuleTable = RuleTable::Script;

    fn stamp_protocol(&mut self, protocol: &str) {
        self.protocol = protocol.to_string();
    }

    fn validate_set(rules: &[Self], _catalog: &ConditionCatalog) -> Result<()> {
        validate_script_rules(rules)
    }

    fn to_row(&self, service_name: &str, seq: i64) -> Result<RuleRow> {
        Ok(RuleRow::Script(ScriptRuleRow {
            service_name: service_name.to_string(),
            seq,
            rule_order: self.order,
            enabled: self.enabled,
            protocol: self.protocol.clone(),
            name: self.name.clone(),
            script: self.script.clone(),
            action_type: self.action_type.to_string(),
            boolean_operator: self.boolean_operator.to_string(),
        }))
    }

    fn from_row(row: RuleRow) -> Result<Self> {
        let RuleRow::Script(row) = row else {
            return Err(wrong_table(Self::TABLE));
        };

        Ok(Self {
            action_type: parse_column("action type", "action_type", &row.action_type, row.seq)?,
            boolean_operator: parse_column(
                "boolean operator",
                "boolean_operator",
                &row.boolean_operator,
                row.seq,
            )?,
            name: row.name,
            script: row.script,
            order: row.rule_order,
            enabled: row.enabled,
            protocol: row.protocol,
        })
    }
}

/// Rules of both kinds for one service, read in a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSnapshot {
    pub service: ServiceRecord,
    pub conditions: Vec<ConditionRule>,
    pub scripts: Vec<ScriptRule>,
}

/// Combined outcome of both rule kinds for one traffic unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub verdict: ActionType,
    pub conditions: ConditionOutcome,
    pub scripts: ChainOutcome,
}

impl RuleSnapshot {
    /// Run condition rules and the script chain against `unit`.
    pub fn evaluate<E>(
        &self,
        catalog: &ConditionCatalog,
        unit: &TrafficUnit,
        executor: &mut E,
    ) -> Result<Decision>
    where
        E: ScriptExecutor + ?Sized,
    {
        let conditions = match catalog.lookup(&self.service.protocol) {
            Some(predicates) => evaluate_conditions(&self.conditions, predicates, unit)?,
            None if self.conditions.is_empty() => ConditionOutcome {
                verdict: ActionType::Allow,
                matched: None,
                logged: Vec::new(),
            },
            None => {
                return Err(ValidationError::ProtocolHasNoConditions {
                    protocol: self.service.protocol.clone(),
                }
                .into());
            }
        };
        let scripts = run_script_chain(&self.scripts, unit, executor)?;

        Ok(Decision {
            verdict: strongest([conditions.verdict, scripts.verdict]),
            conditions,
            scripts,
        })
    }
}

fn decode_rows<R: RuleKind>(result: Option<DbOpResult>) -> Result<Vec<R>> {
    match result {
        Some(DbOpResult::Rules(rows)) => rows.into_iter().map(R::from_row).collect(),
        _ => {
            let operation = format!("listing {} rules", R::TABLE.label());
            Err(ManagerError::unexpected_result(operation).into())
        }
    }
}

impl RuleManager {
    /// Rules of kind `R` for a service, by order then insertion sequence.
    pub async fn list_rules<R: RuleKind>(&self, service_name: &str) -> Result<Vec<R>> {
        let ops = [
            DbOp::GetService(service_name),
            DbOp::ListRules {
                table: R::TABLE,
                service_name,
            },
        ];
        let mut results = self
            .db
            .transaction()
            .execute_ops(&ops)
            .await?
            .commit()
            .await?
            .into_result()
            .into_iter();

        match results.next() {
            Some(DbOpResult::Service(Some(_))) => {}
            Some(DbOpResult::Service(None)) => {
                return Err(crate::Error::service_not_found(service_name));
            }
            _ => return Err(ManagerError::unexpected_result("resolving service").into()),
        }

        decode_rows(results.next())
    }

    /// Both rule sets of a service as one consistent view.
    pub async fn snapshot(&self, service_name: &str) -> Result<RuleSnapshot> {
        let ops = [
            DbOp::GetService(service_name),
            DbOp::ListRules {
                table: RuleTable::Condition,
                service_name,
            },
            DbOp::ListRules {
                table: RuleTable::Script,
                service_name,
            },
        ];
        let mut results = self
            .db
            .transaction()
            .execute_ops(&ops)
            .await?
            .commit()
            .await?
            .into_result()
            .into_iter();

        let service = match results.next() {
            Some(DbOpResult::Service(Some(service))) => service,
            Some(DbOpResult::Service(None)) => {
                return Err(crate::Error::service_not_found(service_name));
            }
            _ => return Err(ManagerError::unexpected_result("resolving service").into()),
        };

        Ok(RuleSnapshot {
            service,
            conditions: decode_rows(results.next())?,
            scripts: decode_rows(results.next())?,
        })
    }

    /// Replace the full rule set of kind `R` with the JSON array in `payload`.
    ///
    /// Returns the number of rules installed. On any failure the previous
    /// set stays in place.
    pub async fn replace_rules<R: RuleKind>(
        &self,
        service_name: &str,
        payload: &[u8],
    ) -> Result<usize> {
        let started = Instant::now();
        let result = self.replace_from_payload::<R>(service_name, payload).await;

        match &result {
            Ok(count) => {
                server::increment_rules_replaced(R::TABLE.label());
                server::record_rule_replace_duration(started.elapsed());
                info!(
                    service = %service_name,
                    kind = R::TABLE.label(),
                    count,
                    "Rule set replaced"
                );
            }
            Err(e) => {
                server::increment_replace_failures(R::TABLE.label());
                warn!(
                    service = %service_name,
                    kind = R::TABLE.label(),
                    "Rule set replacement rejected: {}",
                    e
                );
            }
        }

        result
    }

    async fn replace_from_payload<R: RuleKind>(
        &self,
        service_name: &str,
        payload: &[u8],
    ) -> Result<usize> {
        let service = self.get_service(service_name).await?;

        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(ManagerError::empty_payload(service_name, R::TABLE.label()).into());
        }

        let rules: Vec<R> = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::malformed(R::TABLE.label(), e.to_string()))?;

        if rules.is_empty() {
            return Err(ManagerError::empty_payload(service_name, R::TABLE.label()).into());
        }

        self.install_rules(&service.name, &service.protocol, rules).await
    }

    async fn install_rules<R: RuleKind>(
        &self,
        service_name: &str,
        protocol: &str,
        mut rules: Vec<R>,
    ) -> Result<usize> {
        for rule in &mut rules {
            rule.stamp_protocol(protocol);
        }
        R::validate_set(&rules, &self.catalog)?;

        // seq keeps the payload position, which breaks ties between equal orders
        let rows = rules
            .iter()
            .enumerate()
            .map(|(seq, rule)| rule.to_row(service_name, seq as i64))
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.write_lock.lock().await;

        let tx = self
            .db
            .transaction()
            .execute_ops(&[DbOp::GetService(service_name)])
            .await?;

        // the service may have been deleted since it was resolved
        if let Some(DbOpResult::Service(None)) = tx.result().first() {
            tx.rollback().await?;
            return Err(crate::Error::service_not_found(service_name));
        }

        let mut ops = Vec::with_capacity(rows.len() + 1);
        ops.push(DbOp::DeleteRules {
            table: R::TABLE,
            service_name,
        });
        ops.extend(rows.iter().map(DbOp::InsertRule));

        let committed = tx.execute_ops(&ops).await?.commit().await?;
        let removed = match committed.result().get(1) {
            Some(DbOpResult::Affected(n)) => *n,
            _ => 0,
        };

        debug!(
            service = %service_name,
            kind = R::TABLE.label(),
            removed,
            installed = rows.len(),
            "Rule rows swapped"
        );
        Ok(rows.len())
    }
}
