use sqlx::{Sqlite, Transaction, query, query_as};

use crate::{
    Result,
    database::{
        ConditionRuleRow, RuleRow, RuleTable, ScriptRuleRow, ServiceRecord, error::DatabaseError,
    },
};

/// Database operations that can be executed
#[derive(Debug, Clone)]
pub enum DbOp<'a> {
    // Service operations
    InsertService(&'a ServiceRecord),
    ListServices,
    GetService(&'a str),
    DeleteService(&'a str),

    // Rule operations
    ListRules {
        table: RuleTable,
        service_name: &'a str,
    },
    DeleteRules {
        table: RuleTable,
        service_name: &'a str,
    },
    InsertRule(&'a RuleRow),
    RuleBounds {
        table: RuleTable,
        service_name: &'a str,
    },
}

/// Result of a database operation
#[derive(Debug)]
pub enum DbOpResult {
    Unit,
    Affected(u64),
    Services(Vec<ServiceRecord>),
    Service(Option<ServiceRecord>),
    Rules(Vec<RuleRow>),
    Bounds {
        max_order: Option<i64>,
        max_seq: Option<i64>,
    },
}

const CONDITION_COLUMNS: &str =
    "service_name, seq, rule_order, enabled, protocol, action_type, expression";
const SCRIPT_COLUMNS: &str =
    "service_name, seq, rule_order, enabled, protocol, name, script, action_type, boolean_operator";

fn table_name(table: RuleTable) -> &'static str {
    match table {
        RuleTable::Condition => "condition_rules",
        RuleTable::Script => "script_rules",
    }
}

/// Execute a database operation
pub async fn execute_op(tx: &mut Transaction<'_, Sqlite>, op: &DbOp<'_>) -> Result<DbOpResult> {
    match op {
        // Service operations
        DbOp::InsertService(service) => {
            query(
                "INSERT INTO services (name, protocol, port, proxy_port, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&service.name)
            .bind(&service.protocol)
            .bind(service.port)
            .bind(service.proxy_port)
            .bind(service.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    DatabaseError::duplicate_entry("services", "name", &service.name)
                }
                e => DatabaseError::query_failed("insert service", "Failed to insert service", e),
            })?;
            Ok(DbOpResult::Unit)
        }

        DbOp::ListServices => {
            let services = query_as::<_, ServiceRecord>(
                "SELECT name, protocol, port, proxy_port, created_at FROM services ORDER BY name",
            )
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| {
                DatabaseError::query_failed("list services", "Failed to list services", e)
            })?;
            Ok(DbOpResult::Services(services))
        }

        DbOp::GetService(name) => {
            let service = query_as::<_, ServiceRecord>(
                "SELECT name, protocol, port, proxy_port, created_at FROM services WHERE name = ?",
            )
            .bind(*name)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| DatabaseError::query_failed("get service", "Failed to get service", e))?;
            Ok(DbOpResult::Service(service))
        }

        DbOp::DeleteService(name) => {
            let result = query("DELETE FROM services WHERE name = ?")
                .bind(*name)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    DatabaseError::query_failed("delete service", "Failed to delete service", e)
                })?;
            Ok(DbOpResult::Affected(result.rows_affected()))
        }

        // Rule operations
        DbOp::ListRules {
            table,
            service_name,
        } => {
            let rows = match table {
                RuleTable::Condition => query_as::<_, ConditionRuleRow>(&format!(
                    "SELECT {} FROM condition_rules WHERE service_name = ? ORDER BY rule_order ASC, seq ASC",
                    CONDITION_COLUMNS
                ))
                .bind(*service_name)
                .fetch_all(&mut **tx)
                .await
                .map(|rows| rows.into_iter().map(RuleRow::Condition).collect::<Vec<_>>()),
                RuleTable::Script => query_as::<_, ScriptRuleRow>(&format!(
                    "SELECT {} FROM script_rules WHERE service_name = ? ORDER BY rule_order ASC, seq ASC",
                    SCRIPT_COLUMNS
                ))
                .bind(*service_name)
                .fetch_all(&mut **tx)
                .await
                .map(|rows| rows.into_iter().map(RuleRow::Script).collect::<Vec<_>>()),
            }
            .map_err(|e| {
                DatabaseError::query_failed(
                    format!("list {} rules", table.label()),
                    format!("Failed to list rules of service {}", service_name),
                    e,
                )
            })?;
            Ok(DbOpResult::Rules(rows))
        }

        DbOp::DeleteRules {
            table,
            service_name,
        } => {
            let result = query(&format!(
                "DELETE FROM {} WHERE service_name = ?",
                table_name(*table)
            ))
            .bind(*service_name)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                DatabaseError::query_failed(
                    format!("delete {} rules", table.label()),
                    format!("Failed to delete rules of service {}", service_name),
                    e,
                )
            })?;
            Ok(DbOpResult::Affected(result.rows_affected()))
        }

        DbOp::InsertRule(RuleRow::Condition(rule)) => {
            query(&format!(
                "INSERT INTO condition_rules ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                CONDITION_COLUMNS
            ))
            .bind(&rule.service_name)
            .bind(rule.seq)
            .bind(rule.rule_order)
            .bind(rule.enabled)
            .bind(&rule.protocol)
            .bind(&rule.action_type)
            .bind(&rule.expression)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                DatabaseError::query_failed(
                    "insert condition rule",
                    "Failed to insert condition rule",
                    e,
                )
            })?;
            Ok(DbOpResult::Unit)
        }

        DbOp::InsertRule(RuleRow::Script(rule)) => {
            query(&format!(
                "INSERT INTO script_rules ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SCRIPT_COLUMNS
            ))
            .bind(&rule.service_name)
            .bind(rule.seq)
            .bind(rule.rule_order)
            .bind(rule.enabled)
            .bind(&rule.protocol)
            .bind(&rule.name)
            .bind(&rule.script)
            .bind(&rule.action_type)
            .bind(&rule.boolean_operator)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                DatabaseError::query_failed("insert script rule", "Failed to insert script rule", e)
            })?;
            Ok(DbOpResult::Unit)
        }

        DbOp::RuleBounds {
            table,
            service_name,
        } => {
            let (max_order, max_seq) = query_as::<_, (Option<i64>, Option<i64>)>(&format!(
                "SELECT MAX(rule_order), MAX(seq) FROM {} WHERE service_name = ?",
                table_name(*table)
            ))
            .bind(*service_name)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                DatabaseError::query_failed(
                    format!("{} rule bounds", table.label()),
                    format!("Failed to read rule bounds of service {}", service_name),
                    e,
                )
            })?;
            Ok(DbOpResult::Bounds { max_order, max_seq })
        }
    }
}
