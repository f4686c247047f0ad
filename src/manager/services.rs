use super::RuleManager;
use super::error::ManagerError;
use crate::{
    Error, Result,
    bootstrap::renumber_after,
    database::{DbOp, DbOpResult, RuleRow, RuleTable, ServiceRecord, error::DatabaseError},
    manager::rules::RuleKind,
    rules::ScriptRule,
    server,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Request body for creating a service.
#[derive(Debug, Clone, Deserialize)]
pub struct NewService {
    pub name: String,
    pub protocol: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub proxy_port: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedService {
    pub service: ServiceRecord,
    /// Default script rules installed with the service
    pub seeded: usize,
}

fn check_new_service(new: &NewService) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(ManagerError::invalid_service("name", "must not be empty").into());
    }
    if new.name.contains('/') {
        return Err(ManagerError::invalid_service("name", "must not contain '/'").into());
    }
    if new.protocol.trim().is_empty() {
        return Err(ManagerError::invalid_service("protocol", "must not be empty").into());
    }
    for (field, port) in [("port", new.port), ("proxy_port", new.proxy_port)] {
        if let Some(port) = port {
            if !(1..=65535).contains(&port) {
                let reason = format!("{} is not a TCP port", port);
                return Err(ManagerError::invalid_service(field, reason).into());
            }
        }
    }
    Ok(())
}

fn seed_rows(service_name: &str, rules: &[ScriptRule], first_seq: i64) -> Result<Vec<RuleRow>> {
    rules
        .iter()
        .enumerate()
        .map(|(i, rule)| rule.to_row(service_name, first_seq + i as i64))
        .collect()
}

impl RuleManager {
    /// Register a service and, unless disabled, seed its default script rules
    /// in the same transaction.
    pub async fn create_service(&self, new: NewService) -> Result<CreatedService> {
        check_new_service(&new)?;

        let service = ServiceRecord::builder()
            .name(new.name.trim())
            .protocol(new.protocol.trim())
            .maybe_port(new.port)
            .maybe_proxy_port(new.proxy_port)
            .build();

        let seeds = match (&self.default_rules, self.bootstrap_on_create) {
            (Some(defaults), true) => defaults.plan_detached(&service.protocol).await?,
            _ => Vec::new(),
        };
        let rows = seed_rows(&service.name, &seeds, 0)?;

        let _guard = self.write_lock.lock().await;

        let mut ops = Vec::with_capacity(rows.len() + 1);
        ops.push(DbOp::InsertService(&service));
        ops.extend(rows.iter().map(DbOp::InsertRule));

        let executed = self.db.transaction().execute_ops(&ops).await.map_err(|e| match e {
            Error::DatabaseModule(DatabaseError::DuplicateEntry { value, .. }) => {
                ManagerError::ServiceAlreadyExists { name: value }.into()
            }
            e => e,
        })?;
        executed.commit().await?;

        if !rows.is_empty() {
            server::increment_default_rules_seeded(rows.len() as u64);
        }
        self.refresh_active_services().await;

        info!(
            service = %service.name,
            protocol = %service.protocol,
            seeded = rows.len(),
            "Service created"
        );

        Ok(CreatedService {
            seeded: rows.len(),
            service,
        })
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        match self.db.execute(&DbOp::ListServices).await? {
            DbOpResult::Services(services) => Ok(services),
            _ => Err(ManagerError::unexpected_result("listing services").into()),
        }
    }

    pub async fn get_service(&self, name: &str) -> Result<ServiceRecord> {
        match self.db.execute(&DbOp::GetService(name)).await? {
            DbOpResult::Service(Some(service)) => Ok(service),
            DbOpResult::Service(None) => Err(Error::service_not_found(name)),
            _ => Err(ManagerError::unexpected_result("resolving service").into()),
        }
    }

    /// Remove a service together with all of its rules.
    pub async fn delete_service(&self, name: &str) -> Result<()> {
        let guard = self.write_lock.lock().await;

        match self.db.execute(&DbOp::DeleteService(name)).await? {
            DbOpResult::Affected(0) => return Err(Error::service_not_found(name)),
            DbOpResult::Affected(_) => {}
            _ => return Err(ManagerError::unexpected_result("deleting service").into()),
        }
        drop(guard);

        self.refresh_active_services().await;
        info!(service = %name, "Service deleted");
        Ok(())
    }

    /// Append the default script rules for the service's protocol after any
    /// script rules it already has. Returns the number of rules added.
    pub async fn bootstrap_service(&self, name: &str) -> Result<usize> {
        let Some(defaults) = &self.default_rules else {
            debug!(service = %name, "No default rules directory configured");
            return Ok(0);
        };

        // script files are read before the write lock and transaction are taken
        let protocol = self.get_service(name).await?.protocol;
        let mut seeds = defaults.plan_detached(&protocol).await?;

        let _guard = self.write_lock.lock().await;

        let service_name = name;
        let tx = self
            .db
            .transaction()
            .execute_ops(&[
                DbOp::GetService(service_name),
                DbOp::RuleBounds {
                    table: ScriptRule::TABLE,
                    service_name,
                },
            ])
            .await?;

        let service = match tx.result().first() {
            Some(DbOpResult::Service(Some(service))) => service.clone(),
            Some(DbOpResult::Service(None)) => {
                tx.rollback().await?;
                return Err(Error::service_not_found(name));
            }
            _ => return Err(ManagerError::unexpected_result("resolving service").into()),
        };
        let (max_order, max_seq) = match tx.result().get(1) {
            Some(DbOpResult::Bounds { max_order, max_seq }) => (*max_order, *max_seq),
            _ => return Err(ManagerError::unexpected_result("reading rule bounds").into()),
        };

        // recreated under the same name with another protocol
        if !service.protocol.eq_ignore_ascii_case(&protocol) {
            tx.rollback().await?;
            let operation = "seeding a service whose protocol changed";
            return Err(ManagerError::unexpected_result(operation).into());
        }

        renumber_after(&mut seeds, max_order);
        let rows = seed_rows(&service.name, &seeds, max_seq.map_or(0, |seq| seq + 1))?;
        let ops: Vec<DbOp> = rows.iter().map(DbOp::InsertRule).collect();

        tx.execute_ops(&ops).await?.commit().await?;

        if !rows.is_empty() {
            server::increment_default_rules_seeded(rows.len() as u64);
        }
        info!(
            service = %name,
            table = RuleTable::Script.label(),
            seeded = rows.len(),
            "Default rules seeded"
        );
        Ok(rows.len())
    }

    pub(super) async fn refresh_active_services(&self) {
        match self.list_services().await {
            Ok(services) => server::set_active_services(services.len() as u64),
            Err(e) => debug!("Could not refresh service gauge: {}", e),
        }
    }
}
