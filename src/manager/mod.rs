pub mod error;
pub mod rules;
pub mod services;
#[cfg(test)]
mod tests;

use crate::{
    Result,
    bootstrap::DefaultRules,
    catalog::{ConditionCatalog, ConditionOption},
    database::DB,
};
use bon::bon;
use error::ManagerError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub use rules::{Decision, RuleKind, RuleSnapshot};
pub use services::{CreatedService, NewService};

/// Owns the rule stores of every service.
///
/// Reads go straight to the pool. Writers (replacements, bootstrap runs,
/// service creation and deletion) take `write_lock` first, so concurrent
/// replacements of the same set resolve as last-writer-wins.
pub struct RuleManager {
    db: DB,
    catalog: Arc<ConditionCatalog>,
    default_rules: Option<DefaultRules>,
    bootstrap_on_create: bool,
    write_lock: Mutex<()>,
}

#[bon]
impl RuleManager {
    #[builder]
    pub async fn new(
        db_path: &Path,
        #[builder(default = Duration::from_secs(1))] busy_timeout: Duration,
        catalog: Option<Arc<ConditionCatalog>>,
        default_rules_dir: Option<&Path>,
        #[builder(default = true)] bootstrap_on_create: bool,
    ) -> Result<Self> {
        if let Some(dir) = default_rules_dir {
            if !dir.is_dir() {
                return Err(ManagerError::initialization_failed(
                    format!("default rules directory {} does not exist", dir.display()),
                    "bootstrap",
                )
                .into());
            }
        }

        let db = DB::builder()
            .db_path(db_path)
            .busy_timeout(busy_timeout)
            .build()
            .await?;

        let catalog = catalog.unwrap_or_else(|| Arc::new(ConditionCatalog::builtin()));
        let default_rules = default_rules_dir.map(DefaultRules::new);

        info!(
            db = %db_path.display(),
            protocols = ?catalog.protocol_names(),
            default_rules = ?default_rules.as_ref().map(|d| d.dir().display().to_string()),
            bootstrap_on_create,
            "Rule manager ready"
        );

        let manager = Self {
            db,
            catalog,
            default_rules,
            bootstrap_on_create,
            write_lock: Mutex::new(()),
        };
        manager.refresh_active_services().await;
        Ok(manager)
    }

    pub fn catalog(&self) -> &Arc<ConditionCatalog> {
        &self.catalog
    }

    /// Predicates rule authors may use for `protocol`.
    pub fn condition_options(&self, protocol: &str) -> Result<Vec<ConditionOption>> {
        self.catalog.options(protocol)
    }

    /// Close the underlying connection pool.
    pub async fn close(self) {
        self.db.close().await;
    }
}
