//! Seeding of default script rules for newly created services.
//!
//! Default rules live as script files in a directory, named
//! `<protocol>_<action_type>_<name>.py`. An optional `manifest.yaml` in
//! the same directory lists the entries explicitly and fixes their order.

pub mod error;
mod manifest;


use crate::Result;
use crate::rules::{ActionType, BooleanOperator, ScriptRule};
use error::BootstrapError;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use manifest::{DefaultRuleEntry, DefaultRuleManifest, MANIFEST_FILE, SCRIPT_EXTENSION};

/// Directory of default rule scripts.
#[derive(Debug, Clone)]
pub struct DefaultRules {
    dir: PathBuf,
}

impl DefaultRules {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the script rules a service of `protocol` receives.
    ///
    /// Orders continue after `existing_max_order` so seeded rules never
    /// displace rules already stored for the service. Every matching
    /// entry must carry a known action type; one bad token fails the
    /// whole run before anything is returned.
    pub fn plan(&self, protocol: &str, existing_max_order: Option<i64>) -> Result<Vec<ScriptRule>> {
        let manifest = DefaultRuleManifest::load(&self.dir)?;
        let mut rules = Vec::new();

        for entry in manifest.for_protocol(protocol) {
            let action_type = entry.action_token.parse::<ActionType>().map_err(|_| {
                BootstrapError::UnknownActionType {
                    token: entry.action_token.clone(),
                    file: entry.path.clone(),
                }
            })?;

            let script = std::fs::read_to_string(&entry.path).map_err(|e| {
                BootstrapError::ScriptUnreadable {
                    path: entry.path.clone(),
                    source: e,
                }
            })?;

            rules.push(
                ScriptRule::builder()
                    .name(entry.name.clone())
                    .script(script)
                    .action_type(action_type)
                    .boolean_operator(BooleanOperator::And)
                    .order(0)
                    .enabled(true)
                    .protocol(protocol)
                    .build(),
            );
        }
        renumber_after(&mut rules, existing_max_order);

        debug!(
            protocol,
            dir = %self.dir.display(),
            count = rules.len(),
            "Planned default rules"
        );
        Ok(rules)
    }

    /// [`plan`](Self::plan) on the blocking thread pool, with orders starting
    /// at 0. Callers holding a transaction shift them with [`renumber_after`].
    pub async fn plan_detached(&self, protocol: &str) -> Result<Vec<ScriptRule>> {
        let defaults = self.clone();
        let protocol = protocol.to_string();

        tokio::task::spawn_blocking(move || defaults.plan(&protocol, None))
            .await
            .map_err(|e| BootstrapError::TaskFailed {
                dir: self.dir.clone(),
                reason: e.to_string(),
            })?
    }
}

/// Give `rules` consecutive orders after `existing_max_order`, or from 0.
pub fn renumber_after(rules: &mut [ScriptRule], existing_max_order: Option<i64>) {
    let first = existing_max_order.map_or(0, |max| max + 1);
    for (offset, rule) in rules.iter_mut().enumerate() {
        rule.order = first + offset as i64;
    }
}
