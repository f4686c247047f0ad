use super::error::BootstrapError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File in the default rules directory that lists entries explicitly.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Extension of default rule scripts picked up by a directory scan.
pub const SCRIPT_EXTENSION: &str = "py";

/// One default script rule, before its action token is decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRuleEntry {
    pub path: PathBuf,
    pub protocol: String,
    pub action_token: String,
    pub name: String,
}

impl DefaultRuleEntry {
    /// Parse `<protocol>_<action_type>_<name>.py`; the name keeps any
    /// further underscores.
    pub fn from_file_name(path: &Path) -> Result<Self, BootstrapError> {
        let invalid = |reason: &str| BootstrapError::InvalidFileName {
            file: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| invalid("file name is not valid UTF-8"))?;

        let mut parts = stem.splitn(3, '_');
        let (Some(protocol), Some(action_token), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected <protocol>_<action_type>_<name>"));
        };

        if protocol.is_empty() || action_token.is_empty() || name.is_empty() {
            return Err(invalid("protocol, action type and name must not be empty"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            protocol: protocol.to_string(),
            action_token: action_token.to_string(),
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    rules: Vec<ManifestRecord>,
}

#[derive(Debug, Deserialize)]
struct ManifestRecord {
    file: PathBuf,
    protocol: String,
    action_type: String,
    name: String,
}

/// Ordered list of default rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultRuleManifest {
    entries: Vec<DefaultRuleEntry>,
}

impl DefaultRuleManifest {
    /// Read `manifest.yaml` from `dir` when present, otherwise derive the
    /// entries from `.py` file names sorted lexicographically.
    pub fn load(dir: &Path) -> Result<Self, BootstrapError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let yaml = std::fs::read_to_string(&manifest_path).map_err(|e| {
                BootstrapError::ScriptUnreadable {
                    path: manifest_path.clone(),
                    source: e,
                }
            })?;
            return Self::from_yaml(dir, &manifest_path, &yaml);
        }

        Self::scan(dir)
    }

    pub fn from_yaml(dir: &Path, manifest_path: &Path, yaml: &str) -> Result<Self, BootstrapError> {
        let file: ManifestFile =
            serde_yaml::from_str(yaml).map_err(|e| BootstrapError::InvalidManifest {
                path: manifest_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let entries = file
            .rules
            .into_iter()
            .map(|record| DefaultRuleEntry {
                path: dir.join(record.file),
                protocol: record.protocol,
                action_token: record.action_type,
                name: record.name,
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn scan(dir: &Path) -> Result<Self, BootstrapError> {
        let unreadable = |e| BootstrapError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || file_name.starts_with('.') || file_name == MANIFEST_FILE {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(SCRIPT_EXTENSION) {
                debug!(file = %path.display(), "Ignoring non-script file in default rules");
                continue;
            }
            paths.push(path);
        }

        // read_dir order is platform dependent
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match DefaultRuleEntry::from_file_name(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping default rule file: {}", e),
            }
        }

        debug!(dir = %dir.display(), count = entries.len(), "Default rules scanned");
        Ok(Self { entries })
    }

    /// Entries whose protocol matches, ignoring case, in manifest order.
    pub fn for_protocol<'a>(
        &'a self,
        protocol: &'a str,
    ) -> impl Iterator<Item = &'a DefaultRuleEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.protocol.eq_ignore_ascii_case(protocol))
    }
}
