use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Unknown action type '{token}' in default rule {}", file.display())]
    UnknownActionType { token: String, file: PathBuf },

    #[error("Default rule file name {} is invalid: {reason}", file.display())]
    InvalidFileName { file: PathBuf, reason: String },

    #[error("Default rule manifest {} is invalid: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Failed to read default rules directory {}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read default rule script {}", path.display())]
    ScriptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reading default rules from {} did not complete: {reason}", dir.display())]
    TaskFailed { dir: PathBuf, reason: String },
}
