use bridge_traits::error::BridgeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Malformed remote snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("No projects available: no project named '{default_project}' and no personal project")]
    NoProjectsAvailable { default_project: String },

    #[error("Ambiguous match for '{name}': {} candidates ({})", candidates.len(), candidates.join(", "))]
    AmbiguousMatch {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Version conflict on workflow {workflow_id}: {message}")]
    VersionConflict {
        workflow_id: String,
        message: String,
    },

    #[error("License restriction: {0}")]
    LicenseRestricted(String),

    #[error("Invalid workflow id format: {0}")]
    InvalidIdFormat(String),

    #[error("Manifest error at line {line}: {message}")]
    Manifest { line: usize, message: String },

    #[error("Failed to scan {path}: {message}")]
    Scan { path: PathBuf, message: String },

    #[error("Invalid sync state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RestoreError {
    /// Errors that abort the current stage
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RestoreError::AmbiguousMatch { .. }
                | RestoreError::VersionConflict { .. }
                | RestoreError::LicenseRestricted(_)
                | RestoreError::InvalidIdFormat(_)
                | RestoreError::Scan { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_match_lists_candidates() {
        let error = RestoreError::AmbiguousMatch {
            name: "Untitled".to_string(),
            candidates: vec!["wf1".to_string(), "wf2".to_string()],
        };

        assert_eq!(
            error.to_string(),
            "Ambiguous match for 'Untitled': 2 candidates (wf1, wf2)"
        );
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_snapshot_errors_are_fatal() {
        assert!(RestoreError::MalformedSnapshot("bad".to_string()).is_fatal());
        assert!(RestoreError::NoProjectsAvailable {
            default_project: "Personal".to_string()
        }
        .is_fatal());
    }
}
