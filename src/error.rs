// src/error.rs

//! Core error types for Cairn
//!
//! Configuration and argument errors (`InvalidUrl`, `InvalidArgument`,
//! `IndexOutOfRange`) are caller bugs and reported immediately. State-machine
//! violations (`State`) are always fatal to the current call. Domain failures
//! (`Unresolvable`, `Download`, `Test`, `Transaction`) carry enough structure
//! for the caller to decide between retry, abort, and manual intervention.

use std::fmt;
use thiserror::Error;

/// One repository that failed during a best-effort load fan-out.
#[derive(Debug)]
pub struct RepoFailure {
    pub repo_id: String,
    pub reason: String,
}

/// One planned action whose artifact could not be fetched.
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub nevra: String,
    pub reason: String,
}

/// A dependency that no installed or available package satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetRequirement {
    /// NEVRA of the package whose requirement is unmet.
    pub package: String,
    /// The requirement as written, e.g. `libssl >= 3.0`.
    pub requirement: String,
}

impl fmt::Display for UnmetRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requires {}", self.package, self.requirement)
    }
}

/// Everything that prevented a transaction from resolving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionProblems {
    pub unmet: Vec<UnmetRequirement>,
    pub conflicts: Vec<String>,
}

impl ResolutionProblems {
    pub fn is_empty(&self) -> bool {
        self.unmet.is_empty() && self.conflicts.is_empty()
    }
}

impl fmt::Display for ResolutionProblems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.unmet.iter().map(|u| u.to_string()).collect();
        parts.extend(self.conflicts.iter().cloned());
        write!(f, "{}", parts.join("; "))
    }
}

/// How a failed commit left the system.
#[derive(Debug, Clone)]
pub enum CommitFailure {
    /// The plan was rolled back; installed state is unchanged.
    NotApplied { reason: String },
    /// Rollback failed partway; the listed actions are still applied and
    /// manual intervention is required.
    PartiallyApplied { applied: Vec<String>, reason: String },
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitFailure::NotApplied { reason } => {
                write!(f, "nothing applied ({})", reason)
            }
            CommitFailure::PartiallyApplied { applied, reason } => {
                write!(
                    f,
                    "partially applied, manual intervention required ({}); still applied: {}",
                    reason,
                    applied.join(", ")
                )
            }
        }
    }
}

/// Core error types for Cairn
#[derive(Error, Debug)]
pub enum Error {
    /// Base setup called twice or with invalid configuration
    #[error("Setup error: {0}")]
    Setup(String),

    /// Empty or malformed repository URL
    #[error("Invalid repository URL: {0}")]
    InvalidUrl(String),

    /// Operation invoked in a state that does not permit it
    #[error("Invalid state: {0}")]
    State(String),

    /// A single repository failed to fetch or parse its metadata
    #[error("Repository '{repo_id}' error: {reason}")]
    Repo { repo_id: String, reason: String },

    /// Aggregate of per-repository load failures; repositories not listed
    /// here loaded successfully and remain usable
    #[error("{} repositor{} failed to load", failures.len(), if failures.len() == 1 { "y" } else { "ies" })]
    RepoLoad { failures: Vec<RepoFailure> },

    /// Caller passed an unusable argument (e.g. an empty filter string)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Query index past the end of the result set
    #[error("Index {index} out of range (result set has {size} entries)")]
    IndexOutOfRange { index: usize, size: usize },

    /// No consistent plan exists for the requested operations
    #[error("Cannot resolve transaction: {0}")]
    Unresolvable(ResolutionProblems),

    /// One or more artifacts could not be fetched; the transaction stays
    /// resolvable and `download` may be retried
    #[error("{} download(s) failed: {}", failures.len(), failures.iter().map(|d| d.nevra.as_str()).collect::<Vec<_>>().join(", "))]
    Download { failures: Vec<DownloadFailure> },

    /// Dry-run verification found problems; `test` may be retried
    #[error("Transaction test failed: {}", problems.join("; "))]
    Test { problems: Vec<String> },

    /// The commit stage failed; the payload says whether anything changed
    #[error("Transaction failed: {0}")]
    Transaction(CommitFailure),

    /// Another process holds the transaction lock
    #[error("Transaction lock is held by another process: {0}")]
    LockHeld(String),

    /// Malformed metadata, version string, or requirement spec
    #[error("Parse error: {0}")]
    Parse(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using Cairn's Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_failure_display_distinguishes_outcomes() {
        let none = Error::Transaction(CommitFailure::NotApplied {
            reason: "duplicate row".to_string(),
        });
        let partial = Error::Transaction(CommitFailure::PartiallyApplied {
            applied: vec!["install curl-8.0-1.x86_64".to_string()],
            reason: "rollback failed".to_string(),
        });

        let none_msg = none.to_string();
        let partial_msg = partial.to_string();
        assert!(none_msg.contains("nothing applied"));
        assert!(partial_msg.contains("manual intervention required"));
        assert!(partial_msg.contains("install curl-8.0-1.x86_64"));
    }

    #[test]
    fn test_resolution_problems_display() {
        let problems = ResolutionProblems {
            unmet: vec![UnmetRequirement {
                package: "app-1.0-1.x86_64".to_string(),
                requirement: "libfoo >= 2.0".to_string(),
            }],
            conflicts: vec!["cannot remove libbar: required by app".to_string()],
        };

        let msg = problems.to_string();
        assert!(msg.contains("app-1.0-1.x86_64 requires libfoo >= 2.0"));
        assert!(msg.contains("required by app"));
    }

    #[test]
    fn test_repo_load_error_counts_failures() {
        let err = Error::RepoLoad {
            failures: vec![
                RepoFailure {
                    repo_id: "fedora".to_string(),
                    reason: "HTTP 503".to_string(),
                },
                RepoFailure {
                    repo_id: "updates".to_string(),
                    reason: "corrupt metadata".to_string(),
                },
            ],
        };
        assert!(err.to_string().contains("2 repositories"));
    }
}
