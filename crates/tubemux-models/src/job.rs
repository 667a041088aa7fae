//! Job identifiers and lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum accepted length of an externally supplied job ID.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Unique identifier for a submission.
///
/// Job IDs are supplied by the caller. They are embedded in intermediate
/// file names, so only ASCII alphanumerics, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is safe to embed in a file name.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_JOB_ID_LEN
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Phase of an in-flight job.
///
/// ```text
/// Fetching -> Merging -> Finalizing -> Completed | Failed
/// Fetching | Merging -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Both media streams are being written to disk
    #[default]
    Fetching,
    /// The transcoder is merging the two inputs
    Merging,
    /// Temp output is being committed and cached
    Finalizing,
    /// Artifact committed and cached
    Completed,
    /// Job failed; all files removed
    Failed,
    /// Job cancelled by request; all files removed
    Cancelled,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Fetching => "fetching",
            JobPhase::Merging => "merging",
            JobPhase::Finalizing => "finalizing",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
            JobPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobPhase::Completed | JobPhase::Failed | JobPhase::Cancelled
        )
    }

    /// Whether cancellation can still take effect.
    ///
    /// Once a job reaches `Finalizing` the artifact is being committed and
    /// cancellation no longer applies.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobPhase::Fetching | JobPhase::Merging)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobPhase) -> bool {
        use JobPhase::*;
        match (self, next) {
            (Fetching, Merging) | (Merging, Finalizing) | (Finalizing, Completed) => true,
            (Fetching | Merging | Finalizing, Failed) => true,
            (Fetching | Merging, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_validation() {
        assert!(JobId::from("j1").is_valid());
        assert!(JobId::new().is_valid());
        assert!(JobId::from("a_b-C9").is_valid());
        assert!(!JobId::from("").is_valid());
        assert!(!JobId::from("../etc").is_valid());
        assert!(!JobId::from("a b").is_valid());
        assert!(!JobId::from("x".repeat(MAX_JOB_ID_LEN + 1)).is_valid());
    }

    #[test]
    fn test_phase_transitions() {
        use JobPhase::*;
        assert!(Fetching.can_transition_to(Merging));
        assert!(Merging.can_transition_to(Finalizing));
        assert!(Finalizing.can_transition_to(Completed));
        assert!(Merging.can_transition_to(Cancelled));
        assert!(!Finalizing.can_transition_to(Cancelled));
        assert!(!Fetching.can_transition_to(Finalizing));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Fetching, Merging, Finalizing, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cancellable_phases() {
        assert!(JobPhase::Fetching.is_cancellable());
        assert!(JobPhase::Merging.is_cancellable());
        assert!(!JobPhase::Finalizing.is_cancellable());
        assert!(!JobPhase::Completed.is_cancellable());
    }
}
