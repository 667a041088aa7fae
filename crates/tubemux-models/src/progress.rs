//! Progress notifications pushed to passive subscribers.

use serde::{Deserialize, Serialize};

/// Progress notification for one job, addressed by its resolved title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Human readable title of the media being processed
    pub resolved_title: String,
    /// False on the terminal event of a job
    pub is_active: bool,
    /// Whole percent, 0-100
    pub percent: u8,
}

impl ProgressEvent {
    /// In-flight progress update.
    pub fn active(title: impl Into<String>, percent: u8) -> Self {
        Self {
            resolved_title: title.into(),
            is_active: true,
            percent: percent.min(100),
        }
    }

    /// Terminal event; nothing more is published for the job afterwards.
    pub fn finished(title: impl Into<String>, percent: u8) -> Self {
        Self {
            resolved_title: title.into(),
            is_active: false,
            percent: percent.min(100),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active
    }
}
