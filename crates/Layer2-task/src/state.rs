//! Task lifecycle status

use serde::{Deserialize, Serialize};

/// Lifecycle state of a task.
///
/// `Pending` and `InProgress` are the only non-terminal states; once a task
/// reaches any other state it never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Constructed, not yet dispatched
    Pending,

    /// Dispatched, body not yet finished
    InProgress,

    /// Body returned an output
    Completed,

    /// Body returned an error (or panicked)
    Failed,

    /// Cancelled explicitly, by timeout, or by executor shutdown
    Cancelled,
}

impl Status {
    /// Every status, in lifecycle order
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::InProgress,
        Status::Completed,
        Status::Failed,
        Status::Cancelled,
    ];

    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        match self {
            Status::Completed | Status::Failed | Status::Cancelled => true,
            Status::Pending | Status::InProgress => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Status::Pending)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Status::InProgress)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
            Status::Cancelled => "CANCELLED",
        }
    }

    /// Get a symbol for the state (for terminal output)
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Pending => "◯",
            Status::InProgress => "⟳",
            Status::Completed => "✓",
            Status::Failed => "✗",
            Status::Cancelled => "⊘",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order() {
        assert_eq!(Status::ALL.len(), 5);
        assert_eq!(Status::ALL[0], Status::Pending);
        assert_eq!(Status::ALL[4], Status::Cancelled);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Cancelled.is_terminal());
    }

    #[test]
    fn test_display_and_serde_agree() {
        for status in Status::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}
