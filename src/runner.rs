//! Types for replay results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::action::{ActionType, TestId};

/// Outcome of a single replayed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

/// Failure category carried by failing results and session reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FetchFailed,
    ElementNotFound,
    Timeout,
    AssertionFailure,
    UnresolvedReference,
    InvalidAction,
    Driver,
    Cancelled,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::FetchFailed => "FETCH_FAILED",
            ErrorKind::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::AssertionFailure => "ASSERTION_FAILURE",
            ErrorKind::UnresolvedReference => "UNRESOLVED_REFERENCE",
            ErrorKind::InvalidAction => "INVALID_ACTION",
            ErrorKind::Driver => "DRIVER",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Io => "IO",
        };
        f.write_str(s)
    }
}

/// Structured error attached to a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    /// Human-readable context (selector tried, URL, reason, ...)
    pub context: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
        }
    }
}

/// One entry of the execution log. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Position in the flattened sequence
    pub action_index: usize,

    pub action_type: ActionType,

    pub status: StepStatus,

    pub message: String,

    pub duration_ms: u64,

    pub timestamp: DateTime<Utc>,

    /// Screenshot written by this step, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ExecutionResult {
    pub fn success(action_index: usize, action_type: ActionType, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            action_index,
            action_type,
            status: StepStatus::Success,
            message: message.into(),
            duration_ms,
            timestamp: Utc::now(),
            artifact: None,
            error: None,
        }
    }

    pub fn failure(action_index: usize, action_type: ActionType, error: ErrorDetail, duration_ms: u64) -> Self {
        Self {
            action_index,
            action_type,
            status: StepStatus::Failure,
            message: error.context.clone(),
            duration_ms,
            timestamp: Utc::now(),
            artifact: None,
            error: Some(error),
        }
    }

    pub fn skipped(action_index: usize, action_type: ActionType, reason: &str) -> Self {
        Self {
            action_index,
            action_type,
            status: StepStatus::Skipped,
            message: reason.to_string(),
            duration_ms: 0,
            timestamp: Utc::now(),
            artifact: None,
            error: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }
}

/// Lifecycle state of an execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Resolving,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed | SessionState::Cancelled)
    }
}

/// Summary of one replay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,

    pub state: SessionState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    pub artifacts_dir: PathBuf,

    /// Why the session ended in `Failed` or `Cancelled`, if not tied to a step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    pub results: Vec<ExecutionResult>,
}

impl SessionReport {
    fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    /// Completed with every step passing
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Completed && self.failed() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_json_shape() {
        let result = ExecutionResult::failure(
            2,
            ActionType::AssertElement,
            ErrorDetail::new(ErrorKind::AssertionFailure, "innerText mismatch"),
            12,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["actionIndex"], json!(2));
        assert_eq!(value["actionType"], json!("ASSERT_ELEMENT"));
        assert_eq!(value["status"], json!("FAILURE"));
        assert_eq!(value["error"]["kind"], json!("ASSERTION_FAILURE"));
        assert!(value.get("artifact").is_none());
    }

    #[test]
    fn test_report_counts() {
        let report = SessionReport {
            test_id: Some(TestId::from(1)),
            state: SessionState::Failed,
            started_at: None,
            finished_at: None,
            artifacts_dir: PathBuf::from("/tmp/x"),
            error: None,
            results: vec![
                ExecutionResult::success(0, ActionType::Click, "ok", 1),
                ExecutionResult::failure(1, ActionType::Click, ErrorDetail::new(ErrorKind::ElementNotFound, "#a"), 1),
                ExecutionResult::skipped(2, ActionType::Input, "aborted"),
            ],
        };
        assert_eq!((report.passed(), report.failed(), report.skipped()), (1, 1, 1));
        assert!(!report.is_success());
    }
}
