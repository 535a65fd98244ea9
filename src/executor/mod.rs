//! Action executors.
//!
//! One handler per [`Step`] variant, grouped the way the recorder groups its
//! actions:
//! - [`element`]: actions that target a located element
//! - [`page`]: actions on the whole page
//! - [`browser`]: browser configuration
//!
//! Handlers receive everything they need through an explicit [`ExecContext`].
//! Every driver call is bounded by a timeout.

pub mod browser;
pub mod element;
pub mod page;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::action::{Action, ActionError, ActionType, Step};
use crate::artifacts::ArtifactDir;
use crate::config;
use crate::driver::{BrowserDriver, DriverError};
use crate::runner::ErrorKind;

/// Time bounds applied by the executors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long to keep polling for an element
    pub element: Duration,
    pub navigation: Duration,
    /// Bound for every other driver call
    pub action: Duration,
    pub poll_interval: Duration,
}

impl Timeouts {
    pub fn from_config(settings: &config::ExecutionSettings) -> Self {
        Self {
            element: Duration::from_millis(settings.element_timeout_ms),
            navigation: Duration::from_millis(settings.navigation_timeout_ms),
            action: Duration::from_millis(settings.action_timeout_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&config::ExecutionSettings::defaults())
    }
}

/// Everything a handler may touch while executing one action
pub struct ExecContext<'a> {
    pub driver: &'a mut dyn BrowserDriver,
    /// Position of the action in the flattened sequence
    pub index: usize,
    pub timeouts: &'a Timeouts,
    pub artifacts: &'a ArtifactDir,
}

/// Result of an action that ran to completion
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Passed {
        message: String,
        artifact: Option<PathBuf>,
    },
    /// The action ran but its check did not hold (assertions, custom code)
    Failed { message: String },
}

impl StepOutcome {
    pub fn passed(message: impl Into<String>) -> Self {
        StepOutcome::Passed {
            message: message.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(message: impl Into<String>, artifact: PathBuf) -> Self {
        StepOutcome::Passed {
            message: message.into(),
            artifact: Some(artifact),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        StepOutcome::Failed {
            message: message.into(),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, StepOutcome::Passed { .. })
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors that abort a replay
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("no element matched {selectors:?} within {waited_ms}ms")]
    ElementNotFound { selectors: Vec<String>, waited_ms: u64 },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error(transparent)]
    InvalidAction(#[from] ActionError),

    /// An action that has no executor reached one (unresolved RUN_AFTER_TEST)
    #[error("{action_type} cannot be executed: {reason}")]
    Unexecutable { action_type: ActionType, reason: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            ExecutorError::Timeout { .. } => ErrorKind::Timeout,
            ExecutorError::InvalidAction(_) | ExecutorError::Unexecutable { .. } => ErrorKind::InvalidAction,
            ExecutorError::Driver(_) => ErrorKind::Driver,
            ExecutorError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Execute one validated step
pub async fn execute(ctx: &mut ExecContext<'_>, step: &Step) -> ExecutorResult<StepOutcome> {
    match step {
        Step::Click { selectors } => element::click(ctx, selectors).await,
        Step::Hover { selectors } => element::hover(ctx, selectors).await,
        Step::Key {
            selectors,
            key,
            direction,
        } => element::key(ctx, selectors, key, *direction).await,
        Step::Input { selectors, value } => element::input(ctx, selectors, value).await,
        Step::ElementScreenshot { selectors, name } => element::screenshot(ctx, selectors, name.as_deref()).await,
        Step::ElementScroll { selectors, offset } => element::scroll(ctx, selectors, *offset).await,
        Step::AssertElement { selectors, rules } => element::assert(ctx, selectors, rules).await,
        Step::PageScreenshot { name } => page::screenshot(ctx, name.as_deref()).await,
        Step::PageScroll { offset } => page::scroll(ctx, *offset).await,
        Step::Navigate { url } => page::navigate(ctx, url).await,
        Step::CustomCode { script, .. } => page::custom_code(ctx, script).await,
        Step::Wait { duration } => page::wait(*duration).await,
        Step::SetDevice { device } => browser::set_device(ctx, device).await,
        Step::RunAfterTest { test_id } => Err(ExecutorError::Unexecutable {
            action_type: ActionType::RunAfterTest,
            reason: format!("reference to test {} was not resolved before replay", test_id),
        }),
    }
}

/// Validate a wire action and execute it
pub async fn execute_action(ctx: &mut ExecContext<'_>, action: &Action) -> ExecutorResult<StepOutcome> {
    let step = Step::try_from(action)?;
    execute(ctx, &step).await
}

/// Run a driver call under a time bound
pub(crate) async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> ExecutorResult<T>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ExecutorError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TestId;
    use crate::driver::{MockBrowser, MockPage};

    #[tokio::test]
    async fn test_unresolved_reference_is_invalid_action() {
        let mut driver = MockBrowser::with_page(MockPage::new("about:blank"));
        let timeouts = Timeouts::default();
        let artifacts = ArtifactDir::in_dir(std::env::temp_dir().join("crusher-exec-unit"));
        let mut ctx = ExecContext {
            driver: &mut driver,
            index: 0,
            timeouts: &timeouts,
            artifacts: &artifacts,
        };
        let err = execute(
            &mut ctx,
            &Step::RunAfterTest {
                test_id: TestId::from(3),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: ExecutorResult<()> = bounded("sleep", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ExecutorError::Timeout { after_ms: 10, .. })));
    }
}
