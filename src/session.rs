//! Execution sessions.
//!
//! An [`ExecutionSession`] owns one browser driver and replays one resolved
//! sequence on it, strictly in order:
//!
//! ```text
//! Idle -> Resolving -> Running -> Completed | Failed | Cancelled
//! ```
//!
//! - An assertion that does not hold records a FAILURE and the replay goes on
//!   (unless `abort_on_assertion_failure` is set)
//! - Any other executor error fails the session; the remaining actions are
//!   recorded as SKIPPED
//! - Cancellation is checked before each action; an action already running
//!   is allowed to finish

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::{Action, ActionType, DeviceProfile, TestId};
use crate::artifacts::ArtifactDir;
use crate::config;
use crate::driver::BrowserDriver;
use crate::executor::{self, ExecContext, StepOutcome, Timeouts};
use crate::gateway::TestGateway;
use crate::resolver::{ResolveError, Resolver};
pub use crate::runner::SessionState;
use crate::runner::{ErrorDetail, ErrorKind, ExecutionResult, SessionReport, StepStatus};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that prevent a session from producing a report at all
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session replays exactly once
    #[error("session is {0:?}, expected Idle")]
    InvalidState(SessionState),

    #[error("failed to prepare artifact directory: {0}")]
    Io(#[from] std::io::Error),
}

/// How a session reacts to failures
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub abort_on_assertion_failure: bool,
    pub timeouts: Timeouts,
    /// Applied before the first action when the recording sets no device
    pub default_device: Option<DeviceProfile>,
}

impl SessionOptions {
    pub fn from_config(config: &config::Config) -> Self {
        Self {
            abort_on_assertion_failure: config.execution.abort_on_assertion_failure,
            timeouts: Timeouts::from_config(&config.execution),
            default_device: DeviceProfile::find(&config.driver.default_device),
        }
    }
}

pub struct ExecutionSession {
    resolver: Resolver,
    driver: Box<dyn BrowserDriver>,
    artifacts: ArtifactDir,
    options: SessionOptions,
    cancel: CancellationToken,
    state: SessionState,
    test_id: Option<TestId>,
    results: Vec<ExecutionResult>,
    error: Option<ErrorDetail>,
    started_at: Option<chrono::DateTime<Utc>>,
    finished_at: Option<chrono::DateTime<Utc>>,
}

impl ExecutionSession {
    pub fn new(gateway: Arc<dyn TestGateway>, driver: Box<dyn BrowserDriver>, artifacts: ArtifactDir) -> Self {
        Self {
            resolver: Resolver::new(gateway),
            driver,
            artifacts,
            options: SessionOptions::default(),
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
            test_id: None,
            results: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Token that stops the replay before its next action
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Results recorded so far, in action order
    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    pub fn artifacts(&self) -> &ArtifactDir {
        &self.artifacts
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            test_id: self.test_id.clone(),
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            artifacts_dir: self.artifacts.dir.clone(),
            error: self.error.clone(),
            results: self.results.clone(),
        }
    }

    /// Release the driver.
    ///
    /// The artifact directory is handed back so the caller decides when it
    /// is dropped; captures referenced by the report live until then.
    pub async fn close(mut self) -> (SessionReport, ArtifactDir) {
        if let Err(e) = self.driver.close().await {
            warn!(driver = self.driver.name(), "failed to close driver: {}", e);
        }
        let report = self.report();
        (report, self.artifacts)
    }

    /// Fetch, resolve and replay a persisted test
    pub async fn run(&mut self, test_id: &TestId) -> SessionResult<SessionReport> {
        self.begin(Some(test_id.clone()))?;
        info!(test_id = %test_id, driver = self.driver.name(), "resolving test");
        let resolved = self.resolver.resolve_test(test_id).await;
        self.replay_resolved(resolved).await
    }

    /// Resolve a local recording as the main test and replay it
    pub async fn run_actions(&mut self, actions: &[Action]) -> SessionResult<SessionReport> {
        self.begin(None)?;
        info!(actions = actions.len(), driver = self.driver.name(), "resolving recording");
        let resolved = self.resolver.resolve(actions, true).await;
        self.replay_resolved(resolved).await
    }

    fn begin(&mut self, test_id: Option<TestId>) -> SessionResult<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        self.artifacts.init(test_id.as_ref().map(TestId::as_str))?;
        self.test_id = test_id;
        self.started_at = Some(Utc::now());
        self.state = SessionState::Resolving;
        Ok(())
    }

    async fn replay_resolved(&mut self, resolved: Result<Vec<Action>, ResolveError>) -> SessionResult<SessionReport> {
        match resolved {
            Ok(actions) => self.replay(&actions).await,
            Err(e) => {
                error!("resolution failed: {}", e);
                self.error = Some(ErrorDetail::new(e.kind(), e.to_string()));
                self.finish(SessionState::Failed);
            }
        }
        Ok(self.report())
    }

    async fn replay(&mut self, actions: &[Action]) {
        self.state = SessionState::Running;
        info!(actions = actions.len(), "replay started");
        if !self.cancel.is_cancelled() {
            self.apply_default_device(actions).await;
        }

        for (index, action) in actions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(index, "replay cancelled");
                self.error = Some(ErrorDetail::new(ErrorKind::Cancelled, "replay was cancelled"));
                self.skip_from(actions, index, "cancelled");
                self.finish(SessionState::Cancelled);
                return;
            }

            let started = Instant::now();
            let outcome = {
                let mut ctx = ExecContext {
                    driver: self.driver.as_mut(),
                    index,
                    timeouts: &self.options.timeouts,
                    artifacts: &self.artifacts,
                };
                executor::execute_action(&mut ctx, action).await
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(StepOutcome::Passed { message, artifact }) => {
                    debug!(index, action = %action.label(), duration_ms, "{}", message);
                    self.results.push(
                        ExecutionResult::success(index, action.action_type, message, duration_ms)
                            .with_artifact(artifact),
                    );
                }
                Ok(StepOutcome::Failed { message }) => {
                    warn!(index, action = %action.label(), "assertion failed: {}", message);
                    let detail = ErrorDetail::new(ErrorKind::AssertionFailure, message);
                    self.results
                        .push(ExecutionResult::failure(index, action.action_type, detail.clone(), duration_ms));
                    if self.options.abort_on_assertion_failure {
                        self.error = Some(detail);
                        self.skip_from(actions, index + 1, "aborted after failed assertion");
                        self.finish(SessionState::Failed);
                        return;
                    }
                }
                Err(e) => {
                    error!(index, action = %action.label(), "action failed: {}", e);
                    let detail = ErrorDetail::new(e.kind(), e.to_string());
                    self.results
                        .push(ExecutionResult::failure(index, action.action_type, detail.clone(), duration_ms));
                    self.error = Some(detail);
                    self.skip_from(actions, index + 1, "aborted after earlier failure");
                    self.finish(SessionState::Failed);
                    return;
                }
            }
        }

        self.finish(SessionState::Completed);
    }

    async fn apply_default_device(&mut self, actions: &[Action]) {
        let Some(device) = &self.options.default_device else {
            return;
        };
        if actions.iter().any(|a| a.action_type == ActionType::SetDevice) {
            return;
        }
        let limit = self.options.timeouts.action;
        match tokio::time::timeout(limit, self.driver.set_viewport(device)).await {
            Ok(Ok(())) => debug!(device = %device.id, "default device applied"),
            Ok(Err(e)) => warn!(device = %device.id, "could not apply default device: {}", e),
            Err(_) => warn!(device = %device.id, "applying default device timed out"),
        }
    }

    fn skip_from(&mut self, actions: &[Action], start: usize, reason: &str) {
        for (index, action) in actions.iter().enumerate().skip(start) {
            self.results
                .push(ExecutionResult::skipped(index, action.action_type, reason));
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
        let passed = self.results.iter().filter(|r| r.status == StepStatus::Success).count();
        info!(state = ?state, passed, total = self.results.len(), "replay finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockBrowser, MockElement, MockPage};
    use crate::gateway::InMemoryGateway;

    fn session(gateway: InMemoryGateway) -> ExecutionSession {
        let page = MockPage::new("https://a.test/").element(MockElement::new("#ok"));
        let artifacts = ArtifactDir::in_dir(tempfile::tempdir().unwrap().keep()).keep(false);
        ExecutionSession::new(Arc::new(gateway), Box::new(MockBrowser::with_page(page)), artifacts)
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let mut s = session(InMemoryGateway::new());
        s.run_actions(&[Action::click("#ok")]).await.unwrap();
        assert_eq!(s.state(), SessionState::Completed);
        assert!(matches!(
            s.run_actions(&[]).await,
            Err(SessionError::InvalidState(SessionState::Completed))
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_without_results() {
        let mut s = session(InMemoryGateway::new());
        let report = s.run(&TestId::from(99)).await.unwrap();
        assert_eq!(report.state, SessionState::Failed);
        assert!(report.results.is_empty());
        assert_eq!(report.error.map(|e| e.kind), Some(ErrorKind::FetchFailed));
    }
}
