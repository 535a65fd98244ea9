//! Crusher Replay - replay recorded browser tests.
//!
//! This crate provides:
//! - The wire model of recorded actions and a validated step view of it
//! - Resolution of RUN_AFTER_TEST references into one flat sequence
//! - Executors for every action type, bounded by timeouts
//! - A backend gateway (HTTP and in-memory) for persisted tests
//! - Execution sessions producing an ordered result log
//! - Browser drivers: W3C WebDriver and an in-memory mock browser
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crusher_replay::{ArtifactDir, ExecutionSession, HttpGateway, TestId, WebDriverClient, WebDriverConfig};
//!
//! # async fn replay() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Arc::new(HttpGateway::new("http://localhost:8000")?);
//! let driver = WebDriverClient::connect(&WebDriverConfig::new("http://localhost:4444")).await?;
//! let mut session = ExecutionSession::new(gateway, Box::new(driver), ArtifactDir::new());
//! let report = session.run(&TestId::from(42)).await?;
//! println!("{} passed, {} failed", report.passed(), report.failed());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod artifacts;
pub mod config;
pub mod driver;
pub mod executor;
pub mod gateway;
pub mod resolver;
pub mod runner;
pub mod session;

// Re-export the action model
pub use action::{
    Action, ActionError, ActionType, DeviceProfile, Step, Test, TestId, get_browser_actions,
    get_main_actions, is_browser_action, is_main_action,
};

// Re-export result types
pub use runner::{ErrorDetail, ErrorKind, ExecutionResult, SessionReport, SessionState, StepStatus};

// Re-export resolution and replay
pub use resolver::{ResolveError, Resolver};
pub use session::{ExecutionSession, SessionError, SessionOptions};
pub use executor::{ExecContext, ExecutorError, StepOutcome, Timeouts};

// Re-export gateways
pub use gateway::{BuildReport, Credential, GatewayError, HttpGateway, InMemoryGateway, TestGateway};

// Re-export drivers
pub use driver::{BrowserDriver, DriverError, MockBrowser, MockElement, MockPage, WebDriverClient, WebDriverConfig};

// Re-export artifact management
pub use artifacts::{ArtifactDir, cleanup_old_runs, list_runs};
