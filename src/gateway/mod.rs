//! Access to persisted tests.
//!
//! [`TestGateway`] is what the resolver and the CLI talk to. [`HttpGateway`]
//! is the backend API client; [`InMemoryGateway`] keeps tests in a map for
//! offline replays and tests.

pub mod http;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::{Action, Test, TestId};

pub use http::HttpGateway;
pub use memory::InMemoryGateway;
pub use types::{BuildReport, Credential, GatewayError, GatewayResult};

#[async_trait]
pub trait TestGateway: Send + Sync {
    /// Fetch a persisted test with its recorded actions
    async fn get_test(&self, test_id: &TestId) -> GatewayResult<Test>;

    /// Persist a new test. Without a name, one is derived from the current time.
    async fn save_test(&self, actions: &[Action], name: Option<&str>) -> GatewayResult<TestId>;

    /// Replace the recorded actions of an existing test
    async fn update_test(&self, test_id: &TestId, actions: &[Action]) -> GatewayResult<()>;

    async fn rename_test(&self, test_id: &TestId, name: &str) -> GatewayResult<()>;

    async fn get_build_report(&self, build_id: &str) -> GatewayResult<BuildReport>;

    /// Trigger a project run, of the given tests or of all of them
    async fn run_tests(&self, project_id: &str, test_ids: Option<&[TestId]>) -> GatewayResult<Value>;
}

/// Name given to tests saved without one, e.g. "Oct 16 14:03:59"
pub fn default_test_name() -> String {
    chrono::Local::now().format("%b %d %H:%M:%S").to_string()
}
