//! Flattening of RUN_AFTER_TEST references.
//!
//! A recorded test may start by replaying another test. Resolution inlines
//! that test's actions, recursively, into one sequence the executors can run
//! front to back:
//!
//! ```text
//! [browser actions, main test only] + [resolved referenced test] + [main actions]
//! ```
//!
//! Browser actions of referenced tests are dropped; only the outermost test
//! decides the device. RUN_AFTER_TEST itself never appears in the output.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::action::{Action, ActionType, TestId, get_browser_actions, get_main_actions};
use crate::gateway::{GatewayError, TestGateway};
use crate::runner::ErrorKind;

/// Result type for resolution
pub type ResolveResult<T> = Result<T, ResolveError>;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to fetch test {test_id}: {source}")]
    FetchFailed {
        test_id: TestId,
        #[source]
        source: GatewayError,
    },

    /// A RUN_AFTER_TEST without a usable test id
    #[error("action {index} references a test but carries no test id")]
    MissingReference { index: usize },

    #[error("cyclic test reference: {}", format_chain(.chain))]
    CyclicReference { chain: Vec<TestId> },
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::FetchFailed { .. } => ErrorKind::FetchFailed,
            ResolveError::MissingReference { .. } | ResolveError::CyclicReference { .. } => {
                ErrorKind::UnresolvedReference
            }
        }
    }
}

fn format_chain(chain: &[TestId]) -> String {
    chain.iter().map(TestId::as_str).collect::<Vec<_>>().join(" -> ")
}

#[derive(Clone)]
pub struct Resolver {
    gateway: Arc<dyn TestGateway>,
}

impl Resolver {
    pub fn new(gateway: Arc<dyn TestGateway>) -> Self {
        Self { gateway }
    }

    /// Fetch a test and resolve it as the main test
    pub async fn resolve_test(&self, test_id: &TestId) -> ResolveResult<Vec<Action>> {
        let test = self.fetch(test_id).await?;
        let mut chain = vec![test_id.clone()];
        self.resolve_inner(&test.events, true, &mut chain).await
    }

    /// Resolve a list of actions. `is_main_test` keeps its browser actions.
    pub async fn resolve(&self, actions: &[Action], is_main_test: bool) -> ResolveResult<Vec<Action>> {
        let mut chain = Vec::new();
        self.resolve_inner(actions, is_main_test, &mut chain).await
    }

    async fn fetch(&self, test_id: &TestId) -> ResolveResult<crate::action::Test> {
        self.gateway
            .get_test(test_id)
            .await
            .map_err(|source| ResolveError::FetchFailed {
                test_id: test_id.clone(),
                source,
            })
    }

    fn resolve_inner<'a>(
        &'a self,
        actions: &'a [Action],
        is_main_test: bool,
        chain: &'a mut Vec<TestId>,
    ) -> BoxFuture<'a, ResolveResult<Vec<Action>>> {
        async move {
            let mut out = Vec::with_capacity(actions.len());

            let browser_actions = get_browser_actions(actions);
            if is_main_test {
                out.extend(
                    browser_actions
                        .iter()
                        .filter(|a| a.action_type != ActionType::RunAfterTest)
                        .cloned(),
                );
            }

            let mut references = actions
                .iter()
                .enumerate()
                .filter(|(_, a)| a.action_type == ActionType::RunAfterTest);
            let first = references.next();
            for (index, ignored) in references {
                warn!(
                    index,
                    test_id = ?ignored.referenced_test(),
                    "only the first RUN_AFTER_TEST of a test is honored; dropping this one"
                );
            }

            if let Some((index, reference)) = first {
                let test_id = reference
                    .referenced_test()
                    .ok_or(ResolveError::MissingReference { index })?;
                if chain.contains(&test_id) {
                    let mut cycle = chain.clone();
                    cycle.push(test_id);
                    return Err(ResolveError::CyclicReference { chain: cycle });
                }

                let referenced = self.fetch(&test_id).await?;
                debug!(test_id = %test_id, depth = chain.len(), events = referenced.events.len(), "inlining referenced test");
                chain.push(test_id);
                let resolved = self.resolve_inner(&referenced.events, false, chain).await;
                chain.pop();
                out.extend(resolved?);
            }

            out.extend(get_main_actions(actions));
            Ok(out)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use pretty_assertions::assert_eq;

    fn resolver(gateway: InMemoryGateway) -> Resolver {
        Resolver::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_empty_input() {
        let r = resolver(InMemoryGateway::new());
        assert_eq!(r.resolve(&[], true).await.unwrap(), Vec::<Action>::new());
    }

    #[tokio::test]
    async fn test_reference_is_spliced_before_main_actions() {
        let gateway = InMemoryGateway::new().with_test("2", vec![Action::click("#c"), Action::click("#d")]);
        let r = resolver(gateway);
        let actions = vec![Action::click("#a"), Action::run_after_test("2"), Action::click("#b")];
        let flat = r.resolve(&actions, true).await.unwrap();
        let selectors: Vec<_> = flat.iter().filter_map(|a| a.payload.selector.clone()).collect();
        assert_eq!(selectors, vec!["#c", "#d", "#a", "#b"]);
    }

    #[tokio::test]
    async fn test_missing_test_id() {
        let r = resolver(InMemoryGateway::new());
        let actions = vec![Action::new(ActionType::RunAfterTest)];
        let err = r.resolve(&actions, true).await.unwrap_err();
        assert!(matches!(err, ResolveError::MissingReference { index: 0 }));
        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
    }

    #[tokio::test]
    async fn test_indirect_cycle() {
        let gateway = InMemoryGateway::new()
            .with_test("1", vec![Action::run_after_test("2")])
            .with_test("2", vec![Action::run_after_test("1")]);
        let err = resolver(gateway).resolve_test(&TestId::from(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "cyclic test reference: 1 -> 2 -> 1");
    }

    #[tokio::test]
    async fn test_only_first_reference_is_followed() {
        let gateway = InMemoryGateway::new()
            .with_test("2", vec![Action::click("#two")])
            .with_test("3", vec![Action::click("#three")]);
        let actions = vec![Action::run_after_test("2"), Action::run_after_test("3")];
        let flat = resolver(gateway).resolve(&actions, true).await.unwrap();
        assert_eq!(flat, vec![Action::click("#two")]);
    }
}
