//! Gateway over an in-process map.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{BuildReport, GatewayError, GatewayResult};
use super::{TestGateway, default_test_name};
use crate::action::{Action, Test, TestId};

#[derive(Default)]
struct Store {
    tests: HashMap<TestId, Test>,
    next_id: u64,
    builds: HashMap<String, BuildReport>,
}

/// Tests held in memory; ids are assigned sequentially from 1
#[derive(Default)]
pub struct InMemoryGateway {
    store: Mutex<Store>,
    fetches: AtomicUsize,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert_test`](Self::insert_test)
    pub fn with_test(self, test_id: impl Into<TestId>, actions: Vec<Action>) -> Self {
        self.insert_test(test_id, actions);
        self
    }

    /// Store a test under a fixed id, replacing any previous one
    pub fn insert_test(&self, test_id: impl Into<TestId>, actions: Vec<Action>) {
        let test_id = test_id.into();
        let test = Test {
            id: Some(test_id.clone()),
            name: None,
            events: actions,
        };
        self.lock().tests.insert(test_id, test);
    }

    pub fn insert_build(&self, build_id: &str, report: BuildReport) {
        self.lock().builds.insert(build_id.to_string(), report);
    }

    /// Number of `get_test` calls served
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // Every write is a single insert, so a poisoned map is still consistent
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TestGateway for InMemoryGateway {
    async fn get_test(&self, test_id: &TestId) -> GatewayResult<Test> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .tests
            .get(test_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                test_id: test_id.clone(),
            })
    }

    async fn save_test(&self, actions: &[Action], name: Option<&str>) -> GatewayResult<TestId> {
        let mut store = self.lock();
        let mut next = store.next_id + 1;
        while store.tests.contains_key(&TestId::from(next)) {
            next += 1;
        }
        store.next_id = next;

        let test_id = TestId::from(next);
        let test = Test {
            id: Some(test_id.clone()),
            name: Some(name.map(str::to_string).unwrap_or_else(default_test_name)),
            events: actions.to_vec(),
        };
        store.tests.insert(test_id.clone(), test);
        Ok(test_id)
    }

    async fn update_test(&self, test_id: &TestId, actions: &[Action]) -> GatewayResult<()> {
        let mut store = self.lock();
        let test = store.tests.get_mut(test_id).ok_or_else(|| GatewayError::NotFound {
            test_id: test_id.clone(),
        })?;
        test.events = actions.to_vec();
        Ok(())
    }

    async fn rename_test(&self, test_id: &TestId, name: &str) -> GatewayResult<()> {
        let mut store = self.lock();
        let test = store.tests.get_mut(test_id).ok_or_else(|| GatewayError::NotFound {
            test_id: test_id.clone(),
        })?;
        test.name = Some(name.to_string());
        Ok(())
    }

    async fn get_build_report(&self, build_id: &str) -> GatewayResult<BuildReport> {
        self.lock()
            .builds
            .get(build_id)
            .cloned()
            .ok_or_else(|| GatewayError::Status {
                url: format!("memory://builds/{}/report", build_id),
                status: 404,
                body: "build not found".to_string(),
            })
    }

    async fn run_tests(&self, project_id: &str, test_ids: Option<&[TestId]>) -> GatewayResult<Value> {
        let store = self.lock();
        let selected: Vec<&TestId> = match test_ids {
            Some(ids) => ids.iter().filter(|id| store.tests.contains_key(id)).collect(),
            None => {
                let mut all: Vec<&TestId> = store.tests.keys().collect();
                all.sort();
                all
            }
        };
        Ok(json!({ "projectId": project_id, "queued": selected }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_save_then_get_round_trip() {
        let gateway = InMemoryGateway::new();
        let actions = vec![Action::navigate("https://a.test"), Action::click("#go")];
        let id = gateway.save_test(&actions, Some("smoke")).await.unwrap();
        let test = gateway.get_test(&id).await.unwrap();
        assert_eq!(test.events, actions);
        assert_eq!(test.name.as_deref(), Some("smoke"));
    }

    #[tokio::test]
    async fn test_sequential_ids_skip_taken() {
        let gateway = InMemoryGateway::new().with_test("1", vec![]);
        assert_eq!(gateway.save_test(&[], None).await.unwrap(), TestId::from(2));
        assert_eq!(gateway.save_test(&[], None).await.unwrap(), TestId::from(3));
    }

    #[tokio::test]
    async fn test_update_rename_missing() {
        let gateway = InMemoryGateway::new().with_test("5", vec![Action::click("#a")]);
        gateway.update_test(&TestId::from(5), &[Action::click("#b")]).await.unwrap();
        gateway.rename_test(&TestId::from(5), "renamed").await.unwrap();
        let test = gateway.get_test(&TestId::from(5)).await.unwrap();
        assert_eq!(test.events, vec![Action::click("#b")]);
        assert_eq!(test.name.as_deref(), Some("renamed"));

        assert!(matches!(
            gateway.rename_test(&TestId::from(6), "x").await,
            Err(GatewayError::NotFound { .. })
        ));
        assert_eq!(gateway.fetch_count(), 1);
    }
}
