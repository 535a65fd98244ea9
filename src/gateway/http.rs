//! Backend API client.
//!
//! Saving and updating go through a temporary test: the events are uploaded
//! to `tests/actions/save.temp`, and the returned insert id is then promoted
//! to a real test (`create`) or swapped into an existing one
//! (`update.steps`).

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::types::{BuildReport, Credential, GatewayError, GatewayResult};
use super::{TestGateway, default_test_name};
use crate::action::{Action, Test, TestId};
use crate::config::BackendSettings;

/// Join a backend base URL and an API path
pub fn resolve_backend_path(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Encode an id as exactly one path segment. Dot-only ids are refused since
/// URL normalization would turn them into parent references.
fn path_segment(id: &str) -> GatewayResult<String> {
    let id = id.trim();
    if id.is_empty() || id.chars().all(|c| c == '.') {
        return Err(GatewayError::InvalidId(id.to_string()));
    }
    Ok(urlencoding::encode(id).into_owned())
}

/// `{insertId}` answer of `save.temp`
#[derive(Debug, Deserialize)]
struct InsertResponse {
    #[serde(rename = "insertId", alias = "id", alias = "testId")]
    insert_id: TestId,
}

/// Answer of `create`; the backend has reported the new id under several names
#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "testId", alias = "id", alias = "insertId")]
    test_id: TestId,
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
    project_id: Option<String>,
    credential: Option<Credential>,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> GatewayResult<Self> {
        Self::with_client(base_url, Client::new())
    }

    pub fn from_config(settings: &BackendSettings) -> GatewayResult<Self> {
        let http = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| GatewayError::Transport {
                url: settings.base_url.clone(),
                source: e,
            })?;
        let mut gateway = Self::with_client(&settings.base_url, http)?;
        gateway.credential = settings.token.as_deref().map(Credential::new);
        gateway.project_id = settings.project_id.clone();
        Ok(gateway)
    }

    fn with_client(base_url: &str, http: Client) -> GatewayResult<Self> {
        let trimmed = base_url.trim();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(GatewayError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url: trimmed.trim_end_matches('/').to_string(),
            project_id: None,
            credential: None,
        })
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        resolve_backend_path(&self.base_url, path)
    }

    /// Attach the session cookie the web app uses
    fn with_cookie(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(credential) => request.header(COOKIE, credential.cookie()),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request.send().await.map_err(|e| GatewayError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> GatewayResult<T> {
        let body = response.text().await.map_err(|e| GatewayError::Transport {
            url: url.to_string(),
            source: e,
        })?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Upload events as a temporary test and return its insert id
    async fn save_temp(&self, actions: &[Action]) -> GatewayResult<TestId> {
        let url = self.url("tests/actions/save.temp");
        let mut request = self.http.post(&url).json(&json!({ "events": actions }));
        if let Some(credential) = &self.credential {
            request = request.header(AUTHORIZATION, credential.bearer());
        }
        let response = self.send(&url, request).await?;
        let inserted: InsertResponse = Self::decode(&url, response).await?;
        debug!(temp_test_id = %inserted.insert_id, events = actions.len(), "uploaded temporary test");
        Ok(inserted.insert_id)
    }

    async fn post_with_cookie(&self, path: &str, body: Value) -> GatewayResult<Value> {
        let url = self.url(path);
        let request = self.with_cookie(self.http.post(&url).json(&body));
        let response = self.send(&url, request).await?;
        let text = response.text().await.map_err(|e| GatewayError::Transport {
            url: url.clone(),
            source: e,
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode {
            url,
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl TestGateway for HttpGateway {
    async fn get_test(&self, test_id: &TestId) -> GatewayResult<Test> {
        let url = self.url(&format!("tests/{}", path_segment(test_id.as_str())?));
        let request = self.with_cookie(self.http.get(&url));
        let response = self.send(&url, request).await.map_err(|e| match e {
            GatewayError::Status { status: 404, .. } => GatewayError::NotFound {
                test_id: test_id.clone(),
            },
            other => other,
        })?;
        let mut test: Test = Self::decode(&url, response).await?;
        test.id.get_or_insert_with(|| test_id.clone());
        debug!(test_id = %test_id, events = test.events.len(), "fetched test");
        Ok(test)
    }

    async fn save_test(&self, actions: &[Action], name: Option<&str>) -> GatewayResult<TestId> {
        let project_id = self.project_id.as_deref().ok_or(GatewayError::MissingProject)?;
        let temp_test_id = self.save_temp(actions).await?;
        let name = name.map(str::to_string).unwrap_or_else(default_test_name);

        let path = format!("projects/{}/tests/actions/create", path_segment(project_id)?);
        let created = self
            .post_with_cookie(&path, json!({ "tempTestId": temp_test_id, "name": name }))
            .await?;
        let created: CreateResponse = serde_json::from_value(created).map_err(|e| GatewayError::Decode {
            url: self.url(&path),
            reason: e.to_string(),
        })?;
        info!(test_id = %created.test_id, %name, "test saved");
        Ok(created.test_id)
    }

    async fn update_test(&self, test_id: &TestId, actions: &[Action]) -> GatewayResult<()> {
        let segment = path_segment(test_id.as_str())?;
        let temp_test_id = self.save_temp(actions).await?;
        self.post_with_cookie(
            &format!("tests/{}/actions/update.steps", segment),
            json!({ "tempTestId": temp_test_id }),
        )
        .await?;
        info!(test_id = %test_id, events = actions.len(), "test steps updated");
        Ok(())
    }

    async fn rename_test(&self, test_id: &TestId, name: &str) -> GatewayResult<()> {
        let path = format!("tests/{}/actions/edit", path_segment(test_id.as_str())?);
        self.post_with_cookie(&path, json!({ "name": name }))
            .await?;
        Ok(())
    }

    async fn get_build_report(&self, build_id: &str) -> GatewayResult<BuildReport> {
        let url = self.url(&format!("builds/{}/report", path_segment(build_id)?));
        let request = self.with_cookie(self.http.get(&url));
        let response = self.send(&url, request).await?;
        Self::decode(&url, response).await
    }

    async fn run_tests(&self, project_id: &str, test_ids: Option<&[TestId]>) -> GatewayResult<Value> {
        let ids = test_ids.map(|ids| {
            ids.iter()
                .map(TestId::as_str)
                .collect::<Vec<_>>()
                .join(",")
        });
        self.post_with_cookie(
            &format!("projects/{}/tests/actions/run", path_segment(project_id)?),
            json!({ "testIds": ids }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionType;

    #[test]
    fn test_resolve_backend_path() {
        assert_eq!(resolve_backend_path("http://b:8000/", "/tests/1"), "http://b:8000/tests/1");
        assert_eq!(
            resolve_backend_path("https://backend.test", "tests/actions/save.temp"),
            "https://backend.test/tests/actions/save.temp"
        );
    }

    #[test]
    fn test_path_segment_escapes_separators() {
        assert_eq!(path_segment("42").unwrap(), "42");
        assert_eq!(path_segment("../builds/3/report").unwrap(), "..%2Fbuilds%2F3%2Freport");
        assert_eq!(path_segment("a b?c#d").unwrap(), "a%20b%3Fc%23d");
        assert!(matches!(path_segment(".."), Err(GatewayError::InvalidId(_))));
        assert!(matches!(path_segment(" "), Err(GatewayError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_reference_cannot_reach_other_endpoints() {
        let mut server = mockito::Server::new_async().await;
        let report = server
            .mock("GET", "/builds/3/report")
            .with_status(200)
            .with_body(r#"{"id":3}"#)
            .expect(0)
            .create_async()
            .await;

        let gateway = HttpGateway::new(&server.url()).unwrap();
        assert!(gateway.get_test(&TestId::from("../builds/3/report")).await.is_err());
        assert!(matches!(
            gateway.rename_test(&TestId::from(".."), "x").await,
            Err(GatewayError::InvalidId(_))
        ));
        report.assert_async().await;
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(matches!(HttpGateway::new("ftp://x"), Err(GatewayError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_get_test_decodes_events() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/tests/42")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"events":[{"type":"PAGE_NAVIGATE_URL","payload":{"meta":{"value":"https://a.test"}}}]}"#)
            .create_async()
            .await;

        let gateway = HttpGateway::new(&server.url()).unwrap();
        let test = gateway.get_test(&TestId::from(42)).await.unwrap();
        assert_eq!(test.id, Some(TestId::from(42)));
        assert_eq!(test.events[0].action_type, ActionType::NavigateUrl);
    }

    #[tokio::test]
    async fn test_get_test_not_found_and_garbage() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server.mock("GET", "/tests/1").with_status(404).create_async().await;
        let _garbage = server
            .mock("GET", "/tests/2")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let gateway = HttpGateway::new(&server.url()).unwrap();
        assert!(matches!(
            gateway.get_test(&TestId::from(1)).await,
            Err(GatewayError::NotFound { .. })
        ));
        assert!(matches!(
            gateway.get_test(&TestId::from(2)).await,
            Err(GatewayError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_without_project() {
        let gateway = HttpGateway::new("http://localhost:1").unwrap();
        let err = gateway.save_test(&[], None).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingProject));
    }
}
