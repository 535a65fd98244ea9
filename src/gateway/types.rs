// Core types for the backend gateway

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::action::TestId;

/// Access token for the backend API.
///
/// Held in memory only; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Value of the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Value of the `Cookie` header the web app sends
    pub fn cookie(&self) -> String {
        format!("isLoggedIn=true; token={}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Report of a build (one CI run of a project's tests)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub status: Option<String>,

    /// Everything else the backend reports (instances, counts, timings, ...)
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Backend answered with a non-2xx status
    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// Request never completed
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Body was not the expected shape
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("test {test_id} not found")]
    NotFound { test_id: TestId },

    /// Creating a test needs a project id
    #[error("no project configured; set CRUSHER_PROJECT_ID or pass --project")]
    MissingProject,

    #[error("invalid backend URL {0}")]
    InvalidUrl(String),

    /// An id that cannot be used as a URL path segment
    #[error("invalid id {0:?}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credential_headers_and_redaction() {
        let credential = Credential::new("abc123");
        assert_eq!(credential.bearer(), "Bearer abc123");
        assert_eq!(credential.cookie(), "isLoggedIn=true; token=abc123");
        assert!(!format!("{:?}", credential).contains("abc123"));
    }

    #[test]
    fn test_build_report_keeps_details() {
        let report: BuildReport = serde_json::from_value(json!({
            "id": 9,
            "status": "PASSED",
            "totalTests": 4
        }))
        .unwrap();
        assert_eq!(report.status.as_deref(), Some("PASSED"));
        assert_eq!(report.details.get("totalTests"), Some(&json!(4)));
    }
}
