//! W3C WebDriver client.
//!
//! Talks to chromedriver, geckodriver or a Selenium grid over plain HTTP.
//! Every command is a JSON request against `/session/{id}/...`; errors come
//! back as `{"value": {"error": "...", "message": "..."}}` and are mapped onto
//! [`DriverError`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{BrowserDriver, DriverError, DriverResult, ElementHandle, ElementRect};
use crate::action::{DeviceProfile, KeyDirection, ScrollOffset};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Connection settings for a WebDriver endpoint
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Base URL of the driver, e.g. `http://localhost:4444`
    pub endpoint: String,
    /// `chrome` or `firefox`
    pub browser_name: String,
    pub headless: bool,
    pub request_timeout: Duration,
}

impl WebDriverConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            browser_name: "chrome".to_string(),
            headless: true,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn browser(mut self, name: &str) -> Self {
        self.browser_name = name.to_string();
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Whether the endpoint speaks chromedriver's DevTools passthrough
    fn is_chromium(&self) -> bool {
        matches!(
            self.browser_name.to_ascii_lowercase().as_str(),
            "chrome" | "chromium" | "msedge" | "microsoftedge"
        )
    }

    fn capabilities(&self) -> Value {
        let mut always_match = json!({ "browserName": self.browser_name });
        if self.headless {
            match self.browser_name.as_str() {
                "firefox" => {
                    always_match["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
                }
                _ => {
                    always_match["goog:chromeOptions"] =
                        json!({ "args": ["--headless=new", "--disable-gpu", "--no-sandbox"] });
                }
            }
        }
        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

/// A live WebDriver session
pub struct WebDriverClient {
    http: Client,
    endpoint: String,
    session_id: String,
    chromium: bool,
}

impl WebDriverClient {
    /// Start a new browser session
    pub async fn connect(config: &WebDriverConfig) -> DriverResult<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let url = format!("{}/session", config.endpoint);
        let response = http
            .post(&url)
            .json(&config.capabilities())
            .send()
            .await
            .map_err(|e| DriverError::Disconnected(format!("cannot reach {}: {}", config.endpoint, e)))?;
        let value = decode(response).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol(format!("no sessionId in new session response: {}", value)))?
            .to_string();

        info!(endpoint = %config.endpoint, session = %session_id, "WebDriver session started");
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            session_id,
            chromium: config.is_chromium(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        debug!(%method, path, "WebDriver command");
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                DriverError::Disconnected(e.to_string())
            } else {
                DriverError::Http(e)
            }
        })?;
        decode(response).await
    }

    async fn post(&self, path: &str, body: Value) -> DriverResult<Value> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn get(&self, path: &str) -> DriverResult<Value> {
        self.command(Method::GET, path, None).await
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": args })).await
    }

    /// Run a Chrome DevTools Protocol command through chromedriver
    async fn cdp(&self, cmd: &str, params: Value) -> DriverResult<Value> {
        self.post("/goog/cdp/execute", json!({ "cmd": cmd, "params": params })).await
    }

    async fn perform(&self, actions: Value) -> DriverResult<()> {
        self.post("/actions", json!({ "actions": actions })).await?;
        self.command(Method::DELETE, "/actions", None).await?;
        Ok(())
    }
}

fn element_ref(element: &ElementHandle) -> Value {
    json!({ ELEMENT_KEY: element.id() })
}

/// Unwrap `{"value": ...}` or turn a WebDriver error body into a `DriverError`
async fn decode(response: reqwest::Response) -> DriverResult<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| DriverError::Protocol(format!("undecodable response ({}): {}", status, e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }

    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(match error {
        "stale element reference" | "no such element" => DriverError::StaleElement(message),
        "invalid session id" | "no such window" => DriverError::Disconnected(message),
        other => DriverError::Protocol(format!("{}: {}", other, message)),
    })
}

/// Map a key name from the recorder onto a WebDriver key code
fn key_code(key: &str) -> String {
    let code = match key {
        "Enter" | "Return" => '\u{E007}',
        "Tab" => '\u{E004}',
        "Backspace" => '\u{E003}',
        "Escape" | "Esc" => '\u{E00C}',
        "Space" | " " => '\u{E00D}',
        "ArrowLeft" => '\u{E012}',
        "ArrowUp" => '\u{E013}',
        "ArrowRight" => '\u{E014}',
        "ArrowDown" => '\u{E015}',
        "Delete" => '\u{E017}',
        "Shift" => '\u{E008}',
        "Control" => '\u{E009}',
        "Alt" => '\u{E00A}',
        "Meta" => '\u{E03D}',
        other => return other.to_string(),
    };
    code.to_string()
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn find_element(&mut self, selector: &str) -> DriverResult<Option<ElementHandle>> {
        let result = self
            .post("/element", json!({ "using": "css selector", "value": selector }))
            .await;
        match result {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| Some(ElementHandle::new(id)))
                .ok_or_else(|| DriverError::Protocol(format!("no element reference in {}", value))),
            // "no such element" comes back as StaleElement from decode
            Err(DriverError::StaleElement(_)) => Ok(None),
            Err(DriverError::Protocol(msg)) if msg.starts_with("invalid selector") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.post(&format!("/element/{}/click", element.id()), json!({})).await?;
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.perform(json!([{
            "type": "pointer",
            "id": "mouse",
            "parameters": { "pointerType": "mouse" },
            "actions": [{ "type": "pointerMove", "duration": 0, "origin": element_ref(element), "x": 0, "y": 0 }]
        }]))
        .await
    }

    async fn key(&mut self, element: &ElementHandle, key: &str, direction: KeyDirection) -> DriverResult<()> {
        self.execute("arguments[0].focus();", vec![element_ref(element)]).await?;
        let kind = match direction {
            KeyDirection::Down => "keyDown",
            KeyDirection::Up => "keyUp",
        };
        self.perform(json!([{
            "type": "key",
            "id": "keyboard",
            "actions": [{ "type": kind, "value": key_code(key) }]
        }]))
        .await
    }

    async fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.post(&format!("/element/{}/clear", element.id()), json!({})).await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.post(&format!("/element/{}/value", element.id()), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn element_rect(&mut self, element: &ElementHandle) -> DriverResult<ElementRect> {
        // Viewport-relative, which is what a viewport capture is cropped by
        let value = self
            .execute(
                "const r = arguments[0].getBoundingClientRect(); return {x: r.x, y: r.y, width: r.width, height: r.height};",
                vec![element_ref(element)],
            )
            .await?;
        serde_json::from_value(value.clone())
            .map_err(|e| DriverError::Protocol(format!("bad element rect {}: {}", value, e)))
    }

    async fn read_property(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let path = match name {
            "innerText" | "text" => format!("/element/{}/text", element.id()),
            "value" => format!("/element/{}/property/value", element.id()),
            other => format!("/element/{}/attribute/{}", element.id(), other),
        };
        let value = self.get(&path).await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn viewport_size(&mut self) -> DriverResult<(u32, u32)> {
        let value = self
            .execute("return [window.innerWidth, window.innerHeight];", Vec::new())
            .await?;
        let dimension = |idx: usize| value.get(idx).and_then(Value::as_u64).map(|v| v as u32);
        match (dimension(0), dimension(1)) {
            (Some(width), Some(height)) => Ok((width, height)),
            _ => Err(DriverError::Protocol(format!("bad viewport size {}", value))),
        }
    }

    async fn capture_page(&mut self) -> DriverResult<Vec<u8>> {
        let value = self.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Protocol("screenshot is not a string".to_string()))?;
        BASE64
            .decode(encoded)
            .map_err(|e| DriverError::Render(format!("invalid screenshot encoding: {}", e)))
    }

    async fn scroll_element(&mut self, element: &ElementHandle, offset: ScrollOffset) -> DriverResult<()> {
        self.execute(
            "arguments[0].scrollTo(arguments[1], arguments[2]);",
            vec![element_ref(element), json!(offset.x), json!(offset.y)],
        )
        .await?;
        Ok(())
    }

    async fn scroll_page(&mut self, offset: ScrollOffset) -> DriverResult<()> {
        self.execute(
            "window.scrollTo(arguments[0], arguments[1]);",
            vec![json!(offset.x), json!(offset.y)],
        )
        .await?;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        // The W3C navigate command returns once the document is loaded
        self.post("/url", json!({ "url": url })).await.map_err(|e| match e {
            DriverError::Protocol(reason) => DriverError::Navigation {
                url: url.to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn set_viewport(&mut self, device: &DeviceProfile) -> DriverResult<()> {
        if self.chromium {
            // DevTools overrides outlive navigations within the session
            self.cdp(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": device.width,
                    "height": device.height,
                    "deviceScaleFactor": device.device_scale_factor,
                    "mobile": device.mobile,
                }),
            )
            .await?;
            if let Some(ua) = &device.user_agent {
                self.cdp("Network.setUserAgentOverride", json!({ "userAgent": ua }))
                    .await?;
            }
            return Ok(());
        }

        warn!(
            device = %device.id,
            "no device emulation on this browser; resizing the window only"
        );
        self.post(
            "/window/rect",
            json!({ "width": device.width, "height": device.height }),
        )
        .await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> DriverResult<Value> {
        self.post("/execute/async", json!({
            "script": format!(
                "const done = arguments[arguments.length - 1];\n(async () => {{ {} }})().then(done, (e) => done({{__error: String(e)}}));",
                script
            ),
            "args": []
        }))
        .await
    }

    async fn close(&mut self) -> DriverResult<()> {
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        self.http.delete(&url).send().await?;
        info!(session = %self.session_id, "WebDriver session closed");
        Ok(())
    }
}
