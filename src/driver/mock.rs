//! In-memory browser for tests and offline replays.
//!
//! A [`MockBrowser`] holds a set of [`MockPage`]s keyed by URL. Elements are
//! matched by exact selector string, interactions are recorded as
//! [`DriverEvent`]s, and captures are rendered into a [`Framebuffer`] so
//! screenshot steps produce real PNGs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::framebuffer::Framebuffer;
use super::types::{BrowserDriver, DriverError, DriverResult, ElementHandle, ElementRect};
use crate::action::{DeviceProfile, KeyDirection, ScrollOffset};

const PAGE_BACKGROUND: [u8; 3] = [255, 255, 255];
const ELEMENT_FILL: [u8; 3] = [230, 232, 240];
const ELEMENT_BORDER: [u8; 3] = [104, 126, 242];
const TEXT_COLOR: [u8; 3] = [20, 20, 20];

/// An element of a mock page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockElement {
    /// Selector that finds this element (exact match)
    pub selector: String,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Position in page coordinates
    #[serde(default)]
    pub rect: ElementRect,

    /// Number of lookups that miss before the element shows up, to emulate
    /// content rendered after load
    #[serde(default)]
    pub appears_after: u32,

    /// Last offset applied by an element scroll
    #[serde(skip)]
    pub scroll: ScrollOffset,
}

impl MockElement {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            rect: ElementRect::new(8.0, 8.0, 160.0, 24.0),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn at(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = ElementRect::new(x, y, width, height);
        self
    }

    pub fn appears_after(mut self, lookups: u32) -> Self {
        self.appears_after = lookups;
        self
    }
}

/// A page the mock browser can navigate to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockPage {
    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub elements: Vec<MockElement>,

    /// Script results keyed by a fragment the evaluated script must contain
    #[serde(default)]
    pub script_results: HashMap<String, Value>,
}

impl MockPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn script(mut self, fragment: &str, result: Value) -> Self {
        self.script_results.insert(fragment.to_string(), result);
        self
    }
}

/// Set of pages loaded from a fixture file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockSite {
    pub pages: Vec<MockPage>,

    /// Page shown before the first navigation (defaults to the first page)
    #[serde(default)]
    pub start_url: Option<String>,
}

/// Interaction recorded by the mock browser
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Navigate(String),
    Click(String),
    Hover(String),
    Key {
        selector: String,
        key: String,
        direction: KeyDirection,
    },
    Clear(String),
    Type { selector: String, text: String },
    ScrollElement { selector: String, offset: ScrollOffset },
    ScrollPage(ScrollOffset),
    SetViewport { width: u32, height: u32 },
    Capture,
    Evaluate(String),
}

pub struct MockBrowser {
    pages: HashMap<String, MockPage>,
    current: MockPage,
    viewport: (u32, u32),
    /// Device pixels per CSS pixel in captures
    scale_factor: f64,
    user_agent: Option<String>,
    page_scroll: ScrollOffset,
    lookups: HashMap<String, u32>,
    events: Vec<DriverEvent>,
    navigation_delay: Duration,
    disconnected: bool,
}

impl MockBrowser {
    /// Empty browser sitting on `about:blank`
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: MockPage::new("about:blank"),
            viewport: (1280, 800),
            scale_factor: 1.0,
            user_agent: None,
            page_scroll: ScrollOffset::default(),
            lookups: HashMap::new(),
            events: Vec::new(),
            navigation_delay: Duration::ZERO,
            disconnected: false,
        }
    }

    /// Browser already showing `page`
    pub fn with_page(page: MockPage) -> Self {
        let mut browser = Self::new();
        browser.pages.insert(page.url.clone(), page.clone());
        browser.current = page;
        browser
    }

    pub fn from_site(site: MockSite) -> Self {
        let mut browser = Self::new();
        let start = site
            .start_url
            .clone()
            .or_else(|| site.pages.first().map(|p| p.url.clone()));
        for page in site.pages {
            browser.pages.insert(page.url.clone(), page);
        }
        if let Some(page) = start.and_then(|url| browser.pages.get(&url).cloned()) {
            browser.current = page;
        }
        browser
    }

    /// Load a [`MockSite`] (or a single [`MockPage`]) from a JSON file
    pub fn from_fixture(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        let site = if value.get("pages").is_some() {
            serde_json::from_value::<MockSite>(value)?
        } else {
            MockSite {
                pages: vec![serde_json::from_value::<MockPage>(value)?],
                start_url: None,
            }
        };
        Ok(Self::from_site(site))
    }

    /// Register another page reachable through `navigate`
    pub fn add_page(&mut self, page: MockPage) {
        self.pages.insert(page.url.clone(), page);
    }

    /// Delay every navigation, to exercise timeouts
    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    /// Simulate the browser going away
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    pub fn events(&self) -> &[DriverEvent] {
        &self.events
    }

    pub fn current_url(&self) -> &str {
        &self.current.url
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn page_scroll(&self) -> ScrollOffset {
        self.page_scroll
    }

    /// Current value of an element, for assertions in tests
    pub fn element_value(&self, selector: &str) -> Option<&str> {
        self.current
            .elements
            .iter()
            .find(|e| e.selector == selector)
            .map(|e| e.value.as_str())
    }

    fn ensure_connected(&self) -> DriverResult<()> {
        if self.disconnected {
            return Err(DriverError::Disconnected("mock browser was disconnected".to_string()));
        }
        Ok(())
    }

    fn element_mut(&mut self, handle: &ElementHandle) -> DriverResult<&mut MockElement> {
        self.ensure_connected()?;
        handle
            .id()
            .strip_prefix("mock-")
            .and_then(|idx| idx.parse::<usize>().ok())
            .and_then(|idx| self.current.elements.get_mut(idx))
            .ok_or_else(|| DriverError::StaleElement(handle.id().to_string()))
    }

    fn selector_of(&mut self, handle: &ElementHandle) -> DriverResult<String> {
        Ok(self.element_mut(handle)?.selector.clone())
    }

    /// Rasterize the current page at the device scale factor.
    ///
    /// Positions are computed in floating point; `as` casts saturate, so
    /// extreme scroll offsets only push elements off screen.
    fn render(&self) -> Framebuffer {
        let scale = self.scale_factor;
        let (width, height) = self.viewport;
        let mut fb = Framebuffer::with_color(
            (f64::from(width) * scale).round() as u32,
            (f64::from(height) * scale).round() as u32,
            PAGE_BACKGROUND,
        );
        if !self.current.title.is_empty() {
            fb.draw_text(8, 2, &self.current.title, TEXT_COLOR);
        }
        for element in &self.current.elements {
            let x = ((element.rect.x - self.page_scroll.x as f64) * scale).round() as i64;
            let y = ((element.rect.y - self.page_scroll.y as f64) * scale).round() as i64;
            let w = (element.rect.width.max(0.0) * scale).round() as u32;
            let h = (element.rect.height.max(0.0) * scale).round() as u32;
            fb.draw_rect(x, y, w, h, ELEMENT_FILL);
            fb.draw_outline(x, y, w, h, ELEMENT_BORDER);
            let label = if element.value.is_empty() { &element.text } else { &element.value };
            fb.draw_text(x.saturating_add(4), y.saturating_add(4), label, TEXT_COLOR);
        }
        fb
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for MockBrowser {
    fn name(&self) -> &str {
        "mock"
    }

    async fn find_element(&mut self, selector: &str) -> DriverResult<Option<ElementHandle>> {
        self.ensure_connected()?;
        let Some(idx) = self.current.elements.iter().position(|e| e.selector == selector) else {
            return Ok(None);
        };
        let seen = self.lookups.entry(selector.to_string()).or_insert(0);
        *seen += 1;
        if *seen <= self.current.elements[idx].appears_after {
            return Ok(None);
        }
        Ok(Some(ElementHandle::new(format!("mock-{}", idx))))
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let selector = self.selector_of(element)?;
        self.events.push(DriverEvent::Click(selector));
        Ok(())
    }

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let selector = self.selector_of(element)?;
        self.events.push(DriverEvent::Hover(selector));
        Ok(())
    }

    async fn key(&mut self, element: &ElementHandle, key: &str, direction: KeyDirection) -> DriverResult<()> {
        let selector = self.selector_of(element)?;
        self.events.push(DriverEvent::Key {
            selector,
            key: key.to_string(),
            direction,
        });
        Ok(())
    }

    async fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let target = self.element_mut(element)?;
        target.value.clear();
        let selector = target.selector.clone();
        self.events.push(DriverEvent::Clear(selector));
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let target = self.element_mut(element)?;
        target.value.push_str(text);
        let selector = target.selector.clone();
        self.events.push(DriverEvent::Type {
            selector,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn element_rect(&mut self, element: &ElementHandle) -> DriverResult<ElementRect> {
        let scroll = self.page_scroll;
        let rect = self.element_mut(element)?.rect;
        Ok(ElementRect::new(
            rect.x - scroll.x as f64,
            rect.y - scroll.y as f64,
            rect.width,
            rect.height,
        ))
    }

    async fn read_property(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let target = self.element_mut(element)?;
        let value = match name {
            "innerText" | "textContent" | "text" => Some(target.text.clone()),
            "value" => Some(target.value.clone()),
            other => target.attributes.get(other).cloned(),
        };
        Ok(value)
    }

    async fn viewport_size(&mut self) -> DriverResult<(u32, u32)> {
        self.ensure_connected()?;
        Ok(self.viewport)
    }

    async fn capture_page(&mut self) -> DriverResult<Vec<u8>> {
        self.ensure_connected()?;
        self.events.push(DriverEvent::Capture);
        self.render().to_png()
    }

    async fn scroll_element(&mut self, element: &ElementHandle, offset: ScrollOffset) -> DriverResult<()> {
        let target = self.element_mut(element)?;
        target.scroll = offset;
        let selector = target.selector.clone();
        self.events.push(DriverEvent::ScrollElement { selector, offset });
        Ok(())
    }

    async fn scroll_page(&mut self, offset: ScrollOffset) -> DriverResult<()> {
        self.ensure_connected()?;
        self.page_scroll = offset;
        self.events.push(DriverEvent::ScrollPage(offset));
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.ensure_connected()?;
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }
        let page = self.pages.get(url).cloned().ok_or_else(|| DriverError::Navigation {
            url: url.to_string(),
            reason: "no such page in mock site".to_string(),
        })?;
        debug!(url, "mock navigation");
        self.current = page;
        self.page_scroll = ScrollOffset::default();
        self.lookups.clear();
        self.events.push(DriverEvent::Navigate(url.to_string()));
        Ok(())
    }

    async fn set_viewport(&mut self, device: &DeviceProfile) -> DriverResult<()> {
        self.ensure_connected()?;
        self.viewport = (device.width, device.height);
        self.scale_factor = if device.device_scale_factor.is_finite() && device.device_scale_factor > 0.0 {
            device.device_scale_factor
        } else {
            1.0
        };
        self.user_agent = device.user_agent.clone();
        self.events.push(DriverEvent::SetViewport {
            width: device.width,
            height: device.height,
        });
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> DriverResult<Value> {
        self.ensure_connected()?;
        self.events.push(DriverEvent::Evaluate(script.to_string()));
        let result = self
            .current
            .script_results
            .iter()
            .find(|(fragment, _)| script.contains(fragment.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null);
        Ok(result)
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.disconnected = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login_page() -> MockPage {
        MockPage::new("https://app.test/login")
            .title("Login")
            .element(MockElement::new("#email").at(10.0, 40.0, 200.0, 24.0))
            .element(MockElement::new("#submit").text("Sign in").at(10.0, 80.0, 80.0, 24.0))
    }

    #[tokio::test]
    async fn test_find_and_type() {
        let mut browser = MockBrowser::with_page(login_page());
        let email = browser.find_element("#email").await.unwrap().unwrap();
        browser.type_text(&email, "a@b.c").await.unwrap();
        browser.clear(&email).await.unwrap();
        browser.type_text(&email, "x@y.z").await.unwrap();
        assert_eq!(browser.element_value("#email"), Some("x@y.z"));
        assert!(browser.find_element("#missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_appears_after_lookups() {
        let page = MockPage::new("https://app.test/")
            .element(MockElement::new("#late").appears_after(2));
        let mut browser = MockBrowser::with_page(page);
        assert!(browser.find_element("#late").await.unwrap().is_none());
        assert!(browser.find_element("#late").await.unwrap().is_none());
        assert!(browser.find_element("#late").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_navigate_unknown_page_fails() {
        let mut browser = MockBrowser::with_page(login_page());
        let err = browser.navigate("https://elsewhere.test/").await.unwrap_err();
        assert!(matches!(err, DriverError::Navigation { .. }));
        assert_eq!(browser.current_url(), "https://app.test/login");
    }

    #[tokio::test]
    async fn test_capture_uses_viewport() {
        let mut browser = MockBrowser::with_page(login_page());
        let device = DeviceProfile::from_dimensions("320x200").unwrap();
        browser.set_viewport(&device).await.unwrap();
        let png = browser.capture_page().await.unwrap();
        let fb = Framebuffer::from_png_bytes(&png).unwrap();
        assert_eq!((fb.width(), fb.height()), (320, 200));
        assert_eq!(fb.get_pixel(10, 40), ELEMENT_BORDER);
    }

    #[tokio::test]
    async fn test_capture_honors_scale_factor() {
        let mut browser = MockBrowser::with_page(login_page());
        let device = DeviceProfile::find("iPhone12").unwrap();
        browser.set_viewport(&device).await.unwrap();
        let png = browser.capture_page().await.unwrap();
        let fb = Framebuffer::from_png_bytes(&png).unwrap();
        assert_eq!((fb.width(), fb.height()), (390 * 3, 844 * 3));
        assert_eq!(fb.get_pixel(30, 120), ELEMENT_BORDER);
        assert_eq!(browser.viewport_size().await.unwrap(), (390, 844));
    }

    #[tokio::test]
    async fn test_extreme_page_scroll_still_renders() {
        let mut browser = MockBrowser::with_page(login_page());
        browser.scroll_page(ScrollOffset { x: i64::MIN, y: i64::MAX }).await.unwrap();
        let png = browser.capture_page().await.unwrap();
        let fb = Framebuffer::from_png_bytes(&png).unwrap();
        assert_eq!((fb.width(), fb.height()), (1280, 800));
        assert_eq!(fb.get_pixel(12, 42), PAGE_BACKGROUND);
    }

    #[tokio::test]
    async fn test_evaluate_matches_fragment() {
        let page = login_page().script("validate", json!(true));
        let mut browser = MockBrowser::with_page(page);
        let value = browser
            .evaluate("async function validate() { return true; }\nreturn await validate();")
            .await
            .unwrap();
        assert_eq!(value, json!(true));
        assert_eq!(browser.evaluate("document.title").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mut browser = MockBrowser::with_page(login_page());
        browser.disconnect();
        assert!(matches!(
            browser.find_element("#email").await,
            Err(DriverError::Disconnected(_))
        ));
    }
}
