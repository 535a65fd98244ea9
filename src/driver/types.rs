// Core types for the browser driver capability

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{DeviceProfile, KeyDirection, ScrollOffset};

/// Opaque reference to an element in the live page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Bounding box of an element, in CSS pixels relative to the viewport
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Same box in device pixels, for a capture taken at `factor` pixels per CSS pixel
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.width * factor, self.height * factor)
    }
}

/// Capability set a live browser exposes to the executors.
///
/// A driver is owned by exactly one execution session; methods take
/// `&mut self` and are never called concurrently. Implementations do not
/// apply their own timeouts; executors bound every call.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Identifier used in logs (e.g. "webdriver", "mock")
    fn name(&self) -> &str;

    /// Look up an element. `Ok(None)` means "not present right now"; the
    /// caller decides how long to keep polling.
    async fn find_element(&mut self, selector: &str) -> DriverResult<Option<ElementHandle>>;

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    async fn hover(&mut self, element: &ElementHandle) -> DriverResult<()>;

    async fn key(&mut self, element: &ElementHandle, key: &str, direction: KeyDirection) -> DriverResult<()>;

    /// Clear the current value of an editable element
    async fn clear(&mut self, element: &ElementHandle) -> DriverResult<()>;

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    async fn element_rect(&mut self, element: &ElementHandle) -> DriverResult<ElementRect>;

    /// Read `innerText`, `value`, or a named attribute
    async fn read_property(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Viewport size in CSS pixels; captures may be larger on HiDPI devices
    async fn viewport_size(&mut self) -> DriverResult<(u32, u32)>;

    /// PNG of the current viewport
    async fn capture_page(&mut self) -> DriverResult<Vec<u8>>;

    async fn scroll_element(&mut self, element: &ElementHandle, offset: ScrollOffset) -> DriverResult<()>;

    async fn scroll_page(&mut self, offset: ScrollOffset) -> DriverResult<()>;

    /// Load a URL and return once the page reports load-complete
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    async fn set_viewport(&mut self, device: &DeviceProfile) -> DriverResult<()>;

    /// Evaluate a script in the page and return its (awaited) result
    async fn evaluate(&mut self, script: &str) -> DriverResult<Value>;

    /// Release the browser. Further calls may fail with `Disconnected`.
    async fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Error types for driver operations
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The browser went away or the session is no longer valid
    #[error("browser disconnected: {0}")]
    Disconnected(String),

    /// The page did not finish loading
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// An element handle no longer refers to a node in the page
    #[error("stale element reference {0}")]
    StaleElement(String),

    /// The driver answered with something unexpected
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Raster encoding or decoding failed
    #[error("render error: {0}")]
    Render(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<image::ImageError> for DriverError {
    fn from(err: image::ImageError) -> Self {
        DriverError::Render(err.to_string())
    }
}
