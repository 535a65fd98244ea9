//! Browser drivers.
//!
//! [`BrowserDriver`] is the capability set executors run against. Two
//! implementations ship with the crate:
//! - [`WebDriverClient`]: a real browser behind a W3C WebDriver endpoint
//! - [`MockBrowser`]: an in-memory page model rendered into a [`Framebuffer`]

pub mod framebuffer;
pub mod mock;
pub mod types;
pub mod webdriver;

pub use framebuffer::Framebuffer;
pub use mock::{DriverEvent, MockBrowser, MockElement, MockPage, MockSite};
pub use types::{BrowserDriver, DriverError, DriverResult, ElementHandle, ElementRect};
pub use webdriver::{WebDriverClient, WebDriverConfig};
