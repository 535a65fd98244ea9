//! Named device profiles used by SET_DEVICE steps.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.5112.79 Safari/537.36";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 15_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Mobile/15E148 Safari/604.1";
const PIXEL_UA: &str = "Mozilla/5.0 (Linux; Android 12; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/104.0.5112.69 Mobile Safari/537.36";
const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 15_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Mobile/15E148 Safari/604.1";

/// Viewport and user agent of an emulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    /// Stable identifier stored in recordings (e.g. "GoogleChromeLargeScreen")
    #[serde(default)]
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Viewport width in CSS pixels
    pub width: u32,

    /// Viewport height in CSS pixels
    pub height: u32,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f64,

    #[serde(default)]
    pub mobile: bool,
}

fn default_scale_factor() -> f64 {
    1.0
}

static CATALOG: Lazy<Vec<DeviceProfile>> = Lazy::new(|| {
    vec![
        DeviceProfile::preset("GoogleChromeLargeScreen", "Desktop", 1280, 800, DESKTOP_CHROME_UA, 1.0, false),
        DeviceProfile::preset("GoogleChromeMediumScreen", "Desktop (medium)", 1024, 768, DESKTOP_CHROME_UA, 1.0, false),
        DeviceProfile::preset("iPadPro", "iPad Pro", 1024, 1366, IPAD_UA, 2.0, true),
        DeviceProfile::preset("Pixel5", "Pixel 5", 393, 851, PIXEL_UA, 2.75, true),
        DeviceProfile::preset("iPhone12", "iPhone 12", 390, 844, IPHONE_UA, 3.0, true),
    ]
});

impl DeviceProfile {
    fn preset(
        id: &str,
        name: &str,
        width: u32,
        height: u32,
        user_agent: &str,
        device_scale_factor: f64,
        mobile: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            width,
            height,
            user_agent: Some(user_agent.to_string()),
            device_scale_factor,
            mobile,
        }
    }

    /// All built-in profiles
    pub fn catalog() -> &'static [DeviceProfile] {
        &CATALOG
    }

    /// Look up a built-in profile by id or display name (case-insensitive)
    pub fn find(key: &str) -> Option<DeviceProfile> {
        let key = key.trim();
        CATALOG
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(key) || d.name.eq_ignore_ascii_case(key))
            .cloned()
    }

    /// Parse a `WIDTHxHEIGHT` string into an ad-hoc desktop profile
    pub fn from_dimensions(size: &str) -> Option<DeviceProfile> {
        let (w, h) = size.trim().split_once(['x', 'X'])?;
        let width: u32 = w.parse().ok()?;
        let height: u32 = h.parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            id: format!("{}x{}", width, height),
            name: format!("Custom {}x{}", width, height),
            width,
            height,
            user_agent: None,
            device_scale_factor: 1.0,
            mobile: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_id_and_name() {
        let by_id = DeviceProfile::find("googlechromelargescreen").unwrap();
        assert_eq!((by_id.width, by_id.height), (1280, 800));
        let by_name = DeviceProfile::find("Pixel 5").unwrap();
        assert!(by_name.mobile);
        assert!(DeviceProfile::find("Nokia 3310").is_none());
    }

    #[test]
    fn test_from_dimensions() {
        let custom = DeviceProfile::from_dimensions("800x600").unwrap();
        assert_eq!((custom.width, custom.height), (800, 600));
        assert!(DeviceProfile::from_dimensions("800").is_none());
        assert!(DeviceProfile::from_dimensions("0x600").is_none());
    }
}
