//! Wire model of a recorded action.
//!
//! The recorder emits actions as loosely-shaped JSON (`iAction`). This module
//! keeps that shape intact: unknown fields are preserved, fields a given type
//! does not use are ignored. Typed validation happens later, in
//! [`Step`](super::Step).

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of a recorded action.
///
/// Serialized with the short names (`CLICK`, `NAVIGATE_URL`, ...). The long
/// names written by older recorders (`ELEMENT_CLICK`, `BROWSER_SET_DEVICE`,
/// ...) are accepted when decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    #[serde(alias = "ELEMENT_CLICK")]
    Click,
    #[serde(alias = "ELEMENT_ADD_INPUT")]
    Input,
    #[serde(alias = "ELEMENT_HOVER")]
    Hover,
    #[serde(alias = "ELEMENT_KEYUP")]
    Keyup,
    #[serde(alias = "ELEMENT_KEYDOWN")]
    Keydown,
    #[serde(alias = "PAGE_TAKE_SCREENSHOT")]
    PageScreenshot,
    #[serde(alias = "ELEMENT_TAKE_SCREENSHOT")]
    ElementScreenshot,
    ElementScroll,
    PageScroll,
    #[serde(alias = "PAGE_NAVIGATE_URL")]
    NavigateUrl,
    #[serde(alias = "BROWSER_SET_DEVICE")]
    SetDevice,
    #[serde(alias = "ELEMENT_ASSERT")]
    AssertElement,
    #[serde(alias = "ELEMENT_CUSTOM_SCRIPT", alias = "PAGE_CUSTOM_CODE")]
    CustomCode,
    #[serde(alias = "PAGE_WAIT")]
    Wait,
    #[serde(alias = "BROWSER_RUN_AFTER_TEST")]
    RunAfterTest,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "CLICK",
            ActionType::Input => "INPUT",
            ActionType::Hover => "HOVER",
            ActionType::Keyup => "KEYUP",
            ActionType::Keydown => "KEYDOWN",
            ActionType::PageScreenshot => "PAGE_SCREENSHOT",
            ActionType::ElementScreenshot => "ELEMENT_SCREENSHOT",
            ActionType::ElementScroll => "ELEMENT_SCROLL",
            ActionType::PageScroll => "PAGE_SCROLL",
            ActionType::NavigateUrl => "NAVIGATE_URL",
            ActionType::SetDevice => "SET_DEVICE",
            ActionType::AssertElement => "ASSERT_ELEMENT",
            ActionType::CustomCode => "CUSTOM_CODE",
            ActionType::Wait => "WAIT",
            ActionType::RunAfterTest => "RUN_AFTER_TEST",
        }
    }

    /// Actions that configure the browser or pull in another test rather
    /// than interacting with the page.
    pub fn is_browser_action(&self) -> bool {
        matches!(self, ActionType::SetDevice | ActionType::RunAfterTest)
    }

    /// Whether the action targets a single element and needs a selector.
    pub fn is_element_scoped(&self) -> bool {
        matches!(
            self,
            ActionType::Click
                | ActionType::Input
                | ActionType::Hover
                | ActionType::Keyup
                | ActionType::Keydown
                | ActionType::ElementScreenshot
                | ActionType::ElementScroll
                | ActionType::AssertElement
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a persisted test.
///
/// The backend hands out numeric ids, the UI passes them around as strings;
/// both decode into the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TestId(String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a test id out of a JSON value (`"42"` or `42`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        TestId::from_value(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid test id: {}", value)))
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TestId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A ranked locator captured by the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorInfo {
    /// Locator strategy reported by the recorder (e.g. "PnC", "attribute")
    #[serde(rename = "type", default)]
    pub kind: String,

    /// The selector itself
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueness_score: Option<f64>,
}

/// Type-specific parameters of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    /// Primary locator of the target element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Fallback locators, best first
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<SelectorInfo>,

    /// Free-form parameters (`value`, `script`, `validations`, ...)
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

/// One recorded interaction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    #[serde(default, deserialize_with = "nullable")]
    pub payload: ActionPayload,

    /// Human-readable step name given in the recorder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// DOM context captured at record time; opaque to the replayer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_info: Option<Value>,

    /// Anything else the recorder attached (url, timestamps, status, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            payload: ActionPayload::default(),
            name: None,
            element_info: None,
            extra: Map::new(),
        }
    }

    pub fn click(selector: &str) -> Self {
        Self::new(ActionType::Click).selector(selector)
    }

    pub fn hover(selector: &str) -> Self {
        Self::new(ActionType::Hover).selector(selector)
    }

    pub fn input(selector: &str, value: &str) -> Self {
        Self::new(ActionType::Input).selector(selector).meta("value", value)
    }

    pub fn navigate(url: &str) -> Self {
        Self::new(ActionType::NavigateUrl).meta("value", url)
    }

    pub fn set_device(device_id: &str) -> Self {
        Self::new(ActionType::SetDevice).meta("value", device_id)
    }

    pub fn run_after_test(test_id: impl Into<TestId>) -> Self {
        let test_id = test_id.into();
        Self::new(ActionType::RunAfterTest).meta("value", test_id.as_str())
    }

    /// Set the primary selector
    pub fn selector(mut self, selector: &str) -> Self {
        self.payload.selector = Some(selector.to_string());
        self
    }

    /// Add a ranked fallback selector
    pub fn fallback_selector(mut self, selector: &str) -> Self {
        self.payload.selectors.push(SelectorInfo {
            kind: "fallback".to_string(),
            value: selector.to_string(),
            uniqueness_score: None,
        });
        self
    }

    /// Set a `payload.meta` entry
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Candidate selectors in resolution order: the primary selector, then
    /// the recorder's fallbacks. Duplicates and blanks are dropped.
    pub fn selector_candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let primary = self.payload.selector.iter().map(String::as_str);
        let fallbacks = self.payload.selectors.iter().map(|s| s.value.as_str());
        for candidate in primary.chain(fallbacks) {
            let candidate = candidate.trim();
            if !candidate.is_empty() && !out.iter().any(|c| c == candidate) {
                out.push(candidate.to_string());
            }
        }
        out
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.payload.meta.get(key).filter(|v| !v.is_null())
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta_value(key).and_then(Value::as_str)
    }

    /// The test referenced by a RUN_AFTER_TEST action.
    pub fn referenced_test(&self) -> Option<TestId> {
        if self.action_type != ActionType::RunAfterTest {
            return None;
        }
        self.meta_value("value").and_then(TestId::from_value)
    }

    /// Short label used in logs and artifact names
    pub fn label(&self) -> String {
        match (&self.name, self.payload.selector.as_deref()) {
            (Some(name), _) => format!("{} ({})", self.action_type, name),
            (None, Some(selector)) => format!("{} {}", self.action_type, selector),
            (None, None) => self.action_type.to_string(),
        }
    }
}

/// A persisted test: an ordered list of recorded actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TestId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, alias = "actions", deserialize_with = "nullable")]
    pub events: Vec<Action>,
}

/// Whether an action runs against the browser rather than the page
/// (device setup, sub-test references).
pub fn is_browser_action(action: &Action) -> bool {
    action.action_type.is_browser_action()
}

/// Whether an action is a primary page/element step.
pub fn is_main_action(action: &Action) -> bool {
    !is_browser_action(action)
}

/// Browser actions of a list, in their original order.
pub fn get_browser_actions(actions: &[Action]) -> Vec<Action> {
    actions.iter().filter(|a| is_browser_action(a)).cloned().collect()
}

/// Main actions of a list, in their original order.
pub fn get_main_actions(actions: &[Action]) -> Vec<Action> {
    actions.iter().filter(|a| is_main_action(a)).cloned().collect()
}

/// Decode `null` the same way as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Errors raised while turning a wire action into a typed step
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    #[error("{action_type} action has no selector")]
    MissingSelector { action_type: ActionType },

    #[error("{action_type} action is missing `meta.{field}`")]
    MissingField {
        action_type: ActionType,
        field: &'static str,
    },

    #[error("{action_type} action has an invalid `meta.{field}`: {reason}")]
    InvalidField {
        action_type: ActionType,
        field: &'static str,
        reason: String,
    },
}

/// Result type for action validation
pub type ActionResult<T> = Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_recorder_long_names() {
        let action: Action = serde_json::from_value(json!({
            "type": "BROWSER_SET_DEVICE",
            "payload": { "meta": { "value": "GoogleChromeLargeScreen" } }
        }))
        .unwrap();
        assert_eq!(action.action_type, ActionType::SetDevice);

        let action: Action = serde_json::from_value(json!({ "type": "PAGE_NAVIGATE_URL" })).unwrap();
        assert_eq!(action.action_type, ActionType::NavigateUrl);
    }

    #[test]
    fn test_tolerates_null_and_unknown_fields() {
        let action: Action = serde_json::from_value(json!({
            "type": "CLICK",
            "payload": { "selectors": null, "meta": null, "selector": "#go" },
            "url": "https://example.com",
            "timeStamp": 1650000000
        }))
        .unwrap();
        assert_eq!(action.payload.selector.as_deref(), Some("#go"));
        assert!(action.payload.meta.is_empty());
        assert_eq!(action.extra.get("url"), Some(&json!("https://example.com")));

        let back = serde_json::to_value(&action).unwrap();
        assert_eq!(back["timeStamp"], json!(1650000000));
        assert_eq!(back["type"], json!("CLICK"));
    }

    #[test]
    fn test_test_id_accepts_numbers_and_strings() {
        let a: TestId = serde_json::from_value(json!(42)).unwrap();
        let b: TestId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_value::<TestId>(json!(null)).is_err());
    }

    #[test]
    fn test_referenced_test() {
        let action = Action::new(ActionType::RunAfterTest).meta("value", 7);
        assert_eq!(action.referenced_test(), Some(TestId::from(7)));
        assert_eq!(Action::click("#a").referenced_test(), None);
        assert_eq!(Action::new(ActionType::RunAfterTest).referenced_test(), None);
    }

    #[test]
    fn test_selector_candidates_dedupe() {
        let action = Action::click("#primary")
            .fallback_selector("#primary")
            .fallback_selector(" ")
            .fallback_selector("button.submit");
        assert_eq!(action.selector_candidates(), vec!["#primary", "button.submit"]);
    }

    #[test]
    fn test_partition_preserves_order() {
        let actions = vec![
            Action::set_device("GoogleChromeLargeScreen"),
            Action::navigate("https://example.com"),
            Action::run_after_test("2"),
            Action::click("#a"),
        ];
        let browser: Vec<ActionType> = get_browser_actions(&actions).iter().map(|a| a.action_type).collect();
        let main: Vec<ActionType> = get_main_actions(&actions).iter().map(|a| a.action_type).collect();
        assert_eq!(browser, vec![ActionType::SetDevice, ActionType::RunAfterTest]);
        assert_eq!(main, vec![ActionType::NavigateUrl, ActionType::Click]);
    }
}
