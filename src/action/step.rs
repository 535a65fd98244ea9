//! Typed view of a recorded action.
//!
//! [`Step`] is what executors consume: one variant per action kind with the
//! parameters that kind needs, already validated. Conversion from the wire
//! [`Action`] is the only place where the free-form `payload.meta` map is
//! interpreted.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::device::DeviceProfile;
use super::types::{Action, ActionError, ActionResult, ActionType, TestId};

/// Direction of a keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Scroll target in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: i64,
    pub y: i64,
}

impl ScrollOffset {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Accepts a vertical offset (`120`), a pair (`[0, 120]`) or an object
    /// (`{"x": 0, "y": 120}`).
    pub fn from_value(value: &Value) -> Option<Self> {
        fn coord(v: &Value) -> Option<i64> {
            match v {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
                Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
                _ => None,
            }
        }

        match value {
            Value::Array(items) => match items.as_slice() {
                [x, y] => Some(Self::new(coord(x)?, coord(y)?)),
                [y] => Some(Self::new(0, coord(y)?)),
                _ => None,
            },
            Value::Object(map) => {
                let x = map.get("x").map(coord).unwrap_or(Some(0))?;
                let y = map.get("y").map(coord).unwrap_or(Some(0))?;
                Some(Self::new(x, y))
            }
            other => coord(other).map(|y| Self::new(0, y)),
        }
    }
}

/// How an assertion compares the element's value against the expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertOperation {
    Matches,
    Contains,
    Regex,
}

impl AssertOperation {
    fn parse(op: &str) -> Option<Self> {
        match op.trim().to_ascii_uppercase().as_str() {
            "MATCHES" | "EQUALS" | "EQ" => Some(AssertOperation::Matches),
            "CONTAINS" => Some(AssertOperation::Contains),
            "REGEX" => Some(AssertOperation::Regex),
            _ => None,
        }
    }
}

/// One validation of an ASSERT_ELEMENT step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRule {
    /// `innerText`, `value`, or an attribute name
    pub field: String,
    pub operation: AssertOperation,
    pub value: String,
}

impl AssertionRule {
    /// Parse a recorded validation. Both the flat form
    /// `{field, operation, value}` and the recorder's nested form
    /// `{field: {name}, operation, validation}` are understood.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let field = match value.get("field") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("name")
                .and_then(Value::as_str)
                .ok_or("validation field has no name")?
                .to_string(),
            _ => return Err("validation has no field".to_string()),
        };
        let operation = value
            .get("operation")
            .and_then(Value::as_str)
            .and_then(AssertOperation::parse)
            .ok_or_else(|| format!("validation on `{}` has an unknown operation", field))?;
        let expected = match value.get("value").or_else(|| value.get("validation")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => return Err(format!("validation on `{}` has no expected value", field)),
        };
        Ok(Self {
            field,
            operation,
            value: expected,
        })
    }

    /// Check the element's current value. A missing value never matches.
    /// Only an invalid pattern is an error.
    pub fn evaluate(&self, actual: Option<&str>) -> Result<bool, String> {
        let Some(actual) = actual else {
            return Ok(false);
        };
        match self.operation {
            AssertOperation::Matches => Ok(actual.trim() == self.value.trim()),
            AssertOperation::Contains => Ok(actual.contains(&self.value)),
            AssertOperation::Regex => Regex::new(&self.value)
                .map(|re| re.is_match(actual))
                .map_err(|e| format!("invalid pattern `{}`: {}", self.value, e)),
        }
    }
}

/// A validated action, ready for an executor
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Click {
        selectors: Vec<String>,
    },
    Hover {
        selectors: Vec<String>,
    },
    Key {
        selectors: Vec<String>,
        key: String,
        direction: KeyDirection,
    },
    Input {
        selectors: Vec<String>,
        value: String,
    },
    ElementScreenshot {
        selectors: Vec<String>,
        name: Option<String>,
    },
    PageScreenshot {
        name: Option<String>,
    },
    ElementScroll {
        selectors: Vec<String>,
        offset: ScrollOffset,
    },
    PageScroll {
        offset: ScrollOffset,
    },
    Navigate {
        url: String,
    },
    SetDevice {
        device: DeviceProfile,
    },
    AssertElement {
        selectors: Vec<String>,
        rules: Vec<AssertionRule>,
    },
    CustomCode {
        script: String,
        template_id: Option<String>,
    },
    Wait {
        duration: Duration,
    },
    RunAfterTest {
        test_id: TestId,
    },
}

impl TryFrom<&Action> for Step {
    type Error = ActionError;

    fn try_from(action: &Action) -> ActionResult<Self> {
        let kind = action.action_type;
        let step = match kind {
            ActionType::Click => Step::Click {
                selectors: selectors(action)?,
            },
            ActionType::Hover => Step::Hover {
                selectors: selectors(action)?,
            },
            ActionType::Keyup | ActionType::Keydown => Step::Key {
                selectors: selectors(action)?,
                key: required_str(action, "value")?,
                direction: if kind == ActionType::Keyup {
                    KeyDirection::Up
                } else {
                    KeyDirection::Down
                },
            },
            ActionType::Input => Step::Input {
                selectors: selectors(action)?,
                value: required_text(action, "value")?,
            },
            ActionType::ElementScreenshot => Step::ElementScreenshot {
                selectors: selectors(action)?,
                name: action.meta_str("name").map(str::to_string),
            },
            ActionType::PageScreenshot => Step::PageScreenshot {
                name: action.meta_str("name").map(str::to_string),
            },
            ActionType::ElementScroll => Step::ElementScroll {
                selectors: selectors(action)?,
                offset: scroll_offset(action)?,
            },
            ActionType::PageScroll => Step::PageScroll {
                offset: scroll_offset(action)?,
            },
            ActionType::NavigateUrl => Step::Navigate {
                url: required_str(action, "value")?,
            },
            ActionType::SetDevice => Step::SetDevice {
                device: device(action)?,
            },
            ActionType::AssertElement => Step::AssertElement {
                selectors: selectors(action)?,
                rules: validations(action)?,
            },
            ActionType::CustomCode => Step::CustomCode {
                script: required_str(action, "script")?,
                template_id: action.meta_value("templateId").map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            },
            ActionType::Wait => Step::Wait {
                duration: wait_duration(action)?,
            },
            ActionType::RunAfterTest => Step::RunAfterTest {
                test_id: action.referenced_test().ok_or(ActionError::MissingField {
                    action_type: kind,
                    field: "value",
                })?,
            },
        };
        Ok(step)
    }
}

fn selectors(action: &Action) -> ActionResult<Vec<String>> {
    let candidates = action.selector_candidates();
    if candidates.is_empty() {
        return Err(ActionError::MissingSelector {
            action_type: action.action_type,
        });
    }
    Ok(candidates)
}

fn required_str(action: &Action, field: &'static str) -> ActionResult<String> {
    match action.meta_value(field) {
        None => Err(ActionError::MissingField {
            action_type: action.action_type,
            field,
        }),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(_) => Err(ActionError::InvalidField {
            action_type: action.action_type,
            field,
            reason: "expected a non-empty string".to_string(),
        }),
    }
}

/// Like [`required_str`] but empty strings and scalars are accepted; typing
/// an empty value is a legitimate step.
fn required_text(action: &Action, field: &'static str) -> ActionResult<String> {
    match action.meta_value(field) {
        None => Err(ActionError::MissingField {
            action_type: action.action_type,
            field,
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(_) => Err(ActionError::InvalidField {
            action_type: action.action_type,
            field,
            reason: "expected text".to_string(),
        }),
    }
}

fn scroll_offset(action: &Action) -> ActionResult<ScrollOffset> {
    let value = action.meta_value("value").ok_or(ActionError::MissingField {
        action_type: action.action_type,
        field: "value",
    })?;
    ScrollOffset::from_value(value).ok_or_else(|| ActionError::InvalidField {
        action_type: action.action_type,
        field: "value",
        reason: format!("cannot read a scroll offset from {}", value),
    })
}

fn device(action: &Action) -> ActionResult<DeviceProfile> {
    let invalid = |reason: String| ActionError::InvalidField {
        action_type: action.action_type,
        field: "device",
        reason,
    };

    let mut profile = match action.meta_value("device") {
        Some(Value::Object(_)) => {
            let value = action.meta_value("device").cloned().unwrap_or(Value::Null);
            serde_json::from_value::<DeviceProfile>(value).map_err(|e| invalid(e.to_string()))?
        }
        Some(Value::String(key)) => lookup_device(key).ok_or_else(|| invalid(format!("unknown device `{}`", key)))?,
        Some(other) => return Err(invalid(format!("unexpected device value {}", other))),
        None => {
            let key = action.meta_str("value").ok_or(ActionError::MissingField {
                action_type: action.action_type,
                field: "device",
            })?;
            lookup_device(key).ok_or_else(|| invalid(format!("unknown device `{}`", key)))?
        }
    };

    if let Some(ua) = action.meta_str("userAgent") {
        profile.user_agent = Some(ua.to_string());
    }
    if profile.width == 0 || profile.height == 0 {
        return Err(invalid("viewport must be non-empty".to_string()));
    }
    Ok(profile)
}

fn lookup_device(key: &str) -> Option<DeviceProfile> {
    DeviceProfile::find(key).or_else(|| DeviceProfile::from_dimensions(key))
}

fn validations(action: &Action) -> ActionResult<Vec<AssertionRule>> {
    let field = "validations";
    let items = match action.meta_value(field) {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ActionError::InvalidField {
                action_type: action.action_type,
                field,
                reason: "expected a list".to_string(),
            });
        }
        None => {
            return Err(ActionError::MissingField {
                action_type: action.action_type,
                field,
            });
        }
    };
    items
        .iter()
        .map(|item| {
            AssertionRule::from_value(item).map_err(|reason| ActionError::InvalidField {
                action_type: action.action_type,
                field,
                reason,
            })
        })
        .collect()
}

fn wait_duration(action: &Action) -> ActionResult<Duration> {
    let value = action.meta_value("value").ok_or(ActionError::MissingField {
        action_type: action.action_type,
        field: "value",
    })?;
    let millis = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    millis.map(Duration::from_millis).ok_or_else(|| ActionError::InvalidField {
        action_type: action.action_type,
        field: "value",
        reason: format!("expected milliseconds, got {}", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_click_requires_selector() {
        let err = Step::try_from(&Action::new(ActionType::Click)).unwrap_err();
        assert_eq!(
            err,
            ActionError::MissingSelector {
                action_type: ActionType::Click
            }
        );
    }

    #[test]
    fn test_keyup_and_keydown_share_a_variant() {
        let up = Action::new(ActionType::Keyup).selector("#q").meta("value", "Enter");
        assert_eq!(
            Step::try_from(&up).unwrap(),
            Step::Key {
                selectors: vec!["#q".to_string()],
                key: "Enter".to_string(),
                direction: KeyDirection::Up
            }
        );
    }

    #[test]
    fn test_input_accepts_empty_value() {
        let action = Action::input("#name", "");
        assert!(matches!(Step::try_from(&action).unwrap(), Step::Input { value, .. } if value.is_empty()));
    }

    #[test]
    fn test_scroll_offset_shapes() {
        assert_eq!(ScrollOffset::from_value(&json!(120)), Some(ScrollOffset::new(0, 120)));
        assert_eq!(ScrollOffset::from_value(&json!([10, 20])), Some(ScrollOffset::new(10, 20)));
        assert_eq!(ScrollOffset::from_value(&json!({"y": 5.6})), Some(ScrollOffset::new(0, 6)));
        assert_eq!(ScrollOffset::from_value(&json!("nope")), None);
    }

    #[test]
    fn test_set_device_from_catalog_and_inline() {
        let by_id = Step::try_from(&Action::set_device("Pixel5")).unwrap();
        assert!(matches!(by_id, Step::SetDevice { device } if device.width == 393));

        let inline = Action::new(ActionType::SetDevice)
            .meta("device", json!({"id": "kiosk", "width": 640, "height": 480}))
            .meta("userAgent", "KioskBrowser/1.0");
        match Step::try_from(&inline).unwrap() {
            Step::SetDevice { device } => {
                assert_eq!((device.width, device.height), (640, 480));
                assert_eq!(device.user_agent.as_deref(), Some("KioskBrowser/1.0"));
            }
            other => panic!("unexpected step {:?}", other),
        }

        assert!(Step::try_from(&Action::set_device("Nokia")).is_err());
    }

    #[test]
    fn test_assert_rules_both_shapes() {
        let action = Action::new(ActionType::AssertElement).selector("h1").meta(
            "validations",
            json!([
                {"field": "innerText", "operation": "MATCHES", "value": "Welcome"},
                {"field": {"name": "class"}, "operation": "contains", "validation": "hero"}
            ]),
        );
        match Step::try_from(&action).unwrap() {
            Step::AssertElement { rules, .. } => {
                assert_eq!(rules.len(), 2);
                assert_eq!(rules[1].field, "class");
                assert_eq!(rules[1].operation, AssertOperation::Contains);
                assert_eq!(rules[1].value, "hero");
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_assertion_rule_evaluate() {
        let rule = AssertionRule {
            field: "innerText".to_string(),
            operation: AssertOperation::Regex,
            value: r"^Order #\d+$".to_string(),
        };
        assert_eq!(rule.evaluate(Some("Order #42")), Ok(true));
        assert_eq!(rule.evaluate(Some("Order #x")), Ok(false));
        assert_eq!(rule.evaluate(None), Ok(false));

        let broken = AssertionRule {
            value: "(".to_string(),
            ..rule
        };
        assert!(broken.evaluate(Some("anything")).is_err());
    }

    #[test]
    fn test_wait_duration() {
        let action = Action::new(ActionType::Wait).meta("value", "250");
        assert_eq!(
            Step::try_from(&action).unwrap(),
            Step::Wait {
                duration: Duration::from_millis(250)
            }
        );
        assert!(Step::try_from(&Action::new(ActionType::Wait).meta("value", -1)).is_err());
    }
}
