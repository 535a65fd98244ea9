//! Page actions.

use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::{ExecContext, ExecutorResult, StepOutcome, bounded};
use crate::action::ScrollOffset;

pub async fn screenshot(ctx: &mut ExecContext<'_>, name: Option<&str>) -> ExecutorResult<StepOutcome> {
    let png = bounded("capture", ctx.timeouts.action, ctx.driver.capture_page()).await?;
    let path = ctx.artifacts.step_capture_path(ctx.index, "PAGE_SCREENSHOT", name);
    ctx.artifacts.save(&path, &png)?;
    Ok(StepOutcome::with_artifact("Captured page", path))
}

pub async fn scroll(ctx: &mut ExecContext<'_>, offset: ScrollOffset) -> ExecutorResult<StepOutcome> {
    bounded("scroll", ctx.timeouts.action, ctx.driver.scroll_page(offset)).await?;
    Ok(StepOutcome::passed(format!("Scrolled page to {},{}", offset.x, offset.y)))
}

pub async fn navigate(ctx: &mut ExecContext<'_>, url: &str) -> ExecutorResult<StepOutcome> {
    info!(index = ctx.index, url, "navigating");
    bounded("navigation", ctx.timeouts.navigation, ctx.driver.navigate(url)).await?;
    Ok(StepOutcome::passed(format!("Navigated to {}", url)))
}

pub async fn wait(duration: Duration) -> ExecutorResult<StepOutcome> {
    tokio::time::sleep(duration).await;
    Ok(StepOutcome::passed(format!("Waited {}ms", duration.as_millis())))
}

/// Run user code in the page. Recorded snippets define a `validate`
/// function; its result decides the step. Plain snippets are judged by
/// their own return value.
pub async fn custom_code(ctx: &mut ExecContext<'_>, script: &str) -> ExecutorResult<StepOutcome> {
    let wrapped = if script.contains("function validate") {
        format!("{}\nreturn await validate();", script)
    } else {
        script.to_string()
    };

    let result = bounded("custom code", ctx.timeouts.action, ctx.driver.evaluate(&wrapped)).await?;
    if let Some(error) = result.get("__error").and_then(Value::as_str) {
        return Ok(StepOutcome::failed(format!("custom code threw: {}", error)));
    }
    if is_truthy(&result) {
        Ok(StepOutcome::passed("Custom code passed"))
    } else {
        Ok(StepOutcome::failed(format!("custom code returned {}", result)))
    }
}

/// Loose truthiness, the way page scripts judge it
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactDir;
    use crate::driver::{DriverEvent, MockBrowser, MockPage};
    use crate::executor::{ExecutorError, Timeouts};
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!({})));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[tokio::test]
    async fn test_custom_code_wraps_validate() {
        let page = MockPage::new("https://a.test/").script("return await validate()", json!(false));
        let mut driver = MockBrowser::with_page(page);
        let timeouts = Timeouts::default();
        let artifacts = ArtifactDir::in_dir(std::env::temp_dir().join("crusher-page-unit"));
        let mut ctx = ExecContext {
            driver: &mut driver,
            index: 0,
            timeouts: &timeouts,
            artifacts: &artifacts,
        };
        let outcome = custom_code(&mut ctx, "async function validate() { return false; }")
            .await
            .unwrap();
        assert!(!outcome.is_passed());
        assert!(matches!(driver.events().last(), Some(DriverEvent::Evaluate(s)) if s.ends_with("return await validate();")));
    }

    #[tokio::test]
    async fn test_navigation_timeout() {
        let mut driver = MockBrowser::with_page(MockPage::new("https://slow.test/"))
            .navigation_delay(Duration::from_millis(200));
        let timeouts = Timeouts {
            navigation: Duration::from_millis(20),
            ..Timeouts::default()
        };
        let artifacts = ArtifactDir::in_dir(std::env::temp_dir().join("crusher-page-unit"));
        let mut ctx = ExecContext {
            driver: &mut driver,
            index: 0,
            timeouts: &timeouts,
            artifacts: &artifacts,
        };
        let err = navigate(&mut ctx, "https://slow.test/").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
    }
}
