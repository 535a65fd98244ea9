//! Element actions: everything that needs a located element first.

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ExecContext, ExecutorError, ExecutorResult, StepOutcome, bounded};
use crate::action::{AssertionRule, KeyDirection, ScrollOffset};
use crate::driver::{ElementHandle, Framebuffer};

/// Find the first candidate selector that resolves, polling until the
/// element timeout. Candidates are tried in order on every poll.
pub async fn locate(ctx: &mut ExecContext<'_>, selectors: &[String]) -> ExecutorResult<ElementHandle> {
    let started = Instant::now();
    let deadline = started + ctx.timeouts.element;

    loop {
        for selector in selectors {
            let found = bounded(
                "find element",
                ctx.timeouts.action,
                ctx.driver.find_element(selector),
            )
            .await?;
            if let Some(handle) = found {
                debug!(index = ctx.index, selector = %selector, "element located");
                return Ok(handle);
            }
        }

        if Instant::now() + ctx.timeouts.poll_interval > deadline {
            return Err(ExecutorError::ElementNotFound {
                selectors: selectors.to_vec(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        tokio::time::sleep(ctx.timeouts.poll_interval).await;
    }
}

pub async fn click(ctx: &mut ExecContext<'_>, selectors: &[String]) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    bounded("click", ctx.timeouts.action, ctx.driver.click(&element)).await?;
    Ok(StepOutcome::passed(format!("Clicked {}", selectors[0])))
}

pub async fn hover(ctx: &mut ExecContext<'_>, selectors: &[String]) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    bounded("hover", ctx.timeouts.action, ctx.driver.hover(&element)).await?;
    Ok(StepOutcome::passed(format!("Hovered {}", selectors[0])))
}

pub async fn key(
    ctx: &mut ExecContext<'_>,
    selectors: &[String],
    key: &str,
    direction: KeyDirection,
) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    bounded("key event", ctx.timeouts.action, ctx.driver.key(&element, key, direction)).await?;
    let verb = match direction {
        KeyDirection::Down => "Pressed",
        KeyDirection::Up => "Released",
    };
    Ok(StepOutcome::passed(format!("{} {} on {}", verb, key, selectors[0])))
}

/// Replace the element's value; running it twice leaves the same value
pub async fn input(ctx: &mut ExecContext<'_>, selectors: &[String], value: &str) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    bounded("clear", ctx.timeouts.action, ctx.driver.clear(&element)).await?;
    bounded("type", ctx.timeouts.action, ctx.driver.type_text(&element, value)).await?;
    Ok(StepOutcome::passed(format!("Typed {} characters into {}", value.chars().count(), selectors[0])))
}

pub async fn screenshot(
    ctx: &mut ExecContext<'_>,
    selectors: &[String],
    name: Option<&str>,
) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    let rect = bounded("element rect", ctx.timeouts.action, ctx.driver.element_rect(&element)).await?;
    let (viewport_width, _) = bounded("viewport size", ctx.timeouts.action, ctx.driver.viewport_size()).await?;
    let png = bounded("capture", ctx.timeouts.action, ctx.driver.capture_page()).await?;

    let page = Framebuffer::from_png_bytes(&png)?;
    let Some(cropped) = page.crop(&rect.scaled(capture_scale(page.width(), viewport_width))) else {
        return Ok(StepOutcome::failed(format!(
            "{} is outside the viewport ({}x{} at {},{})",
            selectors[0], rect.width, rect.height, rect.x, rect.y
        )));
    };

    let path = ctx.artifacts.step_capture_path(ctx.index, "ELEMENT_SCREENSHOT", name);
    ctx.artifacts.save(&path, &cropped.to_png()?)?;
    Ok(StepOutcome::with_artifact(
        format!("Captured {} ({}x{})", selectors[0], cropped.width(), cropped.height()),
        path,
    ))
}

/// Device pixels per CSS pixel of a capture
fn capture_scale(capture_width: u32, viewport_width: u32) -> f64 {
    if viewport_width == 0 || capture_width == 0 {
        return 1.0;
    }
    f64::from(capture_width) / f64::from(viewport_width)
}

pub async fn scroll(
    ctx: &mut ExecContext<'_>,
    selectors: &[String],
    offset: ScrollOffset,
) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;
    bounded("scroll", ctx.timeouts.action, ctx.driver.scroll_element(&element, offset)).await?;
    Ok(StepOutcome::passed(format!("Scrolled {} to {},{}", selectors[0], offset.x, offset.y)))
}

/// Check every rule; the first mismatch fails the step
pub async fn assert(
    ctx: &mut ExecContext<'_>,
    selectors: &[String],
    rules: &[AssertionRule],
) -> ExecutorResult<StepOutcome> {
    let element = locate(ctx, selectors).await?;

    for rule in rules {
        let actual = bounded(
            "read property",
            ctx.timeouts.action,
            ctx.driver.read_property(&element, &rule.field),
        )
        .await?;

        match rule.evaluate(actual.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                return Ok(StepOutcome::failed(format!(
                    "{} of {}: expected {:?} {:?}, got {:?}",
                    rule.field, selectors[0], rule.operation, rule.value, actual
                )));
            }
            Err(reason) => {
                warn!(index = ctx.index, %reason, "assertion could not be evaluated");
                return Ok(StepOutcome::failed(reason));
            }
        }
    }

    Ok(StepOutcome::passed(format!("{} validation(s) passed on {}", rules.len(), selectors[0])))
}
