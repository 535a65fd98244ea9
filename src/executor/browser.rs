//! Browser actions.

use tracing::info;

use super::{ExecContext, ExecutorResult, StepOutcome, bounded};
use crate::action::DeviceProfile;

/// Apply viewport size and user agent of a device profile
pub async fn set_device(ctx: &mut ExecContext<'_>, device: &DeviceProfile) -> ExecutorResult<StepOutcome> {
    info!(index = ctx.index, device = %device.id, width = device.width, height = device.height, "setting device");
    bounded("set viewport", ctx.timeouts.action, ctx.driver.set_viewport(device)).await?;
    Ok(StepOutcome::passed(format!(
        "Device set to {} ({}x{})",
        device.name, device.width, device.height
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactDir;
    use crate::driver::{MockBrowser, MockPage};
    use crate::executor::Timeouts;

    #[tokio::test]
    async fn test_set_device_applies_viewport_and_agent() {
        let mut driver = MockBrowser::with_page(MockPage::new("about:blank"));
        let timeouts = Timeouts::default();
        let artifacts = ArtifactDir::in_dir(std::env::temp_dir().join("crusher-browser-unit"));
        let device = DeviceProfile::find("iPhone12").unwrap();
        {
            let mut ctx = ExecContext {
                driver: &mut driver,
                index: 0,
                timeouts: &timeouts,
                artifacts: &artifacts,
            };
            assert!(set_device(&mut ctx, &device).await.unwrap().is_passed());
        }
        assert_eq!(driver.viewport(), (device.width, device.height));
        assert_eq!(driver.user_agent(), device.user_agent.as_deref());
    }
}
