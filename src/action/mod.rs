pub mod device;
pub mod step;
pub mod types;

pub use device::DeviceProfile;
pub use step::{AssertOperation, AssertionRule, KeyDirection, ScrollOffset, Step};
pub use types::{
    Action, ActionError, ActionPayload, ActionResult, ActionType, SelectorInfo, Test, TestId,
    get_browser_actions, get_main_actions, is_browser_action, is_main_action,
};
