//! Collaborators the touch core calls into but does not implement.

/// Board and firmware hooks.
///
/// Every method has a no-op default, an integration only overrides what its controller supports.
pub trait Platform {
    /// The controller reported its error sentinel, the firmware may need to be recovered.
    fn request_firmware_recovery(&mut self) {}

    /// Re-apply settings lost on reset, such as glove, cover, charger and grip modes.
    async fn mode_recovery(&mut self) {}

    /// Parse gesture data, returns `true` when the buffer held a gesture that was handled.
    async fn try_parse_gesture(&mut self, _data: &[u8]) -> bool {
        false
    }

    /// Arm wake gesture detection before the panel goes dark.
    async fn gesture_suspend(&mut self) {}

    /// Leave gesture detection mode.
    async fn gesture_resume(&mut self) {}

    /// Cut the touch supplies.
    async fn power_suspend(&mut self) {}

    /// Restore the touch supplies.
    async fn power_resume(&mut self) {}

    /// Reload the firmware after a power cycle, needed by controllers without flash.
    async fn restore_firmware(&mut self) {}
}

/// Platform without any hooks.
pub struct NoopPlatform;

impl Platform for NoopPlatform {}
