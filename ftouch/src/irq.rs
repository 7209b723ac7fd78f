//! Interrupt dispatch gate.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::signal::Signal;

use crate::RawMutex;

/// Enables and disables frame dispatch, enabling or disabling twice is harmless.
pub struct IrqGate {
    enabled: AtomicBool,
    changed: Signal<RawMutex, bool>,
}

impl Default for IrqGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGate {
    /// A new gate starts disabled.
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            changed: Signal::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::AcqRel) {
            debug!("Touch irq enabled");
            self.changed.signal(true);
        }
    }

    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            debug!("Touch irq disabled");
            self.changed.signal(false);
        }
    }

    /// Resolve once the gate is enabled.
    pub async fn wait_enabled(&self) {
        while !self.is_enabled() {
            self.changed.wait().await;
        }
    }

    /// Resolve on the next state change.
    pub async fn wait_changed(&self) -> bool {
        self.changed.wait().await
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embassy_futures::select::{Either, select};

    use super::*;

    #[test]
    fn test_enable_disable_is_idempotent() {
        let gate = IrqGate::new();
        assert!(!gate.is_enabled());

        gate.enable();
        gate.enable();
        assert!(gate.is_enabled());
        assert_eq!(block_on(gate.wait_changed()), true);

        gate.disable();
        gate.disable();
        assert!(!gate.is_enabled());
        assert_eq!(block_on(gate.wait_changed()), false);
    }

    #[test]
    fn test_wait_enabled() {
        let gate = IrqGate::new();
        let result = block_on(select(gate.wait_enabled(), async { gate.enable() }));
        assert!(matches!(result, Either::First(()) | Either::Second(())));
        assert!(gate.is_enabled());
        // Already enabled resolves immediately
        block_on(gate.wait_enabled());
    }
}
