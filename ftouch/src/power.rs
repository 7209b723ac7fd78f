//! Suspend, resume and the other lifecycle transitions of [`TouchDriver`].
//!
//! Every transition runs under the lifecycle lock and releases all fingers, so no contact survives a power state
//! change.

use core::sync::atomic::Ordering;

use crate::driver::{LifecycleState, TouchDriver};
use crate::error::Error;
use crate::platform::Platform;
use crate::sink::EventSink;
use crate::transport::{RegisterTransport, ResetLine};
use crate::validity::wait_until_valid;

/// Deferred display state change, handled by [`TouchDriver::run_power_worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerRequest {
    Suspend,
    Resume,
}

impl<T, R, P, S> TouchDriver<T, R, P, S>
where
    T: RegisterTransport,
    R: ResetLine,
    P: Platform,
    S: EventSink,
{
    /// Put the controller to sleep, or arm wake gestures when gesture wake is enabled.
    ///
    /// Suspending twice, or during a firmware upgrade, does nothing.
    pub async fn suspend(&self) {
        let mut lc = self.lifecycle.lock().await;
        match lc.state {
            LifecycleState::Suspended | LifecycleState::GestureArmed => {
                info!("Touch already suspended");
                return;
            }
            LifecycleState::FirmwareUpgrading => {
                info!("Firmware upgrade in progress, suspend skipped");
                return;
            }
            LifecycleState::Active => {}
        }

        if self.prox_power_off.load(Ordering::Acquire) && lc.always_on_display {
            info!("Display covered, wake gesture disabled");
            lc.gesture_wake = false;
        }

        let next = if lc.gesture_wake {
            lc.platform.gesture_suspend().await;
            LifecycleState::GestureArmed
        } else {
            let sleep = {
                let mut bus = self.bus.lock().await;
                bus.write_reg(self.config.power_mode_reg, self.config.power_mode_sleep)
                    .await
            };
            if let Err(e) = sleep {
                error!("Failed to enter sleep mode: {:?}", e);
            }
            self.irq.disable();
            lc.reset.hold();
            if !self.config.is_incell {
                lc.platform.power_suspend().await;
            }
            LifecycleState::Suspended
        };

        self.release_all_fingers().await;
        lc.state = next;
        info!("Touch suspended: {:?}", next);
        self.log_status_locked(&mut lc).await;
    }

    /// Bring the controller back and wait until its firmware answers.
    ///
    /// Fails with [`Error::Timeout`] when the chip id never becomes valid, the lifecycle state is left unchanged
    /// in that case. Resuming an active controller, or during a firmware upgrade, does nothing.
    pub async fn resume(&self) -> Result<(), Error> {
        let mut lc = self.lifecycle.lock().await;
        let from = lc.state;
        match from {
            LifecycleState::Active => {
                debug!("Touch already resumed");
                return Ok(());
            }
            LifecycleState::FirmwareUpgrading => {
                info!("Firmware upgrade in progress, resume skipped");
                return Ok(());
            }
            LifecycleState::Suspended | LifecycleState::GestureArmed => {}
        }
        let ic = lc.ic.ok_or(Error::NotProbed)?;

        self.release_all_fingers().await;

        if from == LifecycleState::Suspended {
            if !self.config.is_incell {
                lc.platform.power_resume().await;
            }
            lc.reset.pulse(self.config.reset_settle).await;
            lc.platform.restore_firmware().await;
        }

        {
            let mut bus = self.bus.lock().await;
            if let Err(e) = wait_until_valid(&mut *bus, &ic, &self.config.validity).await {
                error!("Touch resume failed: {:?}", e);
                return Err(e);
            }
        }

        lc.platform.mode_recovery().await;
        if from == LifecycleState::GestureArmed {
            lc.platform.gesture_resume().await;
        }
        if lc.always_on_display {
            lc.gesture_wake = true;
        }
        self.prox_power_off.store(false, Ordering::Release);
        lc.decode_errors = 0;
        lc.open_count = 0;
        lc.release_count = 0;
        lc.state = LifecycleState::Active;
        self.irq.enable();
        info!("Touch resumed from {:?}", from);
        Ok(())
    }

    /// Display blank notification: blanking suspends, unblanking resumes.
    pub async fn on_display_blank(&self, blank: bool) -> Result<(), Error> {
        if blank {
            self.suspend().await;
            Ok(())
        } else {
            self.resume().await
        }
    }

    /// Queue a display state change for [`run_power_worker`](Self::run_power_worker).
    ///
    /// A request that has not been handled yet is replaced, so a suspend cancels a pending resume.
    pub fn request_display_state(&self, blank: bool) {
        let request = if blank {
            PowerRequest::Suspend
        } else {
            PowerRequest::Resume
        };
        self.power_requests.signal(request);
    }

    /// Handle queued display state changes forever.
    pub async fn run_power_worker(&self) -> ! {
        loop {
            match self.power_requests.wait().await {
                PowerRequest::Suspend => self.suspend().await,
                PowerRequest::Resume => {
                    if let Err(e) = self.resume().await {
                        error!("Deferred resume failed: {:?}", e);
                    }
                }
            }
        }
    }

    /// Stop dispatching frames while new firmware is written.
    ///
    /// Only an active controller can be upgraded, returns whether the upgrade may start.
    pub async fn begin_firmware_upgrade(&self) -> bool {
        let mut lc = self.lifecycle.lock().await;
        if lc.state != LifecycleState::Active {
            warn!("Firmware upgrade refused in {:?}", lc.state);
            return false;
        }
        self.irq.disable();
        self.release_all_fingers().await;
        lc.state = LifecycleState::FirmwareUpgrading;
        info!("Firmware upgrade started");
        true
    }

    /// Wait for the new firmware and resume dispatching.
    ///
    /// On [`Error::Timeout`] the controller stays in [`LifecycleState::FirmwareUpgrading`].
    pub async fn finish_firmware_upgrade(&self) -> Result<(), Error> {
        let mut lc = self.lifecycle.lock().await;
        if lc.state != LifecycleState::FirmwareUpgrading {
            return Ok(());
        }
        let ic = lc.ic.ok_or(Error::NotProbed)?;
        {
            let mut bus = self.bus.lock().await;
            wait_until_valid(&mut *bus, &ic, &self.config.validity).await?;
        }
        lc.platform.mode_recovery().await;
        lc.state = LifecycleState::Active;
        self.irq.enable();
        info!("Firmware upgrade finished");
        Ok(())
    }

    /// The bus goes down with the system, frames wait for [`pm_resume`](Self::pm_resume).
    pub fn pm_suspend(&self) {
        self.pm_resumed.reset();
        self.pm_suspended.store(true, Ordering::Release);
    }

    pub fn pm_resume(&self) {
        self.pm_suspended.store(false, Ordering::Release);
        self.pm_resumed.signal(());
    }

    /// Arm wake gestures on the next suspend.
    pub async fn set_gesture_wake(&self, enable: bool) {
        self.lifecycle.lock().await.gesture_wake = enable;
    }

    pub async fn gesture_wake(&self) -> bool {
        self.lifecycle.lock().await.gesture_wake
    }

    /// Always-on display keeps gesture wake armed across resumes.
    pub async fn set_always_on_display(&self, enable: bool) {
        self.lifecycle.lock().await.always_on_display = enable;
    }

    /// The panel is covered and the display turned off by the proximity sensor.
    pub fn set_prox_power_off(&self, covered: bool) {
        self.prox_power_off.store(covered, Ordering::Release);
    }
}
