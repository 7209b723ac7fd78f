//! The touch driver instance.
//!
//! [`TouchDriver`] owns everything that belongs to one controller. All operations take `&self`, so the interrupt
//! loop, the power worker and the status logger can run concurrently on a shared reference. Shared state sits
//! behind three mutexes which are always taken in the same order:
//!
//! 1. lifecycle: the power state, the identified chip and the platform hooks
//! 2. report: the [`TouchState`] and the [`EventSink`]
//! 3. bus: the [`RegisterTransport`]
//!
//! A dispatch cycle holds the lifecycle lock from start to end, so suspend and resume never overlap a frame.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use embedded_hal_async::digital::Wait;
use futures::{FutureExt, select_biased};

use crate::RawMutex;
use crate::config::TouchConfig;
use crate::decoder::FrameDecoder;
use crate::error::{DecodeError, Error};
use crate::event::{PenSample, ReportEvent};
use crate::ic::{IcInfo, identify};
use crate::irq::IrqGate;
use crate::platform::Platform;
use crate::power::PowerRequest;
use crate::sink::EventSink;
use crate::tracker::{TouchState, Tracker};
use crate::transport::{RegisterTransport, ResetLine};
use crate::validity::wait_until_valid;

/// Largest frame read per interrupt, touch records plus gesture payload.
pub const MAX_FRAME_LEN: usize = 256;

/// Open counter wraps here
const OPEN_COUNT_WRAP: u16 = 0xfff0;

/// Power state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LifecycleState {
    Active,
    Suspended,
    /// Display is off, the controller keeps sensing for a wake gesture
    GestureArmed,
    FirmwareUpgrading,
}

/// Step of the dispatch cycle currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum DispatchPhase {
    Idle = 0,
    Reading = 1,
    Decoding = 2,
    Tracking = 3,
    Reporting = 4,
}

impl DispatchPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DispatchPhase::Reading,
            2 => DispatchPhase::Decoding,
            3 => DispatchPhase::Tracking,
            4 => DispatchPhase::Reporting,
            _ => DispatchPhase::Idle,
        }
    }
}

/// Result of one dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchOutcome {
    /// Frame tracked and reported, with the number of events
    Reported(usize),
    /// The gesture collaborator consumed the frame
    Gesture,
    Pen,
    /// Device error sentinel, fingers released and recovery requested
    Recovered,
    /// Frame was malformed and dropped
    Dropped(DecodeError),
    /// Not probed, irq disabled or not in an active state
    Skipped,
    /// The bus did not come back from system suspend in time
    BusAsleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
    pub module_id: u8,
    pub version: u8,
}

/// Periodic status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    pub state: LifecycleState,
    pub touch_count: u32,
    pub gesture_wake: bool,
    pub firmware: Option<FirmwareVersion>,
    /// Status lines logged since resume
    pub open_count: u16,
    /// Status lines logged without a finger on the panel
    pub release_count: u16,
    pub decode_errors: u8,
}

pub(crate) struct Lifecycle<R, P> {
    pub(crate) state: LifecycleState,
    pub(crate) ic: Option<IcInfo>,
    pub(crate) firmware: Option<FirmwareVersion>,
    pub(crate) reset: R,
    pub(crate) platform: P,
    pub(crate) gesture_wake: bool,
    pub(crate) always_on_display: bool,
    pub(crate) decode_errors: u8,
    pub(crate) open_count: u16,
    pub(crate) release_count: u16,
}

struct ReportPath<S> {
    state: TouchState,
    sink: S,
}

/// Driver instance of one touch controller.
pub struct TouchDriver<T, R, P, S> {
    pub(crate) config: TouchConfig,
    decoder: FrameDecoder,
    tracker: Tracker,
    pub(crate) bus: Mutex<RawMutex, T>,
    report: Mutex<RawMutex, ReportPath<S>>,
    pub(crate) lifecycle: Mutex<RawMutex, Lifecycle<R, P>>,
    pub(crate) irq: IrqGate,
    pub(crate) pm_suspended: AtomicBool,
    pub(crate) pm_resumed: Signal<RawMutex, ()>,
    pub(crate) prox_power_off: AtomicBool,
    pub(crate) power_requests: Signal<RawMutex, PowerRequest>,
    phase: AtomicU8,
}

impl<T, R, P, S> TouchDriver<T, R, P, S>
where
    T: RegisterTransport,
    R: ResetLine,
    P: Platform,
    S: EventSink,
{
    pub fn new(transport: T, reset: R, platform: P, sink: S, config: TouchConfig) -> Self {
        if config.read_len() > MAX_FRAME_LEN {
            warn!(
                "Touch frame of {} bytes exceeds {}, it will be truncated",
                config.read_len(),
                MAX_FRAME_LEN
            );
        }
        Self {
            decoder: FrameDecoder::new(config.layout, config.event_codes, config.is_incell),
            tracker: Tracker::new(&config),
            bus: Mutex::new(transport),
            report: Mutex::new(ReportPath {
                state: TouchState::new(),
                sink,
            }),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Suspended,
                ic: None,
                firmware: None,
                reset,
                platform,
                gesture_wake: false,
                always_on_display: false,
                decode_errors: 0,
                open_count: 0,
                release_count: 0,
            }),
            irq: IrqGate::new(),
            pm_suspended: AtomicBool::new(false),
            pm_resumed: Signal::new(),
            prox_power_off: AtomicBool::new(false),
            power_requests: Signal::new(),
            phase: AtomicU8::new(DispatchPhase::Idle as u8),
            config,
        }
    }

    pub fn config(&self) -> &TouchConfig {
        &self.config
    }

    /// Bus shared with collaborators such as firmware upgrade or factory tests.
    pub fn transport(&self) -> &Mutex<RawMutex, T> {
        &self.bus
    }

    pub fn irq(&self) -> &IrqGate {
        &self.irq
    }

    pub fn phase(&self) -> DispatchPhase {
        DispatchPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: DispatchPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.lock().await.state
    }

    pub async fn ic_info(&self) -> Option<IcInfo> {
        self.lifecycle.lock().await.ic
    }

    /// Copy of the current touch state.
    pub async fn touch_state(&self) -> TouchState {
        self.report.lock().await.state.clone()
    }

    /// Identify the controller and start accepting frames.
    pub async fn probe(&self) -> Result<IcInfo, Error> {
        let mut lc = self.lifecycle.lock().await;
        self.irq.disable();

        let identified = {
            let mut bus = self.bus.lock().await;
            identify(&mut *bus, &mut lc.reset, &self.config).await
        };
        let info = match identified {
            Ok(info) => info,
            Err(e) => {
                // The gate stays closed, a later resume brings the controller back
                if lc.state != LifecycleState::Suspended {
                    self.release_all_fingers().await;
                    lc.state = LifecycleState::Suspended;
                }
                error!("Touch probe failed: {:?}", e);
                return Err(e);
            }
        };

        // Leave the boot rom
        lc.reset.pulse(self.config.reset_settle).await;
        lc.platform.restore_firmware().await;
        lc.firmware = self.read_firmware_version().await;
        lc.ic = Some(info);
        lc.state = LifecycleState::Active;
        self.irq.enable();
        info!("Touch probed, firmware: {:?}", lc.firmware);
        Ok(info)
    }

    async fn read_firmware_version(&self) -> Option<FirmwareVersion> {
        let mut bus = self.bus.lock().await;
        let version = bus.read_reg(self.config.fw_version_reg).await.ok()?;
        let module_id = bus.read_reg(self.config.module_id_reg).await.ok()?;
        Some(FirmwareVersion { module_id, version })
    }

    /// Run one read, decode, track and report cycle.
    pub async fn dispatch(&self) -> Result<DispatchOutcome, Error> {
        if !self.irq.is_enabled() {
            return Ok(DispatchOutcome::Skipped);
        }

        if self.pm_suspended.load(Ordering::Acquire)
            && with_timeout(self.config.pm_bus_timeout, self.wait_pm_resumed())
                .await
                .is_err()
        {
            warn!("Bus is still suspended, touch frame skipped");
            return Ok(DispatchOutcome::BusAsleep);
        }

        let mut lc = self.lifecycle.lock().await;
        let Some(ic) = lc.ic else {
            return Ok(DispatchOutcome::Skipped);
        };
        if !matches!(lc.state, LifecycleState::Active | LifecycleState::GestureArmed) {
            return Ok(DispatchOutcome::Skipped);
        }

        let outcome = self.dispatch_frame(&mut lc, &ic).await;
        self.set_phase(DispatchPhase::Idle);
        outcome
    }

    async fn wait_pm_resumed(&self) {
        while self.pm_suspended.load(Ordering::Acquire) {
            self.pm_resumed.wait().await;
        }
    }

    async fn dispatch_frame(&self, lc: &mut Lifecycle<R, P>, ic: &IcInfo) -> Result<DispatchOutcome, Error> {
        self.set_phase(DispatchPhase::Reading);
        let mut buf = [0xFFu8; MAX_FRAME_LEN];
        let raw = &mut buf[..self.config.read_len().min(MAX_FRAME_LEN)];

        let read = {
            let mut bus = self.bus.lock().await;
            bus.read_block(&[self.config.touch_data_cmd], raw).await
        };
        if let Err(e) = read {
            // The error marker in the first byte means the firmware crashed mid transfer
            if raw.first() == Some(&self.config.layout.error_marker) {
                self.recover_device_error(lc).await;
                return Ok(DispatchOutcome::Recovered);
            }
            error!("Touch data read failed: {:?}", e);
            return Err(e.into());
        }

        if self.decoder.is_device_error(raw) {
            self.recover_device_error(lc).await;
            return Ok(DispatchOutcome::Recovered);
        }

        if lc.state == LifecycleState::GestureArmed {
            let offset = self.config.layout.frame_len(self.config.slots()).min(raw.len());
            if lc.platform.try_parse_gesture(&raw[offset..]).await {
                info!("Gesture data handled");
                return Ok(DispatchOutcome::Gesture);
            }
        }

        if self.config.capabilities.pen && self.decoder.is_pen_frame(raw) {
            if let Some(pen) = self.decoder.decode_pen(raw) {
                debug!("[PEN] {:?}", pen);
                self.emit(&[ReportEvent::Pen(pen)]).await;
                return Ok(DispatchOutcome::Pen);
            }
        }

        self.set_phase(DispatchPhase::Decoding);
        let samples = match self.decoder.decode(raw, self.config.slots()) {
            Ok(samples) => samples,
            Err(DecodeError::DeviceError) => {
                self.recover_device_error(lc).await;
                return Ok(DispatchOutcome::Recovered);
            }
            Err(DecodeError::IncellBlank) => {
                debug!("Touch buffer is blank, recovering touch state");
                lc.decode_errors = 0;
                self.release_all_fingers().await;
                if let Err(e) = self.state_recovery(lc, ic).await {
                    error!("Touch state recovery failed: {:?}", e);
                }
                return Ok(DispatchOutcome::Dropped(DecodeError::IncellBlank));
            }
            Err(e) => {
                warn!("Touch frame dropped: {:?}", e);
                lc.decode_errors = lc.decode_errors.saturating_add(1);
                let limit = self.config.decode_error_limit;
                if limit > 0 && lc.decode_errors >= limit {
                    warn!("{} malformed touch frames in a row, recovering touch state", lc.decode_errors);
                    lc.decode_errors = 0;
                    self.release_all_fingers().await;
                    if let Err(e) = self.state_recovery(lc, ic).await {
                        error!("Touch state recovery failed: {:?}", e);
                    }
                }
                return Ok(DispatchOutcome::Dropped(e));
            }
        };
        lc.decode_errors = 0;

        self.set_phase(DispatchPhase::Tracking);
        let mut report = self.report.lock().await;
        let ReportPath { state, sink } = &mut *report;
        let events = self.tracker.apply_frame(&samples, state);
        self.set_phase(DispatchPhase::Reporting);
        sink.report_events(&events).await;
        Ok(DispatchOutcome::Reported(events.len()))
    }

    async fn emit(&self, events: &[ReportEvent]) {
        self.report.lock().await.sink.report_events(events).await;
    }

    async fn recover_device_error(&self, lc: &mut Lifecycle<R, P>) {
        warn!("Touch controller reported an error, releasing all fingers");
        self.release_all_fingers().await;
        lc.platform.request_firmware_recovery();
        lc.platform.mode_recovery().await;
        lc.decode_errors = 0;
    }

    /// Release every finger, key and pen, leaving an empty touch state.
    pub async fn release_all_fingers(&self) {
        let cancel = self.prox_power_off.load(Ordering::Acquire);
        let mut report = self.report.lock().await;
        let ReportPath { state, sink } = &mut *report;
        let mut events = self.tracker.release_all(state, cancel);
        if self.config.capabilities.pen && events.push(ReportEvent::Pen(PenSample::default())).is_err() {
            error!("No room to release the pen");
        }
        sink.report_events(&events).await;
    }

    /// Wait for valid firmware and re-apply the settings lost on reset.
    pub(crate) async fn state_recovery(&self, lc: &mut Lifecycle<R, P>, ic: &IcInfo) -> Result<(), Error> {
        {
            let mut bus = self.bus.lock().await;
            wait_until_valid(&mut *bus, ic, &self.config.validity).await?;
        }
        lc.platform.mode_recovery().await;
        if lc.state == LifecycleState::GestureArmed {
            lc.platform.gesture_suspend().await;
        }
        Ok(())
    }

    /// Hardware reset followed by touch state recovery.
    pub async fn reset_and_recover(&self) -> Result<(), Error> {
        let mut lc = self.lifecycle.lock().await;
        let ic = lc.ic.ok_or(Error::NotProbed)?;
        lc.reset.pulse(self.config.reset_settle).await;
        self.release_all_fingers().await;
        self.state_recovery(&mut lc, &ic).await
    }

    /// Dispatch a frame on every falling edge of the interrupt line while the irq gate is enabled.
    pub async fn run<INT: Wait>(&self, int_pin: &mut INT) -> ! {
        loop {
            self.irq.wait_enabled().await;

            let fired = select_biased! {
                r = int_pin.wait_for_falling_edge().fuse() => r.is_ok(),
                _ = self.irq.wait_changed().fuse() => continue,
            };
            if !fired {
                warn!("Waiting for the touch interrupt failed");
                Timer::after_millis(10).await;
                continue;
            }

            match self.dispatch().await {
                Ok(outcome) => trace!("Touch dispatch: {:?}", outcome),
                Err(e) => warn!("Touch dispatch failed: {:?}", e),
            }
        }
    }

    /// Log a status line and return it.
    pub async fn log_status(&self) -> StatusSnapshot {
        let mut lc = self.lifecycle.lock().await;
        self.log_status_locked(&mut lc).await
    }

    pub(crate) async fn log_status_locked(&self, lc: &mut Lifecycle<R, P>) -> StatusSnapshot {
        let touch_count = self.report.lock().await.state.touch_count();
        lc.open_count = lc.open_count.wrapping_add(1);
        if lc.open_count > OPEN_COUNT_WRAP {
            lc.open_count = 0;
        }
        if touch_count == 0 {
            lc.release_count = lc.release_count.wrapping_add(1);
        }

        let status = StatusSnapshot {
            state: lc.state,
            touch_count,
            gesture_wake: lc.gesture_wake,
            firmware: lc.firmware,
            open_count: lc.open_count,
            release_count: lc.release_count,
            decode_errors: lc.decode_errors,
        };
        info!(
            "tc:{} fw:{:?} gesture:{} state:{:?} // #{} {}",
            status.touch_count,
            status.firmware,
            status.gesture_wake,
            status.state,
            status.open_count,
            status.release_count
        );
        status
    }

    /// Log a status line every `period`.
    pub async fn run_status_logger(&self, period: Duration) -> ! {
        loop {
            Timer::after(period).await;
            self.log_status().await;
        }
    }
}
