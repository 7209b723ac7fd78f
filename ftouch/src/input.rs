//! Mapping of [`ReportEvent`]s onto evdev style input events.
//!
//! Both multitouch protocols are supported and selected at runtime: protocol B reports slotted contacts with
//! tracking ids, protocol A reports the anonymous list of contacts that are down, separated by mt-sync.

use crate::config::{Capabilities, MtProtocol};
use crate::event::{Contact, PenSample, ReportEvent};
use crate::sink::EventSink;

pub mod codes {
    pub const EV_SYN: u16 = 0x00;
    pub const EV_KEY: u16 = 0x01;
    pub const EV_ABS: u16 = 0x03;

    pub const SYN_REPORT: u16 = 0x00;
    pub const SYN_MT_REPORT: u16 = 0x02;

    pub const ABS_X: u16 = 0x00;
    pub const ABS_Y: u16 = 0x01;
    pub const ABS_PRESSURE: u16 = 0x18;
    pub const ABS_TILT_X: u16 = 0x1a;
    pub const ABS_TILT_Y: u16 = 0x1b;
    pub const ABS_MT_SLOT: u16 = 0x2f;
    pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
    pub const ABS_MT_TOUCH_MINOR: u16 = 0x31;
    pub const ABS_MT_POSITION_X: u16 = 0x35;
    pub const ABS_MT_POSITION_Y: u16 = 0x36;
    pub const ABS_MT_TRACKING_ID: u16 = 0x39;
    pub const ABS_MT_PRESSURE: u16 = 0x3a;

    pub const BTN_TOOL_PEN: u16 = 0x140;
    pub const BTN_TOUCH: u16 = 0x14a;
    pub const BTN_STYLUS: u16 = 0x14b;
    pub const BTN_STYLUS2: u16 = 0x14c;
}

use codes::*;

/// Pressure reported when the firmware does not provide one
const DEFAULT_PRESSURE: i32 = 0x3f;
/// Protocol A requires a non-zero touch area
const DEFAULT_MAJOR: i32 = 0x09;
const TRACKING_ID_MASK: u16 = 0xffff;

/// Input device an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputTarget {
    Touch,
    Pen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputEvent {
    pub target: InputTarget,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

/// Destination of input events, e.g. a uinput device or a channel to the host.
pub trait InputWriter {
    async fn write_event(&mut self, event: InputEvent);
}

/// Vendor specific key codes, unused when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtraKeys {
    /// Reported while any contact is flagged as palm
    pub palm: Option<u16>,
    /// Pulsed when touches are cancelled
    pub cancel: Option<u16>,
}

/// [`EventSink`] that writes evdev style events.
pub struct InputEventSink<W: InputWriter> {
    writer: W,
    capabilities: Capabilities,
    extra_keys: ExtraKeys,
    next_tracking_id: u16,
    down: u16,
    palm: u16,
}

impl<W: InputWriter> InputEventSink<W> {
    pub fn new(writer: W, capabilities: Capabilities, extra_keys: ExtraKeys) -> Self {
        Self {
            writer,
            capabilities,
            extra_keys,
            next_tracking_id: 0,
            down: 0,
            palm: 0,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    async fn emit(&mut self, target: InputTarget, kind: u16, code: u16, value: i32) {
        self.writer
            .write_event(InputEvent {
                target,
                kind,
                code,
                value,
            })
            .await;
    }

    async fn abs(&mut self, code: u16, value: i32) {
        self.emit(InputTarget::Touch, EV_ABS, code, value).await;
    }

    async fn key(&mut self, code: u16, down: bool) {
        self.emit(InputTarget::Touch, EV_KEY, code, down as i32).await;
    }

    async fn sync(&mut self, target: InputTarget) {
        self.emit(target, EV_SYN, SYN_REPORT, 0).await;
    }

    async fn report_palm(&mut self) {
        if let Some(code) = self.extra_keys.palm {
            self.key(code, self.palm != 0).await;
        }
    }

    async fn report_contact(&mut self, contact: &Contact, pressed: bool) {
        let bit = 1u16 << contact.slot;
        match self.capabilities.protocol {
            MtProtocol::B => {
                self.abs(ABS_MT_SLOT, contact.slot as i32).await;
                if pressed || self.down & bit == 0 {
                    let id = self.next_tracking_id;
                    self.next_tracking_id = self.next_tracking_id.wrapping_add(1) & TRACKING_ID_MASK;
                    self.abs(ABS_MT_TRACKING_ID, id as i32).await;
                }
                self.report_pressure(contact).await;
                self.abs(ABS_MT_TOUCH_MAJOR, contact.major as i32).await;
                self.abs(ABS_MT_TOUCH_MINOR, contact.minor as i32).await;
                self.abs(ABS_MT_POSITION_X, contact.x as i32).await;
                self.abs(ABS_MT_POSITION_Y, contact.y as i32).await;
                if contact.palm {
                    self.palm |= bit;
                } else {
                    self.palm &= !bit;
                }
                self.report_palm().await;
            }
            MtProtocol::A => {
                self.abs(ABS_MT_TRACKING_ID, contact.slot as i32).await;
                self.report_pressure(contact).await;
                let major = if contact.major == 0 {
                    DEFAULT_MAJOR
                } else {
                    contact.major as i32
                };
                self.abs(ABS_MT_TOUCH_MAJOR, major).await;
                self.abs(ABS_MT_POSITION_X, contact.x as i32).await;
                self.abs(ABS_MT_POSITION_Y, contact.y as i32).await;
                self.emit(InputTarget::Touch, EV_SYN, SYN_MT_REPORT, 0).await;
            }
        }
        self.down |= bit;
    }

    async fn report_pressure(&mut self, contact: &Contact) {
        if self.capabilities.pressure {
            let pressure = match contact.pressure {
                Some(p) if p > 0 => p as i32,
                _ => DEFAULT_PRESSURE,
            };
            self.abs(ABS_MT_PRESSURE, pressure).await;
        }
    }

    async fn report_release(&mut self, slot: u8) {
        let bit = 1u16 << slot;
        if self.capabilities.protocol == MtProtocol::B {
            self.abs(ABS_MT_SLOT, slot as i32).await;
            self.abs(ABS_MT_TRACKING_ID, -1).await;
            self.palm &= !bit;
            self.report_palm().await;
        }
        self.down &= !bit;
    }

    async fn report_pen(&mut self, pen: &PenSample) {
        let t = InputTarget::Pen;
        self.emit(t, EV_KEY, BTN_STYLUS, pen.button1 as i32).await;
        self.emit(t, EV_KEY, BTN_STYLUS2, pen.button2 as i32).await;
        self.emit(t, EV_ABS, ABS_X, pen.x as i32).await;
        self.emit(t, EV_ABS, ABS_Y, pen.y as i32).await;
        self.emit(t, EV_ABS, ABS_PRESSURE, pen.pressure as i32).await;
        if pen.tilt_x != 0 || pen.tilt_y != 0 {
            self.emit(t, EV_ABS, ABS_TILT_X, pen.tilt_x as i32).await;
            self.emit(t, EV_ABS, ABS_TILT_Y, pen.tilt_y as i32).await;
        }
        self.emit(t, EV_KEY, BTN_TOUCH, pen.tip as i32).await;
        self.emit(t, EV_KEY, BTN_TOOL_PEN, pen.in_range as i32).await;
        self.sync(t).await;
    }
}

impl<W: InputWriter> EventSink for InputEventSink<W> {
    async fn report_events(&mut self, events: &[ReportEvent]) {
        let mut touch_reported = false;
        let mut all_up = false;
        for event in events {
            match event {
                ReportEvent::Press(contact) => {
                    touch_reported = true;
                    self.report_contact(contact, true).await;
                }
                ReportEvent::Move(contact) => {
                    touch_reported = true;
                    self.report_contact(contact, false).await;
                }
                ReportEvent::Release { slot, .. } => {
                    touch_reported = true;
                    self.report_release(*slot).await;
                }
                ReportEvent::Key { code, down, .. } => {
                    touch_reported = true;
                    self.key(*code, *down).await;
                }
                ReportEvent::AllUp => {
                    touch_reported = true;
                    all_up = true;
                    self.down = 0;
                    self.key(BTN_TOUCH, false).await;
                    if self.extra_keys.palm.is_some() && self.palm != 0 {
                        self.palm = 0;
                        self.report_palm().await;
                    }
                    if self.capabilities.protocol == MtProtocol::A {
                        self.emit(InputTarget::Touch, EV_SYN, SYN_MT_REPORT, 0).await;
                    }
                }
                ReportEvent::Cancel => {
                    if let Some(code) = self.extra_keys.cancel {
                        self.key(code, true).await;
                        self.sync(InputTarget::Touch).await;
                        self.key(code, false).await;
                        self.sync(InputTarget::Touch).await;
                    }
                }
                ReportEvent::Pen(pen) => self.report_pen(pen).await,
            }
        }

        if touch_reported {
            if !all_up && self.down != 0 {
                self.key(BTN_TOUCH, true).await;
            }
            self.sync(InputTarget::Touch).await;
        }
    }
}
