//! Decoded samples and the normalized events handed to the sink.

use heapless::Vec;

use crate::config::{MAX_KEYS, MAX_SLOTS, PanelGeometry};

/// Capacity of an [`EventBatch`]: one event per record, one stale release per slot, held keys,
/// plus the cancel key and the final all-up.
pub const EVENT_BATCH_CAPACITY: usize = 2 * MAX_SLOTS + MAX_KEYS + 2;

/// Events produced by one dispatch cycle.
pub type EventBatch = Vec<ReportEvent, EVENT_BATCH_CAPACITY>;

/// Contact phase of a touch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    /// First frame of a contact
    Down,
    /// Contact continues
    Move,
    /// Contact lifted
    Up,
}

impl EventKind {
    /// Down and Move both mean the finger is on the panel
    pub fn is_down(self) -> bool {
        matches!(self, EventKind::Down | EventKind::Move)
    }
}

/// One finger as decoded from a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TouchSample {
    pub slot: u8,
    pub x: u16,
    pub y: u16,
    pub major: u8,
    pub minor: u8,
    pub pressure: Option<u8>,
    pub kind: EventKind,
    pub palm: bool,
}

/// Position data of a contact that is on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Contact {
    pub slot: u8,
    pub x: u16,
    pub y: u16,
    pub major: u8,
    pub minor: u8,
    pub pressure: Option<u8>,
    pub palm: bool,
}

impl From<&TouchSample> for Contact {
    fn from(s: &TouchSample) -> Self {
        Self {
            slot: s.slot,
            x: s.x,
            y: s.y,
            major: s.major,
            minor: s.minor,
            pressure: s.pressure,
            palm: s.palm,
        }
    }
}

/// Stylus frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PenSample {
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    pub tilt_x: u16,
    pub tilt_y: u16,
    /// Tip touches the panel
    pub tip: bool,
    /// Pen hovers within sensing range
    pub in_range: bool,
    pub button1: bool,
    pub button2: bool,
}

/// Normalized event delivered to an [`EventSink`](crate::sink::EventSink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportEvent {
    /// A slot went down
    Press(Contact),
    /// A down slot reported again
    Move(Contact),
    /// A slot was lifted, with the travel since its press
    Release { slot: u8, dx: i32, dy: i32, moves: u16 },
    /// Virtual key edge
    Key { index: u8, code: u16, down: bool },
    /// No contact remains on the panel
    AllUp,
    /// Touches are cancelled because the panel was covered
    Cancel,
    Pen(PenSample),
}

/// Horizontal part of a [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HorizontalArea {
    LeftEdge,
    Center,
    RightEdge,
}

/// Vertical part of a [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VerticalArea {
    StatusBar,
    Center,
    NavigationBar,
}

/// Coarse screen area of a coordinate, only used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub horizontal: HorizontalArea,
    pub vertical: VerticalArea,
}

impl Location {
    pub fn detect(panel: &PanelGeometry, x: u16, y: u16) -> Self {
        let horizontal = if x < panel.area_edge {
            HorizontalArea::LeftEdge
        } else if x < panel.x_max.saturating_sub(panel.area_edge) {
            HorizontalArea::Center
        } else {
            HorizontalArea::RightEdge
        };
        let vertical = if y < panel.area_indicator {
            VerticalArea::StatusBar
        } else if y < panel.y_max.saturating_sub(panel.area_navigation) {
            VerticalArea::Center
        } else {
            VerticalArea::NavigationBar
        };
        Self { horizontal, vertical }
    }
}
