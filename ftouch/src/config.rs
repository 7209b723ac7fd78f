//! Runtime configuration of the touch core.
//!
//! Everything that differs between chip variants and board integrations lives here: the raw frame layout,
//! virtual keys, reporting capabilities and the timings used around resets.

use embassy_time::Duration;
use heapless::Vec;

use crate::ic::{ChipIdMap, ChipType};

/// Hard upper bound of tracked contacts, the width of the occupancy bitsets.
pub const MAX_SLOTS: usize = 10;

/// Maximum number of virtual keys.
pub const MAX_KEYS: usize = 4;

/// Byte layout of a raw touch frame, offsets are relative to the first byte returned by the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameLayout {
    /// Bytes before the first touch record
    pub header_len: usize,
    /// Size of one touch record
    pub record_len: usize,
    /// Position of the point count byte
    pub point_num_pos: usize,
    pub point_num_mask: u8,
    /// Position of the first of three error marker bytes
    pub error_marker_pos: usize,
    pub error_marker: u8,
    // Offsets inside a record
    pub event_pos: usize,
    pub event_shift: u8,
    pub palm_bit: u8,
    pub x_high_pos: usize,
    pub x_low_pos: usize,
    pub y_high_pos: usize,
    pub y_low_pos: usize,
    pub id_pos: usize,
    pub id_shift: u8,
    pub major_pos: usize,
    pub minor_pos: usize,
    /// Some firmware reports pressure in a dedicated byte
    pub pressure_pos: Option<usize>,
    /// Tracking ids at or above this value terminate the record scan
    pub max_valid_id: u8,
    /// Pen frames are recognized by `raw[pen_marker_pos] & pen_marker_mask == pen_marker`
    pub pen_marker_pos: usize,
    pub pen_marker_mask: u8,
    pub pen_marker: u8,
}

impl FrameLayout {
    /// Length of a frame carrying `slots` records.
    pub const fn frame_len(&self, slots: usize) -> usize {
        self.header_len + self.record_len * slots
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            header_len: 2,
            record_len: 6,
            point_num_pos: 1,
            point_num_mask: 0x0F,
            error_marker_pos: 1,
            error_marker: 0xEF,
            event_pos: 0,
            event_shift: 6,
            palm_bit: 4,
            x_high_pos: 0,
            x_low_pos: 1,
            y_high_pos: 2,
            y_low_pos: 3,
            id_pos: 2,
            id_shift: 4,
            major_pos: 5,
            minor_pos: 4,
            pressure_pos: None,
            max_valid_id: 0x0A,
            pen_marker_pos: 1,
            pen_marker_mask: 0xF0,
            pen_marker: 0xB0,
        }
    }
}

/// Values of the two event bits of a touch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventCodes {
    pub down: u8,
    pub up: u8,
    pub contact: u8,
}

impl Default for EventCodes {
    fn default() -> Self {
        Self {
            down: 0b00,
            up: 0b01,
            contact: 0b10,
        }
    }
}

/// A virtual key drawn outside the active area, identified by its center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VirtualKey {
    pub x: u16,
    pub y: u16,
    /// Key code forwarded to the input layer
    pub code: u16,
}

/// Panel size and the border areas used to describe where a contact happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelGeometry {
    pub x_max: u16,
    pub y_max: u16,
    /// Width of the left and right edge areas
    pub area_edge: u16,
    /// Height of the status bar area at the top
    pub area_indicator: u16,
    /// Height of the navigation bar area at the bottom
    pub area_navigation: u16,
}

impl Default for PanelGeometry {
    fn default() -> Self {
        Self {
            x_max: 1080,
            y_max: 2400,
            area_edge: 60,
            area_indicator: 48,
            area_navigation: 96,
        }
    }
}

/// Multitouch reporting protocol of the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MtProtocol {
    /// Anonymous contacts, one mt-sync per contact
    A,
    /// Slotted contacts with tracking ids
    #[default]
    B,
}

/// Reporting capabilities, checked at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    pub protocol: MtProtocol,
    /// Recognize and report stylus frames
    pub pen: bool,
    /// Report contact pressure
    pub pressure: bool,
}

/// Chip id polling used by the validity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidityConfig {
    pub chip_id_reg: u8,
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ValidityConfig {
    fn default() -> Self {
        Self {
            chip_id_reg: 0xA3,
            timeout: Duration::from_millis(1000),
            interval: Duration::from_millis(200),
        }
    }
}

/// Commands used to read the boot id while identifying the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootCommands {
    pub start: [u8; 2],
    pub start_delay: Duration,
    pub read_id: u8,
    /// Dummy bytes following the read id command
    pub read_id_len: usize,
    pub read_id_len_incell: usize,
    pub retries: u8,
}

impl Default for BootCommands {
    fn default() -> Self {
        Self {
            start: [0x55, 0xAA],
            start_delay: Duration::from_millis(12),
            read_id: 0x90,
            read_id_len: 4,
            read_id_len_incell: 1,
            retries: 3,
        }
    }
}

/// Configuration of a touch controller instance.
#[derive(Debug, Clone)]
pub struct TouchConfig {
    /// Number of contacts the panel reports, at most [`MAX_SLOTS`]
    pub max_touch_number: usize,
    pub layout: FrameLayout,
    pub event_codes: EventCodes,
    pub keys: Vec<VirtualKey, MAX_KEYS>,
    /// A contact within this distance of a key center is routed to the key
    pub key_tolerance: u16,
    pub panel: PanelGeometry,
    pub capabilities: Capabilities,
    pub validity: ValidityConfig,
    pub boot: BootCommands,
    /// Known chip variants
    pub chip_types: &'static [ChipType],
    /// Chip ids accepted as compatible for a chip variant
    pub chip_id_maps: &'static [ChipIdMap],
    pub is_incell: bool,
    /// Command byte that starts a touch data read
    pub touch_data_cmd: u8,
    /// Gesture payload appended after the touch records
    pub gesture_data_len: usize,
    pub power_mode_reg: u8,
    pub power_mode_sleep: u8,
    pub fw_version_reg: u8,
    pub module_id_reg: u8,
    /// Consecutive malformed frames tolerated before the touch state is recovered
    pub decode_error_limit: u8,
    /// How long a frame waits for the bus to come back from system suspend
    pub pm_bus_timeout: Duration,
    /// Settle time after releasing the reset line
    pub reset_settle: Duration,
}

impl TouchConfig {
    /// Number of slots actually scanned
    pub fn slots(&self) -> usize {
        self.max_touch_number.min(MAX_SLOTS)
    }

    /// Bytes read per interrupt
    pub fn read_len(&self) -> usize {
        self.layout.frame_len(self.slots()) + self.gesture_data_len
    }
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            max_touch_number: MAX_SLOTS,
            layout: FrameLayout::default(),
            event_codes: EventCodes::default(),
            keys: Vec::new(),
            key_tolerance: 50,
            panel: PanelGeometry::default(),
            capabilities: Capabilities::default(),
            validity: ValidityConfig::default(),
            boot: BootCommands::default(),
            chip_types: &[],
            chip_id_maps: &[],
            is_incell: false,
            touch_data_cmd: 0x01,
            gesture_data_len: 0,
            power_mode_reg: 0xA5,
            power_mode_sleep: 0x03,
            fw_version_reg: 0xA6,
            module_id_reg: 0xE3,
            decode_error_limit: 5,
            pm_bus_timeout: Duration::from_millis(700),
            reset_settle: Duration::from_millis(200),
        }
    }
}
