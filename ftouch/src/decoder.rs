//! Raw touch frame decoding.
//!
//! A frame starts with a short header carrying the point count, followed by one fixed size record per slot:
//!
//! ```text
//! byte 0: event[7:6] | palm[4] | x[11:8]
//! byte 1: x[7:0]
//! byte 2: id[7:4] | y[11:8]
//! byte 3: y[7:0]
//! byte 4: minor axis
//! byte 5: major axis
//! ```
//!
//! The exact positions come from [`FrameLayout`], decoding itself has no side effects.

use heapless::Vec;

use crate::config::{EventCodes, FrameLayout, MAX_SLOTS};
use crate::error::DecodeError;
use crate::event::{EventKind, PenSample, TouchSample};

/// Samples decoded from one frame.
pub type Samples = Vec<TouchSample, MAX_SLOTS>;

const ERROR_MARKER_COUNT: usize = 3;

// Incell blank frame: point count saturated and the first five bytes after the command all 0xFF
const INCELL_BLANK_RANGE: core::ops::RangeInclusive<usize> = 1..=5;

// Pen frame fields, relative to the first byte of the frame
const PEN_STATUS_POS: usize = 2;
const PEN_TIP: u8 = 0x01;
const PEN_BUTTON2: u8 = 0x02;
const PEN_BUTTON1: u8 = 0x08;
const PEN_IN_RANGE: u8 = 0x20;
const PEN_X_POS: usize = 3;
const PEN_Y_POS: usize = 5;
const PEN_PRESSURE_POS: usize = 7;
const PEN_TILT_X_POS: usize = 9;
const PEN_TILT_Y_POS: usize = 11;
const PEN_FRAME_LEN: usize = 13;

#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    layout: FrameLayout,
    codes: EventCodes,
    is_incell: bool,
}

impl FrameDecoder {
    pub fn new(layout: FrameLayout, codes: EventCodes, is_incell: bool) -> Self {
        Self {
            layout,
            codes,
            is_incell,
        }
    }

    /// Decode `raw` into at most `max_slots` samples.
    pub fn decode(&self, raw: &[u8], max_slots: usize) -> Result<Samples, DecodeError> {
        let l = &self.layout;
        let max_slots = max_slots.min(MAX_SLOTS);
        let need = l.frame_len(max_slots).max(INCELL_BLANK_RANGE.end() + 1);
        if raw.len() < need {
            return Err(DecodeError::ShortBuffer { len: raw.len(), need });
        }

        if self.is_device_error(raw) {
            return Err(DecodeError::DeviceError);
        }

        let point_num = raw[l.point_num_pos] & l.point_num_mask;

        if self.is_incell
            && point_num == l.point_num_mask
            && raw[INCELL_BLANK_RANGE].iter().all(|&b| b == 0xFF)
        {
            return Err(DecodeError::IncellBlank);
        }

        if point_num as usize > max_slots {
            return Err(DecodeError::InvalidCount(point_num));
        }

        let mut samples = Samples::new();
        for i in 0..max_slots {
            let record = &raw[l.header_len + l.record_len * i..];
            let id = record[l.id_pos] >> l.id_shift;
            if id >= l.max_valid_id {
                break;
            }
            if id as usize >= max_slots {
                return Err(DecodeError::IdOutOfRange(id));
            }

            let event = record[l.event_pos];
            let kind = self.event_kind((event >> l.event_shift) & 0x03);
            if kind.is_down() && point_num == 0 {
                return Err(DecodeError::DownWithoutPoints);
            }

            let sample = TouchSample {
                slot: id,
                x: ((record[l.x_high_pos] as u16 & 0x0F) << 8) | record[l.x_low_pos] as u16,
                y: ((record[l.y_high_pos] as u16 & 0x0F) << 8) | record[l.y_low_pos] as u16,
                major: record[l.major_pos],
                minor: record[l.minor_pos],
                pressure: l.pressure_pos.map(|pos| record[pos]),
                kind,
                palm: (event >> l.palm_bit) & 0x01 != 0,
            };
            // Capacity equals MAX_SLOTS and the loop never exceeds it
            let _ = samples.push(sample);
        }

        if samples.is_empty() {
            return Err(DecodeError::NoPoints);
        }

        Ok(samples)
    }

    /// Whether the frame header carries the device error sentinel.
    pub fn is_device_error(&self, raw: &[u8]) -> bool {
        let start = self.layout.error_marker_pos;
        raw.get(start..start + ERROR_MARKER_COUNT)
            .is_some_and(|m| m.iter().all(|&b| b == self.layout.error_marker))
    }

    pub fn is_pen_frame(&self, raw: &[u8]) -> bool {
        raw.get(self.layout.pen_marker_pos)
            .is_some_and(|&b| b & self.layout.pen_marker_mask == self.layout.pen_marker)
    }

    /// Decode a stylus frame, `None` if the buffer is too short.
    pub fn decode_pen(&self, raw: &[u8]) -> Option<PenSample> {
        if raw.len() < PEN_FRAME_LEN {
            return None;
        }
        let status = raw[PEN_STATUS_POS];
        let coord = |pos: usize| ((raw[pos] as u16 & 0x0F) << 8) | raw[pos + 1] as u16;
        let word = |pos: usize| u16::from_be_bytes([raw[pos], raw[pos + 1]]);
        Some(PenSample {
            x: coord(PEN_X_POS),
            y: coord(PEN_Y_POS),
            pressure: coord(PEN_PRESSURE_POS),
            tilt_x: word(PEN_TILT_X_POS),
            tilt_y: word(PEN_TILT_Y_POS),
            tip: status & PEN_TIP != 0,
            in_range: status & PEN_IN_RANGE != 0,
            button1: status & PEN_BUTTON1 != 0,
            button2: status & PEN_BUTTON2 != 0,
        })
    }

    fn event_kind(&self, code: u8) -> EventKind {
        if code == self.codes.down {
            EventKind::Down
        } else if code == self.codes.contact {
            EventKind::Move
        } else {
            // Up and the unused "no event" code both mean the finger is gone
            EventKind::Up
        }
    }
}
