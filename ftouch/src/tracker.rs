//! Touch state tracking.
//!
//! [`Tracker::apply_frame`] diffs the samples of a frame against the current [`TouchState`] and produces the
//! press, move and release transitions. The firmware reports every contact that is still down in each frame,
//! so a slot that was down and is missing from the frame is released as well.

use heapless::Vec;

use crate::config::{MAX_KEYS, MAX_SLOTS, PanelGeometry, TouchConfig, VirtualKey};
use crate::event::{Contact, EventBatch, Location, ReportEvent, TouchSample};

/// Per slot history, used for the travel reported on release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotTrack {
    pub start_x: u16,
    pub start_y: u16,
    pub last_x: u16,
    pub last_y: u16,
    /// Frames reported since the press
    pub moves: u16,
}

/// Contacts currently reported as down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchState {
    occupancy: u16,
    palm: u16,
    keys: u16,
    tracks: [SlotTrack; MAX_SLOTS],
}

impl TouchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bitset of slots that are down
    pub fn occupancy(&self) -> u16 {
        self.occupancy
    }

    /// Bitset of slots flagged as palm
    pub fn palm(&self) -> u16 {
        self.palm
    }

    /// Bitset of virtual keys held down
    pub fn keys(&self) -> u16 {
        self.keys
    }

    pub fn touch_count(&self) -> u32 {
        self.occupancy.count_ones()
    }

    pub fn is_down(&self, slot: u8) -> bool {
        (slot as usize) < MAX_SLOTS && self.occupancy & (1 << slot) != 0
    }

    pub fn track(&self, slot: u8) -> Option<&SlotTrack> {
        if self.is_down(slot) {
            self.tracks.get(slot as usize)
        } else {
            None
        }
    }
}

fn push(events: &mut EventBatch, event: ReportEvent) {
    if events.push(event).is_err() {
        error!("Event batch is full, dropping {:?}", event);
    }
}

fn update_palm(state: &mut TouchState, slot: usize, palm: bool) {
    let bit = 1u16 << slot;
    if palm != (state.palm & bit != 0) {
        info!("tID:{} palm changed to {}", slot, palm);
    }
    if palm {
        state.palm |= bit;
    } else {
        state.palm &= !bit;
    }
}

#[derive(Debug, Clone)]
pub struct Tracker {
    keys: Vec<VirtualKey, MAX_KEYS>,
    key_tolerance: u16,
    panel: PanelGeometry,
}

impl Tracker {
    pub fn new(config: &TouchConfig) -> Self {
        Self {
            keys: config.keys.clone(),
            key_tolerance: config.key_tolerance,
            panel: config.panel,
        }
    }

    /// Index of the virtual key whose area contains `(x, y)`
    pub fn key_at(&self, x: u16, y: u16) -> Option<usize> {
        let tol = self.key_tolerance as i32;
        let (x, y) = (x as i32, y as i32);
        self.keys.iter().position(|k| {
            let (kx, ky) = (k.x as i32, k.y as i32);
            x >= kx - tol && x <= kx + tol && y >= ky - tol && y <= ky + tol
        })
    }

    /// Apply one decoded frame to `state`.
    pub fn apply_frame(&self, samples: &[TouchSample], state: &mut TouchState) -> EventBatch {
        let mut events = EventBatch::new();
        let previous = state.occupancy;
        let mut current = previous;
        let mut reported = 0u16;
        let mut positional = false;

        for sample in samples {
            if let Some(index) = self.key_at(sample.x, sample.y) {
                self.report_key(index, sample.kind.is_down(), state, &mut events);
                continue;
            }

            let slot = sample.slot as usize;
            if slot >= MAX_SLOTS {
                warn!("Ignoring contact on slot {}", slot);
                continue;
            }
            positional = true;
            let bit = 1u16 << slot;

            if sample.kind.is_down() {
                update_palm(state, slot, sample.palm);
                reported |= bit;

                let track = &mut state.tracks[slot];
                if current & bit == 0 {
                    current |= bit;
                    *track = SlotTrack {
                        start_x: sample.x,
                        start_y: sample.y,
                        last_x: sample.x,
                        last_y: sample.y,
                        moves: 0,
                    };
                    info!(
                        "[P] tID:{} x:{} y:{} major:{} minor:{} palm:{} loc:{:?} tc:{}",
                        slot,
                        sample.x,
                        sample.y,
                        sample.major,
                        sample.minor,
                        sample.palm,
                        Location::detect(&self.panel, sample.x, sample.y),
                        current.count_ones()
                    );
                    push(&mut events, ReportEvent::Press(Contact::from(sample)));
                } else {
                    track.moves = track.moves.saturating_add(1);
                    track.last_x = sample.x;
                    track.last_y = sample.y;
                    push(&mut events, ReportEvent::Move(Contact::from(sample)));
                }
            } else if current & bit != 0 {
                update_palm(state, slot, sample.palm);
                current &= !bit;
                reported &= !bit;
                let track = &mut state.tracks[slot];
                track.last_x = sample.x;
                track.last_y = sample.y;
                let event = self.release(slot, track, state.palm);
                state.palm &= !bit;
                push(&mut events, event);
            }
        }

        // Slots still marked down that this frame did not report
        let stale = current & !reported;
        if stale != 0 {
            for slot in 0..MAX_SLOTS {
                let bit = 1u16 << slot;
                if stale & bit != 0 {
                    info!("[R] tID:{} not reported", slot);
                    let event = self.release(slot, &state.tracks[slot], state.palm);
                    state.palm &= !bit;
                    push(&mut events, event);
                }
            }
        }

        state.occupancy = reported;
        if reported == 0 && (previous != 0 || positional) {
            debug!("Points all up");
            push(&mut events, ReportEvent::AllUp);
        }

        events
    }

    /// Release every contact and key, then report all-up.
    ///
    /// `cancel` prepends a [`ReportEvent::Cancel`] so the input layer discards the gesture in progress.
    pub fn release_all(&self, state: &mut TouchState, cancel: bool) -> EventBatch {
        let mut events = EventBatch::new();
        if cancel {
            push(&mut events, ReportEvent::Cancel);
        }
        for slot in 0..MAX_SLOTS {
            if state.occupancy & (1 << slot) != 0 {
                info!("[RA] tID:{}", slot);
                let track = &state.tracks[slot];
                push(
                    &mut events,
                    ReportEvent::Release {
                        slot: slot as u8,
                        dx: track.last_x as i32 - track.start_x as i32,
                        dy: track.last_y as i32 - track.start_y as i32,
                        moves: track.moves,
                    },
                );
            }
        }
        for (index, key) in self.keys.iter().enumerate() {
            if state.keys & (1 << index) != 0 {
                push(
                    &mut events,
                    ReportEvent::Key {
                        index: index as u8,
                        code: key.code,
                        down: false,
                    },
                );
            }
        }
        push(&mut events, ReportEvent::AllUp);

        state.occupancy = 0;
        state.palm = 0;
        state.keys = 0;
        events
    }

    fn report_key(&self, index: usize, down: bool, state: &mut TouchState, events: &mut EventBatch) {
        let bit = 1u16 << index;
        let held = state.keys & bit != 0;
        if down == held {
            return;
        }
        let code = self.keys[index].code;
        if down {
            state.keys |= bit;
            info!("Key {} ({}) down", index, code);
        } else {
            state.keys &= !bit;
            info!("Key {} ({}) up", index, code);
        }
        push(
            events,
            ReportEvent::Key {
                index: index as u8,
                code,
                down,
            },
        );
    }

    fn release(&self, slot: usize, track: &SlotTrack, palm: u16) -> ReportEvent {
        let dx = track.last_x as i32 - track.start_x as i32;
        let dy = track.last_y as i32 - track.start_y as i32;
        info!(
            "[R] tID:{} loc:{:?} dd:{},{} pc:{} mc:{}",
            slot,
            Location::detect(&self.panel, track.last_x, track.last_y),
            dx,
            dy,
            palm.count_ones(),
            track.moves
        );
        ReportEvent::Release {
            slot: slot as u8,
            dx,
            dy,
            moves: track.moves,
        }
    }
}
