//! Interrupt-driven multi-touch acquisition for FocalTech-style capacitive touch controllers.
//!
//! Each interrupt reads one raw frame from the controller, decodes it into per-slot samples, reconciles them
//! against the previous [`TouchState`](tracker::TouchState) and hands the resulting press, move and release
//! events to an [`EventSink`](sink::EventSink). Around that path the [`TouchDriver`](driver::TouchDriver)
//! manages suspend, resume, wake gestures and firmware upgrades of the controller.
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
pub(crate) mod fmt;

pub mod channel;
pub mod config;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod event;
pub mod ic;
pub mod input;
pub mod irq;
pub mod platform;
pub mod power;
pub mod sink;
pub mod tracker;
pub mod transport;
pub mod validity;

pub use config::TouchConfig;
pub use driver::{DispatchOutcome, LifecycleState, TouchDriver};
pub use error::Error;
pub use event::ReportEvent;

pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Number of event batches buffered in [`channel::TOUCH_EVENT_CHANNEL`]
pub const TOUCH_CHANNEL_SIZE: usize = 8;
