//! Exposed channels which can be used to share touch events across tasks

use embassy_sync::channel::Channel;
pub use embassy_sync::{blocking_mutex, channel};

use crate::event::EventBatch;
use crate::{RawMutex, TOUCH_CHANNEL_SIZE};

/// Channel for touch event batches, one batch per dispatched frame
pub static TOUCH_EVENT_CHANNEL: Channel<RawMutex, EventBatch, TOUCH_CHANNEL_SIZE> = Channel::new();
