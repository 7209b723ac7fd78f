//! Event reporting seam.

use embassy_sync::channel::Channel;

use crate::RawMutex;
use crate::event::{EventBatch, ReportEvent};

/// Receives the normalized events of one dispatch cycle.
///
/// Each call carries exactly one frame and acts as its synchronization barrier.
pub trait EventSink {
    async fn report_events(&mut self, events: &[ReportEvent]);
}

/// [`EventSink`] forwarding batches into a channel, see [`TOUCH_EVENT_CHANNEL`](crate::channel::TOUCH_EVENT_CHANNEL).
pub struct ChannelSink<'a, const N: usize> {
    channel: &'a Channel<RawMutex, EventBatch, N>,
}

impl<'a, const N: usize> ChannelSink<'a, N> {
    pub fn new(channel: &'a Channel<RawMutex, EventBatch, N>) -> Self {
        Self { channel }
    }
}

impl<const N: usize> EventSink for ChannelSink<'_, N> {
    async fn report_events(&mut self, events: &[ReportEvent]) {
        if events.is_empty() {
            return;
        }
        match EventBatch::from_slice(events) {
            Ok(batch) => self.channel.send(batch).await,
            Err(_) => error!("Touch event batch of {} events does not fit", events.len()),
        }
    }
}
