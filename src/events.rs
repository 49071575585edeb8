//! Single-consumer event queue.
//!
//! Location fixes and pin expiries can be produced from anywhere (a platform
//! callback thread, the host's timer tick). They all land here, and only the
//! [`crate::Tracker`] drains the queue, one event at a time, so no two
//! handlers ever interleave.

use std::sync::mpsc;

use crate::location::LocationSink;
use crate::GpsPoint;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A fix delivered by the location subscription opened at `epoch`.
    Location { epoch: u64, point: GpsPoint },
    /// A pin detail window ran out. `generation` identifies the timer arming
    /// that produced it; re-armed or cancelled timers make it stale.
    PinExpired { pin_id: String, generation: u64 },
}

pub struct EventQueue {
    tx: mpsc::Sender<TrackerEvent>,
    rx: mpsc::Receiver<TrackerEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// A producer handle for location fixes tagged with `epoch`.
    pub fn location_sink(&self, epoch: u64) -> LocationSink {
        LocationSink::new(epoch, self.tx.clone())
    }

    pub fn push(&self, event: TrackerEvent) {
        // The receiver lives in self, so this cannot fail.
        let _ = self.tx.send(event);
    }

    /// Next queued event, without blocking.
    pub fn try_next(&self) -> Option<TrackerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
