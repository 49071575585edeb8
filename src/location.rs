//! Location stream interface.
//!
//! The GPS hardware is an opaque source of `(lat, lon)` fixes. A
//! [`LocationSource`] opens subscriptions; each subscription delivers fixes
//! into a [`LocationSink`] until it is unsubscribed.
//!
//! [`HostLocationFeed`] is the source used when the host app owns the platform
//! watcher (the mobile FFI case): the host asks whether a watch is wanted and
//! pushes every fix it receives.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::config::WatchOptions;
use crate::events::TrackerEvent;
use crate::{GpsPoint, Result, TrackerError};

/// Producer of location subscriptions.
pub trait LocationSource: Send {
    /// Start delivering fixes into `sink`. Fails with
    /// [`TrackerError::PermissionDenied`] when location access is refused.
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: LocationSink,
    ) -> Result<Box<dyn Subscription>>;
}

/// Handle to a live subscription.
pub trait Subscription: Send {
    /// Stop delivery. No fix is delivered through this subscription afterwards.
    fn unsubscribe(self: Box<Self>);
}

/// Where a subscription delivers fixes. Tagged with the epoch of the
/// subscription that owns it so fixes from a closed subscription can be told
/// apart from live ones.
#[derive(Debug, Clone)]
pub struct LocationSink {
    epoch: u64,
    tx: mpsc::Sender<TrackerEvent>,
}

impl LocationSink {
    pub(crate) fn new(epoch: u64, tx: mpsc::Sender<TrackerEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Queue a fix. Returns `false` if the tracker is gone.
    pub fn deliver(&self, point: GpsPoint) -> bool {
        self.tx
            .send(TrackerEvent::Location {
                epoch: self.epoch,
                point,
            })
            .is_ok()
    }
}

// ============================================================================
// Host-driven feed
// ============================================================================

#[derive(Debug, Default)]
struct FeedState {
    sink: Option<LocationSink>,
    options: Option<WatchOptions>,
    permission_denied: bool,
    subscriptions_opened: u64,
}

/// Location source fed by the host app.
///
/// Clones share state: the tracker keeps one as its [`LocationSource`] while
/// the host keeps another to push fixes.
#[derive(Debug, Clone, Default)]
pub struct HostLocationFeed {
    state: Arc<Mutex<FeedState>>,
}

impl HostLocationFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the platform's permission answer. While denied, `subscribe` fails.
    pub fn set_permission_denied(&self, denied: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.permission_denied = denied;
        }
    }

    /// Forward a fix from the platform watcher. Dropped (returns `false`) when
    /// no subscription is live.
    pub fn push(&self, point: GpsPoint) -> bool {
        let sink = match self.state.lock() {
            Ok(state) => state.sink.clone(),
            Err(_) => None,
        };
        match sink {
            Some(sink) => sink.deliver(point),
            None => {
                debug!("[Location] Dropping fix, no live subscription");
                false
            }
        }
    }

    /// Whether the host should be running its platform watcher.
    pub fn is_watching(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.sink.is_some())
            .unwrap_or(false)
    }

    /// Options of the live subscription, if any.
    pub fn watch_options(&self) -> Option<WatchOptions> {
        self.state.lock().ok().and_then(|state| state.options.clone())
    }

    /// Total subscriptions opened so far.
    pub fn subscriptions_opened(&self) -> u64 {
        self.state
            .lock()
            .map(|state| state.subscriptions_opened)
            .unwrap_or(0)
    }
}

impl LocationSource for HostLocationFeed {
    fn subscribe(
        &mut self,
        options: &WatchOptions,
        sink: LocationSink,
    ) -> Result<Box<dyn Subscription>> {
        let mut state = self.state.lock().map_err(|_| TrackerError::Internal {
            message: "location feed lock poisoned".to_string(),
        })?;

        if state.permission_denied {
            return Err(TrackerError::PermissionDenied {
                message: "Permission to access location was denied".to_string(),
            });
        }

        let epoch = sink.epoch();
        state.sink = Some(sink);
        state.options = Some(options.clone());
        state.subscriptions_opened += 1;

        Ok(Box::new(FeedSubscription {
            state: Arc::clone(&self.state),
            epoch,
        }))
    }
}

struct FeedSubscription {
    state: Arc<Mutex<FeedState>>,
    epoch: u64,
}

impl Subscription for FeedSubscription {
    fn unsubscribe(self: Box<Self>) {
        if let Ok(mut state) = self.state.lock() {
            // A newer subscription may already have replaced this one.
            if state.sink.as_ref().map(|s| s.epoch()) == Some(self.epoch) {
                state.sink = None;
                state.options = None;
            }
        }
    }
}
