//! # Tracking Session
//!
//! State machine driving path recording:
//!
//! ```text
//! Idle --start--> Active --start--> Paused --start--> Active
//!                   |                  |
//!                   +------stop--------+--> Stopped --start--> Active (new path)
//! ```
//!
//! `start()` is a toggle: from Active it pauses, from Paused it resumes the
//! same open path. Only `stop()` closes the path, and a later `start()` always
//! opens a brand-new one.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::WatchOptions;
use crate::events::EventQueue;
use crate::location::{LocationSource, Subscription};
use crate::paths::{PathSnapshot, PathStore};
use crate::{GpsPoint, Result, TrackerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Paused,
    Stopped,
}

impl SessionState {
    /// Active or Paused: a path is open.
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Paused)
    }
}

/// Explicit session state handed to the components that need it, instead of
/// ambient UI state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: SessionState,
    /// Id of the open path. A reference into the path store, never a copy.
    open_path_id: Option<String>,
    last_fix: Option<GpsPoint>,
    /// Epoch of the live location subscription.
    epoch: u64,
}

impl SessionContext {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn open_path_id(&self) -> Option<&str> {
        self.open_path_id.as_deref()
    }

    /// Most recent accepted location fix.
    pub fn last_fix(&self) -> Option<GpsPoint> {
        self.last_fix
    }

    /// Whether `path_id` is the path currently being recorded.
    pub fn is_recording(&self, path_id: &str) -> bool {
        self.state.is_recording() && self.open_path_id.as_deref() == Some(path_id)
    }

    #[cfg(test)]
    pub(crate) fn recording(path_id: &str) -> Self {
        Self {
            state: SessionState::Active,
            open_path_id: Some(path_id.to_string()),
            ..Self::default()
        }
    }
}

/// Drives the session state machine and routes fixes into the path store.
pub struct SessionController {
    ctx: SessionContext,
    source: Box<dyn LocationSource>,
    subscription: Option<Box<dyn Subscription>>,
    watch: WatchOptions,
}

impl SessionController {
    pub fn new(source: Box<dyn LocationSource>, watch: WatchOptions) -> Self {
        Self {
            ctx: SessionContext::default(),
            source,
            subscription: None,
            watch,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn state(&self) -> SessionState {
        self.ctx.state
    }

    /// Record a fix obtained outside a subscription (the initial position).
    pub fn set_location_fix(&mut self, point: GpsPoint) {
        if point.is_valid() {
            self.ctx.last_fix = Some(point);
        }
    }

    /// Start, pause or resume depending on the current state.
    pub fn start(
        &mut self,
        paths: &mut PathStore,
        queue: &EventQueue,
        now: DateTime<Utc>,
    ) -> Result<SessionState> {
        match self.ctx.state {
            SessionState::Idle | SessionState::Stopped => {
                // Subscribe first so a refused permission leaves no empty path.
                self.subscribe(queue)?;
                let (id, _) = match paths.open(now) {
                    Ok(opened) => opened,
                    Err(e) => {
                        self.unsubscribe();
                        return Err(e);
                    }
                };
                info!("[Session] Started tracking {}", id);
                self.ctx.open_path_id = Some(id);
                self.ctx.state = SessionState::Active;
            }
            SessionState::Active => {
                self.unsubscribe();
                self.ctx.state = SessionState::Paused;
                info!("[Session] Paused");
            }
            SessionState::Paused => {
                self.subscribe(queue)?;
                self.ctx.state = SessionState::Active;
                info!("[Session] Resumed");
            }
        }
        Ok(self.ctx.state)
    }

    /// Finalize the open path. Valid from Active or Paused.
    pub fn stop(&mut self, paths: &mut PathStore, now: DateTime<Utc>) -> Result<PathSnapshot> {
        if !self.ctx.state.is_recording() {
            return Err(TrackerError::InvalidTransition {
                operation: "stop",
                state: self.ctx.state,
            });
        }

        self.unsubscribe();
        self.ctx.state = SessionState::Stopped;
        let id = self.ctx.open_path_id.take().ok_or(TrackerError::NoOpenSession)?;
        info!("[Session] Stopped tracking {}", id);
        paths.close(&id, now)
    }

    /// Handle one location event.
    ///
    /// Fixes from a subscription that is no longer live are dropped. A fix
    /// with no open path is [`TrackerError::NoOpenSession`].
    pub fn on_location(
        &mut self,
        paths: &mut PathStore,
        epoch: u64,
        point: GpsPoint,
    ) -> Result<Option<PathSnapshot>> {
        if self.subscription.is_none() || epoch != self.ctx.epoch {
            debug!("[Session] Dropping fix from closed subscription {}", epoch);
            return Ok(None);
        }
        if !point.is_valid() {
            warn!("[Session] Ignoring invalid fix {:?}", point);
            return Ok(None);
        }

        self.ctx.last_fix = Some(point);
        let id = self
            .ctx
            .open_path_id
            .as_deref()
            .ok_or(TrackerError::NoOpenSession)?;
        paths.append(id, point).map(Some)
    }

    fn subscribe(&mut self, queue: &EventQueue) -> Result<()> {
        let epoch = self.ctx.epoch + 1;
        let subscription = self
            .source
            .subscribe(&self.watch, queue.location_sink(epoch))?;
        self.ctx.epoch = epoch;
        self.subscription = Some(subscription);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::HostLocationFeed;
    use crate::persistence::PersistenceGateway;
    use crate::store::MemoryStore;

    struct Harness {
        session: SessionController,
        paths: PathStore,
        queue: EventQueue,
        feed: HostLocationFeed,
    }

    impl Harness {
        fn new() -> Self {
            let gateway = PersistenceGateway::new(Box::new(MemoryStore::new())).unwrap();
            let feed = HostLocationFeed::new();
            Self {
                session: SessionController::new(Box::new(feed.clone()), WatchOptions::default()),
                paths: PathStore::new(gateway),
                queue: EventQueue::new(),
                feed,
            }
        }

        fn start(&mut self) -> Result<SessionState> {
            self.session
                .start(&mut self.paths, &self.queue, DateTime::<Utc>::UNIX_EPOCH)
        }

        fn stop(&mut self) -> Result<PathSnapshot> {
            self.session.stop(&mut self.paths, DateTime::<Utc>::UNIX_EPOCH)
        }

        fn drain(&mut self) {
            while let Some(crate::TrackerEvent::Location { epoch, point }) = self.queue.try_next() {
                let _ = self.session.on_location(&mut self.paths, epoch, point);
            }
        }
    }

    #[test]
    fn test_toggle_cycle() {
        let mut h = Harness::new();
        assert_eq!(h.start().unwrap(), SessionState::Active);
        assert!(h.feed.is_watching());
        assert_eq!(h.start().unwrap(), SessionState::Paused);
        assert!(!h.feed.is_watching());
        assert_eq!(h.start().unwrap(), SessionState::Active);
        assert!(h.feed.is_watching());

        let snapshot = h.stop().unwrap();
        assert_eq!(h.session.state(), SessionState::Stopped);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].stopped_at.is_some());
        assert!(!h.feed.is_watching());
    }

    #[test]
    fn test_stop_from_idle_is_invalid() {
        let mut h = Harness::new();
        assert!(matches!(
            h.stop(),
            Err(TrackerError::InvalidTransition {
                operation: "stop",
                state: SessionState::Idle
            })
        ));
    }

    #[test]
    fn test_stop_while_paused_finalizes() {
        let mut h = Harness::new();
        h.start().unwrap();
        h.start().unwrap();
        let snapshot = h.stop().unwrap();
        assert!(snapshot[0].stopped_at.is_some());
        assert!(h.session.context().open_path_id().is_none());
    }

    #[test]
    fn test_restart_opens_new_path() {
        let mut h = Harness::new();
        h.start().unwrap();
        h.stop().unwrap();
        h.start().unwrap();

        let snapshot = h.paths.list();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].stopped_at.is_some());
        assert!(snapshot[1].stopped_at.is_none());
        assert_eq!(
            h.session.context().open_path_id(),
            Some(snapshot[1].id.as_str())
        );
    }

    #[test]
    fn test_permission_denied_creates_nothing() {
        let mut h = Harness::new();
        h.feed.set_permission_denied(true);
        assert!(matches!(h.start(), Err(TrackerError::PermissionDenied { .. })));
        assert_eq!(h.session.state(), SessionState::Idle);
        assert!(h.paths.list().is_empty());
    }

    #[test]
    fn test_fixes_queued_before_pause_are_dropped() {
        let mut h = Harness::new();
        h.start().unwrap();
        h.feed.push(GpsPoint::new(40.0, -105.0));
        h.drain();

        h.feed.push(GpsPoint::new(40.001, -105.0));
        h.start().unwrap(); // pause before the fix is processed
        h.drain();

        let snapshot = h.paths.list();
        assert_eq!(snapshot[0].points.len(), 1);
    }

    #[test]
    fn test_resume_appends_to_same_path() {
        let mut h = Harness::new();
        h.start().unwrap();
        let id = h.session.context().open_path_id().unwrap().to_string();
        h.feed.push(GpsPoint::new(40.0, -105.0));
        h.drain();

        h.start().unwrap();
        h.start().unwrap();
        h.feed.push(GpsPoint::new(40.001, -105.0));
        h.drain();

        let snapshot = h.paths.list();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].points.len(), 2);
    }

    #[test]
    fn test_location_without_open_path() {
        let mut h = Harness::new();
        h.start().unwrap();
        let epoch = h.session.context().epoch;
        // Simulate the open path vanishing out from under the session.
        h.session.ctx.open_path_id = None;

        let result = h
            .session
            .on_location(&mut h.paths, epoch, GpsPoint::new(40.0, -105.0));
        assert!(matches!(result, Err(TrackerError::NoOpenSession)));
    }
}
