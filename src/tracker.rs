//! # Tracker
//!
//! Owns every component and is the single serialization point for all
//! mutations. Location fixes and pin expiries are queued as events; user
//! commands first drain whatever is already queued (and whatever timers are
//! already due), then apply. Nothing else holds a mutable reference to the
//! path store or the pin capture, so no handler ever observes another one
//! half-done.
//!
//! The host drives time: call [`Tracker::tick`] periodically (or at
//! [`Tracker::next_wakeup`]) so pin windows can expire, and [`Tracker::pump`]
//! after pushing location fixes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::categories::CategoryRegistry;
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::events::{EventQueue, TrackerEvent};
use crate::location::LocationSource;
use crate::map_view::{FitBoundsRequest, MapView};
use crate::paths::{PathSnapshot, PathStore, PathSummary};
use crate::persistence::PersistenceGateway;
use crate::pins::{PinCapture, PinDraft, PinField, PinRecord};
use crate::session::{SessionController, SessionState};
use crate::store::KeyValueStore;
use crate::{GpsPoint, OptionExt, Result, TrackerError};

pub struct Tracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    gateway: PersistenceGateway,
    paths: PathStore,
    session: SessionController,
    pins: PinCapture,
    categories: CategoryRegistry,
    queue: EventQueue,
    focus: Option<String>,
}

impl Tracker {
    /// Build a tracker over a durable store and load the stored collections.
    ///
    /// Corrupted collections are reset to empty here; they never fail startup.
    pub fn open(
        config: TrackerConfig,
        store: Box<dyn KeyValueStore>,
        location: Box<dyn LocationSource>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let gateway = PersistenceGateway::new(store)?;

        let mut paths = PathStore::new(gateway.clone());
        let mut pins = PinCapture::new(gateway.clone(), &config);
        let mut categories = CategoryRegistry::new(gateway.clone());

        let paths_status = paths.hydrate(clock.now());
        let pins_status = pins.hydrate();
        let categories_status = categories.hydrate();
        info!(
            "[Tracker] Opened: paths {:?}, pins {:?}, categories {:?}",
            paths_status, pins_status, categories_status
        );

        Ok(Self {
            session: SessionController::new(location, config.watch.clone()),
            config,
            clock,
            gateway,
            paths,
            pins,
            categories,
            queue: EventQueue::new(),
            focus: None,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Process every queued event, in order. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.queue.try_next() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Queue expiries for every pin window that has run out, then pump.
    pub fn tick(&mut self) -> usize {
        let now = self.now();
        for event in self.pins.due_expiries(now) {
            self.queue.push(event);
        }
        self.pump()
    }

    /// When the next pin window runs out, if one is open.
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.pins.expires_at()
    }

    fn handle(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::Location { epoch, point } => {
                match self.session.on_location(&mut self.paths, epoch, point) {
                    Ok(_) => {}
                    Err(TrackerError::NoOpenSession) => {
                        warn!("[Tracker] Location fix with no open path, ignoring");
                    }
                    Err(e) => error!("[Tracker] Failed to record fix: {}", e),
                }
            }
            TrackerEvent::PinExpired { pin_id, generation } => {
                self.pins.on_expired(&pin_id, generation);
            }
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Start a new path, or pause/resume the current one.
    pub fn start(&mut self) -> Result<SessionState> {
        self.tick();
        let now = self.now();
        self.session.start(&mut self.paths, &self.queue, now)
    }

    /// Finalize the current path.
    pub fn stop(&mut self) -> Result<PathSnapshot> {
        self.tick();
        let now = self.now();
        self.session.stop(&mut self.paths, now)
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Id of the path being recorded.
    pub fn open_path_id(&self) -> Option<&str> {
        self.session.context().open_path_id()
    }

    /// Seed the current position (e.g. the platform's initial fix).
    pub fn set_location_fix(&mut self, point: GpsPoint) {
        self.session.set_location_fix(point);
    }

    pub fn current_location(&self) -> Option<GpsPoint> {
        self.session.context().last_fix()
    }

    pub fn watch_options(&self) -> &crate::config::WatchOptions {
        &self.config.watch
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn paths(&self) -> PathSnapshot {
        self.paths.list()
    }

    pub fn path_summaries(&self) -> Vec<PathSummary> {
        self.paths.list().summaries()
    }

    pub fn rename_path(&mut self, id: &str, name: &str, note: &str) -> Result<PathSnapshot> {
        self.tick();
        self.paths.rename(id, name, note)
    }

    pub fn toggle_path_visibility(&mut self, id: &str) -> Result<PathSnapshot> {
        self.tick();
        self.paths.toggle_visibility(id)
    }

    /// Leave single-path focus and mark every path visible.
    pub fn show_all_paths(&mut self) -> PathSnapshot {
        self.tick();
        self.focus = None;
        self.paths.show_all()
    }

    pub fn delete_path(&mut self, id: &str) -> Result<PathSnapshot> {
        self.tick();
        let snapshot = self.paths.delete(id, self.session.context())?;
        if self.focus.as_deref() == Some(id) {
            self.focus = None;
        }
        Ok(snapshot)
    }

    pub fn clear_paths(&mut self) -> Result<PathSnapshot> {
        self.tick();
        let snapshot = self.paths.clear(self.session.context())?;
        self.focus = None;
        Ok(snapshot)
    }

    /// Toggle single-path focus.
    ///
    /// Focusing a path returns a fit-to-bounds request when it has an extent.
    /// Focusing the already-focused path returns to showing all paths.
    pub fn focus_path(&mut self, id: &str) -> Result<Option<FitBoundsRequest>> {
        self.tick();
        if self.focus.as_deref() == Some(id) {
            self.focus = None;
            return Ok(None);
        }

        let snapshot = self.paths.list();
        let record = snapshot.get(id).ok_or_path_not_found(id)?;
        self.focus = Some(id.to_string());
        Ok(FitBoundsRequest::for_path(record, self.config.fit_edge_padding))
    }

    pub fn focused_path_id(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    pub fn map_view(&self) -> MapView {
        MapView::build(
            &self.paths.list(),
            self.pins.pins(),
            self.focus.as_deref(),
            self.current_location(),
        )
    }

    // ========================================================================
    // Pins
    // ========================================================================

    /// Drop a pin at the current location and open its detail window.
    pub fn drop_pin(&mut self) -> Result<String> {
        self.tick();
        let location = self.current_location().ok_or(TrackerError::NoLocationFix)?;
        let now = self.now();
        self.pins.drop_pin(location, now)
    }

    pub fn edit_pin_field(&mut self, field: PinField, value: &str) -> Result<()> {
        self.tick();
        let now = self.now();
        self.pins.edit_field(field, value, now)
    }

    /// Pick an existing category for the open pin.
    pub fn choose_category(&mut self, category: &str) -> Result<()> {
        self.edit_pin_field(PinField::Category, category)
    }

    pub fn save_pin(&mut self) -> Result<PinRecord> {
        self.tick();
        self.pins.save(&mut self.categories)
    }

    pub fn skip_pin(&mut self) -> Result<()> {
        self.tick();
        self.pins.skip()
    }

    pub fn pins(&self) -> &[PinRecord] {
        self.pins.pins()
    }

    pub fn active_pin_id(&self) -> Option<&str> {
        self.pins.active_pin_id()
    }

    pub fn pin_draft(&self) -> Option<&PinDraft> {
        self.pins.draft()
    }

    pub fn clear_pins(&mut self) {
        self.tick();
        self.pins.clear();
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub fn categories(&self) -> &[String] {
        self.categories.list()
    }

    pub fn clear_categories(&mut self) {
        self.tick();
        self.categories.clear();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Block until every queued durable write has landed.
    pub fn flush(&self) {
        self.gateway.flush();
    }

    pub fn persistence_stats(&self) -> crate::persistence::GatewayStats {
        self.gateway.stats()
    }
}
