//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The host app owns the platform location watcher. It checks
//! `tracker_watch_options_json` after each start/stop to know whether a watch
//! is wanted, forwards every fix with `tracker_push_location`, and calls
//! `tracker_tick` on a timer so pin windows can expire. Collections are
//! returned as JSON strings in the stored format.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use once_cell::sync::Lazy;

use crate::{
    init_logging, GpsPoint, HostLocationFeed, PinField, SqliteStore, SystemClock, Tracker,
    TrackerConfig,
};

/// A tracker together with the feed its host pushes fixes into.
pub struct FfiTracker {
    pub tracker: Tracker,
    pub feed: HostLocationFeed,
}

/// Global tracker instance.
pub static TRACKER: Lazy<Mutex<Option<FfiTracker>>> = Lazy::new(|| Mutex::new(None));

/// Get a lock on the global tracker.
pub fn with_tracker<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut FfiTracker) -> R,
{
    let mut guard = TRACKER.lock().ok()?;
    guard.as_mut().map(f)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!("[FFI] Serialization failed: {}", e);
        String::new()
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Open (or reopen) the tracker over a SQLite database.
///
/// `config_json` may be empty for defaults.
#[uniffi::export]
pub fn tracker_init(db_path: String, config_json: String) -> bool {
    init_logging();
    info!("[FFI] tracker_init: {}", db_path);

    let config = if config_json.trim().is_empty() {
        TrackerConfig::default()
    } else {
        match TrackerConfig::from_json(&config_json) {
            Ok(config) => config,
            Err(e) => {
                error!("[FFI] Invalid config: {}", e);
                return false;
            }
        }
    };

    let store = match SqliteStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("[FFI] Failed to open store: {}", e);
            return false;
        }
    };

    let Ok(mut guard) = TRACKER.lock() else {
        error!("[FFI] Tracker lock poisoned");
        return false;
    };
    // Drop the previous instance first so its writes land before reopening.
    *guard = None;

    let feed = HostLocationFeed::new();
    match Tracker::open(
        config,
        Box::new(store),
        Box::new(feed.clone()),
        Arc::new(SystemClock),
    ) {
        Ok(tracker) => {
            *guard = Some(FfiTracker { tracker, feed });
            true
        }
        Err(e) => {
            error!("[FFI] Failed to open tracker: {}", e);
            false
        }
    }
}

#[uniffi::export]
pub fn tracker_is_initialized() -> bool {
    TRACKER.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Block until pending writes are durable.
#[uniffi::export]
pub fn tracker_flush() {
    with_tracker(|t| t.tracker.flush());
}

// ============================================================================
// Session
// ============================================================================

/// Start, pause or resume. Returns the resulting state name, or an empty
/// string on failure.
#[uniffi::export]
pub fn tracker_start(permission_granted: bool) -> String {
    with_tracker(|t| {
        t.feed.set_permission_denied(!permission_granted);
        match t.tracker.start() {
            Ok(state) => format!("{:?}", state),
            Err(e) => {
                warn!("[FFI] start failed: {}", e);
                String::new()
            }
        }
    })
    .unwrap_or_default()
}

#[uniffi::export]
pub fn tracker_stop() -> bool {
    with_tracker(|t| match t.tracker.stop() {
        Ok(_) => true,
        Err(e) => {
            warn!("[FFI] stop failed: {}", e);
            false
        }
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_state() -> String {
    with_tracker(|t| format!("{:?}", t.tracker.state())).unwrap_or_default()
}

/// Watch options while a subscription is live, else an empty string.
#[uniffi::export]
pub fn tracker_watch_options_json() -> String {
    with_tracker(|t| t.feed.watch_options().map(|o| to_json(&o)))
        .flatten()
        .unwrap_or_default()
}

/// Forward a fix from the platform watcher. Returns whether it was accepted.
#[uniffi::export]
pub fn tracker_push_location(latitude: f64, longitude: f64) -> bool {
    with_tracker(|t| {
        let accepted = t.feed.push(GpsPoint::new(latitude, longitude));
        t.tracker.pump();
        accepted
    })
    .unwrap_or(false)
}

/// Seed the current position (the fix obtained before any start).
#[uniffi::export]
pub fn tracker_set_location_fix(latitude: f64, longitude: f64) {
    with_tracker(|t| t.tracker.set_location_fix(GpsPoint::new(latitude, longitude)));
}

/// Fire due pin expiries. Returns milliseconds until the next one, or -1.
#[uniffi::export]
pub fn tracker_tick() -> i64 {
    with_tracker(|t| {
        t.tracker.tick();
        t.tracker
            .next_wakeup()
            .map(|at| (at - chrono::Utc::now()).num_milliseconds().max(0))
            .unwrap_or(-1)
    })
    .unwrap_or(-1)
}

// ============================================================================
// Pins
// ============================================================================

/// Drop a pin at the current location. Returns its id, or an empty string.
#[uniffi::export]
pub fn tracker_drop_pin() -> String {
    with_tracker(|t| match t.tracker.drop_pin() {
        Ok(id) => id,
        Err(e) => {
            warn!("[FFI] drop_pin failed: {}", e);
            String::new()
        }
    })
    .unwrap_or_default()
}

/// `field` is one of `name`, `category`, `notes`.
#[uniffi::export]
pub fn tracker_edit_pin_field(field: String, value: String) -> bool {
    let field: PinField = match field.parse() {
        Ok(field) => field,
        Err(e) => {
            warn!("[FFI] {}", e);
            return false;
        }
    };
    with_tracker(|t| t.tracker.edit_pin_field(field, &value).is_ok()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_save_pin() -> bool {
    with_tracker(|t| match t.tracker.save_pin() {
        Ok(_) => true,
        Err(e) => {
            warn!("[FFI] save_pin failed: {}", e);
            false
        }
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_skip_pin() -> bool {
    with_tracker(|t| t.tracker.skip_pin().is_ok()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_clear_pins() {
    with_tracker(|t| t.tracker.clear_pins());
}

// ============================================================================
// Paths
// ============================================================================

#[uniffi::export]
pub fn tracker_rename_path(id: String, name: String, note: String) -> bool {
    with_tracker(|t| t.tracker.rename_path(&id, &name, &note).is_ok()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_toggle_path_visibility(id: String) -> bool {
    with_tracker(|t| t.tracker.toggle_path_visibility(&id).is_ok()).unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_show_all_paths() {
    with_tracker(|t| t.tracker.show_all_paths());
}

#[uniffi::export]
pub fn tracker_delete_path(id: String) -> bool {
    with_tracker(|t| match t.tracker.delete_path(&id) {
        Ok(_) => true,
        Err(e) => {
            warn!("[FFI] delete_path failed: {}", e);
            false
        }
    })
    .unwrap_or(false)
}

#[uniffi::export]
pub fn tracker_clear_paths() -> bool {
    with_tracker(|t| t.tracker.clear_paths().is_ok()).unwrap_or(false)
}

/// Toggle focus on a path. Returns the fit-bounds request as JSON, or an
/// empty string when focus was released or the path has no extent.
#[uniffi::export]
pub fn tracker_focus_path(id: String) -> String {
    with_tracker(|t| match t.tracker.focus_path(&id) {
        Ok(Some(request)) => to_json(&request),
        Ok(None) => String::new(),
        Err(e) => {
            warn!("[FFI] focus_path failed: {}", e);
            String::new()
        }
    })
    .unwrap_or_default()
}

// ============================================================================
// Categories
// ============================================================================

#[uniffi::export]
pub fn tracker_get_categories() -> Vec<String> {
    with_tracker(|t| t.tracker.categories().to_vec()).unwrap_or_default()
}

#[uniffi::export]
pub fn tracker_clear_categories() {
    with_tracker(|t| t.tracker.clear_categories());
}

// ============================================================================
// Queries
// ============================================================================

#[uniffi::export]
pub fn tracker_get_paths_json() -> String {
    with_tracker(|t| {
        let snapshot = t.tracker.paths();
        let records: Vec<&crate::PathRecord> = snapshot.iter().map(|r| r.as_ref()).collect();
        to_json(&records)
    })
    .unwrap_or_else(|| "[]".to_string())
}

#[uniffi::export]
pub fn tracker_get_path_summaries_json() -> String {
    with_tracker(|t| to_json(&t.tracker.path_summaries())).unwrap_or_else(|| "[]".to_string())
}

#[uniffi::export]
pub fn tracker_get_pins_json() -> String {
    with_tracker(|t| to_json(t.tracker.pins())).unwrap_or_else(|| "[]".to_string())
}

#[uniffi::export]
pub fn tracker_get_map_view_json() -> String {
    with_tracker(|t| to_json(&t.tracker.map_view())).unwrap_or_default()
}
