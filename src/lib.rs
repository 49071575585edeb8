//! # Path Tracker
//!
//! GPS path recording and pin capture core for a mobile tracking app.
//!
//! This library provides:
//! - A pause/resume tracking session state machine fed by a location stream
//! - Path records with incremental Haversine distance (miles)
//! - Timed pin capture with an auto-expiring detail-entry window
//! - Write-through persistence to a durable key-value store with corruption
//!   recovery and redundant-write suppression
//!
//! ## Features
//!
//! - **`persistence`** - SQLite-backed durable store (on by default)
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use path_tracker::{GpsPoint, HostLocationFeed, MemoryStore, SystemClock, Tracker, TrackerConfig};
//!
//! let feed = HostLocationFeed::new();
//! let mut tracker = Tracker::open(
//!     TrackerConfig::default(),
//!     Box::new(MemoryStore::new()),
//!     Box::new(feed.clone()),
//!     Arc::new(SystemClock),
//! )
//! .unwrap();
//!
//! tracker.start().unwrap();
//! feed.push(GpsPoint::new(40.0000, -105.0000));
//! feed.push(GpsPoint::new(40.0010, -105.0000));
//! tracker.pump();
//!
//! let paths = tracker.paths();
//! assert_eq!(paths[0].points.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackerError};

// Configuration
pub mod config;
pub use config::{Accuracy, TrackerConfig, WatchOptions};

// Geographic utilities (distance, bounds)
pub mod geo_utils;

// Time sources
pub mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

// Durable key-value stores
pub mod store;
#[cfg(feature = "persistence")]
pub use store::SqliteStore;
pub use store::{KeyValueStore, MemoryStore};

// Write-through persistence gateway
pub mod persistence;
pub use persistence::{LoadOutcome, LoadStatus, PersistenceGateway, StorageKey};

// Path records and the copy-on-write path store
pub mod paths;
pub use paths::{PathRecord, PathSnapshot, PathStore, PathSummary};

// Location stream interface
pub mod location;
pub use location::{HostLocationFeed, LocationSink, LocationSource, Subscription};

// Event queue (single serialization point)
pub mod events;
pub use events::{EventQueue, TrackerEvent};

// Tracking session state machine
pub mod session;
pub use session::{SessionContext, SessionController, SessionState};

// Pin expiry timers
pub mod timers;
pub use timers::ExpiryTimers;

// Pin capture workflow
pub mod pins;
pub use pins::{CaptureOutcome, PinCapture, PinField, PinRecord};

// Category labels
pub mod categories;
pub use categories::CategoryRegistry;

// Map renderer view model
pub mod map_view;
pub use map_view::{FitBoundsRequest, MapView, PinMarker, Polyline};

// Runtime that owns every component
pub mod tracker;
pub use tracker::Tracker;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("PathTracker"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude, in degrees.
///
/// # Example
/// ```
/// use path_tracker::GpsPoint;
/// let point = GpsPoint::new(40.0150, -105.2705); // Boulder
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box over a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}
