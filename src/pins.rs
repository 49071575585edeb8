//! # Pin Capture
//!
//! Point annotations dropped while moving, with a short detail-entry window.
//!
//! ```text
//! Dropped -> DetailsPending -> Saved | Skipped | Expired
//! ```
//!
//! A dropped pin is persisted immediately with `detailsPending = true` and an
//! expiry timer of `pin_initial_window_secs`. Each edit re-arms the timer to
//! `pin_edit_window_secs` from the edit. Saving writes the draft into the pin
//! and clears `detailsPending` for good; skipping or expiring leaves the pin
//! as dropped. Only one capture is open at a time.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::categories::CategoryRegistry;
use crate::config::TrackerConfig;
use crate::events::TrackerEvent;
use crate::persistence::{validate_pins, LoadStatus, PersistenceGateway, StorageKey};
use crate::timers::ExpiryTimers;
use crate::{GpsPoint, OptionExt, Result, TrackerError};

/// A dropped pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    /// Opaque photo references
    #[serde(default)]
    pub photos: Vec<String>,
    /// True until details are saved; never reverts once false
    #[serde(default)]
    pub details_pending: bool,
}

impl PinRecord {
    pub fn location(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Editable pin detail fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinField {
    Name,
    Category,
    Notes,
}

impl FromStr for PinField {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(PinField::Name),
            "category" => Ok(PinField::Category),
            "notes" => Ok(PinField::Notes),
            _ => Err(TrackerError::InvalidPinField {
                field: s.to_string(),
            }),
        }
    }
}

/// How a capture workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureOutcome {
    Saved,
    Skipped,
    Expired,
    /// Closed because a new pin was dropped.
    Superseded,
}

/// In-progress detail values. Not persisted until saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PinDraft {
    pub name: String,
    pub category: String,
    pub notes: String,
}

#[derive(Debug)]
struct ActiveCapture {
    pin_id: String,
    draft: PinDraft,
    generation: u64,
}

/// Owner of the pin collection and the single active capture workflow.
pub struct PinCapture {
    pins: Vec<PinRecord>,
    active: Option<ActiveCapture>,
    timers: ExpiryTimers,
    initial_window: Duration,
    edit_window: Duration,
    gateway: PersistenceGateway,
}

impl PinCapture {
    pub fn new(gateway: PersistenceGateway, config: &TrackerConfig) -> Self {
        Self {
            pins: Vec::new(),
            active: None,
            timers: ExpiryTimers::new(),
            initial_window: config.pin_initial_window(),
            edit_window: config.pin_edit_window(),
            gateway,
        }
    }

    pub fn hydrate(&mut self) -> LoadStatus {
        let outcome = self.gateway.load::<PinRecord>(StorageKey::Pins, validate_pins);
        self.pins = outcome.items;
        info!("[PinCapture] Hydrated {} pins ({:?})", self.pins.len(), outcome.status);
        outcome.status
    }

    pub fn pins(&self) -> &[PinRecord] {
        &self.pins
    }

    pub fn get(&self, id: &str) -> Option<&PinRecord> {
        self.pins.iter().find(|p| p.id == id)
    }

    pub fn active_pin_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.pin_id.as_str())
    }

    pub fn draft(&self) -> Option<&PinDraft> {
        self.active.as_ref().map(|a| &a.draft)
    }

    /// When the active capture will expire, if one is open.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.active
            .as_ref()
            .and_then(|a| self.timers.deadline(&a.pin_id))
    }

    /// Drop a pin at `location` and open its capture workflow.
    ///
    /// An already-open capture is closed first, with its timer cancelled.
    pub fn drop_pin(&mut self, location: GpsPoint, now: DateTime<Utc>) -> Result<String> {
        if !location.is_valid() {
            return Err(TrackerError::NoLocationFix);
        }
        if self.active.is_some() {
            self.close(CaptureOutcome::Superseded);
        }

        let pin = PinRecord {
            id: uuid::Uuid::new_v4().to_string(),
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: now,
            name: String::new(),
            category: String::new(),
            notes: String::new(),
            photos: Vec::new(),
            details_pending: true,
        };
        let pin_id = pin.id.clone();
        self.pins.push(pin);
        self.persist();

        let generation = self.timers.arm(&pin_id, deadline(now, self.initial_window));
        self.active = Some(ActiveCapture {
            pin_id: pin_id.clone(),
            draft: PinDraft::default(),
            generation,
        });
        info!("[PinCapture] Dropped {} at {:?}", pin_id, location);
        Ok(pin_id)
    }

    /// Update a draft field and extend the window from now.
    pub fn edit_field(&mut self, field: PinField, value: &str, now: DateTime<Utc>) -> Result<()> {
        let active = self.active.as_mut().ok_or(TrackerError::NoActiveCapture)?;
        match field {
            PinField::Name => active.draft.name = value.to_string(),
            PinField::Category => active.draft.category = value.to_string(),
            PinField::Notes => active.draft.notes = value.to_string(),
        }
        active.generation = self
            .timers
            .arm(&active.pin_id, deadline(now, self.edit_window));
        debug!("[PinCapture] Edited {:?} on {}", field, active.pin_id);
        Ok(())
    }

    /// Commit the draft into the pin and register its category.
    pub fn save(&mut self, categories: &mut CategoryRegistry) -> Result<PinRecord> {
        let active = self.active.take().ok_or(TrackerError::NoActiveCapture)?;
        self.timers.cancel(&active.pin_id);

        let pin = self
            .pins
            .iter_mut()
            .find(|p| p.id == active.pin_id)
            .ok_or_pin_not_found(&active.pin_id)?;
        pin.name = active.draft.name;
        pin.category = active.draft.category;
        pin.notes = active.draft.notes;
        pin.details_pending = false;
        let saved = pin.clone();
        self.persist();

        if !saved.category.is_empty() {
            categories.add(&saved.category);
        }
        info!("[PinCapture] Saved details for {}", saved.id);
        Ok(saved)
    }

    /// Close the workflow without saving. The pin stays pending.
    pub fn skip(&mut self) -> Result<()> {
        if self.active.is_none() {
            return Err(TrackerError::NoActiveCapture);
        }
        self.close(CaptureOutcome::Skipped);
        Ok(())
    }

    /// Turn due timers into queued expiry events.
    pub fn due_expiries(&mut self, now: DateTime<Utc>) -> Vec<TrackerEvent> {
        self.timers
            .take_due(now)
            .into_iter()
            .map(|(pin_id, generation)| TrackerEvent::PinExpired { pin_id, generation })
            .collect()
    }

    /// Apply an expiry event. Ignored unless it belongs to the current arming
    /// of the open capture.
    pub fn on_expired(&mut self, pin_id: &str, generation: u64) -> Option<CaptureOutcome> {
        let current = self
            .active
            .as_ref()
            .is_some_and(|a| a.pin_id == pin_id && a.generation == generation);
        if !current {
            debug!("[PinCapture] Ignoring stale expiry for {} ({})", pin_id, generation);
            return None;
        }
        self.close(CaptureOutcome::Expired);
        Some(CaptureOutcome::Expired)
    }

    /// Remove every pin and the stored key.
    pub fn clear(&mut self) {
        self.active = None;
        self.timers.cancel_all();
        self.pins.clear();
        self.gateway.clear(StorageKey::Pins);
        info!("[PinCapture] Cleared all pins");
    }

    fn close(&mut self, outcome: CaptureOutcome) {
        if let Some(active) = self.active.take() {
            self.timers.cancel(&active.pin_id);
            info!("[PinCapture] Capture for {} closed: {:?}", active.pin_id, outcome);
        }
    }

    fn persist(&self) {
        self.gateway.save(StorageKey::Pins, &self.pins);
    }
}

fn deadline(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_add_signed(w))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
