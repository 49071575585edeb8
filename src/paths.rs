//! # Path Store
//!
//! Owns the ordered collection of recorded paths.
//!
//! Every mutation produces a new immutable [`PathSnapshot`] version. Records
//! are shared between versions through `Arc`, and a record is copied only when
//! it changes, so a reader holding an older snapshot never observes a
//! half-applied update. Each committed version is handed to the persistence
//! gateway.

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};

use crate::geo_utils::incremental_distance;
use crate::persistence::{validate_paths, LoadStatus, PersistenceGateway, StorageKey};
use crate::session::SessionContext;
use crate::{GpsPoint, OptionExt, Result, TrackerError};

// ============================================================================
// Records
// ============================================================================

/// A recorded GPS path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    /// Globally unique, immutable after creation
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub started_at: DateTime<Utc>,
    /// Absent while the path is open
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
    /// Running distance in miles
    #[serde(default)]
    pub distance: f64,
    /// Append-only, insertion ordered
    pub points: Vec<GpsPoint>,
    #[serde(default, deserialize_with = "lenient_note")]
    pub note: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl PathRecord {
    fn new(name: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            started_at,
            stopped_at: None,
            distance: 0.0,
            points: Vec::new(),
            note: String::new(),
            visible: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn last_point(&self) -> Option<&GpsPoint> {
        self.points.last()
    }
}

fn default_visible() -> bool {
    true
}

/// Older payloads stored `note` as a boolean placeholder.
fn lenient_note<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        _ => String::new(),
    })
}

/// Display row for the saved-paths list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSummary {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub point_count: usize,
    /// Distance rounded to two decimals, e.g. "0.14 miles"
    pub distance_label: String,
    pub note: Option<String>,
    pub visible: bool,
}

// ============================================================================
// Snapshots
// ============================================================================

/// Immutable version of the path collection.
#[derive(Debug, Clone, Default)]
pub struct PathSnapshot {
    version: u64,
    records: Arc<Vec<Arc<PathRecord>>>,
}

impl PathSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &str) -> Option<&PathRecord> {
        self.records.iter().find(|r| r.id == id).map(|r| r.as_ref())
    }

    /// The record currently receiving points, if any.
    pub fn open_record(&self) -> Option<&PathRecord> {
        self.records.iter().find(|r| r.is_open()).map(|r| r.as_ref())
    }

    pub fn summaries(&self) -> Vec<PathSummary> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| PathSummary {
                id: r.id.clone(),
                name: if r.name.is_empty() {
                    format!("Path {}", i + 1)
                } else {
                    r.name.clone()
                },
                started_at: r.started_at,
                point_count: r.points.len(),
                distance_label: format!("{:.2} miles", r.distance),
                note: (!r.note.is_empty()).then(|| r.note.clone()),
                visible: r.visible,
            })
            .collect()
    }

    /// Plain records, in order, for serialization.
    fn plain(&self) -> Vec<&PathRecord> {
        self.records.iter().map(|r| r.as_ref()).collect()
    }
}

impl Deref for PathSnapshot {
    type Target = [Arc<PathRecord>];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

// ============================================================================
// Store
// ============================================================================

/// Exclusive owner of the path records.
pub struct PathStore {
    current: PathSnapshot,
    gateway: PersistenceGateway,
}

impl PathStore {
    pub fn new(gateway: PersistenceGateway) -> Self {
        Self {
            current: PathSnapshot::default(),
            gateway,
        }
    }

    /// Load stored paths, replacing the in-memory collection.
    ///
    /// Records left open by a previous run (the app was killed mid-track) are
    /// closed at `now` so that at most one record is ever open.
    pub fn hydrate(&mut self, now: DateTime<Utc>) -> LoadStatus {
        let outcome = self
            .gateway
            .load::<PathRecord>(StorageKey::Paths, validate_paths);

        let mut orphaned = 0;
        let records: Vec<Arc<PathRecord>> = outcome
            .items
            .into_iter()
            .map(|mut record| {
                if record.is_open() {
                    record.stopped_at = Some(now);
                    orphaned += 1;
                }
                Arc::new(record)
            })
            .collect();

        if orphaned > 0 {
            warn!("[PathStore] Closed {} path(s) left open by a previous run", orphaned);
            self.commit(records);
        } else {
            self.current = PathSnapshot {
                version: self.current.version + 1,
                records: Arc::new(records),
            };
        }

        info!("[PathStore] Hydrated {} paths ({:?})", self.current.len(), outcome.status);
        outcome.status
    }

    /// Current snapshot (read-only view).
    pub fn list(&self) -> PathSnapshot {
        self.current.clone()
    }

    /// Create a new open record named `Path N`. Fails if a record is already open.
    pub fn open(&mut self, now: DateTime<Utc>) -> Result<(String, PathSnapshot)> {
        if let Some(open) = self.current.open_record() {
            return Err(TrackerError::Internal {
                message: format!("path '{}' is already open", open.id),
            });
        }

        let record = PathRecord::new(format!("Path {}", self.current.len() + 1), now);
        let id = record.id.clone();
        info!("[PathStore] Opened '{}' ({})", record.name, id);

        let mut records = self.current.records.as_ref().clone();
        records.push(Arc::new(record));
        Ok((id, self.commit(records)))
    }

    /// Append a point to an open record and add the incremental Haversine
    /// distance from its previous point.
    pub fn append(&mut self, id: &str, point: GpsPoint) -> Result<PathSnapshot> {
        self.update(id, |record| {
            if !record.is_open() {
                return Err(TrackerError::NoOpenSession);
            }
            let added = incremental_distance(record.last_point(), &point);
            record.points.push(point);
            record.distance += added;
            debug!(
                "[PathStore] {} +{:.5} mi -> {:.5} mi ({} points)",
                record.id,
                added,
                record.distance,
                record.points.len()
            );
            Ok(())
        })
        .map_err(|e| match e {
            TrackerError::PathNotFound { .. } => TrackerError::NoOpenSession,
            other => other,
        })
    }

    /// Set `stoppedAt` on an open record.
    pub fn close(&mut self, id: &str, now: DateTime<Utc>) -> Result<PathSnapshot> {
        self.update(id, |record| {
            if !record.is_open() {
                return Err(TrackerError::Internal {
                    message: format!("path '{}' is already closed", record.id),
                });
            }
            record.stopped_at = Some(now);
            info!(
                "[PathStore] Closed {} with {} points, {:.2} mi",
                record.id,
                record.points.len(),
                record.distance
            );
            Ok(())
        })
    }

    pub fn rename(&mut self, id: &str, name: &str, note: &str) -> Result<PathSnapshot> {
        self.update(id, |record| {
            record.name = name.to_string();
            record.note = note.to_string();
            Ok(())
        })
    }

    pub fn toggle_visibility(&mut self, id: &str) -> Result<PathSnapshot> {
        self.update(id, |record| {
            record.visible = !record.visible;
            Ok(())
        })
    }

    /// Mark every record visible.
    pub fn show_all(&mut self) -> PathSnapshot {
        let records = self
            .current
            .records
            .iter()
            .map(|r| {
                if r.visible {
                    Arc::clone(r)
                } else {
                    Arc::new(PathRecord {
                        visible: true,
                        ..r.as_ref().clone()
                    })
                }
            })
            .collect();
        self.commit(records)
    }

    /// Remove a record. The record being recorded can only be removed once
    /// the session has stopped.
    pub fn delete(&mut self, id: &str, session: &SessionContext) -> Result<PathSnapshot> {
        if session.is_recording(id) {
            return Err(TrackerError::OpenPathDeletion { id: id.to_string() });
        }
        self.current.get(id).ok_or_path_not_found(id)?;

        let records = self
            .current
            .records
            .iter()
            .filter(|r| r.id != id)
            .cloned()
            .collect();
        info!("[PathStore] Deleted {}", id);
        Ok(self.commit(records))
    }

    /// Drop every record and the stored key.
    pub fn clear(&mut self, session: &SessionContext) -> Result<PathSnapshot> {
        if let Some(open) = session.open_path_id() {
            return Err(TrackerError::OpenPathDeletion { id: open.to_string() });
        }
        self.current = PathSnapshot {
            version: self.current.version + 1,
            records: Arc::new(Vec::new()),
        };
        self.gateway.clear(StorageKey::Paths);
        info!("[PathStore] Cleared all paths");
        Ok(self.current.clone())
    }

    /// Copy-on-write update of one record.
    fn update<F>(&mut self, id: &str, f: F) -> Result<PathSnapshot>
    where
        F: FnOnce(&mut PathRecord) -> Result<()>,
    {
        let index = self
            .current
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_path_not_found(id)?;

        let mut records = self.current.records.as_ref().clone();
        // The previous snapshot still holds this Arc, so make_mut copies.
        f(Arc::make_mut(&mut records[index]))?;
        Ok(self.commit(records))
    }

    fn commit(&mut self, records: Vec<Arc<PathRecord>>) -> PathSnapshot {
        self.current = PathSnapshot {
            version: self.current.version + 1,
            records: Arc::new(records),
        };
        self.gateway.save(StorageKey::Paths, &self.current.plain());
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::path_distance;
    use crate::store::MemoryStore;

    fn store() -> (PathStore, MemoryStore, PersistenceGateway) {
        let memory = MemoryStore::new();
        let gateway = PersistenceGateway::new(Box::new(memory.clone())).unwrap();
        (PathStore::new(gateway.clone()), memory, gateway)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn test_open_names_sequentially() {
        let (mut paths, _, _) = store();
        let (first, _) = paths.open(t0()).unwrap();
        paths.close(&first, t0()).unwrap();
        let (second, snapshot) = paths.open(t0()).unwrap();

        assert_eq!(snapshot.get(&first).unwrap().name, "Path 1");
        assert_eq!(snapshot.get(&second).unwrap().name, "Path 2");
        assert_ne!(first, second);
    }

    #[test]
    fn test_only_one_open_record() {
        let (mut paths, _, _) = store();
        paths.open(t0()).unwrap();
        assert!(paths.open(t0()).is_err());
    }

    #[test]
    fn test_distance_is_running_sum() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();

        let mut previous = 0.0;
        for i in 0..20 {
            let point = GpsPoint::new(40.0 + i as f64 * 0.0007, -105.0 + (i % 3) as f64 * 0.0004);
            let snapshot = paths.append(&id, point).unwrap();
            let record = snapshot.get(&id).unwrap();
            assert!(record.distance >= previous);
            previous = record.distance;
        }

        let record = paths.list().get(&id).unwrap().clone();
        assert_eq!(record.points.len(), 20);
        assert!((record.distance - path_distance(&record.points)).abs() < 1e-9);
    }

    #[test]
    fn test_first_point_adds_no_distance() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();
        let snapshot = paths.append(&id, GpsPoint::new(40.0, -105.0)).unwrap();
        assert_eq!(snapshot.get(&id).unwrap().distance, 0.0);
    }

    #[test]
    fn test_append_to_closed_or_missing_record() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();
        paths.close(&id, t0()).unwrap();

        assert!(matches!(
            paths.append(&id, GpsPoint::new(40.0, -105.0)),
            Err(TrackerError::NoOpenSession)
        ));
        assert!(matches!(
            paths.append("missing", GpsPoint::new(40.0, -105.0)),
            Err(TrackerError::NoOpenSession)
        ));
    }

    #[test]
    fn test_old_snapshot_is_not_mutated() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();
        let before = paths.append(&id, GpsPoint::new(40.0, -105.0)).unwrap();

        let after = paths.append(&id, GpsPoint::new(40.001, -105.0)).unwrap();

        assert_eq!(before.get(&id).unwrap().points.len(), 1);
        assert_eq!(after.get(&id).unwrap().points.len(), 2);
        assert!(after.version() > before.version());
    }

    #[test]
    fn test_unchanged_records_are_shared() {
        let (mut paths, _, _) = store();
        let (a, _) = paths.open(t0()).unwrap();
        paths.close(&a, t0()).unwrap();
        let (b, before) = paths.open(t0()).unwrap();

        let after = paths.append(&b, GpsPoint::new(40.0, -105.0)).unwrap();
        assert!(Arc::ptr_eq(&before[0], &after[0]));
        assert!(!Arc::ptr_eq(&before[1], &after[1]));
    }

    #[test]
    fn test_rename_toggle_show_all() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();

        let snapshot = paths.rename(&id, "Morning loop", "windy").unwrap();
        let record = snapshot.get(&id).unwrap();
        assert_eq!(record.name, "Morning loop");
        assert_eq!(record.note, "windy");

        let snapshot = paths.toggle_visibility(&id).unwrap();
        assert!(!snapshot.get(&id).unwrap().visible);

        let snapshot = paths.show_all();
        assert!(snapshot.get(&id).unwrap().visible);

        assert!(matches!(
            paths.rename("nope", "x", ""),
            Err(TrackerError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_respects_recording_session() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();

        let recording = SessionContext::recording(&id);
        assert!(matches!(
            paths.delete(&id, &recording),
            Err(TrackerError::OpenPathDeletion { .. })
        ));

        paths.close(&id, t0()).unwrap();
        let snapshot = paths.delete(&id, &SessionContext::default()).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_mutations_are_persisted() {
        let (mut paths, memory, gateway) = store();
        let (id, _) = paths.open(t0()).unwrap();
        paths.append(&id, GpsPoint::new(40.0, -105.0)).unwrap();
        gateway.flush();

        let stored: Vec<PathRecord> =
            serde_json::from_str(&memory.raw("paths").unwrap()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].points, vec![GpsPoint::new(40.0, -105.0)]);
    }

    #[test]
    fn test_clear_removes_key() {
        let (mut paths, memory, gateway) = store();
        let (id, _) = paths.open(t0()).unwrap();
        paths.close(&id, t0()).unwrap();

        paths.clear(&SessionContext::default()).unwrap();
        gateway.flush();
        assert!(paths.list().is_empty());
        assert!(memory.raw("paths").is_none());
    }

    #[test]
    fn test_hydrate_closes_orphans_and_accepts_legacy_note() {
        let (mut paths, memory, gateway) = store();
        memory.seed(
            "paths",
            r#"[{"id":"1700000000000abcde","name":"Path 1","startedAt":"2024-05-01T12:00:00.000Z",
                "stoppedAt":null,"distance":0.5,"points":[{"latitude":40.0,"longitude":-105.0}],
                "note":true,"visible":true}]"#,
        );

        let now = t0();
        assert_eq!(paths.hydrate(now), LoadStatus::Loaded);
        let snapshot = paths.list();
        let record = snapshot.get("1700000000000abcde").unwrap();
        assert_eq!(record.stopped_at, Some(now));
        assert_eq!(record.note, "");
        assert!(snapshot.open_record().is_none());

        gateway.flush();
        assert_eq!(memory.write_count("paths"), 1);
    }

    #[test]
    fn test_hydrate_corrupted_yields_empty() {
        let (mut paths, memory, gateway) = store();
        memory.seed("paths", r#"[{"id":"x"}]"#);

        assert_eq!(paths.hydrate(t0()), LoadStatus::Recovered);
        gateway.flush();
        assert!(paths.list().is_empty());
        assert!(memory.raw("paths").is_none());
    }

    #[test]
    fn test_summaries() {
        let (mut paths, _, _) = store();
        let (id, _) = paths.open(t0()).unwrap();
        paths.append(&id, GpsPoint::new(40.0, -105.0)).unwrap();
        paths.append(&id, GpsPoint::new(40.001, -105.0)).unwrap();
        let snapshot = paths.rename(&id, "", "").unwrap();

        let summary = &snapshot.summaries()[0];
        assert_eq!(summary.name, "Path 1");
        assert_eq!(summary.point_count, 2);
        assert_eq!(summary.distance_label, "0.07 miles");
        assert!(summary.note.is_none());
    }
}
