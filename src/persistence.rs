//! # Persistence Gateway
//!
//! Write-through mirror of the in-memory collections (paths, pins, categories)
//! into a durable key-value store.
//!
//! ## Guarantees
//!
//! 1. **Redundant-write suppression**: `save` serializes the snapshot and skips
//!    the write when it is byte-identical to the last value accepted for the
//!    key. Location ticks that change nothing never touch flash.
//! 2. **Per-key ordering**: every write goes through one FIFO queue drained by
//!    a single writer thread, so a later `save` of a key can never be
//!    overtaken by an earlier one.
//! 3. **Self-healing loads**: a stored value that is malformed or fails the
//!    caller's structural predicate is cleared, and the caller gets an empty
//!    collection rather than partially-parsed data.
//!
//! A failed write is logged and evicted from the dedupe cache, so the next
//! save of the key (identical or not) is written again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::store::KeyValueStore;
use crate::{Result, TrackerError};

// ============================================================================
// Keys and validation
// ============================================================================

/// Durable store keys. Each holds a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Paths,
    Pins,
    Categories,
}

impl StorageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Paths => "paths",
            StorageKey::Pins => "pins",
            StorageKey::Categories => "categories",
        }
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every path record must carry a `points` array.
pub fn validate_paths(value: &Value) -> bool {
    value.as_array().is_some_and(|records| {
        records
            .iter()
            .all(|r| r.get("points").is_some_and(Value::is_array))
    })
}

/// Every pin must be an object with numeric coordinates.
pub fn validate_pins(value: &Value) -> bool {
    value.as_array().is_some_and(|pins| {
        pins.iter().all(|p| {
            p.get("latitude").is_some_and(Value::is_number)
                && p.get("longitude").is_some_and(Value::is_number)
        })
    })
}

pub fn validate_categories(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_string))
}

// ============================================================================
// Load results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing stored under the key.
    Absent,
    /// Stored value parsed and validated.
    Loaded,
    /// Stored value was corrupted; the key was cleared.
    Recovered,
    /// The store itself could not be read; the key was left untouched.
    Unreadable,
}

#[derive(Debug, Clone)]
pub struct LoadOutcome<T> {
    pub items: Vec<T>,
    pub status: LoadStatus,
}

impl<T> LoadOutcome<T> {
    fn empty(status: LoadStatus) -> Self {
        Self {
            items: Vec::new(),
            status,
        }
    }
}

/// Write and suppression counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayStats {
    pub writes_queued: u64,
    pub writes_suppressed: u64,
    pub writes_failed: u64,
}

// ============================================================================
// Gateway
// ============================================================================

enum WriteOp {
    Put { key: StorageKey, value: String },
    Remove { key: StorageKey },
    Flush(mpsc::Sender<()>),
}

type SharedStore = Arc<Mutex<Box<dyn KeyValueStore>>>;
type AcceptedValues = Arc<Mutex<HashMap<StorageKey, String>>>;

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

struct GatewayInner {
    store: SharedStore,
    accepted: AcceptedValues,
    counters: Arc<Counters>,
    sender: Mutex<Option<mpsc::Sender<WriteOp>>>,
    writer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        // Closing the channel lets the writer drain what is queued and exit.
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Ok(mut writer) = self.writer.lock() {
            if let Some(handle) = writer.take() {
                if handle.join().is_err() {
                    error!("[Persistence] Writer thread panicked");
                }
            }
        }
    }
}

/// Cheap, cloneable handle to the persistence gateway.
///
/// The gateway never owns collection data; owners hand it snapshots.
#[derive(Clone)]
pub struct PersistenceGateway {
    inner: Arc<GatewayInner>,
}

impl PersistenceGateway {
    /// Start a gateway over the given store. Spawns the writer thread.
    pub fn new(store: Box<dyn KeyValueStore>) -> Result<Self> {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let accepted: AcceptedValues = Arc::new(Mutex::new(HashMap::new()));
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel::<WriteOp>();

        let writer = {
            let store = Arc::clone(&store);
            let accepted = Arc::clone(&accepted);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("path-tracker-writer".to_string())
                .spawn(move || run_writer(rx, store, accepted, counters))
                .map_err(|e| TrackerError::Internal {
                    message: format!("failed to spawn writer thread: {}", e),
                })?
        };

        Ok(Self {
            inner: Arc::new(GatewayInner {
                store,
                accepted,
                counters,
                sender: Mutex::new(Some(tx)),
                writer: Mutex::new(Some(writer)),
            }),
        })
    }

    /// Serialize and queue a snapshot for `key`.
    ///
    /// Returns `true` if a write was queued, `false` if it was suppressed as
    /// identical to the last accepted value (or could not be serialized).
    pub fn save<T: Serialize + ?Sized>(&self, key: StorageKey, snapshot: &T) -> bool {
        let value = match serde_json::to_string(snapshot) {
            Ok(v) => v,
            Err(e) => {
                error!("[Persistence] Failed to serialize '{}': {}", key, e);
                return false;
            }
        };

        let mut accepted = match self.inner.accepted.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("[Persistence] Dedupe cache poisoned, dropping '{}' write", key);
                return false;
            }
        };

        if accepted.get(&key) == Some(&value) {
            self.inner.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!("[Persistence] Skipping unchanged '{}'", key);
            return false;
        }

        accepted.insert(key, value.clone());
        // Enqueue while holding the cache lock so cache order matches queue order.
        let queued = self.enqueue(WriteOp::Put { key, value });
        if queued {
            self.inner.counters.queued.fetch_add(1, Ordering::Relaxed);
        } else {
            accepted.remove(&key);
        }
        queued
    }

    /// Remove `key` from the durable store.
    pub fn clear(&self, key: StorageKey) {
        if let Ok(mut accepted) = self.inner.accepted.lock() {
            accepted.remove(&key);
            self.enqueue(WriteOp::Remove { key });
        }
    }

    /// Load a collection stored under `key`.
    ///
    /// `validate` is a structural predicate over the raw JSON. Anything that
    /// fails to parse, fails the predicate, or fails to decode as `Vec<T>` is
    /// treated as corrupted: the key is cleared and an empty collection is
    /// returned.
    pub fn load<T: DeserializeOwned>(
        &self,
        key: StorageKey,
        validate: fn(&Value) -> bool,
    ) -> LoadOutcome<T> {
        // Anything still queued must land before we read.
        self.flush();

        let raw = match self.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return LoadOutcome::empty(LoadStatus::Absent),
            Err(e) => {
                error!("[Persistence] {}", e);
                return LoadOutcome::empty(LoadStatus::Unreadable);
            }
        };

        match decode::<T>(key, &raw, validate) {
            Ok(items) => {
                if let Ok(mut accepted) = self.inner.accepted.lock() {
                    accepted.insert(key, raw);
                }
                info!("[Persistence] Loaded {} '{}' entries", items.len(), key);
                LoadOutcome {
                    items,
                    status: LoadStatus::Loaded,
                }
            }
            Err(e) => {
                warn!("[Persistence] {} - resetting", e);
                self.clear(key);
                LoadOutcome::empty(LoadStatus::Recovered)
            }
        }
    }

    /// Block until every queued write has been applied.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.enqueue(WriteOp::Flush(tx)) {
            let _ = rx.recv();
        }
    }

    pub fn stats(&self) -> GatewayStats {
        let counters = &self.inner.counters;
        GatewayStats {
            writes_queued: counters.queued.load(Ordering::Relaxed),
            writes_suppressed: counters.suppressed.load(Ordering::Relaxed),
            writes_failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Raw stored value for `key`. Store failures come back as
    /// [`TrackerError::StorageReadFailed`].
    fn read(&self, key: StorageKey) -> Result<Option<String>> {
        let result = match self.inner.store.lock() {
            Ok(store) => store.get(key.as_str()),
            Err(_) => Err(TrackerError::Internal {
                message: "store lock poisoned".to_string(),
            }),
        };
        result.map_err(|e| TrackerError::StorageReadFailed {
            key: key.as_str().to_string(),
            message: e.to_string(),
        })
    }

    fn enqueue(&self, op: WriteOp) -> bool {
        let sender = match self.inner.sender.lock() {
            Ok(sender) => sender,
            Err(_) => return false,
        };
        match sender.as_ref() {
            Some(tx) => tx.send(op).is_ok(),
            None => false,
        }
    }
}

fn decode<T: DeserializeOwned>(
    key: StorageKey,
    raw: &str,
    validate: fn(&Value) -> bool,
) -> Result<Vec<T>> {
    let corrupted = |message: String| TrackerError::StorageCorrupted {
        key: key.as_str().to_string(),
        message,
    };

    let value: Value = serde_json::from_str(raw).map_err(|e| corrupted(e.to_string()))?;
    if !validate(&value) {
        return Err(corrupted("failed structural validation".to_string()));
    }
    serde_json::from_value(value).map_err(|e| corrupted(e.to_string()))
}

fn run_writer(
    rx: mpsc::Receiver<WriteOp>,
    store: SharedStore,
    accepted: AcceptedValues,
    counters: Arc<Counters>,
) {
    for op in rx {
        match op {
            WriteOp::Put { key, value } => {
                let result = match store.lock() {
                    Ok(mut store) => store.set(key.as_str(), &value),
                    Err(_) => Err(TrackerError::Internal {
                        message: "store lock poisoned".to_string(),
                    }),
                };
                if let Err(e) = result {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("[Persistence] Error saving '{}': {}", key, e);
                    // Let the next save of this value through again.
                    if let Ok(mut accepted) = accepted.lock() {
                        if accepted.get(&key) == Some(&value) {
                            accepted.remove(&key);
                        }
                    }
                }
            }
            WriteOp::Remove { key } => {
                let result = match store.lock() {
                    Ok(mut store) => store.remove(key.as_str()),
                    Err(_) => Err(TrackerError::Internal {
                        message: "store lock poisoned".to_string(),
                    }),
                };
                if let Err(e) = result {
                    error!("[Persistence] Error clearing '{}': {}", key, e);
                }
            }
            WriteOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("[Persistence] Writer stopped");
}
