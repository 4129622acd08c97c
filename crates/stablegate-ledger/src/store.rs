//! Durable stores for daily usage, ledger balances and reservations.
//!
//! Two traits split the persistence surface:
//!
//! - [`DailyUsageStore`]: the single daily-cap bucket
//! - [`LedgerStore`]: per-asset ledger balances and outstanding
//!   reservations
//!
//! Both are implemented by [`MemoryStore`] (tests, single process) and
//! [`JsonFileStore`] (one JSON document on disk). Writes are synchronous;
//! the engine calls them while holding its state lock and commits in
//! memory only after they return `Ok`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stablegate_types::{
    DailyUsage, LedgerBalanceRecord, QuoteId, ReservationRecord, Result, StableGateError,
};

/// Persists the daily-cap bucket.
///
/// Implementations shared between processes must make each write atomic.
pub trait DailyUsageStore: Send + Sync {
    fn save_daily_usage(&self, usage: &DailyUsage) -> Result<()>;
    fn latest_daily_usage(&self) -> Result<Option<DailyUsage>>;
}

/// Persists ledger balances and outstanding reservations.
pub trait LedgerStore: Send + Sync {
    fn save_ledger_balance(&self, record: &LedgerBalanceRecord) -> Result<()>;
    fn load_ledger_balances(&self) -> Result<Vec<LedgerBalanceRecord>>;
    fn save_reservation(&self, record: &ReservationRecord) -> Result<()>;
    fn load_reservations(&self) -> Result<Vec<ReservationRecord>>;
    /// Deleting an absent reservation is not an error.
    fn delete_reservation(&self, id: &QuoteId) -> Result<()>;
}

/// Everything a store holds, in one serialisable document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    daily_usage: Option<DailyUsage>,
    #[serde(default)]
    ledger: BTreeMap<String, LedgerBalanceRecord>,
    #[serde(default)]
    reservations: BTreeMap<String, ReservationRecord>,
}

impl StoreDocument {
    fn put_balance(&mut self, record: &LedgerBalanceRecord) {
        self.ledger.insert(record.asset.clone(), record.clone());
    }

    fn put_reservation(&mut self, record: &ReservationRecord) {
        self.reservations
            .insert(record.id.as_str().to_string(), record.clone());
    }

    fn remove_reservation(&mut self, id: &QuoteId) {
        self.reservations.remove(id.as_str());
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store. Wrap in `Arc` to share one instance between engines
/// and simulate a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
    failing_writes: AtomicUsize,
    skipped_writes: AtomicUsize,
    failing_loads: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` write calls fail with `Persistence`.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes_after(0, n);
    }

    /// Let `skip` write calls through, then fail the following `n`.
    pub fn fail_writes_after(&self, skip: usize, n: usize) {
        self.skipped_writes.store(skip, Ordering::SeqCst);
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make every load call fail until switched off.
    pub fn fail_loads(&self, on: bool) {
        self.failing_loads.store(on, Ordering::SeqCst);
    }

    /// Successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reservation_record(&self, id: &QuoteId) -> Option<ReservationRecord> {
        self.doc.lock().reservations.get(id.as_str()).cloned()
    }

    #[must_use]
    pub fn ledger_record(&self, asset: &str) -> Option<LedgerBalanceRecord> {
        self.doc.lock().ledger.get(asset).cloned()
    }

    fn write(&self, op: &str, f: impl FnOnce(&mut StoreDocument)) -> Result<()> {
        let armed = self.failing_writes.load(Ordering::SeqCst) > 0;
        let skipped = armed && countdown(&self.skipped_writes);
        let injected = armed && !skipped && countdown(&self.failing_writes);
        if injected {
            return Err(StableGateError::Persistence(format!(
                "{op}: injected write failure"
            )));
        }
        f(&mut self.doc.lock());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read<T>(&self, op: &str, f: impl FnOnce(&StoreDocument) -> T) -> Result<T> {
        if self.failing_loads.load(Ordering::SeqCst) {
            return Err(StableGateError::Persistence(format!(
                "{op}: injected load failure"
            )));
        }
        Ok(f(&self.doc.lock()))
    }
}

/// Decrement `counter` if it is above zero.
fn countdown(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl DailyUsageStore for MemoryStore {
    fn save_daily_usage(&self, usage: &DailyUsage) -> Result<()> {
        self.write("save_daily_usage", |doc| doc.daily_usage = Some(*usage))
    }

    fn latest_daily_usage(&self) -> Result<Option<DailyUsage>> {
        self.read("latest_daily_usage", |doc| doc.daily_usage)
    }
}

impl LedgerStore for MemoryStore {
    fn save_ledger_balance(&self, record: &LedgerBalanceRecord) -> Result<()> {
        self.write("save_ledger_balance", |doc| doc.put_balance(record))
    }

    fn load_ledger_balances(&self) -> Result<Vec<LedgerBalanceRecord>> {
        self.read("load_ledger_balances", |doc| {
            doc.ledger.values().cloned().collect()
        })
    }

    fn save_reservation(&self, record: &ReservationRecord) -> Result<()> {
        self.write("save_reservation", |doc| doc.put_reservation(record))
    }

    fn load_reservations(&self) -> Result<Vec<ReservationRecord>> {
        self.read("load_reservations", |doc| {
            doc.reservations.values().cloned().collect()
        })
    }

    fn delete_reservation(&self, id: &QuoteId) -> Result<()> {
        self.write("delete_reservation", |doc| doc.remove_reservation(id))
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// Single JSON document on disk.
///
/// Every write serialises the whole document to a sibling `.tmp` file,
/// syncs it and renames it over the target. The in-memory copy is updated
/// only after the rename succeeds.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating an empty document if the file
    /// does not exist.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Serialization` if it is not a
    /// valid store document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => StoreDocument::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StableGateError::Serialization(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(StableGateError::Io(format!("{}: {e}", path.display()))),
        };
        tracing::debug!(path = %path.display(), reservations = doc.reservations.len(),
            "opened json store");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, f: impl FnOnce(&mut StoreDocument)) -> Result<()> {
        let mut guard = self.doc.lock();
        let mut next = guard.clone();
        f(&mut next);
        let bytes = serde_json::to_vec_pretty(&next)?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| StableGateError::Persistence(format!("{}: {e}", self.path.display())))?;
        *guard = next;
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

impl DailyUsageStore for JsonFileStore {
    fn save_daily_usage(&self, usage: &DailyUsage) -> Result<()> {
        self.write(|doc| doc.daily_usage = Some(*usage))
    }

    fn latest_daily_usage(&self) -> Result<Option<DailyUsage>> {
        Ok(self.doc.lock().daily_usage)
    }
}

impl LedgerStore for JsonFileStore {
    fn save_ledger_balance(&self, record: &LedgerBalanceRecord) -> Result<()> {
        self.write(|doc| doc.put_balance(record))
    }

    fn load_ledger_balances(&self) -> Result<Vec<LedgerBalanceRecord>> {
        Ok(self.doc.lock().ledger.values().cloned().collect())
    }

    fn save_reservation(&self, record: &ReservationRecord) -> Result<()> {
        self.write(|doc| doc.put_reservation(record))
    }

    fn load_reservations(&self) -> Result<Vec<ReservationRecord>> {
        Ok(self.doc.lock().reservations.values().cloned().collect())
    }

    fn delete_reservation(&self, id: &QuoteId) -> Result<()> {
        self.write(|doc| doc.remove_reservation(id))
    }
}
