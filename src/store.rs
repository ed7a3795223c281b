//! The license database.
//!
//! A [`Store`] holds every license and customer in memory and mirrors them to
//! a single JSON document:
//!
//! ```json
//! {
//!   "keys": [ ...LicenseRecord... ],
//!   "customers": [ ...CustomerRecord... ],
//!   "statistics": { "total_keys_generated": 0, ... },
//!   "created_at": "2025-01-01T00:00:00Z",
//!   "version": "1.0"
//! }
//! ```
//!
//! The whole document is rewritten after every mutating operation. Writes go
//! to a sibling temp file which is then renamed over the original, and an
//! exclusive `<path>.lock` file keeps a second process from opening the same
//! store. A mutating operation that fails leaves both the in-memory state and
//! the file untouched.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{get_config, LicenseStoreConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::generator::KeyGenerator;
use crate::license_key::normalize_license_key;
use crate::plans::Plan;
use crate::records::{normalize_email, timestamp, CustomerRecord, LicenseRecord, LicenseStatus};
use crate::statistics::StoredCounters;

/// On-disk shape of the license database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub keys: Vec<LicenseRecord>,
    #[serde(default)]
    pub customers: Vec<CustomerRecord>,
    #[serde(default)]
    pub statistics: StoredCounters,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub version: String,
}

impl StoreDocument {
    /// An empty document.
    pub fn new(version: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            keys: Vec::new(),
            customers: Vec::new(),
            statistics: StoredCounters::default(),
            created_at,
            version: version.into(),
        }
    }
}

/// Exclusive claim on a store file, released on drop.
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    fn acquire(store_path: &Path) -> LicenseResult<Self> {
        let path = lock_path(store_path);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Best effort; the pid only helps an operator clear a stale lock.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(LicenseError::StoreLocked(path)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove store lock");
        }
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> LicenseResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| LicenseError::SerializationError(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        LicenseError::StorageError(e)
    })
}

/// In-memory license database, optionally backed by a file.
#[derive(Debug)]
pub struct Store {
    pub(crate) doc: StoreDocument,
    key_index: HashMap<String, usize>,
    email_index: HashMap<String, usize>,
    pub(crate) generator: KeyGenerator,
    path: Option<PathBuf>,
    _lock: Option<StoreLock>,
}

impl Store {
    /// Open (or create) the store at `path`, taking the single-writer lock.
    ///
    /// A missing file yields an empty store which is written immediately.
    /// An unparseable file fails with [`LicenseError::CorruptStore`].
    pub fn open(path: impl AsRef<Path>, config: &LicenseStoreConfig) -> LicenseResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let lock = StoreLock::acquire(&path)?;

        let (doc, fresh) = match fs::read_to_string(&path) {
            Ok(raw) => (parse_document(&raw)?, false),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                (StoreDocument::new(config.store.version.clone(), Utc::now()), true)
            }
            Err(e) => return Err(e.into()),
        };

        let mut store = Self::build(doc, config)?;
        store.path = Some(path);
        store._lock = Some(lock);

        if fresh {
            store.persist()?;
            tracing::info!(path = %store.display_path(), "created new license store");
        } else {
            store.report_counter_drift();
            tracing::debug!(
                path = %store.display_path(),
                keys = store.doc.keys.len(),
                customers = store.doc.customers.len(),
                "loaded license store"
            );
        }

        Ok(store)
    }

    /// Open the store configured by `config.toml` / `LICSTORE_*`.
    pub fn open_default() -> LicenseResult<Self> {
        let config = get_config()?;
        Self::open(config.store.resolved_path()?, config)
    }

    /// A store with no backing file. Mutations never touch the disk.
    pub fn in_memory(config: &LicenseStoreConfig) -> Self {
        let doc = StoreDocument::new(config.store.version.clone(), Utc::now());
        Self {
            doc,
            key_index: HashMap::new(),
            email_index: HashMap::new(),
            generator: KeyGenerator::from_config(&config.license),
            path: None,
            _lock: None,
        }
    }

    /// Wrap an already parsed document without a backing file.
    pub fn from_document(doc: StoreDocument, config: &LicenseStoreConfig) -> LicenseResult<Self> {
        Self::build(doc, config)
    }

    fn build(mut doc: StoreDocument, config: &LicenseStoreConfig) -> LicenseResult<Self> {
        backfill_owners(&mut doc);
        let mut store = Self {
            doc,
            key_index: HashMap::new(),
            email_index: HashMap::new(),
            generator: KeyGenerator::from_config(&config.license),
            path: None,
            _lock: None,
        };
        store.index()?;
        Ok(store)
    }

    /// Rebuild the lookup indexes, rejecting duplicate keys or emails.
    fn index(&mut self) -> LicenseResult<()> {
        self.key_index.clear();
        self.email_index.clear();

        for (i, record) in self.doc.keys.iter().enumerate() {
            if self.key_index.insert(record.key.clone(), i).is_some() {
                return Err(LicenseError::CorruptStore(format!(
                    "duplicate license key {}",
                    record.key
                )));
            }
        }
        for (i, customer) in self.doc.customers.iter().enumerate() {
            if self.email_index.insert(customer.email.clone(), i).is_some() {
                return Err(LicenseError::CorruptStore(format!(
                    "duplicate customer {}",
                    customer.email
                )));
            }
        }
        Ok(())
    }

    /// Run `op` and persist the result as one unit.
    ///
    /// Operations validate before they mutate, so an `op` error leaves the
    /// in-memory state untouched; a persist error rolls back to the snapshot.
    pub(crate) fn commit<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> LicenseResult<T>,
    ) -> LicenseResult<T> {
        let snapshot = self.path.as_ref().map(|_| self.doc.clone());

        let result = op(self).and_then(|value| {
            self.persist()?;
            Ok(value)
        });

        if result.is_err() {
            if let Some(doc) = snapshot {
                self.doc = doc;
                if let Err(e) = self.index() {
                    tracing::error!(error = %e, "failed to rebuild indexes after rollback");
                }
            }
        }
        result
    }

    /// Write the document to the backing file, if any.
    pub fn persist(&mut self) -> LicenseResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        self.doc.statistics = StoredCounters::recount(&self.doc.keys);
        write_json_atomic(path, &self.doc)
    }

    fn report_counter_drift(&self) {
        let recounted = StoredCounters::recount(&self.doc.keys);
        if recounted != self.doc.statistics {
            tracing::debug!(
                stored_total = self.doc.statistics.total_keys_generated,
                actual_total = recounted.total_keys_generated,
                "stored statistics drifted from records; they will be recounted on next write"
            );
        }
    }

    fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    pub(crate) fn insert_license(&mut self, record: LicenseRecord) {
        self.key_index.insert(record.key.clone(), self.doc.keys.len());
        self.doc.keys.push(record);
    }

    pub(crate) fn insert_customer(&mut self, customer: CustomerRecord) -> usize {
        let idx = self.doc.customers.len();
        self.email_index.insert(customer.email.clone(), idx);
        self.doc.customers.push(customer);
        idx
    }

    /// Normalize a user-supplied key with this store's key format.
    pub fn normalize_key(&self, key: &str) -> String {
        normalize_license_key(key, self.generator.key_config())
    }

    pub(crate) fn license_index(&self, key: &str) -> LicenseResult<usize> {
        let key = self.normalize_key(key);
        self.key_index
            .get(&key)
            .copied()
            .ok_or(LicenseError::KeyNotFound(key))
    }

    pub(crate) fn customer_index(&self, email: &str) -> Option<usize> {
        self.email_index.get(email).copied()
    }

    pub(crate) fn owner_index(&self, license_idx: usize) -> Option<usize> {
        self.doc.keys[license_idx]
            .customer_email
            .as_deref()
            .and_then(|email| self.customer_index(email))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.key_index.contains_key(key)
    }

    /// Look up a license by key (normalized first).
    pub fn get_license(&self, key: &str) -> Option<&LicenseRecord> {
        self.license_index(key).ok().map(|i| &self.doc.keys[i])
    }

    /// Like [`Store::get_license`] but reports a missing key as an error.
    pub fn license(&self, key: &str) -> LicenseResult<&LicenseRecord> {
        self.license_index(key).map(|i| &self.doc.keys[i])
    }

    /// All licenses in creation order.
    pub fn licenses(&self) -> &[LicenseRecord] {
        &self.doc.keys
    }

    /// All customers in creation order.
    pub fn customers(&self) -> &[CustomerRecord] {
        &self.doc.customers
    }

    pub fn keys_by_plan(&self, plan: Plan) -> Vec<&LicenseRecord> {
        self.doc.keys.iter().filter(|r| r.plan == plan).collect()
    }

    pub fn keys_by_status(&self, status: LicenseStatus) -> Vec<&LicenseRecord> {
        self.doc.keys.iter().filter(|r| r.status == status).collect()
    }

    pub fn len(&self) -> usize {
        self.doc.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.keys.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.doc.created_at
    }

    pub fn version(&self) -> &str {
        &self.doc.version
    }

    pub fn document(&self) -> &StoreDocument {
        &self.doc
    }

    /// Write a single license in the format read by the client validator.
    pub fn export_license(&self, key: &str, path: impl AsRef<Path>) -> LicenseResult<()> {
        let record = self.license(key)?;
        write_json_atomic(path.as_ref(), record)?;
        tracing::info!(key = %record.key, path = %path.as_ref().display(), "exported license file");
        Ok(())
    }

    /// A copy suitable for shipping with the application: only keys that were
    /// never sold or bound, no customers, counters recounted.
    pub fn clean_copy(&self) -> StoreDocument {
        let keys: Vec<LicenseRecord> = self
            .doc
            .keys
            .iter()
            .filter(|r| {
                r.status == LicenseStatus::Generated
                    && r.hardware_ids.is_empty()
                    && r.customer_email.is_none()
            })
            .cloned()
            .map(|mut r| {
                r.activation_count = 0;
                r.assigned_at = None;
                r.activated_at = None;
                r
            })
            .collect();

        StoreDocument {
            statistics: StoredCounters::recount(&keys),
            keys,
            customers: Vec::new(),
            created_at: self.doc.created_at,
            version: self.doc.version.clone(),
        }
    }

    /// Write [`Store::clean_copy`] to `path`.
    pub fn write_clean_copy(&self, path: impl AsRef<Path>) -> LicenseResult<usize> {
        let clean = self.clean_copy();
        write_json_atomic(path.as_ref(), &clean)?;
        tracing::info!(
            path = %path.as_ref().display(),
            keys = clean.keys.len(),
            "wrote clean store copy"
        );
        Ok(clean.keys.len())
    }
}

fn parse_document(raw: &str) -> LicenseResult<StoreDocument> {
    let mut doc: StoreDocument =
        serde_json::from_str(raw).map_err(|e| LicenseError::CorruptStore(e.to_string()))?;

    for customer in &mut doc.customers {
        customer.email = normalize_email(&customer.email)
            .map_err(|_| LicenseError::CorruptStore(format!("invalid customer email {}", customer.email)))?;
    }
    Ok(doc)
}

/// Files written by older tools track ownership only on the customer side.
fn backfill_owners(doc: &mut StoreDocument) {
    let owners: HashMap<&str, &str> = doc
        .customers
        .iter()
        .flat_map(|c| c.keys_purchased.iter().map(move |k| (k.as_str(), c.email.as_str())))
        .collect();
    if owners.is_empty() {
        return;
    }

    let fills: Vec<(usize, String)> = doc
        .keys
        .iter()
        .enumerate()
        .filter(|(_, r)| r.customer_email.is_none())
        .filter_map(|(i, r)| owners.get(r.key.as_str()).map(|e| (i, e.to_string())))
        .collect();

    for (i, email) in fills {
        doc.keys[i].customer_email = Some(email);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::PlanOverrides;
    use tempfile::TempDir;

    fn config() -> LicenseStoreConfig {
        LicenseStoreConfig::default()
    }

    #[test]
    fn open_creates_initial_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        {
            let store = Store::open(&path, &config()).unwrap();
            assert!(store.is_empty());
            assert_eq!(store.version(), "1.0");
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(json["keys"].as_array().unwrap().is_empty());
        assert!(json["customers"].as_array().unwrap().is_empty());
        assert_eq!(json["statistics"]["total_keys_generated"], 0);
        assert_eq!(json["version"], "1.0");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let first = Store::open(&path, &config()).unwrap();
        assert!(matches!(
            Store::open(&path, &config()),
            Err(LicenseError::StoreLocked(_))
        ));
        drop(first);
        assert!(Store::open(&path, &config()).is_ok());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Store::open(&path, &config()),
            Err(LicenseError::CorruptStore(_))
        ));
        // The lock taken during the failed open must be released.
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn duplicate_keys_are_corrupt() {
        let mut store = Store::in_memory(&config());
        let record = store.generate(Plan::Trial, PlanOverrides::default()).unwrap();
        let mut doc = store.document().clone();
        doc.keys.push(record);
        assert!(matches!(
            Store::from_document(doc, &config()),
            Err(LicenseError::CorruptStore(_))
        ));
    }

    #[test]
    fn reopen_sees_persisted_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let key = {
            let mut store = Store::open(&path, &config()).unwrap();
            store
                .generate(Plan::Quarterly, PlanOverrides::default())
                .unwrap()
                .key
        };

        let store = Store::open(&path, &config()).unwrap();
        let record = store.get_license(&key).unwrap();
        assert_eq!(record.plan, Plan::Quarterly);
        assert_eq!(store.document().statistics.quarterly_keys, 1);
        assert!(!dir.path().join("db.json.tmp").exists());
    }

    #[test]
    fn lookups_normalize_keys() {
        let mut store = Store::in_memory(&config());
        let key = store
            .generate(Plan::Monthly, PlanOverrides::default())
            .unwrap()
            .key;
        let sloppy = format!("  {}  ", key.to_lowercase().replacen("cnpro", "cnpr0", 1));
        assert_eq!(store.get_license(&sloppy).unwrap().key, key);
        assert!(matches!(
            store.license("CNPRO-2222-2222-2222-2222"),
            Err(LicenseError::KeyNotFound(_))
        ));
    }

    #[test]
    fn legacy_customer_ownership_is_backfilled() {
        let raw = r#"{
            "keys": [{
                "key": "CNPRO-AAAA-BBBB-CCCC-DDDD",
                "type": "monthly",
                "created_at": "2025-01-01T00:00:00",
                "expiry_date": "2025-01-31T00:00:00",
                "duration_days": 30,
                "max_devices": 1,
                "price": 29.99,
                "features": ["ai_generation"],
                "status": "assigned",
                "activation_count": 0,
                "hardware_ids": []
            }],
            "customers": [{
                "email": "Dana@Example.com",
                "name": "Dana",
                "created_at": "2025-01-01T00:00:00",
                "keys_purchased": [{"key": "CNPRO-AAAA-BBBB-CCCC-DDDD", "price": 29.99}],
                "total_spent": 29.99
            }],
            "statistics": {"total_keys_generated": 1, "monthly_keys": 1, "revenue_tracked": 29.99},
            "created_at": "2025-01-01T00:00:00",
            "version": "1.0"
        }"#;
        let doc = parse_document(raw).unwrap();
        let store = Store::from_document(doc, &config()).unwrap();
        let record = store.get_license("CNPRO-AAAA-BBBB-CCCC-DDDD").unwrap();
        assert_eq!(record.customer_email.as_deref(), Some("dana@example.com"));
        assert!(store.lookup_customer("dana@example.com").is_some());
    }
}
