use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::checkin::{CheckinAnalytics, DailyCheckin};
use crate::config::KdfParams;
use crate::crypto::{self, SealingKey};
use crate::models::{
    CyclePatterns, DailyHealthRecord, HealthInsight, HealthJournalCorrelation, JournalEntry,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("{0}")]
    Backend(String),
}

/// Persistence contract for daily health records and everything derived from them.
pub trait HealthStore {
    /// Insert or replace the record keyed on (user, record.date).
    fn upsert_health_record(
        &self,
        user_id: Uuid,
        record: &DailyHealthRecord,
    ) -> Result<(), StorageError>;

    /// Records with `start <= date` (and `date <= end` when given), newest first.
    fn get_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyHealthRecord>, StorageError>;

    fn get_by_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyHealthRecord>, StorageError>;

    /// Replace the user's pattern row.
    fn upsert_cycle_patterns(&self, patterns: &CyclePatterns) -> Result<(), StorageError>;

    fn get_cycle_patterns(&self, user_id: Uuid) -> Result<Option<CyclePatterns>, StorageError>;

    /// Append-only.
    fn insert_insight(&self, insight: &HealthInsight) -> Result<(), StorageError>;

    fn list_insights(&self, user_id: Uuid) -> Result<Vec<HealthInsight>, StorageError>;

    /// Append-only.
    fn insert_correlation(
        &self,
        correlation: &HealthJournalCorrelation,
    ) -> Result<(), StorageError>;

    fn list_correlations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<HealthJournalCorrelation>, StorageError>;
}

/// Read side of the journaling subsystem.
pub trait JournalSource {
    /// Entries with `start <= date <= end`, any order.
    fn journal_entries(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<JournalEntry>, StorageError>;
}

pub trait CheckinStore {
    /// Insert or replace the check-in keyed on (user, checkin.date).
    fn upsert_checkin(&self, user_id: Uuid, checkin: &DailyCheckin) -> Result<(), StorageError>;

    /// Check-ins with `start <= date` (and `date <= end` when given), newest first.
    fn get_checkins(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyCheckin>, StorageError>;

    fn upsert_checkin_analytics(
        &self,
        user_id: Uuid,
        analytics: &CheckinAnalytics,
    ) -> Result<(), StorageError>;

    fn get_checkin_analytics(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CheckinAnalytics>, StorageError>;
}

/// Everything a store holds, for every user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreData {
    pub health_records: BTreeMap<Uuid, BTreeMap<NaiveDate, DailyHealthRecord>>,
    pub cycle_patterns: BTreeMap<Uuid, CyclePatterns>,
    pub insights: Vec<HealthInsight>,
    pub correlations: Vec<HealthJournalCorrelation>,
    pub journal: BTreeMap<Uuid, Vec<JournalEntry>>,
    pub checkins: BTreeMap<Uuid, BTreeMap<NaiveDate, DailyCheckin>>,
    pub checkin_analytics: BTreeMap<Uuid, CheckinAnalytics>,
}

/// One user's data, as handed out by [`SnapshotBackend::export_json`].
#[derive(Debug, Serialize)]
pub struct UserExport<'a> {
    pub user_id: Uuid,
    pub health_records: Vec<&'a DailyHealthRecord>,
    pub cycle_patterns: Option<&'a CyclePatterns>,
    pub insights: Vec<&'a HealthInsight>,
    pub correlations: Vec<&'a HealthJournalCorrelation>,
    pub checkins: Vec<&'a DailyCheckin>,
}

fn in_range(date: NaiveDate, start: NaiveDate, end: Option<NaiveDate>) -> bool {
    date >= start && end.map_or(true, |end| date <= end)
}

/// A store that keeps the whole [`StoreData`] snapshot and exposes it through
/// closures. Every snapshot backend gets the store traits for free.
pub trait SnapshotBackend {
    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> Result<R, StorageError>;

    fn write<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> Result<R, StorageError>;

    /// Pretty JSON of everything stored for one user.
    fn export_json(&self, user_id: Uuid) -> Result<String, StorageError> {
        self.read(|data| {
            let export = UserExport {
                user_id,
                health_records: data
                    .health_records
                    .get(&user_id)
                    .map(|days| days.values().collect())
                    .unwrap_or_default(),
                cycle_patterns: data.cycle_patterns.get(&user_id),
                insights: data.insights.iter().filter(|i| i.user_id == user_id).collect(),
                correlations: data
                    .correlations
                    .iter()
                    .filter(|c| c.user_id == user_id)
                    .collect(),
                checkins: data
                    .checkins
                    .get(&user_id)
                    .map(|days| days.values().collect())
                    .unwrap_or_default(),
            };
            serde_json::to_string_pretty(&export)
        })?
        .map_err(StorageError::from)
    }
}

impl<T: SnapshotBackend> HealthStore for T {
    fn upsert_health_record(
        &self,
        user_id: Uuid,
        record: &DailyHealthRecord,
    ) -> Result<(), StorageError> {
        self.write(|data| {
            data.health_records
                .entry(user_id)
                .or_default()
                .insert(record.date, record.clone());
        })
    }

    fn get_range(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyHealthRecord>, StorageError> {
        self.read(|data| {
            data.health_records
                .get(&user_id)
                .map(|days| {
                    days.values()
                        .rev()
                        .filter(|r| in_range(r.date, start, end))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn get_by_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyHealthRecord>, StorageError> {
        self.read(|data| {
            data.health_records
                .get(&user_id)
                .and_then(|days| days.get(&date))
                .cloned()
        })
    }

    fn upsert_cycle_patterns(&self, patterns: &CyclePatterns) -> Result<(), StorageError> {
        self.write(|data| {
            data.cycle_patterns
                .insert(patterns.user_id, patterns.clone());
        })
    }

    fn get_cycle_patterns(&self, user_id: Uuid) -> Result<Option<CyclePatterns>, StorageError> {
        self.read(|data| data.cycle_patterns.get(&user_id).cloned())
    }

    fn insert_insight(&self, insight: &HealthInsight) -> Result<(), StorageError> {
        self.write(|data| data.insights.push(insight.clone()))
    }

    fn list_insights(&self, user_id: Uuid) -> Result<Vec<HealthInsight>, StorageError> {
        self.read(|data| {
            data.insights
                .iter()
                .filter(|i| i.user_id == user_id)
                .cloned()
                .collect()
        })
    }

    fn insert_correlation(
        &self,
        correlation: &HealthJournalCorrelation,
    ) -> Result<(), StorageError> {
        self.write(|data| data.correlations.push(correlation.clone()))
    }

    fn list_correlations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<HealthJournalCorrelation>, StorageError> {
        self.read(|data| {
            data.correlations
                .iter()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect()
        })
    }
}

impl<T: SnapshotBackend> JournalSource for T {
    fn journal_entries(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<JournalEntry>, StorageError> {
        self.read(|data| {
            data.journal
                .get(&user_id)
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| in_range(e.date, start, Some(end)))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }
}

impl<T: SnapshotBackend> CheckinStore for T {
    fn upsert_checkin(&self, user_id: Uuid, checkin: &DailyCheckin) -> Result<(), StorageError> {
        self.write(|data| {
            data.checkins
                .entry(user_id)
                .or_default()
                .insert(checkin.date, checkin.clone());
        })
    }

    fn get_checkins(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<DailyCheckin>, StorageError> {
        self.read(|data| {
            data.checkins
                .get(&user_id)
                .map(|days| {
                    days.values()
                        .rev()
                        .filter(|c| in_range(c.date, start, end))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn upsert_checkin_analytics(
        &self,
        user_id: Uuid,
        analytics: &CheckinAnalytics,
    ) -> Result<(), StorageError> {
        self.write(|data| {
            data.checkin_analytics.insert(user_id, analytics.clone());
        })
    }

    fn get_checkin_analytics(
        &self,
        user_id: Uuid,
    ) -> Result<Option<CheckinAnalytics>, StorageError> {
        self.read(|data| data.checkin_analytics.get(&user_id).cloned())
    }
}

impl<T: SnapshotBackend> SnapshotBackend for Arc<T> {
    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> Result<R, StorageError> {
        (**self).read(f)
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> Result<R, StorageError> {
        (**self).write(f)
    }
}

/// Non-persistent store, also used as the journal source in tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed journal entries for a user.
    pub fn add_journal_entries(
        &self,
        user_id: Uuid,
        entries: impl IntoIterator<Item = JournalEntry>,
    ) -> Result<(), StorageError> {
        self.write(|data| data.journal.entry(user_id).or_default().extend(entries))
    }
}

impl SnapshotBackend for MemoryStore {
    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> Result<R, StorageError> {
        let data = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&data))
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> Result<R, StorageError> {
        let mut data = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&mut data))
    }
}

/// Passphrase-sealed, single-file store.
///
/// The whole snapshot is re-sealed and written on every change. A failed
/// write leaves both the file and the in-memory snapshot untouched.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: SealingKey,
    data: Mutex<StoreData>,
}

impl EncryptedFileStore {
    /// Open the file at `path`, creating an empty store if it does not exist.
    ///
    /// `kdf` only applies to a newly created file. An existing file is opened
    /// with the params recorded in its header.
    pub fn open(
        path: impl Into<PathBuf>,
        passphrase: &str,
        kdf: &KdfParams,
    ) -> Result<Self, StorageError> {
        let path = path.into();
        if path.exists() {
            let sealed = fs::read(&path)?;
            let key = SealingKey::for_sealed(passphrase, &sealed)?;
            if key.params() != kdf {
                tracing::debug!(
                    file = ?key.params(),
                    configured = ?kdf,
                    "data file keeps the kdf params it was created with"
                );
            }
            let mut plaintext = key.open(&sealed)?;
            let parsed = serde_json::from_slice::<StoreData>(&plaintext);
            plaintext.zeroize();
            let data = parsed?;
            tracing::info!(path = %path.display(), users = data.health_records.len(), "opened data file");
            return Ok(Self {
                path,
                key,
                data: Mutex::new(data),
            });
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let store = Self {
            key: SealingKey::generate(passphrase, kdf)?,
            path,
            data: Mutex::new(StoreData::default()),
        };
        store.persist(&StoreData::default())?;
        tracing::info!(path = %store.path.display(), "created data file");
        Ok(store)
    }

    /// Whether a data file has been created at `path`.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the data file permanently.
    pub fn wipe(self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        tracing::info!(path = %self.path.display(), "data file wiped");
        Ok(())
    }

    fn persist(&self, data: &StoreData) -> Result<(), StorageError> {
        let mut json = serde_json::to_vec(data)?;
        let sealed = self.key.seal(&json);
        json.zeroize();
        let sealed = sealed?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &sealed)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(bytes = sealed.len(), "data file written");
        Ok(())
    }
}

impl SnapshotBackend for EncryptedFileStore {
    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> Result<R, StorageError> {
        let data = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(f(&data))
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> Result<R, StorageError> {
        let mut data = self.data.lock().map_err(|_| StorageError::Poisoned)?;
        let mut next = data.clone();
        let result = f(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(result)
    }
}
