//! Cycle pattern analysis, prediction and insight generation over per-day
//! health records, plus the daily check-in analytics that sit beside it.
//!
//! The analytic pieces (`patterns`, `prediction`, `insights`, `correlation`)
//! are pure functions. `service` and `checkin` wire them to a store.

pub mod cache;
pub mod checkin;
pub mod config;
pub mod correlation;
pub mod crypto;
pub mod insights;
pub mod models;
pub mod patterns;
pub mod prediction;
pub mod service;
pub mod stats;
pub mod storage;

pub use config::EngineConfig;
pub use service::{CycleService, RecomputeOutcome};
pub use storage::{EncryptedFileStore, HealthStore, JournalSource, MemoryStore, StorageError};
