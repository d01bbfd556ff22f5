//! Daily check-ins and their running analytics summary.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::models::sanitize_scale;
use crate::stats::{mean, round1};
use crate::storage::{CheckinStore, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyCheckin {
    pub date: NaiveDate,
    pub mood_rating: Option<u8>,
    pub energy_level: Option<u8>,
    pub stress_level: Option<u8>,
    pub sleep_quality: Option<u8>,
    #[serde(default)]
    pub gratitude: Vec<String>,
    pub notes: Option<String>,
}

/// Unvalidated check-in fields. Ratings outside 1-10 are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinInput {
    pub mood_rating: Option<i64>,
    pub energy_level: Option<i64>,
    pub stress_level: Option<i64>,
    pub sleep_quality: Option<i64>,
    pub gratitude: Vec<String>,
    pub notes: Option<String>,
}

impl CheckinInput {
    pub fn into_checkin(self, date: NaiveDate) -> DailyCheckin {
        DailyCheckin {
            date,
            mood_rating: sanitize_scale(self.mood_rating),
            energy_level: sanitize_scale(self.energy_level),
            stress_level: sanitize_scale(self.stress_level),
            sleep_quality: sanitize_scale(self.sleep_quality),
            gratitude: self
                .gratitude
                .into_iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckinAnalytics {
    pub total_checkins: usize,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub average_mood: Option<f64>,
    pub average_energy: Option<f64>,
    pub average_stress: Option<f64>,
    pub average_sleep_quality: Option<f64>,
    pub last_checkin_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

/// Summarize a user's check-ins as of `as_of`.
///
/// The current streak counts consecutive days ending today or yesterday, so a
/// streak is not broken before the user has had a chance to check in today.
pub fn summarize_checkins(checkins: &[DailyCheckin], as_of: NaiveDate) -> CheckinAnalytics {
    let mut dates: Vec<NaiveDate> = checkins.iter().map(|c| c.date).collect();
    dates.sort();
    dates.dedup();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for date in &dates {
        run = match previous {
            Some(prev) if *date - prev == ChronoDuration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(*date);
    }

    let past: Vec<NaiveDate> = dates.iter().copied().filter(|d| *d <= as_of).collect();
    let current_streak = match past.last() {
        Some(last) if as_of - *last <= ChronoDuration::days(1) => past
            .windows(2)
            .rev()
            .take_while(|w| w[1] - w[0] == ChronoDuration::days(1))
            .count() as u32
            + 1,
        _ => 0,
    };

    let average = |pick: fn(&DailyCheckin) -> Option<u8>| {
        let values: Vec<f64> = checkins.iter().filter_map(pick).map(f64::from).collect();
        mean(&values).map(round1)
    };

    CheckinAnalytics {
        total_checkins: dates.len(),
        current_streak,
        longest_streak: longest,
        average_mood: average(|c| c.mood_rating),
        average_energy: average(|c| c.energy_level),
        average_stress: average(|c| c.stress_level),
        average_sleep_quality: average(|c| c.sleep_quality),
        last_checkin_date: dates.last().copied(),
        updated_at: Utc::now(),
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

pub struct CheckinService<S> {
    store: S,
    cache: TtlCache<Uuid, CheckinAnalytics>,
    clock: fn() -> NaiveDate,
}

impl<S: CheckinStore> CheckinService<S> {
    pub fn new(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            cache: TtlCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            ),
            clock: local_today,
        }
    }

    /// Replace the source of "today".
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Save a check-in, then refresh the analytics summary.
    ///
    /// Only the check-in write can fail the call; a failed summary refresh is
    /// logged and the stale summary is left in place.
    pub fn record_checkin(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        input: CheckinInput,
    ) -> Result<DailyCheckin, StorageError> {
        let checkin = input.into_checkin(date);
        self.store.upsert_checkin(user_id, &checkin)?;
        self.cache.invalidate(&user_id);
        tracing::debug!(%user_id, %date, "check-in recorded");

        if let Err(e) = self.refresh_analytics(user_id) {
            tracing::warn!(%user_id, error = %e, "check-in analytics update failed");
        }
        Ok(checkin)
    }

    /// Recompute the summary from full history and store it.
    pub fn refresh_analytics(&self, user_id: Uuid) -> Result<CheckinAnalytics, StorageError> {
        let checkins = self.store.get_checkins(user_id, NaiveDate::MIN, None)?;
        let analytics = summarize_checkins(&checkins, (self.clock)());
        self.store.upsert_checkin_analytics(user_id, &analytics)?;
        self.cache.insert(user_id, analytics.clone());
        Ok(analytics)
    }

    pub fn analytics(&self, user_id: Uuid) -> Result<CheckinAnalytics, StorageError> {
        if let Some(cached) = self.cache.get(&user_id) {
            return Ok(cached);
        }
        let analytics = match self.store.get_checkin_analytics(user_id)? {
            Some(stored) => stored,
            None => {
                let checkins = self.store.get_checkins(user_id, NaiveDate::MIN, None)?;
                summarize_checkins(&checkins, (self.clock)())
            }
        };
        self.cache.insert(user_id, analytics.clone());
        Ok(analytics)
    }

    /// Check-ins from the last `window_days` days, newest first.
    pub fn history(
        &self,
        user_id: Uuid,
        window_days: u32,
    ) -> Result<Vec<DailyCheckin>, StorageError> {
        let start = (self.clock)() - ChronoDuration::days(i64::from(window_days) - 1);
        self.store.get_checkins(user_id, start, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn fixed_today() -> NaiveDate {
        day("2026-03-10")
    }

    fn checkin(date: &str, mood: Option<u8>) -> DailyCheckin {
        DailyCheckin {
            date: day(date),
            mood_rating: mood,
            energy_level: None,
            stress_level: None,
            sleep_quality: None,
            gratitude: vec![],
            notes: None,
        }
    }

    struct BrokenAnalytics(MemoryStore);

    impl CheckinStore for BrokenAnalytics {
        fn upsert_checkin(&self, user_id: Uuid, c: &DailyCheckin) -> Result<(), StorageError> {
            self.0.upsert_checkin(user_id, c)
        }

        fn get_checkins(
            &self,
            user_id: Uuid,
            start: NaiveDate,
            end: Option<NaiveDate>,
        ) -> Result<Vec<DailyCheckin>, StorageError> {
            self.0.get_checkins(user_id, start, end)
        }

        fn upsert_checkin_analytics(
            &self,
            _: Uuid,
            _: &CheckinAnalytics,
        ) -> Result<(), StorageError> {
            Err(StorageError::Backend("analytics table unavailable".into()))
        }

        fn get_checkin_analytics(
            &self,
            user_id: Uuid,
        ) -> Result<Option<CheckinAnalytics>, StorageError> {
            self.0.get_checkin_analytics(user_id)
        }
    }

    #[test]
    fn streaks_and_averages() {
        let checkins = vec![
            checkin("2026-03-01", Some(4)),
            checkin("2026-03-02", Some(6)),
            checkin("2026-03-03", None),
            checkin("2026-03-07", Some(8)),
            checkin("2026-03-08", None),
            checkin("2026-03-09", Some(7)),
        ];
        let summary = summarize_checkins(&checkins, fixed_today());
        assert_eq!(summary.total_checkins, 6);
        assert_eq!(summary.longest_streak, 3);
        assert_eq!(summary.current_streak, 3);
        assert_eq!(summary.average_mood, Some(6.3));
        assert_eq!(summary.average_energy, None);
        assert_eq!(summary.last_checkin_date, Some(day("2026-03-09")));
    }

    #[test]
    fn streak_breaks_after_a_missed_day() {
        let checkins = vec![checkin("2026-03-07", None), checkin("2026-03-08", None)];
        let summary = summarize_checkins(&checkins, fixed_today());
        assert_eq!(summary.current_streak, 0);
        assert_eq!(summary.longest_streak, 2);
    }

    #[test]
    fn empty_history_is_all_zero() {
        let summary = summarize_checkins(&[], fixed_today());
        assert_eq!(summary.total_checkins, 0);
        assert_eq!(summary.current_streak, 0);
        assert_eq!(summary.average_mood, None);
    }

    #[test]
    fn record_checkin_sanitizes_and_updates_analytics() {
        let service = CheckinService::new(MemoryStore::new(), &EngineConfig::default())
            .with_clock(fixed_today);
        let user = Uuid::new_v4();

        let saved = service
            .record_checkin(
                user,
                day("2026-03-10"),
                CheckinInput {
                    mood_rating: Some(15),
                    energy_level: Some(7),
                    gratitude: vec!["  ".into(), "sunshine".into()],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(saved.mood_rating, None);
        assert_eq!(saved.gratitude, vec!["sunshine".to_string()]);

        let stored = service.store().get_checkin_analytics(user).unwrap().unwrap();
        assert_eq!(stored.total_checkins, 1);
        assert_eq!(stored.current_streak, 1);
        assert_eq!(service.analytics(user).unwrap().average_energy, Some(7.0));
        assert_eq!(service.history(user, 7).unwrap().len(), 1);
    }

    #[test]
    fn analytics_failure_does_not_fail_the_checkin() {
        let service =
            CheckinService::new(BrokenAnalytics(MemoryStore::new()), &EngineConfig::default())
                .with_clock(fixed_today);
        let user = Uuid::new_v4();

        let result = service.record_checkin(user, day("2026-03-10"), CheckinInput::default());
        assert!(result.is_ok());
        assert_eq!(service.history(user, 30).unwrap().len(), 1);
        assert!(service.refresh_analytics(user).is_err());

        // no stored row, so the summary is computed on read
        assert_eq!(service.analytics(user).unwrap().total_checkins, 1);
    }
}
