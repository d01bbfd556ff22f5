use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDate, Utc};
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::correlation::analyze_correlations;
use crate::insights::{generate_insights, InsightInput};
use crate::models::{
    CyclePatterns, DailyHealthInput, DailyHealthRecord, HealthInsight, HealthJournalCorrelation,
};
use crate::patterns::analyze_patterns;
use crate::prediction::predict;
use crate::storage::{HealthStore, JournalSource, StorageError};

/// Result of one full analysis run.
#[derive(Debug, Clone)]
pub struct RecomputeOutcome {
    pub patterns: CyclePatterns,
    /// Insights appended by this run.
    pub insights: Vec<HealthInsight>,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: DailyHealthRecord,
    pub recompute: RecomputeOutcome,
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Coordinates the store with the analyzers for one user at a time.
///
/// Holds no per-user state besides a read cache; every analysis is re-derived
/// from stored history.
pub struct CycleService<S, J> {
    store: S,
    journal: J,
    config: EngineConfig,
    cache: TtlCache<Uuid, CyclePatterns>,
    clock: fn() -> NaiveDate,
}

impl<S: HealthStore, J: JournalSource> CycleService<S, J> {
    pub fn new(store: S, journal: J, config: EngineConfig) -> Self {
        Self {
            store,
            journal,
            cache: TtlCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            ),
            config,
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

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// First day of the `days`-long window that ends today.
    fn window_start(&self, days: u32) -> NaiveDate {
        (self.clock)() - ChronoDuration::days(i64::from(days) - 1)
    }

    /// Save one day and re-run the full analysis.
    ///
    /// A failing recompute is returned as an error, but the record itself
    /// stays saved.
    pub fn record_daily_health(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        input: DailyHealthInput,
    ) -> Result<RecordOutcome, StorageError> {
        let record = input.into_record(date);
        self.store.upsert_health_record(user_id, &record)?;
        self.cache.invalidate(&user_id);
        tracing::debug!(%user_id, %date, "health record saved");

        let recompute = self.recompute_patterns(user_id).inspect_err(|e| {
            tracing::warn!(%user_id, %date, error = %e, "pattern recompute after write failed");
        })?;
        Ok(RecordOutcome { record, recompute })
    }

    /// Analyze the trailing window, replace the pattern row and append any
    /// insights. Insights are not deduplicated against earlier runs.
    pub fn recompute_patterns(&self, user_id: Uuid) -> Result<RecomputeOutcome, StorageError> {
        let today = (self.clock)();
        let records =
            self.store
                .get_range(user_id, self.window_start(self.config.analysis_window_days), None)?;

        let analysis = analyze_patterns(&records, today);
        let prediction = predict(&analysis);
        let contents = generate_insights(
            &InsightInput {
                records: &records,
                analysis: &analysis,
                prediction: &prediction,
            },
            &self.config.insights,
        );

        let patterns = CyclePatterns {
            user_id,
            analysis,
            prediction,
            updated_at: Utc::now(),
        };
        self.cache.invalidate(&user_id);
        self.store.upsert_cycle_patterns(&patterns)?;

        let mut insights = Vec::with_capacity(contents.len());
        for content in contents {
            let insight = HealthInsight::new(user_id, content);
            self.store.insert_insight(&insight)?;
            insights.push(insight);
        }

        tracing::info!(
            %user_id,
            records = records.len(),
            insights = insights.len(),
            confidence = patterns.prediction.confidence,
            "cycle patterns recomputed"
        );
        self.cache.insert(user_id, patterns.clone());
        Ok(RecomputeOutcome { patterns, insights })
    }

    /// Correlate the trailing window against journal entries and append the findings.
    pub fn correlate_with_journal(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<HealthJournalCorrelation>, StorageError> {
        let today = (self.clock)();
        let start = self.window_start(self.config.correlation_window_days);
        let records = self.store.get_range(user_id, start, None)?;
        let journal = self.journal.journal_entries(user_id, start, today)?;

        let findings =
            analyze_correlations(&records, &journal, self.config.min_correlation_samples);

        let mut correlations = Vec::with_capacity(findings.len());
        for finding in findings {
            let correlation = HealthJournalCorrelation::new(user_id, finding);
            self.store.insert_correlation(&correlation)?;
            correlations.push(correlation);
        }
        tracing::info!(
            %user_id,
            records = records.len(),
            journal_entries = journal.len(),
            correlations = correlations.len(),
            "journal correlation finished"
        );
        Ok(correlations)
    }

    pub fn get_patterns(&self, user_id: Uuid) -> Result<Option<CyclePatterns>, StorageError> {
        if let Some(cached) = self.cache.get(&user_id) {
            return Ok(Some(cached));
        }
        let patterns = self.store.get_cycle_patterns(user_id)?;
        if let Some(p) = &patterns {
            self.cache.insert(user_id, p.clone());
        }
        Ok(patterns)
    }

    /// Records from the last `window_days` days, newest first.
    pub fn get_health_history(
        &self,
        user_id: Uuid,
        window_days: u32,
    ) -> Result<Vec<DailyHealthRecord>, StorageError> {
        self.store
            .get_range(user_id, self.window_start(window_days), None)
    }

    pub fn get_record(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyHealthRecord>, StorageError> {
        self.store.get_by_date(user_id, date)
    }

    pub fn get_insights(&self, user_id: Uuid) -> Result<Vec<HealthInsight>, StorageError> {
        self.store.list_insights(user_id)
    }

    pub fn get_correlations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<HealthJournalCorrelation>, StorageError> {
        self.store.list_correlations(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::models::{CyclePhase, JournalEntry};
    use crate::storage::MemoryStore;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn today() -> NaiveDate {
        day("2026-06-30")
    }

    fn service() -> CycleService<MemoryStore, MemoryStore> {
        CycleService::new(MemoryStore::new(), MemoryStore::new(), EngineConfig::default())
            .with_clock(today)
    }

    fn period_start() -> DailyHealthInput {
        DailyHealthInput {
            is_period_start: true,
            cycle_phase: Some(CyclePhase::Menstrual),
            ..Default::default()
        }
    }

    /// Delegates to a memory store but refuses to write pattern rows.
    struct NoPatternWrites(MemoryStore);

    impl HealthStore for NoPatternWrites {
        fn upsert_health_record(
            &self,
            user_id: Uuid,
            record: &DailyHealthRecord,
        ) -> Result<(), StorageError> {
            self.0.upsert_health_record(user_id, record)
        }

        fn get_range(
            &self,
            user_id: Uuid,
            start: NaiveDate,
            end: Option<NaiveDate>,
        ) -> Result<Vec<DailyHealthRecord>, StorageError> {
            self.0.get_range(user_id, start, end)
        }

        fn get_by_date(
            &self,
            user_id: Uuid,
            date: NaiveDate,
        ) -> Result<Option<DailyHealthRecord>, StorageError> {
            self.0.get_by_date(user_id, date)
        }

        fn upsert_cycle_patterns(&self, _: &CyclePatterns) -> Result<(), StorageError> {
            Err(StorageError::Backend("patterns table is read-only".into()))
        }

        fn get_cycle_patterns(
            &self,
            user_id: Uuid,
        ) -> Result<Option<CyclePatterns>, StorageError> {
            self.0.get_cycle_patterns(user_id)
        }

        fn insert_insight(&self, insight: &HealthInsight) -> Result<(), StorageError> {
            self.0.insert_insight(insight)
        }

        fn list_insights(&self, user_id: Uuid) -> Result<Vec<HealthInsight>, StorageError> {
            self.0.list_insights(user_id)
        }

        fn insert_correlation(
            &self,
            correlation: &HealthJournalCorrelation,
        ) -> Result<(), StorageError> {
            self.0.insert_correlation(correlation)
        }

        fn list_correlations(
            &self,
            user_id: Uuid,
        ) -> Result<Vec<HealthJournalCorrelation>, StorageError> {
            self.0.list_correlations(user_id)
        }
    }

    #[test]
    fn two_cycles_fall_back_to_default_confidence() {
        let service = service();
        let user = Uuid::new_v4();
        // starts on days 1, 29 and 57 of a 60-day window ending today
        let first = today() - ChronoDuration::days(59);
        for offset in [0, 28, 56] {
            let record = period_start().into_record(first + ChronoDuration::days(offset));
            service.store().upsert_health_record(user, &record).unwrap();
        }

        let outcome = service.recompute_patterns(user).unwrap();
        let analysis = &outcome.patterns.analysis;
        assert_eq!(analysis.average_cycle_length, Some(28));
        assert_eq!(analysis.cycle_regularity_score, None);
        assert_eq!(outcome.patterns.prediction.confidence, 50);
        assert_eq!(
            outcome.patterns.prediction.next_period,
            Some(first + ChronoDuration::days(84))
        );
        assert!(outcome.insights.is_empty());
    }

    #[test]
    fn evenly_spaced_cycles_are_fully_confident() {
        let service = service();
        let user = Uuid::new_v4();
        let last = today() - ChronoDuration::days(5);
        for i in 0..4 {
            let record = period_start().into_record(last - ChronoDuration::days(30 * i));
            service.store().upsert_health_record(user, &record).unwrap();
        }

        let outcome = service.recompute_patterns(user).unwrap();
        assert_eq!(outcome.patterns.analysis.cycle_regularity_score, Some(100));
        assert_eq!(
            outcome.patterns.prediction.next_period,
            Some(last + ChronoDuration::days(30))
        );
        assert_eq!(outcome.patterns.prediction.confidence, 100);

        let titles: Vec<&str> = outcome
            .insights
            .iter()
            .map(|i| i.content.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Very Regular Cycle Pattern"]);
        assert_eq!(
            service.get_patterns(user).unwrap().unwrap().prediction,
            outcome.patterns.prediction
        );
    }

    #[test]
    fn every_write_recomputes_and_insights_accumulate() {
        let service = service();
        let user = Uuid::new_v4();
        let last = today() - ChronoDuration::days(2);
        for i in (0..4).rev() {
            let outcome = service
                .record_daily_health(user, last - ChronoDuration::days(28 * i), period_start())
                .unwrap();
            assert_eq!(
                outcome.recompute.patterns.analysis.last_period_start,
                Some(outcome.record.date)
            );
        }
        // only the fourth write had three cycle lengths to score
        assert_eq!(service.get_insights(user).unwrap().len(), 1);

        service.recompute_patterns(user).unwrap();
        let insights = service.get_insights(user).unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].content, insights[1].content);
    }

    #[test]
    fn failed_recompute_is_reported_but_record_is_kept() {
        let service = CycleService::new(
            NoPatternWrites(MemoryStore::new()),
            MemoryStore::new(),
            EngineConfig::default(),
        )
        .with_clock(today);
        let user = Uuid::new_v4();

        let result = service.record_daily_health(user, today(), period_start());
        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert!(service.get_record(user, today()).unwrap().is_some());

        assert!(matches!(
            service.recompute_patterns(user),
            Err(StorageError::Backend(_))
        ));
        assert!(service.get_patterns(user).unwrap().is_none());
    }

    #[test]
    fn empty_history_yields_empty_patterns() {
        let service = service();
        let user = Uuid::new_v4();
        let outcome = service.recompute_patterns(user).unwrap();
        assert_eq!(outcome.patterns.analysis.average_cycle_length, None);
        assert!(outcome.patterns.analysis.perimenopause_indicators.is_none());
        assert_eq!(outcome.patterns.prediction.confidence, 0);
        assert!(outcome.insights.is_empty());
    }

    #[test]
    fn cached_patterns_are_invalidated_by_writes() {
        let service = service();
        let user = Uuid::new_v4();
        service
            .record_daily_health(user, today() - ChronoDuration::days(40), period_start())
            .unwrap();
        let before = service.get_patterns(user).unwrap().unwrap();
        assert_eq!(before.analysis.average_cycle_length, None);

        service
            .record_daily_health(user, today() - ChronoDuration::days(12), period_start())
            .unwrap();
        let after = service.get_patterns(user).unwrap().unwrap();
        assert_eq!(after.analysis.average_cycle_length, Some(28));
    }

    #[test]
    fn history_respects_window() {
        let service = service();
        let user = Uuid::new_v4();
        // a 30-day window ending today starts 29 days back
        for offset in [1, 29, 30, 45] {
            service
                .record_daily_health(
                    user,
                    today() - ChronoDuration::days(offset),
                    DailyHealthInput::default(),
                )
                .unwrap();
        }
        let history = service.get_health_history(user, 30).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].date > history[1].date);
    }

    #[test]
    fn journal_correlation_appends_rows() {
        let shared = Arc::new(MemoryStore::new());
        let service =
            CycleService::new(Arc::clone(&shared), Arc::clone(&shared), EngineConfig::default())
                .with_clock(today);
        let user = Uuid::new_v4();

        let first = today() - ChronoDuration::days(20);
        let mut entries = Vec::new();
        for i in 0..12 {
            let date = first + ChronoDuration::days(i);
            let record = DailyHealthInput {
                cycle_phase: Some(if i < 6 {
                    CyclePhase::Follicular
                } else {
                    CyclePhase::Luteal
                }),
                mood_rating: Some(i % 5 + 3),
                ..Default::default()
            }
            .into_record(date);
            shared.upsert_health_record(user, &record).unwrap();
            entries.push(JournalEntry {
                date,
                mood: Some((i % 5 + 4) as f64),
                energy: None,
            });
        }
        shared.add_journal_entries(user, entries).unwrap();

        let rows = service.correlate_with_journal(user).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].finding.sample_size, 12);
        assert!((rows[0].finding.correlation_coefficient - 1.0).abs() < 1e-9);

        service.correlate_with_journal(user).unwrap();
        assert_eq!(service.get_correlations(user).unwrap().len(), 2);
    }

    #[test]
    fn too_little_journal_overlap_produces_nothing() {
        let service = service();
        let user = Uuid::new_v4();
        for i in 0..5 {
            service
                .record_daily_health(
                    user,
                    today() - ChronoDuration::days(i),
                    DailyHealthInput {
                        cycle_phase: Some(CyclePhase::Luteal),
                        mood_rating: Some(6),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        assert!(service.correlate_with_journal(user).unwrap().is_empty());
        assert!(service.get_correlations(user).unwrap().is_empty());
    }
}
