use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_LIFE_STAGE: &str = "menstrual";

/// Symptom name -> severity (0-10). Names are free-form.
pub type SymptomScores = BTreeMap<String, u8>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowLevel {
    Spotting,
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Menstrual,
    Follicular,
    Ovulatory,
    Luteal,
}

impl CyclePhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Menstrual => "menstrual",
            Self::Follicular => "follicular",
            Self::Ovulatory => "ovulatory",
            Self::Luteal => "luteal",
        }
    }
}

/// One stored day of health tracking. At most one per (user, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyHealthRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub is_period_start: bool,
    #[serde(default)]
    pub is_period_end: bool,
    pub period_flow: Option<FlowLevel>,
    pub cycle_phase: Option<CyclePhase>,
    pub cycle_day: Option<u32>,
    #[serde(default = "default_life_stage")]
    pub life_stage: String,
    #[serde(default)]
    pub physical_symptoms: SymptomScores,
    #[serde(default)]
    pub emotional_symptoms: SymptomScores,
    pub energy_level: Option<u8>,
    pub sleep_quality: Option<u8>,
    pub mood_rating: Option<u8>,
    pub sleep_hours: Option<f32>,
    pub basal_body_temperature: Option<f32>,
    pub notes: Option<String>,
}

fn default_life_stage() -> String {
    DEFAULT_LIFE_STAGE.to_string()
}

impl DailyHealthRecord {
    /// An empty record for `date`: no flags, no ratings, default life stage.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            is_period_start: false,
            is_period_end: false,
            period_flow: None,
            cycle_phase: None,
            cycle_day: None,
            life_stage: default_life_stage(),
            physical_symptoms: SymptomScores::new(),
            emotional_symptoms: SymptomScores::new(),
            energy_level: None,
            sleep_quality: None,
            mood_rating: None,
            sleep_hours: None,
            basal_body_temperature: None,
            notes: None,
        }
    }

    /// Severity of a physical symptom, 0 when not logged.
    pub fn physical_symptom(&self, name: &str) -> u8 {
        self.physical_symptoms.get(name).copied().unwrap_or(0)
    }
}

/// Unvalidated fields for a day, as submitted by a client.
///
/// Out-of-range values are dropped rather than rejected; see
/// [`DailyHealthInput::into_record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyHealthInput {
    pub is_period_start: bool,
    pub is_period_end: bool,
    pub period_flow: Option<FlowLevel>,
    pub cycle_phase: Option<CyclePhase>,
    pub cycle_day: Option<i64>,
    pub life_stage: Option<String>,
    pub physical_symptoms: BTreeMap<String, i64>,
    pub emotional_symptoms: BTreeMap<String, i64>,
    pub energy_level: Option<i64>,
    pub sleep_quality: Option<i64>,
    pub mood_rating: Option<i64>,
    pub sleep_hours: Option<f32>,
    pub basal_body_temperature: Option<f32>,
    pub notes: Option<String>,
}

impl DailyHealthInput {
    pub fn into_record(self, date: NaiveDate) -> DailyHealthRecord {
        let life_stage = self
            .life_stage
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(default_life_stage);

        DailyHealthRecord {
            date,
            is_period_start: self.is_period_start,
            is_period_end: self.is_period_end,
            period_flow: self.period_flow,
            cycle_phase: self.cycle_phase,
            cycle_day: self
                .cycle_day
                .filter(|d| *d > 0)
                .and_then(|d| u32::try_from(d).ok()),
            life_stage,
            physical_symptoms: sanitize_symptoms(self.physical_symptoms),
            emotional_symptoms: sanitize_symptoms(self.emotional_symptoms),
            energy_level: sanitize_scale(self.energy_level),
            sleep_quality: sanitize_scale(self.sleep_quality),
            mood_rating: sanitize_scale(self.mood_rating),
            sleep_hours: self
                .sleep_hours
                .filter(|h| h.is_finite() && (0.0..=24.0).contains(h)),
            basal_body_temperature: self
                .basal_body_temperature
                .filter(|t| t.is_finite() && *t > 0.0),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

/// Coerce a 1-10 rating, anything else becomes `None`.
pub fn sanitize_scale(value: Option<i64>) -> Option<u8> {
    value
        .filter(|v| (1..=10).contains(v))
        .and_then(|v| u8::try_from(v).ok())
}

fn sanitize_symptoms(raw: BTreeMap<String, i64>) -> SymptomScores {
    raw.into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .filter_map(|(name, severity)| {
            (0..=10)
                .contains(&severity)
                .then(|| (name, severity as u8))
        })
        .collect()
}

/// Per-phase symptom averages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SymptomPattern {
    pub sample_size: usize,
    pub physical: BTreeMap<String, f64>,
    pub emotional: BTreeMap<String, f64>,
}

/// Per-phase average of one rating, `average` is `None` when no record in
/// the phase carried the rating.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricPattern {
    pub sample_size: usize,
    pub average: Option<f64>,
}

/// Additive perimenopause heuristic. Not a probability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerimenopauseIndicators {
    pub score: u8,
    pub irregular_cycles: bool,
    pub missed_periods: bool,
    pub hot_flashes: bool,
    pub sleep_issues: bool,
    pub mood_changes: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenopauseIndicators {
    pub score: u8,
    pub no_periods_12_months: bool,
    pub no_periods_6_months: bool,
    pub persistent_symptoms: bool,
}

/// Everything derived from a window of records, before prediction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatternAnalysis {
    pub average_cycle_length: Option<u32>,
    pub average_period_length: Option<u32>,
    pub cycle_regularity_score: Option<u8>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
    pub cycle_lengths: Vec<i64>,
    pub symptom_patterns: BTreeMap<CyclePhase, SymptomPattern>,
    pub mood_patterns: BTreeMap<CyclePhase, MetricPattern>,
    pub energy_patterns: BTreeMap<CyclePhase, MetricPattern>,
    pub perimenopause_indicators: Option<PerimenopauseIndicators>,
    pub menopause_indicators: Option<MenopauseIndicators>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    pub next_period: Option<NaiveDate>,
    pub next_ovulation: Option<NaiveDate>,
    pub fertile_window_start: Option<NaiveDate>,
    pub fertile_window_end: Option<NaiveDate>,
    pub confidence: u8,
}

/// The single stored pattern row for a user, replaced on every recompute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CyclePatterns {
    pub user_id: Uuid,
    pub analysis: PatternAnalysis,
    pub prediction: Prediction,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    CyclePattern,
    SymptomCorrelation,
    LifeStageTransition,
    EnergyPattern,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

/// Insight text and scoring, independent of who it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightContent {
    pub insight_type: InsightType,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    pub confidence_score: u8,
}

/// Append-only insight row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthInsight {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: InsightContent,
    pub created_at: DateTime<Utc>,
}

impl HealthInsight {
    pub fn new(user_id: Uuid, content: InsightContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content,
            created_at: Utc::now(),
        }
    }
}

/// A journal entry as supplied by the journaling subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub date: NaiveDate,
    pub mood: Option<f64>,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    MoodCycle,
    EnergyCycle,
    SleepCycle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedPair {
    pub date: NaiveDate,
    pub phase: CyclePhase,
    pub health_value: f64,
    pub journal_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhaseBreakdown {
    pub sample_size: usize,
    pub health_average: f64,
    pub journal_average: Option<f64>,
    pub pairs: Vec<MatchedPair>,
}

/// Result of one correlation axis, independent of who it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationFinding {
    pub correlation_type: CorrelationType,
    pub correlation_coefficient: f64,
    pub sample_size: usize,
    pub analysis_start_date: NaiveDate,
    pub analysis_end_date: NaiveDate,
    pub analysis_results: BTreeMap<CyclePhase, PhaseBreakdown>,
    pub key_insights: Vec<String>,
}

/// Append-only correlation row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthJournalCorrelation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub finding: CorrelationFinding,
    pub created_at: DateTime<Utc>,
}

impl HealthJournalCorrelation {
    pub fn new(user_id: Uuid, finding: CorrelationFinding) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            finding,
            created_at: Utc::now(),
        }
    }
}
