use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::models::{
    CyclePhase, DailyHealthRecord, MenopauseIndicators, MetricPattern, PatternAnalysis,
    PerimenopauseIndicators, SymptomPattern,
};
use crate::stats::{mean, population_variance, std_deviation};

/// Cycle lengths above this are treated as data errors and dropped.
pub const MAX_CYCLE_LENGTH_DAYS: i64 = 45;
/// How far after a period start we look for its matching end.
pub const PERIOD_END_SEARCH_DAYS: i64 = 10;
pub const MIN_CYCLES_FOR_REGULARITY: usize = 3;

const HOT_FLASHES: &str = "hot_flashes";
const RECENT_WINDOW_DAYS: i64 = 90;
const MOOD_WINDOW_RECORDS: usize = 30;

/// Analyze a window of one user's daily records.
///
/// `records` may be in any order. Windows such as "the last 90 days" are
/// measured back from `as_of`. Missing data shows up as `None` fields, never
/// as an error.
pub fn analyze_patterns(records: &[DailyHealthRecord], as_of: NaiveDate) -> PatternAnalysis {
    if records.is_empty() {
        return PatternAnalysis::default();
    }

    let mut sorted: Vec<&DailyHealthRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let period_starts: Vec<NaiveDate> = sorted
        .iter()
        .filter(|r| r.is_period_start)
        .map(|r| r.date)
        .collect();
    let period_ends: Vec<NaiveDate> = sorted
        .iter()
        .filter(|r| r.is_period_end)
        .map(|r| r.date)
        .collect();

    let cycle_lengths = cycle_lengths(&period_starts);
    let period_lengths = period_lengths(&period_starts, &period_ends);

    PatternAnalysis {
        average_cycle_length: rounded_mean(&cycle_lengths),
        average_period_length: rounded_mean(&period_lengths),
        cycle_regularity_score: regularity_score(&cycle_lengths),
        last_period_start: period_starts.last().copied(),
        last_period_end: period_ends.last().copied(),
        symptom_patterns: symptom_patterns(&sorted),
        mood_patterns: metric_patterns(&sorted, |r| r.mood_rating),
        energy_patterns: metric_patterns(&sorted, |r| r.energy_level),
        perimenopause_indicators: Some(perimenopause_indicators(
            &sorted,
            &period_starts,
            &cycle_lengths,
            as_of,
        )),
        menopause_indicators: Some(menopause_indicators(&sorted, &period_starts, as_of)),
        cycle_lengths,
    }
}

/// Day gaps between consecutive period starts, keeping only `(0, 45]`.
pub fn cycle_lengths(period_starts: &[NaiveDate]) -> Vec<i64> {
    period_starts
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .filter(|len| *len > 0 && *len <= MAX_CYCLE_LENGTH_DAYS)
        .collect()
}

/// Inclusive period lengths. Starts with no end inside the search window are skipped.
pub fn period_lengths(period_starts: &[NaiveDate], period_ends: &[NaiveDate]) -> Vec<i64> {
    period_starts
        .iter()
        .filter_map(|start| {
            period_ends
                .iter()
                .filter(|end| *end >= start)
                .find(|end| (**end - *start).num_days() <= PERIOD_END_SEARCH_DAYS)
                .map(|end| (*end - *start).num_days() + 1)
        })
        .collect()
}

/// `clamp(0, 100, round(100 - 10 * stddev))`, needing at least three cycles.
pub fn regularity_score(cycle_lengths: &[i64]) -> Option<u8> {
    if cycle_lengths.len() < MIN_CYCLES_FOR_REGULARITY {
        return None;
    }
    let sd = std_deviation(&as_f64(cycle_lengths))?;
    Some((100.0 - sd * 10.0).round().clamp(0.0, 100.0) as u8)
}

fn rounded_mean(values: &[i64]) -> Option<u32> {
    mean(&as_f64(values)).map(|m| m.round() as u32)
}

fn as_f64(values: &[i64]) -> Vec<f64> {
    values.iter().map(|v| *v as f64).collect()
}

fn by_phase<'a>(
    records: &[&'a DailyHealthRecord],
) -> BTreeMap<CyclePhase, Vec<&'a DailyHealthRecord>> {
    let mut buckets: BTreeMap<CyclePhase, Vec<&DailyHealthRecord>> = BTreeMap::new();
    for record in records {
        if let Some(phase) = record.cycle_phase {
            buckets.entry(phase).or_default().push(*record);
        }
    }
    buckets
}

fn symptom_patterns(records: &[&DailyHealthRecord]) -> BTreeMap<CyclePhase, SymptomPattern> {
    by_phase(records)
        .into_iter()
        .map(|(phase, bucket)| {
            let pattern = SymptomPattern {
                sample_size: bucket.len(),
                physical: average_symptoms(bucket.iter().map(|r| &r.physical_symptoms)),
                emotional: average_symptoms(bucket.iter().map(|r| &r.emotional_symptoms)),
            };
            (phase, pattern)
        })
        .collect()
}

/// Average each symptom over the records that logged it. Absent keys do not count as zero.
fn average_symptoms<'a>(
    maps: impl Iterator<Item = &'a BTreeMap<String, u8>>,
) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for map in maps {
        for (name, severity) in map {
            let entry = totals.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += f64::from(*severity);
            entry.1 += 1;
        }
    }
    totals
        .into_iter()
        .map(|(name, (sum, count))| (name, sum / count as f64))
        .collect()
}

fn metric_patterns(
    records: &[&DailyHealthRecord],
    metric: impl Fn(&DailyHealthRecord) -> Option<u8>,
) -> BTreeMap<CyclePhase, MetricPattern> {
    by_phase(records)
        .into_iter()
        .map(|(phase, bucket)| {
            let values: Vec<f64> = bucket
                .iter()
                .filter_map(|r| metric(*r))
                .map(f64::from)
                .collect();
            let pattern = MetricPattern {
                sample_size: bucket.len(),
                average: mean(&values),
            };
            (phase, pattern)
        })
        .collect()
}

fn within(date: NaiveDate, as_of: NaiveDate, days: i64) -> bool {
    date > as_of - Duration::days(days)
}

fn perimenopause_indicators(
    records: &[&DailyHealthRecord],
    period_starts: &[NaiveDate],
    cycle_lengths: &[i64],
    as_of: NaiveDate,
) -> PerimenopauseIndicators {
    let mut indicators = PerimenopauseIndicators::default();

    if cycle_lengths.len() >= MIN_CYCLES_FOR_REGULARITY {
        if let Some(variance) = population_variance(&as_f64(cycle_lengths)) {
            if variance > 49.0 {
                indicators.irregular_cycles = true;
                indicators.score += 20;
            }
        }
    }

    let recent_starts = period_starts
        .iter()
        .filter(|d| within(**d, as_of, RECENT_WINDOW_DAYS))
        .count();
    if recent_starts < 2 {
        indicators.missed_periods = true;
        indicators.score += 25;
    }

    if records.iter().any(|r| r.physical_symptom(HOT_FLASHES) > 0) {
        indicators.hot_flashes = true;
        indicators.score += 20;
    }

    let sleep: Vec<f64> = records
        .iter()
        .filter_map(|r| r.sleep_quality)
        .map(f64::from)
        .collect();
    if mean(&sleep).is_some_and(|avg| avg < 6.0) {
        indicators.sleep_issues = true;
        indicators.score += 15;
    }

    // records are ascending, so the tail is the most recent
    let moods: Vec<f64> = records
        .iter()
        .rev()
        .take(MOOD_WINDOW_RECORDS)
        .filter_map(|r| r.mood_rating)
        .map(f64::from)
        .collect();
    if moods.len() >= 2 && population_variance(&moods).is_some_and(|v| v > 4.0) {
        indicators.mood_changes = true;
        indicators.score += 20;
    }

    indicators
}

fn menopause_indicators(
    records: &[&DailyHealthRecord],
    period_starts: &[NaiveDate],
    as_of: NaiveDate,
) -> MenopauseIndicators {
    let mut indicators = MenopauseIndicators::default();
    let starts_within = |days: i64| period_starts.iter().any(|d| within(*d, as_of, days));

    if !starts_within(365) {
        indicators.no_periods_12_months = true;
        indicators.score += 50;
    } else if !starts_within(180) {
        indicators.no_periods_6_months = true;
        indicators.score += 25;
    }

    let persistent_days = records
        .iter()
        .filter(|r| within(r.date, as_of, RECENT_WINDOW_DAYS))
        .filter(|r| r.physical_symptom(HOT_FLASHES) > 3)
        .count();
    if persistent_days > 30 {
        indicators.persistent_symptoms = true;
        indicators.score += 25;
    }

    indicators
}
