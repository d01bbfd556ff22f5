//! Cross-checks cycle-tracked ratings against journal entries written on the
//! same days.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{
    CorrelationFinding, CorrelationType, CyclePhase, DailyHealthRecord, JournalEntry, MatchedPair,
    PhaseBreakdown,
};
use crate::stats::{mean, pearson, round1};

/// Value assumed for a journal entry that did not record mood or energy.
pub const NEUTRAL_JOURNAL_VALUE: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
struct JournalDay {
    mood: f64,
    energy: f64,
}

/// Produce up to three findings: mood and energy against the journal, plus
/// the spread of sleep quality across phases. Axes with fewer than
/// `min_samples` data points are skipped.
pub fn analyze_correlations(
    records: &[DailyHealthRecord],
    journal: &[JournalEntry],
    min_samples: usize,
) -> Vec<CorrelationFinding> {
    let days = journal_by_date(journal);

    let mut findings = Vec::new();
    findings.extend(journal_axis(
        records,
        &days,
        CorrelationType::MoodCycle,
        |r| r.mood_rating,
        |d| d.mood,
        min_samples,
    ));
    findings.extend(journal_axis(
        records,
        &days,
        CorrelationType::EnergyCycle,
        |r| r.energy_level,
        |d| d.energy,
        min_samples,
    ));
    findings.extend(sleep_axis(records, min_samples));
    findings
}

/// Average same-day journal entries.
fn journal_by_date(journal: &[JournalEntry]) -> BTreeMap<NaiveDate, JournalDay> {
    let mut grouped: BTreeMap<NaiveDate, Vec<&JournalEntry>> = BTreeMap::new();
    for entry in journal {
        grouped.entry(entry.date).or_default().push(entry);
    }
    grouped
        .into_iter()
        .map(|(date, entries)| {
            let moods: Vec<f64> = entries
                .iter()
                .map(|e| e.mood.unwrap_or(NEUTRAL_JOURNAL_VALUE))
                .collect();
            let energies: Vec<f64> = entries
                .iter()
                .map(|e| e.energy.unwrap_or(NEUTRAL_JOURNAL_VALUE))
                .collect();
            let day = JournalDay {
                mood: mean(&moods).unwrap_or(NEUTRAL_JOURNAL_VALUE),
                energy: mean(&energies).unwrap_or(NEUTRAL_JOURNAL_VALUE),
            };
            (date, day)
        })
        .collect()
}

fn journal_axis(
    records: &[DailyHealthRecord],
    days: &BTreeMap<NaiveDate, JournalDay>,
    correlation_type: CorrelationType,
    health: fn(&DailyHealthRecord) -> Option<u8>,
    journal: fn(&JournalDay) -> f64,
    min_samples: usize,
) -> Option<CorrelationFinding> {
    let pairs: Vec<MatchedPair> = records
        .iter()
        .filter_map(|r| {
            let phase = r.cycle_phase?;
            let value = health(r)?;
            let day = days.get(&r.date)?;
            Some(MatchedPair {
                date: r.date,
                phase,
                health_value: f64::from(value),
                journal_value: journal(day),
            })
        })
        .collect();

    if pairs.len() < min_samples || pairs.is_empty() {
        return None;
    }

    let xs: Vec<f64> = pairs.iter().map(|p| p.health_value).collect();
    let ys: Vec<f64> = pairs.iter().map(|p| p.journal_value).collect();
    let r = pearson(&xs, &ys);

    let start = pairs.iter().map(|p| p.date).min()?;
    let end = pairs.iter().map(|p| p.date).max()?;

    let mut by_phase: BTreeMap<CyclePhase, Vec<MatchedPair>> = BTreeMap::new();
    for pair in &pairs {
        by_phase.entry(pair.phase).or_default().push(pair.clone());
    }
    let analysis_results: BTreeMap<CyclePhase, PhaseBreakdown> = by_phase
        .into_iter()
        .map(|(phase, pairs)| {
            let health: Vec<f64> = pairs.iter().map(|p| p.health_value).collect();
            let journal: Vec<f64> = pairs.iter().map(|p| p.journal_value).collect();
            let breakdown = PhaseBreakdown {
                sample_size: pairs.len(),
                health_average: mean(&health).unwrap_or_default(),
                journal_average: mean(&journal),
                pairs,
            };
            (phase, breakdown)
        })
        .collect();

    let label = match correlation_type {
        CorrelationType::MoodCycle => "mood",
        CorrelationType::EnergyCycle => "energy",
        CorrelationType::SleepCycle => "sleep",
    };
    let mut key_insights = vec![format!(
        "{} between your tracked {label} and your journal {label} (r = {r:.2})",
        describe_strength(r)
    )];
    let best = analysis_results
        .iter()
        .filter_map(|(phase, b)| b.journal_average.map(|avg| (*phase, avg)))
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((phase, avg)) = best {
        key_insights.push(format!(
            "Your journal {label} is highest during your {} phase ({:.1}/10)",
            phase.as_str(),
            avg
        ));
    }

    Some(CorrelationFinding {
        correlation_type,
        correlation_coefficient: r,
        sample_size: pairs.len(),
        analysis_start_date: start,
        analysis_end_date: end,
        analysis_results,
        key_insights,
    })
}

/// Single-variable proxy: how far apart the per-phase sleep averages are.
fn sleep_axis(records: &[DailyHealthRecord], min_samples: usize) -> Option<CorrelationFinding> {
    let samples: Vec<(NaiveDate, CyclePhase, f64)> = records
        .iter()
        .filter_map(|r| Some((r.date, r.cycle_phase?, f64::from(r.sleep_quality?))))
        .collect();
    if samples.len() < min_samples || samples.is_empty() {
        return None;
    }

    let mut by_phase: BTreeMap<CyclePhase, Vec<f64>> = BTreeMap::new();
    for (_, phase, quality) in &samples {
        by_phase.entry(*phase).or_default().push(*quality);
    }
    if by_phase.len() < 2 {
        return None;
    }

    let analysis_results: BTreeMap<CyclePhase, PhaseBreakdown> = by_phase
        .iter()
        .map(|(phase, values)| {
            let breakdown = PhaseBreakdown {
                sample_size: values.len(),
                health_average: mean(values).unwrap_or_default(),
                journal_average: None,
                pairs: Vec::new(),
            };
            (*phase, breakdown)
        })
        .collect();

    let best = analysis_results
        .iter()
        .max_by(|a, b| a.1.health_average.total_cmp(&b.1.health_average))?;
    let worst = analysis_results
        .iter()
        .min_by(|a, b| a.1.health_average.total_cmp(&b.1.health_average))?;
    let spread = best.1.health_average - worst.1.health_average;

    let key_insights = vec![
        format!(
            "Sleep quality is best during your {} phase ({:.1}/10) and lowest during your {} phase ({:.1}/10)",
            best.0.as_str(),
            best.1.health_average,
            worst.0.as_str(),
            worst.1.health_average
        ),
        format!(
            "Sleep quality varies by {} points across your cycle",
            round1(spread)
        ),
    ];

    Some(CorrelationFinding {
        correlation_type: CorrelationType::SleepCycle,
        correlation_coefficient: spread / 10.0,
        sample_size: samples.len(),
        analysis_start_date: samples.iter().map(|s| s.0).min()?,
        analysis_end_date: samples.iter().map(|s| s.0).max()?,
        analysis_results,
        key_insights,
    })
}

/// "Strong positive correlation", "Weak negative correlation", ...
pub fn describe_strength(r: f64) -> String {
    let strength = if r.abs() > 0.7 {
        "Strong"
    } else if r.abs() > 0.4 {
        "Moderate"
    } else {
        "Weak"
    };
    let sign = if r < 0.0 { "negative" } else { "positive" };
    format!("{strength} {sign} correlation")
}
