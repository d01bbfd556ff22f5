use chrono::Duration;

use crate::models::{PatternAnalysis, Prediction};

/// Ovulation is assumed this many days before the next period.
pub const LUTEAL_PHASE_DAYS: i64 = 14;
/// Fertile window opens this many days before ovulation...
pub const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
/// ...and closes this many days after it.
pub const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;
/// Confidence used when the history is too short for a regularity score.
pub const DEFAULT_CONFIDENCE: u8 = 50;

/// Predict the next period, ovulation and fertile window.
///
/// Needs both a last period start and an average cycle length; without them
/// every date is `None` and confidence is 0.
pub fn predict(analysis: &PatternAnalysis) -> Prediction {
    let (Some(last_start), Some(avg_cycle)) =
        (analysis.last_period_start, analysis.average_cycle_length)
    else {
        return Prediction::default();
    };

    let next_period = last_start + Duration::days(i64::from(avg_cycle));
    let next_ovulation = next_period - Duration::days(LUTEAL_PHASE_DAYS);

    Prediction {
        next_period: Some(next_period),
        next_ovulation: Some(next_ovulation),
        fertile_window_start: Some(next_ovulation - Duration::days(FERTILE_DAYS_BEFORE_OVULATION)),
        fertile_window_end: Some(next_ovulation + Duration::days(FERTILE_DAYS_AFTER_OVULATION)),
        confidence: analysis
            .cycle_regularity_score
            .unwrap_or(DEFAULT_CONFIDENCE),
    }
}
