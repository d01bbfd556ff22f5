//! Rule-based insight generation.
//!
//! Each rule in [`RULES`] looks at the same [`InsightInput`] and may emit any
//! number of insights. Thresholds and confidences live in
//! [`InsightThresholds`] so they can be tuned through configuration.

use std::collections::BTreeMap;

use crate::config::InsightThresholds;
use crate::models::{
    CyclePhase, DailyHealthRecord, InsightContent, InsightType, PatternAnalysis, Prediction,
    Severity,
};

pub struct InsightInput<'a> {
    pub records: &'a [DailyHealthRecord],
    pub analysis: &'a PatternAnalysis,
    pub prediction: &'a Prediction,
}

pub type RuleFn = fn(&InsightInput<'_>, &InsightThresholds) -> Vec<InsightContent>;

pub struct InsightRule {
    pub name: &'static str,
    pub insight_type: InsightType,
    pub evaluate: RuleFn,
}

pub const RULES: &[InsightRule] = &[
    InsightRule {
        name: "irregular_cycle",
        insight_type: InsightType::CyclePattern,
        evaluate: irregular_cycle,
    },
    InsightRule {
        name: "regular_cycle",
        insight_type: InsightType::CyclePattern,
        evaluate: regular_cycle,
    },
    InsightRule {
        name: "high_phase_symptom",
        insight_type: InsightType::SymptomCorrelation,
        evaluate: high_phase_symptoms,
    },
    InsightRule {
        name: "perimenopause",
        insight_type: InsightType::LifeStageTransition,
        evaluate: perimenopause,
    },
    InsightRule {
        name: "menopause",
        insight_type: InsightType::LifeStageTransition,
        evaluate: menopause,
    },
    InsightRule {
        name: "energy_fluctuation",
        insight_type: InsightType::EnergyPattern,
        evaluate: energy_fluctuation,
    },
];

/// Run every rule in table order.
pub fn generate_insights(
    input: &InsightInput<'_>,
    thresholds: &InsightThresholds,
) -> Vec<InsightContent> {
    RULES
        .iter()
        .flat_map(|rule| {
            let found = (rule.evaluate)(input, thresholds);
            debug_assert!(found.iter().all(|i| i.insight_type == rule.insight_type));
            if !found.is_empty() {
                tracing::debug!(rule = rule.name, count = found.len(), "insight rule fired");
            }
            found
        })
        .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// `hot_flashes` -> `Hot Flashes`
fn display_name(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalized(phase: CyclePhase) -> String {
    display_name(phase.as_str())
}

fn irregular_cycle(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let Some(score) = input.analysis.cycle_regularity_score else {
        return vec![];
    };
    if score >= t.regularity_low {
        return vec![];
    }
    vec![InsightContent {
        insight_type: InsightType::CyclePattern,
        title: "Irregular Cycle Pattern Detected".into(),
        description: format!(
            "Your cycle regularity score is {score}/100. Cycle lengths have varied noticeably \
             over your recent history."
        ),
        severity: Severity::Low,
        recommendations: strings(&[
            "Keep logging period start and end dates to sharpen the pattern",
            "Note stress, travel, illness or sleep changes that may shift your cycle",
            "Consider discussing persistent irregularity with a healthcare provider",
        ]),
        confidence_score: t.irregular_confidence,
    }]
}

fn regular_cycle(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let Some(score) = input.analysis.cycle_regularity_score else {
        return vec![];
    };
    if score <= t.regularity_high {
        return vec![];
    }
    let mut description = format!("Your cycle regularity score is {score}/100.");
    if let Some(next) = input.prediction.next_period {
        description.push_str(&format!(" Your next period is expected around {next}."));
    }
    vec![InsightContent {
        insight_type: InsightType::CyclePattern,
        title: "Very Regular Cycle Pattern".into(),
        description,
        severity: Severity::Info,
        recommendations: strings(&["Keep tracking to keep predictions accurate"]),
        confidence_score: t.regular_confidence,
    }]
}

fn high_phase_symptoms(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let mut found = Vec::new();
    for (phase, pattern) in &input.analysis.symptom_patterns {
        // a name logged as both physical and emotional is reported once, at its worse average
        let mut severe: BTreeMap<&str, f64> = BTreeMap::new();
        let symptoms = pattern.physical.iter().chain(pattern.emotional.iter());
        for (symptom, average) in symptoms.filter(|(_, avg)| **avg > t.symptom_severity) {
            let worst = severe.entry(symptom.as_str()).or_insert(*average);
            *worst = worst.max(*average);
        }
        for (symptom, average) in severe {
            let days = input
                .records
                .iter()
                .filter(|r| r.cycle_phase == Some(*phase))
                .filter(|r| {
                    r.physical_symptoms.contains_key(symptom)
                        || r.emotional_symptoms.contains_key(symptom)
                })
                .count();
            let name = display_name(symptom);
            found.push(InsightContent {
                insight_type: InsightType::SymptomCorrelation,
                title: format!("High {name} During {} Phase", capitalized(*phase)),
                description: format!(
                    "{name} averaged {average:.1}/10 across {days} logged days in your {} phase.",
                    phase.as_str()
                ),
                severity: Severity::Medium,
                recommendations: vec![
                    format!("Plan lighter days around your {} phase", phase.as_str()),
                    format!("Track what eases {} so you can prepare ahead", name.to_lowercase()),
                    "Talk to a healthcare provider if severity keeps interfering with daily life"
                        .to_string(),
                ],
                confidence_score: t.symptom_confidence,
            });
        }
    }
    found
}

fn perimenopause(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let Some(indicators) = &input.analysis.perimenopause_indicators else {
        return vec![];
    };
    if indicators.score <= t.perimenopause_score {
        return vec![];
    }
    let signals: Vec<&str> = [
        (indicators.irregular_cycles, "irregular cycles"),
        (indicators.missed_periods, "missed periods"),
        (indicators.hot_flashes, "hot flashes"),
        (indicators.sleep_issues, "sleep issues"),
        (indicators.mood_changes, "mood changes"),
    ]
    .into_iter()
    .filter_map(|(flag, label)| flag.then_some(label))
    .collect();

    vec![InsightContent {
        insight_type: InsightType::LifeStageTransition,
        title: "Possible Perimenopause Indicators".into(),
        description: format!(
            "Your recent data shows {} (indicator score {}/100).",
            signals.join(", "),
            indicators.score
        ),
        severity: Severity::Medium,
        recommendations: strings(&[
            "Discuss these changes with a healthcare provider",
            "Keep tracking hot flashes, sleep and mood to see how they evolve",
            "Prioritize consistent sleep and stress management",
        ]),
        confidence_score: indicators.score.min(100),
    }]
}

fn menopause(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let Some(indicators) = &input.analysis.menopause_indicators else {
        return vec![];
    };
    if indicators.score <= t.menopause_score {
        return vec![];
    }
    let gap = if indicators.no_periods_12_months {
        "No period has been logged in the last 12 months"
    } else if indicators.no_periods_6_months {
        "No period has been logged in the last 6 months"
    } else {
        "Your period history has changed"
    };
    let mut description = gap.to_string();
    if indicators.persistent_symptoms {
        description.push_str(", and hot flashes have been frequent and strong recently");
    }
    description.push('.');

    vec![InsightContent {
        insight_type: InsightType::LifeStageTransition,
        title: "Possible Menopause Transition".into(),
        description,
        severity: Severity::Medium,
        recommendations: strings(&[
            "Talk to a healthcare provider about confirming your life stage",
            "Ask about bone and heart health screening",
            "Keep logging symptoms to support that conversation",
        ]),
        confidence_score: indicators.score.min(100),
    }]
}

fn energy_fluctuation(input: &InsightInput<'_>, t: &InsightThresholds) -> Vec<InsightContent> {
    let averages: Vec<(CyclePhase, f64)> = input
        .analysis
        .energy_patterns
        .iter()
        .filter_map(|(phase, pattern)| pattern.average.map(|a| (*phase, a)))
        .collect();

    let highest = averages.iter().max_by(|a, b| a.1.total_cmp(&b.1));
    let lowest = averages.iter().min_by(|a, b| a.1.total_cmp(&b.1));
    let (Some(&(high_phase, high)), Some(&(low_phase, low))) = (highest, lowest) else {
        return vec![];
    };
    if high - low <= t.energy_spread {
        return vec![];
    }

    vec![InsightContent {
        insight_type: InsightType::EnergyPattern,
        title: "Significant Energy Fluctuations".into(),
        description: format!(
            "Your energy peaks during your {} phase ({high:.1}/10) and dips during your {} \
             phase ({low:.1}/10).",
            high_phase.as_str(),
            low_phase.as_str()
        ),
        severity: Severity::Info,
        recommendations: vec![
            format!(
                "Schedule demanding work and workouts in your {} phase",
                high_phase.as_str()
            ),
            format!("Leave room for rest during your {} phase", low_phase.as_str()),
        ],
        confidence_score: t.energy_confidence,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MenopauseIndicators, MetricPattern, PerimenopauseIndicators, SymptomPattern};

    fn run(analysis: &PatternAnalysis) -> Vec<InsightContent> {
        let prediction = Prediction::default();
        let input = InsightInput {
            records: &[],
            analysis,
            prediction: &prediction,
        };
        generate_insights(&input, &InsightThresholds::default())
    }

    fn with_regularity(score: u8) -> PatternAnalysis {
        PatternAnalysis {
            cycle_regularity_score: Some(score),
            ..Default::default()
        }
    }

    #[test]
    fn nothing_fires_on_empty_analysis() {
        assert!(run(&PatternAnalysis::default()).is_empty());
    }

    #[test]
    fn regularity_boundaries_are_exclusive() {
        assert!(run(&with_regularity(60)).is_empty());
        assert!(run(&with_regularity(85)).is_empty());

        let low = run(&with_regularity(59));
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].title, "Irregular Cycle Pattern Detected");
        assert_eq!(low[0].severity, Severity::Low);
        assert_eq!(low[0].confidence_score, 80);
        assert_eq!(low[0].recommendations.len(), 3);

        let high = run(&with_regularity(86));
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].title, "Very Regular Cycle Pattern");
        assert_eq!(high[0].severity, Severity::Info);
        assert_eq!(high[0].confidence_score, 90);
    }

    #[test]
    fn one_insight_per_severe_phase_symptom() {
        let mut luteal = SymptomPattern {
            sample_size: 4,
            ..Default::default()
        };
        luteal.physical.insert("cramps".into(), 8.5);
        luteal.physical.insert("bloating".into(), 7.0);
        luteal.emotional.insert("irritability".into(), 7.5);

        let mut analysis = PatternAnalysis::default();
        analysis.symptom_patterns.insert(CyclePhase::Luteal, luteal);

        let insights = run(&analysis);
        let titles: Vec<&str> = insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["High Cramps During Luteal Phase", "High Irritability During Luteal Phase"]
        );
        assert!(insights
            .iter()
            .all(|i| i.severity == Severity::Medium && i.confidence_score == 75));
    }

    #[test]
    fn symptom_in_both_categories_is_reported_once() {
        let mut menstrual = SymptomPattern {
            sample_size: 3,
            ..Default::default()
        };
        menstrual.physical.insert("fatigue".into(), 7.5);
        menstrual.emotional.insert("fatigue".into(), 9.0);

        let mut analysis = PatternAnalysis::default();
        analysis
            .symptom_patterns
            .insert(CyclePhase::Menstrual, menstrual);

        let insights = run(&analysis);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "High Fatigue During Menstrual Phase");
        assert!(insights[0].description.contains("9.0/10"));
    }

    #[test]
    fn life_stage_insights_use_raw_score_as_confidence() {
        let analysis = PatternAnalysis {
            perimenopause_indicators: Some(PerimenopauseIndicators {
                score: 45,
                missed_periods: true,
                hot_flashes: true,
                ..Default::default()
            }),
            menopause_indicators: Some(MenopauseIndicators {
                score: 75,
                no_periods_12_months: true,
                persistent_symptoms: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let insights = run(&analysis);
        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0].insight_type, InsightType::LifeStageTransition);
        assert_eq!(insights[0].confidence_score, 45);
        assert!(insights[0].description.contains("missed periods, hot flashes"));
        assert_eq!(insights[1].confidence_score, 75);
    }

    #[test]
    fn life_stage_thresholds_are_strict() {
        let analysis = PatternAnalysis {
            perimenopause_indicators: Some(PerimenopauseIndicators {
                score: 40,
                ..Default::default()
            }),
            menopause_indicators: Some(MenopauseIndicators {
                score: 50,
                no_periods_12_months: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(run(&analysis).is_empty());
    }

    #[test]
    fn energy_spread_names_extremes() {
        let mut analysis = PatternAnalysis::default();
        for (phase, avg) in [
            (CyclePhase::Menstrual, 3.0),
            (CyclePhase::Follicular, 7.5),
            (CyclePhase::Luteal, 5.0),
        ] {
            analysis.energy_patterns.insert(
                phase,
                MetricPattern {
                    sample_size: 5,
                    average: Some(avg),
                },
            );
        }
        let insights = run(&analysis);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Significant Energy Fluctuations");
        assert!(insights[0].description.contains("follicular"));
        assert!(insights[0].description.contains("menstrual"));
        assert_eq!(insights[0].confidence_score, 70);

        analysis.energy_patterns.insert(
            CyclePhase::Follicular,
            MetricPattern {
                sample_size: 5,
                average: Some(6.0),
            },
        );
        assert!(run(&analysis).is_empty());
    }

    #[test]
    fn display_names_are_title_cased() {
        assert_eq!(display_name("hot_flashes"), "Hot Flashes");
        assert_eq!(display_name("cramps"), "Cramps");
    }
}
