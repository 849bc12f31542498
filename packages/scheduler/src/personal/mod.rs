//! Personal Parameter Estimation
//!
//! Derives learner-specific scheduling parameters from raw answer history:
//! - learning speed from trials-to-first-correct
//! - forgetting speed from how long items stay correct before a lapse
//! - consolidation threshold from reviews needed to reach a 5-streak
//! - response-time profile (mean +/- 1 sd, consistency)
//! - confidence from sample size
//!
//! `estimate` is a pure function of its input.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::sanitize::{is_valid_response_time, sanitize_timestamp};
use crate::types::{
    LearningHistory, PersonalParameters, ResponseTimeProfile, EPSILON, MIN_HISTORY_SAMPLES,
    MS_PER_DAY,
};

const CONSOLIDATION_STREAK: u32 = 5;
const CONSOLIDATION_FACTOR: f64 = 0.6;
const MIN_CONSOLIDATION_THRESHOLD: f64 = 2.0;
const MAX_CONSOLIDATION_THRESHOLD: f64 = 5.0;
const CONFIDENCE_RAMP_END: usize = 50;
const CONFIDENCE_HIGH_END: usize = 100;

/// Minimum confidence before parameters are worth applying
pub const MIN_APPLICABLE_CONFIDENCE: f64 = 0.3;

/// Distance from neutral parameters that counts as a significant deviation
pub const SIGNIFICANT_DEVIATION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicabilityPattern {
    InsufficientData,
    LowConfidence,
    StandardPattern,
    SignificantDeviation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterApplicability {
    pub should_apply: bool,
    pub pattern: ApplicabilityPattern,
    /// Distance from the neutral 1.0 / 1.0 / 3 parameters
    pub deviation: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
struct Answer {
    timestamp: i64,
    is_correct: bool,
}

#[derive(Debug, Clone, Default)]
struct ItemSummary {
    trials_to_first_correct: f64,
    correct_durations_days: Vec<f64>,
    reviews_to_streak: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PersonalParameterEstimator;

impl PersonalParameterEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, history: &[LearningHistory]) -> PersonalParameters {
        let sample_size = history.len();
        if sample_size < MIN_HISTORY_SAMPLES {
            return PersonalParameters {
                sample_size,
                last_updated: newest_timestamp(history),
                ..PersonalParameters::default()
            };
        }

        let items = group_by_item(history);
        let summaries: Vec<ItemSummary> = items
            .par_iter()
            .map(|(_, records)| summarize_item(records))
            .collect();

        PersonalParameters {
            learning_speed: learning_speed(&summaries),
            forgetting_speed: forgetting_speed(&summaries),
            consolidation_threshold: consolidation_threshold(&summaries),
            response_time_profile: response_time_profile(history),
            confidence_level: confidence_level(sample_size),
            sample_size,
            last_updated: newest_timestamp(history),
        }
    }

    pub fn calculate_parameter_applicability(
        &self,
        params: &PersonalParameters,
    ) -> ParameterApplicability {
        calculate_parameter_applicability(params)
    }
}

/// Gate on whether a caller should apply personalization at all
pub fn calculate_parameter_applicability(params: &PersonalParameters) -> ParameterApplicability {
    let deviation = deviation_from_neutral(params);

    if params.sample_size < MIN_HISTORY_SAMPLES {
        return ParameterApplicability {
            should_apply: false,
            pattern: ApplicabilityPattern::InsufficientData,
            deviation,
            reason: format!(
                "only {} answers recorded, need {MIN_HISTORY_SAMPLES}",
                params.sample_size
            ),
        };
    }

    if params.confidence_level < MIN_APPLICABLE_CONFIDENCE {
        return ParameterApplicability {
            should_apply: false,
            pattern: ApplicabilityPattern::LowConfidence,
            deviation,
            reason: format!(
                "confidence {:.2} below {MIN_APPLICABLE_CONFIDENCE}",
                params.confidence_level
            ),
        };
    }

    if deviation > SIGNIFICANT_DEVIATION {
        ParameterApplicability {
            should_apply: true,
            pattern: ApplicabilityPattern::SignificantDeviation,
            deviation,
            reason: format!(
                "significant individual deviation ({deviation:.2}): learning {:.1}, forgetting {:.1}",
                params.learning_speed, params.forgetting_speed
            ),
        }
    } else {
        ParameterApplicability {
            should_apply: true,
            pattern: ApplicabilityPattern::StandardPattern,
            deviation,
            reason: format!("standard pattern (deviation {deviation:.2})"),
        }
    }
}

fn deviation_from_neutral(params: &PersonalParameters) -> f64 {
    (params.learning_speed - 1.0).abs()
        + (params.forgetting_speed - 1.0).abs()
        + (params.consolidation_threshold - 3.0).abs() / 3.0
}

/// Newest non-negative timestamp; the reference point for sanitizing the rest
fn newest_timestamp(history: &[LearningHistory]) -> i64 {
    history
        .iter()
        .map(|h| h.timestamp)
        .filter(|&ts| ts >= 0)
        .max()
        .unwrap_or(0)
}

fn group_by_item(history: &[LearningHistory]) -> Vec<(&str, Vec<Answer>)> {
    let reference = newest_timestamp(history);
    let mut grouped: BTreeMap<&str, Vec<Answer>> = BTreeMap::new();
    for record in history {
        grouped.entry(record.word_id.as_str()).or_default().push(Answer {
            timestamp: sanitize_timestamp(record.timestamp, reference),
            is_correct: record.is_correct,
        });
    }
    grouped
        .into_iter()
        .map(|(word, mut answers)| {
            answers.sort_by_key(|a| a.timestamp);
            (word, answers)
        })
        .collect()
}

fn summarize_item(records: &[Answer]) -> ItemSummary {
    let trials_to_first_correct = records
        .iter()
        .position(|r| r.is_correct)
        .map(|idx| (idx + 1) as f64)
        // never answered correctly: count one trial past everything seen
        .unwrap_or((records.len() + 1) as f64);

    let mut correct_durations_days = Vec::new();
    let mut run_start: Option<i64> = None;
    let mut streak = 0u32;
    let mut reviews_to_streak = None;

    for (idx, record) in records.iter().enumerate() {
        if record.is_correct {
            run_start.get_or_insert(record.timestamp);
            streak += 1;
            if streak == CONSOLIDATION_STREAK && reviews_to_streak.is_none() {
                reviews_to_streak = Some((idx + 1) as f64);
            }
        } else {
            if let Some(start) = run_start.take() {
                let days =
                    record.timestamp.saturating_sub(start).max(0) as f64 / MS_PER_DAY as f64;
                correct_durations_days.push(days);
            }
            streak = 0;
        }
    }

    ItemSummary {
        trials_to_first_correct,
        correct_durations_days,
        reviews_to_streak,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn learning_speed(summaries: &[ItemSummary]) -> f64 {
    let trials: Vec<f64> = summaries.iter().map(|s| s.trials_to_first_correct).collect();
    let Some(avg) = mean(&trials) else {
        return 1.0;
    };
    if avg <= 2.0 {
        1.8
    } else if avg <= 2.5 {
        1.5
    } else if avg <= 3.5 {
        1.0
    } else if avg <= 5.0 {
        0.7
    } else {
        0.5
    }
}

fn forgetting_speed(summaries: &[ItemSummary]) -> f64 {
    let durations: Vec<f64> = summaries
        .iter()
        .flat_map(|s| s.correct_durations_days.iter().copied())
        .collect();
    let Some(avg) = mean(&durations) else {
        return 1.0;
    };
    if avg >= 7.0 {
        0.6
    } else if avg >= 5.0 {
        0.8
    } else if avg >= 3.0 {
        1.0
    } else if avg >= 1.0 {
        1.5
    } else {
        2.0
    }
}

fn consolidation_threshold(summaries: &[ItemSummary]) -> f64 {
    let counts: Vec<f64> = summaries.iter().filter_map(|s| s.reviews_to_streak).collect();
    match mean(&counts) {
        Some(avg) => (avg * CONSOLIDATION_FACTOR)
            .clamp(MIN_CONSOLIDATION_THRESHOLD, MAX_CONSOLIDATION_THRESHOLD),
        None => 3.0,
    }
}

fn response_time_profile(history: &[LearningHistory]) -> ResponseTimeProfile {
    let times: Vec<f64> = history
        .iter()
        .map(|h| h.response_time)
        .filter(|rt| is_valid_response_time(*rt))
        .collect();
    let Some(avg) = mean(&times) else {
        return ResponseTimeProfile::default();
    };

    let variance = times.iter().map(|t| (t - avg).powi(2)).sum::<f64>() / times.len() as f64;
    let std_dev = variance.sqrt();
    let cv = if avg > EPSILON { std_dev / avg } else { 1.0 };

    ResponseTimeProfile {
        average_response_time: avg,
        fast_threshold: (avg - std_dev).max(0.0),
        slow_threshold: avg + std_dev,
        consistency_score: (1.0 - cv).clamp(0.0, 1.0),
    }
}

/// 0 below the minimum, 0 -> 0.7 up to 50 samples, 0.7 -> 0.9 up to 100,
/// then approaches 1.0
pub fn confidence_level(sample_size: usize) -> f64 {
    if sample_size < MIN_HISTORY_SAMPLES {
        return 0.0;
    }
    let n = sample_size as f64;
    if sample_size <= CONFIDENCE_RAMP_END {
        let span = (CONFIDENCE_RAMP_END - MIN_HISTORY_SAMPLES) as f64;
        0.7 * (n - MIN_HISTORY_SAMPLES as f64) / span
    } else if sample_size <= CONFIDENCE_HIGH_END {
        let span = (CONFIDENCE_HIGH_END - CONFIDENCE_RAMP_END) as f64;
        0.7 + 0.2 * (n - CONFIDENCE_RAMP_END as f64) / span
    } else {
        let beyond = n - CONFIDENCE_HIGH_END as f64;
        0.9 + 0.1 * (1.0 - (-beyond / CONFIDENCE_HIGH_END as f64).exp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn record(word: &str, day: i64, is_correct: bool, rt: f64) -> LearningHistory {
        LearningHistory {
            word_id: word.to_string(),
            timestamp: T0 + day * MS_PER_DAY,
            is_correct,
            response_time: rt,
        }
    }

    #[test]
    fn test_negative_timestamp_collapses_to_newest() {
        let mut history: Vec<_> = (0..20)
            .map(|i| record(&format!("w{i}"), 0, true, 1200.0))
            .collect();
        let newest = T0 + 3 * MS_PER_DAY;
        history.push(LearningHistory {
            word_id: "x".to_string(),
            timestamp: i64::MIN,
            is_correct: true,
            response_time: 1000.0,
        });
        history.push(LearningHistory {
            word_id: "x".to_string(),
            timestamp: newest,
            is_correct: false,
            response_time: 1000.0,
        });

        let estimator = PersonalParameterEstimator::new();
        let params = estimator.estimate(&history);
        assert_eq!(params.last_updated, newest);
        assert_eq!(params.sample_size, 22);
        assert!(params.forgetting_speed.is_finite());
        assert_eq!(params, estimator.estimate(&history));
    }

    #[test]
    fn test_small_history_returns_defaults() {
        let history: Vec<_> = (0..19).map(|i| record("w", i, true, 900.0)).collect();
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert_eq!(params.confidence_level, 0.0);
        assert_eq!(params.learning_speed, 1.0);
        assert_eq!(params.forgetting_speed, 1.0);
        assert_eq!(params.consolidation_threshold, 3.0);
        assert_eq!(params.sample_size, 19);
    }

    #[test]
    fn test_first_attempt_learner_is_fast() {
        let history: Vec<_> = (0..20)
            .map(|i| record(&format!("w{i}"), 0, true, 1200.0))
            .collect();
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert!(
            (1.5..=2.0).contains(&params.learning_speed),
            "learning speed {}",
            params.learning_speed
        );
    }

    #[test]
    fn test_struggling_learner_is_slow() {
        let mut history = Vec::new();
        for w in 0..4 {
            for attempt in 0..6 {
                history.push(record(&format!("w{w}"), attempt, attempt == 5, 2000.0));
            }
        }
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert_eq!(params.learning_speed, 0.5);
    }

    #[test]
    fn test_forgetting_speed_from_lapses() {
        // each item: correct on day 0, wrong on day 8 -> stays correct 8 days
        let mut history = Vec::new();
        for w in 0..10 {
            history.push(record(&format!("w{w}"), 0, true, 1000.0));
            history.push(record(&format!("w{w}"), 8, false, 1000.0));
        }
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert_eq!(params.forgetting_speed, 0.6);

        // lapses within the same day -> fast forgetting
        let mut history = Vec::new();
        for w in 0..10 {
            history.push(record(&format!("w{w}"), 0, true, 1000.0));
            history.push(record(&format!("w{w}"), 0, false, 1000.0));
        }
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert_eq!(params.forgetting_speed, 2.0);
    }

    #[test]
    fn test_consolidation_threshold_clamped() {
        // 5 straight correct per item: 5 reviews * 0.6 = 3
        let mut history = Vec::new();
        for w in 0..4 {
            for i in 0..5 {
                history.push(record(&format!("w{w}"), i, true, 1000.0));
            }
        }
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert!((params.consolidation_threshold - 3.0).abs() < 1e-9);

        // 10 wrong then 5 correct: 15 * 0.6 = 9 -> clamped to 5
        let mut history = Vec::new();
        for w in 0..2 {
            for i in 0..15 {
                history.push(record(&format!("w{w}"), i, i >= 10, 1000.0));
            }
        }
        let params = PersonalParameterEstimator::new().estimate(&history);
        assert_eq!(params.consolidation_threshold, 5.0);
    }

    #[test]
    fn test_response_time_profile() {
        let mut history: Vec<_> = (0..10).map(|i| record(&format!("a{i}"), 0, true, 1000.0)).collect();
        history.extend((0..10).map(|i| record(&format!("b{i}"), 0, true, 3000.0)));
        // invalid values are ignored
        history.push(record("c", 0, true, -1.0));
        history.push(record("d", 0, true, 90_000.0));

        let profile = PersonalParameterEstimator::new().estimate(&history).response_time_profile;
        assert!((profile.average_response_time - 2000.0).abs() < 1e-9);
        assert!((profile.fast_threshold - 1000.0).abs() < 1e-9);
        assert!((profile.slow_threshold - 3000.0).abs() < 1e-9);
        assert!((profile.consistency_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_ramp() {
        assert_eq!(confidence_level(0), 0.0);
        assert_eq!(confidence_level(19), 0.0);
        assert_eq!(confidence_level(20), 0.0);
        assert!((confidence_level(35) - 0.35).abs() < 1e-9);
        assert!((confidence_level(50) - 0.7).abs() < 1e-9);
        assert!((confidence_level(75) - 0.8).abs() < 1e-9);
        assert!((confidence_level(100) - 0.9).abs() < 1e-9);
        let high = confidence_level(1000);
        assert!(high > 0.99 && high < 1.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let history: Vec<_> = (0..60)
            .map(|i| record(&format!("w{}", i % 7), i / 7, i % 3 != 0, 800.0 + i as f64 * 10.0))
            .collect();
        let estimator = PersonalParameterEstimator::new();
        assert_eq!(estimator.estimate(&history), estimator.estimate(&history));
    }

    #[test]
    fn test_applicability_gate() {
        let low = PersonalParameters {
            sample_size: 10,
            ..PersonalParameters::default()
        };
        let result = calculate_parameter_applicability(&low);
        assert!(!result.should_apply);
        assert_eq!(result.pattern, ApplicabilityPattern::InsufficientData);

        let unsure = PersonalParameters {
            sample_size: 25,
            confidence_level: 0.1,
            ..PersonalParameters::default()
        };
        assert_eq!(
            calculate_parameter_applicability(&unsure).pattern,
            ApplicabilityPattern::LowConfidence
        );

        let standard = PersonalParameters {
            sample_size: 80,
            confidence_level: 0.8,
            learning_speed: 1.2,
            ..PersonalParameters::default()
        };
        let result = calculate_parameter_applicability(&standard);
        assert!(result.should_apply);
        assert_eq!(result.pattern, ApplicabilityPattern::StandardPattern);

        let deviant = PersonalParameters {
            sample_size: 80,
            confidence_level: 0.8,
            learning_speed: 1.8,
            forgetting_speed: 0.6,
            ..PersonalParameters::default()
        };
        let result = calculate_parameter_applicability(&deviant);
        assert!(result.should_apply);
        assert_eq!(result.pattern, ApplicabilityPattern::SignificantDeviation);
    }
}
