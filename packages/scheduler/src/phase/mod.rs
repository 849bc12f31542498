//! Memory Phase Classification
//!
//! Maps an item's review statistics onto one of five memory phases:
//!
//! ENCODING -> INITIAL_CONSOLIDATION -> INTRADAY_REVIEW -> SHORT_TERM -> LONG_TERM
//!
//! Classification is an ordered rule table evaluated first-match-wins against
//! now-relative metrics. Personalization scales the time windows by
//! `1 / learning_speed` and the long-term response-time bar by
//! `learning_speed`.
//!
//! Phases are derived, never stored. `detect_phase` memoizes per item id for
//! five seconds (expired entries are dropped on each miss); call
//! `clear_cache` whenever personalization changes.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;
use crate::sanitize::{sanitize_response_time, sanitize_speed, sanitize_timestamp};
use crate::types::{
    calendar_day, now_ms, MemoryPhase, PersonalParameters, ReviewStatistics, MS_PER_DAY,
    MS_PER_HOUR, MS_PER_SECOND, PHASE_CACHE_TTL_MS,
};

// ==================== Constants ====================

const BASE_ENCODING_TIME_MS: f64 = 30.0 * MS_PER_SECOND as f64;
const BASE_CONSOLIDATION_WINDOW_MS: f64 = MS_PER_HOUR as f64;
const SHORT_TERM_MIN_DAYS: f64 = 1.0;
const BASE_SHORT_TERM_MAX_DAYS: f64 = 7.0;
const BASE_LONG_TERM_RESPONSE_MS: f64 = 1500.0;
const ABANDONED_AFTER_DAYS: f64 = 1000.0;
const MASTERY_OVERRIDE_STREAK: u32 = 100;
const RESET_STREAK: u32 = 100;
const SHORT_TERM_MIN_RATE: f64 = 0.5;
const LONG_TERM_MIN_RATE: f64 = 0.8;

// ==================== Data Structures ====================

/// Now-relative view of the statistics, after sanitization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseMetrics {
    pub now: i64,
    pub time_since_last_review: i64,
    pub days_since_last_review: f64,
    pub time_since_last_correct: Option<i64>,
    pub correct_rate: f64,
    pub average_response_time: f64,
    pub same_day_as_last_correct: bool,
}

/// Rule thresholds after personalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseThresholds {
    pub learning_speed: f64,
    pub encoding_time_ms: f64,
    pub initial_consolidation_window_ms: f64,
    pub short_term_max_days: f64,
    pub long_term_response_time_ms: f64,
}

impl PhaseThresholds {
    pub fn new(personalization: Option<&PersonalParameters>) -> Self {
        let speed = personalization
            .map(|p| sanitize_speed(p.learning_speed))
            .unwrap_or(1.0);
        Self {
            learning_speed: speed,
            encoding_time_ms: BASE_ENCODING_TIME_MS / speed,
            initial_consolidation_window_ms: BASE_CONSOLIDATION_WINDOW_MS / speed,
            short_term_max_days: BASE_SHORT_TERM_MAX_DAYS / speed,
            long_term_response_time_ms: BASE_LONG_TERM_RESPONSE_MS * speed,
        }
    }
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDetectionResult {
    pub phase: MemoryPhase,
    pub reason: String,
    /// Id of the first rule that matched (1-based)
    pub matched_rule: u8,
    pub metrics: PhaseMetrics,
}

pub struct RuleContext<'a> {
    pub stats: &'a ReviewStatistics,
    pub metrics: &'a PhaseMetrics,
    pub thresholds: &'a PhaseThresholds,
}

/// One classification rule. `evaluate` returns the phase and a reason when the
/// rule applies.
pub struct PhaseRule {
    pub id: u8,
    pub name: &'static str,
    pub evaluate: fn(&RuleContext<'_>) -> Option<(MemoryPhase, String)>,
}

// ==================== Rule Table ====================

pub static PHASE_RULES: [PhaseRule; 11] = [
    PhaseRule { id: 1, name: "never_reviewed", evaluate: rule_never_reviewed },
    PhaseRule { id: 2, name: "working_memory", evaluate: rule_working_memory },
    PhaseRule { id: 3, name: "never_correct", evaluate: rule_never_correct },
    PhaseRule { id: 4, name: "abandoned", evaluate: rule_abandoned },
    PhaseRule { id: 5, name: "mastery_override", evaluate: rule_mastery_override },
    PhaseRule { id: 6, name: "needs_reset", evaluate: rule_needs_reset },
    PhaseRule { id: 7, name: "initial_consolidation", evaluate: rule_initial_consolidation },
    PhaseRule { id: 8, name: "intraday_review", evaluate: rule_intraday_review },
    PhaseRule { id: 9, name: "short_term_window", evaluate: rule_short_term_window },
    PhaseRule { id: 10, name: "long_term_window", evaluate: rule_long_term_window },
    PhaseRule { id: 11, name: "default", evaluate: rule_default },
];

pub const DEFAULT_RULE_ID: u8 = 11;

fn rule_never_reviewed(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.stats.review_count == 0)
        .then(|| (MemoryPhase::Encoding, "never reviewed".to_string()))
}

fn rule_working_memory(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    let elapsed = ctx.metrics.time_since_last_review as f64;
    (elapsed < ctx.thresholds.encoding_time_ms).then(|| {
        (
            MemoryPhase::Encoding,
            format!(
                "reviewed {:.0}s ago, still in working memory (< {:.0}s)",
                elapsed / 1000.0,
                ctx.thresholds.encoding_time_ms / 1000.0
            ),
        )
    })
}

fn rule_never_correct(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.stats.correct_count == 0).then(|| {
        (
            MemoryPhase::Encoding,
            format!("no correct answer in {} reviews", ctx.stats.review_count),
        )
    })
}

fn rule_abandoned(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.metrics.days_since_last_review > ABANDONED_AFTER_DAYS).then(|| {
        (
            MemoryPhase::Encoding,
            format!(
                "abandoned: last review {:.0} days ago",
                ctx.metrics.days_since_last_review
            ),
        )
    })
}

fn rule_mastery_override(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.stats.consecutive_correct >= MASTERY_OVERRIDE_STREAK).then(|| {
        (
            MemoryPhase::LongTerm,
            format!(
                "mastery override: {} consecutive correct",
                ctx.stats.consecutive_correct
            ),
        )
    })
}

fn rule_needs_reset(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.stats.consecutive_wrong >= RESET_STREAK).then(|| {
        (
            MemoryPhase::Encoding,
            format!("needs reset: {} consecutive wrong", ctx.stats.consecutive_wrong),
        )
    })
}

fn rule_initial_consolidation(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    if ctx.stats.correct_count != 1 {
        return None;
    }
    let since_correct = ctx.metrics.time_since_last_correct? as f64;
    (since_correct < ctx.thresholds.initial_consolidation_window_ms).then(|| {
        (
            MemoryPhase::InitialConsolidation,
            format!(
                "first correct answer {:.0} min ago, inside binding window",
                since_correct / 60_000.0
            ),
        )
    })
}

fn rule_intraday_review(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    (ctx.metrics.same_day_as_last_correct && ctx.stats.correct_count >= 2).then(|| {
        (
            MemoryPhase::IntradayReview,
            format!("{} correct answers, latest today", ctx.stats.correct_count),
        )
    })
}

fn rule_short_term_window(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    let days = ctx.metrics.days_since_last_review;
    if days < SHORT_TERM_MIN_DAYS || days > ctx.thresholds.short_term_max_days {
        return None;
    }
    let rate = ctx.metrics.correct_rate;
    if rate >= SHORT_TERM_MIN_RATE {
        Some((
            MemoryPhase::ShortTerm,
            format!("{days:.1} days since review, accuracy {:.0}%", rate * 100.0),
        ))
    } else {
        Some((
            MemoryPhase::Encoding,
            format!("forgotten: accuracy {:.0}% after {days:.1} days", rate * 100.0),
        ))
    }
}

fn rule_long_term_window(ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    let days = ctx.metrics.days_since_last_review;
    if days <= ctx.thresholds.short_term_max_days {
        return None;
    }
    let rate = ctx.metrics.correct_rate;
    let rt = ctx.metrics.average_response_time;
    if rate >= LONG_TERM_MIN_RATE && rt < ctx.thresholds.long_term_response_time_ms {
        Some((
            MemoryPhase::LongTerm,
            format!(
                "{days:.1} days retained, accuracy {:.0}%, recall {rt:.0}ms",
                rate * 100.0
            ),
        ))
    } else if rate >= SHORT_TERM_MIN_RATE {
        Some((
            MemoryPhase::ShortTerm,
            format!(
                "{days:.1} days retained but not yet durable (accuracy {:.0}%, recall {rt:.0}ms)",
                rate * 100.0
            ),
        ))
    } else {
        Some((
            MemoryPhase::Encoding,
            format!("forgotten: accuracy {:.0}% after {days:.1} days", rate * 100.0),
        ))
    }
}

fn rule_default(_ctx: &RuleContext<'_>) -> Option<(MemoryPhase, String)> {
    Some((MemoryPhase::ShortTerm, "no specific rule matched".to_string()))
}

// ==================== Transitions ====================

/// Consolidation advances one stage at a time; forgetting may skip stages.
pub fn can_transition(from: MemoryPhase, to: MemoryPhase) -> bool {
    to.stage() <= from.stage() + 1
}

// ==================== Classifier ====================

#[derive(Debug, Clone)]
struct CachedPhase {
    result: PhaseDetectionResult,
    cached_at: i64,
}

#[derive(Debug, Default)]
pub struct MemoryPhaseClassifier {
    config: PhaseConfig,
    cache: Mutex<HashMap<String, CachedPhase>>,
}

impl MemoryPhaseClassifier {
    pub fn new(config: PhaseConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn classify(
        &self,
        stats: &ReviewStatistics,
        personalization: Option<&PersonalParameters>,
    ) -> PhaseDetectionResult {
        self.classify_at(stats, personalization, now_ms())
    }

    pub fn classify_at(
        &self,
        stats: &ReviewStatistics,
        personalization: Option<&PersonalParameters>,
        now: i64,
    ) -> PhaseDetectionResult {
        let thresholds = PhaseThresholds::new(personalization);
        let metrics = self.compute_metrics(stats, now);
        let ctx = RuleContext {
            stats,
            metrics: &metrics,
            thresholds: &thresholds,
        };

        let (phase, reason, matched_rule) = PHASE_RULES
            .iter()
            .find_map(|rule| (rule.evaluate)(&ctx).map(|(phase, reason)| (phase, reason, rule.id)))
            .unwrap_or((
                MemoryPhase::ShortTerm,
                "no specific rule matched".to_string(),
                DEFAULT_RULE_ID,
            ));

        PhaseDetectionResult {
            phase,
            reason,
            matched_rule,
            metrics,
        }
    }

    /// Cached classification keyed by item id
    pub fn detect_phase(
        &self,
        word_id: &str,
        stats: &ReviewStatistics,
        personalization: Option<&PersonalParameters>,
    ) -> PhaseDetectionResult {
        self.detect_phase_at(word_id, stats, personalization, now_ms())
    }

    pub fn detect_phase_at(
        &self,
        word_id: &str,
        stats: &ReviewStatistics,
        personalization: Option<&PersonalParameters>,
        now: i64,
    ) -> PhaseDetectionResult {
        let fresh = |cached: &CachedPhase| {
            (0..PHASE_CACHE_TTL_MS).contains(&now.saturating_sub(cached.cached_at))
        };

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(word_id).filter(|c| fresh(*c)) {
            return cached.result.clone();
        }

        let result = self.classify_at(stats, personalization, now);
        // expired entries go on every miss, so the map stays bounded by recent ids
        cache.retain(|_, cached| fresh(cached));
        cache.insert(
            word_id.to_string(),
            CachedPhase {
                result: result.clone(),
                cached_at: now,
            },
        );
        result
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn invalidate(&self, word_id: &str) {
        self.cache.lock().remove(word_id);
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Uncached classification of many items, in input order
    pub fn classify_batch(
        &self,
        items: &[ReviewStatistics],
        personalization: Option<&PersonalParameters>,
        now: i64,
    ) -> Vec<PhaseDetectionResult> {
        items
            .par_iter()
            .map(|stats| self.classify_at(stats, personalization, now))
            .collect()
    }

    pub fn phase_distribution(
        &self,
        items: &[ReviewStatistics],
        personalization: Option<&PersonalParameters>,
        now: i64,
    ) -> BTreeMap<MemoryPhase, usize> {
        let mut counts: BTreeMap<MemoryPhase, usize> =
            MemoryPhase::ALL.iter().map(|p| (*p, 0)).collect();
        for result in self.classify_batch(items, personalization, now) {
            *counts.entry(result.phase).or_insert(0) += 1;
        }
        counts
    }

    fn compute_metrics(&self, stats: &ReviewStatistics, now: i64) -> PhaseMetrics {
        let last_review = sanitize_timestamp(stats.last_review_time, now);
        let time_since_last_review = now - last_review;

        let last_correct = if stats.correct_count > 0 {
            Some(sanitize_timestamp(
                stats.last_correct_time.unwrap_or(last_review),
                now,
            ))
        } else {
            None
        };

        let offset = self.config.utc_offset_minutes;
        let same_day_as_last_correct = last_correct
            .map(|ts| calendar_day(ts, offset) == calendar_day(now, offset))
            .unwrap_or(false);

        PhaseMetrics {
            now,
            time_since_last_review,
            days_since_last_review: time_since_last_review as f64 / MS_PER_DAY as f64,
            time_since_last_correct: last_correct.map(|ts| now - ts),
            correct_rate: stats.correct_rate(),
            average_response_time: sanitize_response_time(stats.average_response_time),
            same_day_as_last_correct,
        }
    }
}
