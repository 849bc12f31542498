use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{QuestionCategory, QueueType, MIN_THRESHOLD};

// ==================== Completion criteria ====================

/// Correct rate required for acquisition
pub const COMPLETION_MIN_CORRECT_RATE: f64 = 0.85;

/// Current streak required for acquisition
pub const COMPLETION_MIN_STREAK: u32 = 4;

/// Distinct tiers that must have produced a correct answer today
pub const COMPLETION_MIN_TIERS: usize = 3;

/// Lifetime attempts required for acquisition
pub const COMPLETION_MIN_ATTEMPTS: u32 = 6;

/// Trailing attempts that must all be correct
pub const COMPLETION_RECENT_WINDOW: usize = 4;

/// Streak at which the dynamic threshold starts relaxing
pub const THRESHOLD_RELAX_STREAK: u32 = 5;

/// Threshold growth per wrong answer
pub const THRESHOLD_WRONG_PENALTY: u32 = 2;

// ==================== Records ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAttempt {
    pub timestamp: i64,
    pub is_correct: bool,
    /// Tier the item was answered from, if it was queued
    pub queue: Option<QueueType>,
    pub response_time: Option<f64>,
}

/// Per-item mastery bookkeeping owned by the queue manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionProgress {
    pub word_id: String,
    pub category: QuestionCategory,
    pub base_difficulty: u8,
    pub today_correct_count: u32,
    pub today_wrong_count: u32,
    pub is_acquisition_complete: bool,
    pub current_queue: Option<QueueType>,
    pub queued_at: Option<i64>,
    pub today_reviews: Vec<ReviewAttempt>,
    /// Correct answers required today; never below `MIN_THRESHOLD`, no ceiling
    pub dynamic_threshold: u32,
    pub consecutive_correct_streak: u32,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub correct_rate: f64,
    pub last_threshold_adjustment: Option<i64>,
    /// Set by a wrong answer; the next correct answer from Immediate stays in Immediate
    #[serde(default)]
    pub pending_immediate_confirmation: bool,
    #[serde(default)]
    pub session_day: Option<NaiveDate>,
}

impl AcquisitionProgress {
    pub fn new(word_id: &str, category: QuestionCategory, threshold: u32, difficulty: u8) -> Self {
        Self {
            word_id: word_id.to_string(),
            category,
            base_difficulty: difficulty,
            today_correct_count: 0,
            today_wrong_count: 0,
            is_acquisition_complete: false,
            current_queue: None,
            queued_at: None,
            today_reviews: Vec::new(),
            dynamic_threshold: threshold.max(MIN_THRESHOLD),
            consecutive_correct_streak: 0,
            total_attempts: 0,
            total_correct: 0,
            correct_rate: 0.0,
            last_threshold_adjustment: None,
            pending_immediate_confirmation: false,
            session_day: None,
        }
    }

    /// Resets the `today_*` fields when `today` differs from the stored day.
    /// Returns true when a rollover happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        match self.session_day {
            Some(day) if day == today => false,
            Some(_) => {
                self.today_correct_count = 0;
                self.today_wrong_count = 0;
                self.today_reviews.clear();
                self.session_day = Some(today);
                true
            }
            None => {
                self.session_day = Some(today);
                false
            }
        }
    }

    pub(crate) fn apply_correct(&mut self, attempt: ReviewAttempt) -> bool {
        self.today_correct_count = self.today_correct_count.saturating_add(1);
        self.consecutive_correct_streak = self.consecutive_correct_streak.saturating_add(1);
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.total_correct = self.total_correct.saturating_add(1);
        self.recompute_rate();
        let timestamp = attempt.timestamp;
        self.today_reviews.push(attempt);

        if self.consecutive_correct_streak >= THRESHOLD_RELAX_STREAK
            && self.dynamic_threshold > MIN_THRESHOLD
        {
            self.dynamic_threshold -= 1;
            self.last_threshold_adjustment = Some(timestamp);
            return true;
        }
        false
    }

    pub(crate) fn apply_wrong(&mut self, attempt: ReviewAttempt) {
        self.today_wrong_count = self.today_wrong_count.saturating_add(1);
        self.consecutive_correct_streak = 0;
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.recompute_rate();
        self.dynamic_threshold = self
            .dynamic_threshold
            .saturating_add(THRESHOLD_WRONG_PENALTY)
            .max(MIN_THRESHOLD);
        self.last_threshold_adjustment = Some(attempt.timestamp);
        self.is_acquisition_complete = false;
        self.pending_immediate_confirmation = true;
        self.today_reviews.push(attempt);
    }

    fn recompute_rate(&mut self) {
        self.correct_rate = if self.total_attempts == 0 {
            0.0
        } else {
            self.total_correct as f64 / self.total_attempts as f64
        };
    }

    /// Tiers that produced at least one correct answer today
    pub fn correct_tiers_today(&self) -> BTreeSet<QueueType> {
        self.today_reviews
            .iter()
            .filter(|a| a.is_correct)
            .filter_map(|a| a.queue)
            .collect()
    }

    pub fn recent_attempts_correct(&self) -> bool {
        self.today_reviews
            .iter()
            .rev()
            .take(COMPLETION_RECENT_WINDOW)
            .all(|a| a.is_correct)
    }

    /// Every condition that currently blocks acquisition; empty means complete.
    pub fn completion_blockers(&self) -> Vec<&'static str> {
        let mut blockers = Vec::new();
        if self.today_correct_count < self.dynamic_threshold {
            blockers.push("today_correct_below_threshold");
        }
        if self.correct_rate < COMPLETION_MIN_CORRECT_RATE {
            blockers.push("correct_rate_too_low");
        }
        if self.consecutive_correct_streak < COMPLETION_MIN_STREAK {
            blockers.push("streak_too_short");
        }
        if self.correct_tiers_today().len() < COMPLETION_MIN_TIERS {
            blockers.push("too_few_tiers");
        }
        if self.total_attempts < COMPLETION_MIN_ATTEMPTS {
            blockers.push("too_few_attempts");
        }
        if !self.recent_attempts_correct() {
            blockers.push("recent_attempt_wrong");
        }
        blockers
    }

    pub fn meets_completion_criteria(&self) -> bool {
        self.completion_blockers().is_empty()
    }
}

// ==================== Queue entries ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub word_id: String,
    pub queue_type: QueueType,
    pub enqueued_at: i64,
    pub enqueued_question_number: u32,
    pub target_question_number: u32,
    pub target_time: i64,
    pub priority: f64,
    pub difficulty: u8,
    pub category: QuestionCategory,
}

impl QueueEntry {
    pub fn is_due(&self, current_question: u32, now: i64) -> bool {
        self.target_question_number <= current_question || self.target_time <= now
    }

    pub fn question_offset(&self) -> u32 {
        self.target_question_number
            .saturating_sub(self.enqueued_question_number)
    }
}

// ==================== Reporting ====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub immediate: usize,
    pub early: usize,
    pub mid: usize,
    pub end: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionReport {
    pub total_items: usize,
    pub completed_items: usize,
    pub incomplete_items: usize,
    pub incomplete_word_ids: Vec<String>,
    pub completion_rate: f64,
    pub queue_stats: QueueStats,
    pub generated_at: i64,
}

/// Outcome of one recorded answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdate {
    pub word_id: String,
    pub queue: Option<QueueType>,
    pub dynamic_threshold: u32,
    pub is_acquisition_complete: bool,
}
