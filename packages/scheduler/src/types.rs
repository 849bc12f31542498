//! Common Types and Constants
//!
//! Shared data structures used across the scheduling modules.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

// ==================== Constants ====================

/// Floor of the per-item dynamic mastery threshold
pub const MIN_THRESHOLD: u32 = 3;

/// Response time used when the reported value is unusable (ms)
pub const DEFAULT_RESPONSE_TIME_MS: f64 = 1000.0;

/// Longest response time accepted as genuine (ms)
pub const MAX_RESPONSE_TIME_MS: f64 = 60_000.0;

/// Minimum history size before personalization is estimated
pub const MIN_HISTORY_SAMPLES: usize = 20;

/// Phase memo cache time-to-live (ms)
pub const PHASE_CACHE_TTL_MS: i64 = 5_000;

pub const MS_PER_SECOND: i64 = 1_000;
pub const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
pub const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Item difficulty range
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 5;

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// Current wall-clock time as epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Calendar date of `ts_ms` at a fixed offset from UTC
pub fn calendar_day(ts_ms: i64, utc_offset_minutes: i32) -> NaiveDate {
    let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix());
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .unwrap_or_default()
        .with_timezone(&offset)
        .date_naive()
}

// ==================== Review Statistics ====================

/// Per-item review statistics, owned by the host and passed in per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub review_count: u32,
    pub correct_count: u32,
    pub wrong_count: u32,
    /// Epoch ms of the most recent review
    pub last_review_time: i64,
    /// Epoch ms of the most recent correct answer
    #[serde(default)]
    pub last_correct_time: Option<i64>,
    /// Mean response time (ms)
    pub average_response_time: f64,
    pub consecutive_correct: u32,
    pub consecutive_wrong: u32,
}

impl ReviewStatistics {
    pub fn correct_rate(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.review_count as f64
        }
    }

    pub fn is_new(&self) -> bool {
        self.review_count == 0
    }
}

// ==================== Memory Phases ====================

/// Memory phase of an item, ordered from fragile to durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryPhase {
    /// Just seen, held in working memory
    Encoding,
    /// First correct answer, hippocampal binding window
    InitialConsolidation,
    /// Two or more correct answers on the same day
    IntradayReview,
    /// 1-7 days old, partially reliable
    ShortTerm,
    /// Older than 7 days, accurate and fast
    LongTerm,
}

impl MemoryPhase {
    pub const ALL: [MemoryPhase; 5] = [
        MemoryPhase::Encoding,
        MemoryPhase::InitialConsolidation,
        MemoryPhase::IntradayReview,
        MemoryPhase::ShortTerm,
        MemoryPhase::LongTerm,
    ];

    /// Position in the consolidation sequence
    pub fn stage(&self) -> u8 {
        match self {
            MemoryPhase::Encoding => 0,
            MemoryPhase::InitialConsolidation => 1,
            MemoryPhase::IntradayReview => 2,
            MemoryPhase::ShortTerm => 3,
            MemoryPhase::LongTerm => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPhase::Encoding => "ENCODING",
            MemoryPhase::InitialConsolidation => "INITIAL_CONSOLIDATION",
            MemoryPhase::IntradayReview => "INTRADAY_REVIEW",
            MemoryPhase::ShortTerm => "SHORT_TERM",
            MemoryPhase::LongTerm => "LONG_TERM",
        }
    }
}

// ==================== Queue Tiers ====================

/// Review horizon tier. Declaration order is urgency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueType {
    Immediate,
    Early,
    Mid,
    End,
}

impl QueueType {
    pub const ALL: [QueueType; 4] = [
        QueueType::Immediate,
        QueueType::Early,
        QueueType::Mid,
        QueueType::End,
    ];

    pub fn index(&self) -> usize {
        match self {
            QueueType::Immediate => 0,
            QueueType::Early => 1,
            QueueType::Mid => 2,
            QueueType::End => 3,
        }
    }

    /// Maximum number of entries held by the tier
    pub fn capacity(&self) -> usize {
        match self {
            QueueType::Immediate => 50,
            QueueType::Early => 100,
            QueueType::Mid => 150,
            QueueType::End => 200,
        }
    }

    pub fn base_priority(&self) -> f64 {
        match self {
            QueueType::Immediate => 100.0,
            QueueType::Early => 75.0,
            QueueType::Mid => 50.0,
            QueueType::End => 25.0,
        }
    }

    /// Questions until an entry becomes due. Immediate depends on difficulty:
    /// harder items come back sooner.
    pub fn question_offset(&self, difficulty: u8) -> u32 {
        match self {
            QueueType::Immediate => match difficulty {
                4..=u8::MAX => 1,
                3 => 2,
                _ => 3,
            },
            QueueType::Early => 5,
            QueueType::Mid => 10,
            QueueType::End => 20,
        }
    }

    /// Wall-clock delay until an entry becomes due (ms)
    pub fn time_offset_ms(&self) -> i64 {
        match self {
            QueueType::Immediate => 2 * MS_PER_MINUTE,
            QueueType::Early => 5 * MS_PER_MINUTE,
            QueueType::Mid => 15 * MS_PER_MINUTE,
            QueueType::End => 30 * MS_PER_MINUTE,
        }
    }

    /// Next tier on promotion; End has none
    pub fn next(&self) -> Option<QueueType> {
        match self {
            QueueType::Immediate => Some(QueueType::Early),
            QueueType::Early => Some(QueueType::Mid),
            QueueType::Mid => Some(QueueType::End),
            QueueType::End => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Immediate => "IMMEDIATE",
            QueueType::Early => "EARLY",
            QueueType::Mid => "MID",
            QueueType::End => "END",
        }
    }
}

// ==================== Question Categories ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    #[default]
    Memorization,
    Translation,
    Spelling,
    Grammar,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 4] = [
        QuestionCategory::Memorization,
        QuestionCategory::Translation,
        QuestionCategory::Spelling,
        QuestionCategory::Grammar,
    ];

    /// Initial dynamic threshold. Spelling recall needs the most evidence.
    pub fn default_threshold(&self) -> u32 {
        match self {
            QuestionCategory::Memorization => 5,
            QuestionCategory::Translation => 4,
            QuestionCategory::Spelling => 6,
            QuestionCategory::Grammar => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Memorization => "memorization",
            QuestionCategory::Translation => "translation",
            QuestionCategory::Spelling => "spelling",
            QuestionCategory::Grammar => "grammar",
        }
    }
}

// ==================== Personalization ====================

/// One answer from the learner's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningHistory {
    pub word_id: String,
    /// Epoch ms of the answer
    pub timestamp: i64,
    pub is_correct: bool,
    /// Response time (ms)
    pub response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimeProfile {
    pub average_response_time: f64,
    pub fast_threshold: f64,
    pub slow_threshold: f64,
    /// 1 - coefficient of variation, in [0, 1]
    pub consistency_score: f64,
}

impl Default for ResponseTimeProfile {
    fn default() -> Self {
        Self {
            average_response_time: 3000.0,
            fast_threshold: 1500.0,
            slow_threshold: 5000.0,
            consistency_score: 0.5,
        }
    }
}

/// Learner-specific scheduling parameters. Neutral values are 1.0 / 1.0 / 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalParameters {
    /// > 1.0 learns faster than average
    pub learning_speed: f64,
    /// > 1.0 forgets faster than average
    pub forgetting_speed: f64,
    /// Reviews needed before an item is considered consolidated
    pub consolidation_threshold: f64,
    pub response_time_profile: ResponseTimeProfile,
    /// [0, 1]
    pub confidence_level: f64,
    pub sample_size: usize,
    /// Epoch ms of the newest history record used
    pub last_updated: i64,
}

impl Default for PersonalParameters {
    fn default() -> Self {
        Self {
            learning_speed: 1.0,
            forgetting_speed: 1.0,
            consolidation_threshold: 3.0,
            response_time_profile: ResponseTimeProfile::default(),
            confidence_level: 0.0,
            sample_size: 0,
            last_updated: 0,
        }
    }
}
