//! Hybrid Selection Policy
//!
//! Picks the next item to present from a candidate pool.
//!
//! Priority = queue (0-45) + phase (10-30) + timing (0-20) + personal (0-10).
//! Queued candidates always win; otherwise a weighted coin flip decides
//! between new and review material, with the new-item share shrinking as the
//! session goes on when adaptive adjustment is enabled.

use std::cmp::Ordering;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{CategoryConfigs, SchedulerConfig, SelectionConfig};
use crate::phase::MemoryPhaseClassifier;
use crate::sanitize::{sanitize_due_time, sanitize_ratio};
use crate::types::{
    now_ms, MemoryPhase, PersonalParameters, QuestionCategory, QueueType, ReviewStatistics,
    MS_PER_HOUR,
};

// ==================== Priority weights ====================

const QUEUE_POSITION_BONUS: usize = 5;
const NEW_ITEM_TIMING: f64 = 15.0;
const OVERDUE_BASE: f64 = 10.0;
const OVERDUE_MAX_EXTRA_HOURS: f64 = 10.0;
const DUE_SOON_MAX: f64 = 10.0;
const PERSONAL_BASELINE: f64 = 5.0;
const PERSONAL_MAX: f64 = 10.0;

fn queue_weight(queue: QueueType) -> f64 {
    match queue {
        QueueType::Immediate => 40.0,
        QueueType::Early => 30.0,
        QueueType::Mid => 20.0,
        QueueType::End => 10.0,
    }
}

fn phase_weight(phase: MemoryPhase) -> f64 {
    match phase {
        MemoryPhase::InitialConsolidation => 30.0,
        MemoryPhase::Encoding => 25.0,
        MemoryPhase::IntradayReview => 20.0,
        MemoryPhase::ShortTerm => 15.0,
        MemoryPhase::LongTerm => 10.0,
    }
}

/// Adaptive new-item share by session position
pub fn adaptive_new_ratio(question: u32) -> f64 {
    match question {
        0..=10 => 0.7,
        11..=20 => 0.6,
        21..=30 => 0.5,
        _ => 0.4,
    }
}

// ==================== Types ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCandidate {
    pub word_id: String,
    pub stats: ReviewStatistics,
    #[serde(default)]
    pub queue: Option<QueueType>,
    #[serde(default)]
    pub queue_position: Option<usize>,
    #[serde(default)]
    pub next_review_time: Option<i64>,
    /// Pre-computed phase; classified on the fly when absent
    #[serde(default)]
    pub phase: Option<MemoryPhase>,
    #[serde(default)]
    pub category: Option<QuestionCategory>,
}

impl SelectionCandidate {
    pub fn new(word_id: impl Into<String>, stats: ReviewStatistics) -> Self {
        Self {
            word_id: word_id.into(),
            stats,
            queue: None,
            queue_position: None,
            next_review_time: None,
            phase: None,
            category: None,
        }
    }

    pub fn in_queue(mut self, queue: QueueType, position: usize) -> Self {
        self.queue = Some(queue);
        self.queue_position = Some(position);
        self
    }

    pub fn due_at(mut self, next_review_time: i64) -> Self {
        self.next_review_time = Some(next_review_time);
        self
    }

    pub fn with_phase(mut self, phase: MemoryPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_category(mut self, category: QuestionCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn is_new(&self) -> bool {
        self.stats.is_new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityBreakdown {
    pub queue: f64,
    pub phase: f64,
    pub timing: f64,
    pub personal: f64,
}

impl PriorityBreakdown {
    pub fn total(&self) -> f64 {
        self.queue + self.phase + self.timing + self.personal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityResult {
    pub word_id: String,
    pub total: f64,
    pub breakdown: PriorityBreakdown,
    pub phase: MemoryPhase,
    pub reason: String,
}

// ==================== Policy ====================

#[derive(Debug)]
pub struct HybridSelectionPolicy {
    config: SelectionConfig,
    categories: CategoryConfigs,
    classifier: MemoryPhaseClassifier,
    personal: Option<PersonalParameters>,
    session_question: u32,
    session_category: Option<QuestionCategory>,
    rng: ChaCha8Rng,
}

impl Default for HybridSelectionPolicy {
    fn default() -> Self {
        Self::new(&SchedulerConfig::default())
    }
}

impl HybridSelectionPolicy {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_rng(config, ChaCha8Rng::from_rng(&mut rand::rng()))
    }

    /// Deterministic coin flips, for tests and replays
    pub fn with_seed(config: &SchedulerConfig, seed: u64) -> Self {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(config: &SchedulerConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config: config.selection.clone(),
            categories: config.categories.clone(),
            classifier: MemoryPhaseClassifier::new(config.phase.clone()),
            personal: None,
            session_question: 0,
            session_category: None,
            rng,
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn set_session_question(&mut self, question: u32) {
        self.session_question = question;
    }

    pub fn session_question(&self) -> u32 {
        self.session_question
    }

    /// Category whose `new_question_ratio` applies when adaptive mode is off
    pub fn set_session_category(&mut self, category: Option<QuestionCategory>) {
        self.session_category = category;
    }

    pub fn set_personal_parameters(&mut self, params: Option<PersonalParameters>) {
        self.personal = params;
    }

    pub fn personal_parameters(&self) -> Option<&PersonalParameters> {
        self.personal.as_ref()
    }

    /// Share of draws that go to new material at the current session position
    pub fn new_item_ratio(&self) -> f64 {
        if self.config.adaptive_adjustment {
            return adaptive_new_ratio(self.session_question);
        }
        match self.session_category {
            Some(category) => {
                let fallback = self.config.new_item_ratio();
                sanitize_ratio(self.categories.get(category).new_question_ratio, fallback)
            }
            None => self.config.new_item_ratio(),
        }
    }

    // ==================== Priority ====================

    pub fn priority_of(&self, candidate: &SelectionCandidate) -> PriorityResult {
        self.priority_of_at(candidate, now_ms())
    }

    pub fn priority_of_at(&self, candidate: &SelectionCandidate, now: i64) -> PriorityResult {
        let phase = candidate.phase.unwrap_or_else(|| {
            self.classifier
                .classify_at(&candidate.stats, self.personal.as_ref(), now)
                .phase
        });

        let due = candidate.next_review_time.map(|t| sanitize_due_time(t, now));

        let breakdown = PriorityBreakdown {
            queue: queue_priority(candidate),
            phase: phase_weight(phase),
            timing: timing_priority(candidate.is_new(), due, now),
            personal: personal_priority(candidate, self.personal.as_ref()),
        };

        let mut parts = Vec::with_capacity(3);
        match candidate.queue {
            Some(q) => parts.push(format!("queued in {}", q.as_str())),
            None if candidate.is_new() => parts.push("new item".to_string()),
            None => parts.push("review item".to_string()),
        }
        parts.push(format!("phase {}", phase.as_str()));
        if let Some(due) = due {
            if due <= now && !candidate.is_new() {
                let hours = now.saturating_sub(due) as f64 / MS_PER_HOUR as f64;
                parts.push(format!("overdue {hours:.1}h"));
            }
        }

        PriorityResult {
            word_id: candidate.word_id.clone(),
            total: breakdown.total(),
            breakdown,
            phase,
            reason: parts.join(", "),
        }
    }

    /// Every candidate with its priority, highest first
    pub fn rank(&self, candidates: &[SelectionCandidate]) -> Vec<PriorityResult> {
        self.rank_at(candidates, now_ms())
    }

    pub fn rank_at(&self, candidates: &[SelectionCandidate], now: i64) -> Vec<PriorityResult> {
        let mut ranked: Vec<PriorityResult> = candidates
            .iter()
            .map(|c| self.priority_of_at(c, now))
            .collect();
        ranked.sort_by(|a, b| by_total_desc(a.total, b.total));
        ranked
    }

    // ==================== Selection ====================

    pub fn select_next(&mut self, candidates: &[SelectionCandidate]) -> Option<SelectionCandidate> {
        self.select_next_at(candidates, now_ms())
    }

    pub fn select_next_at(
        &mut self,
        candidates: &[SelectionCandidate],
        now: i64,
    ) -> Option<SelectionCandidate> {
        if candidates.is_empty() {
            return None;
        }

        let queued: Vec<&SelectionCandidate> =
            candidates.iter().filter(|c| c.queue.is_some()).collect();
        if !queued.is_empty() {
            let best = self.best_of(&queued, now)?;
            tracing::debug!(word_id = %best.word_id, "queued item preempts mix");
            return Some(best.clone());
        }

        let (new_items, review_items): (Vec<&SelectionCandidate>, Vec<&SelectionCandidate>) =
            candidates.iter().partition(|c| c.is_new());

        let pick_new = match (new_items.is_empty(), review_items.is_empty()) {
            (true, _) => false,
            (false, true) => true,
            (false, false) => {
                let ratio = self.new_item_ratio();
                self.rng.random::<f64>() < ratio
            }
        };

        let pool = if pick_new { &new_items } else { &review_items };
        let chosen = self.best_of(pool, now)?;
        tracing::debug!(
            word_id = %chosen.word_id,
            new_item = pick_new,
            question = self.session_question,
            "item selected"
        );
        Some(chosen.clone())
    }

    fn best_of<'a>(
        &self,
        pool: &[&'a SelectionCandidate],
        now: i64,
    ) -> Option<&'a SelectionCandidate> {
        let mut best: Option<(&'a SelectionCandidate, f64)> = None;
        for &candidate in pool {
            let total = self.priority_of_at(candidate, now).total;
            match best {
                Some((_, top)) if total <= top => {}
                _ => best = Some((candidate, total)),
            }
        }
        best.map(|(c, _)| c)
    }
}

fn by_total_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn queue_priority(candidate: &SelectionCandidate) -> f64 {
    match candidate.queue {
        Some(queue) => {
            let bonus = candidate
                .queue_position
                .map_or(0, |pos| QUEUE_POSITION_BONUS.saturating_sub(pos));
            queue_weight(queue) + bonus as f64
        }
        None => 0.0,
    }
}

fn timing_priority(is_new: bool, due: Option<i64>, now: i64) -> f64 {
    if is_new {
        return NEW_ITEM_TIMING;
    }
    let Some(due) = due else {
        return 0.0;
    };
    let hours = now.saturating_sub(due) as f64 / MS_PER_HOUR as f64;
    if hours >= 0.0 {
        OVERDUE_BASE + hours.min(OVERDUE_MAX_EXTRA_HOURS)
    } else if hours > -1.0 {
        // due within the hour: closer scores higher
        DUE_SOON_MAX * (1.0 + hours)
    } else {
        0.0
    }
}

fn personal_priority(candidate: &SelectionCandidate, params: Option<&PersonalParameters>) -> f64 {
    let Some(params) = params else {
        return PERSONAL_BASELINE;
    };
    let adjustment = if candidate.is_new() {
        if params.learning_speed < 0.8 {
            -2.0
        } else if params.learning_speed > 1.2 {
            2.0
        } else {
            0.0
        }
    } else if params.forgetting_speed >= 1.5 {
        3.0
    } else if params.forgetting_speed > 1.0 {
        2.0
    } else if params.forgetting_speed < 0.7 {
        -3.0
    } else if params.forgetting_speed < 1.0 {
        -2.0
    } else {
        0.0
    };
    (PERSONAL_BASELINE + adjustment).clamp(0.0, PERSONAL_MAX)
}
