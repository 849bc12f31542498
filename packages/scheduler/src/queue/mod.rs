//! Spaced Repetition Queue Manager
//!
//! Four review horizons ("show again in N questions"):
//! - Immediate (1-3 questions, capacity 50)
//! - Early (5 questions, capacity 100)
//! - Mid (10 questions, capacity 150)
//! - End (20 questions, capacity 200)
//!
//! Correct answers promote an item one tier, wrong answers send it back to
//! Immediate and raise its dynamic threshold. An item is acquired once it
//! satisfies every completion criterion in [`AcquisitionProgress`].

mod progress;

pub use progress::*;

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::sanitize::{clamp_difficulty, sanitize_response_time, sanitize_timestamp};
use crate::types::{
    calendar_day, now_ms, QuestionCategory, QueueType, MAX_DIFFICULTY, MIN_THRESHOLD,
};

const TIER_COUNT: usize = 4;

/// Difficulty from which new items are queued on enqueue
pub const QUEUE_ENTRY_MIN_DIFFICULTY: u8 = 3;

/// Difficulty assumed for items first seen through an answer
pub const DEFAULT_DIFFICULTY: u8 = 3;

#[derive(Debug, Clone)]
pub struct SpacedRepetitionQueueManager {
    config: SchedulerConfig,
    queues: [Vec<QueueEntry>; TIER_COUNT],
    progress: HashMap<String, AcquisitionProgress>,
    current_question: u32,
}

impl Default for SpacedRepetitionQueueManager {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl SpacedRepetitionQueueManager {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            queues: Default::default(),
            progress: HashMap::new(),
            current_question: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ==================== Question counter ====================

    pub fn advance_question(&mut self) -> u32 {
        self.current_question = self.current_question.saturating_add(1);
        self.current_question
    }

    pub fn set_question_number(&mut self, question: u32) {
        self.current_question = question;
    }

    pub fn current_question(&self) -> u32 {
        self.current_question
    }

    // ==================== Enqueue / due ====================

    pub fn enqueue_new_item(
        &mut self,
        word_id: &str,
        difficulty: u8,
        category: QuestionCategory,
    ) -> Option<QueueType> {
        self.enqueue_new_item_at(word_id, difficulty, category, now_ms())
    }

    /// Tracks a new item and queues it when it is hard enough.
    ///
    /// Returns the tier the item sits in afterwards. Already-queued items
    /// keep their current position.
    pub fn enqueue_new_item_at(
        &mut self,
        word_id: &str,
        difficulty: u8,
        category: QuestionCategory,
        now: i64,
    ) -> Option<QueueType> {
        let difficulty = clamp_difficulty(difficulty);
        let today = calendar_day(now, self.config.phase.utc_offset_minutes);

        let progress = self.progress_entry(word_id, Some(category), Some(difficulty));
        progress.roll_over(today);
        if let Some(queue) = progress.current_queue {
            return Some(queue);
        }
        progress.base_difficulty = difficulty;
        if progress.is_acquisition_complete || difficulty < QUEUE_ENTRY_MIN_DIFFICULTY {
            tracing::debug!(word_id = %word_id, difficulty, "item tracked without queueing");
            return None;
        }
        let category = progress.category;

        let target = self
            .config
            .category(category)
            .first_enabled_from(QueueType::Immediate)?;
        self.place(word_id, target, difficulty, category, now);
        Some(target)
    }

    pub fn get_next_due_item(&self) -> Option<&QueueEntry> {
        self.get_next_due_item_at(now_ms())
    }

    /// Most urgent entry whose target question or target time has passed.
    /// Does not remove it.
    pub fn get_next_due_item_at(&self, now: i64) -> Option<&QueueEntry> {
        self.due_entries_at(now).into_iter().next()
    }

    /// All due entries, most urgent first
    pub fn due_entries_at(&self, now: i64) -> Vec<&QueueEntry> {
        let mut due: Vec<&QueueEntry> = self
            .queues
            .iter()
            .flatten()
            .filter(|e| e.is_due(self.current_question, now))
            .collect();
        due.sort_by(|a, b| due_order(a, b));
        due
    }

    // ==================== Answers ====================

    pub fn record_correct(
        &mut self,
        word_id: &str,
        queue: Option<QueueType>,
        response_time: Option<f64>,
        difficulty: Option<u8>,
        category: Option<QuestionCategory>,
    ) -> QueueUpdate {
        self.record_correct_at(word_id, queue, response_time, difficulty, category, now_ms())
    }

    pub fn record_correct_at(
        &mut self,
        word_id: &str,
        queue: Option<QueueType>,
        response_time: Option<f64>,
        difficulty: Option<u8>,
        category: Option<QuestionCategory>,
        now: i64,
    ) -> QueueUpdate {
        let today = calendar_day(now, self.config.phase.utc_offset_minutes);
        let difficulty = difficulty.map(clamp_difficulty);

        let progress = self.progress_entry(word_id, category, difficulty);
        progress.roll_over(today);
        if let Some(d) = difficulty {
            progress.base_difficulty = d;
        }
        let source = queue.or(progress.current_queue);

        let relaxed = progress.apply_correct(ReviewAttempt {
            timestamp: now,
            is_correct: true,
            queue: source,
            response_time: response_time.map(sanitize_response_time),
        });
        if relaxed {
            tracing::debug!(
                word_id = %word_id,
                threshold = progress.dynamic_threshold,
                streak = progress.consecutive_correct_streak,
                "dynamic threshold relaxed"
            );
        }

        if progress.meets_completion_criteria() {
            progress.is_acquisition_complete = true;
            progress.pending_immediate_confirmation = false;
            tracing::info!(
                word_id = %word_id,
                attempts = progress.total_attempts,
                correct_rate = progress.correct_rate,
                "acquisition complete"
            );
            self.unqueue(word_id);
            return self.update_for(word_id);
        }

        let next = match source {
            Some(QueueType::Immediate) if progress.pending_immediate_confirmation => {
                progress.pending_immediate_confirmation = false;
                Some(QueueType::Immediate)
            }
            Some(q) => Some(q.next().unwrap_or(QueueType::End)),
            None => None,
        };
        let base_difficulty = progress.base_difficulty;
        let item_category = progress.category;
        let target = next.and_then(|q| self.config.category(item_category).first_enabled_from(q));

        match target {
            Some(target) => {
                tracing::debug!(
                    word_id = %word_id,
                    from = ?source,
                    to = target.as_str(),
                    "item promoted"
                );
                self.place(word_id, target, base_difficulty, item_category, now);
            }
            None => self.unqueue(word_id),
        }
        self.update_for(word_id)
    }

    pub fn record_wrong(
        &mut self,
        word_id: &str,
        queue: Option<QueueType>,
        response_time: Option<f64>,
        difficulty: Option<u8>,
        category: Option<QuestionCategory>,
    ) -> QueueUpdate {
        self.record_wrong_at(word_id, queue, response_time, difficulty, category, now_ms())
    }

    pub fn record_wrong_at(
        &mut self,
        word_id: &str,
        queue: Option<QueueType>,
        response_time: Option<f64>,
        difficulty: Option<u8>,
        category: Option<QuestionCategory>,
        now: i64,
    ) -> QueueUpdate {
        let today = calendar_day(now, self.config.phase.utc_offset_minutes);
        let difficulty = difficulty.map(clamp_difficulty);

        let progress = self.progress_entry(word_id, category, difficulty);
        progress.roll_over(today);
        if let Some(d) = difficulty {
            progress.base_difficulty = d;
        }
        let source = queue.or(progress.current_queue);
        progress.apply_wrong(ReviewAttempt {
            timestamp: now,
            is_correct: false,
            queue: source,
            response_time: response_time.map(sanitize_response_time),
        });
        tracing::debug!(
            word_id = %word_id,
            threshold = progress.dynamic_threshold,
            "wrong answer, threshold raised"
        );

        let bumped = progress.base_difficulty.saturating_add(1).min(MAX_DIFFICULTY);
        let item_category = progress.category;

        self.remove_from_queues(word_id);
        match self
            .config
            .category(item_category)
            .first_enabled_from(QueueType::Immediate)
        {
            Some(target) => self.place(word_id, target, bumped, item_category, now),
            None => self.unqueue(word_id),
        }
        self.update_for(word_id)
    }

    // ==================== Progress ====================

    /// Progress for `word_id`, created with category defaults if missing
    pub fn get_progress(&mut self, word_id: &str) -> &AcquisitionProgress {
        self.progress_entry(word_id, None, None)
    }

    pub fn peek_progress(&self, word_id: &str) -> Option<&AcquisitionProgress> {
        self.progress.get(word_id)
    }

    /// Snapshot of every progress record, sorted by item id
    pub fn export_progress(&self) -> Vec<AcquisitionProgress> {
        let mut records: Vec<_> = self.progress.values().cloned().collect();
        records.sort_by(|a, b| a.word_id.cmp(&b.word_id));
        records
    }

    pub fn restore_progress(&mut self, records: Vec<AcquisitionProgress>) {
        self.restore_progress_at(records, now_ms());
    }

    /// Replaces all progress and rebuilds queue entries from each record's
    /// `current_queue`, targeting from the current question number.
    pub fn restore_progress_at(&mut self, records: Vec<AcquisitionProgress>, now: i64) {
        self.queues = Default::default();
        self.progress.clear();

        let mut to_place = Vec::new();
        for mut record in records {
            record.dynamic_threshold = record.dynamic_threshold.max(MIN_THRESHOLD);
            record.base_difficulty = clamp_difficulty(record.base_difficulty);
            if let (Some(queue), false) = (record.current_queue, record.is_acquisition_complete) {
                to_place.push((
                    record.word_id.clone(),
                    queue,
                    record.base_difficulty,
                    record.category,
                    record.queued_at.map_or(now, |t| sanitize_timestamp(t, now)),
                ));
            }
            record.current_queue = None;
            record.queued_at = None;
            self.progress.insert(record.word_id.clone(), record);
        }

        to_place.sort_by_key(|(_, _, _, _, at)| *at);
        let restored = to_place.len();
        for (word_id, queue, difficulty, category, at) in to_place {
            self.place(&word_id, queue, difficulty, category, at);
        }
        tracing::info!(
            items = self.progress.len(),
            queued = restored,
            "progress restored"
        );
    }

    pub fn queue_of(&self, word_id: &str) -> Option<QueueType> {
        QueueType::ALL
            .into_iter()
            .find(|q| self.queues[q.index()].iter().any(|e| e.word_id == word_id))
    }

    /// Zero-based position within the item's tier
    pub fn position_in_queue(&self, word_id: &str) -> Option<usize> {
        self.queues
            .iter()
            .find_map(|tier| tier.iter().position(|e| e.word_id == word_id))
    }

    /// Takes the item out of every queue; its progress is kept.
    pub fn remove_item(&mut self, word_id: &str) -> bool {
        let removed = self.remove_from_queues(word_id);
        if let Some(progress) = self.progress.get_mut(word_id) {
            progress.current_queue = None;
            progress.queued_at = None;
        }
        removed
    }

    pub fn queue_stats(&self) -> QueueStats {
        let len = |q: QueueType| self.queues[q.index()].len();
        QueueStats {
            immediate: len(QueueType::Immediate),
            early: len(QueueType::Early),
            mid: len(QueueType::Mid),
            end: len(QueueType::End),
            total: self.queues.iter().map(Vec::len).sum(),
        }
    }

    pub fn generate_completion_report(&self) -> AcquisitionReport {
        self.generate_completion_report_at(now_ms())
    }

    pub fn generate_completion_report_at(&self, now: i64) -> AcquisitionReport {
        let total_items = self.progress.len();
        let mut incomplete_word_ids: Vec<String> = self
            .progress
            .values()
            .filter(|p| !p.is_acquisition_complete)
            .map(|p| p.word_id.clone())
            .collect();
        incomplete_word_ids.sort();
        let incomplete_items = incomplete_word_ids.len();
        let completed_items = total_items - incomplete_items;

        AcquisitionReport {
            total_items,
            completed_items,
            incomplete_items,
            incomplete_word_ids,
            completion_rate: if total_items == 0 {
                0.0
            } else {
                completed_items as f64 / total_items as f64
            },
            queue_stats: self.queue_stats(),
            generated_at: now,
        }
    }

    /// Drops every queue, every progress record and the question counter.
    pub fn reset(&mut self) {
        self.queues = Default::default();
        self.progress.clear();
        self.current_question = 0;
        tracing::debug!("queue manager reset");
    }

    // ==================== Internals ====================

    fn progress_entry(
        &mut self,
        word_id: &str,
        category: Option<QuestionCategory>,
        difficulty: Option<u8>,
    ) -> &mut AcquisitionProgress {
        let config = &self.config;
        self.progress.entry(word_id.to_string()).or_insert_with(|| {
            let category = category.unwrap_or(config.default_category);
            AcquisitionProgress::new(
                word_id,
                category,
                config.initial_threshold(category),
                difficulty.unwrap_or(DEFAULT_DIFFICULTY),
            )
        })
    }

    fn update_for(&self, word_id: &str) -> QueueUpdate {
        match self.progress.get(word_id) {
            Some(p) => QueueUpdate {
                word_id: word_id.to_string(),
                queue: p.current_queue,
                dynamic_threshold: p.dynamic_threshold,
                is_acquisition_complete: p.is_acquisition_complete,
            },
            None => QueueUpdate {
                word_id: word_id.to_string(),
                queue: None,
                dynamic_threshold: MIN_THRESHOLD,
                is_acquisition_complete: false,
            },
        }
    }

    fn remove_from_queues(&mut self, word_id: &str) -> bool {
        let mut removed = false;
        for tier in self.queues.iter_mut() {
            let before = tier.len();
            tier.retain(|e| e.word_id != word_id);
            removed |= tier.len() != before;
        }
        removed
    }

    fn unqueue(&mut self, word_id: &str) {
        self.remove_item(word_id);
    }

    /// Moves the item into `queue`, evicting the oldest entry of a full tier.
    fn place(
        &mut self,
        word_id: &str,
        queue: QueueType,
        difficulty: u8,
        category: QuestionCategory,
        now: i64,
    ) {
        self.remove_from_queues(word_id);

        let tier = &mut self.queues[queue.index()];
        let mut evicted = None;
        if tier.len() >= queue.capacity() {
            if let Some(oldest) = tier
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| (e.enqueued_at, e.enqueued_question_number))
                .map(|(i, _)| i)
            {
                evicted = Some(tier.remove(oldest));
            }
        }

        tier.push(QueueEntry {
            word_id: word_id.to_string(),
            queue_type: queue,
            enqueued_at: now,
            enqueued_question_number: self.current_question,
            target_question_number: self
                .current_question
                .saturating_add(queue.question_offset(difficulty)),
            target_time: now.saturating_add(queue.time_offset_ms()),
            priority: entry_priority(queue, difficulty),
            difficulty,
            category,
        });

        if let Some(evicted) = evicted {
            tracing::warn!(
                word_id = %evicted.word_id,
                queue = queue.as_str(),
                capacity = queue.capacity(),
                "queue full, evicted oldest entry"
            );
            if let Some(p) = self.progress.get_mut(&evicted.word_id) {
                p.current_queue = None;
                p.queued_at = None;
            }
        }

        if let Some(p) = self.progress.get_mut(word_id) {
            p.current_queue = Some(queue);
            p.queued_at = Some(now);
        }
    }
}

/// Tier base priority plus a difficulty bump
pub fn entry_priority(queue: QueueType, difficulty: u8) -> f64 {
    queue.base_priority() + f64::from(clamp_difficulty(difficulty)) * 2.0
}

/// Higher priority first, then more urgent tier, then smaller offset, then oldest
fn due_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority
        .partial_cmp(&a.priority)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.queue_type.cmp(&b.queue_type))
        .then_with(|| a.question_offset().cmp(&b.question_offset()))
        .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
}
