//! Learning session facade
//!
//! Owns one instance of each component and runs the per-answer loop:
//! queue update -> history append -> question counter -> periodic
//! re-estimation of personalization -> selection of the next item.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::error::ConfigError;
use crate::personal::{ParameterApplicability, PersonalParameterEstimator};
use crate::phase::{MemoryPhaseClassifier, PhaseDetectionResult};
use crate::queue::{AcquisitionReport, QueueUpdate, SpacedRepetitionQueueManager};
use crate::sanitize::{sanitize_response_time, sanitize_timestamp};
use crate::selection::{HybridSelectionPolicy, SelectionCandidate};
use crate::types::{
    now_ms, LearningHistory, PersonalParameters, QuestionCategory, QueueType, ReviewStatistics,
    DEFAULT_RESPONSE_TIME_MS,
};

/// One answered question as reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEvent {
    pub word_id: String,
    pub is_correct: bool,
    #[serde(default)]
    pub response_time: Option<f64>,
    pub timestamp: i64,
    /// Tier the question was served from
    #[serde(default)]
    pub queue: Option<QueueType>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub category: Option<QuestionCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub queue_update: QueueUpdate,
    pub question_number: u32,
    /// Set when this answer triggered a re-estimation
    pub applicability: Option<ParameterApplicability>,
}

#[derive(Debug)]
pub struct LearningScheduler {
    config: SchedulerConfig,
    queue: SpacedRepetitionQueueManager,
    classifier: MemoryPhaseClassifier,
    selection: HybridSelectionPolicy,
    estimator: PersonalParameterEstimator,
    history: Vec<LearningHistory>,
    personal: Option<PersonalParameters>,
    answers_since_estimate: u32,
}

impl LearningScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let selection = HybridSelectionPolicy::new(&config);
        Ok(Self::assemble(config, selection))
    }

    pub fn with_seed(config: SchedulerConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let selection = HybridSelectionPolicy::with_seed(&config, seed);
        Ok(Self::assemble(config, selection))
    }

    fn assemble(config: SchedulerConfig, selection: HybridSelectionPolicy) -> Self {
        Self {
            queue: SpacedRepetitionQueueManager::new(config.clone()),
            classifier: MemoryPhaseClassifier::new(config.phase.clone()),
            selection,
            estimator: PersonalParameterEstimator::new(),
            history: Vec::new(),
            personal: None,
            answers_since_estimate: 0,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn queue(&self) -> &SpacedRepetitionQueueManager {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SpacedRepetitionQueueManager {
        &mut self.queue
    }

    pub fn classifier(&self) -> &MemoryPhaseClassifier {
        &self.classifier
    }

    pub fn selection_mut(&mut self) -> &mut HybridSelectionPolicy {
        &mut self.selection
    }

    pub fn history(&self) -> &[LearningHistory] {
        &self.history
    }

    pub fn personal_parameters(&self) -> Option<&PersonalParameters> {
        self.personal.as_ref()
    }

    pub fn enqueue_new_item(
        &mut self,
        word_id: &str,
        difficulty: u8,
        category: QuestionCategory,
    ) -> Option<QueueType> {
        self.enqueue_new_item_at(word_id, difficulty, category, now_ms())
    }

    pub fn enqueue_new_item_at(
        &mut self,
        word_id: &str,
        difficulty: u8,
        category: QuestionCategory,
        now: i64,
    ) -> Option<QueueType> {
        self.queue.enqueue_new_item_at(word_id, difficulty, category, now)
    }

    // ==================== Answer loop ====================

    pub fn record_answer(&mut self, event: AnswerEvent) -> AnswerOutcome {
        let timestamp = sanitize_timestamp(event.timestamp, now_ms());
        let queue_update = if event.is_correct {
            self.queue.record_correct_at(
                &event.word_id,
                event.queue,
                event.response_time,
                event.difficulty,
                event.category,
                timestamp,
            )
        } else {
            self.queue.record_wrong_at(
                &event.word_id,
                event.queue,
                event.response_time,
                event.difficulty,
                event.category,
                timestamp,
            )
        };

        self.history.push(LearningHistory {
            word_id: event.word_id.clone(),
            timestamp,
            is_correct: event.is_correct,
            response_time: sanitize_response_time(
                event.response_time.unwrap_or(DEFAULT_RESPONSE_TIME_MS),
            ),
        });
        self.classifier.invalidate(&event.word_id);

        let question_number = self.queue.advance_question();
        self.selection.set_session_question(question_number);

        self.answers_since_estimate = self.answers_since_estimate.saturating_add(1);
        let applicability = if self.answers_since_estimate >= self.config.reestimate_interval {
            Some(self.reestimate())
        } else {
            None
        };

        AnswerOutcome {
            queue_update,
            question_number,
            applicability,
        }
    }

    /// Re-derives personalization from the full history and applies it when
    /// the applicability gate approves.
    pub fn reestimate(&mut self) -> ParameterApplicability {
        self.answers_since_estimate = 0;
        let params = self.estimator.estimate(&self.history);
        let applicability = self.estimator.calculate_parameter_applicability(&params);

        if applicability.should_apply {
            tracing::info!(
                samples = params.sample_size,
                learning_speed = params.learning_speed,
                forgetting_speed = params.forgetting_speed,
                confidence = params.confidence_level,
                pattern = ?applicability.pattern,
                "personalization updated"
            );
            self.set_personal_parameters(Some(params));
        } else {
            tracing::debug!(
                samples = params.sample_size,
                reason = %applicability.reason,
                "personalization not applied"
            );
        }
        applicability
    }

    /// Replaces personalization; cached phases were computed under the old
    /// thresholds and are dropped.
    pub fn set_personal_parameters(&mut self, params: Option<PersonalParameters>) {
        self.selection.set_personal_parameters(params.clone());
        self.personal = params;
        self.classifier.clear_cache();
    }

    pub fn detect_phase(&self, word_id: &str, stats: &ReviewStatistics) -> PhaseDetectionResult {
        self.detect_phase_at(word_id, stats, now_ms())
    }

    pub fn detect_phase_at(
        &self,
        word_id: &str,
        stats: &ReviewStatistics,
        now: i64,
    ) -> PhaseDetectionResult {
        self.classifier
            .detect_phase_at(word_id, stats, self.personal.as_ref(), now)
    }

    // ==================== Selection ====================

    pub fn next_item(&mut self, candidates: &[SelectionCandidate]) -> Option<SelectionCandidate> {
        self.next_item_at(candidates, now_ms())
    }

    pub fn next_item_at(
        &mut self,
        candidates: &[SelectionCandidate],
        now: i64,
    ) -> Option<SelectionCandidate> {
        let annotated = self.annotate_candidates_at(candidates, now);
        self.selection.select_next_at(&annotated, now)
    }

    /// Overwrites each candidate's queue fields with its due queue entry and
    /// fills in missing phases from the cached classifier.
    pub fn annotate_candidates_at(
        &self,
        candidates: &[SelectionCandidate],
        now: i64,
    ) -> Vec<SelectionCandidate> {
        let due: HashMap<&str, QueueType> = self
            .queue
            .due_entries_at(now)
            .into_iter()
            .map(|e| (e.word_id.as_str(), e.queue_type))
            .collect();

        candidates
            .iter()
            .map(|candidate| {
                let mut c = candidate.clone();
                match due.get(c.word_id.as_str()) {
                    Some(queue) => {
                        c.queue = Some(*queue);
                        c.queue_position = self.queue.position_in_queue(&c.word_id);
                    }
                    None => {
                        c.queue = None;
                        c.queue_position = None;
                    }
                }
                if c.phase.is_none() {
                    c.phase = Some(self.detect_phase_at(&c.word_id, &c.stats, now).phase);
                }
                c
            })
            .collect()
    }

    pub fn completion_report(&self) -> AcquisitionReport {
        self.queue.generate_completion_report()
    }

    pub fn reset(&mut self) {
        self.queue.reset();
        self.history.clear();
        self.answers_since_estimate = 0;
        self.selection.set_session_question(0);
        self.set_personal_parameters(None);
    }
}
