//! Property-Based Tests for the scheduling engine
//!
//! Tests the following invariants:
//! - Dynamic threshold never drops below the floor and never shrinks on a wrong answer
//! - Repeated wrong answers always land in Immediate with difficulty min(original + 1, 5)
//! - Acquisition never completes with fewer than 3 distinct correct tiers today
//! - Unreviewed and just-reviewed items classify as Encoding
//! - Personal parameter estimation is deterministic and bounded
//! - Priority totals stay inside their component ranges

use proptest::prelude::*;

use danci_scheduler::{
    can_transition, HybridSelectionPolicy, LearningHistory, MemoryPhase, MemoryPhaseClassifier,
    PersonalParameterEstimator, QuestionCategory, QueueType, ReviewStatistics, SchedulerConfig,
    SelectionCandidate, SpacedRepetitionQueueManager, MIN_THRESHOLD, MS_PER_DAY, MS_PER_HOUR,
};

const NOW: i64 = 1_700_049_600_000;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_category() -> impl Strategy<Value = QuestionCategory> {
    prop_oneof![
        Just(QuestionCategory::Memorization),
        Just(QuestionCategory::Translation),
        Just(QuestionCategory::Spelling),
        Just(QuestionCategory::Grammar),
    ]
}

fn arb_queue() -> impl Strategy<Value = QueueType> {
    prop_oneof![
        Just(QueueType::Immediate),
        Just(QueueType::Early),
        Just(QueueType::Mid),
        Just(QueueType::End),
    ]
}

fn arb_phase() -> impl Strategy<Value = MemoryPhase> {
    prop_oneof![
        Just(MemoryPhase::Encoding),
        Just(MemoryPhase::InitialConsolidation),
        Just(MemoryPhase::IntradayReview),
        Just(MemoryPhase::ShortTerm),
        Just(MemoryPhase::LongTerm),
    ]
}

fn arb_review_stats() -> impl Strategy<Value = ReviewStatistics> {
    (
        0u32..300,                     // review_count
        0u32..300,                     // correct_count (capped)
        0i64..(2000 * MS_PER_DAY),     // age of last review
        -5000.0f64..90_000.0,          // average_response_time
        0u32..150,                     // consecutive_correct
        0u32..150,                     // consecutive_wrong
    )
        .prop_map(|(reviews, correct, age, rt, cc, cw)| {
            let correct = correct.min(reviews);
            ReviewStatistics {
                review_count: reviews,
                correct_count: correct,
                wrong_count: reviews - correct,
                last_review_time: NOW - age,
                last_correct_time: (correct > 0).then_some(NOW - age),
                average_response_time: rt,
                consecutive_correct: cc,
                consecutive_wrong: cw,
            }
        })
}

fn arb_history() -> impl Strategy<Value = Vec<LearningHistory>> {
    prop::collection::vec(
        (0u8..12, 0i64..(30 * MS_PER_DAY), any::<bool>(), 1.0f64..10_000.0),
        0..120,
    )
    .prop_map(|records| {
        records
            .into_iter()
            .map(|(word, offset, is_correct, rt)| LearningHistory {
                word_id: format!("w{word}"),
                timestamp: NOW + offset,
                is_correct,
                response_time: rt,
            })
            .collect()
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// PBT-1: threshold floor holds and wrong answers never lower it
    #[test]
    fn threshold_floor_and_monotonic_on_wrong(
        difficulty in 1u8..=5,
        category in arb_category(),
        answers in prop::collection::vec(any::<bool>(), 1..60),
    ) {
        let mut queue = SpacedRepetitionQueueManager::default();
        queue.enqueue_new_item_at("w", difficulty, category, NOW);

        for (i, is_correct) in answers.into_iter().enumerate() {
            let at = NOW + i as i64 * 1000;
            let before = queue.get_progress("w").dynamic_threshold;
            let update = if is_correct {
                queue.record_correct_at("w", None, None, None, None, at)
            } else {
                queue.record_wrong_at("w", None, None, None, None, at)
            };
            prop_assert!(update.dynamic_threshold >= MIN_THRESHOLD);
            if !is_correct {
                prop_assert!(update.dynamic_threshold >= before);
            }
        }
    }

    /// PBT-2: N consecutive wrong answers leave the item in Immediate, one level harder
    #[test]
    fn wrong_answers_requeue_into_immediate(
        difficulty in 1u8..=5,
        category in arb_category(),
        wrongs in 1usize..12,
    ) {
        let mut queue = SpacedRepetitionQueueManager::default();
        queue.enqueue_new_item_at("w", difficulty, category, NOW);
        for i in 0..wrongs {
            queue.record_wrong_at("w", None, None, None, None, NOW + i as i64 * 1000);
        }

        prop_assert_eq!(queue.queue_of("w"), Some(QueueType::Immediate));
        let entry = queue.get_next_due_item_at(NOW + MS_PER_DAY).unwrap();
        prop_assert_eq!(entry.word_id.as_str(), "w");
        prop_assert_eq!(entry.difficulty, (difficulty + 1).min(5));
        prop_assert_eq!(queue.queue_stats().total, 1);
    }

    /// PBT-3: two tiers are never enough for acquisition
    #[test]
    fn fewer_than_three_tiers_never_complete(
        tiers in (arb_queue(), arb_queue()),
        answers in prop::collection::vec((any::<bool>(), any::<bool>()), 1..80),
    ) {
        let mut queue = SpacedRepetitionQueueManager::default();
        for (i, (is_correct, first)) in answers.into_iter().enumerate() {
            let tier = if first { tiers.0 } else { tiers.1 };
            let at = NOW + i as i64 * 1000;
            let update = if is_correct {
                queue.record_correct_at("w", Some(tier), None, Some(4), None, at)
            } else {
                queue.record_wrong_at("w", Some(tier), None, Some(4), None, at)
            };
            prop_assert!(!update.is_acquisition_complete);
        }
    }

    /// PBT-4: unreviewed items are Encoding via the first rule
    #[test]
    fn unreviewed_is_encoding(stats in arb_review_stats()) {
        let stats = ReviewStatistics {
            review_count: 0,
            correct_count: 0,
            wrong_count: 0,
            ..stats
        };
        let result = MemoryPhaseClassifier::default().classify_at(&stats, None, NOW);
        prop_assert_eq!(result.phase, MemoryPhase::Encoding);
        prop_assert_eq!(result.matched_rule, 1);
    }

    /// PBT-5: anything reviewed in the last 30 seconds is Encoding
    #[test]
    fn just_reviewed_is_encoding(stats in arb_review_stats(), age in 0i64..30_000) {
        let stats = ReviewStatistics {
            review_count: stats.review_count.max(1),
            last_review_time: NOW - age,
            ..stats
        };
        let result = MemoryPhaseClassifier::default().classify_at(&stats, None, NOW);
        prop_assert_eq!(result.phase, MemoryPhase::Encoding);
        prop_assert_eq!(result.matched_rule, 2);
    }

    /// PBT-6: every classification lands on a known rule
    #[test]
    fn classification_is_total(stats in arb_review_stats()) {
        let result = MemoryPhaseClassifier::default().classify_at(&stats, None, NOW);
        prop_assert!((1..=11).contains(&result.matched_rule));
        prop_assert!(!result.reason.is_empty());
    }

    /// PBT-7: forward transitions advance at most one stage
    #[test]
    fn transitions_forward_one_stage(from in arb_phase(), to in arb_phase()) {
        let allowed = can_transition(from, to);
        prop_assert_eq!(allowed, to.stage() <= from.stage() + 1);
    }

    /// PBT-8: estimation is deterministic and bounded
    #[test]
    fn estimate_is_deterministic(history in arb_history()) {
        let estimator = PersonalParameterEstimator::new();
        let first = estimator.estimate(&history);
        let second = estimator.estimate(&history);
        prop_assert_eq!(&first, &second);

        prop_assert!((0.5..=1.8).contains(&first.learning_speed));
        prop_assert!((0.6..=2.0).contains(&first.forgetting_speed));
        prop_assert!((2.0..=5.0).contains(&first.consolidation_threshold));
        prop_assert!((0.0..=1.0).contains(&first.confidence_level));
        prop_assert!((0.0..=1.0).contains(&first.response_time_profile.consistency_score));
        prop_assert_eq!(first.sample_size, history.len());
    }

    /// PBT-9: priority totals stay within the sum of component ranges
    #[test]
    fn priority_within_bounds(
        stats in arb_review_stats(),
        queue in proptest::option::of((arb_queue(), 0usize..20)),
        due_offset in proptest::option::of(-(100 * MS_PER_HOUR)..(100 * MS_PER_HOUR)),
    ) {
        let policy = HybridSelectionPolicy::with_seed(&SchedulerConfig::default(), 3);
        let mut candidate = SelectionCandidate::new("w", stats);
        if let Some((q, pos)) = queue {
            candidate = candidate.in_queue(q, pos);
        }
        if let Some(offset) = due_offset {
            candidate = candidate.due_at(NOW + offset);
        }

        let result = policy.priority_of_at(&candidate, NOW);
        let b = result.breakdown;
        prop_assert!((0.0..=45.0).contains(&b.queue));
        prop_assert!((10.0..=30.0).contains(&b.phase));
        prop_assert!((0.0..=20.0).contains(&b.timing));
        prop_assert!((0.0..=10.0).contains(&b.personal));
        prop_assert!((result.total - (b.queue + b.phase + b.timing + b.personal)).abs() < 1e-9);
    }
}
