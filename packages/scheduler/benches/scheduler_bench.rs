//! Benchmark suite for danci-scheduler
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use danci_scheduler::{
    HybridSelectionPolicy, LearningHistory, MemoryPhaseClassifier, PersonalParameterEstimator,
    QuestionCategory, ReviewStatistics, SchedulerConfig, SelectionCandidate,
    SpacedRepetitionQueueManager, MS_PER_HOUR,
};

const NOW: i64 = 1_700_049_600_000;

fn sample_stats(i: u32) -> ReviewStatistics {
    ReviewStatistics {
        review_count: i % 12,
        correct_count: (i % 12) * 3 / 4,
        wrong_count: (i % 12) / 4,
        last_review_time: NOW - i64::from(i % 48) * MS_PER_HOUR,
        last_correct_time: Some(NOW - i64::from(i % 48) * MS_PER_HOUR),
        average_response_time: 800.0 + f64::from(i % 30) * 100.0,
        consecutive_correct: i % 5,
        consecutive_wrong: 0,
    }
}

fn bench_classify_batch(c: &mut Criterion) {
    let classifier = MemoryPhaseClassifier::default();
    let items: Vec<_> = (0..1000).map(sample_stats).collect();
    c.bench_function("MemoryPhaseClassifier::classify_batch(1000)", |b| {
        b.iter(|| classifier.classify_batch(black_box(&items), None, NOW))
    });
}

fn bench_queue_session(c: &mut Criterion) {
    c.bench_function("SpacedRepetitionQueueManager session(200 answers)", |b| {
        b.iter(|| {
            let mut queue = SpacedRepetitionQueueManager::new(SchedulerConfig::default());
            for i in 0..50u32 {
                queue.enqueue_new_item_at(&format!("w{i}"), 3 + (i % 3) as u8, QuestionCategory::Memorization, NOW);
            }
            for i in 0..200i64 {
                let word = format!("w{}", i % 50);
                if i % 7 == 0 {
                    queue.record_wrong_at(&word, None, Some(2500.0), None, None, NOW + i * 1000);
                } else {
                    queue.record_correct_at(&word, None, Some(1200.0), None, None, NOW + i * 1000);
                }
                queue.advance_question();
            }
            black_box(queue.generate_completion_report_at(NOW))
        })
    });
}

fn bench_select_next(c: &mut Criterion) {
    let mut policy = HybridSelectionPolicy::with_seed(&SchedulerConfig::default(), 42);
    let candidates: Vec<_> = (0..500)
        .map(|i| SelectionCandidate::new(format!("w{i}"), sample_stats(i)).due_at(NOW - i64::from(i) * 60_000))
        .collect();
    c.bench_function("HybridSelectionPolicy::select_next(500)", |b| {
        b.iter(|| policy.select_next_at(black_box(&candidates), NOW))
    });
}

fn bench_estimate(c: &mut Criterion) {
    let estimator = PersonalParameterEstimator::new();
    let history: Vec<_> = (0..5000i64)
        .map(|i| LearningHistory {
            word_id: format!("w{}", i % 300),
            timestamp: NOW + i * 60_000,
            is_correct: i % 4 != 0,
            response_time: 900.0 + (i % 20) as f64 * 50.0,
        })
        .collect();
    c.bench_function("PersonalParameterEstimator::estimate(5000)", |b| {
        b.iter(|| estimator.estimate(black_box(&history)))
    });
}

criterion_group!(
    benches,
    bench_classify_batch,
    bench_queue_session,
    bench_select_next,
    bench_estimate
);
criterion_main!(benches);
