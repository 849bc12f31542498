//! # danci-scheduler - 自适应间隔重复调度
//!
//! 决定每个学习项 *何时* 再次出现以及 *多紧急*:
//!
//! - **Memory Phase Classifier** - 基于规则表的五阶段记忆状态判定
//! - **Spaced Repetition Queues** - Immediate / Early / Mid / End 四级复习队列
//! - **Hybrid Selection** - 队列优先, 其余按新词/复习比例混合抽取
//! - **Personal Parameters** - 从答题历史估计个人学习/遗忘速度
//!
//! ## 模块结构
//!
//! - [`phase`] - 记忆阶段分类 (规则表、5 秒缓存、批量分类)
//! - [`queue`] - 复习队列、掌握判定、完成报告
//! - [`selection`] - 优先级计算与下一题选择
//! - [`personal`] - 个人参数估计与适用性判断
//! - [`engine`] - 会话门面, 串联以上组件
//! - [`config`] - 配置 (默认值、环境变量、JSON)
//! - [`sanitize`] - 输入清洗
//! - [`types`] - 公共类型和常量
//!
//! ## 使用示例
//!
//! ```rust
//! use danci_scheduler::{QuestionCategory, SchedulerConfig, SpacedRepetitionQueueManager};
//!
//! let mut queue = SpacedRepetitionQueueManager::new(SchedulerConfig::default());
//! queue.enqueue_new_item("apple", 4, QuestionCategory::Memorization);
//! queue.advance_question();
//!
//! let due = queue.get_next_due_item().map(|e| e.word_id.as_str());
//! assert_eq!(due, Some("apple"));
//! ```

// ============================================================================
// 模块声明
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod personal;
pub mod phase;
pub mod queue;
pub mod sanitize;
pub mod selection;
pub mod types;

// ============================================================================
// 重新导出
// ============================================================================

pub use types::*;

pub use config::{CategoryConfig, CategoryConfigs, PhaseConfig, SchedulerConfig, SelectionConfig};
pub use engine::{AnswerEvent, AnswerOutcome, LearningScheduler};
pub use error::ConfigError;
pub use logging::init_tracing;
pub use personal::{
    calculate_parameter_applicability, ApplicabilityPattern, ParameterApplicability,
    PersonalParameterEstimator,
};
pub use phase::{can_transition, MemoryPhaseClassifier, PhaseDetectionResult, PhaseMetrics};
pub use queue::{
    AcquisitionProgress, AcquisitionReport, QueueEntry, QueueStats, QueueUpdate, ReviewAttempt,
    SpacedRepetitionQueueManager,
};
pub use selection::{HybridSelectionPolicy, PriorityBreakdown, PriorityResult, SelectionCandidate};
