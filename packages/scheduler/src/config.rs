use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sanitize::sanitize_ratio;
use crate::types::{QuestionCategory, QueueType, MIN_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryConfig {
    /// Initial dynamic threshold for items of this category
    pub consolidation_threshold: u32,
    pub enable_immediate_review: bool,
    pub enable_early_review: bool,
    pub enable_mid_review: bool,
    pub enable_end_review: bool,
    /// New-item share used when adaptive adjustment is off
    pub new_question_ratio: f64,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self::for_category(QuestionCategory::Memorization)
    }
}

impl CategoryConfig {
    pub fn for_category(category: QuestionCategory) -> Self {
        Self {
            consolidation_threshold: category.default_threshold(),
            enable_immediate_review: true,
            enable_early_review: true,
            enable_mid_review: true,
            enable_end_review: true,
            new_question_ratio: match category {
                QuestionCategory::Memorization => 0.6,
                QuestionCategory::Translation => 0.5,
                QuestionCategory::Spelling => 0.4,
                QuestionCategory::Grammar => 0.5,
            },
        }
    }

    pub fn is_queue_enabled(&self, queue: QueueType) -> bool {
        match queue {
            QueueType::Immediate => self.enable_immediate_review,
            QueueType::Early => self.enable_early_review,
            QueueType::Mid => self.enable_mid_review,
            QueueType::End => self.enable_end_review,
        }
    }

    /// First enabled tier at or after `queue`
    pub fn first_enabled_from(&self, queue: QueueType) -> Option<QueueType> {
        let mut current = Some(queue);
        while let Some(q) = current {
            if self.is_queue_enabled(q) {
                return Some(q);
            }
            current = q.next();
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryConfigs {
    pub memorization: CategoryConfig,
    pub translation: CategoryConfig,
    pub spelling: CategoryConfig,
    pub grammar: CategoryConfig,
}

impl Default for CategoryConfigs {
    fn default() -> Self {
        Self {
            memorization: CategoryConfig::for_category(QuestionCategory::Memorization),
            translation: CategoryConfig::for_category(QuestionCategory::Translation),
            spelling: CategoryConfig::for_category(QuestionCategory::Spelling),
            grammar: CategoryConfig::for_category(QuestionCategory::Grammar),
        }
    }
}

impl CategoryConfigs {
    pub fn get(&self, category: QuestionCategory) -> &CategoryConfig {
        match category {
            QuestionCategory::Memorization => &self.memorization,
            QuestionCategory::Translation => &self.translation,
            QuestionCategory::Spelling => &self.spelling,
            QuestionCategory::Grammar => &self.grammar,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionConfig {
    pub acquisition_ratio: f64,
    pub retention_ratio: f64,
    /// Vary the new-item ratio with session position
    pub adaptive_adjustment: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            acquisition_ratio: 0.6,
            retention_ratio: 0.4,
            adaptive_adjustment: true,
        }
    }
}

impl SelectionConfig {
    /// Acquisition share of the acquisition/retention mix
    pub fn new_item_ratio(&self) -> f64 {
        let total = self.acquisition_ratio + self.retention_ratio;
        if !total.is_finite() || total <= 0.0 {
            return 0.6;
        }
        sanitize_ratio(self.acquisition_ratio / total, 0.6)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseConfig {
    /// Fixed offset from UTC used for "same calendar day" checks
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub categories: CategoryConfigs,
    pub selection: SelectionConfig,
    pub phase: PhaseConfig,
    /// Category assumed when an item is referenced without one
    pub default_category: QuestionCategory,
    /// Answers between personalization re-estimates
    pub reestimate_interval: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            categories: CategoryConfigs::default(),
            selection: SelectionConfig::default(),
            phase: PhaseConfig::default(),
            default_category: QuestionCategory::Memorization,
            reestimate_interval: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SRS_ADAPTIVE_ADJUSTMENT") {
            config.selection.adaptive_adjustment = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("SRS_ACQUISITION_RATIO") {
            config.selection.acquisition_ratio = val.parse().unwrap_or(0.6);
        }
        if let Ok(val) = std::env::var("SRS_RETENTION_RATIO") {
            config.selection.retention_ratio = val.parse().unwrap_or(0.4);
        }
        if let Ok(val) = std::env::var("SRS_REESTIMATE_INTERVAL") {
            config.reestimate_interval = val.parse().unwrap_or(10);
        }
        if let Ok(val) = std::env::var("SRS_UTC_OFFSET_MINUTES") {
            config.phase.utc_offset_minutes = val.parse().unwrap_or(0);
        }

        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in QuestionCategory::ALL {
            let cfg = self.categories.get(category);
            if cfg.consolidation_threshold < MIN_THRESHOLD {
                return Err(ConfigError::Validation(format!(
                    "{} consolidationThreshold must be >= {MIN_THRESHOLD}, got {}",
                    category.as_str(),
                    cfg.consolidation_threshold
                )));
            }
            if !(0.0..=1.0).contains(&cfg.new_question_ratio) {
                return Err(ConfigError::Validation(format!(
                    "{} newQuestionRatio must be within [0, 1], got {}",
                    category.as_str(),
                    cfg.new_question_ratio
                )));
            }
        }

        let selection = &self.selection;
        for (name, value) in [
            ("acquisitionRatio", selection.acquisition_ratio),
            ("retentionRatio", selection.retention_ratio),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if selection.acquisition_ratio + selection.retention_ratio <= 0.0 {
            return Err(ConfigError::Validation(
                "acquisitionRatio + retentionRatio must be positive".to_string(),
            ));
        }

        // chrono's FixedOffset accepts strictly less than one day
        if self.phase.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Validation(format!(
                "utcOffsetMinutes out of range: {}",
                self.phase.utc_offset_minutes
            )));
        }

        if self.reestimate_interval == 0 {
            return Err(ConfigError::Validation(
                "reestimateInterval must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn category(&self, category: QuestionCategory) -> &CategoryConfig {
        self.categories.get(category)
    }

    /// Initial dynamic threshold for a category, never below the floor
    pub fn initial_threshold(&self, category: QuestionCategory) -> u32 {
        self.categories
            .get(category)
            .consolidation_threshold
            .max(MIN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_threshold(QuestionCategory::Spelling), 6);
        assert_eq!(config.initial_threshold(QuestionCategory::Translation), 4);
        assert_eq!(config.initial_threshold(QuestionCategory::Grammar), 5);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "selection": { "adaptiveAdjustment": false },
            "categories": { "spelling": { "consolidationThreshold": 8 } }
        }"#;
        let config = SchedulerConfig::from_json_str(json).unwrap();
        assert!(!config.selection.adaptive_adjustment);
        assert_eq!(config.selection.acquisition_ratio, 0.6);
        assert_eq!(config.categories.spelling.consolidation_threshold, 8);
        assert!(config.categories.spelling.enable_immediate_review);
        assert_eq!(config.categories.translation.consolidation_threshold, 4);
    }

    #[test]
    fn test_threshold_below_floor_rejected() {
        let json = r#"{ "categories": { "grammar": { "consolidationThreshold": 2 } } }"#;
        let err = SchedulerConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("grammar"));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = SchedulerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_zero_ratio_sum_rejected() {
        let mut config = SchedulerConfig::default();
        config.selection.acquisition_ratio = 0.0;
        config.selection.retention_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_new_item_ratio_normalizes() {
        let selection = SelectionConfig {
            acquisition_ratio: 3.0,
            retention_ratio: 1.0,
            adaptive_adjustment: false,
        };
        assert!((selection.new_item_ratio() - 0.75).abs() < 1e-9);
        assert!((SelectionConfig::default().new_item_ratio() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_first_enabled_skips_disabled_tiers() {
        let mut cfg = CategoryConfig::for_category(QuestionCategory::Grammar);
        cfg.enable_early_review = false;
        cfg.enable_mid_review = false;
        assert_eq!(cfg.first_enabled_from(QueueType::Early), Some(QueueType::End));
        cfg.enable_end_review = false;
        assert_eq!(cfg.first_enabled_from(QueueType::Early), None);
        assert_eq!(cfg.first_enabled_from(QueueType::Immediate), Some(QueueType::Immediate));
    }
}
