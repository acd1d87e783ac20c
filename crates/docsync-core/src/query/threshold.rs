//! Adaptive threshold controller and update strategy selection.
//!
//! The controller decides whether the share of changed files is small enough
//! for an incremental update. Its only learned state is a bounded window of
//! past outcomes, mutated exclusively through [`AdaptiveThresholdController::record_result`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::{StrategyConfig, ThresholdConfig};
use crate::models::{ChangeBreakdown, RiskLevel, ThresholdRecord, UpdateStrategy};
use crate::query::guards::clamp_window;

const VERY_SMALL_PROJECT: usize = 50;
const SMALL_PROJECT: usize = 200;
const MEDIUM_PROJECT: usize = 1_000;

const MAX_DELETE_RATIO: f64 = 0.3;
const MAX_SMALL_PROJECT_ADD_RATIO: f64 = 0.5;

/// Size-tiered starting threshold, in percent of files changed.
pub fn base_threshold(project_size: usize) -> f64 {
    if project_size <= VERY_SMALL_PROJECT {
        30.0
    } else if project_size <= SMALL_PROJECT {
        50.0
    } else if project_size <= MEDIUM_PROJECT {
        65.0
    } else {
        75.0
    }
}

pub fn is_small_project(project_size: usize) -> bool {
    project_size <= SMALL_PROJECT
}

/// Percentage of `project_size` covered by `changed_files`. An empty project
/// counts as fully changed.
pub fn change_percentage(changed_files: usize, project_size: usize) -> f64 {
    if project_size == 0 {
        100.0
    } else {
        changed_files as f64 * 100.0 / project_size as f64
    }
}

// ---------------------------------------------------------------------------
// History window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdHistory {
    records: VecDeque<ThresholdRecord>,
    capacity: usize,
}

impl ThresholdHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = clamp_window(capacity as i64);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest record once the window is full.
    pub fn push(&mut self, record: ThresholdRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdRecord> {
        self.records.iter()
    }

    pub fn success_rate(&self) -> Option<f64> {
        rate(self.records.iter())
    }

    /// Success rate of incremental runs only.
    pub fn incremental_success_rate(&self) -> Option<f64> {
        rate(self.records.iter().filter(|r| r.used_incremental))
    }
}

fn rate<'a>(records: impl Iterator<Item = &'a ThresholdRecord>) -> Option<f64> {
    let (total, ok) = records.fold((0usize, 0usize), |(t, s), r| (t + 1, s + r.success as usize));
    (total > 0).then(|| ok as f64 / total as f64)
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDecision {
    pub use_incremental: bool,
    /// Threshold the change percentage was compared against.
    pub threshold: f64,
    pub change_percentage: f64,
    pub reason: String,
    /// Below 0.5 while history is too short to adjust the threshold.
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct AdaptiveThresholdController {
    config: ThresholdConfig,
    history: ThresholdHistory,
}

impl AdaptiveThresholdController {
    pub fn new(config: ThresholdConfig) -> Self {
        let config = config.normalized();
        let history = ThresholdHistory::new(config.window_size);
        Self { config, history }
    }

    /// Controller with `records` replayed in order, as after a restart.
    pub fn with_history(
        config: ThresholdConfig,
        records: impl IntoIterator<Item = ThresholdRecord>,
    ) -> Self {
        let mut controller = Self::new(config);
        for record in records {
            controller.record_result(record);
        }
        controller
    }

    pub fn history(&self) -> &ThresholdHistory {
        &self.history
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    fn has_enough_history(&self) -> bool {
        self.history.len() >= self.config.min_history_for_adjustment
    }

    /// Shift applied to the base threshold from recent outcomes.
    pub fn adjustment(&self) -> f64 {
        if !self.has_enough_history() {
            return 0.0;
        }
        let overall = self.history.success_rate().unwrap_or(1.0);
        let incremental = self.history.incremental_success_rate().unwrap_or(overall);
        if overall > 0.9 && incremental > 0.8 {
            -5.0
        } else if overall < 0.7 || incremental < 0.6 {
            10.0
        } else {
            5.0
        }
    }

    pub fn calculate_threshold(&self, project_size: usize) -> f64 {
        let raw = base_threshold(project_size) + self.adjustment();
        raw.clamp(self.config.min_threshold, self.config.max_threshold)
    }

    fn confidence(&self) -> f64 {
        if !self.has_enough_history() {
            return 0.3;
        }
        let fill = self.history.len() as f64 / self.history.capacity() as f64;
        0.5 + 0.5 * fill.min(1.0)
    }

    pub fn should_use_incremental(
        &self,
        project_size: usize,
        change_pct: f64,
        breakdown: &ChangeBreakdown,
    ) -> ThresholdDecision {
        let threshold = self.calculate_threshold(project_size);
        let confidence = self.confidence();
        let decision = |use_incremental: bool, reason: String| ThresholdDecision {
            use_incremental,
            threshold,
            change_percentage: change_pct,
            reason,
            confidence,
        };

        if change_pct > threshold {
            return decision(
                false,
                format!("{change_pct:.1}% of files changed, above the {threshold:.1}% threshold"),
            );
        }
        if breakdown.delete_ratio() > MAX_DELETE_RATIO {
            return decision(
                false,
                format!(
                    "{:.0}% of changes are deletions",
                    breakdown.delete_ratio() * 100.0
                ),
            );
        }
        if is_small_project(project_size) && breakdown.add_ratio() > MAX_SMALL_PROJECT_ADD_RATIO {
            return decision(
                false,
                format!(
                    "{:.0}% of changes are additions to a small project",
                    breakdown.add_ratio() * 100.0
                ),
            );
        }
        decision(
            true,
            format!("{change_pct:.1}% of files changed, within the {threshold:.1}% threshold"),
        )
    }

    pub fn record_result(&mut self, record: ThresholdRecord) {
        tracing::debug!(
            project_size = record.project_size,
            change_percentage = record.change_percentage,
            incremental = record.used_incremental,
            success = record.success,
            "recording update outcome"
        );
        self.history.push(record);
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Strategy by changed-file count alone.
pub fn recommend_strategy(changed_files: usize, config: &StrategyConfig) -> UpdateStrategy {
    if changed_files > config.full_regeneration_file_limit {
        UpdateStrategy::Full
    } else if changed_files <= config.selective_file_limit {
        UpdateStrategy::Selective
    } else {
        UpdateStrategy::Incremental
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub strategy: UpdateStrategy,
    /// What the file count alone recommended.
    pub recommended: UpdateStrategy,
    pub threshold: ThresholdDecision,
    pub reason: String,
}

/// Combine the file-count recommendation with the controller verdict and the
/// local impact risk. Either of the latter can force a full regeneration.
pub fn decide_strategy(
    changed_files: usize,
    project_size: usize,
    breakdown: &ChangeBreakdown,
    local_risk: RiskLevel,
    controller: &AdaptiveThresholdController,
    config: &StrategyConfig,
) -> StrategyDecision {
    let recommended = recommend_strategy(changed_files, config);
    let pct = change_percentage(changed_files, project_size);
    let threshold = controller.should_use_incremental(project_size, pct, breakdown);

    let (strategy, reason) = if recommended == UpdateStrategy::Full {
        (
            UpdateStrategy::Full,
            format!("{changed_files} changed files exceed the incremental limit"),
        )
    } else if !threshold.use_incremental {
        (UpdateStrategy::Full, threshold.reason.clone())
    } else if local_risk >= RiskLevel::High {
        (
            UpdateStrategy::Full,
            format!("{} impact risk", local_risk.as_str()),
        )
    } else {
        (recommended, threshold.reason.clone())
    };

    tracing::info!(
        strategy = strategy.as_str(),
        recommended = recommended.as_str(),
        changed_files,
        project_size,
        %reason,
        "update strategy decided"
    );
    StrategyDecision {
        strategy,
        recommended,
        threshold,
        reason,
    }
}
