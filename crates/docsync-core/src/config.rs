//! Engine configuration: defaults, `DOCSYNC_*` environment overrides, and
//! JSON loading.
//!
//! Every section deserialises with `#[serde(default)]`, so a partial JSON
//! document only overrides the keys it names.

use serde::{Deserialize, Serialize};

use crate::errors::SyncResult;
use crate::query::guards::{
    clamp_batch_size, clamp_depth, clamp_retries, clamp_window, clamp_workers, parse_toggle,
    DEFAULT_BATCH_SIZE, DEFAULT_HISTORY_WINDOW, DEFAULT_IMPACT_DEPTH, DEFAULT_MAX_RETRIES,
    DEFAULT_WORKERS, MAX_IMPACT_DEPTH, MAX_RETRY_BACKOFF_MS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Maximum reverse-dependency hops followed from a direct impact.
    pub max_impact_depth: usize,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_impact_depth: DEFAULT_IMPACT_DEPTH as usize,
        }
    }
}

/// How batch dependencies are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyMode {
    /// Batch `i` depends on batch `i-1`.
    Linear,
    /// Dependencies follow file → artifact → index edges.
    ArtifactGraph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_parallelism: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub dependency_mode: DependencyMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE as usize,
            max_parallelism: DEFAULT_WORKERS as usize,
            max_retries: DEFAULT_MAX_RETRIES as u32,
            retry_backoff_ms: 25,
            dependency_mode: DependencyMode::ArtifactGraph,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub min_threshold: f64,
    pub max_threshold: f64,
    /// Capacity of the rolling outcome history.
    pub window_size: usize,
    /// Below this many records the controller applies no adjustment.
    pub min_history_for_adjustment: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_threshold: 10.0,
            max_threshold: 90.0,
            window_size: DEFAULT_HISTORY_WINDOW as usize,
            min_history_for_adjustment: 3,
        }
    }
}

impl ThresholdConfig {
    /// Bounds made finite, within 0..=100, and ordered.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if !self.min_threshold.is_finite() {
            self.min_threshold = defaults.min_threshold;
        }
        if !self.max_threshold.is_finite() {
            self.max_threshold = defaults.max_threshold;
        }
        self.min_threshold = self.min_threshold.clamp(0.0, 100.0);
        self.max_threshold = self.max_threshold.clamp(0.0, 100.0);
        if self.min_threshold > self.max_threshold {
            std::mem::swap(&mut self.min_threshold, &mut self.max_threshold);
        }
        self.window_size = clamp_window(self.window_size as i64);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// At or below this many changed files only the touched artifacts are updated.
    pub selective_file_limit: usize,
    /// Above this many changed files everything is regenerated.
    pub full_regeneration_file_limit: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            selective_file_limit: 5,
            full_regeneration_file_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub impact: ImpactConfig,
    pub batch: BatchConfig,
    pub threshold: ThresholdConfig,
    pub strategy: StrategyConfig,
}

impl EngineConfig {
    /// Defaults overridden by any `DOCSYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a (possibly partial) JSON document and normalise it.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored with a warning.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let int = |key: &str| -> Option<i64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring non-numeric override");
                    None
                }
            }
        };

        if let Some(v) = int("DOCSYNC_MAX_IMPACT_DEPTH") {
            self.impact.max_impact_depth = clamp_depth(v, MAX_IMPACT_DEPTH) as usize;
        }
        if let Some(v) = int("DOCSYNC_BATCH_SIZE") {
            self.batch.batch_size = clamp_batch_size(v);
        }
        if let Some(v) = int("DOCSYNC_WORKERS") {
            self.batch.max_parallelism = clamp_workers(v);
        }
        if let Some(v) = int("DOCSYNC_MAX_RETRIES") {
            self.batch.max_retries = clamp_retries(v);
        }
        if let Some(v) = int("DOCSYNC_HISTORY_WINDOW") {
            self.threshold.window_size = clamp_window(v);
        }
        if let Some(raw) = lookup("DOCSYNC_LINEAR_BATCHES") {
            match parse_toggle(&raw) {
                Some(true) => self.batch.dependency_mode = DependencyMode::Linear,
                Some(false) => self.batch.dependency_mode = DependencyMode::ArtifactGraph,
                None => tracing::warn!(value = %raw, "ignoring DOCSYNC_LINEAR_BATCHES"),
            }
        }
        self.normalized()
    }

    /// Clamp every knob into its supported range.
    pub fn normalized(mut self) -> Self {
        self.impact.max_impact_depth =
            clamp_depth(self.impact.max_impact_depth as i64, MAX_IMPACT_DEPTH) as usize;
        self.batch.batch_size = clamp_batch_size(self.batch.batch_size as i64);
        self.batch.max_parallelism = clamp_workers(self.batch.max_parallelism as i64);
        self.batch.max_retries = clamp_retries(self.batch.max_retries as i64);
        self.batch.retry_backoff_ms = self.batch.retry_backoff_ms.min(MAX_RETRY_BACKOFF_MS);
        self.threshold = self.threshold.normalized();
        if self.strategy.selective_file_limit > self.strategy.full_regeneration_file_limit {
            self.strategy.selective_file_limit = self.strategy.full_regeneration_file_limit;
        }
        self
    }
}
