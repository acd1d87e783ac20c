//! One update cycle: detect → rebuild → propagate → assess → decide →
//! schedule → execute → record.

use std::sync::Arc;
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::errors::SyncResult;
use crate::indexer::symbols::{BuildStats, SymbolGraph, SymbolTracker};
use crate::models::{
    AffectedArtifact, BatchPlan, ChangeInfo, RiskAssessment, SymbolChange, ThresholdRecord,
    UpdatePriority, UpdateStrategy,
};
use crate::ports::{
    ArtifactStore, ContentGenerator, GenerationRequest, ParsedFileProvider, SyncLedger, SyncRun,
    VersionControlSource,
};
use crate::query::artifacts::{ArtifactGraph, ArtifactIndex, INDEX_ARTIFACT};
use crate::query::change_impact::{ImpactAnalyzer, ImpactResult};
use crate::query::risk::assess_impact;
use crate::query::threshold::{change_percentage, decide_strategy, AdaptiveThresholdController, StrategyDecision};
use crate::scheduler::batch::optimize_batch;
use crate::scheduler::executor::{execute_optimized, CancellationToken, ExecutionResult};
use crate::scheduler::prioritize::{prioritize_artifacts, UpdatePlan};
use crate::sync::changes::detect_file_changes;
use crate::sync::updater::{ArtifactConflict, ArtifactUpdater};

/// Collaborators a cycle runs against.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub vcs: &'a dyn VersionControlSource,
    pub parser: &'a dyn ParsedFileProvider,
    pub store: &'a dyn ArtifactStore,
    pub ledger: &'a dyn SyncLedger,
    pub generator: &'a dyn ContentGenerator,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub revision: String,
    pub changes: Vec<ChangeInfo>,
    pub symbol_changes: Vec<SymbolChange>,
    pub build: BuildStats,
    pub impact: Option<ImpactResult>,
    pub risk: Option<RiskAssessment>,
    /// `None` when nothing changed.
    pub strategy: Option<StrategyDecision>,
    /// Plans for the artifacts the cycle actually scheduled.
    pub update_plans: Vec<UpdatePlan>,
    pub plan: BatchPlan,
    pub execution: Option<ExecutionResult>,
    pub conflicts: Vec<ArtifactConflict>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

impl CycleReport {
    fn empty(revision: String) -> Self {
        Self {
            revision,
            changes: Vec::new(),
            symbol_changes: Vec::new(),
            build: BuildStats::default(),
            impact: None,
            risk: None,
            strategy: None,
            update_plans: Vec::new(),
            plan: BatchPlan::default(),
            execution: None,
            conflicts: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// No failures and nothing cancelled. Conflicts do not count as failures.
    pub fn succeeded(&self) -> bool {
        self.execution.as_ref().map_or(true, |e| e.success)
    }
}

pub struct SyncEngine<'a> {
    config: EngineConfig,
    ctx: SyncContext<'a>,
    tracker: SymbolTracker,
    /// Symbol graph of the last fully synced tree. Symbol changes are always
    /// computed against it, so a failed cycle is re-diffed from the same
    /// starting point.
    baseline: Arc<SymbolGraph>,
    controller: AdaptiveThresholdController,
}

impl<'a> SyncEngine<'a> {
    /// Replays persisted controller history and the stored baseline tree, so
    /// thresholds and symbol-level diffs survive restarts.
    pub fn new(config: EngineConfig, ctx: SyncContext<'a>) -> SyncResult<Self> {
        let config = config.normalized();
        let history = ctx.ledger.threshold_history(config.threshold.window_size)?;
        let controller = AdaptiveThresholdController::with_history(config.threshold.clone(), history);
        let baseline_files = ctx.ledger.baseline_files()?;
        let tracker = SymbolTracker::from_files(&baseline_files);
        let baseline = tracker.snapshot();
        tracing::debug!(
            records = controller.history().len(),
            baseline_files = baseline_files.len(),
            baseline_symbols = baseline.len(),
            "engine state loaded"
        );
        Ok(Self {
            config,
            ctx,
            tracker,
            baseline,
            controller,
        })
    }

    pub fn tracker(&self) -> &SymbolTracker {
        &self.tracker
    }

    pub fn controller(&self) -> &AdaptiveThresholdController {
        &self.controller
    }

    pub fn run_cycle(&mut self, cancel: &CancellationToken) -> SyncResult<CycleReport> {
        let started = Instant::now();
        let detected = detect_file_changes(self.ctx.vcs, self.ctx.ledger)?;
        tracing::info!(
            revision = %detected.revision,
            changes = detected.changes.len(),
            "sync cycle started"
        );

        let mut report = CycleReport::empty(detected.revision.clone());
        report.warnings = detected.warnings;
        if detected.changes.is_empty() {
            self.ctx.ledger.set_last_revision(&detected.revision)?;
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!("nothing changed");
            return Ok(report);
        }
        let changes = detected.changes;

        let previous = Arc::clone(&self.baseline);
        let files = self.ctx.parser.parsed_files()?;
        report.build = self.tracker.build_from_files(&files);
        report.warnings.extend(report.build.warnings.iter().cloned());
        let current = self.tracker.snapshot();
        report.symbol_changes = current.detect_changes(&previous);

        let index = ArtifactIndex::build(&current);
        let mut known: IndexSet<String> = index.artifacts().map(str::to_string).collect();
        for id in self.ctx.store.list()? {
            if id != INDEX_ARTIFACT {
                known.insert(id);
            }
        }
        let artifact_graph = ArtifactGraph::with_defaults(known.iter().map(String::as_str));

        let impact = ImpactAnalyzer::new(&current, &index, &artifact_graph, &self.config.impact)
            .with_previous(&previous)
            .analyze_impact(&changes);
        report.warnings.extend(impact.warnings.iter().cloned());
        let risk = assess_impact(&impact);

        let project_size = match current.files().count() {
            0 => self.ctx.ledger.tracked_files()?.len(),
            n => n,
        };
        let decision = decide_strategy(
            changes.len(),
            project_size,
            &impact.breakdown,
            impact.risk.level,
            &self.controller,
            &self.config.strategy,
        );

        let (affected, update_order) = match decision.strategy {
            UpdateStrategy::Full => {
                let affected = full_regeneration_set(&current, &index, &known);
                let ids: Vec<String> = affected.iter().map(|a| a.artifact_id.clone()).collect();
                let order = artifact_graph.topological_order(&ids);
                (affected, order)
            }
            UpdateStrategy::Incremental | UpdateStrategy::Selective => {
                (impact.affected_artifacts.clone(), impact.update_order.clone())
            }
        };
        let plan = optimize_batch(&changes, &affected, &artifact_graph, &self.config.batch);

        let updater = ArtifactUpdater::new(self.ctx.store, self.ctx.generator)
            .with_ledger(self.ctx.ledger)
            .with_changes(&changes)
            .with_requests(affected.iter().map(generation_request));
        let execution = execute_optimized(&plan, &updater, &self.config.batch, cancel);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let record = ThresholdRecord {
            project_size,
            change_percentage: change_percentage(changes.len(), project_size),
            used_incremental: decision.strategy != UpdateStrategy::Full,
            success: execution.success,
            update_time_ms: elapsed_ms,
        };
        self.ctx.ledger.record_threshold(&record)?;
        self.controller.record_result(record);
        if execution.success {
            let committed = updater.commit_files()?;
            self.ctx.ledger.set_baseline_files(&files)?;
            self.ctx.ledger.set_last_revision(&detected.revision)?;
            self.baseline = current;
            tracing::debug!(files = committed, "baseline advanced");
        } else {
            tracing::warn!(
                failed = execution.failed_operations,
                skipped = execution.skipped_operations,
                "cycle incomplete; changes stay pending for the next cycle"
            );
        }

        report.conflicts = updater.conflicts();
        self.ctx.ledger.record_run(&SyncRun {
            revision: Some(detected.revision.clone()),
            strategy: decision.strategy.as_str().to_string(),
            changed_files: changes.len(),
            completed_operations: execution.completed_operations,
            failed_operations: execution.failed_operations,
            conflicts: report.conflicts.len(),
            success: execution.success,
            elapsed_ms,
        })?;

        tracing::info!(
            strategy = decision.strategy.as_str(),
            risk = risk.overall_risk.as_str(),
            completed = execution.completed_operations,
            failed = execution.failed_operations,
            conflicts = report.conflicts.len(),
            elapsed_ms,
            "sync cycle finished"
        );

        report.update_plans = prioritize_artifacts(&affected, &update_order);
        report.changes = changes;
        report.impact = Some(impact);
        report.risk = Some(risk);
        report.strategy = Some(decision);
        report.plan = plan;
        report.execution = Some(execution);
        report.elapsed_ms = elapsed_ms;
        Ok(report)
    }
}

/// Every known artifact, with the files that feed it.
fn full_regeneration_set(
    graph: &SymbolGraph,
    index: &ArtifactIndex,
    known: &IndexSet<String>,
) -> Vec<AffectedArtifact> {
    let mut sources: IndexMap<&str, Vec<String>> =
        known.iter().map(|id| (id.as_str(), Vec::new())).collect();
    for path in graph.files() {
        for artifact in index.artifacts_for_file(path) {
            if let Some(files) = sources.get_mut(artifact.as_str()) {
                files.push(path.to_string());
            }
        }
    }
    sources
        .into_iter()
        .map(|(id, source_files)| AffectedArtifact {
            artifact_id: id.to_string(),
            priority: UpdatePriority::Normal,
            estimated_changes: source_files.len(),
            source_files,
            contributing: Vec::new(),
        })
        .collect()
}

fn generation_request(artifact: &AffectedArtifact) -> GenerationRequest {
    let mut symbols: Vec<String> = Vec::new();
    for node in &artifact.contributing {
        if let Some(sid) = node.strip_prefix("symbol:") {
            if !symbols.iter().any(|s| s == sid) {
                symbols.push(sid.to_string());
            }
        }
    }
    GenerationRequest {
        artifact_id: artifact.artifact_id.clone(),
        changed_files: artifact.source_files.clone(),
        symbols,
        previous: None,
    }
}
