//! Batch planning.
//!
//! One operation per changed file, one per affected artifact and a trailing
//! index update. In artifact-graph mode operations are levelled by their
//! dependencies (file → artifact in artifact order → index) and batches never
//! span levels, so batches on one level can run side by side. Linear mode
//! sorts everything by priority and chains the batches.

use std::collections::{HashMap, HashSet};

use crate::config::{BatchConfig, DependencyMode};
use crate::models::{
    AffectedArtifact, BatchPlan, ChangeInfo, ChangeType, OperationKind, UpdateBatch,
    UpdateOperation,
};
use crate::query::artifacts::{ArtifactGraph, INDEX_ARTIFACT};
use crate::query::guards::clamp_batch_size;

pub const INDEX_OPERATION_ID: &str = "update-index";
pub const INDEX_PRIORITY: u32 = 10;

const FILE_OPERATION_MS: u64 = 50;
const ARTIFACT_OPERATION_MS: u64 = 200;
const ARTIFACT_CHANGE_MS: u64 = 50;
const INDEX_OPERATION_MS: u64 = 100;

pub fn file_operation_id(change: &ChangeInfo) -> String {
    match change.change_type {
        ChangeType::Deleted => format!("remove-file:{}", change.file_path),
        _ => format!("sync-file:{}", change.file_path),
    }
}

pub fn artifact_operation_id(artifact_id: &str) -> String {
    format!("update-artifact:{artifact_id}")
}

/// Operations in dependency order: files, artifacts (dependencies first),
/// then the index update. Every `depends_on` entry names an earlier
/// operation.
pub fn build_operations(
    changes: &[ChangeInfo],
    affected: &[AffectedArtifact],
    artifacts: &ArtifactGraph,
) -> Vec<UpdateOperation> {
    let mut operations: Vec<UpdateOperation> = Vec::new();
    let mut file_ops: HashMap<&str, String> = HashMap::new();

    for change in changes {
        let path = change.file_path.trim();
        if path.is_empty() || file_ops.contains_key(path) {
            continue;
        }
        let id = file_operation_id(change);
        file_ops.insert(path, id.clone());
        operations.push(UpdateOperation {
            id,
            kind: if change.change_type == ChangeType::Deleted {
                OperationKind::RemoveFile
            } else {
                OperationKind::SyncFile
            },
            target: path.to_string(),
            priority: change.change_type.operation_priority(),
            retry_count: 0,
            estimated_ms: FILE_OPERATION_MS,
            depends_on: Vec::new(),
        });
    }

    let by_id: HashMap<&str, &AffectedArtifact> = affected
        .iter()
        .map(|a| (a.artifact_id.as_str(), a))
        .collect();
    let ids: Vec<String> = affected.iter().map(|a| a.artifact_id.clone()).collect();
    let mut emitted: HashSet<&str> = HashSet::new();
    let mut artifact_ops: Vec<String> = Vec::new();

    for artifact_id in artifacts.topological_order(&ids) {
        let Some(artifact) = by_id.get(artifact_id.as_str()) else {
            continue;
        };
        let mut depends_on: Vec<String> = artifact
            .source_files
            .iter()
            .filter_map(|f| file_ops.get(f.as_str()).cloned())
            .collect();
        for dep in artifacts.dependencies_of(&artifact_id) {
            if emitted.contains(dep.as_str()) {
                depends_on.push(artifact_operation_id(dep));
            }
        }
        emitted.insert(artifact.artifact_id.as_str());
        let id = artifact_operation_id(&artifact_id);
        artifact_ops.push(id.clone());
        operations.push(UpdateOperation {
            id,
            kind: OperationKind::UpdateArtifact,
            target: artifact_id,
            priority: artifact.priority.rank(),
            retry_count: 0,
            estimated_ms: ARTIFACT_OPERATION_MS
                + ARTIFACT_CHANGE_MS * artifact.estimated_changes as u64,
            depends_on,
        });
    }

    if !operations.is_empty() {
        let depends_on = if artifact_ops.is_empty() {
            operations.iter().map(|o| o.id.clone()).collect()
        } else {
            artifact_ops
        };
        operations.push(UpdateOperation {
            id: INDEX_OPERATION_ID.to_string(),
            kind: OperationKind::UpdateIndex,
            target: INDEX_ARTIFACT.to_string(),
            priority: INDEX_PRIORITY,
            retry_count: 0,
            estimated_ms: INDEX_OPERATION_MS,
            depends_on,
        });
    }
    operations
}

/// Longest chain in the batch dependency DAG. Dependencies on unknown
/// batches are ignored.
pub fn longest_chain(batches: &[UpdateBatch]) -> usize {
    let index: HashMap<&str, usize> = batches
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();
    let mut depth: Vec<Option<usize>> = vec![None; batches.len()];
    let mut longest = 0;

    for start in 0..batches.len() {
        // Iterative post-order; `on_stack` cuts any cycle.
        let mut stack: Vec<(usize, bool)> = vec![(start, false)];
        let mut on_stack: HashSet<usize> = HashSet::new();
        while let Some((i, expanded)) = stack.pop() {
            if depth[i].is_some() {
                continue;
            }
            let deps: Vec<usize> = batches[i]
                .dependencies
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .collect();
            if expanded {
                on_stack.remove(&i);
                let d = deps.iter().filter_map(|&j| depth[j]).max().unwrap_or(0) + 1;
                depth[i] = Some(d);
                longest = longest.max(d);
                continue;
            }
            on_stack.insert(i);
            stack.push((i, true));
            for j in deps {
                if depth[j].is_none() && !on_stack.contains(&j) {
                    stack.push((j, false));
                }
            }
        }
    }
    longest
}

fn make_batch(id: usize, level: usize, operations: Vec<UpdateOperation>) -> UpdateBatch {
    let estimated_time_ms = operations.iter().map(|o| o.estimated_ms).sum();
    UpdateBatch {
        id: format!("batch-{id}"),
        operations,
        dependencies: Vec::new(),
        estimated_time_ms,
        level,
    }
}

fn sort_by_priority(operations: &mut [UpdateOperation]) {
    operations.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
}

fn linear_batches(mut operations: Vec<UpdateOperation>, batch_size: usize) -> Vec<UpdateBatch> {
    sort_by_priority(&mut operations);
    let mut batches: Vec<UpdateBatch> = Vec::new();
    let mut rest = operations.into_iter().peekable();
    while rest.peek().is_some() {
        let chunk: Vec<UpdateOperation> = rest.by_ref().take(batch_size).collect();
        let n = batches.len();
        let mut batch = make_batch(n, n, chunk);
        if n > 0 {
            batch.dependencies.push(format!("batch-{}", n - 1));
        }
        batches.push(batch);
    }
    batches
}

fn levelled_batches(operations: Vec<UpdateOperation>, batch_size: usize) -> Vec<UpdateBatch> {
    let mut level_of: HashMap<String, usize> = HashMap::with_capacity(operations.len());
    let mut levels: Vec<Vec<UpdateOperation>> = Vec::new();
    for op in operations {
        let level = op
            .depends_on
            .iter()
            .filter_map(|d| level_of.get(d))
            .map(|l| l + 1)
            .max()
            .unwrap_or(0);
        level_of.insert(op.id.clone(), level);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(op);
    }

    let mut batches: Vec<UpdateBatch> = Vec::new();
    let mut batch_of: HashMap<String, usize> = HashMap::new();
    for (level, mut ops) in levels.into_iter().enumerate() {
        sort_by_priority(&mut ops);
        let mut rest = ops.into_iter().peekable();
        while rest.peek().is_some() {
            let chunk: Vec<UpdateOperation> = rest.by_ref().take(batch_size).collect();
            let n = batches.len();
            let mut deps: Vec<usize> = chunk
                .iter()
                .flat_map(|o| o.depends_on.iter())
                .filter_map(|d| batch_of.get(d).copied())
                .collect();
            deps.sort_unstable();
            deps.dedup();
            for op in &chunk {
                batch_of.insert(op.id.clone(), n);
            }
            let mut batch = make_batch(n, level, chunk);
            batch.dependencies = deps.into_iter().map(|d| format!("batch-{d}")).collect();
            batches.push(batch);
        }
    }
    batches
}

/// Plan batches for a change set and the artifacts it affects.
pub fn optimize_batch(
    changes: &[ChangeInfo],
    affected: &[AffectedArtifact],
    artifacts: &ArtifactGraph,
    config: &BatchConfig,
) -> BatchPlan {
    let operations = build_operations(changes, affected, artifacts);
    let total_operations = operations.len();
    let batch_size = clamp_batch_size(config.batch_size as i64);

    let batches = match config.dependency_mode {
        DependencyMode::Linear => linear_batches(operations, batch_size),
        DependencyMode::ArtifactGraph => levelled_batches(operations, batch_size),
    };
    let plan = BatchPlan {
        parallel_groups: longest_chain(&batches),
        estimated_time_ms: batches.iter().map(|b| b.estimated_time_ms).sum(),
        total_operations,
        batches,
    };
    tracing::debug!(
        operations = plan.total_operations,
        batches = plan.batches.len(),
        parallel_groups = plan.parallel_groups,
        mode = ?config.dependency_mode,
        "batch plan built"
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UpdatePriority;

    fn artifact(id: &str, priority: UpdatePriority, files: &[&str]) -> AffectedArtifact {
        AffectedArtifact {
            artifact_id: id.into(),
            priority,
            estimated_changes: 1,
            source_files: files.iter().map(|f| f.to_string()).collect(),
            contributing: vec![],
        }
    }

    fn config(mode: DependencyMode, batch_size: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            dependency_mode: mode,
            ..BatchConfig::default()
        }
    }

    fn sample() -> (Vec<ChangeInfo>, Vec<AffectedArtifact>, ArtifactGraph) {
        let changes = vec![
            ChangeInfo::new("src/new.ts", ChangeType::Added),
            ChangeInfo::new("src/a.ts", ChangeType::Modified),
            ChangeInfo::new("lib/old.ts", ChangeType::Deleted),
        ];
        let affected = vec![
            artifact("api-reference", UpdatePriority::Critical, &["src/a.ts"]),
            artifact("module-src", UpdatePriority::Critical, &["src/a.ts", "src/new.ts"]),
            artifact("module-lib", UpdatePriority::Normal, &["lib/old.ts"]),
        ];
        let graph = ArtifactGraph::with_defaults(["module-src", "module-lib"]);
        (changes, affected, graph)
    }

    #[test]
    fn operations_carry_priorities() {
        let (changes, affected, graph) = sample();
        let ops = build_operations(&changes, &affected, &graph);
        let priorities: HashMap<&str, u32> =
            ops.iter().map(|o| (o.id.as_str(), o.priority)).collect();
        assert_eq!(priorities["remove-file:lib/old.ts"], 1);
        assert_eq!(priorities["sync-file:src/a.ts"], 2);
        assert_eq!(priorities["sync-file:src/new.ts"], 4);
        assert_eq!(priorities["update-artifact:module-src"], 1);
        assert_eq!(priorities["update-artifact:module-lib"], 3);
        assert_eq!(priorities[INDEX_OPERATION_ID], 10);
        assert_eq!(ops.last().map(|o| o.id.as_str()), Some(INDEX_OPERATION_ID));

        let module_src = ops
            .iter()
            .find(|o| o.id == "update-artifact:module-src")
            .unwrap();
        assert!(module_src
            .depends_on
            .contains(&"update-artifact:api-reference".to_string()));
        assert!(module_src.depends_on.contains(&"sync-file:src/a.ts".to_string()));
    }

    #[test]
    fn linear_mode_chains_batches() {
        let (changes, affected, graph) = sample();
        let plan = optimize_batch(&changes, &affected, &graph, &config(DependencyMode::Linear, 2));
        assert_eq!(plan.total_operations, 7);
        assert_eq!(plan.batches.len(), 4);
        assert_eq!(plan.parallel_groups, 4);
        assert_eq!(plan.batches[1].dependencies, vec!["batch-0".to_string()]);
        let first: Vec<u32> = plan.batches[0].operations.iter().map(|o| o.priority).collect();
        assert_eq!(first, vec![1, 1]);
    }

    #[test]
    fn graph_mode_levels_batches() {
        let (changes, affected, graph) = sample();
        let plan = optimize_batch(
            &changes,
            &affected,
            &graph,
            &config(DependencyMode::ArtifactGraph, 10),
        );
        let levels: Vec<usize> = plan.batches.iter().map(|b| b.operations.len()).collect();
        assert_eq!(levels, vec![3, 1, 2, 1]);
        // files | api-reference | module pages | index
        assert_eq!(plan.batches.len(), 4);
        assert_eq!(plan.parallel_groups, 4);
        for batch in &plan.batches {
            for dep in &batch.dependencies {
                let dep_level = plan.batches.iter().find(|b| &b.id == dep).unwrap().level;
                assert!(dep_level < batch.level);
            }
        }
    }

    #[test]
    fn independent_artifacts_share_a_level() {
        let changes = vec![
            ChangeInfo::new("a/x.ts", ChangeType::Modified),
            ChangeInfo::new("b/y.ts", ChangeType::Modified),
        ];
        let affected = vec![
            artifact("guide-a", UpdatePriority::High, &["a/x.ts"]),
            artifact("guide-b", UpdatePriority::High, &["b/y.ts"]),
        ];
        let plan = optimize_batch(
            &changes,
            &affected,
            &ArtifactGraph::new(),
            &config(DependencyMode::ArtifactGraph, 1),
        );
        let level_one: Vec<&UpdateBatch> = plan.batches.iter().filter(|b| b.level == 1).collect();
        assert_eq!(level_one.len(), 2);
        assert_eq!(plan.parallel_groups, 3);
    }

    #[test]
    fn plan_accounts_for_every_operation() {
        let (changes, affected, graph) = sample();
        for mode in [DependencyMode::Linear, DependencyMode::ArtifactGraph] {
            for size in [1, 2, 3, 50] {
                let plan = optimize_batch(&changes, &affected, &graph, &config(mode, size));
                let counted: usize = plan.batches.iter().map(|b| b.operations.len()).sum();
                assert_eq!(counted, plan.total_operations);
                assert!(plan.batches.iter().all(|b| b.operations.len() <= size));
            }
        }
    }

    #[test]
    fn empty_change_set_has_no_batches() {
        let plan = optimize_batch(&[], &[], &ArtifactGraph::new(), &BatchConfig::default());
        assert_eq!(plan.total_operations, 0);
        assert!(plan.batches.is_empty());
        assert_eq!(plan.parallel_groups, 0);
    }
}
