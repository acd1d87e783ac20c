//! Change impact propagation with graph-aware dependents.
//!
//! File changes seed direct impacts (one per file, one per symbol declared in
//! it). Reverse dependency edges are then followed breadth first, decaying
//! the impact level one step per hop, and every symbol impact is mapped to
//! the artifacts that document it.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::ImpactConfig;
use crate::indexer::symbols::SymbolGraph;
use crate::models::{
    AffectedArtifact, ChangeBreakdown, ChangeInfo, ChangeType, ImpactCategory, ImpactLevel,
    ImpactNode, NodeKind, RiskLevel, SymbolSnapshot, UpdatePriority,
};
use crate::query::artifacts::{module_artifact_id, ArtifactGraph, ArtifactIndex, API_REFERENCE};
use crate::query::guards::{clamp_depth, MAX_GRAPH_VISITED, MAX_IMPACT_DEPTH};

const DIRECT_WEIGHT: u64 = 100;
const INDIRECT_WEIGHT: u64 = 50;
const ARTIFACT_CHANGE_WEIGHT: u64 = 30;

pub const PREFER_FULL_REGENERATION: &str = "prefer full regeneration over incremental";

pub fn file_node_id(path: &str) -> String {
    format!("file:{path}")
}

pub fn symbol_node_id(symbol_id: &str) -> String {
    format!("symbol:{symbol_id}")
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Quick risk verdict computed alongside the impact sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRisk {
    pub level: RiskLevel,
    /// Any deletion in the change set.
    pub breaking: bool,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub direct: Vec<ImpactNode>,
    pub indirect: Vec<ImpactNode>,
    /// Sorted by priority, most urgent first, then by id.
    pub affected_artifacts: Vec<AffectedArtifact>,
    /// Artifact ids, dependencies first.
    pub update_order: Vec<String>,
    pub estimated_effort: u64,
    pub risk: LocalRisk,
    pub breakdown: ChangeBreakdown,
    /// Change records skipped as malformed.
    pub warnings: Vec<String>,
}

impl ImpactResult {
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ImpactNode> {
        self.direct.iter().chain(self.indirect.iter())
    }
}

/// Relative sizing signal, not a cost model.
pub fn estimate_effort(direct: usize, indirect: usize, artifacts: &[AffectedArtifact]) -> u64 {
    let changes: usize = artifacts.iter().map(|a| a.estimated_changes).sum();
    DIRECT_WEIGHT * direct as u64
        + INDIRECT_WEIGHT * indirect as u64
        + ARTIFACT_CHANGE_WEIGHT * changes as u64
}

/// Local risk heuristic over the impact sets.
pub fn assess_local_risk(direct: &[ImpactNode], indirect: &[ImpactNode]) -> LocalRisk {
    let breaking = direct.iter().any(|n| n.change_type == ChangeType::Deleted);
    let high_direct = direct
        .iter()
        .filter(|n| n.impact_level == ImpactLevel::High)
        .count();
    let mut reasons = Vec::new();
    if breaking {
        reasons.push("change set deletes files or symbols".to_string());
    }

    let level = if high_direct > 10 || indirect.len() > 50 {
        RiskLevel::High
    } else if high_direct > 3 || indirect.len() > 10 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    if level != RiskLevel::Low {
        reasons.push(format!(
            "{high_direct} high-impact direct changes, {} indirect impacts",
            indirect.len()
        ));
    }

    let mut recommendations = Vec::new();
    if level == RiskLevel::High {
        recommendations.push(PREFER_FULL_REGENERATION.to_string());
    }
    if breaking {
        recommendations.push("review artifacts documenting removed code".to_string());
    }
    LocalRisk {
        level,
        breaking,
        reasons,
        recommendations,
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Propagates file changes through a symbol graph.
///
/// `previous` is the snapshot taken before the changes; symbols of deleted
/// files are looked up there, since the current graph no longer has them.
pub struct ImpactAnalyzer<'a> {
    graph: &'a SymbolGraph,
    previous: Option<&'a SymbolGraph>,
    index: &'a ArtifactIndex,
    artifacts: &'a ArtifactGraph,
    max_depth: usize,
}

struct RemovedSymbol<'g> {
    graph: &'g SymbolGraph,
    snapshot: &'g SymbolSnapshot,
}

struct ArtifactAccumulator {
    priority: UpdatePriority,
    symbols: HashSet<String>,
    source_files: Vec<String>,
    contributing: Vec<String>,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(
        graph: &'a SymbolGraph,
        index: &'a ArtifactIndex,
        artifacts: &'a ArtifactGraph,
        config: &ImpactConfig,
    ) -> Self {
        Self {
            graph,
            previous: None,
            index,
            artifacts,
            max_depth: clamp_depth(config.max_impact_depth as i64, MAX_IMPACT_DEPTH) as usize,
        }
    }

    pub fn with_previous(mut self, previous: &'a SymbolGraph) -> Self {
        self.previous = Some(previous);
        self
    }

    fn graph_for(&self, change: ChangeType) -> &'a SymbolGraph {
        match (change, self.previous) {
            (ChangeType::Deleted, Some(previous)) => previous,
            _ => self.graph,
        }
    }

    fn lookup(&self, symbol_id: &str) -> Option<&'a SymbolSnapshot> {
        self.graph
            .get(symbol_id)
            .or_else(|| self.previous.and_then(|p| p.get(symbol_id)))
    }

    fn symbol_level(graph: &SymbolGraph, snapshot: &SymbolSnapshot, change: ChangeType) -> ImpactLevel {
        if change != ChangeType::Deleted {
            return SymbolGraph::impact_for_presence(snapshot);
        }
        let dependents = graph.dependents_of(&snapshot.id()).len();
        if dependents > 5 {
            ImpactLevel::High
        } else if dependents > 0 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }

    /// Symbols a surviving file (or a renamed file's old path) declared in
    /// the previous snapshot and no longer does. Their dependents are only
    /// reachable through the previous graph.
    fn removed_symbols(&self, change: &ChangeInfo) -> Vec<RemovedSymbol<'a>> {
        let Some(previous) = self.previous else {
            return Vec::new();
        };
        if change.change_type == ChangeType::Deleted {
            return Vec::new();
        }
        let path = change.file_path.trim();
        std::iter::once(path)
            .chain(change.old_path.as_deref().map(str::trim))
            .flat_map(|p| previous.symbols_in_file(p))
            .filter(|snapshot| self.graph.get(&snapshot.id()).is_none())
            .map(|snapshot| RemovedSymbol {
                graph: previous,
                snapshot,
            })
            .collect()
    }

    pub fn analyze_impact(&self, changes: &[ChangeInfo]) -> ImpactResult {
        let mut warnings = Vec::new();
        let mut accepted: IndexMap<&str, &ChangeInfo> = IndexMap::new();
        for change in changes {
            let path = change.file_path.trim();
            if path.is_empty() {
                tracing::warn!("skipping change record with empty path");
                warnings.push("change record with empty path".to_string());
                continue;
            }
            if accepted.contains_key(path) {
                tracing::warn!(path, "skipping duplicate change record");
                warnings.push(format!("duplicate change record for {path}"));
                continue;
            }
            accepted.insert(path, change);
        }
        let accepted: Vec<&ChangeInfo> = accepted.into_values().collect();

        // Direct impacts: one node per file plus one per declared symbol.
        let mut direct: Vec<ImpactNode> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut roots: Vec<(usize, ChangeType)> = Vec::new();
        for change in &accepted {
            let path = change.file_path.trim();
            let graph = self.graph_for(change.change_type);
            let category = ImpactCategory::from_path(path);
            let file_index = direct.len();
            direct.push(ImpactNode {
                id: file_node_id(path),
                kind: NodeKind::File,
                impact_level: ImpactLevel::Low,
                change_type: change.change_type,
                affected_by: Vec::new(),
                depth: 0,
                file_path: path.to_string(),
                category,
                symbol_id: None,
            });
            claimed.insert(file_node_id(path));

            let mut file_level = ImpactLevel::Low;
            for snapshot in graph.symbols_in_file(path) {
                let level = Self::symbol_level(graph, snapshot, change.change_type);
                file_level = file_level.max(level);
                let sid = snapshot.id();
                let node_id = symbol_node_id(&sid);
                if !claimed.insert(node_id.clone()) {
                    continue;
                }
                roots.push((direct.len(), change.change_type));
                direct.push(ImpactNode {
                    id: node_id,
                    kind: NodeKind::Symbol,
                    impact_level: level,
                    change_type: change.change_type,
                    affected_by: Vec::new(),
                    depth: 0,
                    file_path: path.to_string(),
                    category,
                    symbol_id: Some(sid),
                });
            }
            for removed in self.removed_symbols(change) {
                let level = Self::symbol_level(removed.graph, removed.snapshot, ChangeType::Deleted);
                file_level = file_level.max(level);
                let sid = removed.snapshot.id();
                let node_id = symbol_node_id(&sid);
                if !claimed.insert(node_id.clone()) {
                    continue;
                }
                let old_path = removed.snapshot.file_path.clone();
                roots.push((direct.len(), ChangeType::Deleted));
                direct.push(ImpactNode {
                    id: node_id,
                    kind: NodeKind::Symbol,
                    impact_level: level,
                    change_type: ChangeType::Deleted,
                    affected_by: Vec::new(),
                    depth: 0,
                    category: ImpactCategory::from_path(&old_path),
                    file_path: old_path,
                    symbol_id: Some(sid),
                });
            }
            direct[file_index].impact_level = file_level;
        }

        // Indirect impacts, strongest roots first so that a node
        // reached from several roots keeps its highest level.
        roots.sort_by(|a, b| {
            direct[b.0]
                .impact_level
                .cmp(&direct[a.0].impact_level)
                .then(a.0.cmp(&b.0))
        });
        let mut indirect: Vec<ImpactNode> = Vec::new();
        for (root_index, change_type) in roots {
            let root = &direct[root_index];
            let Some(root_symbol) = root.symbol_id.clone() else {
                continue;
            };
            let graph = self.graph_for(change_type);
            self.propagate(
                graph,
                &root_symbol,
                root.impact_level,
                change_type,
                &mut claimed,
                &mut indirect,
            );
        }

        // Artifact aggregation.
        let affected_artifacts = self.aggregate_artifacts(&direct, &indirect);

        // Dependencies-first update order.
        let prioritized: Vec<String> = affected_artifacts
            .iter()
            .map(|a| a.artifact_id.clone())
            .collect();
        let update_order = self.artifacts.topological_order(&prioritized);

        let estimated_effort = estimate_effort(direct.len(), indirect.len(), &affected_artifacts);
        let risk = assess_local_risk(&direct, &indirect);
        let owned: Vec<ChangeInfo> = accepted.iter().map(|c| (*c).clone()).collect();
        let breakdown = ChangeBreakdown::from_changes(&owned);

        tracing::debug!(
            changes = accepted.len(),
            direct = direct.len(),
            indirect = indirect.len(),
            artifacts = affected_artifacts.len(),
            effort = estimated_effort,
            risk = risk.level.as_str(),
            "impact analysed"
        );

        ImpactResult {
            direct,
            indirect,
            affected_artifacts,
            update_order,
            estimated_effort,
            risk,
            breakdown,
            warnings,
        }
    }

    /// Breadth-first walk over reverse edges from one root. Nodes already
    /// claimed by an earlier root are neither re-added nor expanded, so every
    /// emitted node is exactly one decay step below the node it came from.
    fn propagate(
        &self,
        graph: &SymbolGraph,
        root_symbol: &str,
        root_level: ImpactLevel,
        change_type: ChangeType,
        claimed: &mut HashSet<String>,
        indirect: &mut Vec<ImpactNode>,
    ) {
        let mut queue: VecDeque<(String, ImpactLevel, usize)> = VecDeque::new();
        queue.push_back((root_symbol.to_string(), root_level, 0));

        while let Some((current, level, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }
            let next_level = level.decay();
            for dependent in graph.dependents_of(&current) {
                if claimed.len() >= MAX_GRAPH_VISITED {
                    tracing::warn!(root = root_symbol, "impact propagation hit the visit cap");
                    return;
                }
                let Some(snapshot) = graph.get(dependent) else {
                    continue;
                };
                let node_id = symbol_node_id(dependent);
                if !claimed.insert(node_id.clone()) {
                    continue;
                }
                let file_path = snapshot.file_path.clone();
                indirect.push(ImpactNode {
                    id: node_id,
                    kind: NodeKind::Symbol,
                    impact_level: next_level,
                    change_type,
                    affected_by: vec![symbol_node_id(&current)],
                    depth: depth + 1,
                    category: ImpactCategory::from_path(&file_path),
                    file_path,
                    symbol_id: Some(dependent.clone()),
                });
                queue.push_back((dependent.clone(), next_level, depth + 1));
            }
        }
    }

    fn artifacts_for_node(&self, node: &ImpactNode) -> Vec<String> {
        match (&node.kind, &node.symbol_id) {
            (NodeKind::Symbol, Some(sid)) => {
                let known = self.index.artifacts_for_symbol(sid);
                if !known.is_empty() {
                    return known.to_vec();
                }
                let mut ids = vec![module_artifact_id(&node.file_path)];
                if self.lookup(sid).is_some_and(|s| s.exported) {
                    ids.push(API_REFERENCE.to_string());
                }
                ids
            }
            _ => self.index.artifacts_for_file(&node.file_path),
        }
    }

    fn aggregate_artifacts(
        &self,
        direct: &[ImpactNode],
        indirect: &[ImpactNode],
    ) -> Vec<AffectedArtifact> {
        let mut acc: HashMap<String, ArtifactAccumulator> = HashMap::new();
        let tagged = direct
            .iter()
            .map(|n| (n, true))
            .chain(indirect.iter().map(|n| (n, false)));
        for (node, is_direct) in tagged {
            let priority = UpdatePriority::from_impact(node.impact_level, is_direct);
            for artifact_id in self.artifacts_for_node(node) {
                let entry = acc.entry(artifact_id).or_insert_with(|| ArtifactAccumulator {
                    priority,
                    symbols: HashSet::new(),
                    source_files: Vec::new(),
                    contributing: Vec::new(),
                });
                entry.priority = entry.priority.min(priority);
                if let Some(sid) = &node.symbol_id {
                    entry.symbols.insert(sid.clone());
                }
                if !entry.source_files.contains(&node.file_path) {
                    entry.source_files.push(node.file_path.clone());
                }
                entry.contributing.push(node.id.clone());
            }
        }

        let mut artifacts: Vec<AffectedArtifact> = acc
            .into_iter()
            .map(|(artifact_id, a)| AffectedArtifact {
                artifact_id,
                priority: a.priority,
                estimated_changes: a.symbols.len(),
                source_files: a.source_files,
                contributing: a.contributing,
            })
            .collect();
        artifacts.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        artifacts
    }
}
