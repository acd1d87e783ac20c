//! Tiered update plans per affected artifact.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{AffectedArtifact, UpdatePriority};
use crate::query::change_impact::ImpactResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub artifact_id: String,
    pub priority: UpdatePriority,
    pub estimated_changes: usize,
    pub source_files: Vec<String>,
    pub reason: String,
}

fn reason(artifact: &AffectedArtifact) -> String {
    let files = artifact.source_files.len();
    format!(
        "{} update: {} affected symbol(s) across {} file(s)",
        artifact.priority.as_str(),
        artifact.estimated_changes,
        files
    )
}

/// One plan per affected artifact, critical tier first. Within a tier,
/// artifacts follow the dependency-aware update order. No artifact appears
/// twice.
pub fn prioritize_updates(impact: &ImpactResult) -> Vec<UpdatePlan> {
    prioritize_artifacts(&impact.affected_artifacts, &impact.update_order)
}

/// Tiered plans for an explicit artifact set, ordered within each tier by
/// `update_order`.
pub fn prioritize_artifacts(
    affected: &[AffectedArtifact],
    update_order: &[String],
) -> Vec<UpdatePlan> {
    let position: HashMap<&str, usize> = update_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut plans = Vec::with_capacity(affected.len());
    for tier in UpdatePriority::TIERS {
        let mut bucket: Vec<&AffectedArtifact> = affected
            .iter()
            .filter(|a| a.priority == tier)
            .collect();
        bucket.sort_by(|a, b| {
            let pa = position.get(a.artifact_id.as_str()).unwrap_or(&usize::MAX);
            let pb = position.get(b.artifact_id.as_str()).unwrap_or(&usize::MAX);
            pa.cmp(pb).then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        for artifact in bucket {
            if !scheduled.insert(artifact.artifact_id.as_str()) {
                continue;
            }
            plans.push(UpdatePlan {
                artifact_id: artifact.artifact_id.clone(),
                priority: artifact.priority,
                estimated_changes: artifact.estimated_changes,
                source_files: artifact.source_files.clone(),
                reason: reason(artifact),
            });
        }
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeBreakdown, RiskLevel};
    use crate::query::change_impact::LocalRisk;

    fn artifact(id: &str, priority: UpdatePriority) -> AffectedArtifact {
        AffectedArtifact {
            artifact_id: id.into(),
            priority,
            estimated_changes: 2,
            source_files: vec!["a.ts".into()],
            contributing: vec![],
        }
    }

    fn impact(artifacts: Vec<AffectedArtifact>, order: &[&str]) -> ImpactResult {
        ImpactResult {
            direct: vec![],
            indirect: vec![],
            affected_artifacts: artifacts,
            update_order: order.iter().map(|s| s.to_string()).collect(),
            estimated_effort: 0,
            risk: LocalRisk {
                level: RiskLevel::Low,
                breaking: false,
                reasons: vec![],
                recommendations: vec![],
            },
            breakdown: ChangeBreakdown::default(),
            warnings: vec![],
        }
    }

    #[test]
    fn tiers_then_update_order() {
        let result = impact(
            vec![
                artifact("low-page", UpdatePriority::Low),
                artifact("module-a", UpdatePriority::Critical),
                artifact("api-reference", UpdatePriority::Critical),
                artifact("guide", UpdatePriority::Normal),
            ],
            &["api-reference", "module-a", "guide", "low-page"],
        );
        let ids: Vec<String> = prioritize_updates(&result)
            .into_iter()
            .map(|p| p.artifact_id)
            .collect();
        assert_eq!(ids, vec!["api-reference", "module-a", "guide", "low-page"]);
    }

    #[test]
    fn duplicates_are_scheduled_once() {
        let result = impact(
            vec![
                artifact("module-a", UpdatePriority::High),
                artifact("module-a", UpdatePriority::High),
                artifact("module-a", UpdatePriority::Low),
            ],
            &["module-a"],
        );
        let plans = prioritize_updates(&result);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].priority, UpdatePriority::High);
        assert!(plans[0].reason.starts_with("high update"));
    }
}
