//! Risk assessment over impact sets.
//!
//! Factors come from a fixed, ordered rule list. The overall score is the
//! confidence-weighted mean of factor severities, so a pile of weak factors
//! cannot outweigh one confident severe factor.

use crate::models::{
    ChangeType, ImpactCategory, ImpactLevel, ImpactNode, RiskAssessment, RiskFactor,
    RiskFactorType, RiskLevel, RiskSeverity, Timeframe,
};
use crate::query::change_impact::ImpactResult;

const CRITICAL_SCORE: f64 = 2.5;
const HIGH_SCORE: f64 = 1.8;
const MEDIUM_SCORE: f64 = 1.2;

/// More high-impact items than this across both sets is a breaking change.
const HIGH_IMPACT_ITEMS: usize = 2;
/// More indirect impacts than this is flagged as wide propagation.
const WIDE_PROPAGATION: usize = 25;

/// Evaluate the rule list. Output order follows rule order.
pub fn identify_risk_factors(
    direct: &[ImpactNode],
    indirect: &[ImpactNode],
    change_type: ChangeType,
) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    let all = || direct.iter().chain(indirect.iter());

    if change_type == ChangeType::Deleted {
        factors.push(RiskFactor::new(
            RiskFactorType::BreakingChange,
            RiskSeverity::High,
            0.9,
            "File removal may break code and documents that reference it",
            "Search for remaining references and update or remove them",
        ));
    }

    let high_items = all()
        .filter(|n| n.impact_level == ImpactLevel::High)
        .count();
    if high_items > HIGH_IMPACT_ITEMS {
        factors.push(RiskFactor::new(
            RiskFactorType::BreakingChange,
            RiskSeverity::High,
            0.8,
            format!("{high_items} high-impact items affected"),
            "Review each high-impact item before publishing regenerated artifacts",
        ));
    }

    if all().any(|n| n.category == ImpactCategory::Test) {
        factors.push(RiskFactor::new(
            RiskFactorType::Maintenance,
            RiskSeverity::Medium,
            0.7,
            "Tests are affected by this change",
            "Run the affected test suites and refresh testing documentation",
        ));
    }

    if all().any(|n| n.category == ImpactCategory::Document) {
        factors.push(RiskFactor::new(
            RiskFactorType::Maintenance,
            RiskSeverity::Low,
            0.6,
            "Documentation files are affected",
            "Check hand-written documents for stale references",
        ));
    }

    if change_type == ChangeType::Modified
        && direct.iter().any(|n| n.impact_level == ImpactLevel::High)
    {
        factors.push(RiskFactor::new(
            RiskFactorType::BreakingChange,
            RiskSeverity::Medium,
            0.75,
            "Modification touches high-impact code",
            "Verify public interfaces remain backward compatible",
        ));
    }

    if indirect.len() > WIDE_PROPAGATION {
        factors.push(RiskFactor::new(
            RiskFactorType::Dependency,
            RiskSeverity::Medium,
            0.65,
            format!("Change propagates to {} dependent symbols", indirect.len()),
            "Consider splitting the change into smaller steps",
        ));
    }

    factors
}

/// Confidence-weighted mean of severity scores; 0 for no (or zero-weight)
/// factors.
pub fn calculate_risk_score(factors: &[RiskFactor]) -> f64 {
    let (weighted, weight) = factors.iter().fold((0.0, 0.0), |(sum, w), f| {
        (sum + f.severity.score() * f.confidence, w + f.confidence)
    });
    if weight <= 0.0 {
        0.0
    } else {
        weighted / weight
    }
}

pub fn risk_level_for_score(score: f64) -> RiskLevel {
    if score >= CRITICAL_SCORE {
        RiskLevel::Critical
    } else if score >= HIGH_SCORE {
        RiskLevel::High
    } else if score >= MEDIUM_SCORE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn determine_timeframe(factors: &[RiskFactor], change_type: ChangeType) -> Timeframe {
    if change_type == ChangeType::Deleted
        || factors.iter().any(|f| f.severity == RiskSeverity::High)
    {
        Timeframe::Immediate
    } else if factors.iter().any(|f| f.severity == RiskSeverity::Medium) {
        Timeframe::ShortTerm
    } else {
        Timeframe::LongTerm
    }
}

/// Fixed remediation sentence per overall risk level.
pub fn mitigation_for(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => {
            "Block the release: regenerate all affected artifacts, review every conflict manually and re-run the full test suite"
        }
        RiskLevel::High => {
            "Regenerate affected artifacts and have a maintainer review the changes before publishing"
        }
        RiskLevel::Medium => "Spot-check the updated artifacts that cover changed code",
        RiskLevel::Low => "No action required beyond the normal update",
    }
}

/// Change type that characterises a whole change set: any deletion wins,
/// then any modification or rename, else addition.
pub fn dominant_change_type(result: &ImpactResult) -> ChangeType {
    let b = &result.breakdown;
    if b.deleted > 0 {
        ChangeType::Deleted
    } else if b.modified > 0 || b.renamed > 0 {
        ChangeType::Modified
    } else {
        ChangeType::Added
    }
}

pub fn assess(direct: &[ImpactNode], indirect: &[ImpactNode], change_type: ChangeType) -> RiskAssessment {
    let factors = identify_risk_factors(direct, indirect, change_type);
    let risk_score = calculate_risk_score(&factors);
    let overall_risk = risk_level_for_score(risk_score);
    let timeframe = determine_timeframe(&factors, change_type);

    let mut mitigations = vec![mitigation_for(overall_risk).to_string()];
    for factor in &factors {
        if !mitigations.contains(&factor.mitigation) {
            mitigations.push(factor.mitigation.clone());
        }
    }
    tracing::debug!(
        factors = factors.len(),
        score = risk_score,
        risk = overall_risk.as_str(),
        "risk assessed"
    );
    RiskAssessment {
        overall_risk,
        risk_score,
        timeframe,
        factors,
        mitigations,
    }
}

pub fn assess_impact(result: &ImpactResult) -> RiskAssessment {
    assess(&result.direct, &result.indirect, dominant_change_type(result))
}
