//! Python bindings (`_docsync_core`).
//!
//! Structured results cross the boundary as JSON and are decoded with
//! Python's `json.loads`, so callers receive plain dicts and lists.

use pyo3::prelude::*;
use pyo3::wrap_pyfunction;
use serde::Serialize;

use crate::config::{StrategyConfig, ThresholdConfig};
use crate::diff;
use crate::errors::SyncError;
use crate::models::{ChangeBreakdown, ChangeInfo, ImpactNode, RiskFactor, ThresholdRecord};
use crate::query::{risk, threshold};

fn to_py<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json_str = serde_json::to_string(value).map_err(SyncError::from)?;
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}

fn from_json<T: serde::de::DeserializeOwned>(text: &str) -> PyResult<T> {
    Ok(serde_json::from_str(text).map_err(SyncError::from)?)
}

#[derive(Serialize)]
struct DiffPayload<'a> {
    #[serde(flatten)]
    diff: &'a diff::TextDiff,
    unified: String,
}

/// Line diff of two texts; `None` for either side raises `ValueError`.
#[pyfunction]
#[pyo3(signature = (old, new, old_label="a", new_label="b"))]
fn diff_text(
    py: Python<'_>,
    old: Option<&str>,
    new: Option<&str>,
    old_label: &str,
    new_label: &str,
) -> PyResult<PyObject> {
    let result = diff::diff_optional(old, new)?;
    let payload = DiffPayload {
        unified: diff::render_unified(&result, old_label, new_label),
        diff: &result,
    };
    to_py(py, &payload)
}

#[pyfunction]
#[pyo3(signature = (base, ours, theirs))]
fn merge_text(
    py: Python<'_>,
    base: Option<&str>,
    ours: Option<&str>,
    theirs: Option<&str>,
) -> PyResult<PyObject> {
    let result = diff::merge_optional(base, ours, theirs)?;
    to_py(py, &result)
}

/// Confidence-weighted score of a JSON list of risk factors.
#[pyfunction]
fn risk_score(factors_json: &str) -> PyResult<f64> {
    let factors: Vec<RiskFactor> = from_json(factors_json)?;
    Ok(risk::calculate_risk_score(&factors))
}

/// Full assessment from JSON-encoded direct and indirect impact nodes.
#[pyfunction]
fn assess_risk(
    py: Python<'_>,
    direct_json: &str,
    indirect_json: &str,
    change_type: &str,
) -> PyResult<PyObject> {
    let direct: Vec<ImpactNode> = from_json(direct_json)?;
    let indirect: Vec<ImpactNode> = from_json(indirect_json)?;
    let change_type = from_json(&format!("\"{change_type}\""))?;
    to_py(py, &risk::assess(&direct, &indirect, change_type))
}

/// Adjusted threshold for a project size given a JSON list of past outcomes.
#[pyfunction]
#[pyo3(signature = (project_size, history_json=None))]
fn calculate_threshold(project_size: usize, history_json: Option<&str>) -> PyResult<f64> {
    let history: Vec<ThresholdRecord> = match history_json {
        Some(text) => from_json(text)?,
        None => Vec::new(),
    };
    let controller =
        threshold::AdaptiveThresholdController::with_history(ThresholdConfig::default(), history);
    Ok(controller.calculate_threshold(project_size))
}

#[pyfunction]
#[pyo3(signature = (project_size, changes_json, history_json=None))]
fn should_use_incremental(
    py: Python<'_>,
    project_size: usize,
    changes_json: &str,
    history_json: Option<&str>,
) -> PyResult<PyObject> {
    let changes: Vec<ChangeInfo> = from_json(changes_json)?;
    let history: Vec<ThresholdRecord> = match history_json {
        Some(text) => from_json(text)?,
        None => Vec::new(),
    };
    let controller =
        threshold::AdaptiveThresholdController::with_history(ThresholdConfig::default(), history);
    let pct = threshold::change_percentage(changes.len(), project_size);
    let decision =
        controller.should_use_incremental(project_size, pct, &ChangeBreakdown::from_changes(&changes));
    to_py(py, &decision)
}

#[pyfunction]
fn recommend_strategy(changed_files: usize) -> &'static str {
    threshold::recommend_strategy(changed_files, &StrategyConfig::default()).as_str()
}

#[pymodule]
fn _docsync_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // -- Diff / merge -------------------------------------------------------
    m.add_function(wrap_pyfunction!(diff_text, m)?)?;
    m.add_function(wrap_pyfunction!(merge_text, m)?)?;
    m.add("OURS_MARKER", diff::merge::OURS_MARKER)?;
    m.add("SEPARATOR_MARKER", diff::merge::SEPARATOR_MARKER)?;
    m.add("THEIRS_MARKER", diff::merge::THEIRS_MARKER)?;

    // -- Risk ---------------------------------------------------------------
    m.add_function(wrap_pyfunction!(risk_score, m)?)?;
    m.add_function(wrap_pyfunction!(assess_risk, m)?)?;

    // -- Threshold / strategy -----------------------------------------------
    m.add_function(wrap_pyfunction!(calculate_threshold, m)?)?;
    m.add_function(wrap_pyfunction!(should_use_incremental, m)?)?;
    m.add_function(wrap_pyfunction!(recommend_strategy, m)?)?;

    Ok(())
}
