//! Python entry points. Each takes a request JSON string and an optional
//! configuration JSON string and returns the response as JSON.

use pyo3::prelude::*;

use crate::api;
use crate::config::EngineConfig;
use crate::errors::ArchaiResult;

fn load_config(config_json: Option<&str>) -> ArchaiResult<EngineConfig> {
    let config = match config_json {
        Some(raw) if !raw.trim().is_empty() => EngineConfig::from_json_str(raw)?,
        _ => EngineConfig::default(),
    };
    config.with_env_overrides()
}

#[pyfunction]
#[pyo3(signature = (request_json, config_json=None))]
pub fn assess_impact(
    py: Python<'_>,
    request_json: &str,
    config_json: Option<&str>,
) -> PyResult<String> {
    let config = load_config(config_json)?;
    Ok(py.allow_threads(|| api::assess_impact_json(request_json, &config))?)
}

#[pyfunction]
#[pyo3(signature = (request_json, config_json=None))]
pub fn plan_sprint(
    py: Python<'_>,
    request_json: &str,
    config_json: Option<&str>,
) -> PyResult<String> {
    let config = load_config(config_json)?;
    Ok(py.allow_threads(|| api::plan_sprint_json(request_json, &config))?)
}

#[pyfunction]
#[pyo3(signature = (request_json, config_json=None))]
pub fn simulate_sprint(
    py: Python<'_>,
    request_json: &str,
    config_json: Option<&str>,
) -> PyResult<String> {
    let config = load_config(config_json)?;
    Ok(py.allow_threads(|| api::simulate_sprint_json(request_json, &config))?)
}
