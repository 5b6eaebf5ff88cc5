//! Python bindings via PyO3.
//!
//! ```python
//! from cellensemble import CellEnsemble
//!
//! ens = CellEnsemble(model_json, celllines_json, mappings_json)
//! ens.add_condition("EGFRi", [("EGFR", "OFF")])
//! failures = ens.run_simulation(redo=False)
//! labels, rates, missing = ens.compare_survival()
//! ```
//!
//! Requires the `python` feature flag.

use std::collections::BTreeMap;

use numpy::PyArray2;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyString;

use crate::config::EnsembleConfig;
use crate::error::EnsembleError;
use crate::matrix::{ConditionChange, ExperimentMatrix, PairFailure, RunOptions, Selection};
use crate::model::Mutation;
use crate::network::BooleanNetwork;
use crate::personalize::{profiles_from_json_str, GeneMappings};

impl From<EnsembleError> for PyErr {
    fn from(err: EnsembleError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// `None` or `"all"` selects everything; a string selects one key; a list selects several.
fn selection(value: Option<&PyAny>) -> PyResult<Selection> {
    match value {
        None => Ok(Selection::All),
        Some(obj) => match obj.downcast::<PyString>() {
            Ok(key) => Ok(Selection::from(key.to_str()?)),
            Err(_) => Ok(Selection::Keys(obj.extract::<Vec<String>>()?)),
        },
    }
}

fn failure_tuples(failures: Vec<PairFailure>) -> Vec<(String, String, String)> {
    failures
        .into_iter()
        .map(|f| (f.condition, f.cell_line, f.error.to_string()))
        .collect()
}

/// Experiment matrix over the built-in Boolean-network engine.
#[pyclass(name = "CellEnsemble")]
pub struct PyCellEnsemble {
    inner: ExperimentMatrix<BooleanNetwork>,
}

#[pymethods]
impl PyCellEnsemble {
    #[new]
    #[pyo3(signature = (model_json, celllines_json, mappings_json, config_json=None))]
    fn new(
        model_json: &str,
        celllines_json: &str,
        mappings_json: &str,
        config_json: Option<&str>,
    ) -> PyResult<Self> {
        let model = BooleanNetwork::from_json_str(model_json)?;
        let profiles = profiles_from_json_str(celllines_json)?;
        let mappings = GeneMappings::from_json_str(mappings_json)?;
        let config = match config_json {
            Some(json) => EnsembleConfig::from_json_str(json)?,
            None => EnsembleConfig::default(),
        };
        Ok(Self {
            inner: ExperimentMatrix::new(model, profiles, mappings, config)?,
        })
    }

    /// Add or replace a condition; returns True if it replaced one.
    ///
    /// `mutations` is a list of `(node, "ON"|"OFF")` pairs or a single pair.
    fn add_condition(&mut self, name: &str, mutations: &PyAny) -> PyResult<bool> {
        let pairs = match mutations.extract::<(String, String)>() {
            Ok(pair) => vec![pair],
            Err(_) => mutations.extract::<Vec<(String, String)>>()?,
        };
        let parsed = Mutation::parse_overrides(pairs)?;
        let change = self.inner.add_condition(name, parsed)?;
        Ok(change == ConditionChange::Replaced)
    }

    /// Re-personalize every entry, optionally against a new model.
    #[pyo3(signature = (model_json=None))]
    fn update(&mut self, model_json: Option<&str>) -> PyResult<()> {
        let model = model_json.map(BooleanNetwork::from_json_str).transpose()?;
        self.inner.rebase(model)?;
        Ok(())
    }

    /// Simulate the selected pairs; returns `(condition, cell_line, error)` failures.
    #[pyo3(signature = (celllines=None, conditions=None, redo=true, mute=false))]
    fn run_simulation(
        &mut self,
        py: Python<'_>,
        celllines: Option<&PyAny>,
        conditions: Option<&PyAny>,
        redo: bool,
        mute: bool,
    ) -> PyResult<Vec<(String, String, String)>> {
        let cells = selection(celllines)?;
        let conds = selection(conditions)?;
        let options = RunOptions {
            force_recompute: redo,
            quiet: mute,
        };
        let inner = &mut self.inner;
        let report = py.allow_threads(move || inner.run_simulations(cells, conds, options))?;
        Ok(failure_tuples(report.failures))
    }

    /// Returns `(row_labels, rates, failures)`; `rates` columns are
    /// proliferation and survival.
    #[pyo3(signature = (celllines=None, conditions=None))]
    fn compare_survival<'py>(
        &self,
        py: Python<'py>,
        celllines: Option<&PyAny>,
        conditions: Option<&PyAny>,
    ) -> PyResult<(Vec<String>, &'py PyArray2<f64>, Vec<(String, String, String)>)> {
        let report = self
            .inner
            .compare_survival(selection(celllines)?, selection(conditions)?)?;
        let labels = report
            .table
            .labels()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rates = PyArray2::from_owned_array(py, report.table.to_array());
        Ok((labels, rates, failure_tuples(report.failures)))
    }

    /// Entry states per condition.
    fn resume(&self) -> BTreeMap<String, Vec<(String, String)>> {
        self.inner
            .summary()
            .conditions
            .into_iter()
            .map(|(condition, cells)| {
                let cells = cells
                    .into_iter()
                    .map(|(cell, state)| (cell, state.to_string()))
                    .collect();
                (condition, cells)
            })
            .collect()
    }

    #[getter]
    fn conditions(&self) -> Vec<String> {
        self.inner
            .condition_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[getter]
    fn celllines(&self) -> Vec<String> {
        self.inner
            .cell_line_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

#[pymodule]
fn cellensemble(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyCellEnsemble>()?;
    Ok(())
}
