//! Personalized network models across cell lines and conditions.
//!
//! A shared baseline network is copied and overridden per cell line from its
//! mutation, rate and initial-state profile, then again per condition. The
//! resulting matrix of models is simulated on demand (results are memoized)
//! and summarized as survival and proliferation rates.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use cellensemble::{
//!     BooleanNetwork, CellLineProfile, EnsembleConfig, ExperimentMatrix, GeneMappings,
//!     Mutation, RunOptions,
//! };
//!
//! # fn main() -> cellensemble::Result<()> {
//! let model = BooleanNetwork::from_path("model.json")?;
//! let mut profiles = BTreeMap::new();
//! profiles.insert(
//!     "MCF7".to_string(),
//!     CellLineProfile::new("MCF7").with_mutation("TP53", Mutation::Off),
//! );
//! let mappings = GeneMappings::default().map_genes("p53", &["TP53"]);
//!
//! let mut matrix = ExperimentMatrix::new(model, profiles, mappings, EnsembleConfig::default())?;
//! matrix.add_condition("EGFRi", [("EGFR", Mutation::Off)])?;
//! matrix.run_simulations("all", "all", RunOptions::default())?;
//! let report = matrix.compare_survival("all", "all")?;
//! report.table.to_csv_path("survival.csv")?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod matrix;
pub mod model;
pub mod network;
pub mod personalize;
pub mod render;
pub mod survival;

#[cfg(feature = "python")]
mod python;

pub use config::EnsembleConfig;
pub use entry::{LifecycleState, PersonalizedModel, Provenance};
pub use error::{Axis, EngineError, EnsembleError, Result};
pub use matrix::{
    BatchReport, ConditionChange, ExperimentMatrix, PairFailure, RunOptions, Selection,
    SimulationOutcome, Summary, BASE_CONDITION,
};
pub use model::{
    InitialState, Mutation, NetworkModel, RunControl, SimulationResult, TimePoint, TransitionRates,
};
pub use network::{BooleanNetwork, Logic, NodeSpec, SimulationConfig};
pub use personalize::{
    profiles_from_json_str, resolve, CellLineProfile, GeneCombination, GeneMappings, GeneRef,
    NodeOverride, OverrideSet, ResolveOptions,
};
pub use render::{Panel, Renderer, TextRenderer};
pub use survival::{
    survival_metrics, OutcomeMarkers, SurvivalMetrics, SurvivalReport, SurvivalRow, SurvivalTable,
};
