//! Error types for personalization, simulation and aggregation.

use thiserror::Error;

/// Which axis of the experiment matrix a selector refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Condition,
    CellLine,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::Condition => write!(f, "condition"),
            Axis::CellLine => write!(f, "cell line"),
        }
    }
}

/// Failures raised by a simulation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The model has no node with this name.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// A parameter was rejected by the engine.
    #[error("invalid parameter for node {node}: {reason}")]
    InvalidParameter { node: String, reason: String },

    /// The run was cancelled through its control handle.
    #[error("simulation cancelled")]
    Cancelled,

    /// The run exceeded its deadline.
    #[error("simulation exceeded its time budget of {limit_secs:.1}s")]
    TimedOut { limit_secs: f64 },

    /// Any other engine failure.
    #[error("simulation failed: {0}")]
    Failed(String),
}

/// Errors that can occur while building, simulating or aggregating an ensemble.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// A measured rate cannot be turned into an up/down pair.
    #[error("invalid rate {rate} for gene {gene} on node {node}: rate must be positive")]
    InvalidRate { gene: String, node: String, rate: f64 },

    /// The entry has no simulation result yet.
    #[error("the simulation {cell_line}|{condition} has not been computed")]
    MissingResult { condition: String, cell_line: String },

    /// The entry has never been personalized, so there is no model to run.
    #[error("cell line {cell_line} has not been personalized")]
    NotPersonalized { cell_line: String },

    /// A selector names a key the matrix does not hold.
    #[error("unknown {axis}: {name}")]
    UnknownSelection { axis: Axis, name: String },

    /// The simulation engine failed.
    #[error("simulation engine error: {0}")]
    SimulationEngine(#[from] EngineError),

    /// Strict mode: a mapped gene is absent from the cell-line profile.
    #[error("gene {gene} mapped to node {node} is missing from profile {cell_line}")]
    GeneKeyMismatch {
        gene: String,
        node: String,
        cell_line: String,
    },

    /// The reserved base condition cannot be overwritten.
    #[error("condition name {0:?} is reserved")]
    ReservedCondition(String),

    /// A condition override names a value other than ON or OFF.
    #[error("invalid mutation {value:?} for node {node}: expected ON or OFF")]
    InvalidMutation { node: String, value: String },

    /// An initial-state value is not a valid probability.
    #[error("invalid initial state for node {node}: {reason}")]
    InvalidInitialState { node: String, reason: String },

    /// A final-state distribution does not sum to one.
    #[error("state distribution sums to {total:.6}, expected 1")]
    InvalidDistribution { total: f64 },

    /// The renderer failed to draw a panel.
    #[error("render error: {0}")]
    Render(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for ensemble operations.
pub type Result<T> = std::result::Result<T, EnsembleError>;
