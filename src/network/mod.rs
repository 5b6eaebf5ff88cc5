//! Built-in simulation engine: asynchronous Boolean networks.
//!
//! This module provides:
//! - Logic: Boolean update rules and their parser
//! - NetworkState: node activity and observable state labels
//! - BooleanNetwork: the model, implementing [`crate::NetworkModel`]
//! - GillespieSimulator: parallel continuous-time trajectory simulation
//! - TrajectoryCollection: aggregation of trajectories into distributions

pub mod logic;
pub mod state;
pub mod model;
pub mod trajectory;
pub mod gillespie;

pub use logic::{Logic, LogicParseError};
pub use state::{NetworkState, LABEL_SEPARATOR, NIL_LABEL};
pub use model::{BooleanNetwork, NodeSpec};
pub use trajectory::{TrajectoryCollection, TrajectorySample};
pub use gillespie::{GillespieSimulator, SimulationConfig};
