//! Engine-facing data types.
//!
//! The ensemble never looks inside a simulator. It only needs a model it can
//! copy, override node by node and run, and a result it can read a final-state
//! distribution from. [`NetworkModel`] is that contract; [`crate::network`]
//! provides the built-in implementation.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EnsembleError, Result};

/// Forced boolean status of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutation {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl Mutation {
    pub fn inverted(self) -> Self {
        match self {
            Mutation::On => Mutation::Off,
            Mutation::Off => Mutation::On,
        }
    }

    pub fn is_on(self) -> bool {
        self == Mutation::On
    }

    /// Parse textual `(node, value)` overrides, failing on the first bad value.
    pub fn parse_overrides<I, S>(pairs: I) -> Result<Vec<(String, Mutation)>>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String> + AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(node, value)| {
                let parsed = value.as_ref().parse::<Mutation>();
                match parsed {
                    Ok(mutation) => Ok((node.into(), mutation)),
                    Err(_) => Err(EnsembleError::InvalidMutation {
                        node: node.into(),
                        value: value.into(),
                    }),
                }
            })
            .collect()
    }
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::On => write!(f, "ON"),
            Mutation::Off => write!(f, "OFF"),
        }
    }
}

impl FromStr for Mutation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Mutation::On),
            "OFF" => Ok(Mutation::Off),
            other => Err(format!("mutation must be ON or OFF, got {other:?}")),
        }
    }
}

/// Initial-state distribution of a single node.
///
/// Either the probability of starting ON, or an explicit `[off, on]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialState {
    Probability(f64),
    Distribution([f64; 2]),
}

impl InitialState {
    /// Probability that the node starts ON.
    pub fn on_probability(&self) -> f64 {
        match self {
            InitialState::Probability(p) => *p,
            InitialState::Distribution([_, on]) => *on,
        }
    }

    /// Check that the value is a proper probability (or distribution).
    pub fn validate(&self, node: &str) -> Result<()> {
        let invalid = |reason: String| EnsembleError::InvalidInitialState {
            node: node.to_string(),
            reason,
        };
        match self {
            InitialState::Probability(p) => {
                if !(0.0..=1.0).contains(p) {
                    return Err(invalid(format!("probability {p} outside [0, 1]")));
                }
            }
            InitialState::Distribution([off, on]) => {
                if !(0.0..=1.0).contains(off) || !(0.0..=1.0).contains(on) {
                    return Err(invalid(format!("masses [{off}, {on}] outside [0, 1]")));
                }
                if (off + on - 1.0).abs() > SimulationResult::TOLERANCE {
                    return Err(invalid(format!("masses [{off}, {on}] do not sum to 1")));
                }
            }
        }
        Ok(())
    }
}

/// Up/down transition-rate pair of a node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRates {
    pub up: f64,
    pub down: f64,
}

impl Default for TransitionRates {
    fn default() -> Self {
        Self { up: 1.0, down: 1.0 }
    }
}

impl TransitionRates {
    pub fn new(up: f64, down: f64) -> Self {
        Self { up, down }
    }

    /// Rate pair from a measured up-rate: `up = r`, `down = 1 / r`.
    ///
    /// Returns `None` when `r` is not a finite positive number.
    pub fn from_measured(rate: f64) -> Option<Self> {
        if rate.is_finite() && rate > 0.0 {
            Some(Self {
                up: rate,
                down: 1.0 / rate,
            })
        } else {
            None
        }
    }
}

/// Label distribution at one time point of a trajectory.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimePoint {
    pub time: f64,
    pub distribution: BTreeMap<String, f64>,
}

/// Outcome of one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    last_states: BTreeMap<String, f64>,
    trajectory: Vec<TimePoint>,
}

impl SimulationResult {
    /// Allowed deviation of a distribution's total mass from 1.
    pub const TOLERANCE: f64 = 1e-6;

    /// Build a result from its final-state distribution.
    pub fn new(last_states: BTreeMap<String, f64>) -> Result<Self> {
        let mut total = 0.0;
        for &mass in last_states.values() {
            if !(0.0..=1.0 + Self::TOLERANCE).contains(&mass) {
                return Err(EnsembleError::InvalidDistribution { total: mass });
            }
            total += mass;
        }
        if (total - 1.0).abs() > Self::TOLERANCE {
            return Err(EnsembleError::InvalidDistribution { total });
        }
        Ok(Self {
            last_states,
            trajectory: Vec::new(),
        })
    }

    /// Attach a probability trajectory.
    pub fn with_trajectory(mut self, trajectory: Vec<TimePoint>) -> Self {
        self.trajectory = trajectory;
        self
    }

    /// Final-state distribution: state label -> probability.
    pub fn last_state_distribution(&self) -> &BTreeMap<String, f64> {
        &self.last_states
    }

    /// State distribution over time (empty if the engine does not record one).
    pub fn trajectory(&self) -> &[TimePoint] {
        &self.trajectory
    }

    /// Probability mass of one label (0 if absent).
    pub fn probability(&self, label: &str) -> f64 {
        self.last_states.get(label).copied().unwrap_or(0.0)
    }
}

/// Cancellation and deadline handle for an engine run.
///
/// Clones share the cancellation flag, so a clone handed to another thread
/// can stop every run started from any of them.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Control with a deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().scoped(Some(timeout))
    }

    /// Derive a control sharing this one's cancellation flag, with a fresh deadline.
    pub fn scoped(&self, timeout: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: timeout.map(|limit| (Instant::now() + limit, limit)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reset the cancellation flag so later runs may proceed.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Fail if the run was cancelled or its deadline has passed.
    pub fn check(&self) -> std::result::Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if let Some((deadline, limit)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EngineError::TimedOut {
                    limit_secs: limit.as_secs_f64(),
                });
            }
        }
        Ok(())
    }
}

/// Capability contract of a simulation engine model.
///
/// `Clone` is the engine's copy operation: personalization always works on a
/// clone and never touches the baseline itself.
pub trait NetworkModel: Clone + Send + Sync {
    /// Names of every node in the network topology.
    fn node_names(&self) -> Vec<String>;

    /// Force a node ON or OFF.
    fn mutate(&mut self, node: &str, mutation: Mutation) -> std::result::Result<(), EngineError>;

    fn set_initial_state(
        &mut self,
        node: &str,
        state: InitialState,
    ) -> std::result::Result<(), EngineError>;

    fn set_transition_rates(
        &mut self,
        node: &str,
        rates: TransitionRates,
    ) -> std::result::Result<(), EngineError>;

    /// Run the simulation synchronously.
    fn run(&self, control: &RunControl) -> std::result::Result<SimulationResult, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_parse_and_invert() {
        assert_eq!("on".parse::<Mutation>().unwrap(), Mutation::On);
        assert_eq!("OFF".parse::<Mutation>().unwrap(), Mutation::Off);
        assert!("maybe".parse::<Mutation>().is_err());
        assert_eq!(Mutation::On.inverted(), Mutation::Off);
    }

    #[test]
    fn test_parse_overrides() {
        let single = Mutation::parse_overrides([("EGFR", "off")]).unwrap();
        assert_eq!(single, vec![("EGFR".to_string(), Mutation::Off)]);

        let several = Mutation::parse_overrides(vec![
            ("EGFR".to_string(), "OFF".to_string()),
            ("TNF".to_string(), " on ".to_string()),
        ])
        .unwrap();
        assert_eq!(several[1], ("TNF".to_string(), Mutation::On));

        assert!(Mutation::parse_overrides(Vec::<(&str, &str)>::new()).unwrap().is_empty());
        let err = Mutation::parse_overrides([("EGFR", "OFF"), ("TNF", "half")]).unwrap_err();
        assert!(matches!(
            err,
            EnsembleError::InvalidMutation { ref node, ref value } if node == "TNF" && value == "half"
        ));
    }

    #[test]
    fn test_initial_state_forms() {
        let p: InitialState = serde_json::from_str("0.25").unwrap();
        let d: InitialState = serde_json::from_str("[0.75, 0.25]").unwrap();
        assert_eq!(p.on_probability(), 0.25);
        assert_eq!(d.on_probability(), 0.25);
        assert!(p.validate("n").is_ok());
        assert!(InitialState::Probability(1.5).validate("n").is_err());
        assert!(InitialState::Distribution([0.5, 0.6]).validate("n").is_err());
    }

    #[test]
    fn test_measured_rates() {
        let rates = TransitionRates::from_measured(2.0).unwrap();
        assert_eq!(rates.up, 2.0);
        assert_eq!(rates.down, 0.5);
        assert!(TransitionRates::from_measured(0.0).is_none());
        assert!(TransitionRates::from_measured(-1.0).is_none());
        assert!(TransitionRates::from_measured(f64::NAN).is_none());
    }

    #[test]
    fn test_result_requires_normalized_distribution() {
        let mut dist = BTreeMap::new();
        dist.insert("A".to_string(), 0.4);
        dist.insert("B".to_string(), 0.6);
        let result = SimulationResult::new(dist.clone()).unwrap();
        assert_eq!(result.probability("A"), 0.4);
        assert_eq!(result.probability("missing"), 0.0);

        dist.insert("C".to_string(), 0.1);
        assert!(matches!(
            SimulationResult::new(dist),
            Err(EnsembleError::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn test_run_control_cancel_is_shared() {
        let control = RunControl::new();
        let scoped = control.scoped(None);
        assert!(scoped.check().is_ok());
        control.cancel();
        assert!(matches!(scoped.check(), Err(EngineError::Cancelled)));
        control.reset();
        assert!(scoped.check().is_ok());
    }

    #[test]
    fn test_run_control_deadline() {
        let control = RunControl::with_timeout(Duration::ZERO);
        assert!(matches!(control.check(), Err(EngineError::TimedOut { .. })));
    }
}
