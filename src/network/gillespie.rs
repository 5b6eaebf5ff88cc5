//! Gillespie simulator for asynchronous Boolean networks.
//!
//! Simulates the continuous-time Markov chain over network states:
//! - State = activity of every node
//! - Events = single-node flips allowed by the update rules
//! - Rates = the flipping node's up or down rate
//!
//! Trajectories are independent and run in parallel with Rayon.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::logic::CompiledLogic;
use super::model::BooleanNetwork;
use super::state::NetworkState;
use super::trajectory::{TrajectoryCollection, TrajectorySample};
use crate::error::EngineError;
use crate::model::{RunControl, SimulationResult, TransitionRates};

/// Configuration for Gillespie simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated time horizon.
    pub max_time: f64,
    /// Spacing of the recorded probability trajectory.
    pub time_tick: f64,
    /// Number of trajectories.
    pub sample_count: usize,
    /// Base RNG seed (trajectory `i` uses `seed + i`).
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_time: 50.0,
            time_tick: 1.0,
            sample_count: 1000,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if !(self.max_time.is_finite() && self.max_time > 0.0) {
            return Err(EngineError::Failed(format!(
                "max_time must be positive, got {}",
                self.max_time
            )));
        }
        if !(self.time_tick.is_finite() && self.time_tick > 0.0) {
            return Err(EngineError::Failed(format!(
                "time_tick must be positive, got {}",
                self.time_tick
            )));
        }
        if self.sample_count == 0 {
            return Err(EngineError::Failed("sample_count must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of recorded ticks, including time zero.
    fn n_ticks(&self) -> usize {
        (self.max_time / self.time_tick).floor() as usize + 1
    }
}

/// Gillespie simulator compiled from one network.
pub struct GillespieSimulator {
    model_name: String,
    names: Vec<String>,
    observable: Vec<bool>,
    rules: Vec<Option<CompiledLogic>>,
    pinned: Vec<Option<bool>>,
    initial: Vec<f64>,
    rates: Vec<TransitionRates>,
    config: SimulationConfig,
}

impl GillespieSimulator {
    /// Compile a network; fails if a rule reads an unknown node.
    pub fn new(network: &BooleanNetwork) -> Result<Self, EngineError> {
        network.simulation.validate()?;

        let resolve = |name: &str| network.node_index(name);
        let rules = network
            .nodes
            .iter()
            .map(|node| {
                node.logic
                    .as_ref()
                    .map(|logic| logic.compile(&resolve).map_err(EngineError::UnknownNode))
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            model_name: network.name.clone(),
            names: network.nodes.iter().map(|n| n.name.clone()).collect(),
            observable: network.nodes.iter().map(|n| !n.internal).collect(),
            rules,
            pinned: network
                .nodes
                .iter()
                .map(|n| n.mutation.map(|m| m.is_on()))
                .collect(),
            initial: network
                .nodes
                .iter()
                .map(|n| n.effective_initial_probability())
                .collect(),
            rates: network.nodes.iter().map(|n| n.rates).collect(),
            config: network.simulation.clone(),
        })
    }

    /// Draw an initial state from the per-node ON probabilities.
    fn initial_state(&self, rng: &mut StdRng) -> NetworkState {
        let active = self
            .initial
            .iter()
            .zip(&self.pinned)
            .map(|(&p, pinned)| match pinned {
                Some(value) => *value,
                None => rng.gen::<f64>() < p,
            })
            .collect();
        NetworkState::new(active)
    }

    /// Fill `out` with each node's flip rate in `state`; returns the total.
    fn flip_rates(&self, state: &NetworkState, out: &mut Vec<f64>) -> f64 {
        out.clear();
        let mut total = 0.0;
        for (idx, rule) in self.rules.iter().enumerate() {
            let rate = match (rule, self.pinned[idx]) {
                (Some(rule), None) => {
                    let target = rule.eval(state.as_slice());
                    match (state.is_active(idx), target) {
                        (false, true) => self.rates[idx].up,
                        (true, false) => self.rates[idx].down,
                        _ => 0.0,
                    }
                }
                _ => 0.0,
            };
            total += rate;
            out.push(rate);
        }
        total
    }

    /// Run a single Gillespie trajectory.
    pub fn simulate(&self, rng: &mut StdRng) -> TrajectorySample {
        let n_ticks = self.config.n_ticks();
        let mut state = self.initial_state(rng);
        let mut sample = TrajectorySample::new(state.clone());
        let mut current_time = 0.0;
        let mut rates = Vec::with_capacity(self.names.len());

        loop {
            let total_rate = self.flip_rates(&state, &mut rates);

            // Absorbing state: nothing can flip any more
            let next_time = if total_rate > 0.0 {
                current_time - (1.0 - rng.gen::<f64>()).ln() / total_rate
            } else {
                f64::INFINITY
            };

            while sample.ticks.len() < n_ticks
                && (sample.ticks.len() as f64) * self.config.time_tick < next_time
            {
                sample.ticks.push(state.clone());
            }

            if next_time > self.config.max_time {
                break;
            }

            // Sample the flipping node (weighted by rates)
            let u: f64 = rng.gen::<f64>() * total_rate;
            let mut cumsum = 0.0;
            let mut chosen_idx = 0;
            for (idx, &rate) in rates.iter().enumerate() {
                if rate <= 0.0 {
                    continue;
                }
                cumsum += rate;
                chosen_idx = idx;
                if u < cumsum {
                    break;
                }
            }

            state.flip(chosen_idx);
            current_time = next_time;
            sample.n_transitions += 1;
            sample.last_event_time = current_time;
        }

        sample.final_state = state;
        sample
    }

    /// Simulate all trajectories in parallel and summarize them.
    ///
    /// `control` is checked before each trajectory starts.
    pub fn run(&self, control: &RunControl) -> Result<SimulationResult, EngineError> {
        control.check()?;

        let seed = self.config.seed;
        let samples = (0..self.config.sample_count)
            .into_par_iter()
            .map(|i| -> Result<TrajectorySample, EngineError> {
                control.check()?;
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                Ok(self.simulate(&mut rng))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let collection = TrajectoryCollection::new(samples, &self.names, &self.observable);
        debug!(
            model = %self.model_name,
            trajectories = collection.len(),
            mean_transitions = collection.mean_transitions(),
            "gillespie run finished"
        );

        let result = SimulationResult::new(collection.final_state_distribution())
            .map_err(|e| EngineError::Failed(e.to_string()))?;
        Ok(result.with_trajectory(collection.time_course(self.config.time_tick)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mutation, NetworkModel};
    use crate::network::{Logic, NodeSpec};

    fn test_config() -> SimulationConfig {
        SimulationConfig {
            max_time: 20.0,
            time_tick: 1.0,
            sample_count: 200,
            seed: 42,
        }
    }

    /// Signal -> Growth, Growth inhibits Death.
    fn test_network() -> BooleanNetwork {
        BooleanNetwork::new("test")
            .with_node(NodeSpec::new("Signal").initial(0.5))
            .with_node(
                NodeSpec::new("Growth")
                    .logic(Logic::parse("Signal").unwrap())
                    .initial(0.0),
            )
            .with_node(
                NodeSpec::new("Death")
                    .logic(Logic::parse("!Growth").unwrap())
                    .rates(0.1, 1.0)
                    .initial(0.0),
            )
            .with_simulation(test_config())
    }

    #[test]
    fn test_single_trajectory() {
        let simulator = GillespieSimulator::new(&test_network()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let sample = simulator.simulate(&mut rng);
        assert_eq!(sample.ticks.len(), 21);
        assert!(sample.last_event_time <= 20.0);
    }

    #[test]
    fn test_final_state_distribution() {
        let result = test_network().run(&RunControl::new()).unwrap();

        // Probabilities should sum to 1
        let total: f64 = result.last_state_distribution().values().sum();
        assert!((total - 1.0).abs() < 1e-10);
        assert_eq!(result.trajectory().len(), 21);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let network = test_network();
        let a = network.run(&RunControl::new()).unwrap();
        let b = network.run(&RunControl::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mutation_pins_node() {
        let mut network = test_network();
        network.mutate("Signal", Mutation::On).unwrap();
        let result = network.run(&RunControl::new()).unwrap();

        for label in result.last_state_distribution().keys() {
            assert!(label.contains("Signal"), "unexpected label {label}");
        }
    }

    #[test]
    fn test_mutation_affects_distribution() {
        let baseline = test_network();
        let mut knocked = baseline.clone();
        knocked.mutate("Growth", Mutation::Off).unwrap();

        let base = baseline.run(&RunControl::new()).unwrap();
        let knock = knocked.run(&RunControl::new()).unwrap();
        assert_ne!(base.last_state_distribution(), knock.last_state_distribution());
    }

    #[test]
    fn test_unknown_rule_input() {
        let network = BooleanNetwork::new("broken")
            .with_node(NodeSpec::new("A").logic(Logic::parse("Missing").unwrap()));
        assert!(matches!(
            GillespieSimulator::new(&network),
            Err(EngineError::UnknownNode(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_cancelled_run() {
        let control = RunControl::new();
        control.cancel();
        assert!(matches!(
            test_network().run(&control),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_invalid_settings() {
        let network = test_network().with_simulation(SimulationConfig {
            sample_count: 0,
            ..test_config()
        });
        assert!(matches!(network.run(&RunControl::new()), Err(EngineError::Failed(_))));
    }
}
