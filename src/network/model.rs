//! Asynchronous Boolean network model.
//!
//! Every node carries an update rule, an up/down rate pair and an initial
//! ON probability. A node whose rule evaluates true switches ON at its up
//! rate; one whose rule evaluates false switches OFF at its down rate.
//! Nodes without a rule are inputs and keep their initial value.
//! A mutated node is pinned to its forced value.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::gillespie::{GillespieSimulator, SimulationConfig};
use super::logic::Logic;
use crate::error::{EngineError, Result};
use crate::model::{InitialState, Mutation, NetworkModel, RunControl, SimulationResult, TransitionRates};

fn default_initial_state() -> InitialState {
    InitialState::Probability(0.5)
}

/// One node of the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// Update rule; `None` makes the node an input.
    #[serde(default)]
    pub logic: Option<Logic>,
    #[serde(default)]
    pub rates: TransitionRates,
    #[serde(default = "default_initial_state")]
    pub initial_state: InitialState,
    /// Internal nodes never appear in state labels.
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub mutation: Option<Mutation>,
}

impl NodeSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            logic: None,
            rates: TransitionRates::default(),
            initial_state: default_initial_state(),
            internal: false,
            mutation: None,
        }
    }

    pub fn logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    pub fn rates(mut self, up: f64, down: f64) -> Self {
        self.rates = TransitionRates::new(up, down);
        self
    }

    pub fn initial(mut self, on_probability: f64) -> Self {
        self.initial_state = InitialState::Probability(on_probability);
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Probability the node starts ON, taking a mutation into account.
    pub fn effective_initial_probability(&self) -> f64 {
        match self.mutation {
            Some(Mutation::On) => 1.0,
            Some(Mutation::Off) => 0.0,
            None => self.initial_state.on_probability(),
        }
    }
}

/// Boolean network with its simulation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BooleanNetwork {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl BooleanNetwork {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            simulation: SimulationConfig::default(),
        }
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn node_mut(&mut self, name: &str) -> std::result::Result<&mut NodeSpec, EngineError> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| EngineError::UnknownNode(name.to_string()))
    }

    /// Every forced node: name -> value.
    pub fn mutations(&self) -> BTreeMap<&str, Mutation> {
        self.nodes
            .iter()
            .filter_map(|n| n.mutation.map(|m| (n.name.as_str(), m)))
            .collect()
    }
}

impl NetworkModel for BooleanNetwork {
    fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    fn mutate(&mut self, node: &str, mutation: Mutation) -> std::result::Result<(), EngineError> {
        self.node_mut(node)?.mutation = Some(mutation);
        Ok(())
    }

    fn set_initial_state(
        &mut self,
        node: &str,
        state: InitialState,
    ) -> std::result::Result<(), EngineError> {
        state
            .validate(node)
            .map_err(|e| EngineError::InvalidParameter {
                node: node.to_string(),
                reason: e.to_string(),
            })?;
        self.node_mut(node)?.initial_state = state;
        Ok(())
    }

    fn set_transition_rates(
        &mut self,
        node: &str,
        rates: TransitionRates,
    ) -> std::result::Result<(), EngineError> {
        let valid = |r: f64| r.is_finite() && r >= 0.0;
        if !valid(rates.up) || !valid(rates.down) {
            return Err(EngineError::InvalidParameter {
                node: node.to_string(),
                reason: format!("rates ({}, {}) must be finite and non-negative", rates.up, rates.down),
            });
        }
        self.node_mut(node)?.rates = rates;
        Ok(())
    }

    fn run(&self, control: &RunControl) -> std::result::Result<SimulationResult, EngineError> {
        let simulator = GillespieSimulator::new(self)?;
        simulator.run(control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> BooleanNetwork {
        BooleanNetwork::new("toy")
            .with_node(NodeSpec::new("A"))
            .with_node(NodeSpec::new("B").logic(Logic::parse("A").unwrap()))
    }

    #[test]
    fn test_mutate_unknown_node() {
        let mut network = toy();
        assert!(matches!(
            network.mutate("Z", Mutation::On),
            Err(EngineError::UnknownNode(name)) if name == "Z"
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let baseline = toy();
        let mut copy = baseline.clone();
        copy.mutate("A", Mutation::Off).unwrap();
        copy.set_transition_rates("B", TransitionRates::new(2.0, 0.5)).unwrap();

        assert_eq!(baseline.node("A").unwrap().mutation, None);
        assert_eq!(baseline.node("B").unwrap().rates, TransitionRates::default());
        assert_eq!(copy.mutations().get("A"), Some(&Mutation::Off));
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let mut network = toy();
        assert!(network
            .set_transition_rates("A", TransitionRates::new(-1.0, 1.0))
            .is_err());
        assert!(network
            .set_initial_state("A", InitialState::Probability(2.0))
            .is_err());
    }

    #[test]
    fn test_effective_initial_probability() {
        let mut node = NodeSpec::new("A").initial(0.2);
        assert_eq!(node.effective_initial_probability(), 0.2);
        node.mutation = Some(Mutation::On);
        assert_eq!(node.effective_initial_probability(), 1.0);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "name": "toy",
            "nodes": [
                {"name": "A", "initial_state": 1.0},
                {"name": "B", "logic": "A & !C", "rates": {"up": 2.0, "down": 0.5}},
                {"name": "C", "internal": true, "initial_state": [1.0, 0.0]}
            ],
            "simulation": {"max_time": 10.0, "sample_count": 50}
        }"#;
        let network = BooleanNetwork::from_json_str(json).unwrap();
        assert_eq!(network.node_names(), vec!["A", "B", "C"]);
        assert_eq!(network.node("B").unwrap().logic, Some(Logic::parse("A & !C").unwrap()));
        assert!(network.node("C").unwrap().internal);
        assert_eq!(network.simulation.sample_count, 50);
    }
}
