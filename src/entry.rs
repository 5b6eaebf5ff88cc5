//! One (condition, cell line) cell of the experiment matrix.

use std::sync::Arc;

use crate::error::{EnsembleError, Result};
use crate::model::{Mutation, NetworkModel, RunControl, SimulationResult};
use crate::personalize::{resolve, CellLineProfile, GeneMappings, ResolveOptions};

/// Lifecycle of a personalized model.
///
/// The result lives inside `Simulated`, so an entry has a result exactly
/// when it is in that state.
#[derive(Clone, Debug)]
enum Lifecycle<M> {
    Unpersonalized,
    Personalized {
        model: M,
    },
    Simulated {
        model: M,
        result: Arc<SimulationResult>,
    },
}

/// Lifecycle without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unpersonalized,
    Personalized,
    Simulated,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Unpersonalized => write!(f, "unpersonalized"),
            LifecycleState::Personalized => write!(f, "personalized"),
            LifecycleState::Simulated => write!(f, "simulated"),
        }
    }
}

/// Where a personalized model came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    /// Revision of the baseline the model was derived from.
    pub baseline_revision: u64,
    /// Owning condition.
    pub condition: String,
}

/// A cell line's model under one condition.
#[derive(Clone, Debug)]
pub struct PersonalizedModel<M> {
    cell_line: String,
    profile: Arc<CellLineProfile>,
    mappings: Arc<GeneMappings>,
    condition_mutations: Vec<(String, Mutation)>,
    provenance: Provenance,
    lifecycle: Lifecycle<M>,
}

impl<M: NetworkModel> PersonalizedModel<M> {
    /// `cell_line` is the matrix key of the profile, not necessarily its name.
    pub fn new(
        condition: &str,
        cell_line: &str,
        profile: Arc<CellLineProfile>,
        mappings: Arc<GeneMappings>,
        condition_mutations: Vec<(String, Mutation)>,
    ) -> Self {
        Self {
            cell_line: cell_line.to_string(),
            profile,
            mappings,
            condition_mutations,
            provenance: Provenance {
                baseline_revision: 0,
                condition: condition.to_string(),
            },
            lifecycle: Lifecycle::Unpersonalized,
        }
    }

    /// Derive this entry's model from a copy of `baseline`.
    ///
    /// Profile overrides are applied first, then the condition's mutations.
    /// Any previous result is dropped. On error the entry is left unchanged.
    pub fn personalize(&mut self, baseline: &M, revision: u64, options: &ResolveOptions) -> Result<()> {
        let topology = baseline.node_names();
        let overrides = resolve(
            &topology,
            &self.mappings.gene_nodes,
            &self.mappings.strict_gene_nodes,
            &self.profile,
            &self.profile.initial_states,
            options,
        )?;

        let mut model = baseline.clone();
        overrides.apply_to(&mut model)?;
        for (node, mutation) in &self.condition_mutations {
            model.mutate(node, *mutation)?;
        }

        self.lifecycle = Lifecycle::Personalized { model };
        self.provenance.baseline_revision = revision;
        Ok(())
    }

    /// Run the engine on the personalized model and keep the result.
    ///
    /// A failed run leaves the entry `Personalized` with no result.
    pub fn simulate(&mut self, control: &RunControl) -> Result<Arc<SimulationResult>> {
        let model = match std::mem::replace(&mut self.lifecycle, Lifecycle::Unpersonalized) {
            Lifecycle::Unpersonalized => {
                return Err(EnsembleError::NotPersonalized {
                    cell_line: self.cell_line.clone(),
                })
            }
            Lifecycle::Personalized { model } | Lifecycle::Simulated { model, .. } => model,
        };

        match model.run(control) {
            Ok(result) => {
                let result = Arc::new(result);
                self.lifecycle = Lifecycle::Simulated {
                    model,
                    result: Arc::clone(&result),
                };
                Ok(result)
            }
            Err(e) => {
                self.lifecycle = Lifecycle::Personalized { model };
                Err(e.into())
            }
        }
    }

    pub fn status(&self) -> LifecycleState {
        match self.lifecycle {
            Lifecycle::Unpersonalized => LifecycleState::Unpersonalized,
            Lifecycle::Personalized { .. } => LifecycleState::Personalized,
            Lifecycle::Simulated { .. } => LifecycleState::Simulated,
        }
    }

    pub fn result(&self) -> Option<&Arc<SimulationResult>> {
        match &self.lifecycle {
            Lifecycle::Simulated { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Result, or `MissingResult` naming this entry.
    pub fn require_result(&self) -> Result<&Arc<SimulationResult>> {
        self.result().ok_or_else(|| EnsembleError::MissingResult {
            condition: self.provenance.condition.clone(),
            cell_line: self.cell_line.clone(),
        })
    }

    pub fn model(&self) -> Option<&M> {
        match &self.lifecycle {
            Lifecycle::Unpersonalized => None,
            Lifecycle::Personalized { model } | Lifecycle::Simulated { model, .. } => Some(model),
        }
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn profile(&self) -> &CellLineProfile {
        &self.profile
    }

    pub fn cell_line(&self) -> &str {
        &self.cell_line
    }

    pub fn condition(&self) -> &str {
        &self.provenance.condition
    }
}

impl<M: NetworkModel> std::fmt::Display for PersonalizedModel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status() {
            LifecycleState::Unpersonalized => write!(f, "{}", self.cell_line),
            state => write!(f, "{}, {}", self.cell_line, state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::network::{BooleanNetwork, Logic, NodeSpec, SimulationConfig};

    fn baseline() -> BooleanNetwork {
        BooleanNetwork::new("toy")
            .with_node(NodeSpec::new("Signal").initial(0.5))
            .with_node(NodeSpec::new("Prolif").logic(Logic::parse("Signal").unwrap()))
            .with_node(NodeSpec::new("Apoptosis").logic(Logic::parse("!Signal").unwrap()))
            .with_simulation(SimulationConfig {
                max_time: 10.0,
                time_tick: 1.0,
                sample_count: 50,
                seed: 7,
            })
    }

    fn entry(condition_mutations: Vec<(String, Mutation)>) -> PersonalizedModel<BooleanNetwork> {
        let profile = CellLineProfile::new("MCF7").with_mutation("EGFR", Mutation::On);
        let mappings = GeneMappings::default().map_genes("Signal", &["EGFR"]);
        PersonalizedModel::new("base", "MCF7", Arc::new(profile), Arc::new(mappings), condition_mutations)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut entry = entry(vec![]);
        assert_eq!(entry.status(), LifecycleState::Unpersonalized);
        assert!(matches!(
            entry.simulate(&RunControl::new()),
            Err(EnsembleError::NotPersonalized { .. })
        ));

        entry
            .personalize(&baseline(), 3, &ResolveOptions::default())
            .unwrap();
        assert_eq!(entry.status(), LifecycleState::Personalized);
        assert_eq!(entry.provenance().baseline_revision, 3);
        assert!(entry.result().is_none());

        entry.simulate(&RunControl::new()).unwrap();
        assert_eq!(entry.status(), LifecycleState::Simulated);
        assert!(entry.result().is_some());

        entry
            .personalize(&baseline(), 4, &ResolveOptions::default())
            .unwrap();
        assert_eq!(entry.status(), LifecycleState::Personalized);
        assert!(entry.result().is_none());
    }

    #[test]
    fn test_profile_and_condition_overrides_applied() {
        let mut entry = entry(vec![("Apoptosis".to_string(), Mutation::Off)]);
        let base = baseline();
        entry.personalize(&base, 0, &ResolveOptions::default()).unwrap();

        let model = entry.model().unwrap();
        assert_eq!(model.node("Signal").unwrap().mutation, Some(Mutation::On));
        assert_eq!(model.node("Apoptosis").unwrap().mutation, Some(Mutation::Off));
        assert_eq!(base.node("Signal").unwrap().mutation, None);
    }

    #[test]
    fn test_failed_run_keeps_model() {
        let mut entry = entry(vec![]);
        entry
            .personalize(&baseline(), 0, &ResolveOptions::default())
            .unwrap();
        entry.simulate(&RunControl::new()).unwrap();

        let control = RunControl::new();
        control.cancel();
        let err = entry.simulate(&control).unwrap_err();
        assert!(matches!(err, EnsembleError::SimulationEngine(EngineError::Cancelled)));
        assert_eq!(entry.status(), LifecycleState::Personalized);
        assert!(entry.model().is_some());
        assert!(matches!(
            entry.require_result(),
            Err(EnsembleError::MissingResult { .. })
        ));
    }

    #[test]
    fn test_display() {
        let mut entry = entry(vec![]);
        assert_eq!(entry.to_string(), "MCF7");
        entry
            .personalize(&baseline(), 0, &ResolveOptions::default())
            .unwrap();
        assert_eq!(entry.to_string(), "MCF7, personalized");
        entry.simulate(&RunControl::new()).unwrap();
        assert_eq!(entry.to_string(), "MCF7, simulated");
    }
}
