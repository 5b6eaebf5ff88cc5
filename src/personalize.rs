//! Personalization rules: from a cell-line profile to model overrides.
//!
//! Profiles speak in genes; models speak in nodes. Two mappings bridge them:
//! - the gene-node mapping decides a node's forced ON/OFF status from the
//!   mutation status of its genes (`!GENE` reads the inverted status);
//! - the strict gene-node mapping decides a node's up/down rates from the
//!   measured up-rate `r` of its genes (`up = r`, `down = 1 / r`).
//!
//! Per-node initial states from the profile are applied as-is.
//! Every node is resolved independently of every other node.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EnsembleError, Result};
use crate::model::{InitialState, Mutation, NetworkModel, TransitionRates};

/// Prefix marking a negated gene reference.
pub const NEGATION_PREFIX: char = '!';

/// Gene reference inside a gene-node mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct GeneRef {
    pub gene: String,
    pub negated: bool,
}

impl GeneRef {
    pub fn new(gene: &str) -> Self {
        Self::from(gene.to_string())
    }
}

impl From<String> for GeneRef {
    fn from(value: String) -> Self {
        match value.strip_prefix(NEGATION_PREFIX) {
            Some(gene) => Self {
                gene: gene.to_string(),
                negated: true,
            },
            None => Self {
                gene: value,
                negated: false,
            },
        }
    }
}

impl From<GeneRef> for String {
    fn from(gene_ref: GeneRef) -> Self {
        gene_ref.to_string()
    }
}

impl std::fmt::Display for GeneRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "{}{}", NEGATION_PREFIX, self.gene)
        } else {
            write!(f, "{}", self.gene)
        }
    }
}

/// Node -> ordered gene references deciding its mutation status.
pub type GeneNodeMapping = BTreeMap<String, Vec<GeneRef>>;

/// Node -> genes deciding its transition rates.
pub type StrictGeneNodeMapping = BTreeMap<String, Vec<String>>;

/// Both gene-node mappings, shared by every cell line of an ensemble.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneMappings {
    #[serde(default)]
    pub gene_nodes: GeneNodeMapping,
    #[serde(default)]
    pub strict_gene_nodes: StrictGeneNodeMapping,
}

impl GeneMappings {
    pub fn new(gene_nodes: GeneNodeMapping, strict_gene_nodes: StrictGeneNodeMapping) -> Self {
        Self {
            gene_nodes,
            strict_gene_nodes,
        }
    }

    /// Map `node` to gene references written as strings (`"!TP53"` is negated).
    pub fn map_genes(mut self, node: &str, genes: &[&str]) -> Self {
        self.gene_nodes.insert(
            node.to_string(),
            genes.iter().map(|g| GeneRef::new(g)).collect(),
        );
        self
    }

    /// Map `node` to genes carrying measured rates.
    pub fn map_rate_genes(mut self, node: &str, genes: &[&str]) -> Self {
        self.strict_gene_nodes
            .insert(node.to_string(), genes.iter().map(|g| g.to_string()).collect());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Biological input data of one cell line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellLineProfile {
    #[serde(default)]
    pub name: String,
    /// Gene -> mutation status.
    #[serde(default)]
    pub mutations: BTreeMap<String, Mutation>,
    /// Gene -> measured up-transition rate.
    #[serde(default)]
    pub transition_rates_up: BTreeMap<String, f64>,
    /// Node -> initial-state override.
    #[serde(default)]
    pub initial_states: BTreeMap<String, InitialState>,
}

impl CellLineProfile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_mutation(mut self, gene: &str, status: Mutation) -> Self {
        self.mutations.insert(gene.to_string(), status);
        self
    }

    pub fn with_rate(mut self, gene: &str, rate: f64) -> Self {
        self.transition_rates_up.insert(gene.to_string(), rate);
        self
    }

    pub fn with_initial_state(mut self, node: &str, state: InitialState) -> Self {
        self.initial_states.insert(node.to_string(), state);
        self
    }
}

/// Parse a JSON object of profiles keyed by cell-line name.
///
/// A profile without a `name` takes its key.
pub fn profiles_from_json_str(json: &str) -> Result<BTreeMap<String, CellLineProfile>> {
    let mut profiles: BTreeMap<String, CellLineProfile> = serde_json::from_str(json)?;
    for (key, profile) in profiles.iter_mut() {
        if profile.name.is_empty() {
            profile.name = key.clone();
        }
    }
    Ok(profiles)
}

/// How several genes mapped to one node combine into one mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneCombination {
    /// The last gene found in the profile decides.
    #[default]
    LastWins,
    /// ON if any gene resolves to ON.
    AnyOn,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub combination: GeneCombination,
    /// Fail on mapped genes missing from the profile instead of skipping them.
    pub strict_gene_keys: bool,
}

/// Overrides resolved for a single node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeOverride {
    pub mutation: Option<Mutation>,
    pub rates: Option<TransitionRates>,
    pub initial_state: Option<InitialState>,
}

impl NodeOverride {
    pub fn is_empty(&self) -> bool {
        self.mutation.is_none() && self.rates.is_none() && self.initial_state.is_none()
    }
}

/// Resolved overrides for a whole model, keyed by node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverrideSet {
    nodes: BTreeMap<String, NodeOverride>,
}

impl OverrideSet {
    pub fn get(&self, node: &str) -> Option<&NodeOverride> {
        self.nodes.get(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeOverride)> {
        self.nodes.iter().map(|(node, o)| (node.as_str(), o))
    }

    /// Write the overrides onto a model (normally a fresh copy of the baseline).
    pub fn apply_to<M: NetworkModel>(&self, model: &mut M) -> Result<()> {
        for (node, o) in &self.nodes {
            if let Some(mutation) = o.mutation {
                model.mutate(node, mutation)?;
            }
            if let Some(rates) = o.rates {
                model.set_transition_rates(node, rates)?;
            }
            if let Some(state) = o.initial_state {
                model.set_initial_state(node, state)?;
            }
        }
        Ok(())
    }
}

/// Resolve the overrides a profile imposes on a model topology.
///
/// Nodes absent from both mappings and from `initial_states` get no override.
pub fn resolve(
    topology: &[String],
    gene_nodes: &GeneNodeMapping,
    strict_gene_nodes: &StrictGeneNodeMapping,
    profile: &CellLineProfile,
    initial_states: &BTreeMap<String, InitialState>,
    options: &ResolveOptions,
) -> Result<OverrideSet> {
    let mut overrides = OverrideSet::default();

    for node in topology {
        let mut node_override = NodeOverride::default();

        if let Some(refs) = gene_nodes.get(node) {
            node_override.mutation = resolve_mutation(node, refs, profile, options)?;
        }

        if let Some(genes) = strict_gene_nodes.get(node) {
            node_override.rates = resolve_rates(node, genes, profile, options)?;
        }

        if let Some(state) = initial_states.get(node) {
            state.validate(node)?;
            node_override.initial_state = Some(*state);
        }

        if !node_override.is_empty() {
            overrides.nodes.insert(node.clone(), node_override);
        }
    }

    for node in initial_states.keys() {
        if !topology.contains(node) {
            warn!(cell_line = %profile.name, node = %node, "initial state for unknown node ignored");
        }
    }

    debug!(
        cell_line = %profile.name,
        overridden_nodes = overrides.len(),
        "resolved personalization"
    );
    Ok(overrides)
}

fn resolve_mutation(
    node: &str,
    refs: &[GeneRef],
    profile: &CellLineProfile,
    options: &ResolveOptions,
) -> Result<Option<Mutation>> {
    let mut resolved: Option<Mutation> = None;

    for gene_ref in refs {
        let Some(&status) = profile.mutations.get(&gene_ref.gene) else {
            if options.strict_gene_keys {
                return Err(gene_mismatch(&gene_ref.gene, node, profile));
            }
            continue;
        };

        let value = if gene_ref.negated {
            status.inverted()
        } else {
            status
        };

        resolved = Some(match (options.combination, resolved) {
            (GeneCombination::AnyOn, Some(previous)) if previous.is_on() => Mutation::On,
            _ => value,
        });
    }

    Ok(resolved)
}

fn resolve_rates(
    node: &str,
    genes: &[String],
    profile: &CellLineProfile,
    options: &ResolveOptions,
) -> Result<Option<TransitionRates>> {
    let mut resolved = None;

    for gene in genes {
        let Some(&rate) = profile.transition_rates_up.get(gene) else {
            if options.strict_gene_keys {
                return Err(gene_mismatch(gene, node, profile));
            }
            continue;
        };

        let rates = TransitionRates::from_measured(rate).ok_or_else(|| EnsembleError::InvalidRate {
            gene: gene.clone(),
            node: node.to_string(),
            rate,
        })?;
        resolved = Some(rates);
    }

    Ok(resolved)
}

fn gene_mismatch(gene: &str, node: &str, profile: &CellLineProfile) -> EnsembleError {
    EnsembleError::GeneKeyMismatch {
        gene: gene.to_string(),
        node: node.to_string(),
        cell_line: profile.name.clone(),
    }
}
