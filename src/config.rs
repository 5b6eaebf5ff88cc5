//! Ensemble configuration.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```json
//! { "gene_combination": "any_on", "parallel": true, "simulation_timeout_secs": 120 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::personalize::{GeneCombination, ResolveOptions};
use crate::survival::OutcomeMarkers;

/// Configuration for an experiment matrix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// How several genes mapped to one node combine.
    pub gene_combination: GeneCombination,
    /// Fail instead of skipping when a mapped gene is missing from a profile.
    pub strict_gene_keys: bool,
    /// Simulate selected pairs concurrently.
    pub parallel: bool,
    /// Time budget for one engine call.
    pub simulation_timeout_secs: Option<f64>,
    /// Label markers used by survival aggregation.
    pub markers: OutcomeMarkers,
}

impl EnsembleConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Engine time budget; non-positive or non-finite values mean no limit.
    pub fn simulation_timeout(&self) -> Option<Duration> {
        self.simulation_timeout_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            combination: self.gene_combination,
            strict_gene_keys: self.strict_gene_keys,
        }
    }
}
