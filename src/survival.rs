//! Survival and proliferation metrics over final-state distributions.
//!
//! A state label counts as death if it contains the apoptosis or the
//! mitotic-catastrophe marker, and as proliferation if it contains the
//! proliferation marker and no death marker.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matrix::PairFailure;

/// Substrings identifying outcome nodes in state labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeMarkers {
    pub apoptosis: String,
    pub mitotic_catastrophe: String,
    pub proliferation: String,
}

impl Default for OutcomeMarkers {
    fn default() -> Self {
        Self {
            apoptosis: "Apoptosis".to_string(),
            mitotic_catastrophe: "Mitotic".to_string(),
            proliferation: "Prolif".to_string(),
        }
    }
}

impl OutcomeMarkers {
    pub fn is_death(&self, label: &str) -> bool {
        label.contains(&self.apoptosis) || label.contains(&self.mitotic_catastrophe)
    }

    pub fn is_proliferation(&self, label: &str) -> bool {
        !self.is_death(label) && label.contains(&self.proliferation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurvivalMetrics {
    pub death_probability: f64,
    pub proliferation_probability: f64,
    pub survival_rate: f64,
}

/// Compute survival metrics from a final-state distribution.
pub fn survival_metrics(distribution: &BTreeMap<String, f64>, markers: &OutcomeMarkers) -> SurvivalMetrics {
    let mut death = 0.0;
    let mut proliferation = 0.0;
    for (label, &mass) in distribution {
        if markers.is_death(label) {
            death += mass;
        } else if markers.is_proliferation(label) {
            proliferation += mass;
        }
    }

    SurvivalMetrics {
        death_probability: death,
        proliferation_probability: proliferation,
        survival_rate: 1.0 - death,
    }
}

/// One row of the survival table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SurvivalRow {
    /// `condition_cellLine`.
    pub label: String,
    #[serde(skip)]
    pub condition: String,
    #[serde(skip)]
    pub cell_line: String,
    #[serde(rename = "proliferation_rates")]
    pub proliferation_rate: f64,
    #[serde(rename = "survival_rates")]
    pub survival_rate: f64,
}

impl SurvivalRow {
    pub fn new(condition: &str, cell_line: &str, metrics: SurvivalMetrics) -> Self {
        Self {
            label: format!("{}_{}", condition, cell_line),
            condition: condition.to_string(),
            cell_line: cell_line.to_string(),
            proliferation_rate: metrics.proliferation_probability,
            survival_rate: metrics.survival_rate,
        }
    }
}

/// Survival table, rows in selection order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurvivalTable {
    rows: Vec<SurvivalRow>,
}

impl SurvivalTable {
    pub const COLUMNS: [&'static str; 2] = ["proliferation_rates", "survival_rates"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: SurvivalRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[SurvivalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row by `condition_cellLine` label.
    pub fn get(&self, label: &str) -> Option<&SurvivalRow> {
        self.rows.iter().find(|row| row.label == label)
    }

    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.label.as_str()).collect()
    }

    /// Write the table as CSV: `label,proliferation_rates,survival_rates`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            writer.serialize(row)?;
        }
        if self.rows.is_empty() {
            writer.write_record(["label", Self::COLUMNS[0], Self::COLUMNS[1]])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }

    /// Values as an `n_rows x 2` array, columns in [`Self::COLUMNS`] order.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), 2), |(i, j)| {
            let row = &self.rows[i];
            if j == 0 {
                row.proliferation_rate
            } else {
                row.survival_rate
            }
        })
    }
}

/// Survival table plus the pairs that could not be aggregated.
#[derive(Debug, Default)]
pub struct SurvivalReport {
    pub table: SurvivalTable,
    pub failures: Vec<PairFailure>,
}

impl SurvivalReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
