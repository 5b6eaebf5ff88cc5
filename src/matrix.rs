//! Experiment matrix: condition x cell line -> personalized model.
//!
//! The matrix owns one [`PersonalizedModel`] per (condition, cell line) pair.
//! Condition `base` holds the unmodified cell lines and always comes first;
//! other conditions add uniform node mutations on top of each cell line.
//!
//! Simulation is memoized: an entry that already holds a result is skipped
//! unless recomputation is forced. Batch operations never stop on a single
//! pair's failure; they report it next to the pairs that succeeded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::EnsembleConfig;
use crate::entry::{LifecycleState, PersonalizedModel};
use crate::error::{Axis, EnsembleError, Result};
use crate::model::{Mutation, NetworkModel, RunControl};
use crate::personalize::{CellLineProfile, GeneMappings};
use crate::render::{Panel, Renderer};
use crate::survival::{survival_metrics, SurvivalReport, SurvivalRow};

/// Name of the reserved condition holding the unmodified cell lines.
pub const BASE_CONDITION: &str = "base";

/// Selector over one axis of the matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    All,
    Keys(Vec<String>),
}

impl From<&str> for Selection {
    fn from(key: &str) -> Self {
        if key == "all" {
            Selection::All
        } else {
            Selection::Keys(vec![key.to_string()])
        }
    }
}

impl From<String> for Selection {
    fn from(key: String) -> Self {
        Selection::from(key.as_str())
    }
}

impl From<Vec<String>> for Selection {
    fn from(keys: Vec<String>) -> Self {
        Selection::Keys(keys)
    }
}

impl From<&[&str]> for Selection {
    fn from(keys: &[&str]) -> Self {
        Selection::Keys(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(keys: [&str; N]) -> Self {
        Selection::from(&keys[..])
    }
}

impl From<Option<Vec<String>>> for Selection {
    fn from(keys: Option<Vec<String>>) -> Self {
        keys.map_or(Selection::All, Selection::Keys)
    }
}

/// Whether `add_condition` created a new condition or replaced one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionChange {
    Created,
    Replaced,
}

impl std::fmt::Display for ConditionChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionChange::Created => write!(f, "created"),
            ConditionChange::Replaced => write!(f, "replaced"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Recompute entries that already hold a result.
    pub force_recompute: bool,
    /// Suppress progress and skip notices.
    pub quiet: bool,
}

/// Failure of a single (condition, cell line) pair inside a batch.
#[derive(Debug)]
pub struct PairFailure {
    pub condition: String,
    pub cell_line: String,
    pub error: EnsembleError,
}

impl std::fmt::Display for PairFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}: {}", self.cell_line, self.condition, self.error)
    }
}

/// What a batch operation achieved, pair by pair.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub completed: Vec<T>,
    pub failures: Vec<PairFailure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A pair visited by `run_simulations`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub condition: String,
    pub cell_line: String,
    /// The entry already held a result and was left alone.
    pub skipped: bool,
}

/// Cell lines currently personalized, per condition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub conditions: Vec<(String, Vec<(String, LifecycleState)>)>,
}

impl Summary {
    /// Personalized (or simulated) cell lines of one condition.
    pub fn personalized(&self, condition: &str) -> Vec<&str> {
        self.conditions
            .iter()
            .filter(|(name, _)| name == condition)
            .flat_map(|(_, cells)| cells.iter())
            .filter(|(_, state)| *state != LifecycleState::Unpersonalized)
            .map(|(cell, _)| cell.as_str())
            .collect()
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (condition, cells) in &self.conditions {
            let cells: Vec<String> = cells
                .iter()
                .map(|(cell, state)| match state {
                    LifecycleState::Unpersonalized => cell.clone(),
                    state => format!("{}, {}", cell, state),
                })
                .collect();
            writeln!(f, "{}: {}", condition, cells.join(" / "))?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum PlotKind {
    PieChart,
    Trajectory,
}

struct Condition<M> {
    name: String,
    mutations: Vec<(String, Mutation)>,
    /// One entry per cell line, in cell-line order.
    entries: Vec<PersonalizedModel<M>>,
}

/// The experiment matrix.
pub struct ExperimentMatrix<M: NetworkModel> {
    baseline: Arc<M>,
    revision: u64,
    /// Cell lines in key order: (matrix key, profile).
    cell_lines: Vec<(String, Arc<CellLineProfile>)>,
    mappings: Arc<GeneMappings>,
    conditions: Vec<Condition<M>>,
    config: EnsembleConfig,
    control: RunControl,
}

impl<M: NetworkModel> ExperimentMatrix<M> {
    /// Build the matrix with its `base` condition, personalizing every cell line.
    ///
    /// Cell lines are identified by their map key. A profile with an empty
    /// name takes its key.
    pub fn new(
        baseline: M,
        profiles: BTreeMap<String, CellLineProfile>,
        mappings: GeneMappings,
        config: EnsembleConfig,
    ) -> Result<Self> {
        let cell_lines = profiles
            .into_iter()
            .map(|(key, mut profile)| {
                if profile.name.is_empty() {
                    profile.name = key.clone();
                }
                (key, Arc::new(profile))
            })
            .collect();

        let mut matrix = Self {
            baseline: Arc::new(baseline),
            revision: 0,
            cell_lines,
            mappings: Arc::new(mappings),
            conditions: Vec::new(),
            config,
            control: RunControl::new(),
        };

        let base =
            matrix.build_condition(&matrix.baseline, matrix.revision, BASE_CONDITION, Vec::new())?;
        matrix.conditions.push(base);
        info!(
            cell_lines = matrix.cell_lines.len(),
            "experiment matrix created"
        );
        Ok(matrix)
    }

    /// Add a condition applying `mutations` to every cell line.
    ///
    /// An existing condition with the same name is replaced in place.
    pub fn add_condition<I, S>(&mut self, name: &str, mutations: I) -> Result<ConditionChange>
    where
        I: IntoIterator<Item = (S, Mutation)>,
        S: Into<String>,
    {
        if name == BASE_CONDITION {
            return Err(EnsembleError::ReservedCondition(name.to_string()));
        }

        let mutations: Vec<(String, Mutation)> =
            mutations.into_iter().map(|(node, m)| (node.into(), m)).collect();
        info!(
            condition = %name,
            mutations = mutations.len(),
            "adding condition"
        );

        let condition = self.build_condition(&self.baseline, self.revision, name, mutations)?;
        match self.conditions.iter_mut().find(|c| c.name == name) {
            Some(existing) => {
                *existing = condition;
                Ok(ConditionChange::Replaced)
            }
            None => {
                self.conditions.push(condition);
                Ok(ConditionChange::Created)
            }
        }
    }

    /// Re-personalize every entry, optionally against a new baseline.
    ///
    /// Keys are unchanged, results are cleared and condition mutations are
    /// re-applied on top of the new personalization.
    ///
    /// Every entry is rebuilt before anything is replaced: on error the
    /// matrix, its baseline and its revision are left as they were.
    pub fn rebase(&mut self, new_baseline: Option<M>) -> Result<()> {
        let (baseline, revision) = match new_baseline {
            Some(baseline) => (Arc::new(baseline), self.revision + 1),
            None => (Arc::clone(&self.baseline), self.revision),
        };

        let conditions = self
            .conditions
            .iter()
            .map(|condition| {
                self.build_condition(&baseline, revision, &condition.name, condition.mutations.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        self.baseline = baseline;
        self.revision = revision;
        self.conditions = conditions;
        info!(revision, "matrix rebased");
        Ok(())
    }

    /// Simulate the selected pairs, skipping entries that already hold a
    /// result unless `options.force_recompute` is set.
    pub fn run_simulations(
        &mut self,
        cell_lines: impl Into<Selection>,
        conditions: impl Into<Selection>,
        options: RunOptions,
    ) -> Result<BatchReport<SimulationOutcome>> {
        let pairs = self.select_pairs(&conditions.into(), &cell_lines.into())?;
        let timeout = self.config.simulation_timeout();
        let control = &self.control;

        let mut slots: HashMap<(usize, usize), &mut PersonalizedModel<M>> = self
            .conditions
            .iter_mut()
            .enumerate()
            .flat_map(|(ci, condition)| {
                condition
                    .entries
                    .iter_mut()
                    .enumerate()
                    .map(move |(li, entry)| ((ci, li), entry))
            })
            .collect();
        let selected: Vec<&mut PersonalizedModel<M>> =
            pairs.iter().filter_map(|pair| slots.remove(pair)).collect();

        let run = |entry: &mut PersonalizedModel<M>| {
            simulate_entry(entry, &control.scoped(timeout), options)
        };
        let outcomes: Vec<std::result::Result<SimulationOutcome, PairFailure>> = if self.config.parallel {
            selected.into_par_iter().map(run).collect()
        } else {
            selected.into_iter().map(run).collect()
        };

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(done) => report.completed.push(done),
                Err(failure) => report.failures.push(failure),
            }
        }
        if !report.failures.is_empty() {
            warn!(
                failed = report.failures.len(),
                completed = report.completed.len(),
                "simulation batch finished with failures"
            );
        }
        Ok(report)
    }

    /// Survival and proliferation rates of the selected pairs.
    ///
    /// Pairs without a result are reported as failures, not as zeros.
    pub fn compare_survival(
        &self,
        cell_lines: impl Into<Selection>,
        conditions: impl Into<Selection>,
    ) -> Result<SurvivalReport> {
        let pairs = self.select_pairs(&conditions.into(), &cell_lines.into())?;

        let mut report = SurvivalReport::default();
        for (ci, li) in pairs {
            let entry = &self.conditions[ci].entries[li];
            match entry.require_result() {
                Ok(result) => {
                    let metrics = survival_metrics(result.last_state_distribution(), &self.config.markers);
                    report
                        .table
                        .push(SurvivalRow::new(entry.condition(), entry.cell_line(), metrics));
                }
                Err(error) => report.failures.push(failure(entry, error)),
            }
        }
        Ok(report)
    }

    /// Draw final-state pie charts of the selected pairs.
    pub fn plot_piechart<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        cell_lines: impl Into<Selection>,
        conditions: impl Into<Selection>,
    ) -> Result<BatchReport<Panel>> {
        self.plot(renderer, &cell_lines.into(), &conditions.into(), PlotKind::PieChart)
    }

    /// Draw probability trajectories of the selected pairs.
    pub fn plot_trajectory<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        cell_lines: impl Into<Selection>,
        conditions: impl Into<Selection>,
    ) -> Result<BatchReport<Panel>> {
        self.plot(renderer, &cell_lines.into(), &conditions.into(), PlotKind::Trajectory)
    }

    fn plot<R: Renderer + ?Sized>(
        &self,
        renderer: &mut R,
        cell_lines: &Selection,
        conditions: &Selection,
        kind: PlotKind,
    ) -> Result<BatchReport<Panel>> {
        let conds = self.select(Axis::Condition, conditions)?;
        let cells = self.select(Axis::CellLine, cell_lines)?;

        // Several conditions: one figure per cell line, one panel per condition.
        let figures: Vec<Vec<(usize, usize)>> = if conds.len() > 1 {
            cells
                .iter()
                .map(|&li| conds.iter().map(|&ci| (ci, li)).collect())
                .collect()
        } else {
            conds
                .iter()
                .flat_map(|&ci| cells.iter().map(move |&li| vec![(ci, li)]))
                .collect()
        };

        let mut report = BatchReport::default();
        for figure in figures {
            renderer.begin_figure(figure.len())?;
            for (column, (ci, li)) in figure.iter().copied().enumerate() {
                let entry = &self.conditions[ci].entries[li];
                let panel = Panel::new(entry.condition(), entry.cell_line(), column, figure.len());
                let drawn = entry.require_result().and_then(|result| match kind {
                    PlotKind::PieChart => renderer.pie_chart(&panel, result),
                    PlotKind::Trajectory => renderer.trajectory(&panel, result),
                });
                match drawn {
                    Ok(()) => report.completed.push(panel),
                    Err(error) => {
                        warn!(
                            condition = %entry.condition(),
                            cell_line = %entry.cell_line(),
                            error = %error,
                            "panel not drawn"
                        );
                        report.failures.push(failure(entry, error));
                    }
                }
            }
        }
        Ok(report)
    }

    /// Lifecycle state of every entry, per condition.
    pub fn summary(&self) -> Summary {
        Summary {
            conditions: self
                .conditions
                .iter()
                .map(|condition| {
                    let cells = condition
                        .entries
                        .iter()
                        .map(|entry| (entry.cell_line().to_string(), entry.status()))
                        .collect();
                    (condition.name.clone(), cells)
                })
                .collect(),
        }
    }

    pub fn entry(&self, condition: &str, cell_line: &str) -> Result<&PersonalizedModel<M>> {
        let ci = self.index_of(Axis::Condition, condition)?;
        let li = self.index_of(Axis::CellLine, cell_line)?;
        Ok(&self.conditions[ci].entries[li])
    }

    /// Condition names, `base` first, then in insertion order.
    pub fn condition_names(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn cell_line_names(&self) -> Vec<&str> {
        self.cell_lines.iter().map(|(key, _)| key.as_str()).collect()
    }

    pub fn condition_mutations(&self, condition: &str) -> Result<&[(String, Mutation)]> {
        let ci = self.index_of(Axis::Condition, condition)?;
        Ok(&self.conditions[ci].mutations)
    }

    pub fn baseline(&self) -> &M {
        &self.baseline
    }

    /// Number of times the baseline has been replaced.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Handle that cancels running and future simulations until reset.
    pub fn cancel_handle(&self) -> RunControl {
        self.control.clone()
    }

    /// Fresh, personalized entries of one condition for every cell line.
    fn build_condition(
        &self,
        baseline: &M,
        revision: u64,
        name: &str,
        mutations: Vec<(String, Mutation)>,
    ) -> Result<Condition<M>> {
        let options = self.config.resolve_options();
        let entries = self
            .cell_lines
            .iter()
            .map(|(key, profile)| {
                let mut entry: PersonalizedModel<M> = PersonalizedModel::new(
                    name,
                    key,
                    Arc::clone(profile),
                    Arc::clone(&self.mappings),
                    mutations.clone(),
                );
                entry.personalize(baseline, revision, &options)?;
                Ok(entry)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Condition {
            name: name.to_string(),
            mutations,
            entries,
        })
    }

    fn index_of(&self, axis: Axis, key: &str) -> Result<usize> {
        let found = match axis {
            Axis::Condition => self.conditions.iter().position(|c| c.name == key),
            Axis::CellLine => self.cell_lines.iter().position(|(name, _)| name == key),
        };
        found.ok_or_else(|| EnsembleError::UnknownSelection {
            axis,
            name: key.to_string(),
        })
    }

    /// Expand a selection to indices, keeping its order and dropping repeats.
    fn select(&self, axis: Axis, selection: &Selection) -> Result<Vec<usize>> {
        match selection {
            Selection::All => Ok(match axis {
                Axis::Condition => (0..self.conditions.len()).collect(),
                Axis::CellLine => (0..self.cell_lines.len()).collect(),
            }),
            Selection::Keys(keys) => {
                let mut indices = Vec::with_capacity(keys.len());
                for key in keys {
                    let idx = self.index_of(axis, key)?;
                    if !indices.contains(&idx) {
                        indices.push(idx);
                    }
                }
                Ok(indices)
            }
        }
    }

    /// Selected (condition, cell line) index pairs, condition-major.
    fn select_pairs(&self, conditions: &Selection, cell_lines: &Selection) -> Result<Vec<(usize, usize)>> {
        let conds = self.select(Axis::Condition, conditions)?;
        let cells = self.select(Axis::CellLine, cell_lines)?;
        Ok(conds
            .iter()
            .flat_map(|&ci| cells.iter().map(move |&li| (ci, li)))
            .collect())
    }
}

impl<M: NetworkModel> std::fmt::Display for ExperimentMatrix<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "conditions : {:?}", self.condition_names())?;
        write!(f, "cell lines : {:?}", self.cell_line_names())
    }
}

fn failure<M: NetworkModel>(entry: &PersonalizedModel<M>, error: EnsembleError) -> PairFailure {
    PairFailure {
        condition: entry.condition().to_string(),
        cell_line: entry.cell_line().to_string(),
        error,
    }
}

fn simulate_entry<M: NetworkModel>(
    entry: &mut PersonalizedModel<M>,
    control: &RunControl,
    options: RunOptions,
) -> std::result::Result<SimulationOutcome, PairFailure> {
    let outcome = |skipped| SimulationOutcome {
        condition: entry.condition().to_string(),
        cell_line: entry.cell_line().to_string(),
        skipped,
    };

    if !options.force_recompute && entry.status() == LifecycleState::Simulated {
        if !options.quiet {
            info!(
                condition = %entry.condition(),
                cell_line = %entry.cell_line(),
                "result present, not recomputing"
            );
        }
        return Ok(outcome(true));
    }

    if !options.quiet {
        info!(
            condition = %entry.condition(),
            cell_line = %entry.cell_line(),
            "simulating"
        );
    }
    let done = outcome(false);
    match entry.simulate(control) {
        Ok(_) => Ok(done),
        Err(error) => {
            warn!(
                condition = %entry.condition(),
                cell_line = %entry.cell_line(),
                error = %error,
                "simulation failed"
            );
            Err(failure(entry, error))
        }
    }
}
