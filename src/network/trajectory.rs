//! Per-trajectory records and their aggregation into label distributions.

use std::collections::{BTreeMap, HashMap};

use super::state::NetworkState;
use crate::model::TimePoint;

/// What one Gillespie trajectory left behind.
#[derive(Clone, Debug)]
pub struct TrajectorySample {
    /// State at every recording tick (tick `k` is time `k * time_tick`).
    pub ticks: Vec<NetworkState>,
    /// State when the trajectory stopped.
    pub final_state: NetworkState,
    /// Number of node flips.
    pub n_transitions: u32,
    /// Time of the last node flip.
    pub last_event_time: f64,
}

impl TrajectorySample {
    pub fn new(initial: NetworkState) -> Self {
        Self {
            ticks: Vec::new(),
            final_state: initial,
            n_transitions: 0,
            last_event_time: 0.0,
        }
    }
}

/// Trajectories of one model run, with the labelling needed to summarize them.
#[derive(Clone, Debug)]
pub struct TrajectoryCollection<'a> {
    pub samples: Vec<TrajectorySample>,
    names: &'a [String],
    observable: &'a [bool],
}

impl<'a> TrajectoryCollection<'a> {
    pub fn new(samples: Vec<TrajectorySample>, names: &'a [String], observable: &'a [bool]) -> Self {
        Self {
            samples,
            names,
            observable,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Empirical distribution of final-state labels.
    pub fn final_state_distribution(&self) -> BTreeMap<String, f64> {
        self.label_distribution(self.samples.iter().map(|s| &s.final_state))
    }

    /// Empirical label distribution at every recording tick.
    pub fn time_course(&self, time_tick: f64) -> Vec<TimePoint> {
        let n_ticks = self.samples.iter().map(|s| s.ticks.len()).min().unwrap_or(0);
        (0..n_ticks)
            .map(|k| TimePoint {
                time: k as f64 * time_tick,
                distribution: self.label_distribution(self.samples.iter().map(|s| &s.ticks[k])),
            })
            .collect()
    }

    /// Mean number of transitions per trajectory.
    pub fn mean_transitions(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|s| s.n_transitions as u64).sum();
        total as f64 / self.samples.len() as f64
    }

    fn label_distribution<'s, I>(&self, states: I) -> BTreeMap<String, f64>
    where
        I: Iterator<Item = &'s NetworkState>,
    {
        // Count full states first; several states can share one label.
        let mut state_counts: HashMap<&NetworkState, usize> = HashMap::new();
        let mut total = 0usize;
        for state in states {
            *state_counts.entry(state).or_insert(0) += 1;
            total += 1;
        }

        let mut label_counts: BTreeMap<String, usize> = BTreeMap::new();
        for (state, count) in state_counts {
            *label_counts
                .entry(state.label(self.names, self.observable))
                .or_insert(0) += count;
        }

        label_counts
            .into_iter()
            .map(|(label, count)| (label, count as f64 / total as f64))
            .collect()
    }
}
