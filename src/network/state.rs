//! Network state representation.
//!
//! A state is the activity of every node. Observable outcomes are state
//! *labels*: the names of the active, non-internal nodes joined by ` -- `,
//! or `<nil>` when none is active.

/// Label of a state with no active observable node.
pub const NIL_LABEL: &str = "<nil>";

/// Separator between node names in a state label.
pub const LABEL_SEPARATOR: &str = " -- ";

/// Activity of every node, indexed like the network's node list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetworkState {
    active: Vec<bool>,
}

impl NetworkState {
    pub fn new(active: Vec<bool>) -> Self {
        Self { active }
    }

    #[inline]
    pub fn is_active(&self, idx: usize) -> bool {
        self.active[idx]
    }

    #[inline]
    pub fn flip(&mut self, idx: usize) {
        self.active[idx] = !self.active[idx];
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.active
    }

    /// Observable label of this state.
    ///
    /// `names` and `observable` are indexed like the state.
    pub fn label(&self, names: &[String], observable: &[bool]) -> String {
        let parts: Vec<&str> = self
            .active
            .iter()
            .enumerate()
            .filter(|&(idx, &active)| active && observable[idx])
            .map(|(idx, _)| names[idx].as_str())
            .collect();

        if parts.is_empty() {
            NIL_LABEL.to_string()
        } else {
            parts.join(LABEL_SEPARATOR)
        }
    }
}
