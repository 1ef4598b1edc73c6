// Allocation settings, as received from the receiver's signaling layer.
//
// Decoding these from the wire signaling protocol is out of scope here;
// the upstream signaling layer is expected to build this type directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constraints::VideoConstraints;
use crate::layer::SourceName;

/// Receiver-side policy limiting how many sources are simultaneously
/// forwarded. `Unbounded` disables last-N filtering entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastN {
    Unbounded,
    Bounded(usize),
}

impl LastN {
    pub fn limit(&self) -> Option<usize> {
        match self {
            LastN::Unbounded => None,
            LastN::Bounded(n) => Some(*n),
        }
    }
}

impl Default for LastN {
    fn default() -> Self {
        LastN::Unbounded
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Sources the receiver currently displays at primary resolution, in
    /// receiver-specified order.
    pub on_stage_sources: Vec<SourceName>,
    /// Other sources the receiver has explicitly selected, in
    /// receiver-specified order.
    pub selected_sources: Vec<SourceName>,
    pub default_constraints: VideoConstraints,
    pub per_source_constraints: HashMap<SourceName, VideoConstraints>,
    pub last_n: LastN,
}

impl AllocationSettings {
    /// on-stage sources first, then other selected sources, de-duplicated
    /// against on-stage, both halves preserving receiver-specified order.
    /// This spec always puts on-stage first regardless of how the
    /// receiver interleaved the two lists (spec.md §9, Open Question 2).
    pub fn selected_in_priority_order(&self) -> Vec<SourceName> {
        let mut seen = std::collections::HashSet::with_capacity(
            self.on_stage_sources.len() + self.selected_sources.len(),
        );
        let mut ordered = Vec::with_capacity(self.on_stage_sources.len() + self.selected_sources.len());

        for name in &self.on_stage_sources {
            if seen.insert(name.clone()) {
                ordered.push(name.clone());
            }
        }
        for name in &self.selected_sources {
            if seen.insert(name.clone()) {
                ordered.push(name.clone());
            }
        }
        ordered
    }

    pub fn is_on_stage(&self, source: &SourceName) -> bool {
        self.on_stage_sources.iter().any(|s| s == source)
    }

    pub fn constraints_for(&self, source: &SourceName) -> VideoConstraints {
        self.per_source_constraints
            .get(source)
            .copied()
            .unwrap_or(self.default_constraints)
    }
}
