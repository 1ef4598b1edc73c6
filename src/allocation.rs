// Single-source allocation (C3)
//
// Tracks one source's currently chosen layer and the monotone improvement
// rules that advance it under a shrinking or growing budget.

use crate::constraints::VideoConstraints;
use crate::layer::{EndpointId, LayerDesc, MediaSourceDesc, SourceName};

/// Sentinel meaning "no layer chosen, source is suspended."
pub const SUSPENDED: i64 = -1;

/// Configured quality threshold above which an on-stage source yields
/// budget to tile-view sources.
#[derive(Debug, Clone, Copy)]
pub struct PreferredLayer {
    pub height: u32,
    pub frame_rate: f32,
}

/// Mutable per-source allocation state for one allocation cycle.
#[derive(Debug, Clone)]
pub struct SingleSourceAllocation {
    pub source_name: SourceName,
    pub owner_endpoint_id: EndpointId,
    pub constraints: VideoConstraints,
    pub on_stage: bool,
    /// Candidate layers after filtering by `constraints`, ascending by index.
    layers: Vec<LayerDesc>,
    target_index: i64,
    ideal_index: i64,
    preferred_index: i64,
}

impl SingleSourceAllocation {
    pub fn new(
        source: &MediaSourceDesc,
        constraints: VideoConstraints,
        on_stage: bool,
        preferred: PreferredLayer,
    ) -> Self {
        let layers: Vec<LayerDesc> = source
            .layers
            .iter()
            .copied()
            .filter(|l| constraints.admits(l.height, l.frame_rate))
            .collect();

        let ideal_index = layers.last().map(|l| l.index as i64).unwrap_or(SUSPENDED);

        let preferred_index = layers
            .iter()
            .find(|l| l.height >= preferred.height && l.frame_rate >= preferred.frame_rate)
            .map(|l| l.index as i64)
            .unwrap_or(ideal_index);

        Self {
            source_name: source.source_name.clone(),
            owner_endpoint_id: source.owner_endpoint_id.clone(),
            constraints,
            on_stage,
            layers,
            target_index: SUSPENDED,
            ideal_index,
            preferred_index,
        }
    }

    pub fn ideal_index(&self) -> i64 {
        self.ideal_index
    }

    pub fn target_index(&self) -> i64 {
        self.target_index
    }

    pub fn preferred_index(&self) -> i64 {
        self.preferred_index
    }

    fn layer_at(&self, index: i64) -> Option<&LayerDesc> {
        if index < 0 {
            return None;
        }
        self.layers.iter().find(|l| l.index as i64 == index)
    }

    fn next_candidate(&self) -> Option<&LayerDesc> {
        self.layers.iter().find(|l| l.index as i64 > self.target_index)
    }

    pub fn target_bitrate(&self) -> u32 {
        self.layer_at(self.target_index).map(|l| l.bitrate_bps).unwrap_or(0)
    }

    pub fn ideal_bitrate(&self) -> u32 {
        self.layer_at(self.ideal_index).map(|l| l.bitrate_bps).unwrap_or(0)
    }

    pub fn has_reached_preferred(&self) -> bool {
        self.target_index >= self.preferred_index
    }

    /// A source whose owner is sending video, whose constraints are not
    /// disabled, yet whose target layer is still -1.
    pub fn is_suspended(&self) -> bool {
        !self.layers.is_empty() && self.target_index == SUSPENDED
    }

    /// Attempt to raise `target_index` by one (tile view) or greedily up to
    /// the preferred layer (stage view), within this one call.
    ///
    /// `budget` is the total bitrate available to *this* source for the
    /// whole call — each candidate layer's `bitrate_bps` is its own
    /// replacement cost at that quality, not an increment on top of the
    /// previous layer, so `budget` is never decremented step by step
    /// inside the loop. A caller juggling several sources against a
    /// shared pool (see `allocator::run_greedy_fallback`) is responsible
    /// for passing in only the share of the pool left over for this
    /// source before each call.
    ///
    /// Returns the resulting change in `target_bitrate()` (may exceed
    /// `budget` only in the minimum-viable-video case below).
    pub fn improve(&mut self, budget: i64, stage_view: bool) -> i64 {
        if self.constraints.is_disabled() || self.layers.is_empty() {
            return 0;
        }

        let starting_bitrate = self.target_bitrate() as i64;

        loop {
            let Some(next) = self.next_candidate() else { break };
            let next_index = next.index as i64;
            let next_bitrate = next.bitrate_bps as i64;

            if self.target_index == SUSPENDED && next_bitrate > budget {
                // Minimum-viable video: admit the lowest candidate even if
                // it does not fit, and let the caller observe oversending.
                self.target_index = next_index;
                break;
            }

            if next_bitrate > budget {
                break;
            }

            self.target_index = next_index;

            if !stage_view {
                // Tile view only ever advances one step per call.
                break;
            }
            if self.target_index >= self.preferred_index {
                // Further improvement within this call yields to tile
                // sources; a later call (a later allocator pass) may push
                // this source past its preferred layer.
                break;
            }
        }

        self.target_bitrate() as i64 - starting_bitrate
    }

    /// Apply a predictor-supplied target-index hint, clamped to
    /// `ideal_index`. Falls back to `improve` semantics when the hinted
    /// layer does not fit in `budget`. Hints <= -1 mean "keep suspended."
    pub fn rl_apply(&mut self, target_idx_hint: i64, budget: i64, stage_view: bool) -> i64 {
        if target_idx_hint <= SUSPENDED {
            return 0;
        }

        let hinted = target_idx_hint.min(self.ideal_index);
        if let Some(layer) = self.layer_at(hinted) {
            if layer.bitrate_bps as i64 <= budget {
                let delta = layer.bitrate_bps as i64;
                self.target_index = hinted;
                return delta;
            }
        }

        self.improve(budget, stage_view)
    }
}
