// Effective-constraints deriver (C5)
//
// Collapses receiver constraints and last-N policy into per-source caps.
// `sources` must already be in priority order (see `prioritizer`).

use std::collections::HashMap;

use crate::constraints::VideoConstraints;
use crate::layer::{MediaSourceDesc, SourceName};
use crate::settings::AllocationSettings;

/// Additional policy knobs layered on top of the receiver's own
/// constraints. `on_stage_max_height_px` is a floor: on-stage sources get
/// at least this height. `thumbnail_max_height_px` is a ceiling applied to
/// everything that is neither on-stage nor explicitly selected, so tile
/// thumbnails never negotiate a layer larger than they will ever render.
#[derive(Debug, Clone, Copy)]
pub struct OnStagePolicy {
    pub on_stage_max_height_px: u32,
    pub thumbnail_max_height_px: u32,
}

/// Derives the effective constraint for every source in `sources` (already
/// priority-ordered). Sources outside the caller's `last_n` window are
/// disabled unless they are on-stage or explicitly selected.
pub fn derive_effective_constraints(
    sources: &[MediaSourceDesc],
    settings: &AllocationSettings,
    on_stage_policy: OnStagePolicy,
) -> HashMap<SourceName, VideoConstraints> {
    let limit = settings.last_n.limit();
    let mut result = HashMap::with_capacity(sources.len());

    for (rank, source) in sources.iter().enumerate() {
        let is_on_stage = settings.is_on_stage(&source.source_name);
        let is_selected = settings
            .selected_sources
            .iter()
            .any(|s| s == &source.source_name)
            || is_on_stage;

        let outside_last_n = match limit {
            Some(n) => rank >= n && !is_on_stage && !is_selected,
            None => false,
        };

        let constraint = if outside_last_n {
            VideoConstraints::disabled()
        } else {
            let mut c = settings.constraints_for(&source.source_name);
            if is_on_stage && !c.is_disabled() {
                c.max_height = c.max_height.max(on_stage_policy.on_stage_max_height_px);
            } else if !is_selected && !c.is_disabled() {
                c.max_height = c.max_height.min(on_stage_policy.thumbnail_max_height_px);
            }
            c
        };

        result.insert(source.source_name.clone(), constraint);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerDesc;
    use crate::settings::LastN;

    fn source(name: &str) -> MediaSourceDesc {
        MediaSourceDesc::new(
            name,
            "ep",
            vec![LayerDesc { index: 0, temporal_id: 0, spatial_id: 0, height: 180, frame_rate: 15.0, bitrate_bps: 150_000 }],
        )
    }

    /// A policy that neither bumps nor caps, for tests unrelated to either knob.
    fn no_op_policy() -> OnStagePolicy {
        OnStagePolicy { on_stage_max_height_px: 0, thumbnail_max_height_px: 1080 }
    }

    #[test]
    fn outside_last_n_is_disabled() {
        let sources = vec![source("a"), source("b"), source("c")];
        let settings = AllocationSettings {
            last_n: LastN::Bounded(2),
            default_constraints: VideoConstraints::new(720, 30.0),
            ..Default::default()
        };
        let result = derive_effective_constraints(&sources, &settings, no_op_policy());
        assert!(!result[&SourceName::new("a")].is_disabled());
        assert!(!result[&SourceName::new("b")].is_disabled());
        assert!(result[&SourceName::new("c")].is_disabled());
    }

    #[test]
    fn on_stage_sources_exempt_from_last_n() {
        let sources = vec![source("a"), source("b"), source("c")];
        let settings = AllocationSettings {
            last_n: LastN::Bounded(1),
            on_stage_sources: vec!["c".into()],
            default_constraints: VideoConstraints::new(720, 30.0),
            ..Default::default()
        };
        let result = derive_effective_constraints(&sources, &settings, no_op_policy());
        assert!(!result[&SourceName::new("c")].is_disabled());
    }

    #[test]
    fn on_stage_bumps_max_height() {
        let sources = vec![source("a")];
        let settings = AllocationSettings {
            on_stage_sources: vec!["a".into()],
            default_constraints: VideoConstraints::new(180, 15.0),
            ..Default::default()
        };
        let policy = OnStagePolicy { on_stage_max_height_px: 360, thumbnail_max_height_px: 1080 };
        let result = derive_effective_constraints(&sources, &settings, policy);
        assert_eq!(result[&SourceName::new("a")].max_height, 360);
    }

    #[test]
    fn non_selected_sources_are_capped_to_thumbnail_height() {
        let sources = vec![source("a")];
        let settings = AllocationSettings { default_constraints: VideoConstraints::new(720, 30.0), ..Default::default() };
        let policy = OnStagePolicy { on_stage_max_height_px: 0, thumbnail_max_height_px: 180 };
        let result = derive_effective_constraints(&sources, &settings, policy);
        assert_eq!(result[&SourceName::new("a")].max_height, 180);
    }

    #[test]
    fn selected_but_not_on_stage_sources_are_exempt_from_thumbnail_cap() {
        let sources = vec![source("a")];
        let settings = AllocationSettings {
            selected_sources: vec!["a".into()],
            default_constraints: VideoConstraints::new(720, 30.0),
            ..Default::default()
        };
        let policy = OnStagePolicy { on_stage_max_height_px: 0, thumbnail_max_height_px: 180 };
        let result = derive_effective_constraints(&sources, &settings, policy);
        assert_eq!(result[&SourceName::new("a")].max_height, 720);
    }

    #[test]
    fn unbounded_last_n_never_disables() {
        let sources = vec![source("a"), source("b")];
        let settings = AllocationSettings {
            last_n: LastN::Unbounded,
            default_constraints: VideoConstraints::new(720, 30.0),
            ..Default::default()
        };
        let result = derive_effective_constraints(&sources, &settings, no_op_policy());
        assert!(!result[&SourceName::new("a")].is_disabled());
        assert!(!result[&SourceName::new("b")].is_disabled());
    }
}
