// Allocator configuration.
//
// Loading mirrors the teacher's relay-server `load_config`: start from
// `Default`, then layer a config file's overrides on top if present.

use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Relative change in BWE that triggers re-allocation (spec.md §4.4).
    pub bwe_change_threshold_fraction: f64,
    pub max_time_between_calculations: Duration,
    pub thumbnail_max_height_px: u32,
    pub on_stage_preferred_height_px: u32,
    pub on_stage_preferred_framerate: f32,
    pub on_stage_max_height_px: u32,
    pub predictor_url: Option<String>,
    pub predictor_timeout: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            bwe_change_threshold_fraction: 0.15,
            max_time_between_calculations: Duration::from_secs(5),
            thumbnail_max_height_px: 180,
            on_stage_preferred_height_px: 360,
            on_stage_preferred_framerate: 30.0,
            on_stage_max_height_px: 720,
            predictor_url: None,
            predictor_timeout: Duration::from_millis(50),
        }
    }
}

/// Loads configuration from an optional TOML file, overriding the
/// built-in `Default`. Unknown or missing keys are left at their default.
pub fn load_config(path: Option<&str>) -> Result<AllocatorConfig> {
    let mut cfg = AllocatorConfig::default();

    let Some(path) = path else { return Ok(cfg) };
    if !std::path::Path::new(path).exists() {
        return Ok(cfg);
    }

    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .build()?;

    if let Ok(v) = settings.get_float("bwe_change_threshold_fraction") {
        cfg.bwe_change_threshold_fraction = v;
    }
    if let Ok(v) = settings.get_int("max_time_between_calculations_secs") {
        cfg.max_time_between_calculations = Duration::from_secs(v.max(0) as u64);
    }
    if let Ok(v) = settings.get_int("thumbnail_max_height_px") {
        cfg.thumbnail_max_height_px = v.max(0) as u32;
    }
    if let Ok(v) = settings.get_int("on_stage_preferred_height_px") {
        cfg.on_stage_preferred_height_px = v.max(0) as u32;
    }
    if let Ok(v) = settings.get_float("on_stage_preferred_framerate") {
        cfg.on_stage_preferred_framerate = v as f32;
    }
    if let Ok(v) = settings.get_int("on_stage_max_height_px") {
        cfg.on_stage_max_height_px = v.max(0) as u32;
    }
    if let Ok(v) = settings.get_string("predictor_url") {
        cfg.predictor_url = Some(v);
    }
    if let Ok(v) = settings.get_int("predictor_timeout_ms") {
        cfg.predictor_timeout = Duration::from_millis(v.max(0) as u64);
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_matches_spec() {
        assert_eq!(AllocatorConfig::default().bwe_change_threshold_fraction, 0.15);
    }

    #[test]
    fn missing_file_path_falls_back_to_defaults() {
        let cfg = load_config(Some("/nonexistent/path/allocator.toml")).unwrap();
        assert_eq!(cfg.bwe_change_threshold_fraction, 0.15);
    }

    #[test]
    fn no_path_falls_back_to_defaults() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.thumbnail_max_height_px, 180);
    }
}
