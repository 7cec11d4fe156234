use log::{debug, info, warn};
use std::fs;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::systems::{calibration::CalibrationLayout, mapping::ModelKind};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GazeConfig {
    // -------- SCREEN
    pub screen_width: u32,
    pub screen_height: u32,

    // -------- FEATURE SETTINGS
    /// Openness below this marks the eye as closed; such frames are never mapped
    pub min_openness: f32,

    /// How many recent iris positions to take the median of (1 disables)
    pub feature_median_window: usize,

    /// Max change per frame in normalised units (1.0 disables)
    pub feature_max_step: f32,

    // -------- CALIBRATION SETTINGS
    pub calibration_layout: CalibrationLayout,

    /// How far (as a fraction of screen size) to bring the outer targets inward
    pub calibration_margin_ratio: f32,

    pub samples_per_target: usize,

    /// Fewest distinct targets that training will accept
    pub min_distinct_targets: usize,

    /// Fewest samples each target needs before training will accept it
    pub min_samples_per_target: usize,

    // -------- MODEL SETTINGS
    pub model_kind: ModelKind,

    /// Drop this percentage of worst-fitting samples and refit (0 disables)
    pub robust_drop_percent: f32,

    pub network_hidden_layers: Vec<usize>,
    pub network_max_iterations: usize,
    pub network_learning_rate: f64,
    pub network_seed: u64,

    // -------- SMOOTHING SETTINGS
    /// EMA factor in (0,1]; 1.0 is immediate, i.e. no smoothing
    pub smoothing_alpha: f32,

    /// Rolling window of confirmed fixation errors used for drift correction
    pub drift_window: usize,

    /// Mean drift must exceed this fraction of screen width before the offset moves
    pub drift_threshold_ratio: f32,

    /// How much of the mean drift error to fold into the offset per correction
    pub drift_learn_rate: f32,

    /// The offset is never allowed to grow beyond this many pixels
    pub drift_max_offset_px: f32,

    /// Skip cursor moves smaller than this (pixels)
    pub move_deadzone_px: f32,

    /// A pause between usable frames longer than this restarts the smoother,
    /// dwell and blink state (0 disables)
    pub max_frame_gap_ms: u64,

    // -------- CLICK SETTINGS
    pub dwell_click_enabled: bool,
    pub dwell_threshold_ms: u64,
    pub dwell_radius_px: u32,

    /// Click on a long blink instead of dwelling; cannot be combined with dwell clicks
    pub blink_click_enabled: bool,
    pub blink_close_threshold: f32,
    pub blink_open_threshold: f32,
    pub blink_min_ms: u64,
    pub blink_long_ms: u64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        GazeConfig {
            screen_width: 1920,
            screen_height: 1080,
            min_openness: 0.15,
            feature_median_window: 5,
            feature_max_step: 0.12,
            calibration_layout: CalibrationLayout::FivePoint,
            calibration_margin_ratio: 0.08,
            samples_per_target: 25,
            min_distinct_targets: 2,
            min_samples_per_target: 3,
            model_kind: ModelKind::Polynomial,
            robust_drop_percent: 15.,
            network_hidden_layers: vec![32, 32],
            network_max_iterations: 800,
            network_learning_rate: 0.01,
            network_seed: 42,
            smoothing_alpha: 0.25,
            drift_window: 60,
            drift_threshold_ratio: 0.08,
            drift_learn_rate: 0.01,
            drift_max_offset_px: 120.,
            move_deadzone_px: 1.5,
            max_frame_gap_ms: 250,
            dwell_click_enabled: false,
            dwell_threshold_ms: 600,
            dwell_radius_px: 25,
            blink_click_enabled: false,
            blink_close_threshold: 0.21,
            blink_open_threshold: 0.25,
            blink_min_ms: 50,
            blink_long_ms: 300,
        }
    }
}

impl GazeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_alpha > 0. && self.smoothing_alpha <= 1.) {
            return Err(anyhow!(
                "smoothingAlpha must be in (0,1], got {}",
                self.smoothing_alpha
            ));
        }
        if self.samples_per_target == 0 {
            return Err(anyhow!("samplesPerTarget must be at least 1"));
        }
        if self.samples_per_target < self.min_samples_per_target {
            return Err(anyhow!(
                "samplesPerTarget ({}) is below minSamplesPerTarget ({}); training could never succeed",
                self.samples_per_target,
                self.min_samples_per_target
            ));
        }
        if self.min_distinct_targets < 2 {
            return Err(anyhow!("minDistinctTargets must be at least 2"));
        }
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(anyhow!("screen size must be non-zero"));
        }
        if self.dwell_click_enabled && self.blink_click_enabled {
            return Err(anyhow!(
                "dwellClickEnabled and blinkClickEnabled are mutually exclusive"
            ));
        }
        if self.blink_open_threshold < self.blink_close_threshold {
            return Err(anyhow!(
                "blinkOpenThreshold ({}) must not be below blinkCloseThreshold ({})",
                self.blink_open_threshold,
                self.blink_close_threshold
            ));
        }
        if !(0. ..50.).contains(&self.robust_drop_percent) {
            return Err(anyhow!("robustDropPercent must be in [0,50)"));
        }
        if self.model_kind == ModelKind::ShallowNetwork
            && (self.network_hidden_layers.is_empty()
                || self.network_hidden_layers.contains(&0))
        {
            return Err(anyhow!("networkHiddenLayers must list non-zero layer sizes"));
        }
        if !(0. ..0.5).contains(&self.calibration_margin_ratio) {
            return Err(anyhow!("calibrationMarginRatio must be in [0,0.5)"));
        }
        Ok(())
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        debug!("Current state of config: {:?}", self);
        let text = serde_json::to_string_pretty(self)?;
        fs::write(config_file_path, text)
            .map_err(|e| anyhow!("Error writing config to {}: {}", config_file_path, e))?;
        info!("Wrote config to file: {:?}", config_file_path);
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<GazeConfig> {
    match std::fs::read_to_string(config_file_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Gaze config file not found at {}, using defaults",
                &config_file_path
            );
            Ok(GazeConfig::default())
        }
        Err(e) => Err(anyhow!(
            "Failed to load gaze config from {}: {}",
            config_file_path,
            e
        )),
        Ok(s) => {
            info!("Loaded gaze config OK from \"{}\"", config_file_path);
            let loaded_config = serde_json::from_str::<GazeConfig>(&s)
                .map_err(|e| anyhow!("Failed to parse config data: {}", e))?;
            debug!("Config parsed data from file: {:?}", &loaded_config);
            loaded_config.validate()?;
            Ok(loaded_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        GazeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: GazeConfig =
            serde_json::from_str(r#"{ "smoothingAlpha": 0.5, "calibrationLayout": "ninePoint" }"#)
                .unwrap();
        assert_eq!(config.smoothing_alpha, 0.5);
        assert_eq!(config.calibration_layout, CalibrationLayout::NinePoint);
        assert_eq!(config.samples_per_target, 25);
        assert_eq!(config.max_frame_gap_ms, 250);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        for alpha in [0., -0.1, 1.01, f32::NAN] {
            let config = GazeConfig {
                smoothing_alpha: alpha,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "alpha {alpha} accepted");
        }
    }

    #[test]
    fn test_click_modes_are_exclusive() {
        let config = GazeConfig {
            dwell_click_enabled: true,
            blink_click_enabled: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from_file("./definitely/not/here.json").unwrap();
        assert_eq!(config, GazeConfig::default());
    }
}
