pub mod blink;
pub mod calibration;
pub mod dwell;
pub mod features;
pub mod mapping;
pub mod smoothing;

use blink::{BlinkDetector, BlinkSettings};
use dwell::{DwellEngine, DwellSettings};
use features::FeatureStabiliser;
use log::info;
use smoothing::{DriftCorrector, DriftSettings, EmaSmoother};

use crate::gaze_config::GazeConfig;

/// The stateful per-frame stages, built once from the config
pub struct Systems {
    pub stabiliser: FeatureStabiliser,
    pub smoother: EmaSmoother,
    pub drift_corrector: DriftCorrector,
    pub dwell_engine: DwellEngine,
    pub blink_detector: BlinkDetector,
}

impl Systems {
    pub fn new(config: &GazeConfig) -> Systems {
        let stabiliser =
            FeatureStabiliser::new(config.feature_median_window, config.feature_max_step);

        let smoother = EmaSmoother::new(config.smoothing_alpha);

        let drift_corrector = DriftCorrector::new(DriftSettings {
            window: config.drift_window,
            threshold_px: config.drift_threshold_ratio * config.screen_width as f32,
            learn_rate: config.drift_learn_rate,
            max_offset_px: config.drift_max_offset_px,
        });

        let dwell_engine = DwellEngine::new(DwellSettings {
            enabled: config.dwell_click_enabled,
            threshold_ms: config.dwell_threshold_ms,
            radius_px: config.dwell_radius_px as f32,
        });
        if config.dwell_click_enabled {
            info!(
                "Dwell click enabled: {}ms within {}px",
                config.dwell_threshold_ms, config.dwell_radius_px
            );
        }

        let blink_detector = BlinkDetector::new(BlinkSettings {
            close_threshold: config.blink_close_threshold,
            open_threshold: config.blink_open_threshold,
            min_ms: config.blink_min_ms,
            long_ms: config.blink_long_ms,
        });
        if config.blink_click_enabled {
            info!(
                "Blink click enabled: eye closed for at least {}ms",
                config.blink_long_ms
            );
        }

        Systems {
            stabiliser,
            smoother,
            drift_corrector,
            dwell_engine,
            blink_detector,
        }
    }

    /// Forget short-term tracking history; the drift offset is kept
    pub fn reset_tracking(&mut self) {
        self.stabiliser.reset();
        self.smoother.reset();
        self.dwell_engine.reset();
        self.blink_detector.reset();
    }
}
