use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::{
    error::{FeatureError, RecordError, TrainError},
    gaze_config::GazeConfig,
    geometry_utils::{clamp_to_screen, distance},
    record::CalibrationRecord,
    systems::{
        blink::BlinkEvent,
        calibration::{CalibrationSession, SessionProgress, SessionSnapshot},
        features::extract_feature,
        mapping::{train, AccuracyReport, CalibrationModel, TrainSettings},
        Systems,
    },
    tracking::{CursorState, EyeFeature, LandmarkFrame, Millis, ScreenPoint},
    Point2D,
};

/// Pull-based landmark provider; `None` means the source is exhausted
pub trait LandmarkSource {
    fn next_frame(&mut self) -> Option<LandmarkFrame>;
}

/// Whatever actually moves the OS cursor. Commands only ever flow outward.
pub trait CursorControl {
    fn move_to(&mut self, x: i32, y: i32);
    fn click(&mut self);
}

/// Global halt for cursor output. Clone it into whatever context delivers the
/// panic hotkey; the pipeline checks it before every single emission.
#[derive(Clone, Default, Debug)]
pub struct PanicSwitch(Arc<AtomicBool>);

impl PanicSwitch {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    /// No model loaded; nothing is emitted
    Uncalibrated,
    Tracking,
    Calibrating,
}

/// What a single frame amounted to
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    NoFace(FeatureError),
    /// Eye closed this frame; `clicked` if a long blink fired a click
    EyeClosed { clicked: bool },
    Sampled(SessionProgress),
    Calibrated(AccuracyReport),
    /// Session finished but training refused it; any previous model is kept
    CalibrationFailed(TrainError),
    Uncalibrated,
    /// Model produced a non-finite position; ignored
    InvalidEstimate,
    /// `moved`/`clicked` report what was actually emitted
    Tracked {
        cursor: CursorState,
        moved: bool,
        clicked: bool,
    },
}

/// Immutable snapshot for status displays
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub mode: Mode,
    pub halted: bool,
    pub calibrated: bool,
    pub session: Option<SessionSnapshot>,
    pub cursor: Option<CursorState>,
    pub last_accuracy: Option<AccuracyReport>,
    pub drift_offset: Point2D,
}

pub struct Pipeline {
    config: GazeConfig,
    train_settings: TrainSettings,
    systems: Systems,
    model: Option<Arc<CalibrationModel>>,
    session: Option<CalibrationSession>,
    panic: PanicSwitch,
    cursor: Option<CursorState>,
    last_emitted: Option<(i32, i32)>,
    last_accuracy: Option<AccuracyReport>,
    last_frame_at: Option<Millis>,
}

impl Pipeline {
    /// Starts with no model, neutral filters and the panic switch cleared.
    /// Fails if the config does not pass validation.
    pub fn new(config: GazeConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let systems = Systems::new(&config);
        let train_settings = TrainSettings::from(&config);
        Ok(Pipeline {
            config,
            train_settings,
            systems,
            model: None,
            session: None,
            panic: PanicSwitch::default(),
            cursor: None,
            last_emitted: None,
            last_accuracy: None,
            last_frame_at: None,
        })
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    pub fn panic_switch(&self) -> PanicSwitch {
        self.panic.clone()
    }

    pub fn mode(&self) -> Mode {
        if self.session.is_some() {
            Mode::Calibrating
        } else if self.model.is_some() {
            Mode::Tracking
        } else {
            Mode::Uncalibrated
        }
    }

    /// Snapshot of the active model, if any
    pub fn model(&self) -> Option<Arc<CalibrationModel>> {
        self.model.clone()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            mode: self.mode(),
            halted: self.panic.is_halted(),
            calibrated: self.model.is_some(),
            session: self.session.as_ref().map(|s| s.snapshot()),
            cursor: self.cursor,
            last_accuracy: self.last_accuracy,
            drift_offset: self.systems.drift_corrector.offset(),
        }
    }

    /// Swap in a new model. The filter and dwell state start over since the
    /// old positions came from a different mapping.
    pub fn install_model(&mut self, model: CalibrationModel) {
        info!(
            "Installing {} model ({} samples, confidence {:.2})",
            model.kind().as_str(),
            model.sample_count(),
            model.confidence()
        );
        self.model = Some(Arc::new(model));
        self.reset_tracking();
    }

    /// Install a model from a persisted record. On failure the pipeline is
    /// left with no model at all.
    pub fn load_record(&mut self, record: &CalibrationRecord) -> Result<(), RecordError> {
        match record.to_model() {
            Ok(model) => {
                self.install_model(model);
                Ok(())
            }
            Err(e) => {
                warn!("Discarding calibration record: {}", e);
                self.model = None;
                self.reset_tracking();
                Err(e)
            }
        }
    }

    /// Record of the active model, ready to persist
    pub fn current_record(&self) -> Option<CalibrationRecord> {
        let model = self.model.as_ref()?;
        match CalibrationRecord::from_model(model) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Could not serialise active model: {}", e);
                None
            }
        }
    }

    pub fn begin_calibration(&mut self) -> SessionSnapshot {
        let targets = self.config.calibration_layout.targets(
            self.config.screen_width,
            self.config.screen_height,
            self.config.calibration_margin_ratio,
        );
        self.begin_calibration_with_targets(targets)
    }

    /// Starting a session while one is running replaces it
    pub fn begin_calibration_with_targets(&mut self, targets: Vec<ScreenPoint>) -> SessionSnapshot {
        if self.session.is_some() {
            warn!("Calibration already running; starting over");
        }
        let session = CalibrationSession::begin(targets, self.config.samples_per_target);
        let snapshot = session.snapshot();
        self.session = Some(session);
        self.systems.stabiliser.reset();
        snapshot
    }

    /// Drop the session without training. Model and filter are left as they were.
    pub fn cancel_calibration(&mut self) {
        if self.session.take().is_some() {
            info!("Calibration cancelled");
            self.systems.stabiliser.reset();
        }
    }

    /// User confirmed they were looking at `target` while the cursor showed
    /// `observed`.
    pub fn correct_drift(&mut self, observed: Point2D, target: ScreenPoint) -> bool {
        self.systems
            .drift_corrector
            .correct(observed, (target.x as f32, target.y as f32))
    }

    pub fn process_frame(
        &mut self,
        frame: &LandmarkFrame,
        cursor: &mut impl CursorControl,
    ) -> FrameOutcome {
        let feature = match extract_feature(frame, self.config.min_openness) {
            Ok(f) => f,
            Err(e) => {
                debug!("Frame {} skipped: {}", frame.timestamp, e);
                return FrameOutcome::NoFace(e);
            }
        };
        let stalled = self.frame_gap_exceeded(feature.timestamp);

        if self.session.is_some() {
            if feature.blink {
                return FrameOutcome::EyeClosed { clicked: false };
            }
            let feature = self.systems.stabiliser.stabilise(feature);
            return self.record_calibration_sample(feature);
        }

        let Some(model) = self.model.clone() else {
            return FrameOutcome::Uncalibrated;
        };

        if stalled {
            // Filter and dwell history from before the stall describe a gaze
            // that may be long gone
            self.systems.reset_tracking();
        }

        let blink = self
            .systems
            .blink_detector
            .update(feature.openness, feature.timestamp);
        let blink_click = self.config.blink_click_enabled && blink == Some(BlinkEvent::LongBlink);

        if feature.blink {
            let clicked = blink_click && self.emit_click(cursor);
            return FrameOutcome::EyeClosed { clicked };
        }

        let feature = self.systems.stabiliser.stabilise(feature);
        let estimate = model.predict(&feature);
        if !estimate.is_finite() {
            warn!("Discarding non-finite gaze estimate {:?}", estimate);
            return FrameOutcome::InvalidEstimate;
        }

        let corrected = self.systems.drift_corrector.apply((estimate.x, estimate.y));
        let smoothed = self.systems.smoother.update(corrected);
        let (x, y) = clamp_to_screen(smoothed, self.config.screen_width, self.config.screen_height);

        let dwell_click = self
            .systems
            .dwell_engine
            .update((x as f32, y as f32), feature.timestamp);
        let state = CursorState {
            x,
            y,
            stationary_since: self.systems.dwell_engine.stationary_since(),
        };
        self.cursor = Some(state);

        let moved = self.emit_move(cursor, x, y);
        let clicked = (dwell_click || blink_click) && self.emit_click(cursor);

        FrameOutcome::Tracked {
            cursor: state,
            moved,
            clicked,
        }
    }

    /// Drain a source, returning how many frames were processed
    pub fn run(
        &mut self,
        source: &mut impl LandmarkSource,
        cursor: &mut impl CursorControl,
    ) -> usize {
        let mut frames = 0;
        while let Some(frame) = source.next_frame() {
            self.process_frame(&frame, cursor);
            frames += 1;
        }
        frames
    }

    fn record_calibration_sample(&mut self, feature: EyeFeature) -> FrameOutcome {
        let Some(session) = self.session.as_mut() else {
            return FrameOutcome::Uncalibrated;
        };
        let progress = session.record_sample(feature);
        match progress {
            SessionProgress::Complete => {}
            SessionProgress::Advanced { .. } => {
                // History from the previous target must not leak into the next
                self.systems.stabiliser.reset();
                return FrameOutcome::Sampled(progress);
            }
            SessionProgress::Collecting { .. } => return FrameOutcome::Sampled(progress),
        }

        let Some(session) = self.session.take() else {
            return FrameOutcome::Sampled(progress);
        };
        self.systems.stabiliser.reset();
        let samples = session.into_samples();

        match train(&samples, &self.train_settings) {
            Ok(model) => {
                let report = model.evaluate(&samples);
                info!(
                    "Calibration accuracy: mean {:.1}px, max {:.1}px, rms {:.1}px",
                    report.mean_px, report.max_px, report.rms_px
                );
                self.last_accuracy = Some(report);
                self.install_model(model);
                FrameOutcome::Calibrated(report)
            }
            Err(e) => {
                warn!("Calibration failed, keeping previous model: {}", e);
                FrameOutcome::CalibrationFailed(e)
            }
        }
    }

    /// Records `timestamp` as the latest usable frame and reports whether the
    /// pause since the previous one exceeded the configured limit
    fn frame_gap_exceeded(&mut self, timestamp: Millis) -> bool {
        let previous = self.last_frame_at.replace(timestamp);
        let limit = self.config.max_frame_gap_ms;
        match previous {
            Some(previous) if limit > 0 && timestamp.saturating_sub(previous) > limit => {
                warn!(
                    "{}ms without a usable frame; restarting cursor filters",
                    timestamp - previous
                );
                true
            }
            _ => false,
        }
    }

    fn emit_move(&mut self, cursor: &mut impl CursorControl, x: i32, y: i32) -> bool {
        if let Some((lx, ly)) = self.last_emitted {
            if distance(lx as f32, ly as f32, x as f32, y as f32) < self.config.move_deadzone_px {
                return false;
            }
        }
        if self.panic.is_halted() {
            return false;
        }
        cursor.move_to(x, y);
        self.last_emitted = Some((x, y));
        true
    }

    fn emit_click(&self, cursor: &mut impl CursorControl) -> bool {
        if self.panic.is_halted() {
            return false;
        }
        debug!("Click");
        cursor.click();
        true
    }

    fn reset_tracking(&mut self) {
        self.systems.reset_tracking();
        self.cursor = None;
        self.last_emitted = None;
    }
}
