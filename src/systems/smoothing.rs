use std::collections::VecDeque;

use log::{debug, info};

use crate::{geometry_utils::lerp, Point2D};

/// Exponential moving average over raw gaze estimates. The first sample after
/// a reset is taken as-is.
pub struct EmaSmoother {
    alpha: f32,
    state: Option<Point2D>,
}

impl EmaSmoother {
    pub fn new(alpha: f32) -> Self {
        if !(alpha > 0. && alpha <= 1.) {
            panic!("Smoothing alpha must be in (0,1], got {}", alpha);
        }
        EmaSmoother { alpha, state: None }
    }

    pub fn update(&mut self, raw: Point2D) -> Point2D {
        let next = match self.state {
            None => raw,
            Some((x, y)) => (lerp(x, raw.0, self.alpha), lerp(y, raw.1, self.alpha)),
        };
        self.state = Some(next);
        next
    }

    pub fn current(&self) -> Option<Point2D> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

pub struct DriftSettings {
    pub window: usize,
    /// Mean error (px) that must be exceeded before the offset moves
    pub threshold_px: f32,
    pub learn_rate: f32,
    pub max_offset_px: f32,
}

/// Slow additive offset compensating for head or camera drift. Only moves when
/// told about a confirmed fixation, never during ordinary tracking.
pub struct DriftCorrector {
    settings: DriftSettings,
    errors: VecDeque<Point2D>,
    offset: Point2D,
}

impl DriftCorrector {
    pub fn new(settings: DriftSettings) -> Self {
        DriftCorrector {
            settings,
            errors: VecDeque::new(),
            offset: (0., 0.),
        }
    }

    pub fn offset(&self) -> Point2D {
        self.offset
    }

    pub fn apply(&self, raw: Point2D) -> Point2D {
        (raw.0 + self.offset.0, raw.1 + self.offset.1)
    }

    /// Record one fixation error (`target - observed`) and possibly nudge the
    /// offset. Returns true if the offset changed.
    pub fn correct(&mut self, observed: Point2D, target: Point2D) -> bool {
        let error = (target.0 - observed.0, target.1 - observed.1);
        if !(error.0.is_finite() && error.1.is_finite()) {
            return false;
        }
        if self.errors.len() >= self.settings.window.max(1) {
            self.errors.pop_front();
        }
        self.errors.push_back(error);

        let n = self.errors.len() as f32;
        let mean = (
            self.errors.iter().map(|e| e.0).sum::<f32>() / n,
            self.errors.iter().map(|e| e.1).sum::<f32>() / n,
        );
        let magnitude = (mean.0 * mean.0 + mean.1 * mean.1).sqrt();
        if magnitude <= self.settings.threshold_px {
            debug!(
                "Drift {:.1}px within threshold {:.1}px",
                magnitude, self.settings.threshold_px
            );
            return false;
        }

        let (mut ox, mut oy) = (
            self.offset.0 + mean.0 * self.settings.learn_rate,
            self.offset.1 + mean.1 * self.settings.learn_rate,
        );
        let length = (ox * ox + oy * oy).sqrt();
        if length > self.settings.max_offset_px && length > 0. {
            let scale = self.settings.max_offset_px / length;
            ox *= scale;
            oy *= scale;
        }
        self.offset = (ox, oy);
        info!("Drift offset now ({:.1}, {:.1})", ox, oy);
        true
    }

    pub fn reset(&mut self) {
        self.errors.clear();
        self.offset = (0., 0.);
    }
}
