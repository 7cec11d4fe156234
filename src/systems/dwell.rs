use log::debug;

use crate::{geometry_utils::distance_points, tracking::Millis, Point2D};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellState {
    Moving,
    /// Click already fired for this episode
    Dwelling,
}

pub struct DwellSettings {
    pub enabled: bool,
    pub threshold_ms: Millis,
    pub radius_px: f32,
}

/// Fires one click each time the cursor holds still (within a radius of
/// where it settled) for the configured time.
pub struct DwellEngine {
    settings: DwellSettings,
    state: DwellState,
    anchor: Option<(Point2D, Millis)>,
}

impl DwellEngine {
    pub fn new(settings: DwellSettings) -> Self {
        DwellEngine {
            settings,
            state: DwellState::Moving,
            anchor: None,
        }
    }

    pub fn state(&self) -> DwellState {
        self.state
    }

    /// When the cursor started holding still, if it is being tracked
    pub fn stationary_since(&self) -> Option<Millis> {
        self.anchor.map(|(_, since)| since)
    }

    /// Feed a filtered cursor position; returns true exactly when a click
    /// should fire.
    pub fn update(&mut self, position: Point2D, now: Millis) -> bool {
        if !self.settings.enabled {
            return false;
        }

        let since = match self.anchor {
            Some((anchor, since))
                if distance_points(&anchor, &position) <= self.settings.radius_px =>
            {
                since
            }
            _ => {
                if self.state == DwellState::Dwelling {
                    debug!("Dwell ended, cursor moved away");
                }
                self.anchor = Some((position, now));
                self.state = DwellState::Moving;
                now
            }
        };

        if self.state == DwellState::Moving
            && now.saturating_sub(since) >= self.settings.threshold_ms
        {
            self.state = DwellState::Dwelling;
            debug!("Dwell click after {}ms", now.saturating_sub(since));
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.state = DwellState::Moving;
        self.anchor = None;
    }
}
