use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::tracking::{CalibrationSample, EyeFeature, ScreenPoint};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationLayout {
    FivePoint,
    NinePoint,
}

impl CalibrationLayout {
    pub fn from_count(points: usize) -> Option<Self> {
        match points {
            5 => Some(CalibrationLayout::FivePoint),
            9 => Some(CalibrationLayout::NinePoint),
            _ => None,
        }
    }

    /// Target points in display order: centre, the four corners, then (for
    /// nine points) the four edge midpoints. Outer targets are inset by
    /// `margin_ratio` of the screen size from the first and last pixel, so
    /// every target is on screen even with no margin.
    pub fn targets(
        &self,
        screen_width: u32,
        screen_height: u32,
        margin_ratio: f32,
    ) -> Vec<ScreenPoint> {
        let (sw, sh) = (screen_width as i32, screen_height as i32);
        let mx = (screen_width as f32 * margin_ratio) as i32;
        let my = (screen_height as f32 * margin_ratio) as i32;

        let (left, top) = (mx, my);
        let (right, bottom) = (sw - 1 - mx, sh - 1 - my);

        let centre = ScreenPoint::new(sw / 2, sh / 2);
        let mut points = vec![
            centre,
            ScreenPoint::new(left, top),
            ScreenPoint::new(right, top),
            ScreenPoint::new(left, bottom),
            ScreenPoint::new(right, bottom),
        ];

        if *self == CalibrationLayout::NinePoint {
            points.extend([
                ScreenPoint::new(centre.x, top),
                ScreenPoint::new(centre.x, bottom),
                ScreenPoint::new(left, centre.y),
                ScreenPoint::new(right, centre.y),
            ]);
        }
        points
    }
}

/// What happened to the session as a result of one recorded sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionProgress {
    /// Still collecting for `target_index`
    Collecting { target_index: usize, collected: usize },
    /// Finished one target, now showing `target_index`
    Advanced { target_index: usize },
    /// All targets have their samples
    Complete,
}

/// Read-only view of a running session, for whoever draws the targets
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub current_index: usize,
    pub target_count: usize,
    pub current_target: Option<ScreenPoint>,
    pub collected_for_current: usize,
    pub samples_per_target: usize,
}

/// A guided calibration run: fixed target order, fixed sample count per
/// target. Nothing here knows how (or whether) targets are displayed.
#[derive(Debug)]
pub struct CalibrationSession {
    targets: Vec<ScreenPoint>,
    current_index: usize,
    samples_per_target: usize,
    collected: IndexMap<usize, Vec<CalibrationSample>>,
}

impl CalibrationSession {
    pub fn begin(targets: Vec<ScreenPoint>, samples_per_target: usize) -> Self {
        info!(
            "Begin calibration session with {} targets x {} samples",
            targets.len(),
            samples_per_target
        );
        CalibrationSession {
            targets,
            current_index: 0,
            samples_per_target: samples_per_target.max(1),
            collected: IndexMap::new(),
        }
    }

    pub fn current_target(&self) -> Option<ScreenPoint> {
        self.targets.get(self.current_index).copied()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.targets.len()
    }

    /// Tag a feature with the current target. Once the target has enough
    /// samples, move on to the next one (or report completion).
    pub fn record_sample(&mut self, feature: EyeFeature) -> SessionProgress {
        let Some(target) = self.current_target() else {
            return SessionProgress::Complete;
        };
        let target_index = self.current_index;
        let samples = self.collected.entry(target_index).or_default();
        samples.push(CalibrationSample {
            feature,
            target,
            target_index,
        });
        let collected = samples.len();

        if collected < self.samples_per_target {
            return SessionProgress::Collecting {
                target_index,
                collected,
            };
        }

        self.current_index += 1;
        debug!(
            "Calibration target {} done with {} samples",
            target_index, collected
        );
        if self.is_complete() {
            info!("Calibration session complete");
            SessionProgress::Complete
        } else {
            SessionProgress::Advanced {
                target_index: self.current_index,
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_index: self.current_index,
            target_count: self.targets.len(),
            current_target: self.current_target(),
            collected_for_current: self
                .collected
                .get(&self.current_index)
                .map_or(0, |s| s.len()),
            samples_per_target: self.samples_per_target,
        }
    }

    /// Consume the session, handing over all samples in target order
    pub fn into_samples(self) -> Vec<CalibrationSample> {
        self.collected.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(t: u64) -> EyeFeature {
        EyeFeature::new(0.5, 0.5, 1., t)
    }

    #[test]
    fn test_five_point_layout_order() {
        let targets = CalibrationLayout::FivePoint.targets(1000, 500, 0.1);
        assert_eq!(
            targets,
            vec![
                ScreenPoint::new(500, 250),
                ScreenPoint::new(100, 50),
                ScreenPoint::new(899, 50),
                ScreenPoint::new(100, 449),
                ScreenPoint::new(899, 449),
            ]
        );
    }

    #[test]
    fn test_nine_point_layout_adds_edge_midpoints() {
        let targets = CalibrationLayout::NinePoint.targets(1000, 500, 0.1);
        assert_eq!(targets.len(), 9);
        assert_eq!(
            &targets[5..],
            &[
                ScreenPoint::new(500, 50),
                ScreenPoint::new(500, 449),
                ScreenPoint::new(100, 250),
                ScreenPoint::new(899, 250),
            ]
        );
    }

    #[test]
    fn test_zero_margin_keeps_targets_on_screen() {
        for layout in [CalibrationLayout::FivePoint, CalibrationLayout::NinePoint] {
            let targets = layout.targets(1920, 1080, 0.);
            assert!(targets
                .iter()
                .all(|p| (0..1920).contains(&p.x) && (0..1080).contains(&p.y)));
            assert!(targets.contains(&ScreenPoint::new(1919, 1079)));
        }
    }

    #[test]
    fn test_layout_from_count() {
        assert_eq!(
            CalibrationLayout::from_count(9),
            Some(CalibrationLayout::NinePoint)
        );
        assert_eq!(CalibrationLayout::from_count(4), None);
    }

    #[test]
    fn test_session_advances_and_completes() {
        let targets = vec![ScreenPoint::new(10, 10), ScreenPoint::new(90, 90)];
        let mut session = CalibrationSession::begin(targets, 2);

        assert_eq!(
            session.record_sample(feature(0)),
            SessionProgress::Collecting {
                target_index: 0,
                collected: 1
            }
        );
        assert_eq!(
            session.record_sample(feature(1)),
            SessionProgress::Advanced { target_index: 1 }
        );
        assert_eq!(session.current_target(), Some(ScreenPoint::new(90, 90)));
        session.record_sample(feature(2));
        assert_eq!(session.record_sample(feature(3)), SessionProgress::Complete);
        assert!(session.is_complete());
        // Further samples are ignored
        assert_eq!(session.record_sample(feature(4)), SessionProgress::Complete);

        let samples = session.into_samples();
        assert_eq!(samples.len(), 4);
        assert_eq!(
            samples.iter().map(|s| s.target_index).collect::<Vec<_>>(),
            vec![0, 0, 1, 1]
        );
        assert_eq!(samples[3].target, ScreenPoint::new(90, 90));
    }

    #[test]
    fn test_snapshot_tracks_progress() {
        let targets = CalibrationLayout::FivePoint.targets(800, 600, 0.08);
        let mut session = CalibrationSession::begin(targets, 3);
        session.record_sample(feature(0));
        let snap = session.snapshot();
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.target_count, 5);
        assert_eq!(snap.collected_for_current, 1);
        assert_eq!(snap.current_target, Some(ScreenPoint::new(400, 300)));
    }
}
