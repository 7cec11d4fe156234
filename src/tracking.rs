use serde::{Deserialize, Serialize};

use crate::Point2D;

/// Milliseconds on a monotonic clock; only differences are meaningful
pub type Millis = u64;

/// Explicit eye contour bounds, if the landmark provider has them
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EyeBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl EyeBox {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Right-eye landmarks for one frame, in image pixels
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EyeLandmarks {
    /// Points on the iris ring; the centre is their mean
    pub iris: Vec<Point2D>,
    pub outer_corner: Point2D,
    pub inner_corner: Point2D,
    pub upper_lid: Point2D,
    pub lower_lid: Point2D,
    #[serde(default)]
    pub bounds: Option<EyeBox>,
}

/// One frame as delivered by the landmark provider
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkFrame {
    pub timestamp: Millis,
    pub image_width: u32,
    pub image_height: u32,
    /// `None` when no face was detected this frame
    pub eye: Option<EyeLandmarks>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EyeFeature {
    pub nx: f32,
    pub ny: f32,
    pub openness: f32,
    /// Eye considered closed; never used for mapping or calibration
    pub blink: bool,
    pub timestamp: Millis,
}

impl EyeFeature {
    pub fn new(nx: f32, ny: f32, openness: f32, timestamp: Millis) -> Self {
        EyeFeature {
            nx: nx.clamp(0., 1.),
            ny: ny.clamp(0., 1.),
            openness: openness.clamp(0., 1.),
            blink: false,
            timestamp,
        }
    }

    pub fn position(&self) -> Point2D {
        (self.nx, self.ny)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GazeEstimate {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl GazeEstimate {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub fn new(x: i32, y: i32) -> Self {
        ScreenPoint { x, y }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSample {
    pub feature: EyeFeature,
    pub target: ScreenPoint,
    pub target_index: usize,
}

/// Filtered, dwell-tracked cursor position
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub x: i32,
    pub y: i32,
    pub stationary_since: Option<Millis>,
}

/// Commands pushed to the cursor-control collaborator
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCommand {
    MoveTo { x: i32, y: i32 },
    Click,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_clamps_inputs() {
        let f = EyeFeature::new(-0.3, 1.7, 2.0, 10);
        assert_eq!(f.position(), (0., 1.));
        assert_eq!(f.openness, 1.);
    }

    #[test]
    fn test_landmark_frame_from_json() {
        let text = r#"{
            "timestamp": 33,
            "imageWidth": 640,
            "imageHeight": 480,
            "eye": {
                "iris": [[110.0, 52.0], [114.0, 52.0]],
                "outerCorner": [100.0, 50.0],
                "innerCorner": [140.0, 50.0],
                "upperLid": [120.0, 40.0],
                "lowerLid": [120.0, 60.0]
            }
        }"#;
        let frame: LandmarkFrame = serde_json::from_str(text).unwrap();
        let eye = frame.eye.unwrap();
        assert_eq!(eye.iris.len(), 2);
        assert!(eye.bounds.is_none());
    }
}
