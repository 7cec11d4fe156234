use std::collections::VecDeque;

use log::debug;
use map_range::MapRange;

use crate::{
    error::FeatureError,
    geometry_utils::{centroid, clamp_unit, distance_points, median},
    tracking::{EyeBox, EyeFeature, EyeLandmarks, LandmarkFrame},
    Point2D,
};

/// Turn one frame of eye landmarks into a normalised feature.
///
/// The eye box spans the corners horizontally and the lids vertically, unless
/// the provider supplied explicit contour bounds. `nx`/`ny` are the iris
/// centre's position inside that box. `openness` is the lid gap over the
/// explicit bounds height when there is one, otherwise over the corner to
/// corner width (the eye aspect ratio). All three are clamped to [0,1].
///
/// A fully shut eye is still a feature, flagged as a blink, as long as the
/// corners are usable.
pub fn extract_feature(
    frame: &LandmarkFrame,
    min_openness: f32,
) -> Result<EyeFeature, FeatureError> {
    let eye = frame.eye.as_ref().ok_or(FeatureError::NoFace)?;
    if !landmarks_are_finite(eye) {
        return Err(FeatureError::NoFace);
    }
    let (iris_x, iris_y) = centroid(&eye.iris).ok_or(FeatureError::NoFace)?;

    let eye_width = distance_points(&eye.outer_corner, &eye.inner_corner);
    if eye_width <= f32::EPSILON {
        return Err(FeatureError::DegenerateGeometry);
    }
    let lid_gap = (eye.lower_lid.1 - eye.upper_lid.1).abs();
    let openness = match eye.bounds {
        Some(bounds) if bounds.height() > f32::EPSILON => lid_gap / bounds.height(),
        Some(_) => return Err(FeatureError::DegenerateGeometry),
        None => lid_gap / eye_width,
    };
    let closed = clamp_unit(openness) < min_openness;

    let eye_box = eye_box(eye, frame.image_width, frame.image_height);
    let (width, height) = (eye_box.width(), eye_box.height());
    if width <= f32::EPSILON {
        return Err(FeatureError::DegenerateGeometry);
    }
    let nx = iris_x.map_range(eye_box.left..eye_box.right, 0. ..1.);
    let ny = if height > f32::EPSILON {
        iris_y.map_range(eye_box.top..eye_box.bottom, 0. ..1.)
    } else if closed {
        // Lids meet; no vertical position, and blink frames never reach the model
        0.5
    } else {
        return Err(FeatureError::DegenerateGeometry);
    };

    let mut feature = EyeFeature::new(nx, ny, openness, frame.timestamp);
    feature.blink = closed;
    Ok(feature)
}

fn landmarks_are_finite(eye: &EyeLandmarks) -> bool {
    let finite = |p: &Point2D| p.0.is_finite() && p.1.is_finite();
    eye.iris.iter().all(finite)
        && [
            eye.outer_corner,
            eye.inner_corner,
            eye.upper_lid,
            eye.lower_lid,
        ]
        .iter()
        .all(finite)
        && eye.bounds.map_or(true, |b| {
            [b.left, b.top, b.right, b.bottom]
                .iter()
                .all(|v| v.is_finite())
        })
}

fn eye_box(eye: &EyeLandmarks, image_width: u32, image_height: u32) -> EyeBox {
    let raw = eye.bounds.unwrap_or(EyeBox {
        left: eye.outer_corner.0.min(eye.inner_corner.0),
        right: eye.outer_corner.0.max(eye.inner_corner.0),
        top: eye.upper_lid.1.min(eye.lower_lid.1),
        bottom: eye.upper_lid.1.max(eye.lower_lid.1),
    });
    // Only clip to the image when the provider told us how big it is
    if image_width == 0 || image_height == 0 {
        return raw;
    }
    let (w, h) = (image_width as f32, image_height as f32);
    EyeBox {
        left: raw.left.clamp(0., w),
        right: raw.right.clamp(0., w),
        top: raw.top.clamp(0., h),
        bottom: raw.bottom.clamp(0., h),
    }
}

/// Median filter plus a per-frame step limit on the normalised iris position,
/// to knock out single-frame landmark spikes before they reach the model.
pub struct FeatureStabiliser {
    window: usize,
    max_step: f32,
    history: VecDeque<Point2D>,
    last: Option<Point2D>,
}

impl FeatureStabiliser {
    pub fn new(window: usize, max_step: f32) -> Self {
        FeatureStabiliser {
            window: window.max(1),
            max_step: max_step.max(0.),
            history: VecDeque::new(),
            last: None,
        }
    }

    pub fn stabilise(&mut self, feature: EyeFeature) -> EyeFeature {
        if feature.blink {
            // Closed-eye frames carry no usable iris position
            return feature;
        }
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(feature.position());

        let xs: Vec<f32> = self.history.iter().map(|p| p.0).collect();
        let ys: Vec<f32> = self.history.iter().map(|p| p.1).collect();
        let (mut nx, mut ny) = (
            median(&xs).unwrap_or(feature.nx),
            median(&ys).unwrap_or(feature.ny),
        );

        if let Some((last_x, last_y)) = self.last {
            nx = last_x + (nx - last_x).clamp(-self.max_step, self.max_step);
            ny = last_y + (ny - last_y).clamp(-self.max_step, self.max_step);
        }
        let (nx, ny) = (clamp_unit(nx), clamp_unit(ny));
        self.last = Some((nx, ny));

        if (nx, ny) != feature.position() {
            debug!(
                "Stabilised feature ({:.3},{:.3}) -> ({:.3},{:.3})",
                feature.nx, feature.ny, nx, ny
            );
        }

        EyeFeature { nx, ny, ..feature }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(iris: Point2D) -> EyeLandmarks {
        EyeLandmarks {
            iris: vec![(iris.0 - 2., iris.1), (iris.0 + 2., iris.1)],
            outer_corner: (100., 50.),
            inner_corner: (140., 50.),
            upper_lid: (120., 40.),
            lower_lid: (120., 60.),
            bounds: None,
        }
    }

    fn frame(eye: Option<EyeLandmarks>) -> LandmarkFrame {
        LandmarkFrame {
            timestamp: 5,
            image_width: 640,
            image_height: 480,
            eye,
        }
    }

    #[test]
    fn test_normalises_iris_inside_eye_box() {
        let f = extract_feature(&frame(Some(eye((110., 45.)))), 0.15).unwrap();
        assert!((f.nx - 0.25).abs() < 1e-6);
        assert!((f.ny - 0.25).abs() < 1e-6);
        // 20px lid gap over a 40px wide eye
        assert!((f.openness - 0.5).abs() < 1e-6);
        assert!(!f.blink);
        assert_eq!(f.timestamp, 5);
    }

    #[test]
    fn test_out_of_box_iris_is_clamped() {
        let f = extract_feature(&frame(Some(eye((90., 80.)))), 0.15).unwrap();
        assert_eq!(f.position(), (0., 1.));
    }

    #[test]
    fn test_missing_eye_is_no_face() {
        assert_eq!(
            extract_feature(&frame(None), 0.15),
            Err(FeatureError::NoFace)
        );
        let mut e = eye((110., 45.));
        e.iris.clear();
        assert_eq!(
            extract_feature(&frame(Some(e)), 0.15),
            Err(FeatureError::NoFace)
        );
        let mut e = eye((110., 45.));
        e.upper_lid = (120., f32::NAN);
        assert_eq!(
            extract_feature(&frame(Some(e)), 0.15),
            Err(FeatureError::NoFace)
        );
    }

    #[test]
    fn test_zero_area_box_is_degenerate() {
        let mut zero_width = eye((110., 45.));
        zero_width.inner_corner = zero_width.outer_corner;
        let mut zero_bounds = eye((110., 45.));
        zero_bounds.bounds = Some(EyeBox {
            left: 100.,
            top: 40.,
            right: 140.,
            bottom: 40.,
        });

        for e in [zero_width, zero_bounds] {
            assert_eq!(
                extract_feature(&frame(Some(e)), 0.15),
                Err(FeatureError::DegenerateGeometry)
            );
        }
    }

    #[test]
    fn test_openness_is_lid_gap_over_eye_width() {
        for (gap, expected, closed) in [(20., 0.5, false), (8., 0.2, false), (2., 0.05, true)] {
            let mut e = eye((120., 50.));
            e.upper_lid = (120., 50. - gap / 2.);
            e.lower_lid = (120., 50. + gap / 2.);
            let f = extract_feature(&frame(Some(e)), 0.15).unwrap();
            assert!((f.openness - expected).abs() < 1e-6, "gap {gap}: {}", f.openness);
            assert_eq!(f.blink, closed, "gap {gap}");
        }
    }

    #[test]
    fn test_shut_eye_is_a_blink_not_an_error() {
        let mut e = eye((120., 50.));
        e.upper_lid = (120., 50.);
        e.lower_lid = (120., 50.);
        let f = extract_feature(&frame(Some(e)), 0.15).unwrap();
        assert_eq!(f.openness, 0.);
        assert!(f.blink);
        assert!((f.nx - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_openness_from_explicit_bounds() {
        let mut e = eye((120., 50.));
        e.upper_lid = (120., 48.);
        e.lower_lid = (120., 50.);
        e.bounds = Some(EyeBox {
            left: 100.,
            top: 40.,
            right: 140.,
            bottom: 60.,
        });
        let f = extract_feature(&frame(Some(e)), 0.15).unwrap();
        assert!((f.openness - 0.1).abs() < 1e-6);
        assert!(f.blink);
    }

    #[test]
    fn test_stabiliser_rejects_single_spike() {
        let mut s = FeatureStabiliser::new(5, 0.12);
        for t in 0..4 {
            s.stabilise(EyeFeature::new(0.5, 0.5, 1., t));
        }
        let out = s.stabilise(EyeFeature::new(1.0, 0.0, 1., 4));
        assert_eq!(out.position(), (0.5, 0.5));
    }

    #[test]
    fn test_stabiliser_limits_step() {
        let mut s = FeatureStabiliser::new(1, 0.1);
        s.stabilise(EyeFeature::new(0.2, 0.2, 1., 0));
        let out = s.stabilise(EyeFeature::new(0.9, 0.2, 1., 1));
        assert!((out.nx - 0.3).abs() < 1e-6);
        assert_eq!(out.ny, 0.2);
    }

    #[test]
    fn test_stabiliser_disabled_passes_through() {
        let mut s = FeatureStabiliser::new(1, 1.0);
        s.stabilise(EyeFeature::new(0.1, 0.1, 1., 0));
        let out = s.stabilise(EyeFeature::new(0.8, 0.9, 1., 1));
        assert!((out.nx - 0.8).abs() < 1e-6);
        assert!((out.ny - 0.9).abs() < 1e-6);
    }
}
