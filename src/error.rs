use thiserror::Error;

/// Sensor-level anomalies; absorbed by the pipeline as "no update this frame"
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureError {
    #[error("no face or eye landmarks in this frame")]
    NoFace,
    #[error("eye bounding box has zero width or height")]
    DegenerateGeometry,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error(
        "insufficient calibration data: {distinct_targets} usable targets (need {min_targets}), \
         fewest samples on a target {min_found} (need {min_per_target})"
    )]
    InsufficientData {
        distinct_targets: usize,
        min_targets: usize,
        min_found: usize,
        min_per_target: usize,
    },
    #[error("model fit failed: {0}")]
    NumericalFailure(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("calibration record is corrupt: {0}")]
    ModelLoadCorrupt(String),
    #[error("calibration record has unrecognised model kind \"{0}\"")]
    UnknownKind(String),
}
