pub mod network;
pub mod polynomial;

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use log::{debug, info, warn};
use network::{NetworkFit, NetworkSettings};
use polynomial::PolynomialFit;
use serde::{Deserialize, Serialize};

use crate::{
    error::TrainError,
    gaze_config::GazeConfig,
    geometry_utils::distance,
    tracking::{CalibrationSample, EyeFeature, GazeEstimate},
};

/// Robust refit only kicks in with at least this many samples
const ROBUST_MIN_SAMPLES: usize = 40;
const ROBUST_MIN_KEEP_RATIO: f32 = 0.7;
const ROBUST_MIN_KEEP: usize = 30;
const ROBUST_RELAX_STEP: f32 = 5.;

/// Training RMSE (px) at which confidence drops to one half
const CONFIDENCE_HALF_RMSE_PX: f32 = 50.;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    Polynomial,
    ShallowNetwork,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Polynomial => "polynomial",
            ModelKind::ShallowNetwork => "shallowNetwork",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "polynomial" => Some(ModelKind::Polynomial),
            "shallowNetwork" => Some(ModelKind::ShallowNetwork),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSettings {
    pub kind: ModelKind,
    pub min_distinct_targets: usize,
    pub min_samples_per_target: usize,
    pub robust_drop_percent: f32,
    pub network: NetworkSettings,
}

impl From<&GazeConfig> for TrainSettings {
    fn from(config: &GazeConfig) -> Self {
        TrainSettings {
            kind: config.model_kind,
            min_distinct_targets: config.min_distinct_targets,
            min_samples_per_target: config.min_samples_per_target,
            robust_drop_percent: config.robust_drop_percent,
            network: NetworkSettings {
                hidden_layers: config.network_hidden_layers.clone(),
                max_iterations: config.network_max_iterations,
                learning_rate: config.network_learning_rate,
                seed: config.network_seed,
            },
        }
    }
}

/// Fitted state, one variant per model kind
#[derive(Debug, Clone, PartialEq)]
pub enum ModelParams {
    Polynomial(PolynomialFit),
    ShallowNetwork(NetworkFit),
}

impl ModelParams {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::Polynomial(_) => ModelKind::Polynomial,
            ModelParams::ShallowNetwork(_) => ModelKind::ShallowNetwork,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        match self {
            ModelParams::Polynomial(p) => p.is_well_formed(),
            ModelParams::ShallowNetwork(n) => n.is_well_formed(),
        }
    }

    fn predict(&self, nx: f64, ny: f64) -> (f64, f64) {
        match self {
            ModelParams::Polynomial(p) => p.predict(nx, ny),
            ModelParams::ShallowNetwork(n) => n.predict(nx, ny),
        }
    }

    fn fit(
        samples: &[CalibrationSample],
        settings: &TrainSettings,
    ) -> Result<Self, TrainError> {
        let inputs: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| (s.feature.nx as f64, s.feature.ny as f64))
            .collect();
        let outputs: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| (s.target.x as f64, s.target.y as f64))
            .collect();
        match settings.kind {
            ModelKind::Polynomial => {
                PolynomialFit::fit(&inputs, &outputs).map(ModelParams::Polynomial)
            }
            ModelKind::ShallowNetwork => NetworkFit::fit(&inputs, &outputs, &settings.network)
                .map(ModelParams::ShallowNetwork),
        }
    }
}

/// Pixel error of a model over a set of labelled samples
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    pub mean_px: f32,
    pub max_px: f32,
    pub rms_px: f32,
    pub sample_count: usize,
}

/// A trained feature-to-screen mapping. Never mutated once built; retraining
/// produces a new instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    params: ModelParams,
    trained_at: u64,
    sample_count: usize,
    rmse_px: f32,
}

impl CalibrationModel {
    /// Rebuild from previously fitted state, e.g. a loaded calibration record
    pub fn from_parts(
        params: ModelParams,
        trained_at: u64,
        sample_count: usize,
        rmse_px: f32,
    ) -> Self {
        CalibrationModel {
            params,
            trained_at,
            sample_count,
            rmse_px,
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.params.kind()
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Seconds since the unix epoch
    pub fn trained_at(&self) -> u64 {
        self.trained_at
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn rmse_px(&self) -> f32 {
        self.rmse_px
    }

    /// Fixed for the lifetime of the model, derived from training error
    pub fn confidence(&self) -> f32 {
        if !self.rmse_px.is_finite() {
            return 0.;
        }
        1. / (1. + self.rmse_px.max(0.) / CONFIDENCE_HALF_RMSE_PX)
    }

    pub fn predict(&self, feature: &EyeFeature) -> GazeEstimate {
        let (x, y) = self.params.predict(feature.nx as f64, feature.ny as f64);
        GazeEstimate {
            x: x as f32,
            y: y as f32,
            confidence: self.confidence(),
        }
    }

    pub fn evaluate(&self, samples: &[CalibrationSample]) -> AccuracyReport {
        let errors = residuals(&self.params, samples);
        if errors.is_empty() {
            return AccuracyReport::default();
        }
        let n = errors.len() as f32;
        AccuracyReport {
            mean_px: errors.iter().sum::<f32>() / n,
            max_px: errors.iter().copied().fold(0., f32::max),
            rms_px: (errors.iter().map(|e| e * e).sum::<f32>() / n).sqrt(),
            sample_count: errors.len(),
        }
    }
}

fn residuals(params: &ModelParams, samples: &[CalibrationSample]) -> Vec<f32> {
    samples
        .iter()
        .map(|s| {
            let (x, y) = params.predict(s.feature.nx as f64, s.feature.ny as f64);
            distance(x as f32, y as f32, s.target.x as f32, s.target.y as f32)
        })
        .collect()
}

/// Checks target coverage: enough distinct targets, and every target
/// with enough samples.
pub fn check_sufficient(
    samples: &[CalibrationSample],
    settings: &TrainSettings,
) -> Result<(), TrainError> {
    let mut per_target: IndexMap<(i32, i32), usize> = IndexMap::new();
    for s in samples {
        *per_target.entry((s.target.x, s.target.y)).or_default() += 1;
    }
    let min_targets = settings.min_distinct_targets.max(2);
    let min_per_target = settings.min_samples_per_target.max(1);
    let distinct_targets = per_target.len();
    let min_found = per_target.values().copied().min().unwrap_or(0);

    if distinct_targets < min_targets || min_found < min_per_target {
        return Err(TrainError::InsufficientData {
            distinct_targets,
            min_targets,
            min_found,
            min_per_target,
        });
    }
    Ok(())
}

/// Fit a new model from calibration samples. Blink-flagged samples are ignored.
pub fn train(
    samples: &[CalibrationSample],
    settings: &TrainSettings,
) -> Result<CalibrationModel, TrainError> {
    let usable: Vec<CalibrationSample> =
        samples.iter().filter(|s| !s.feature.blink).copied().collect();
    check_sufficient(&usable, settings)?;

    let first = ModelParams::fit(&usable, settings)?;
    let (params, used) = match robust_subset(&first, &usable, settings) {
        Some(kept) => match ModelParams::fit(&kept, settings) {
            Ok(refit) => {
                info!(
                    "Robust refit dropped {} of {} samples",
                    usable.len() - kept.len(),
                    usable.len()
                );
                (refit, kept)
            }
            Err(e) => {
                warn!("Robust refit failed ({}), keeping first fit", e);
                (first, usable)
            }
        },
        None => (first, usable),
    };

    let errors = residuals(&params, &used);
    let rmse_px =
        (errors.iter().map(|e| e * e).sum::<f32>() / errors.len().max(1) as f32).sqrt();
    if !rmse_px.is_finite() {
        return Err(TrainError::NumericalFailure(
            "training residuals are not finite".into(),
        ));
    }

    let trained_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let model = CalibrationModel {
        params,
        trained_at,
        sample_count: used.len(),
        rmse_px,
    };
    info!(
        "Trained {} model on {} samples, rmse {:.1}px, confidence {:.2}",
        model.kind().as_str(),
        model.sample_count,
        rmse_px,
        model.confidence()
    );
    Ok(model)
}

/// Samples to keep after dropping the worst-fitting ones, or `None` if no
/// acceptable subset exists (and the first fit should stand).
fn robust_subset(
    first: &ModelParams,
    samples: &[CalibrationSample],
    settings: &TrainSettings,
) -> Option<Vec<CalibrationSample>> {
    let n = samples.len();
    if n < ROBUST_MIN_SAMPLES || settings.robust_drop_percent <= 0. {
        return None;
    }
    let errors = residuals(first, samples);
    let mut sorted = errors.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let min_keep = ((n as f32 * ROBUST_MIN_KEEP_RATIO).ceil() as usize).max(ROBUST_MIN_KEEP);
    let mut drop_percent = settings.robust_drop_percent;
    while drop_percent > 0. {
        let keep_percentile = (100. - drop_percent) / 100.;
        let cut_index = ((n as f32 * keep_percentile).ceil() as usize).clamp(1, n) - 1;
        let threshold = sorted[cut_index];
        let kept: Vec<CalibrationSample> = samples
            .iter()
            .zip(errors.iter())
            .filter(|(_, e)| **e <= threshold)
            .map(|(s, _)| *s)
            .collect();

        if kept.len() >= min_keep {
            if kept.len() == n {
                return None;
            }
            return match check_sufficient(&kept, settings) {
                Ok(()) => Some(kept),
                Err(e) => {
                    debug!("Robust subset rejected: {}", e);
                    None
                }
            };
        }
        drop_percent -= ROBUST_RELAX_STEP;
    }
    None
}
