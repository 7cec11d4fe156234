use std::fs;

use anyhow::{anyhow, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::RecordError,
    systems::mapping::{CalibrationModel, ModelKind, ModelParams},
};

/// Persisted form of a trained model; enough to rebuild it without retraining
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationRecord {
    pub kind: String,
    pub parameters: Value,
    /// Seconds since the unix epoch
    pub trained_at: u64,
    pub sample_count: usize,
    #[serde(default)]
    pub rmse_px: f32,
}

impl CalibrationRecord {
    pub fn from_model(model: &CalibrationModel) -> Result<Self, serde_json::Error> {
        let parameters = match model.params() {
            ModelParams::Polynomial(p) => serde_json::to_value(p)?,
            ModelParams::ShallowNetwork(n) => serde_json::to_value(n)?,
        };
        Ok(CalibrationRecord {
            kind: model.kind().as_str().into(),
            parameters,
            trained_at: model.trained_at(),
            sample_count: model.sample_count(),
            rmse_px: model.rmse_px(),
        })
    }

    pub fn to_model(&self) -> Result<CalibrationModel, RecordError> {
        let kind = ModelKind::parse(&self.kind)
            .ok_or_else(|| RecordError::UnknownKind(self.kind.clone()))?;
        let corrupt = |e: serde_json::Error| RecordError::ModelLoadCorrupt(e.to_string());
        let params = match kind {
            ModelKind::Polynomial => {
                ModelParams::Polynomial(serde_json::from_value(self.parameters.clone()).map_err(corrupt)?)
            }
            ModelKind::ShallowNetwork => ModelParams::ShallowNetwork(
                serde_json::from_value(self.parameters.clone()).map_err(corrupt)?,
            ),
        };
        if !params.is_well_formed() {
            return Err(RecordError::ModelLoadCorrupt(format!(
                "{} parameters have the wrong shape or non-finite values",
                self.kind
            )));
        }
        Ok(CalibrationModel::from_parts(
            params,
            self.trained_at,
            self.sample_count,
            self.rmse_px,
        ))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, RecordError> {
        serde_json::from_str(text).map_err(|e| RecordError::ModelLoadCorrupt(e.to_string()))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_msgpack(payload: &[u8]) -> Result<Self, RecordError> {
        rmp_serde::from_slice(payload).map_err(|e| RecordError::ModelLoadCorrupt(e.to_string()))
    }
}

pub fn save_record_to_file(record: &CalibrationRecord, path: &str) -> Result<()> {
    let text = record.to_json()?;
    fs::write(path, text).map_err(|e| anyhow!("Error writing calibration to {}: {}", path, e))?;
    info!("Wrote {} calibration to file: {:?}", record.kind, path);
    Ok(())
}

pub fn load_record_from_file(path: &str) -> Result<CalibrationRecord> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to load calibration from {}: {}", path, e))?;
    let record = CalibrationRecord::from_json(&text)?;
    debug!(
        "Loaded {} calibration trained at {} on {} samples",
        record.kind, record.trained_at, record.sample_count
    );
    Ok(record)
}
