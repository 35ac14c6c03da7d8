//! Machine-readable summary of a registration run.

use std::path::Path;

use georeg_features::FeatureAlgorithm;
use serde::{Deserialize, Serialize};

use crate::config::write_pretty_json;
use crate::{ConfigError, RegistrationOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Registered,
    Aborted,
    Failed,
}

/// Wall-clock time spent per stage, in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub extract_ms: f64,
    pub match_ms: f64,
    pub filter_ms: f64,
    pub translate_ms: f64,
    pub total_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReport {
    pub target_path: String,
    pub reference_path: String,
    pub algorithm: FeatureAlgorithm,
    #[serde(default)]
    pub reference_geotransform: Option<[f64; 6]>,
    #[serde(default)]
    pub reference_keypoints: usize,
    #[serde(default)]
    pub target_keypoints: usize,
    #[serde(default)]
    pub matches: usize,
    #[serde(default)]
    pub selected: usize,
    #[serde(default)]
    pub accepted: usize,
    /// `(target_x, target_y, lon, lat)` per GCP, in rank order.
    #[serde(default)]
    pub gcps: Vec<[f64; 4]>,
    #[serde(default)]
    pub outcome: Option<OutcomeKind>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub translate_args: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub timings: StageTimings,
    #[serde(default)]
    pub error: Option<String>,
}

impl RegistrationReport {
    pub fn new(target: &Path, reference: &Path, algorithm: FeatureAlgorithm) -> Self {
        Self {
            target_path: target.display().to_string(),
            reference_path: reference.display().to_string(),
            algorithm,
            reference_geotransform: None,
            reference_keypoints: 0,
            target_keypoints: 0,
            matches: 0,
            selected: 0,
            accepted: 0,
            gcps: Vec::new(),
            outcome: None,
            output_path: None,
            translate_args: Vec::new(),
            dry_run: false,
            timings: StageTimings::default(),
            error: None,
        }
    }

    /// Record the final outcome of the run.
    pub fn record_outcome(&mut self, outcome: &RegistrationOutcome) {
        match outcome {
            RegistrationOutcome::Registered { output, .. } => {
                self.outcome = Some(OutcomeKind::Registered);
                self.output_path = Some(output.display().to_string());
            }
            RegistrationOutcome::Aborted { .. } => {
                self.outcome = Some(OutcomeKind::Aborted);
                self.output_path = None;
            }
        }
        self.gcps = outcome.gcps().iter().map(|g| g.to_tuple()).collect();
    }

    pub fn record_error(&mut self, error: &impl std::fmt::Display) {
        self.outcome = Some(OutcomeKind::Failed);
        self.error = Some(error.to_string());
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_pretty_json(self, path.as_ref())
    }
}
