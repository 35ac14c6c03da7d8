use std::fmt;

use georeg_core::GeotransformError;
use georeg_features::FeatureError;
use serde::{Deserialize, Serialize};

use crate::{AoiError, ConfigError, GcpWriteError, RasterError, TranslateError};

/// States of a registration run, in the order they are entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStage {
    Idle,
    ExtractingFeatures,
    Matching,
    Filtering,
    DecidingSufficiency,
    Registering,
    Aborted,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistrationStage::Idle => "validating inputs",
            RegistrationStage::ExtractingFeatures => "extracting features",
            RegistrationStage::Matching => "matching",
            RegistrationStage::Filtering => "filtering",
            RegistrationStage::DecidingSufficiency => "deciding sufficiency",
            RegistrationStage::Registering => "registering",
            RegistrationStage::Aborted => "aborted",
        })
    }
}

/// Failure of a registration run, tagged with the stage and offending input.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("{stage}: invalid geotransform for {input}: {source}")]
    InvalidGeotransform {
        stage: RegistrationStage,
        input: String,
        #[source]
        source: GeotransformError,
    },
    #[error("{stage}: {input}: {source}")]
    Raster {
        stage: RegistrationStage,
        input: String,
        #[source]
        source: RasterError,
    },
    #[error("{stage}: {input}: {source}")]
    Features {
        stage: RegistrationStage,
        input: String,
        #[source]
        source: FeatureError,
    },
    #[error("{stage}: area of interest: {source}")]
    Aoi {
        stage: RegistrationStage,
        #[source]
        source: AoiError,
    },
    #[error("{stage}: GCP output: {source}")]
    GcpWrite {
        stage: RegistrationStage,
        #[source]
        source: GcpWriteError,
    },
    #[error("{stage}: external invocation on {input}: {source}")]
    ExternalInvocation {
        stage: RegistrationStage,
        input: String,
        #[source]
        source: TranslateError,
    },
}

impl RegistrationError {
    pub fn stage(&self) -> RegistrationStage {
        match self {
            RegistrationError::InvalidGeotransform { stage, .. }
            | RegistrationError::Raster { stage, .. }
            | RegistrationError::Features { stage, .. }
            | RegistrationError::Aoi { stage, .. }
            | RegistrationError::GcpWrite { stage, .. }
            | RegistrationError::ExternalInvocation { stage, .. } => *stage,
        }
    }
}

/// Top-level error of the `georeg` facade.
#[derive(thiserror::Error, Debug)]
pub enum GeoregError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Geotransform(#[from] GeotransformError),
}
