//! JSON configuration for a registration run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use georeg_core::{GeoTransform, GeotransformError};
use georeg_features::{DetectorParams, FeatureAlgorithm};
use serde::{Deserialize, Serialize};

use crate::GdalTranslate;

/// Default number of top-ranked matches turned into GCP candidates.
pub const DEFAULT_KEYPOINT_LIMIT: i64 = 10;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn default_limit() -> Option<i64> {
    Some(DEFAULT_KEYPOINT_LIMIT)
}

fn default_translate_program() -> PathBuf {
    PathBuf::from("gdal_translate")
}

fn default_true() -> bool {
    true
}

/// Parameters of one co-registration run.
///
/// Every field has a default, so partial JSON files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default)]
    pub algorithm: FeatureAlgorithm,
    /// Top-N matches to use; `None` or `0` uses all of them.
    #[serde(default = "default_limit")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub aoi_path: Option<PathBuf>,
    /// Where to write the GCP GeoJSON, if anywhere.
    #[serde(default)]
    pub gcp_path: Option<PathBuf>,
    /// Textual geotransform that replaces the reference raster's metadata.
    #[serde(default)]
    pub reference_geotransform: Option<String>,
    #[serde(default = "default_true")]
    pub parallel_extraction: bool,
    /// Run everything except the translate process.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_translate_program")]
    pub translate_program: PathBuf,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub detectors: DetectorParams,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            algorithm: FeatureAlgorithm::default(),
            limit: default_limit(),
            aoi_path: None,
            gcp_path: None,
            reference_geotransform: None,
            parallel_extraction: true,
            dry_run: false,
            translate_program: default_translate_program(),
            timeout_secs: None,
            detectors: DetectorParams::default(),
        }
    }
}

impl RegistrationConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_pretty_json(self, path.as_ref())
    }

    /// Parsed reference geotransform override, if one is configured.
    pub fn geotransform_override(&self) -> Option<Result<GeoTransform, GeotransformError>> {
        self.reference_geotransform.as_deref().map(GeoTransform::parse)
    }

    /// The translate step described by this config.
    pub fn translator(&self) -> GdalTranslate {
        GdalTranslate::new(&self.translate_program)
            .with_timeout(self.timeout_secs.map(Duration::from_secs))
    }
}

pub(crate) fn write_pretty_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
