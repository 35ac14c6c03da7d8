//! Selection of the feature family used for a registration run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{FeatureError, Metric, OrbParams, SiftParams};

/// Feature family. Fixes both the detector and the matching metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureAlgorithm {
    #[default]
    Orb,
    Sift,
}

impl FeatureAlgorithm {
    pub const ALL: [FeatureAlgorithm; 2] = [FeatureAlgorithm::Orb, FeatureAlgorithm::Sift];

    /// Lowercase name, also used in output file names.
    pub fn name(self) -> &'static str {
        match self {
            FeatureAlgorithm::Orb => "orb",
            FeatureAlgorithm::Sift => "sift",
        }
    }

    pub fn metric(self) -> Metric {
        match self {
            FeatureAlgorithm::Orb => Metric::Hamming,
            FeatureAlgorithm::Sift => Metric::Euclidean,
        }
    }
}

impl fmt::Display for FeatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureAlgorithm {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                FeatureError::InvalidArgument(format!(
                    "unknown feature algorithm {s:?}, expected \"orb\" or \"sift\""
                ))
            })
    }
}

/// Per-family detector parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub orb: OrbParams,
    pub sift: SiftParams,
}
