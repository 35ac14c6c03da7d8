//! GCP assembly, the sufficiency rule and GeoJSON persistence.

use std::fs;
use std::path::{Path, PathBuf};

use georeg_core::Gcp;
use serde_json::{json, Value};

/// Fewest GCPs the warp step is run with.
pub const MIN_GCPS: usize = 5;

/// CRS name written into persisted GCP files.
const GEOJSON_CRS_NAME: &str = "urn:ogc:def:crs:EPSG::4326";

#[derive(thiserror::Error, Debug)]
pub enum GcpWriteError {
    #[error("cannot write GCP file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize GCPs: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rank-ordered ground control points of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GcpSet {
    gcps: Vec<Gcp>,
}

impl GcpSet {
    /// Assemble GCPs from accepted correspondences, keeping their order.
    pub fn assemble(accepted: impl IntoIterator<Item = Gcp>) -> Self {
        Self {
            gcps: accepted.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.gcps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gcps.is_empty()
    }

    pub fn as_slice(&self) -> &[Gcp] {
        &self.gcps
    }

    pub fn into_vec(self) -> Vec<Gcp> {
        self.gcps
    }

    pub fn is_sufficient(&self) -> bool {
        is_sufficient(&self.gcps)
    }

    pub fn write_geojson(&self, path: impl AsRef<Path>) -> Result<(), GcpWriteError> {
        write_points(&self.gcps, path)
    }
}

#[inline]
pub fn is_sufficient(gcps: &[Gcp]) -> bool {
    gcps.len() >= MIN_GCPS
}

/// GCPs as a GeoJSON point `FeatureCollection` in EPSG:4326.
///
/// Each feature's geometry is the reference geocoordinate; the target pixel
/// and the GCP's position in the list are kept as properties.
pub fn to_geojson(gcps: &[Gcp]) -> Value {
    let features: Vec<Value> = gcps
        .iter()
        .enumerate()
        .map(|(rank, g)| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [g.reference.lon(), g.reference.lat()],
                },
                "properties": {
                    "rank": rank,
                    "target_x": g.target.x,
                    "target_y": g.target.y,
                },
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "crs": {
            "type": "name",
            "properties": { "name": GEOJSON_CRS_NAME },
        },
        "features": features,
    })
}

/// Write `gcps` to `path` as GeoJSON, replacing any existing file.
pub fn write_points(gcps: &[Gcp], path: impl AsRef<Path>) -> Result<(), GcpWriteError> {
    let path = path.as_ref();
    let text = serde_json::to_string_pretty(&to_geojson(gcps))?;
    fs::write(path, text).map_err(|source| GcpWriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {} GCPs to {}", gcps.len(), path.display());
    Ok(())
}
