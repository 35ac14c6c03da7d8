//! Geocoding of reference pixels and area-of-interest filtering.

use georeg_core::{Gcp, GeoTransform, PixelPoint};
use georeg_features::FeatureError;

use crate::AreaOfInterest;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Geocode each reference pixel and keep the pairs whose geo point falls in
/// the AOI.
///
/// With no AOI every pair is kept. An AOI without polygons keeps nothing.
/// Rank order is preserved, and the returned GCPs pair the *target* pixel
/// with the *reference* geocoordinate.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(pairs = reference.len(), aoi = aoi.is_some()))
)]
pub fn filter_correspondences(
    reference: &[PixelPoint],
    target: &[PixelPoint],
    geotransform: &GeoTransform,
    aoi: Option<&AreaOfInterest>,
) -> Result<Vec<Gcp>, FeatureError> {
    if reference.len() != target.len() {
        return Err(FeatureError::InvalidArgument(format!(
            "{} reference pixels but {} target pixels",
            reference.len(),
            target.len()
        )));
    }

    let accepted: Vec<Gcp> = reference
        .iter()
        .zip(target)
        .filter_map(|(r, t)| {
            let geo = geotransform.pixel_to_geo(r.x, r.y);
            aoi.is_none_or(|a| a.contains(&geo))
                .then(|| Gcp::new(*t, geo))
        })
        .collect();

    log::debug!(
        "spatial filter kept {}/{} correspondences",
        accepted.len(),
        reference.len()
    );
    Ok(accepted)
}
