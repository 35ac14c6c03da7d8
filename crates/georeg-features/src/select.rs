//! Top-N correspondence selection.

use georeg_core::PixelPoint;

use crate::{FeatureError, Keypoint, Match};

/// Rank-aligned pixel pairs: `reference[i]` corresponds to `target[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correspondences {
    pub reference: Vec<PixelPoint>,
    pub target: Vec<PixelPoint>,
}

impl Correspondences {
    #[inline]
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PixelPoint, &PixelPoint)> {
        self.reference.iter().zip(self.target.iter())
    }
}

/// Validate a user-supplied keypoint limit.
///
/// `None` and `Some(0)` mean "no cap"; negative values are rejected.
pub fn keypoint_limit(limit: Option<i64>) -> Result<Option<usize>, FeatureError> {
    match limit {
        None | Some(0) => Ok(None),
        Some(n) if n < 0 => Err(FeatureError::InvalidArgument(format!(
            "keypoint limit must be non-negative, got {n}"
        ))),
        Some(n) => usize::try_from(n).map(Some).map_err(|_| {
            FeatureError::InvalidArgument(format!("keypoint limit {n} does not fit in usize"))
        }),
    }
}

/// Take the first `limit` ranked matches and map them back to pixel coordinates.
///
/// Fewer matches than `limit` is not an error: every available match is returned.
pub fn select_correspondences(
    matches: &[Match],
    reference: &[Keypoint],
    target: &[Keypoint],
    limit: Option<i64>,
) -> Result<Correspondences, FeatureError> {
    let cap = keypoint_limit(limit)?.unwrap_or(matches.len());
    let take = cap.min(matches.len());

    let mut out = Correspondences {
        reference: Vec::with_capacity(take),
        target: Vec::with_capacity(take),
    };
    for (rank, m) in matches.iter().take(take).enumerate() {
        let (Some(r), Some(t)) = (reference.get(m.reference), target.get(m.target)) else {
            return Err(FeatureError::InvalidArgument(format!(
                "match #{rank} refers to keypoints ({}, {}) outside ({}, {}) keypoint lists",
                m.reference,
                m.target,
                reference.len(),
                target.len()
            )));
        };
        out.reference.push(to_pixel(r));
        out.target.push(to_pixel(t));
    }
    Ok(out)
}

#[inline]
fn to_pixel(kp: &Keypoint) -> PixelPoint {
    PixelPoint::new(kp.position.x as f64, kp.position.y as f64)
}
