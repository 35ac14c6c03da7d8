use std::fmt;

/// Which side of a reference/target pair an input belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Reference,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Reference => "reference",
            Side::Target => "target",
        })
    }
}

/// Errors returned by feature extraction, matching and correspondence selection.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("{detector} detector found no keypoints in a {width}x{height} image")]
    NoFeaturesFound {
        detector: &'static str,
        width: u32,
        height: u32,
    },
    #[error("{side} descriptor set is empty, nothing to match")]
    EmptyDescriptorSet { side: Side },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
