//! Descriptor families and the distance metric each one is bound to.

use std::fmt;

/// Distance metric used to compare descriptors of one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Hamming,
    Euclidean,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Hamming => "hamming",
            Metric::Euclidean => "euclidean",
        })
    }
}

/// A feature descriptor with its one valid distance function.
///
/// The metric is an associated constant, so binary descriptors can only ever
/// be compared by Hamming distance and float descriptors by Euclidean distance.
pub trait Descriptor: Clone + Send + Sync {
    const METRIC: Metric;

    fn distance(&self, other: &Self) -> f32;
}

/// Bits per binary (ORB) descriptor.
pub const BINARY_DESCRIPTOR_BITS: usize = 256;

/// 256-bit binary descriptor, compared by Hamming distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BinaryDescriptor(pub [u8; BINARY_DESCRIPTOR_BITS / 8]);

impl BinaryDescriptor {
    #[inline]
    pub fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    #[inline]
    pub(crate) fn set_bit(&mut self, bit: usize) {
        self.0[bit / 8] |= 1 << (bit % 8);
    }
}

impl Descriptor for BinaryDescriptor {
    const METRIC: Metric = Metric::Hamming;

    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        self.hamming(other) as f32
    }
}

/// Length of a float (SIFT) descriptor: 4×4 spatial cells × 8 orientation bins.
pub const FLOAT_DESCRIPTOR_LEN: usize = 128;

/// 128-dimensional gradient histogram descriptor, compared by Euclidean distance.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatDescriptor(pub [f32; FLOAT_DESCRIPTOR_LEN]);

impl Descriptor for FloatDescriptor {
    const METRIC: Metric = Metric::Euclidean;

    #[inline]
    fn distance(&self, other: &Self) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}
