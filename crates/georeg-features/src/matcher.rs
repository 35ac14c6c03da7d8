//! Brute-force cross-checked descriptor matching.

use crate::{Descriptor, FeatureError, Side};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A mutual nearest-neighbour correspondence between two descriptor sets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
    /// Index into the reference keypoints/descriptors.
    pub reference: usize,
    /// Index into the target keypoints/descriptors.
    pub target: usize,
    /// Descriptor distance under the family's metric.
    pub distance: f32,
}

/// Match `reference` against `target` with cross-check semantics.
///
/// A pair `(r, t)` is kept only if `t` is the nearest target descriptor to `r`
/// and `r` is the nearest reference descriptor to `t`. Nearest-neighbour ties
/// resolve to the lowest index. The result is sorted by ascending distance;
/// equal distances keep `(reference, target)` order.
///
/// Exhaustive `O(n·m)` search.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(reference = reference.len(), target = target.len()))
)]
pub fn match_descriptors<D: Descriptor>(
    reference: &[D],
    target: &[D],
) -> Result<Vec<Match>, FeatureError> {
    if reference.is_empty() {
        return Err(FeatureError::EmptyDescriptorSet {
            side: Side::Reference,
        });
    }
    if target.is_empty() {
        return Err(FeatureError::EmptyDescriptorSet { side: Side::Target });
    }

    // best target for each reference descriptor, and best reference for each target
    let mut fwd: Vec<(usize, f32)> = vec![(usize::MAX, f32::INFINITY); reference.len()];
    let mut bwd: Vec<(usize, f32)> = vec![(usize::MAX, f32::INFINITY); target.len()];

    for (r, rd) in reference.iter().enumerate() {
        for (t, td) in target.iter().enumerate() {
            let d = rd.distance(td);
            if d < fwd[r].1 {
                fwd[r] = (t, d);
            }
            if d < bwd[t].1 {
                bwd[t] = (r, d);
            }
        }
    }

    let mut matches: Vec<Match> = fwd
        .iter()
        .enumerate()
        .filter_map(|(r, &(t, distance))| {
            (t != usize::MAX && bwd[t].0 == r).then_some(Match {
                reference: r,
                target: t,
                distance,
            })
        })
        .collect();

    // stable: ties stay in reference order, and each reference appears once
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    log::debug!(
        "cross-check ({}): {} mutual matches from {}x{} descriptors",
        D::METRIC,
        matches.len(),
        reference.len(),
        target.len()
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryDescriptor, FloatDescriptor, FLOAT_DESCRIPTOR_LEN};

    fn bin(bits: &[usize]) -> BinaryDescriptor {
        let mut d = BinaryDescriptor([0u8; 32]);
        for &b in bits {
            d.set_bit(b);
        }
        d
    }

    fn float(v: f32) -> FloatDescriptor {
        let mut d = FloatDescriptor([0.0; FLOAT_DESCRIPTOR_LEN]);
        d.0[0] = v;
        d
    }

    fn brute_nearest<D: Descriptor>(q: &D, set: &[D]) -> usize {
        let mut best = 0;
        for (i, d) in set.iter().enumerate() {
            if q.distance(d) < q.distance(&set[best]) {
                best = i;
            }
        }
        best
    }

    #[test]
    fn empty_sets_are_rejected() {
        let some = vec![bin(&[1])];
        assert_eq!(
            match_descriptors::<BinaryDescriptor>(&[], &some).unwrap_err(),
            FeatureError::EmptyDescriptorSet {
                side: Side::Reference
            }
        );
        assert_eq!(
            match_descriptors::<BinaryDescriptor>(&some, &[]).unwrap_err(),
            FeatureError::EmptyDescriptorSet { side: Side::Target }
        );
    }

    #[test]
    fn many_to_one_candidates_collapse_to_the_mutual_pair() {
        // both references are closest to target 0, only the nearer one survives
        let reference = vec![bin(&[0, 1]), bin(&[0, 1, 2, 3])];
        let target = vec![bin(&[0]), bin(&[100, 101, 102, 103, 104, 105, 106, 107])];
        let m = match_descriptors(&reference, &target).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!((m[0].reference, m[0].target), (0, 0));
        assert_eq!(m[0].distance, 1.0);
    }

    #[test]
    fn output_is_sorted_and_mutually_nearest() {
        let reference: Vec<FloatDescriptor> =
            [0.0, 10.0, 4.0, 7.5, 30.0, 2.0].into_iter().map(float).collect();
        let target: Vec<FloatDescriptor> =
            [9.0, 0.5, 31.0, 4.25, 7.0, 50.0, 2.5].into_iter().map(float).collect();
        let m = match_descriptors(&reference, &target).unwrap();
        assert!(!m.is_empty());
        for w in m.windows(2) {
            assert!(w[0].distance <= w[1].distance);
        }
        for mm in &m {
            assert_eq!(brute_nearest(&reference[mm.reference], &target), mm.target);
            assert_eq!(brute_nearest(&target[mm.target], &reference), mm.reference);
        }
    }

    #[test]
    fn equal_distances_keep_reference_order() {
        let reference = vec![bin(&[5]), bin(&[6]), bin(&[7])];
        let target = vec![bin(&[7, 200]), bin(&[5, 201]), bin(&[6, 202])];
        let m = match_descriptors(&reference, &target).unwrap();
        let pairs: Vec<(usize, usize)> = m.iter().map(|x| (x.reference, x.target)).collect();
        assert_eq!(pairs, vec![(0, 1), (1, 2), (2, 0)]);
        assert!(m.iter().all(|x| x.distance == 1.0));
    }

    #[test]
    fn nearest_ties_resolve_to_lowest_index() {
        let reference = vec![bin(&[1])];
        let target = vec![bin(&[1, 2]), bin(&[1, 3])];
        let m = match_descriptors(&reference, &target).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].target, 0);
    }
}
