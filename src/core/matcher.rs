// src/core/matcher.rs

use crate::core::InterestPoint;
use tracing::debug;

/// Nearest-neighbor ratio accepted by [`match_points`] (Lowe's test).
pub const MATCH_RATIO: f32 = 0.65;

/// One accepted descriptor correspondence.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMatch {
    /// Index into the query set.
    pub query: usize,
    /// Index into the train set.
    pub train: usize,
    /// Descriptor Euclidean distance of the accepted pair.
    pub distance: f32,
}

/// Matches every query point against the two nearest train points by
/// descriptor distance, accepting only unambiguous correspondences
/// (`d1/d2 < 0.65`). The position delta to the matched point is written
/// back onto the query point for motion-tracking use.
pub fn match_points(
    query: &mut [InterestPoint],
    train: &[InterestPoint],
) -> Vec<DescriptorMatch> {
    let mut matches = Vec::new();

    for (qi, qp) in query.iter_mut().enumerate() {
        let mut d1 = f32::INFINITY;
        let mut d2 = f32::INFINITY;
        let mut best = usize::MAX;

        for (ti, tp) in train.iter().enumerate() {
            let d = qp.descriptor_distance_sq(tp);
            if d < d1 {
                d2 = d1;
                d1 = d;
                best = ti;
            } else if d < d2 {
                d2 = d;
            }
        }

        if best != usize::MAX && d1.sqrt() < MATCH_RATIO * d2.sqrt() {
            let tp = &train[best];
            qp.dx = tp.x - qp.x;
            qp.dy = tp.y - qp.y;
            matches.push(DescriptorMatch {
                query: qi,
                train: best,
                distance: d1.sqrt(),
            });
        }
    }

    debug!(
        matched = matches.len(),
        queried = query.len(),
        "descriptor matching finished"
    );
    matches
}
