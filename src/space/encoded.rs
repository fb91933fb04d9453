//! Encoded space: a 1-D axis addressed through a precomputed `N×N` squared-distance table.
//!
//! The table (`lut`) replaces a closed-form distance formula: `lut[idx(a) + N·idx(b)]` is the
//! squared distance between index `idx(a)` and index `idx(b)`. An optional strictly-sorted
//! `points` vector maps a continuous value to its nearest index (ties resolve to the lower
//! index); without it, a value's index is its integer cast.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::kernel::Kernel;
use crate::space_spec::SpaceSpec;

use super::SpaceOps;

/// A space over indices into a fixed `N×N` squared-distance lookup table.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Encoded {
    spec: SpaceSpec,
    kernel: Kernel,
    lut: Vec<f64>,
    n: usize,
    points: Option<Vec<f64>>,
}

fn nearest_index_ties_low(points: &[f64], x: f64) -> usize {
    match points.binary_search_by(|v| v.partial_cmp(&x).expect("non-NaN points")) {
        Ok(i) => i,
        Err(0) => 0,
        Err(i) if i >= points.len() => points.len() - 1,
        Err(i) => {
            let lo = i - 1;
            let hi = i;
            if (points[hi] - x).abs() < (x - points[lo]).abs() {
                hi
            } else {
                lo
            }
        }
    }
}

impl Encoded {
    /// Builds an encoded space from a flattened `N×N` squared-distance table and an optional
    /// sorted `points` vector mapping continuous coordinates to indices.
    ///
    /// # Panics
    ///
    /// Panics if `lut.len() != n * n`, or if `points` is `Some` with a length other than `n`.
    #[must_use]
    pub fn new(spec: SpaceSpec, kernel: Kernel, lut: Vec<f64>, n: usize, points: Option<Vec<f64>>) -> Self {
        assert_eq!(lut.len(), n * n, "lookup table size must be n*n");
        if let Some(pts) = &points {
            assert_eq!(pts.len(), n, "points vector must have n entries");
        }
        Self {
            spec,
            kernel,
            lut,
            n,
            points,
        }
    }

    /// The lookup table's side length.
    #[must_use]
    pub const fn n(&self) -> usize {
        self.n
    }

    fn index_of(&self, x: f64) -> usize {
        match &self.points {
            Some(pts) => nearest_index_ties_low(pts, x),
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            None => x as i64 as usize,
        }
    }

    fn lut_at(&self, a: usize, b: usize) -> Option<f64> {
        if a >= self.n || b >= self.n {
            None
        } else {
            Some(self.lut[a + self.n * b])
        }
    }
}

impl SpaceOps for Encoded {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn nbw(&self) -> usize {
        1
    }

    fn default_kernel(&self) -> Component {
        let loc0 = self.points.as_ref().map_or(0.0, |pts| pts[0]);
        Component::new(vec![loc0], vec![1.0], self.kernel.scale_factor(&[1.0], false))
    }

    fn compute_scale_factor(&self, bw: &[f64], log: bool) -> f64 {
        self.kernel.scale_factor(bw, log)
    }

    fn compute_scale_factor_selected(&self, bw: &[f64], log: bool, selection: &[bool]) -> f64 {
        self.kernel.scale_factor_selected(bw, log, selection)
    }

    /// A lookup miss (either index falls outside the `N×N` table) never merges: it reports
    /// `threshold`, the cutoff sentinel, rather than an error.
    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        refbw: &[f64],
        targetloc: &[f64],
        threshold: f64,
    ) -> f64 {
        let i_target = self.index_of(targetloc[0]);
        let i_ref = self.index_of(refloc[0]);
        match self.lut_at(i_target, i_ref) {
            Some(d2_raw) => {
                let d2 = d2_raw / (refbw[0] * refbw[0]);
                if d2 >= threshold {
                    threshold
                } else {
                    d2
                }
            }
            None => threshold,
        }
    }

    /// Picks the index `k*` minimizing `w1·lut[k][i1] + w2·lut[k][i2]`; the merged location is
    /// that index (or `points[k*]`), the merged bandwidth folds in the pairwise distance
    /// `lut[i1][i2]` the way [`crate::space::circular::Circular::merge`] folds in the angular
    /// separation of its two means.
    fn merge(&self, w1: f64, loc1: &mut [f64], bw1: &mut [f64], w2: f64, loc2: &[f64], bw2: &[f64]) {
        let i1 = self.index_of(loc1[0]);
        let i2 = self.index_of(loc2[0]);
        let wsum = w1 + w2;

        let mut best_k = 0;
        let mut best_cost = f64::INFINITY;
        for k in 0..self.n {
            let d1 = self.lut_at(k, i1).unwrap_or(f64::INFINITY);
            let d2 = self.lut_at(k, i2).unwrap_or(f64::INFINITY);
            let cost = w1 * d1 + w2 * d2;
            if cost < best_cost {
                best_cost = cost;
                best_k = k;
            }
        }

        let cross = self.lut_at(i1, i2).unwrap_or(0.0);
        let new_var = w1 * bw1[0] * bw1[0] / wsum
            + w2 * bw2[0] * bw2[0] / wsum
            + w1 * w2 * cross / (wsum * wsum);
        bw1[0] = new_var.sqrt();
        #[allow(clippy::cast_precision_loss)]
        {
            loc1[0] = self
                .points
                .as_ref()
                .map_or(best_k as f64, |pts| pts[best_k]);
        }
    }

    fn probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        let d2 = self.mahalanobis_distance_squared(loc, bw, point, f64::INFINITY);
        self.kernel.scale_factor(bw, false) * self.kernel.probability(d2)
    }

    fn log_probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        let d2 = self.mahalanobis_distance_squared(loc, bw, point, f64::INFINITY);
        self.kernel.scale_factor(bw, true) + self.kernel.log_probability(d2)
    }

    fn partial_logp(&self, loc: &[f64], bw: &[f64], point: &[f64], selection: &[bool]) -> f64 {
        if selection.first().copied().unwrap_or(false) {
            let d2 = self.mahalanobis_distance_squared(loc, bw, point, f64::INFINITY);
            self.kernel.log_probability(d2)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;

    fn squared_diff_lut(n: usize) -> Vec<f64> {
        let mut lut = vec![0.0; n * n];
        for a in 0..n {
            for b in 0..n {
                #[allow(clippy::cast_precision_loss)]
                let d = a as f64 - b as f64;
                lut[a + n * b] = d * d;
            }
        }
        lut
    }

    fn space() -> Encoded {
        let dims = vec![DimensionSpec::new("bin", DimensionKind::Encoded, "")];
        Encoded::new(
            SpaceSpec::new(dims).unwrap(),
            Gaussian::new(3.0).into(),
            squared_diff_lut(5),
            5,
            None,
        )
    }

    #[test]
    fn distance_is_zero_for_matching_index() {
        let s = space();
        assert_eq!(
            s.mahalanobis_distance_squared(&[2.0], &[1.0], &[2.0], f64::INFINITY),
            0.0
        );
    }

    #[test]
    fn lookup_miss_reports_threshold() {
        let s = space();
        let threshold = 9.0;
        assert_eq!(
            s.mahalanobis_distance_squared(&[20.0], &[1.0], &[2.0], threshold),
            threshold
        );
    }

    #[test]
    fn merge_picks_index_minimizing_weighted_cost() {
        let s = space();
        let mut loc1 = vec![1.0];
        let mut bw1 = vec![1.0];
        s.merge(1.0, &mut loc1, &mut bw1, 1.0, &[3.0], &[1.0]);
        assert_eq!(loc1[0], 2.0);
    }

    #[test]
    fn points_based_index_ties_resolve_low() {
        let dims = vec![DimensionSpec::new("bin", DimensionKind::Encoded, "")];
        let s = Encoded::new(
            SpaceSpec::new(dims).unwrap(),
            Gaussian::new(3.0).into(),
            squared_diff_lut(4),
            4,
            Some(vec![0.0, 1.0, 2.0, 3.0]),
        );
        assert_eq!(s.index_of(1.5), 1);
    }
}
