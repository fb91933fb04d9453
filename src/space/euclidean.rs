//! Euclidean space: a product of continuous axes sharing one kernel shape.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::kernel::Kernel;
use crate::space_spec::SpaceSpec;

use super::SpaceOps;

/// A continuous `n`-dimensional space evaluated through a single [`Kernel`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Euclidean {
    spec: SpaceSpec,
    kernel: Kernel,
}

impl Euclidean {
    /// Builds a Euclidean space from a spec and the kernel shared by all its dimensions.
    #[must_use]
    pub fn new(spec: SpaceSpec, kernel: Kernel) -> Self {
        Self { spec, kernel }
    }
}

impl SpaceOps for Euclidean {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn nbw(&self) -> usize {
        self.spec.ndim()
    }

    fn default_kernel(&self) -> Component {
        Component::new(
            vec![0.0; self.spec.ndim()],
            vec![1.0; self.spec.ndim()],
            self.kernel.scale_factor(&vec![1.0; self.spec.ndim()], false),
        )
    }

    fn compute_scale_factor(&self, bw: &[f64], log: bool) -> f64 {
        self.kernel.scale_factor(bw, log)
    }

    fn compute_scale_factor_selected(&self, bw: &[f64], log: bool, selection: &[bool]) -> f64 {
        self.kernel.scale_factor_selected(bw, log, selection)
    }

    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        refbw: &[f64],
        targetloc: &[f64],
        threshold: f64,
    ) -> f64 {
        let mut d = 0.0;
        for ((&r, &b), &t) in refloc.iter().zip(refbw).zip(targetloc) {
            let tmp = (t - r) / b;
            d += tmp * tmp;
            if d >= threshold {
                return threshold;
            }
        }
        d
    }

    fn merge(&self, w1: f64, loc1: &mut [f64], bw1: &mut [f64], w2: f64, loc2: &[f64], bw2: &[f64]) {
        let wsum = w1 + w2;
        for i in 0..loc1.len() {
            let new_loc = (w1 * loc1[i] + w2 * loc2[i]) / wsum;
            let var1 = bw1[i] * bw1[i] + (loc1[i] - new_loc) * (loc1[i] - new_loc);
            let var2 = bw2[i] * bw2[i] + (loc2[i] - new_loc) * (loc2[i] - new_loc);
            bw1[i] = ((w1 * var1 + w2 * var2) / wsum).sqrt();
            loc1[i] = new_loc;
        }
    }

    fn probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        self.kernel.scale_factor(bw, false) * self.kernel.probability_point(loc, bw, point)
    }

    fn log_probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        self.kernel.scale_factor(bw, true) + self.kernel.log_probability_point(loc, bw, point)
    }

    fn partial_logp(&self, loc: &[f64], bw: &[f64], point: &[f64], selection: &[bool]) -> f64 {
        self.kernel.partial_logp(loc, bw, point, selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;
    use float_cmp::approx_eq;

    fn space(ndim: usize) -> Euclidean {
        let dims = (0..ndim)
            .map(|i| DimensionSpec::new(format!("x{i}"), DimensionKind::Euclidean, ""))
            .collect();
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into())
    }

    #[test]
    fn probability_peaks_at_location() {
        let s = space(2);
        let loc = vec![1.0, 2.0];
        let bw = vec![0.5, 0.5];
        let p_at = s.probability(&loc, &bw, &loc);
        let p_off = s.probability(&loc, &bw, &[1.0, 3.0]);
        assert!(p_at > p_off);
    }

    #[test]
    fn merge_of_identical_components_is_unchanged() {
        let s = space(1);
        let mut loc1 = vec![1.0];
        let mut bw1 = vec![0.2];
        s.merge(0.5, &mut loc1, &mut bw1, 0.5, &[1.0], &[0.2]);
        assert!(approx_eq!(f64, loc1[0], 1.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, bw1[0], 0.2, epsilon = 1e-12));
    }

    #[test]
    fn merge_location_is_weighted_mean() {
        let s = space(1);
        let mut loc1 = vec![0.0];
        let mut bw1 = vec![1.0];
        s.merge(1.0, &mut loc1, &mut bw1, 3.0, &[4.0], &[1.0]);
        assert!(approx_eq!(f64, loc1[0], 3.0, epsilon = 1e-9));
    }
}
