//! Circular space: a single angular axis wrapping at `2π`, evaluated through a von Mises kernel.
//!
//! Unlike the other spaces this one does not route pointwise evaluation through
//! [`crate::kernel::KernelOps::probability`]'s squared-distance contract: the von Mises
//! density's Gaussian-approximation and raw-cosine branches both need the bare angular
//! difference, not `Δ² · κ`, so the branch lives here directly rather than behind the kernel.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::fastmath::{circular_difference, fastexp64};
use crate::kernel::{vonmises_scale_factor, KAPPA_GAUSS_APPROX};
use crate::space_spec::SpaceSpec;

use super::SpaceOps;

/// A wrapping angular space. The sole bandwidth entry is the von Mises concentration `κ`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Circular {
    spec: SpaceSpec,
    default_kappa: f64,
}

impl Circular {
    /// Builds a circular space with the concentration used for its default component.
    #[must_use]
    pub fn new(spec: SpaceSpec, default_kappa: f64) -> Self {
        Self { spec, default_kappa }
    }
}

fn log_kernel_value(kappa: f64, diff: f64) -> f64 {
    if kappa > KAPPA_GAUSS_APPROX {
        -0.5 * diff * diff * kappa
    } else {
        kappa * diff.cos()
    }
}

fn wrap_to_2pi(mut a: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    a %= two_pi;
    if a < 0.0 {
        a += two_pi;
    }
    a
}

impl SpaceOps for Circular {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn nbw(&self) -> usize {
        1
    }

    fn default_kernel(&self) -> Component {
        Component::new(
            vec![0.0],
            vec![self.default_kappa],
            vonmises_scale_factor(self.default_kappa, false),
        )
    }

    fn compute_scale_factor(&self, bw: &[f64], log: bool) -> f64 {
        vonmises_scale_factor(bw[0], log)
    }

    fn compute_scale_factor_selected(&self, bw: &[f64], log: bool, selection: &[bool]) -> f64 {
        if selection.first().copied().unwrap_or(false) {
            vonmises_scale_factor(bw[0], log)
        } else if log {
            0.0
        } else {
            1.0
        }
    }

    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        refbw: &[f64],
        targetloc: &[f64],
        threshold: f64,
    ) -> f64 {
        let d = circular_difference(refloc[0], targetloc[0]);
        let d2 = d * d * refbw[0];
        if d2 >= threshold {
            threshold
        } else {
            d2
        }
    }

    /// `κ'` combines the two components' own spread (inverse-concentration, weighted) with the
    /// spread introduced by their separation; `μ'` moves from `μ₁` towards `μ₂` by the shorter
    /// arc, weighted by `w₂`.
    fn merge(&self, w1: f64, loc1: &mut [f64], bw1: &mut [f64], w2: f64, loc2: &[f64], bw2: &[f64]) {
        let wsum = w1 + w2;
        let delta = circular_difference(loc1[0], loc2[0]);

        let inv_kappa = (w1 / bw1[0] + w2 / bw2[0]) / wsum + w1 * w2 * delta * delta / (wsum * wsum);
        bw1[0] = 1.0 / inv_kappa;

        let mut delta_raw = loc2[0] - loc1[0];
        if delta_raw <= -std::f64::consts::PI {
            delta_raw += 2.0 * std::f64::consts::PI;
        } else if delta_raw > std::f64::consts::PI {
            delta_raw -= 2.0 * std::f64::consts::PI;
        }
        loc1[0] = wrap_to_2pi(loc1[0] + delta_raw * w2 / wsum);
    }

    fn probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        fastexp64(self.log_probability(loc, bw, point))
    }

    fn log_probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        let kappa = bw[0];
        let diff = circular_difference(point[0], loc[0]);
        vonmises_scale_factor(kappa, true) + log_kernel_value(kappa, diff)
    }

    fn partial_logp(&self, loc: &[f64], bw: &[f64], point: &[f64], selection: &[bool]) -> f64 {
        if selection.first().copied().unwrap_or(false) {
            let diff = circular_difference(point[0], loc[0]);
            log_kernel_value(bw[0], diff)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};

    fn space() -> Circular {
        let dims = vec![DimensionSpec::new("theta", DimensionKind::Circular, "")];
        Circular::new(SpaceSpec::new(dims).unwrap(), 10.0)
    }

    #[test]
    fn probability_peaks_at_location() {
        let s = space();
        let p_at = s.probability(&[1.0], &[10.0], &[1.0]);
        let p_off = s.probability(&[1.0], &[10.0], &[1.0 + std::f64::consts::PI]);
        assert!(p_at > p_off);
    }

    #[test]
    fn merge_of_identical_components_keeps_location() {
        let s = space();
        let mut loc1 = vec![0.5];
        let mut bw1 = vec![10.0];
        s.merge(0.5, &mut loc1, &mut bw1, 0.5, &[0.5], &[10.0]);
        assert!((loc1[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn merge_wraps_across_the_origin() {
        let s = space();
        let mut loc1 = vec![0.05];
        let mut bw1 = vec![20.0];
        s.merge(
            0.5,
            &mut loc1,
            &mut bw1,
            0.5,
            &[2.0 * std::f64::consts::PI - 0.05],
            &[20.0],
        );
        assert!(loc1[0] < 0.1 || loc1[0] > 2.0 * std::f64::consts::PI - 0.1);
    }

    #[test]
    fn merge_moves_mean_towards_second_component() {
        let s = space();
        let mut loc1 = vec![0.0];
        let mut bw1 = vec![10.0];
        s.merge(1.0, &mut loc1, &mut bw1, 3.0, &[1.0], &[10.0]);
        assert!(loc1[0] > 0.5);
    }
}
