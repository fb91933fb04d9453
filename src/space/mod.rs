//! Space: the geometry and metric a mixture component lives in.
//!
//! A space owns a [`crate::space_spec::SpaceSpec`] (its dimensions' names and kinds) and knows
//! how to evaluate, merge and measure distances between components defined over it. The five
//! kinds below cover every [`crate::dimension::DimensionKind`] plus their concatenation.

pub mod categorical;
pub mod circular;
pub mod encoded;
pub mod euclidean;
pub mod multi;

pub use categorical::Categorical;
pub use circular::Circular;
pub use encoded::Encoded;
pub use euclidean::Euclidean;
pub use multi::Multi;

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::space_spec::SpaceSpec;

/// Shared contract for every space kind.
///
/// All array arguments are flat slices over the space's own `ndim` (location, point,
/// selection) or `nbw` (bandwidth) — a `Multi` space's children see their own contiguous
/// sub-slice, carved out by the parent before delegating.
#[enum_dispatch]
pub trait SpaceOps {
    /// This space's dimension spec.
    fn spec(&self) -> &SpaceSpec;

    /// Number of kernel bandwidth parameters this space's components carry (not necessarily
    /// equal to `ndim`: a circular dimension has one `κ` regardless, a categorical one has
    /// none).
    fn nbw(&self) -> usize;

    /// A newly-initialized component at the space's natural origin and unit scale, used to
    /// seed a mixture with its very first sample.
    fn default_kernel(&self) -> Component;

    /// Integral normalizer over this space's kernel(s) at bandwidth `bw`.
    fn compute_scale_factor(&self, bw: &[f64], log: bool) -> f64;

    /// Like [`SpaceOps::compute_scale_factor`], but restricted to the dimensions marked `true`
    /// in `selection`.
    fn compute_scale_factor_selected(&self, bw: &[f64], log: bool, selection: &[bool]) -> f64;

    /// Squared distance between a reference component `(refloc, refbw)` and `targetloc`,
    /// short-circuiting to `threshold` once that bound is exceeded (so a caller pruning
    /// components outside a cutoff never pays for the full computation).
    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        refbw: &[f64],
        targetloc: &[f64],
        threshold: f64,
    ) -> f64;

    /// Merges component 2 `(w2, loc2, bw2)` into component 1 in place, weighted by `w1`/`w2`.
    fn merge(&self, w1: f64, loc1: &mut [f64], bw1: &mut [f64], w2: f64, loc2: &[f64], bw2: &[f64]);

    /// Probability density of `point` under the component `(loc, bw)`.
    fn probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64;

    /// Log of [`SpaceOps::probability`].
    fn log_probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64;

    /// Log-probability restricted to the dimensions marked `true` in `selection`.
    fn partial_logp(&self, loc: &[f64], bw: &[f64], point: &[f64], selection: &[bool]) -> f64;
}

/// Tagged union of the space kinds this crate supports.
#[enum_dispatch(SpaceOps)]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Space {
    /// Continuous product space.
    Euclidean,
    /// Discrete labels.
    Categorical,
    /// Wrapping angular axis.
    Circular,
    /// Lookup-table-addressed axis.
    Encoded,
    /// Concatenation of other spaces.
    Multi,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;

    #[test]
    fn space_enum_dispatches_through_trait() {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        let space: Space =
            Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into();
        assert_eq!(space.nbw(), 1);
    }
}
