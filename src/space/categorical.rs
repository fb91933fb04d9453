//! Categorical space: a discrete, unordered label per dimension, no bandwidth.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::space_spec::SpaceSpec;

use super::SpaceOps;

/// A discrete space: locations are integer-valued labels compared for exact equality.
///
/// Categorical dimensions carry no kernel bandwidth; components here are either a perfect
/// match (probability 1) or not (probability 0), so merging two components never blends
/// them — a categorical component is only ever merged with another at the same label.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Categorical {
    spec: SpaceSpec,
}

impl Categorical {
    /// Builds a categorical space from a spec.
    #[must_use]
    pub fn new(spec: SpaceSpec) -> Self {
        Self { spec }
    }
}

fn labels_match(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(&x, &y)| (x - y).abs() < 0.5)
}

fn labels_match_selected(a: &[f64], b: &[f64], selection: &[bool]) -> bool {
    a.iter()
        .zip(b)
        .zip(selection)
        .all(|((&x, &y), &sel)| !sel || (x - y).abs() < 0.5)
}

impl SpaceOps for Categorical {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn nbw(&self) -> usize {
        0
    }

    fn default_kernel(&self) -> Component {
        Component::new(vec![0.0; self.spec.ndim()], Vec::new(), 1.0)
    }

    fn compute_scale_factor(&self, _bw: &[f64], log: bool) -> f64 {
        if log {
            0.0
        } else {
            1.0
        }
    }

    fn compute_scale_factor_selected(&self, _bw: &[f64], log: bool, _selection: &[bool]) -> f64 {
        if log {
            0.0
        } else {
            1.0
        }
    }

    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        _refbw: &[f64],
        targetloc: &[f64],
        _threshold: f64,
    ) -> f64 {
        if labels_match(refloc, targetloc) {
            0.0
        } else {
            f64::INFINITY
        }
    }

    fn merge(
        &self,
        _w1: f64,
        _loc1: &mut [f64],
        _bw1: &mut [f64],
        _w2: f64,
        _loc2: &[f64],
        _bw2: &[f64],
    ) {
        // Categorical merges only ever combine components at the same label; there is
        // nothing to blend.
    }

    fn probability(&self, loc: &[f64], _bw: &[f64], point: &[f64]) -> f64 {
        f64::from(labels_match(loc, point))
    }

    fn log_probability(&self, loc: &[f64], _bw: &[f64], point: &[f64]) -> f64 {
        if labels_match(loc, point) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }

    fn partial_logp(&self, loc: &[f64], _bw: &[f64], point: &[f64], selection: &[bool]) -> f64 {
        if labels_match_selected(loc, point, selection) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};

    fn space() -> Categorical {
        let dims = vec![DimensionSpec::new("label", DimensionKind::Categorical, "")];
        Categorical::new(SpaceSpec::new(dims).unwrap())
    }

    #[test]
    fn identical_labels_give_probability_one() {
        let s = space();
        assert_eq!(s.probability(&[2.0], &[], &[2.0]), 1.0);
        assert_eq!(s.probability(&[2.0], &[], &[3.0]), 0.0);
    }

    #[test]
    fn merge_is_a_no_op() {
        let s = space();
        let mut loc1 = vec![2.0];
        let mut bw1: Vec<f64> = Vec::new();
        s.merge(1.0, &mut loc1, &mut bw1, 1.0, &[2.0], &[]);
        assert_eq!(loc1, vec![2.0]);
    }
}
