//! Multi space: a concatenation of child spaces, each owning a contiguous slice of
//! dimensions and kernel parameters.

use serde::{Deserialize, Serialize};

use crate::component::Component;
use crate::error::{Error, Result};
use crate::space_spec::SpaceSpec;

use super::{Space, SpaceOps};

/// Per-child `(ndim, nbw)` offsets into the flattened location/bandwidth arrays.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct ChildRange {
    dim_start: usize,
    dim_len: usize,
    bw_start: usize,
    bw_len: usize,
}

/// A space built by concatenating other spaces along their dimensions.
///
/// Nested `Multi` children are flattened at construction: a `Multi` built from children that
/// include another `Multi` absorbs that child's own children directly rather than nesting one
/// level deeper, so `ranges` always indexes non-`Multi` leaves.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Multi {
    spec: SpaceSpec,
    children: Vec<Space>,
    ranges: Vec<ChildRange>,
}

impl Multi {
    /// Builds a multi space from its children, flattening any children that are themselves
    /// `Multi` spaces.
    pub fn new(children: Vec<Space>) -> Result<Self> {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Space::Multi(inner) => flat.extend(inner.children),
                other => flat.push(other),
            }
        }

        require_nonempty(&flat)?;

        let mut spec = SpaceSpec::empty();
        let mut ranges = Vec::with_capacity(flat.len());
        let mut dim_start = 0;
        let mut bw_start = 0;
        for child in &flat {
            spec.append_spec(child.spec())?;
            let dim_len = child.spec().ndim();
            let bw_len = child.nbw();
            ranges.push(ChildRange {
                dim_start,
                dim_len,
                bw_start,
                bw_len,
            });
            dim_start += dim_len;
            bw_start += bw_len;
        }

        Ok(Self {
            spec,
            children: flat,
            ranges,
        })
    }

    fn child_slices<'a>(
        &self,
        range: &ChildRange,
        loc: &'a [f64],
        bw: &'a [f64],
    ) -> (&'a [f64], &'a [f64]) {
        (
            &loc[range.dim_start..range.dim_start + range.dim_len],
            &bw[range.bw_start..range.bw_start + range.bw_len],
        )
    }
}

impl SpaceOps for Multi {
    fn spec(&self) -> &SpaceSpec {
        &self.spec
    }

    fn nbw(&self) -> usize {
        self.children.iter().map(SpaceOps::nbw).sum()
    }

    fn default_kernel(&self) -> Component {
        let mut location = Vec::with_capacity(self.spec.ndim());
        let mut bandwidth = Vec::with_capacity(self.nbw());
        let mut scale_factor = 1.0;
        for child in &self.children {
            let c = child.default_kernel();
            location.extend(c.location);
            bandwidth.extend(c.bandwidth);
            scale_factor *= c.scale_factor;
        }
        Component::new(location, bandwidth, scale_factor)
    }

    fn compute_scale_factor(&self, bw: &[f64], log: bool) -> f64 {
        let mut acc = if log { 0.0 } else { 1.0 };
        for (child, range) in self.children.iter().zip(&self.ranges) {
            let child_bw = &bw[range.bw_start..range.bw_start + range.bw_len];
            let s = child.compute_scale_factor(child_bw, log);
            if log {
                acc += s;
            } else {
                acc *= s;
            }
        }
        acc
    }

    fn compute_scale_factor_selected(&self, bw: &[f64], log: bool, selection: &[bool]) -> f64 {
        let mut acc = if log { 0.0 } else { 1.0 };
        for (child, range) in self.children.iter().zip(&self.ranges) {
            let child_bw = &bw[range.bw_start..range.bw_start + range.bw_len];
            let child_sel = &selection[range.dim_start..range.dim_start + range.dim_len];
            let s = child.compute_scale_factor_selected(child_bw, log, child_sel);
            if log {
                acc += s;
            } else {
                acc *= s;
            }
        }
        acc
    }

    fn mahalanobis_distance_squared(
        &self,
        refloc: &[f64],
        refbw: &[f64],
        targetloc: &[f64],
        threshold: f64,
    ) -> f64 {
        let mut total = 0.0;
        for (child, range) in self.children.iter().zip(&self.ranges) {
            let (rloc, rbw) = self.child_slices(range, refloc, refbw);
            let tloc = &targetloc[range.dim_start..range.dim_start + range.dim_len];
            total += child.mahalanobis_distance_squared(rloc, rbw, tloc, threshold - total);
            if total >= threshold {
                return threshold;
            }
        }
        total
    }

    fn merge(&self, w1: f64, loc1: &mut [f64], bw1: &mut [f64], w2: f64, loc2: &[f64], bw2: &[f64]) {
        for (child, range) in self.children.iter().zip(&self.ranges) {
            let (l1, b1) = (
                &mut loc1[range.dim_start..range.dim_start + range.dim_len],
                &mut bw1[range.bw_start..range.bw_start + range.bw_len],
            );
            let l2 = &loc2[range.dim_start..range.dim_start + range.dim_len];
            let b2 = &bw2[range.bw_start..range.bw_start + range.bw_len];
            child.merge(w1, l1, b1, w2, l2, b2);
        }
    }

    fn probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        self.children
            .iter()
            .zip(&self.ranges)
            .map(|(child, range)| {
                let (cloc, cbw) = self.child_slices(range, loc, bw);
                let cpoint = &point[range.dim_start..range.dim_start + range.dim_len];
                child.probability(cloc, cbw, cpoint)
            })
            .product()
    }

    fn log_probability(&self, loc: &[f64], bw: &[f64], point: &[f64]) -> f64 {
        self.children
            .iter()
            .zip(&self.ranges)
            .map(|(child, range)| {
                let (cloc, cbw) = self.child_slices(range, loc, bw);
                let cpoint = &point[range.dim_start..range.dim_start + range.dim_len];
                child.log_probability(cloc, cbw, cpoint)
            })
            .sum()
    }

    fn partial_logp(&self, loc: &[f64], bw: &[f64], point: &[f64], selection: &[bool]) -> f64 {
        self.children
            .iter()
            .zip(&self.ranges)
            .map(|(child, range)| {
                let (cloc, cbw) = self.child_slices(range, loc, bw);
                let cpoint = &point[range.dim_start..range.dim_start + range.dim_len];
                let csel = &selection[range.dim_start..range.dim_start + range.dim_len];
                child.partial_logp(cloc, cbw, cpoint, csel)
            })
            .sum()
    }
}

impl Multi {
    /// Whether `other` names a space already present among the immediate children (used by
    /// callers to reject self-referential grids before construction).
    #[must_use]
    pub fn children(&self) -> &[Space] {
        &self.children
    }
}

/// Rejects an attempt to build a `Multi` with zero children; callers needing an identity
/// element should use a single-dimension space directly instead.
pub fn require_nonempty(children: &[Space]) -> Result<()> {
    if children.is_empty() {
        Err(Error::InvalidSpec("multi space needs at least one child".to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;

    fn leaf(name: &str) -> Space {
        let dims = vec![DimensionSpec::new(name, DimensionKind::Euclidean, "")];
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    #[test]
    fn flattens_nested_multi() {
        let inner = Multi::new(vec![leaf("a"), leaf("b")]).unwrap();
        let outer = Multi::new(vec![Space::Multi(inner), leaf("c")]).unwrap();
        assert_eq!(outer.children().len(), 3);
        assert_eq!(outer.spec().ndim(), 3);
    }

    #[test]
    fn probability_is_product_of_children() {
        let m = Multi::new(vec![leaf("a"), leaf("b")]).unwrap();
        let loc = vec![0.0, 0.0];
        let bw = vec![1.0, 1.0];
        let at = m.probability(&loc, &bw, &loc);
        let off = m.probability(&loc, &bw, &[0.0, 5.0]);
        assert!(at > off);
    }
}
