//! Decoder: combines one or more sources' Poisson log-likelihoods over a shared union of grids
//! into a (optionally normalized) posterior.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::fastmath::{fastexp64, fastlog64};
use crate::grid::GridOps;
use crate::likelihood::PoissonLikelihood;

/// Multi-source, multi-space posterior combiner.
///
/// `likelihoods[s][u]` is source `s`'s likelihood against union member `u`; every source shares
/// the same union arity, and the grid at a given union index matches across all sources.
pub struct Decoder {
    likelihoods: Vec<Vec<Rc<PoissonLikelihood>>>,
    priors: Vec<Vec<f64>>,
    grid_sizes: Vec<usize>,
    enabled: Vec<bool>,
}

impl Decoder {
    /// Builds a decoder over a single stimulus space: one likelihood per source, all against the
    /// same grid, plus one optional prior (`&[]` for none).
    pub fn new_single_space(likelihoods: Vec<Rc<PoissonLikelihood>>, prior: &[f64]) -> Result<Self> {
        let wrapped: Vec<Vec<Rc<PoissonLikelihood>>> = likelihoods.into_iter().map(|l| vec![l]).collect();
        Self::new_union(wrapped, vec![prior.to_vec()])
    }

    /// Builds a decoder over a union of stimulus spaces: `likelihoods[s]` holds one entry per
    /// union member for source `s`, and `priors[u]` is union member `u`'s prior (`&[]` for none).
    pub fn new_union(likelihoods: Vec<Vec<Rc<PoissonLikelihood>>>, priors: Vec<Vec<f64>>) -> Result<Self> {
        if likelihoods.is_empty() {
            return Err(Error::InvalidSpec("decoder needs at least one source".to_string()));
        }
        let arity = likelihoods[0].len();
        if likelihoods.iter().any(|s| s.len() != arity) {
            return Err(Error::ShapeMismatch(
                "all sources must share the same union arity".to_string(),
            ));
        }
        if priors.len() != arity {
            return Err(Error::ShapeMismatch(format!(
                "expected {arity} priors, got {}",
                priors.len()
            )));
        }

        let mut grid_sizes = vec![0usize; arity];
        for u in 0..arity {
            let reference = likelihoods[0][u].grid();
            for source in &likelihoods {
                if source[u].grid() != reference {
                    return Err(Error::InvalidSpec(format!(
                        "union member {u} does not share the same grid across sources"
                    )));
                }
            }
            grid_sizes[u] = reference.size();
        }

        for (u, prior) in priors.iter().enumerate() {
            if !prior.is_empty() && prior.len() != grid_sizes[u] {
                return Err(Error::ShapeMismatch(format!(
                    "prior for union member {u} has length {}, grid has {}",
                    prior.len(),
                    grid_sizes[u]
                )));
            }
        }

        let enabled = vec![true; likelihoods.len()];
        Ok(Self {
            likelihoods,
            priors,
            grid_sizes,
            enabled,
        })
    }

    /// Number of sources.
    #[must_use]
    pub fn nsources(&self) -> usize {
        self.likelihoods.len()
    }

    /// Number of union members.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.priors.len()
    }

    /// Decodes all union members at once: `events[s]` is source `s`'s row-major `(n_s,
    /// ndim_events)` event table, `out[u]` is union member `u`'s preallocated `grid_sizes[u]`
    /// buffer.
    pub fn decode(&self, events: &[(&[f64], usize)], delta_t: f64, out: &mut [&mut [f64]], normalize: bool) -> Result<()> {
        if events.len() != self.likelihoods.len() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} per-source event batches, got {}",
                self.likelihoods.len(),
                events.len()
            )));
        }
        if out.len() != self.arity() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} union output buffers, got {}",
                self.arity(),
                out.len()
            )));
        }

        for (u, buf) in out.iter_mut().enumerate() {
            for v in buf.iter_mut() {
                *v = 0.0;
            }
            for (s, source) in self.likelihoods.iter().enumerate() {
                if !self.enabled[s] {
                    continue;
                }
                let (points, n) = events[s];
                source[u].log_l(points, n, delta_t, buf)?;
            }
            if !self.priors[u].is_empty() {
                for (v, &p) in buf.iter_mut().zip(&self.priors[u]) {
                    *v += fastlog64(p);
                }
            }
        }

        if normalize {
            let max = out.iter().flat_map(|buf| buf.iter().copied()).fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for buf in out.iter_mut() {
                for v in buf.iter_mut() {
                    *v = fastexp64(*v - max);
                    total += *v;
                }
            }
            if total > 0.0 {
                for buf in out.iter_mut() {
                    for v in buf.iter_mut() {
                        *v /= total;
                    }
                }
            }
        }
        Ok(())
    }

    /// Decodes a single union member `index`; normalization (if requested) is local to that
    /// member's grid alone.
    pub fn decode_single(&self, events: &[(&[f64], usize)], delta_t: f64, out: &mut [f64], index: usize, normalize: bool) -> Result<()> {
        if index >= self.arity() {
            return Err(Error::OutOfBounds(format!(
                "union index {index} out of bounds for arity {}",
                self.arity()
            )));
        }
        if events.len() != self.likelihoods.len() {
            return Err(Error::ShapeMismatch(format!(
                "expected {} per-source event batches, got {}",
                self.likelihoods.len(),
                events.len()
            )));
        }
        if out.len() != self.grid_sizes[index] {
            return Err(Error::ShapeMismatch(format!(
                "expected {} output values for union member {index}",
                self.grid_sizes[index]
            )));
        }

        for v in out.iter_mut() {
            *v = 0.0;
        }
        for (s, source) in self.likelihoods.iter().enumerate() {
            if !self.enabled[s] {
                continue;
            }
            let (points, n) = events[s];
            source[index].log_l(points, n, delta_t, out)?;
        }
        if !self.priors[index].is_empty() {
            for (v, &p) in out.iter_mut().zip(&self.priors[index]) {
                *v += fastlog64(p);
            }
        }

        if normalize {
            let max = out.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for v in out.iter_mut() {
                *v = fastexp64(*v - max);
                total += *v;
            }
            if total > 0.0 {
                for v in out.iter_mut() {
                    *v /= total;
                }
            }
        }
        Ok(())
    }

    /// Enables source `s`. Out-of-bounds indices are ignored.
    pub fn enable_source(&mut self, s: usize) {
        if let Some(e) = self.enabled.get_mut(s) {
            *e = true;
        }
    }

    /// Disables source `s`. Out-of-bounds indices are ignored.
    pub fn disable_source(&mut self, s: usize) {
        if let Some(e) = self.enabled.get_mut(s) {
            *e = false;
        }
    }

    /// Enables every source.
    pub fn enable_all_sources(&mut self) {
        self.enabled.iter_mut().for_each(|e| *e = true);
    }

    /// Enables only source `s`, disabling all others.
    pub fn enable_one_source(&mut self, s: usize) {
        self.enabled.iter_mut().for_each(|e| *e = false);
        self.enable_source(s);
    }

    /// Replaces the whole enable mask.
    pub fn enable_sources(&mut self, mask: &[bool]) -> Result<()> {
        if mask.len() != self.enabled.len() {
            return Err(Error::ShapeMismatch(format!(
                "expected a mask of length {}, got {}",
                self.enabled.len(),
                mask.len()
            )));
        }
        self.enabled.copy_from_slice(mask);
        Ok(())
    }

    /// The current enable mask, parallel to the source list.
    #[must_use]
    pub fn enabled(&self) -> &[bool] {
        &self.enabled
    }

    /// The source/union likelihood table, for [`crate::serialization`].
    #[must_use]
    pub(crate) fn likelihoods_raw(&self) -> &[Vec<Rc<PoissonLikelihood>>] {
        &self.likelihoods
    }

    /// The per-union-member priors, for [`crate::serialization`].
    #[must_use]
    pub(crate) fn priors_raw(&self) -> &[Vec<f64>] {
        &self.priors
    }

    /// Rebuilds a decoder from already-validated parts (used by [`crate::serialization`] on
    /// load, skipping the grid/arity checks [`Decoder::new_union`] performs since a freshly
    /// deserialized tree is assumed consistent).
    pub(crate) fn from_parts(
        likelihoods: Vec<Vec<Rc<PoissonLikelihood>>>,
        priors: Vec<Vec<f64>>,
        enabled: Vec<bool>,
    ) -> Self {
        let grid_sizes = (0..priors.len())
            .map(|u| likelihoods[0][u].grid().size())
            .collect();
        Self {
            likelihoods,
            priors,
            grid_sizes,
            enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::grid::ArrayGrid;
    use crate::grid::Grid;
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;
    use crate::space::Space;
    use crate::space_spec::SpaceSpec;

    fn source() -> Rc<PoissonLikelihood> {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        let spec = SpaceSpec::new(dims).unwrap();
        let space: Space = Euclidean::new(spec.clone(), Gaussian::new(3.0).into()).into();
        let grid: Grid = ArrayGrid::new(spec, vec![0.0, 1.0, 2.0], vec![3], Vec::new())
            .unwrap()
            .into();
        let lik = PoissonLikelihood::new_stimulus_only(space, 0.5, grid, 1.0, 1.0, false, 1.0);
        lik.add_events(&[0.0, 1.0, 2.0], 3, 1.0).unwrap();
        Rc::new(lik)
    }

    #[test]
    fn rejects_empty_source_list() {
        assert!(Decoder::new_union(Vec::new(), vec![Vec::new()]).is_err());
    }

    #[test]
    fn rejects_mismatched_prior_length() {
        let decoder = Decoder::new_single_space(vec![source()], &[1.0, 2.0]);
        assert!(decoder.is_err());
    }

    #[test]
    fn decode_normalizes_to_a_probability_distribution() {
        let decoder = Decoder::new_single_space(vec![source(), source()], &[]).unwrap();
        let mut out = vec![0.0; 3];
        let events = [(&[0.0, 1.0][..], 2)];
        decoder.decode_single(&events, 1.0, &mut out, 0, true).unwrap();
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disabling_a_source_excludes_it_from_decode() {
        let mut decoder = Decoder::new_single_space(vec![source(), source()], &[]).unwrap();
        decoder.disable_source(1);
        assert_eq!(decoder.enabled(), &[true, false]);
    }
}
