//! `PartialMixture`: a materialized table of partial log-probabilities for one mixture against a
//! fixed batch of samples or grid, valid only as long as the parent mixture stays unchanged.

use crate::error::{Error, Result};
use crate::fastmath::fastexp64;
use crate::grid::{Grid, GridOps};
use crate::mixture::Mixture;
use crate::space::SpaceOps;

/// A cached `logphi[c][s]` table plus everything needed to complete it against inverse-subspace
/// points, tied to the exact mixture version it was built from.
pub struct PartialMixture {
    selection: Vec<bool>,
    inverse_selection: Vec<bool>,
    weights: Vec<f64>,
    locations: Vec<Vec<f64>>,
    bandwidths: Vec<Vec<f64>>,
    logphi: Vec<f64>,
    nsamples: usize,
    parent_version: u64,
    parent_ncomponents: usize,
}

impl PartialMixture {
    /// Builds a partial mixture from `mixture` against a batch of `n` samples restricted to
    /// `selection` (`true` marks the dimensions the batch covers).
    pub fn from_points(mixture: &Mixture, selection: &[bool], points: &[f64], n: usize) -> Result<Self> {
        let ndim = mixture.space().spec().ndim();
        if selection.len() != ndim {
            return Err(Error::OutOfBounds(
                "selection mask size does not match ndim".to_string(),
            ));
        }
        if points.len() != n * selection.iter().filter(|&&s| s).count() {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {} point values for the selected subspace",
                selection.iter().filter(|&&s| s).count()
            )));
        }

        let inverse_selection: Vec<bool> = selection.iter().map(|&s| !s).collect();
        let ncomponents = mixture.ncomponents();
        let mut logphi = vec![0.0; ncomponents * n];

        for (ci, component) in mixture.components().iter().enumerate() {
            let scale_log =
                mixture.space().compute_scale_factor_selected(&component.bandwidth, true, selection);
            for s in 0..n {
                let sel_ndim = selection.iter().filter(|&&x| x).count();
                let point = &points[s * sel_ndim..(s + 1) * sel_ndim];
                let full_point = expand_selected(point, selection, &component.location);
                logphi[ci * n + s] =
                    scale_log + mixture.space().partial_logp(&component.location, &component.bandwidth, &full_point, selection);
            }
        }

        Ok(Self {
            selection: selection.to_vec(),
            inverse_selection,
            weights: mixture.weights().to_vec(),
            locations: mixture.components().iter().map(|c| c.location.clone()).collect(),
            bandwidths: mixture.components().iter().map(|c| c.bandwidth.clone()).collect(),
            logphi,
            nsamples: n,
            parent_version: mixture.version(),
            parent_ncomponents: ncomponents,
        })
    }

    /// Builds a partial mixture against every valid point of `grid`.
    pub fn from_grid(mixture: &Mixture, selection: &[bool], grid: &Grid) -> Result<Self> {
        let ndim = mixture.space().spec().ndim();
        if selection.len() != ndim {
            return Err(Error::OutOfBounds(
                "selection mask size does not match ndim".to_string(),
            ));
        }
        let n = grid.size();
        let inverse_selection: Vec<bool> = selection.iter().map(|&s| !s).collect();
        let ncomponents = mixture.ncomponents();
        let mut logphi = vec![0.0; ncomponents * n];

        for (ci, component) in mixture.components().iter().enumerate() {
            let scale_log =
                mixture.space().compute_scale_factor_selected(&component.bandwidth, true, selection);
            for s in 0..n {
                let point = grid.point(s);
                logphi[ci * n + s] =
                    scale_log + mixture.space().partial_logp(&component.location, &component.bandwidth, &point, selection);
            }
        }

        Ok(Self {
            selection: selection.to_vec(),
            inverse_selection,
            weights: mixture.weights().to_vec(),
            locations: mixture.components().iter().map(|c| c.location.clone()).collect(),
            bandwidths: mixture.components().iter().map(|c| c.bandwidth.clone()).collect(),
            logphi,
            nsamples: n,
            parent_version: mixture.version(),
            parent_ncomponents: ncomponents,
        })
    }

    fn check_fresh(&self, mixture: &Mixture) -> Result<()> {
        if self.parent_version == mixture.version() && self.parent_ncomponents == mixture.ncomponents() {
            Ok(())
        } else {
            Err(Error::Staleness)
        }
    }

    /// For each of `n` completion points over the inverse subspace, accumulates
    /// `Σ_c w_c · exp(logphi[c][s] + partial_logp_inverse(c, completion))` into
    /// `out[s][completion]` (row-major, length `nsamples * n`).
    pub fn complete(&self, mixture: &Mixture, points: &[f64], n: usize, out: &mut [f64]) -> Result<()> {
        self.check_fresh(mixture)?;
        let inv_ndim = self.inverse_selection.iter().filter(|&&s| s).count();
        if points.len() != n * inv_ndim {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {inv_ndim} completion point values"
            )));
        }

        for v in out.iter_mut().take(self.nsamples * n) {
            *v = 0.0;
        }

        for s in 0..self.nsamples {
            for comp in 0..n {
                let completion = &points[comp * inv_ndim..(comp + 1) * inv_ndim];
                let mut acc = 0.0;
                for c in 0..self.locations.len() {
                    let full_point = expand_selected(completion, &self.inverse_selection, &self.locations[c]);
                    let partial_inv = mixture.space().partial_logp(
                        &self.locations[c],
                        &self.bandwidths[c],
                        &full_point,
                        &self.inverse_selection,
                    );
                    let lp = self.logphi[c * self.nsamples + s] + partial_inv;
                    if lp.is_finite() {
                        acc += self.weights[c] * fastexp64(lp);
                    }
                }
                out[s * n + comp] = acc;
            }
        }
        Ok(())
    }

    /// For each of `n` completion points, sums the per-sample completion (as in
    /// [`PartialMixture::complete`]) and adds the elementwise `fastlog` of that sum into
    /// `result` (length `n`) — a read-modify-write accumulation, so callers iterating multiple
    /// partial mixtures into the same `result` must pre-zero it themselves.
    pub fn complete_multi(&self, mixture: &Mixture, points: &[f64], n: usize, result: &mut [f64]) -> Result<()> {
        self.check_fresh(mixture)?;
        let inv_ndim = self.inverse_selection.iter().filter(|&&s| s).count();
        if points.len() != n * inv_ndim {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {inv_ndim} completion point values"
            )));
        }

        for comp in 0..n {
            let completion = &points[comp * inv_ndim..(comp + 1) * inv_ndim];
            let mut acc = 0.0;
            for c in 0..self.locations.len() {
                let full_point = expand_selected(completion, &self.inverse_selection, &self.locations[c]);
                let partial_inv = mixture.space().partial_logp(
                    &self.locations[c],
                    &self.bandwidths[c],
                    &full_point,
                    &self.inverse_selection,
                );
                for s in 0..self.nsamples {
                    let lp = self.logphi[c * self.nsamples + s] + partial_inv;
                    if lp.is_finite() {
                        acc += self.weights[c] * fastexp64(lp);
                    }
                }
            }
            result[comp] += crate::fastmath::fastlog64(acc.max(f64::MIN_POSITIVE));
        }
        Ok(())
    }

    /// `out[s] = Σ_c w_c · exp(logphi[c][s])` (length `nsamples`).
    pub fn marginal(&self, mixture: &Mixture, out: &mut [f64]) -> Result<()> {
        self.check_fresh(mixture)?;
        for o in out.iter_mut().take(self.nsamples) {
            *o = 0.0;
        }
        for c in 0..self.locations.len() {
            for s in 0..self.nsamples {
                let lp = self.logphi[c * self.nsamples + s];
                if lp.is_finite() {
                    out[s] += self.weights[c] * fastexp64(lp);
                }
            }
        }
        Ok(())
    }

    /// The subspace selection this partial mixture was built against.
    #[must_use]
    pub fn selection(&self) -> &[bool] {
        &self.selection
    }
}

/// Scatters `values` (the selected-subspace entries, in order) into a full `ndim`-length point,
/// filling unselected entries from `fallback` (typically a component's own location).
fn expand_selected(values: &[f64], selection: &[bool], fallback: &[f64]) -> Vec<f64> {
    let mut out = fallback.to_vec();
    let mut vi = 0;
    for (i, &sel) in selection.iter().enumerate() {
        if sel {
            out[i] = values[vi];
            vi += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;
    use crate::space::Space;
    use crate::space_spec::SpaceSpec;

    fn space() -> Space {
        let dims = vec![
            DimensionSpec::new("x", DimensionKind::Euclidean, ""),
            DimensionSpec::new("y", DimensionKind::Euclidean, ""),
        ];
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    #[test]
    fn stale_after_mutation_is_rejected() {
        let mut m = Mixture::with_seed(space(), 0.5, 1);
        m.add_samples(&[0.0, 0.0], 1, 1.0, 1.0).unwrap();
        let selection = vec![true, false];
        let pm = PartialMixture::from_points(&m, &selection, &[0.0], 1).unwrap();
        m.add_samples(&[1.0, 1.0], 1, 1.0, 1.0).unwrap();
        let mut out = vec![0.0; 1];
        assert!(matches!(pm.marginal(&m, &mut out), Err(Error::Staleness)));
    }

    #[test]
    fn marginal_matches_direct_evaluation_when_fully_selected() {
        let mut m = Mixture::with_seed(space(), 0.5, 1);
        m.add_samples(&[0.0, 0.0, 1.0, 1.0], 2, 1.0, 1.0).unwrap();
        let selection = vec![true, true];
        let pm = PartialMixture::from_points(&m, &selection, &[0.2, 0.3], 1).unwrap();
        let mut marg = vec![0.0];
        pm.marginal(&m, &mut marg).unwrap();
        let mut direct = vec![0.0];
        m.evaluate_points(&[0.2, 0.3], 1, &mut direct).unwrap();
        assert!((marg[0] - direct[0]).abs() < 1e-2);
    }
}
