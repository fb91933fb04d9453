//! Mixture: a weighted set of kernel components approximating a density over a [`crate::space::Space`].

use rand::rngs::ThreadRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::component::Component;
use crate::error::{Error, Result};
use crate::grid::{Grid, GridOps};
use crate::space::{Space, SpaceOps};

/// The injectable source of randomness used by [`Mixture::merge_samples`]'s permutation step.
pub enum Rng {
    /// OS-entropy-seeded, non-reproducible.
    Thread(ThreadRng),
    /// Deterministically seeded, for reproducible tests.
    Pcg(Pcg64),
}

impl Rng {
    fn shuffle<T>(&mut self, items: &mut [T]) {
        match self {
            Self::Thread(rng) => items.shuffle(rng),
            Self::Pcg(rng) => items.shuffle(rng),
        }
    }
}

/// A compressed kernel density estimate: a weighted set of components over one [`Space`].
///
/// Not itself `Serialize`/`Deserialize` — the [`crate::serialization`] module builds the wire
/// representation explicitly so that component scale factors are recomputed on load rather than
/// trusted from storage.
pub struct Mixture {
    space: Space,
    threshold: f64,
    threshold_squared: f64,
    sum_of_weights: f64,
    sum_of_nsamples: f64,
    components: Vec<Component>,
    weights: Vec<f64>,
    version: u64,
    rng: Rng,
}

fn default_rng() -> Rng {
    Rng::Thread(rand::rngs::ThreadRng::default())
}

impl Mixture {
    /// Builds an empty mixture with OS-entropy-seeded randomness.
    #[must_use]
    pub fn new(space: Space, threshold: f64) -> Self {
        Self {
            space,
            threshold,
            threshold_squared: threshold * threshold,
            sum_of_weights: 0.0,
            sum_of_nsamples: 0.0,
            components: Vec::new(),
            weights: Vec::new(),
            version: 0,
            rng: default_rng(),
        }
    }

    /// Builds an empty mixture with a deterministically seeded RNG, for reproducible tests.
    #[must_use]
    pub fn with_seed(space: Space, threshold: f64, seed: u64) -> Self {
        let mut m = Self::new(space, threshold);
        m.rng = Rng::Pcg(Pcg64::seed_from_u64(seed));
        m
    }

    /// Rebuilds a mixture from stored state (used by [`crate::serialization`] on load), with
    /// each component's scale factor recomputed from `space.compute_scale_factor(bandwidth)`
    /// rather than trusted from storage.
    #[must_use]
    pub(crate) fn from_raw(
        space: Space,
        threshold: f64,
        sum_of_weights: f64,
        sum_of_nsamples: f64,
        locations_bandwidths: Vec<(Vec<f64>, Vec<f64>)>,
        weights: Vec<f64>,
    ) -> Self {
        let components = locations_bandwidths
            .into_iter()
            .map(|(loc, bw)| {
                let scale_factor = space.compute_scale_factor(&bw, false);
                Component::new(loc, bw, scale_factor)
            })
            .collect();
        Self {
            threshold_squared: threshold * threshold,
            space,
            threshold,
            sum_of_weights,
            sum_of_nsamples,
            components,
            weights,
            version: 0,
            rng: default_rng(),
        }
    }

    /// The underlying space.
    #[must_use]
    pub const fn space(&self) -> &Space {
        &self.space
    }

    /// Number of components.
    #[must_use]
    pub fn ncomponents(&self) -> usize {
        self.components.len()
    }

    /// The components, in insertion/merge order.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// The per-component weights, parallel to [`Mixture::components`].
    #[must_use]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Running sum of ingested batch weights.
    #[must_use]
    pub const fn sum_of_weights(&self) -> f64 {
        self.sum_of_weights
    }

    /// Running sum of ingested sample counts.
    #[must_use]
    pub const fn sum_of_nsamples(&self) -> f64 {
        self.sum_of_nsamples
    }

    /// The staleness-detection counter, bumped by every mutating call.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Distance cutoff used by [`Mixture::merge_samples`]'s nearest-neighbor probe.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Replaces the distance cutoff. Fails if `v < 0`.
    pub fn set_threshold(&mut self, v: f64) -> Result<()> {
        if v < 0.0 {
            return Err(Error::InvalidSpec("threshold must be non-negative".to_string()));
        }
        self.threshold = v;
        self.threshold_squared = v * v;
        Ok(())
    }

    /// Rescales the existing components by the running-average mixing factor and returns the
    /// weight each of the `n` new components should carry. That weight is `1/Σw'` regardless of
    /// `w`: every new component divides the batch's combined contribution evenly, the batch's own
    /// `w`/`n` having already been folded into `new_sum`.
    fn apply_weight_update(&mut self, n: usize, w: f64, attenuation: f64) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let new_sum = attenuation * self.sum_of_weights + n_f * w;
        let mix_old = if new_sum == 0.0 {
            0.0
        } else {
            attenuation * self.sum_of_weights / new_sum
        };
        let per_new_weight = if new_sum == 0.0 { 0.0 } else { 1.0 / new_sum };
        for weight in &mut self.weights {
            *weight *= mix_old;
        }
        self.sum_of_weights = new_sum;
        self.sum_of_nsamples = attenuation * self.sum_of_nsamples + n_f;
        per_new_weight
    }

    fn build_prospective(&self, points: &[f64], n: usize, ndim: usize) -> Result<Vec<Component>> {
        if points.len() != n * ndim {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {ndim} point values, got {}",
                points.len()
            )));
        }
        let proto = self.space.default_kernel();
        Ok((0..n)
            .map(|i| {
                let loc = points[i * ndim..(i + 1) * ndim].to_vec();
                Component::new(loc, proto.bandwidth.clone(), proto.scale_factor)
            })
            .collect())
    }

    /// Appends `n` components at `points` (a row-major `(n, ndim)` table), each carrying weight
    /// `w` before the batch's overall contribution to `sum_of_weights`/`sum_of_nsamples`.
    ///
    /// On a shape mismatch nothing is appended; the mixture is left exactly as it was.
    pub fn add_samples(&mut self, points: &[f64], n: usize, w: f64, attenuation: f64) -> Result<()> {
        let ndim = self.space.spec().ndim();
        let prospective = self.build_prospective(points, n, ndim)?;
        let per_new_weight = self.apply_weight_update(n, w, attenuation);
        self.components.extend(prospective);
        self.weights.extend(std::iter::repeat(per_new_weight).take(n));
        self.version += 1;
        Ok(())
    }

    /// Merges `n` prospective components at `points` into the nearest existing component (by
    /// the space's squared distance, against [`Mixture::threshold`]) or appends them as new
    /// components otherwise, optionally shuffling insertion order first.
    pub fn merge_samples(
        &mut self,
        points: &[f64],
        n: usize,
        random: bool,
        w: f64,
        attenuation: f64,
    ) -> Result<()> {
        let ndim = self.space.spec().ndim();
        let mut prospective = self.build_prospective(points, n, ndim)?;
        if random {
            self.rng.shuffle(&mut prospective);
        }
        let per_new_weight = self.apply_weight_update(n, w, attenuation);
        let batch_weight = per_new_weight;

        for c in prospective {
            let mut best = None;
            let mut best_d2 = self.threshold_squared;
            for (i, existing) in self.components.iter().enumerate() {
                let d2 = self.space.mahalanobis_distance_squared(
                    &existing.location,
                    &existing.bandwidth,
                    &c.location,
                    best_d2,
                );
                if d2 < best_d2 {
                    best_d2 = d2;
                    best = Some(i);
                }
            }

            match best {
                Some(i) => {
                    let w1 = self.weights[i];
                    let mut loc1 = self.components[i].location.clone();
                    let mut bw1 = self.components[i].bandwidth.clone();
                    self.space.merge(w1, &mut loc1, &mut bw1, batch_weight, &c.location, &c.bandwidth);
                    let scale_factor = self.space.compute_scale_factor(&bw1, false);
                    self.components[i] = Component::new(loc1, bw1, scale_factor);
                    self.weights[i] += batch_weight;
                }
                None => {
                    self.components.push(c);
                    self.weights.push(batch_weight);
                }
            }
        }

        self.version += 1;
        Ok(())
    }

    /// Resets the mixture to empty and bumps [`Mixture::version`].
    pub fn clear(&mut self) {
        self.components.clear();
        self.weights.clear();
        self.sum_of_weights = 0.0;
        self.sum_of_nsamples = 0.0;
        self.version += 1;
    }

    fn points_ndim_check(&self, points: &[f64], n: usize) -> Result<usize> {
        let ndim = self.space.spec().ndim();
        if points.len() != n * ndim {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {ndim} point values, got {}",
                points.len()
            )));
        }
        Ok(ndim)
    }

    /// Accumulates `weight · space.probability(component, point)` over all components, for
    /// each of `n` points, into `out` (length `n`).
    pub fn evaluate_points(&self, points: &[f64], n: usize, out: &mut [f64]) -> Result<()> {
        let ndim = self.points_ndim_check(points, n)?;
        for o in out.iter_mut().take(n) {
            *o = 0.0;
        }
        for (c, &weight) in self.components.iter().zip(&self.weights) {
            for s in 0..n {
                let point = &points[s * ndim..(s + 1) * ndim];
                out[s] += weight * self.space.probability(&c.location, &c.bandwidth, point);
            }
        }
        Ok(())
    }

    /// Accumulates `weight · scale_factor · space.probability(...)` over the grid's valid
    /// points (length `grid.size()`).
    pub fn evaluate_grid(&self, grid: &Grid, out: &mut [f64]) {
        for o in out.iter_mut().take(grid.size()) {
            *o = 0.0;
        }
        for i in 0..grid.size() {
            if !grid.is_valid(i) {
                continue;
            }
            let point = grid.point(i);
            for (c, &weight) in self.components.iter().zip(&self.weights) {
                out[i] += weight * self.space.probability(&c.location, &c.bandwidth, point.as_slice());
            }
        }
    }

    /// Fills `out` (length `ncomponents * n`) with
    /// `scale_factor_selected_log + partial_logp(loc,bw,point,selection)`, one entry per
    /// `(component, sample)` pair, row-major.
    pub fn partial_points(
        &self,
        points: &[f64],
        n: usize,
        selection: &[bool],
        out: &mut [f64],
    ) -> Result<()> {
        let ndim = self.points_ndim_check(points, n)?;
        for (ci, c) in self.components.iter().enumerate() {
            let scale_log = self.space.compute_scale_factor_selected(&c.bandwidth, true, selection);
            for s in 0..n {
                let point = &points[s * ndim..(s + 1) * ndim];
                out[ci * n + s] = scale_log + self.space.partial_logp(&c.location, &c.bandwidth, point, selection);
            }
        }
        Ok(())
    }

    /// Grid-based counterpart of [`Mixture::partial_points`]; `out` has length
    /// `ncomponents * grid.size()`.
    pub fn partial_grid(&self, grid: &Grid, selection: &[bool], out: &mut [f64]) {
        let n = grid.size();
        for (ci, c) in self.components.iter().enumerate() {
            let scale_log = self.space.compute_scale_factor_selected(&c.bandwidth, true, selection);
            for s in 0..n {
                let point = grid.point(s);
                out[ci * n + s] =
                    scale_log + self.space.partial_logp(&c.location, &c.bandwidth, point.as_slice(), selection);
            }
        }
    }

    /// Accumulates `Σ_c w_c · exp(partial_logp(c,s) + log_scale(c))` into `out` (length `n`),
    /// skipping components whose contribution is `-inf`.
    pub fn marginal_points(&self, points: &[f64], n: usize, selection: &[bool], out: &mut [f64]) -> Result<()> {
        let ndim = self.points_ndim_check(points, n)?;
        for o in out.iter_mut().take(n) {
            *o = 0.0;
        }
        for (c, &weight) in self.components.iter().zip(&self.weights) {
            let scale_log = self.space.compute_scale_factor_selected(&c.bandwidth, true, selection);
            for s in 0..n {
                let point = &points[s * ndim..(s + 1) * ndim];
                let lp = scale_log + self.space.partial_logp(&c.location, &c.bandwidth, point, selection);
                if lp.is_finite() {
                    out[s] += weight * crate::fastmath::fastexp64(lp);
                }
            }
        }
        Ok(())
    }

    /// Grid-based counterpart of [`Mixture::marginal_points`].
    pub fn marginal_grid(&self, grid: &Grid, selection: &[bool], out: &mut [f64]) {
        let n = grid.size();
        for o in out.iter_mut().take(n) {
            *o = 0.0;
        }
        for (c, &weight) in self.components.iter().zip(&self.weights) {
            let scale_log = self.space.compute_scale_factor_selected(&c.bandwidth, true, selection);
            for s in 0..n {
                let point = grid.point(s);
                let lp = scale_log + self.space.partial_logp(&c.location, &c.bandwidth, point.as_slice(), selection);
                if lp.is_finite() {
                    out[s] += weight * crate::fastmath::fastexp64(lp);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;
    use crate::space_spec::SpaceSpec;

    fn euclidean_space(ndim: usize) -> Space {
        let dims = (0..ndim)
            .map(|i| DimensionSpec::new(format!("x{i}"), DimensionKind::Euclidean, ""))
            .collect();
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    #[test]
    fn add_samples_updates_weights_and_version() {
        let mut m = Mixture::with_seed(euclidean_space(1), 2.0, 42);
        m.add_samples(&[0.0, 1.0, 2.0], 3, 1.0, 1.0).unwrap();
        assert_eq!(m.ncomponents(), 3);
        assert!((m.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(m.version(), 1);
    }

    #[test]
    fn add_samples_rejects_shape_mismatch_without_mutating() {
        let mut m = Mixture::with_seed(euclidean_space(1), 2.0, 42);
        m.add_samples(&[0.0, 1.0], 1, 1.0, 1.0).unwrap();
        assert!(m.add_samples(&[0.0, 1.0], 1, 1.0, 1.0).is_err());
        assert_eq!(m.ncomponents(), 1);
    }

    #[test]
    fn merge_samples_merges_nearby_points_into_one_component() {
        let mut m = Mixture::with_seed(euclidean_space(1), 0.5, 1);
        m.merge_samples(&[0.0], 1, false, 1.0, 1.0).unwrap();
        m.merge_samples(&[0.01], 1, false, 1.0, 1.0).unwrap();
        assert_eq!(m.ncomponents(), 1);
    }

    #[test]
    fn merge_samples_appends_far_points_as_new_components() {
        let mut m = Mixture::with_seed(euclidean_space(1), 0.1, 1);
        m.merge_samples(&[0.0], 1, false, 1.0, 1.0).unwrap();
        m.merge_samples(&[100.0], 1, false, 1.0, 1.0).unwrap();
        assert_eq!(m.ncomponents(), 2);
    }

    #[test]
    fn clear_resets_and_bumps_version() {
        let mut m = Mixture::with_seed(euclidean_space(1), 0.5, 1);
        m.add_samples(&[0.0], 1, 1.0, 1.0).unwrap();
        let v = m.version();
        m.clear();
        assert_eq!(m.ncomponents(), 0);
        assert!(m.version() > v);
    }

    #[test]
    fn set_threshold_rejects_negative() {
        let mut m = Mixture::with_seed(euclidean_space(1), 0.5, 1);
        assert!(m.set_threshold(-1.0).is_err());
    }
}
