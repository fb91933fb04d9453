//! `StimulusOccupancy`: how much time an animal spent at each point of a stimulus space.

use std::sync::Mutex;

use crate::error::Result;
use crate::fastmath::fastlog64;
use crate::grid::{Grid, GridOps};
use crate::mixture::Mixture;
use crate::space::Space;

/// A mixture over a stimulus space, tracking the total observed time it represents.
///
/// The only concurrency-safe object in this crate: [`StimulusOccupancy::add_stimulus`] and the
/// read methods all acquire an internal [`Mutex`], so one shared occupancy may be updated by an
/// ingestion thread while a decoder thread reads it.
pub struct StimulusOccupancy {
    stimulus_distribution: Mutex<Mixture>,
    stimulus_grid: Grid,
    stimulus_duration: f64,
    compression: f64,
    random_insertion: bool,
}

impl StimulusOccupancy {
    /// Rebuilds a stimulus occupancy from a fully reconstructed mixture (used by
    /// [`crate::serialization`] on load, where the mixture's scale factors are already
    /// recomputed via [`Mixture::from_raw`]).
    pub(crate) fn from_parts(
        mixture: Mixture,
        grid: Grid,
        stimulus_duration: f64,
        compression: f64,
        random_insertion: bool,
    ) -> Self {
        Self {
            stimulus_distribution: Mutex::new(mixture),
            stimulus_grid: grid,
            stimulus_duration,
            compression,
            random_insertion,
        }
    }

    /// Builds a stimulus occupancy over `space`, evaluated on `grid`.
    #[must_use]
    pub fn new(
        space: Space,
        threshold: f64,
        grid: Grid,
        stimulus_duration: f64,
        compression: f64,
        random_insertion: bool,
    ) -> Self {
        Self {
            stimulus_distribution: Mutex::new(Mixture::new(space, threshold)),
            stimulus_grid: grid,
            stimulus_duration,
            compression,
            random_insertion,
        }
    }

    /// The grid this occupancy is evaluated against.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.stimulus_grid
    }

    /// Seconds represented by a single atomic sample.
    #[must_use]
    pub const fn stimulus_duration(&self) -> f64 {
        self.stimulus_duration
    }

    /// The caller-declared compression ratio; carried through serialization, not otherwise
    /// interpreted by this crate.
    #[must_use]
    pub const fn compression(&self) -> f64 {
        self.compression
    }

    /// Whether ingestion shuffles each batch before the nearest-neighbor merge probe.
    #[must_use]
    pub const fn random_insertion(&self) -> bool {
        self.random_insertion
    }

    /// Ingests `n` stimulus samples, each repeated `repetitions` times (folded into the batch
    /// weight), merging into the wrapped mixture with `w=1`, `attenuation=1`.
    pub fn add_stimulus(&self, points: &[f64], n: usize, repetitions: f64) -> Result<()> {
        let mut guard = self.stimulus_distribution.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.merge_samples(points, n, self.random_insertion, repetitions, 1.0)
    }

    /// Total observed stimulus time: `sum_of_weights · stimulus_duration`.
    #[must_use]
    pub fn stimulus_time(&self) -> f64 {
        let guard = self.stimulus_distribution.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.sum_of_weights() * self.stimulus_duration
    }

    /// Probability of the mixture on [`StimulusOccupancy::grid`].
    #[must_use]
    pub fn prob(&self) -> Vec<f64> {
        let guard = self.stimulus_distribution.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = vec![0.0; self.stimulus_grid.size()];
        guard.evaluate_grid(&self.stimulus_grid, &mut out);
        out
    }

    /// `prob()` scaled by the total observed time, i.e. the expected occupancy count.
    #[must_use]
    pub fn occupancy(&self) -> Vec<f64> {
        let time = self.stimulus_time();
        self.prob().into_iter().map(|p| p * time).collect()
    }

    /// Elementwise `fastlog` of [`StimulusOccupancy::prob`].
    #[must_use]
    pub fn logp(&self) -> Vec<f64> {
        self.prob().into_iter().map(fastlog64).collect()
    }

    /// A locked read of the wrapped mixture's sample count, for diagnostics.
    #[must_use]
    pub fn ncomponents(&self) -> usize {
        let guard = self.stimulus_distribution.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.ncomponents()
    }

    /// Locks and returns the wrapped mixture, for callers (within this crate) that need
    /// read access across several operations without re-locking each time.
    pub(crate) fn lock_mixture(&self) -> std::sync::MutexGuard<'_, Mixture> {
        self.stimulus_distribution.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::grid::ArrayGrid;
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;
    use crate::space_spec::SpaceSpec;

    fn occupancy() -> StimulusOccupancy {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        let spec = SpaceSpec::new(dims).unwrap();
        let space: Space = Euclidean::new(spec.clone(), Gaussian::new(3.0).into()).into();
        let grid: Grid = ArrayGrid::new(spec, vec![0.0, 1.0, 2.0], vec![3], Vec::new())
            .unwrap()
            .into();
        StimulusOccupancy::new(space, 0.5, grid, 0.1, 1.0, false)
    }

    #[test]
    fn stimulus_time_scales_with_samples_and_duration() {
        let occ = occupancy();
        occ.add_stimulus(&[0.0, 1.0], 2, 1.0).unwrap();
        assert!((occ.stimulus_time() - 2.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn logp_is_log_of_prob() {
        let occ = occupancy();
        occ.add_stimulus(&[0.0, 1.0, 2.0], 3, 1.0).unwrap();
        let prob = occ.prob();
        let logp = occ.logp();
        for (p, lp) in prob.iter().zip(&logp) {
            assert!((lp - fastlog64(*p)).abs() < 1e-9);
        }
    }
}
