//! `PoissonLikelihood`: the log-likelihood of observed events under a Poisson process whose rate
//! is a mixture over event space, conditioned on stimulus occupancy.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::fastmath::fastlog64;
use crate::grid::{Grid, GridOps};
use crate::mixture::Mixture;
use crate::partial_mixture::PartialMixture;
use crate::space::{Space, SpaceOps};
use crate::stimulus::StimulusOccupancy;

/// Where the event mixture lives: owned by this likelihood, or shared with the stimulus
/// occupancy because the event distribution *is* that occupancy's mixture.
enum EventSource {
    Owned(RefCell<Mixture>),
    Shared(Rc<StimulusOccupancy>),
}

/// The grid-shaped tables [`PoissonLikelihood::precompute`] derives; stale after any
/// `add_events` until the next `precompute`.
#[derive(Default)]
struct Cache {
    selection: Vec<bool>,
    logp_stimulus: Vec<f64>,
    event_rate: Vec<f64>,
    p_event: Option<PartialMixture>,
    changed: bool,
}

/// The rate-function estimator for one source (e.g. one recording electrode).
///
/// Not internally synchronized like [`StimulusOccupancy`] — it uses a [`RefCell`] rather than a
/// `Mutex` so that `Rc<PoissonLikelihood>` instances shared across a [`crate::decoder::Decoder`]'s
/// sources and union members can still be queried through `&self`, but that interior mutability is
/// single-threaded only.
pub struct PoissonLikelihood {
    event_distribution: EventSource,
    stimulus: Rc<StimulusOccupancy>,
    stimulus_grid: Grid,
    rate_scale: f64,
    random_insertion: bool,
    cache: RefCell<Cache>,
}

impl PoissonLikelihood {
    /// Shape 1: the event distribution *is* the stimulus distribution. Builds a fresh owned
    /// occupancy and shares it as both `stimulus` and `event_distribution`.
    #[must_use]
    pub fn new_stimulus_only(
        space: Space,
        threshold: f64,
        grid: Grid,
        stimulus_duration: f64,
        compression: f64,
        random_insertion: bool,
        rate_scale: f64,
    ) -> Self {
        let occ = Rc::new(StimulusOccupancy::new(
            space,
            threshold,
            grid.clone(),
            stimulus_duration,
            compression,
            random_insertion,
        ));
        Self::new_raw(EventSource::Shared(Rc::clone(&occ)), occ, grid, rate_scale, random_insertion)
    }

    /// Shape 2: event distribution over the product space, with an owned stimulus occupancy.
    #[must_use]
    pub fn new_with_owned_stimulus(
        event_space: Space,
        event_threshold: f64,
        stimulus_space: Space,
        stimulus_threshold: f64,
        grid: Grid,
        stimulus_duration: f64,
        compression: f64,
        random_insertion: bool,
        rate_scale: f64,
    ) -> Self {
        let occ = Rc::new(StimulusOccupancy::new(
            stimulus_space,
            stimulus_threshold,
            grid.clone(),
            stimulus_duration,
            compression,
            random_insertion,
        ));
        let events = Mixture::new(event_space, event_threshold);
        Self::new_raw(
            EventSource::Owned(RefCell::new(events)),
            occ,
            grid,
            rate_scale,
            random_insertion,
        )
    }

    /// Shape 3: event distribution over the product space, sharing a caller-supplied occupancy.
    #[must_use]
    pub fn new_with_shared_stimulus(
        event_space: Space,
        event_threshold: f64,
        stimulus: Rc<StimulusOccupancy>,
        rate_scale: f64,
        random_insertion: bool,
    ) -> Self {
        let grid = stimulus.grid().clone();
        let events = Mixture::new(event_space, event_threshold);
        Self::new_raw(
            EventSource::Owned(RefCell::new(events)),
            stimulus,
            grid,
            rate_scale,
            random_insertion,
        )
    }

    /// Shape 4: no separate event mixture; the event distribution is the shared occupancy's own
    /// mixture.
    #[must_use]
    pub fn new_shared_stimulus_only(stimulus: Rc<StimulusOccupancy>, rate_scale: f64, random_insertion: bool) -> Self {
        let grid = stimulus.grid().clone();
        Self::new_raw(
            EventSource::Shared(Rc::clone(&stimulus)),
            stimulus,
            grid,
            rate_scale,
            random_insertion,
        )
    }

    /// Rebuilds a likelihood from a fully reconstructed owned event mixture paired with a
    /// stimulus occupancy (used by [`crate::serialization`] on load, shapes 2/3).
    pub(crate) fn from_owned_parts(
        event_mixture: Mixture,
        stimulus: Rc<StimulusOccupancy>,
        rate_scale: f64,
        random_insertion: bool,
    ) -> Self {
        let grid = stimulus.grid().clone();
        Self::new_raw(
            EventSource::Owned(RefCell::new(event_mixture)),
            stimulus,
            grid,
            rate_scale,
            random_insertion,
        )
    }

    /// Whether the event distribution *is* the shared stimulus occupancy's own mixture (shapes
    /// 1/4), rather than a separately owned one (shapes 2/3).
    #[must_use]
    pub(crate) const fn event_is_stimulus(&self) -> bool {
        matches!(self.event_distribution, EventSource::Shared(_))
    }

    /// Runs `f` against the event mixture, whichever source holds it. Exposed for
    /// [`crate::serialization`], which otherwise has no way to read an owned event mixture.
    pub(crate) fn with_event_mixture_pub<R>(&self, f: impl FnOnce(&Mixture) -> R) -> R {
        self.with_event_mixture(f)
    }

    /// Rate-scale factor, for [`crate::serialization`].
    #[must_use]
    pub(crate) const fn rate_scale(&self) -> f64 {
        self.rate_scale
    }

    /// Whether batch ingestion shuffles before the merge probe, for [`crate::serialization`].
    #[must_use]
    pub(crate) const fn random_insertion_flag(&self) -> bool {
        self.random_insertion
    }

    fn new_raw(
        event_distribution: EventSource,
        stimulus: Rc<StimulusOccupancy>,
        grid: Grid,
        rate_scale: f64,
        random_insertion: bool,
    ) -> Self {
        Self {
            event_distribution,
            stimulus,
            stimulus_grid: grid,
            rate_scale,
            random_insertion,
            cache: RefCell::new(Cache {
                changed: true,
                ..Cache::default()
            }),
        }
    }

    fn with_event_mixture<R>(&self, f: impl FnOnce(&Mixture) -> R) -> R {
        match &self.event_distribution {
            EventSource::Owned(m) => f(&m.borrow()),
            EventSource::Shared(occ) => f(&occ.lock_mixture()),
        }
    }

    /// Ingests `n` events at `points` (row-major `(n, ndim_events)`), each repeated `reps` times.
    pub fn add_events(&self, points: &[f64], n: usize, reps: f64) -> Result<()> {
        match &self.event_distribution {
            EventSource::Owned(m) => m.borrow_mut().merge_samples(points, n, self.random_insertion, reps, 1.0)?,
            EventSource::Shared(occ) => occ.add_stimulus(points, n, reps)?,
        }
        self.cache.borrow_mut().changed = true;
        Ok(())
    }

    /// Recomputes the cached stimulus/event-rate tables this likelihood's log-likelihood relies
    /// on. Called automatically by [`PoissonLikelihood::log_l`] when stale.
    pub fn precompute(&self) -> Result<()> {
        let stimulus_spec = self.stimulus.lock_mixture().space().spec().clone();
        let event_spec = self.with_event_mixture(|m| m.space().spec().clone());
        let selection = event_spec.selection(&stimulus_spec)?;

        // Raw probability, not yet logged: `event_rate` below divides by this while it still
        // holds the probability, before it is transformed to a log in place.
        let mut logp_stimulus = self.stimulus.prob();

        let p_event = self.with_event_mixture(|m| PartialMixture::from_grid(m, &selection, &self.stimulus_grid))?;
        let mut marginal = vec![0.0; self.stimulus_grid.size()];
        self.with_event_mixture(|m| p_event.marginal(m, &mut marginal))?;

        let event_rate: Vec<f64> = marginal
            .iter()
            .zip(&logp_stimulus)
            .map(|(&m, &p)| if p > 0.0 { m / p } else { 0.0 })
            .collect();

        for p in &mut logp_stimulus {
            *p = fastlog64(*p);
        }

        let mut cache = self.cache.borrow_mut();
        cache.selection = selection;
        cache.logp_stimulus = logp_stimulus;
        cache.event_rate = event_rate;
        cache.p_event = Some(p_event);
        cache.changed = false;
        Ok(())
    }

    fn event_ndim(&self) -> usize {
        self.with_event_mixture(|m| m.space().spec().ndim())
    }

    fn inverse_points(selection: &[bool], events: &[f64], n: usize, ndim_events: usize) -> Vec<f64> {
        let inv_ndim = selection.iter().filter(|&&s| !s).count();
        let mut inv_points = Vec::with_capacity(n * inv_ndim);
        for i in 0..n {
            let full = &events[i * ndim_events..(i + 1) * ndim_events];
            for (&sel, &v) in selection.iter().zip(full) {
                if !sel {
                    inv_points.push(v);
                }
            }
        }
        inv_points
    }

    /// Fills `result` (length `stimulus_grid.size()`) with the Poisson log-likelihood of `n`
    /// events at `events` (row-major `(n, ndim_events)`) observed over `delta_t`.
    pub fn log_l(&self, events: &[f64], n: usize, delta_t: f64, result: &mut [f64]) -> Result<()> {
        if self.cache.borrow().changed {
            self.precompute()?;
        }

        let ndim_events = self.event_ndim();
        if events.len() != n * ndim_events {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {ndim_events} event values, got {}",
                events.len()
            )));
        }

        let cache = self.cache.borrow();
        let inv_points = Self::inverse_points(&cache.selection, events, n, ndim_events);

        for v in result.iter_mut() {
            *v = 0.0;
        }
        let p_event = cache.p_event.as_ref().ok_or(Error::Staleness)?;
        self.with_event_mixture(|m| p_event.complete_multi(m, &inv_points, n, result))?;

        #[allow(clippy::cast_precision_loss)]
        let n_f = n as f64;
        let mu = self.with_event_mixture(Mixture::sum_of_weights) / self.stimulus.stimulus_time();
        let log_term = n_f * fastlog64(delta_t * self.rate_scale * mu);

        for g in 0..self.stimulus_grid.size() {
            result[g] += log_term - n_f * cache.logp_stimulus[g] - delta_t * self.rate_scale * mu * cache.event_rate[g];
        }
        Ok(())
    }

    /// Elementwise `fastexp` of [`PoissonLikelihood::log_l`].
    pub fn likelihood(&self, events: &[f64], n: usize, delta_t: f64, result: &mut [f64]) -> Result<()> {
        self.log_l(events, n, delta_t, result)?;
        for v in result.iter_mut() {
            *v = crate::fastmath::fastexp64(*v);
        }
        Ok(())
    }

    /// `event_logp`: the event-density term of [`PoissonLikelihood::log_l`] alone (without the
    /// rate-normalization terms), i.e. [`PartialMixture::complete_multi`] on its own.
    pub fn event_logp(&self, events: &[f64], n: usize, result: &mut [f64]) -> Result<()> {
        if self.cache.borrow().changed {
            self.precompute()?;
        }
        let ndim_events = self.event_ndim();
        if events.len() != n * ndim_events {
            return Err(Error::ShapeMismatch(format!(
                "expected {n} * {ndim_events} event values, got {}",
                events.len()
            )));
        }
        let cache = self.cache.borrow();
        let inv_points = Self::inverse_points(&cache.selection, events, n, ndim_events);
        for v in result.iter_mut() {
            *v = 0.0;
        }
        let p_event = cache.p_event.as_ref().ok_or(Error::Staleness)?;
        self.with_event_mixture(|m| p_event.complete_multi(m, &inv_points, n, result))
    }

    /// Elementwise `fastexp` of [`PoissonLikelihood::event_logp`].
    pub fn event_prob(&self, events: &[f64], n: usize, result: &mut [f64]) -> Result<()> {
        self.event_logp(events, n, result)?;
        for v in result.iter_mut() {
            *v = crate::fastmath::fastexp64(*v);
        }
        Ok(())
    }

    /// Whether [`PoissonLikelihood::precompute`] must run before the next `log_l`/`likelihood`.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.cache.borrow().changed
    }

    /// The shared stimulus occupancy.
    #[must_use]
    pub fn stimulus(&self) -> &Rc<StimulusOccupancy> {
        &self.stimulus
    }

    /// The grid `log_l` evaluates on.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.stimulus_grid
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

    fn flat_space_and_grid() -> (Space, Grid) {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        let spec = SpaceSpec::new(dims).unwrap();
        let space: Space = Euclidean::new(spec.clone(), Gaussian::new(3.0).into()).into();
        let grid: Grid = ArrayGrid::new(spec, vec![0.0, 1.0, 2.0], vec![3], Vec::new())
            .unwrap()
            .into();
        (space, grid)
    }

    #[test]
    fn precompute_runs_lazily_on_first_logl() {
        let (space, grid) = flat_space_and_grid();
        let lik = PoissonLikelihood::new_stimulus_only(space, 0.5, grid, 1.0, 1.0, false, 1.0);
        lik.add_events(&[0.0, 1.0, 2.0], 3, 1.0).unwrap();
        assert!(lik.changed());
        let mut result = vec![0.0; 3];
        lik.log_l(&[0.0, 1.0, 2.0], 3, 1.0, &mut result).unwrap();
        assert!(!lik.changed());
        assert!(result.iter().all(|v| v.is_finite() || v.is_infinite()));
    }

    #[test]
    fn event_shape_mismatch_is_an_error() {
        let (space, grid) = flat_space_and_grid();
        let lik = PoissonLikelihood::new_stimulus_only(space, 0.5, grid, 1.0, 1.0, false, 1.0);
        lik.add_events(&[0.0], 1, 1.0).unwrap();
        let mut result = vec![0.0; 3];
        assert!(lik.log_l(&[0.0, 1.0], 1, 1.0, &mut result).is_err());
    }

    #[test]
    fn shared_rc_can_be_queried_through_shared_reference() {
        let (space, grid) = flat_space_and_grid();
        let lik = Rc::new(PoissonLikelihood::new_stimulus_only(space, 0.5, grid, 1.0, 1.0, false, 1.0));
        lik.add_events(&[0.0, 1.0, 2.0], 3, 1.0).unwrap();
        let mut result = vec![0.0; 3];
        lik.log_l(&[0.0], 1, 1.0, &mut result).unwrap();
    }
}
