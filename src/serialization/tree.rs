//! The shared intermediate representation both container formats serialize: plain, fully
//! `serde`-derived trees with no cached/derived fields, so textual and binary encodings are
//! provably views of the same abstract state.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::space::Space;

/// `{loc, bw}` — deliberately omits a component's scale factor, which is always recomputed from
/// `(space, bandwidth)` on load rather than trusted from storage.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ComponentTree {
    /// The component's location.
    pub loc: Vec<f64>,
    /// The component's bandwidth.
    pub bw: Vec<f64>,
}

/// The wire form of a [`crate::mixture::Mixture`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MixtureTree {
    /// Running sum of ingested batch weights.
    pub sum_of_weights: f64,
    /// Running sum of ingested sample counts.
    pub sum_of_nsamples: f64,
    /// Distance cutoff for the merge probe.
    pub threshold: f64,
    /// Number of components (redundant with `kernels.len()`, carried for introspectability).
    pub nkernels: usize,
    /// The space the mixture lives over.
    pub space: Space,
    /// The components, excluding cached scale factors.
    pub kernels: Vec<ComponentTree>,
    /// Per-component weights, parallel to `kernels`.
    pub weights: Vec<f64>,
}

/// The wire form of a [`crate::stimulus::StimulusOccupancy`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StimulusTree {
    /// Seconds represented by a single atomic sample.
    pub stimulus_duration: f64,
    /// Caller-declared compression ratio.
    pub compression: f64,
    /// Whether ingestion shuffles each batch before the merge probe.
    pub random_insertion: bool,
    /// The wrapped mixture.
    pub stimulus_distribution: MixtureTree,
    /// The grid this occupancy evaluates against.
    pub stimulus_grid: Grid,
}

/// The wire form of a [`crate::likelihood::PoissonLikelihood`], minus its stimulus occupancy —
/// the caller decides separately whether a given instance owns its stimulus tree or refers to one
/// shared with other sources (see [`DecoderTree`]).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LikelihoodTree {
    /// The rate-scale factor.
    pub rate_scale: f64,
    /// Whether batch ingestion shuffles before the merge probe.
    pub random_insertion: bool,
    /// Whether the event distribution *is* the stimulus occupancy's own mixture, rather than a
    /// separately owned one.
    pub event_is_stimulus: bool,
    /// The event mixture, present only when `!event_is_stimulus`.
    pub event_distribution: Option<MixtureTree>,
}

/// The wire form of a standalone [`crate::likelihood::PoissonLikelihood`], for callers who want
/// to persist one likelihood at a time rather than through a [`DecoderTree`].
///
/// Per the stored-state ownership rule, `stimulus` is `None` exactly when the likelihood was
/// saved without its stimulus and must be loaded with a caller-supplied
/// `Rc<StimulusOccupancy>`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StandaloneLikelihoodTree {
    /// The likelihood's own fields.
    pub likelihood: LikelihoodTree,
    /// The stimulus occupancy, if this likelihood owns (rather than shares) it.
    pub stimulus: Option<StimulusTree>,
}

/// The wire form of a [`crate::decoder::Decoder`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DecoderTree {
    /// Number of sources.
    pub nsources: usize,
    /// Number of union members.
    pub nunion: usize,
    /// `stimulus_keys[s][u]` indexes into `stimulus_store` by key.
    pub stimulus_keys: Vec<Vec<String>>,
    /// Every distinct stimulus occupancy this decoder's sources reference (deduplicated by
    /// `Rc::ptr_eq` identity during the write walk), keyed by the first `(s, u)` that wrote it.
    pub stimulus_store: Vec<(String, StimulusTree)>,
    /// `likelihoods[s][u]`'s own fields, sans stimulus (looked up via `stimulus_keys`).
    pub likelihoods: Vec<Vec<LikelihoodTree>>,
    /// Per-union-member priors (`&[]` for none).
    pub priors: Vec<Vec<f64>>,
    /// The enabled mask, parallel to sources.
    pub enabled: Vec<bool>,
}
