//! `to_tree`/`from_tree` conversions between live crate state and the wire trees of
//! [`super::tree`]. Both the textual and binary containers drive these same functions, so they
//! are provably views of identical abstract state.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::tree::{ComponentTree, DecoderTree, LikelihoodTree, MixtureTree, StandaloneLikelihoodTree, StimulusTree};
use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::likelihood::PoissonLikelihood;
use crate::mixture::Mixture;
use crate::stimulus::StimulusOccupancy;

/// Builds a [`MixtureTree`] from a live mixture, dropping each component's cached scale factor.
#[must_use]
pub fn mixture_to_tree(mixture: &Mixture) -> MixtureTree {
    MixtureTree {
        sum_of_weights: mixture.sum_of_weights(),
        sum_of_nsamples: mixture.sum_of_nsamples(),
        threshold: mixture.threshold(),
        nkernels: mixture.ncomponents(),
        space: mixture.space().clone(),
        kernels: mixture
            .components()
            .iter()
            .map(|c| ComponentTree {
                loc: c.location.clone(),
                bw: c.bandwidth.clone(),
            })
            .collect(),
        weights: mixture.weights().to_vec(),
    }
}

/// Rebuilds a mixture from its tree, recomputing every component's scale factor from
/// `(space, bandwidth)` rather than trusting any stored value.
#[must_use]
pub fn mixture_from_tree(tree: MixtureTree) -> Mixture {
    let locations_bandwidths = tree.kernels.into_iter().map(|c| (c.loc, c.bw)).collect();
    Mixture::from_raw(
        tree.space,
        tree.threshold,
        tree.sum_of_weights,
        tree.sum_of_nsamples,
        locations_bandwidths,
        tree.weights,
    )
}

/// Builds a [`StimulusTree`] from a live occupancy.
#[must_use]
pub fn stimulus_to_tree(occ: &StimulusOccupancy) -> StimulusTree {
    StimulusTree {
        stimulus_duration: occ.stimulus_duration(),
        compression: occ.compression(),
        random_insertion: occ.random_insertion(),
        stimulus_distribution: mixture_to_tree(&occ.lock_mixture()),
        stimulus_grid: occ.grid().clone(),
    }
}

/// Rebuilds a stimulus occupancy from its tree.
#[must_use]
pub fn stimulus_from_tree(tree: StimulusTree) -> StimulusOccupancy {
    StimulusOccupancy::from_parts(
        mixture_from_tree(tree.stimulus_distribution),
        tree.stimulus_grid,
        tree.stimulus_duration,
        tree.compression,
        tree.random_insertion,
    )
}

/// Builds a [`LikelihoodTree`] from a live likelihood, excluding its stimulus occupancy.
#[must_use]
pub fn likelihood_to_tree(lik: &PoissonLikelihood) -> LikelihoodTree {
    let event_is_stimulus = lik.event_is_stimulus();
    LikelihoodTree {
        rate_scale: lik.rate_scale(),
        random_insertion: lik.random_insertion_flag(),
        event_is_stimulus,
        event_distribution: (!event_is_stimulus).then(|| lik.with_event_mixture_pub(mixture_to_tree)),
    }
}

/// Rebuilds a likelihood from its tree plus an already-resolved stimulus occupancy.
#[must_use]
pub fn likelihood_from_tree(tree: LikelihoodTree, stimulus: Rc<StimulusOccupancy>) -> PoissonLikelihood {
    if tree.event_is_stimulus {
        PoissonLikelihood::new_shared_stimulus_only(stimulus, tree.rate_scale, tree.random_insertion)
    } else {
        let event_mixture = mixture_from_tree(tree.event_distribution.unwrap_or_else(|| {
            unreachable!("event_is_stimulus=false always carries event_distribution")
        }));
        PoissonLikelihood::from_owned_parts(event_mixture, stimulus, tree.rate_scale, tree.random_insertion)
    }
}

/// Builds a [`StandaloneLikelihoodTree`], including the stimulus occupancy iff `include_stimulus`.
#[must_use]
pub fn standalone_likelihood_to_tree(lik: &PoissonLikelihood, include_stimulus: bool) -> StandaloneLikelihoodTree {
    StandaloneLikelihoodTree {
        likelihood: likelihood_to_tree(lik),
        stimulus: include_stimulus.then(|| stimulus_to_tree(lik.stimulus())),
    }
}

/// Rebuilds a standalone likelihood. Exactly one of `tree.stimulus` and `external_stimulus` must
/// be present; supplying neither or both is [`Error::InvalidSpec`].
pub fn standalone_likelihood_from_tree(
    tree: StandaloneLikelihoodTree,
    external_stimulus: Option<Rc<StimulusOccupancy>>,
) -> Result<PoissonLikelihood> {
    let stimulus = match (tree.stimulus, external_stimulus) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidSpec(
                "a likelihood tree carrying its own stimulus must not also be given an external one".to_string(),
            ))
        }
        (None, None) => {
            return Err(Error::InvalidSpec(
                "a likelihood tree saved without its stimulus needs a caller-supplied one on load".to_string(),
            ))
        }
        (Some(t), None) => Rc::new(stimulus_from_tree(t)),
        (None, Some(rc)) => rc,
    };
    Ok(likelihood_from_tree(tree.likelihood, stimulus))
}

/// Builds a [`DecoderTree`], deduplicating shared stimulus occupancies by `Rc::ptr_eq` identity:
/// the first `(s, u)` pair to reference a given occupancy writes it in full; every later
/// reference to the same occupancy records only its key.
#[must_use]
pub fn decoder_to_tree(decoder: &Decoder) -> DecoderTree {
    let likelihoods = decoder.likelihoods_raw();
    let nsources = likelihoods.len();
    let nunion = decoder.arity();

    let mut seen: FxHashMap<usize, String> = FxHashMap::default();
    let mut stimulus_store = Vec::new();
    let mut stimulus_keys = vec![vec![String::new(); nunion]; nsources];
    let mut tree_likelihoods = vec![Vec::with_capacity(nunion); nsources];

    for (s, source) in likelihoods.iter().enumerate() {
        for (u, lik) in source.iter().enumerate() {
            let ptr = Rc::as_ptr(lik.stimulus()) as usize;
            let key = seen.entry(ptr).or_insert_with(|| {
                let key = format!("stimulus_{s}_{u}");
                stimulus_store.push((key.clone(), stimulus_to_tree(lik.stimulus())));
                key
            });
            stimulus_keys[s][u] = key.clone();
            tree_likelihoods[s].push(likelihood_to_tree(lik));
        }
    }

    DecoderTree {
        nsources,
        nunion,
        stimulus_keys,
        stimulus_store,
        likelihoods: tree_likelihoods,
        priors: decoder.priors_raw().to_vec(),
        enabled: decoder.enabled().to_vec(),
    }
}

/// Rebuilds a decoder from its tree, resolving deduplicated stimulus occupancies back into
/// shared `Rc` instances keyed the same way they were written.
pub fn decoder_from_tree(tree: DecoderTree) -> Result<Decoder> {
    let mut resolved: FxHashMap<String, Rc<StimulusOccupancy>> = FxHashMap::default();
    for (key, stim_tree) in tree.stimulus_store {
        resolved.insert(key, Rc::new(stimulus_from_tree(stim_tree)));
    }

    let mut likelihoods = Vec::with_capacity(tree.nsources);
    for (s, source) in tree.likelihoods.into_iter().enumerate() {
        let mut row = Vec::with_capacity(tree.nunion);
        for (u, lik_tree) in source.into_iter().enumerate() {
            let key = &tree.stimulus_keys[s][u];
            let stimulus = resolved
                .get(key)
                .ok_or_else(|| Error::InvalidSpec(format!("unknown stimulus key {key}")))?;
            row.push(Rc::new(likelihood_from_tree(lik_tree, Rc::clone(stimulus))));
        }
        likelihoods.push(row);
    }

    Ok(Decoder::from_parts(likelihoods, tree.priors, tree.enabled))
}
