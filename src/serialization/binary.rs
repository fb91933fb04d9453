//! The hierarchical binary container: the same [`super::tree`] representation as
//! [`super::textual`], encoded with `bincode` instead of `serde_yaml`.
//!
//! The tree types in [`super::tree`] already name every group/dataset the hierarchical format
//! needs (`Mixture`'s `kernels`/`weights`, `Grid`'s `shape`/`valid`, `Decoder`'s
//! `stimulus_store`/`stimulus_keys`), so this module is a thin `bincode` binding over them rather
//! than a second, independently-maintained schema.

use std::rc::Rc;

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::likelihood::PoissonLikelihood;
use crate::mixture::Mixture;
use crate::stimulus::StimulusOccupancy;

use super::convert::{
    decoder_from_tree, decoder_to_tree, mixture_from_tree, mixture_to_tree, standalone_likelihood_from_tree,
    standalone_likelihood_to_tree, stimulus_from_tree, stimulus_to_tree,
};

fn wrap(e: bincode::Error) -> Error {
    Error::Other(anyhow::Error::from(e))
}

/// Serializes a mixture to the binary container.
pub fn mixture_to_bytes(mixture: &Mixture) -> Result<Vec<u8>> {
    bincode::serialize(&mixture_to_tree(mixture)).map_err(wrap)
}

/// Deserializes a mixture from the binary container.
pub fn mixture_from_bytes(bytes: &[u8]) -> Result<Mixture> {
    Ok(mixture_from_tree(bincode::deserialize(bytes).map_err(wrap)?))
}

/// Serializes a stimulus occupancy to the binary container.
pub fn stimulus_to_bytes(occ: &StimulusOccupancy) -> Result<Vec<u8>> {
    bincode::serialize(&stimulus_to_tree(occ)).map_err(wrap)
}

/// Deserializes a stimulus occupancy from the binary container.
pub fn stimulus_from_bytes(bytes: &[u8]) -> Result<StimulusOccupancy> {
    Ok(stimulus_from_tree(bincode::deserialize(bytes).map_err(wrap)?))
}

/// Serializes a likelihood to the binary container, including its stimulus occupancy iff
/// `include_stimulus`.
pub fn likelihood_to_bytes(lik: &PoissonLikelihood, include_stimulus: bool) -> Result<Vec<u8>> {
    bincode::serialize(&standalone_likelihood_to_tree(lik, include_stimulus)).map_err(wrap)
}

/// Deserializes a likelihood from the binary container; see
/// [`super::convert::standalone_likelihood_from_tree`] for the stimulus-ownership rule
/// `external_stimulus` must satisfy.
pub fn likelihood_from_bytes(bytes: &[u8], external_stimulus: Option<Rc<StimulusOccupancy>>) -> Result<PoissonLikelihood> {
    standalone_likelihood_from_tree(bincode::deserialize(bytes).map_err(wrap)?, external_stimulus)
}

/// Serializes a decoder to the binary container, deduplicating shared stimulus occupancies.
pub fn decoder_to_bytes(decoder: &Decoder) -> Result<Vec<u8>> {
    bincode::serialize(&decoder_to_tree(decoder)).map_err(wrap)
}

/// Deserializes a decoder from the binary container.
pub fn decoder_from_bytes(bytes: &[u8]) -> Result<Decoder> {
    decoder_from_tree(bincode::deserialize(bytes).map_err(wrap)?)
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
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    #[test]
    fn mixture_round_trips_through_binary() {
        let mut m = Mixture::with_seed(space(), 0.5, 1);
        m.add_samples(&[0.0, 1.0], 2, 1.0, 1.0).unwrap();
        let bytes = mixture_to_bytes(&m).unwrap();
        let back = mixture_from_bytes(&bytes).unwrap();
        assert_eq!(back.ncomponents(), m.ncomponents());
        assert_eq!(back.weights(), m.weights());
    }
}
