//! The textual container: a human-readable key/value tree driven by `serde_yaml` over the
//! [`super::tree`] representation.

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

fn wrap(e: serde_yaml::Error) -> Error {
    Error::Other(anyhow::Error::from(e))
}

/// Serializes a mixture to YAML.
pub fn mixture_to_yaml(mixture: &Mixture) -> Result<String> {
    serde_yaml::to_string(&mixture_to_tree(mixture)).map_err(wrap)
}

/// Deserializes a mixture from YAML.
pub fn mixture_from_yaml(yaml: &str) -> Result<Mixture> {
    Ok(mixture_from_tree(serde_yaml::from_str(yaml).map_err(wrap)?))
}

/// Serializes a stimulus occupancy to YAML.
pub fn stimulus_to_yaml(occ: &StimulusOccupancy) -> Result<String> {
    serde_yaml::to_string(&stimulus_to_tree(occ)).map_err(wrap)
}

/// Deserializes a stimulus occupancy from YAML.
pub fn stimulus_from_yaml(yaml: &str) -> Result<StimulusOccupancy> {
    Ok(stimulus_from_tree(serde_yaml::from_str(yaml).map_err(wrap)?))
}

/// Serializes a likelihood to YAML, including its stimulus occupancy iff `include_stimulus`.
pub fn likelihood_to_yaml(lik: &PoissonLikelihood, include_stimulus: bool) -> Result<String> {
    serde_yaml::to_string(&standalone_likelihood_to_tree(lik, include_stimulus)).map_err(wrap)
}

/// Deserializes a likelihood from YAML; see [`standalone_likelihood_from_tree`] for the
/// stimulus-ownership rule `external_stimulus` must satisfy.
pub fn likelihood_from_yaml(yaml: &str, external_stimulus: Option<Rc<StimulusOccupancy>>) -> Result<PoissonLikelihood> {
    standalone_likelihood_from_tree(serde_yaml::from_str(yaml).map_err(wrap)?, external_stimulus)
}

/// Serializes a decoder to YAML.
pub fn decoder_to_yaml(decoder: &Decoder) -> Result<String> {
    serde_yaml::to_string(&decoder_to_tree(decoder)).map_err(wrap)
}

/// Deserializes a decoder from YAML.
pub fn decoder_from_yaml(yaml: &str) -> Result<Decoder> {
    decoder_from_tree(serde_yaml::from_str(yaml).map_err(wrap)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::grid::ArrayGrid;
    use crate::kernel::Gaussian;
    use crate::space::euclidean::Euclidean;
    use crate::space::Space;
    use crate::space_spec::SpaceSpec;

    fn space() -> Space {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    #[test]
    fn mixture_round_trips_through_yaml() {
        let mut m = Mixture::with_seed(space(), 0.5, 1);
        m.add_samples(&[0.0, 1.0, 2.0], 3, 1.0, 1.0).unwrap();
        let yaml = mixture_to_yaml(&m).unwrap();
        let back = mixture_from_yaml(&yaml).unwrap();
        assert_eq!(back.ncomponents(), m.ncomponents());
        assert!((back.sum_of_weights() - m.sum_of_weights()).abs() < 1e-9);
        for (a, b) in back.components().iter().zip(m.components()) {
            assert_eq!(a.location, b.location);
            assert_eq!(a.bandwidth, b.bandwidth);
        }
    }

    #[test]
    fn stimulus_round_trips_through_yaml() {
        let grid = ArrayGrid::new(
            SpaceSpec::new(vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")]).unwrap(),
            vec![0.0, 1.0, 2.0],
            vec![3],
            Vec::new(),
        )
        .unwrap()
        .into();
        let occ = StimulusOccupancy::new(space(), 0.5, grid, 0.1, 1.0, false);
        occ.add_stimulus(&[0.0, 1.0], 2, 1.0).unwrap();
        let yaml = stimulus_to_yaml(&occ).unwrap();
        let back = stimulus_from_yaml(&yaml).unwrap();
        assert!((back.stimulus_time() - occ.stimulus_time()).abs() < 1e-9);
    }
}
