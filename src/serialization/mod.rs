//! Bidirectional mapping between in-memory state and the two container formats.
//!
//! [`Mixture`](crate::mixture::Mixture) and the types built on top of it deliberately do not
//! derive `Serialize`/`Deserialize` (component scale factors must be recomputed on load, never
//! trusted from storage), so this module owns their wire representation explicitly via
//! [`tree`]'s plain DTOs and [`convert`]'s `to_tree`/`from_tree` functions. [`textual`] and
//! [`binary`] both drive those same functions — one through `serde_yaml`, one through
//! `bincode` — so the two container formats are provably views of identical abstract state.
//!
//! [`crate::space::Space`] and [`crate::grid::Grid`] already derive `Serialize`/`Deserialize`
//! directly and round-trip through either format without going through [`tree`] at all.

pub mod binary;
mod convert;
pub mod textual;
pub mod tree;

pub use convert::{
    decoder_from_tree, decoder_to_tree, likelihood_from_tree, likelihood_to_tree, mixture_from_tree, mixture_to_tree,
    standalone_likelihood_from_tree, standalone_likelihood_to_tree, stimulus_from_tree, stimulus_to_tree,
};

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::decoder::Decoder;
    use crate::dimension::{DimensionKind, DimensionSpec};
    use crate::grid::ArrayGrid;
    use crate::kernel::Gaussian;
    use crate::likelihood::PoissonLikelihood;
    use crate::space::euclidean::Euclidean;
    use crate::space::Space;
    use crate::space_spec::SpaceSpec;

    fn space() -> Space {
        let dims = vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")];
        Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
    }

    fn grid() -> crate::grid::Grid {
        ArrayGrid::new(
            SpaceSpec::new(vec![DimensionSpec::new("x", DimensionKind::Euclidean, "")]).unwrap(),
            vec![0.0, 1.0, 2.0],
            vec![3],
            Vec::new(),
        )
        .unwrap()
        .into()
    }

    #[test]
    fn decoder_dedups_a_stimulus_shared_across_two_sources() {
        let lik_a = Rc::new(PoissonLikelihood::new_stimulus_only(space(), 0.5, grid(), 1.0, 1.0, false, 1.0));
        lik_a.add_events(&[0.0, 1.0], 2, 1.0).unwrap();
        let shared_stimulus = Rc::clone(lik_a.stimulus());
        let lik_b = Rc::new(PoissonLikelihood::new_shared_stimulus_only(shared_stimulus, 1.0, false));

        let decoder = Decoder::new_single_space(vec![lik_a, lik_b], &[]).unwrap();
        let tree = super::decoder_to_tree(&decoder);
        assert_eq!(tree.stimulus_store.len(), 1);
        assert_eq!(tree.stimulus_keys[0][0], tree.stimulus_keys[1][0]);

        let back = super::decoder_from_tree(tree).unwrap();
        assert_eq!(back.nsources(), 2);
    }
}
