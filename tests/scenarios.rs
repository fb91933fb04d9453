//! Integration tests for the concrete scenarios and cross-module invariants this crate is built
//! against: categorical identity, Euclidean merge moments, circular wraparound, flat Poisson
//! decode, union normalization, and serialization round-trips.

use std::rc::Rc;

use compresskde::decoder::Decoder;
use compresskde::dimension::{DimensionKind, DimensionSpec};
use compresskde::grid::{ArrayGrid, Grid};
use compresskde::kernel::Gaussian;
use compresskde::likelihood::PoissonLikelihood;
use compresskde::mixture::Mixture;
use compresskde::serialization::binary;
use compresskde::space::{Categorical, Circular, Euclidean, Space};
use compresskde::space_spec::SpaceSpec;
use compresskde::stimulus::StimulusOccupancy;

fn categorical_space(name: &str) -> Space {
    let dims = vec![DimensionSpec::new(name, DimensionKind::Categorical, "")];
    Categorical::new(SpaceSpec::new(dims).unwrap()).into()
}

fn euclidean_space(name: &str) -> Space {
    let dims = vec![DimensionSpec::new(name, DimensionKind::Euclidean, "")];
    Euclidean::new(SpaceSpec::new(dims).unwrap(), Gaussian::new(3.0).into()).into()
}

fn array_grid(name: &str, points: Vec<f64>, size: usize) -> Grid {
    let dims = vec![DimensionSpec::new(name, DimensionKind::Categorical, "")];
    ArrayGrid::new(SpaceSpec::new(dims).unwrap(), points, vec![size], Vec::new())
        .unwrap()
        .into()
}

#[test]
fn categorical_identity_scenario() {
    let mut m = Mixture::new(categorical_space("label"), 0.5);
    m.add_samples(&[0.0, 1.0, 2.0], 3, 1.0, 1.0).unwrap();

    let mut out = vec![0.0; 3];
    m.evaluate_points(&[0.0, 1.0, 2.0], 3, &mut out).unwrap();
    for v in out {
        assert!((v - 1.0 / 3.0).abs() < 1e-12);
    }
}

#[test]
fn euclidean_merge_scenario() {
    let mut m = Mixture::new(euclidean_space("x"), 10.0);
    m.merge_samples(&[0.0, 0.0, 0.1], 3, false, 1.0, 1.0).unwrap();

    assert_eq!(m.ncomponents(), 1);
    assert!((m.weights()[0] - 1.0).abs() < 1e-12);
    assert!((m.components()[0].location[0] - 1.0 / 30.0).abs() < 1e-9);
}

#[test]
fn circular_merge_identity_scenario() {
    let eps = 1e-6;
    let dims = vec![DimensionSpec::new("theta", DimensionKind::Circular, "")];
    let space: Space = Circular::new(SpaceSpec::new(dims).unwrap(), 5.0).into();
    let mut m = Mixture::new(space, 100.0);
    m.merge_samples(&[0.0, 2.0 * std::f64::consts::PI - eps], 2, false, 1.0, 1.0)
        .unwrap();

    assert_eq!(m.ncomponents(), 1);
    let merged = m.components()[0].location[0];
    let two_pi = 2.0 * std::f64::consts::PI;
    // The merged angle sits just below 2π (equivalently, just below 0 going the other way
    // around the circle), never anywhere close to π.
    assert!(merged > two_pi - 1e-3);
    assert!((merged - std::f64::consts::PI).abs() > 1.0);
}

#[test]
fn poisson_decode_flat_likelihood_scenario() {
    let space = categorical_space("label");
    let grid = array_grid("label", (0..10).map(f64::from).collect(), 10);
    let lik = PoissonLikelihood::new_stimulus_only(space, 0.5, grid, 1.0, 1.0, false, 1.0);

    // Uniform occupancy: one sample per of the ten categories.
    lik.stimulus()
        .add_stimulus(&(0..10).map(f64::from).collect::<Vec<_>>(), 10, 1.0)
        .unwrap();

    let mut result = vec![0.0; 10];
    // Two observed events; their own values are irrelevant here since the event distribution
    // *is* the stimulus occupancy (full-overlap selection leaves no free dimension to complete
    // against).
    lik.log_l(&[0.0, 1.0], 2, 1.0, &mut result).unwrap();

    let first = result[0];
    for &v in &result {
        assert_eq!(v, first, "a uniform occupancy must give a flat log-likelihood surface");
    }

    let decoder = Decoder::new_single_space(vec![Rc::new(lik)], &[]).unwrap();
    let mut posterior = vec![0.0; 10];
    decoder
        .decode(&[(&[0.0, 1.0], 2)], 1.0, &mut [&mut posterior], true)
        .unwrap();
    for p in posterior {
        assert!((p - 0.1).abs() < 1e-9);
    }
}

#[test]
fn union_normalization_scenario() {
    let space_a = categorical_space("a");
    let grid_a = array_grid("a", (0..4).map(f64::from).collect(), 4);
    let lik_a = PoissonLikelihood::new_stimulus_only(space_a, 0.5, grid_a, 1.0, 1.0, false, 1.0);
    lik_a
        .stimulus()
        .add_stimulus(&(0..4).map(f64::from).collect::<Vec<_>>(), 4, 1.0)
        .unwrap();

    let space_b = categorical_space("b");
    let grid_b = array_grid("b", (0..6).map(f64::from).collect(), 6);
    let lik_b = PoissonLikelihood::new_stimulus_only(space_b, 0.5, grid_b, 1.0, 1.0, false, 1.0);
    lik_b
        .stimulus()
        .add_stimulus(&(0..6).map(f64::from).collect::<Vec<_>>(), 6, 1.0)
        .unwrap();

    let decoder = Decoder::new_union(vec![vec![Rc::new(lik_a), Rc::new(lik_b)]], vec![Vec::new(), Vec::new()]).unwrap();

    let mut out_a = vec![0.0; 4];
    let mut out_b = vec![0.0; 6];
    decoder
        .decode(&[(&[0.0, 1.0], 2)], 1.0, &mut [&mut out_a, &mut out_b], true)
        .unwrap();

    let total: f64 = out_a.iter().chain(out_b.iter()).sum();
    assert!((total - 1.0).abs() < 1e-9);
    for &p in out_a.iter().chain(out_b.iter()) {
        assert!((p - 0.1).abs() < 1e-9);
    }
}

#[test]
fn serialization_round_trip_scenario() {
    let shared_space = categorical_space("pos");
    let shared_grid = array_grid("pos", (0..5).map(f64::from).collect(), 5);
    let occ = Rc::new(StimulusOccupancy::new(shared_space, 0.5, shared_grid, 1.0, 1.0, false));
    occ.add_stimulus(&(0..5).map(f64::from).collect::<Vec<_>>(), 5, 1.0).unwrap();

    let lik_a = PoissonLikelihood::new_shared_stimulus_only(Rc::clone(&occ), 1.0, false);
    let lik_b = PoissonLikelihood::new_shared_stimulus_only(Rc::clone(&occ), 2.0, false);

    let decoder = Decoder::new_single_space(vec![Rc::new(lik_a), Rc::new(lik_b)], &[]).unwrap();

    let mut before = vec![0.0; 5];
    decoder
        .decode(&[(&[0.0], 1), (&[1.0], 1)], 1.0, &mut [&mut before], true)
        .unwrap();

    let bytes = binary::decoder_to_bytes(&decoder).unwrap();
    let restored = binary::decoder_from_bytes(&bytes).unwrap();

    let mut after = vec![0.0; 5];
    restored
        .decode(&[(&[0.0], 1), (&[1.0], 1)], 1.0, &mut [&mut after], true)
        .unwrap();

    for (b, a) in before.iter().zip(&after) {
        assert!((b - a).abs() < 1e-10);
    }
}
