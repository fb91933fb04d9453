#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Compressed kernel-density estimation and Poisson population decoding.

pub mod component;
pub mod decoder;
pub mod dimension;
pub mod error;
pub mod fastmath;
pub mod grid;
pub mod kernel;
pub mod likelihood;
pub mod mixture;
pub mod partial_mixture;
pub mod serialization;
pub mod space;
pub mod space_spec;
pub mod stimulus;
