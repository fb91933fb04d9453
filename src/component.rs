//! A single kernel instance: location, bandwidth, and cached scale factor.

use serde::{Deserialize, Serialize};

/// One mixture component: a location, a bandwidth, and the kernel's scale factor cached at that
/// bandwidth (both linear and log forms, since both are needed in hot paths).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Component {
    /// Location, one entry per dimension of the owning space.
    pub location: Vec<f64>,
    /// Bandwidth, one entry per kernel parameter of the owning space (`nbw`, which need not equal
    /// `ndim`).
    pub bandwidth: Vec<f64>,
    /// Cached scale factor at `bandwidth`.
    pub scale_factor: f64,
    /// Cached log of `scale_factor`.
    pub scale_factor_log: f64,
}

impl Component {
    /// Builds a component, computing `scale_factor_log` from `scale_factor` up front.
    #[must_use]
    pub fn new(location: Vec<f64>, bandwidth: Vec<f64>, scale_factor: f64) -> Self {
        Self {
            location,
            bandwidth,
            scale_factor,
            scale_factor_log: crate::fastmath::fastlog64(scale_factor),
        }
    }
}
