//! Photon-rate map generators for validation and demos.
//!
//! These stand in for the upstream optical simulation: simple, analytically
//! known source distributions that make pipeline properties (flux
//! conservation, centering, Poisson statistics) easy to assert.

use crate::units::{QuantityMap, Unit};
use ndarray::Array2;

/// Uniform photon-rate field of `rate` ph/s per pixel.
pub fn uniform_photon_rate(shape: (usize, usize), rate: f64) -> QuantityMap {
    QuantityMap::new(Array2::from_elem(shape, rate), Unit::PhotonPerSecond)
}

/// Single-pixel impulse of `rate` ph/s at the floor-center of the map,
/// zero elsewhere.
pub fn centered_impulse(shape: (usize, usize), rate: f64) -> QuantityMap {
    let mut values = Array2::zeros(shape);
    values[[shape.0 / 2, shape.1 / 2]] = rate;
    QuantityMap::new(values, Unit::PhotonPerSecond)
}

/// Circular Gaussian spot centered on the map, normalized so the whole map
/// integrates to `total_rate` ph/s. A crude stand-in for a seeing-limited
/// point source.
pub fn gaussian_spot(shape: (usize, usize), sigma_px: f64, total_rate: f64) -> QuantityMap {
    let center = ((shape.0 as f64 - 1.0) / 2.0, (shape.1 as f64 - 1.0) / 2.0);
    let mut values = Array2::from_shape_fn(shape, |(r, c)| {
        let dy = r as f64 - center.0;
        let dx = c as f64 - center.1;
        (-(dx * dx + dy * dy) / (2.0 * sigma_px * sigma_px)).exp()
    });
    let sum = values.sum();
    values.mapv_inplace(|v| v / sum * total_rate);
    QuantityMap::new(values, Unit::PhotonPerSecond)
}
