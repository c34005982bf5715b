//! Flux-conserving resampling of photon-rate maps onto the detector grid.
//!
//! Upstream optical simulations sample the focal plane finer than the
//! detector's pixel pitch. This module rescales such an oversampled map to
//! the detector resolution with order-1 (linear) interpolation, renormalizes
//! so total integrated flux is conserved, and crops the geometric center to
//! the detector shape.

use crate::units::{Quantity, QuantityMap, Unit, UnitError};
use ndarray::{s, Array2};
use thiserror::Error;

/// Errors raised by the resampling engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    /// The supplied map does not cover the detector; resampling must never
    /// fabricate flux outside the map.
    #[error(
        "photon rate field of view ({map_rows:.4} x {map_cols:.4} arcsec) is smaller than the \
         detector field of view ({detector_rows:.4} x {detector_cols:.4} arcsec) in at least one axis"
    )]
    FieldOfViewTooSmall {
        map_rows: f64,
        map_cols: f64,
        detector_rows: f64,
        detector_cols: f64,
    },
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Resample `map` from `source_resolution` onto a grid of `pixel_scale`
/// pixels and crop the centered `shape` region.
///
/// Pure function: no side effects beyond the returned map. The unit tag of
/// the input is preserved.
///
/// # Algorithm
/// 1. zoom ratio = source_resolution / pixel_scale (dimensionless)
/// 2. linear-interpolation zoom of the whole map by that ratio
/// 3. divide values by ratio^2: the resampled pixels cover ratio^2 times the
///    original area, so per-pixel values must shrink by the same factor for
///    the integrated flux to be conserved
/// 4. centered crop to `shape` with floor-based half-width offsets
///
/// # Errors
/// [`ResampleError::FieldOfViewTooSmall`] when the map's field of view
/// (shape x source_resolution) is below the detector's on either axis;
/// equality is accepted. Unit errors if the resolutions are not both angular.
pub fn resample(
    map: &QuantityMap,
    source_resolution: &Quantity,
    pixel_scale: &Quantity,
    shape: (usize, usize),
) -> Result<QuantityMap, ResampleError> {
    let ratio = source_resolution.ratio(pixel_scale)?;
    let (in_rows, in_cols) = map.shape();

    let map_fov = (
        in_rows as f64 * source_resolution.value(),
        in_cols as f64 * source_resolution.value(),
    );
    let detector_fov = (
        shape.0 as f64 * pixel_scale.value(),
        shape.1 as f64 * pixel_scale.value(),
    );
    if map_fov.0 < detector_fov.0 || map_fov.1 < detector_fov.1 {
        return Err(ResampleError::FieldOfViewTooSmall {
            map_rows: map_fov.0,
            map_cols: map_fov.1,
            detector_rows: detector_fov.0,
            detector_cols: detector_fov.1,
        });
    }

    let zoomed = zoom_linear(map.values(), ratio);
    let flux_factor = ratio * ratio;
    let rescaled = zoomed.mapv(|v| v / flux_factor);
    let cropped = crop_center(&rescaled, shape);

    Ok(QuantityMap::new(cropped, map.unit()))
}

/// Zoom a 2D array by `ratio` with linear interpolation.
///
/// Output size per axis is `round(n_in * ratio)`; output sample `o` maps to
/// input coordinate `o * (n_in - 1) / (n_out - 1)`, so the first and last
/// samples of each axis coincide with the input edges.
fn zoom_linear(input: &Array2<f64>, ratio: f64) -> Array2<f64> {
    let (in_rows, in_cols) = input.dim();
    let out_rows = ((in_rows as f64) * ratio).round().max(1.0) as usize;
    let out_cols = ((in_cols as f64) * ratio).round().max(1.0) as usize;

    let row_step = axis_step(in_rows, out_rows);
    let col_step = axis_step(in_cols, out_cols);

    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let y = r as f64 * row_step;
        let x = c as f64 * col_step;

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(in_rows - 1);
        let x1 = (x0 + 1).min(in_cols - 1);
        let ty = y - y0 as f64;
        let tx = x - x0 as f64;

        let top = input[[y0, x0]] * (1.0 - tx) + input[[y0, x1]] * tx;
        let bottom = input[[y1, x0]] * (1.0 - tx) + input[[y1, x1]] * tx;
        top * (1.0 - ty) + bottom * ty
    })
}

fn axis_step(n_in: usize, n_out: usize) -> f64 {
    if n_out > 1 {
        (n_in - 1) as f64 / (n_out - 1) as f64
    } else {
        0.0
    }
}

/// Extract the centered `shape` window.
///
/// Convention for odd/even truncation: the window starts at
/// `floor(n_src / 2) - floor(n / 2)` on each axis. For matching parities the
/// window is exactly centered; when parities differ it sits half a pixel
/// toward the origin.
fn crop_center(input: &Array2<f64>, shape: (usize, usize)) -> Array2<f64> {
    let (src_rows, src_cols) = input.dim();
    let (rows, cols) = shape;
    let start_row = src_rows / 2 - rows / 2;
    let start_col = src_cols / 2 - cols / 2;
    input
        .slice(s![start_row..start_row + rows, start_col..start_col + cols])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn uniform_map(rows: usize, cols: usize, value: f64) -> QuantityMap {
        QuantityMap::new(
            Array2::from_elem((rows, cols), value),
            Unit::PhotonPerSecond,
        )
    }

    #[test]
    fn test_identity_ratio_is_exact() {
        let map = QuantityMap::new(
            Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f64),
            Unit::PhotonPerSecond,
        );
        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(1.0), (8, 8)).unwrap();
        assert_eq!(out.shape(), (8, 8));
        for (a, b) in out.values().iter().zip(map.values().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_flux_conservation_across_ratios() {
        // Uniform map of value V: the sum over the cropped output must match
        // the sum over the input region covering the same solid angle.
        let value = 3.0;
        let map = uniform_map(16, 16, value);

        for (source_res, detector_scale, det_shape) in [
            (1.0, 2.0, (8usize, 8usize)), // ratio 0.5
            (1.0, 1.0, (16, 16)),         // ratio 1.0
            (1.0, 0.5, (32, 32)),         // ratio 2.0
        ] {
            let out = resample(
                &map,
                &Quantity::arcsec(source_res),
                &Quantity::arcsec(detector_scale),
                det_shape,
            )
            .unwrap();
            assert_eq!(out.shape(), det_shape);

            // Same field of view on both sides, so the full input sum applies
            let input_sum = 16.0 * 16.0 * value;
            assert_relative_eq!(out.total().value(), input_sum, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unit_preserved() {
        let map = uniform_map(8, 8, 1.0);
        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(2.0), (4, 4)).unwrap();
        assert_eq!(out.unit(), Unit::PhotonPerSecond);
    }

    #[test]
    fn test_impulse_stays_centered_identity() {
        let mut values = Array2::zeros((9, 9));
        values[[4, 4]] = 1.0;
        let map = QuantityMap::new(values, Unit::PhotonPerSecond);

        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(1.0), (9, 9)).unwrap();
        assert_relative_eq!(out.values()[[4, 4]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(out.total().value(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_impulse_stays_centered_smaller_detector() {
        let mut values = Array2::zeros((9, 9));
        values[[4, 4]] = 1.0;
        let map = QuantityMap::new(values, Unit::PhotonPerSecond);

        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(1.0), (5, 5)).unwrap();
        assert_eq!(out.shape(), (5, 5));
        assert_relative_eq!(out.values()[[2, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_field_of_view_precondition() {
        let map = uniform_map(8, 8, 1.0);

        // Map FoV 8 arcsec < detector FoV 10 arcsec: rejected
        let err = resample(
            &map,
            &Quantity::arcsec(1.0),
            &Quantity::arcsec(1.0),
            (10, 10),
        )
        .unwrap_err();
        assert!(matches!(err, ResampleError::FieldOfViewTooSmall { .. }));

        // Asymmetric violation on one axis only is still rejected
        let err = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(1.0), (4, 10))
            .unwrap_err();
        assert!(matches!(err, ResampleError::FieldOfViewTooSmall { .. }));

        // Exactly equal fields of view succeed
        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(1.0), (8, 8));
        assert!(out.is_ok());
    }

    #[test]
    fn test_resolution_units_checked() {
        let map = uniform_map(8, 8, 1.0);
        let err = resample(&map, &Quantity::seconds(1.0), &Quantity::arcsec(1.0), (8, 8))
            .unwrap_err();
        assert!(matches!(err, ResampleError::Unit(_)));
    }

    #[test]
    fn test_crop_convention_even_in_odd_out() {
        // 10x10 source cropped to 5x5: start = 5 - 2 = 3
        let input = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64);
        let out = crop_center(&input, (5, 5));
        assert_eq!(out[[0, 0]], input[[3, 3]]);
        assert_eq!(out[[4, 4]], input[[7, 7]]);
    }

    #[test]
    fn test_downsampling_preserves_uniform_value_density() {
        // ratio 0.5: each coarse pixel covers 4x the area, so its value is 4x
        let map = uniform_map(16, 16, 2.0);
        let out = resample(&map, &Quantity::arcsec(1.0), &Quantity::arcsec(2.0), (8, 8)).unwrap();
        for &v in out.values() {
            assert_relative_eq!(v, 8.0, epsilon = 1e-9);
        }
    }
}
