//! Stochastic frame sampling for the detector noise chain.
//!
//! Three independent noise sources, each drawn from the caller's generator so
//! frame batches are reproducible and never race on shared randomness:
//! - photon shot noise (Poisson on the expected photon image)
//! - dark current (Poisson, one draw per pixel per readout)
//! - readout noise (zero-mean Gaussian, one draw per pixel per readout)

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};

/// Mean above which the Gaussian approximation to Poisson is used.
/// At 20 expected events the approximation error is well below the
/// statistical noise floor, and sampling is faster and numerically stable.
const POISSON_NORMAL_CROSSOVER: f64 = 20.0;

/// Apply photon arrival statistics to an expected-photon image.
///
/// Each pixel is replaced by an independent Poisson draw with that pixel's
/// value as the mean. Pixels with non-positive means yield zero photons. For large means a Gaussian
/// approximation (clamped at zero) replaces the direct Poisson draw.
pub fn apply_poisson_photon_noise<R: Rng>(mean_image: &Array2<f64>, rng: &mut R) -> Array2<f64> {
    mean_image.mapv(|mean| {
        if mean <= 0.0 {
            0.0
        } else if mean < POISSON_NORMAL_CROSSOVER {
            let poisson =
                Poisson::new(mean).expect("Poisson parameter must be valid (mean > 0)");
            poisson.sample(rng)
        } else {
            let normal = Normal::new(mean, mean.sqrt())
                .expect("Normal parameters must be valid (mean > 0)");
            normal.sample(rng).max(0.0)
        }
    })
}

/// Dark-current electrons accumulated over one integration window.
///
/// One independent Poisson draw per pixel with the given mean, rounded to
/// whole electrons. A non-positive mean yields an all-zero frame.
pub fn dark_current_frame<R: Rng>(
    shape: (usize, usize),
    mean_electrons: f64,
    rng: &mut R,
) -> Array2<f64> {
    if mean_electrons <= 0.0 {
        return Array2::zeros(shape);
    }
    let poisson =
        Poisson::new(mean_electrons).expect("Poisson parameter must be valid (mean > 0)");
    Array2::from_shape_fn(shape, |_| {
        let sample: f64 = poisson.sample(rng);
        sample.round()
    })
}

/// Readout-noise electrons introduced once per readout.
///
/// One independent zero-mean Gaussian draw per pixel with the configured
/// standard deviation, rounded to whole electrons. A non-positive standard
/// deviation yields an all-zero frame.
pub fn read_noise_frame<R: Rng>(
    shape: (usize, usize),
    std_dev: f64,
    rng: &mut R,
) -> Array2<f64> {
    if std_dev <= 0.0 {
        return Array2::zeros(shape);
    }
    let normal = Normal::new(0.0, std_dev).expect("Normal parameters must be valid (std_dev > 0)");
    Array2::from_shape_fn(shape, |_| normal.sample(rng).round())
}
