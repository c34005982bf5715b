//! Numerical algorithms for the sensor model.

pub mod resample;

pub use resample::{resample, ResampleError};
