//! Image-domain utilities: stochastic frame sampling and test patterns.

pub mod noise;
pub mod test_patterns;
