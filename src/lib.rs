//! Synthetic detector exposures for speckle imaging.
//!
//! This crate models how an astronomical imaging instrument converts an
//! incoming photon flux into a digitized pixel array, for generating
//! realistic synthetic short-exposure frames to exercise image
//! reconstruction algorithms.
//!
//! The pipeline is fixed: a caller-supplied oversampled photon-rate map is
//! resampled onto the detector grid with flux conservation, photon shot
//! noise is drawn, optics transmission and quantum efficiency are applied,
//! charge is clipped at the full well, and the readout adds dark current and
//! readout noise before gain conversion to counts. Upstream concerns
//! (atmosphere, optics, source modeling) and downstream concerns (file
//! output, reduction) live with collaborators; the core consumes a
//! photon-rate map and emits a counts array.

pub mod algo;
pub mod hardware;
pub mod image_proc;
pub mod units;

// Re-exports for easier access
pub use algo::resample::{resample, ResampleError};
pub use hardware::detector::{DebugSink, Detector, DetectorError};
pub use hardware::sensor::{ConfigError, DetectorConfig, DetectorConfigBuilder};
pub use units::{
    MapInput, Notice, Quantity, QuantityInput, QuantityMap, TypeMismatchError, Unit, UnitError,
};
