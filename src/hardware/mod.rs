//! Detector hardware models.

pub mod detector;
pub mod sensor;

pub use detector::{DebugSink, Detector, DetectorError};
pub use sensor::{ConfigError, DetectorConfig, DetectorConfigBuilder};
