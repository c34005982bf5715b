//! Detector configuration: geometry, efficiencies and noise characteristics.
//!
//! A [`DetectorConfig`] is built once, validated in [`DetectorConfigBuilder::build`],
//! and frozen afterwards; the simulation never sees a half-valid instrument.
//! Unit-bearing fields accept either tagged quantities or bare numbers, the
//! latter being reinterpreted in the field's documented default unit with a
//! non-fatal [`Notice`].

use crate::units::{Notice, Quantity, QuantityInput, TypeMismatchError, Unit};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Errors raised while validating a detector configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("detector shape must be non-zero in both axes, got {0}x{1}")]
    EmptyShape(usize, usize),
    #[error("detector `{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("detector `{field}` must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),
}

/// Detector shape supplied either as a single side length (square detector)
/// or an explicit (rows, cols) pair.
#[derive(Debug, Clone, Copy)]
pub enum ShapeInput {
    Square(usize),
    Pair(usize, usize),
}

impl From<usize> for ShapeInput {
    fn from(side: usize) -> Self {
        ShapeInput::Square(side)
    }
}

impl From<(usize, usize)> for ShapeInput {
    fn from(pair: (usize, usize)) -> Self {
        ShapeInput::Pair(pair.0, pair.1)
    }
}

impl ShapeInput {
    fn expand(self) -> (usize, usize) {
        match self {
            ShapeInput::Square(side) => (side, side),
            ShapeInput::Pair(rows, cols) => (rows, cols),
        }
    }
}

/// Validated, immutable set of instrument parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    shape: (usize, usize),
    pixel_scale: Quantity,
    optics_transmission: Quantity,
    quantum_efficiency: Quantity,
    system_gain: Quantity,
    dark_current: Option<Quantity>,
    readout_noise: Option<Quantity>,
    saturation_level: Option<Quantity>,
    notices: Vec<Notice>,
}

impl DetectorConfig {
    /// Start building a configuration from the two mandatory parameters.
    ///
    /// Default unit for a bare `pixel_scale` number: arcsec.
    pub fn builder(
        shape: impl Into<ShapeInput>,
        pixel_scale: impl Into<QuantityInput>,
    ) -> DetectorConfigBuilder {
        DetectorConfigBuilder {
            shape: shape.into(),
            pixel_scale: pixel_scale.into(),
            optics_transmission: None,
            quantum_efficiency: None,
            system_gain: None,
            dark_current: None,
            readout_noise: None,
            saturation_level: None,
        }
    }

    /// (rows, cols) of the pixel array.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn rows(&self) -> usize {
        self.shape.0
    }

    pub fn cols(&self) -> usize {
        self.shape.1
    }

    /// Angular size of one pixel (arcsec).
    pub fn pixel_scale(&self) -> Quantity {
        self.pixel_scale
    }

    /// Alias for [`pixel_scale`](Self::pixel_scale): the detector's own
    /// angular sampling resolution.
    pub fn resolution(&self) -> Quantity {
        self.pixel_scale
    }

    /// Reassign the resolution alias. The one permitted mutation after
    /// construction; the new value is validated like the original.
    pub fn set_resolution(&mut self, resolution: Quantity) -> Result<(), ConfigError> {
        if resolution.unit() != Unit::Arcsec {
            return Err(TypeMismatchError {
                field: "pixel_scale",
                expected: Unit::Arcsec,
                actual: resolution.unit(),
            }
            .into());
        }
        if resolution.value() <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "pixel_scale",
                value: resolution.value(),
            });
        }
        self.pixel_scale = resolution;
        Ok(())
    }

    /// Transmission of the optical train (dimensionless, default 1).
    pub fn optics_transmission(&self) -> Quantity {
        self.optics_transmission
    }

    /// Quantum efficiency (e-/ph, default 1).
    pub fn quantum_efficiency(&self) -> Quantity {
        self.quantum_efficiency
    }

    /// System gain (e-/ADU, default 1).
    pub fn system_gain(&self) -> Quantity {
        self.system_gain
    }

    /// Dark current (e-/s), if modeled.
    pub fn dark_current(&self) -> Option<Quantity> {
        self.dark_current
    }

    /// Readout noise standard deviation (e-), if modeled.
    pub fn readout_noise(&self) -> Option<Quantity> {
        self.readout_noise
    }

    /// Full-well capacity (e-), if modeled.
    pub fn saturation_level(&self) -> Option<Quantity> {
        self.saturation_level
    }

    /// Angular extent of the full array per axis: shape x pixel_scale.
    ///
    /// Recomputed from the current fields on every call, so it tracks a
    /// reassigned resolution.
    pub fn field_of_view(&self) -> (Quantity, Quantity) {
        (
            self.pixel_scale.scale(self.shape.0 as f64),
            self.pixel_scale.scale(self.shape.1 as f64),
        )
    }

    /// Unit-reinterpretation notices gathered while normalizing the builder
    /// input. Consumed by the detector at construction.
    pub(crate) fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

/// Builder normalizing heterogeneous caller input into a [`DetectorConfig`].
#[derive(Debug, Clone)]
pub struct DetectorConfigBuilder {
    shape: ShapeInput,
    pixel_scale: QuantityInput,
    optics_transmission: Option<QuantityInput>,
    quantum_efficiency: Option<QuantityInput>,
    system_gain: Option<QuantityInput>,
    dark_current: Option<QuantityInput>,
    readout_noise: Option<QuantityInput>,
    saturation_level: Option<QuantityInput>,
}

impl DetectorConfigBuilder {
    /// Default unit for a bare number: dimensionless.
    pub fn optics_transmission(mut self, value: impl Into<QuantityInput>) -> Self {
        self.optics_transmission = Some(value.into());
        self
    }

    /// Default unit for a bare number: e-/ph.
    pub fn quantum_efficiency(mut self, value: impl Into<QuantityInput>) -> Self {
        self.quantum_efficiency = Some(value.into());
        self
    }

    /// Default unit for a bare number: e-/ADU.
    pub fn system_gain(mut self, value: impl Into<QuantityInput>) -> Self {
        self.system_gain = Some(value.into());
        self
    }

    /// Default unit for a bare number: e-/s.
    pub fn dark_current(mut self, value: impl Into<QuantityInput>) -> Self {
        self.dark_current = Some(value.into());
        self
    }

    /// Default unit for a bare number: e- (standard deviation).
    pub fn readout_noise(mut self, value: impl Into<QuantityInput>) -> Self {
        self.readout_noise = Some(value.into());
        self
    }

    /// Default unit for a bare number: e- (full-well capacity).
    pub fn saturation_level(mut self, value: impl Into<QuantityInput>) -> Self {
        self.saturation_level = Some(value.into());
        self
    }

    /// Normalize and validate every field; fails before any simulation can
    /// observe a partially built instrument.
    pub fn build(self) -> Result<DetectorConfig, ConfigError> {
        let mut notices = Vec::new();

        let shape = self.shape.expand();
        if shape.0 == 0 || shape.1 == 0 {
            return Err(ConfigError::EmptyShape(shape.0, shape.1));
        }

        let pixel_scale = self
            .pixel_scale
            .coerce("pixel_scale", Unit::Arcsec, &mut notices)?;
        if pixel_scale.value() <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "pixel_scale",
                value: pixel_scale.value(),
            });
        }

        let optics_transmission = self
            .optics_transmission
            .unwrap_or_else(|| Quantity::dimensionless(1.0).into())
            .coerce("optics_transmission", Unit::Dimensionless, &mut notices)?;
        check_non_negative("optics_transmission", optics_transmission.value())?;

        let quantum_efficiency = self
            .quantum_efficiency
            .unwrap_or_else(|| Quantity::electrons_per_photon(1.0).into())
            .coerce("quantum_efficiency", Unit::ElectronPerPhoton, &mut notices)?;
        check_non_negative("quantum_efficiency", quantum_efficiency.value())?;

        let system_gain = self
            .system_gain
            .unwrap_or_else(|| Quantity::electrons_per_adu(1.0).into())
            .coerce("system_gain", Unit::ElectronPerAdu, &mut notices)?;
        if system_gain.value() <= 0.0 {
            return Err(ConfigError::NonPositive {
                field: "system_gain",
                value: system_gain.value(),
            });
        }

        let dark_current = self
            .dark_current
            .map(|input| input.coerce("dark_current", Unit::ElectronPerSecond, &mut notices))
            .transpose()?;
        if let Some(dark) = dark_current {
            check_non_negative("dark_current", dark.value())?;
        }

        let readout_noise = self
            .readout_noise
            .map(|input| input.coerce("readout_noise", Unit::Electron, &mut notices))
            .transpose()?;
        if let Some(noise) = readout_noise {
            check_non_negative("readout_noise", noise.value())?;
        }

        let saturation_level = self
            .saturation_level
            .map(|input| input.coerce("saturation_level", Unit::Electron, &mut notices))
            .transpose()?;
        if let Some(level) = saturation_level {
            check_non_negative("saturation_level", level.value())?;
        }

        Ok(DetectorConfig {
            shape,
            pixel_scale,
            optics_transmission,
            quantum_efficiency,
            system_gain,
            dark_current,
            readout_noise,
            saturation_level,
            notices,
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value < 0.0 {
        Err(ConfigError::Negative { field, value })
    } else {
        Ok(())
    }
}

/// Ready-made detector configurations.
pub mod models {
    use super::*;

    /// Square 256px detector with ideal efficiencies and no noise sources.
    /// Useful as a transparent baseline when validating reconstruction code.
    pub static IDEAL_256: Lazy<DetectorConfig> = Lazy::new(|| {
        DetectorConfig::builder(256usize, Quantity::arcsec(0.0107))
            .build()
            .expect("ideal detector model must validate")
    });

    /// 1k x 1k speckle science camera with typical CCD noise figures.
    pub static SPECKLE_CAM_1K: Lazy<DetectorConfig> = Lazy::new(|| {
        DetectorConfig::builder(1024usize, Quantity::arcsec(0.0107))
            .optics_transmission(Quantity::dimensionless(0.95))
            .quantum_efficiency(Quantity::electrons_per_photon(0.9))
            .system_gain(Quantity::electrons_per_adu(2.2))
            .dark_current(Quantity::electrons_per_second(0.2))
            .readout_noise(Quantity::electrons(9.8))
            .saturation_level(Quantity::electrons(60_000.0))
            .build()
            .expect("speckle camera model must validate")
    });
}
