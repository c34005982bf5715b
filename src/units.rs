//! Runtime-checked physical quantities for detector simulation.
//!
//! The detector pipeline mixes several physical currencies: photon rates on
//! the sky, electrons in the well, counts out of the ADC. Mixing them up
//! silently is the classic failure mode of sensor models, so every value that
//! crosses a module boundary carries a [`Unit`] tag and arithmetic between
//! incompatible tags is rejected at run time.
//!
//! The unit set is closed on purpose: only the conversions that occur in the
//! exposure/readout chain are representable, everything else is an error.

use ndarray::Array2;
use std::fmt;
use thiserror::Error;

/// Closed set of physical units used by the sensor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Incident photon flux per pixel (ph/s)
    PhotonPerSecond,
    /// Accumulated photons per pixel over an integration window
    Photon,
    /// Angular extent (arcsec)
    Arcsec,
    /// Pure number (efficiencies, ratios)
    Dimensionless,
    /// Quantum efficiency (e-/ph)
    ElectronPerPhoton,
    /// System gain (e-/ADU)
    ElectronPerAdu,
    /// Dark current (e-/s)
    ElectronPerSecond,
    /// Accumulated charge per pixel (e-)
    Electron,
    /// Digitized counts (ADU)
    Adu,
    /// Time (s)
    Second,
}

impl Unit {
    /// Short symbol used in error messages and diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::PhotonPerSecond => "ph/s",
            Unit::Photon => "ph",
            Unit::Arcsec => "arcsec",
            Unit::Dimensionless => "",
            Unit::ElectronPerPhoton => "e-/ph",
            Unit::ElectronPerAdu => "e-/ADU",
            Unit::ElectronPerSecond => "e-/s",
            Unit::Electron => "e-",
            Unit::Adu => "ADU",
            Unit::Second => "s",
        }
    }

    /// Unit of the product of two quantities, if the combination is
    /// physically meaningful within the pipeline.
    ///
    /// The table is deliberately minimal: it covers exactly the conversions
    /// the exposure/readout chain performs (rate x time, photon x quantum
    /// efficiency, scaling by a pure number).
    pub fn multiply(self, rhs: Unit) -> Option<Unit> {
        use Unit::*;
        match (self, rhs) {
            (unit, Dimensionless) | (Dimensionless, unit) => Some(unit),
            (PhotonPerSecond, Second) | (Second, PhotonPerSecond) => Some(Photon),
            (ElectronPerSecond, Second) | (Second, ElectronPerSecond) => Some(Electron),
            (Photon, ElectronPerPhoton) | (ElectronPerPhoton, Photon) => Some(Electron),
            _ => None,
        }
    }

    /// Unit of the ratio of two quantities, if meaningful.
    pub fn divide(self, rhs: Unit) -> Option<Unit> {
        use Unit::*;
        match (self, rhs) {
            (unit, Dimensionless) => Some(unit),
            (Electron, ElectronPerAdu) => Some(Adu),
            (lhs, rhs) if lhs == rhs => Some(Dimensionless),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Unit::Dimensionless {
            write!(f, "dimensionless")
        } else {
            write!(f, "{}", self.symbol())
        }
    }
}

/// Errors raised by quantity arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("cannot combine quantities of {0} and {1}")]
    Incompatible(Unit, Unit),
}

/// An argument carried the wrong unit tag for the operation it was passed to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{field}` carries {actual} but must be {expected}")]
pub struct TypeMismatchError {
    pub field: &'static str,
    pub expected: Unit,
    pub actual: Unit,
}

/// Non-fatal diagnostic recording that a bare number was reinterpreted in a
/// field's default unit.
///
/// Reinterpretation never changes the numeric result versus passing an
/// explicit quantity; the notice exists so callers can audit their inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Field or argument the bare number was supplied for
    pub field: &'static str,
    /// Unit it was assumed to carry
    pub assumed: Unit,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interpreting bare value for `{}` as {}",
            self.field, self.assumed
        )
    }
}

/// A scalar magnitude tagged with a physical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    value: f64,
    unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn arcsec(value: f64) -> Self {
        Self::new(value, Unit::Arcsec)
    }

    pub fn seconds(value: f64) -> Self {
        Self::new(value, Unit::Second)
    }

    pub fn electrons(value: f64) -> Self {
        Self::new(value, Unit::Electron)
    }

    pub fn electrons_per_second(value: f64) -> Self {
        Self::new(value, Unit::ElectronPerSecond)
    }

    pub fn electrons_per_photon(value: f64) -> Self {
        Self::new(value, Unit::ElectronPerPhoton)
    }

    pub fn electrons_per_adu(value: f64) -> Self {
        Self::new(value, Unit::ElectronPerAdu)
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, Unit::Dimensionless)
    }

    pub fn photons_per_second(value: f64) -> Self {
        Self::new(value, Unit::PhotonPerSecond)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Unit-preserving scaling by a pure number.
    pub fn scale(&self, factor: f64) -> Quantity {
        Quantity::new(self.value * factor, self.unit)
    }

    /// Unit-converting multiplication per the closed algebra table.
    pub fn checked_mul(&self, rhs: &Quantity) -> Result<Quantity, UnitError> {
        let unit = self
            .unit
            .multiply(rhs.unit)
            .ok_or(UnitError::Incompatible(self.unit, rhs.unit))?;
        Ok(Quantity::new(self.value * rhs.value, unit))
    }

    /// Unit-converting division per the closed algebra table.
    pub fn checked_div(&self, rhs: &Quantity) -> Result<Quantity, UnitError> {
        let unit = self
            .unit
            .divide(rhs.unit)
            .ok_or(UnitError::Incompatible(self.unit, rhs.unit))?;
        Ok(Quantity::new(self.value / rhs.value, unit))
    }

    /// Dimensionless ratio of two quantities carrying the same unit.
    pub fn ratio(&self, rhs: &Quantity) -> Result<f64, UnitError> {
        if self.unit != rhs.unit {
            return Err(UnitError::Incompatible(self.unit, rhs.unit));
        }
        Ok(self.value / rhs.value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == Unit::Dimensionless {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit.symbol())
        }
    }
}

/// A 2D pixel array tagged with a physical unit.
///
/// This is the currency of the pipeline: photon-rate maps come in, electron
/// and count images go out. The magnitudes are always `f64`; discreteness of
/// electrons is enforced by explicit rounding steps, not by the type.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityMap {
    values: Array2<f64>,
    unit: Unit,
}

impl QuantityMap {
    pub fn new(values: Array2<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// (rows, cols) of the underlying array.
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Unit-converting elementwise multiplication by a scalar quantity.
    pub fn checked_mul(&self, rhs: &Quantity) -> Result<QuantityMap, UnitError> {
        let unit = self
            .unit
            .multiply(rhs.unit())
            .ok_or(UnitError::Incompatible(self.unit, rhs.unit()))?;
        Ok(QuantityMap::new(self.values.mapv(|v| v * rhs.value()), unit))
    }

    /// Unit-converting elementwise division by a scalar quantity.
    pub fn checked_div(&self, rhs: &Quantity) -> Result<QuantityMap, UnitError> {
        let unit = self
            .unit
            .divide(rhs.unit())
            .ok_or(UnitError::Incompatible(self.unit, rhs.unit()))?;
        Ok(QuantityMap::new(self.values.mapv(|v| v / rhs.value()), unit))
    }

    /// Clip every element to at most `ceiling`, which must carry the same
    /// unit as the map. Excess is discarded, not redistributed.
    pub fn clip_max(&mut self, ceiling: &Quantity) -> Result<(), UnitError> {
        if self.unit != ceiling.unit() {
            return Err(UnitError::Incompatible(self.unit, ceiling.unit()));
        }
        let level = ceiling.value();
        self.values.mapv_inplace(|v| v.min(level));
        Ok(())
    }

    /// Round every element to the nearest integer, preserving the unit.
    pub fn round_values(&mut self) {
        self.values.mapv_inplace(f64::round);
    }

    /// Sum of all elements, as a quantity of the map's unit.
    pub fn total(&self) -> Quantity {
        Quantity::new(self.values.sum(), self.unit)
    }
}

/// A scalar argument that may arrive either as a bare number or as a tagged
/// quantity.
///
/// Centralizes the "bare number means default unit, with diagnostic" policy
/// instead of duplicating a type-branching ladder per field.
#[derive(Debug, Clone, Copy)]
pub enum QuantityInput {
    Bare(f64),
    Tagged(Quantity),
}

impl From<f64> for QuantityInput {
    fn from(value: f64) -> Self {
        QuantityInput::Bare(value)
    }
}

impl From<Quantity> for QuantityInput {
    fn from(quantity: Quantity) -> Self {
        QuantityInput::Tagged(quantity)
    }
}

impl QuantityInput {
    /// Normalize to a quantity carrying `expected`.
    ///
    /// A bare number is reinterpreted in `expected`, recording a [`Notice`]
    /// and logging a warning. A tagged quantity must already carry
    /// `expected`; anything else fails with [`TypeMismatchError`].
    pub fn coerce(
        self,
        field: &'static str,
        expected: Unit,
        notices: &mut Vec<Notice>,
    ) -> Result<Quantity, TypeMismatchError> {
        match self {
            QuantityInput::Bare(value) => {
                let notice = Notice {
                    field,
                    assumed: expected,
                };
                tracing::warn!(%notice, "reinterpreting bare input");
                notices.push(notice);
                Ok(Quantity::new(value, expected))
            }
            QuantityInput::Tagged(quantity) if quantity.unit() == expected => Ok(quantity),
            QuantityInput::Tagged(quantity) => Err(TypeMismatchError {
                field,
                expected,
                actual: quantity.unit(),
            }),
        }
    }
}

/// An array argument that may arrive either as a bare `Array2<f64>` or as a
/// tagged map. Same policy as [`QuantityInput`].
#[derive(Debug, Clone)]
pub enum MapInput {
    Bare(Array2<f64>),
    Tagged(QuantityMap),
}

impl From<Array2<f64>> for MapInput {
    fn from(values: Array2<f64>) -> Self {
        MapInput::Bare(values)
    }
}

impl From<QuantityMap> for MapInput {
    fn from(map: QuantityMap) -> Self {
        MapInput::Tagged(map)
    }
}

impl MapInput {
    /// Normalize to a map carrying `expected`; see [`QuantityInput::coerce`].
    pub fn coerce(
        self,
        field: &'static str,
        expected: Unit,
        notices: &mut Vec<Notice>,
    ) -> Result<QuantityMap, TypeMismatchError> {
        match self {
            MapInput::Bare(values) => {
                let notice = Notice {
                    field,
                    assumed: expected,
                };
                tracing::warn!(%notice, "reinterpreting bare input");
                notices.push(notice);
                Ok(QuantityMap::new(values, expected))
            }
            MapInput::Tagged(map) if map.unit() == expected => Ok(map),
            MapInput::Tagged(map) => Err(TypeMismatchError {
                field,
                expected,
                actual: map.unit(),
            }),
        }
    }
}
