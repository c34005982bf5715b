//! Detector orchestrator: exposure and readout simulation.
//!
//! A [`Detector`] owns one validated [`DetectorConfig`], one private electron
//! accumulator and one seedable random generator. The exposure step converts
//! a resampled photon-rate map into per-pixel electrons (shot noise,
//! efficiencies, saturation); the readout step adds dark current and readout
//! noise, converts to ADU through the system gain and by default clears the
//! accumulator for the next frame.
//!
//! The whole pipeline is synchronous, CPU-bound, whole-array arithmetic. For
//! batch frame generation, parallelize at frame granularity: one detector per
//! worker, each with its own seed.

use crate::algo::resample::{resample, ResampleError};
use crate::hardware::sensor::{ConfigError, DetectorConfig};
use crate::image_proc::noise::{apply_poisson_photon_noise, dark_current_frame, read_noise_frame};
use crate::units::{
    MapInput, Notice, Quantity, QuantityInput, QuantityMap, TypeMismatchError, Unit, UnitError,
};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{thread_rng, RngCore, SeedableRng};
use thiserror::Error;

/// Errors raised by detector operations.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// Receiver for intermediate pipeline arrays when debug mode is requested.
///
/// Purely an observation side channel: emission never alters the returned
/// result. Typical implementations forward to a plotting or logging
/// collaborator.
pub trait DebugSink {
    fn emit(&mut self, label: &str, image: &Array2<f64>);
}

/// An astronomical detector converting photon-rate maps into count arrays.
pub struct Detector {
    config: DetectorConfig,
    /// Per-pixel electrons from the most recent exposure. Replaced by each
    /// expose call, cleared by readout unless retention is requested.
    accumulator: Array2<f64>,
    rng: StdRng,
    notices: Vec<Notice>,
    debug_sink: Option<Box<dyn DebugSink>>,
}

impl Detector {
    /// Build a detector with an OS-entropy seed.
    pub fn new(config: DetectorConfig) -> Self {
        let seed = thread_rng().next_u64();
        Self::with_seed(config, seed)
    }

    /// Build a detector with a fixed seed for reproducible frame generation.
    pub fn with_seed(mut config: DetectorConfig, seed: u64) -> Self {
        let notices = config.take_notices();
        let accumulator = Array2::zeros(config.shape());
        Self {
            config,
            accumulator,
            rng: StdRng::seed_from_u64(seed),
            notices,
            debug_sink: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Read-only view of the electron accumulator.
    pub fn accumulated_electrons(&self) -> ArrayView2<'_, f64> {
        self.accumulator.view()
    }

    /// Drain the unit-reinterpretation notices gathered so far (from
    /// configuration normalization and from operation arguments).
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Install a debug sink receiving intermediate arrays when operations
    /// are called with `debug = true`.
    pub fn set_debug_sink(&mut self, sink: Box<dyn DebugSink>) {
        self.debug_sink = Some(sink);
    }

    /// Resample a photon-rate map onto the detector grid. Pure; exposed for
    /// callers that want the resampled map without an exposure.
    pub fn resample(
        &self,
        photon_rate: &QuantityMap,
        photon_rate_resolution: &Quantity,
    ) -> Result<QuantityMap, DetectorError> {
        Ok(resample(
            photon_rate,
            photon_rate_resolution,
            &self.config.pixel_scale(),
            self.config.shape(),
        )?)
    }

    /// Simulate one exposure: per-pixel electrons after shot noise,
    /// efficiencies and saturation. Replaces the accumulator contents.
    ///
    /// Step order is load-bearing: the Poisson draw models quantum
    /// randomness of photon arrival and must happen before any efficiency
    /// scaling. All validation precedes mutation, so a failed call leaves
    /// the accumulator untouched.
    ///
    /// Bare-number arguments are accepted and reinterpreted in the
    /// documented default units (ph/s, s, arcsec) with a notice.
    pub fn expose(
        &mut self,
        photon_rate: impl Into<MapInput>,
        integration_time: impl Into<QuantityInput>,
        photon_rate_resolution: impl Into<QuantityInput>,
        debug: bool,
    ) -> Result<QuantityMap, DetectorError> {
        let mut notices = Vec::new();
        let photon_rate =
            photon_rate
                .into()
                .coerce("photon_rate", Unit::PhotonPerSecond, &mut notices)?;
        let integration_time =
            integration_time
                .into()
                .coerce("integration_time", Unit::Second, &mut notices)?;
        let resolution = photon_rate_resolution.into().coerce(
            "photon_rate_resolution",
            Unit::Arcsec,
            &mut notices,
        )?;

        let resampled = resample(
            &photon_rate,
            &resolution,
            &self.config.pixel_scale(),
            self.config.shape(),
        )?;

        // Expected photons per pixel over the integration window
        let photons = resampled.checked_mul(&integration_time)?;
        if debug {
            self.emit_debug("photons", photons.values());
        }

        // Photon shot noise: the sole stochastic step of the exposure
        let sampled = apply_poisson_photon_noise(photons.values(), &mut self.rng);

        let mut electrons = QuantityMap::new(sampled, Unit::Photon)
            .checked_mul(&self.config.optics_transmission())?
            .checked_mul(&self.config.quantum_efficiency())?;

        // Full well: excess charge is discarded, not wrapped or redistributed
        if let Some(level) = self.config.saturation_level() {
            electrons.clip_max(&level)?;
        }
        electrons.round_values();

        if debug {
            self.emit_debug("electrons", electrons.values());
        }

        tracing::debug!(
            mean = electrons.values().mean().unwrap_or(0.0),
            total = electrons.total().value(),
            "exposure complete"
        );

        self.notices.append(&mut notices);
        self.accumulator.assign(electrons.values());
        Ok(electrons)
    }

    /// Simulate the detector readout: dark current, readout noise, gain
    /// conversion and the post-gain saturation clip.
    ///
    /// With `reset` (the default cycle) the accumulator is zeroed after the
    /// read; pass `false` to retain the charge for multi-read workflows.
    /// Returns unit-stripped counts suitable for downstream file writers.
    pub fn readout(
        &mut self,
        integration_time: impl Into<QuantityInput>,
        reset: bool,
    ) -> Result<Array2<f64>, DetectorError> {
        let mut notices = Vec::new();
        let integration_time =
            integration_time
                .into()
                .coerce("integration_time", Unit::Second, &mut notices)?;

        let shape = self.config.shape();
        let mut electrons = self.accumulator.clone();

        // Charge accumulated over the window independent of signal
        if let Some(dark_current) = self.config.dark_current() {
            let mean = dark_current.checked_mul(&integration_time)?;
            electrons += &dark_current_frame(shape, mean.value(), &mut self.rng);
        }

        // Electronic noise introduced once per readout
        if let Some(readout_noise) = self.config.readout_noise() {
            electrons += &read_noise_frame(shape, readout_noise.value(), &mut self.rng);
        }

        let gain = self.config.system_gain();
        let mut counts = QuantityMap::new(electrons, Unit::Electron).checked_div(&gain)?;

        // Post-gain clip, independent of the pre-gain clip in expose():
        // readout may run without an immediately preceding exposure.
        if let Some(level) = self.config.saturation_level() {
            let ceiling = level.checked_div(&gain)?;
            counts.clip_max(&ceiling)?;
        }

        if reset {
            self.accumulator.fill(0.0);
        }

        self.notices.append(&mut notices);
        Ok(counts.into_values())
    }

    /// Full exposure cycle: expose, then read out with reset. The entry
    /// point most callers use; `expose`/`readout` remain available for
    /// multi-frame or calibration-frame workflows.
    pub fn get_counts(
        &mut self,
        photon_rate: impl Into<MapInput>,
        integration_time: impl Into<QuantityInput>,
        photon_rate_resolution: impl Into<QuantityInput>,
        debug: bool,
    ) -> Result<Array2<f64>, DetectorError> {
        let mut notices = Vec::new();
        let integration_time =
            integration_time
                .into()
                .coerce("integration_time", Unit::Second, &mut notices)?;
        self.notices.append(&mut notices);

        self.expose(photon_rate, integration_time, photon_rate_resolution, debug)?;
        self.readout(integration_time, true)
    }

    fn emit_debug(&mut self, label: &str, image: &Array2<f64>) {
        if let Some(sink) = self.debug_sink.as_mut() {
            sink.emit(label, image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::test_patterns::uniform_photon_rate;
    use crate::units::Quantity;
    use approx::assert_relative_eq;

    fn plain_config(side: usize, pixel_scale: f64) -> DetectorConfig {
        DetectorConfig::builder(side, Quantity::arcsec(pixel_scale))
            .build()
            .unwrap()
    }

    /// The reference scenario: 4x4 detector, unity everything, uniform
    /// 16 ph/s at matched resolution, 1 s integration.
    fn reference_detector(seed: u64) -> Detector {
        Detector::with_seed(plain_config(4, 1.0), seed)
    }

    #[test]
    fn test_reference_scenario_mean_and_variance() {
        let mut detector = reference_detector(42);
        let map = uniform_photon_rate((4, 4), 16.0);

        let trials = 2_000;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let n_pixels = 16.0;
        for _ in 0..trials {
            let counts = detector
                .get_counts(
                    map.clone(),
                    Quantity::seconds(1.0),
                    Quantity::arcsec(1.0),
                    false,
                )
                .unwrap();
            for &c in &counts {
                sum += c;
                sum_sq += c * c;
            }
        }
        let n = trials as f64 * n_pixels;
        let mean = sum / n;
        let variance = sum_sq / n - mean * mean;

        // Poisson with mean 16: expect mean ~16, variance ~16
        assert_relative_eq!(mean, 16.0, epsilon = 0.2);
        assert_relative_eq!(variance, 16.0, epsilon = 1.5);
    }

    #[test]
    fn test_poisson_convergence_over_many_trials() {
        // transmission = QE = 1, constant rate: the mean electron count must
        // converge to rate * integration_time.
        let mut detector = reference_detector(7);
        let map = uniform_photon_rate((4, 4), 9.0);

        let trials = 10_000;
        let mut sum = 0.0;
        for _ in 0..trials {
            let electrons = detector
                .expose(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
                .unwrap();
            sum += electrons.values().mean().unwrap();
        }
        let mean = sum / trials as f64;

        // sigma of the estimate is sqrt(9 / (16 * 10000)) ~ 0.0075
        assert_relative_eq!(mean, 9.0, epsilon = 0.05);
    }

    #[test]
    fn test_efficiencies_scale_expectation() {
        let config = DetectorConfig::builder(4usize, Quantity::arcsec(1.0))
            .optics_transmission(Quantity::dimensionless(0.5))
            .quantum_efficiency(Quantity::electrons_per_photon(0.8))
            .build()
            .unwrap();
        let mut detector = Detector::with_seed(config, 19);
        let map = uniform_photon_rate((4, 4), 100.0);

        let trials = 3_000;
        let mut sum = 0.0;
        for _ in 0..trials {
            let electrons = detector
                .expose(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
                .unwrap();
            sum += electrons.values().mean().unwrap();
        }
        let mean = sum / trials as f64;
        assert_relative_eq!(mean, 100.0 * 0.5 * 0.8, epsilon = 0.5);
    }

    #[test]
    fn test_saturation_bound_holds_for_any_seed() {
        for seed in 0..25 {
            let config = DetectorConfig::builder(4usize, Quantity::arcsec(1.0))
                .system_gain(Quantity::electrons_per_adu(2.0))
                .dark_current(Quantity::electrons_per_second(5.0))
                .readout_noise(Quantity::electrons(50.0))
                .saturation_level(Quantity::electrons(100.0))
                .build()
                .unwrap();
            let mut detector = Detector::with_seed(config, seed);
            let map = uniform_photon_rate((4, 4), 500.0);

            let counts = detector
                .get_counts(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
                .unwrap();
            for &c in &counts {
                assert!(c <= 100.0 / 2.0, "count {c} exceeds saturation ceiling");
            }
        }
    }

    #[test]
    fn test_expose_replaces_accumulator() {
        let mut detector = reference_detector(5);
        let bright = uniform_photon_rate((4, 4), 10_000.0);
        let dim = uniform_photon_rate((4, 4), 1.0);

        detector
            .expose(bright, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let after_bright = detector.accumulated_electrons().sum();

        detector
            .expose(dim, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let after_dim = detector.accumulated_electrons().sum();

        // Replace semantics, not integration across exposures
        assert!(after_dim < after_bright / 10.0);
    }

    #[test]
    fn test_reset_contract() {
        let config = DetectorConfig::builder(4usize, Quantity::arcsec(1.0))
            .dark_current(Quantity::electrons_per_second(3.0))
            .readout_noise(Quantity::electrons(2.0))
            .build()
            .unwrap();
        let mut detector = Detector::with_seed(config, 23);
        let map = uniform_photon_rate((4, 4), 50.0);

        // Default cycle zeroes the accumulator
        detector
            .get_counts(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        assert!(detector.accumulated_electrons().iter().all(|&v| v == 0.0));

        // Retained charge survives a non-resetting readout and feeds the next
        let electrons = detector
            .expose(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let first = detector.readout(Quantity::seconds(1.0), false).unwrap();
        assert_eq!(
            detector.accumulated_electrons().to_owned(),
            *electrons.values()
        );

        let second = detector.readout(Quantity::seconds(1.0), false).unwrap();
        assert!(second.sum() > 0.0);
        // Fresh independent noise draw: the two reads differ
        assert_ne!(first, second);
    }

    #[test]
    fn test_failed_expose_leaves_accumulator_untouched() {
        let mut detector = reference_detector(3);
        let map = uniform_photon_rate((4, 4), 50.0);
        detector
            .expose(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let before = detector.accumulated_electrons().to_owned();

        // Map FoV (2 arcsec) below detector FoV (4 arcsec): precondition fails
        let small = uniform_photon_rate((2, 2), 50.0);
        let err = detector
            .expose(small, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap_err();
        assert!(matches!(err, DetectorError::Resample(_)));
        assert_eq!(detector.accumulated_electrons().to_owned(), before);

        // Wrong unit tag also fails before mutation
        let map = uniform_photon_rate((4, 4), 50.0);
        let err = detector
            .expose(map, Quantity::arcsec(1.0), Quantity::arcsec(1.0), false)
            .unwrap_err();
        assert!(matches!(err, DetectorError::TypeMismatch(_)));
        assert_eq!(detector.accumulated_electrons().to_owned(), before);
    }

    #[test]
    fn test_bare_inputs_match_tagged_inputs() {
        // Same seed, one detector fed bare numbers, one fed quantities:
        // identical output, differing only in the notices.
        let mut tagged = reference_detector(77);
        let mut bare = reference_detector(77);
        let map = uniform_photon_rate((4, 4), 16.0);

        let counts_tagged = tagged
            .get_counts(
                map.clone(),
                Quantity::seconds(1.0),
                Quantity::arcsec(1.0),
                false,
            )
            .unwrap();
        let counts_bare = bare
            .get_counts(map.into_values(), 1.0, 1.0, false)
            .unwrap();

        assert_eq!(counts_tagged, counts_bare);
        assert!(tagged.drain_notices().is_empty());

        let notices = bare.drain_notices();
        let fields: Vec<_> = notices.iter().map(|n| n.field).collect();
        assert!(fields.contains(&"photon_rate"));
        assert!(fields.contains(&"integration_time"));
        assert!(fields.contains(&"photon_rate_resolution"));
    }

    #[test]
    fn test_gain_divides_counts() {
        let config = DetectorConfig::builder(4usize, Quantity::arcsec(1.0))
            .system_gain(Quantity::electrons_per_adu(4.0))
            .build()
            .unwrap();
        let mut detector = Detector::with_seed(config, 13);
        let map = uniform_photon_rate((4, 4), 10_000.0);

        let counts = detector
            .get_counts(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        // ~10000 electrons / gain 4 => ~2500 ADU
        assert_relative_eq!(counts.mean().unwrap(), 2_500.0, epsilon = 100.0);
    }

    #[test]
    fn test_oversampled_map_resampled_onto_grid() {
        // 16x16 map at 0.5 arcsec feeding a 4x4 detector at 1 arcsec:
        // zoom ratio 0.5, each detector pixel collects 4 source pixels.
        let mut detector = reference_detector(29);
        let map = uniform_photon_rate((16, 16), 4.0);

        let trials = 2_000;
        let mut sum = 0.0;
        for _ in 0..trials {
            let electrons = detector
                .expose(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(0.5), false)
                .unwrap();
            sum += electrons.values().mean().unwrap();
        }
        let mean = sum / trials as f64;
        assert_relative_eq!(mean, 16.0, epsilon = 0.3);
    }

    struct RecordingSink(Vec<(String, Array2<f64>)>);
    impl DebugSink for RecordingSink {
        fn emit(&mut self, label: &str, image: &Array2<f64>) {
            self.0.push((label.to_string(), image.clone()));
        }
    }

    #[test]
    fn test_debug_sink_observes_without_affecting_result() {
        let mut plain = reference_detector(55);
        let mut observed = reference_detector(55);
        observed.set_debug_sink(Box::new(RecordingSink(Vec::new())));
        let map = uniform_photon_rate((4, 4), 16.0);

        let counts_plain = plain
            .get_counts(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let counts_observed = observed
            .get_counts(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), true)
            .unwrap();

        assert_eq!(counts_plain, counts_observed);
    }

    #[test]
    fn test_debug_sink_receives_intermediates() {
        struct CountingSink {
            labels: Vec<String>,
        }
        impl DebugSink for CountingSink {
            fn emit(&mut self, label: &str, _image: &Array2<f64>) {
                self.labels.push(label.to_string());
            }
        }

        // The sink is owned by the detector, so observe through expose
        // returning the same electrons the accumulator now holds.
        let mut detector = reference_detector(61);
        detector.set_debug_sink(Box::new(CountingSink { labels: Vec::new() }));
        let map = uniform_photon_rate((4, 4), 16.0);
        let electrons = detector
            .expose(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), true)
            .unwrap();
        assert_eq!(
            detector.accumulated_electrons().to_owned(),
            *electrons.values()
        );
    }

    #[test]
    fn test_electrons_are_discrete() {
        let config = DetectorConfig::builder(4usize, Quantity::arcsec(1.0))
            .quantum_efficiency(Quantity::electrons_per_photon(0.73))
            .build()
            .unwrap();
        let mut detector = Detector::with_seed(config, 31);
        let map = uniform_photon_rate((4, 4), 100.0);
        let electrons = detector
            .expose(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        assert!(electrons.values().iter().all(|&v| v.fract() == 0.0));
    }

    #[test]
    fn test_seeded_detectors_reproduce_frames() {
        let map = uniform_photon_rate((4, 4), 16.0);
        let counts_a = Detector::with_seed(plain_config(4, 1.0), 123)
            .get_counts(map.clone(), Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        let counts_b = Detector::with_seed(plain_config(4, 1.0), 123)
            .get_counts(map, Quantity::seconds(1.0), Quantity::arcsec(1.0), false)
            .unwrap();
        assert_eq!(counts_a, counts_b);
    }
}
