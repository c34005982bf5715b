//! Generate a batch of synthetic short exposures and report count statistics.
//!
//! Stands in for the upstream driver: synthesizes a Gaussian-spot photon-rate
//! map on an oversampled grid, runs it through a detector model and prints
//! per-batch statistics. Nothing is persisted; file output belongs to the
//! caller of the library.
//!
//! Usage:
//! ```
//! cargo run --release --bin generate_exposures -- [OPTIONS]
//! ```

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use specklesim::hardware::sensor::models;
use specklesim::image_proc::test_patterns::gaussian_spot;
use specklesim::{Detector, DetectorConfig, Quantity};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for exposure generation
#[derive(Parser, Debug)]
#[clap(author, version, about = "Generate synthetic short-exposure frames")]
struct Args {
    /// Detector preset to use (ideal, speckle-cam, custom)
    #[clap(short = 'm', long, default_value = "speckle-cam")]
    model: String,

    /// Detector side length in pixels (custom model only)
    #[clap(long, default_value = "256")]
    size: usize,

    /// Detector pixel scale in arcsec (custom model only)
    #[clap(long, default_value = "0.0107")]
    pixel_scale: f64,

    /// Oversampling factor of the photon-rate map relative to the detector
    #[clap(short = 'o', long, default_value = "4")]
    oversampling: usize,

    /// Total source photon rate in ph/s
    #[clap(short = 'r', long, default_value = "1e6")]
    photon_rate: f64,

    /// Gaussian spot sigma in detector pixels
    #[clap(long, default_value = "6.0")]
    spot_sigma: f64,

    /// Integration time per frame in milliseconds
    #[clap(short = 'e', long, default_value = "50")]
    integration_ms: u64,

    /// Number of frames to generate
    #[clap(short = 'n', long, default_value = "100")]
    frames: usize,

    /// Random seed for reproducibility (optional)
    #[clap(long)]
    seed: Option<u64>,
}

fn select_config(args: &Args) -> Result<DetectorConfig> {
    let config = match args.model.to_lowercase().as_str() {
        "ideal" => models::IDEAL_256.clone(),
        "speckle-cam" => models::SPECKLE_CAM_1K.clone(),
        "custom" => DetectorConfig::builder(args.size, Quantity::arcsec(args.pixel_scale))
            .build()?,
        other => {
            eprintln!("Unknown model: {other}. Using speckle-cam.");
            models::SPECKLE_CAM_1K.clone()
        }
    };
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = select_config(&args)?;
    let (rows, cols) = config.shape();
    let pixel_scale = config.pixel_scale();

    // Oversampled source map covering the full detector field of view
    let map_shape = (rows * args.oversampling, cols * args.oversampling);
    let map_resolution = pixel_scale.scale(1.0 / args.oversampling as f64);
    let sigma_px = args.spot_sigma * args.oversampling as f64;
    let photon_map = gaussian_spot(map_shape, sigma_px, args.photon_rate);

    let integration_time = Quantity::seconds(args.integration_ms as f64 / 1000.0);

    let mut detector = match args.seed {
        Some(seed) => Detector::with_seed(config, seed),
        None => Detector::new(config),
    };

    println!("Synthetic exposure generation");
    println!("=============================");
    println!("Model: {} ({rows}x{cols} px, {pixel_scale}/px)", args.model);
    println!(
        "Source: {:.3e} ph/s Gaussian spot, sigma {:.1} px",
        args.photon_rate, args.spot_sigma
    );
    println!("Integration: {} ms, frames: {}", args.integration_ms, args.frames);
    println!();

    let progress = ProgressBar::new(args.frames as u64);
    progress.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} frames ({eta})",
    )?);

    let mut frame_means = Vec::with_capacity(args.frames);
    let mut frame_maxes = Vec::with_capacity(args.frames);
    for _ in 0..args.frames {
        let counts = detector.get_counts(
            photon_map.clone(),
            integration_time,
            map_resolution,
            false,
        )?;
        frame_means.push(counts.mean().unwrap_or(0.0));
        frame_maxes.push(counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max));
        progress.inc(1);
    }
    progress.finish();

    for notice in detector.drain_notices() {
        println!("note: {notice}");
    }

    let batch_mean = frame_means.iter().sum::<f64>() / frame_means.len() as f64;
    let mean_var = frame_means
        .iter()
        .map(|m| (m - batch_mean).powi(2))
        .sum::<f64>()
        / frame_means.len() as f64;
    let peak = frame_maxes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    println!();
    println!("Batch statistics ({} frames):", args.frames);
    println!("  Mean counts/pixel:      {batch_mean:.3} ADU");
    println!("  Frame-to-frame stddev:  {:.3} ADU", mean_var.sqrt());
    println!("  Peak count:             {peak:.0} ADU");

    Ok(())
}
