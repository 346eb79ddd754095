//! AIRS-GSeed CLI
//!
//! Entry point for generating synthetic modalities, training the canopy and
//! seed fusion models, and scoring tabular seed-quality records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use airs_gseed::backend::{backend_name, default_device, TrainingBackend};
use airs_gseed::dataset::{
    load_quality_csv, GeneratorConfig, MissingValuePolicy, QualitySummary, SyntheticDataGenerator,
};
use airs_gseed::training::{
    run_canopy_experiment, run_seed_experiment, save_report, CanopyExperimentConfig,
    SeedExperimentConfig,
};
use airs_gseed::utils::format_duration;
use airs_gseed::utils::logging::{init_logging, LogConfig};
use airs_gseed::{DEFAULT_SEED, HIGH_RISK_THRESHOLD, QUALITY_THRESHOLD, VERSION};

/// AIRS-GSeed multi-modal agricultural fusion models
#[derive(Parser, Debug)]
#[command(name = "airs-gseed")]
#[command(version)]
#[command(about = "Canopy stress and seed health fusion models with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false", global = true)]
    verbose: bool,

    /// Only log errors and hide progress bars
    #[arg(short, long, default_value = "false", global = true)]
    quiet: bool,

    /// Random seed for generation, splitting and shuffling
    #[arg(long, default_value_t = DEFAULT_SEED, global = true)]
    seed: u64,

    /// Directory for reports and checkpoints
    #[arg(short, long, default_value = "output", global = true)]
    output_dir: PathBuf,

    /// JSON experiment config overriding the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate every synthetic modality and summarise it
    Generate {
        /// Images and spectra per modality
        #[arg(short, long, default_value = "100")]
        samples: usize,

        /// Days of soil, storage and weather data
        #[arg(short, long, default_value = "60")]
        days: usize,

        /// Image side length in pixels
        #[arg(long, default_value = "64")]
        image_size: usize,
    },

    /// Train and evaluate the canopy stress classifier
    TrainCanopy {
        /// Number of synthetic images
        #[arg(long)]
        num_images: Option<usize>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Train and evaluate the SHI and ARS regressors
    TrainSeed {
        /// Number of synthetic seed samples
        #[arg(long)]
        num_samples: Option<usize>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Wavelengths per spectrum
        #[arg(long)]
        spectral_length: Option<usize>,
    },

    /// Compute SHI/ARS for a seed-quality CSV
    Indices {
        /// Path to the CSV file
        csv: PathBuf,

        /// Fail on empty pathogen cells instead of reading them as zero
        #[arg(long, default_value = "false")]
        reject_missing: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_flags(cli.verbose, cli.quiet))
        .context("installing the log subscriber")?;

    if !cli.quiet {
        print_banner();
    }
    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("creating {}", cli.output_dir.display()))?;

    match cli.command {
        Commands::Generate {
            samples,
            days,
            image_size,
        } => cmd_generate(cli.seed, samples, days, image_size, &cli.output_dir),

        Commands::TrainCanopy {
            num_images,
            epochs,
            batch_size,
        } => {
            let mut config = match &cli.config {
                Some(path) => CanopyExperimentConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => CanopyExperimentConfig::default(),
            };
            config.seed = cli.seed;
            config.split.seed = cli.seed;
            config.trainer.seed = cli.seed;
            config.trainer.show_progress = !cli.quiet;
            config.trainer.checkpoint_dir = Some(cli.output_dir.join("checkpoints"));
            if let Some(n) = num_images {
                config.num_images = n;
            }
            if let Some(epochs) = epochs {
                config.trainer.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.trainer.batch_size = batch_size;
            }
            cmd_train_canopy(&config, &cli.output_dir)
        }

        Commands::TrainSeed {
            num_samples,
            epochs,
            batch_size,
            spectral_length,
        } => {
            let mut config = match &cli.config {
                Some(path) => SeedExperimentConfig::load(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SeedExperimentConfig::default(),
            };
            if let Some(length) = spectral_length {
                config.set_spectral_length(length);
            }
            config.seed = cli.seed;
            config.split.seed = cli.seed;
            config.trainer.seed = cli.seed;
            config.trainer.show_progress = !cli.quiet;
            config.trainer.checkpoint_dir = Some(cli.output_dir.join("checkpoints"));
            if let Some(n) = num_samples {
                config.num_samples = n;
            }
            if let Some(epochs) = epochs {
                config.trainer.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.trainer.batch_size = batch_size;
            }
            cmd_train_seed(&config, &cli.output_dir)
        }

        Commands::Indices {
            csv,
            reject_missing,
        } => {
            let policy = if reject_missing {
                MissingValuePolicy::Reject
            } else {
                MissingValuePolicy::ZeroFill
            };
            cmd_indices(&csv, policy, &cli.output_dir)
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", "AIRS-GSeed fusion models".green().bold());
    println!("  version {} | backend {}", VERSION, backend_name());
    println!();
}

#[derive(Debug, Serialize)]
struct ImageSummary {
    modality: &'static str,
    samples: usize,
    channels: usize,
    positive_fraction: f64,
    channel_means: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct GenerateSummary {
    seed: u64,
    images: Vec<ImageSummary>,
    spectra: usize,
    fungal_fraction: f64,
    mean_germination: f64,
    soil_readings: usize,
    storage_units: usize,
    spoilage_onset_days: Vec<Vec<usize>>,
    weather_days: usize,
    mean_precipitation_mm: f64,
}

fn cmd_generate(seed: u64, samples: usize, days: usize, image_size: usize, output_dir: &Path) -> Result<()> {
    println!("{}", "Generating synthetic modalities...".cyan());
    let config = GeneratorConfig {
        image_size,
        ..GeneratorConfig::default()
    };
    let mut generator = SyntheticDataGenerator::with_config(config, seed)?;

    let mut images = Vec::new();
    for (modality, set) in [
        ("rgb", generator.generate_rgb_images(samples)?),
        ("multispectral", generator.generate_multispectral_images(samples)?),
        ("thermal", generator.generate_thermal_images(samples)?),
    ] {
        images.push(ImageSummary {
            modality,
            samples: set.len(),
            channels: set.channels,
            positive_fraction: set.positive_fraction(),
            channel_means: (0..set.channels).map(|c| set.channel_mean(c)).collect(),
        });
    }

    let spectra = generator.generate_hyperspectral(samples)?;
    let n = spectra.labels.len() as f64;
    let fungal_fraction = spectra.labels.iter().filter(|l| l.fungal_presence).count() as f64 / n;
    let mean_germination = spectra.labels.iter().map(|l| l.germination_rate).sum::<f64>() / n;

    let soil = generator.generate_soil_series(days, 3)?;
    let storage = generator
        .generate_storage_series(days, 3)
        .context("storage series need more than 30 days")?;
    let weather = generator.generate_weather(days)?;

    let summary = GenerateSummary {
        seed,
        images,
        spectra: spectra.len(),
        fungal_fraction,
        mean_germination,
        soil_readings: soil.iter().map(|s| s.timestamps.len()).sum(),
        storage_units: storage.len(),
        spoilage_onset_days: storage.iter().map(|s| s.spoilage_onset_days.clone()).collect(),
        weather_days: weather.len(),
        mean_precipitation_mm: weather.iter().map(|w| w.precipitation_mm).sum::<f64>()
            / weather.len().max(1) as f64,
    };

    for image in &summary.images {
        println!(
            "  {:14} {} samples, {:.1}% stressed",
            image.modality,
            image.samples,
            image.positive_fraction * 100.0
        );
    }
    println!(
        "  {:14} {} spectra, {:.1}% fungal, mean germination {:.1}%",
        "hyperspectral",
        summary.spectra,
        summary.fungal_fraction * 100.0,
        summary.mean_germination
    );
    println!("  {:14} {} readings", "soil", summary.soil_readings);
    println!("  {:14} onsets {:?}", "storage", summary.spoilage_onset_days);
    println!("  {:14} {} days", "weather", summary.weather_days);

    let path = output_dir.join("generate_summary.json");
    save_report(&summary, &path)?;
    println!("{} {}", "Summary written to".green(), path.display());
    Ok(())
}

fn cmd_train_canopy(config: &CanopyExperimentConfig, output_dir: &Path) -> Result<()> {
    println!("{}", "Training canopy stress classifier...".cyan());
    let started = std::time::Instant::now();
    let report = run_canopy_experiment::<TrainingBackend>(config, &default_device())
        .context("canopy experiment failed")?;

    println!();
    println!("{}", "Canopy test metrics".cyan().bold());
    println!("{}", report.test.metrics);
    println!("  {}", report.test.metrics.confusion_matrix);
    println!(
        "  best validation accuracy {:.2}% | {} parameters | {}",
        report.training.best_metric * 100.0,
        report.num_parameters,
        format_duration(started.elapsed().as_secs_f64())
    );

    let path = output_dir.join("canopy_results.json");
    save_report(&report, &path)?;
    info!("Report written to {}", path.display());
    println!("{} {}", "Results written to".green(), path.display());
    Ok(())
}

fn cmd_train_seed(config: &SeedExperimentConfig, output_dir: &Path) -> Result<()> {
    println!("{}", "Training SHI and ARS regressors...".cyan());
    let started = std::time::Instant::now();
    let report = run_seed_experiment::<TrainingBackend>(config, &default_device())
        .context("seed experiment failed")?;

    println!();
    println!("{}", "Seed test metrics".cyan().bold());
    println!("  SHI  {}", report.shi_test);
    println!("  ARS  {}", report.ars_test);
    println!(
        "  best validation R²: SHI {:.4}, ARS {:.4} | {}",
        report.shi_training.best_metric,
        report.ars_training.best_metric,
        format_duration(started.elapsed().as_secs_f64())
    );

    let path = output_dir.join("seed_results.json");
    save_report(&report, &path)?;
    println!("{} {}", "Results written to".green(), path.display());
    Ok(())
}

fn cmd_indices(csv: &Path, policy: MissingValuePolicy, output_dir: &Path) -> Result<()> {
    let records = load_quality_csv(csv, policy)
        .with_context(|| format!("reading seed-quality records from {}", csv.display()))?;
    let summary = QualitySummary::from_records(&records)?;

    println!("{}", "Seed quality indices".cyan().bold());
    println!("  records:        {}", summary.records);
    println!("  mean SHI:       {:.2}", summary.mean_shi);
    println!("  mean ARS:       {:.2}", summary.mean_ars);
    println!(
        "  SHI ≥ {:.0}:       {:.1}%",
        QUALITY_THRESHOLD,
        summary.quality_fraction * 100.0
    );
    let high_risk = format!(
        "  ARS ≥ {:.0}:       {:.1}%",
        HIGH_RISK_THRESHOLD,
        summary.high_risk_fraction * 100.0
    );
    if summary.high_risk_fraction > 0.0 {
        println!("{}", high_risk.red());
    } else {
        println!("{}", high_risk);
    }

    let path = output_dir.join("quality_indices.json");
    save_report(&summary, &path)?;
    println!("{} {}", "Summary written to".green(), path.display());
    Ok(())
}
