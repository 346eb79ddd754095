//! Synthetic multi-modal data generation
//!
//! Every generator owns a single seeded `ChaCha8Rng`; all draws for imagery,
//! spectra and sensor streams come from that stream, so two generators built
//! from the same seed and fed the same calls produce identical output.
//!
//! Each modality is a two-component mixture: a Bernoulli switch decides per
//! sample whether it comes from the healthy or the stressed/diseased branch.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{LogNormal, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{AirsError, Result};

/// First wavelength of the hyperspectral axis (nm)
pub const WAVELENGTH_MIN_NM: f64 = 400.0;

/// Last wavelength of the hyperspectral axis (nm)
pub const WAVELENGTH_MAX_NM: f64 = 2500.0;

/// Default number of hyperspectral bands (just under 1 nm spacing)
pub const DEFAULT_SPECTRAL_LENGTH: usize = 2151;

/// Upper bound on sensor readings per day; timestamps have 1 s resolution
pub const SECONDS_PER_DAY: usize = 86_400;

/// Width in nm of the widest absorption window; spectra must have more samples
pub const MAX_ABSORPTION_WINDOW_NM: usize = 100;

/// Flat reflectance the absorption dips are carved into
const BASE_REFLECTANCE: f32 = 0.5;

/// Absorption dips present in every seed spectrum: (center nm, half-width nm, factor)
const ABSORPTION_DIPS: [(f64, f64, f32); 3] = [
    (1450.0, 50.0, 0.7),
    (1940.0, 50.0, 0.6),
    (2180.0, 30.0, 0.8),
];

/// Extra dip of contaminated seeds
const CONTAMINATION_DIP: (f64, f64, f32) = (1650.0, 40.0, 0.75);

/// Spot radius range of the reference 256 px image, as a fraction of the image size
const SPOT_RADIUS_FRACTION: (f64, f64) = (10.0 / 256.0, 30.0 / 256.0);

/// Multispectral band order
pub const MULTISPECTRAL_BANDS: [&str; 5] = ["red", "green", "blue", "red_edge", "nir"];

/// Generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Side length of square images in pixels
    pub image_size: usize,
    /// Number of hyperspectral bands between 400 and 2500 nm
    pub spectral_length: usize,
    /// Probability that an RGB canopy image is diseased
    pub disease_probability: f64,
    /// Probability that a multispectral image is stressed
    pub multispectral_stress_probability: f64,
    /// Probability that a thermal image is stressed
    pub thermal_stress_probability: f64,
    /// Probability that a seed spectrum is contaminated
    pub contamination_probability: f64,
    /// Soil sensor cadence
    pub soil_readings_per_day: usize,
    /// Storage sensor cadence
    pub storage_readings_per_day: usize,
    /// Probability that a storage unit is temperature controlled
    pub controlled_storage_probability: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            image_size: 256,
            spectral_length: DEFAULT_SPECTRAL_LENGTH,
            disease_probability: 0.4,
            multispectral_stress_probability: 0.4,
            thermal_stress_probability: 0.3,
            contamination_probability: 0.3,
            soil_readings_per_day: 96,
            storage_readings_per_day: 288,
            controlled_storage_probability: 0.5,
        }
    }
}

impl GeneratorConfig {
    /// Check shapes and probabilities
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(AirsError::Config("image_size must be positive".to_string()));
        }
        validate_spectral_length(self.spectral_length)?;
        for (name, per_day) in [
            ("soil_readings_per_day", self.soil_readings_per_day),
            ("storage_readings_per_day", self.storage_readings_per_day),
        ] {
            if per_day == 0 || per_day > SECONDS_PER_DAY {
                return Err(AirsError::Config(format!(
                    "{} must be within [1, {}], got {}",
                    name, SECONDS_PER_DAY, per_day
                )));
            }
        }

        let probabilities = [
            ("disease_probability", self.disease_probability),
            ("multispectral_stress_probability", self.multispectral_stress_probability),
            ("thermal_stress_probability", self.thermal_stress_probability),
            ("contamination_probability", self.contamination_probability),
            ("controlled_storage_probability", self.controlled_storage_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(AirsError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

fn validate_spectral_length(length: usize) -> Result<()> {
    if length <= MAX_ABSORPTION_WINDOW_NM {
        return Err(AirsError::Config(format!(
            "spectral_length {} must exceed the widest absorption window ({} nm)",
            length, MAX_ABSORPTION_WINDOW_NM
        )));
    }
    Ok(())
}

fn ensure_count(n: usize, what: &str) -> Result<()> {
    if n == 0 {
        return Err(AirsError::Config(format!(
            "requested number of {} must be positive",
            what
        )));
    }
    Ok(())
}

pub(crate) fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std)
        .map_err(|e| AirsError::Config(format!("invalid normal({}, {}): {}", mean, std, e)))
}

/// A set of equally sized square images with one label per image.
///
/// Pixels are stored channel-first: index `c * size * size + y * size + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    pub channels: usize,
    pub size: usize,
    pub images: Vec<Vec<f32>>,
    /// 1 for diseased/stressed, 0 for healthy
    pub labels: Vec<usize>,
}

impl ImageSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Fraction of samples labelled 1
    pub fn positive_fraction(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().filter(|&&l| l == 1).count() as f64 / self.labels.len() as f64
    }

    fn plane(&self) -> usize {
        self.size * self.size
    }
}

/// Ground truth attached to one seed spectrum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedLabels {
    /// Germination rate in percent
    pub germination_rate: f64,
    /// Whether fungal infection is present
    pub fungal_presence: bool,
    /// Aflatoxin concentration (ppb), always positive
    pub aflatoxin_ppb: f64,
}

impl SeedLabels {
    pub fn fungal_flag(&self) -> f64 {
        if self.fungal_presence {
            1.0
        } else {
            0.0
        }
    }
}

/// Hyperspectral seed spectra with their ground truth
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSet {
    pub wavelengths: Vec<f64>,
    pub spectra: Vec<Vec<f32>>,
    pub labels: Vec<SeedLabels>,
}

impl SpectralSet {
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

/// Evenly spaced wavelength axis from 400 to 2500 nm
pub fn wavelength_axis(length: usize) -> Result<Vec<f64>> {
    validate_spectral_length(length)?;
    let step = (WAVELENGTH_MAX_NM - WAVELENGTH_MIN_NM) / (length - 1) as f64;
    Ok((0..length)
        .map(|i| WAVELENGTH_MIN_NM + step * i as f64)
        .collect())
}

/// Seeded synthetic data generator for every modality
pub struct SyntheticDataGenerator {
    config: GeneratorConfig,
    pub(crate) rng: ChaCha8Rng,
}

impl SyntheticDataGenerator {
    /// Create a generator with default settings
    pub fn new(seed: u64) -> Self {
        Self {
            config: GeneratorConfig::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Create a generator with explicit settings, validated up front
    pub fn with_config(config: GeneratorConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// RGB canopy images with optional disease spots.
    ///
    /// Healthy foliage only has a green channel drawn from U(0.4, 0.7).
    /// Diseased images get 5 to 14 circular spots, each painted with a single
    /// brownish color.
    pub fn generate_rgb_images(&mut self, n: usize) -> Result<ImageSet> {
        ensure_count(n, "RGB images")?;
        let size = self.config.image_size;
        let plane = size * size;
        let min_radius = (SPOT_RADIUS_FRACTION.0 * size as f64).max(1.0);
        let max_radius = (SPOT_RADIUS_FRACTION.1 * size as f64).max(min_radius + 1.0);

        let mut set = ImageSet {
            channels: 3,
            size,
            images: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        };

        for _ in 0..n {
            let mut image = vec![0.0f32; 3 * plane];
            for px in image[plane..2 * plane].iter_mut() {
                *px = self.rng.gen_range(0.4f32..0.7);
            }

            let diseased = self.rng.gen_bool(self.config.disease_probability);
            if diseased {
                let n_spots = self.rng.gen_range(5..15);
                for _ in 0..n_spots {
                    let cx = self.rng.gen_range(0..size) as f64;
                    let cy = self.rng.gen_range(0..size) as f64;
                    let radius = self.rng.gen_range(min_radius..max_radius);
                    let color = [
                        self.rng.gen_range(0.3f32..0.5),
                        self.rng.gen_range(0.2f32..0.4),
                        self.rng.gen_range(0.1f32..0.3),
                    ];
                    paint_disk(&mut image, size, cx, cy, radius, color);
                }
            }

            set.images.push(image);
            set.labels.push(usize::from(diseased));
        }

        debug!(
            "Generated {} RGB images ({}x{}), {:.1}% diseased",
            n,
            size,
            size,
            set.positive_fraction() * 100.0
        );
        Ok(set)
    }

    /// Five-band multispectral images (R, G, B, RedEdge, NIR).
    ///
    /// Stressed images lose NIR and red-edge reflectance and gain red on a
    /// random 30% of their pixels.
    pub fn generate_multispectral_images(&mut self, n: usize) -> Result<ImageSet> {
        ensure_count(n, "multispectral images")?;
        let size = self.config.image_size;
        let plane = size * size;
        let band_ranges: [(f32, f32); 5] =
            [(0.2, 0.4), (0.3, 0.6), (0.1, 0.3), (0.4, 0.7), (0.6, 0.9)];

        let mut set = ImageSet {
            channels: 5,
            size,
            images: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        };

        for _ in 0..n {
            let mut image = Vec::with_capacity(5 * plane);
            for (lo, hi) in band_ranges {
                for _ in 0..plane {
                    image.push(self.rng.gen_range(lo..hi));
                }
            }

            let stressed = self.rng.gen_bool(self.config.multispectral_stress_probability);
            if stressed {
                for p in 0..plane {
                    if self.rng.gen_bool(0.3) {
                        image[4 * plane + p] *= 0.6;
                        image[3 * plane + p] *= 0.7;
                        image[p] = (image[p] * 1.2).min(1.0);
                    }
                }
            }

            set.images.push(image);
            set.labels.push(usize::from(stressed));
        }

        debug!("Generated {} multispectral images", n);
        Ok(set)
    }

    /// Single-channel canopy temperature maps in °C.
    ///
    /// Baseline N(27.5, 2); stressed images warm 25% of pixels by 2 to 5 °C.
    pub fn generate_thermal_images(&mut self, n: usize) -> Result<ImageSet> {
        ensure_count(n, "thermal images")?;
        let size = self.config.image_size;
        let plane = size * size;
        let baseline = normal(27.5, 2.0)?;

        let mut set = ImageSet {
            channels: 1,
            size,
            images: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        };

        for _ in 0..n {
            let mut image: Vec<f32> = (0..plane)
                .map(|_| baseline.sample(&mut self.rng) as f32)
                .collect();

            let stressed = self.rng.gen_bool(self.config.thermal_stress_probability);
            if stressed {
                for px in image.iter_mut() {
                    if self.rng.gen_bool(0.25) {
                        *px += self.rng.gen_range(2.0f32..5.0);
                    }
                }
            }

            set.images.push(image);
            set.labels.push(usize::from(stressed));
        }

        debug!("Generated {} thermal images", n);
        Ok(set)
    }

    /// Hyperspectral seed spectra with germination, fungal and aflatoxin labels.
    ///
    /// Contaminated seeds are darkened by U(0.7, 0.9), pick up an extra
    /// absorption dip at 1650 nm, and draw their labels from the worse branch:
    /// germination U(40, 70), fungal presence, aflatoxin LogNormal(2, 1).
    /// Healthy seeds draw germination U(75, 95) and aflatoxin LogNormal(0.5, 0.5).
    pub fn generate_hyperspectral(&mut self, n: usize) -> Result<SpectralSet> {
        ensure_count(n, "spectra")?;
        let wavelengths = wavelength_axis(self.config.spectral_length)?;
        let noise = normal(0.0, 0.02)?;
        let healthy_toxin = LogNormal::new(0.5, 0.5)
            .map_err(|e| AirsError::Config(format!("invalid log-normal: {}", e)))?;
        let contaminated_toxin = LogNormal::new(2.0, 1.0)
            .map_err(|e| AirsError::Config(format!("invalid log-normal: {}", e)))?;

        let template: Vec<f32> = wavelengths
            .iter()
            .map(|&w| {
                ABSORPTION_DIPS
                    .iter()
                    .filter(|(center, half_width, _)| (w - center).abs() < *half_width)
                    .fold(BASE_REFLECTANCE, |r, (_, _, factor)| r * factor)
            })
            .collect();

        let mut set = SpectralSet {
            wavelengths,
            spectra: Vec::with_capacity(n),
            labels: Vec::with_capacity(n),
        };

        for _ in 0..n {
            let mut spectrum: Vec<f32> = template
                .iter()
                .map(|&r| r + noise.sample(&mut self.rng) as f32)
                .collect();

            let contaminated = self.rng.gen_bool(self.config.contamination_probability);
            let labels = if contaminated {
                let darkening = self.rng.gen_range(0.7f32..0.9);
                let (center, half_width, factor) = CONTAMINATION_DIP;
                for (r, &w) in spectrum.iter_mut().zip(&set.wavelengths) {
                    *r *= darkening;
                    if (w - center).abs() < half_width {
                        *r *= factor;
                    }
                }
                SeedLabels {
                    germination_rate: self.rng.gen_range(40.0..70.0),
                    fungal_presence: true,
                    aflatoxin_ppb: contaminated_toxin.sample(&mut self.rng),
                }
            } else {
                SeedLabels {
                    germination_rate: self.rng.gen_range(75.0..95.0),
                    fungal_presence: false,
                    aflatoxin_ppb: healthy_toxin.sample(&mut self.rng),
                }
            };

            set.spectra.push(spectrum);
            set.labels.push(labels);
        }

        debug!(
            "Generated {} spectra with {} bands",
            n, self.config.spectral_length
        );
        Ok(set)
    }
}

fn paint_disk(image: &mut [f32], size: usize, cx: f64, cy: f64, radius: f64, color: [f32; 3]) {
    let plane = size * size;
    let r2 = radius * radius;
    let y_lo = (cy - radius).floor().max(0.0) as usize;
    let y_hi = ((cy + radius).ceil() as usize).min(size - 1);
    let x_lo = (cx - radius).floor().max(0.0) as usize;
    let x_hi = ((cx + radius).ceil() as usize).min(size - 1);

    for y in y_lo..=y_hi {
        for x in x_lo..=x_hi {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            if dx * dx + dy * dy <= r2 {
                for (c, value) in color.iter().enumerate() {
                    image[c * plane + y * size + x] = *value;
                }
            }
        }
    }
}

impl ImageSet {
    /// Mean value of one channel over all images
    pub fn channel_mean(&self, channel: usize) -> f64 {
        let plane = self.plane();
        if self.images.is_empty() || channel >= self.channels {
            return 0.0;
        }
        let total: f64 = self
            .images
            .iter()
            .map(|img| {
                img[channel * plane..(channel + 1) * plane]
                    .iter()
                    .map(|&v| v as f64)
                    .sum::<f64>()
            })
            .sum();
        total / (plane * self.images.len()) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            image_size: 16,
            spectral_length: 301,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_rgb_values_and_labels_in_range() {
        let mut generator = SyntheticDataGenerator::with_config(small_config(), 7).unwrap();
        let set = generator.generate_rgb_images(40).unwrap();

        assert_eq!(set.len(), 40);
        assert_eq!(set.channels, 3);
        for (image, &label) in set.images.iter().zip(&set.labels) {
            assert_eq!(image.len(), 3 * 16 * 16);
            assert!(image.iter().all(|&v| (0.0..=1.0).contains(&v)));
            assert!(label <= 1);
        }
    }

    #[test]
    fn test_healthy_rgb_has_only_green() {
        let config = GeneratorConfig {
            disease_probability: 0.0,
            ..small_config()
        };
        let mut generator = SyntheticDataGenerator::with_config(config, 1).unwrap();
        let set = generator.generate_rgb_images(5).unwrap();
        assert!(set.labels.iter().all(|&l| l == 0));
        assert_eq!(set.channel_mean(0), 0.0);
        assert_eq!(set.channel_mean(2), 0.0);
        let green = set.channel_mean(1);
        assert!(green > 0.4 && green < 0.7);
    }

    #[test]
    fn test_diseased_rgb_has_spots() {
        let config = GeneratorConfig {
            disease_probability: 1.0,
            ..small_config()
        };
        let mut generator = SyntheticDataGenerator::with_config(config, 3).unwrap();
        let set = generator.generate_rgb_images(5).unwrap();
        assert!(set.labels.iter().all(|&l| l == 1));
        assert!(set.channel_mean(0) > 0.0);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let mut a = SyntheticDataGenerator::with_config(small_config(), 42).unwrap();
        let mut b = SyntheticDataGenerator::with_config(small_config(), 42).unwrap();

        assert_eq!(a.generate_rgb_images(8).unwrap(), b.generate_rgb_images(8).unwrap());
        assert_eq!(
            a.generate_hyperspectral(8).unwrap(),
            b.generate_hyperspectral(8).unwrap()
        );

        let mut c = SyntheticDataGenerator::with_config(small_config(), 43).unwrap();
        let mut d = SyntheticDataGenerator::with_config(small_config(), 42).unwrap();
        assert_ne!(
            c.generate_hyperspectral(4).unwrap().spectra,
            d.generate_hyperspectral(4).unwrap().spectra
        );
    }

    #[test]
    fn test_seed_labels_in_range() {
        let mut generator = SyntheticDataGenerator::with_config(small_config(), 11).unwrap();
        let set = generator.generate_hyperspectral(500).unwrap();

        for labels in &set.labels {
            assert!((0.0..=100.0).contains(&labels.germination_rate));
            assert!(labels.aflatoxin_ppb > 0.0);
            if labels.fungal_presence {
                assert!(labels.germination_rate < 70.0);
            } else {
                assert!(labels.germination_rate >= 75.0);
            }
        }
    }

    #[test]
    fn test_contamination_fraction_matches_probability() {
        let mut generator = SyntheticDataGenerator::with_config(small_config(), 2024).unwrap();
        let set = generator.generate_hyperspectral(10_000).unwrap();
        let fungal = set.labels.iter().filter(|l| l.fungal_presence).count() as f64;
        let fraction = fungal / set.len() as f64;
        assert!((fraction - 0.30).abs() < 0.03, "fraction was {}", fraction);
    }

    #[test]
    fn test_absorption_dips_lower_reflectance() {
        let config = GeneratorConfig {
            contamination_probability: 0.0,
            ..GeneratorConfig::default()
        };
        let mut generator = SyntheticDataGenerator::with_config(config, 5).unwrap();
        let set = generator.generate_hyperspectral(20).unwrap();

        let idx_of = |nm: f64| {
            set.wavelengths
                .iter()
                .position(|&w| (w - nm).abs() < 0.5)
                .unwrap()
        };
        let mean_at = |idx: usize| {
            set.spectra.iter().map(|s| s[idx] as f64).sum::<f64>() / set.len() as f64
        };

        assert!((mean_at(idx_of(1000.0)) - 0.5).abs() < 0.02);
        assert!((mean_at(idx_of(1450.0)) - 0.35).abs() < 0.02);
        assert!((mean_at(idx_of(1940.0)) - 0.30).abs() < 0.02);
    }

    #[test]
    fn test_multispectral_and_thermal_shapes() {
        let mut generator = SyntheticDataGenerator::with_config(small_config(), 9).unwrap();

        let ms = generator.generate_multispectral_images(6).unwrap();
        assert_eq!(ms.channels, MULTISPECTRAL_BANDS.len());
        assert!(ms.images.iter().all(|img| img.len() == 5 * 16 * 16));
        assert!(ms.images.iter().flatten().all(|&v| (0.0..=1.0).contains(&v)));

        let thermal = generator.generate_thermal_images(6).unwrap();
        assert_eq!(thermal.channels, 1);
        let mean = thermal.channel_mean(0);
        assert!(mean > 25.0 && mean < 31.0);
    }

    #[test]
    fn test_rejects_invalid_shapes() {
        let too_short = GeneratorConfig {
            spectral_length: MAX_ABSORPTION_WINDOW_NM,
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            SyntheticDataGenerator::with_config(too_short, 0),
            Err(AirsError::Config(_))
        ));

        let empty_image = GeneratorConfig {
            image_size: 0,
            ..GeneratorConfig::default()
        };
        assert!(SyntheticDataGenerator::with_config(empty_image, 0).is_err());

        let mut generator = SyntheticDataGenerator::new(0);
        assert!(generator.generate_rgb_images(0).is_err());
        assert!(generator.generate_hyperspectral(0).is_err());
    }

    #[test]
    fn test_sensor_cadence_bounds() {
        let every_second = GeneratorConfig {
            soil_readings_per_day: SECONDS_PER_DAY,
            ..GeneratorConfig::default()
        };
        assert!(every_second.validate().is_ok());

        let too_fast = GeneratorConfig {
            soil_readings_per_day: SECONDS_PER_DAY + 1,
            ..GeneratorConfig::default()
        };
        assert!(matches!(too_fast.validate(), Err(AirsError::Config(_))));

        let never = GeneratorConfig {
            storage_readings_per_day: 0,
            ..GeneratorConfig::default()
        };
        assert!(never.validate().is_err());

        let too_fast_storage = GeneratorConfig {
            storage_readings_per_day: 100_000,
            ..GeneratorConfig::default()
        };
        assert!(SyntheticDataGenerator::with_config(too_fast_storage, 0).is_err());
    }

    #[test]
    fn test_wavelength_axis_endpoints() {
        let axis = wavelength_axis(DEFAULT_SPECTRAL_LENGTH).unwrap();
        assert_eq!(axis[0], WAVELENGTH_MIN_NM);
        assert!((axis[axis.len() - 1] - WAVELENGTH_MAX_NM).abs() < 1e-9);
        let step = (WAVELENGTH_MAX_NM - WAVELENGTH_MIN_NM) / (DEFAULT_SPECTRAL_LENGTH - 1) as f64;
        assert!((axis[1] - axis[0] - step).abs() < 1e-9);
        assert!(axis.windows(2).all(|w| w[1] > w[0]));
    }
}
