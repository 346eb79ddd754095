//! Tabular seed-quality records and the closed-form quality indices
//!
//! Records are read from CSV files with one row per observation period. The
//! required columns are looked up by header name; a missing column is a hard
//! error. Empty pathogen readings go through an explicit [`MissingValuePolicy`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::{AirsError, Result};
use crate::{HIGH_RISK_THRESHOLD, QUALITY_THRESHOLD};

pub const GERMINATION_COLUMN: &str = "Germination (%)";
pub const VIGOUR_COLUMN: &str = "Vigour index";
pub const MOISTURE_COLUMN: &str = "Moisture content (%)";
pub const PATHOGEN_COLUMN: &str = "Pathogen infestation (%)";
pub const EC_COLUMN: &str = "Electrical conductivity (dS/m)";

const REQUIRED_COLUMNS: [&str; 5] = [
    GERMINATION_COLUMN,
    VIGOUR_COLUMN,
    MOISTURE_COLUMN,
    PATHOGEN_COLUMN,
    EC_COLUMN,
];

/// What to do with an empty pathogen-infestation reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingValuePolicy {
    /// Treat the reading as 0% infestation
    #[default]
    ZeroFill,
    /// Fail on the first empty reading
    Reject,
}

/// One observation period of a seed lot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedQualityRecord {
    pub germination_percent: f64,
    pub vigour_index: f64,
    pub moisture_percent: f64,
    pub pathogen_percent: f64,
    /// Electrical conductivity (dS/m)
    pub ec: f64,
}

fn clip(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

impl SeedQualityRecord {
    /// Weighted health score: germination 40%, vigour 30% (5000 maps to 100),
    /// moisture closeness to 8% at 15%, pathogen absence at 15%
    pub fn seed_health_index(&self) -> f64 {
        let vigour = clip(self.vigour_index / 5000.0 * 100.0);
        let moisture = clip(100.0 - (self.moisture_percent - 8.0).abs() * 10.0);
        let pathogen = clip(100.0 - self.pathogen_percent * 10.0);
        clip(0.4 * self.germination_percent + 0.3 * vigour + 0.15 * moisture + 0.15 * pathogen)
    }

    /// Weighted risk score: moisture above 7% at 50%, pathogen at 35%,
    /// EC above 0.5 dS/m at 15%
    pub fn aflatoxin_risk_score(&self) -> f64 {
        let moisture = clip((self.moisture_percent - 7.0) * 15.0);
        let pathogen = clip(self.pathogen_percent * 10.0);
        let ec = clip((self.ec - 0.5) * 40.0);
        clip(0.5 * moisture + 0.35 * pathogen + 0.15 * ec)
    }
}

/// Summary over a set of records
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub records: usize,
    pub mean_shi: f64,
    pub mean_ars: f64,
    /// Fraction of records with SHI at or above the quality threshold
    pub quality_fraction: f64,
    /// Fraction of records with ARS at or above the high-risk threshold
    pub high_risk_fraction: f64,
}

impl QualitySummary {
    pub fn from_records(records: &[SeedQualityRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(AirsError::Dataset("no quality records to summarise".to_string()));
        }
        let n = records.len() as f64;
        let shi: Vec<f64> = records.iter().map(|r| r.seed_health_index()).collect();
        let ars: Vec<f64> = records.iter().map(|r| r.aflatoxin_risk_score()).collect();

        Ok(Self {
            records: records.len(),
            mean_shi: shi.iter().sum::<f64>() / n,
            mean_ars: ars.iter().sum::<f64>() / n,
            quality_fraction: shi.iter().filter(|&&s| s >= QUALITY_THRESHOLD).count() as f64 / n,
            high_risk_fraction: ars.iter().filter(|&&a| a >= HIGH_RISK_THRESHOLD).count() as f64 / n,
        })
    }
}

/// Load quality records from a CSV file
pub fn load_quality_csv(path: &Path, policy: MissingValuePolicy) -> Result<Vec<SeedQualityRecord>> {
    if !path.exists() {
        return Err(AirsError::PathNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let records = read_quality_records(file, &path.display().to_string(), policy)?;
    info!("Loaded {} quality records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse quality records from any CSV source
pub fn read_quality_records<R: Read>(
    reader: R,
    source_name: &str,
    policy: MissingValuePolicy,
) -> Result<Vec<SeedQualityRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut columns = [0usize; 5];
    for (slot, name) in columns.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AirsError::MissingColumn {
                column: name.to_string(),
                source_name: source_name.to_string(),
            })?;
    }

    let mut records = Vec::new();
    let mut zero_filled = 0usize;
    for (row, result) in csv_reader.records().enumerate() {
        let record = result?;
        let cell = |col: usize| record.get(columns[col]).unwrap_or("");
        let required = |col: usize| -> Result<f64> {
            parse_cell(cell(col))?.ok_or_else(|| {
                AirsError::Dataset(format!(
                    "{}: empty '{}' in row {}",
                    source_name,
                    REQUIRED_COLUMNS[col],
                    row + 1
                ))
            })
        };

        let pathogen_percent = match (parse_cell(cell(3))?, policy) {
            (Some(value), _) => value,
            (None, MissingValuePolicy::ZeroFill) => {
                zero_filled += 1;
                0.0
            }
            (None, MissingValuePolicy::Reject) => {
                return Err(AirsError::Dataset(format!(
                    "{}: empty '{}' in row {}",
                    source_name,
                    PATHOGEN_COLUMN,
                    row + 1
                )))
            }
        };

        records.push(SeedQualityRecord {
            germination_percent: required(0)?,
            vigour_index: required(1)?,
            moisture_percent: required(2)?,
            pathogen_percent,
            ec: required(4)?,
        });
    }

    if zero_filled > 0 {
        warn!(
            "{}: {} empty '{}' readings filled with 0",
            source_name, zero_filled, PATHOGEN_COLUMN
        );
    }
    Ok(records)
}

/// Parse a numeric cell; empty and NaN cells are `None`
fn parse_cell(raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let value: f64 = raw
        .parse()
        .map_err(|_| AirsError::Dataset(format!("not a number: '{}'", raw)))?;
    Ok(if value.is_nan() { None } else { Some(value) })
}
