//! Synthetic sensor time series: soil probes, storage IoT units and daily weather
//!
//! Every channel is a seasonal or diurnal sinusoid plus Gaussian noise, clipped
//! to a physically plausible range. Storage units additionally carry spoilage
//! events that switch the VOC flag on for good and ramp CO₂ upward.

use std::f64::consts::TAU;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::prelude::*;
use rand_distr::Exp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::generator::{normal, SyntheticDataGenerator, SECONDS_PER_DAY};
use crate::utils::error::{AirsError, Result};

/// First day on which a storage unit may start to spoil
pub const SPOILAGE_EARLIEST_DAY: usize = 30;

/// Maximum CO₂ increase reached at the end of a spoilage ramp (ppm)
const SPOILAGE_CO2_RAMP_PPM: f64 = 500.0;

fn soil_start() -> Result<NaiveDateTime> {
    start_of(2023, 6, 1)
}

fn storage_start() -> Result<NaiveDateTime> {
    start_of(2023, 11, 1)
}

fn start_of(year: i32, month: u32, day: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| AirsError::Config(format!("invalid date {}-{}-{}", year, month, day)))
}

fn timestamps(start: NaiveDateTime, n_days: usize, readings_per_day: usize) -> Vec<NaiveDateTime> {
    let step = (SECONDS_PER_DAY / readings_per_day) as i64;
    (0..n_days * readings_per_day)
        .map(|i| start + Duration::seconds(step * i as i64))
        .collect()
}

fn ensure_positive(value: usize, what: &str) -> Result<()> {
    if value == 0 {
        return Err(AirsError::Config(format!("{} must be positive", what)));
    }
    Ok(())
}

/// One soil probe's readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSeries {
    pub sensor_id: usize,
    pub timestamps: Vec<NaiveDateTime>,
    /// Volumetric water content (%)
    pub moisture_vwc: Vec<f64>,
    pub temperature_c: Vec<f64>,
    /// Electrical conductivity (dS/m)
    pub ec: Vec<f64>,
}

/// One storage unit's readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSeries {
    pub unit_id: usize,
    /// Whether the unit is temperature controlled
    pub controlled: bool,
    pub readings_per_day: usize,
    pub timestamps: Vec<NaiveDateTime>,
    pub temperature_c: Vec<f64>,
    pub rh_percent: Vec<f64>,
    pub co2_ppm: Vec<f64>,
    /// Volatile organic compound alarm, 0 or 1
    pub voc: Vec<u8>,
    /// Days on which spoilage started, ascending
    pub spoilage_onset_days: Vec<usize>,
}

impl StorageSeries {
    /// Index of the first reading after which VOC stays on
    pub fn spoilage_onset_index(&self) -> Option<usize> {
        self.spoilage_onset_days
            .first()
            .map(|&day| day * self.readings_per_day)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// One day of weather
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    pub date: NaiveDate,
    pub temp_max_c: f64,
    pub temp_min_c: f64,
    pub precipitation_mm: f64,
    pub rh_mean_percent: f64,
    /// Solar radiation (MJ/m²/day)
    pub solar_radiation: f64,
    /// Wind speed (km/h)
    pub wind_speed: f64,
}

impl SyntheticDataGenerator {
    /// Soil moisture, temperature and EC for `n_sensors` probes over `n_days`.
    ///
    /// Moisture and EC follow a 30-day cycle, temperature a yearly cycle plus a
    /// diurnal swing.
    pub fn generate_soil_series(&mut self, n_days: usize, n_sensors: usize) -> Result<Vec<SoilSeries>> {
        ensure_positive(n_days, "n_days")?;
        ensure_positive(n_sensors, "n_sensors")?;
        let per_day = self.config().soil_readings_per_day;
        let start = soil_start()?;
        let moisture_noise = normal(0.0, 5.0)?;
        let temp_noise = normal(0.0, 1.0)?;
        let ec_noise = normal(0.0, 0.2)?;

        let mut sensors = Vec::with_capacity(n_sensors);
        for sensor_id in 0..n_sensors {
            let n = n_days * per_day;
            let mut moisture_vwc = Vec::with_capacity(n);
            let mut temperature_c = Vec::with_capacity(n);
            let mut ec = Vec::with_capacity(n);

            for i in 0..n {
                let day = i as f64 / per_day as f64;
                let monthly = (TAU * day / 30.0).sin();

                let m = 50.0 + 20.0 * monthly + moisture_noise.sample(&mut self.rng);
                moisture_vwc.push(m.clamp(20.0, 80.0));

                let t = 25.0
                    + 5.0 * (TAU * day / 365.0).sin()
                    + 3.0 * (TAU * i as f64 / per_day as f64).sin()
                    + temp_noise.sample(&mut self.rng);
                temperature_c.push(t);

                let e = 1.5 + 0.5 * monthly + ec_noise.sample(&mut self.rng);
                ec.push(e.clamp(0.5, 3.0));
            }

            sensors.push(SoilSeries {
                sensor_id,
                timestamps: timestamps(start, n_days, per_day),
                moisture_vwc,
                temperature_c,
                ec,
            });
        }

        debug!("Generated soil series: {} sensors x {} days", n_sensors, n_days);
        Ok(sensors)
    }

    /// Storage IoT streams for `n_units` units over `n_days`.
    ///
    /// Each unit spoils once or twice on distinct days from day 30 on. From
    /// every onset CO₂ ramps linearly by up to 500 ppm until the end of the
    /// series, and VOC flips to 1 at the earliest onset and never returns to 0.
    pub fn generate_storage_series(&mut self, n_days: usize, n_units: usize) -> Result<Vec<StorageSeries>> {
        ensure_positive(n_units, "n_units")?;
        if n_days <= SPOILAGE_EARLIEST_DAY {
            return Err(AirsError::Config(format!(
                "storage series need more than {} days to place spoilage events, got {}",
                SPOILAGE_EARLIEST_DAY, n_days
            )));
        }
        let per_day = self.config().storage_readings_per_day;
        let controlled_p = self.config().controlled_storage_probability;
        let start = storage_start()?;
        let controlled_noise = normal(0.0, 1.0)?;
        let ambient_noise = normal(0.0, 2.0)?;
        let rh_noise = normal(0.0, 3.0)?;
        let co2_noise = normal(0.0, 50.0)?;

        let n = n_days * per_day;
        let mut units = Vec::with_capacity(n_units);
        for unit_id in 0..n_units {
            let controlled = self.rng.gen_bool(controlled_p);

            let mut temperature_c = Vec::with_capacity(n);
            let mut rh_percent = Vec::with_capacity(n);
            let mut co2_ppm = Vec::with_capacity(n);
            for i in 0..n {
                let diurnal = (TAU * i as f64 / per_day as f64).sin();
                let t = if controlled {
                    22.0 + controlled_noise.sample(&mut self.rng)
                } else {
                    25.0 + 5.0 * diurnal + ambient_noise.sample(&mut self.rng)
                };
                temperature_c.push(t);
                let rh = 65.0 + 10.0 * diurnal + rh_noise.sample(&mut self.rng);
                rh_percent.push(rh.clamp(40.0, 85.0));
                co2_ppm.push(400.0 + co2_noise.sample(&mut self.rng));
            }

            let candidate_days = n_days - SPOILAGE_EARLIEST_DAY;
            let n_events = self.rng.gen_range(1..=2).min(candidate_days);
            let mut spoilage_onset_days: Vec<usize> = (SPOILAGE_EARLIEST_DAY..n_days)
                .choose_multiple(&mut self.rng, n_events);
            spoilage_onset_days.sort_unstable();

            for &day in &spoilage_onset_days {
                let onset = day * per_day;
                let ramp_len = n - onset;
                for (k, co2) in co2_ppm[onset..].iter_mut().enumerate() {
                    let frac = if ramp_len > 1 {
                        k as f64 / (ramp_len - 1) as f64
                    } else {
                        0.0
                    };
                    *co2 += SPOILAGE_CO2_RAMP_PPM * frac;
                }
            }
            for co2 in co2_ppm.iter_mut() {
                *co2 = co2.clamp(400.0, 2000.0);
            }

            let onset = spoilage_onset_days
                .first()
                .map(|&d| d * per_day)
                .unwrap_or(n);
            let voc: Vec<u8> = (0..n).map(|i| u8::from(i >= onset)).collect();

            units.push(StorageSeries {
                unit_id,
                controlled,
                readings_per_day: per_day,
                timestamps: timestamps(start, n_days, per_day),
                temperature_c,
                rh_percent,
                co2_ppm,
                voc,
                spoilage_onset_days,
            });
        }

        debug!("Generated storage series: {} units x {} days", n_units, n_days);
        Ok(units)
    }

    /// Daily weather starting 2023-06-01 with a 120-day seasonal cycle.
    pub fn generate_weather(&mut self, n_days: usize) -> Result<Vec<WeatherDay>> {
        ensure_positive(n_days, "n_days")?;
        let start = soil_start()?.date();
        let tmax_noise = normal(0.0, 2.0)?;
        let tmin_noise = normal(0.0, 1.0)?;
        let rh_noise = normal(0.0, 5.0)?;
        let solar_noise = normal(0.0, 2.0)?;
        let exp_mean_two =
            Exp::new(0.5).map_err(|e| AirsError::Config(format!("invalid exponential: {}", e)))?;

        let mut days = Vec::with_capacity(n_days);
        for d in 0..n_days {
            let season = (TAU * d as f64 / 120.0).sin();

            let temp_max_c = 32.0 + 5.0 * season + tmax_noise.sample(&mut self.rng);
            let temp_min_c = temp_max_c - 8.0 + tmin_noise.sample(&mut self.rng);

            let rain: f64 = exp_mean_two.sample(&mut self.rng);
            let precipitation_mm = if rain > 20.0 { 0.0 } else { rain };

            let rh = 70.0 - (temp_max_c - 25.0) * 2.0 + rh_noise.sample(&mut self.rng);
            let solar = 20.0 + 5.0 * season + solar_noise.sample(&mut self.rng);
            let wind = 5.0 + exp_mean_two.sample(&mut self.rng);

            days.push(WeatherDay {
                date: start + Duration::days(d as i64),
                temp_max_c,
                temp_min_c,
                precipitation_mm,
                rh_mean_percent: rh.clamp(40.0, 90.0),
                solar_radiation: solar.clamp(10.0, 30.0),
                wind_speed: wind.clamp(2.0, 15.0),
            });
        }

        debug!("Generated {} days of weather", n_days);
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::generator::GeneratorConfig;

    fn generator(seed: u64) -> SyntheticDataGenerator {
        let config = GeneratorConfig {
            storage_readings_per_day: 24,
            soil_readings_per_day: 24,
            ..GeneratorConfig::default()
        };
        SyntheticDataGenerator::with_config(config, seed).unwrap()
    }

    #[test]
    fn test_soil_ranges_and_cadence() {
        let mut gen = generator(1);
        let sensors = gen.generate_soil_series(10, 2).unwrap();

        assert_eq!(sensors.len(), 2);
        for s in &sensors {
            assert_eq!(s.timestamps.len(), 240);
            assert!(s.moisture_vwc.iter().all(|m| (20.0..=80.0).contains(m)));
            assert!(s.ec.iter().all(|e| (0.5..=3.0).contains(e)));
            assert_eq!(s.timestamps[1] - s.timestamps[0], Duration::hours(1));
        }
    }

    #[test]
    fn test_one_reading_per_second_gives_distinct_timestamps() {
        let config = GeneratorConfig {
            soil_readings_per_day: SECONDS_PER_DAY,
            ..GeneratorConfig::default()
        };
        let mut gen = SyntheticDataGenerator::with_config(config, 2).unwrap();
        let sensors = gen.generate_soil_series(1, 1).unwrap();
        let stamps = &sensors[0].timestamps;
        assert_eq!(stamps.len(), SECONDS_PER_DAY);
        assert!(stamps.windows(2).all(|w| w[1] - w[0] == Duration::seconds(1)));
    }

    #[test]
    fn test_storage_voc_is_step_function() {
        let mut gen = generator(8);
        let units = gen.generate_storage_series(60, 6).unwrap();

        for unit in &units {
            assert!(!unit.spoilage_onset_days.is_empty());
            assert!(unit.spoilage_onset_days.len() <= 2);
            assert!(unit
                .spoilage_onset_days
                .iter()
                .all(|&d| (SPOILAGE_EARLIEST_DAY..60).contains(&d)));

            let onset = unit.spoilage_onset_index().unwrap();
            for (i, &flag) in unit.voc.iter().enumerate() {
                assert_eq!(flag, u8::from(i >= onset), "unit {} reading {}", unit.unit_id, i);
            }
        }
    }

    #[test]
    fn test_storage_channel_ranges() {
        let mut gen = generator(4);
        let units = gen.generate_storage_series(40, 3).unwrap();
        for unit in &units {
            assert!(unit.co2_ppm.iter().all(|c| (400.0..=2000.0).contains(c)));
            assert!(unit.rh_percent.iter().all(|r| (40.0..=85.0).contains(r)));
            let onset = unit.spoilage_onset_index().unwrap();
            let before: f64 = unit.co2_ppm[..onset].iter().sum::<f64>() / onset as f64;
            let tail = &unit.co2_ppm[unit.len() - 24..];
            let after: f64 = tail.iter().sum::<f64>() / tail.len() as f64;
            assert!(after > before);
        }
    }

    #[test]
    fn test_storage_requires_room_for_spoilage() {
        let mut gen = generator(0);
        assert!(matches!(
            gen.generate_storage_series(SPOILAGE_EARLIEST_DAY, 1),
            Err(AirsError::Config(_))
        ));
        assert_eq!(gen.generate_storage_series(31, 1).unwrap()[0].spoilage_onset_days, vec![30]);
    }

    #[test]
    fn test_weather_ranges() {
        let mut gen = generator(3);
        let days = gen.generate_weather(120).unwrap();

        assert_eq!(days.len(), 120);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        for day in &days {
            assert!(day.temp_min_c < day.temp_max_c + 5.0);
            assert!((0.0..=20.0).contains(&day.precipitation_mm));
            assert!((40.0..=90.0).contains(&day.rh_mean_percent));
            assert!((10.0..=30.0).contains(&day.solar_radiation));
            assert!((2.0..=15.0).contains(&day.wind_speed));
        }
    }

    #[test]
    fn test_series_are_deterministic() {
        let a = generator(99).generate_storage_series(35, 2).unwrap();
        let b = generator(99).generate_storage_series(35, 2).unwrap();
        assert_eq!(a, b);
    }
}
