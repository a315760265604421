//! Wind resource calculations: vertical profile adjustment, directional
//! sectors, Weibull fitting and the aggregate statistics reported per run.

use crate::core::solvers::{bracketed_root, SolverSettings};
use crate::core::units::wrap_degrees;
use crate::errors::{InsufficientDataError, WeibullFitError, WindInputError};
use crate::statistics;
use chrono::{Datelike, NaiveDateTime};
use itertools::Itertools;
use serde::Deserialize;
use statrs::function::gamma::gamma;
use std::collections::HashMap;
use strum_macros::Display;

const COMPASS_4: [&str; 4] = ["N", "E", "S", "W"];
const COMPASS_8: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
const COMPASS_16: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const WEIBULL_MIN_SAMPLES: usize = 2;
const WEIBULL_SHAPE_BRACKET: (f64, f64) = (0.01, 500.);
/// Empirical exponent of the Justus coefficient-of-variation estimator.
const MOMENTS_SHAPE_EXPONENT: f64 = -1.086;

/// Vertical wind profile used to move a speed between heights.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum WindProfile {
    /// v2 = v1 (z2/z1)^α
    PowerLaw { shear_coefficient: f64 },
    /// v2 = v1 ln(z2/z0) / ln(z1/z0)
    Logarithmic { roughness_length: f64 },
}

impl Default for WindProfile {
    fn default() -> Self {
        // open terrain
        Self::PowerLaw {
            shear_coefficient: 0.14,
        }
    }
}

pub fn adjust_height(
    speed: f64,
    from_height: f64,
    to_height: f64,
    profile: &WindProfile,
) -> Result<f64, WindInputError> {
    if from_height <= 0. || to_height <= 0. {
        return Err(WindInputError::NonPositiveHeight {
            from: from_height,
            to: to_height,
        });
    }
    if speed < 0. {
        return Err(WindInputError::NegativeSpeed(speed));
    }

    let ratio = match *profile {
        WindProfile::PowerLaw { shear_coefficient } => {
            (to_height / from_height).powf(shear_coefficient)
        }
        WindProfile::Logarithmic { roughness_length } => {
            if roughness_length <= 0. {
                return Err(WindInputError::NonPositiveRoughnessLength(roughness_length));
            }
            if from_height <= roughness_length || to_height <= roughness_length {
                return Err(WindInputError::BelowRoughnessLength {
                    from: from_height,
                    to: to_height,
                    roughness_length,
                });
            }
            (to_height / roughness_length).ln() / (from_height / roughness_length).ln()
        }
    };

    Ok(speed * ratio)
}

/// Where sector boundaries sit relative to North.
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SectorAlignment {
    /// Sector 1 starts at North and runs clockwise.
    #[default]
    Edge,
    /// Sector 1 is centred on North.
    Centered,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SectorClassification {
    /// 1-based
    pub index: usize,
    pub label: String,
}

/// Sector of a direction, 1..=num_sectors. Sector k covers the half-open
/// interval ((k-1)w, kw] clockwise from North, so a direction on a boundary
/// falls in the lower-indexed sector. Due North (0 or 360) is sector 1.
pub fn sector(direction: f64, num_sectors: usize) -> Result<usize, WindInputError> {
    check_sector_inputs(direction, num_sectors)?;
    let wrapped = wrap_degrees(direction);
    if wrapped == 0. {
        return Ok(1);
    }

    Ok(index_from_upper_edge(
        wrapped / sector_width(num_sectors),
        num_sectors,
    ))
}

/// Sector of a direction with bins centred on compass points: sector 1 covers
/// (-w/2, w/2]. Boundaries go to the clockwise-preceding sector.
pub fn sector_centered(direction: f64, num_sectors: usize) -> Result<usize, WindInputError> {
    check_sector_inputs(direction, num_sectors)?;
    let width = sector_width(num_sectors);

    Ok(index_from_upper_edge(
        wrap_degrees(direction + width / 2.) / width,
        num_sectors,
    ))
}

pub fn classify_direction(
    direction: f64,
    num_sectors: usize,
    alignment: SectorAlignment,
) -> Result<SectorClassification, WindInputError> {
    let index = match alignment {
        SectorAlignment::Edge => sector(direction, num_sectors)?,
        SectorAlignment::Centered => sector_centered(direction, num_sectors)?,
    };

    Ok(SectorClassification {
        index,
        label: sector_label(index, num_sectors),
    })
}

/// Compass name for 4, 8 or 16 sectors, naming the bearing where sector
/// `index` begins (edge alignment) or is centred (centred alignment).
pub fn sector_label(index: usize, num_sectors: usize) -> String {
    let names: &[&str] = match num_sectors {
        4 => &COMPASS_4,
        8 => &COMPASS_8,
        16 => &COMPASS_16,
        _ => &[],
    };

    names
        .get(index.wrapping_sub(1))
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("S{index}"))
}

fn check_sector_inputs(direction: f64, num_sectors: usize) -> Result<(), WindInputError> {
    if num_sectors == 0 {
        return Err(WindInputError::NoSectors);
    }
    if !direction.is_finite() {
        return Err(WindInputError::NonFiniteDirection(direction));
    }
    Ok(())
}

fn sector_width(num_sectors: usize) -> f64 {
    360. / num_sectors as f64
}

fn index_from_upper_edge(position: f64, num_sectors: usize) -> usize {
    match position.ceil() as usize {
        0 => num_sectors,
        index => index.min(num_sectors),
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeibullMethod {
    #[default]
    MaximumLikelihood,
    MethodOfMoments,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeibullParameters {
    /// k, dimensionless
    pub shape: f64,
    /// c, m/s
    pub scale: f64,
}

/// Fit a two-parameter Weibull distribution to the strictly positive speeds
/// in `speeds`. Calm hours (zero speed) are outside the distribution's support
/// and are left out of the fit.
pub fn fit_weibull(
    speeds: &[f64],
    method: WeibullMethod,
    settings: &SolverSettings,
) -> Result<WeibullParameters, WeibullFitError> {
    let positive = speeds
        .iter()
        .copied()
        .filter(|speed| *speed > 0. && speed.is_finite())
        .collect::<Vec<_>>();
    if positive.len() < WEIBULL_MIN_SAMPLES {
        return Err(InsufficientDataError::TooFewSamples {
            quantity: "Weibull fit",
            required: WEIBULL_MIN_SAMPLES,
            available: positive.len(),
        }
        .into());
    }
    let (min, max) = positive
        .iter()
        .copied()
        .minmax()
        .into_option()
        .unwrap_or_default();
    if is_close!(min, max, rel_tol = 1e-9) {
        return Err(InsufficientDataError::NoSpread {
            quantity: "Weibull fit",
        }
        .into());
    }

    match method {
        WeibullMethod::MaximumLikelihood => weibull_maximum_likelihood(&positive, max, settings),
        WeibullMethod::MethodOfMoments => weibull_method_of_moments(&positive),
    }
}

/// Solves the profile likelihood equation for k,
///   sum(x^k ln x) / sum(x^k) - 1/k - mean(ln x) = 0,
/// on speeds scaled by their maximum so that x^k cannot overflow.
fn weibull_maximum_likelihood(
    speeds: &[f64],
    max: f64,
    settings: &SolverSettings,
) -> Result<WeibullParameters, WeibullFitError> {
    let scaled = speeds.iter().map(|speed| speed / max).collect::<Vec<_>>();
    let logs = scaled.iter().map(|x| x.ln()).collect::<Vec<_>>();
    let mean_log = logs.iter().sum::<f64>() / logs.len() as f64;

    let likelihood_slope = |k: f64| {
        let (weighted_logs, weights) = scaled.iter().zip(&logs).fold(
            (0., 0.),
            |(weighted_logs, weights), (x, log)| {
                let weight = x.powf(k);
                (weighted_logs + weight * log, weights + weight)
            },
        );
        weighted_logs / weights - 1. / k - mean_log
    };

    let (lower, upper) = WEIBULL_SHAPE_BRACKET;
    let shape = bracketed_root("Weibull shape", likelihood_slope, lower, upper, settings)?;
    let mean_power = scaled.iter().map(|x| x.powf(shape)).sum::<f64>() / scaled.len() as f64;

    Ok(WeibullParameters {
        shape,
        scale: max * mean_power.powf(1. / shape),
    })
}

fn weibull_method_of_moments(speeds: &[f64]) -> Result<WeibullParameters, WeibullFitError> {
    let too_few = || InsufficientDataError::TooFewSamples {
        quantity: "Weibull fit",
        required: WEIBULL_MIN_SAMPLES,
        available: speeds.len(),
    };
    let mean = statistics::mean(speeds).ok_or_else(too_few)?;
    let std_dev = statistics::sample_std_dev(speeds).ok_or_else(too_few)?;

    let shape = (std_dev / mean).powf(MOMENTS_SHAPE_EXPONENT);

    Ok(WeibullParameters {
        shape,
        scale: mean / gamma(1. + 1. / shape),
    })
}

/// Mean power per unit swept area, ½ρ mean(v³), in W/m². Uses the mean of the
/// cubes, never the cube of the mean. Negative or non-finite speeds are skipped.
pub fn power_density(speeds: &[f64], air_density: f64) -> Result<f64, InsufficientDataError> {
    let usable = speeds
        .iter()
        .copied()
        .filter(|speed| *speed >= 0. && speed.is_finite())
        .collect::<Vec<_>>();
    let cubic_mean =
        statistics::cubic_mean(&usable).ok_or(InsufficientDataError::TooFewSamples {
            quantity: "power density",
            required: 1,
            available: 0,
        })?;

    Ok(0.5 * air_density * cubic_mean)
}

/// A paired speed (m/s) and direction (degrees from North) observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindSample {
    pub speed: f64,
    pub direction: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindStatisticsOptions<'a> {
    pub percentiles: &'a [usize],
    pub calm_threshold: f64,
    pub air_density: f64,
    pub weibull_method: WeibullMethod,
    pub solver: SolverSettings,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindStatistics {
    pub count: usize,
    pub mean_speed: f64,
    /// Undefined for a single sample.
    pub std_speed: Option<f64>,
    pub min_speed: f64,
    pub max_speed: f64,
    pub median_speed: f64,
    pub percentiles: Vec<(usize, f64)>,
    pub calm_percentage: f64,
    /// Vector-mean direction; undefined when the direction vectors cancel.
    pub mean_direction: Option<f64>,
    /// Circular standard deviation in degrees; undefined when the vectors cancel.
    pub direction_std: Option<f64>,
    pub weibull: Result<WeibullParameters, WeibullFitError>,
    pub power_density: Result<f64, InsufficientDataError>,
}

/// Aggregate statistics over a whole series. The Weibull fit and power density
/// fail independently of the rest; only an empty series fails outright.
pub fn wind_statistics(
    samples: &[WindSample],
    options: &WindStatisticsOptions,
) -> Result<WindStatistics, InsufficientDataError> {
    let speeds = samples.iter().map(|sample| sample.speed).collect::<Vec<_>>();
    let too_few = InsufficientDataError::TooFewSamples {
        quantity: "wind statistics",
        required: 1,
        available: 0,
    };
    let mean_speed = statistics::mean(&speeds).ok_or(too_few.clone())?;
    let min_speed = statistics::min(&speeds).ok_or(too_few.clone())?;
    let max_speed = statistics::max(&speeds).ok_or(too_few)?;

    let calm_count = speeds
        .iter()
        .filter(|speed| **speed < options.calm_threshold)
        .count();
    let (mean_direction, direction_std) = circular_statistics(samples);

    Ok(WindStatistics {
        count: samples.len(),
        mean_speed,
        std_speed: statistics::sample_std_dev(&speeds),
        min_speed,
        max_speed,
        median_speed: statistics::median(&speeds),
        percentiles: options
            .percentiles
            .iter()
            .map(|p| (*p, statistics::percentile(&speeds, *p)))
            .collect(),
        calm_percentage: 100. * calm_count as f64 / samples.len() as f64,
        mean_direction,
        direction_std,
        weibull: fit_weibull(&speeds, options.weibull_method, &options.solver),
        power_density: power_density(&speeds, options.air_density),
    })
}

/// Wind statistics for one calendar month of a series.
#[derive(Clone, Debug, PartialEq)]
pub struct MonthlyWindStatistics {
    pub year: i32,
    pub month: u32,
    pub statistics: Result<WindStatistics, InsufficientDataError>,
}

/// Statistics per calendar month, in series order. `samples` is row-aligned
/// with `timestamps`; hours without a sample are skipped, so a month with no
/// samples at all carries an error rather than disappearing.
pub fn monthly_wind_statistics(
    timestamps: &[NaiveDateTime],
    samples: &[Option<WindSample>],
    options: &WindStatisticsOptions,
) -> Vec<MonthlyWindStatistics> {
    let months = timestamps
        .iter()
        .zip(samples)
        .chunk_by(|(timestamp, _)| (timestamp.year(), timestamp.month()));

    months
        .into_iter()
        .map(|((year, month), hours)| {
            let month_samples = hours
                .filter_map(|(_, sample)| *sample)
                .collect::<Vec<_>>();
            MonthlyWindStatistics {
                year,
                month,
                statistics: wind_statistics(&month_samples, options),
            }
        })
        .collect()
}

fn circular_statistics(samples: &[WindSample]) -> (Option<f64>, Option<f64>) {
    let count = samples.len() as f64;
    let (sum_cos, sum_sin) = samples.iter().fold((0., 0.), |(c, s), sample| {
        let direction = sample.direction.to_radians();
        (c + direction.cos(), s + direction.sin())
    });
    let (u, v) = (sum_cos / count, sum_sin / count);
    let resultant_length = u.hypot(v);

    if is_close!(resultant_length, 0., abs_tol = 1e-12) {
        return (None, None);
    }

    (
        Some(wrap_degrees(v.atan2(u).to_degrees())),
        Some((-2. * resultant_length.ln()).sqrt().to_degrees()),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct WindRoseCell {
    pub sector: SectorClassification,
    /// Index into the speed bins, or None for speeds outside them.
    pub speed_bin: Option<usize>,
    pub speed_label: String,
    pub count: usize,
    /// Percentage of all samples.
    pub frequency: f64,
}

/// Joint frequency of direction sector and speed bin. Speed bins are
/// right-closed, (b[i], b[i+1]], except that the first also includes its lower
/// edge. Only populated cells are returned, ordered by sector then speed.
pub fn wind_rose(
    samples: &[WindSample],
    num_sectors: usize,
    alignment: SectorAlignment,
    speed_bins: &[f64],
) -> Result<Vec<WindRoseCell>, WindInputError> {
    if speed_bins.len() < 2 || !speed_bins.iter().tuple_windows().all(|(a, b)| a < b) {
        return Err(WindInputError::InvalidSpeedBins);
    }

    let mut counts: HashMap<(SectorClassification, Option<usize>), usize> = HashMap::new();
    for sample in samples {
        let sector = classify_direction(sample.direction, num_sectors, alignment)?;
        *counts
            .entry((sector, speed_bin(sample.speed, speed_bins)))
            .or_default() += 1;
    }

    let total = samples.len() as f64;
    Ok(counts
        .into_iter()
        .sorted_by_key(|((sector, bin), _)| (sector.index, bin.is_none(), *bin))
        .map(|((sector, speed_bin), count)| WindRoseCell {
            speed_label: speed_bin.map_or_else(
                || "Missing".to_string(),
                |bin| format!("{}-{}", speed_bins[bin], speed_bins[bin + 1]),
            ),
            sector,
            speed_bin,
            count,
            frequency: 100. * count as f64 / total,
        })
        .collect())
}

fn speed_bin(speed: f64, edges: &[f64]) -> Option<usize> {
    if speed == edges[0] {
        return Some(0);
    }
    edges
        .iter()
        .tuple_windows()
        .position(|(lower, upper)| speed > *lower && speed <= *upper)
}
