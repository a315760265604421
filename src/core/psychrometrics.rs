//! Moist-air properties after the ASHRAE Handbook of Fundamentals (2017), ch. 1.
//!
//! Every path converges on the humidity ratio; the remaining properties are
//! derived from it. Temperatures are in ºC, pressures in Pa, humidity ratios in
//! kg of water per kg of dry air and enthalpy in kJ per kg of dry air.

use crate::core::solvers::{bracketed_root, SolverSettings};
use crate::core::units::{celsius_to_kelvin, STANDARD_ATMOSPHERIC_PRESSURE};
use crate::errors::{AmbiguousInputError, PsychrometricError};
use rayon::prelude::*;

/// Ratio of the molecular weights of water vapour and dry air.
const MOLECULAR_WEIGHT_RATIO: f64 = 0.621945;
/// Gas constant of dry air, J/(kg.K).
const R_DRY_AIR: f64 = 287.042;
const MIN_TEMPERATURE: f64 = -100.;
const MAX_TEMPERATURE: f64 = 200.;
const TRIPLE_POINT_WATER: f64 = 0.01;

/// The single moisture measure accompanying a dry-bulb temperature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HumidityInput {
    /// Fraction, 0 to 1 (values slightly above 1 are over-saturated readings)
    RelativeHumidity(f64),
    WetBulb(f64),
    DewPoint(f64),
    HumidityRatio(f64),
}

impl HumidityInput {
    /// Build an input from optional candidates, requiring exactly one to be set.
    pub fn from_options(
        relative_humidity: Option<f64>,
        wet_bulb: Option<f64>,
        dew_point: Option<f64>,
        humidity_ratio: Option<f64>,
    ) -> Result<Self, AmbiguousInputError> {
        let candidates = [
            relative_humidity.map(Self::RelativeHumidity),
            wet_bulb.map(Self::WetBulb),
            dew_point.map(Self::DewPoint),
            humidity_ratio.map(Self::HumidityRatio),
        ];
        let mut supplied = candidates.into_iter().flatten();

        match (supplied.next(), supplied.count()) {
            (Some(input), 0) => Ok(input),
            (None, _) => Err(AmbiguousInputError { supplied: 0 }),
            (Some(_), extra) => Err(AmbiguousInputError {
                supplied: extra + 1,
            }),
        }
    }
}

/// The full psychrometric state of one air sample.
///
/// Wet bulb and dew point lie at or below the dry bulb except for
/// over-saturated samples (relative humidity above 1), where both rise above
/// it. See [`DerivedRecord::is_supersaturated`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedRecord {
    pub dry_bulb: f64,
    pub pressure: f64,
    pub humidity_ratio: f64,
    /// Fraction, normally 0 to 1
    pub relative_humidity: f64,
    pub wet_bulb: f64,
    /// `None` when the air holds too little vapour for a dew point to exist
    /// within -100ºC (perfectly dry air in particular)
    pub dew_point: Option<f64>,
    pub enthalpy: f64,
    pub specific_volume: f64,
    pub vapour_pressure: f64,
}

impl DerivedRecord {
    /// Moist air density in kg of moist air per m³.
    pub fn density(&self) -> f64 {
        moist_air_density(self.humidity_ratio, self.specific_volume)
    }

    /// Holds more vapour than saturation allows at its dry bulb.
    pub fn is_supersaturated(&self) -> bool {
        self.relative_humidity > 1.
    }
}

/// Derive the full psychrometric state from a dry-bulb temperature, one moisture
/// measure and total pressure. Pressure defaults to standard sea-level pressure.
pub fn compute(
    dry_bulb: f64,
    humidity_input: HumidityInput,
    pressure: Option<f64>,
    settings: &SolverSettings,
) -> Result<DerivedRecord, PsychrometricError> {
    check_temperature("dry-bulb temperature", dry_bulb)?;
    let pressure = pressure.unwrap_or(STANDARD_ATMOSPHERIC_PRESSURE);
    if !(pressure.is_finite() && pressure > 0.) {
        return Err(PsychrometricError::InvalidPressure(pressure));
    }

    let humidity_ratio = match humidity_input {
        HumidityInput::RelativeHumidity(rh) => {
            humidity_ratio_from_relative_humidity(dry_bulb, rh, pressure)?
        }
        HumidityInput::WetBulb(wet_bulb) => {
            humidity_ratio_from_wet_bulb(dry_bulb, wet_bulb, pressure)?
        }
        HumidityInput::DewPoint(dew_point) => saturation_humidity_ratio(dew_point, pressure)?,
        HumidityInput::HumidityRatio(w) => w,
    };
    if humidity_ratio.is_nan() || humidity_ratio < 0. {
        return Err(PsychrometricError::NegativeHumidityRatio(humidity_ratio));
    }

    let vapour_pressure = vapour_pressure_from_humidity_ratio(humidity_ratio, pressure);
    let relative_humidity = vapour_pressure / saturation_vapour_pressure(dry_bulb)?;

    let dew_point = match humidity_input {
        HumidityInput::DewPoint(dew_point) => Some(dew_point),
        _ => dew_point_from_vapour_pressure(vapour_pressure, settings)?,
    };
    let wet_bulb = match humidity_input {
        HumidityInput::WetBulb(wet_bulb) => wet_bulb,
        _ => wet_bulb_temperature(dry_bulb, humidity_ratio, dew_point, pressure, settings)?,
    };

    Ok(DerivedRecord {
        dry_bulb,
        pressure,
        humidity_ratio,
        relative_humidity,
        wet_bulb,
        dew_point,
        enthalpy: moist_air_enthalpy(dry_bulb, humidity_ratio),
        specific_volume: moist_air_specific_volume(dry_bulb, humidity_ratio, pressure)?,
        vapour_pressure,
    })
}

fn check_temperature(name: &'static str, value: f64) -> Result<(), PsychrometricError> {
    if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value) {
        Ok(())
    } else {
        Err(PsychrometricError::TemperatureOutOfRange { name, value })
    }
}

/// Saturation vapour pressure over ice (below the triple point) or liquid water,
/// ASHRAE Fundamentals (2017) ch. 1 eqs. 5 and 6.
pub fn saturation_vapour_pressure(temperature: f64) -> Result<f64, PsychrometricError> {
    check_temperature("temperature", temperature)?;
    Ok(saturation_vapour_pressure_in_range(temperature))
}

fn saturation_vapour_pressure_in_range(temperature: f64) -> f64 {
    let t = temperature + 273.15;

    let ln_pws = if temperature <= TRIPLE_POINT_WATER {
        -5.6745359e3 / t + 6.3925247 - 9.677843e-3 * t + 6.2215701e-7 * t.powi(2)
            + 2.0747825e-9 * t.powi(3)
            - 9.484024e-13 * t.powi(4)
            + 4.1635019 * t.ln()
    } else {
        -5.8002206e3 / t + 1.3914993 - 4.8640239e-2 * t + 4.1764768e-5 * t.powi(2)
            - 1.4452093e-8 * t.powi(3)
            + 6.5459673 * t.ln()
    };

    ln_pws.exp()
}

pub fn humidity_ratio_from_vapour_pressure(
    vapour_pressure: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    if vapour_pressure >= pressure {
        return Err(PsychrometricError::VapourPressureExceedsTotal {
            vapour_pressure,
            pressure,
        });
    }
    Ok(MOLECULAR_WEIGHT_RATIO * vapour_pressure / (pressure - vapour_pressure))
}

pub fn vapour_pressure_from_humidity_ratio(humidity_ratio: f64, pressure: f64) -> f64 {
    pressure * humidity_ratio / (MOLECULAR_WEIGHT_RATIO + humidity_ratio)
}

pub fn saturation_humidity_ratio(
    temperature: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    humidity_ratio_from_vapour_pressure(saturation_vapour_pressure(temperature)?, pressure)
}

/// `relative_humidity` is a fraction. A fraction of exactly 0 gives exactly 0.
pub fn humidity_ratio_from_relative_humidity(
    dry_bulb: f64,
    relative_humidity: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    if relative_humidity < 0. {
        return Err(PsychrometricError::NegativeRelativeHumidity(
            relative_humidity,
        ));
    }
    let vapour_pressure = relative_humidity * saturation_vapour_pressure(dry_bulb)?;
    humidity_ratio_from_vapour_pressure(vapour_pressure, pressure)
}

/// Humidity ratio implied by a psychrometer reading, ASHRAE Fundamentals (2017)
/// ch. 1 eqs. 33 and 35 (wet bulb above and below freezing respectively).
pub fn humidity_ratio_from_wet_bulb(
    dry_bulb: f64,
    wet_bulb: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    check_temperature("wet-bulb temperature", wet_bulb)?;
    let saturated_at_wet_bulb = saturation_humidity_ratio(wet_bulb, pressure)?;
    Ok(wet_bulb_energy_balance(
        dry_bulb,
        wet_bulb,
        saturated_at_wet_bulb,
    ))
}

fn wet_bulb_energy_balance(dry_bulb: f64, wet_bulb: f64, saturated_at_wet_bulb: f64) -> f64 {
    if wet_bulb >= 0. {
        ((2501. - 2.326 * wet_bulb) * saturated_at_wet_bulb - 1.006 * (dry_bulb - wet_bulb))
            / (2501. + 1.86 * dry_bulb - 4.186 * wet_bulb)
    } else {
        ((2830. - 0.24 * wet_bulb) * saturated_at_wet_bulb - 1.006 * (dry_bulb - wet_bulb))
            / (2830. + 1.86 * dry_bulb - 2.1 * wet_bulb)
    }
}

/// Temperature at which `vapour_pressure` saturates the air. Returns `None`
/// below the vapour pressure of saturation at -100ºC.
pub fn dew_point_from_vapour_pressure(
    vapour_pressure: f64,
    settings: &SolverSettings,
) -> Result<Option<f64>, PsychrometricError> {
    if vapour_pressure <= saturation_vapour_pressure_in_range(MIN_TEMPERATURE) {
        return Ok(None);
    }
    let ln_vapour_pressure = vapour_pressure.ln();

    let dew_point = bracketed_root(
        "dew-point temperature",
        |t| saturation_vapour_pressure_in_range(t).ln() - ln_vapour_pressure,
        MIN_TEMPERATURE,
        MAX_TEMPERATURE,
        settings,
    )?;

    Ok(Some(dew_point))
}

/// Wet-bulb temperature by energy balance, bracketed between dew point and
/// dry bulb (reversed for over-saturated air).
pub fn wet_bulb_temperature(
    dry_bulb: f64,
    humidity_ratio: f64,
    dew_point: Option<f64>,
    pressure: f64,
    settings: &SolverSettings,
) -> Result<f64, PsychrometricError> {
    let dew_point = dew_point.unwrap_or(MIN_TEMPERATURE);
    let (lower, upper) = if dew_point <= dry_bulb {
        (dew_point, dry_bulb)
    } else {
        (dry_bulb, dew_point)
    };
    if upper - lower < settings.tolerance {
        return Ok(dry_bulb);
    }

    let residual = |wet_bulb: f64| {
        let saturated = MOLECULAR_WEIGHT_RATIO * saturation_vapour_pressure_in_range(wet_bulb)
            / (pressure - saturation_vapour_pressure_in_range(wet_bulb));
        wet_bulb_energy_balance(dry_bulb, wet_bulb, saturated) - humidity_ratio
    };

    Ok(bracketed_root(
        "wet-bulb temperature",
        residual,
        lower,
        upper,
        settings,
    )?)
}

/// Moist air specific enthalpy in kJ per kg of dry air.
pub fn moist_air_enthalpy(dry_bulb: f64, humidity_ratio: f64) -> f64 {
    1.006 * dry_bulb + humidity_ratio * (2501. + 1.86 * dry_bulb)
}

/// Specific volume in m³ per kg of dry air, from the ideal-gas relation.
pub fn moist_air_specific_volume(
    dry_bulb: f64,
    humidity_ratio: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    let temperature_k = celsius_to_kelvin(dry_bulb).map_err(|_| {
        PsychrometricError::TemperatureOutOfRange {
            name: "dry-bulb temperature",
            value: dry_bulb,
        }
    })?;
    Ok(R_DRY_AIR * temperature_k * (1. + 1.607858 * humidity_ratio) / pressure)
}

/// Moist air density in kg of moist air per m³.
pub fn moist_air_density(humidity_ratio: f64, specific_volume: f64) -> f64 {
    (1. + humidity_ratio) / specific_volume
}

/// Ratio of the humidity ratio to that of saturated air at the same temperature.
pub fn degree_of_saturation(
    dry_bulb: f64,
    humidity_ratio: f64,
    pressure: f64,
) -> Result<f64, PsychrometricError> {
    Ok(humidity_ratio / saturation_humidity_ratio(dry_bulb, pressure)?)
}

/// Standard-atmosphere pressure at `elevation` metres, ASHRAE Fundamentals
/// (2017) ch. 1 eq. 3.
pub fn standard_atmosphere_pressure(elevation: f64) -> f64 {
    STANDARD_ATMOSPHERIC_PRESSURE * (1. - 2.25577e-5 * elevation).powf(5.2559)
}

/// Inputs for one hour of a batch computation. A missing dry-bulb temperature
/// or moisture measure leaves that hour without a derived state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PsychrometricSample {
    pub dry_bulb: Option<f64>,
    pub humidity: Option<HumidityInput>,
    pub pressure: Option<f64>,
}

/// Evaluate every sample independently. Each entry is `None` where inputs are
/// absent, otherwise that sample's own result; one failure never affects the
/// others.
pub fn compute_series(
    samples: &[PsychrometricSample],
    settings: &SolverSettings,
) -> Vec<Option<Result<DerivedRecord, PsychrometricError>>> {
    samples
        .par_iter()
        .map(|sample| {
            let dry_bulb = sample.dry_bulb?;
            let humidity = sample.humidity?;
            Some(compute(dry_bulb, humidity, sample.pressure, settings))
        })
        .collect()
}
