//! Assembles observed and derived hourly quantities into one row-aligned table.

use crate::config::AnalysisConfig;
use crate::core::psychrometrics::{
    compute_series, standard_atmosphere_pressure, DerivedRecord, HumidityInput,
    PsychrometricSample,
};
use crate::core::solar::{hourly_solar_positions, irradiance_on_surfaces, OrientedIrradiance};
use crate::core::units::GRAMS_PER_KILOGRAM;
use crate::core::wind::{adjust_height, classify_direction, SectorClassification, WindSample};
use crate::errors::{PsychrometricError, RecordError, RecordErrorKind, WindInputError};
use crate::missing_values::HourlyRecord;
use crate::read_weather_file::{EpwField, LocationMetadata};
use chrono::NaiveDateTime;
use csv::WriterBuilder;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::io::Write;
use tracing::{debug, instrument, warn};

pub const TIMESTAMP_COLUMN: &str = "Timestamp";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

const OBSERVED_FIELDS: [EpwField; 11] = [
    EpwField::DryBulbTemperature,
    EpwField::DewPointTemperature,
    EpwField::RelativeHumidity,
    EpwField::AtmosphericStationPressure,
    EpwField::GlobalHorizontalRadiation,
    EpwField::DirectNormalRadiation,
    EpwField::DiffuseHorizontalRadiation,
    EpwField::WindDirection,
    EpwField::WindSpeed,
    EpwField::TotalSkyCover,
    EpwField::OpaqueSkyCover,
];

pub const HUMIDITY_RATIO_COLUMN: &str = "Humidity Ratio (g/kg)";
pub const ENTHALPY_COLUMN: &str = "Enthalpy (kJ/kg)";
pub const WET_BULB_COLUMN: &str = "Wet Bulb Temperature (°C)";
pub const CALCULATED_DEW_POINT_COLUMN: &str = "Calculated Dew Point Temperature (°C)";
pub const SPECIFIC_VOLUME_COLUMN: &str = "Specific Volume (m³/kg)";
pub const SOLAR_ZENITH_COLUMN: &str = "Solar Zenith (°)";
pub const SOLAR_AZIMUTH_COLUMN: &str = "Solar Azimuth (°)";
pub const ADJUSTED_WIND_SPEED_COLUMN: &str = "Adjusted Wind Speed (m/s)";
pub const WIND_SECTOR_COLUMN: &str = "Wind Direction Sector";
pub const WIND_SECTOR_LABEL_COLUMN: &str = "Wind Direction Sector Label";

pub fn surface_irradiation_column(orientation: f64, tilt: f64) -> String {
    format!("Surface Irradiation {orientation}° tilt {tilt}° (Wh/m²)")
}

/// One column of the table; `None` marks an hour with no value.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Number(Vec<Option<f64>>),
    Index(Vec<Option<usize>>),
    Label(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Number(values) => values.len(),
            Column::Index(values) => values.len(),
            Column::Label(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, row: usize) -> String {
        match self {
            Column::Number(values) => values[row].map(|v| v.to_string()),
            Column::Index(values) => values[row].map(|v| v.to_string()),
            Column::Label(values) => values[row].clone(),
        }
        .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeatherTable {
    timestamps: Vec<NaiveDateTime>,
    columns: IndexMap<String, Column>,
}

impl WeatherTable {
    fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timestamps,
            columns: IndexMap::new(),
        }
    }

    fn push_column(&mut self, name: impl Into<String>, column: Column) {
        debug_assert_eq!(column.len(), self.timestamps.len());
        self.columns.insert(name.into(), column);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Column headings in output order, starting with the timestamp.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(TIMESTAMP_COLUMN).chain(self.columns.keys().map(String::as_str))
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn numbers(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.columns.get(name)? {
            Column::Number(values) => Some(values),
            _ => None,
        }
    }

    /// CSV with one heading row. Absent values are written as empty cells.
    pub fn write_csv(&self, writer: impl Write) -> anyhow::Result<()> {
        let mut writer = WriterBuilder::new().from_writer(writer);
        writer.write_record(self.column_names())?;

        for (row, timestamp) in self.timestamps.iter().enumerate() {
            let mut record = vec![timestamp.format(TIMESTAMP_FORMAT).to_string()];
            record.extend(self.columns.values().map(|column| column.cell(row)));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// The table together with what the run-level summaries need from it.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledSeries {
    pub table: WeatherTable,
    pub psychrometrics: Vec<Option<DerivedRecord>>,
    /// Per hour, one entry per configured surface in configuration order.
    pub surface_irradiance: Vec<Option<Vec<OrientedIrradiance>>>,
    /// Row-aligned, at target height. `None` where speed or direction is
    /// absent or the height adjustment failed.
    pub wind_samples: Vec<Option<WindSample>>,
    /// The same hours as `wind_samples`, at measurement height.
    pub measured_wind_samples: Vec<Option<WindSample>>,
    pub record_errors: Vec<RecordError>,
}

struct WindDerivation {
    adjusted_speed: Option<Result<f64, WindInputError>>,
    sector: Option<Result<SectorClassification, WindInputError>>,
}

#[instrument(skip_all)]
pub fn assemble(
    records: &[HourlyRecord],
    location: &LocationMetadata,
    config: &AnalysisConfig,
) -> AssembledSeries {
    let timestamps = records
        .iter()
        .map(|record| record.timestamp)
        .collect::<Vec<_>>();
    let fallback_pressure = standard_atmosphere_pressure(location.elevation);

    let samples = records
        .iter()
        .map(|record| psychrometric_sample(record, fallback_pressure))
        .collect::<Vec<_>>();
    let psychrometric_results = compute_series(&samples, &config.solver);

    let positions = hourly_solar_positions(&timestamps, location);
    let irradiance = records
        .par_iter()
        .zip(&positions)
        .map(|(record, position)| {
            Some(irradiance_on_surfaces(
                record.direct_normal()?,
                record.diffuse_horizontal()?,
                record.global_horizontal()?,
                &config.surfaces,
                position,
                config.albedo,
            ))
        })
        .collect::<Vec<Option<Vec<OrientedIrradiance>>>>();

    let wind = records
        .par_iter()
        .map(|record| WindDerivation {
            adjusted_speed: record.wind_speed().map(|speed| {
                adjust_height(
                    speed,
                    config.measurement_height,
                    config.target_height,
                    &config.wind_profile,
                )
            }),
            sector: record.wind_direction().map(|direction| {
                classify_direction(direction, config.num_sectors, config.sector_alignment)
            }),
        })
        .collect::<Vec<_>>();

    let record_errors = collect_record_errors(records, &psychrometric_results, &wind);
    let psychrometrics = psychrometric_results
        .into_iter()
        .map(|result| result.and_then(Result::ok))
        .collect::<Vec<_>>();
    let supersaturated = psychrometrics
        .iter()
        .flatten()
        .filter(|state| state.is_supersaturated())
        .count();
    if supersaturated > 0 {
        warn!(
            hours = supersaturated,
            "over-saturated readings, wet bulb and dew point exceed dry bulb"
        );
    }
    let adjusted_speeds = wind
        .iter()
        .map(|derivation| derivation.adjusted_speed.clone().and_then(Result::ok))
        .collect::<Vec<_>>();
    let sectors = wind
        .into_iter()
        .map(|derivation| derivation.sector.and_then(Result::ok))
        .collect::<Vec<_>>();
    let (wind_samples, measured_wind_samples): (Vec<_>, Vec<_>) = adjusted_speeds
        .iter()
        .zip(records)
        .map(|(speed, record)| {
            let paired = (*speed)
                .zip(record.wind_speed())
                .zip(record.wind_direction());
            match paired {
                Some(((adjusted, measured), direction)) => (
                    Some(WindSample {
                        speed: adjusted,
                        direction,
                    }),
                    Some(WindSample {
                        speed: measured,
                        direction,
                    }),
                ),
                None => (None, None),
            }
        })
        .unzip();

    let mut table = WeatherTable::new(timestamps);
    for field in OBSERVED_FIELDS {
        table.push_column(
            field.name(),
            Column::Number(records.iter().map(|record| record.get(field)).collect()),
        );
    }

    let psychrometric_column = |value: fn(&DerivedRecord) -> Option<f64>| {
        Column::Number(
            psychrometrics
                .iter()
                .map(|state| state.as_ref().and_then(value))
                .collect(),
        )
    };
    table.push_column(
        HUMIDITY_RATIO_COLUMN,
        psychrometric_column(|state| Some(state.humidity_ratio * GRAMS_PER_KILOGRAM)),
    );
    table.push_column(
        ENTHALPY_COLUMN,
        psychrometric_column(|state| Some(state.enthalpy)),
    );
    table.push_column(
        WET_BULB_COLUMN,
        psychrometric_column(|state| Some(state.wet_bulb)),
    );
    table.push_column(
        CALCULATED_DEW_POINT_COLUMN,
        psychrometric_column(|state| state.dew_point),
    );
    table.push_column(
        SPECIFIC_VOLUME_COLUMN,
        psychrometric_column(|state| Some(state.specific_volume)),
    );

    table.push_column(
        SOLAR_ZENITH_COLUMN,
        Column::Number(positions.iter().map(|p| Some(p.zenith)).collect()),
    );
    table.push_column(
        SOLAR_AZIMUTH_COLUMN,
        Column::Number(positions.iter().map(|p| Some(p.azimuth)).collect()),
    );
    for (index, surface) in config.surfaces.iter().enumerate() {
        table.push_column(
            surface_irradiation_column(surface.orientation.angle(), surface.tilt),
            Column::Number(
                irradiance
                    .iter()
                    .map(|hour| hour.as_ref().map(|surfaces| surfaces[index].total))
                    .collect(),
            ),
        );
    }

    table.push_column(ADJUSTED_WIND_SPEED_COLUMN, Column::Number(adjusted_speeds));
    table.push_column(
        WIND_SECTOR_COLUMN,
        Column::Index(
            sectors
                .iter()
                .map(|sector| sector.as_ref().map(|s| s.index))
                .collect(),
        ),
    );
    table.push_column(
        WIND_SECTOR_LABEL_COLUMN,
        Column::Label(
            sectors
                .into_iter()
                .map(|sector| sector.map(|s| s.label))
                .collect(),
        ),
    );

    debug!(
        rows = table.len(),
        columns = table.columns.len() + 1,
        record_errors = record_errors.len(),
        "assembled weather table"
    );

    AssembledSeries {
        table,
        psychrometrics,
        surface_irradiance: irradiance,
        wind_samples,
        measured_wind_samples,
        record_errors,
    }
}

/// Relative humidity takes precedence over dew point as the moisture measure.
/// Without a station pressure the standard atmosphere at the site elevation is
/// used.
fn psychrometric_sample(record: &HourlyRecord, fallback_pressure: f64) -> PsychrometricSample {
    let humidity = record
        .relative_humidity()
        .map(|rh| HumidityInput::RelativeHumidity(rh / 100.))
        .or_else(|| record.dew_point().map(HumidityInput::DewPoint));

    PsychrometricSample {
        dry_bulb: record.dry_bulb(),
        humidity,
        pressure: Some(record.station_pressure().unwrap_or(fallback_pressure)),
    }
}

fn collect_record_errors(
    records: &[HourlyRecord],
    psychrometrics: &[Option<Result<DerivedRecord, PsychrometricError>>],
    wind: &[WindDerivation],
) -> Vec<RecordError> {
    let mut errors = vec![];
    for ((record, psychrometric), wind) in records.iter().zip(psychrometrics).zip(wind) {
        let failures = [
            psychrometric
                .as_ref()
                .and_then(|result| result.as_ref().err())
                .map(|e| RecordErrorKind::from(e.clone())),
            wind.adjusted_speed
                .as_ref()
                .and_then(|result| result.as_ref().err())
                .map(|e| RecordErrorKind::from(e.clone())),
            wind.sector
                .as_ref()
                .and_then(|result| result.as_ref().err())
                .map(|e| RecordErrorKind::from(e.clone())),
        ];
        errors.extend(failures.into_iter().flatten().map(|kind| RecordError {
            line: record.line,
            timestamp: record.timestamp,
            kind,
        }));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wind::WindProfile;
    use crate::missing_values::normalize;
    use crate::read_weather_file::parse_epw;
    use crate::read_weather_file::tests::{annual_epw_text, epw_text};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn assemble_text(text: &str, config: &AnalysisConfig) -> AssembledSeries {
        let epw = parse_epw(text.as_bytes()).unwrap();
        let series = normalize(&epw.records);
        assemble(&series.records, &epw.location, config)
    }

    #[fixture]
    fn annual() -> AssembledSeries {
        assemble_text(&annual_epw_text(), &AnalysisConfig::default())
    }

    #[rstest]
    fn should_lay_out_contract_columns(annual: AssembledSeries) {
        assert_eq!(
            annual.table.column_names().collect::<Vec<_>>(),
            vec![
                "Timestamp",
                "Dry Bulb Temperature (°C)",
                "Dew Point Temperature (°C)",
                "Relative Humidity (%)",
                "Atmospheric Station Pressure (Pa)",
                "Global Horizontal Radiation (Wh/m²)",
                "Direct Normal Radiation (Wh/m²)",
                "Diffuse Horizontal Radiation (Wh/m²)",
                "Wind Direction (°)",
                "Wind Speed (m/s)",
                "Total Sky Cover (tenths)",
                "Opaque Sky Cover (tenths)",
                "Humidity Ratio (g/kg)",
                "Enthalpy (kJ/kg)",
                "Wet Bulb Temperature (°C)",
                "Calculated Dew Point Temperature (°C)",
                "Specific Volume (m³/kg)",
                "Solar Zenith (°)",
                "Solar Azimuth (°)",
                "Surface Irradiation 0° tilt 90° (Wh/m²)",
                "Surface Irradiation 90° tilt 90° (Wh/m²)",
                "Surface Irradiation 180° tilt 90° (Wh/m²)",
                "Surface Irradiation 270° tilt 90° (Wh/m²)",
                "Adjusted Wind Speed (m/s)",
                "Wind Direction Sector",
                "Wind Direction Sector Label",
            ]
        );
        assert_eq!(annual.table.len(), 8760);
        assert!(annual.record_errors.is_empty());
    }

    #[rstest]
    fn should_derive_psychrometrics_for_every_hour(annual: AssembledSeries) {
        let humidity_ratios = annual.table.numbers(HUMIDITY_RATIO_COLUMN).unwrap();

        assert!(humidity_ratios.iter().all(|w| w.is_some_and(|w| w > 0.)));
        assert!(annual.psychrometrics.iter().all(|state| state
            .is_some_and(|state| state.wet_bulb <= state.dry_bulb)));
    }

    #[rstest]
    fn should_leave_night_surfaces_dark(annual: AssembledSeries) {
        let south = annual
            .table
            .numbers(&surface_irradiation_column(180., 90.))
            .unwrap();
        let zenith = annual.table.numbers(SOLAR_ZENITH_COLUMN).unwrap();

        for (irradiation, zenith) in south.iter().zip(zenith) {
            if zenith.unwrap() > 90. {
                assert_eq!(*irradiation, Some(0.));
            }
        }
        // midday in January on a south wall at 40ºN
        assert!(south[12].unwrap() > 300.);
    }

    #[rstest]
    fn should_keep_irradiance_components_per_surface(annual: AssembledSeries) {
        let south = annual
            .table
            .numbers(&surface_irradiation_column(180., 90.))
            .unwrap();
        // surfaces are N, E, S, W by default
        let midday = annual.surface_irradiance[12].as_ref().unwrap();

        assert_eq!(midday.len(), 4);
        assert_eq!(midday[2].total, south[12].unwrap());
        assert!(midday[2].direct > 0.);
        assert!(midday[2].diffuse > 0.);
        assert!(midday[2].ground_reflected > 0.);
        assert_relative_eq!(
            midday[2].direct + midday[2].diffuse + midday[2].ground_reflected,
            midday[2].total,
            max_relative = 1e-12
        );
    }

    #[rstest]
    fn should_mark_absent_inputs_absent_in_derived_columns() {
        let text = epw_text(false, 8760, |i| {
            let dry_bulb = if (100..103).contains(&i) { "99.9" } else { "12.0" };
            (dry_bulb.to_string(), "60".into(), "3.0".into())
        })
        .replacen(",400,500,100,", ",400,9999,100,", 1);

        let assembled = assemble_text(&text, &AnalysisConfig::default());

        let dry_bulb = assembled.table.numbers("Dry Bulb Temperature (°C)").unwrap();
        let enthalpy = assembled.table.numbers(ENTHALPY_COLUMN).unwrap();
        let absent = (0..8760).filter(|i| enthalpy[*i].is_none()).collect::<Vec<_>>();
        assert_eq!(absent, vec![100, 101, 102]);
        assert!(dry_bulb[100..103].iter().all(Option::is_none));
        assert!(assembled.record_errors.is_empty());

        // the first daytime hour lost its direct normal radiation
        let north = assembled
            .table
            .numbers(&surface_irradiation_column(0., 90.))
            .unwrap();
        assert_eq!(north[8], None);
        assert!(north[9].is_some());
    }

    #[rstest]
    fn should_adjust_wind_to_target_height() {
        let config = AnalysisConfig {
            target_height: 80.,
            wind_profile: WindProfile::PowerLaw {
                shear_coefficient: 0.14,
            },
            ..Default::default()
        };

        let assembled = assemble_text(&annual_epw_text(), &config);

        let observed = assembled.table.numbers("Wind Speed (m/s)").unwrap();
        let adjusted = assembled.table.numbers(ADJUSTED_WIND_SPEED_COLUMN).unwrap();
        assert_relative_eq!(
            adjusted[3].unwrap(),
            observed[3].unwrap() * 8f64.powf(0.14),
            max_relative = 1e-12
        );
        assert_eq!(assembled.wind_samples.iter().flatten().count(), 8760);
        let measured = assembled.measured_wind_samples[3].unwrap();
        let adjusted_sample = assembled.wind_samples[3].unwrap();
        assert_eq!(measured.speed, observed[3].unwrap());
        assert_eq!(measured.direction, adjusted_sample.direction);
        assert_eq!(adjusted_sample.speed, adjusted[3].unwrap());
    }

    #[rstest]
    fn should_report_per_record_failures_and_carry_on() {
        let text = epw_text(false, 8760, |i| {
            let speed = if i == 5 { "-2.0" } else { "3.0" };
            ("12.0".into(), "60".into(), speed.into())
        });

        let assembled = assemble_text(&text, &AnalysisConfig::default());

        assert_eq!(assembled.record_errors.len(), 1);
        assert_eq!(assembled.record_errors[0].line, 14);
        assert_eq!(
            assembled.record_errors[0].kind,
            RecordErrorKind::Wind(WindInputError::NegativeSpeed(-2.))
        );
        let adjusted = assembled.table.numbers(ADJUSTED_WIND_SPEED_COLUMN).unwrap();
        assert_eq!(adjusted[5], None);
        assert_eq!(adjusted[6], Some(3.));
        assert_eq!(assembled.wind_samples.iter().flatten().count(), 8759);
        assert_eq!(assembled.wind_samples[5], None);
        assert_eq!(assembled.measured_wind_samples[5], None);
    }

    #[rstest]
    fn should_write_absent_values_as_empty_cells() {
        let text = epw_text(false, 8760, |i| {
            let dry_bulb = if i == 0 { "99.9" } else { "12.0" };
            (dry_bulb.to_string(), "60".into(), "3.0".into())
        });
        let assembled = assemble_text(&text, &AnalysisConfig::default());

        let mut buffer = vec![];
        assembled.table.write_csv(&mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let mut lines = csv.lines();

        assert!(lines
            .next()
            .unwrap()
            .starts_with("Timestamp,Dry Bulb Temperature (°C),"));
        let first_row = lines.next().unwrap().split(',').collect::<Vec<_>>();
        assert_eq!(first_row[0], "2023-01-01 00:00");
        assert_eq!(first_row[1], "");
        assert_eq!(first_row[13], "");
        assert_eq!(csv.lines().count(), 8761);
    }
}
