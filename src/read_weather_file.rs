//! Reader for EnergyPlus Weather (EPW) files.
//!
//! An EPW file has eight header lines followed by one 35-field row per hour.
//! The LOCATION header feeds the solar calculations; the other headers are
//! checked for structure, and the leap-year flag and data period they carry fix
//! how many rows the file must contain.

use crate::errors::{ParseError, ParseErrorKind};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder as CsvReaderBuilder, StringRecord};
use itertools::Itertools;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use strum::{EnumCount, EnumIter, IntoEnumIterator};
use tracing::{debug, info, instrument};

pub const FIELDS_PER_ROW: usize = 35;

const COLUMN_YEAR: usize = 0;
const COLUMN_MONTH: usize = 1;
const COLUMN_DAY: usize = 2;
const COLUMN_HOUR: usize = 3;
const COLUMN_MINUTE: usize = 4;
const COLUMN_UNCERTAINTY_FLAGS: usize = 5;
const COLUMN_PRESENT_WEATHER_CODES: usize = 27;

const COLUMN_NAMES: [&str; FIELDS_PER_ROW] = [
    "Year",
    "Month",
    "Day",
    "Hour",
    "Minute",
    "Data Source and Uncertainty Flags",
    "Dry Bulb Temperature (°C)",
    "Dew Point Temperature (°C)",
    "Relative Humidity (%)",
    "Atmospheric Station Pressure (Pa)",
    "Extraterrestrial Horizontal Radiation (Wh/m²)",
    "Extraterrestrial Direct Normal Radiation (Wh/m²)",
    "Horizontal Infrared Radiation Intensity (Wh/m²)",
    "Global Horizontal Radiation (Wh/m²)",
    "Direct Normal Radiation (Wh/m²)",
    "Diffuse Horizontal Radiation (Wh/m²)",
    "Global Horizontal Illuminance (lux)",
    "Direct Normal Illuminance (lux)",
    "Diffuse Horizontal Illuminance (lux)",
    "Zenith Luminance (Cd/m²)",
    "Wind Direction (°)",
    "Wind Speed (m/s)",
    "Total Sky Cover (tenths)",
    "Opaque Sky Cover (tenths)",
    "Visibility (km)",
    "Ceiling Height (m)",
    "Present Weather Observation",
    "Present Weather Codes",
    "Precipitable Water (mm)",
    "Aerosol Optical Depth (thousandths)",
    "Snow Depth (cm)",
    "Days Since Last Snowfall",
    "Albedo",
    "Liquid Precipitation Depth (mm)",
    "Liquid Precipitation Quantity (hr)",
];

/// The numeric measurement columns of an EPW row, in file order.
#[derive(Clone, Copy, Debug, EnumCount, EnumIter, Eq, Hash, PartialEq)]
pub enum EpwField {
    DryBulbTemperature,
    DewPointTemperature,
    RelativeHumidity,
    AtmosphericStationPressure,
    ExtraterrestrialHorizontalRadiation,
    ExtraterrestrialDirectNormalRadiation,
    HorizontalInfraredRadiation,
    GlobalHorizontalRadiation,
    DirectNormalRadiation,
    DiffuseHorizontalRadiation,
    GlobalHorizontalIlluminance,
    DirectNormalIlluminance,
    DiffuseHorizontalIlluminance,
    ZenithLuminance,
    WindDirection,
    WindSpeed,
    TotalSkyCover,
    OpaqueSkyCover,
    Visibility,
    CeilingHeight,
    PresentWeatherObservation,
    PrecipitableWater,
    AerosolOpticalDepth,
    SnowDepth,
    DaysSinceLastSnowfall,
    Albedo,
    LiquidPrecipitationDepth,
    LiquidPrecipitationQuantity,
}

impl EpwField {
    /// 0-based position of the field in a data row.
    pub fn column(self) -> usize {
        let index = self as usize;
        // fields 6..=26 are contiguous, then the present weather codes interrupt
        if index <= EpwField::PresentWeatherObservation as usize {
            index + 6
        } else {
            index + 7
        }
    }

    /// Column name, including the unit suffix.
    pub fn name(self) -> &'static str {
        COLUMN_NAMES[self.column()]
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Site description from the LOCATION header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocationMetadata {
    pub city: String,
    pub state_province: String,
    pub country: String,
    pub source: String,
    pub wmo_station: String,
    /// degrees, -90 to 90, north positive
    pub latitude: f64,
    /// degrees, -180 to 180, east positive
    pub longitude: f64,
    /// hours from UTC, -12 to 14
    pub utc_offset: f64,
    /// metres above sea level
    pub elevation: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataPeriod {
    pub records_per_hour: u32,
    /// (month, day)
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl DataPeriod {
    /// Whether the period runs past 31 December into the next year.
    pub fn wraps_year_end(&self) -> bool {
        self.end < self.start
    }
}

/// The raw text of header lines 2 to 8, plus the few values read from them.
#[derive(Clone, Debug, PartialEq)]
pub struct EpwHeader {
    pub design_conditions: String,
    pub typical_extreme_periods: String,
    pub ground_temperatures: String,
    pub holidays_daylight_savings: String,
    pub comments_1: String,
    pub comments_2: String,
    pub data_periods: String,
    pub leap_year_observed: bool,
    pub data_period: DataPeriod,
}

/// One data row before missing-value normalisation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawHourlyRecord {
    /// 1-based line number in the source file
    pub line: usize,
    /// Start of the hour the row describes, in local standard time
    pub timestamp: NaiveDateTime,
    /// Year as written in the row; typical-year files mix source years
    pub source_year: i32,
    pub uncertainty_flags: String,
    pub present_weather_codes: String,
    pub values: [f64; EpwField::COUNT],
}

impl RawHourlyRecord {
    pub fn value(&self, field: EpwField) -> f64 {
        self.values[field.index()]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpwFile {
    pub location: LocationMetadata,
    pub header: EpwHeader,
    pub records: Vec<RawHourlyRecord>,
}

pub fn read_epw_file(path: impl AsRef<Path>) -> Result<EpwFile, ParseError> {
    let file = File::open(path.as_ref())
        .map_err(|e| ParseError::new(0, ParseErrorKind::Io(e.to_string())))?;
    parse_epw(BufReader::new(file))
}

#[instrument(skip_all)]
pub fn parse_epw(input: impl Read) -> Result<EpwFile, ParseError> {
    let mut reader = CsvReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(input);
    let mut rows = reader.records();

    let mut next_header = |name: &'static str| -> Result<(usize, StringRecord), ParseError> {
        let record = rows
            .next()
            .ok_or_else(|| ParseError::new(0, ParseErrorKind::MissingHeader(name)))?
            .map_err(csv_error)?;
        let line = line_of(&record);
        match record.get(0) {
            Some(keyword) if keyword.trim().eq_ignore_ascii_case(name) => Ok((line, record)),
            _ => Err(ParseError::new(line, ParseErrorKind::MissingHeader(name))),
        }
    };

    let (location_line, location_record) = next_header("LOCATION")?;
    let location = parse_location(location_line, &location_record)?;
    let (_, design_conditions) = next_header("DESIGN CONDITIONS")?;
    let (_, typical_extreme_periods) = next_header("TYPICAL/EXTREME PERIODS")?;
    let (_, ground_temperatures) = next_header("GROUND TEMPERATURES")?;
    let (holidays_line, holidays) = next_header("HOLIDAYS/DAYLIGHT SAVINGS")?;
    let (_, comments_1) = next_header("COMMENTS 1")?;
    let (_, comments_2) = next_header("COMMENTS 2")?;
    let (data_periods_line, data_periods) = next_header("DATA PERIODS")?;

    let header = EpwHeader {
        design_conditions: join_record(&design_conditions),
        typical_extreme_periods: join_record(&typical_extreme_periods),
        ground_temperatures: join_record(&ground_temperatures),
        holidays_daylight_savings: join_record(&holidays),
        comments_1: join_record(&comments_1),
        comments_2: join_record(&comments_2),
        data_periods: join_record(&data_periods),
        leap_year_observed: parse_leap_year_flag(holidays_line, &holidays)?,
        data_period: parse_data_period(data_periods_line, &data_periods)?,
    };
    info!(
        city = location.city.as_str(),
        latitude = location.latitude,
        longitude = location.longitude,
        "parsed EPW location"
    );

    let mut records = vec![];
    let mut canonical_year = None;
    let mut previous_month = None;
    let mut year_offset = 0;
    for row in rows {
        let row = row.map_err(csv_error)?;
        let year = match canonical_year {
            Some(year) => year,
            None => {
                let year = canonical_year_of(&row, &header)?;
                canonical_year = Some(year);
                year
            }
        };
        // a period running past December continues in the following year
        let month = integer_field::<u32>(&row, COLUMN_MONTH);
        if header.data_period.wraps_year_end()
            && matches!((previous_month, month), (Some(previous), Some(current)) if current < previous)
        {
            year_offset = 1;
        }
        previous_month = month.or(previous_month);
        records.push(parse_data_row(&row, year.saturating_add(year_offset))?);
    }

    check_sequence(&records, &header.data_period, canonical_year)?;
    debug!(records = records.len(), "parsed EPW data rows");

    Ok(EpwFile {
        location,
        header,
        records,
    })
}

fn csv_error(error: csv::Error) -> ParseError {
    let line = error
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or_default();
    ParseError::new(line, ParseErrorKind::Io(error.to_string()))
}

fn line_of(record: &StringRecord) -> usize {
    record
        .position()
        .map(|position| position.line() as usize)
        .unwrap_or_default()
}

fn join_record(record: &StringRecord) -> String {
    record.iter().join(",")
}

fn parse_location(line: usize, record: &StringRecord) -> Result<LocationMetadata, ParseError> {
    if record.len() < 10 {
        return Err(ParseError::new(
            line,
            ParseErrorKind::MalformedHeader {
                name: "LOCATION",
                reason: format!("expected 10 fields but found {}", record.len()),
            },
        ));
    }

    let number = |index: usize, name: &'static str, min: f64, max: f64| -> Result<f64, ParseError> {
        let raw = record.get(index).unwrap_or_default().trim();
        let value = raw.parse::<f64>().map_err(|_| {
            ParseError::new(
                line,
                ParseErrorKind::MalformedHeader {
                    name: "LOCATION",
                    reason: format!("{name} '{raw}' is not a number"),
                },
            )
        })?;
        if !(min..=max).contains(&value) {
            return Err(ParseError::new(
                line,
                ParseErrorKind::LocationOutOfRange {
                    name,
                    value,
                    min,
                    max,
                },
            ));
        }
        Ok(value)
    };
    let text = |index: usize| record.get(index).unwrap_or_default().trim().to_string();

    Ok(LocationMetadata {
        city: text(1),
        state_province: text(2),
        country: text(3),
        source: text(4),
        wmo_station: text(5),
        latitude: number(6, "latitude", -90., 90.)?,
        longitude: number(7, "longitude", -180., 180.)?,
        utc_offset: number(8, "time zone", -12., 14.)?,
        elevation: number(9, "elevation", -1000., 9999.9)?,
    })
}

fn parse_leap_year_flag(line: usize, record: &StringRecord) -> Result<bool, ParseError> {
    match record.get(1).map(|flag| flag.trim().to_ascii_lowercase()) {
        Some(flag) if flag == "yes" || flag == "y" => Ok(true),
        Some(flag) if flag == "no" || flag == "n" => Ok(false),
        other => Err(ParseError::new(
            line,
            ParseErrorKind::MalformedHeader {
                name: "HOLIDAYS/DAYLIGHT SAVINGS",
                reason: format!("leap year flag {other:?} is not Yes or No"),
            },
        )),
    }
}

fn parse_data_period(line: usize, record: &StringRecord) -> Result<DataPeriod, ParseError> {
    let malformed = |reason: String| {
        ParseError::new(
            line,
            ParseErrorKind::MalformedHeader {
                name: "DATA PERIODS",
                reason,
            },
        )
    };
    let integer = |index: usize| -> Result<u32, ParseError> {
        let raw = record.get(index).unwrap_or_default().trim();
        raw.parse::<u32>()
            .map_err(|_| malformed(format!("field {index} '{raw}' is not a whole number")))
    };
    let month_day = |index: usize| -> Result<(u32, u32), ParseError> {
        let raw = record.get(index).unwrap_or_default();
        let parts = raw
            .split('/')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed(format!("'{raw}' is not a month/day date")))?;
        match parts.as_slice() {
            [month, day, ..] => Ok((*month, *day)),
            _ => Err(malformed(format!("'{raw}' is not a month/day date"))),
        }
    };

    let period_count = integer(1)?;
    if period_count == 0 {
        return Err(malformed("no data periods declared".into()));
    }
    let records_per_hour = integer(2)?;
    if records_per_hour != 1 {
        return Err(ParseError::new(
            line,
            ParseErrorKind::UnsupportedRecordsPerHour(records_per_hour),
        ));
    }
    let last_period_offset = 4 * (period_count as usize - 1);

    Ok(DataPeriod {
        records_per_hour,
        start: month_day(5)?,
        end: month_day(6 + last_period_offset)?,
    })
}

fn integer_field<T: std::str::FromStr>(row: &StringRecord, column: usize) -> Option<T> {
    row.get(column)?.trim().parse::<T>().ok()
}

fn canonical_year_of(row: &StringRecord, header: &EpwHeader) -> Result<i32, ParseError> {
    let line = line_of(row);
    let first_year = integer_field::<i32>(row, COLUMN_YEAR).ok_or_else(|| {
        ParseError::new(
            line,
            ParseErrorKind::NonNumeric {
                field: COLUMN_YEAR,
                name: COLUMN_NAMES[COLUMN_YEAR],
                value: row.get(COLUMN_YEAR).unwrap_or_default().to_string(),
            },
        )
    })?;
    // February of a period that starts after it and wraps falls in the next year
    let period = &header.data_period;
    let february_offset = i32::from(period.wraps_year_end() && period.start.0 > 2);

    analysis_year(first_year, header.leap_year_observed, february_offset).ok_or_else(|| {
        ParseError::new(
            line,
            ParseErrorKind::InvalidTimestamp {
                year: first_year,
                month: integer_field(row, COLUMN_MONTH).unwrap_or_default(),
                day: integer_field(row, COLUMN_DAY).unwrap_or_default(),
                hour: integer_field(row, COLUMN_HOUR).unwrap_or_default(),
                minute: integer_field(row, COLUMN_MINUTE).unwrap_or_default(),
            },
        )
    })
}

/// Typical-year rows carry the years their months were drawn from. All rows are
/// laid onto one calendar: the first row's year, moved back to the nearest year
/// whose leap status (taken `february_offset` years later) agrees with the
/// header. Leap years recur within 8 years, so no search goes further back.
fn analysis_year(first_year: i32, leap_year_observed: bool, february_offset: i32) -> Option<i32> {
    (0..8)
        .filter_map(|step| first_year.checked_sub(step))
        .find(|year| {
            year.checked_add(february_offset)
                .is_some_and(|february_year| is_leap_year(february_year) == leap_year_observed)
        })
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

fn parse_data_row(row: &StringRecord, year: i32) -> Result<RawHourlyRecord, ParseError> {
    let line = line_of(row);
    let populated = (0..row.len())
        .rev()
        .find(|&index| !row[index].trim().is_empty())
        .map_or(0, |last| last + 1);
    if row.len() < FIELDS_PER_ROW || populated > FIELDS_PER_ROW {
        return Err(ParseError::new(
            line,
            ParseErrorKind::FieldCount {
                expected: FIELDS_PER_ROW,
                found: populated.max(row.len().min(FIELDS_PER_ROW)),
            },
        ));
    }

    let field = |column: usize| row.get(column).unwrap_or_default().trim();
    let non_numeric = |column: usize| {
        ParseError::new(
            line,
            ParseErrorKind::NonNumeric {
                field: column,
                name: COLUMN_NAMES[column],
                value: field(column).to_string(),
            },
        )
    };
    let integer = |column: usize| {
        field(column)
            .parse::<i64>()
            .map_err(|_| non_numeric(column))
    };

    let source_year = integer(COLUMN_YEAR)? as i32;
    let month = integer(COLUMN_MONTH)? as u32;
    let day = integer(COLUMN_DAY)? as u32;
    let hour = integer(COLUMN_HOUR)? as u32;
    let minute = integer(COLUMN_MINUTE)? as u32;

    let invalid_timestamp = || {
        ParseError::new(
            line,
            ParseErrorKind::InvalidTimestamp {
                year,
                month,
                day,
                hour,
                minute,
            },
        )
    };
    if !(1..=24).contains(&hour) || minute > 60 {
        return Err(invalid_timestamp());
    }
    // hour N covers N-1:00 to N:00
    let timestamp = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour - 1, 0, 0))
        .ok_or_else(invalid_timestamp)?;

    let mut values = [0.; EpwField::COUNT];
    for epw_field in EpwField::iter() {
        let column = epw_field.column();
        values[epw_field.index()] = field(column)
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| non_numeric(column))?;
    }

    Ok(RawHourlyRecord {
        line,
        timestamp,
        source_year,
        uncertainty_flags: field(COLUMN_UNCERTAINTY_FLAGS).to_string(),
        present_weather_codes: field(COLUMN_PRESENT_WEATHER_CODES).to_string(),
        values,
    })
}

fn check_sequence(
    records: &[RawHourlyRecord],
    data_period: &DataPeriod,
    year: Option<i32>,
) -> Result<(), ParseError> {
    let last_line = records.last().map_or(0, |record| record.line);
    let Some(year) = year else {
        return Err(ParseError::new(
            last_line,
            ParseErrorKind::RecordCount {
                expected: expected_record_count(data_period, 1999).unwrap_or_default(),
                found: 0,
            },
        ));
    };

    let period_start = NaiveDate::from_ymd_opt(year, data_period.start.0, data_period.start.1)
        .and_then(|date| date.and_hms_opt(0, 0, 0));
    if let (Some(period_start), Some(first)) = (period_start, records.first()) {
        if first.timestamp != period_start {
            return Err(ParseError::new(
                first.line,
                ParseErrorKind::NonContiguous {
                    previous: format!("data period start {period_start}"),
                    found: first.timestamp.to_string(),
                },
            ));
        }
    }

    for (previous, current) in records.iter().tuple_windows() {
        if current.timestamp - previous.timestamp != Duration::hours(1) {
            return Err(ParseError::new(
                current.line,
                ParseErrorKind::NonContiguous {
                    previous: previous.timestamp.to_string(),
                    found: current.timestamp.to_string(),
                },
            ));
        }
    }

    let expected = expected_record_count(data_period, year).ok_or_else(|| {
        ParseError::new(
            0,
            ParseErrorKind::MalformedHeader {
                name: "DATA PERIODS",
                reason: format!("{:?} to {:?} are not valid dates", data_period.start, data_period.end),
            },
        )
    })?;
    if records.len() != expected {
        return Err(ParseError::new(
            last_line,
            ParseErrorKind::RecordCount {
                expected,
                found: records.len(),
            },
        ));
    }

    Ok(())
}

/// Hourly rows implied by the data period, which may wrap past the year end.
fn expected_record_count(data_period: &DataPeriod, year: i32) -> Option<usize> {
    let start = NaiveDate::from_ymd_opt(year, data_period.start.0, data_period.start.1)?;
    let mut end = NaiveDate::from_ymd_opt(year, data_period.end.0, data_period.end.1)?;
    if end < start {
        end = NaiveDate::from_ymd_opt(year + 1, end.month(), end.day())?;
    }
    let days = (end - start).num_days() + 1;

    Some(days as usize * 24 * data_period.records_per_hour as usize)
}
