//! Replaces the EPW format's per-field "missing" codes with explicit absence,
//! and flags present values that fall outside the format's physical ranges.

use crate::read_weather_file::{EpwField, RawHourlyRecord};
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fmt::{self, Display};
use strum::{EnumCount, IntoEnumIterator};
use tracing::{instrument, warn};

impl EpwField {
    /// The one raw value that means "not recorded" for this field.
    pub fn sentinel(self) -> f64 {
        use EpwField::*;
        match self {
            DryBulbTemperature | DewPointTemperature => 99.9,
            RelativeHumidity => 999.,
            AtmosphericStationPressure => 999_999.,
            ExtraterrestrialHorizontalRadiation
            | ExtraterrestrialDirectNormalRadiation
            | HorizontalInfraredRadiation
            | GlobalHorizontalRadiation
            | DirectNormalRadiation
            | DiffuseHorizontalRadiation => 9999.,
            GlobalHorizontalIlluminance | DirectNormalIlluminance | DiffuseHorizontalIlluminance => {
                999_999.
            }
            ZenithLuminance => 9999.,
            WindDirection | WindSpeed => 999.,
            TotalSkyCover | OpaqueSkyCover => 99.,
            Visibility => 9999.,
            CeilingHeight => 99_999.,
            PresentWeatherObservation => 9.,
            PrecipitableWater => 999.,
            AerosolOpticalDepth => 0.999,
            SnowDepth => 999.,
            DaysSinceLastSnowfall => 99.,
            Albedo => 999.,
            LiquidPrecipitationDepth => 999.,
            LiquidPrecipitationQuantity => 99.,
        }
    }

    /// Plausible bounds for a present value, where the format defines them.
    pub fn valid_range(self) -> Option<(f64, f64)> {
        use EpwField::*;
        match self {
            DryBulbTemperature | DewPointTemperature => Some((-70., 70.)),
            // readings above 100% are over-saturation, not errors
            RelativeHumidity => Some((0., 110.)),
            AtmosphericStationPressure => Some((31_000., 120_000.)),
            ExtraterrestrialHorizontalRadiation
            | ExtraterrestrialDirectNormalRadiation
            | HorizontalInfraredRadiation
            | GlobalHorizontalRadiation
            | DirectNormalRadiation
            | DiffuseHorizontalRadiation
            | GlobalHorizontalIlluminance
            | DirectNormalIlluminance
            | DiffuseHorizontalIlluminance
            | ZenithLuminance => Some((0., f64::INFINITY)),
            WindDirection => Some((0., 360.)),
            WindSpeed => Some((0., 40.)),
            TotalSkyCover | OpaqueSkyCover => Some((0., 10.)),
            _ => None,
        }
    }
}

/// An hourly EPW row in which every measurement is either present or absent.
#[derive(Clone, Debug, PartialEq)]
pub struct HourlyRecord {
    pub line: usize,
    pub timestamp: NaiveDateTime,
    pub source_year: i32,
    pub uncertainty_flags: String,
    pub present_weather_codes: String,
    pub values: [Option<f64>; EpwField::COUNT],
}

impl HourlyRecord {
    pub fn get(&self, field: EpwField) -> Option<f64> {
        self.values[field.index()]
    }

    /// The value as the file would carry it, with absence written as the sentinel.
    pub fn raw_value(&self, field: EpwField) -> f64 {
        self.get(field).unwrap_or_else(|| field.sentinel())
    }

    pub fn dry_bulb(&self) -> Option<f64> {
        self.get(EpwField::DryBulbTemperature)
    }

    pub fn dew_point(&self) -> Option<f64> {
        self.get(EpwField::DewPointTemperature)
    }

    /// Percent, 0 to 110.
    pub fn relative_humidity(&self) -> Option<f64> {
        self.get(EpwField::RelativeHumidity)
    }

    pub fn station_pressure(&self) -> Option<f64> {
        self.get(EpwField::AtmosphericStationPressure)
    }

    pub fn global_horizontal(&self) -> Option<f64> {
        self.get(EpwField::GlobalHorizontalRadiation)
    }

    pub fn direct_normal(&self) -> Option<f64> {
        self.get(EpwField::DirectNormalRadiation)
    }

    pub fn diffuse_horizontal(&self) -> Option<f64> {
        self.get(EpwField::DiffuseHorizontalRadiation)
    }

    pub fn wind_direction(&self) -> Option<f64> {
        self.get(EpwField::WindDirection)
    }

    pub fn wind_speed(&self) -> Option<f64> {
        self.get(EpwField::WindSpeed)
    }
}

/// A present value outside the field's plausible range. Advisory only; the
/// value is kept as read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeWarning {
    pub line: usize,
    pub field: EpwField,
    pub value: f64,
    pub valid_range: (f64, f64),
}

impl Display for RangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: {} = {} is outside {}..{}",
            self.line,
            self.field.name(),
            self.value,
            self.valid_range.0,
            self.valid_range.1
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedSeries {
    pub records: Vec<HourlyRecord>,
    pub warnings: Vec<RangeWarning>,
}

#[instrument(skip_all)]
pub fn normalize(records: &[RawHourlyRecord]) -> NormalizedSeries {
    let mut warnings = vec![];
    let records = records
        .iter()
        .map(|raw| normalize_record(raw, &mut warnings))
        .collect::<Vec<_>>();

    for (field, count) in warnings.iter().counts_by(|warning| warning.field) {
        warn!(field = field.name(), count, "values outside the plausible range");
    }

    NormalizedSeries { records, warnings }
}

fn normalize_record(raw: &RawHourlyRecord, warnings: &mut Vec<RangeWarning>) -> HourlyRecord {
    let mut values = [None; EpwField::COUNT];
    for field in EpwField::iter() {
        let value = raw.value(field);
        if value == field.sentinel() {
            continue;
        }
        if let Some((min, max)) = field.valid_range() {
            if !(min..=max).contains(&value) {
                warnings.push(RangeWarning {
                    line: raw.line,
                    field,
                    value,
                    valid_range: (min, max),
                });
            }
        }
        values[field.index()] = Some(value);
    }

    HourlyRecord {
        line: raw.line,
        timestamp: raw.timestamp,
        source_year: raw.source_year,
        uncertainty_flags: raw.uncertainty_flags.clone(),
        present_weather_codes: raw.present_weather_codes.clone(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn raw_record() -> RawHourlyRecord {
        let mut values = [0.; EpwField::COUNT];
        values[EpwField::DryBulbTemperature.index()] = 21.3;
        values[EpwField::DewPointTemperature.index()] = 12.;
        values[EpwField::RelativeHumidity.index()] = 56.;
        values[EpwField::AtmosphericStationPressure.index()] = 101_000.;
        values[EpwField::WindDirection.index()] = 270.;
        values[EpwField::WindSpeed.index()] = 4.1;
        RawHourlyRecord {
            line: 9,
            timestamp: NaiveDate::from_ymd_opt(2023, 6, 1)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap(),
            source_year: 2005,
            uncertainty_flags: "?9?9?9?9E0?9?9?9".into(),
            present_weather_codes: "999999999".into(),
            values,
        }
    }

    fn with(mut raw: RawHourlyRecord, field: EpwField, value: f64) -> RawHourlyRecord {
        raw.values[field.index()] = value;
        raw
    }

    #[rstest]
    fn should_keep_present_values(raw_record: RawHourlyRecord) {
        let series = normalize(&[raw_record]);
        let record = &series.records[0];

        assert_eq!(record.dry_bulb(), Some(21.3));
        assert_eq!(record.wind_speed(), Some(4.1));
        assert_eq!(record.uncertainty_flags, "?9?9?9?9E0?9?9?9");
        assert_eq!(record.source_year, 2005);
        assert!(series.warnings.is_empty());
    }

    #[rstest]
    #[case(EpwField::DryBulbTemperature, 99.9)]
    #[case(EpwField::RelativeHumidity, 999.)]
    #[case(EpwField::AtmosphericStationPressure, 999_999.)]
    #[case(EpwField::DirectNormalRadiation, 9999.)]
    #[case(EpwField::WindDirection, 999.)]
    #[case(EpwField::OpaqueSkyCover, 99.)]
    #[case(EpwField::AerosolOpticalDepth, 0.999)]
    fn should_mark_sentinels_absent(
        raw_record: RawHourlyRecord,
        #[case] field: EpwField,
        #[case] sentinel: f64,
    ) {
        let series = normalize(&[with(raw_record, field, sentinel)]);

        assert_eq!(series.records[0].get(field), None);
        assert!(series.warnings.is_empty());
    }

    #[rstest]
    fn should_reproduce_raw_values(raw_record: RawHourlyRecord) {
        let raw = with(raw_record, EpwField::DryBulbTemperature, 99.9);
        let record = &normalize(&[raw.clone()]).records[0];

        for field in EpwField::iter() {
            assert_eq!(record.raw_value(field), raw.value(field), "{field:?}");
        }
    }

    #[rstest]
    fn should_accept_over_saturated_humidity(raw_record: RawHourlyRecord) {
        let series = normalize(&[with(raw_record, EpwField::RelativeHumidity, 104.)]);

        assert_eq!(series.records[0].relative_humidity(), Some(104.));
        assert!(series.warnings.is_empty());
    }

    #[rstest]
    fn should_warn_without_altering_implausible_values(raw_record: RawHourlyRecord) {
        let series = normalize(&[with(raw_record, EpwField::RelativeHumidity, 115.)]);

        assert_eq!(series.records[0].relative_humidity(), Some(115.));
        assert_eq!(
            series.warnings,
            vec![RangeWarning {
                line: 9,
                field: EpwField::RelativeHumidity,
                value: 115.,
                valid_range: (0., 110.),
            }]
        );
        assert_eq!(
            series.warnings[0].to_string(),
            "line 9: Relative Humidity (%) = 115 is outside 0..110"
        );
    }

    #[rstest]
    fn should_warn_on_negative_radiation(raw_record: RawHourlyRecord) {
        let series = normalize(&[with(raw_record, EpwField::GlobalHorizontalRadiation, -3.)]);

        assert_eq!(series.warnings.len(), 1);
        assert_eq!(series.warnings[0].field, EpwField::GlobalHorizontalRadiation);
    }
}
