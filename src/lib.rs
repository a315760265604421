pub mod config;
pub mod core;
pub mod errors;
pub mod missing_values;
pub mod output;
pub mod read_weather_file;
mod statistics;
pub mod weather_table;

#[macro_use]
extern crate is_close;

pub use crate::config::AnalysisConfig;
pub use crate::errors::ClimateError;
use crate::core::psychrometrics::DerivedRecord;
use crate::core::solar::OrientedIrradiance;
use crate::core::wind::{
    monthly_wind_statistics, wind_rose, wind_statistics, MonthlyWindStatistics, WindRoseCell,
    WindSample, WindStatistics, WindStatisticsOptions,
};
use crate::errors::{InsufficientDataError, RecordError, WindInputError};
use crate::missing_values::{normalize, NormalizedSeries, RangeWarning};
use crate::output::Output;
use crate::read_weather_file::{parse_epw, read_epw_file, EpwFile, EpwHeader, LocationMetadata};
use crate::weather_table::{assemble, AssembledSeries, WeatherTable};
use csv::WriterBuilder;
use std::io::Read;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Dry air at 15ºC and sea level, kg/m³.
pub const STANDARD_AIR_DENSITY: f64 = 1.225;

pub const WEATHER_OUTPUT_KEY: &str = "weather";
pub const WIND_STATISTICS_OUTPUT_KEY: &str = "wind_statistics";
pub const WIND_ROSE_OUTPUT_KEY: &str = "wind_rose";

/// Everything one run derives from an EPW file. Parse failures abort a run;
/// every other failure is confined to the record or aggregate it affects.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisReport {
    pub location: LocationMetadata,
    pub header: EpwHeader,
    pub table: WeatherTable,
    pub psychrometrics: Vec<Option<DerivedRecord>>,
    /// Per hour, one entry per configured surface
    pub surface_irradiance: Vec<Option<Vec<OrientedIrradiance>>>,
    pub warnings: Vec<RangeWarning>,
    pub record_errors: Vec<RecordError>,
    /// Density used for wind power density, kg/m³
    pub air_density: f64,
    /// m
    pub measurement_height: f64,
    /// m
    pub target_height: f64,
    /// Over the whole series at target height
    pub wind_statistics: Result<WindStatistics, InsufficientDataError>,
    /// The same hours at measurement height, before any profile adjustment
    pub measured_wind_statistics: Result<WindStatistics, InsufficientDataError>,
    /// Per calendar month at target height
    pub monthly_wind_statistics: Vec<MonthlyWindStatistics>,
    pub wind_rose: Result<Vec<WindRoseCell>, WindInputError>,
}

pub fn analyse_epw(input: impl Read, config: &AnalysisConfig) -> Result<AnalysisReport, ClimateError> {
    config.check()?;
    let epw = parse_epw(input)?;

    Ok(analyse(epw, config))
}

pub fn analyse_epw_file(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, ClimateError> {
    config.check()?;
    let epw = read_epw_file(path)?;

    Ok(analyse(epw, config))
}

#[instrument(skip_all)]
fn analyse(epw: EpwFile, config: &AnalysisConfig) -> AnalysisReport {
    let EpwFile {
        location,
        header,
        records,
    } = epw;
    let NormalizedSeries { records, warnings } = normalize(&records);
    let AssembledSeries {
        table,
        psychrometrics,
        surface_irradiance,
        wind_samples,
        measured_wind_samples,
        record_errors,
    } = assemble(&records, &location, config);
    let adjusted_samples = wind_samples.iter().flatten().copied().collect::<Vec<WindSample>>();
    let measured_samples = measured_wind_samples
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<WindSample>>();

    let air_density = config
        .air_density
        .unwrap_or_else(|| mean_air_density(&psychrometrics));
    let options = WindStatisticsOptions {
        percentiles: &config.percentiles,
        calm_threshold: config.calm_threshold,
        air_density,
        weibull_method: config.weibull_method,
        solver: config.solver,
    };
    let measured_wind_statistics = wind_statistics(&measured_samples, &options);
    let wind_statistics = wind_statistics(&adjusted_samples, &options);
    let monthly_wind_statistics =
        monthly_wind_statistics(table.timestamps(), &wind_samples, &options);
    let wind_rose = wind_rose(
        &adjusted_samples,
        config.num_sectors,
        config.sector_alignment,
        &config.wind_rose_speed_bins,
    );

    info!(
        records = table.len(),
        range_warnings = warnings.len(),
        record_errors = record_errors.len(),
        "derived weather data"
    );
    if let Err(e) = &wind_statistics {
        warn!("wind statistics unavailable: {e}");
    }

    AnalysisReport {
        location,
        header,
        table,
        psychrometrics,
        surface_irradiance,
        warnings,
        record_errors,
        air_density,
        measurement_height: config.measurement_height,
        target_height: config.target_height,
        wind_statistics,
        measured_wind_statistics,
        monthly_wind_statistics,
        wind_rose,
    }
}

/// Mean moist-air density over the hours with a psychrometric state.
fn mean_air_density(psychrometrics: &[Option<DerivedRecord>]) -> f64 {
    let densities = psychrometrics
        .iter()
        .flatten()
        .map(DerivedRecord::density)
        .collect::<Vec<_>>();

    statistics::mean(&densities).unwrap_or_else(|| {
        warn!("no psychrometric states to derive air density from, using {STANDARD_AIR_DENSITY} kg/m³");
        STANDARD_AIR_DENSITY
    })
}

pub fn write_report(report: &AnalysisReport, output: impl Output) -> anyhow::Result<()> {
    if output.is_noop() {
        return Ok(());
    }

    report
        .table
        .write_csv(output.writer_for_key(WEATHER_OUTPUT_KEY)?)?;
    write_wind_statistics(report, output.writer_for_key(WIND_STATISTICS_OUTPUT_KEY)?)?;
    if let Ok(cells) = &report.wind_rose {
        write_wind_rose(cells, output.writer_for_key(WIND_ROSE_OUTPUT_KEY)?)?;
    }

    Ok(())
}

/// One block of statistic rows per period and height: the whole series at
/// target height, the whole series at measurement height (when it differs)
/// and each calendar month at target height.
fn write_wind_statistics(report: &AnalysisReport, writer: impl std::io::Write) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(["Period", "Height (m)", "Statistic", "Value", "Unit", "Note"])?;

    let mut blocks = vec![("all".to_string(), report.target_height, &report.wind_statistics)];
    if report.measurement_height != report.target_height {
        blocks.push((
            "all".to_string(),
            report.measurement_height,
            &report.measured_wind_statistics,
        ));
    }
    blocks.extend(report.monthly_wind_statistics.iter().map(|month| {
        (
            format!("{}-{:02}", month.year, month.month),
            report.target_height,
            &month.statistics,
        )
    }));

    for (period, height, statistics) in blocks {
        let height = height.to_string();
        for (name, value, unit, note) in statistic_rows(statistics) {
            let value = value.map(|v| v.to_string()).unwrap_or_default();
            writer.write_record([
                period.as_str(),
                height.as_str(),
                name.as_str(),
                value.as_str(),
                unit,
                note.as_str(),
            ])?;
        }
    }
    let air_density = report.air_density.to_string();
    writer.write_record(["all", "", "Air density", air_density.as_str(), "[kg/m³]", ""])?;
    writer.flush()?;

    Ok(())
}

fn statistic_rows(
    statistics: &Result<WindStatistics, InsufficientDataError>,
) -> Vec<(String, Option<f64>, &'static str, String)> {
    let row = |name: &str, value: Option<f64>, unit: &'static str| {
        (name.to_string(), value, unit, String::new())
    };
    let failed = |name: &str, unit: &'static str, note: String| (name.to_string(), None, unit, note);

    let stats = match statistics {
        Ok(stats) => stats,
        Err(e) => return vec![(String::from("Sample count"), Some(0.), "[count]", e.to_string())],
    };
    let mut rows = vec![
        row("Sample count", Some(stats.count as f64), "[count]"),
        row("Mean speed", Some(stats.mean_speed), "[m/s]"),
        row("Speed standard deviation", stats.std_speed, "[m/s]"),
        row("Minimum speed", Some(stats.min_speed), "[m/s]"),
        row("Maximum speed", Some(stats.max_speed), "[m/s]"),
        row("Median speed", Some(stats.median_speed), "[m/s]"),
    ];
    rows.extend(
        stats
            .percentiles
            .iter()
            .map(|(percentile, value)| row(&format!("P{percentile} speed"), Some(*value), "[m/s]")),
    );
    rows.extend([
        row("Calm hours", Some(stats.calm_percentage), "[%]"),
        row("Mean direction", stats.mean_direction, "[°]"),
        row("Direction standard deviation", stats.direction_std, "[°]"),
    ]);
    match &stats.weibull {
        Ok(weibull) => rows.extend([
            row("Weibull shape", Some(weibull.shape), "[-]"),
            row("Weibull scale", Some(weibull.scale), "[m/s]"),
        ]),
        Err(e) => rows.extend([
            failed("Weibull shape", "[-]", e.to_string()),
            failed("Weibull scale", "[m/s]", e.to_string()),
        ]),
    }
    rows.push(match &stats.power_density {
        Ok(power_density) => row("Power density", Some(*power_density), "[W/m²]"),
        Err(e) => failed("Power density", "[W/m²]", e.to_string()),
    });

    rows
}

fn write_wind_rose(cells: &[WindRoseCell], writer: impl std::io::Write) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(["Sector", "Sector Label", "Speed Bin (m/s)", "Count", "Frequency (%)"])?;
    for cell in cells {
        writer.write_record([
            cell.sector.index.to_string(),
            cell.sector.label.clone(),
            cell.speed_label.clone(),
            cell.count.to_string(),
            cell.frequency.to_string(),
        ])?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SinkOutput;
    use crate::read_weather_file::tests::annual_epw_text;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn report() -> AnalysisReport {
        analyse_epw(annual_epw_text().as_bytes(), &AnalysisConfig::default()).unwrap()
    }

    #[rstest]
    fn should_use_configured_air_density(report: AnalysisReport) {
        assert_eq!(report.air_density, 1.225);
        assert!(report.wind_statistics.is_ok());
        assert!(report.wind_rose.is_ok());
    }

    #[rstest]
    fn should_derive_air_density_when_not_configured() {
        let config = AnalysisConfig {
            air_density: None,
            ..Default::default()
        };

        let report = analyse_epw(annual_epw_text().as_bytes(), &config).unwrap();

        // 83 kPa station pressure at mild temperatures
        assert!((0.95..1.05).contains(&report.air_density), "{}", report.air_density);
    }

    #[rstest]
    fn should_refuse_invalid_configuration() {
        let config = AnalysisConfig {
            num_sectors: 0,
            ..Default::default()
        };

        assert!(matches!(
            analyse_epw(annual_epw_text().as_bytes(), &config),
            Err(ClimateError::InvalidConfig(_))
        ));
    }

    #[rstest]
    fn should_abort_on_parse_errors() {
        assert!(matches!(
            analyse_epw("LOCATION,nowhere".as_bytes(), &AnalysisConfig::default()),
            Err(ClimateError::Parse(_))
        ));
    }

    #[rstest]
    fn should_write_wind_statistics(report: AnalysisReport) {
        let mut buffer = vec![];
        write_wind_statistics(&report, &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();

        assert!(csv.starts_with("Period,Height (m),Statistic,Value,Unit,Note\n"));
        assert!(csv.contains("\nall,10,Sample count,8760,[count],"));
        assert!(csv.contains("\nall,10,Weibull shape,"));
        assert!(csv.contains("\n2023-01,10,Sample count,744,[count],"));
        assert!(csv.contains("\n2023-12,10,Sample count,744,[count],"));
        assert!(csv.contains("\nall,,Air density,1.225,[kg/m³],"));
        // heights agree, so the measured block would only repeat the adjusted one
        assert_eq!(csv.matches("all,10,Sample count").count(), 1);
    }

    #[rstest]
    fn should_report_wind_at_both_heights_and_per_month() {
        let config = AnalysisConfig {
            target_height: 80.,
            ..Default::default()
        };

        let report = analyse_epw(annual_epw_text().as_bytes(), &config).unwrap();

        let adjusted = report.wind_statistics.as_ref().unwrap();
        let measured = report.measured_wind_statistics.as_ref().unwrap();
        assert_eq!(adjusted.count, measured.count);
        assert!(
            (adjusted.mean_speed / measured.mean_speed - 8f64.powf(0.14)).abs() < 1e-9,
            "{} vs {}",
            adjusted.mean_speed,
            measured.mean_speed
        );
        assert_eq!(report.monthly_wind_statistics.len(), 12);
        assert_eq!(
            report.monthly_wind_statistics[1].statistics.as_ref().unwrap().count,
            672
        );

        let mut buffer = vec![];
        write_wind_statistics(&report, &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        assert!(csv.contains("\nall,80,Sample count,8760,[count],"));
        assert!(csv.contains("\nall,10,Sample count,8760,[count],"));
        assert!(csv.contains("\n2023-02,80,Sample count,672,[count],"));
    }

    #[rstest]
    fn should_write_wind_rose(report: AnalysisReport) {
        let mut buffer = vec![];
        write_wind_rose(report.wind_rose.as_ref().unwrap(), &mut buffer).unwrap();
        let csv = String::from_utf8(buffer).unwrap();

        assert!(csv.starts_with("Sector,Sector Label,Speed Bin (m/s),Count,Frequency (%)\n"));
    }

    #[rstest]
    fn should_skip_writing_to_sink(report: AnalysisReport) {
        assert!(write_report(&report, SinkOutput).is_ok());
    }
}
