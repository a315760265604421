use clap::Parser;
use climate_utils::output::FileOutput;
use climate_utils::{analyse_epw_file, write_report, AnalysisConfig};
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct ClimateArgs {
    epw_file: String,
    #[arg(long, short, help = "Path to analysis configuration in .json format")]
    config: Option<String>,
    #[arg(
        long,
        short,
        help = "Directory to write results to (defaults to the directory of the EPW file)"
    )]
    output_dir: Option<String>,
    #[clap(long, default_value_t = false, help = "Whether to log out spans")]
    log_spans: bool,
}

fn main() -> anyhow::Result<()> {
    let args = ClimateArgs::parse();

    // set up basic tracing
    let tracing_subscriber = {
        let mut builder = tracing_subscriber::fmt::fmt().with_max_level(tracing::Level::TRACE);

        if args.log_spans {
            builder = builder.with_span_events(FmtSpan::CLOSE);
        }

        builder.finish()
    };
    tracing::subscriber::set_global_default(tracing_subscriber)
        .expect("setting tracing subscriber failed");

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json(BufReader::new(File::open(path)?))?,
        None => AnalysisConfig::default(),
    };
    debug!("analysis configuration: {config:?}");

    let epw_path = Path::new(args.epw_file.as_str());
    let epw_stem = epw_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("weather");
    let output_path = match &args.output_dir {
        Some(dir) => PathBuf::from(dir),
        None => epw_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    fs::create_dir_all(&output_path)?;

    let report = analyse_epw_file(epw_path, &config)?;

    let file_output = FileOutput::new(output_path, format!("{epw_stem}__{{}}.csv"));
    write_report(&report, &file_output)?;

    println!(
        "{} hours analysed for {}: {} range warnings, {} record errors",
        report.table.len(),
        report.location.city,
        report.warnings.len(),
        report.record_errors.len()
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.record_errors {
        println!("error: {error}");
    }
    if let Err(e) = &report.wind_statistics {
        println!("wind statistics unavailable: {e}");
    }

    Ok(())
}
