use chrono::NaiveDateTime;
use thiserror::Error;

/// A failure that aborts a whole derivation run. Per-record and per-aggregate
/// failures are carried in the report instead, as [`RecordError`]s and
/// `Result` fields.
#[derive(Debug, Error)]
pub enum ClimateError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),
}

/// A structural failure in an EPW file. `line` is 1-based.
#[derive(Debug, Error, PartialEq)]
#[error("EPW parse error at line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseErrorKind {
    #[error("header line {0} is missing")]
    MissingHeader(&'static str),
    #[error("header line {name} is malformed: {reason}")]
    MalformedHeader { name: &'static str, reason: String },
    #[error("expected {expected} fields but found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("field {field} ({name}) has non-numeric value '{value}'")]
    NonNumeric {
        field: usize,
        name: &'static str,
        value: String,
    },
    #[error("invalid timestamp {year}-{month}-{day} hour {hour} minute {minute}")]
    InvalidTimestamp {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
    },
    #[error("timestamp {found} does not follow {previous} by exactly one hour")]
    NonContiguous { previous: String, found: String },
    #[error("expected {expected} hourly records but found {found}")]
    RecordCount { expected: usize, found: usize },
    #[error("only one record per hour is supported, file declares {0}")]
    UnsupportedRecordsPerHour(u32),
    #[error("location value {name} = {value} is outside {min}..{max}")]
    LocationOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("could not read input: {0}")]
    Io(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("Exactly one humidity input must be supplied, {supplied} were given")]
pub struct AmbiguousInputError {
    pub supplied: usize,
}

/// An iterative solver ran out of iterations or could not bracket a root.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{quantity} did not converge to within {tolerance} after {iterations} iterations: {reason}")]
pub struct ConvergenceError {
    pub quantity: &'static str,
    pub iterations: usize,
    pub tolerance: f64,
    pub reason: String,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum InsufficientDataError {
    #[error("{quantity} needs at least {required} usable samples, {available} available")]
    TooFewSamples {
        quantity: &'static str,
        required: usize,
        available: usize,
    },
    #[error("{quantity} cannot be fitted to samples that are all equal")]
    NoSpread { quantity: &'static str },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum PsychrometricError {
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousInputError),
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
    #[error("{name} of {value}ºC is outside the valid range -100..200ºC")]
    TemperatureOutOfRange { name: &'static str, value: f64 },
    #[error("Pressure of {0} Pa is not positive")]
    InvalidPressure(f64),
    #[error("Relative humidity fraction {0} is negative")]
    NegativeRelativeHumidity(f64),
    #[error("Humidity ratio {0} kg/kg is negative")]
    NegativeHumidityRatio(f64),
    #[error("Vapour pressure {vapour_pressure} Pa is not below total pressure {pressure} Pa")]
    VapourPressureExceedsTotal { vapour_pressure: f64, pressure: f64 },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum WindInputError {
    #[error("Heights must be positive (from {from} m, to {to} m)")]
    NonPositiveHeight { from: f64, to: f64 },
    #[error("Heights must exceed the roughness length {roughness_length} m (from {from} m, to {to} m)")]
    BelowRoughnessLength {
        from: f64,
        to: f64,
        roughness_length: f64,
    },
    #[error("Roughness length must be positive, got {0} m")]
    NonPositiveRoughnessLength(f64),
    #[error("Wind speed must not be negative, got {0} m/s")]
    NegativeSpeed(f64),
    #[error("Wind direction {0} is not finite")]
    NonFiniteDirection(f64),
    #[error("Number of sectors must be at least 1")]
    NoSectors,
    #[error("Speed bins must be strictly increasing with at least two edges")]
    InvalidSpeedBins,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum WeibullFitError {
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
}

/// A derived quantity that could not be produced for one hour. The rest of the
/// hour and the rest of the series are unaffected.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("line {line} ({timestamp}): {kind}")]
pub struct RecordError {
    pub line: usize,
    pub timestamp: NaiveDateTime,
    pub kind: RecordErrorKind,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RecordErrorKind {
    #[error(transparent)]
    Psychrometric(#[from] PsychrometricError),
    #[error(transparent)]
    Wind(#[from] WindInputError),
}
