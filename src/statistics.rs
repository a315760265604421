/// A simple statistics module with some utility functions such as calculation of percentiles.
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};

/// Percentile of a series, interpolated between order statistics.
pub fn percentile(numbers: &[f64], percentile: usize) -> f64 {
    let mut data = Data::new(numbers.to_vec());

    data.percentile(percentile)
}

pub fn median(numbers: &[f64]) -> f64 {
    Data::new(numbers.to_vec()).median()
}

pub fn mean(numbers: &[f64]) -> Option<f64> {
    (!numbers.is_empty()).then(|| numbers.mean())
}

/// Sample standard deviation (n - 1 denominator); needs two values.
pub fn sample_std_dev(numbers: &[f64]) -> Option<f64> {
    (numbers.len() > 1).then(|| numbers.std_dev())
}

pub fn min(numbers: &[f64]) -> Option<f64> {
    (!numbers.is_empty()).then(|| numbers.min())
}

pub fn max(numbers: &[f64]) -> Option<f64> {
    (!numbers.is_empty()).then(|| numbers.max())
}

/// Mean of cubes, as used for kinetic energy flux.
pub fn cubic_mean(numbers: &[f64]) -> Option<f64> {
    (!numbers.is_empty()).then(|| numbers.iter().map(|x| x.powi(3)).mean())
}
