use crate::core::solar::SurfaceOrientation;
use crate::core::solvers::SolverSettings;
use crate::core::wind::{SectorAlignment, WeibullMethod, WindProfile};
use crate::errors::ClimateError;
use crate::weather_table::surface_irradiation_column;
use itertools::Itertools;
use serde::Deserialize;
use serde_valid::Validate;
use std::io::Read;

/// Settings for one derivation run. Every field has a default, so `{}` is a
/// complete configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Anemometer height, m
    #[validate(exclusive_minimum = 0.)]
    pub measurement_height: f64,
    /// Height wind speeds are reported at, m
    #[validate(exclusive_minimum = 0.)]
    pub target_height: f64,
    pub wind_profile: WindProfile,
    #[validate(minimum = 1)]
    pub num_sectors: usize,
    pub sector_alignment: SectorAlignment,
    /// Ground reflectance for the ground-reflected irradiance component
    #[validate(minimum = 0.)]
    #[validate(maximum = 1.)]
    pub albedo: f64,
    #[validate]
    pub surfaces: Vec<SurfaceOrientation>,
    /// kg/m³; when absent, the mean moist-air density of the series is used
    #[validate(exclusive_minimum = 0.)]
    pub air_density: Option<f64>,
    #[validate]
    pub solver: SolverSettings,
    pub weibull_method: WeibullMethod,
    pub percentiles: Vec<usize>,
    /// Speeds below this count as calm, m/s
    #[validate(minimum = 0.)]
    pub calm_threshold: f64,
    pub wind_rose_speed_bins: Vec<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            measurement_height: 10.,
            target_height: 10.,
            wind_profile: WindProfile::default(),
            num_sectors: 16,
            sector_alignment: SectorAlignment::default(),
            albedo: 0.2,
            surfaces: [0., 90., 180., 270.]
                .into_iter()
                .map(SurfaceOrientation::vertical)
                .collect(),
            air_density: Some(1.225),
            solver: SolverSettings::default(),
            weibull_method: WeibullMethod::default(),
            percentiles: vec![10, 25, 50, 75, 90, 95],
            calm_threshold: 0.5,
            wind_rose_speed_bins: vec![
                0., 2., 4., 6., 8., 10., 12., 15., 20., 25., 30., 50.,
            ],
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(reader: impl Read) -> Result<Self, ClimateError> {
        let config: Self = serde_json::from_reader(reader)
            .map_err(|e| ClimateError::InvalidConfig(e.to_string()))?;
        config.check()?;

        Ok(config)
    }

    /// Field bounds plus the constraints that span several fields.
    pub fn check(&self) -> Result<(), ClimateError> {
        self.validate()
            .map_err(|e| ClimateError::InvalidConfig(e.to_string()))?;

        if let Some(p) = self.percentiles.iter().find(|p| **p > 100) {
            return Err(ClimateError::InvalidConfig(format!(
                "percentile {p} is above 100"
            )));
        }
        if self.wind_rose_speed_bins.len() < 2
            || !self
                .wind_rose_speed_bins
                .iter()
                .tuple_windows()
                .all(|(a, b)| a < b)
        {
            return Err(ClimateError::InvalidConfig(
                "wind rose speed bins must be at least two strictly increasing edges".into(),
            ));
        }
        // each surface owns one table column
        if let Some(column) = self
            .surfaces
            .iter()
            .map(|surface| surface_irradiation_column(surface.orientation.angle(), surface.tilt))
            .duplicates()
            .next()
        {
            return Err(ClimateError::InvalidConfig(format!(
                "surface '{column}' is listed more than once"
            )));
        }
        match self.wind_profile {
            WindProfile::Logarithmic { roughness_length }
                if roughness_length <= 0.
                    || self.measurement_height <= roughness_length
                    || self.target_height <= roughness_length =>
            {
                Err(ClimateError::InvalidConfig(format!(
                    "roughness length {roughness_length} m must be positive and below both heights"
                )))
            }
            WindProfile::PowerLaw { shear_coefficient } if !shear_coefficient.is_finite() => Err(
                ClimateError::InvalidConfig("shear coefficient must be finite".into()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_default_from_empty_json() {
        assert_eq!(
            AnalysisConfig::from_json("{}".as_bytes()).unwrap(),
            AnalysisConfig::default()
        );
    }

    #[rstest]
    fn should_read_every_setting() {
        let json = r#"{
            "measurement_height": 10,
            "target_height": 80,
            "wind_profile": {"logarithmic": {"roughness_length": 0.03}},
            "num_sectors": 8,
            "sector_alignment": "centered",
            "albedo": 0.3,
            "surfaces": [{"orientation": 180, "tilt": 35}],
            "air_density": null,
            "solver": {"tolerance": 0.0001, "max_iterations": 50},
            "weibull_method": "method_of_moments",
            "percentiles": [50, 99],
            "calm_threshold": 1.0,
            "wind_rose_speed_bins": [0, 5, 10]
        }"#;

        let config = AnalysisConfig::from_json(json.as_bytes()).unwrap();

        assert_eq!(config.target_height, 80.);
        assert_eq!(
            config.wind_profile,
            WindProfile::Logarithmic {
                roughness_length: 0.03
            }
        );
        assert_eq!(config.sector_alignment, SectorAlignment::Centered);
        assert_eq!(config.surfaces[0].tilt, 35.);
        assert_eq!(config.air_density, None);
        assert_eq!(config.solver.max_iterations, 50);
        assert_eq!(config.weibull_method, WeibullMethod::MethodOfMoments);
    }

    #[rstest]
    fn should_accept_surfaces_sharing_an_orientation() {
        let json = r#"{"surfaces": [{"orientation": 90, "tilt": 30}, {"orientation": 90, "tilt": 90}]}"#;

        assert_eq!(
            AnalysisConfig::from_json(json.as_bytes()).unwrap().surfaces.len(),
            2
        );
    }

    #[rstest]
    #[case(r#"{"num_sectors": 0}"#)]
    #[case(r#"{"albedo": 1.5}"#)]
    #[case(r#"{"target_height": -5}"#)]
    #[case(r#"{"surfaces": [{"orientation": 400, "tilt": 90}]}"#)]
    #[case(r#"{"solver": {"tolerance": 0}}"#)]
    #[case(r#"{"percentiles": [101]}"#)]
    #[case(r#"{"wind_rose_speed_bins": [0, 4, 2]}"#)]
    #[case(r#"{"wind_profile": {"logarithmic": {"roughness_length": 20}}}"#)]
    #[case(r#"{"unknown_setting": true}"#)]
    #[case(r#"{"surfaces": [{"orientation": 90, "tilt": 30}, {"orientation": 90, "tilt": 30}]}"#)]
    fn should_reject_invalid_settings(#[case] json: &str) {
        assert!(matches!(
            AnalysisConfig::from_json(json.as_bytes()),
            Err(ClimateError::InvalidConfig(_))
        ));
    }
}
