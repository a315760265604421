//! Solar position (BS EN ISO 52010-1:2017 section 6.4.1) and the decomposition
//! of measured radiation onto tilted, oriented surfaces with an isotropic sky.

use crate::core::units::{wrap_degrees, Orientation360, DEGREES_PER_HOUR, MINUTES_PER_HOUR};
use crate::read_weather_file::LocationMetadata;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use serde::Deserialize;
use serde_valid::Validate;

/// Sun position in degrees. Zenith runs 0 to 180; above 90 the sun is below
/// the horizon. Azimuth runs clockwise from North, 0 to 360.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolarPosition {
    pub zenith: f64,
    pub azimuth: f64,
}

impl SolarPosition {
    pub fn altitude(&self) -> f64 {
        90. - self.zenith
    }

    pub fn is_below_horizon(&self) -> bool {
        self.zenith > 90.
    }
}

/// A receiving surface. Orientation is the bearing its normal faces
/// (0 = North, 90 = East); tilt is from horizontal, 0 facing up to 180 facing down.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
pub struct SurfaceOrientation {
    #[validate]
    pub orientation: Orientation360,
    #[validate(minimum = 0.)]
    #[validate(maximum = 180.)]
    pub tilt: f64,
}

impl SurfaceOrientation {
    pub fn vertical(orientation: f64) -> Self {
        Self {
            orientation: Orientation360::new(wrap_degrees(orientation))
                .unwrap_or_default(),
            tilt: 90.,
        }
    }
}

/// Irradiation falling on one surface over one hour, Wh/m². No component is negative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OrientedIrradiance {
    pub direct: f64,
    pub diffuse: f64,
    pub ground_reflected: f64,
    pub total: f64,
}

impl OrientedIrradiance {
    fn from_components(direct: f64, diffuse: f64, ground_reflected: f64) -> Self {
        let direct = direct.max(0.);
        let diffuse = diffuse.max(0.);
        let ground_reflected = ground_reflected.max(0.);

        Self {
            direct,
            diffuse,
            ground_reflected,
            total: direct + diffuse + ground_reflected,
        }
    }
}

/// Sun position at `timestamp`, read as local standard time at `utc_offset`
/// hours. No daylight-saving adjustment is applied.
pub fn solar_position(
    timestamp: NaiveDateTime,
    latitude: f64,
    longitude: f64,
    utc_offset: f64,
) -> SolarPosition {
    let day_of_year = timestamp.ordinal();
    let local_hours = timestamp.hour() as f64
        + timestamp.minute() as f64 / MINUTES_PER_HOUR as f64
        + timestamp.second() as f64 / 3600.;

    let declination = solar_declination(earth_orbit_deviation(day_of_year));
    let solar_time = solar_time(
        local_hours,
        equation_of_time(day_of_year),
        time_shift(utc_offset, longitude),
    );
    let hour_angle = solar_hour_angle(solar_time);
    let altitude = solar_altitude(latitude, declination, hour_angle);

    SolarPosition {
        zenith: 90. - altitude,
        azimuth: solar_azimuth(latitude, declination, hour_angle),
    }
}

/// Sun positions for a run of hourly records. EPW values describe the hour
/// ending at their stamp, so each position is taken at the middle of the hour
/// that starts at the given period-start timestamp.
pub fn hourly_solar_positions(
    period_starts: &[NaiveDateTime],
    location: &LocationMetadata,
) -> Vec<SolarPosition> {
    period_starts
        .iter()
        .map(|start| {
            solar_position(
                *start + Duration::minutes(30),
                location.latitude,
                location.longitude,
                location.utc_offset,
            )
        })
        .collect()
}

/// 1-indexed day of the year expressed as an angle, in degrees.
pub fn earth_orbit_deviation(day_of_year: u32) -> f64 {
    (360.0 / 365.0) * day_of_year as f64
}

pub fn solar_declination(earth_orbit_deviation: f64) -> f64 {
    let earth_orbit_deviation = earth_orbit_deviation.to_radians();

    0.33281 - 22.984 * earth_orbit_deviation.cos() - 0.3499 * (2.0 * earth_orbit_deviation).cos()
        - 0.1398 * (3.0 * earth_orbit_deviation).cos()
        + 3.7872 * earth_orbit_deviation.sin()
        + 0.03205 * (2.0 * earth_orbit_deviation).sin()
        + 0.07187 * (3.0 * earth_orbit_deviation).sin()
}

/// Equation of time in minutes for a 1-indexed day of the year, ISO 52010 sign
/// convention (positive when the sun runs behind the clock).
pub fn equation_of_time(day_of_year: u32) -> f64 {
    let nday = day_of_year.clamp(1, 366) as i32;

    match nday {
        nday if nday < 21 => 2.6 + 0.44 * nday as f64,
        nday if nday < 136 => 5.2 + 9.0 * ((nday - 43) as f64 * 0.0357).cos(),
        nday if nday < 241 => 1.4 - 5.0 * ((nday - 135) as f64 * 0.0449).cos(),
        nday if nday < 336 => -6.3 - 10.0 * ((nday - 306) as f64 * 0.036).cos(),
        nday => 0.45 * (nday - 359) as f64,
    }
}

/// Hours between the time zone meridian and the local meridian.
pub fn time_shift(utc_offset: f64, longitude: f64) -> f64 {
    utc_offset - longitude / DEGREES_PER_HOUR
}

pub fn solar_time(local_hours: f64, equation_of_time: f64, time_shift: f64) -> f64 {
    local_hours - equation_of_time / MINUTES_PER_HOUR as f64 - time_shift
}

/// Hour angle in degrees, -180 to 180, zero at solar noon and positive in the
/// afternoon.
pub fn solar_hour_angle(solar_time: f64) -> f64 {
    let hour_angle = DEGREES_PER_HOUR * (solar_time - 12.);

    if hour_angle > 180.0 {
        hour_angle - 360.0
    } else if hour_angle < -180.0 {
        hour_angle + 360.0
    } else {
        hour_angle
    }
}

/// Angle between the solar beam and the horizontal, -90 to 90 degrees
/// (negative at night).
pub fn solar_altitude(latitude: f64, declination: f64, hour_angle: f64) -> f64 {
    let latitude = latitude.to_radians();
    let declination = declination.to_radians();
    let hour_angle = hour_angle.to_radians();

    (declination.sin() * latitude.sin()
        + declination.cos() * latitude.cos() * hour_angle.cos())
    .clamp(-1., 1.)
    .asin()
    .to_degrees()
}

/// Azimuth clockwise from North, 0 to 360. With the sun at the zenith (or an
/// observer at a pole at solar noon) the direction is undefined and 0 is returned.
pub fn solar_azimuth(latitude: f64, declination: f64, hour_angle: f64) -> f64 {
    let latitude = latitude.to_radians();
    let declination = declination.to_radians();
    let hour_angle = hour_angle.to_radians();

    let east_component = -declination.cos() * hour_angle.sin();
    let north_component = declination.sin() * latitude.cos()
        - declination.cos() * latitude.sin() * hour_angle.cos();

    if east_component.abs() < 1e-12 && north_component.abs() < 1e-12 {
        return 0.;
    }

    wrap_degrees(east_component.atan2(north_component).to_degrees())
}

/// Angle between the solar beam and the surface normal, 0 to 180 degrees.
pub fn angle_of_incidence(position: &SolarPosition, orientation: Orientation360, tilt: f64) -> f64 {
    let zenith = position.zenith.to_radians();
    let tilt = tilt.to_radians();
    let relative_azimuth = Orientation360::new(wrap_degrees(position.azimuth))
        .map(|sun| Orientation360::orientation_difference(sun, orientation))
        .unwrap_or_default()
        .to_radians();

    (zenith.cos() * tilt.cos() + zenith.sin() * tilt.sin() * relative_azimuth.cos())
        .clamp(-1., 1.)
        .acos()
        .to_degrees()
}

/// Isotropic sky view factor for a surface tilted `tilt` degrees.
pub fn sky_view_factor(tilt: f64) -> f64 {
    (1. + tilt.to_radians().cos()) / 2.
}

/// Split measured radiation into what one surface receives. Below the horizon
/// every component is zero whatever the measurement says.
pub fn surface_irradiance(
    direct_normal: f64,
    diffuse_horizontal: f64,
    global_horizontal: f64,
    surface_orientation: Orientation360,
    surface_tilt: f64,
    position: &SolarPosition,
    albedo: f64,
) -> OrientedIrradiance {
    if position.is_below_horizon() {
        return OrientedIrradiance::default();
    }

    let incidence = angle_of_incidence(position, surface_orientation, surface_tilt);
    let direct = if incidence > 90. {
        0.
    } else {
        direct_normal * incidence.to_radians().cos()
    };
    let diffuse = diffuse_horizontal * sky_view_factor(surface_tilt);
    let ground_reflected = global_horizontal * albedo * (1. - sky_view_factor(surface_tilt));

    OrientedIrradiance::from_components(direct, diffuse, ground_reflected)
}

/// Evaluate each surface independently for one hour of measurements.
pub fn irradiance_on_surfaces(
    direct_normal: f64,
    diffuse_horizontal: f64,
    global_horizontal: f64,
    surfaces: &[SurfaceOrientation],
    position: &SolarPosition,
    albedo: f64,
) -> Vec<OrientedIrradiance> {
    surfaces
        .iter()
        .map(|surface| {
            surface_irradiance(
                direct_normal,
                diffuse_horizontal,
                global_horizontal,
                surface.orientation,
                surface.tilt,
                position,
                albedo,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn at(month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn day_of_minutes(month: u32, day: u32) -> impl Iterator<Item = NaiveDateTime> {
        (0..24 * 60).map(move |m| at(month, day, m / 60, m % 60))
    }

    #[fixture]
    fn overhead_sun() -> SolarPosition {
        SolarPosition {
            zenith: 0.,
            azimuth: 0.,
        }
    }

    #[rstest]
    #[case(1, -23.0)]
    #[case(172, 23.45)]
    #[case(355, -23.45)]
    fn should_calculate_declination(#[case] day_of_year: u32, #[case] expected: f64) {
        assert_abs_diff_eq!(
            solar_declination(earth_orbit_deviation(day_of_year)),
            expected,
            epsilon = 0.3
        );
    }

    #[rstest]
    fn should_put_sun_overhead_at_tropic_on_solstice() {
        let min_zenith = day_of_minutes(6, 21)
            .map(|t| solar_position(t, 23.44, 0., 0.).zenith)
            .fold(f64::INFINITY, f64::min);

        assert!(min_zenith < 0.5, "minimum zenith was {min_zenith}");
    }

    #[rstest]
    fn should_have_sun_due_south_near_noon_in_northern_mid_latitudes() {
        let position = solar_position(at(4, 15, 12, 0), 51.5, 0., 0.);

        assert_abs_diff_eq!(position.azimuth, 180., epsilon = 2.);
        assert!(solar_position(at(4, 15, 9, 0), 51.5, 0., 0.).azimuth < 180.);
        assert!(solar_position(at(4, 15, 15, 0), 51.5, 0., 0.).azimuth > 180.);
    }

    #[rstest]
    fn should_shift_solar_noon_with_longitude_and_offset() {
        // 15º west in the UTC-1 zone sees the same sun as Greenwich in UTC
        let greenwich = solar_position(at(9, 1, 10, 0), 45., 0., 0.);
        let west = solar_position(at(9, 1, 10, 0), 45., -15., -1.);

        assert_relative_eq!(greenwich.zenith, west.zenith, max_relative = 1e-12);
        assert_relative_eq!(greenwich.azimuth, west.azimuth, max_relative = 1e-12);
    }

    #[rstest]
    fn should_keep_polar_night_and_polar_day() {
        assert!(day_of_minutes(12, 21)
            .step_by(15)
            .all(|t| solar_position(t, 89.9, 0., 0.).is_below_horizon()));
        assert!(day_of_minutes(6, 21)
            .step_by(15)
            .all(|t| !solar_position(t, 89.9, 0., 0.).is_below_horizon()));
    }

    #[rstest]
    #[case(-90.)]
    #[case(-45.)]
    #[case(0.)]
    #[case(60.)]
    #[case(90.)]
    fn should_keep_angles_in_range_all_year(#[case] latitude: f64) {
        for day in (1..=365).step_by(7) {
            for hour in 0..24 {
                let t = NaiveDate::from_yo_opt(2023, day)
                    .unwrap()
                    .and_hms_opt(hour, 30, 0)
                    .unwrap();
                let position = solar_position(t, latitude, 30., 2.);
                assert!((0. ..=180.).contains(&position.zenith));
                assert!((0. ..360.).contains(&position.azimuth));
            }
        }
    }

    #[rstest]
    fn should_evaluate_hourly_positions_at_mid_hour() {
        let location = LocationMetadata {
            latitude: 40.,
            longitude: -75.,
            utc_offset: -5.,
            elevation: 10.,
            ..Default::default()
        };
        let starts = [at(3, 1, 11, 0), at(3, 1, 12, 0)];

        let positions = hourly_solar_positions(&starts, &location);

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], solar_position(at(3, 1, 11, 30), 40., -75., -5.));
    }

    #[rstest]
    fn should_zero_every_component_below_horizon() {
        let night = SolarPosition {
            zenith: 95.,
            azimuth: 300.,
        };

        let irradiance = surface_irradiance(
            800.,
            200.,
            900.,
            Orientation360::new(270.).unwrap(),
            90.,
            &night,
            0.2,
        );

        assert_eq!(irradiance, OrientedIrradiance::default());
    }

    #[rstest]
    fn should_match_horizontal_measurements_for_flat_surface(overhead_sun: SolarPosition) {
        let irradiance = surface_irradiance(
            800.,
            100.,
            900.,
            Orientation360::new(180.).unwrap(),
            0.,
            &overhead_sun,
            0.2,
        );

        assert_relative_eq!(irradiance.direct, 800.);
        assert_relative_eq!(irradiance.diffuse, 100.);
        assert_abs_diff_eq!(irradiance.ground_reflected, 0., epsilon = 1e-12);
        assert_relative_eq!(irradiance.total, 900.);
    }

    #[rstest]
    fn should_decompose_onto_vertical_walls() {
        let low_southern_sun = SolarPosition {
            zenith: 60.,
            azimuth: 180.,
        };
        let surfaces = [
            SurfaceOrientation::vertical(180.),
            SurfaceOrientation::vertical(0.),
            SurfaceOrientation::vertical(90.),
        ];

        let irradiances =
            irradiance_on_surfaces(500., 100., 350., &surfaces, &low_southern_sun, 0.2);

        assert_relative_eq!(irradiances[0].direct, 500. * 0.75f64.sqrt(), max_relative = 1e-9);
        assert_relative_eq!(irradiances[0].diffuse, 50., max_relative = 1e-9);
        assert_relative_eq!(irradiances[0].ground_reflected, 35., max_relative = 1e-9);
        assert_eq!(irradiances[1].direct, 0.);
        assert_abs_diff_eq!(irradiances[2].direct, 0., epsilon = 1e-9);
        assert_relative_eq!(irradiances[1].diffuse, irradiances[0].diffuse);
    }

    #[rstest]
    fn should_floor_inconsistent_measurements_at_zero(overhead_sun: SolarPosition) {
        let irradiance = surface_irradiance(
            -10.,
            -5.,
            -1.,
            Orientation360::new(0.).unwrap(),
            45.,
            &overhead_sun,
            0.2,
        );

        assert_eq!(irradiance, OrientedIrradiance::default());
    }

    #[rstest]
    fn should_vary_equation_of_time_through_year() {
        assert_abs_diff_eq!(equation_of_time(43), 14.2, epsilon = 0.01);
        assert!(equation_of_time(306) < -16.);
        assert_abs_diff_eq!(equation_of_time(366), 3.15, epsilon = 0.01);
    }
}
