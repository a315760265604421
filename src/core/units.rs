use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use thiserror::Error;

pub const ZERO_CELSIUS_IN_KELVIN: f64 = 273.15;
pub const STANDARD_ATMOSPHERIC_PRESSURE: f64 = 101_325.;
pub const GRAMS_PER_KILOGRAM: f64 = 1_000.;
pub const MINUTES_PER_HOUR: u32 = 60;
/// Earth rotation, in degrees of hour angle per hour of time.
pub const DEGREES_PER_HOUR: f64 = 15.;

pub fn celsius_to_kelvin(temp_c: f64) -> Result<f64, BelowAbsoluteZeroError> {
    if temp_c < -ZERO_CELSIUS_IN_KELVIN {
        Err(BelowAbsoluteZeroError::from_c(temp_c))
    } else {
        Ok(temp_c + ZERO_CELSIUS_IN_KELVIN)
    }
}

/// Wrap any finite angle in degrees into 0..360.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360. {
        0.
    } else {
        wrapped
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
#[error("A temperature of {k}ºK/{}ºC was encountered, which is less than absolute zero", k - ZERO_CELSIUS_IN_KELVIN)]
pub struct BelowAbsoluteZeroError {
    k: f64,
}

impl BelowAbsoluteZeroError {
    fn from_c(c: f64) -> Self {
        Self {
            k: c + ZERO_CELSIUS_IN_KELVIN,
        }
    }
}

/// A compass bearing in degrees clockwise from North, 0 to 360 inclusive.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, PartialOrd, Serialize, Validate)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Orientation360(
    #[validate(minimum = 0.)]
    #[validate(maximum = 360.)]
    f64,
);

impl Orientation360 {
    pub fn new(angle: f64) -> Result<Self, Orientation360Error> {
        if !(0. ..=360.).contains(&angle) {
            return Err(Orientation360Error::InvalidAngle);
        }

        Ok(Self(angle))
    }

    pub fn angle(&self) -> f64 {
        self.0
    }

    /// Smallest absolute angle between two bearings, 0 to 180.
    pub fn orientation_difference(
        orientation1: Orientation360,
        orientation2: Orientation360,
    ) -> f64 {
        let op_rel_orientation = (orientation1.angle() - orientation2.angle()).abs();

        if op_rel_orientation > 180. {
            360. - op_rel_orientation
        } else {
            op_rel_orientation
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum Orientation360Error {
    #[error("Angle must be between 0 and 360 degrees inclusive")]
    InvalidAngle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_refuse_temperatures_below_absolute_zero() {
        assert_eq!(celsius_to_kelvin(20.).unwrap(), 293.15);
        assert!(celsius_to_kelvin(-300.).is_err());
    }

    #[rstest]
    #[case(0., 0.)]
    #[case(360., 0.)]
    #[case(-45., 315.)]
    #[case(725., 5.)]
    #[case(359.5, 359.5)]
    fn should_wrap_degrees(#[case] angle: f64, #[case] expected: f64) {
        assert_eq!(wrap_degrees(angle), expected);
    }

    #[rstest]
    fn should_never_wrap_to_360() {
        assert!(wrap_degrees(-1e-20) < 360.);
    }

    mod orientation360 {
        use super::*;
        use pretty_assertions::assert_eq;

        #[rstest]
        fn test_orientation360_angle() {
            assert_eq!(Orientation360::new(180.).unwrap().angle(), 180.);
        }

        #[rstest]
        fn test_orientation360_invalid_angle() {
            assert!(Orientation360::new(-10.).is_err());
            assert!(Orientation360::new(380.).is_err());
        }

        #[rstest]
        #[case(10., 350., 20.)]
        #[case(90., 270., 180.)]
        #[case(0., 45., 45.)]
        fn test_orientation_difference(#[case] a: f64, #[case] b: f64, #[case] expected: f64) {
            assert_eq!(
                Orientation360::orientation_difference(
                    Orientation360::new(a).unwrap(),
                    Orientation360::new(b).unwrap()
                ),
                expected
            );
        }
    }
}
