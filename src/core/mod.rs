pub mod psychrometrics;
pub mod solar;
pub mod solvers;
pub mod units;
pub mod wind;
