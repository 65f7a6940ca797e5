pub mod current;
pub mod day;

pub use current::{CurrentDaySeries, WaitOutcome, WaitToken};
pub use day::DaySeries;
