mod store;

pub use store::{FilterOutcome, TimeSeriesDb};
