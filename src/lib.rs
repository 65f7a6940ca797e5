//! tallydb: a single-process time-series store for sale events.
//!
//! One open day takes writes; rotation snapshots it into an immutable closed
//! day, keeps a bounded set of recent days in memory, and retires days past
//! the retention window. Blocking queries watch the live day; a binary frame
//! protocol plus session layer form the connection boundary.

pub mod aggregation;
pub mod config;
pub mod encoding;
pub mod error;
pub mod event;
pub mod flock;
pub mod lru;
pub mod persist;
pub mod protocol;
pub mod scheduler;
pub mod series;
pub mod session;
pub mod store;
pub mod users;

pub use aggregation::Aggregation;
pub use config::DbConfig;
pub use error::{Error, Result};
pub use event::Event;
pub use scheduler::{BackgroundTask, RotationTask, Scheduler};
pub use series::{CurrentDaySeries, DaySeries, WaitOutcome, WaitToken};
pub use session::Session;
pub use store::{FilterOutcome, TimeSeriesDb};
pub use users::{User, UserManager};
