//! monofn Dashboard
//!
//! Periodically reads the runtime's result key from the store, aggregates the
//! results it finds and serves them as an auto-refreshing HTML page and JSON.
//!
//! # Architecture
//!
//! - [`Poller`] owns the [`Aggregator`] and is the only writer of the
//!   [`SharedSnapshot`]
//! - [`DashboardServer`] serves whatever snapshot was last published
//!
//! A failed poll never clears the published data; it is reported in
//! [`PollStatus`] and shown as a warning on the page.

pub mod aggregator;
pub mod config;
pub mod poller;
pub mod renderer;
pub mod snapshot;

pub use aggregator::Aggregator;
pub use config::DashboardConfig;
pub use poller::{Poller, TickOutcome};
pub use renderer::DashboardServer;
pub use snapshot::{DashboardSnapshot, PollStatus, RawRead, SharedSnapshot, Summary};
