//! Domain types, error taxonomy, and status-engine legality rules shared by
//! every TorreClou crate. This crate does no I/O: it is the pure core that
//! the store, dispatcher, and stages all build on.

pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod job;
pub mod provider;
pub mod queue;
pub mod status_engine;
pub mod sync;
pub mod transfer_progress;

pub use error::TorreClouError;
pub use ids::*;
