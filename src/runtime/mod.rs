//! Runtime surface: status snapshots and shutdown signal handling.

pub mod api;
pub mod shutdown;

pub use api::{health, snapshot, Health, StatusSnapshot};
pub use shutdown::{cancel_on_signal, wait_for_shutdown_signal};
