//! Detection backends.

pub mod process;
pub mod template;

pub use process::{ProcessBackend, DEFAULT_CLEANUP_TIMEOUT};
pub use template::CommandTemplate;
