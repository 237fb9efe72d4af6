//! Shared utilities for the POHA node.

pub mod logging;
pub mod shutdown;

pub use logging::{init_logging, LogFormat};
pub use shutdown::{ShutdownController, ShutdownSignal};
