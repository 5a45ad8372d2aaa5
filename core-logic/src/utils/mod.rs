//! # Utilities Module
//!
//! Internal utility modules for the core-logic crate.
//! These modules are marked as `pub(crate)` to enforce API boundaries.

pub(crate) mod gas;
pub(crate) mod logger;
pub(crate) mod retry;

pub use gas::{GasConfig, GasConfigToml, StandardGasLimits};
pub use logger::{setup_logger, OPERATION_TARGET};
pub use retry::{is_transient_error, with_retry, RetryConfig};
