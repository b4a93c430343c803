//! The `utils` module provides shared pieces used across the `tcpsub` crate:
//! the error types every layer returns and the tracing initialisation used by
//! the binary and tests.

pub mod error;
pub mod logging;
