//! Utilities module for errors, logging, and monitoring scalars
//!
//! This module provides:
//! - The crate error type
//! - Structured logging with tracing
//! - Named summary scalars recorded per global step
//! - Host-side tensor reads

pub mod error;
pub mod logging;
pub mod summary;
pub mod tensor;

pub use error::{AssocError, Result};
pub use logging::init_logging;
pub use summary::{ScalarRecord, SummaryWriter};
