//! Marketfeed Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the marketfeed workspace.
//!
//! Currently this is the home of the logging setup used by every binary:
//!
//! ```no_run
//! use marketfeed_common::logging::{LogConfig, init_logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("application started");
//!     Ok(())
//! }
//! ```

pub mod logging;
