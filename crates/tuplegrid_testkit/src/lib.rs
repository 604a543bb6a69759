//! # TupleGrid Testkit
//!
//! Test utilities for TupleGrid.
//!
//! This crate provides:
//! - Grid fixtures over the reference datastores
//! - An error handler that records what it is told
//! - Property-based test generators using proptest
//! - Stress testing utilities
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tuplegrid_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_grid() {
//!     with_map_grid(|grid| {
//!         grid.transaction(|session| {
//!             session.insert(shipment_key(1), shipment_tuple(1, "INITIAL"));
//!             Ok(())
//!         })
//!         .unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
