//! Shared test fixtures for the binding workspace.
//!
//! Provides throwaway data directories for configuration files and a
//! process-wide tracing subscriber:
//! - `DataDir`: temporary base directory with file helpers
//! - `init_tracing`: routes `tracing` output through the test harness
//!
//! Data directories are removed when the fixture is dropped.

mod fixtures;

pub use fixtures::*;
