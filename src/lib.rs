//! `transit-plotter` library crate.
//!
//! The binary is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - modules are reusable (e.g., a future service wrapping the same pipeline)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod model;
pub mod plot;
pub mod report;
pub mod segment;
