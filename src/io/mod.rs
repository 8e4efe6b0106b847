//! File I/O: light-curve loading, CSV exports, and the failed-transit sidecar.

pub mod export;
pub mod failed;
pub mod loader;
