//! # lib_webgis
//!
//! Building blocks for the `linz-traffic` batch fetcher. Each folder is gated
//! behind a cargo feature of the same name so consumers only pull in the
//! dependencies they need.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Layered run configuration (defaults, JSON file, env/CLI overrides).
#[cfg(feature = "configs")]
pub mod configs;

/// fern based logging setup.
#[cfg(feature = "loggers")]
pub mod loggers;

/// Generic HTTP client used by every WebGIS call.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Authentication, fetching, partitioning and writing of traffic datasets.
#[cfg(feature = "webgis")]
pub mod webgis;
