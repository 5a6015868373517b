/// fern dispatch writing to the console and a per-run log file.
pub mod loggerlocal;

pub use loggerlocal::{setup_logging, LoggerError};
