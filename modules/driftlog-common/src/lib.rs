pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::Config;
pub use error::DriftlogError;
pub use time::{fmt_offset, fmt_span, fmt_time, parse_millis, to_wire_time};
pub use types::*;
