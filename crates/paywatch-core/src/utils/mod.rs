//! Amount and timestamp helpers shared by the registry and the matcher.

pub mod format;

pub use format::{
    amount_from_minor_units, format_timestamp, normalize_amount, now_seconds, parse_timestamp,
    parse_upstream_time, CURRENCY_PRECISION,
};
