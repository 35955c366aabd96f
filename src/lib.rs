use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

pub mod buffer;
pub mod collector;
pub mod config;
pub mod error;
pub mod persist;
pub mod server;
pub mod view;

pub use error::{Error, Result};

/// Seconds since the Unix epoch.
pub type Time = u64;
pub type FieldKey = String;
pub type Fields = BTreeMap<FieldKey, f64>;

pub const MEMORY_FREE: &str = "memory_free";
pub const MEMORY_USED: &str = "memory_used";

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub fields: Fields,
}
impl Sample {
    pub fn new(time: Time, fields: Fields) -> Self {
        Self { time, fields }
    }
}

pub fn now() -> Time {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
