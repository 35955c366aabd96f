use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{buffer::DEFAULT_RETENTION, collector::DEFAULT_INTERVAL};

/// Samples host memory and serves the last 24 hours as a chart.
#[derive(Debug, Clone, Parser)]
#[command(version)]
pub struct Config {
    /// Debug logging
    #[arg(short, long)]
    pub debug: bool,
    /// Host interface to bind to
    #[arg(long, default_value = "localhost")]
    pub host: String,
    /// Port to bind to
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    /// Data file to persist samples in
    #[arg(long)]
    pub data: PathBuf,
    /// Time between two samples
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub interval: Duration,
    /// How long samples are kept
    #[arg(long, value_parser = humantime::parse_duration, default_value = "4weeks")]
    pub retention: Duration,
}
impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["memchart", "--data", "/tmp/mem.json"]).unwrap();
        assert!(!config.debug);
        assert_eq!(config.addr(), "localhost:8080");
        assert_eq!(config.data, PathBuf::from("/tmp/mem.json"));
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.retention, DEFAULT_RETENTION);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn data_is_required() {
        assert!(Config::try_parse_from(["memchart"]).is_err());
    }

    #[test]
    fn overrides() {
        let config = Config::try_parse_from([
            "memchart",
            "-d",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--data",
            "mem.json",
            "--interval",
            "15m",
            "--retention",
            "2weeks",
        ])
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.addr(), "0.0.0.0:9000");
        assert_eq!(config.interval, Duration::from_secs(15 * 60));
        assert_eq!(config.retention, Duration::from_secs(14 * 24 * 60 * 60));
        assert_eq!(config.log_level(), "debug");
    }
}
