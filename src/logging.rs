//! Diagnostic logging setup.
//!
//! `env_logger` is installed once with a pass-everything filter; the effective
//! verbosity is the `log` crate's global max level, which the console can
//! change at runtime.
//!
//! When `RUST_LOG` is set its filter is used as-is and caps what the console
//! can raise verbosity to; `log.level trace` cannot show records `RUST_LOG`
//! filters out.

use anyhow::{anyhow, Result};
use log::LevelFilter;
use std::str::FromStr;

/// Install the logger and apply `level`. Safe to call more than once.
pub fn init(level: LevelFilter) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let _ = builder(rust_log.as_deref()).try_init();
    set_level(level);
    if let Some(filters) = rust_log.filter(|filters| !filters.trim().is_empty()) {
        log::info!(
            "RUST_LOG={} is set; console log levels cannot exceed it",
            filters
        );
    }
}

/// Logger builder: `RUST_LOG` directives when given, otherwise let everything
/// through and leave filtering to the global max level.
fn builder(rust_log: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    match rust_log.map(str::trim).filter(|filters| !filters.is_empty()) {
        Some(filters) => {
            builder.parse_filters(filters);
        }
        None => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.format_timestamp_millis();
    builder
}

/// Verbosity used when nothing is configured.
pub fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

pub fn parse_level(value: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(value.trim()).map_err(|_| {
        anyhow!(
            "unknown log level '{}' (expected off, error, warn, info, debug or trace)",
            value
        )
    })
}

pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

pub fn current_level() -> LevelFilter {
    log::max_level()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_level("info").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level(" off ").unwrap(), LevelFilter::Off);
    }

    #[test]
    fn builder_passes_everything_without_rust_log() {
        assert_eq!(builder(None).build().filter(), LevelFilter::Trace);
        assert_eq!(builder(Some("  ")).build().filter(), LevelFilter::Trace);
    }

    #[test]
    fn builder_honours_rust_log_directives() {
        assert_eq!(builder(Some("warn")).build().filter(), LevelFilter::Warn);
    }

    #[test]
    fn rejects_unknown_level() {
        let err = parse_level("bogus").unwrap_err();
        assert!(err.to_string().contains("unknown log level 'bogus'"));
    }
}
