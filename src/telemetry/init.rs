// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry initialization and configuration.

use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::redact::RedactingMakeWriter;

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Whether to include span events (enter/exit).
    pub include_span_events: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to include target module path.
    pub include_target: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Whether to use compact log format.
    pub compact: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            include_span_events: false,
            include_file_line: false,
            include_target: true,
            ansi_colors: true,
            compact: true,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Verbose output for local debugging.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_span_events: true,
            include_file_line: true,
            include_target: true,
            ansi_colors: true,
            compact: false,
            filter_directive: None,
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_level.to_string());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Guard that keeps the logger installed for the program's lifetime.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber.
///
/// All output goes to stderr through the secret redactor, so stdout stays
/// free for command results.
///
/// ```rust,ignore
/// use scanflow::telemetry::{init_telemetry, TelemetryConfig};
///
/// let _guard = init_telemetry(&TelemetryConfig::default())?;
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let filter = config.env_filter();

    let span_events = if config.include_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_writer(RedactingMakeWriter::new(io::stderr))
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events);

    if config.compact {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.compact())
            .try_init()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    }

    Ok(TelemetryGuard { _private: () })
}
