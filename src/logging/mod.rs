//! Logging and output control
//!
//! This module provides the [`Logger`] used for user-visible progress lines,
//! and [`init`] which installs the `tracing` subscriber every line ends up
//! in. Low-level events (one per API call, admission waits, retries) are
//! emitted directly with `tracing` macros by the modules that own them.

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. `RUST_LOG` takes precedence over `debug`.
pub fn init(debug: bool) {
    let default_level = if debug { "repliquay=debug" } else { "repliquay=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

/// Logger responsible for all user-visible output
#[derive(Debug, Clone)]
pub struct Logger {
    pub verbose: bool,
    pub start_time: Instant,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Logger {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            start_time: Instant::now(),
        }
    }

    /// Main section heading
    pub fn section(&self, title: &str) {
        tracing::info!("=== {} ===", title);
    }

    pub fn subsection(&self, title: &str) {
        tracing::info!("--- {} ---", title);
    }

    pub fn step(&self, message: &str) {
        tracing::info!("▶ {}", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    pub fn success(&self, message: &str) {
        tracing::info!("✓ {}", message);
    }

    pub fn warning(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    /// Detailed information (only shown in verbose mode)
    pub fn detail(&self, message: &str) {
        if self.verbose {
            tracing::debug!("  {}", message);
        }
    }

    /// Key-value pair summary display
    pub fn summary_kv(&self, title: &str, items: &[(&str, String)]) {
        self.subsection(title);
        for (key, value) in items {
            tracing::info!("  {}: {}", key, value);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Format duration in human-readable format
    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        let logger = Logger::new(false);
        assert_eq!(logger.format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(logger.format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(logger.format_duration(Duration::from_secs(3725)), "1h2m5s");
    }

    #[test]
    fn test_init_is_idempotent() {
        init(true);
        init(false);
    }
}
