//! Logging set-up.
//!
//! Compact timestamped output with per-module levels. `RUST_LOG` overrides
//! the configured levels:
//!
//! ```bash
//! RUST_LOG=debug hostbridge serve
//! RUST_LOG=bridge=trace,refresh=debug hostbridge serve
//! ```
//!
//! Targets used throughout the crate: `bridge`, `refresh`, `diagnostics`,
//! `patch`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter string from config (`default,module=level,...`).
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter = config.default.clone();
    for (module, level) in &config.modules {
        filter.push_str(&format!(",{module}={level}"));
    }
    filter
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A test harness may already have installed a subscriber
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

pub fn init() {
    init_with_config(&LoggingConfig::default());
}
