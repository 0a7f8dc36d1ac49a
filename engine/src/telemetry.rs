//! Logging setup
//!
//! Installs a `tracing-subscriber` registry that writes to stderr, so log
//! lines never interleave with replies printed on stdout.
//!
//! Priority: `RUST_LOG` > `--log` > `core.log_level` > "warn". Debug builds
//! print pretty, human-oriented lines; release builds print JSON.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for the given level.
///
/// Dependencies (reqwest, hyper, the mongodb driver) stay at `warn` unless
/// `RUST_LOG` says otherwise.
pub fn filter_directive(log_level: &str) -> String {
    format!("warn,parley_engine={0},parley={0}", log_level)
}

/// Initialize the tracing subscriber with the given level.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}
