//! Logging setup for cometway.
//!
//! Everything in the workspace logs through `tracing`. This crate owns the
//! subscriber configuration so the binary, the integration tests and any
//! embedding process install the same layers.

pub use tracing::{debug, error, info, instrument, span, trace, warn, Level, Span};
pub use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target used for lines forwarded from the consensus engine's stdout/stderr
pub const ENGINE_TARGET: &str = "cometbft";

pub type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Install a JSON subscriber filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() -> InitResult {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .try_init()?;

    Ok(())
}

/// Install a subscriber with an explicit filter directive.
///
/// `json` selects structured output; otherwise a compact human format is used,
/// which is what the CLI prints to a terminal.
pub fn init_tracing_with_level(level: &str, json: bool) -> InitResult {
    let filter = EnvFilter::try_new(level)?;
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()?;
    }

    Ok(())
}

/// Subscriber for tests: debug level, captured by the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing_test() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}
