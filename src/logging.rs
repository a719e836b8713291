//! Tracing subscriber setup for the binary.

use std::error::Error;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "schema_delta=info";

/// Pick the filter directive: `RUST_LOG` first, then the configured one.
fn build_filter(configured: Option<&str>) -> Result<EnvFilter, Box<dyn Error>> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = configured.unwrap_or(DEFAULT_LOG_FILTER);
    EnvFilter::try_new(directive).map_err(|e| format!("Invalid log filter '{}': {}", directive, e).into())
}

/// Install a stderr `fmt` layer. Output on stdout stays reserved for
/// command results.
pub fn init_logging(configured: Option<&str>) -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(build_filter(configured)?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
