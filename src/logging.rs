//! Tracing subscriber installation.

use std::sync::OnceLock;

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a formatted subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `filter`. Only the first call installs
/// anything; later calls still validate `filter`.
pub fn install_tracing_subscriber(filter: &str) -> Result<(), ParseError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)?,
    };
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init();
    });
    Ok(())
}
