//! Logger initialisation for the client binary and tests.

use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initialises the global logger.
///
/// When `verbose` is `true` the client's own modules log at debug level;
/// otherwise only info and above are shown. `RUST_LOG` takes precedence
/// over both defaults.
pub fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let env = Env::default().default_filter_or(format!("warn,trundle={level}"));
    let mut builder = Builder::from_env(env);
    builder.format_timestamp_millis();

    // Only fails when a logger is already installed, which repeated test
    // setup does routinely.
    if builder.try_init().is_err() {
        log::debug!("logger already initialised");
    }
}
