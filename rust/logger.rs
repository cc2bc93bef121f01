use std::env;
use tracing_subscriber::EnvFilter;

use crate::config::Environment;

pub fn init_logging(debug: bool, environment: Environment) {
    let level = if debug { "debug" } else { "info" };

    let filter = match env::var("RUST_LOG") {
        Ok(rust_log) => EnvFilter::new(rust_log),
        Err(_) => EnvFilter::new(level),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match environment {
        Environment::Production => builder.json().with_ansi(false).init(),
        Environment::Development => builder.compact().init(),
    }
}
