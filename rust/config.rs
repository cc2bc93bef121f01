use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub login: String,
    pub password: String,
    pub webhook_url: String,
    pub debug: bool,
    pub environment: Environment,
    pub poll_interval: Duration,
    pub student_index: Option<u32>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .with_context(|| format!("{key} must be set in the environment or .env file"))
        };

        let login = required("LIBRUS_LOGIN")?;
        let password = required("LIBRUS_PASSWORD")?;
        let webhook_url = required("WEBHOOK_URL")?;

        let debug = lookup("DEBUG_MODE").map(|v| v == "1").unwrap_or(false);

        let environment = match lookup("ENV").as_deref() {
            Some("prod") => Environment::Production,
            Some("dev") | None => Environment::Development,
            Some(other) => bail!("ENV must be `prod` or `dev`, got `{other}`"),
        };

        let minutes = match lookup("POLL_INTERVAL_MINUTES") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("POLL_INTERVAL_MINUTES is not a number: {raw}"))?,
            None => DEFAULT_POLL_INTERVAL_MINUTES,
        };
        if minutes == 0 {
            bail!("POLL_INTERVAL_MINUTES must be greater than zero");
        }

        let student_index = match lookup("LIBRUS_STUDENT_INDEX") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u32>()
                    .with_context(|| format!("LIBRUS_STUDENT_INDEX is not a number: {raw}"))?,
            ),
            _ => None,
        };

        Ok(Self {
            login,
            password,
            webhook_url,
            debug,
            environment,
            poll_interval: Duration::from_secs(minutes * 60),
            student_index,
        })
    }
}
