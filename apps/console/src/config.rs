use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use console_core::ConsoleSettings;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

/// `console.toml` layout. Every key is optional; missing keys keep the
/// built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    backend_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    log_capacity: Option<usize>,
    fee_rate: Option<f64>,
    stale_after_ms: Option<u64>,
    planner_target: Option<f64>,
    strategy: Option<FileStrategy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileStrategy {
    ticker: Option<String>,
    quantity: Option<f64>,
    spread: Option<f64>,
    interval: Option<u64>,
    boost_mode: Option<bool>,
    max_exposure: Option<f64>,
}

/// Flag values that take precedence over file and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

/// Resolves settings: defaults, then the config file, then environment,
/// then command-line overrides.
///
/// An explicitly named file must exist; the default `console.toml` is only
/// read when present.
pub fn load_settings<E>(
    explicit_file: Option<&Path>,
    env: E,
    overrides: &Overrides,
) -> anyhow::Result<ConsoleSettings>
where
    E: Fn(&str) -> Option<String>,
{
    let mut settings = ConsoleSettings::default();

    let raw = match explicit_file {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file '{}'", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };
    if let Some(raw) = raw {
        let file_cfg: FileConfig = toml::from_str(&raw).context("invalid console config file")?;
        apply_file(&mut settings, file_cfg);
    }

    apply_env(&mut settings, &env)?;

    if let Some(url) = &overrides.backend_url {
        settings.backend_url = url.clone();
    }
    if let Some(ms) = overrides.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(ms);
    }

    check(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut ConsoleSettings, file_cfg: FileConfig) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.log_capacity {
        settings.log_capacity = v;
    }
    if let Some(v) = file_cfg.fee_rate {
        settings.fee_rate = v;
    }
    if let Some(v) = file_cfg.stale_after_ms {
        settings.stale_after = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.planner_target {
        settings.planner_target = v;
    }
    if let Some(strategy) = file_cfg.strategy {
        let target = &mut settings.strategy;
        if let Some(v) = strategy.ticker {
            target.ticker = v;
        }
        if let Some(v) = strategy.quantity {
            target.quantity = v;
        }
        if let Some(v) = strategy.spread {
            target.spread = v;
        }
        if let Some(v) = strategy.interval {
            target.interval = v;
        }
        if let Some(v) = strategy.boost_mode {
            target.boost_mode = v;
        }
        if let Some(v) = strategy.max_exposure {
            target.max_exposure = v;
        }
    }
}

fn apply_env<E>(settings: &mut ConsoleSettings, env: &E) -> anyhow::Result<()>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("CONSOLE_BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        settings.poll_interval = Duration::from_millis(parse_env("APP__POLL_INTERVAL_MS", &v)?);
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_MS") {
        settings.request_timeout =
            Duration::from_millis(parse_env("APP__REQUEST_TIMEOUT_MS", &v)?);
    }
    if let Some(v) = env("APP__LOG_CAPACITY") {
        settings.log_capacity = parse_env("APP__LOG_CAPACITY", &v)?;
    }
    if let Some(v) = env("APP__FEE_RATE") {
        settings.fee_rate = parse_env("APP__FEE_RATE", &v)?;
    }
    if let Some(v) = env("APP__STALE_AFTER_MS") {
        settings.stale_after = Duration::from_millis(parse_env("APP__STALE_AFTER_MS", &v)?);
    }
    if let Some(v) = env("APP__PLANNER_TARGET") {
        settings.planner_target = parse_env("APP__PLANNER_TARGET", &v)?;
    }
    if let Some(v) = env("APP__TICKER") {
        settings.strategy.ticker = v;
    }
    Ok(())
}

fn parse_env<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value '{raw}'"))
}

fn check(settings: &ConsoleSettings) -> anyhow::Result<()> {
    if settings.poll_interval.is_zero() {
        bail!("poll interval must be greater than zero");
    }
    if settings.log_capacity == 0 {
        bail!("log capacity must be at least 1");
    }
    if !settings.fee_rate.is_finite() || settings.fee_rate < 0.0 {
        bail!("fee rate must be a non-negative number, got {}", settings.fee_rate);
    }
    if !settings.planner_target.is_finite() || settings.planner_target < 0.0 {
        bail!(
            "planner target must be a non-negative number, got {}",
            settings.planner_target
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
