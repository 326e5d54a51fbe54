/// `load_config` module: builds the typed [`Settings`] from an optional YAML
/// file and the process environment.
///
/// Precedence, lowest first: built-in defaults, the YAML file, environment
/// variables. Validation happens once, in [`Settings::try_from`]; a missing
/// required key is reported before any network activity.
///
/// The YAML file mirrors [`RawSettings`]:
///
/// ```yaml
/// sink:
///   region: eu-west-1
///   application_id: 0f6c...
///   data_source_id: 1a2b...
///   index_id: 9e8d...
/// source:
///   base_url: https://kb.example.com/api
/// sync:
///   batch_size: 10
///   max_retries: 3
/// ```
use anyhow::{Context, Result};
use index_sync_core::config::RawSettings;
use index_sync_core::config::Settings;
use index_sync_core::error::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{error, info};

/// Names the YAML file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "INDEX_SYNC_CONFIG";

/// Loads the YAML file at `path` (or `$INDEX_SYNC_CONFIG`, if set), overlays
/// environment variables and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<Settings> {
    let path: Option<PathBuf> = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    let mut raw = match &path {
        Some(path) => read_raw_settings(path)?,
        None => {
            info!("No config file given, using defaults and environment");
            RawSettings::default()
        }
    };

    apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;

    let settings = Settings::try_from(raw).map_err(|e| {
        error!(error = %e, "Configuration is invalid");
        e
    })?;
    Ok(settings)
}

pub fn read_raw_settings(path: &Path) -> Result<RawSettings> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {path:?}"))?;
    let raw: RawSettings = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config YAML {path:?}"))?;
    info!(config_path = ?path, "Parsed config YAML successfully");
    Ok(raw)
}

/// Overlay environment variables onto `raw`. `lookup` is `std::env::var` in
/// production and a map in tests.
pub fn apply_env_overrides<F>(raw: &mut RawSettings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |slot: &mut Option<String>, var: &str| {
        if let Some(value) = lookup(var) {
            *slot = Some(value);
        }
    };
    text(&mut raw.sink.region, "AWS_REGION");
    text(&mut raw.sink.application_id, "QBUSINESS_APPLICATION_ID");
    text(&mut raw.sink.data_source_id, "QBUSINESS_DATA_SOURCE_ID");
    text(&mut raw.sink.index_id, "QBUSINESS_INDEX_ID");
    text(&mut raw.source.base_url, "SOURCE_API_BASE_URL");
    text(&mut raw.source.token, "SOURCE_API_TOKEN");
    text(&mut raw.source.username, "SOURCE_API_USERNAME");
    text(&mut raw.source.password, "SOURCE_API_PASSWORD");
    text(&mut raw.plugin.name, "PLUGIN_NAME");
    text(&mut raw.plugin.version, "PLUGIN_VERSION");
    text(&mut raw.logging.level, "LOG_LEVEL");

    parsed(&mut raw.source.page_size, &lookup, "SOURCE_PAGE_SIZE", "source.page_size")?;
    parsed(&mut raw.source.timeout_secs, &lookup, "SOURCE_TIMEOUT_SECS", "source.timeout_secs")?;
    parsed(&mut raw.sync.batch_size, &lookup, "SYNC_BATCH_SIZE", "sync.batch_size")?;
    parsed(&mut raw.sync.interval_secs, &lookup, "SYNC_INTERVAL_SECS", "sync.interval_secs")?;
    parsed(&mut raw.sync.max_retries, &lookup, "MAX_RETRIES", "sync.max_retries")?;
    parsed(&mut raw.sync.retry_delay_ms, &lookup, "RETRY_DELAY_MS", "sync.retry_delay_ms")?;
    parsed(&mut raw.sync.page_delay_ms, &lookup, "PAGE_DELAY_MS", "sync.page_delay_ms")?;
    parsed(&mut raw.sync.batch_delay_ms, &lookup, "BATCH_DELAY_MS", "sync.batch_delay_ms")?;
    Ok(())
}

fn parsed<T, F>(
    slot: &mut Option<T>,
    lookup: &F,
    var: &str,
    key: &'static str,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(var) {
        let value = value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: format!("{var}={value:?}: {e}"),
        })?;
        *slot = Some(value);
    }
    Ok(())
}
