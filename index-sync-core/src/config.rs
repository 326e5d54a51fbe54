//! Typed settings for a synchronisation run.
//!
//! [`RawSettings`] mirrors what a config file or the environment can express:
//! every field optional. [`Settings::try_from`] validates it once, fills in
//! defaults and yields the strongly-typed [`Settings`] that every component is
//! constructed from. Nothing reads configuration after that point.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PLUGIN_NAME: &str = "index-sync";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 100;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSettings {
    pub sink: RawSinkSettings,
    pub source: RawSourceSettings,
    pub sync: RawSyncSettings,
    pub plugin: RawPluginSettings,
    pub logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSinkSettings {
    pub region: Option<String>,
    pub application_id: Option<String>,
    pub data_source_id: Option<String>,
    pub index_id: Option<String>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSourceSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub page_size: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for RawSourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSourceSettings")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawSyncSettings {
    pub batch_size: Option<usize>,
    pub interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub page_delay_ms: Option<u64>,
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawPluginSettings {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawLoggingSettings {
    pub level: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sink: SinkSettings,
    pub source: SourceSettings,
    pub sync: SyncSettings,
    pub plugin: PluginSettings,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    pub region: String,
    pub application_id: String,
    pub data_source_id: String,
    /// Only the Q Business uploader needs this; a dry run does not.
    pub index_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Without a trailing slash.
    pub base_url: String,
    pub auth: SourceAuth,
    pub page_size: u32,
    pub timeout: Duration,
}

/// Credentials attached to every source request.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceAuth {
    None,
    Bearer(String),
    Basic {
        username: String,
        password: Option<String>,
    },
}

impl fmt::Debug for SourceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAuth::None => f.write_str("None"),
            SourceAuth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            SourceAuth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl SourceAuth {
    /// A token wins over username/password. Secrets are kept byte for byte;
    /// only an empty value counts as absent.
    pub fn resolve(
        token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        match (present(token), non_empty(username)) {
            (Some(token), _) => SourceAuth::Bearer(token),
            (None, Some(username)) => SourceAuth::Basic {
                username,
                password: present(password),
            },
            (None, None) => SourceAuth::None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceAuth::None => "none",
            SourceAuth::Bearer(_) => "bearer",
            SourceAuth::Basic { .. } => "basic",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitPolicy,
}

/// Exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts per batch, first one included.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Courtesy sleeps between outbound calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Between two page requests to the source.
    pub page_delay: Duration,
    /// Between two successful batch uploads.
    pub batch_delay: Duration,
}

impl RateLimitPolicy {
    pub fn none() -> Self {
        Self {
            page_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSettings {
    pub name: String,
    pub version: String,
}

impl PluginSettings {
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    non_empty(value).ok_or(ConfigError::Missing(key))
}

fn positive<T: PartialOrd + Default>(value: T, key: &'static str) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".into(),
        })
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = ConfigError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let RawSettings {
            sink,
            source,
            sync,
            plugin,
            logging,
        } = raw;

        let application_id = required(sink.application_id, "sink.application_id")?;
        let data_source_id = required(sink.data_source_id, "sink.data_source_id")?;
        let base_url = required(source.base_url, "source.base_url")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "source.base_url",
                reason: format!("{base_url:?} is not an http(s) URL"),
            });
        }

        let sink = SinkSettings {
            region: non_empty(sink.region).unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            application_id,
            data_source_id,
            index_id: non_empty(sink.index_id),
        };

        let source = SourceSettings {
            base_url: base_url.trim_end_matches('/').to_owned(),
            auth: SourceAuth::resolve(source.token, source.username, source.password),
            page_size: positive(
                source.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
                "source.page_size",
            )?,
            timeout: Duration::from_secs(positive(
                source.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
                "source.timeout_secs",
            )?),
        };

        let sync = SyncSettings {
            batch_size: positive(
                sync.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                "sync.batch_size",
            )?,
            interval: Duration::from_secs(
                sync.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            ),
            retry: RetryPolicy {
                max_retries: positive(
                    sync.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                    "sync.max_retries",
                )?,
                base_delay: Duration::from_millis(
                    sync.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
            },
            rate_limit: RateLimitPolicy {
                page_delay: Duration::from_millis(
                    sync.page_delay_ms.unwrap_or(DEFAULT_PAGE_DELAY_MS),
                ),
                batch_delay: Duration::from_millis(
                    sync.batch_delay_ms.unwrap_or(DEFAULT_BATCH_DELAY_MS),
                ),
            },
        };

        let plugin = PluginSettings {
            name: non_empty(plugin.name).unwrap_or_else(|| DEFAULT_PLUGIN_NAME.to_owned()),
            version: non_empty(plugin.version)
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_owned()),
        };

        Ok(Settings {
            sink,
            source,
            sync,
            plugin,
            log_level: non_empty(logging.level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned()),
        })
    }
}

impl Settings {
    pub fn trace_loaded(&self) {
        info!(
            region = %self.sink.region,
            application_id = %self.sink.application_id,
            data_source_id = %self.sink.data_source_id,
            index_id = self.sink.index_id.as_deref().unwrap_or("<unset>"),
            base_url = %self.source.base_url,
            auth = self.source.auth.kind(),
            batch_size = self.sync.batch_size,
            max_retries = self.sync.retry.max_retries,
            plugin = %self.plugin.user_agent(),
            "Loaded settings"
        );
        debug!(?self, "Settings loaded (full debug)");
    }
}
