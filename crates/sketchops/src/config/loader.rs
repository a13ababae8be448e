use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::config::{DEFAULT_GENERATION_TIMEOUT, DEFAULT_MAX_CONTENT_CHARS};
use crate::secrets::{env_plain, env_secret};

use super::schema::*;

fn optional<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = env_plain(name)? else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        })
}

fn positive(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match optional::<u64>(name)? {
        Some(0) => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}

fn seconds(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(positive(name)?.map(Duration::from_secs).unwrap_or(default))
}

/// Reads the service configuration from the process environment.
///
/// Every missing required variable is reported at once.
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    let api_key = env_secret("API_KEY")?;
    let database_path = env_plain("DATABASE_PATH")?;
    let google_api_key = env_secret("GOOGLE_API_KEY")?;

    let (api_key, database_path, google_api_key) = match (api_key, database_path, google_api_key)
    {
        (Some(a), Some(d), Some(g)) => (a, d, g),
        (a, d, g) => {
            let missing = [
                ("API_KEY", a.is_none()),
                ("DATABASE_PATH", d.is_none()),
                ("GOOGLE_API_KEY", g.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            return Err(ConfigError::Missing(missing));
        }
    };

    Ok(ServiceConfig {
        api_key,
        database_path: PathBuf::from(database_path),
        google_api_key,
        poll_interval: positive("POLL_INTERVAL_SECS")?.map(Duration::from_secs),
        config_wait: seconds("CONFIG_WAIT_SECS", DEFAULT_CONFIG_WAIT)?,
        error_backoff: seconds("ERROR_BACKOFF_SECS", DEFAULT_ERROR_BACKOFF)?,
        output_dir: env_plain("OUTPUT_DIR")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        generation_timeout: seconds("GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT)?,
        import_timeout: seconds("IMPORT_TIMEOUT_SECS", DEFAULT_IMPORT_TIMEOUT)?,
        timesketch_bin: env_plain("TIMESKETCH_BIN")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TIMESKETCH_BIN)),
        api_url: env_plain("API_URL")?,
        uploads_dir: env_plain("UPLOADS_DIR")?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
        max_content_chars: positive("MAX_CONTENT_CHARS")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_CONTENT_CHARS),
        max_batch_messages: positive("MAX_BATCH_MESSAGES")?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_BATCH_MESSAGES),
    })
}
