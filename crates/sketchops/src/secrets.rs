//! Secret lookup from the process environment.
//!
//! Every secret `NAME` can be given directly (`NAME=value`) or through a
//! file (`NAME_FILE=/run/secrets/name`, the Docker secrets pattern). The
//! direct value wins when both are set. Values are trimmed, and an empty
//! value counts as unset.

use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to read {name} from '{path}': {source}")]
    FileRead {
        name: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable '{name}' contains invalid UTF-8")]
    NotUnicode { name: String },
}

fn env_value(name: &str) -> Result<Option<String>, SecretError> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value.trim().to_string()).filter(|v| !v.is_empty())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::NotUnicode {
            name: name.to_string(),
        }),
    }
}

/// Resolves `name` from `NAME` or the file named by `NAME_FILE`.
/// Returns `Ok(None)` when neither is set.
pub fn env_secret(name: &str) -> Result<Option<SecretString>, SecretError> {
    if let Some(value) = env_value(name)? {
        return Ok(Some(SecretString::from(value)));
    }

    let file_var = format!("{}_FILE", name);
    let Some(path) = env_value(&file_var)? else {
        return Ok(None);
    };
    let path = expand_home(&path);
    let content = std::fs::read_to_string(&path).map_err(|e| SecretError::FileRead {
        name: name.to_string(),
        path: path.clone(),
        source: e,
    })?;
    let content = content.trim();
    if content.is_empty() {
        return Ok(None);
    }
    Ok(Some(SecretString::from(content)))
}

/// Plain (non-secret) variable with the same `NAME` / `NAME_FILE` lookup.
pub fn env_plain(name: &str) -> Result<Option<String>, SecretError> {
    Ok(env_secret(name)?.map(|s| s.expose_secret().to_string()))
}

/// Expands a leading `~` to the home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
