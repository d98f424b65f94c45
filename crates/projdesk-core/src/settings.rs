//! Operator settings: where the document lives and how to reach it.
//!
//! Read from `.projdesk/config.toml` under the project root, else from
//! `<config dir>/projdesk/config.toml`, else defaults. Environment variables
//! override the file; credentials only ever come from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::remote::file::FileDocumentClient;
use crate::remote::gist::{DEFAULT_FILENAME, GistClient, GistConfig};
use crate::remote::{DocumentClient, RetryPolicy, Retrying};

pub const GIST_ID_ENV: &str = "PROJDESK_GIST_ID";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DOCUMENT_ENV: &str = "PROJDESK_DOCUMENT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub remote: RemoteSettings,
    /// Preferred output mode: `pretty`, `text` or `json`.
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gist,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub gist_id: Option<String>,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            gist_id: None,
            filename: default_filename(),
            path: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Environment values that override the settings file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub gist_id: Option<String>,
    pub token: Option<String>,
    pub document: Option<PathBuf>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            gist_id: get(GIST_ID_ENV),
            token: get(TOKEN_ENV),
            document: get(DOCUMENT_ENV).map(PathBuf::from),
        }
    }
}

/// Returned when neither settings nor environment name a document.
#[derive(Debug, thiserror::Error)]
#[error("no remote document configured (backend {backend:?})")]
pub struct RemoteNotConfigured {
    pub backend: Backend,
}

/// Where the document lives, fully resolved.
#[derive(Debug, Clone)]
pub enum RemoteTarget {
    Gist(GistConfig),
    File(PathBuf),
}

/// Load settings for `project_root`, falling back to the user config dir.
///
/// # Errors
///
/// Returns an error if a settings file exists but cannot be read or parsed.
pub fn load_settings(project_root: &Path) -> Result<Settings> {
    let local = project_root.join(".projdesk/config.toml");
    if local.exists() {
        return read_settings(&local);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(Settings::default());
    };
    let user = config_dir.join("projdesk/config.toml");
    if user.exists() {
        return read_settings(&user);
    }
    Ok(Settings::default())
}

fn read_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let settings = toml::from_str::<Settings>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

/// Combine settings and environment into a concrete target.
///
/// `PROJDESK_DOCUMENT` forces the file backend.
///
/// # Errors
///
/// Returns [`RemoteNotConfigured`] when the chosen backend lacks its gist id
/// or path.
pub fn resolve_target(settings: &RemoteSettings, env: &EnvOverrides) -> Result<RemoteTarget> {
    if let Some(path) = &env.document {
        return Ok(RemoteTarget::File(path.clone()));
    }

    match settings.backend {
        Backend::File => settings
            .path
            .clone()
            .map(RemoteTarget::File)
            .ok_or_else(|| RemoteNotConfigured { backend: Backend::File }.into()),
        Backend::Gist => {
            let gist_id = env
                .gist_id
                .clone()
                .or_else(|| settings.gist_id.clone())
                .ok_or(RemoteNotConfigured { backend: Backend::Gist })?;
            let mut config = GistConfig::new(gist_id);
            config.filename.clone_from(&settings.filename);
            config.token.clone_from(&env.token);
            config.timeout = Duration::from_secs(settings.timeout_secs.max(1));
            Ok(RemoteTarget::Gist(config))
        }
    }
}

/// Build the document client for `target`, with retries per `settings`.
#[must_use]
pub fn build_client(target: RemoteTarget, settings: &RemoteSettings) -> Arc<dyn DocumentClient> {
    let policy = RetryPolicy {
        max_attempts: settings.max_attempts.max(1),
        ..RetryPolicy::default()
    };
    match target {
        RemoteTarget::Gist(config) => Arc::new(Retrying::new(GistClient::new(config), policy)),
        RemoteTarget::File(path) => Arc::new(Retrying::new(FileDocumentClient::new(path), policy)),
    }
}

/// Pick the output mode: `--json` flag, then `FORMAT`, then settings, then TTY.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    configured: Option<&str>,
    env_format: Option<&str>,
) -> &'static str {
    fn normalize(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json";
    }
    if let Some(mode) = env_format.and_then(normalize) {
        return mode;
    }
    if let Some(mode) = configured.and_then(normalize) {
        return mode;
    }
    if std::io::stdout().is_terminal() {
        "pretty"
    } else {
        "text"
    }
}

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    3
}
