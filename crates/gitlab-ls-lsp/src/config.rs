//! Server configuration from `initializationOptions`
//!
//! Defaults are applied before validation, and the result is a fully
//! validated [`ServerConfig`] or a [`ConfigError`] describing the first
//! problem found.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use gitlab_ls_gitlab::ProjectPath;
use gitlab_ls_index::{IndexCache, DEFAULT_REFRESH_INTERVAL};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Rejected configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting absent
    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    /// Instance URL unusable
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// Offending value
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// Token unusable as a header value
    #[error("invalid private_token: {0}")]
    InvalidToken(&'static str),

    /// Empty project list
    #[error("'projects' must list at least one project")]
    NoProjects,

    /// Malformed project path
    #[error("invalid project '{path}': {reason}")]
    InvalidProject {
        /// Offending value
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// Project listed twice
    #[error("project '{0}' is listed more than once")]
    DuplicateProject(String),

    /// Out-of-range optional setting
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Setting name
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Options of the wrong JSON shape
    #[error("malformed initializationOptions: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
struct RawOptions {
    url: Option<String>,
    private_token: Option<String>,
    projects: Option<Vec<String>>,
    refresh_interval: Option<u64>,
    cache: Option<bool>,
    cache_path: Option<PathBuf>,
}

/// Validated server configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Instance base URL, without trailing slash
    pub url: Url,
    /// Access token sent as `PRIVATE-TOKEN`
    pub private_token: String,
    /// Projects to index, in configured order
    pub projects: Vec<ProjectPath>,
    /// Sleep between successful refreshes
    pub refresh_interval: Duration,
    /// Location of the on-disk index cache; `None` disables it
    pub cache_path: Option<PathBuf>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url.as_str())
            .field("private_token", &"<redacted>")
            .field("projects", &self.projects)
            .field("refresh_interval", &self.refresh_interval)
            .field("cache_path", &self.cache_path)
            .finish()
    }
}

impl ServerConfig {
    /// Resolve the `initializationOptions` of an `initialize` request
    pub fn resolve(options: Option<&Value>) -> Result<Self, ConfigError> {
        let raw: RawOptions = match options {
            None | Some(Value::Null) => return Err(ConfigError::Missing("initializationOptions")),
            Some(value) => RawOptions::deserialize(value)?,
        };

        let url = parse_url(raw.url.ok_or(ConfigError::Missing("url"))?)?;
        let private_token = check_token(raw.private_token.ok_or(ConfigError::Missing("private_token"))?)?;
        let projects = parse_projects(raw.projects.ok_or(ConfigError::Missing("projects"))?)?;

        let refresh_interval = match raw.refresh_interval {
            None => DEFAULT_REFRESH_INTERVAL,
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "refresh_interval",
                    reason: "must be at least 1 second".to_string(),
                })
            }
            Some(secs) => Duration::from_secs(secs),
        };

        let cache_path = if raw.cache.unwrap_or(true) {
            raw.cache_path.or_else(IndexCache::default_path)
        } else {
            None
        };

        Ok(Self {
            url,
            private_token,
            projects,
            refresh_interval,
            cache_path,
        })
    }

    /// Base URL as text, without trailing slash
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

fn parse_url(raw: String) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.clone(),
        reason: reason.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(invalid("empty"));
    }

    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment"));
    }

    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    Ok(url)
}

fn check_token(token: String) -> Result<String, ConfigError> {
    if token.trim().is_empty() {
        return Err(ConfigError::InvalidToken("empty"));
    }
    if token.chars().any(|c| c.is_control() || !c.is_ascii()) {
        return Err(ConfigError::InvalidToken("must be printable ASCII"));
    }
    Ok(token)
}

fn parse_projects(raw: Vec<String>) -> Result<Vec<ProjectPath>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoProjects);
    }

    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(raw.len());
    for entry in raw {
        let path = ProjectPath::parse(entry.as_str()).map_err(|e| ConfigError::InvalidProject {
            path: entry.clone(),
            reason: e.to_string(),
        })?;
        if !seen.insert(path.clone()) {
            return Err(ConfigError::DuplicateProject(entry));
        }
        projects.push(path);
    }
    Ok(projects)
}
