use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Public GitHub REST API root.
pub const DEFAULT_HOST: &str = "https://api.github.com/";

const DEFAULT_CONFIG_FILE: &str = ".repo-digest.toml";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("repository not specified; use --repo=:owner/:repo")]
    MissingRepository,

    #[error("template not specified; use --template=:html_template")]
    MissingTemplate,

    #[error("Invalid repository {0:?}; expected :owner/:repo")]
    InvalidRepository(String),

    #[error("Invalid API host {0:?}")]
    InvalidHost(String),

    #[error("Failed to parse --{flag}={value}: {source}")]
    InvalidTimestamp {
        flag: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("--since={since} is after --before={before}")]
    InvertedWindow { since: String, before: String },
}

/// Contents of the optional .repo-digest.toml file.
///
/// Every field is optional; command-line flags take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// API root for self-hosted instances
    pub host: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub repos: Vec<String>,
    pub template: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub inline_styles: bool,
}

impl ConfigFile {
    /// Load the config file at `path`, or .repo-digest.toml in the current
    /// directory when no path is given. A missing default file yields an
    /// empty config; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(ConfigFile::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Values supplied on the command line. `None` / empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub repos: Vec<String>,
    pub token: Option<String>,
    pub host: Option<String>,
    pub since: Option<String>,
    pub before: Option<String>,
    pub template: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub inline_styles: bool,
}

/// A GitHub repository, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Accepts `owner/name`, `:owner/:name` or a github.com repository URL.
    pub fn parse(input: &str) -> Result<RepoId, ConfigError> {
        let invalid = || ConfigError::InvalidRepository(input.to_string());
        let trimmed = input.trim();

        let segments: Vec<String> = if trimmed.contains("://") {
            let parsed = reqwest::Url::parse(trimmed).map_err(|_| invalid())?;
            parsed
                .path_segments()
                .ok_or_else(invalid)?
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect()
        } else {
            trimmed.split('/').map(str::to_string).collect()
        };

        if segments.len() != 2 {
            return Err(invalid());
        }
        let owner = segments[0].trim_start_matches(':');
        let name = segments[1].trim_start_matches(':').trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            return Err(invalid());
        }

        Ok(RepoId {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl FromStr for RepoId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepoId::parse(s)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Resolved run configuration. Built once, then shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    /// API root, always ending in '/'
    pub host: String,
    pub repos: Vec<RepoId>,
    pub token: Option<String>,
    /// Exclusive lower bound of the window
    pub since: DateTime<Utc>,
    /// Exclusive upper bound of the window, if any
    pub before: Option<DateTime<Utc>>,
    /// Start instant of this run
    pub now: DateTime<Utc>,
    pub template: Option<PathBuf>,
    pub out_dir: PathBuf,
    pub inline_styles: bool,
    pub timeout: Duration,
}

impl Config {
    /// Merge the config file with command-line overrides and validate the
    /// result. Nothing here touches the network.
    pub fn resolve(
        file: ConfigFile,
        overrides: Overrides,
        now: DateTime<Utc>,
    ) -> Result<Config, ConfigError> {
        let repo_args = if overrides.repos.is_empty() {
            file.digest.repos
        } else {
            overrides.repos
        };
        if repo_args.is_empty() {
            return Err(ConfigError::MissingRepository);
        }
        let repos = repo_args
            .iter()
            .map(|r| RepoId::parse(r))
            .collect::<Result<Vec<_>, _>>()?;

        let host = normalize_host(
            overrides
                .host
                .or(file.github.host)
                .as_deref()
                .unwrap_or(DEFAULT_HOST),
        )?;

        let since = match overrides.since {
            Some(value) => parse_timestamp("since", &value)?,
            None => local_midnight(now),
        };
        let before = overrides
            .before
            .map(|value| parse_timestamp("before", &value))
            .transpose()?;
        if let Some(before) = before {
            if since > before {
                return Err(ConfigError::InvertedWindow {
                    since: since.to_rfc3339(),
                    before: before.to_rfc3339(),
                });
            }
        }

        let token = overrides
            .token
            .or(file.github.token)
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty());

        Ok(Config {
            host,
            repos,
            token,
            since,
            before,
            now,
            template: overrides.template.or(file.digest.template),
            out_dir: overrides
                .out_dir
                .or(file.digest.out_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            inline_styles: overrides.inline_styles || file.digest.inline_styles,
            timeout: Duration::from_secs(
                file.github.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        })
    }

    /// The digest template path; required before any digest is fetched.
    pub fn template(&self) -> Result<&Path, ConfigError> {
        self.template.as_deref().ok_or(ConfigError::MissingTemplate)
    }

    /// Upper end of the window: `before` if given, otherwise `now`.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.before.unwrap_or(self.now)
    }

    /// True if `t` falls strictly after `since` and strictly before `before`.
    pub fn in_window(&self, t: DateTime<Utc>) -> bool {
        t > self.since && self.before.map_or(true, |before| t < before)
    }

    /// Absolute API URL for a path relative to the host root.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.host, path.trim_start_matches('/'))
    }
}

fn normalize_host(host: &str) -> Result<String, ConfigError> {
    let parsed =
        reqwest::Url::parse(host).map_err(|_| ConfigError::InvalidHost(host.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidHost(host.to_string()));
    }
    let mut normalized = parsed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn parse_timestamp(flag: &'static str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| ConfigError::InvalidTimestamp {
            flag,
            value: value.to_string(),
            source,
        })
}

/// Start of the current local day, the default `since`.
fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now)
}
