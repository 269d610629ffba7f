use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::jira::DEFAULT_PAGE_SIZE;
use crate::runner::HierarchyQueries;

const APP_DIR: &str = "jira-hierarchy";

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub jira: JiraConfig,
    #[serde(default)]
    pub queries: HierarchyQueries,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_idea_view_id")]
    pub idea_view_id: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            idea_view_id: default_idea_view_id(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub jira_base_url: Option<String>,
    pub jira_email: Option<String>,
    pub jira_api_token: Option<String>,
    pub jira_page_size: Option<usize>,
    pub months_of_closed_initiatives: Option<u32>,
    pub months_of_closed_plans: Option<u32>,
    pub logging_debug: Option<bool>,
}

impl AppConfigOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            jira_base_url: non_empty("JIRA_BASE_URL"),
            jira_email: non_empty("JIRA_EMAIL"),
            jira_api_token: non_empty("JIRA_API_TOKEN"),
            logging_debug: non_empty("JIRA_HIERARCHY_DEBUG").map(|value| is_truthy(&value)),
            ..Self::default()
        }
    }
}

pub fn is_truthy(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found at {path}. expected at $XDG_CONFIG_HOME/jira-hierarchy/config.toml or ~/.config/jira-hierarchy/config.toml")]
    MissingConfigFile { path: PathBuf },
    #[error("failed to resolve config path: HOME is not set and XDG_CONFIG_HOME is unset")]
    MissingHomeDirectory,
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load() -> Result<AppConfig, ConfigError> {
    let path = resolve_config_path()?;
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let path = path.to_path_buf();
    let raw = std::fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingConfigFile { path: path.clone() }
        } else {
            ConfigError::ReadFailed {
                path: path.clone(),
                source,
            }
        }
    })?;

    toml::from_str::<AppConfig>(&raw).map_err(|source| ConfigError::ParseFailed { path, source })
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME");
    let home = std::env::var_os("HOME");
    resolve_config_path_from_env(xdg_config_home, home)
}

fn resolve_config_path_from_env(
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = xdg_config_home.filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_DIR).join("config.toml"));
    }

    let home = home
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingHomeDirectory)?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join(APP_DIR)
        .join("config.toml"))
}

impl AppConfig {
    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) -> Result<(), ConfigError> {
        if let Some(value) = &overrides.jira_base_url {
            self.jira.base_url = value.clone();
        }
        if let Some(value) = &overrides.jira_email {
            self.jira.email = value.clone();
        }
        if let Some(value) = &overrides.jira_api_token {
            self.jira.api_token = value.clone();
        }
        if let Some(value) = overrides.jira_page_size {
            self.jira.page_size = value;
        }
        if let Some(value) = overrides.months_of_closed_initiatives {
            self.queries.months_of_closed_initiatives = value;
        }
        if let Some(value) = overrides.months_of_closed_plans {
            self.queries.months_of_closed_plans = value;
        }
        if let Some(value) = overrides.logging_debug {
            self.logging.debug = value;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jira.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.base_url must not be empty".into(),
            ));
        }
        if self.jira.email.trim().is_empty() {
            return Err(ConfigError::Invalid("jira.email must not be empty".into()));
        }
        if self.jira.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "jira.api_token must not be empty".into(),
            ));
        }
        if self.jira.page_size == 0 {
            return Err(ConfigError::Invalid("jira.page_size must be > 0".into()));
        }
        if self.queries.epic_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "queries.epic_batch_size must be > 0".into(),
            ));
        }
        for (name, jql) in [
            ("queries.initiatives_jql", &self.queries.initiatives_jql),
            ("queries.plans_jql", &self.queries.plans_jql),
        ] {
            if jql.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_idea_view_id() -> String {
    "6464278".to_string()
}
