//! Runtime settings loaded from `wirecheck.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::corroborate::DEFAULT_MIN_IDENTIFIER_LENGTH;
use crate::reachability::DEFAULT_MAX_HOPS;

pub const SETTINGS_FILE: &str = "wirecheck.toml";
pub const DEFAULT_POLICY_FILE: &str = ".wirecheck.yml";

pub const REPORTER_URL_ENV: &str = "WIRECHECK_REPORTER_URL";
pub const REPORTER_TOKEN_ENV: &str = "WIRECHECK_REPORTER_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub analysis: AnalysisSettings,
    pub scheduler: SchedulerSettings,
    pub pipeline: PipelineSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
    pub reporter: ReporterSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub max_hops: usize,
    pub min_identifier_length: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            max_hops: DEFAULT_MAX_HOPS,
            min_identifier_length: DEFAULT_MIN_IDENTIFIER_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub debounce_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings { debounce_ms: 30_000 }
    }
}

impl SchedulerSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub policy_file: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            timeout_secs: 300,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            policy_file: DEFAULT_POLICY_FILE.to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            dir: PathBuf::from(".wirecheck/store"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterSettings {
    pub url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Clone URL with a `{repo}` placeholder.
    pub remote_template: String,
    /// The only branch whose pushes re-map the stored graph.
    pub default_branch: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            remote_template: "https://github.com/{repo}.git".to_string(),
            default_branch: "main".to_string(),
        }
    }
}

impl SourceSettings {
    pub fn remote_for(&self, repo: &str) -> String {
        self.remote_template.replace("{repo}", repo)
    }
}

impl Settings {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load `wirecheck.toml` from `dir` if present, then apply environment overrides.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(text) => {
                info!("Loaded settings from {}", path.display());
                Settings::parse(&text)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No {} in {}, using defaults", SETTINGS_FILE, dir.display());
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Reporter credentials from the environment win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(REPORTER_URL_ENV).filter(|v| !v.is_empty()) {
            self.reporter.url = Some(url);
        }
        if let Some(token) = lookup(REPORTER_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.reporter.token = Some(token);
        }
    }
}
