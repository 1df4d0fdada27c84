use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stemdeck_core::{
    OrchestratorConfig, SessionPolicy, TracingOptions, UploadPolicy,
    diagnostics::{DEFAULT_LOG_FILTER, DEFAULT_TRACE_FILE_PREFIX},
    waveform::DEFAULT_CACHE_ENTRIES,
};
pub const CONFIG_FILE_NAME: &str = "stemdeck.config.toml";
pub const CONFIG_PATH_ENV: &str = "STEMDECK_CONFIG_PATH";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file was found; carries the discovery error.
    Defaults(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub waveform: WaveformConfig,
    pub session: SessionConfig,
    pub playback: PlaybackConfig,
    pub diagnostics: DiagnosticsConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub upload_path: String,
    pub separate_path: String,
    pub generate_path: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaveformConfig {
    pub width: usize,
    pub height: usize,
    pub cache_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub clear_styles_on_replace: bool,
    pub style_catalog: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub player_binary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub logs_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3838/".to_string(),
            upload_path: "/upload".to_string(),
            separate_path: "/separate".to_string(),
            generate_path: "/generate".to_string(),
            // Separation of a full song routinely takes minutes.
            request_timeout_secs: 900,
            user_agent: format!("stemdeck/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        let policy = UploadPolicy::default();
        Self {
            allowed_extensions: policy.allowed_extensions,
            max_bytes: policy.max_bytes,
        }
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            width: 96,
            height: 12,
            cache_entries: DEFAULT_CACHE_ENTRIES,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clear_styles_on_replace: true,
            style_catalog: [
                "jazz",
                "rock",
                "funk",
                "lofi",
                "electronic",
                "orchestral",
                "ambient",
                "hip hop",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_binary: "ffplay".to_string(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: DEFAULT_TRACE_FILE_PREFIX.to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file {}", config_path.display()))?;

        toml::from_str(&content).with_context(|| {
            format!("failed to parse config TOML from {}", config_path.display())
        })
    }

    /// Like [`AppConfig::load`], but a missing file yields defaults. A file
    /// that exists and fails to parse is still an error. Nothing is logged
    /// here; tracing is usually not installed yet, so the caller reports the
    /// returned [`ConfigSource`] once it is.
    pub fn load_or_default() -> Result<(Self, ConfigSource)> {
        Self::load_discovered(discover_config_path())
    }

    fn load_discovered(discovered: Result<PathBuf>) -> Result<(Self, ConfigSource)> {
        match discovered {
            Ok(path) => Ok((Self::load_from(&path)?, ConfigSource::File(path))),
            Err(error) => Ok((Self::default(), ConfigSource::Defaults(error.to_string()))),
        }
    }

    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            session: SessionPolicy {
                clear_styles_on_replace: self.session.clear_styles_on_replace,
            },
            upload: UploadPolicy {
                allowed_extensions: self.upload.allowed_extensions.clone(),
                max_bytes: self.upload.max_bytes,
            },
        }
    }

    #[must_use]
    pub fn tracing_options(&self) -> TracingOptions {
        TracingOptions {
            file_prefix: self.diagnostics.trace_file_prefix.clone(),
            default_filter: self.diagnostics.rust_log_filter.clone(),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}
