use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize, // sources at least this large are filtered with rayon
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_cache_max_bytes() -> usize {
    64 * 1024 * 1024 // 64MiB
}
fn default_parallel_threshold() -> usize {
    20_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            cache_max_bytes: default_cache_max_bytes(),
            parallel_threshold: default_parallel_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub page_size: Option<usize>, // falls back to viewport height when None
    #[serde(default = "default_true")]
    pub show_annotations: bool,
}

fn default_theme() -> String {
    "dark".into()
}
fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            page_size: None,
            show_annotations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_frame_budget")]
    pub frame_budget_ms: u64,
    #[serde(default = "default_filter_budget")]
    pub filter_budget_ms: u64,
}

fn default_frame_budget() -> u64 {
    16 // ~60fps
}
fn default_filter_budget() -> u64 {
    50
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: default_frame_budget(),
            filter_budget_ms: default_filter_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tasklens")
            .join("config.toml")
    }

    pub fn load() -> crate::Result<Self> {
        let path = if let Ok(env_path) = std::env::var("TASKLENS_CONFIG") {
            PathBuf::from(env_path) // $TASKLENS_CONFIG overrides default config path
        } else {
            Self::config_path()
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let mut cfg: Self =
            toml::from_str(&content).map_err(|e| crate::TaskLensError::Config(e.to_string()))?;
        if cfg.background.max_concurrency == 0 {
            cfg.background.max_concurrency = 1; // the pool must have at least one worker
        }
        Ok(cfg)
    }

    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::TaskLensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
