use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};
use crate::proposals::ProposalMode;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub proposals: ProposalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub health_centers_csv: Option<PathBuf>,
    pub population_csv: Option<PathBuf>,
    #[serde(default = "default_population_date")]
    pub population_date: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            health_centers_csv: None,
            population_csv: None,
            population_date: default_population_date(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProposalConfig {
    #[serde(default = "default_city")]
    pub city: String,
    // Drop earlier suggestions instead of appending next to them
    #[serde(default)]
    pub replace_previous: bool,
}

impl ProposalConfig {
    pub fn mode(&self) -> ProposalMode {
        if self.replace_previous {
            ProposalMode::Replace
        } else {
            ProposalMode::Append
        }
    }
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            city: default_city(),
            replace_previous: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            static_dir: None,
        }
    }
}

pub fn default_population_date() -> String {
    "1 de enero de 2024".to_string()
}

fn default_city() -> String {
    "Madrid".to_string()
}

fn default_port() -> u16 {
    8000
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
