use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::provision::ArtifactDescriptor;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub image: ImageConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub url: String,
    pub path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    pub size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid model url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("label table is empty")]
    NoLabels,
    #[error("image size must be non-zero")]
    ZeroImageSize,
}

impl AppConfig {
    /// Reads the YAML config, applies env overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&raw)?;

        if let Ok(url) = env::var("MODEL_URL") {
            config.model.url = url;
        }
        if let Ok(model_path) = env::var("MODEL_PATH") {
            config.model.path = PathBuf::from(model_path);
        }
        if config.model.path.is_relative() {
            config.model.path = base_dir().join(&config.model.path);
        }

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.model.url).map_err(|source| ConfigError::InvalidUrl {
            url: self.model.url.clone(),
            source,
        })?;
        if self.labels.is_empty() {
            return Err(ConfigError::NoLabels);
        }
        if self.image.size == 0 {
            return Err(ConfigError::ZeroImageSize);
        }
        Ok(())
    }

    pub fn artifact(&self) -> ArtifactDescriptor {
        ArtifactDescriptor {
            url: self.model.url.clone(),
            path: self.model.path.clone(),
            sha256: self.model.sha256.clone(),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup.timeout_secs)
    }
}

fn config_path() -> PathBuf {
    if let Ok(path) = env::var("CLASSIFIER_CONFIG") {
        return PathBuf::from(path);
    }
    base_dir().join("config/classifier.yaml")
}

fn base_dir() -> PathBuf {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        Path::new(&manifest_dir).join("..")
    } else {
        PathBuf::from(".")
    }
}

pub fn static_dir() -> String {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        format!("{}/../static", manifest_dir)
    } else {
        "/usr/src/app/static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml(url: &str, labels: &str) -> String {
        format!(
            "model:\n  url: \"{url}\"\n  path: models/export.pt\nimage:\n  size: 64\nlabels: {labels}\n"
        )
    }

    #[test]
    fn parses_minimal_config() {
        let raw = minimal_yaml("https://example.com/export.pt", "[Banana, Lemon]");
        let config = AppConfig::from_yaml(&raw).unwrap();
        assert_eq!(config.labels, vec!["Banana", "Lemon"]);
        assert_eq!(config.image.size, 64);
        assert_eq!(config.startup.timeout_secs, 60);
        assert!(config.model.sha256.is_none());
    }

    #[test]
    fn rejects_empty_label_table() {
        let raw = minimal_yaml("https://example.com/export.pt", "[]");
        assert!(matches!(
            AppConfig::from_yaml(&raw),
            Err(ConfigError::NoLabels)
        ));
    }

    #[test]
    fn rejects_invalid_model_url() {
        let raw = minimal_yaml("not a url", "[Banana]");
        assert!(matches!(
            AppConfig::from_yaml(&raw),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn startup_timeout_is_overridable() {
        let raw = format!(
            "{}startup:\n  timeout_secs: 5\n",
            minimal_yaml("https://example.com/export.pt", "[Banana]")
        );
        let config = AppConfig::from_yaml(&raw).unwrap();
        assert_eq!(config.startup_timeout(), Duration::from_secs(5));
    }
}
