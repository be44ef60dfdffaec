use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::{AppError, Result};
use directories::ProjectDirs;
use dotenvy::dotenv;
use serde::Deserialize;
use url::Url;

/// Environment variable holding the segmentation service base URL.
pub const API_URL_ENV: &str = "SEGMASK_API_URL";

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_base_url: Url,
}

/// Optional on-disk settings, read once at startup and never written back.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    #[serde(default)]
    api_base_url: Option<String>,
}

impl Config {
    /// Resolves the configuration: environment, then `settings.json`, then the loopback default.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let from_env = env::var(API_URL_ENV).ok().filter(|v| !v.trim().is_empty());
        let raw = match from_env {
            Some(url) => url,
            None => Self::settings_path()
                .and_then(|path| fs::read_to_string(path).ok())
                .map(|content| Self::parse_settings(&content))
                .transpose()?
                .and_then(|s| s.api_base_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        };

        Self::builder().with_api_base_url(raw).build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Joins `path` onto the base URL, keeping any path prefix the base carries.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.api_base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| AppError::config(format!("Invalid endpoint path {path}: {e}")))
    }

    fn settings_path() -> Option<PathBuf> {
        ProjectDirs::from("", "segmask", "segmask").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    fn parse_settings(content: &str) -> Result<FileSettings> {
        serde_json::from_str(content)
            .map_err(|e| AppError::config(format!("Invalid settings.json: {e}")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
        }
    }
}

#[derive(Default)]
pub struct ConfigBuilder {
    api_base_url: Option<String>,
}

impl ConfigBuilder {
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<Config> {
        let raw = self.api_base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_base_url = Url::parse(raw.trim())
            .map_err(|e| AppError::config(format!("Invalid API base URL '{raw}': {e}")))?;

        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(AppError::config(format!(
                "API base URL must use http or https, got '{}'",
                api_base_url.scheme()
            )));
        }

        Ok(Config { api_base_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path() {
        let config = Config::builder()
            .with_api_base_url("https://seg.example.com/v1")
            .build()
            .unwrap();
        let url = config.endpoint("/api/upload_and_segment").unwrap();
        assert_eq!(url.as_str(), "https://seg.example.com/v1/api/upload_and_segment");
    }

    #[test]
    fn default_points_at_loopback() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config.endpoint("healthz").unwrap().as_str(), "http://localhost:8000/healthz");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(Config::builder().with_api_base_url("ftp://host").build().is_err());
        assert!(Config::builder().with_api_base_url("not a url").build().is_err());
    }

    #[test]
    fn settings_file_is_optional_per_field() {
        let settings = Config::parse_settings("{}").unwrap();
        assert!(settings.api_base_url.is_none());
        let settings = Config::parse_settings(r#"{"api_base_url":"http://10.0.0.2:9000"}"#).unwrap();
        assert_eq!(settings.api_base_url.as_deref(), Some("http://10.0.0.2:9000"));
    }
}
