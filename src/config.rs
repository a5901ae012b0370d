use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Category, DatasetRequest, Parameters};
use crate::error::KiraError;
use crate::store::DEFAULT_OUTPUT_DIR;
use crate::transport::HttpSettings;

pub const CONFIG_FILE: &str = "kira-cm.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub cache: Option<bool>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    /// `category:source:version`
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub category: Category,
    pub source: String,
    pub version: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_dir: Utf8PathBuf,
    pub cache: bool,
    pub http: HttpSettings,
    pub datasets: Vec<DatasetRequest>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            output_dir: Utf8PathBuf::from(DEFAULT_OUTPUT_DIR),
            cache: true,
            http: HttpSettings::default(),
            datasets: Vec::new(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-cm.json` in the working directory.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(KiraError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`] but falls back to defaults when no
    /// config file was named and none exists.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        match Self::resolve(path) {
            Err(KiraError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(KiraError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let defaults = HttpSettings::default();
        let http = config.http.unwrap_or_default();
        let http = HttpSettings {
            timeout: http
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: http.max_retries.unwrap_or(defaults.max_retries),
        };

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => value.parse(),
                DatasetEntry::Detailed(obj) => {
                    let mut request = DatasetRequest::new(obj.category, &obj.source, &obj.version);
                    request.parameters = obj.parameters;
                    Ok(request)
                }
            })
            .collect::<Result<Vec<_>, KiraError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            output_dir: config
                .output_dir
                .map(Utf8PathBuf::from)
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUTPUT_DIR)),
            cache: config.cache.unwrap_or(true),
            http,
            datasets,
        })
    }
}
