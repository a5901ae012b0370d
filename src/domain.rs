use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Compound,
    Reaction,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Compound => "compound",
            Category::Reaction => "reaction",
        }
    }

    pub fn all() -> [Category; 2] {
        [Category::Compound, Category::Reaction]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "compound" => Ok(Category::Compound),
            "reaction" => Ok(Category::Reaction),
            _ => Err(KiraError::InvalidCategory(value.to_string())),
        }
    }
}

/// Parameter bindings for templated versions, ordered for stable output.
pub type Parameters = BTreeMap<String, String>;

/// Whether every field of a dataset version is wired, or only the structure field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "note", rename_all = "lowercase")]
pub enum SupportLevel {
    Full,
    Partial(String),
}

impl SupportLevel {
    pub fn is_partial(&self) -> bool {
        matches!(self, SupportLevel::Partial(_))
    }
}

impl fmt::Display for SupportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupportLevel::Full => write!(f, "full"),
            SupportLevel::Partial(note) => write!(f, "partial ({note})"),
        }
    }
}

/// A `category:source:version` triple plus bindings for templated versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRequest {
    pub category: Category,
    pub source: String,
    pub version: String,
    pub parameters: Parameters,
}

impl DatasetRequest {
    pub fn new(category: Category, source: &str, version: &str) -> Self {
        Self {
            category,
            source: source.trim().to_lowercase(),
            version: version.trim().to_string(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.insert(name.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for DatasetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.category, self.source, self.version)
    }
}

impl FromStr for DatasetRequest {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let mut parts = trimmed.splitn(3, ':');
        let (Some(category), Some(source), Some(version)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(KiraError::InvalidDatasetRequest(value.to_string()));
        };
        if source.trim().is_empty() || version.trim().is_empty() {
            return Err(KiraError::InvalidDatasetRequest(value.to_string()));
        }
        Ok(DatasetRequest::new(category.parse()?, source, version))
    }
}

/// Parses `name=value` bindings as given on the command line.
pub fn parse_parameter(value: &str) -> Result<(String, String), KiraError> {
    let (name, bound) = value
        .split_once('=')
        .ok_or_else(|| KiraError::InvalidDatasetRequest(format!("parameter {value}")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(KiraError::InvalidDatasetRequest(format!("parameter {value}")));
    }
    Ok((name.to_string(), bound.trim().to_string()))
}
