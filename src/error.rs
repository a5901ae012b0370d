use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Category;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid category: {0} (expected compound or reaction)")]
    InvalidCategory(String),

    #[error("invalid dataset request: {0}")]
    InvalidDatasetRequest(String),

    #[error("unknown {category} data source: {source_id}")]
    #[diagnostic(help("run `kira-cm sources` to list known sources"))]
    UnknownSource {
        category: Category,
        source_id: String,
    },

    #[error("{category} data source already registered: {source_id}")]
    DuplicateSource {
        category: Category,
        source_id: String,
    },

    #[error("invalid source descriptor {source_id}: {reason}")]
    InvalidDescriptor { source_id: String, reason: String },

    #[error("unsupported version {version:?} for {source_id}; supported: {}", .supported.join(", "))]
    UnsupportedVersion {
        source_id: String,
        version: String,
        supported: Vec<String>,
    },

    #[error("version {version:?} of {source_id} matches several patterns: {}", .patterns.join(", "))]
    #[diagnostic(help("this is a registry integrity fault, please report it"))]
    AmbiguousVersion {
        source_id: String,
        version: String,
        patterns: Vec<String>,
    },

    #[error("parameter {name} is bound to {given:?} but version string implies {extracted:?}")]
    ParameterMismatch {
        name: String,
        given: String,
        extracted: String,
    },

    #[error("retrieval plan for {0} has no steps")]
    EmptyPlan(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("server returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("missing config file kira-cm.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    /// User-input errors abort before any I/O and are never retried.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            KiraError::InvalidCategory(_)
                | KiraError::InvalidDatasetRequest(_)
                | KiraError::UnknownSource { .. }
                | KiraError::UnsupportedVersion { .. }
                | KiraError::ParameterMismatch { .. }
        )
    }

    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            KiraError::AmbiguousVersion { .. }
                | KiraError::DuplicateSource { .. }
                | KiraError::InvalidDescriptor { .. }
                | KiraError::EmptyPlan(_)
        )
    }
}
