use std::fmt;

use serde::Serialize;

use crate::domain::{Category, Parameters, SupportLevel};
use crate::error::KiraError;
use crate::parsers::ParserSpec;
use crate::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Gzip,
    Zip,
    TarBz2,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Gzip => write!(f, "gzip"),
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::TarBz2 => write!(f, "tar.bz2"),
        }
    }
}

/// What a retrieval step downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "format", rename_all = "snake_case")]
pub enum ContentKind {
    File,
    Archive(ArchiveFormat),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Location {
    Direct { url: String },
    /// A JSON API whose response carries the download link at `pointer`.
    Indirect { api_url: String, pointer: String },
}

impl Location {
    pub fn url(&self) -> &str {
        match self {
            Location::Direct { url } => url,
            Location::Indirect { api_url, .. } => api_url,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Direct { url } => f.write_str(url),
            Location::Indirect { api_url, pointer } => write!(f, "{api_url} ({pointer})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalStep {
    pub location: Location,
    pub file_name: String,
    pub content: ContentKind,
    /// Archive members to parse, in order. Empty means every member.
    pub members: Vec<String>,
    pub parser: ParserSpec,
}

/// Concrete steps for one resolved dataset version. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalPlan {
    pub category: Category,
    pub source: String,
    pub version: String,
    pub citation: String,
    pub support: SupportLevel,
    pub parameters: Parameters,
    steps: Vec<RetrievalStep>,
}

impl RetrievalPlan {
    pub fn new(
        category: Category,
        source: &str,
        version: &str,
        citation: String,
        support: SupportLevel,
        parameters: Parameters,
        steps: Vec<RetrievalStep>,
    ) -> Result<Self, KiraError> {
        if steps.is_empty() {
            return Err(KiraError::EmptyPlan(format!("{category}:{source}:{version}")));
        }
        Ok(Self {
            category,
            source: source.to_string(),
            version: version.to_string(),
            citation,
            support,
            parameters,
            steps,
        })
    }

    pub fn steps(&self) -> &[RetrievalStep] {
        &self.steps
    }

    pub fn citation_url(&self) -> String {
        format!("https://doi.org/{}", self.citation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocationTemplate {
    Direct(String),
    Indirect { api_url: String, pointer: String },
}

/// A retrieval step whose strings may carry `{name}` placeholders bound by
/// the matching version pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTemplate {
    location: LocationTemplate,
    file_name: String,
    content: ContentKind,
    members: Vec<String>,
    parser: ParserSpec,
}

impl StepTemplate {
    pub fn direct(url: &str, file_name: &str, parser: ParserSpec) -> Self {
        Self::with_location(LocationTemplate::Direct(url.to_string()), file_name, parser)
    }

    pub fn indirect(api_url: &str, pointer: &str, file_name: &str, parser: ParserSpec) -> Self {
        Self::with_location(
            LocationTemplate::Indirect {
                api_url: api_url.to_string(),
                pointer: pointer.to_string(),
            },
            file_name,
            parser,
        )
    }

    fn with_location(location: LocationTemplate, file_name: &str, parser: ParserSpec) -> Self {
        Self {
            location,
            file_name: file_name.to_string(),
            content: ContentKind::File,
            members: Vec::new(),
            parser,
        }
    }

    pub fn archive(mut self, format: ArchiveFormat) -> Self {
        self.content = ContentKind::Archive(format);
        self
    }

    pub fn members(mut self, members: &[&str]) -> Self {
        self.members = members.iter().map(|member| member.to_string()).collect();
        self
    }

    pub fn content(&self) -> ContentKind {
        self.content
    }

    pub fn parser(&self) -> &ParserSpec {
        &self.parser
    }

    /// Every templated string of the step, for registration checks.
    pub fn templates(&self) -> Vec<&str> {
        let mut templates = match &self.location {
            LocationTemplate::Direct(url) => vec![url.as_str()],
            LocationTemplate::Indirect { api_url, .. } => vec![api_url.as_str()],
        };
        templates.push(&self.file_name);
        templates.extend(self.members.iter().map(String::as_str));
        templates
    }

    pub fn render(&self, bindings: &Parameters) -> Result<RetrievalStep, String> {
        let location = match &self.location {
            LocationTemplate::Direct(url) => Location::Direct {
                url: template::render(url, bindings)?,
            },
            LocationTemplate::Indirect { api_url, pointer } => Location::Indirect {
                api_url: template::render(api_url, bindings)?,
                pointer: pointer.clone(),
            },
        };
        let members = self
            .members
            .iter()
            .map(|member| template::render(member, bindings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RetrievalStep {
            location,
            file_name: template::render(&self.file_name, bindings)?,
            content: self.content,
            members,
            parser: self.parser.clone(),
        })
    }
}
