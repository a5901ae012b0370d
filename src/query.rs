//! Read-only discovery over the registry. Nothing here touches the network.

use serde::Serialize;

use crate::domain::{Category, DatasetRequest};
use crate::error::KiraError;
use crate::plan::RetrievalPlan;
use crate::registry::{SourceDescriptor, SourceRegistry};
use crate::version::{self, PatternSummary};

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub category: Category,
    pub identifier: String,
    pub name: String,
    pub versions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub category: Category,
    pub identifier: String,
    pub name: String,
    pub citation: String,
    pub citation_url: String,
    pub patterns: Vec<PatternSummary>,
}

impl From<&SourceDescriptor> for SourceInfo {
    fn from(descriptor: &SourceDescriptor) -> Self {
        Self {
            category: descriptor.category,
            identifier: descriptor.identifier.clone(),
            name: descriptor.name.clone(),
            citation: descriptor.citation.clone(),
            citation_url: format!("https://doi.org/{}", descriptor.citation),
            patterns: descriptor.patterns().iter().map(PatternSummary::from).collect(),
        }
    }
}

/// Sources of one category, or of every category, ordered by category and
/// identifier.
pub fn list_sources(registry: &SourceRegistry, category: Option<Category>) -> Vec<SourceSummary> {
    let categories = match category {
        Some(category) => vec![category],
        None => Category::all().to_vec(),
    };
    categories
        .into_iter()
        .flat_map(|category| registry.list_sources(category))
        .map(|descriptor| SourceSummary {
            category: descriptor.category,
            identifier: descriptor.identifier.clone(),
            name: descriptor.name.clone(),
            versions: descriptor.patterns().len(),
        })
        .collect()
}

pub fn describe_source(
    registry: &SourceRegistry,
    category: Category,
    identifier: &str,
) -> Result<SourceInfo, KiraError> {
    registry.lookup(category, identifier).map(SourceInfo::from)
}

/// Same read path as [`describe_source`]; callers render the pattern list.
pub fn describe_versions(
    registry: &SourceRegistry,
    category: Category,
    identifier: &str,
) -> Result<SourceInfo, KiraError> {
    describe_source(registry, category, identifier)
}

/// The plan a fetch of `request` would execute, without running it.
pub fn describe_plan(
    registry: &SourceRegistry,
    request: &DatasetRequest,
) -> Result<RetrievalPlan, KiraError> {
    let descriptor = registry.lookup(request.category, &request.source)?;
    version::resolve(descriptor, &request.version, &request.parameters)
}
