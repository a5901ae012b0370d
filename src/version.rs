//! Version patterns and the resolver mapping a version string to a plan.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, error};

use crate::domain::{Parameters, SupportLevel};
use crate::error::KiraError;
use crate::plan::{RetrievalPlan, StepTemplate};
use crate::registry::SourceDescriptor;
use crate::template::{self, Template};

#[derive(Debug, Clone)]
pub enum Constraint {
    /// Decimal integer without leading zeros, at least `min`.
    Integer { min: u64 },
    /// Whole-value regular expression.
    Pattern(Regex),
}

impl Constraint {
    pub fn integer_at_least(min: u64) -> Self {
        Constraint::Integer { min }
    }

    /// `pattern` is anchored on both ends.
    pub fn pattern(pattern: &str) -> Result<Self, KiraError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| KiraError::InvalidDescriptor {
            source_id: "constraint".to_string(),
            reason: err.to_string(),
        })?;
        Ok(Constraint::Pattern(regex))
    }

    pub fn check(&self, value: &str) -> bool {
        match self {
            Constraint::Integer { min } => {
                let canonical = !value.is_empty()
                    && value.bytes().all(|b| b.is_ascii_digit())
                    && (value == "0" || !value.starts_with('0'));
                canonical && value.parse::<u64>().is_ok_and(|n| n >= *min)
            }
            Constraint::Pattern(regex) => regex.is_match(value),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Integer { min } => write!(f, "integer >= {min}"),
            Constraint::Pattern(regex) => {
                let raw = regex.as_str();
                let inner = raw
                    .strip_prefix("^(?:")
                    .and_then(|rest| rest.strip_suffix(")$"))
                    .unwrap_or(raw);
                write!(f, "matches {inner}")
            }
        }
    }
}

/// A version identifier template.
#[derive(Debug, Clone)]
pub enum VersionTemplate {
    Literal(String),
    Parameterized {
        template: Template,
        constraints: Vec<(String, Constraint)>,
    },
}

impl VersionTemplate {
    pub fn as_str(&self) -> &str {
        match self {
            VersionTemplate::Literal(value) => value,
            VersionTemplate::Parameterized { template, .. } => template.as_str(),
        }
    }

    pub fn parameters(&self) -> Vec<&str> {
        match self {
            VersionTemplate::Literal(_) => Vec::new(),
            VersionTemplate::Parameterized { template, .. } => template.parameters().collect(),
        }
    }

    /// Bound parameter values when `version` matches, constraints included.
    pub fn matches(&self, version: &str) -> Option<Parameters> {
        match self {
            VersionTemplate::Literal(value) => (value == version).then(Parameters::new),
            VersionTemplate::Parameterized { template, constraints } => {
                let bindings = template.extract(version)?;
                let valid = constraints.iter().all(|(name, constraint)| {
                    bindings.get(name).is_some_and(|value| constraint.check(value))
                });
                valid.then_some(bindings)
            }
        }
    }
}

impl fmt::Display for VersionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supported version shape of a source and how it turns into a plan.
#[derive(Debug, Clone)]
pub struct VersionPattern {
    pub template: VersionTemplate,
    pub example: String,
    pub support: SupportLevel,
    /// Overrides the source citation, may use the pattern's placeholders.
    pub citation: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<StepTemplate>,
}

impl VersionPattern {
    pub fn literal(version: &str) -> Self {
        Self {
            template: VersionTemplate::Literal(version.to_string()),
            example: version.to_string(),
            support: SupportLevel::Full,
            citation: None,
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn parameterized(template: &str, example: &str) -> Result<Self, KiraError> {
        let parsed = Template::parse(template).map_err(|reason| KiraError::InvalidDescriptor {
            source_id: template.to_string(),
            reason,
        })?;
        Ok(Self {
            template: VersionTemplate::Parameterized {
                template: parsed,
                constraints: Vec::new(),
            },
            example: example.to_string(),
            support: SupportLevel::Full,
            citation: None,
            description: None,
            steps: Vec::new(),
        })
    }

    pub fn constrain(mut self, name: &str, constraint: Constraint) -> Self {
        match &mut self.template {
            VersionTemplate::Parameterized { constraints, .. } => {
                constraints.push((name.to_string(), constraint));
            }
            VersionTemplate::Literal(value) => {
                // kept so registration reports the unknown parameter
                if let Ok(template) = Template::parse(&value.clone()) {
                    self.template = VersionTemplate::Parameterized {
                        template,
                        constraints: vec![(name.to_string(), constraint)],
                    };
                }
            }
        }
        self
    }

    pub fn partial(mut self, note: &str) -> Self {
        self.support = SupportLevel::Partial(note.to_string());
        self
    }

    pub fn citation(mut self, citation: &str) -> Self {
        self.citation = Some(citation.to_string());
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn step(mut self, step: StepTemplate) -> Self {
        self.steps.push(step);
        self
    }

    pub fn matches(&self, version: &str) -> Option<Parameters> {
        self.template.matches(version)
    }

    pub fn constraints(&self) -> &[(String, Constraint)] {
        match &self.template {
            VersionTemplate::Literal(_) => &[],
            VersionTemplate::Parameterized { constraints, .. } => constraints,
        }
    }

    fn plan(
        &self,
        descriptor: &SourceDescriptor,
        version: &str,
        bindings: Parameters,
    ) -> Result<RetrievalPlan, KiraError> {
        let invalid = |reason: String| KiraError::InvalidDescriptor {
            source_id: descriptor.identifier.clone(),
            reason,
        };
        let citation = match &self.citation {
            Some(raw) => template::render(raw, &bindings).map_err(invalid)?,
            None => descriptor.citation.clone(),
        };
        let steps = self
            .steps
            .iter()
            .map(|step| step.render(&bindings))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        RetrievalPlan::new(
            descriptor.category,
            &descriptor.identifier,
            version,
            citation,
            self.support.clone(),
            bindings,
            steps,
        )
    }
}

/// Resolves `version` for `descriptor` into a retrieval plan.
///
/// The version may be given rendered (`v_release_34`) or as a template whose
/// placeholders are filled from `parameters`. Every pattern is tried; a
/// pattern whose constraints reject the extracted values does not match.
/// Caller bindings must agree with the values extracted from the version.
pub fn resolve(
    descriptor: &SourceDescriptor,
    version: &str,
    parameters: &Parameters,
) -> Result<RetrievalPlan, KiraError> {
    let rendered = if version.contains('{') {
        template::render(version, parameters).map_err(|reason| {
            KiraError::InvalidDatasetRequest(format!("{version}: {reason}"))
        })?
    } else {
        version.to_string()
    };

    let mut matched: Vec<(&VersionPattern, Parameters)> = descriptor
        .patterns()
        .iter()
        .filter_map(|pattern| pattern.matches(&rendered).map(|bindings| (pattern, bindings)))
        .collect();

    if matched.len() > 1 {
        let patterns: Vec<String> = matched
            .iter()
            .map(|(pattern, _)| pattern.template.to_string())
            .collect();
        error!(
            source = %descriptor.identifier,
            version = %rendered,
            patterns = ?patterns,
            "version matches several patterns"
        );
        return Err(KiraError::AmbiguousVersion {
            source_id: descriptor.identifier.clone(),
            version: rendered,
            patterns,
        });
    }
    let Some((pattern, extracted)) = matched.pop() else {
        return Err(KiraError::UnsupportedVersion {
            source_id: descriptor.identifier.clone(),
            version: version.to_string(),
            supported: descriptor.templates(),
        });
    };

    for (name, given) in parameters {
        match extracted.get(name) {
            Some(value) if value != given => {
                return Err(KiraError::ParameterMismatch {
                    name: name.clone(),
                    given: given.clone(),
                    extracted: value.clone(),
                });
            }
            Some(_) => {}
            None => debug!(parameter = %name, version = %rendered, "ignoring unused parameter"),
        }
    }

    debug!(
        source = %descriptor.identifier,
        version = %rendered,
        pattern = %pattern.template,
        "resolved version"
    );
    pattern.plan(descriptor, &rendered, extracted)
}

/// Serializable view of a pattern for information queries.
#[derive(Debug, Clone, Serialize)]
pub struct PatternSummary {
    pub template: String,
    pub example: String,
    pub parameters: Vec<ParameterSummary>,
    pub support: SupportLevel,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    pub constraint: Option<String>,
}

impl From<&VersionPattern> for PatternSummary {
    fn from(pattern: &VersionPattern) -> Self {
        let parameters = pattern
            .template
            .parameters()
            .into_iter()
            .map(|name| ParameterSummary {
                name: name.to_string(),
                constraint: pattern
                    .constraints()
                    .iter()
                    .filter(|(constrained, _)| constrained == name)
                    .map(|(_, constraint)| constraint.to_string())
                    .reduce(|a, b| format!("{a}; {b}")),
            })
            .collect();
        Self {
            template: pattern.template.to_string(),
            example: pattern.example.clone(),
            parameters,
            support: pattern.support.clone(),
            description: pattern.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_constraint_is_canonical() {
        let constraint = Constraint::integer_at_least(25);
        assert!(constraint.check("25"));
        assert!(constraint.check("126"));
        assert!(!constraint.check("24"));
        assert!(!constraint.check("034"));
        assert!(!constraint.check("+34"));
        assert!(!constraint.check("3x"));
        assert_eq!(constraint.to_string(), "integer >= 25");
    }

    #[test]
    fn pattern_constraint_is_anchored() {
        let constraint = Constraint::pattern("[A-Za-z0-9-]+").unwrap();
        assert!(constraint.check("in-stock"));
        assert!(!constraint.check("in stock"));
        assert!(!constraint.check("a/b"));
        assert_eq!(constraint.to_string(), "matches [A-Za-z0-9-]+");
    }

    #[test]
    fn literal_template_matches_exactly() {
        let template = VersionTemplate::Literal("v_release_0_1_0".to_string());
        assert!(template.matches("v_release_0_1_0").is_some());
        assert!(template.matches("V_release_0_1_0").is_none());
        assert!(template.matches("v_release_0_1_0 ").is_none());
    }

    #[test]
    fn failed_constraint_means_no_match() {
        let pattern = VersionPattern::parameterized("v_release_{release_number}", "v_release_126")
            .unwrap()
            .constrain("release_number", Constraint::integer_at_least(126));
        assert!(pattern.matches("v_release_126").is_some());
        assert!(pattern.matches("v_release_125").is_none());
    }

    #[test]
    fn summary_lists_parameters_with_constraints() {
        let pattern = VersionPattern::parameterized("v_catalog_{catalog_name}", "v_catalog_sial")
            .unwrap()
            .constrain("catalog_name", Constraint::pattern("[a-z]+").unwrap());
        let summary = PatternSummary::from(&pattern);
        assert_eq!(summary.parameters.len(), 1);
        assert_eq!(summary.parameters[0].constraint.as_deref(), Some("matches [a-z]+"));
    }
}
