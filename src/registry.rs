//! Process-wide catalog of data sources.
//!
//! Descriptors are validated when registered and never change afterwards. The
//! shipped catalog is built once by [`builtin`]; tests build fresh registries
//! with [`SourceRegistry::new`].

use std::collections::BTreeMap;
use std::collections::btree_map;

use once_cell::sync::OnceCell;
use tracing::{debug, error};

use crate::catalog;
use crate::domain::{Category, Parameters};
use crate::error::KiraError;
use crate::parsers::{Delimiter, ParserSpec};
use crate::template::Template;
use crate::version::{self, VersionPattern, VersionTemplate};

#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub category: Category,
    pub identifier: String,
    pub name: String,
    pub citation: String,
    patterns: Vec<VersionPattern>,
}

impl SourceDescriptor {
    pub fn new(category: Category, identifier: &str, name: &str, citation: &str) -> Self {
        Self {
            category,
            identifier: identifier.to_string(),
            name: name.to_string(),
            citation: citation.to_string(),
            patterns: Vec::new(),
        }
    }

    pub fn pattern(mut self, pattern: VersionPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn patterns(&self) -> &[VersionPattern] {
        &self.patterns
    }

    pub fn templates(&self) -> Vec<String> {
        self.patterns
            .iter()
            .map(|pattern| pattern.template.to_string())
            .collect()
    }

    fn invalid(&self, reason: impl Into<String>) -> KiraError {
        KiraError::InvalidDescriptor {
            source_id: format!("{}:{}", self.category, self.identifier),
            reason: reason.into(),
        }
    }

    /// Structural checks run on registration.
    fn validate(&self) -> Result<(), KiraError> {
        if self.identifier.is_empty()
            || !self
                .identifier
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(self.invalid("identifier must be lowercase ASCII"));
        }
        if self.patterns.is_empty() {
            return Err(self.invalid("no version patterns"));
        }
        for pattern in &self.patterns {
            self.validate_pattern(pattern)?;
        }
        for (index, first) in self.patterns.iter().enumerate() {
            for second in &self.patterns[index + 1..] {
                self.check_overlap(first, second)?;
                self.check_overlap(second, first)?;
            }
        }
        Ok(())
    }

    fn validate_pattern(&self, pattern: &VersionPattern) -> Result<(), KiraError> {
        let label = pattern.template.as_str();
        let names = pattern.template.parameters();
        if let VersionTemplate::Parameterized { template, constraints } = &pattern.template {
            if template.is_literal() {
                return Err(self.invalid(format!("{label}: parameterized pattern without placeholders")));
            }
            for (name, _) in constraints {
                if !names.contains(&name.as_str()) {
                    return Err(self.invalid(format!("{label}: constraint on unknown parameter {name}")));
                }
            }
        }
        if pattern.steps.is_empty() {
            return Err(self.invalid(format!("{label}: no retrieval steps")));
        }

        let mut raw_templates: Vec<&str> = pattern
            .steps
            .iter()
            .flat_map(|step| step.templates())
            .collect();
        if let Some(citation) = &pattern.citation {
            raw_templates.push(citation);
        }
        for raw in raw_templates {
            let template = Template::parse(raw).map_err(|reason| self.invalid(format!("{label}: {reason}")))?;
            if let Some(unknown) = template.parameters().find(|name| !names.contains(name)) {
                return Err(self.invalid(format!("{label}: {raw} uses unknown parameter {unknown}")));
            }
        }

        for step in &pattern.steps {
            if let ParserSpec::Delimited(config) = step.parser() {
                if let Delimiter::Char(c) = config.delimiter {
                    if !c.is_ascii() {
                        return Err(self.invalid(format!("{label}: delimiter {c:?} is not ASCII")));
                    }
                }
            }
            if pattern.support.is_partial() && !matches!(step.parser(), ParserSpec::ReactionSmiles(_)) {
                return Err(self.invalid(format!(
                    "{label}: partially supported versions may only use the reaction SMILES line parser"
                )));
            }
        }

        if pattern.matches(&pattern.example).is_none() {
            return Err(self.invalid(format!("{label}: example {} does not match", pattern.example)));
        }
        Ok(())
    }

    /// Rejects `second` accepting anything `first` is known to accept.
    fn check_overlap(&self, first: &VersionPattern, second: &VersionPattern) -> Result<(), KiraError> {
        let overlap = |what: &str| {
            self.invalid(format!(
                "patterns {} and {} overlap on {what}",
                first.template, second.template
            ))
        };
        match (&first.template, &second.template) {
            (VersionTemplate::Literal(a), VersionTemplate::Literal(b)) if a == b => {
                return Err(overlap(a));
            }
            (
                VersionTemplate::Parameterized { template: a, .. },
                VersionTemplate::Parameterized { template: b, .. },
            ) if a.skeleton() == b.skeleton() => {
                return Err(overlap(&a.skeleton()));
            }
            _ => {}
        }
        if second.matches(&first.example).is_some() {
            return Err(overlap(&first.example));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<(Category, String), SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: SourceDescriptor) -> Result<(), KiraError> {
        let key = (descriptor.category, descriptor.identifier.clone());
        if self.sources.contains_key(&key) {
            return Err(KiraError::DuplicateSource {
                category: descriptor.category,
                source_id: descriptor.identifier,
            });
        }
        descriptor.validate()?;
        debug!(
            category = %descriptor.category,
            source = %descriptor.identifier,
            patterns = descriptor.patterns.len(),
            "registered source"
        );
        self.sources.insert(key, descriptor);
        Ok(())
    }

    pub fn lookup(&self, category: Category, identifier: &str) -> Result<&SourceDescriptor, KiraError> {
        let identifier = identifier.trim().to_lowercase();
        self.sources
            .get(&(category, identifier.clone()))
            .ok_or(KiraError::UnknownSource {
                category,
                source_id: identifier,
            })
    }

    /// Descriptors of `category` ordered by identifier. The iterator is
    /// `Clone`, so it can be restarted.
    pub fn list_sources(&self, category: Category) -> Sources<'_> {
        Sources {
            inner: self.sources.values(),
            category,
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolves every pattern example and checks it lands on its own pattern.
    pub fn health_check(&self) -> Result<(), KiraError> {
        for descriptor in self.sources.values() {
            for pattern in descriptor.patterns() {
                let plan = version::resolve(descriptor, &pattern.example, &Parameters::new())
                    .inspect_err(|err| {
                        error!(
                            source = %descriptor.identifier,
                            example = %pattern.example,
                            error = %err,
                            "registry health check failed"
                        );
                    })?;
                if pattern.matches(&plan.version).is_none() {
                    return Err(descriptor.invalid(format!(
                        "example {} resolved through another pattern",
                        pattern.example
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Sources<'a> {
    inner: btree_map::Values<'a, (Category, String), SourceDescriptor>,
    category: Category,
}

impl<'a> Iterator for Sources<'a> {
    type Item = &'a SourceDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let category = self.category;
        self.inner.by_ref().find(|descriptor| descriptor.category == category)
    }
}

static BUILTIN: OnceCell<SourceRegistry> = OnceCell::new();

/// The shipped catalog, built on first call. Later calls return the same
/// handle.
pub fn builtin() -> Result<&'static SourceRegistry, KiraError> {
    BUILTIN.get_or_try_init(|| {
        let mut registry = SourceRegistry::new();
        for descriptor in catalog::descriptors()? {
            registry.register(descriptor)?;
        }
        Ok(registry)
    })
}
