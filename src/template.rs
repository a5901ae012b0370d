//! `{name}` placeholder templates shared by version patterns, download
//! locations, archive member names and citations.

use std::fmt;

use crate::domain::Parameters;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(format!("unclosed placeholder in {raw:?}"));
                    }
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(format!("invalid placeholder {{{name}}} in {raw:?}"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if matches!(segments.last(), Some(Segment::Parameter(_))) {
                        return Err(format!("adjacent placeholders in {raw:?}"));
                    }
                    segments.push(Segment::Parameter(name));
                }
                '}' => return Err(format!("unmatched '}}' in {raw:?}")),
                _ => literal.push(ch),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_literal(&self) -> bool {
        self.parameters().next().is_none()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Parameter(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Literal text with every placeholder collapsed to `{}`. Two templates with
    /// the same skeleton accept exactly the same strings.
    pub fn skeleton(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::Parameter(_) => "{}",
            })
            .collect()
    }

    pub fn render(&self, bindings: &Parameters) -> Result<String, String> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Parameter(name) => {
                    let value = bindings
                        .get(name)
                        .ok_or_else(|| format!("missing value for parameter {name}"))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Matches `value` against the literal segments exactly and returns the
    /// non-empty text bound to each placeholder, or `None` when the literal
    /// skeleton does not line up.
    pub fn extract(&self, value: &str) -> Option<Parameters> {
        let mut bindings = Parameters::new();
        if match_from(&self.segments, value, 0, &mut bindings) {
            Some(bindings)
        } else {
            None
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn match_from(segments: &[Segment], input: &str, pos: usize, bindings: &mut Parameters) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        return pos == input.len();
    };
    match head {
        Segment::Literal(text) => {
            input[pos..].starts_with(text.as_str())
                && match_from(rest, input, pos + text.len(), bindings)
        }
        Segment::Parameter(name) => {
            let remaining = &input[pos..];
            match rest.first() {
                None => {
                    if remaining.is_empty() {
                        return false;
                    }
                    bindings.insert(name.clone(), remaining.to_string());
                    true
                }
                Some(Segment::Literal(next)) => {
                    for (offset, _) in remaining.match_indices(next.as_str()) {
                        if offset == 0 {
                            continue;
                        }
                        bindings.insert(name.clone(), remaining[..offset].to_string());
                        if match_from(rest, input, pos + offset, bindings) {
                            return true;
                        }
                    }
                    bindings.remove(name);
                    false
                }
                // parse() never produces adjacent placeholders
                Some(Segment::Parameter(_)) => false,
            }
        }
    }
}

/// Renders a raw template string in one go.
pub fn render(raw: &str, bindings: &Parameters) -> Result<String, String> {
    Template::parse(raw)?.render(bindings)
}
