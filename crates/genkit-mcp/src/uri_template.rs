//! URI Template System for MCP Resources
//!
//! RFC 6570 path-variable subset used to address MCP resources. Patterns like
//! `file://data/{filename}` are compiled once at registration and then matched
//! against incoming URIs.
//!
//! Supported grammar:
//! - simple expressions only: `{name}` where `name` is made of ASCII letters,
//!   digits, `_`, `-` and (not leading or trailing) `.`
//! - a variable captures text inside a single path segment; it never crosses `/`
//! - variables may share a segment with literal text (`{id}.json`), but two
//!   variables may not be adjacent
//! - variables are only allowed before the query string and fragment
//!
//! Matching is total: malformed URIs simply do not match.

use std::borrow::Cow;

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::trace;

use crate::error::{McpError, McpResult};

/// RFC 6570 operators this subset does not implement
const UNSUPPORTED_OPERATORS: &[char] = &[
    '+', '#', '.', '/', ';', '?', '&', '=', ',', '!', '@', '|',
];

/// Normalize a URI for matching.
///
/// Truncates at whichever of `?` or `#` comes first, then strips trailing
/// `/` characters, so `file://` becomes `file:`. Percent-escapes and case are
/// left untouched.
pub fn normalize_uri(uri: &str) -> &str {
    let end = uri.find(|c| c == '?' || c == '#').unwrap_or(uri.len());
    uri[..end].trim_end_matches('/')
}

/// Whether the pattern opens with `scheme:` before any variable
fn has_literal_scheme(parts: &[Part]) -> bool {
    match parts.first() {
        Some(Part::Literal(text)) => text.find(':').is_some_and(|colon| colon > 0),
        _ => false,
    }
}

/// Percent-decode a captured value; invalid UTF-8 is replaced rather than rejected
fn decode_component(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable(String),
}

/// Variable bindings extracted from a URI, in order of first appearance in the pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables(Vec<(String, String)>);

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, keeping its original position if already present.
    /// Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.0.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TemplateVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut variables = Self::new();
        for (name, value) in iter {
            variables.insert(name, value);
        }
        variables
    }
}

impl Serialize for TemplateVariables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A compiled URI template
#[derive(Debug, Clone)]
pub struct UriTemplate {
    /// Original template pattern
    pattern: String,
    /// Pattern with query, fragment and trailing slashes removed
    normalized: String,
    /// Parsed form of the full pattern, used for expansion
    parts: Vec<Part>,
    /// Unique variable names in order of first appearance
    variables: Vec<String>,
    /// Anchored matcher; `None` for literal URIs
    regex: Option<Regex>,
    /// Variable index for each capture group
    group_variables: Vec<usize>,
}

impl UriTemplate {
    /// Compile a template pattern, rejecting malformed input
    pub fn new(pattern: &str) -> McpResult<Self> {
        if pattern.is_empty() {
            return Err(McpError::invalid_template(pattern, "pattern is empty"));
        }

        let parts = parse(pattern)?;
        if !has_literal_scheme(&parts) {
            return Err(McpError::invalid_template(
                pattern,
                "pattern must start with a literal scheme",
            ));
        }

        let normalized = normalize_uri(pattern);
        if normalized.is_empty() {
            return Err(McpError::invalid_template(
                pattern,
                "pattern has no path to match against",
            ));
        }

        // Normalization only removes a suffix, so the normalized pattern
        // parses cleanly whenever the full pattern does.
        let match_parts = parse(normalized)?;
        let total_variables = parts.iter().filter(|p| matches!(p, Part::Variable(_))).count();
        let path_variables = match_parts
            .iter()
            .filter(|p| matches!(p, Part::Variable(_)))
            .count();
        if path_variables != total_variables {
            return Err(McpError::invalid_template(
                pattern,
                "variables in the query string or fragment are not supported",
            ));
        }

        let mut variables: Vec<String> = Vec::new();
        let mut group_variables = Vec::new();
        let mut regex_pattern = String::from("^");

        for part in &match_parts {
            match part {
                Part::Literal(text) => regex_pattern.push_str(&regex::escape(text)),
                Part::Variable(name) => {
                    let index = match variables.iter().position(|v| v == name) {
                        Some(index) => index,
                        None => {
                            variables.push(name.clone());
                            variables.len() - 1
                        }
                    };
                    group_variables.push(index);
                    regex_pattern.push_str("([^/]*)");
                }
            }
        }
        regex_pattern.push('$');

        let regex = if variables.is_empty() {
            None
        } else {
            let compiled = Regex::new(&regex_pattern).map_err(|e| {
                McpError::invalid_template(pattern, format!("failed to compile matcher: {}", e))
            })?;
            Some(compiled)
        };

        Ok(Self {
            pattern: pattern.to_string(),
            normalized: normalized.to_string(),
            parts,
            variables,
            regex,
            group_variables,
        })
    }

    /// Get the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Pattern as compared against normalized URIs
    pub fn normalized_pattern(&self) -> &str {
        &self.normalized
    }

    /// Get variable names
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Whether the pattern has placeholders; literal URIs only match themselves
    pub fn is_template(&self) -> bool {
        self.regex.is_some()
    }

    /// Check if a URI matches this template
    pub fn matches(&self, uri: &str) -> bool {
        self.try_extract(uri).is_some()
    }

    /// Extract variables from a URI that matches this template
    pub fn extract(&self, uri: &str) -> McpResult<TemplateVariables> {
        self.try_extract(uri)
            .ok_or_else(|| McpError::no_match(uri, &self.pattern))
    }

    /// Segment walk shared by `matches` and `extract`; `None` when the URI
    /// does not match.
    ///
    /// Captures come from the normalized URI, which is a prefix of the original
    /// URI, so each captured segment is the original raw segment.
    pub fn try_extract(&self, uri: &str) -> Option<TemplateVariables> {
        let normalized = normalize_uri(uri);

        let Some(regex) = &self.regex else {
            return (normalized == self.normalized).then(TemplateVariables::new);
        };

        let captures = regex.captures(normalized)?;
        let mut values: Vec<Option<String>> = vec![None; self.variables.len()];

        for (group, &index) in self.group_variables.iter().enumerate() {
            let raw = captures.get(group + 1).map(|m| m.as_str()).unwrap_or("");
            let value = decode_component(raw);
            match &values[index] {
                // A repeated variable must bind the same value everywhere
                Some(existing) if *existing != value => {
                    trace!(
                        pattern = %self.pattern,
                        variable = %self.variables[index],
                        "Repeated variable bound to conflicting values"
                    );
                    return None;
                }
                Some(_) => {}
                None => values[index] = Some(value),
            }
        }

        Some(
            self.variables
                .iter()
                .cloned()
                .zip(values.into_iter().map(Option::unwrap_or_default))
                .collect(),
        )
    }

    /// Resolve the template with variables to build a concrete URI.
    ///
    /// Values are percent-encoded so each one stays within its segment.
    pub fn expand(&self, variables: &TemplateVariables) -> McpResult<String> {
        let mut result = String::with_capacity(self.pattern.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => result.push_str(text),
                Part::Variable(name) => {
                    let value = variables
                        .get(name)
                        .ok_or_else(|| McpError::MissingVariable(name.clone()))?;
                    let encoded: Cow<'_, str> = urlencoding::encode(value);
                    result.push_str(&encoded);
                }
            }
        }
        Ok(result)
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl std::str::FromStr for UriTemplate {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

fn parse(pattern: &str) -> McpResult<Vec<Part>> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(McpError::invalid_template(pattern, "nested '{'"));
                        }
                        other => name.push(other),
                    }
                }
                if !closed {
                    return Err(McpError::invalid_template(pattern, "unclosed '{'"));
                }
                validate_variable_name(pattern, &name)?;

                if literal.is_empty() {
                    if matches!(parts.last(), Some(Part::Variable(_))) {
                        return Err(McpError::invalid_template(
                            pattern,
                            "adjacent variables are ambiguous",
                        ));
                    }
                } else {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Variable(name));
            }
            '}' => return Err(McpError::invalid_template(pattern, "unmatched '}'")),
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

fn validate_variable_name(pattern: &str, name: &str) -> McpResult<()> {
    let Some(first) = name.chars().next() else {
        return Err(McpError::invalid_template(pattern, "empty variable name"));
    };

    if UNSUPPORTED_OPERATORS.contains(&first) {
        return Err(McpError::invalid_template(
            pattern,
            format!("unsupported expression operator '{}'", first),
        ));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(McpError::invalid_template(
            pattern,
            format!("invalid character '{}' in variable '{}'", bad, name),
        ));
    }

    if name.ends_with('.') || name.contains("..") {
        return Err(McpError::invalid_template(
            pattern,
            format!("invalid variable name '{}'", name),
        ));
    }

    Ok(())
}
