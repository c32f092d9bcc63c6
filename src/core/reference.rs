//! `${{ step.key }}` references between steps.
//!
//! Strings that may carry references are parsed once into a [`Template`] of
//! literal text and typed [`OutputRef`] segments. Two resolution phases work
//! on the parsed form:
//!
//! 1. structural rewrite at planning time: node ids become step ids
//!    ([`Template::rewrite_ids`]), matched by exact id equality;
//! 2. value substitution at execution time: each reference is replaced by the
//!    referenced step's output ([`Template::resolve`]).

use super::error::{Error, Result};
use crate::resources::ResourceOutputs;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

const OPEN: &str = "${{";
const CLOSE: &str = "}}";

/// A parsed reference to another step's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef {
    /// Referenced node or step id.
    pub step: String,
    /// Output key, possibly dotted for nested values.
    pub key: String,
}

impl OutputRef {
    /// Parse the body of a `${{ ... }}` token. The id ends at the first `.`.
    pub fn parse(body: &str) -> Result<Self, String> {
        let body = body.trim();
        let (step, key) = body
            .split_once('.')
            .ok_or_else(|| format!("expected '<step>.<key>', got '{}'", body))?;
        if step.is_empty() || key.is_empty() {
            return Err(format!("expected '<step>.<key>', got '{}'", body));
        }
        if step.contains(char::is_whitespace) || key.contains(char::is_whitespace) {
            return Err(format!("whitespace inside reference '{}'", body));
        }
        Ok(Self {
            step: step.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{} {}", OPEN, self.step, self.key, CLOSE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Ref(OutputRef),
}

/// A string input that may embed references to other steps' outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// What an [`OutputSource`] knows about a referenced step.
pub enum Lookup<'a> {
    UnknownStep,
    NoOutputs,
    Outputs(&'a ResourceOutputs),
}

/// Anything that can answer "what did step X output?".
pub trait OutputSource {
    fn lookup(&self, step: &str) -> Lookup<'_>;
}

impl Template {
    /// Parse a string, splitting out every `${{ id.key }}` token.
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find(OPEN) {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after = &rest[open + OPEN.len()..];
            let close = after.find(CLOSE).ok_or_else(|| Error::Template {
                input: input.to_string(),
                message: format!(
                    "unclosed '{}' at position {}",
                    OPEN,
                    input.len() - rest.len() + open
                ),
            })?;
            let reference = OutputRef::parse(&after[..close]).map_err(|message| Error::Template {
                input: input.to_string(),
                message,
            })?;
            segments.push(Segment::Ref(reference));
            rest = &after[close + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// A template holding only literal text.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment::Text(text)],
        }
    }

    /// All references in order of appearance.
    pub fn refs(&self) -> impl Iterator<Item = &OutputRef> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Ref(r) => Some(r),
            Segment::Text(_) => None,
        })
    }

    /// True when no references remain.
    pub fn is_resolved(&self) -> bool {
        self.refs().next().is_none()
    }

    /// The literal value, if fully resolved.
    pub fn as_literal(&self) -> Option<String> {
        self.is_resolved().then(|| self.to_string())
    }

    /// Point references at new ids. Only exact id matches are rewritten, so
    /// `vpc/a` never touches a reference to `vpc/ab`.
    pub fn rewrite_ids(&mut self, ids: &HashMap<String, String>) {
        for segment in &mut self.segments {
            if let Segment::Ref(r) = segment {
                if let Some(new_id) = ids.get(&r.step) {
                    r.step.clone_from(new_id);
                }
            }
        }
    }

    /// Substitute every reference with the referenced step's output value.
    /// `referrer` names the step being resolved, for error messages.
    pub fn resolve(&self, referrer: &str, source: &dyn OutputSource) -> Result<Self> {
        if self.is_resolved() {
            return Ok(self.clone());
        }
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Ref(r) => text.push_str(&resolve_ref(referrer, r, source)?),
            }
        }
        Ok(Self::literal(text))
    }
}

fn resolve_ref(referrer: &str, r: &OutputRef, source: &dyn OutputSource) -> Result<String> {
    let outputs = match source.lookup(&r.step) {
        Lookup::Outputs(o) => o,
        Lookup::NoOutputs => {
            return Err(Error::Interpolation {
                step: referrer.to_string(),
                message: format!(
                    "'{}' has no outputs yet (missing required edge?)",
                    r.step
                ),
            })
        }
        Lookup::UnknownStep => {
            return Err(Error::Interpolation {
                step: referrer.to_string(),
                message: format!("references unknown step '{}'", r.step),
            })
        }
    };
    let value = outputs.lookup(&r.key).ok_or_else(|| Error::Interpolation {
        step: referrer.to_string(),
        message: format!("'{}' has no output named '{}'", r.step, r.key),
    })?;
    Ok(render_value(&value))
}

/// Render an output value into template text. Strings are inserted raw,
/// everything else as JSON.
pub fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => f.write_str(t)?,
                Segment::Ref(r) => write!(f, "{}", r)?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Self::literal(s)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts any scalar: unquoted YAML numbers and booleans become template text.
struct TemplateVisitor;

impl<'de> Visitor<'de> for TemplateVisitor {
    type Value = Template;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number or boolean")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Template, E> {
        Template::parse(v).map_err(E::custom)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Template, E> {
        Ok(Template::literal(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Template, E> {
        Ok(Template::literal(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Template, E> {
        Ok(Template::literal(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Template, E> {
        Ok(Template::literal(v.to_string()))
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TemplateVisitor)
    }
}
