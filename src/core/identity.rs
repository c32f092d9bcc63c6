//! Structural identity of nodes and steps.
//!
//! A [`ResourceKey`] is what the planner matches on. Display and step ids are
//! derived from it; the step id additionally carries the color.

use super::types::{Color, ContextLevel};
use crate::resources::ResourceKind;
use std::fmt;

/// `(type, name, environment, component)`, the identity of a resource
/// across planning cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
    pub environment: Option<String>,
    pub component: Option<String>,
}

impl ResourceKey {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        environment: Option<&str>,
        component: Option<&str>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            environment: environment.map(str::to_string),
            component: component.map(str::to_string),
        }
    }

    /// Display id: `[environment/][component:]kind/name`.
    pub fn node_id(&self) -> String {
        self.to_string()
    }

    /// Execution id: the display id with the color suffix.
    pub fn step_id(&self, color: Color) -> String {
        format!("{}-{}", self, color)
    }

    /// Narrowest scope this resource belongs to.
    pub fn context_level(&self) -> ContextLevel {
        if self.component.is_some() {
            ContextLevel::Component
        } else if self.environment.is_some() {
            ContextLevel::Environment
        } else {
            ContextLevel::Datacenter
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref env) = self.environment {
            write!(f, "{}/", env)?;
        }
        if let Some(ref component) = self.component {
            write!(f, "{}:", component)?;
        }
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Check that a name segment can appear inside a `${{ id.key }}` token.
pub fn check_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty name".to_string());
    }
    if let Some(c) = segment
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '.' | '/' | ':' | '{' | '}'))
    {
        return Err(format!("'{}' contains '{}'", segment, c));
    }
    Ok(())
}
