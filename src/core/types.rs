//! Graph and pipeline data model.
//!
//! A [`Graph`] is the desired state produced upstream. A [`Pipeline`] is the
//! planner's answer: steps annotated with action, color, status, hash,
//! outputs and back-end state. Both derive Serialize/Deserialize so the
//! pipeline can be persisted between planning cycles.

use super::identity::ResourceKey;
use super::reference::{Lookup, OutputSource};
use crate::resources::{ResourceInputs, ResourceKind, ResourceOutputs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Enums
// ============================================================================

/// Action to take on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// Generation tag. Fresh steps are always blue; updates inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    Blue,
    Green,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blue => write!(f, "blue"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Step lifecycle: `pending → starting → applying|destroying → complete`,
/// or `error` from any non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    #[default]
    Pending,
    Starting,
    Applying,
    Destroying,
    Complete,
    Error,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Starting => write!(f, "starting"),
            Self::Applying => write!(f, "applying"),
            Self::Destroying => write!(f, "destroying"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Scope a planning run is evaluated at. Ordered from widest to narrowest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    #[default]
    None,
    Datacenter,
    Environment,
    Component,
}

impl ContextLevel {
    /// Whether a step at `level` falls outside this planning context.
    /// `None` means no filter; otherwise anything narrower is excluded.
    pub fn excludes(&self, level: ContextLevel) -> bool {
        *self != Self::None && level > *self
    }
}

impl FromStr for ContextLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "datacenter" => Ok(Self::Datacenter),
            "environment" => Ok(Self::Environment),
            "component" => Ok(Self::Component),
            other => Err(format!("unknown context level '{}'", other)),
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Graph
// ============================================================================

/// A desired resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// `type` + `inputs`
    #[serde(flatten)]
    pub inputs: ResourceInputs,
}

impl Node {
    pub fn new(name: impl Into<String>, inputs: ResourceInputs) -> Self {
        Self {
            name: name.into(),
            component: None,
            environment: None,
            inputs,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.inputs.kind()
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            self.kind(),
            &self.name,
            self.environment.as_deref(),
            self.component.as_deref(),
        )
    }

    pub fn id(&self) -> String {
        self.key().node_id()
    }
}

/// Directed dependency: `from` waits on `to` when `required`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Edge {
    pub fn required(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            required: true,
        }
    }
}

/// Desired state: nodes plus dependency edges between node ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Execution status of a step. Times are unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
}

impl StepStatus {
    pub fn complete() -> Self {
        Self {
            state: StepState::Complete,
            ..Self::default()
        }
    }
}

/// A node annotated with a planned action and its execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(flatten)]
    pub inputs: ResourceInputs,

    #[serde(default)]
    pub color: Color,

    pub action: Action,

    #[serde(default)]
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<ResourceOutputs>,

    /// Fingerprint of the resolved inputs
    #[serde(default)]
    pub hash: String,

    /// Opaque back-end continuation data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
}

impl Step {
    /// A pending step for `node`.
    pub fn from_node(node: &Node, action: Action, color: Color) -> Self {
        Self {
            name: node.name.clone(),
            component: node.component.clone(),
            environment: node.environment.clone(),
            inputs: node.inputs.clone(),
            color,
            action,
            status: StepStatus::default(),
            outputs: None,
            hash: String::new(),
            state: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inputs.kind()
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            self.kind(),
            &self.name,
            self.environment.as_deref(),
            self.component.as_deref(),
        )
    }

    /// Color-suffixed execution id.
    pub fn id(&self) -> String {
        self.key().step_id(self.color)
    }

    /// Uncolored display id of the underlying node.
    pub fn node_id(&self) -> String {
        self.key().node_id()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.state.is_terminal()
    }

    /// Completed and not a deletion: a usable "before" for the next plan.
    pub fn is_settled(&self) -> bool {
        self.status.state == StepState::Complete && self.action != Action::Delete
    }
}

/// Summary counts of a planned pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub to_create: u32,
    pub to_update: u32,
    pub to_delete: u32,
    pub unchanged: u32,
}

impl PlanSummary {
    pub fn has_changes(&self) -> bool {
        self.to_create + self.to_update + self.to_delete > 0
    }
}

/// Ordered steps plus edges between step ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id() == id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id() == id)
    }

    /// The settled step for `key`, if any: the "before" the planner and the
    /// no-op resolver compare against.
    pub fn settled(&self, key: &ResourceKey) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.is_settled() && &s.key() == key)
    }

    /// Ids this step must wait on (targets of its required edges).
    pub fn required_dependencies(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.required && e.from == id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// True when every required dependency of `id` satisfies `pred`.
    pub fn dependencies_in(&self, id: &str, pred: impl Fn(&Step) -> bool) -> bool {
        self.required_dependencies(id)
            .into_iter()
            .all(|dep| self.step(dep).map(&pred).unwrap_or(false))
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for step in &self.steps {
            match step.action {
                Action::Create => summary.to_create += 1,
                Action::Update => summary.to_update += 1,
                Action::Delete => summary.to_delete += 1,
                Action::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }

    /// All steps have reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.steps.iter().all(Step::is_terminal)
    }

    /// Fold one step event into the pipeline. Returns false if the step is
    /// unknown.
    pub fn apply_event(&mut self, event: StepEvent) -> bool {
        match self.position(&event.step) {
            Some(pos) => self.apply_update(pos, event.update),
            None => false,
        }
    }

    /// Fold an update into the step at `pos`, located through a [`StepIndex`].
    pub fn apply_update(&mut self, pos: usize, update: StepUpdate) -> bool {
        let Some(step) = self.steps.get_mut(pos) else {
            return false;
        };
        match update {
            StepUpdate::Started { at } => {
                step.status.state = StepState::Starting;
                step.status.start_time = Some(at);
                step.status.end_time = None;
                step.status.message = None;
            }
            StepUpdate::Status(state) => step.status.state = state,
            StepUpdate::Hashed(hash) => step.hash = hash,
            StepUpdate::Applied { outputs, state } => {
                if outputs.is_some() {
                    step.outputs = outputs;
                }
                if state.is_some() {
                    step.state = state;
                }
            }
            StepUpdate::Completed { at } => {
                step.status.state = StepState::Complete;
                step.status.end_time = Some(at);
            }
            StepUpdate::Failed { message, at } => {
                step.status.state = StepState::Error;
                step.status.message = Some(message);
                step.status.end_time = Some(at);
            }
        }
        true
    }
}

/// Id lookups for one pass over a pipeline whose steps and edges stay put.
/// Statuses, outputs and hashes may change while it is in use.
#[derive(Debug, Clone, Default)]
pub struct StepIndex {
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    /// Required dependencies by position; `None` for an id with no step.
    requires: Vec<Vec<Option<usize>>>,
}

impl StepIndex {
    pub fn new(pipeline: &Pipeline) -> Self {
        let ids: Vec<String> = pipeline.steps.iter().map(Step::id).collect();
        let positions: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let mut requires = vec![Vec::new(); ids.len()];
        for edge in pipeline.edges.iter().filter(|e| e.required) {
            if let Some(&from) = positions.get(&edge.from) {
                requires[from].push(positions.get(&edge.to).copied());
            }
        }
        Self {
            ids,
            positions,
            requires,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Execution id of the step at `pos`.
    pub fn id(&self, pos: usize) -> &str {
        &self.ids[pos]
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// True when every required dependency of the step at `pos` satisfies
    /// `pred`. A dependency with no step never does.
    pub fn dependencies_in(
        &self,
        pipeline: &Pipeline,
        pos: usize,
        pred: impl Fn(&Step) -> bool,
    ) -> bool {
        self.requires.get(pos).map_or(true, |deps| {
            deps.iter()
                .all(|dep| dep.and_then(|d| pipeline.steps.get(d)).map_or(false, &pred))
        })
    }
}

impl OutputSource for Pipeline {
    fn lookup(&self, step: &str) -> Lookup<'_> {
        match self.step(step) {
            None => Lookup::UnknownStep,
            Some(s) => match &s.outputs {
                Some(o) => Lookup::Outputs(o),
                None => Lookup::NoOutputs,
            },
        }
    }
}

// ============================================================================
// Step events
// ============================================================================

/// A single change to one step, folded into the pipeline by
/// [`Pipeline::apply_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub step: String,
    pub update: StepUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepUpdate {
    Started {
        at: u64,
    },
    Status(StepState),
    Hashed(String),
    Applied {
        outputs: Option<ResourceOutputs>,
        state: Option<serde_json::Value>,
    },
    Completed {
        at: u64,
    },
    Failed {
        message: String,
        at: u64,
    },
}

impl StepEvent {
    pub fn new(step: impl Into<String>, update: StepUpdate) -> Self {
        Self {
            step: step.into(),
            update,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
