//! Plan generation: diff a prior pipeline against a desired graph.
//!
//! Desired nodes are matched to prior steps by [`ResourceKey`], never by id
//! text. Matched settled steps become updates that inherit color and
//! back-end state; everything else is created blue. Prior steps with no
//! desired counterpart become deletions with their incoming edges reversed.

use super::error::Result;
use super::graph;
use super::identity::ResourceKey;
use super::noop;
use super::types::*;
use crate::resources::ResourceInputs;
use crate::tripwire::hasher;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Fingerprints a step's inputs. Back-ends may supply their own.
pub trait InputHasher: Send + Sync {
    fn hash(&self, inputs: &ResourceInputs) -> String;
}

/// BLAKE3 over canonical JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl InputHasher for Blake3Hasher {
    fn hash(&self, inputs: &ResourceInputs) -> String {
        hasher::hash_inputs(inputs)
    }
}

/// Diffs prior pipelines against desired graphs.
#[derive(Clone)]
pub struct Planner {
    hasher: Arc<dyn InputHasher>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(Arc::new(Blake3Hasher))
    }
}

impl Planner {
    pub fn new(hasher: Arc<dyn InputHasher>) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &dyn InputHasher {
        self.hasher.as_ref()
    }

    /// Produce the pipeline that moves `before` to `after`.
    pub fn plan(&self, before: &Pipeline, after: &Graph, context: ContextLevel) -> Result<Pipeline> {
        graph::validate_graph(after)?;

        let mut pipeline = Pipeline::default();
        let mut ids: HashMap<String, String> = HashMap::with_capacity(after.nodes.len());
        let mut by_key: HashMap<ResourceKey, String> = HashMap::with_capacity(after.nodes.len());

        for node in &after.nodes {
            let key = node.key();
            let step = match before.settled(&key) {
                Some(prev) => {
                    let mut step = Step::from_node(node, Action::Update, prev.color);
                    step.state = prev.state.clone();
                    step
                }
                None => Step::from_node(node, Action::Create, Color::Blue),
            };
            let step_id = step.id();
            tracing::debug!(node = %key, step = %step_id, action = %step.action, "matched node");
            ids.insert(node.id(), step_id.clone());
            by_key.insert(key, step_id);
            pipeline.steps.push(step);
        }

        for step in &mut pipeline.steps {
            step.inputs.rewrite_ids(&ids);
            step.hash = self.hasher.hash(&step.inputs);
        }

        pipeline.edges = after
            .edges
            .iter()
            .filter_map(|edge| {
                Some(Edge {
                    from: ids.get(&edge.from)?.clone(),
                    to: ids.get(&edge.to)?.clone(),
                    required: edge.required,
                })
            })
            .collect();

        let deleted = self.plan_deletions(before, &mut pipeline, &mut by_key);
        reverse_edges(before, &deleted, &by_key, &mut pipeline);

        noop::resolve(before, &mut pipeline, context, self.hasher.as_ref());
        graph::validate(&pipeline)?;

        let summary = pipeline.summary();
        tracing::info!(
            create = summary.to_create,
            update = summary.to_update,
            delete = summary.to_delete,
            unchanged = summary.unchanged,
            "planned pipeline"
        );
        Ok(pipeline)
    }

    /// Emit a delete step for every prior step that is gone from the desired
    /// graph and has something to destroy. Returns the prior ids deleted.
    fn plan_deletions(
        &self,
        before: &Pipeline,
        pipeline: &mut Pipeline,
        by_key: &mut HashMap<ResourceKey, String>,
    ) -> HashSet<String> {
        let mut deleted = HashSet::new();
        for prev in &before.steps {
            let finished_delete =
                prev.action == Action::Delete && prev.status.state == StepState::Complete;
            let never_started =
                prev.action == Action::Create && prev.status.state == StepState::Pending;
            if finished_delete || never_started {
                continue;
            }
            let key = prev.key();
            if by_key.contains_key(&key) {
                continue;
            }
            if prev.outputs.is_none() {
                tracing::debug!(step = %prev.id(), "nothing to destroy");
                continue;
            }

            let mut step = prev.clone();
            step.action = Action::Delete;
            step.status = StepStatus::default();
            let id = step.id();
            by_key.insert(key, id.clone());
            deleted.insert(prev.id());
            pipeline.steps.push(step);
        }
        deleted
    }
}

/// Destruction runs opposite to creation: every prior edge that pointed at a
/// deleted step is carried over reversed.
fn reverse_edges(
    before: &Pipeline,
    deleted: &HashSet<String>,
    by_key: &HashMap<ResourceKey, String>,
    pipeline: &mut Pipeline,
) {
    for edge in &before.edges {
        if !deleted.contains(&edge.to) {
            continue;
        }
        let Some(dependent) = before.step(&edge.from) else {
            continue;
        };
        let Some(dependent_id) = by_key.get(&dependent.key()) else {
            continue;
        };
        let reversed = Edge {
            from: edge.to.clone(),
            to: dependent_id.clone(),
            required: edge.required,
        };
        if !pipeline.edges.contains(&reversed) {
            pipeline.edges.push(reversed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::Template;
    use crate::resources::*;

    fn vpc(name: &str, region: &str) -> Node {
        Node::new(
            name,
            ResourceInputs::Vpc(VpcInputs {
                account: "do".to_string(),
                region: Template::literal(region),
                cidr: None,
                description: None,
            }),
        )
    }

    fn cluster(name: &str, vpc_ref: &str) -> Node {
        Node::new(
            name,
            ResourceInputs::KubernetesCluster(KubernetesClusterInputs {
                account: "do".to_string(),
                region: Template::literal("nyc1"),
                vpc: Template::parse(vpc_ref).unwrap(),
                kubernetes_version: Template::literal("1.29"),
                node_pools: vec![],
            }),
        )
        .with_environment("prod")
    }

    fn two_node_graph() -> Graph {
        Graph {
            nodes: vec![vpc("main", "nyc1"), cluster("k8s", "${{ vpc/main.id }}")],
            edges: vec![Edge::required("prod/kubernetesCluster/k8s", "vpc/main")],
        }
    }

    /// Simulate an apply: complete every step with outputs and a hash over
    /// its resolved inputs.
    fn settle(planner: &Planner, mut pipeline: Pipeline) -> Pipeline {
        let order = graph::execution_order(&pipeline).unwrap();
        for id in order {
            let pos = pipeline.position(&id).unwrap();
            let resolved = pipeline.steps[pos].inputs.interpolate(&id, &pipeline).unwrap();
            let outputs = match pipeline.steps[pos].kind() {
                ResourceKind::Vpc => ResourceOutputs::Vpc(VpcOutputs {
                    id: format!("vpc-{}", pipeline.steps[pos].name),
                    name: pipeline.steps[pos].name.clone(),
                    region: "nyc1".to_string(),
                    description: None,
                }),
                kind => ResourceOutputs::from_json(kind, serde_json::json!({"id": "x"})).unwrap(),
            };
            let step = &mut pipeline.steps[pos];
            step.hash = planner.hasher().hash(&resolved);
            step.outputs = Some(outputs);
            step.status = StepStatus::complete();
        }
        pipeline
    }

    #[test]
    fn test_plan_pure_creation() {
        let planner = Planner::default();
        let p = planner
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        assert_eq!(p.steps.len(), 2);
        assert!(p.steps.iter().all(|s| s.action == Action::Create));
        assert!(p.steps.iter().all(|s| s.color == Color::Blue));
        assert!(p.steps.iter().all(|s| s.hash.starts_with("blake3:")));
        assert_eq!(
            p.edges,
            vec![Edge::required("prod/kubernetesCluster/k8s-blue", "vpc/main-blue")]
        );
    }

    #[test]
    fn test_plan_rewrites_references_to_step_ids() {
        let p = Planner::default()
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        let refs: Vec<String> = p.steps[1].inputs.references().iter().map(|r| r.step.clone()).collect();
        assert_eq!(refs, vec!["vpc/main-blue"]);
    }

    #[test]
    fn test_plan_idempotent_after_apply() {
        let planner = Planner::default();
        let first = planner
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        let applied = settle(&planner, first);
        let second = planner
            .plan(&applied, &two_node_graph(), ContextLevel::None)
            .unwrap();
        assert_eq!(second.steps.len(), 2);
        for step in &second.steps {
            assert_eq!(step.action, Action::NoOp, "{}", step.id());
            assert_eq!(step.status.state, StepState::Complete);
            assert!(step.outputs.is_some());
        }
    }

    #[test]
    fn test_plan_changed_input_is_update() {
        let planner = Planner::default();
        let first = planner
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        let applied = settle(&planner, first);

        let mut changed = two_node_graph();
        changed.nodes[0] = vpc("main", "sfo3");
        let second = planner.plan(&applied, &changed, ContextLevel::None).unwrap();

        let vpc_step = second.step("vpc/main-blue").unwrap();
        assert_eq!(vpc_step.action, Action::Update);
        assert_ne!(vpc_step.hash, applied.step("vpc/main-blue").unwrap().hash);
        // dependency not complete yet, so the cluster cannot be judged
        let cluster_step = second.step("prod/kubernetesCluster/k8s-blue").unwrap();
        assert_eq!(cluster_step.action, Action::Update);
    }

    #[test]
    fn test_plan_update_inherits_color_and_state() {
        let planner = Planner::default();
        let mut prior = settle(
            &planner,
            planner
                .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
                .unwrap(),
        );
        prior.steps[0].color = Color::Green;
        prior.steps[0].state = Some(serde_json::json!({"urn": "abc"}));
        prior.edges.clear();

        let graph = Graph {
            nodes: vec![vpc("main", "ams3")],
            edges: vec![],
        };
        let p = planner.plan(&prior, &graph, ContextLevel::None).unwrap();
        let step = p.step("vpc/main-green").unwrap();
        assert_eq!(step.action, Action::Update);
        assert_eq!(step.state, Some(serde_json::json!({"urn": "abc"})));
    }

    #[test]
    fn test_plan_pure_deletion_reverses_edges() {
        let planner = Planner::default();
        let applied = settle(
            &planner,
            planner
                .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
                .unwrap(),
        );
        let p = planner
            .plan(&applied, &Graph::default(), ContextLevel::None)
            .unwrap();
        assert_eq!(p.steps.len(), 2);
        assert!(p.steps.iter().all(|s| s.action == Action::Delete));
        assert!(p.steps.iter().all(|s| s.status.state == StepState::Pending));
        assert!(p.steps.iter().all(|s| s.outputs.is_some()));
        assert_eq!(
            p.edges,
            vec![Edge::required("vpc/main-blue", "prod/kubernetesCluster/k8s-blue")]
        );
    }

    #[test]
    fn test_plan_skips_deletion_without_outputs() {
        let planner = Planner::default();
        let mut prior = planner
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        // started but failed before producing outputs
        for step in &mut prior.steps {
            step.status.state = StepState::Error;
        }
        let p = planner
            .plan(&prior, &Graph::default(), ContextLevel::None)
            .unwrap();
        assert!(p.is_empty());
        assert!(p.edges.is_empty());
    }

    #[test]
    fn test_plan_ignores_completed_deletes_and_unstarted_creates() {
        let planner = Planner::default();
        let mut prior = settle(
            &planner,
            planner
                .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
                .unwrap(),
        );
        prior.steps[0].action = Action::Delete;
        prior.steps[1].action = Action::Create;
        prior.steps[1].status = StepStatus::default();
        let p = planner
            .plan(&prior, &Graph::default(), ContextLevel::None)
            .unwrap();
        assert!(p.is_empty());
    }

    #[test]
    fn test_plan_incomplete_match_is_recreated() {
        let planner = Planner::default();
        let mut prior = settle(
            &planner,
            planner
                .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
                .unwrap(),
        );
        prior.steps[0].status.state = StepState::Error;
        let p = planner
            .plan(&prior, &two_node_graph(), ContextLevel::None)
            .unwrap();
        assert_eq!(p.step("vpc/main-blue").unwrap().action, Action::Create);
    }

    #[test]
    fn test_plan_rejects_dangling_edge() {
        let mut graph = two_node_graph();
        graph.edges.push(Edge::required("vpc/main", "vpc/ghost"));
        let err = Planner::default()
            .plan(&Pipeline::default(), &graph, ContextLevel::None)
            .unwrap_err();
        assert!(err.to_string().contains("vpc/ghost"));
    }

    struct ConstantHasher;

    impl InputHasher for ConstantHasher {
        fn hash(&self, _inputs: &ResourceInputs) -> String {
            "const".to_string()
        }
    }

    #[test]
    fn test_plan_uses_supplied_hasher() {
        let planner = Planner::new(Arc::new(ConstantHasher));
        let p = planner
            .plan(&Pipeline::default(), &two_node_graph(), ContextLevel::None)
            .unwrap();
        assert!(p.steps.iter().all(|s| s.hash == "const"));
    }
}
