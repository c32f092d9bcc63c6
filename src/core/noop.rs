//! No-op resolution: downgrade updates whose resolved inputs are unchanged.
//!
//! A step can only be judged once its dependencies are complete, because
//! their outputs feed its hash. Passes repeat until one makes no change.

use super::identity::ResourceKey;
use super::planner::InputHasher;
use super::types::*;
use std::collections::HashMap;

/// Downgrade `update` steps of `pipeline` to `no-op` where safe, in place.
///
/// Steps outside `context` are forced to no-op without evaluation. Others
/// become no-op when their hash over resolved inputs matches the settled
/// step in `before`; the historical outputs, state and hash carry forward.
pub fn resolve(
    before: &Pipeline,
    pipeline: &mut Pipeline,
    context: ContextLevel,
    hasher: &dyn InputHasher,
) {
    let index = StepIndex::new(pipeline);
    let mut settled: HashMap<ResourceKey, &Step> = HashMap::new();
    for prev in before.steps.iter().filter(|s| s.is_settled()) {
        settled.entry(prev.key()).or_insert(prev);
    }
    let candidates: Vec<(usize, &Step)> = (0..index.len())
        .filter(|&i| pipeline.steps[i].action == Action::Update)
        .filter_map(|i| settled.get(&pipeline.steps[i].key()).map(|prev| (i, *prev)))
        .collect();

    let mut passes = 0u32;
    loop {
        passes += 1;
        let mut changed = false;

        for &(i, prev) in &candidates {
            if pipeline.steps[i].action != Action::Update {
                continue;
            }
            let id = index.id(i);

            if context.excludes(prev.key().context_level()) {
                tracing::debug!(step = %id, ?context, "outside planning context");
                mark_unchanged(&mut pipeline.steps[i], prev);
                changed = true;
                continue;
            }

            let ready = index.dependencies_in(pipeline, i, |dep| {
                dep.status.state == StepState::Complete
            });
            if !ready {
                continue;
            }

            let resolved = match pipeline.steps[i].inputs.interpolate(id, &*pipeline) {
                Ok(resolved) => resolved,
                Err(e) => {
                    // left as an update; the executor reports it
                    tracing::debug!(step = %id, error = %e, "cannot resolve inputs yet");
                    continue;
                }
            };
            let hash = hasher.hash(&resolved);
            if hash == prev.hash {
                tracing::debug!(step = %id, "unchanged");
                mark_unchanged(&mut pipeline.steps[i], prev);
                changed = true;
            } else {
                pipeline.steps[i].hash = hash;
            }
        }

        if !changed {
            break;
        }
    }
    tracing::trace!(passes, "no-op resolution converged");
}

fn mark_unchanged(step: &mut Step, prev: &Step) {
    step.action = Action::NoOp;
    step.status = StepStatus::complete();
    step.outputs = prev.outputs.clone();
    step.state = prev.state.clone();
    step.hash = prev.hash.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::Blake3Hasher;
    use crate::core::reference::Template;
    use crate::resources::*;

    fn secret(name: &str, data: &str) -> Node {
        Node::new(
            name,
            ResourceInputs::Secret(SecretInputs {
                account: "vault".to_string(),
                data: Template::parse(data).unwrap(),
                namespace: None,
            }),
        )
    }

    fn settled(node: &Node, outputs_id: &str) -> Step {
        let mut step = Step::from_node(node, Action::Create, Color::Blue);
        step.hash = Blake3Hasher.hash(&step.inputs);
        step.status = StepStatus::complete();
        step.outputs = Some(ResourceOutputs::Secret(SecretOutputs {
            id: outputs_id.to_string(),
            data: String::new(),
        }));
        step
    }

    fn update_of(prev: &Step) -> Step {
        let mut step = prev.clone();
        step.action = Action::Update;
        step.status = StepStatus::default();
        step.outputs = None;
        step
    }

    #[test]
    fn test_unchanged_root_becomes_noop() {
        let prev = settled(&secret("a", "x"), "s-a");
        let before = Pipeline {
            steps: vec![prev.clone()],
            edges: vec![],
        };
        let mut p = Pipeline {
            steps: vec![update_of(&prev)],
            edges: vec![],
        };
        resolve(&before, &mut p, ContextLevel::None, &Blake3Hasher);
        assert_eq!(p.steps[0].action, Action::NoOp);
        assert_eq!(p.steps[0].status.state, StepState::Complete);
        assert_eq!(p.steps[0].outputs, prev.outputs);
    }

    #[test]
    fn test_fixed_point_reaches_dependents() {
        let a = settled(&secret("a", "x"), "s-a");
        let b_node = secret("b", "${{ secret/a-blue.id }}");
        let mut b = settled(&b_node, "s-b");
        // hash over resolved inputs, as the executor records it
        let only_a = Pipeline {
            steps: vec![a.clone()],
            edges: vec![],
        };
        let resolved = b.inputs.interpolate("secret/b-blue", &only_a).unwrap();
        b.hash = Blake3Hasher.hash(&resolved);
        let edges = vec![Edge::required("secret/b-blue", "secret/a-blue")];
        let before = Pipeline {
            steps: vec![b.clone(), a.clone()],
            edges: edges.clone(),
        };
        // dependent listed first so the first pass cannot judge it
        let mut p = Pipeline {
            steps: vec![update_of(&b), update_of(&a)],
            edges,
        };
        resolve(&before, &mut p, ContextLevel::None, &Blake3Hasher);
        assert!(p.steps.iter().all(|s| s.action == Action::NoOp));
    }

    #[test]
    fn test_long_reversed_chain_converges() {
        let mut before = Pipeline::default();
        for i in 0..200 {
            let data = if i == 0 {
                "root".to_string()
            } else {
                format!("${{{{ secret/s{}-blue.id }}}}", i - 1)
            };
            let id = format!("secret/s{}-blue", i);
            let mut step = settled(&secret(&format!("s{}", i), &data), &format!("id-{}", i));
            step.hash = Blake3Hasher.hash(&step.inputs.interpolate(&id, &before).unwrap());
            if i > 0 {
                before
                    .edges
                    .push(Edge::required(id, format!("secret/s{}-blue", i - 1)));
            }
            before.steps.push(step);
        }
        let mut p = Pipeline {
            steps: before.steps.iter().rev().map(update_of).collect(),
            edges: before.edges.clone(),
        };
        resolve(&before, &mut p, ContextLevel::None, &Blake3Hasher);
        assert!(p.steps.iter().all(|s| s.action == Action::NoOp));
        assert_eq!(p.steps[0].outputs, before.steps[199].outputs);
    }

    #[test]
    fn test_changed_input_stays_update_with_fresh_hash() {
        let prev = settled(&secret("a", "x"), "s-a");
        let before = Pipeline {
            steps: vec![prev.clone()],
            edges: vec![],
        };
        let mut step = Step::from_node(&secret("a", "y"), Action::Update, Color::Blue);
        step.hash = "stale".to_string();
        let mut p = Pipeline {
            steps: vec![step],
            edges: vec![],
        };
        resolve(&before, &mut p, ContextLevel::None, &Blake3Hasher);
        assert_eq!(p.steps[0].action, Action::Update);
        assert_ne!(p.steps[0].hash, prev.hash);
        assert_ne!(p.steps[0].hash, "stale");
    }

    #[test]
    fn test_out_of_scope_forced_noop() {
        let node = secret("a", "x").with_environment("prod").with_component("shop");
        let prev = settled(&node, "s-a");
        let before = Pipeline {
            steps: vec![prev.clone()],
            edges: vec![],
        };
        let node = secret("a", "changed")
            .with_environment("prod")
            .with_component("shop");
        let mut changed = Step::from_node(&node, Action::Update, Color::Blue);
        changed.state = prev.state.clone();
        let mut p = Pipeline {
            steps: vec![changed],
            edges: vec![],
        };
        resolve(&before, &mut p, ContextLevel::Environment, &Blake3Hasher);
        assert_eq!(p.steps[0].action, Action::NoOp);
        assert_eq!(p.steps[0].hash, prev.hash);
    }

    #[test]
    fn test_in_scope_change_not_forced() {
        let node = secret("a", "x").with_environment("prod");
        let prev = settled(&node, "s-a");
        let before = Pipeline {
            steps: vec![prev],
            edges: vec![],
        };
        let mut p = Pipeline {
            steps: vec![Step::from_node(
                &secret("a", "changed").with_environment("prod"),
                Action::Update,
                Color::Blue,
            )],
            edges: vec![],
        };
        resolve(&before, &mut p, ContextLevel::Environment, &Blake3Hasher);
        assert_eq!(p.steps[0].action, Action::Update);
    }

    #[test]
    fn test_pending_dependency_blocks_evaluation() {
        let a = settled(&secret("a", "x"), "s-a");
        let b = settled(&secret("b", "${{ secret/a-blue.id }}"), "s-b");
        let edges = vec![Edge::required("secret/b-blue", "secret/a-blue")];
        let before = Pipeline {
            steps: vec![a.clone(), b.clone()],
            edges: edges.clone(),
        };
        let changed_a = Step::from_node(&secret("a", "new"), Action::Update, Color::Blue);
        let mut p = Pipeline {
            steps: vec![changed_a, update_of(&b)],
            edges,
        };
        resolve(&before, &mut p, ContextLevel::None, &Blake3Hasher);
        assert_eq!(p.steps[0].action, Action::Update);
        assert_eq!(p.steps[1].action, Action::Update);
    }
}
