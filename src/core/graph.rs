//! Structural validation and dependency ordering.
//!
//! Builds a DAG from required edges and computes a topological order using
//! Kahn's algorithm with deterministic (alphabetical) tie-breaking. Edges run
//! from dependent to dependency, so `to` is ordered before `from`.

use super::error::{Error, Result};
use super::identity::check_segment;
use super::types::{Edge, Graph, Pipeline};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Validate a pipeline: unique step ids and no dangling edge endpoints.
pub fn validate(pipeline: &Pipeline) -> Result<()> {
    let ids: Vec<String> = pipeline.steps.iter().map(|s| s.id()).collect();
    check_edges(&ids, &pipeline.edges)
}

/// Validate a desired graph: unique node ids, names usable inside
/// references, and no dangling edges.
pub fn validate_graph(graph: &Graph) -> Result<()> {
    for node in &graph.nodes {
        let segments = [
            Some(node.name.as_str()),
            node.environment.as_deref(),
            node.component.as_deref(),
        ];
        for segment in segments.into_iter().flatten() {
            check_segment(segment).map_err(|message| Error::Template {
                input: node.id(),
                message,
            })?;
        }
    }
    let ids: Vec<String> = graph.nodes.iter().map(|n| n.id()).collect();
    check_edges(&ids, &graph.edges)
}

fn check_edges(ids: &[String], edges: &[Edge]) -> Result<()> {
    let mut known: HashSet<&str> = HashSet::with_capacity(ids.len());
    for id in ids {
        if !known.insert(id.as_str()) {
            return Err(Error::DuplicateId(id.clone()));
        }
    }
    for edge in edges {
        if !known.contains(edge.from.as_str()) {
            return Err(Error::Structural {
                missing: edge.from.clone(),
                required_by: format!("edge to {}", edge.to),
            });
        }
        if !known.contains(edge.to.as_str()) {
            return Err(Error::Structural {
                missing: edge.to.clone(),
                required_by: edge.from.clone(),
            });
        }
    }
    Ok(())
}

/// Topological order of step ids over required edges, dependencies first.
pub fn execution_order(pipeline: &Pipeline) -> Result<Vec<String>> {
    validate(pipeline)?;
    let ids: Vec<String> = pipeline.steps.iter().map(|s| s.id()).collect();
    let mut in_degree: HashMap<&str, usize> = ids.iter().map(|id| (id.as_str(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in pipeline.edges.iter().filter(|e| e.required) {
        dependents
            .entry(edge.to.as_str())
            .or_default()
            .push(edge.from.as_str());
        if let Some(d) = in_degree.get_mut(edge.from.as_str()) {
            *d += 1;
        }
    }

    let ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut queue: VecDeque<&str> = ready.into_iter().collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());

        let mut next_ready: Vec<&str> = Vec::new();
        for dependent in dependents.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    next_ready.push(*dependent);
                }
            }
        }
        next_ready.sort_unstable();
        queue.extend(next_ready);
    }

    if order.len() != ids.len() {
        let ordered: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut remaining: Vec<String> = ids
            .iter()
            .filter(|id| !ordered.contains(id.as_str()))
            .cloned()
            .collect();
        remaining.sort();
        return Err(Error::Cycle(remaining));
    }

    Ok(order)
}
