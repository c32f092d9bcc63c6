//! Benchmarks for tessera core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera::core::graph;
use tessera::core::parser;
use tessera::core::planner::Planner;
use tessera::core::reference::Template;
use tessera::core::types::*;
use tessera::resources::*;
use tessera::tripwire::hasher;

/// A chain of N secrets, each referencing the previous one's id.
fn chain(n: usize) -> Graph {
    let mut graph = Graph::default();
    for i in 0..n {
        let data = if i == 0 {
            Template::literal("root")
        } else {
            Template::parse(&format!("${{{{ secret/s{:04}.id }}}}", i - 1)).unwrap()
        };
        graph.nodes.push(Node::new(
            format!("s{i:04}"),
            ResourceInputs::Secret(SecretInputs {
                account: "vault".to_string(),
                data,
                namespace: None,
            }),
        ));
        if i > 0 {
            graph.edges.push(Edge::required(
                format!("secret/s{i:04}"),
                format!("secret/s{:04}", i - 1),
            ));
        }
    }
    graph
}

/// Mark every step complete with outputs, as after a successful apply.
fn settle(mut pipeline: Pipeline) -> Pipeline {
    for step in &mut pipeline.steps {
        step.status = StepStatus::complete();
        step.outputs = Some(ResourceOutputs::Secret(SecretOutputs {
            id: format!("{}-id", step.id()),
            data: String::new(),
        }));
    }
    let snapshot = pipeline.clone();
    for step in &mut pipeline.steps {
        let resolved = step.inputs.interpolate(&step.id(), &snapshot).unwrap();
        step.hash = hasher::hash_inputs(&resolved);
    }
    pipeline
}

fn bench_hash_inputs(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_inputs");
    for size in [64, 1024, 16384] {
        let inputs = ResourceInputs::Secret(SecretInputs {
            account: "vault".to_string(),
            data: Template::literal("x".repeat(size)),
            namespace: None,
        });
        group.bench_with_input(BenchmarkId::from_parameter(size), &inputs, |b, inputs| {
            b.iter(|| black_box(hasher::hash_inputs(black_box(inputs))));
        });
    }
    group.finish();
}

fn bench_graph_parse(c: &mut Criterion) {
    let yaml = r#"
nodes:
  - name: main
    type: vpc
    inputs:
      account: do
      region: nyc1
  - name: cluster
    environment: prod
    type: kubernetesCluster
    inputs:
      account: do
      region: nyc1
      vpc: ${{ vpc/main.id }}
      kubernetesVersion: "1.29"
  - name: app
    environment: prod
    type: namespace
    inputs:
      account: do
      cluster: ${{ prod/kubernetesCluster/cluster.id }}
edges:
  - from: prod/kubernetesCluster/cluster
    to: vpc/main
  - from: prod/namespace/app
    to: prod/kubernetesCluster/cluster
"#;

    c.bench_function("graph_parse", |b| {
        b.iter(|| black_box(parser::parse_graph(black_box(yaml)).unwrap()));
    });
}

fn bench_plan(c: &mut Criterion) {
    let planner = Planner::default();
    let mut group = c.benchmark_group("plan");
    for n in [10, 50, 100] {
        let graph = chain(n);
        let fresh = Pipeline::default();
        let settled = settle(planner.plan(&fresh, &graph, ContextLevel::None).unwrap());

        group.bench_with_input(BenchmarkId::new("create", n), &graph, |b, graph| {
            b.iter(|| black_box(planner.plan(&fresh, graph, ContextLevel::None).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("noop", n), &graph, |b, graph| {
            b.iter(|| black_box(planner.plan(&settled, graph, ContextLevel::None).unwrap()));
        });
    }
    group.finish();
}

fn bench_execution_order(c: &mut Criterion) {
    let planner = Planner::default();
    let mut group = c.benchmark_group("execution_order");
    for n in [10, 50, 100] {
        let pipeline = planner
            .plan(&Pipeline::default(), &chain(n), ContextLevel::None)
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &pipeline, |b, pipeline| {
            b.iter(|| black_box(graph::execution_order(black_box(pipeline)).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_hash_inputs,
    bench_graph_parse,
    bench_plan,
    bench_execution_order
);
criterion_main!(benches);
