//! Impact propagation benchmarks
//!
//! Measures `predict_change_impact` and `analyze_specific_domains_impact`
//! over synthetic layered domain maps.
//!
//! Run with: cargo bench --bench impact

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use context_gateway::config::ImpactConfig;
use context_gateway::domain::model::{Domain, DomainMap, DomainRelationship, RelationshipType};
use context_gateway::domain::{analyze_specific_domains_impact, predict_change_impact};

/// `layers` layers of `width` domains; every domain uses two domains of the layer below
fn layered_map(layers: usize, width: usize) -> DomainMap {
    let root = PathBuf::from("/bench");
    let name = |layer: usize, i: usize| format!("L{}D{}", layer, i);

    let mut domains = BTreeMap::new();
    let mut relationships = Vec::new();
    for layer in 0..layers {
        for i in 0..width {
            let mut domain = Domain::new(name(layer, i), root.join(name(layer, i)));
            domain.confidence = 0.8;
            domain.source_files = vec![format!("{}/Type{}.cs", name(layer, i), i)];
            if layer > 0 {
                for target in [i, (i + 1) % width] {
                    domain.dependencies.push(name(layer - 1, target));
                    relationships.push(DomainRelationship::new(
                        name(layer, i),
                        name(layer - 1, target),
                        RelationshipType::Uses,
                        0.7,
                        vec![format!("Type{}", target)],
                        "field reference",
                    ));
                }
            }
            domains.insert(name(layer, i), domain);
        }
    }

    DomainMap {
        domains,
        relationships,
        isolated_domains: Vec::new(),
        cross_cutting_concerns: Vec::new(),
        project_root: root,
        generated_at: chrono::Utc::now(),
    }
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_change_impact");
    group.measurement_time(Duration::from_secs(5));

    for (layers, width) in [(4, 5), (6, 20), (10, 50)] {
        let map = layered_map(layers, width);
        let changed = vec![PathBuf::from("L0D0/Type0.cs"), PathBuf::from("L0D1/Type1.cs")];
        let config = ImpactConfig::default();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", layers, width)),
            &map,
            |b, map| b.iter(|| predict_change_impact(black_box(map), &changed, &config)),
        );
    }

    group.finish();
}

fn bench_specific_domains(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_specific_domains_impact");
    group.measurement_time(Duration::from_secs(5));

    let map = layered_map(10, 50);
    let config = ImpactConfig::default();
    let sources = vec!["L0D0".to_string()];
    for depth in [1usize, 3, 10] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            b.iter(|| {
                analyze_specific_domains_impact(
                    black_box(&map),
                    &sources,
                    None,
                    true,
                    Some(depth),
                    &config,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_predict, bench_specific_domains);
criterion_main!(benches);
