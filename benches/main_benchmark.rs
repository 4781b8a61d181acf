use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use camake::analyze::analyze;
use camake::model::{Registry, TargetId};
use camake::plan::build_action_list;
use camake::recipe::{CleanArgs, Recipe};
use camake::script::parse_dependency_file;
use camake::settings::FileConfig;

const MOCK_DEPENDENCY_FILE: &str = "obj/main.o: src/main.cpp \\\n include/model.h \\\n include/util.h \\\n include/format.h\n";

fn actionable(registry: &mut Registry, name: &str) -> TargetId {
    let id = registry.register(name, None, None).unwrap();
    registry.target_mut(id).set_execute(true);
    registry
        .target_mut(id)
        .add_recipe(Recipe::Clean(CleanArgs { files: Vec::new() }));
    id
}

/// A wide two-tier graph: one root, `width` link targets, each depending on
/// the same `width` shared objects.
fn wide_graph(width: usize) -> (Registry, TargetId) {
    let mut registry = Registry::new();
    let mut objects = Vec::new();
    for index in 0..width {
        objects.push(actionable(&mut registry, &format!("obj{index}")));
    }
    let root = actionable(&mut registry, "root");
    for index in 0..width {
        let link = actionable(&mut registry, &format!("link{index}"));
        registry.target_mut(link).add_dependencies(&objects);
        registry.target_mut(root).add_dependency(link);
    }
    (registry, root)
}

fn bench_plan_construction(c: &mut Criterion) {
    let (registry, root) = wide_graph(50);
    c.bench_function("build_action_list_wide_50", |b| {
        b.iter(|| build_action_list(black_box(&registry), black_box(root)))
    });
}

fn bench_analysis(c: &mut Criterion) {
    c.bench_function("analyze_wide_50", |b| {
        b.iter_batched(
            || wide_graph(50),
            |(mut registry, root)| analyze(&mut registry, root, false).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_dependency_file_parse(c: &mut Criterion) {
    c.bench_function("parse_dependency_file", |b| {
        b.iter(|| parse_dependency_file(black_box(MOCK_DEPENDENCY_FILE)))
    });
}

fn bench_config_parse(c: &mut Criterion) {
    let contents = "compiler = \"clang++\"\njobs = 8\nno_colors = false\n";
    c.bench_function("parse_camake_toml", |b| {
        b.iter(|| {
            let _: FileConfig = toml::from_str(black_box(contents)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_plan_construction,
    bench_analysis,
    bench_dependency_file_parse,
    bench_config_parse
);
criterion_main!(benches);
