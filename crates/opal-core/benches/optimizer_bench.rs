use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opal_core::config::{OptimizationLevel, OptimizerOptions};
use opal_core::frontend::{ExprDecl, MethodDecl, ProgramDecl, StmtDecl, TypeDecl, TypeKindDecl};
use opal_test_helpers::compile::{load_decl, optimize_with, parse_with_runtime};
use opal_test_helpers::fixtures::{CONTROL_FLOW, LONGS, SHAPES, STRINGS};

/// `count` classes implementing one interface, a static driver per class
/// calling through the interface, and every other driver left unreachable
fn hierarchy(count: usize) -> ProgramDecl {
    let mut types = vec![
        TypeDecl {
            name: "Object".to_string(),
            kind: TypeKindDecl::Class,
            super_class: None,
            interfaces: Vec::new(),
            is_final: false,
            is_abstract: false,
            is_library: false,
            fields: Vec::new(),
            methods: Vec::new(),
            line: 0,
        },
        TypeDecl {
            name: "Task".to_string(),
            kind: TypeKindDecl::Interface,
            super_class: None,
            interfaces: Vec::new(),
            is_final: false,
            is_abstract: true,
            is_library: false,
            fields: Vec::new(),
            methods: vec![method("run", "long", None)],
            line: 0,
        },
    ];

    let mut entry_points = Vec::new();
    for i in 0..count {
        let name = format!("Task{}", i);
        let run = method(
            "run",
            "long",
            Some(vec![StmtDecl::Return {
                value: Some(ExprDecl::Binary {
                    op: "*".to_string(),
                    lhs: Box::new(ExprDecl::Long { value: i as i64 }),
                    rhs: Box::new(ExprDecl::Int { value: 3 }),
                }),
            }]),
        );
        let mut drive = method(
            "drive",
            "long",
            Some(vec![
                StmtDecl::Local {
                    name: "t".to_string(),
                    ty: "Task".to_string(),
                    init: Some(ExprDecl::Cast {
                        ty: "Task".to_string(),
                        expr: Box::new(ExprDecl::New {
                            class: name.clone(),
                            args: Vec::new(),
                        }),
                    }),
                },
                StmtDecl::Return {
                    value: Some(ExprDecl::Call {
                        method: "run".to_string(),
                        instance: Some(Box::new(ExprDecl::Local {
                            name: "t".to_string(),
                        })),
                        args: Vec::new(),
                    }),
                },
            ]),
        );
        drive.is_static = true;
        if i % 2 == 0 {
            entry_points.push(format!("{}.drive", name));
        }
        types.push(TypeDecl {
            name,
            kind: TypeKindDecl::Class,
            super_class: None,
            interfaces: vec!["Task".to_string()],
            is_final: false,
            is_abstract: false,
            is_library: false,
            fields: Vec::new(),
            methods: vec![run, drive],
            line: 0,
        });
    }

    types.extend(parse_with_runtime("types: []").types);
    ProgramDecl {
        types,
        entry_points,
        object_type: None,
    }
}

fn method(name: &str, return_type: &str, body: Option<Vec<StmtDecl>>) -> MethodDecl {
    MethodDecl {
        name: name.to_string(),
        params: Vec::new(),
        return_type: return_type.to_string(),
        is_static: false,
        is_final: false,
        is_constructor: false,
        body,
        native: None,
        line: 0,
    }
}

fn options(level: OptimizationLevel, incremental: bool) -> OptimizerOptions {
    OptimizerOptions {
        level,
        incremental,
        verify_after_each_pass: false,
        ..OptimizerOptions::default()
    }
}

fn bench_fixtures(c: &mut Criterion) {
    let fixtures = [
        ("shapes", SHAPES),
        ("longs", LONGS),
        ("strings", STRINGS),
        ("control_flow", CONTROL_FLOW),
    ];
    let mut group = c.benchmark_group("fixtures_o3");
    for (name, yaml) in fixtures {
        let decl = parse_with_runtime(yaml);
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut program = load_decl(black_box(&decl));
                optimize_with(&mut program, options(OptimizationLevel::O3, true))
            })
        });
    }
    group.finish();
}

fn bench_hierarchy(c: &mut Criterion) {
    let mut group = c.benchmark_group("hierarchy");
    for size in [10, 100, 500] {
        let decl = hierarchy(size);
        for incremental in [true, false] {
            let label = if incremental { "incremental" } else { "full" };
            group.bench_with_input(BenchmarkId::new(label, size), &decl, |b, decl| {
                b.iter(|| {
                    let mut program = load_decl(decl);
                    optimize_with(&mut program, options(OptimizationLevel::O3, incremental))
                })
            });
        }
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let decl = hierarchy(500);
    c.bench_function("load_hierarchy_500", |b| {
        b.iter(|| load_decl(black_box(&decl)))
    });
}

criterion_group!(benches, bench_fixtures, bench_hierarchy, bench_load);
criterion_main!(benches);
