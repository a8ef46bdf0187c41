//! Performance benchmarks for rill-engine

use rill_engine::{
    normalize, resolve, ChangeEvent, FilterRule, Record, Reconciler, Store, ViewDeclaration,
    ViewSpec,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

/// Four views over `countries`, three of them filtered.
fn create_views() -> (Reconciler, Vec<String>) {
    let specs: Vec<ViewSpec<String>> = vec![
        "countries".into(),
        ViewDeclaration::new("big", "countries")
            .filter(FilterRule::Gte {
                field: "GDP".into(),
                value: json!(100),
            })
            .into(),
        ViewDeclaration::new("c_names", "countries")
            .filter(FilterRule::Like {
                field: "name".into(),
                pattern: "C%".into(),
            })
            .into(),
        ViewDeclaration::new("europe", "countries")
            .filter(FilterRule::In {
                field: "continent".into(),
                values: vec![json!("EU")],
            })
            .into(),
    ];
    let resolved = resolve(specs).unwrap();
    let names = resolved.views.iter().map(|p| p.name.clone()).collect();
    (resolved.reconciler(), names)
}

fn country(id: u64) -> Value {
    json!({
        "id": id,
        "name": if id % 3 == 0 { format!("Country {id}") } else { format!("Land {id}") },
        "GDP": id % 200,
        "continent": if id % 2 == 0 { "EU" } else { "AS" },
    })
}

fn seeded_store(reconciler: &Reconciler, views: &[String], size: u64) -> Store {
    let rows: Vec<Value> = (0..size).map(country).collect();
    let mut store = Store::new();
    for view in views {
        store.declare(view.clone());
        reconciler.seed(&mut store, view, rows.clone()).unwrap();
    }
    store
}

fn bench_apply_change(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_change");

    for size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("update", size), size, |b, &size| {
            let (reconciler, views) = create_views();
            let mut store = seeded_store(&reconciler, &views, size);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let id = n % size;
                let mut row = country(id);
                row["GDP"] = json!((n * 7) % 200);
                let event = ChangeEvent::update("countries", Record::new(row).unwrap());
                reconciler.apply_change(black_box(&event), &mut store)
            })
        });

        group.bench_with_input(
            BenchmarkId::new("insert_delete", size),
            size,
            |b, &size| {
                let (reconciler, views) = create_views();
                let mut store = seeded_store(&reconciler, &views, size);

                b.iter(|| {
                    let insert =
                        ChangeEvent::insert("countries", Record::new(country(size)).unwrap());
                    reconciler.apply_change(black_box(&insert), &mut store);
                    let delete = ChangeEvent::delete("countries", size as i64);
                    reconciler.apply_change(black_box(&delete), &mut store)
                })
            },
        );
    }

    group.finish();
}

fn bench_seed(c: &mut Criterion) {
    let mut group = c.benchmark_group("seed");

    for size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("all_views", size), size, |b, &size| {
            let (reconciler, views) = create_views();
            let rows: Vec<Value> = (0..size).map(country).collect();

            b.iter(|| {
                let mut store = Store::new();
                for view in &views {
                    store.declare(view.clone());
                    reconciler
                        .seed(&mut store, view, black_box(rows.clone()))
                        .unwrap();
                }
                store
            })
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    let settings = normalize::supabase();
    let payload = json!({
        "schema": "public",
        "table": "countries",
        "eventType": "UPDATE",
        "new": country(42),
        "old": {"id": 42}
    });
    group.bench_function("supabase", |b| {
        b.iter(|| settings.normalize(black_box(&payload)))
    });

    let raw = serde_json::to_string(&payload).unwrap();
    group.bench_function("supabase_from_str", |b| {
        b.iter(|| {
            let value: Value = serde_json::from_str(black_box(&raw)).unwrap();
            settings.normalize(&value)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_apply_change, bench_seed, bench_normalize);
criterion_main!(benches);
