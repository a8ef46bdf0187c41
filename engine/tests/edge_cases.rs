//! Edge case tests for rill-engine
//!
//! These tests drive the public API end to end: declare views, seed them,
//! then feed backend payloads through the normalizers.

use rill_engine::{
    normalize, resolve, ChangeEvent, Error, Filter, FilterRule, Record, RecordId, Reconciler,
    ResolvedViews, Store, ViewDeclaration, ViewMutation, ViewSpec,
};
use serde_json::{json, Value};

fn setup(specs: Vec<ViewSpec<String>>) -> (ResolvedViews<String>, Reconciler, Store) {
    let resolved = resolve(specs).unwrap();
    let reconciler = resolved.reconciler();
    let mut store = Store::new();
    for plan in &resolved.views {
        store.declare(plan.name.clone());
    }
    (resolved, reconciler, store)
}

fn ids(store: &Store, view: &str) -> Vec<RecordId> {
    store
        .get(view)
        .unwrap()
        .iter()
        .map(|r| r.id().clone())
        .collect()
}

fn supabase(kind: &str, new: Value, old: Value) -> ChangeEvent {
    normalize::supabase()
        .normalize(&json!({
            "schema": "public",
            "table": "countries",
            "eventType": kind,
            "new": new,
            "old": old,
        }))
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn initial_load_then_insert() {
    let (_, reconciler, mut store) = setup(vec!["countries".into()]);

    reconciler
        .seed(&mut store, "countries", vec![json!({"id": 1, "name": "France"})])
        .unwrap();
    reconciler.apply_change(
        &supabase("INSERT", json!({"id": 2, "name": "Italy"}), json!({})),
        &mut store,
    );

    let records: Vec<Value> = store
        .get("countries")
        .unwrap()
        .iter()
        .map(|r| r.payload().clone())
        .collect();
    assert_eq!(
        records,
        vec![
            json!({"id": 1, "name": "France"}),
            json!({"id": 2, "name": "Italy"})
        ]
    );
}

#[test]
fn duplicate_view_name_rejected_before_any_slot() {
    let specs: Vec<ViewSpec<String>> = vec![
        ViewDeclaration::new("countries", "countries").into(),
        ViewDeclaration::new("countries", "nations").into(),
    ];

    match resolve(specs) {
        Err(Error::DuplicateViewName(name)) => assert_eq!(name, "countries"),
        other => panic!("expected DuplicateViewName, got {other:?}"),
    }
}

#[test]
fn filter_exit_and_reentry() {
    let (_, reconciler, mut store) = setup(vec![ViewDeclaration::new("rich", "countries")
        .filter(FilterRule::Gte {
            field: "GDP".into(),
            value: json!(100),
        })
        .into()]);
    reconciler
        .seed(&mut store, "rich", vec![json!({"id": 1, "GDP": 150})])
        .unwrap();

    reconciler.apply_change(
        &supabase("UPDATE", json!({"id": 1, "GDP": 50}), json!({"id": 1})),
        &mut store,
    );
    assert!(ids(&store, "rich").is_empty());

    reconciler.apply_change(
        &supabase("UPDATE", json!({"id": 1, "GDP": 150}), json!({"id": 1})),
        &mut store,
    );
    assert_eq!(ids(&store, "rich"), vec![RecordId::Int(1)]);
}

#[test]
fn fan_out_with_divergent_filters() {
    let (_, reconciler, mut store) = setup(vec![
        ViewDeclaration::new("c_names", "countries")
            .filter(FilterRule::Like {
                field: "name".into(),
                pattern: "C%".into(),
            })
            .into(),
        ViewDeclaration::new("big", "countries")
            .filter(FilterRule::Gte {
                field: "GDP".into(),
                value: json!(100),
            })
            .into(),
    ]);
    reconciler.seed(&mut store, "c_names", vec![]).unwrap();
    reconciler.seed(&mut store, "big", vec![]).unwrap();

    let report = reconciler.apply_change(
        &supabase(
            "INSERT",
            json!({"id": 1, "name": "Chad", "GDP": 50}),
            json!({}),
        ),
        &mut store,
    );

    assert_eq!(report.outcome("c_names"), Some(ViewMutation::Appended));
    assert_eq!(report.outcome("big"), Some(ViewMutation::Unchanged));
    assert_eq!(ids(&store, "c_names"), vec![RecordId::Int(1)]);
    assert!(ids(&store, "big").is_empty());
}

#[test]
fn native_filter_alongside_rules() {
    let (_, reconciler, mut store) = setup(vec![ViewDeclaration::new("even", "countries")
        .filter(Filter::new(|r: &Record| {
            r.get("id")
                .and_then(Value::as_i64)
                .is_some_and(|id| id % 2 == 0)
        }))
        .into()]);
    reconciler
        .seed(
            &mut store,
            "even",
            (1..=6).map(|id| json!({"id": id})).collect(),
        )
        .unwrap();

    assert_eq!(
        ids(&store, "even"),
        vec![RecordId::Int(2), RecordId::Int(4), RecordId::Int(6)]
    );
}

// ============================================================================
// Delivery Edge Cases
// ============================================================================

#[test]
fn delete_of_never_materialized_record() {
    let (_, reconciler, mut store) = setup(vec!["countries".into()]);
    reconciler.seed(&mut store, "countries", vec![]).unwrap();

    let report = reconciler.apply_change(
        &supabase("DELETE", json!({}), json!({"id": 42})),
        &mut store,
    );

    assert_eq!(report.outcome("countries"), Some(ViewMutation::Unchanged));
    assert!(report.failures.is_empty());
}

#[test]
fn redelivered_insert_keeps_ids_unique() {
    let (_, reconciler, mut store) = setup(vec!["countries".into()]);
    reconciler.seed(&mut store, "countries", vec![]).unwrap();

    let insert = supabase("INSERT", json!({"id": 7, "name": "Peru"}), json!({}));
    reconciler.apply_change(&insert, &mut store);
    reconciler.apply_change(&insert, &mut store);

    assert_eq!(ids(&store, "countries"), vec![RecordId::Int(7)]);
}

#[test]
fn string_and_numeric_ids_are_distinct() {
    let (_, reconciler, mut store) = setup(vec!["countries".into()]);
    reconciler
        .seed(&mut store, "countries", vec![json!({"id": 1})])
        .unwrap();

    reconciler.apply_change(
        &supabase("DELETE", json!({}), json!({"id": "1"})),
        &mut store,
    );

    assert_eq!(ids(&store, "countries"), vec![RecordId::Int(1)]);
}

#[test]
fn live_insert_racing_snapshot_survives() {
    let (_, reconciler, mut store) = setup(vec!["countries".into()]);

    // arrives while the initial fetch is still in flight
    let report = reconciler.apply_change(
        &supabase("INSERT", json!({"id": 2, "name": "Italy"}), json!({})),
        &mut store,
    );
    assert_eq!(report.outcome("countries"), Some(ViewMutation::Buffered));
    assert_eq!(store.len("countries"), Some(0));

    // the fetch was taken before the insert
    let seed = reconciler
        .seed(&mut store, "countries", vec![json!({"id": 1, "name": "France"})])
        .unwrap();

    assert_eq!(seed.replayed, 1);
    assert_eq!(ids(&store, "countries"), vec![RecordId::Int(1), RecordId::Int(2)]);
}

#[test]
fn firestore_listener_feeds_its_view() {
    let (_, reconciler, mut store) = setup(vec![
        ViewDeclaration::new("cheap_flights", "flights")
            .filter(FilterRule::Lt {
                field: "price".into(),
                value: json!(100),
            })
            .into(),
        ViewDeclaration::new("all_flights", "flights").into(),
    ]);
    reconciler.seed(&mut store, "cheap_flights", vec![]).unwrap();
    reconciler.seed(&mut store, "all_flights", vec![]).unwrap();
    let settings = normalize::firestore("flights");

    for payload in [
        json!({"type": "added", "doc": {"id": "a", "price": 80}}),
        json!({"type": "added", "doc": {"id": "b", "price": 120}}),
        json!({"type": "modified", "doc": {"id": "b", "price": 90}}),
        json!({"type": "modified", "doc": {"id": "a", "price": 150}}),
    ] {
        let event = settings.normalize(&payload).unwrap();
        let report = reconciler.apply_to_view("cheap_flights", &event, &mut store);
        assert!(report.failures.is_empty());
    }

    assert_eq!(ids(&store, "cheap_flights"), vec![RecordId::from("b")]);
    // the sibling view has its own listener
    assert_eq!(store.len("all_flights"), Some(0));
}

#[test]
fn polled_changes_with_soft_delete_seed() {
    use rill_engine::{PolledChange, SeedOptions};

    let resolved = resolve::<String>(vec!["Country".into()]).unwrap();
    let reconciler = resolved
        .reconciler()
        .with_seed_options(SeedOptions::default().with_soft_delete_field("deletedAt"));
    let mut store = Store::new();
    store.declare("Country");

    reconciler
        .seed(
            &mut store,
            "Country",
            vec![
                json!({"id": 1, "deletedAt": null}),
                json!({"id": 2, "deletedAt": "2024-03-01T00:00:00Z"}),
            ],
        )
        .unwrap();
    assert_eq!(ids(&store, "Country"), vec![RecordId::Int(1)]);

    let settings = normalize::polled();
    let changes = [
        PolledChange {
            kind: "INSERT".into(),
            table: "Country".into(),
            record: json!({"id": 3, "deletedAt": null}),
            timestamp: 10,
        },
        PolledChange {
            kind: "DELETE".into(),
            table: "Country".into(),
            record: json!({"id": 1, "deletedAt": "2024-03-02T00:00:00Z"}),
            timestamp: 20,
        },
    ];
    for change in &changes {
        reconciler.apply_change(&settings.normalize(change).unwrap(), &mut store);
    }

    assert_eq!(ids(&store, "Country"), vec![RecordId::Int(3)]);
}

#[test]
fn independent_reconcilers_do_not_share_routing() {
    let (_, first, mut first_store) = setup(vec!["countries".into()]);
    let (_, second, mut second_store) = setup(vec!["cities".into()]);
    first.seed(&mut first_store, "countries", vec![]).unwrap();
    second.seed(&mut second_store, "cities", vec![]).unwrap();

    let event = supabase("INSERT", json!({"id": 1}), json!({}));
    let report = second.apply_change(&event, &mut second_store);

    assert!(report.outcomes.is_empty());
    assert_eq!(first.routing().views_for("cities").len(), 0);
    assert_eq!(first_store.len("countries"), Some(0));
}
