mod fixtures;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use feature_store::{
    AttributeKind, ChangeKind, Feature, FeatureCursor, FeatureType, Filter, Geometry, Hints,
    Query, SortBy, Store, StoreConfig, StoreError, Value, WorkerPool,
};
use fixtures::*;

fn lanes(features: &[Feature]) -> Vec<i64> {
    features
        .iter()
        .map(|f| f.get("lanes").and_then(Value::as_int).unwrap())
        .collect()
}

fn ids(features: &[Feature]) -> Vec<i64> {
    features.iter().map(|f| f.id().unwrap()).collect()
}

fn all(store: &feature_store::Store, type_name: &str) -> Vec<Feature> {
    store.query(&Query::all(type_name)).unwrap().drain().unwrap()
}

#[test]
fn add_assigns_ids_and_notifies() {
    let store = store();
    let t = store.create_schema(roads_type()).unwrap();
    let events = record_events(&store);

    let added = store
        .add("roads", (1..=3).map(|i| road(&t, "r", i)))
        .unwrap();

    assert_eq!(added, BTreeSet::from([1, 2, 3]));
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Added);
    assert_eq!(events[0].ids, added);
    assert_eq!(events[0].count, 3);
}

#[test]
fn stored_records_are_copies() {
    let store = store();
    seeded_roads(&store, 1);

    let mut fetched = store.get("roads", 1).unwrap().unwrap();
    fetched.set("lanes", 42).unwrap();

    assert_eq!(store.get("roads", 1).unwrap().unwrap().get("lanes"), Some(&Value::Int(1)));
    assert_eq!(store.get("roads", 99).unwrap(), None);
}

#[test]
fn remove_even_ids() {
    let store = store();
    seeded_roads(&store, 5);
    let events = record_events(&store);

    let event = store
        .remove("roads", &Filter::custom(|f| f.id().is_some_and(|id| id % 2 == 0)))
        .unwrap();

    assert_eq!(event.kind, ChangeKind::Removed);
    assert_eq!(event.ids, BTreeSet::from([2, 4]));
    assert_eq!(event.count, 2);
    assert_eq!(ids(&all(&store, "roads")), vec![1, 3, 5]);
    assert_eq!(store.record_count("roads").unwrap(), 3);
    assert_eq!(events.lock().unwrap().as_slice(), &[event]);
}

#[test]
fn update_reports_changed_ids() {
    let store = store();
    seeded_roads(&store, 5);

    let event = store
        .update("roads", &Filter::ge("lanes", 4), &[("lanes".into(), Value::Int(1))])
        .unwrap();

    assert_eq!(event.kind, ChangeKind::Updated);
    assert_eq!(event.ids, BTreeSet::from([4, 5]));
    assert_eq!(lanes(&all(&store, "roads")), vec![1, 2, 3, 1, 1]);
}

#[test]
fn update_by_ids_skips_missing_records() {
    let store = store();
    seeded_roads(&store, 3);

    let event = store
        .update("roads", &Filter::ids([2, 9]), &[("name".into(), "renamed".into())])
        .unwrap();

    assert_eq!(event.ids, BTreeSet::from([2]));
    assert_eq!(
        store.get("roads", 2).unwrap().unwrap().get("name"),
        Some(&Value::from("renamed"))
    );
}

#[test]
fn update_rejects_bad_overwrites() {
    let store = store();
    seeded_roads(&store, 2);

    let unknown = store.update("roads", &Filter::Include, &[("width".into(), Value::Int(3))]);
    assert!(matches!(unknown, Err(StoreError::UnknownAttribute { .. })));

    let identifier = store.update("roads", &Filter::Include, &[("fid".into(), Value::Int(7))]);
    assert!(matches!(identifier, Err(StoreError::InvalidValue { .. })));

    let required = store.update("roads", &Filter::Include, &[("name".into(), Value::Null)]);
    assert!(matches!(required, Err(StoreError::InvalidValue { .. })));

    let crs = store.update(
        "roads",
        &Filter::Include,
        &[("path".into(), in_mercator(Geometry::point(1.0, 1.0)).into())],
    );
    assert!(matches!(crs, Err(StoreError::CrsMismatch { .. })));

    assert_eq!(lanes(&all(&store, "roads")), vec![1, 2]);
}

#[test]
fn crs_mismatch_leaves_collection_untouched() {
    let store = store();
    let t = store.create_schema(roads_type()).unwrap();
    let events = record_events(&store);

    let bad = road(&t, "bad", 2)
        .with("path", in_mercator(Geometry::point(0.0, 0.0)))
        .unwrap();
    let result = store.add("roads", [road(&t, "good", 1), bad]);

    assert!(matches!(result, Err(StoreError::CrsMismatch { attribute, .. }) if attribute == "path"));
    assert!(all(&store, "roads").is_empty());
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn missing_required_attribute_is_rejected() {
    let store = store();
    let t = store.create_schema(roads_type()).unwrap();

    let result = store.add("roads", [Feature::new(t).with("lanes", 2).unwrap()]);

    assert!(matches!(result, Err(StoreError::InvalidValue { attribute, .. }) if attribute == "name"));
}

#[test]
fn records_of_another_type_are_rejected() {
    let store = store();
    store.create_schema(roads_type()).unwrap();
    let other = Arc::new(sightings_type());

    let result = store.add("roads", [sighting(&other, "heron", 1)]);

    assert!(matches!(result, Err(StoreError::TypeMismatch { .. })));
}

#[test]
fn unknown_collection() {
    let store = store();
    let missing = |r: Result<(), StoreError>| matches!(r, Err(StoreError::UnknownType(name)) if name == "nope");

    assert!(missing(store.query(&Query::all("nope")).map(|_| ())));
    assert!(missing(store.add("nope", Vec::new()).map(|_| ())));
    assert!(missing(store.remove("nope", &Filter::Include).map(|_| ())));
    assert!(missing(store.update("nope", &Filter::Include, &[]).map(|_| ())));
    assert!(missing(store.writer("nope", Filter::Include).map(|_| ())));
    assert!(missing(store.appender("nope").map(|_| ())));
    assert!(missing(store.get("nope", 1).map(|_| ())));
    assert!(missing(store.remove_schema("nope")));
}

#[test]
fn duplicate_schema_is_rejected() {
    let store = store();
    store.create_schema(roads_type()).unwrap();

    let result = store.create_schema(roads_type());

    assert!(matches!(result, Err(StoreError::TypeExists(name)) if name == "roads"));
    assert_eq!(store.type_names().unwrap(), vec!["roads".to_string()]);
}

#[test]
fn sorted_paged_query() {
    let store = store();
    seeded_roads(&store, 6);

    let query = Query::builder("roads")
        .filter(Filter::ne("lanes", 5))
        .sort_by(SortBy::desc("lanes"))
        .start_index(1)
        .max_features(3)
        .build();
    let page = store.query(&query).unwrap().drain().unwrap();

    assert_eq!(lanes(&page), vec![4, 3, 2]);
    assert_eq!(store.count(&query).unwrap(), 3);
}

#[test]
fn identifier_lookup_query() {
    let store = store();
    seeded_roads(&store, 5);

    let query = Query::builder("roads")
        .filter(Filter::ids([4, 2, 99]))
        .build();

    assert_eq!(ids(&store.query(&query).unwrap().drain().unwrap()), vec![2, 4]);
}

#[test]
fn projected_and_reprojected_query() {
    let store = store();
    seeded_roads(&store, 2);

    let query = Query::builder("roads")
        .properties(["name", "path"])
        .crs(mercator())
        .max_features(1)
        .build();
    let mut cursor = store.query(&query).unwrap();

    let t = Arc::clone(cursor.feature_type());
    assert_eq!(t.attribute_names().collect::<Vec<_>>(), vec!["name", "path"]);
    assert_eq!(t.attribute("path").unwrap().kind.crs(), Some(&mercator()));

    let records = cursor.drain().unwrap();
    assert_eq!(records.len(), 1);
    let path = records[0].get("path").and_then(Value::as_geometry).unwrap();
    assert_eq!(path.geometry, Geometry::line(&[(100.0, 0.0), (102.0, 2.0)]));
    assert_eq!(records[0].id(), None);
}

#[test]
fn resampled_query() {
    let store = store();
    seeded_roads(&store, 3);

    let query = Query::builder("roads")
        .filter(Filter::eq("lanes", 3))
        .resolution(2.0, 2.0)
        .build();
    let records = store.query(&query).unwrap().drain().unwrap();

    let path = records[0].get("path").and_then(Value::as_geometry).unwrap();
    assert_eq!(path.geometry, Geometry::line(&[(0.0, 0.0), (4.0, 2.0)]));
}

#[test]
fn prefetching_is_transparent() {
    let store = store_with(StoreConfig::default().with_prefetch(2));
    seeded_roads(&store, 7);

    assert_eq!(lanes(&all(&store, "roads")), (1..=7).collect::<Vec<_>>());

    let hinted = Query::builder("roads")
        .sort_by(SortBy::desc("lanes"))
        .hints(Hints::prefetch(3))
        .build();
    assert_eq!(
        lanes(&store.query(&hinted).unwrap().drain().unwrap()),
        (1..=7).rev().collect::<Vec<_>>()
    );

    let disabled = Query::builder("roads").hints(Hints::no_prefetch()).build();
    assert_eq!(store.count(&disabled).unwrap(), 7);
}

#[test]
fn abandoned_prefetching_cursors_release_workers() {
    let store = store_with(StoreConfig::default().with_worker_threads(1).with_prefetch(1));
    seeded_roads(&store, 10);

    for _ in 0..5 {
        let mut cursor = store.query(&Query::all("roads")).unwrap();
        assert!(cursor.has_next().unwrap());
        cursor.next().unwrap();
    }

    assert_eq!(store.count(&Query::all("roads")).unwrap(), 10);
}

#[test]
fn more_prefetching_cursors_than_workers() {
    let store = store_with(StoreConfig::default().with_prefetch(2));
    seeded_roads(&store, 20);
    let workers = store.config().worker_threads;

    let mut cursors: Vec<_> = (0..workers + 2)
        .map(|_| store.query(&Query::all("roads")).unwrap())
        .collect();
    for cursor in &mut cursors {
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap().id(), Some(1));
    }
    for mut cursor in cursors {
        assert_eq!(cursor.drain().unwrap().len(), 19);
        drop(cursor);
    }

    let mut abandoned: Vec<_> = (0..workers + 2)
        .map(|_| store.query(&Query::all("roads")).unwrap())
        .collect();
    for cursor in &mut abandoned {
        cursor.next().unwrap();
    }
    drop(abandoned);
    assert_eq!(store.count(&Query::all("roads")).unwrap(), 20);
}

#[test]
fn pool_shutdown_with_open_prefetching_cursor() {
    let pool = Arc::new(WorkerPool::new(1).unwrap());
    let store = Store::with_pool(StoreConfig::default().with_prefetch(2), Arc::clone(&pool)).unwrap();
    seeded_roads(&store, 50);

    let mut cursor = store.query(&Query::all("roads")).unwrap();
    assert_eq!(cursor.next().unwrap().id(), Some(1));
    pool.shutdown();
    assert!(pool.is_shut_down());
    drop(cursor);

    assert!(matches!(
        store.query(&Query::all("roads")),
        Err(StoreError::Worker(_))
    ));
}

#[test]
fn iterator_adapter() {
    let store = store();
    seeded_roads(&store, 4);

    let names: Vec<String> = store
        .query(&Query::builder("roads").filter(Filter::lt("lanes", 3)).build())
        .unwrap()
        .into_features()
        .map(|f| f.unwrap().get("name").and_then(Value::as_str).unwrap().to_string())
        .collect();

    assert_eq!(names, vec!["road-1", "road-2"]);
}

#[test]
fn writer_updates_matching_records() {
    let store = store();
    seeded_roads(&store, 5);
    let events = record_events(&store);

    let mut writer = store.writer("roads", Filter::gt("lanes", 3)).unwrap();
    while writer.has_next().unwrap() {
        writer.next().unwrap();
        writer.current().unwrap().set("lanes", 10).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(lanes(&all(&store, "roads")), vec![1, 2, 3, 10, 10]);
    let events = events.lock().unwrap();
    let updated: Vec<_> = events.iter().map(|e| (e.kind, e.ids.clone())).collect();
    assert_eq!(
        updated,
        vec![
            (ChangeKind::Updated, BTreeSet::from([4])),
            (ChangeKind::Updated, BTreeSet::from([5])),
        ]
    );
}

#[test]
fn writer_leaves_untouched_records_alone() {
    let store = store();
    seeded_roads(&store, 3);
    let events = record_events(&store);

    let mut writer = store.writer("roads", Filter::Include).unwrap();
    let seen = writer.drain().unwrap();

    assert_eq!(seen.len(), 3);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn writer_removes_and_appends() {
    let store = store();
    let t = seeded_roads(&store, 3);

    let mut writer = store.writer("roads", Filter::eq("name", "road-2")).unwrap();
    assert!(writer.has_next().unwrap());
    writer.next().unwrap();
    writer.remove().unwrap();
    assert_eq!(writer.current().unwrap_err(), StoreError::NoCurrentRecord);
    writer.close().unwrap();
    assert_eq!(store.get("roads", 2).unwrap(), None);

    let mut appender = store.appender("roads").unwrap();
    assert!(!appender.has_next().unwrap());
    let blank = appender.next().unwrap();
    assert!(blank.values().iter().all(Value::is_null));
    assert!(blank.feature_type().conforms_to(&t));
    appender.current().unwrap().set("name", "fresh").unwrap();
    appender.current().unwrap().set("lanes", 8).unwrap();
    appender.write().unwrap();
    appender.close().unwrap();

    let stored = all(&store, "roads");
    assert_eq!(ids(&stored), vec![1, 3, 4]);
    assert_eq!(stored[2].get("name"), Some(&Value::from("fresh")));
}

#[test]
fn writer_surfaces_commit_errors() {
    let store = store();
    seeded_roads(&store, 1);

    let mut writer = store.writer("roads", Filter::Include).unwrap();
    writer.next().unwrap();
    writer.current().unwrap().set("name", Value::Null).unwrap();

    assert!(matches!(writer.write(), Err(StoreError::InvalidValue { .. })));
    assert_eq!(
        store.get("roads", 1).unwrap().unwrap().get("name"),
        Some(&Value::from("road-1"))
    );

    // The rejected edit is still pending and can be corrected.
    assert_eq!(writer.current().unwrap().get("name"), Some(&Value::Null));
    writer.current().unwrap().set("name", "renamed").unwrap();
    writer.write().unwrap();
    writer.close().unwrap();
    assert_eq!(
        store.get("roads", 1).unwrap().unwrap().get("name"),
        Some(&Value::from("renamed"))
    );
}

#[test]
fn closed_writer_rejects_use() {
    let store = store();
    seeded_roads(&store, 1);

    let mut writer = store.writer("roads", Filter::Include).unwrap();
    writer.close().unwrap();
    writer.close().unwrap();

    assert!(!writer.has_next().unwrap());
    assert_eq!(writer.next().unwrap_err(), StoreError::Closed);
    assert_eq!(writer.current().unwrap_err(), StoreError::Closed);
}

#[test]
fn collections_without_identity() {
    let store = store();
    let t = store.create_schema(sightings_type()).unwrap();
    let events = record_events(&store);

    let added = store
        .add(
            "sightings",
            [
                sighting(&t, "heron", 2),
                sighting(&t, "egret", 5),
                sighting(&t, "heron", 1),
            ],
        )
        .unwrap();
    assert!(added.is_empty());

    let updated = store
        .update("sightings", &Filter::eq("species", "heron"), &[("count".into(), Value::Int(0))])
        .unwrap();
    assert_eq!(updated.count, 2);
    assert!(updated.ids.is_empty());

    let mut writer = store.writer("sightings", Filter::eq("species", "egret")).unwrap();
    writer.next().unwrap();
    writer.current().unwrap().set("count", 9).unwrap();
    writer.close().unwrap();

    let counts: Vec<i64> = all(&store, "sightings")
        .iter()
        .map(|f| f.get("count").and_then(Value::as_int).unwrap())
        .collect();
    assert_eq!(counts, vec![0, 9, 0]);
    assert_eq!(store.get("sightings", 1).unwrap(), None);

    let removed = store.remove("sightings", &Filter::eq("count", 0)).unwrap();
    assert_eq!(removed.count, 2);

    let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| (e.kind, e.count)).collect();
    assert_eq!(
        kinds,
        vec![
            (ChangeKind::Added, 3),
            (ChangeKind::Updated, 2),
            (ChangeKind::Updated, 1),
            (ChangeKind::Removed, 2),
        ]
    );
}

#[test]
fn schema_update_migrates_records() {
    let store = store();
    seeded_roads(&store, 3);
    store.remove("roads", &Filter::ids([3])).unwrap();

    let widened = FeatureType::builder("roads")
        .identifier("fid")
        .required("name", AttributeKind::Text)
        .attribute("surface", AttributeKind::Text)
        .build()
        .unwrap();
    let t = store.update_schema(widened).unwrap();

    let stored = all(&store, "roads");
    assert_eq!(ids(&stored), vec![1, 2]);
    assert!(stored[0].get("lanes").is_none());
    assert_eq!(stored[0].get("surface"), Some(&Value::Null));

    let next = store
        .add("roads", [Feature::new(t).with("name", "after").unwrap()])
        .unwrap();
    assert_eq!(next, BTreeSet::from([4]));
}

#[test]
fn schema_update_rejects_invalid_migration() {
    let store = store();
    seeded_roads(&store, 2);

    let stricter = FeatureType::builder("roads")
        .identifier("fid")
        .required("name", AttributeKind::Text)
        .required("surface", AttributeKind::Text)
        .build()
        .unwrap();

    assert!(matches!(
        store.update_schema(stricter),
        Err(StoreError::InvalidValue { attribute, .. }) if attribute == "surface"
    ));
    assert_eq!(lanes(&all(&store, "roads")), vec![1, 2]);
}

#[test]
fn remove_schema_and_close() {
    let store = store();
    seeded_roads(&store, 2);
    store.create_schema(sightings_type()).unwrap();
    assert_eq!(store.type_names().unwrap(), vec!["roads", "sightings"]);

    store.remove_schema("roads").unwrap();
    assert_eq!(store.schema("roads").unwrap(), None);
    assert!(matches!(
        store.query(&Query::all("roads")).map(|_| ()),
        Err(StoreError::UnknownType(_))
    ));

    store.close().unwrap();
    assert!(store.type_names().unwrap().is_empty());
}

#[test]
fn listener_removal() {
    let store = store();
    let t = store.create_schema(sightings_type()).unwrap();
    let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let id = store
        .add_listener(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

    store.add("sightings", [sighting(&t, "kite", 1)]).unwrap();
    assert!(store.remove_listener(id).unwrap());
    assert!(!store.remove_listener(id).unwrap());
    store.add("sightings", [sighting(&t, "kite", 2)]).unwrap();

    assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn concurrent_adds_get_distinct_ids() {
    let store = store();
    let t = store.create_schema(roads_type()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = store.clone();
            let t = Arc::clone(&t);
            thread::spawn(move || {
                (0..25)
                    .flat_map(|i| store.add("roads", [road(&t, &format!("{worker}-{i}"), i)]).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let assigned: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let unique: BTreeSet<i64> = assigned.iter().copied().collect();
    assert_eq!(assigned.len(), 100);
    assert_eq!(unique.len(), 100);
    assert_eq!(all(&store, "roads").len(), 100);
}

#[test]
fn supplied_ids_are_kept_when_free() {
    let store = store_with(StoreConfig::default().with_id_start(10));
    let t = store.create_schema(roads_type()).unwrap();

    let first = store
        .add("roads", [road(&t, "explicit", 1).with("fid", 10).unwrap()])
        .unwrap();
    let second = store
        .add(
            "roads",
            [
                road(&t, "clash", 2).with("fid", 10).unwrap(),
                road(&t, "placeholder", 3).with("fid", -1).unwrap(),
            ],
        )
        .unwrap();

    assert_eq!(first, BTreeSet::from([10]));
    assert_eq!(second.len(), 2);
    assert!(!second.contains(&10));
    assert!(second.iter().all(|id| *id > 10));
}
