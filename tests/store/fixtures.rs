use std::sync::{Arc, Mutex};

use feature_store::{
    Affine, AffineTransformer, AttributeKind, ChangeEvent, Crs, Feature, FeatureType, Geometry,
    GeometryValue, Store, StoreConfig,
};

pub fn wgs84() -> Crs {
    Crs::new("EPSG:4326")
}

pub fn mercator() -> Crs {
    Crs::new("EPSG:3857")
}

/// A store whose transformer maps EPSG:4326 to EPSG:3857 by doubling and
/// shifting x by 100.
pub fn store() -> Store {
    store_with(StoreConfig::default())
}

pub fn store_with(config: StoreConfig) -> Store {
    let transformer = AffineTransformer::new().with_transform(
        wgs84(),
        mercator(),
        Affine::scale_translate(2.0, 2.0, 100.0, 0.0),
    );
    Store::builder()
        .config(config)
        .transformer(Arc::new(transformer))
        .build()
        .unwrap()
}

pub fn roads_type() -> FeatureType {
    FeatureType::builder("roads")
        .identifier("fid")
        .required("name", AttributeKind::Text)
        .attribute("lanes", AttributeKind::Int)
        .geometry("path", wgs84())
        .build()
        .unwrap()
}

pub fn road(t: &Arc<FeatureType>, name: &str, lanes: i64) -> Feature {
    Feature::new(Arc::clone(t))
        .with("name", name)
        .unwrap()
        .with("lanes", lanes)
        .unwrap()
        .with("path", Geometry::line(&[(0.0, 0.0), (lanes as f64, 1.0)]))
        .unwrap()
}

/// Creates `roads` and fills it with road-1..road-n, `lanes` equal to the
/// position.
pub fn seeded_roads(store: &Store, n: i64) -> Arc<FeatureType> {
    let t = store.create_schema(roads_type()).unwrap();
    store
        .add("roads", (1..=n).map(|i| road(&t, &format!("road-{i}"), i)))
        .unwrap();
    t
}

/// An identity-less collection of named observations.
pub fn sightings_type() -> FeatureType {
    FeatureType::builder("sightings")
        .attribute("species", AttributeKind::Text)
        .attribute("count", AttributeKind::Int)
        .build()
        .unwrap()
}

pub fn sighting(t: &Arc<FeatureType>, species: &str, count: i64) -> Feature {
    Feature::new(Arc::clone(t))
        .with("species", species)
        .unwrap()
        .with("count", count)
        .unwrap()
}

pub fn in_mercator(g: Geometry) -> GeometryValue {
    GeometryValue::with_crs(g, mercator())
}

/// Records every change event the store emits.
pub fn record_events(store: &Store) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store
        .add_listener(move |event| sink.lock().unwrap().push(event.clone()))
        .unwrap();
    seen
}
