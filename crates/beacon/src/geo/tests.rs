use super::*;
use crate::{Error, config::QUERY_BATCH_LIMIT};

const CENTER: LatLon = LatLon::new(48.839677, -67.539063);

fn circle(radius_km: f64) -> Area {
    Area::circle(CENTER, radius_km, 12)
}

#[test]
fn every_returned_cell_is_valid() {
    let area = circle(120.0);
    for cell in ring_batches(&area).unwrap().iter().flatten() {
        assert!(valid_hash(cell, &area).unwrap(), "{cell}");
    }
}

#[test]
fn center_cell_is_the_first_layer() {
    let area = circle(5.0);
    let layers = RingSearch::default().layers(&area).unwrap();
    assert_eq!(layers[0], vec![geohash::encode(CENTER, 4)]);
}

#[test]
fn search_is_deterministic() {
    let area = circle(150.0);
    let first = ring_batches(&area).unwrap();
    for _ in 0..5 {
        assert_eq!(ring_batches(&area).unwrap(), first);
    }
}

#[test]
fn batches_respect_the_query_limit_and_ring_order() {
    let area = circle(200.0);
    let search = RingSearch::default();
    let layers = search.layers(&area).unwrap();
    let batches = search.batches(&area).unwrap();

    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= QUERY_BATCH_LIMIT));
    let flat: Vec<String> = batches.into_iter().flatten().collect();
    let expected: Vec<String> = layers.into_iter().flatten().collect();
    assert_eq!(flat, expected);
}

#[test]
fn layers_hold_distinct_cells() {
    let layers = RingSearch::default().layers(&circle(200.0)).unwrap();
    let mut all: Vec<&String> = layers.iter().flatten().collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total);
    assert!(layers.iter().all(|layer| !layer.is_empty()));
}

#[test]
fn recall_inside_and_exclusion_outside() {
    let radius = 200.0;
    let area = circle(radius);
    let cells: Vec<String> = ring_batches(&area).unwrap().into_iter().flatten().collect();

    for i in 0..36 {
        let bearing = f64::from(i) * 10.0;
        let inside = geohash::encode(destination(CENTER, bearing, 0.9 * radius), 4);
        assert!(cells.contains(&inside), "bearing {bearing}: {inside} missing");

        let outside = geohash::encode(destination(CENTER, bearing, 1.5 * radius), 4);
        assert!(!cells.contains(&outside), "bearing {bearing}: {outside} included");
    }
}

#[test]
fn small_area_still_yields_its_center_cell() {
    let area = circle(0.5);
    let cells: Vec<String> = ring_batches(&area).unwrap().into_iter().flatten().collect();
    assert!(cells.contains(&geohash::encode(CENTER, 4)));
    assert!(cells.len() <= 4);
}

#[test]
fn single_sample_perimeter_compares_against_that_sample() {
    let area = Area {
        center: CENTER,
        perimeter: vec![PerimeterPoint {
            point: destination(CENTER, 90.0, 60.0),
            reference_distance_km: 60.0,
        }],
    };
    let cells: Vec<String> = ring_batches(&area).unwrap().into_iter().flatten().collect();
    assert!(cells.contains(&geohash::encode(destination(CENTER, 0.0, 50.0), 4)));
    assert!(!cells.contains(&geohash::encode(destination(CENTER, 180.0, 120.0), 4)));
}

#[test]
fn irregular_area_from_json() {
    let json = r#"{
        "center": {"lat": 45.904258512242286, "lon": -72.2507737118483},
        "perim": [
            {"lat": 43.77231091565398,  "lon": -72.2507737118483,  "refDist": 237.0617566126798},
            {"lat": 44.06251444297506,  "lon": -73.7543096676021,  "refDist": 236.4707305606959},
            {"lat": 44.848147251478814, "lon": -74.85497437822046, "refDist": 234.8581857803903},
            {"lat": 45.904258512242286, "lon": -75.25784562335588, "refDist": 232.6615328018019},
            {"lat": 46.940654121329025, "lon": -74.85497437822046, "refDist": 230.47345405250886},
            {"lat": 47.686868561809305, "lon": -73.7543096676021,  "refDist": 228.87801053290622},
            {"lat": 47.9573693727533,   "lon": -72.2507737118483,  "refDist": 228.29551152766882},
            {"lat": 47.686868561809305, "lon": -70.74723775609455, "refDist": 228.87801053290406},
            {"lat": 46.940654121329025, "lon": -69.64657304547613, "refDist": 230.47345405250886},
            {"lat": 45.904258512242286, "lon": -69.24370180034076, "refDist": 232.6615328017986},
            {"lat": 44.848147251478814, "lon": -69.64657304547613, "refDist": 234.8581857803903},
            {"lat": 44.06251444297506,  "lon": -70.74723775609453, "refDist": 236.47073056069428}
        ]
    }"#;
    let area: Area = serde_json::from_str(json).unwrap();
    assert_eq!(area.perimeter.len(), 12);

    let cells: Vec<String> = ring_batches(&area).unwrap().into_iter().flatten().collect();
    // About 130 km south of the centre.
    let south = geohash::encode(LatLon::new(44.77231091565398, -72.5507737118483), 4);
    assert!(cells.contains(&south));
    assert!(cells.contains(&geohash::encode(area.center, 4)));
    assert!(!cells.contains(&geohash::encode(LatLon::new(41.0, -72.25), 4)));
}

#[test]
fn admits_uses_nearest_samples() {
    let area = circle(5.0);
    assert!(area.contains(destination(CENTER, 33.0, 4.5)));
    assert!(area.contains(CENTER));
    assert!(!area.contains(destination(CENTER, 33.0, 8.0)));
}

#[test]
fn invalid_areas_are_rejected() {
    let empty = Area {
        center: CENTER,
        perimeter: vec![],
    };
    assert!(matches!(ring_batches(&empty), Err(Error::InvalidArea { .. })));

    let mut bad = circle(10.0);
    bad.perimeter[3].reference_distance_km = 0.0;
    assert!(matches!(ring_batches(&bad), Err(Error::InvalidArea { .. })));

    let mut bad = circle(10.0);
    bad.center = LatLon::new(f64::NAN, 0.0);
    assert!(matches!(ring_batches(&bad), Err(Error::InvalidArea { .. })));
}

#[test]
fn haversine_matches_known_distance() {
    // Montreal to Quebec City, about 233 km.
    let d = haversine_km(LatLon::new(45.5017, -73.5673), LatLon::new(46.8139, -71.2080));
    assert!((d - 233.0).abs() < 3.0, "{d}");

    let p = destination(CENTER, 45.0, 100.0);
    assert!((haversine_km(CENTER, p) - 100.0).abs() < 1e-6);
}

#[test]
fn each_of_the_two_nearest_samples_bounds_membership_alone() {
    let sample = |lon: f64, reference_distance_km: f64| PerimeterPoint {
        point: LatLon::new(0.0, lon),
        reference_distance_km,
    };
    let area = Area {
        center: LatLon::new(0.0, 0.0),
        perimeter: vec![sample(1.0, 10.0), sample(2.0, 100.0), sample(-5.0, 1.0)],
    };
    // About 55.6 km east: beyond the nearest sample's bound and beyond the
    // mean of the two, but inside the second nearest one.
    let p = LatLon::new(0.0, 0.5);
    assert!(area.contains(p));
    assert!(valid_hash(&geohash::encode(p, 4), &area).unwrap());
    assert!(!area.contains(LatLon::new(0.0, 3.0)));
}
