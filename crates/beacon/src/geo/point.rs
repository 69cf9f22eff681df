use crate::{Error, Result, config::DEFAULT_PERIMETER_SAMPLES};
use serde::{Deserialize, Serialize};

/// Mean earth radius used by every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MIN_CIRCLE_SAMPLES: usize = 8;

/// A point on the sphere, in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn haversine_km(a: LatLon, b: LatLon) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// The point reached from `origin` after travelling `distance_km` along the
/// initial `bearing_deg` (clockwise from north).
pub fn destination(origin: LatLon, bearing_deg: f64, distance_km: f64) -> LatLon {
    let delta = distance_km / EARTH_RADIUS_KM;
    let theta = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    LatLon {
        lat: lat2.to_degrees(),
        lon: normalize_lon(lon2.to_degrees()),
    }
}

/// Wraps a longitude into `[-180, 180)`.
pub(crate) fn normalize_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// A perimeter sample: a point on the area's edge and the maximum allowed
/// distance from the centre in that direction.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerimeterPoint {
    #[serde(flatten)]
    pub point: LatLon,
    #[serde(rename = "refDist")]
    pub reference_distance_km: f64,
}

/// An irregular region approximated by a star-shaped polygon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub center: LatLon,
    #[serde(rename = "perim")]
    pub perimeter: Vec<PerimeterPoint>,
}

impl Area {
    /// Approximates a circle by sampling `samples` evenly spaced bearings,
    /// clamped to 8..=12.
    pub fn circle(center: LatLon, radius_km: f64, samples: usize) -> Self {
        let samples = samples.clamp(MIN_CIRCLE_SAMPLES, DEFAULT_PERIMETER_SAMPLES);
        let perimeter = (0..samples)
            .map(|i| {
                let bearing = 360.0 * i as f64 / samples as f64;
                PerimeterPoint {
                    point: destination(center, bearing, radius_km),
                    reference_distance_km: radius_km,
                }
            })
            .collect();
        Self { center, perimeter }
    }

    /// Checks that the area can be searched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArea`] for an empty perimeter, coordinates
    /// outside the valid ranges or a non-positive reference distance.
    pub fn validate(&self) -> Result<()> {
        if self.perimeter.is_empty() {
            return Err(invalid_area("empty perimeter"));
        }
        if !self.center.is_valid() {
            return Err(invalid_area(format!("center {:?}", self.center)));
        }
        for p in &self.perimeter {
            if !p.point.is_valid() {
                return Err(invalid_area(format!("perimeter point {:?}", p.point)));
            }
            if !(p.reference_distance_km.is_finite() && p.reference_distance_km > 0.0) {
                return Err(invalid_area(format!(
                    "reference distance {}",
                    p.reference_distance_km
                )));
            }
        }
        Ok(())
    }

    /// The two perimeter samples closest to `p`, nearest first. A one-sample
    /// perimeter yields that sample alone.
    pub fn closest_two(&self, p: LatLon) -> Vec<&PerimeterPoint> {
        let mut best: [Option<(f64, &PerimeterPoint)>; 2] = [None, None];
        for sample in &self.perimeter {
            let d = haversine_km(sample.point, p);
            let current = best;
            match current {
                [None, _] => best[0] = Some((d, sample)),
                [Some((d0, _)), _] if d < d0 => {
                    best[1] = best[0];
                    best[0] = Some((d, sample));
                }
                [_, None] => best[1] = Some((d, sample)),
                [_, Some((d1, _))] if d < d1 => best[1] = Some((d, sample)),
                _ => {}
            }
        }
        best.into_iter().flatten().map(|(_, s)| s).collect()
    }

    /// Returns `true` if `distance_km` (measured from the centre) is within the
    /// reference distance of either perimeter sample nearest to `near`.
    pub fn admits(&self, near: LatLon, distance_km: f64) -> bool {
        self.closest_two(near)
            .iter()
            .any(|s| distance_km <= s.reference_distance_km)
    }

    /// Precise membership test for a single point.
    pub fn contains(&self, p: LatLon) -> bool {
        self.admits(p, haversine_km(p, self.center))
    }
}

fn invalid_area(reason: impl Into<String>) -> Error {
    Error::InvalidArea {
        reason: reason.into(),
    }
}
