use super::point::{LatLon, normalize_lon};
use crate::{
    Error, Result,
    encoding::base32::Alphabet,
};

/// A latitude/longitude rectangle in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn contains(&self, p: LatLon) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat)
            && (self.min_lon..=self.max_lon).contains(&p.lon)
    }

    /// The point of the box nearest to `p`.
    ///
    /// Longitude is clamped on the shorter side of the antimeridian, which is
    /// exact for boxes much smaller than a hemisphere.
    pub fn closest_point(&self, p: LatLon) -> LatLon {
        let lat = p.lat.clamp(self.min_lat, self.max_lat);
        let center = (self.min_lon + self.max_lon) / 2.0;
        // Bring p.lon into [center - 180, center + 180) before clamping.
        let lon = center + normalize_lon(p.lon - center);
        LatLon::new(lat, lon.clamp(self.min_lon, self.max_lon))
    }
}

/// Encodes a point at the given precision (number of characters).
pub fn encode(p: LatLon, precision: usize) -> String {
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let mut out = String::with_capacity(precision);
    let mut even = true;

    for _ in 0..precision {
        let mut value = 0_u8;
        for _ in 0..5 {
            let (lo, hi, x) = if even {
                (&mut lon_lo, &mut lon_hi, p.lon)
            } else {
                (&mut lat_lo, &mut lat_hi, p.lat)
            };
            let mid = (*lo + *hi) / 2.0;
            value <<= 1;
            if x >= mid {
                value |= 1;
                *lo = mid;
            } else {
                *hi = mid;
            }
            even = !even;
        }
        out.push(char::from(Alphabet::GEOHASH.symbol(value)));
    }
    out
}

/// Decodes a hash into the rectangle it covers.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for an empty hash or a character outside
/// the geohash alphabet.
pub fn bounding_box(hash: &str) -> Result<BoundingBox> {
    if hash.is_empty() {
        return Err(Error::invalid_request("empty geohash"));
    }
    let mut bbox = BoundingBox {
        min_lat: -90.0,
        max_lat: 90.0,
        min_lon: -180.0,
        max_lon: 180.0,
    };
    let mut even = true;

    for b in hash.bytes() {
        let value = Alphabet::GEOHASH
            .value(b)
            .ok_or_else(|| Error::invalid_request(format!("invalid geohash {hash:?}")))?;
        for shift in (0..5).rev() {
            let bit = (value >> shift) & 1 == 1;
            let (lo, hi) = if even {
                (&mut bbox.min_lon, &mut bbox.max_lon)
            } else {
                (&mut bbox.min_lat, &mut bbox.max_lat)
            };
            let mid = (*lo + *hi) / 2.0;
            if bit {
                *lo = mid;
            } else {
                *hi = mid;
            }
            even = !even;
        }
    }
    Ok(bbox)
}

/// The adjacent cells of `hash` at the same precision, in the fixed order N,
/// NE, E, SE, S, SW, W, NW.
///
/// Longitude wraps around the antimeridian. Rows beyond a pole do not exist,
/// so cells touching a pole have fewer than eight neighbours.
pub fn neighbors(hash: &str) -> Result<Vec<String>> {
    const DIRECTIONS: [(f64, f64); 8] = [
        (1.0, 0.0),
        (1.0, 1.0),
        (0.0, 1.0),
        (-1.0, 1.0),
        (-1.0, 0.0),
        (-1.0, -1.0),
        (0.0, -1.0),
        (1.0, -1.0),
    ];

    let bbox = bounding_box(hash)?;
    let center = bbox.center();
    let precision = hash.len();
    let mut out = Vec::with_capacity(DIRECTIONS.len());

    for (d_lat, d_lon) in DIRECTIONS {
        let lat = center.lat + d_lat * bbox.height();
        if !(-90.0..=90.0).contains(&lat) {
            continue;
        }
        let lon = normalize_lon(center.lon + d_lon * bbox.width());
        let neighbor = encode(LatLon::new(lat, lon), precision);
        if neighbor != hash && !out.contains(&neighbor) {
            out.push(neighbor);
        }
    }
    Ok(out)
}
