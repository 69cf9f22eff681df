use super::{
    geohash::{self, BoundingBox},
    point::{Area, haversine_km},
};
use crate::{
    Result,
    config::{GEOHASH_PRECISION, QUERY_BATCH_LIMIT},
};
use std::collections::{HashSet, VecDeque};

/// Breadth-first expansion of geohash cells around an area's centre.
///
/// Layer 0 is the cell holding the centre. Each following layer holds the
/// unvisited neighbours of the previous one that still intersect the area.
/// The search stops at the first empty layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSearch {
    precision: usize,
    batch_limit: usize,
}

impl Default for RingSearch {
    fn default() -> Self {
        Self {
            precision: GEOHASH_PRECISION,
            batch_limit: QUERY_BATCH_LIMIT,
        }
    }
}

impl RingSearch {
    pub fn new(precision: usize) -> Self {
        Self {
            precision,
            ..Self::default()
        }
    }

    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// The cells of `area` grouped by ring distance from the centre cell.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidArea`] if the area fails validation.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(precision = self.precision)))]
    pub fn layers(&self, area: &Area) -> Result<Vec<Vec<String>>> {
        area.validate()?;

        let start = geohash::encode(area.center, self.precision);
        let mut visited = HashSet::from([start.clone()]);
        let mut layers = vec![vec![start.clone()]];
        // (cell, ring) pairs in FIFO order; a ring is finished when the front
        // of the queue moves past it.
        let mut queue = VecDeque::from([(start, 0_usize)]);

        while let Some((hash, ring)) = queue.pop_front() {
            for neighbor in geohash::neighbors(&hash)? {
                if visited.contains(&neighbor) || !valid_hash(&neighbor, area)? {
                    continue;
                }
                visited.insert(neighbor.clone());
                if layers.len() == ring + 1 {
                    layers.push(Vec::new());
                }
                layers[ring + 1].push(neighbor.clone());
                queue.push_back((neighbor, ring + 1));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(layers = layers.len(), cells = visited.len(), "ring search done");

        Ok(layers)
    }

    /// The cells of `area` flattened in ring order and chunked to the store's
    /// `IN` predicate limit.
    pub fn batches(&self, area: &Area) -> Result<Vec<Vec<String>>> {
        let cells: Vec<String> = self.layers(area)?.into_iter().flatten().collect();
        Ok(cells
            .chunks(self.batch_limit)
            .map(<[String]>::to_vec)
            .collect())
    }
}

/// Ring batches at the default precision. See [`RingSearch::batches`].
pub fn ring_batches(area: &Area) -> Result<Vec<Vec<String>>> {
    RingSearch::default().batches(area)
}

/// Returns `true` if the cell `hash` may hold points of `area`.
///
/// The two perimeter samples nearest to the cell centre bound the allowed
/// distance in that direction. The cell qualifies when its closest point to
/// the area centre lies strictly within either bound.
pub fn valid_hash(hash: &str, area: &Area) -> Result<bool> {
    let bbox = geohash::bounding_box(hash)?;
    Ok(cell_intersects(&bbox, area))
}

fn cell_intersects(bbox: &BoundingBox, area: &Area) -> bool {
    let nearest = bbox.closest_point(area.center);
    let distance = haversine_km(nearest, area.center);
    area.closest_two(bbox.center())
        .iter()
        .any(|s| distance < s.reference_distance_km)
}
