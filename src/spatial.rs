use crate::normalize::{FeatureKey, FeatureKeyer};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use geojson::FeatureCollection;
use rstar::{RTree, RTreeObject, AABB};
use std::fmt;
use tracing::{debug, warn};

struct DistrictShape {
    feature: FeatureKey,
    geometry: MultiPolygon<f64>,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for DistrictShape {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Point-in-district lookup for one geometry collection.
pub struct DistrictIndex {
    tree: RTree<DistrictShape>,
}

impl fmt::Debug for DistrictIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistrictIndex")
            .field("districts", &self.len())
            .finish()
    }
}

impl DistrictIndex {
    /// Indexes every polygonal feature that normalizes to a key. Anything else
    /// (points, lines, missing geometry, unreadable identifiers) is skipped.
    pub fn build(collection: &FeatureCollection) -> Self {
        let keyer = FeatureKeyer::for_collection(collection);
        let mut shapes = Vec::new();

        for feature in &collection.features {
            let (Some(props), Some(geometry)) = (&feature.properties, &feature.geometry) else {
                continue;
            };
            let Ok(keyed) = keyer.key_for(props) else {
                continue;
            };
            let geometry: geo::Geometry<f64> = match geometry.value.clone().try_into() {
                Ok(g) => g,
                Err(e) => {
                    warn!("Skipping district {} with unreadable geometry: {:?}", keyed.key, e);
                    continue;
                }
            };
            let geometry = match geometry {
                geo::Geometry::MultiPolygon(mp) => mp,
                geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                _ => continue,
            };
            let Some(rect) = geometry.bounding_rect() else {
                continue;
            };
            shapes.push(DistrictShape {
                feature: keyed,
                aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                geometry,
            });
        }

        debug!("Built spatial index for {} districts", shapes.len());
        Self {
            tree: RTree::bulk_load(shapes),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// District containing the given lon/lat, if any.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&FeatureKey> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .find(|shape| shape.geometry.contains(&point))
            .map(|shape| &shape.feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(x0: f64, y0: f64, size: f64) -> serde_json::Value {
        json!({
            "type": "Polygon",
            "coordinates": [[[x0, y0], [x0 + size, y0], [x0 + size, y0 + size], [x0, y0 + size], [x0, y0]]]
        })
    }

    fn collection() -> FeatureCollection {
        serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": square(0.0, 0.0, 1.0),
                 "properties": {"STATEFP": "06", "CD118FP": "05"}},
                {"type": "Feature", "geometry": square(1.0, 0.0, 1.0),
                 "properties": {"STATEFP": "06", "CD118FP": "06"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5.0, 5.0]},
                 "properties": {"STATEFP": "06", "CD118FP": "07"}},
                {"type": "Feature", "geometry": square(3.0, 3.0, 1.0),
                 "properties": {"NAME": "no ids"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn indexes_only_keyed_polygons() {
        let index = DistrictIndex::build(&collection());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn locates_containing_district() {
        let index = DistrictIndex::build(&collection());
        let found = index.locate(0.5, 0.5).unwrap();
        assert_eq!(found.key.as_str(), "0605");
        assert_eq!(found.display_name, "District 05");
        assert_eq!(index.locate(1.5, 0.25).map(|f| f.key.as_str()), Some("0606"));
        assert_eq!(index.locate(3.5, 3.5), None);
        assert_eq!(index.locate(-10.0, 0.5), None);
    }
}
