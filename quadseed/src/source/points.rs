//! In-memory point feature source.
//!
//! Reference [`DataSource`] over a list of point features, loadable from a
//! JSON file:
//!
//! ```json
//! [
//!   { "collection": "poi", "lon": 13.4, "lat": 52.5, "category": "cafe" }
//! ]
//! ```
//!
//! A filter expression is matched against the feature category, written
//! either as `category=<value>` or as the bare value.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::BoxFuture;
use crate::coord::BoundingBox;
use crate::source::{DataSource, DataSourceError};

/// One point feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    pub collection: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Materialized content document.
#[derive(Serialize)]
struct ContentDocument<'a> {
    collection: &'a str,
    bbox: [f64; 4],
    features: Vec<&'a PointFeature>,
}

/// Data source answering queries from points held in memory.
#[derive(Debug, Clone, Default)]
pub struct PointFeatureSource {
    by_collection: HashMap<String, Vec<PointFeature>>,
    /// Dataset extent; points on its max edges still count as inside.
    extent: Option<BoundingBox>,
}

impl PointFeatureSource {
    pub fn new(features: impl IntoIterator<Item = PointFeature>) -> Self {
        let mut by_collection: HashMap<String, Vec<PointFeature>> = HashMap::new();
        for feature in features {
            by_collection
                .entry(feature.collection.clone())
                .or_default()
                .push(feature);
        }
        Self {
            by_collection,
            extent: None,
        }
    }

    /// Close the max edges of the dataset extent.
    pub fn with_extent(mut self, extent: BoundingBox) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Load features from a JSON array file.
    pub fn load_from_file(path: &Path) -> Result<Self, DataSourceError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DataSourceError::new(format!("cannot read {}: {}", path.display(), e))
        })?;
        let features: Vec<PointFeature> = serde_json::from_str(&text).map_err(|e| {
            DataSourceError::new(format!("invalid feature file {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), features = features.len(), "Loaded point features");
        Ok(Self::new(features))
    }

    /// Number of features across all collections.
    pub fn len(&self) -> usize {
        self.by_collection.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching<'a>(
        &'a self,
        collection: &str,
        bbox: &'a BoundingBox,
        filter: Option<&'a str>,
    ) -> impl Iterator<Item = &'a PointFeature> + 'a {
        let wanted = filter.map(category_of_filter);
        self.by_collection
            .get(collection)
            .into_iter()
            .flatten()
            .filter(move |f| self.covers(bbox, f.lon, f.lat))
            .filter(move |f| match wanted {
                Some(value) => f.category.as_deref() == Some(value),
                None => true,
            })
    }

    fn covers(&self, bbox: &BoundingBox, x: f64, y: f64) -> bool {
        if bbox.contains_point(x, y) {
            return true;
        }
        let Some(extent) = &self.extent else {
            return false;
        };
        // Sliced edges drift from the extent by rounding in either direction.
        // The neighbouring box ends a whole cell short, so half a cell is unambiguous.
        let on_max_x = x == extent.max_x && bbox.max_x + bbox.width() / 2.0 >= extent.max_x;
        let on_max_y = y == extent.max_y && bbox.max_y + bbox.height() / 2.0 >= extent.max_y;
        let in_x = (x >= bbox.min_x && x < bbox.max_x) || on_max_x;
        let in_y = (y >= bbox.min_y && y < bbox.max_y) || on_max_y;
        in_x && in_y
    }
}

fn category_of_filter(filter: &str) -> &str {
    let filter = filter.trim();
    filter
        .strip_prefix("category=")
        .map(str::trim)
        .unwrap_or(filter)
}

impl DataSource for PointFeatureSource {
    fn presence<'a>(
        &'a self,
        collection: &'a str,
        bbox: &'a BoundingBox,
        filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, DataSourceError>> {
        Box::pin(async move { Ok(self.matching(collection, bbox, filter).next().is_some()) })
    }

    fn materialize<'a>(
        &'a self,
        collection: &'a str,
        bbox: &'a BoundingBox,
        filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<u8>, DataSourceError>> {
        Box::pin(async move {
            let document = ContentDocument {
                collection,
                bbox: [bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y],
                features: self.matching(collection, bbox, filter).collect(),
            };
            debug!(collection, bbox = %bbox, features = document.features.len(), "Materialized content");
            serde_json::to_vec(&document).map_err(|e| DataSourceError::new(e.to_string()))
        })
    }

    fn name(&self) -> &str {
        "points"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn point(collection: &str, lon: f64, lat: f64, category: Option<&str>) -> PointFeature {
        PointFeature {
            collection: collection.to_string(),
            lon,
            lat,
            category: category.map(str::to_string),
        }
    }

    fn source() -> PointFeatureSource {
        PointFeatureSource::new(vec![
            point("poi", 10.0, 10.0, Some("cafe")),
            point("poi", -50.0, -20.0, Some("bank")),
            point("roads", 10.0, 10.0, None),
        ])
    }

    #[tokio::test]
    async fn test_presence_by_collection_and_box() {
        let src = source();
        let ne = BoundingBox::new(0.0, 0.0, 180.0, 90.0);
        let sw = BoundingBox::new(-180.0, -90.0, 0.0, 0.0);

        assert!(src.presence("poi", &ne, None).await.unwrap());
        assert!(src.presence("poi", &sw, None).await.unwrap());
        assert!(!src.presence("rail", &ne, None).await.unwrap());
        assert!(!src
            .presence("roads", &sw, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_filter_forms() {
        let src = source();
        let world = BoundingBox::world();

        assert!(src.presence("poi", &world, Some("cafe")).await.unwrap());
        assert!(src
            .presence("poi", &world, Some("category=bank"))
            .await
            .unwrap());
        assert!(!src
            .presence("poi", &world, Some("category=school"))
            .await
            .unwrap());
        assert!(!src.presence("roads", &world, Some("cafe")).await.unwrap());
    }

    #[tokio::test]
    async fn test_max_edge_of_extent_is_inclusive() {
        let extent = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        let src = PointFeatureSource::new(vec![point("c", 4.0, 4.0, None)]).with_extent(extent);

        let corner = extent.slice(1, 1, 1);
        assert!(src.presence("c", &corner, None).await.unwrap());

        let inner = extent.slice(1, 0, 0);
        assert!(!src.presence("c", &inner, None).await.unwrap());

        let open = PointFeatureSource::new(vec![point("c", 4.0, 4.0, None)]);
        assert!(!open.presence("c", &corner, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_max_edge_survives_rounded_slices() {
        // 0.2 + (0.9 - 0.2) lands below 0.9; -25.187 + 27.54 lands above 2.353.
        for extent in [
            BoundingBox::new(0.2, 0.2, 0.9, 0.9),
            BoundingBox::new(-25.187, -25.187, 2.353, 2.353),
        ] {
            let src = PointFeatureSource::new(vec![point("c", extent.max_x, extent.max_y, None)])
                .with_extent(extent);

            for level in 0..6u8 {
                let last = (1u32 << level) - 1;
                let corner = extent.slice(level, last, last);
                assert!(
                    src.presence("c", &corner, None).await.unwrap(),
                    "level {} of {:?}",
                    level,
                    extent
                );
                if level > 0 {
                    let neighbour = extent.slice(level, last - 1, last);
                    assert!(!src.presence("c", &neighbour, None).await.unwrap());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_materialize_lists_contained_points() {
        let src = source();
        let ne = BoundingBox::new(0.0, 0.0, 180.0, 90.0);

        let bytes = src.materialize("poi", &ne, None).await.unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(doc["collection"], "poi");
        assert_eq!(doc["features"].as_array().unwrap().len(), 1);
        assert_eq!(doc["features"][0]["category"], "cafe");
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("points.json");
        std::fs::write(
            &path,
            r#"[{"collection":"poi","lon":1.0,"lat":2.0},{"collection":"poi","lon":3.0,"lat":4.0,"category":"x"}]"#,
        )
        .unwrap();

        let src = PointFeatureSource::load_from_file(&path).unwrap();
        assert_eq!(src.len(), 2);

        std::fs::write(&path, "not json").unwrap();
        assert!(PointFeatureSource::load_from_file(&path).is_err());
    }
}
