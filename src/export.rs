use crate::types::MedicalCenter;
use anyhow::{Context, Result};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use std::fs;
use std::path::Path;
use tracing::info;

/// Builds a point FeatureCollection for map layers. Rows without usable
/// coordinates are left out.
pub fn to_feature_collection(centers: &[MedicalCenter]) -> FeatureCollection {
    let features = centers
        .iter()
        .filter_map(|center| {
            let point = center.location()?;
            let properties = match serde_json::to_value(center) {
                Ok(serde_json::Value::Object(map)) => Some(map),
                _ => None,
            };
            Some(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![point.x(), point.y()]))),
                id: Some(Id::Number(center.id.into())),
                properties,
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(path: &Path, centers: &[MedicalCenter]) -> Result<usize> {
    let collection = to_feature_collection(centers);
    let count = collection.features.len();
    let text = GeoJson::from(collection).to_string();
    fs::write(path, text).with_context(|| format!("Failed to write GeoJSON: {:?}", path))?;
    info!("Wrote {} features to {:?}", count, path);
    Ok(count)
}
