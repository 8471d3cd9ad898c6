//! Feature sinks: the consumers decoded geometries and attributes are written into.
//!
//! The transport layer owns the outgoing tile and implements [`TileSink`]. The core only
//! ever talks to these traits. [`TileFeatureLayer`] is a plain in-memory implementation
//! that serializes with serde.

use crate::geometry::Coord;
use crate::schema::GeometryType;
use crate::tile::TileId;

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int64(i64),
    Double(f64),
    Text(String),
}

pub trait GeometrySink {
    fn add_point(&mut self, point: Coord);
}

pub trait FeatureSink {
    fn add_attribute(&mut self, name: &str, value: AttributeValue);

    /// Opens a new geometry on the feature. `point_count` is a capacity hint.
    fn begin_geometry(&mut self, geometry_type: GeometryType, point_count: usize) -> &mut dyn GeometrySink;
}

pub trait TileSink {
    /// Opens a new feature of `type_name` (the table name) with its id.
    fn new_feature(&mut self, type_name: &str, id: i64) -> &mut dyn FeatureSink;

    /// Drops every feature added so far. Called when a fill fails part way through.
    fn discard(&mut self);
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureGeometry {
    pub geometry_type: GeometryType,
    pub points: Vec<Coord>,
}

impl GeometrySink for FeatureGeometry {
    fn add_point(&mut self, point: Coord) {
        self.points.push(point);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Feature {
    pub type_name: String,
    pub id: i64,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub geometries: Vec<FeatureGeometry>,
}

impl FeatureSink for Feature {
    fn add_attribute(&mut self, name: &str, value: AttributeValue) {
        self.attributes.insert(name.to_owned(), value);
    }

    fn begin_geometry(&mut self, geometry_type: GeometryType, point_count: usize) -> &mut dyn GeometrySink {
        self.geometries.push(FeatureGeometry {
            geometry_type,
            points: Vec::with_capacity(point_count),
        });
        let index = self.geometries.len() - 1;
        &mut self.geometries[index]
    }
}

/// Features of one layer for one tile.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TileFeatureLayer {
    pub tile: TileId,
    pub layer_id: String,
    pub features: Vec<Feature>,
}

impl TileFeatureLayer {
    pub fn new(tile: TileId, layer_id: &str) -> TileFeatureLayer {
        TileFeatureLayer {
            tile,
            layer_id: layer_id.to_owned(),
            features: Vec::new(),
        }
    }
}

impl TileSink for TileFeatureLayer {
    fn new_feature(&mut self, type_name: &str, id: i64) -> &mut dyn FeatureSink {
        self.features.push(Feature {
            type_name: type_name.to_owned(),
            id,
            attributes: BTreeMap::new(),
            geometries: Vec::new(),
        });
        let index = self.features.len() - 1;
        &mut self.features[index]
    }

    fn discard(&mut self) {
        self.features.clear();
    }
}
