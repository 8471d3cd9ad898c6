//! Static description of the feature tables a datasource serves.
//!
//! A [`TableInfo`] is resolved once per table at startup (database schema plus the
//! configuration overlay) and is read-only afterwards, so it can be shared freely
//! between concurrent tile fills.

use crate::error::Error;
use crate::store::SchemaResolver;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub const DEFAULT_DELIMITER: &str = "|";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Int64,
    Double,
    Text,
    Blob,
}

impl FromStr for ColumnType {
    type Err = Error;

    /// Parses the attribute type names used in the datasource config.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" => Ok(ColumnType::Int64),
            "float" => Ok(ColumnType::Double),
            "text" => Ok(ColumnType::Text),
            "blob" => Ok(ColumnType::Blob),
            _ => Err(Error::Config(format!("invalid attribute type '{}'", s))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Int64 => "Int64",
            ColumnType::Double => "Double",
            ColumnType::Text => "Text",
            ColumnType::Blob => "Blob",
        };
        f.write_str(name)
    }
}

/// An attribute whose value comes from one or more related tables.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Relation {
    /// Qualified `table.column` references, in projection order.
    pub columns: Vec<String>,
    pub delimiter: String,
    /// Predicate in SQL relating `layerTable` to the related tables.
    pub match_condition: String,
}

impl Relation {
    /// Table part of every related column, duplicates included.
    pub fn related_tables(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(|column| column.split('.').next().unwrap_or(column))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttributeInfo {
    pub column_type: ColumnType,
    pub relation: Option<Relation>,
}

impl AttributeInfo {
    pub fn column(column_type: ColumnType) -> AttributeInfo {
        AttributeInfo {
            column_type,
            relation: None,
        }
    }
}

/// attribute name -> attribute info
pub type AttributesInfo = BTreeMap<String, AttributeInfo>;

/// Per-axis factors applied to raw coordinates when decoding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScalingInfo {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for ScalingInfo {
    fn default() -> Self {
        ScalingInfo {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SpatialIndexKind {
    None,
    /// SpatiaLite R*Tree exposed through the `SpatialIndex` virtual table.
    RTree,
    /// SpatiaLite MBR cache virtual table `cache_<table>_<column>`.
    MbrCache,
    /// Index provided by a [`crate::store::NativeIndex`]. Holds the predicate fragment it
    /// contributed; the fragment operates in the table's raw coordinate space.
    Native(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
    MultiPoint,
    MultiLine,
    MultiPolygon,
}

impl GeometryType {
    /// The single geometry type a multi geometry is made of.
    pub fn element(self) -> GeometryType {
        match self {
            GeometryType::Point | GeometryType::MultiPoint => GeometryType::Point,
            GeometryType::Line | GeometryType::MultiLine => GeometryType::Line,
            GeometryType::Polygon | GeometryType::MultiPolygon => GeometryType::Polygon,
        }
    }
}

/// M values are never emitted, so XYM counts as two dimensional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Dimension {
    D2,
    D3,
}

/// Splits a SpatiaLite `geometry_columns.geometry_type` code, e.g. 1002 for LINESTRING Z.
pub fn parse_geometry_code(code: i32) -> Result<(GeometryType, Dimension), String> {
    let geometry_type = match code % 1000 {
        1 => GeometryType::Point,
        2 => GeometryType::Line,
        3 => GeometryType::Polygon,
        4 => GeometryType::MultiPoint,
        5 => GeometryType::MultiLine,
        6 => GeometryType::MultiPolygon,
        _ => return Err(format!("unknown spatialite geometry type {}", code)),
    };
    let dimension = match code / 1000 {
        0 | 2 => Dimension::D2,
        1 | 3 => Dimension::D3,
        _ => return Err(format!("can't get dimension from spatialite geometry type {}", code)),
    };
    Ok((geometry_type, dimension))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub primary_key: String,
    pub geometry_column: String,
    pub geometry_type: GeometryType,
    pub dimension: Dimension,
    pub spatial_index: SpatialIndexKind,
    pub attributes: AttributesInfo,
    pub scaling: ScalingInfo,
}

impl TableInfo {
    /// Resolves the table's keys, geometry and index from the store. Attributes and
    /// scaling are left empty/identity for the config overlay to fill in.
    pub async fn resolve<R>(name: &str, resolver: &R) -> Result<TableInfo, Error>
    where
        R: SchemaResolver + ?Sized,
    {
        let primary_key = resolver.primary_key_column(name).await?;
        let geometry = resolver.geometry_column(name).await?;
        let (geometry_type, dimension) =
            parse_geometry_code(geometry.type_code).map_err(|reason| Error::schema(name, reason))?;
        let spatial_index = resolver.spatial_index_kind(name).await?;

        Ok(TableInfo {
            name: name.to_owned(),
            primary_key,
            geometry_column: geometry.name,
            geometry_type,
            dimension,
            spatial_index,
            attributes: AttributesInfo::new(),
            scaling: ScalingInfo::default(),
        })
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::Config("table name is empty".to_owned()));
        }
        if self.primary_key.is_empty() || self.geometry_column.is_empty() {
            return Err(Error::schema(
                &self.name,
                "primary key and geometry column are required",
            ));
        }

        let scaling = &self.scaling;
        for (axis, factor) in [("x", scaling.x), ("y", scaling.y), ("z", scaling.z)] {
            if !factor.is_finite() || factor == 0.0 {
                return Err(Error::schema(
                    &self.name,
                    format!("scaling factor for {} must be finite and non-zero, got {}", axis, factor),
                ));
            }
        }

        for (attribute, info) in &self.attributes {
            let Some(relation) = &info.relation else {
                continue;
            };
            if relation.columns.is_empty() {
                return Err(Error::schema(
                    &self.name,
                    format!("relation of attribute '{}' names no related columns", attribute),
                ));
            }
            if let Some(column) = relation.columns.iter().find(|column| !column.contains('.')) {
                return Err(Error::schema(
                    &self.name,
                    format!(
                        "related column '{}' of attribute '{}' is not qualified as table.column",
                        column, attribute
                    ),
                ));
            }
            if relation.columns.len() > 1 && info.column_type != ColumnType::Text {
                return Err(Error::schema(
                    &self.name,
                    format!(
                        "attribute '{}' joins {} columns and must be Text, not {}",
                        attribute,
                        relation.columns.len(),
                        info.column_type
                    ),
                ));
            }
        }

        Ok(())
    }
}
