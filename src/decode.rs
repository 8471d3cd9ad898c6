//! Turns one result row into one feature.

use crate::feature::{AttributeValue, FeatureSink};
use crate::geometry::{Coord, Geometry};
use crate::query::ID_ALIAS;
use crate::schema::{AttributeInfo, ColumnType, Dimension, GeometryType, ScalingInfo, TableInfo};
use crate::store::{Row, Value};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("Column '{0}' is missing from the result row")]
    MissingColumn(String),

    #[error("Attribute '{attribute}' is declared {expected} but the stored value is {found}")]
    TypeMismatch {
        attribute: String,
        expected: ColumnType,
        found: &'static str,
    },

    #[error("Feature id must be an integer, found {0}")]
    InvalidId(&'static str),

    #[error("Table holds {expected:?} geometries, found {found}")]
    GeometryMismatch {
        expected: GeometryType,
        found: &'static str,
    },

    #[error("Three dimensional geometry has a point without a Z coordinate")]
    MissingZ,

    #[error("Geometry column holds {0}, expected a geometry BLOB")]
    InvalidGeometryColumn(&'static str),
}

/// Reads the primary key projected under the reserved id alias.
pub fn feature_id(row: &Row) -> Result<i64, DecodeError> {
    match row.get(ID_ALIAS) {
        Some(Value::Integer(id)) => Ok(*id),
        Some(other) => Err(DecodeError::InvalidId(other.type_name())),
        None => Err(DecodeError::MissingColumn(ID_ALIAS.to_owned())),
    }
}

/// Writes every declared attribute and every point run of the row's geometry to `feature`.
pub fn decode_row(row: &Row, table: &TableInfo, feature: &mut dyn FeatureSink) -> Result<(), DecodeError> {
    check_geometry_type(table.geometry_type, &row.geometry)?;

    for (name, info) in &table.attributes {
        let value = row
            .get(name)
            .ok_or_else(|| DecodeError::MissingColumn(name.clone()))?;
        feature.add_attribute(name, attribute_value(name, info, value)?);
    }

    // Multi geometries have no wrapper in the sink, each element is its own geometry
    let element_type = table.geometry_type.element();
    for part in row.geometry.parts() {
        let geometry = feature.begin_geometry(element_type, part.len());
        for point in part {
            geometry.add_point(scale(point, &table.scaling, table.dimension)?);
        }
    }

    Ok(())
}

fn check_geometry_type(expected: GeometryType, geometry: &Geometry) -> Result<(), DecodeError> {
    let matches = matches!(
        (expected, geometry),
        (GeometryType::Point, Geometry::Point(_))
            | (GeometryType::Line, Geometry::LineString(_))
            | (GeometryType::Polygon, Geometry::Polygon(_))
            | (GeometryType::MultiPoint, Geometry::MultiPoint(_))
            | (GeometryType::MultiLine, Geometry::MultiLineString(_))
            | (GeometryType::MultiPolygon, Geometry::MultiPolygon(_))
    );
    if matches {
        Ok(())
    } else {
        Err(DecodeError::GeometryMismatch {
            expected,
            found: geometry.kind(),
        })
    }
}

fn scale(point: &Coord, scaling: &ScalingInfo, dimension: Dimension) -> Result<Coord, DecodeError> {
    let z = match dimension {
        Dimension::D2 => None,
        Dimension::D3 => Some(point.z.ok_or(DecodeError::MissingZ)? * scaling.z),
    };
    Ok(Coord {
        x: point.x * scaling.x,
        y: point.y * scaling.y,
        z,
    })
}

/// NULL decodes to the declared type's empty value, the same way SQLite coerces it.
fn attribute_value(name: &str, info: &AttributeInfo, value: &Value) -> Result<AttributeValue, DecodeError> {
    let decoded = match (info.column_type, value) {
        (ColumnType::Int64, Value::Integer(v)) => AttributeValue::Int64(*v),
        (ColumnType::Int64, Value::Null) => AttributeValue::Int64(0),
        (ColumnType::Double, Value::Real(v)) => AttributeValue::Double(*v),
        (ColumnType::Double, Value::Integer(v)) => AttributeValue::Double(*v as f64),
        (ColumnType::Double, Value::Null) => AttributeValue::Double(0.0),
        (ColumnType::Text, Value::Text(v)) => AttributeValue::Text(v.clone()),
        // Blob attributes read whatever is stored as bytes, the way SQLite casts to BLOB
        (ColumnType::Blob, Value::Blob(bytes)) => AttributeValue::Text(hex::encode(bytes)),
        (ColumnType::Blob, Value::Text(text)) => AttributeValue::Text(hex::encode(text)),
        (ColumnType::Blob, Value::Integer(v)) => AttributeValue::Text(hex::encode(v.to_string())),
        (ColumnType::Blob, Value::Real(v)) => AttributeValue::Text(hex::encode(format!("{:?}", v))),
        (ColumnType::Text | ColumnType::Blob, Value::Null) => AttributeValue::Text(String::new()),
        (expected, found) => {
            return Err(DecodeError::TypeMismatch {
                attribute: name.to_owned(),
                expected,
                found: found.type_name(),
            })
        }
    };
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::feature::{Feature, FeatureGeometry, TileFeatureLayer, TileSink};
    use crate::geometry::Polygon;
    use crate::schema::tests::table;
    use crate::tile::TileId;

    use assert_approx_eq::assert_approx_eq;

    fn row(geometry: Geometry, columns: Vec<(&str, Value)>) -> Row {
        let mut columns: Vec<(String, Value)> = columns
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect();
        columns.push((ID_ALIAS.to_owned(), Value::Integer(1)));
        Row { columns, geometry }
    }

    fn decode(row: &Row, table: &TableInfo) -> Result<Feature, DecodeError> {
        let mut layer = TileFeatureLayer::new(TileId::new(0, 0, 0), &table.name);
        let feature = layer.new_feature(&table.name, feature_id(row)?);
        decode_row(row, table, feature)?;
        Ok(layer.features.remove(0))
    }

    fn xy(points: &[(f64, f64)]) -> Vec<Coord> {
        points.iter().map(|&(x, y)| Coord::xy(x, y)).collect()
    }

    fn xyz(points: &[(f64, f64, f64)]) -> Vec<Coord> {
        points.iter().map(|&(x, y, z)| Coord::xyz(x, y, z)).collect()
    }

    fn polygon(exterior: Vec<Coord>) -> Polygon {
        Polygon {
            exterior,
            interiors: vec![],
        }
    }

    #[test]
    fn test_line_feature() {
        let roads = table("roads", GeometryType::Line, Dimension::D2);
        let row = row(Geometry::LineString(xy(&[(9.0, 1.0), (2.0, 3.0)])), vec![]);

        let feature = decode(&row, &roads).unwrap();
        assert_eq!(1, feature.id);
        assert!(feature.attributes.is_empty());
        assert_eq!(
            vec![FeatureGeometry {
                geometry_type: GeometryType::Line,
                points: xy(&[(9.0, 1.0), (2.0, 3.0)]),
            }],
            feature.geometries
        );
    }

    #[test]
    fn test_every_geometry_type_keeps_its_points() {
        let cases = vec![
            (GeometryType::Point, Dimension::D2, Geometry::Point(Coord::xy(1.0, 2.0)), vec![xy(&[(1.0, 2.0)])]),
            (
                GeometryType::Point,
                Dimension::D3,
                Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)),
                vec![xyz(&[(1.0, 2.0, 3.0)])],
            ),
            (
                GeometryType::Line,
                Dimension::D3,
                Geometry::LineString(xyz(&[(3.0, 4.0, 5.0), (6.0, 7.0, 8.0)])),
                vec![xyz(&[(3.0, 4.0, 5.0), (6.0, 7.0, 8.0)])],
            ),
            (
                GeometryType::Polygon,
                Dimension::D2,
                Geometry::Polygon(Polygon {
                    exterior: xy(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (1.0, 2.0)]),
                    interiors: vec![xy(&[(2.0, 3.0), (3.0, 3.0), (2.0, 3.0)])],
                }),
                vec![xy(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (1.0, 2.0)])],
            ),
            (
                GeometryType::MultiPoint,
                Dimension::D2,
                Geometry::MultiPoint(xy(&[(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)])),
                vec![xy(&[(1.0, 2.0)]), xy(&[(3.0, 4.0)]), xy(&[(5.0, 6.0)])],
            ),
            (
                GeometryType::MultiLine,
                Dimension::D3,
                Geometry::MultiLineString(vec![
                    xyz(&[(5.0, 6.0, 3.0), (7.0, 8.0, 4.0)]),
                    xyz(&[(9.0, 1.0, 5.0), (2.0, 3.0, 6.0), (4.0, 5.0, 7.0)]),
                ]),
                vec![
                    xyz(&[(5.0, 6.0, 3.0), (7.0, 8.0, 4.0)]),
                    xyz(&[(9.0, 1.0, 5.0), (2.0, 3.0, 6.0), (4.0, 5.0, 7.0)]),
                ],
            ),
            (
                GeometryType::MultiPolygon,
                Dimension::D2,
                Geometry::MultiPolygon(vec![
                    polygon(xy(&[(7.0, 8.0), (9.0, 10.0), (11.0, 12.0), (7.0, 8.0)])),
                    polygon(xy(&[(13.0, 14.0), (15.0, 16.0), (21.0, 22.0), (13.0, 14.0)])),
                ]),
                vec![
                    xy(&[(7.0, 8.0), (9.0, 10.0), (11.0, 12.0), (7.0, 8.0)]),
                    xy(&[(13.0, 14.0), (15.0, 16.0), (21.0, 22.0), (13.0, 14.0)]),
                ],
            ),
        ];

        for (geometry_type, dimension, geometry, expected) in cases {
            let info = table("shapes", geometry_type, dimension);
            let feature = decode(&row(geometry, vec![]), &info).unwrap();
            let points: Vec<Vec<Coord>> = feature.geometries.iter().map(|g| g.points.clone()).collect();
            assert_eq!(expected, points, "{:?} {:?}", geometry_type, dimension);
            assert!(feature
                .geometries
                .iter()
                .all(|g| g.geometry_type == geometry_type.element()));
        }
    }

    #[test]
    fn test_two_dimensional_table_drops_z() {
        let info = table("points", GeometryType::Point, Dimension::D2);
        let feature = decode(&row(Geometry::Point(Coord::xyz(1.0, 2.0, 3.0)), vec![]), &info).unwrap();
        assert_eq!(vec![Coord::xy(1.0, 2.0)], feature.geometries[0].points);
    }

    #[test]
    fn test_three_dimensional_table_requires_z() {
        let info = table("points", GeometryType::Point, Dimension::D3);
        let result = decode(&row(Geometry::Point(Coord::xy(1.0, 2.0)), vec![]), &info);
        assert_eq!(Err(DecodeError::MissingZ), result);
    }

    #[test]
    fn test_scaling_applies_per_axis() {
        let mut info = table("points", GeometryType::Line, Dimension::D3);
        info.scaling = ScalingInfo {
            x: 0.01,
            y: 0.001,
            z: 0.0001,
        };
        let geometry = Geometry::LineString(xyz(&[(600.0, 7000.0, 80000.0), (700.0, 8000.0, 90000.0)]));
        let feature = decode(&row(geometry, vec![]), &info).unwrap();

        let points = &feature.geometries[0].points;
        assert_approx_eq!(6.0, points[0].x);
        assert_approx_eq!(7.0, points[0].y);
        assert_approx_eq!(8.0, points[0].z.unwrap());
        assert_approx_eq!(7.0, points[1].x);
        assert_approx_eq!(8.0, points[1].y);
        assert_approx_eq!(9.0, points[1].z.unwrap());
    }

    #[test]
    fn test_attributes() {
        let mut info = table("points", GeometryType::Point, Dimension::D2);
        for (name, column_type) in [
            ("intAttribute", ColumnType::Int64),
            ("doubleAttribute", ColumnType::Double),
            ("stringAttribute", ColumnType::Text),
            ("blobAttribute", ColumnType::Blob),
        ] {
            info.attributes.insert(name.to_owned(), AttributeInfo::column(column_type));
        }
        let row = row(
            Geometry::Point(Coord::xy(1.0, 2.0)),
            vec![
                ("intAttribute", Value::Integer(42)),
                ("doubleAttribute", Value::Real(6.66)),
                ("stringAttribute", Value::Text("value".to_owned())),
                ("blobAttribute", Value::Blob(vec![0xDE, 0xAD, 0xBE, 0xEF])),
            ],
        );

        let feature = decode(&row, &info).unwrap();
        assert_eq!(4, feature.attributes.len());
        assert_eq!(Some(&AttributeValue::Int64(42)), feature.attributes.get("intAttribute"));
        assert_eq!(Some(&AttributeValue::Double(6.66)), feature.attributes.get("doubleAttribute"));
        assert_eq!(
            Some(&AttributeValue::Text("value".to_owned())),
            feature.attributes.get("stringAttribute")
        );
        assert_eq!(
            Some(&AttributeValue::Text("deadbeef".to_owned())),
            feature.attributes.get("blobAttribute")
        );
    }

    #[test]
    fn test_null_and_widened_attributes() {
        let mut info = table("points", GeometryType::Point, Dimension::D2);
        info.attributes
            .insert("count".to_owned(), AttributeInfo::column(ColumnType::Int64));
        info.attributes
            .insert("ratio".to_owned(), AttributeInfo::column(ColumnType::Double));
        let row = row(
            Geometry::Point(Coord::xy(1.0, 2.0)),
            vec![("count", Value::Null), ("ratio", Value::Integer(3))],
        );

        let feature = decode(&row, &info).unwrap();
        assert_eq!(Some(&AttributeValue::Int64(0)), feature.attributes.get("count"));
        assert_eq!(Some(&AttributeValue::Double(3.0)), feature.attributes.get("ratio"));
    }

    #[test]
    fn test_blob_attribute_holding_other_values() {
        // A column sampled while NULL is typed Blob, its later values may be anything
        let mut info = table("points", GeometryType::Point, Dimension::D2);
        for name in ["text", "integer", "real"] {
            info.attributes
                .insert(name.to_owned(), AttributeInfo::column(Value::Null.column_type()));
        }
        let row = row(
            Geometry::Point(Coord::xy(1.0, 2.0)),
            vec![
                ("text", Value::Text("Main".to_owned())),
                ("integer", Value::Integer(42)),
                ("real", Value::Real(1.5)),
            ],
        );

        let feature = decode(&row, &info).unwrap();
        assert_eq!(
            Some(&AttributeValue::Text("4d61696e".to_owned())),
            feature.attributes.get("text")
        );
        assert_eq!(
            Some(&AttributeValue::Text("3432".to_owned())),
            feature.attributes.get("integer")
        );
        assert_eq!(
            Some(&AttributeValue::Text("312e35".to_owned())),
            feature.attributes.get("real")
        );
    }

    #[test]
    fn test_mismatched_attribute_type_fails() {
        let mut info = table("points", GeometryType::Point, Dimension::D2);
        info.attributes
            .insert("count".to_owned(), AttributeInfo::column(ColumnType::Int64));
        let row = row(
            Geometry::Point(Coord::xy(1.0, 2.0)),
            vec![("count", Value::Text("many".to_owned()))],
        );

        assert_eq!(
            Err(DecodeError::TypeMismatch {
                attribute: "count".to_owned(),
                expected: ColumnType::Int64,
                found: "TEXT",
            }),
            decode(&row, &info)
        );
    }

    #[test]
    fn test_missing_attribute_column_fails() {
        let mut info = table("points", GeometryType::Point, Dimension::D2);
        info.attributes
            .insert("count".to_owned(), AttributeInfo::column(ColumnType::Int64));
        let row = row(Geometry::Point(Coord::xy(1.0, 2.0)), vec![]);
        assert_eq!(Err(DecodeError::MissingColumn("count".to_owned())), decode(&row, &info));
    }

    #[test]
    fn test_geometry_type_mismatch_fails() {
        let info = table("roads", GeometryType::Line, Dimension::D2);
        let row = row(Geometry::Point(Coord::xy(1.0, 2.0)), vec![]);
        assert!(matches!(
            decode(&row, &info),
            Err(DecodeError::GeometryMismatch {
                expected: GeometryType::Line,
                found: "POINT"
            })
        ));
    }

    #[test]
    fn test_feature_id_must_be_integer() {
        let row = Row {
            columns: vec![(ID_ALIAS.to_owned(), Value::Text("7".to_owned()))],
            geometry: Geometry::Point(Coord::xy(0.0, 0.0)),
        };
        assert_eq!(Err(DecodeError::InvalidId("TEXT")), feature_id(&row));
    }
}
