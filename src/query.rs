//! SQL synthesis for one tile of one table.
//!
//! The generated statement selects, per geometry intersecting the rectangle, the raw
//! geometry BLOB, every configured attribute and the primary key. The rectangle is bound
//! as the positional parameters `?1..?4` (xmin, ymin, xmax, ymax).

use crate::schema::{AttributesInfo, SpatialIndexKind, TableInfo};
use crate::tile::Mbr;

use std::collections::HashSet;

/// Alias of the owning table inside every synthesized query. Relation match conditions
/// refer to the owning row through it.
pub const TABLE_ALIAS: &str = "layerTable";
pub const GEOMETRY_ALIAS: &str = "__geometry";
pub const ID_ALIAS: &str = "__id";

const MBR_PARAMS: &str = "?1, ?2, ?3, ?4";

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<f64>,
}

/// Builds the tile query for a table. The rectangle must already be in the coordinate
/// space the table's spatial index expects.
pub fn synthesize(table: &TableInfo, mbr: &Mbr) -> Query {
    let sql = format!(
        "SELECT {alias}.{geometry} AS {geometry_alias}, {attributes}{alias}.{primary_key} AS {id_alias} \
         FROM {table} AS {alias}{related_tables} \
         WHERE {mbr_condition}{match_conditions}",
        alias = TABLE_ALIAS,
        geometry = table.geometry_column,
        geometry_alias = GEOMETRY_ALIAS,
        attributes = attributes_list(&table.attributes),
        primary_key = table.primary_key,
        id_alias = ID_ALIAS,
        table = table.name,
        related_tables = related_tables(&table.attributes),
        mbr_condition = mbr_condition(table),
        match_conditions = match_conditions(&table.attributes),
    );

    Query {
        sql,
        params: mbr.as_params().to_vec(),
    }
}

fn mbr_condition(table: &TableInfo) -> String {
    match &table.spatial_index {
        SpatialIndexKind::None => format!(
            "Intersects({}.{}, BuildMbr({}))",
            TABLE_ALIAS, table.geometry_column, MBR_PARAMS
        ),
        SpatialIndexKind::RTree => format!(
            "{}.rowid IN (SELECT rowid FROM SpatialIndex WHERE f_table_name = '{}' \
             AND f_geometry_column = '{}' AND search_frame = BuildMbr({}))",
            TABLE_ALIAS,
            escape_literal(&table.name),
            escape_literal(&table.geometry_column),
            MBR_PARAMS
        ),
        SpatialIndexKind::MbrCache => format!(
            "{}.rowid IN (SELECT rowid FROM cache_{}_{} WHERE mbr = FilterMbrIntersects({}))",
            TABLE_ALIAS, table.name, table.geometry_column, MBR_PARAMS
        ),
        SpatialIndexKind::Native(predicate) => predicate.clone(),
    }
}

fn attributes_list(attributes: &AttributesInfo) -> String {
    let mut result = String::new();
    for (name, info) in attributes {
        let projection = match &info.relation {
            None => format!("{}.\"{}\"", TABLE_ALIAS, name),
            Some(relation) if relation.columns.len() == 1 => relation.columns[0].clone(),
            Some(relation) => relation
                .columns
                .join(&format!(" || '{}' || ", escape_literal(&relation.delimiter))),
        };
        result += &format!("{} AS \"{}\", ", projection, name);
    }
    result
}

fn related_tables(attributes: &AttributesInfo) -> String {
    let mut seen = HashSet::new();
    let mut result = String::new();
    let tables = attributes
        .values()
        .filter_map(|info| info.relation.as_ref())
        .flat_map(|relation| relation.related_tables());
    for table in tables {
        if seen.insert(table) {
            result += ", ";
            result += table;
        }
    }
    result
}

fn match_conditions(attributes: &AttributesInfo) -> String {
    attributes
        .values()
        .filter_map(|info| info.relation.as_ref())
        .map(|relation| format!(" AND ({})", relation.match_condition))
        .collect()
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
