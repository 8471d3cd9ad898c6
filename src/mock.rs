//! In-memory store used by the unit tests.

use crate::error::Error;
use crate::geometry::Geometry;
use crate::query::{Query, ID_ALIAS};
use crate::schema::{AttributesInfo, ColumnType, SpatialIndexKind};
use crate::store::{GeometryColumn, Row, SchemaResolver, Store, Value};
use crate::tile::Mbr;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;

pub(crate) struct MockTable {
    pub primary_key: String,
    pub geometry_column: String,
    pub type_code: i32,
    pub spatial_index: SpatialIndexKind,
    pub attributes: AttributesInfo,
    pub rows: Vec<Row>,
}

impl MockTable {
    pub fn new(type_code: i32, spatial_index: SpatialIndexKind) -> MockTable {
        MockTable {
            primary_key: "id".to_owned(),
            geometry_column: "geometry".to_owned(),
            type_code,
            spatial_index,
            attributes: AttributesInfo::new(),
            rows: Vec::new(),
        }
    }

    /// Adds a row holding the id, the geometry and the given attribute columns.
    pub fn row(mut self, id: i64, geometry: Geometry, attributes: &[(&str, Value)]) -> MockTable {
        let mut columns: Vec<(String, Value)> = attributes
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        columns.push((ID_ALIAS.to_owned(), Value::Integer(id)));
        self.rows.push(Row { columns, geometry });
        self
    }
}

#[derive(Default)]
pub(crate) struct MockDatabase {
    pub tables: BTreeMap<String, MockTable>,
    /// Types of related columns, keyed by the qualified `table.column` name.
    pub column_types: HashMap<String, ColumnType>,
    pub queries: Mutex<Vec<Query>>,
}

impl MockDatabase {
    pub fn with_table(mut self, name: &str, table: MockTable) -> MockDatabase {
        self.tables.insert(name.to_owned(), table);
        self
    }

    pub fn with_column(mut self, column: &str, column_type: ColumnType) -> MockDatabase {
        self.column_types.insert(column.to_owned(), column_type);
        self
    }

    fn table(&self, name: &str) -> Result<&MockTable, Error> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::schema(name, "table is not in geometry_columns"))
    }

    fn queried_table(&self, query: &Query) -> Option<&MockTable> {
        self.tables
            .iter()
            .find(|(name, _)| query.sql.contains(&format!(" FROM {} AS ", name)))
            .map(|(_, table)| table)
    }
}

impl Store for MockDatabase {
    /// Returns the rows of the queried table whose bounding box meets the bound rectangle.
    fn query<'a>(&'a self, query: &'a Query) -> BoxStream<'a, Result<Row, Error>> {
        self.queries.lock().push(query.clone());

        let mbr = Mbr::new(query.params[0], query.params[1], query.params[2], query.params[3]);
        let rows: Vec<Result<Row, Error>> = self
            .queried_table(query)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .filter(|row| {
                        row.geometry
                            .bounding_box()
                            .map_or(false, |bbox| bbox.intersects(&mbr))
                    })
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();
        stream::iter(rows).boxed()
    }
}

#[async_trait]
impl SchemaResolver for MockDatabase {
    async fn table_names(&self) -> Result<Vec<String>, Error> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn primary_key_column(&self, table: &str) -> Result<String, Error> {
        Ok(self.table(table)?.primary_key.clone())
    }

    async fn geometry_column(&self, table: &str) -> Result<GeometryColumn, Error> {
        let table = self.table(table)?;
        Ok(GeometryColumn {
            name: table.geometry_column.clone(),
            type_code: table.type_code,
        })
    }

    async fn spatial_index_kind(&self, table: &str) -> Result<SpatialIndexKind, Error> {
        Ok(self.table(table)?.spatial_index.clone())
    }

    async fn table_attributes(&self, table: &str) -> Result<AttributesInfo, Error> {
        Ok(self.table(table)?.attributes.clone())
    }

    async fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, Error> {
        self.column_types
            .get(column)
            .copied()
            .ok_or_else(|| Error::schema(table, format!("no column '{}'", column)))
    }
}
