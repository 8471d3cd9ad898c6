//! Seams between the tile core and the spatial store that evaluates its queries.

use crate::error::Error;
use crate::geometry::Geometry;
use crate::query::Query;
use crate::schema::{AttributesInfo, ColumnType, SpatialIndexKind};

use async_trait::async_trait;

use futures::stream::BoxStream;

/// A dynamically typed column value, as reported by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Column type a sampled value implies. NULL carries no type and is treated as a blob.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Integer(_) => ColumnType::Int64,
            Value::Real(_) => ColumnType::Double,
            Value::Text(_) => ColumnType::Text,
            Value::Null | Value::Blob(_) => ColumnType::Blob,
        }
    }
}

/// One result row: the named columns of the projection plus the decoded geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
    pub geometry: Geometry,
}

impl Row {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }
}

/// Executes synthesized queries. Implementations must tolerate concurrent read-only queries.
pub trait Store: Send + Sync {
    /// Streams the rows matching the query, in the store's native order.
    fn query<'a>(&'a self, query: &'a Query) -> BoxStream<'a, Result<Row, Error>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeometryColumn {
    pub name: String,
    /// SpatiaLite geometry type code, see [`crate::schema::parse_geometry_code`].
    pub type_code: i32,
}

/// Startup-time schema lookups used to build [`crate::schema::TableInfo`].
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    /// Names of all tables with a registered geometry column.
    async fn table_names(&self) -> Result<Vec<String>, Error>;

    /// Primary key column, falling back to an `id` column and then to `rowid`.
    async fn primary_key_column(&self, table: &str) -> Result<String, Error>;

    async fn geometry_column(&self, table: &str) -> Result<GeometryColumn, Error>;

    async fn spatial_index_kind(&self, table: &str) -> Result<SpatialIndexKind, Error>;

    /// Every column besides the primary key and the geometry, typed from a sample row.
    async fn table_attributes(&self, table: &str) -> Result<AttributesInfo, Error>;

    /// Type of a column, which may be qualified as `table.column`.
    async fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, Error>;
}

/// A spatial index that lives outside of SpatiaLite's own index tables.
#[async_trait]
pub trait NativeIndex: Send + Sync {
    /// Returns the SQL predicate selecting `layerTable` rows within the rectangle bound to
    /// `?1..?4`, or `None` if the table has no such index.
    async fn predicate(&self, pool: &sqlx::SqlitePool, table: &str) -> Result<Option<String>, Error>;
}
