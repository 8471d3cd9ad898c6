//! The SpatiaLite store: query execution and schema lookups over an sqlx SQLite pool with
//! the `mod_spatialite` extension loaded.

pub mod blob;

use crate::decode::DecodeError;
use crate::error::Error;
use crate::query::{Query, GEOMETRY_ALIAS};
use crate::schema::{AttributeInfo, AttributesInfo, ColumnType, SpatialIndexKind};
use crate::store::{GeometryColumn, NativeIndex, Row, SchemaResolver, Store, Value};

use std::path::Path;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, warn};

const WGS84_SRID: i32 = 4326;

pub struct SpatialiteStore {
    pool: SqlitePool,
    native_index: Option<Box<dyn NativeIndex>>,
}

impl SpatialiteStore {
    /// Opens a SpatiaLite database read-only.
    pub async fn open(path: impl AsRef<Path>) -> Result<SpatialiteStore, Error> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true)
            .extension("mod_spatialite");
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(SpatialiteStore::with_pool(pool))
    }

    /// Wraps an existing pool. Its connections must have SpatiaLite loaded.
    pub fn with_pool(pool: SqlitePool) -> SpatialiteStore {
        SpatialiteStore {
            pool,
            native_index: None,
        }
    }

    pub fn with_native_index(mut self, index: impl NativeIndex + 'static) -> SpatialiteStore {
        self.native_index = Some(Box::new(index));
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn sample_row(&self, sql: &str) -> Result<Option<SqliteRow>, Error> {
        Ok(sqlx::query(sql).fetch_optional(&self.pool).await?)
    }
}

impl Store for SpatialiteStore {
    fn query<'a>(&'a self, query: &'a Query) -> BoxStream<'a, Result<Row, Error>> {
        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = statement.bind(*param);
        }
        statement
            .fetch(&self.pool)
            .map(|row| row.map_err(Error::from).and_then(|row| convert_row(&row)))
            .boxed()
    }
}

#[async_trait]
impl SchemaResolver for SpatialiteStore {
    async fn table_names(&self) -> Result<Vec<String>, Error> {
        let tables: Vec<String> = sqlx::query_scalar("SELECT f_table_name FROM geometry_columns")
            .fetch_all(&self.pool)
            .await?;
        Ok(tables)
    }

    async fn primary_key_column(&self, table: &str) -> Result<String, Error> {
        let primary_key: Option<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) WHERE pk = 1")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(primary_key) = primary_key {
            return Ok(primary_key);
        }

        warn!(table, "Can't find primary key column, trying to use 'id'");
        let id: Option<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) WHERE lower(name) = 'id'")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;
        if let Some(id) = id {
            return Ok(id);
        }

        warn!(table, "Can't find an 'id' column, using 'rowid' instead");
        Ok("rowid".to_owned())
    }

    async fn geometry_column(&self, table: &str) -> Result<GeometryColumn, Error> {
        let row: Option<(String, i32, i32)> = sqlx::query_as(
            "SELECT f_geometry_column, geometry_type, srid FROM geometry_columns WHERE f_table_name = ?1",
        )
        .bind(table.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        let (name, type_code, srid) =
            row.ok_or_else(|| Error::schema(table, "table is not in geometry_columns"))?;
        if srid != WGS84_SRID {
            return Err(Error::schema(
                table,
                format!("geometry column uses SRID {}, expected WGS84 ({})", srid, WGS84_SRID),
            ));
        }
        Ok(GeometryColumn { name, type_code })
    }

    async fn spatial_index_kind(&self, table: &str) -> Result<SpatialIndexKind, Error> {
        if let Some(native_index) = &self.native_index {
            if let Some(predicate) = native_index.predicate(&self.pool, table).await? {
                debug!(table, "Native spatial index found");
                return Ok(SpatialIndexKind::Native(predicate));
            }
        }

        let enabled: Option<i64> =
            sqlx::query_scalar("SELECT spatial_index_enabled FROM geometry_columns WHERE f_table_name = ?1")
                .bind(table.to_lowercase())
                .fetch_optional(&self.pool)
                .await?;
        match enabled.ok_or_else(|| Error::schema(table, "table is not in geometry_columns"))? {
            0 => {
                warn!(table, "No spatial index found");
                Ok(SpatialIndexKind::None)
            }
            1 => {
                debug!(table, "R*Tree spatial index found");
                Ok(SpatialIndexKind::RTree)
            }
            2 => {
                debug!(table, "MBR cache found");
                Ok(SpatialIndexKind::MbrCache)
            }
            other => Err(Error::schema(table, format!("unknown spatial index type {}", other))),
        }
    }

    async fn table_attributes(&self, table: &str) -> Result<AttributesInfo, Error> {
        let primary_key = self.primary_key_column(table).await?;
        let geometry_column = self.geometry_column(table).await?.name;

        // PRAGMA table_info reports declared types, which SQLite does not enforce, so the
        // types come from an actual row instead
        let mut attributes = AttributesInfo::new();
        let Some(row) = self.sample_row(&format!("SELECT * FROM {} LIMIT 1", table)).await? else {
            return Ok(attributes);
        };
        for column in row.columns() {
            let name = column.name();
            if name.eq_ignore_ascii_case(&primary_key) || name.eq_ignore_ascii_case(&geometry_column) {
                continue;
            }
            let column_type = value(&row, column.ordinal())?.column_type();
            attributes.insert(name.to_owned(), AttributeInfo::column(column_type));
        }
        Ok(attributes)
    }

    async fn column_type(&self, table: &str, column: &str) -> Result<ColumnType, Error> {
        let sql = format!("SELECT {} FROM {} LIMIT 1", column, table);
        match self.sample_row(&sql).await? {
            Some(row) => Ok(value(&row, 0)?.column_type()),
            None => {
                warn!(table, column, "Table is empty, treating column as a blob");
                Ok(ColumnType::Blob)
            }
        }
    }
}

fn value(row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match raw.type_info().name() {
        "INTEGER" => Value::Integer(row.try_get_unchecked(index)?),
        "REAL" => Value::Real(row.try_get_unchecked(index)?),
        "TEXT" => Value::Text(row.try_get_unchecked(index)?),
        _ => Value::Blob(row.try_get_unchecked(index)?),
    };
    Ok(value)
}

fn convert_row(row: &SqliteRow) -> Result<Row, Error> {
    let mut columns = Vec::with_capacity(row.len());
    let mut geometry = None;
    for column in row.columns() {
        let value = value(row, column.ordinal())?;
        if column.name() != GEOMETRY_ALIAS {
            columns.push((column.name().to_owned(), value));
            continue;
        }
        match value {
            Value::Blob(bytes) => geometry = Some(blob::decode(&bytes)?),
            other => return Err(DecodeError::InvalidGeometryColumn(other.type_name()).into()),
        }
    }

    let geometry = geometry.ok_or_else(|| DecodeError::MissingColumn(GEOMETRY_ALIAS.to_owned()))?;
    Ok(Row { columns, geometry })
}
