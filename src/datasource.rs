//! The datasource: fills tiles from the store and answers locate requests from the
//! features it has served.
use crate::config::{ConfigLoader, DataSourceInfo};
use crate::decode;
use crate::error::Error;
use crate::feature::TileSink;
use crate::locate::LocateIndex;
use crate::query::{self, Query};
use crate::schema::{SpatialIndexKind, TableInfo};
use crate::store::{SchemaResolver, Store};
use crate::tile::{Mbr, TileId};
use crate::TileSource;

use std::collections::HashMap;

// TODO: remove once async fn in traits become stable
use async_trait::async_trait;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TileRequest {
    pub tile: TileId,
    pub table: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateRequest {
    pub table: String,
    pub feature_id: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocateResponse {
    pub tile: TileId,
    pub layer_id: String,
    pub table: String,
    pub feature_id: i64,
}

pub struct Datasource<S> {
    store: S,
    info: DataSourceInfo,
    tables: HashMap<String, TableInfo>,
    index: LocateIndex,
}

impl<S: Store> Datasource<S> {
    pub fn new(store: S, info: DataSourceInfo, tables: HashMap<String, TableInfo>) -> Datasource<S> {
        let index = LocateIndex::new(tables.keys().cloned());
        Datasource {
            store,
            info,
            tables,
            index,
        }
    }

    /// Builds the datasource from a loaded config, resolving every table against the store.
    pub async fn from_config(store: S, loader: &ConfigLoader) -> Result<Datasource<S>, Error>
    where
        S: SchemaResolver,
    {
        let info = loader.datasource_info(&store).await?;
        let tables = loader.load_tables_info(&store).await?;
        info!(map_id = %info.map_id, tables = tables.len(), "Datasource ready");
        Ok(Datasource::new(store, info, tables))
    }

    pub fn info(&self) -> &DataSourceInfo {
        &self.info
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Streams the query's rows into `tile` and returns the ids it produced.
    async fn fill_features<T>(&self, table: &TableInfo, query: &Query, tile: &mut T) -> Result<Vec<i64>, Error>
    where
        T: TileSink + Send + ?Sized,
    {
        let mut rows = self.store.query(query);
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await {
            let row = row?;
            let id = decode::feature_id(&row)?;
            let feature = tile.new_feature(&table.name, id);
            decode::decode_row(&row, table, feature)?;
            ids.push(id);
        }
        Ok(ids)
    }
}

/// The rectangle to bind for a tile of `table`.
///
/// A native index works in the table's raw coordinates and takes the tile bounds as they
/// are. Every other index kind is matched against the stored geometries, so the bounds
/// are mapped back through the table's scaling first.
pub fn query_mbr(table: &TableInfo, tile: &TileId) -> Mbr {
    let bounds = tile.bounds();
    match table.spatial_index {
        SpatialIndexKind::Native(_) => bounds,
        _ => bounds.unscaled(&table.scaling),
    }
}

#[async_trait]
impl<S: Store> TileSource for Datasource<S> {
    async fn fill<T>(&self, request: &TileRequest, tile: &mut T) -> Result<usize, Error>
    where
        T: TileSink + Send + ?Sized,
    {
        let table = self
            .tables
            .get(&request.table)
            .ok_or_else(|| Error::UnknownTable(request.table.clone()))?;
        let query = query::synthesize(table, &query_mbr(table, &request.tile));
        debug!(table = %table.name, tile = %request.tile, sql = %query.sql, "Filling tile");

        match self.fill_features(table, &query, &mut *tile).await {
            Ok(ids) => {
                self.index.record_tile(&table.name, request.tile, &ids)?;
                debug!(table = %table.name, tile = %request.tile, features = ids.len(), "Tile filled");
                Ok(ids.len())
            }
            Err(err) => {
                tile.discard();
                error!(table = %table.name, tile = %request.tile, %err, "Failed to fill tile");
                Err(err)
            }
        }
    }

    fn locate(&self, request: &LocateRequest) -> Option<LocateResponse> {
        let Some(tile) = self.index.locate(&request.table, request.feature_id) else {
            debug!(table = %request.table, feature_id = request.feature_id, "Feature not located");
            return None;
        };
        debug!(table = %request.table, feature_id = request.feature_id, %tile, "Feature located");
        let layer_id = self
            .info
            .layer_id(&request.table)
            .unwrap_or(request.table.as_str())
            .to_owned();
        Some(LocateResponse {
            tile,
            layer_id,
            table: request.table.clone(),
            feature_id: request.feature_id,
        })
    }
}
