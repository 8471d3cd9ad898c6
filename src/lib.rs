//! # SpatiaLite Tiles
//!
//! Serve the vector data of a SpatiaLite database as map tiles, and find the tile a
//! served feature came from.
//!
//! ## Current features
//!
//! Given a SpatiaLite database and an optional YAML datasource config, this crate will
//! synthesize a spatial query per tile and table, decode the SpatiaLite geometry BLOBs and
//! attributes of the result into a caller-provided tile sink, and remember which tile each
//! feature was last served in so that it can be located by id later on.
//!
//! Spatial filtering uses whatever the table has: SpatiaLite's R*Tree index, its MBR
//! cache, a native index provided by the caller, or a plain `Intersects` scan.
//!
//! ## Known Limitations
//!
//! Geometries must be stored in WGS84 (SRID 4326). Geometry collections are not supported,
//! and polygon holes are not emitted. The transport that carries tiles to clients is up to
//! the calling application.
//!
//! The trait-based design allows for further extensibility, so other stores and tile
//! formats can be plugged in behind [`store::Store`] and [`feature::TileSink`].

// TODO: remove once async fn in traits become stable
use async_trait::async_trait;

pub mod config;
pub mod datasource;
pub mod decode;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod locate;
pub mod query;
pub mod schema;
pub mod spatialite;
pub mod store;
pub mod tile;

#[cfg(test)]
pub(crate) mod mock;

pub use crate::config::{ConfigLoader, DataSourceInfo, OverrideOptions};
pub use crate::datasource::{Datasource, LocateRequest, LocateResponse, TileRequest};
pub use crate::error::Error;
pub use crate::feature::{FeatureSink, GeometrySink, TileFeatureLayer, TileSink};
pub use crate::spatialite::SpatialiteStore;
pub use crate::tile::TileId;

/// This is the main trait exported by this crate.
#[async_trait]
pub trait TileSource {
    /// Fills `tile` with the features of the requested table that intersect the requested
    /// tile, and returns how many were added.
    ///
    /// On error the tile is discarded and none of its features become locatable.
    async fn fill<T>(&self, request: &TileRequest, tile: &mut T) -> Result<usize, Error>
    where
        T: TileSink + Send + ?Sized;

    /// The tile a feature was last served in, if it was served at all.
    fn locate(&self, request: &LocateRequest) -> Option<LocateResponse>;
}
