//! Reverse lookup from feature id to the tile that last produced it.
//!
//! One map per table, each behind its own lock, so fills of different tables never
//! contend. The set of tables is fixed when the index is created. Entries are overwritten
//! by later fills and never removed: a hit says where a feature was last seen, not where
//! it is now.

use crate::error::Error;
use crate::tile::TileId;

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct LocateIndex {
    /// table name -> (feature id -> tile)
    tables: HashMap<String, RwLock<HashMap<i64, TileId>>>,
}

impl LocateIndex {
    pub fn new<I, S>(tables: I) -> LocateIndex
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LocateIndex {
            tables: tables
                .into_iter()
                .map(|table| (table.into(), RwLock::new(HashMap::new())))
                .collect(),
        }
    }

    /// Points every id at `tile`, replacing earlier entries. Takes the table's write lock
    /// once for the whole batch.
    pub fn record_tile(&self, table: &str, tile: TileId, feature_ids: &[i64]) -> Result<(), Error> {
        let features = self
            .tables
            .get(table)
            .ok_or_else(|| Error::UnknownTable(table.to_owned()))?;

        let mut features = features.write();
        features.reserve(feature_ids.len());
        for id in feature_ids {
            features.insert(*id, tile);
        }
        Ok(())
    }

    pub fn locate(&self, table: &str, feature_id: i64) -> Option<TileId> {
        self.tables.get(table)?.read().get(&feature_id).copied()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables
            .get(table)
            .map(|features| features.read().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}
