use crate::decode::DecodeError;
use crate::spatialite::blob::BlobError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid YAML in datasource config.")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid datasource config: {0}")]
    Config(String),

    #[error("Invalid schema for table '{table}': {reason}")]
    Schema { table: String, reason: String },

    #[error("Invalid tile id: {0}")]
    InvalidTile(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Query against the spatial store failed: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Malformed geometry: {0}")]
    Geometry(#[from] BlobError),
}

impl Error {
    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        Error::Schema {
            table: table.to_owned(),
            reason: reason.into(),
        }
    }
}
