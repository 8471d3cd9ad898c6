//! Datasource configuration: which tables become layers, how their coordinates are scaled
//! and which attributes they carry.
//!
//! The YAML file is an overlay on the database schema. Anything it does not mention is
//! read from the store through a [`SchemaResolver`].
use crate::error::Error;
use crate::schema::{AttributeInfo, ColumnType, Relation, ScalingInfo, TableInfo, DEFAULT_DELIMITER};
use crate::store::SchemaResolver;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keys are any combination of the letters `x`, `y` and `z`, e.g. `xy: 1e-7`.
pub type ScalingConfig = BTreeMap<String, f64>;

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatasourceConfig {
    #[serde(default)]
    pub map: MapConfig,
    pub datasource_port: Option<u16>,
    pub disable_attributes: Option<bool>,
    #[serde(default = "default_true")]
    pub load_remaining_layers_from_db: bool,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct MapConfig {
    pub path: Option<PathBuf>,
    /// The map id. Defaults to the file name of the map.
    pub name: Option<String>,
}

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GlobalConfig {
    pub coordinates_scaling: Option<ScalingConfig>,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LayerConfig {
    pub table: String,
    /// The layer id. Defaults to the table name.
    pub name: Option<String>,
    pub coordinates_scaling: Option<ScalingConfig>,
    #[serde(default = "default_true")]
    pub load_remaining_attributes_from_db: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: Option<String>,
    pub relation: Option<RelationConfig>,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelationConfig {
    pub related_columns: Vec<String>,
    pub match_condition: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_owned()
}

/// Values given outside of the config file, e.g. on the command line. They win over the
/// file's values.
#[derive(Clone, Debug, Default)]
pub struct OverrideOptions {
    pub map_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub disable_attributes: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatasourceOptions {
    pub map_path: PathBuf,
    /// 0 lets the transport pick a port.
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub table: String,
}

/// What the datasource announces to its clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInfo {
    pub map_id: String,
    pub layers: Vec<LayerInfo>,
}

impl DataSourceInfo {
    /// Id of the first layer backed by `table`, if any.
    pub fn layer_id(&self, table: &str) -> Option<&str> {
        self.layers
            .iter()
            .find(|layer| layer.table == table)
            .map(|layer| layer.name.as_str())
    }
}

#[derive(Debug)]
pub struct ConfigLoader {
    config: DatasourceConfig,
    options: DatasourceOptions,
    disable_attributes: bool,
}

impl ConfigLoader {
    /// Parses a datasource config YAML string and applies the overrides.
    pub fn from_yaml(data: &str, overrides: OverrideOptions) -> Result<ConfigLoader, Error> {
        let mut config: DatasourceConfig = serde_yaml::from_str(data)?;

        for layer in config.layers.iter_mut() {
            layer.table = layer.table.to_lowercase();
        }
        for (i, layer) in config.layers.iter().enumerate() {
            if config.layers[..i].iter().any(|other| other.table == layer.table) {
                return Err(Error::Config(format!("table '{}' is configured twice", layer.table)));
            }
        }

        let map_path = overrides
            .map_path
            .or_else(|| config.map.path.clone())
            .ok_or_else(|| {
                Error::Config("the map path was neither provided nor specified in the config".to_owned())
            })?;
        let options = DatasourceOptions {
            map_path,
            port: overrides.port.or(config.datasource_port).unwrap_or(0),
        };
        let disable_attributes = overrides
            .disable_attributes
            .or(config.disable_attributes)
            .unwrap_or(false);

        Ok(ConfigLoader {
            config,
            options,
            disable_attributes,
        })
    }

    pub fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    pub fn config(&self) -> &DatasourceConfig {
        &self.config
    }

    /// Layers in the order they are configured, followed by every other geometry table of
    /// the database unless `loadRemainingLayersFromDb` is off.
    pub async fn datasource_info<R>(&self, resolver: &R) -> Result<DataSourceInfo, Error>
    where
        R: SchemaResolver + ?Sized,
    {
        let map_id = match &self.config.map.name {
            Some(name) => name.clone(),
            None => self
                .options
                .map_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.options.map_path.display().to_string()),
        };

        let mut layers: Vec<LayerInfo> = self
            .config
            .layers
            .iter()
            .map(|layer| LayerInfo {
                name: layer.name.clone().unwrap_or_else(|| layer.table.clone()),
                table: layer.table.clone(),
            })
            .collect();

        if self.config.load_remaining_layers_from_db {
            for table in self.remaining_tables(resolver).await? {
                layers.push(LayerInfo {
                    name: table.clone(),
                    table,
                });
            }
        }

        let info = DataSourceInfo { map_id, layers };
        debug!(?info, "Datasource info");
        Ok(info)
    }

    /// Resolves every table the datasource serves, keyed by lower-cased table name.
    pub async fn load_tables_info<R>(&self, resolver: &R) -> Result<HashMap<String, TableInfo>, Error>
    where
        R: SchemaResolver + ?Sized,
    {
        let global_scaling = match &self.config.global.coordinates_scaling {
            Some(scaling) => apply_scaling(scaling, ScalingInfo::default())?,
            None => ScalingInfo::default(),
        };

        let mut tables = HashMap::new();
        for layer in &self.config.layers {
            let mut info = TableInfo::resolve(&layer.table, resolver).await?;
            info.scaling = match &layer.coordinates_scaling {
                Some(scaling) => apply_scaling(scaling, global_scaling)?,
                None => global_scaling,
            };

            if !self.disable_attributes {
                if layer.load_remaining_attributes_from_db {
                    info.attributes = resolver.table_attributes(&layer.table).await?;
                }
                for attribute in &layer.attributes {
                    let attribute_info = self.attribute_info(&layer.table, attribute, resolver).await?;
                    info.attributes.insert(attribute.name.clone(), attribute_info);
                }
            }

            info.validate()?;
            tables.insert(layer.table.clone(), info);
        }

        if self.config.load_remaining_layers_from_db {
            for table in self.remaining_tables(resolver).await? {
                let mut info = TableInfo::resolve(&table, resolver).await?;
                info.scaling = global_scaling;
                if !self.disable_attributes {
                    info.attributes = resolver.table_attributes(&table).await?;
                }
                info.validate()?;
                tables.insert(table, info);
            }
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let sorted: BTreeMap<&String, &TableInfo> = tables.iter().collect();
            debug!("Loaded tables config:\n{}", serde_yaml::to_string(&sorted)?);
        }

        Ok(tables)
    }

    /// Lower-cased geometry tables of the database that no layer configures.
    async fn remaining_tables<R>(&self, resolver: &R) -> Result<Vec<String>, Error>
    where
        R: SchemaResolver + ?Sized,
    {
        let mut tables = Vec::new();
        for table in resolver.table_names().await? {
            let table = table.to_lowercase();
            let configured = self.config.layers.iter().any(|layer| layer.table == table);
            if !configured && !tables.contains(&table) {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    async fn attribute_info<R>(
        &self,
        table: &str,
        attribute: &AttributeConfig,
        resolver: &R,
    ) -> Result<AttributeInfo, Error>
    where
        R: SchemaResolver + ?Sized,
    {
        let explicit_type = attribute
            .column_type
            .as_deref()
            .map(str::parse::<ColumnType>)
            .transpose()?;

        let Some(relation) = &attribute.relation else {
            let column_type = match explicit_type {
                Some(column_type) => column_type,
                None => resolver.column_type(table, &attribute.name).await?,
            };
            return Ok(AttributeInfo::column(column_type));
        };

        let column_type = match (relation.related_columns.as_slice(), explicit_type) {
            ([column], None) => {
                let related_table = column.split('.').next().unwrap_or(column);
                resolver.column_type(related_table, column).await?
            }
            ([_], Some(column_type)) => column_type,
            (_, None) | (_, Some(ColumnType::Text)) => ColumnType::Text,
            (_, Some(column_type)) => {
                warn!(
                    table,
                    attribute = %attribute.name,
                    %column_type,
                    "Attribute joins several columns and is always text"
                );
                ColumnType::Text
            }
        };

        Ok(AttributeInfo {
            column_type,
            relation: Some(Relation {
                columns: relation.related_columns.clone(),
                delimiter: relation.delimiter.clone(),
                match_condition: relation.match_condition.clone(),
            }),
        })
    }
}

/// Overlays the configured factors on `base`, axis by axis.
fn apply_scaling(config: &ScalingConfig, base: ScalingInfo) -> Result<ScalingInfo, Error> {
    let mut result = base;
    for (axes, factor) in config {
        for axis in axes.chars() {
            match axis {
                'x' => result.x = *factor,
                'y' => result.y = *factor,
                'z' => result.z = *factor,
                _ => {
                    return Err(Error::Config(format!(
                        "unknown projection '{}' in '{}'",
                        axis, axes
                    )))
                }
            }
        }
    }
    Ok(result)
}
