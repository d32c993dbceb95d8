//! Code to parse and handle actions from the delta log

pub mod deletion_vector;

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::table_features::ReaderFeatures;
use crate::table_properties::TableProperties;
use crate::{DeltaResult, Error};

pub use self::deletion_vector::DeletionVectorDescriptor;

pub(crate) const ADD_NAME: &str = "add";
pub(crate) const REMOVE_NAME: &str = "remove";
pub(crate) const METADATA_NAME: &str = "metaData";
pub(crate) const PROTOCOL_NAME: &str = "protocol";
pub(crate) const SET_TRANSACTION_NAME: &str = "txn";
pub(crate) const COMMIT_INFO_NAME: &str = "commitInfo";

const ACTION_NAMES: [&str; 6] = [
    SET_TRANSACTION_NAME,
    ADD_NAME,
    REMOVE_NAME,
    METADATA_NAME,
    PROTOCOL_NAME,
    COMMIT_INFO_NAME,
];

/// One entry of the transaction log.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Protocol(Protocol),
    Metadata(Metadata),
    Add(Add),
    Remove(Remove),
    Txn(SetTransaction),
    CommitInfo(CommitInfo),
}

impl Action {
    /// Decode one line of a commit file.
    pub fn from_json_line(line: &str) -> DeltaResult<Action> {
        let value: Value = serde_json::from_str(line)
            .map_err(|err| Error::parse(format!("invalid json line: {err}")))?;
        Self::try_from_value(value)
    }

    /// Decode one JSON object holding exactly one populated action. Keys that are not action
    /// names are ignored, as are action keys whose value is `null`.
    pub fn try_from_value(value: Value) -> DeltaResult<Action> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(Error::parse(format!("expected a json object, got {other}"))),
        };
        let mut populated = map
            .into_iter()
            .filter(|(key, value)| ACTION_NAMES.contains(&key.as_str()) && !value.is_null());
        let Some((name, value)) = populated.next() else {
            return Err(Error::parse("no known action in log entry"));
        };
        if let Some((other, _)) = populated.next() {
            return Err(Error::parse(format!(
                "log entry holds more than one action: '{name}' and '{other}'"
            )));
        }
        let action = match name.as_str() {
            ADD_NAME => Action::Add(decode(&name, value)?),
            REMOVE_NAME => Action::Remove(decode(&name, value)?),
            METADATA_NAME => Action::Metadata(decode(&name, value)?),
            PROTOCOL_NAME => Action::Protocol(decode(&name, value)?),
            SET_TRANSACTION_NAME => Action::Txn(decode(&name, value)?),
            COMMIT_INFO_NAME => match value {
                Value::Object(map) => Action::CommitInfo(CommitInfo(map)),
                other => {
                    return Err(Error::parse(format!(
                        "commitInfo must be an object, got {other}"
                    )))
                }
            },
            other => return Err(Error::parse(format!("unknown action '{other}'"))),
        };
        Ok(action)
    }
}

fn decode<T: serde::de::DeserializeOwned>(name: &str, value: Value) -> DeltaResult<T> {
    serde_json::from_value(value).map_err(|err| Error::parse(format!("invalid {name} action: {err}")))
}

/// Decode the newline delimited actions of a commit file, in file order. Blank lines are skipped.
pub fn parse_json_actions(data: &[u8]) -> DeltaResult<Vec<Action>> {
    let text = std::str::from_utf8(data)
        .map_err(|err| Error::parse(format!("commit file is not utf-8: {err}")))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Action::from_json_line)
        .collect()
}

// Explicit `null`s show up for absent collections, both in hand written logs and in checkpoint rows.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    /// Name of the encoding for files in this table
    pub provider: String,
    /// A map containing configuration options for the format
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: HashMap<String, String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: String::from("parquet"),
            options: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique identifier for this table
    pub id: String,
    /// User-provided identifier for this table
    pub name: Option<String>,
    /// User-provided description for this table
    pub description: Option<String>,
    /// Specification of the encoding for the files stored in the table
    pub format: Format,
    /// Schema of the table
    pub schema_string: String,
    /// Column names by which the data should be partitioned
    #[serde(default, deserialize_with = "null_as_default")]
    pub partition_columns: Vec<String>,
    /// The time when this metadata action is created, in milliseconds since the Unix epoch
    pub created_time: Option<i64>,
    /// Configuration options for the metadata action
    #[serde(default, deserialize_with = "null_as_default")]
    pub configuration: HashMap<String, String>,
}

impl Metadata {
    /// Parse the table schema string as a JSON document.
    pub fn schema(&self) -> DeltaResult<Value> {
        Ok(serde_json::from_str(&self.schema_string)?)
    }

    /// Parse the `configuration` map into typed [`TableProperties`].
    pub fn parse_table_properties(&self) -> TableProperties {
        TableProperties::from(&self.configuration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// The minimum version of the Delta read protocol that a client must implement
    /// in order to correctly read this table
    pub min_reader_version: i32,
    /// The minimum version of the Delta write protocol that a client must implement
    /// in order to correctly write this table
    pub min_writer_version: i32,
    /// A collection of features that a client must implement in order to correctly
    /// read this table (exist only when minReaderVersion is set to 3)
    #[serde(default, deserialize_with = "null_as_default")]
    pub reader_features: Vec<String>,
    /// A collection of features that a client must implement in order to correctly
    /// write this table (exist only when minWriterVersion is set to 7)
    #[serde(default, deserialize_with = "null_as_default")]
    pub writer_features: Vec<String>,
}

impl Protocol {
    pub fn new(min_reader_version: i32, min_writer_version: i32) -> Self {
        Self {
            min_reader_version,
            min_writer_version,
            reader_features: vec![],
            writer_features: vec![],
        }
    }

    /// Set the reader features of this protocol
    pub fn with_reader_features(
        mut self,
        reader_features: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.reader_features = reader_features.into_iter().map(Into::into).collect();
        self
    }

    /// True if this protocol lists the given reader feature
    pub fn has_reader_feature(&self, feature: &ReaderFeatures) -> bool {
        let name = feature.as_ref();
        self.reader_features.iter().any(|f| f == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    /// A relative path to a data file from the root of the table or an absolute path to a file
    /// that should be added to the table. The path is a URI as specified by
    /// [RFC 2396 URI Generic Syntax], which needs to be decoded to get the data file path.
    ///
    /// [RFC 2396 URI Generic Syntax]: https://www.ietf.org/rfc/rfc2396.txt
    pub path: String,

    /// A map from partition column to value for this logical file.
    #[serde(default, deserialize_with = "null_as_default")]
    pub partition_values: HashMap<String, Option<String>>,

    /// The size of this data file in bytes
    pub size: i64,

    /// The time this logical file was created, as milliseconds since the epoch.
    pub modification_time: i64,

    /// When `false` the logical file must already be present in the table or the records
    /// in the added file must be contained in one or more remove actions in the same version.
    #[serde(default)]
    pub data_change: bool,

    /// Contains [statistics] (e.g., count, min/max values for columns) about the data in this logical file.
    ///
    /// [statistics]: https://github.com/delta-io/delta/blob/master/PROTOCOL.md#Per-file-Statistics
    pub stats: Option<String>,

    /// Map containing metadata about this logical file.
    pub tags: Option<HashMap<String, Option<String>>>,

    /// Information about deletion vector (DV) associated with this add action
    pub deletion_vector: Option<DeletionVectorDescriptor>,

    /// Default generated Row ID of the first row in the file. The default generated Row IDs
    /// of the other rows in the file can be reconstructed by adding the physical index of the
    /// row within the file to the base Row ID
    pub base_row_id: Option<i64>,

    /// First commit version in which an add action with the same path was committed to the table.
    pub default_row_commit_version: Option<i64>,

    /// The name of the clustering implementation
    pub clustering_provider: Option<String>,
}

impl Add {
    pub fn dv_unique_id(&self) -> Option<String> {
        self.deletion_vector.as_ref().map(|dv| dv.unique_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    /// A relative path to a data file from the root of the table or an absolute path to a file
    /// that should be removed from the table.
    pub path: String,

    /// The time the deletion occurred, as milliseconds since the epoch.
    pub deletion_timestamp: Option<i64>,

    /// When `false` the records in the removed file must be contained in one or more add
    /// actions in the same version.
    #[serde(default)]
    pub data_change: bool,

    /// When true the fields `partition_values`, `size`, and `tags` are present
    pub extended_file_metadata: Option<bool>,

    /// A map from partition column to value for this logical file.
    pub partition_values: Option<HashMap<String, Option<String>>>,

    /// The size of this data file in bytes
    pub size: Option<i64>,

    /// Map containing metadata about this logical file.
    pub tags: Option<HashMap<String, Option<String>>>,

    /// Information about deletion vector (DV) associated with this remove action
    pub deletion_vector: Option<DeletionVectorDescriptor>,

    /// Default generated Row ID of the first row in the file.
    pub base_row_id: Option<i64>,

    /// First commit version in which an add action with the same path was committed to the table.
    pub default_row_commit_version: Option<i64>,
}

impl Remove {
    pub fn dv_unique_id(&self) -> Option<String> {
        self.deletion_vector.as_ref().map(|dv| dv.unique_id())
    }
}

/// Records the last version an application committed, for idempotent writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTransaction {
    /// A unique identifier for the application performing the transaction.
    pub app_id: String,

    /// An application-specific numeric identifier for this transaction.
    pub version: i64,

    /// The time when this transaction action was created in milliseconds since the Unix epoch.
    pub last_updated: Option<i64>,
}

/// Free-form provenance information written with each commit. Only a few well known fields are
/// exposed through accessors; everything else is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommitInfo(pub Map<String, Value>);

impl CommitInfo {
    /// Commit timestamp in milliseconds since the Unix epoch, if recorded
    pub fn timestamp(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_i64)
    }

    /// Name of the operation that produced the commit, e.g. `WRITE`
    pub fn operation(&self) -> Option<&str> {
        self.0.get("operation").and_then(Value::as_str)
    }
}
