//! A number of utilities useful for testing that we want to use in multiple crates

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, LazyLock, Mutex};

use arrow_array::RecordBatch;
use arrow_json::ReaderBuilder;
use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef};
use bytes::Bytes;
use delta_log_reader::{DeltaResult, FileMeta, StorageHandler};
use futures::stream::BoxStream;
use itertools::Itertools;
use object_store::{path::Path, ObjectStore};
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use url::Url;

/// A common useful initial metadata and protocol. Also includes a single commitInfo
pub const METADATA: &str = r#"{"commitInfo":{"timestamp":1587968586154,"operation":"WRITE","operationParameters":{"mode":"ErrorIfExists","partitionBy":"[]"},"isBlindAppend":true}}
{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}
{"metaData":{"id":"5fba94ed-9794-4965-ba6e-6ee3c0d22af9","format":{"provider":"parquet","options":{}},"schemaString":"{\"type\":\"struct\",\"fields\":[{\"name\":\"id\",\"type\":\"integer\",\"nullable\":true,\"metadata\":{}},{\"name\":\"val\",\"type\":\"string\",\"nullable\":true,\"metadata\":{}}]}","partitionColumns":[],"configuration":{},"createdTime":1587968585495}}"#;

pub enum TestAction {
    Add(String),
    /// An add carrying a deletion vector with the given inline payload
    AddWithDv(String, String),
    Remove(String),
    /// commitInfo, protocol (1, 2) and metadata
    Metadata,
    Protocol {
        reader: i32,
        writer: i32,
        reader_features: Vec<&'static str>,
    },
    /// metadata with the given configuration
    MetadataWithConfig(Vec<(&'static str, &'static str)>),
    Txn(String, i64),
    CommitInfo(i64),
}

/// Convert a vector of actions into a newline delimited json string
pub fn actions_to_string(actions: Vec<TestAction>) -> String {
    actions
            .into_iter()
            .map(|test_action| match test_action {
                TestAction::Add(path) => format!(r#"{{"add":{{"path":"{path}","partitionValues":{{}},"size":262,"modificationTime":1587968586000,"dataChange":true, "stats":"{{\"numRecords\":20,\"nullCount\":{{\"id\":0}},\"minValues\":{{\"id\": 1}},\"maxValues\":{{\"id\":20}}}}"}}}}"#),
                TestAction::AddWithDv(path, dv) => format!(r#"{{"add":{{"path":"{path}","partitionValues":{{}},"size":262,"modificationTime":1587968586000,"dataChange":true,"deletionVector":{{"storageType":"i","pathOrInlineDv":"{dv}","sizeInBytes":20,"cardinality":1}}}}}}"#),
                TestAction::Remove(path) => format!(r#"{{"remove":{{"path":"{path}","partitionValues":{{}},"size":262,"deletionTimestamp":1587968596000,"dataChange":true}}}}"#),
                TestAction::Metadata => METADATA.into(),
                TestAction::Protocol { reader, writer, reader_features } => {
                    let features = reader_features.iter().map(|f| format!("\"{f}\"")).join(",");
                    format!(r#"{{"protocol":{{"minReaderVersion":{reader},"minWriterVersion":{writer},"readerFeatures":[{features}],"writerFeatures":[{features}]}}}}"#)
                }
                TestAction::MetadataWithConfig(config) => {
                    let config = config.iter().map(|(k, v)| format!("\"{k}\":\"{v}\"")).join(",");
                    format!(r#"{{"metaData":{{"id":"5fba94ed-9794-4965-ba6e-6ee3c0d22af9","format":{{"provider":"parquet","options":{{}}}},"schemaString":"{{\"type\":\"struct\",\"fields\":[]}}","partitionColumns":[],"configuration":{{{config}}},"createdTime":1587968585495}}}}"#)
                }
                TestAction::Txn(app_id, version) => format!(r#"{{"txn":{{"appId":"{app_id}","version":{version},"lastUpdated":1587968586000}}}}"#),
                TestAction::CommitInfo(timestamp) => format!(r#"{{"commitInfo":{{"timestamp":{timestamp},"operation":"WRITE"}}}}"#),
            })
            .join("\n")
}

/// get an ObjectStore path for a delta file, based on the version
pub fn delta_path_for_version(version: u64, suffix: &str) -> Path {
    let path = format!("_delta_log/{version:020}.{suffix}");
    Path::from(path.as_str())
}

/// get an ObjectStore path for a checkpoint file, based on version, part number, and total number
/// of parts
pub fn delta_path_for_multipart_checkpoint(version: u64, part_num: u32, num_parts: u32) -> Path {
    let path =
        format!("_delta_log/{version:020}.checkpoint.{part_num:010}.{num_parts:010}.parquet");
    Path::from(path.as_str())
}

/// put a commit file into the specified object store.
pub async fn add_commit(
    store: &dyn ObjectStore,
    version: u64,
    data: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = delta_path_for_version(version, "json");
    store.put(&path, data.into()).await?;
    Ok(())
}

/// put a single part parquet checkpoint holding `rows` into the specified object store.
pub async fn add_checkpoint(
    store: &dyn ObjectStore,
    version: u64,
    rows: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let path = delta_path_for_version(version, "checkpoint.parquet");
    store.put(&path, checkpoint_to_parquet_bytes(rows).into()).await?;
    Ok(())
}

/// put a multi-part parquet checkpoint into the specified object store, one part per entry of
/// `parts`.
pub async fn add_multipart_checkpoint(
    store: &dyn ObjectStore,
    version: u64,
    parts: &[&[&str]],
) -> Result<(), Box<dyn std::error::Error>> {
    let num_parts = parts.len() as u32;
    for (part_num, rows) in (1..).zip(parts) {
        let path = delta_path_for_multipart_checkpoint(version, part_num, num_parts);
        store.put(&path, checkpoint_to_parquet_bytes(rows).into()).await?;
    }
    Ok(())
}

/// put a V2 checkpoint named `{version}.checkpoint.{id}.{extension}` into the specified object
/// store, where `extension` is `json` or `parquet`. A `checkpointMetadata` row is written before
/// `rows`.
pub async fn add_v2_checkpoint(
    store: &dyn ObjectStore,
    version: u64,
    id: &str,
    extension: &str,
    rows: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let checkpoint_metadata = format!(r#"{{"checkpointMetadata":{{"version":{version}}}}}"#);
    let rows = std::iter::once(checkpoint_metadata.as_str())
        .chain(rows.iter().copied())
        .collect_vec();
    let data = match extension {
        "json" => Bytes::from(rows.join("\n")),
        "parquet" => checkpoint_to_parquet_bytes(&rows),
        other => return Err(format!("unknown checkpoint extension {other}").into()),
    };
    let path = delta_path_for_version(version, &format!("checkpoint.{id}.{extension}"));
    store.put(&path, data.into()).await?;
    Ok(())
}

fn string_map() -> DataType {
    let entries = Field::new(
        "key_value",
        DataType::Struct(Fields::from(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new("value", DataType::Utf8, true),
        ])),
        false,
    );
    DataType::Map(Arc::new(entries), false)
}

fn string_list() -> DataType {
    DataType::List(Arc::new(Field::new("element", DataType::Utf8, true)))
}

fn nullable_struct(name: &str, fields: Vec<Field>) -> Field {
    Field::new(name, DataType::Struct(Fields::from(fields)), true)
}

fn deletion_vector() -> Field {
    nullable_struct(
        "deletionVector",
        vec![
            Field::new("storageType", DataType::Utf8, true),
            Field::new("pathOrInlineDv", DataType::Utf8, true),
            Field::new("offset", DataType::Int32, true),
            Field::new("sizeInBytes", DataType::Int32, true),
            Field::new("cardinality", DataType::Int64, true),
        ],
    )
}

/// The arrow schema of a checkpoint. Every column is nullable so that each row only populates
/// the action it holds. `checkpointMetadata` is only populated in V2 checkpoints.
pub static CHECKPOINT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        nullable_struct(
            "txn",
            vec![
                Field::new("appId", DataType::Utf8, true),
                Field::new("version", DataType::Int64, true),
                Field::new("lastUpdated", DataType::Int64, true),
            ],
        ),
        nullable_struct(
            "add",
            vec![
                Field::new("path", DataType::Utf8, true),
                Field::new("partitionValues", string_map(), true),
                Field::new("size", DataType::Int64, true),
                Field::new("modificationTime", DataType::Int64, true),
                Field::new("dataChange", DataType::Boolean, true),
                Field::new("stats", DataType::Utf8, true),
                Field::new("tags", string_map(), true),
                deletion_vector(),
                Field::new("baseRowId", DataType::Int64, true),
                Field::new("defaultRowCommitVersion", DataType::Int64, true),
            ],
        ),
        nullable_struct(
            "remove",
            vec![
                Field::new("path", DataType::Utf8, true),
                Field::new("deletionTimestamp", DataType::Int64, true),
                Field::new("dataChange", DataType::Boolean, true),
                Field::new("extendedFileMetadata", DataType::Boolean, true),
                Field::new("partitionValues", string_map(), true),
                Field::new("size", DataType::Int64, true),
                deletion_vector(),
            ],
        ),
        nullable_struct(
            "metaData",
            vec![
                Field::new("id", DataType::Utf8, true),
                Field::new("name", DataType::Utf8, true),
                Field::new("description", DataType::Utf8, true),
                nullable_struct(
                    "format",
                    vec![
                        Field::new("provider", DataType::Utf8, true),
                        Field::new("options", string_map(), true),
                    ],
                ),
                Field::new("schemaString", DataType::Utf8, true),
                Field::new("partitionColumns", string_list(), true),
                Field::new("configuration", string_map(), true),
                Field::new("createdTime", DataType::Int64, true),
            ],
        ),
        nullable_struct(
            "protocol",
            vec![
                Field::new("minReaderVersion", DataType::Int32, true),
                Field::new("minWriterVersion", DataType::Int32, true),
                Field::new("readerFeatures", string_list(), true),
                Field::new("writerFeatures", string_list(), true),
            ],
        ),
        nullable_struct(
            "checkpointMetadata",
            vec![Field::new("version", DataType::Int64, true)],
        ),
    ]))
});

/// Write newline delimited action rows, as they would appear in a commit file, into a parquet
/// checkpoint using [`CHECKPOINT_SCHEMA`].
pub fn checkpoint_to_parquet_bytes(rows: &[&str]) -> Bytes {
    let ndjson = rows.join("\n");
    let reader = ReaderBuilder::new(CHECKPOINT_SCHEMA.clone())
        .build(Cursor::new(ndjson.into_bytes()))
        .expect("build json reader");
    let batches = reader
        .collect::<Result<Vec<RecordBatch>, _>>()
        .expect("decode checkpoint rows");
    Bytes::from(record_batches_to_bytes(CHECKPOINT_SCHEMA.clone(), &batches))
}

/// convert RecordBatches into a vector of parquet bytes. We can't use `From` since these are
/// both foreign types
pub fn record_batches_to_bytes(schema: SchemaRef, batches: &[RecordBatch]) -> Vec<u8> {
    let mut data: Vec<u8> = Vec::new();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut data, schema, Some(props)).unwrap();
    for batch in batches {
        writer.write(batch).expect("Writing batch");
    }
    // writer must be closed to write footer
    writer.close().unwrap();
    data
}

/// Wraps a [`StorageHandler`] and counts how often each file is read.
pub struct CountingStorage {
    inner: Arc<dyn StorageHandler>,
    reads: Mutex<HashMap<String, usize>>,
}

impl CountingStorage {
    pub fn new(inner: Arc<dyn StorageHandler>) -> Self {
        Self {
            inner,
            reads: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the files read so far, sorted, one entry per read
    pub fn reads(&self) -> Vec<String> {
        let reads = self.reads.lock().unwrap();
        reads
            .iter()
            .flat_map(|(name, count)| std::iter::repeat(name.clone()).take(*count))
            .sorted()
            .collect()
    }

    /// Number of reads of files whose name ends with `suffix`
    pub fn reads_ending_with(&self, suffix: &str) -> usize {
        self.reads().iter().filter(|name| name.ends_with(suffix)).count()
    }

    pub fn reset(&self) {
        self.reads.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl StorageHandler for CountingStorage {
    async fn list_from(&self, path: &Url) -> DeltaResult<BoxStream<'_, DeltaResult<FileMeta>>> {
        self.inner.list_from(path).await
    }

    async fn read_file(&self, path: &Url) -> DeltaResult<Bytes> {
        let name = path.path_segments().and_then(|s| s.last()).unwrap_or_default();
        *self
            .reads
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default() += 1;
        self.inner.read_file(path).await
    }

    async fn open_read(&self, path: &Url) -> DeltaResult<BoxStream<'static, DeltaResult<Bytes>>> {
        self.inner.open_read(path).await
    }

    async fn exists(&self, path: &Url) -> DeltaResult<bool> {
        self.inner.exists(path).await
    }
}

/// We implement abs_diff here so we don't have to bump our msrv.
/// TODO: Remove and use std version when msrv >= 1.81.0
pub fn abs_diff(self_dur: std::time::Duration, other: std::time::Duration) -> std::time::Duration {
    if let Some(res) = self_dur.checked_sub(other) {
        res
    } else {
        other.checked_sub(self_dur).unwrap()
    }
}
