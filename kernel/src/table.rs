//! In-memory representation of a Delta table, which acts as the root entity for reading the
//! different versions of the table located in storage.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::commit::{read_log_segment, Commit};
use crate::log_segment::LogSegment;
use crate::path::ensure_directory;
use crate::snapshot::{Snapshot, SnapshotHint, SnapshotHintCache};
use crate::state::{DataFile, TableState};
use crate::{DeltaResult, Engine, Error, TableOptions, Version};

/// An open Delta table.
///
/// A `Table` keeps the newest [`SnapshotHint`] it has seen, so that loading consecutive versions
/// only reads the commits in between. The commit history is read at most once per `Table`.
pub struct Table {
    location: Url,
    engine: Arc<dyn Engine>,
    options: TableOptions,
    hints: SnapshotHintCache,
    history: OnceCell<Vec<Commit>>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("Table")
            .field("location", &self.location)
            .field("options", &self.options)
            .field("hint_version", &self.hints.load().map(|h| h.version))
            .finish()
    }
}

impl Table {
    /// Open the table rooted at `location`. Nothing is read until a version is requested.
    pub fn open(engine: Arc<dyn Engine>, location: Url) -> Self {
        Self {
            location: ensure_directory(location),
            engine,
            options: TableOptions::default(),
            hints: SnapshotHintCache::new(),
            history: OnceCell::new(),
        }
    }

    /// Open a table from a url, or from a local path that exists.
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use delta_log_reader::engine::default::DefaultEngine;
    /// # use delta_log_reader::{DeltaResult, Table};
    /// # fn open(engine: Arc<DefaultEngine>) -> DeltaResult<Table> {
    /// let table = Table::try_from_uri("./tests/data/table-with-dv-small", engine)?;
    /// # Ok(table)
    /// # }
    /// ```
    pub fn try_from_uri(uri: impl AsRef<str>, engine: Arc<dyn Engine>) -> DeltaResult<Self> {
        let uri = uri.as_ref();
        let location = match Url::parse(uri) {
            // single letter schemes are windows drive letters
            Ok(url) if url.scheme().len() > 1 => url,
            _ => {
                let path = std::fs::canonicalize(uri)?;
                Url::from_directory_path(&path).map_err(|_| {
                    Error::generic(format!("Could not build a url from {}", path.display()))
                })?
            }
        };
        Ok(Self::open(engine, location))
    }

    /// Replace the options used to read the log.
    pub fn with_options(mut self, options: TableOptions) -> Self {
        self.options = options;
        self
    }

    /// Fully qualified location of the Delta table, always ending in `/`.
    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// The newest snapshot hint this table has cached, if any
    pub fn hint(&self) -> Option<Arc<SnapshotHint>> {
        self.hints.load()
    }

    /// Create a [`Snapshot`] of the table corresponding to `version`.
    ///
    /// If no version is supplied, a snapshot for the latest version will be created.
    pub async fn snapshot(&self, version: Option<Version>) -> DeltaResult<Snapshot> {
        let hint = self.hints.load();
        let snapshot = Snapshot::try_new(
            self.engine.as_ref(),
            self.location.clone(),
            &self.options,
            version,
            hint.as_deref(),
        )
        .await?;
        self.hints.advance(snapshot.hint());
        Ok(snapshot)
    }

    async fn latest_segment(&self) -> DeltaResult<LogSegment> {
        LogSegment::for_snapshot(self.engine.as_ref(), &self.location, &self.options, None).await
    }

    /// The versions needed to read the latest state: the checkpoint version, if any, followed by
    /// every later commit version.
    pub async fn list_versions(&self) -> DeltaResult<Vec<Version>> {
        Ok(self.latest_segment().await?.versions())
    }

    /// The latest version of the table
    pub async fn current_version(&self) -> DeltaResult<Version> {
        Ok(self.latest_segment().await?.end_version)
    }

    /// The complete state of the table at `version`, or at the latest version.
    pub async fn state(&self, version: Option<Version>) -> DeltaResult<TableState> {
        let snapshot = self.snapshot(version).await?;
        TableState::try_new(self.engine.as_ref(), &snapshot).await
    }

    /// The active data files at `version`, or at the latest version, sorted by path.
    pub async fn active_files(&self, version: Option<Version>) -> DeltaResult<Vec<DataFile>> {
        Ok(self.state(version).await?.into_files())
    }

    /// The commits needed to read the latest version: the consolidated checkpoint, if any,
    /// followed by every later commit. Read once, then served from memory.
    pub async fn history(&self) -> DeltaResult<&[Commit]> {
        let history = self
            .history
            .get_or_try_init(|| async {
                let segment = self.latest_segment().await?;
                debug!(version = segment.end_version, "reading commit history");
                read_log_segment(self.engine.as_ref(), &segment).await
            })
            .await?;
        Ok(history)
    }

    /// Resolve the location of a data file. Relative paths are resolved against the table root.
    pub fn data_file_url(&self, file: &DataFile) -> DeltaResult<Url> {
        match Url::parse(&file.path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(self.location.join(&file.path)?),
            Err(err) => Err(err.into()),
        }
    }

    /// Open the content of a data file as a stream of bytes.
    pub async fn open_file_stream(
        &self,
        file: &DataFile,
    ) -> DeltaResult<BoxStream<'static, DeltaResult<Bytes>>> {
        let url = self.data_file_url(file)?;
        self.engine.get_storage_handler().open_read(&url).await
    }
}

#[cfg(all(test, feature = "default-engine"))]
mod tests {
    use std::collections::HashMap;

    use object_store::memory::InMemory;

    use super::*;
    use crate::engine::default::DefaultEngine;

    fn data_file(path: &str) -> DataFile {
        DataFile {
            path: path.to_string(),
            size: 1,
            partition_values: HashMap::new(),
            modification_time: 0,
            deletion_vector_id: None,
            data_change: true,
            stats: None,
            tags: HashMap::new(),
        }
    }

    fn memory_table(location: &str) -> Table {
        let engine = Arc::new(DefaultEngine::new(Arc::new(InMemory::new())));
        Table::open(engine, Url::parse(location).unwrap())
    }

    #[test]
    fn test_location_is_a_directory() {
        let table = memory_table("memory:///tables/t1");
        assert_eq!(table.location().as_str(), "memory:///tables/t1/");
    }

    #[test]
    fn test_try_from_uri() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(DefaultEngine::new(Arc::new(InMemory::new())));

        let table = Table::try_from_uri(dir.path().to_str().unwrap(), engine.clone()).unwrap();
        assert_eq!(table.location().scheme(), "file");
        assert!(table.location().path().ends_with('/'));

        let table = Table::try_from_uri("s3://bucket/table", engine.clone()).unwrap();
        assert_eq!(table.location().as_str(), "s3://bucket/table/");

        assert!(Table::try_from_uri("./does/not/exist", engine).is_err());
    }

    #[test]
    fn test_data_file_url() {
        let table = memory_table("memory:///tables/t1/");
        assert_eq!(
            table.data_file_url(&data_file("part-0.parquet")).unwrap().as_str(),
            "memory:///tables/t1/part-0.parquet"
        );
        assert_eq!(
            table
                .data_file_url(&data_file("date=2024-01-01/part%201.parquet"))
                .unwrap()
                .as_str(),
            "memory:///tables/t1/date=2024-01-01/part%201.parquet"
        );
        assert_eq!(
            table
                .data_file_url(&data_file("s3://other/part-0.parquet"))
                .unwrap()
                .as_str(),
            "s3://other/part-0.parquet"
        );
    }

    #[tokio::test]
    async fn test_empty_table_is_not_found() {
        let table = memory_table("memory:///");
        let table = table.with_options(
            TableOptions::default().with_last_checkpoint_retry_delay(std::time::Duration::ZERO),
        );
        let err = table.current_version().await.unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)), "{err}");
        assert!(table.hint().is_none());
    }
}
