//! In-memory representation of snapshots of tables (snapshot is a table at given point in time, it
//! has protocol, metadata etc.)

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info};
use url::Url;

use crate::actions::{Metadata, Protocol};
use crate::log_segment::LogSegment;
use crate::replay::resolve_protocol_metadata;
use crate::table_features::{column_mapping_mode, validate_read_support, ColumnMappingMode};
use crate::table_properties::TableProperties;
use crate::{DeltaResult, Engine, TableOptions, Version};

/// The protocol and metadata of a table at a known version. Used to bound how far back later
/// resolutions have to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHint {
    pub version: Version,
    pub protocol: Protocol,
    pub metadata: Metadata,
}

/// The newest [`SnapshotHint`] seen for a table.
///
/// Updates are a lock-free max-by-version merge: a hint only ever replaces an older one, so
/// concurrent loads never move it backwards.
#[derive(Debug, Default)]
pub struct SnapshotHintCache(ArcSwapOption<SnapshotHint>);

impl SnapshotHintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<SnapshotHint>> {
        self.0.load_full()
    }

    /// Store `hint` if it is newer than the cached one. Returns true if the cache changed.
    pub fn advance(&self, hint: SnapshotHint) -> bool {
        let version = hint.version;
        let hint = Arc::new(hint);
        let previous = self.0.rcu(|current| match current {
            Some(current) if current.version >= version => Some(current.clone()),
            _ => Some(hint.clone()),
        });
        let advanced = previous.map_or(true, |previous| previous.version < version);
        if advanced {
            info!(version, "advanced snapshot hint");
        }
        advanced
    }
}

/// A table at one version: its protocol, its metadata, and the log segment they were read from.
pub struct Snapshot {
    table_root: Url,
    log_segment: LogSegment,
    protocol: Protocol,
    metadata: Metadata,
    table_properties: TableProperties,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("path", &self.log_segment.log_root.as_str())
            .field("version", &self.version())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Snapshot {
    /// Load the snapshot of the table at `table_root` at `version`, or at the latest version.
    ///
    /// `hint` is used to bound the protocol and metadata scan when it applies to the loaded
    /// version. Fails if the table needs reader features that are not supported.
    pub async fn try_new(
        engine: &dyn Engine,
        table_root: Url,
        options: &TableOptions,
        version: Option<Version>,
        hint: Option<&SnapshotHint>,
    ) -> DeltaResult<Self> {
        let log_segment = LogSegment::for_snapshot(engine, &table_root, options, version).await?;
        Self::try_new_from_log_segment(engine, table_root, log_segment, hint).await
    }

    pub(crate) async fn try_new_from_log_segment(
        engine: &dyn Engine,
        table_root: Url,
        log_segment: LogSegment,
        hint: Option<&SnapshotHint>,
    ) -> DeltaResult<Self> {
        let (protocol, metadata) = resolve_protocol_metadata(engine, &log_segment, hint).await?;
        validate_read_support(&protocol, &metadata)?;
        let table_properties = metadata.parse_table_properties();
        debug!(version = log_segment.end_version, "loaded snapshot");
        Ok(Self {
            table_root,
            log_segment,
            protocol,
            metadata,
            table_properties,
        })
    }

    /// Log segment this snapshot uses
    pub fn log_segment(&self) -> &LogSegment {
        &self.log_segment
    }

    pub fn table_root(&self) -> &Url {
        &self.table_root
    }

    /// Version of this `Snapshot` in the table.
    pub fn version(&self) -> Version {
        self.log_segment.end_version
    }

    /// Modification time of the newest log file, in milliseconds since the epoch
    pub fn last_commit_timestamp(&self) -> i64 {
        self.log_segment.last_commit_timestamp
    }

    /// Table [`Metadata`] at this `Snapshot`s version.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Table [`Protocol`] at this `Snapshot`s version.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Get the [`TableProperties`] for this [`Snapshot`].
    pub fn table_properties(&self) -> &TableProperties {
        &self.table_properties
    }

    /// Get the [`ColumnMappingMode`] for this [`Snapshot`].
    pub fn column_mapping_mode(&self) -> ColumnMappingMode {
        column_mapping_mode(&self.protocol, &self.table_properties)
    }

    /// The hint this snapshot yields for later loads
    pub fn hint(&self) -> SnapshotHint {
        SnapshotHint {
            version: self.version(),
            protocol: self.protocol.clone(),
            metadata: self.metadata.clone(),
        }
    }
}
