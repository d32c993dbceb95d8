use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use object_store::{memory::InMemory, path::Path, ObjectStore};
use url::Url;

use crate::checkpoint::LastCheckpointHint;
use crate::coordinator::{CommitCoordinatorClient, UnbackfilledCommit};
use crate::engine::default::DefaultEngine;
use crate::log_segment::{LogSegment, LogSegmentBuilder};
use crate::{DeltaResult, Engine, Error, FileMeta, TableOptions, Version};
use test_utils::{delta_path_for_multipart_checkpoint, delta_path_for_version};

fn hint(version: Version, parts: Option<u32>) -> LastCheckpointHint {
    LastCheckpointHint {
        version,
        size: 10,
        parts,
        size_in_bytes: None,
        num_of_add_files: None,
        checksum: None,
    }
}

fn options() -> TableOptions {
    TableOptions::default().with_last_checkpoint_retry_delay(Duration::ZERO)
}

// Utility method to build a log using a list of log paths and an optional checkpoint hint. The
// hint is written to `_delta_log/_last_checkpoint`.
async fn build_log_with_paths_and_checkpoint(
    paths: &[Path],
    checkpoint_hint: Option<&LastCheckpointHint>,
) -> (DefaultEngine, Url) {
    let store = Arc::new(InMemory::new());

    // the builder never reads log files, so their content does not matter
    let data = bytes::Bytes::from("log-data");
    for path in paths {
        store
            .put(path, data.clone().into())
            .await
            .expect("put log file in store");
    }
    if let Some(checkpoint_hint) = checkpoint_hint {
        let checkpoint_str = serde_json::to_string(checkpoint_hint).expect("Serialize checkpoint");
        store
            .put(
                &Path::from("_delta_log/_last_checkpoint"),
                checkpoint_str.into(),
            )
            .await
            .expect("Write _last_checkpoint");
    }

    let table_root = Url::parse("memory:///").expect("valid url");
    (DefaultEngine::new(store), table_root)
}

fn versions(log_segment: &LogSegment) -> (Option<Version>, Vec<Version>) {
    (
        log_segment.checkpoint_version(),
        log_segment.commit_files.iter().map(|f| f.version).collect_vec(),
    )
}

#[tokio::test]
async fn build_snapshot_with_out_of_date_last_checkpoint() {
    let checkpoint_hint = hint(3, None);
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(4, "json"),
            delta_path_for_version(5, "checkpoint.parquet"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();

    assert_eq!(log_segment.checkpoint_parts.len(), 1);
    assert_eq!(versions(&log_segment), (Some(5), vec![6, 7]));
    assert_eq!(log_segment.end_version, 7);
}

#[tokio::test]
async fn build_snapshot_with_correct_last_multipart_checkpoint() {
    let checkpoint_hint = hint(5, Some(3));
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_multipart_checkpoint(5, 1, 3),
            delta_path_for_multipart_checkpoint(5, 2, 3),
            delta_path_for_multipart_checkpoint(5, 3, 3),
            delta_path_for_version(5, "json"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();

    assert_eq!(log_segment.checkpoint_parts.len(), 3);
    assert_eq!(versions(&log_segment), (Some(5), vec![6, 7]));
    let part_names = log_segment
        .checkpoint_parts
        .iter()
        .map(|p| p.filename.as_str())
        .collect_vec();
    assert_eq!(
        part_names,
        [
            "00000000000000000005.checkpoint.0000000001.0000000003.parquet",
            "00000000000000000005.checkpoint.0000000002.0000000003.parquet",
            "00000000000000000005.checkpoint.0000000003.0000000003.parquet",
        ]
    );
}

#[tokio::test]
async fn build_snapshot_with_missing_checkpoint_part_from_hint_falls_back() {
    let checkpoint_hint = hint(5, Some(3));
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_multipart_checkpoint(5, 1, 3),
            // Part 2 is missing!
            delta_path_for_multipart_checkpoint(5, 3, 3),
            delta_path_for_version(5, "json"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();

    // the incomplete checkpoint at 5 is never selected, the classic one at 3 is
    assert_eq!(versions(&log_segment), (Some(3), vec![4, 5, 6, 7]));
}

#[tokio::test]
async fn build_snapshot_with_bad_checkpoint_hint_parts() {
    // the hint claims a single part, the listing shows a complete two part checkpoint
    let checkpoint_hint = hint(5, Some(1));
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_multipart_checkpoint(5, 1, 2),
            delta_path_for_multipart_checkpoint(5, 2, 2),
            delta_path_for_version(5, "json"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();

    assert_eq!(log_segment.checkpoint_parts.len(), 2);
    assert_eq!(versions(&log_segment), (Some(5), vec![6, 7]));
}

#[tokio::test]
async fn build_snapshot_with_missing_checkpoint_part_no_hint() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_multipart_checkpoint(5, 1, 3),
            // Part 2 is missing!
            delta_path_for_multipart_checkpoint(5, 3, 3),
            delta_path_for_version(5, "json"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        None,
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();

    assert_eq!(versions(&log_segment), (Some(3), vec![4, 5, 6, 7]));
}

#[tokio::test]
async fn build_snapshot_without_checkpoints() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..8).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, (0..8).collect_vec()));
    assert_eq!(log_segment.versions(), (0..8).collect_vec());

    // time travel
    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(2))
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, vec![0, 1, 2]));
    assert_eq!(log_segment.end_version, 2);
}

#[tokio::test]
async fn build_snapshot_with_checkpoint_greater_than_time_travel_version() {
    let checkpoint_hint = hint(5, None);
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_version(5, "checkpoint.parquet"),
            delta_path_for_version(5, "json"),
            delta_path_for_version(6, "json"),
            delta_path_for_version(7, "json"),
        ],
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(4))
        .await
        .unwrap();

    assert_eq!(versions(&log_segment), (Some(3), vec![4]));
    assert_eq!(log_segment.end_version, 4);
}

#[tokio::test]
async fn build_snapshot_with_start_checkpoint_and_time_travel_version() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "checkpoint.parquet"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "checkpoint.parquet"),
            delta_path_for_version(3, "json"),
            delta_path_for_version(4, "json"),
            delta_path_for_version(5, "json"),
        ],
        None,
    )
    .await;

    let storage = engine.get_storage_handler();
    let log_segment = LogSegmentBuilder::new(storage.as_ref(), &table_root)
        .with_start_checkpoint(1)
        .with_end_version(3)
        .build()
        .await
        .unwrap();

    assert_eq!(versions(&log_segment), (Some(3), vec![]));
    assert_eq!(log_segment.end_version, 3);
    assert_eq!(log_segment.versions(), vec![3]);
}

#[tokio::test]
async fn build_snapshot_with_hint_beyond_the_log() {
    // e.g. the table directory was recreated and the hint survived
    let checkpoint_hint = hint(10, None);
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..4).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        Some(&checkpoint_hint),
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, vec![0, 1, 2, 3]));
}

#[tokio::test]
async fn test_non_contiguous_log() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(4, "json"),
        ],
        None,
    )
    .await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_table());
    assert!(
        matches!(&err, Error::InvalidTable(msg) if msg == "missing log file for version 3"),
        "{err}"
    );
}

#[tokio::test]
async fn test_gap_after_checkpoint() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(2, "checkpoint.parquet"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(4, "json"),
        ],
        None,
    )
    .await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::InvalidTable(msg) if msg.contains("version 3")));
}

#[tokio::test]
async fn test_version_not_found() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..3).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(5))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::VersionNotFound {
                requested: 5,
                latest: 2
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn test_version_before_the_oldest_checkpoint() {
    // versions 0 and 1 were cleaned up, 1 can no longer be reconstructed
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(2, "checkpoint.parquet"),
            delta_path_for_version(2, "json"),
            delta_path_for_version(3, "json"),
        ],
        None,
    )
    .await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(1))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::VersionNotFound {
                requested: 1,
                latest: 3
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn test_table_not_found() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(&[], None).await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableNotFound(_)), "{err}");

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(3))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TableNotFound(_)), "{err}");
}

#[tokio::test]
async fn test_zero_byte_checkpoint_is_ignored() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..4).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;
    engine
        .get_object_store()
        .put(
            &delta_path_for_version(2, "checkpoint.parquet"),
            bytes::Bytes::new().into(),
        )
        .await
        .unwrap();

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, vec![0, 1, 2, 3]));
}

#[tokio::test]
async fn test_list_files_with_unusual_patterns() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(0, "crc"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(1, "checkpoint.3a0d65cd-4056-49b8-937b-95f9e3ee90e5.parquet"),
            delta_path_for_version(2, "json"),
            Path::from("_delta_log/_commits/00000000000000000003.1e6b9f7d.json"),
        ],
        None,
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    // the v2 checkpoint is selected, the checksum file and the nested commit are skipped
    assert_eq!(versions(&log_segment), (Some(1), vec![2]));
    assert_eq!(
        log_segment.checkpoint_parts[0].filename,
        "00000000000000000001.checkpoint.3a0d65cd-4056-49b8-937b-95f9e3ee90e5.parquet"
    );
}

#[tokio::test]
async fn test_unrecognized_log_file() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &[
            delta_path_for_version(0, "json"),
            delta_path_for_version(1, "json"),
            delta_path_for_version(1, "json.tmp"),
        ],
        None,
    )
    .await;

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, Error::UnrecognizedLogFile(name) if name == "00000000000000000001.json.tmp"),
        "{err}"
    );
}

#[tokio::test]
async fn test_last_commit_timestamp() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..3).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    let newest = log_segment.commit_files.last().unwrap();
    assert_eq!(log_segment.last_commit_timestamp, newest.location.last_modified);
    assert!(log_segment.last_commit_timestamp > 0);
}

struct StaticCoordinator(Vec<UnbackfilledCommit>);

#[async_trait::async_trait]
impl CommitCoordinatorClient for StaticCoordinator {
    async fn list_unbackfilled_commits(
        &self,
        _table_root: &Url,
        _start_version: Version,
        _end_version: Option<Version>,
    ) -> DeltaResult<Vec<UnbackfilledCommit>> {
        Ok(self.0.clone())
    }
}

fn unbackfilled(version: Version, location: &str) -> UnbackfilledCommit {
    UnbackfilledCommit {
        version,
        file: FileMeta::new(Url::parse(location).unwrap(), 0, 8),
    }
}

#[tokio::test]
async fn test_coordinator_commits_are_merged() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..3).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;
    let coordinator = StaticCoordinator(vec![
        unbackfilled(2, "memory:///_delta_log/_commits/00000000000000000002.7c3f.json"),
        unbackfilled(3, "memory:///_delta_log/_commits/00000000000000000003.91ab.json"),
    ]);
    let engine = engine.with_commit_coordinator(Arc::new(coordinator));

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, vec![0, 1, 2, 3]));
    // the coordinator's entry wins over the listed one
    assert_eq!(
        log_segment.commit_files[2].filename,
        "00000000000000000002.7c3f.json"
    );

    // coordinator commits beyond the end version are dropped
    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), Some(2))
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, vec![0, 1, 2]));
}

#[tokio::test]
async fn test_coordinator_gap_is_invalid() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..2).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;
    let coordinator = StaticCoordinator(vec![unbackfilled(
        3,
        "memory:///_delta_log/_commits/00000000000000000003.91ab.json",
    )]);
    let engine = engine.with_commit_coordinator(Arc::new(coordinator));

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(matches!(&err, Error::InvalidTable(msg) if msg.contains("version 2")));
}

/// Backfills `backfilled` into the log when asked, then reports only the commits after it.
struct BackfillingCoordinator {
    store: Arc<InMemory>,
    backfilled: Version,
    asked_from: std::sync::Mutex<Vec<Version>>,
}

#[async_trait::async_trait]
impl CommitCoordinatorClient for BackfillingCoordinator {
    async fn list_unbackfilled_commits(
        &self,
        _table_root: &Url,
        start_version: Version,
        _end_version: Option<Version>,
    ) -> DeltaResult<Vec<UnbackfilledCommit>> {
        self.asked_from.lock().unwrap().push(start_version);
        self.store
            .put(
                &delta_path_for_version(self.backfilled, "json"),
                bytes::Bytes::from("log-data").into(),
            )
            .await?;
        let next = self.backfilled + 1;
        Ok(vec![unbackfilled(
            next,
            &format!("memory:///_delta_log/_commits/{next:020}.5d2e.json"),
        )])
    }
}

#[tokio::test]
async fn test_commit_backfilled_while_building_is_found() {
    let store = Arc::new(InMemory::new());
    for path in (0..6).map(|v| delta_path_for_version(v, "json")) {
        store.put(&path, bytes::Bytes::from("log-data").into()).await.unwrap();
    }
    let coordinator = Arc::new(BackfillingCoordinator {
        store: store.clone(),
        backfilled: 6,
        asked_from: Default::default(),
    });
    let engine = DefaultEngine::new(store).with_commit_coordinator(coordinator.clone());
    let table_root = Url::parse("memory:///").unwrap();

    let log_segment = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap();
    assert_eq!(versions(&log_segment), (None, (0..8).collect_vec()));
    assert_eq!(
        log_segment.commit_files[6].filename,
        "00000000000000000006.json"
    );
    assert_eq!(*coordinator.asked_from.lock().unwrap(), vec![0]);
}

#[tokio::test]
async fn test_files_outside_the_log_are_rejected() {
    let (engine, table_root) = build_log_with_paths_and_checkpoint(
        &(0..2).map(|v| delta_path_for_version(v, "json")).collect_vec(),
        None,
    )
    .await;
    let coordinator = StaticCoordinator(vec![unbackfilled(
        2,
        "memory:///elsewhere/00000000000000000002.json",
    )]);
    let engine = engine.with_commit_coordinator(Arc::new(coordinator));

    let err = LogSegment::for_snapshot(&engine, &table_root, &options(), None)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, Error::InvalidTable(msg) if msg.contains("doesn't belong in the transaction log")),
        "{err}"
    );
}
