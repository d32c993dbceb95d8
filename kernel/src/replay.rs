//! Resolution of the current protocol and metadata by replaying a log segment backwards

use tracing::{debug, instrument};

use crate::actions::{Action, Metadata, Protocol};
use crate::commit::{read_checkpoint, read_commit, Commit};
use crate::log_segment::LogSegment;
use crate::snapshot::SnapshotHint;
use crate::{DeltaResult, Engine, Error};

#[derive(Debug, Default)]
struct ProtocolMetadata {
    protocol: Option<Protocol>,
    metadata: Option<Metadata>,
}

impl ProtocolMetadata {
    /// Take the newest protocol and metadata of `commit` that are still missing.
    fn visit(&mut self, commit: Commit) {
        for action in commit.actions.into_iter().rev() {
            match action {
                Action::Protocol(p) if self.protocol.is_none() => self.protocol = Some(p),
                Action::Metadata(m) if self.metadata.is_none() => self.metadata = Some(m),
                _ => {}
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.protocol.is_some() && self.metadata.is_some()
    }
}

/// Find the newest protocol and metadata of the table at `segment.end_version`.
///
/// - A hint at exactly the segment version is returned as is.
/// - A hint one version behind the segment bounds the scan to the commits after it. Whatever those
///   commits do not change is taken from the hint.
/// - Otherwise commits are scanned newest to oldest, then the checkpoint, stopping as soon as both
///   are found.
#[instrument(
    name = "log.replay.pm",
    skip_all,
    fields(version = segment.end_version, hint = ?hint.map(|h| h.version)),
    err
)]
pub async fn resolve_protocol_metadata(
    engine: &dyn Engine,
    segment: &LogSegment,
    hint: Option<&SnapshotHint>,
) -> DeltaResult<(Protocol, Metadata)> {
    let version = segment.end_version;
    if let Some(hint) = hint.filter(|h| h.version == version) {
        debug!("using snapshot hint as is");
        return Ok((hint.protocol.clone(), hint.metadata.clone()));
    }

    let storage = engine.get_storage_handler();
    let mut found = ProtocolMetadata::default();

    let bounding_hint = hint.filter(|h| {
        h.version + 1 == version && segment.commits_after(h.version).next().is_some()
    });
    if let Some(hint) = bounding_hint {
        for file in segment.commits_after(hint.version).rev() {
            found.visit(read_commit(storage.as_ref(), file).await?);
        }
        debug!(
            protocol_changed = found.protocol.is_some(),
            metadata_changed = found.metadata.is_some(),
            "resolved from hint"
        );
        return Ok((
            found.protocol.unwrap_or_else(|| hint.protocol.clone()),
            found.metadata.unwrap_or_else(|| hint.metadata.clone()),
        ));
    }

    for file in segment.commit_files.iter().rev() {
        found.visit(read_commit(storage.as_ref(), file).await?);
        if found.is_complete() {
            break;
        }
    }
    if !found.is_complete() && !segment.checkpoint_parts.is_empty() {
        found.visit(read_checkpoint(engine, &segment.checkpoint_parts).await?);
    }

    match found {
        ProtocolMetadata {
            protocol: Some(protocol),
            metadata: Some(metadata),
        } => Ok((protocol, metadata)),
        ProtocolMetadata { protocol: None, .. } => Err(Error::MissingProtocol(version)),
        ProtocolMetadata { metadata: None, .. } => Err(Error::MissingMetadata(version)),
    }
}
