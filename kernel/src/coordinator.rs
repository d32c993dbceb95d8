//! Commit coordinators.
//!
//! Tables with coordinated commits publish new versions through a coordinator first. Such a
//! commit is written under an arbitrary name and only later copied ("backfilled") to
//! `_delta_log/{version}.json`. Until then the coordinator is the only place the commit can be
//! discovered.

use url::Url;

use crate::{DeltaResult, FileMeta, Version};

/// A commit known to the coordinator that may not have been backfilled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbackfilledCommit {
    pub version: Version,
    /// Location of the commit file. Its content has the same layout as a regular commit.
    pub file: FileMeta,
}

#[async_trait::async_trait]
pub trait CommitCoordinatorClient: Send + Sync {
    /// List the commits of the table at `table_root` with `start_version <= version`, and
    /// `version <= end_version` when an end is given, in ascending version order. Commits that
    /// have already been backfilled may be returned too.
    async fn list_unbackfilled_commits(
        &self,
        table_root: &Url,
        start_version: Version,
        end_version: Option<Version>,
    ) -> DeltaResult<Vec<UnbackfilledCommit>>;
}
