//! Remote Git seam.

use async_trait::async_trait;

use crate::change::{BranchTip, ChangeSet};
use crate::error::RemoteResult;

/// Version-controlled remote holding the pipeline documents.
///
/// Implemented by [`crate::AzureDevOpsClient`] for real use and by
/// [`crate::fakes::ScriptedRemote`] in tests. Push semantics must be
/// compare-and-swap on the base tip: a push whose `base` is no longer the
/// branch head fails with [`crate::RemoteError::Conflict`] and leaves the
/// branch untouched.
#[async_trait]
pub trait GitRemote: Send + Sync {
    /// Resolve a branch name to its current head commit.
    async fn branch_tip(&self, repository_id: &str, branch: &str) -> RemoteResult<BranchTip>;

    /// Fetch raw file content at the branch tip. `Ok(None)` when the file
    /// does not exist yet.
    async fn file_content(&self, repository_id: &str, path: &str) -> RemoteResult<Option<String>>;

    /// Submit one atomic single-commit edit. Returns the new branch tip.
    async fn push(&self, change: &ChangeSet) -> RemoteResult<BranchTip>;
}
