//! Branch state reads.

use std::sync::Arc;

use tracing::warn;

use crate::change::{BranchTip, PublishTarget};
use crate::error::RemoteResult;
use crate::remote::GitRemote;

/// Placeholder substituted when a document read returns an item descriptor
/// instead of file text (the content negotiation fallback below).
pub const METADATA_PLACEHOLDER: &str = "# [object Object]";

/// Reads branch tips and current document content.
pub struct BranchReader {
    remote: Arc<dyn GitRemote>,
}

impl BranchReader {
    pub fn new(remote: Arc<dyn GitRemote>) -> Self {
        Self { remote }
    }

    /// Current head commit of the target branch.
    pub async fn read_tip(&self, target: &PublishTarget) -> RemoteResult<BranchTip> {
        self.remote
            .branch_tip(target.repository_id(), target.branch())
            .await
    }

    /// Current document content, or `None` when the file does not exist yet
    /// (first-time creation).
    ///
    /// The items endpoint occasionally answers with a JSON item descriptor
    /// even when raw text was requested. Writing that descriptor back would
    /// corrupt the document, so it is replaced with a one-line placeholder.
    pub async fn read_document(&self, target: &PublishTarget) -> RemoteResult<Option<String>> {
        let Some(content) = self
            .remote
            .file_content(target.repository_id(), target.wire_path())
            .await?
        else {
            return Ok(None);
        };

        if content.trim_start().starts_with('{') {
            warn!(
                path = target.path(),
                "document read returned item metadata instead of text; substituting placeholder"
            );
            return Ok(Some(METADATA_PLACEHOLDER.to_string()));
        }

        Ok(Some(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRemote;

    fn target() -> PublishTarget {
        PublishTarget::new("repo-1", "master", "azure-pipelines.yml")
    }

    #[tokio::test]
    async fn test_read_tip_resolves_head() {
        let remote = Arc::new(ScriptedRemote::new("master", "tip-0"));
        let reader = BranchReader::new(remote);

        let tip = reader.read_tip(&target()).await.unwrap();
        assert_eq!(tip.commit_id, "tip-0");
    }

    #[tokio::test]
    async fn test_read_tip_unknown_branch() {
        let remote = Arc::new(ScriptedRemote::new("master", "tip-0"));
        let reader = BranchReader::new(remote);

        let missing = PublishTarget::new("repo-1", "develop", "azure-pipelines.yml");
        let err = reader.read_tip(&missing).await.unwrap_err();
        assert!(matches!(err, crate::RemoteError::BranchNotFound(_)));
    }

    #[tokio::test]
    async fn test_read_document_missing_file_is_none() {
        let remote = Arc::new(ScriptedRemote::new("master", "tip-0"));
        let reader = BranchReader::new(remote);

        assert_eq!(reader.read_document(&target()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_document_returns_text() {
        let remote = Arc::new(
            ScriptedRemote::new("master", "tip-0")
                .with_document("azure-pipelines.yml", "steps: []"),
        );
        let reader = BranchReader::new(remote);

        let text = reader.read_document(&target()).await.unwrap();
        assert_eq!(text.as_deref(), Some("steps: []"));
    }

    #[tokio::test]
    async fn test_read_document_substitutes_metadata_leak() {
        let remote = Arc::new(
            ScriptedRemote::new("master", "tip-0")
                .with_document("azure-pipelines.yml", "{\"objectId\": \"abc\", \"path\": \"/f\"}"),
        );
        let reader = BranchReader::new(remote);

        let text = reader.read_document(&target()).await.unwrap();
        assert_eq!(text.as_deref(), Some(METADATA_PLACEHOLDER));
    }
}
