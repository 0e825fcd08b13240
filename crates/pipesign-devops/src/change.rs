//! Publish targets, branch tips and atomic change sets.

use serde::{Deserialize, Serialize};

/// One document in one repository branch.
///
/// Construct through [`PublishTarget::new`]; the path invariant (exactly one
/// leading slash internally, none on the wire) is established there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    repository_id: String,
    branch: String,
    path: String,
}

impl PublishTarget {
    /// Create a target. The branch name may be given with or without the
    /// `refs/heads/` prefix; the path is normalized to a single leading
    /// slash internally and stripped of it on the wire.
    pub fn new(
        repository_id: impl Into<String>,
        branch: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let branch = branch.into();
        let path = path.into();
        Self {
            repository_id: repository_id.into(),
            branch: branch
                .strip_prefix("refs/heads/")
                .unwrap_or(&branch)
                .to_string(),
            path: format!("/{}", path.trim_start_matches('/')),
        }
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    /// Branch name without the `refs/heads/` prefix.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Fully qualified ref name.
    pub fn ref_name(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    /// Path with the internal leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path as sent on the wire (no leading slash).
    pub fn wire_path(&self) -> &str {
        &self.path[1..]
    }
}

/// Head commit of a branch at a point in time.
///
/// Used as the optimistic-concurrency token: fetched immediately before each
/// push attempt and never cached across attempts, since any intervening
/// write invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchTip {
    pub commit_id: String,
}

impl BranchTip {
    pub fn new(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
        }
    }
}

/// One atomic, single-commit, single-file edit. Built fresh per publish
/// attempt against the tip read in that same attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub base: BranchTip,
    pub target: PublishTarget,
    pub content: String,
    pub message: String,
}

impl ChangeSet {
    pub fn new(
        base: BranchTip,
        target: PublishTarget,
        content: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            base,
            target,
            content: content.into().trim_end().to_string(),
            message: message.into(),
        }
    }

    /// Wire representation for the Azure DevOps pushes endpoint.
    pub fn to_wire(&self) -> PushRequest {
        PushRequest {
            ref_updates: vec![RefUpdate {
                name: self.target.ref_name(),
                old_object_id: self.base.commit_id.clone(),
            }],
            commits: vec![WireCommit {
                comment: self.message.clone(),
                changes: vec![WireChange {
                    change_type: "edit".to_string(),
                    item: WireItem {
                        path: self.target.wire_path().to_string(),
                    },
                    new_content: WireContent {
                        content: self.content.clone(),
                        content_type: "rawtext".to_string(),
                    },
                }],
            }],
        }
    }
}

/// Body of a push request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub ref_updates: Vec<RefUpdate>,
    pub commits: Vec<WireCommit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    pub name: String,
    pub old_object_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCommit {
    pub comment: String,
    pub changes: Vec<WireChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireChange {
    pub change_type: String,
    pub item: WireItem,
    pub new_content: WireContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireItem {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireContent {
    pub content: String,
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_normalizes_leading_slash() {
        let a = PublishTarget::new("repo", "main", "azure-pipelines.yml");
        let b = PublishTarget::new("repo", "main", "/azure-pipelines.yml");
        assert_eq!(a, b);
        assert_eq!(a.path(), "/azure-pipelines.yml");
        assert_eq!(a.wire_path(), "azure-pipelines.yml");
    }

    #[test]
    fn test_target_strips_ref_prefix() {
        let target = PublishTarget::new("repo", "refs/heads/master", "f.yml");
        assert_eq!(target.branch(), "master");
        assert_eq!(target.ref_name(), "refs/heads/master");
    }

    #[test]
    fn test_change_set_trims_trailing_whitespace() {
        let target = PublishTarget::new("repo", "main", "f.yml");
        let change = ChangeSet::new(BranchTip::new("abc"), target, "text\n\n  \n", "msg");
        assert_eq!(change.content, "text");
    }

    #[test]
    fn test_wire_shape() {
        let target = PublishTarget::new("repo", "master", "/azure-pipelines.yml");
        let change = ChangeSet::new(BranchTip::new("abc123"), target, "steps: []", "update");

        let json = serde_json::to_value(change.to_wire()).unwrap();
        assert_eq!(json["refUpdates"][0]["name"], "refs/heads/master");
        assert_eq!(json["refUpdates"][0]["oldObjectId"], "abc123");
        let change_json = &json["commits"][0]["changes"][0];
        assert_eq!(change_json["changeType"], "edit");
        assert_eq!(change_json["item"]["path"], "azure-pipelines.yml");
        assert_eq!(change_json["newContent"]["contentType"], "rawtext");
    }
}
