//! Integration tests for the optimistic publisher with ScriptedRemote.

use std::sync::Arc;
use std::time::Duration;

use pipesign_devops::fakes::ScriptedRemote;
use pipesign_devops::{PublishError, PublishTarget, Publisher, RemoteError};

fn target() -> PublishTarget {
    PublishTarget::new("repo-1", "master", "/azure-pipelines.yml")
}

fn publisher(remote: Arc<ScriptedRemote>) -> Publisher {
    Publisher::new(remote).with_backoff_base(Duration::from_millis(1))
}

/// Test: a remote that always conflicts exhausts the bound after exactly
/// 4 attempts (1 initial + 3 retries).
#[tokio::test]
async fn test_conflict_exhausted_after_four_attempts() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0").always_conflict());
    let result = publisher(remote.clone())
        .publish(&target(), "steps: []", "update pipeline")
        .await;

    match result {
        Err(PublishError::ConflictExhausted { attempts }) => assert_eq!(attempts, 4),
        other => panic!("expected ConflictExhausted, got {other:?}"),
    }
    assert_eq!(remote.pushes().len(), 4, "one push per attempt");
}

/// Test: one conflict then success lands on the second attempt.
#[tokio::test]
async fn test_single_conflict_then_success() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0").conflict_times(1));
    let receipt = publisher(remote.clone())
        .publish(&target(), "steps: []", "update pipeline")
        .await
        .expect("publish failed");

    assert_eq!(receipt.attempts, 2);
    assert_eq!(remote.pushes().len(), 2);
    assert_eq!(receipt.tip, remote.tip());
    assert_eq!(remote.document("azure-pipelines.yml").as_deref(), Some("steps: []"));
}

/// Test: every push references the tip read within its own attempt, never
/// a stale one carried over from an earlier attempt.
#[tokio::test]
async fn test_each_attempt_uses_freshly_read_tip() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0").conflict_times(2));
    publisher(remote.clone())
        .publish(&target(), "steps: []", "update pipeline")
        .await
        .expect("publish failed");

    let bases: Vec<_> = remote
        .pushes()
        .iter()
        .map(|p| p.base.commit_id.clone())
        .collect();
    // The fake advances the head on every conflict, so a re-read is the
    // only way each base can match the head current at push time.
    assert_eq!(bases, vec!["tip-0", "commit-1", "commit-2"]);
}

/// Test: non-conflict remote errors are terminal on the first attempt.
#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0").fail_pushes_with_auth());
    let result = publisher(remote.clone())
        .publish(&target(), "steps: []", "update pipeline")
        .await;

    assert!(matches!(
        result,
        Err(PublishError::Remote(RemoteError::Auth(_)))
    ));
    assert_eq!(remote.pushes().len(), 1, "auth failures must not retry");
}

/// Test: a missing branch fails before any push is attempted.
#[tokio::test]
async fn test_missing_branch_is_terminal() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0"));
    let missing = PublishTarget::new("repo-1", "develop", "/azure-pipelines.yml");
    let result = publisher(remote.clone())
        .publish(&missing, "steps: []", "update pipeline")
        .await;

    assert!(matches!(
        result,
        Err(PublishError::Remote(RemoteError::BranchNotFound(_)))
    ));
    assert!(remote.pushes().is_empty());
}

/// Test: a retry bound far past the default keeps the backoff arithmetic
/// in range instead of overflowing.
#[tokio::test]
async fn test_large_retry_bound_does_not_overflow_backoff() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0").always_conflict());
    let result = Publisher::new(remote.clone())
        .with_max_retries(40)
        .with_backoff_base(Duration::ZERO)
        .publish(&target(), "steps: []", "update pipeline")
        .await;

    match result {
        Err(PublishError::ConflictExhausted { attempts }) => assert_eq!(attempts, 41),
        other => panic!("expected ConflictExhausted, got {other:?}"),
    }
    assert_eq!(remote.pushes().len(), 41);
}

/// Test: published content is trimmed of trailing whitespace on the wire.
#[tokio::test]
async fn test_content_trimmed_before_push() {
    let remote = Arc::new(ScriptedRemote::new("master", "tip-0"));
    publisher(remote.clone())
        .publish(&target(), "steps: []\n\n   \n", "update pipeline")
        .await
        .expect("publish failed");

    assert_eq!(remote.pushes()[0].content, "steps: []");
}
