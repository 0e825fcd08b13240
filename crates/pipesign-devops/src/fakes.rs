//! In-memory fakes for the remote seams (testing only)
//!
//! Provides `ScriptedRemote`, a [`GitRemote`] with real compare-and-swap
//! push semantics plus a scriptable failure schedule, so publisher and
//! reader behavior can be exercised without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::change::{BranchTip, ChangeSet};
use crate::error::{RemoteError, RemoteResult};
use crate::remote::GitRemote;

/// Failure injected into push calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushFailure {
    /// Reject the next N pushes as conflicts, advancing the tip each time
    /// as if another writer had won the race. `u32::MAX` means always.
    Conflict(u32),
    /// Reject every push with an authentication error.
    Auth,
}

/// A push as the fake remote saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPush {
    pub base: BranchTip,
    pub path: String,
    pub content: String,
    pub message: String,
}

struct RemoteState {
    tip: BranchTip,
    documents: HashMap<String, String>,
    failure: Option<PushFailure>,
    pushes: Vec<RecordedPush>,
    serial: u64,
}

/// In-memory Git remote for one branch.
pub struct ScriptedRemote {
    branch: String,
    state: Mutex<RemoteState>,
}

impl ScriptedRemote {
    pub fn new(branch: impl Into<String>, initial_tip: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            state: Mutex::new(RemoteState {
                tip: BranchTip::new(initial_tip),
                documents: HashMap::new(),
                failure: None,
                pushes: Vec::new(),
                serial: 0,
            }),
        }
    }

    /// Seed a document at the branch tip.
    pub fn with_document(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(path.into(), content.into());
        self
    }

    /// Reject the next `n` pushes as conflicts.
    pub fn conflict_times(self, n: u32) -> Self {
        self.state.lock().unwrap().failure = Some(PushFailure::Conflict(n));
        self
    }

    /// Reject every push as a conflict.
    pub fn always_conflict(self) -> Self {
        self.conflict_times(u32::MAX)
    }

    /// Reject every push with an authentication error.
    pub fn fail_pushes_with_auth(self) -> Self {
        self.state.lock().unwrap().failure = Some(PushFailure::Auth);
        self
    }

    /// Every push received, in order, including rejected ones.
    pub fn pushes(&self) -> Vec<RecordedPush> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn tip(&self) -> BranchTip {
        self.state.lock().unwrap().tip.clone()
    }

    pub fn document(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().documents.get(path).cloned()
    }

    fn next_commit(state: &mut RemoteState) -> BranchTip {
        state.serial += 1;
        BranchTip::new(format!("commit-{}", state.serial))
    }
}

#[async_trait]
impl GitRemote for ScriptedRemote {
    async fn branch_tip(&self, _repository_id: &str, branch: &str) -> RemoteResult<BranchTip> {
        if branch != self.branch {
            return Err(RemoteError::BranchNotFound(branch.to_string()));
        }
        Ok(self.state.lock().unwrap().tip.clone())
    }

    async fn file_content(&self, _repository_id: &str, path: &str) -> RemoteResult<Option<String>> {
        Ok(self.state.lock().unwrap().documents.get(path).cloned())
    }

    async fn push(&self, change: &ChangeSet) -> RemoteResult<BranchTip> {
        let mut state = self.state.lock().unwrap();
        state.pushes.push(RecordedPush {
            base: change.base.clone(),
            path: change.target.wire_path().to_string(),
            content: change.content.clone(),
            message: change.message.clone(),
        });

        match state.failure {
            Some(PushFailure::Auth) => {
                return Err(RemoteError::Auth("TF400813: not authorized".to_string()));
            }
            Some(PushFailure::Conflict(remaining)) if remaining > 0 => {
                if remaining != u32::MAX {
                    state.failure = Some(PushFailure::Conflict(remaining - 1));
                }
                // The racing writer won; the head moves on.
                let new_tip = Self::next_commit(&mut state);
                state.tip = new_tip;
                return Err(RemoteError::Conflict(
                    "TF401028: the reference has already been updated".to_string(),
                ));
            }
            _ => {}
        }

        // Compare-and-swap on the base tip, like the real pushes endpoint.
        if change.base != state.tip {
            return Err(RemoteError::Conflict(format!(
                "stale oldObjectId {}",
                change.base.commit_id
            )));
        }

        let new_tip = Self::next_commit(&mut state);
        state.tip = new_tip.clone();
        state
            .documents
            .insert(change.target.wire_path().to_string(), change.content.clone());
        Ok(new_tip)
    }
}
