use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub created_by: UserSub,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The committed item set of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub items: Vec<ItemId>,
    pub providers: Vec<ProviderId>,
    pub updated_at: Timestamp,
    pub updated_by: UserSub,
}

/// A named delta over the project stack. `additions` and `exclusions` are
/// set-like; order and duplicates carry no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsystem {
    pub id: SubsystemId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub additions: Vec<ItemId>,
    pub exclusions: Vec<ItemId>,
    pub created_by: UserSub,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftStack {
    pub items: Vec<ItemId>,
    pub providers: Vec<ProviderId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSubsystem {
    pub name: String,
    pub additions: Vec<ItemId>,
    pub exclusions: Vec<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Full working state sent by an editor. Saving replaces the previous
/// content wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftContent {
    pub stack: DraftStack,
    pub subsystems: BTreeMap<SubsystemId, DraftSubsystem>,
}

/// An editor's working copy. Its presence and `locked_at` age are the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub stack: DraftStack,
    pub subsystems: BTreeMap<SubsystemId, DraftSubsystem>,
    pub locked_by: UserSub,
    pub locked_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Draft {
    pub fn content(&self) -> DraftContent {
        DraftContent {
            stack: self.stack.clone(),
            subsystems: self.subsystems.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSubsystem {
    pub name: String,
    pub additions: Vec<ItemId>,
    pub exclusions: Vec<ItemId>,
}

/// The stack/subsystem payload frozen into a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stack: Vec<ItemId>,
    pub providers: Vec<ProviderId>,
    pub subsystems: BTreeMap<SubsystemId, SnapshotSubsystem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: CommitId,
    pub message: String,
    pub author: String,
    pub author_sub: UserSub,
    pub timestamp: Timestamp,
    pub snapshot: Snapshot,
}

/// A draft row as the store sees it, with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftEntry {
    pub project_id: ProjectId,
    pub user_sub: UserSub,
    pub draft: Draft,
}

/// Admin view of an unexpired lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLock {
    pub project_id: ProjectId,
    pub user_sub: UserSub,
    pub locked_at: Timestamp,
}
