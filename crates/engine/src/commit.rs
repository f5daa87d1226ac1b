//! Promoting a draft into canonical state and the commit log.
//!
//! The steps run in a fixed order with no enclosing transaction: stack,
//! subsystems, project timestamp, commit append, draft removal. Everything
//! before the append is an overwrite, so a failed commit can be retried for
//! as long as the draft is still there.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use tracing::{info, warn};

use stackdraft_core::{
    Commit, CommitId, Draft, DraftSubsystem, Identity, ProjectId, Snapshot, SnapshotSubsystem,
    Stack, Subsystem, SubsystemId, Timestamp,
};
use stackdraft_storage::SnapshotStore;

use crate::diff::{DiffResult, diff};
use crate::{Engine, EngineError};

/// A commit together with what it changed relative to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub commit: Commit,
    pub changes: DiffResult,
}

fn supplied(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the canonical record for a subsystem carried in a draft. Blank
/// names and descriptions fall back to the stored record.
fn merge_subsystem(
    project_id: ProjectId,
    id: &SubsystemId,
    incoming: &DraftSubsystem,
    existing: Option<&Subsystem>,
    who: &Identity,
    now: Timestamp,
) -> Subsystem {
    let name = supplied(Some(incoming.name.as_str()))
        .map(str::to_string)
        .or_else(|| existing.map(|s| s.name.clone()))
        .unwrap_or_else(|| id.to_string());
    let description = supplied(incoming.description.as_deref())
        .map(str::to_string)
        .or_else(|| existing.map(|s| s.description.clone()))
        .unwrap_or_default();
    Subsystem {
        id: id.clone(),
        project_id,
        name,
        description,
        additions: incoming.additions.clone(),
        exclusions: incoming.exclusions.clone(),
        created_by: existing.map_or_else(|| who.sub.clone(), |s| s.created_by.clone()),
        created_at: existing.map_or(now, |s| s.created_at),
        updated_at: now,
    }
}

fn step_failed(project_id: ProjectId, step: &'static str, error: &dyn Display) {
    warn!(project = %project_id, step, error = %error, "commit step failed");
}

fn snapshot_of(draft: &Draft, subsystems: &[Subsystem]) -> Snapshot {
    Snapshot {
        stack: draft.stack.items.clone(),
        providers: draft.stack.providers.clone(),
        subsystems: subsystems
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    SnapshotSubsystem {
                        name: s.name.clone(),
                        additions: s.additions.clone(),
                        exclusions: s.exclusions.clone(),
                    },
                )
            })
            .collect(),
    }
}

impl<S: SnapshotStore> Engine<S> {
    /// Publish the caller's draft.
    pub fn commit(
        &mut self,
        who: &Identity,
        project_id: ProjectId,
        message: &str,
    ) -> Result<Commit, EngineError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::InvalidInput("commit message is required".into()));
        }
        self.require_editor(who, project_id)?;
        self.require_project(project_id)?;
        let now = self.now()?;
        let draft = self
            .storage
            .get_draft(project_id, &who.sub)?
            .ok_or_else(|| EngineError::NoDraftToCommit(project_id.to_string()))?;
        self.ensure_unlocked(who, project_id, now)?;

        let stack = Stack {
            items: draft.stack.items.clone(),
            providers: draft.stack.providers.clone(),
            updated_at: now,
            updated_by: who.sub.clone(),
        };
        self.storage
            .put_stack(project_id, &stack)
            .inspect_err(|e| step_failed(project_id, "stack", e))?;

        let subsystems = self
            .reconcile_subsystems(who, project_id, &draft, now)
            .inspect_err(|e| step_failed(project_id, "subsystems", e))?;

        self.touch_project(project_id, now)
            .inspect_err(|e| step_failed(project_id, "project", e))?;

        let commit = Commit {
            id: CommitId::new(),
            message: message.to_string(),
            author: who.display_name.clone(),
            author_sub: who.sub.clone(),
            timestamp: now,
            snapshot: snapshot_of(&draft, &subsystems),
        };
        self.storage
            .append_commit(project_id, &commit)
            .inspect_err(|e| step_failed(project_id, "append", e))?;

        self.storage
            .delete_draft(project_id, &who.sub)
            .inspect_err(|e| {
                warn!(
                    project = %project_id,
                    commit = %commit.id,
                    step = "release",
                    error = %e,
                    "commit step failed"
                )
            })?;

        info!(
            project = %project_id,
            commit = %commit.id,
            author = %who.sub,
            items = commit.snapshot.stack.len(),
            subsystems = commit.snapshot.subsystems.len(),
            "commit appended"
        );
        Ok(commit)
    }

    /// Make the canonical subsystem set match the draft exactly: upsert every
    /// subsystem the draft names and delete the rest. Returns the written
    /// records in draft order.
    fn reconcile_subsystems(
        &mut self,
        who: &Identity,
        project_id: ProjectId,
        draft: &Draft,
        now: Timestamp,
    ) -> Result<Vec<Subsystem>, EngineError> {
        let existing: BTreeMap<SubsystemId, Subsystem> = self
            .storage
            .list_subsystems(project_id)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let mut written = Vec::with_capacity(draft.subsystems.len());
        for (id, incoming) in &draft.subsystems {
            let record = merge_subsystem(project_id, id, incoming, existing.get(id), who, now);
            self.storage.put_subsystem(&record)?;
            written.push(record);
        }

        for id in existing.keys().filter(|id| !draft.subsystems.contains_key(*id)) {
            self.storage.delete_subsystem(project_id, id)?;
            info!(project = %project_id, subsystem = %id, "subsystem removed by commit");
        }
        Ok(written)
    }

    /// Newest first.
    pub fn list_commits(&self, project_id: ProjectId) -> Result<Vec<Commit>, EngineError> {
        self.require_project(project_id)?;
        Ok(self.storage.list_commits(project_id)?)
    }

    /// Newest first, each commit diffed against the one before it.
    pub fn commit_history(&self, project_id: ProjectId) -> Result<Vec<HistoryEntry>, EngineError> {
        let commits = self.list_commits(project_id)?;
        let mut entries = Vec::with_capacity(commits.len());
        for (i, commit) in commits.iter().enumerate() {
            let previous = commits.get(i + 1).map(|c| &c.snapshot);
            entries.push(HistoryEntry {
                commit: commit.clone(),
                changes: diff(previous, &commit.snapshot),
            });
        }
        Ok(entries)
    }
}
