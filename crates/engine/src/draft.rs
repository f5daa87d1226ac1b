//! Per-editor working copies and the lock they imply.

use tracing::{debug, info, warn};

use stackdraft_core::{
    ActiveLock, Draft, DraftContent, DraftEntry, Identity, ProjectId, Timestamp, UserSub,
};
use stackdraft_storage::SnapshotStore;

use crate::lock::{is_expired, is_lock_active};
use crate::{Engine, EngineError};

impl<S: SnapshotStore> Engine<S> {
    /// The most recently taken lock on `project_id` that blocks `who`, if any.
    fn blocking_draft(
        &self,
        who: &Identity,
        project_id: ProjectId,
        now: Timestamp,
    ) -> Result<Option<DraftEntry>, EngineError> {
        let ttl = self.config.lock_ttl();
        Ok(self
            .storage
            .list_project_drafts(project_id)?
            .into_iter()
            .filter(|entry| is_lock_active(Some(&entry.draft), &who.sub, now, ttl))
            .max_by_key(|entry| entry.draft.locked_at))
    }

    /// Fail with `Locked` when another identity holds an unexpired draft.
    pub(crate) fn ensure_unlocked(
        &self,
        who: &Identity,
        project_id: ProjectId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        match self.blocking_draft(who, project_id, now)? {
            Some(entry) => {
                warn!(
                    project = %project_id,
                    user = %who.sub,
                    locked_by = %entry.draft.locked_by,
                    locked_at = %entry.draft.locked_at,
                    "draft is locked by another editor"
                );
                Err(EngineError::Locked {
                    locked_by: entry.draft.locked_by,
                    locked_at: entry.draft.locked_at,
                })
            }
            None => Ok(()),
        }
    }

    /// The caller's own draft. Absence is not an error.
    pub fn get_draft(
        &self,
        who: &Identity,
        project_id: ProjectId,
    ) -> Result<Option<Draft>, EngineError> {
        self.require_editor(who, project_id)?;
        self.require_project(project_id)?;
        let now = self.now()?;
        self.ensure_unlocked(who, project_id, now)?;
        Ok(self.storage.get_draft(project_id, &who.sub)?)
    }

    /// Upsert the caller's draft with the full working state.
    ///
    /// The first save takes the lock (`locked_at = now`); later saves keep the
    /// original `locked_at` and only move `updated_at`.
    pub fn save_draft(
        &mut self,
        who: &Identity,
        project_id: ProjectId,
        content: DraftContent,
    ) -> Result<Draft, EngineError> {
        self.require_editor(who, project_id)?;
        self.require_project(project_id)?;
        let now = self.now()?;
        self.ensure_unlocked(who, project_id, now)?;

        let existing = self.storage.get_draft(project_id, &who.sub)?;
        let locked_at = existing.as_ref().map_or(now, |d| d.locked_at);
        let draft = Draft {
            stack: content.stack,
            subsystems: content.subsystems,
            locked_by: who.sub.clone(),
            locked_at,
            updated_at: now,
        };
        self.storage.put_draft(project_id, &who.sub, &draft)?;

        if existing.is_none() {
            info!(project = %project_id, user = %who.sub, "draft created, lock taken");
        } else {
            debug!(
                project = %project_id,
                user = %who.sub,
                items = draft.stack.items.len(),
                subsystems = draft.subsystems.len(),
                "draft saved"
            );
        }
        Ok(draft)
    }

    /// Discard the caller's own draft, releasing the lock.
    pub fn discard_draft(
        &mut self,
        who: &Identity,
        project_id: ProjectId,
    ) -> Result<(), EngineError> {
        let owner = who.sub.clone();
        self.discard_draft_of(who, project_id, &owner)
    }

    /// Discard `owner`'s draft. Only the owner or an administrator may do so.
    pub fn discard_draft_of(
        &mut self,
        who: &Identity,
        project_id: ProjectId,
        owner: &UserSub,
    ) -> Result<(), EngineError> {
        self.require_editor(who, project_id)?;
        let draft = self
            .storage
            .get_draft(project_id, owner)?
            .ok_or_else(|| {
                EngineError::NotFound(format!("draft of {owner} on project {project_id}"))
            })?;
        if draft.locked_by != who.sub && !self.is_admin(who) {
            return Err(EngineError::Forbidden(format!(
                "{} may not discard the draft of {}",
                who.sub, draft.locked_by
            )));
        }
        self.storage.delete_draft(project_id, owner)?;
        info!(project = %project_id, user = %who.sub, owner = %owner, "draft discarded");
        Ok(())
    }

    /// Administrative removal of a draft regardless of its age. Returns
    /// whether a draft was present.
    pub fn break_lock(
        &mut self,
        admin: &Identity,
        project_id: ProjectId,
        owner: &UserSub,
    ) -> Result<bool, EngineError> {
        self.require_admin(admin)?;
        let removed = self.storage.delete_draft(project_id, owner)?;
        info!(
            project = %project_id,
            admin = %admin.sub,
            owner = %owner,
            removed,
            "lock broken"
        );
        Ok(removed)
    }

    /// Every unexpired draft across all projects.
    pub fn list_active_locks(&self, admin: &Identity) -> Result<Vec<ActiveLock>, EngineError> {
        self.require_admin(admin)?;
        let now = self.now()?;
        let ttl = self.config.lock_ttl();
        Ok(self
            .storage
            .list_all_drafts()?
            .into_iter()
            .filter(|entry| !is_expired(&entry.draft, now, ttl))
            .map(|entry| ActiveLock {
                project_id: entry.project_id,
                user_sub: entry.user_sub,
                locked_at: entry.draft.locked_at,
            })
            .collect())
    }
}
