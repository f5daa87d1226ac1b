use stackdraft_core::{
    ids::*,
    records::{Commit, Draft, DraftEntry, Project, Stack, Subsystem},
};

use crate::error::StorageError;

/// Durable key/value storage for projects and everything hanging off them.
///
/// Every write is independent; there is no cross-call transaction. Puts are
/// overwrites, so repeating one is harmless. `append_commit` is the only
/// write that is not idempotent.
pub trait SnapshotStore {
    fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>, StorageError>;

    fn list_projects(&self) -> Result<Vec<Project>, StorageError>;

    fn put_project(&mut self, project: &Project) -> Result<(), StorageError>;

    /// Remove a project together with its stack, subsystems, drafts and commits.
    fn delete_project(&mut self, project_id: ProjectId) -> Result<(), StorageError>;

    fn get_stack(&self, project_id: ProjectId) -> Result<Option<Stack>, StorageError>;

    fn put_stack(&mut self, project_id: ProjectId, stack: &Stack) -> Result<(), StorageError>;

    fn get_subsystem(
        &self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<Option<Subsystem>, StorageError>;

    fn list_subsystems(&self, project_id: ProjectId) -> Result<Vec<Subsystem>, StorageError>;

    fn put_subsystem(&mut self, subsystem: &Subsystem) -> Result<(), StorageError>;

    fn delete_subsystem(
        &mut self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<(), StorageError>;

    fn get_draft(
        &self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<Option<Draft>, StorageError>;

    /// All drafts on a project, one per editing identity.
    fn list_project_drafts(&self, project_id: ProjectId) -> Result<Vec<DraftEntry>, StorageError>;

    fn list_all_drafts(&self) -> Result<Vec<DraftEntry>, StorageError>;

    fn put_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
        draft: &Draft,
    ) -> Result<(), StorageError>;

    /// Returns whether a draft was removed.
    fn delete_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<bool, StorageError>;

    fn append_commit(&mut self, project_id: ProjectId, commit: &Commit) -> Result<(), StorageError>;

    /// Newest first.
    fn list_commits(&self, project_id: ProjectId) -> Result<Vec<Commit>, StorageError>;
}
