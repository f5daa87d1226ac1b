use std::collections::BTreeSet;

use stackdraft_core::{
    Commit, Draft, DraftEntry, Project, ProjectId, Stack, Subsystem, SubsystemId, UserSub,
};
use stackdraft_storage::{SnapshotStore, SqliteStorage, StorageError};

/// Writes that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailPoint {
    PutProject,
    PutStack,
    PutSubsystem,
    DeleteSubsystem,
    PutDraft,
    DeleteDraft,
    AppendCommit,
}

/// A SQLite store whose selected writes fail until healed.
pub struct FlakyStore {
    inner: SqliteStorage,
    failing: BTreeSet<FailPoint>,
}

impl FlakyStore {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            inner: SqliteStorage::open_in_memory()?,
            failing: BTreeSet::new(),
        })
    }

    pub fn fail_on(&mut self, point: FailPoint) {
        self.failing.insert(point);
    }

    pub fn heal(&mut self) {
        self.failing.clear();
    }

    fn check(&self, point: FailPoint) -> Result<(), StorageError> {
        if self.failing.contains(&point) {
            Err(StorageError::Unavailable(format!("{point:?} failed")))
        } else {
            Ok(())
        }
    }
}

impl SnapshotStore for FlakyStore {
    fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>, StorageError> {
        self.inner.get_project(project_id)
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        self.inner.list_projects()
    }

    fn put_project(&mut self, project: &Project) -> Result<(), StorageError> {
        self.check(FailPoint::PutProject)?;
        self.inner.put_project(project)
    }

    fn delete_project(&mut self, project_id: ProjectId) -> Result<(), StorageError> {
        self.inner.delete_project(project_id)
    }

    fn get_stack(&self, project_id: ProjectId) -> Result<Option<Stack>, StorageError> {
        self.inner.get_stack(project_id)
    }

    fn put_stack(&mut self, project_id: ProjectId, stack: &Stack) -> Result<(), StorageError> {
        self.check(FailPoint::PutStack)?;
        self.inner.put_stack(project_id, stack)
    }

    fn get_subsystem(
        &self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<Option<Subsystem>, StorageError> {
        self.inner.get_subsystem(project_id, subsystem_id)
    }

    fn list_subsystems(&self, project_id: ProjectId) -> Result<Vec<Subsystem>, StorageError> {
        self.inner.list_subsystems(project_id)
    }

    fn put_subsystem(&mut self, subsystem: &Subsystem) -> Result<(), StorageError> {
        self.check(FailPoint::PutSubsystem)?;
        self.inner.put_subsystem(subsystem)
    }

    fn delete_subsystem(
        &mut self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<(), StorageError> {
        self.check(FailPoint::DeleteSubsystem)?;
        self.inner.delete_subsystem(project_id, subsystem_id)
    }

    fn get_draft(
        &self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<Option<Draft>, StorageError> {
        self.inner.get_draft(project_id, user_sub)
    }

    fn list_project_drafts(&self, project_id: ProjectId) -> Result<Vec<DraftEntry>, StorageError> {
        self.inner.list_project_drafts(project_id)
    }

    fn list_all_drafts(&self) -> Result<Vec<DraftEntry>, StorageError> {
        self.inner.list_all_drafts()
    }

    fn put_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
        draft: &Draft,
    ) -> Result<(), StorageError> {
        self.check(FailPoint::PutDraft)?;
        self.inner.put_draft(project_id, user_sub, draft)
    }

    fn delete_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<bool, StorageError> {
        self.check(FailPoint::DeleteDraft)?;
        self.inner.delete_draft(project_id, user_sub)
    }

    fn append_commit(
        &mut self,
        project_id: ProjectId,
        commit: &Commit,
    ) -> Result<(), StorageError> {
        self.check(FailPoint::AppendCommit)?;
        self.inner.append_commit(project_id, commit)
    }

    fn list_commits(&self, project_id: ProjectId) -> Result<Vec<Commit>, StorageError> {
        self.inner.list_commits(project_id)
    }
}
