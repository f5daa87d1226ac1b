pub mod access;
pub mod commit;
pub mod config;
pub mod diff;
pub mod draft;
pub mod error;
pub mod lock;
pub mod overlay;
pub mod session;

pub use access::{AccessPolicy, RoleTable};
pub use commit::HistoryEntry;
pub use config::EngineConfig;
pub use diff::{DiffResult, SubsystemChange, SubsystemLabel, diff};
pub use error::{EngineError, ErrorKind};
pub use lock::is_lock_active;
pub use overlay::resolve_effective_items;
pub use session::EditorSession;

use std::collections::BTreeSet;

use tracing::info;

use stackdraft_core::{
    Clock, Identity, ItemId, Project, ProjectId, ProviderId, Stack, Subsystem, SubsystemId,
    SystemClock, Timestamp,
};
use stackdraft_storage::{SnapshotStore, StorageError};

/// Field-level changes for a direct subsystem edit. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct SubsystemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub additions: Option<Vec<ItemId>>,
    pub exclusions: Option<Vec<ItemId>>,
}

/// The versioning engine: drafts, locks, commits and history over a
/// [`SnapshotStore`].
///
/// Callers arrive already authenticated; capability checks go through the
/// configured [`AccessPolicy`].
pub struct Engine<S: SnapshotStore> {
    storage: S,
    clock: Box<dyn Clock>,
    access: Box<dyn AccessPolicy>,
    config: EngineConfig,
}

impl<S: SnapshotStore> Engine<S> {
    pub fn new(storage: S, access: impl AccessPolicy + 'static) -> Self {
        Self {
            storage,
            clock: Box::new(SystemClock),
            access: Box::new(access),
            config: EngineConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub(crate) fn now(&self) -> Result<Timestamp, EngineError> {
        Ok(self.clock.now()?)
    }

    pub(crate) fn require_editor(
        &self,
        who: &Identity,
        project_id: ProjectId,
    ) -> Result<(), EngineError> {
        if self.access.can_edit(who, project_id) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "{} may not edit project {}",
                who.sub, project_id
            )))
        }
    }

    pub(crate) fn require_admin(&self, who: &Identity) -> Result<(), EngineError> {
        if self.access.is_admin(who) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!("{} is not an administrator", who.sub)))
        }
    }

    pub(crate) fn is_admin(&self, who: &Identity) -> bool {
        self.access.is_admin(who)
    }

    pub(crate) fn require_project(&self, project_id: ProjectId) -> Result<Project, EngineError> {
        self.storage
            .get_project(project_id)?
            .ok_or_else(|| EngineError::NotFound(format!("project {project_id}")))
    }

    pub(crate) fn touch_project(
        &mut self,
        project_id: ProjectId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let mut project = self.require_project(project_id)?;
        project.updated_at = now;
        self.storage.put_project(&project)?;
        Ok(())
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Create a project with an empty stack.
    pub fn create_project(
        &mut self,
        admin: &Identity,
        name: &str,
        description: &str,
    ) -> Result<Project, EngineError> {
        self.require_admin(admin)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("project name is required".into()));
        }
        let now = self.now()?;
        let project = Project {
            id: ProjectId::new(),
            name: name.to_string(),
            description: description.to_string(),
            created_by: admin.sub.clone(),
            created_at: now,
            updated_at: now,
        };
        self.storage.put_project(&project)?;
        self.storage.put_stack(
            project.id,
            &Stack {
                items: Vec::new(),
                providers: Vec::new(),
                updated_at: now,
                updated_by: admin.sub.clone(),
            },
        )?;
        info!(project = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    /// Delete a project along with its stack, subsystems, drafts and history.
    pub fn delete_project(
        &mut self,
        admin: &Identity,
        project_id: ProjectId,
    ) -> Result<(), EngineError> {
        self.require_admin(admin)?;
        self.storage.delete_project(project_id).map_err(|e| match e {
            StorageError::NotFound(what) => EngineError::NotFound(what),
            other => other.into(),
        })?;
        info!(project = %project_id, "project deleted");
        Ok(())
    }

    pub fn get_project(&self, project_id: ProjectId) -> Result<Project, EngineError> {
        self.require_project(project_id)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        Ok(self.storage.list_projects()?)
    }

    // ========================================================================
    // Canonical stack
    // ========================================================================

    pub fn get_stack(&self, project_id: ProjectId) -> Result<Stack, EngineError> {
        let project = self.require_project(project_id)?;
        Ok(self.storage.get_stack(project_id)?.unwrap_or(Stack {
            items: Vec::new(),
            providers: Vec::new(),
            updated_at: project.created_at,
            updated_by: project.created_by,
        }))
    }

    /// Replace the canonical stack directly, bypassing drafts.
    pub fn update_stack(
        &mut self,
        editor: &Identity,
        project_id: ProjectId,
        items: Vec<ItemId>,
        providers: Vec<ProviderId>,
    ) -> Result<Stack, EngineError> {
        self.require_editor(editor, project_id)?;
        self.require_project(project_id)?;
        let now = self.now()?;
        let stack = Stack {
            items,
            providers,
            updated_at: now,
            updated_by: editor.sub.clone(),
        };
        self.storage.put_stack(project_id, &stack)?;
        self.touch_project(project_id, now)?;
        Ok(stack)
    }

    /// Items in effect for the project, or for one of its subsystems.
    pub fn effective_items(
        &self,
        project_id: ProjectId,
        subsystem_id: Option<&SubsystemId>,
    ) -> Result<BTreeSet<ItemId>, EngineError> {
        let stack = self.get_stack(project_id)?;
        let base: BTreeSet<ItemId> = stack.items.into_iter().collect();
        let Some(subsystem_id) = subsystem_id else {
            return Ok(base);
        };
        let subsystem = self.require_subsystem(project_id, subsystem_id)?;
        Ok(resolve_effective_items(
            &base,
            &subsystem.additions,
            &subsystem.exclusions,
        ))
    }

    // ========================================================================
    // Subsystems
    // ========================================================================

    fn require_subsystem(
        &self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<Subsystem, EngineError> {
        self.storage
            .get_subsystem(project_id, subsystem_id)?
            .ok_or_else(|| EngineError::NotFound(format!("subsystem {subsystem_id}")))
    }

    pub fn list_subsystems(&self, project_id: ProjectId) -> Result<Vec<Subsystem>, EngineError> {
        self.require_project(project_id)?;
        Ok(self.storage.list_subsystems(project_id)?)
    }

    pub fn create_subsystem(
        &mut self,
        editor: &Identity,
        project_id: ProjectId,
        name: &str,
        description: &str,
        additions: Vec<ItemId>,
        exclusions: Vec<ItemId>,
    ) -> Result<Subsystem, EngineError> {
        self.require_editor(editor, project_id)?;
        self.require_project(project_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("subsystem name is required".into()));
        }
        let now = self.now()?;
        let subsystem = Subsystem {
            id: SubsystemId::generate(),
            project_id,
            name: name.to_string(),
            description: description.to_string(),
            additions,
            exclusions,
            created_by: editor.sub.clone(),
            created_at: now,
            updated_at: now,
        };
        self.storage.put_subsystem(&subsystem)?;
        self.touch_project(project_id, now)?;
        Ok(subsystem)
    }

    pub fn update_subsystem(
        &mut self,
        editor: &Identity,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
        update: SubsystemUpdate,
    ) -> Result<Subsystem, EngineError> {
        self.require_editor(editor, project_id)?;
        let mut subsystem = self.require_subsystem(project_id, subsystem_id)?;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(EngineError::InvalidInput("subsystem name is required".into()));
            }
            subsystem.name = name.to_string();
        }
        if let Some(description) = update.description {
            subsystem.description = description;
        }
        if let Some(additions) = update.additions {
            subsystem.additions = additions;
        }
        if let Some(exclusions) = update.exclusions {
            subsystem.exclusions = exclusions;
        }
        let now = self.now()?;
        subsystem.updated_at = now;
        self.storage.put_subsystem(&subsystem)?;
        self.touch_project(project_id, now)?;
        Ok(subsystem)
    }

    pub fn delete_subsystem(
        &mut self,
        editor: &Identity,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<(), EngineError> {
        self.require_editor(editor, project_id)?;
        self.require_subsystem(project_id, subsystem_id)?;
        self.storage.delete_subsystem(project_id, subsystem_id)?;
        let now = self.now()?;
        self.touch_project(project_id, now)?;
        Ok(())
    }
}
