use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use stackdraft_core::{
    DraftContent, DraftStack, DraftSubsystem, Identity, ItemId, ManualClock, ProjectId,
    SnapshotSubsystem, SubsystemId, Timestamp,
};
use stackdraft_engine::{Engine, EngineConfig, EngineError, RoleTable};
use stackdraft_storage::{SnapshotStore, SqliteStorage};

use crate::flaky::FlakyStore;

/// 2023-11-14T22:13:20Z
pub const START_MS: i64 = 1_700_000_000_000;

/// An engine wired to a settable clock and an in-memory role table, with an
/// administrator already granted.
pub struct TestWorkspace<S: SnapshotStore = SqliteStorage> {
    pub engine: Engine<S>,
    pub clock: ManualClock,
    pub roles: Arc<RoleTable>,
    pub admin: Identity,
}

impl TestWorkspace<SqliteStorage> {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_storage(SqliteStorage::open_in_memory()?)
    }
}

impl TestWorkspace<FlakyStore> {
    pub fn flaky() -> Result<Self, EngineError> {
        Self::with_storage(FlakyStore::new()?)
    }
}

impl<S: SnapshotStore> TestWorkspace<S> {
    pub fn with_storage(storage: S) -> Result<Self, EngineError> {
        crate::init_test_logging();
        let clock = ManualClock::new(Timestamp::from_millis(START_MS));
        let roles = Arc::new(RoleTable::new());
        let admin = Identity::new("admin", "Administrator");
        roles.grant_admin(&admin.sub);
        let engine = Engine::new(storage, roles.clone()).with_clock(clock.clone());
        Ok(Self {
            engine,
            clock,
            roles,
            admin,
        })
    }

    pub fn with_engine_config(self, config: EngineConfig) -> Result<Self, EngineError> {
        let Self {
            engine,
            clock,
            roles,
            admin,
        } = self;
        Ok(Self {
            engine: engine.with_config(config)?,
            clock,
            roles,
            admin,
        })
    }

    /// Create a project as the administrator.
    pub fn project(&mut self, name: &str) -> Result<ProjectId, EngineError> {
        let admin = self.admin.clone();
        Ok(self.engine.create_project(&admin, name, "")?.id)
    }

    /// An identity with editor rights on `project_id`.
    pub fn editor(&self, project_id: ProjectId, sub: &str, display_name: &str) -> Identity {
        let who = Identity::new(sub, display_name);
        self.roles.grant_editor(project_id, &who.sub);
        who
    }

    pub fn advance(&self, d: Duration) {
        self.clock.advance(d);
    }

    pub fn now(&self) -> Timestamp {
        self.clock.current()
    }
}

pub fn item_ids(ids: &[&str]) -> Vec<ItemId> {
    ids.iter().map(|s| ItemId::from(*s)).collect()
}

/// Draft payload from a stack and `(id, name, additions, exclusions)` tuples.
pub fn draft_content(
    stack: &[&str],
    subsystems: &[(&str, &str, &[&str], &[&str])],
) -> DraftContent {
    DraftContent {
        stack: DraftStack {
            items: item_ids(stack),
            providers: Vec::new(),
        },
        subsystems: subsystems
            .iter()
            .map(|(id, name, additions, exclusions)| {
                (
                    SubsystemId::from(*id),
                    DraftSubsystem {
                        name: name.to_string(),
                        additions: item_ids(additions),
                        exclusions: item_ids(exclusions),
                        description: None,
                    },
                )
            })
            .collect(),
    }
}

/// Snapshot subsystem map in the same tuple form as [`draft_content`].
pub fn snapshot_subsystems(
    subsystems: &[(&str, &str, &[&str], &[&str])],
) -> BTreeMap<SubsystemId, SnapshotSubsystem> {
    subsystems
        .iter()
        .map(|(id, name, additions, exclusions)| {
            (
                SubsystemId::from(*id),
                SnapshotSubsystem {
                    name: name.to_string(),
                    additions: item_ids(additions),
                    exclusions: item_ids(exclusions),
                },
            )
        })
        .collect()
}
