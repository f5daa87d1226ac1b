use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stackdraft_core::{Identity, ProjectId, UserSub};

/// Role lookups owned by the surrounding application.
pub trait AccessPolicy {
    fn can_edit(&self, who: &Identity, project_id: ProjectId) -> bool;

    fn is_admin(&self, who: &Identity) -> bool;
}

impl<T: AccessPolicy + ?Sized> AccessPolicy for Arc<T> {
    fn can_edit(&self, who: &Identity, project_id: ProjectId) -> bool {
        (**self).can_edit(who, project_id)
    }

    fn is_admin(&self, who: &Identity) -> bool {
        (**self).is_admin(who)
    }
}

/// In-memory role assignments. Administrators may edit every project.
#[derive(Debug, Default)]
pub struct RoleTable {
    inner: RwLock<Roles>,
}

#[derive(Debug, Default)]
struct Roles {
    admins: BTreeSet<UserSub>,
    editors: BTreeMap<ProjectId, BTreeSet<UserSub>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    // Each write is a single set operation, so a poisoned guard still holds
    // consistent roles.
    fn read(&self) -> RwLockReadGuard<'_, Roles> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Roles> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn grant_admin(&self, sub: &UserSub) {
        self.write().admins.insert(sub.clone());
    }

    pub fn grant_editor(&self, project_id: ProjectId, sub: &UserSub) {
        self.write()
            .editors
            .entry(project_id)
            .or_default()
            .insert(sub.clone());
    }

    pub fn revoke_editor(&self, project_id: ProjectId, sub: &UserSub) {
        if let Some(editors) = self.write().editors.get_mut(&project_id) {
            editors.remove(sub);
        }
    }
}

impl AccessPolicy for RoleTable {
    fn can_edit(&self, who: &Identity, project_id: ProjectId) -> bool {
        let roles = self.read();
        roles.admins.contains(&who.sub)
            || roles
                .editors
                .get(&project_id)
                .is_some_and(|editors| editors.contains(&who.sub))
    }

    fn is_admin(&self, who: &Identity) -> bool {
        self.read().admins.contains(&who.sub)
    }
}
