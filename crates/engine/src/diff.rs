//! Set-based comparison of two commit snapshots.
//!
//! Order and duplicates inside snapshot lists are ignored. All output lists
//! are sorted so results compare deterministically.

use std::collections::BTreeSet;

use serde::Serialize;

use stackdraft_core::{ItemId, ProviderId, Snapshot, SubsystemId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubsystemLabel {
    pub id: SubsystemId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemChange {
    pub id: SubsystemId,
    pub name: String,
    pub additions_added: Vec<ItemId>,
    pub additions_removed: Vec<ItemId>,
    pub exclusions_added: Vec<ItemId>,
    pub exclusions_removed: Vec<ItemId>,
}

impl SubsystemChange {
    fn is_empty(&self) -> bool {
        self.additions_added.is_empty()
            && self.additions_removed.is_empty()
            && self.exclusions_added.is_empty()
            && self.exclusions_removed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub stack_added: Vec<ItemId>,
    pub stack_removed: Vec<ItemId>,
    pub providers_added: Vec<ProviderId>,
    pub providers_removed: Vec<ProviderId>,
    pub subsystems_added: Vec<SubsystemLabel>,
    pub subsystems_removed: Vec<SubsystemLabel>,
    pub subsystems_changed: Vec<SubsystemChange>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.stack_added.is_empty()
            && self.stack_removed.is_empty()
            && self.providers_added.is_empty()
            && self.providers_removed.is_empty()
            && self.subsystems_added.is_empty()
            && self.subsystems_removed.is_empty()
            && self.subsystems_changed.is_empty()
    }
}

/// `(in curr but not prev, in prev but not curr)`
fn set_delta<T: Ord + Clone>(prev: &[T], curr: &[T]) -> (Vec<T>, Vec<T>) {
    let prev: BTreeSet<&T> = prev.iter().collect();
    let curr: BTreeSet<&T> = curr.iter().collect();
    let added = curr.difference(&prev).map(|t| (*t).clone()).collect();
    let removed = prev.difference(&curr).map(|t| (*t).clone()).collect();
    (added, removed)
}

/// Compare `curr` against `prev`. A missing `prev` (the first commit) reports
/// everything in `curr` as added.
pub fn diff(prev: Option<&Snapshot>, curr: &Snapshot) -> DiffResult {
    let empty = Snapshot::default();
    let prev = prev.unwrap_or(&empty);

    let (stack_added, stack_removed) = set_delta(&prev.stack, &curr.stack);
    let (providers_added, providers_removed) = set_delta(&prev.providers, &curr.providers);

    let subsystems_added = curr
        .subsystems
        .iter()
        .filter(|(id, _)| !prev.subsystems.contains_key(*id))
        .map(|(id, sub)| SubsystemLabel {
            id: id.clone(),
            name: sub.name.clone(),
        })
        .collect();

    let subsystems_removed = prev
        .subsystems
        .iter()
        .filter(|(id, _)| !curr.subsystems.contains_key(*id))
        .map(|(id, sub)| SubsystemLabel {
            id: id.clone(),
            name: sub.name.clone(),
        })
        .collect();

    let mut subsystems_changed = Vec::new();
    for (id, now) in &curr.subsystems {
        let Some(before) = prev.subsystems.get(id) else {
            continue;
        };
        let (additions_added, additions_removed) = set_delta(&before.additions, &now.additions);
        let (exclusions_added, exclusions_removed) =
            set_delta(&before.exclusions, &now.exclusions);
        let change = SubsystemChange {
            id: id.clone(),
            name: now.name.clone(),
            additions_added,
            additions_removed,
            exclusions_added,
            exclusions_removed,
        };
        if !change.is_empty() {
            subsystems_changed.push(change);
        }
    }

    DiffResult {
        stack_added,
        stack_removed,
        providers_added,
        providers_removed,
        subsystems_added,
        subsystems_removed,
        subsystems_changed,
    }
}
