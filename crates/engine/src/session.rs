//! Editor-side working state and its autosave discipline.
//!
//! An [`EditorSession`] mirrors what an editing client keeps in memory: the
//! base stack it is working from, the per-subsystem deltas, the currently
//! selected items, and the baseline last persisted to the server. User edits
//! arm a debounced autosave; programmatic changes (opening, switching
//! subsystem, reloading after commit or discard) are adopted as the new
//! baseline without arming it.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::debug;

use stackdraft_core::{
    Draft, DraftContent, DraftStack, DraftSubsystem, Identity, ItemId, ProjectId, ProviderId,
    Stack, Subsystem, SubsystemId, Timestamp,
};
use stackdraft_storage::SnapshotStore;

use crate::overlay::{derive_delta, resolve_effective_items};
use crate::{Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    items: BTreeSet<ItemId>,
    providers: BTreeSet<ProviderId>,
}

#[derive(Debug, Clone)]
pub struct EditorSession {
    project_id: ProjectId,
    debounce: Duration,
    base_items: BTreeSet<ItemId>,
    subsystems: BTreeMap<SubsystemId, DraftSubsystem>,
    active: Option<SubsystemId>,
    selected: Selection,
    last_saved: Selection,
    /// Unsaved edits that are not visible in `selected` (subsystem set
    /// changes, or edits made before a subsystem switch).
    structural_dirty: bool,
    /// Bumped on every structural edit.
    structural_gen: u64,
    skip_autosave: bool,
    deadline: Option<Timestamp>,
    in_flight: Option<(Selection, u64)>,
}

fn canonical_deltas(subsystems: &[Subsystem]) -> BTreeMap<SubsystemId, DraftSubsystem> {
    subsystems
        .iter()
        .map(|s| {
            (
                s.id.clone(),
                DraftSubsystem {
                    name: s.name.clone(),
                    additions: s.additions.clone(),
                    exclusions: s.exclusions.clone(),
                    description: (!s.description.is_empty()).then(|| s.description.clone()),
                },
            )
        })
        .collect()
}

impl EditorSession {
    /// Start from the committed state, or from `draft` when one exists.
    pub fn open(
        project_id: ProjectId,
        stack: &Stack,
        subsystems: &[Subsystem],
        draft: Option<&Draft>,
        debounce: Duration,
    ) -> Self {
        let (items, providers, deltas): (BTreeSet<ItemId>, BTreeSet<ProviderId>, _) = match draft {
            Some(draft) => (
                draft.stack.items.iter().cloned().collect(),
                draft.stack.providers.iter().cloned().collect(),
                draft.subsystems.clone(),
            ),
            None => (
                stack.items.iter().cloned().collect(),
                stack.providers.iter().cloned().collect(),
                canonical_deltas(subsystems),
            ),
        };
        let selected = Selection { items, providers };
        Self {
            project_id,
            debounce,
            base_items: selected.items.clone(),
            subsystems: deltas,
            active: None,
            last_saved: selected.clone(),
            selected,
            structural_dirty: false,
            structural_gen: 0,
            skip_autosave: false,
            deadline: None,
            in_flight: None,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn active_subsystem(&self) -> Option<&SubsystemId> {
        self.active.as_ref()
    }

    /// Items currently shown to the editor.
    pub fn effective_items(&self) -> &BTreeSet<ItemId> {
        &self.selected.items
    }

    pub fn providers(&self) -> &BTreeSet<ProviderId> {
        &self.selected.providers
    }

    pub fn base_items(&self) -> &BTreeSet<ItemId> {
        &self.base_items
    }

    pub fn subsystems(&self) -> &BTreeMap<SubsystemId, DraftSubsystem> {
        &self.subsystems
    }

    pub fn autosave_deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    /// Whether the working state differs from what was last persisted.
    pub fn is_dirty(&self) -> bool {
        self.structural_dirty || self.selected != self.last_saved
    }

    // ========================================================================
    // User edits
    // ========================================================================

    pub fn toggle_item(&mut self, now: Timestamp, item: ItemId) {
        if !self.selected.items.remove(&item) {
            self.selected.items.insert(item);
        }
        self.fold_selection();
        self.note_change(Some(now));
    }

    pub fn set_items(&mut self, now: Timestamp, items: impl IntoIterator<Item = ItemId>) {
        self.selected.items = items.into_iter().collect();
        self.fold_selection();
        self.note_change(Some(now));
    }

    pub fn toggle_provider(&mut self, now: Timestamp, provider: ProviderId) {
        if !self.selected.providers.remove(&provider) {
            self.selected.providers.insert(provider);
        }
        self.note_change(Some(now));
    }

    /// Add an empty subsystem to the working set.
    pub fn add_subsystem(&mut self, now: Timestamp, id: SubsystemId, name: &str) {
        self.subsystems.insert(
            id,
            DraftSubsystem {
                name: name.to_string(),
                ..DraftSubsystem::default()
            },
        );
        self.mark_structural();
        self.note_change(Some(now));
    }

    /// Drop a subsystem from the working set. Leaves it first if active.
    pub fn remove_subsystem(
        &mut self,
        now: Timestamp,
        id: &SubsystemId,
    ) -> Result<(), EngineError> {
        if self.subsystems.remove(id).is_none() {
            return Err(EngineError::NotFound(format!("subsystem {id}")));
        }
        if self.active.as_ref() == Some(id) {
            self.active = None;
            self.selected.items = self.base_items.clone();
            self.last_saved.items = self.base_items.clone();
        }
        self.mark_structural();
        self.note_change(Some(now));
        Ok(())
    }

    // ========================================================================
    // Programmatic changes
    // ========================================================================

    /// Switch the view to a subsystem's effective items.
    pub fn enter_subsystem(&mut self, id: &SubsystemId) -> Result<(), EngineError> {
        let delta = self
            .subsystems
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("subsystem {id}")))?;
        let effective =
            resolve_effective_items(&self.base_items, &delta.additions, &delta.exclusions);
        self.programmatic(|session| {
            session.active = Some(id.clone());
            session.selected.items = effective;
        });
        Ok(())
    }

    /// Return to the base stack view.
    pub fn exit_subsystem(&mut self) {
        let base = self.base_items.clone();
        self.programmatic(|session| {
            session.active = None;
            session.selected.items = base;
        });
    }

    /// Adopt freshly fetched canonical state after a commit or discard. The
    /// active subsystem is re-derived from its committed delta, or left if it
    /// no longer exists.
    pub fn reload(&mut self, stack: &Stack, subsystems: &[Subsystem]) {
        let base: BTreeSet<ItemId> = stack.items.iter().cloned().collect();
        let deltas = canonical_deltas(subsystems);
        let active = self.active.take().filter(|id| deltas.contains_key(id));
        let items = match active.as_ref().and_then(|id| deltas.get(id)) {
            Some(delta) => resolve_effective_items(&base, &delta.additions, &delta.exclusions),
            None => base.clone(),
        };
        self.base_items = base;
        self.subsystems = deltas;
        self.active = active;
        self.selected = Selection {
            items,
            providers: stack.providers.iter().cloned().collect(),
        };
        self.last_saved = self.selected.clone();
        self.structural_dirty = false;
        self.deadline = None;
        self.in_flight = None;
    }

    fn programmatic(&mut self, change: impl FnOnce(&mut Self)) {
        if self.selected != self.last_saved {
            self.mark_structural();
        }
        change(self);
        self.skip_autosave = true;
        self.note_change(None);
    }

    // ========================================================================
    // Autosave
    // ========================================================================

    fn mark_structural(&mut self) {
        self.structural_dirty = true;
        self.structural_gen += 1;
    }

    /// Write the selection back into whichever layer is being edited.
    fn fold_selection(&mut self) {
        match &self.active {
            Some(id) => {
                let (additions, exclusions) = derive_delta(&self.base_items, &self.selected.items);
                if let Some(delta) = self.subsystems.get_mut(id) {
                    delta.additions = additions;
                    delta.exclusions = exclusions;
                }
            }
            None => self.base_items = self.selected.items.clone(),
        }
    }

    /// `now` is `None` only for programmatic changes, which never arm the
    /// debounce.
    fn note_change(&mut self, now: Option<Timestamp>) {
        if std::mem::take(&mut self.skip_autosave) {
            self.last_saved = self.selected.clone();
            if !self.structural_dirty {
                self.deadline = None;
            }
            return;
        }
        let Some(now) = now else {
            return;
        };
        self.deadline = self.is_dirty().then(|| now.plus(self.debounce));
    }

    /// The full draft payload, once the debounce has elapsed on a dirty
    /// session. The caller persists it and reports back via
    /// [`mark_saved`](Self::mark_saved) or [`save_failed`](Self::save_failed).
    pub fn poll_autosave(&mut self, now: Timestamp) -> Option<DraftContent> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        if !self.is_dirty() {
            return None;
        }
        self.in_flight = Some((self.selected.clone(), self.structural_gen));
        Some(self.draft_content())
    }

    /// Adopt the polled payload as persisted. Structural edits made while
    /// the save was in flight stay dirty.
    pub fn mark_saved(&mut self) {
        if let Some((saved, generation)) = self.in_flight.take() {
            self.last_saved = saved;
            if generation == self.structural_gen {
                self.structural_dirty = false;
            }
        }
    }

    /// Re-arm the debounce after a failed save.
    pub fn save_failed(&mut self, now: Timestamp) {
        self.in_flight = None;
        self.deadline = Some(now.plus(self.debounce));
    }

    /// Drop any pending autosave, e.g. on sign-out or project switch.
    pub fn cancel_autosave(&mut self) {
        self.deadline = None;
        self.in_flight = None;
    }

    pub fn draft_content(&self) -> DraftContent {
        DraftContent {
            stack: DraftStack {
                items: self.base_items.iter().cloned().collect(),
                providers: self.selected.providers.iter().cloned().collect(),
            },
            subsystems: self.subsystems.clone(),
        }
    }
}

impl<S: SnapshotStore> Engine<S> {
    /// Load the editing view for `who`: their draft if any, otherwise the
    /// committed stack and subsystems.
    pub fn open_session(
        &self,
        who: &Identity,
        project_id: ProjectId,
    ) -> Result<EditorSession, EngineError> {
        let draft = self.get_draft(who, project_id)?;
        let stack = self.get_stack(project_id)?;
        let subsystems = self.list_subsystems(project_id)?;
        Ok(EditorSession::open(
            project_id,
            &stack,
            &subsystems,
            draft.as_ref(),
            self.config.autosave_debounce(),
        ))
    }

    /// Flush the session if its debounce has elapsed. Returns the saved draft.
    pub fn autosave(
        &mut self,
        who: &Identity,
        session: &mut EditorSession,
    ) -> Result<Option<Draft>, EngineError> {
        let now = self.now()?;
        let Some(content) = session.poll_autosave(now) else {
            return Ok(None);
        };
        match self.save_draft(who, session.project_id(), content) {
            Ok(draft) => {
                session.mark_saved();
                debug!(project = %session.project_id(), user = %who.sub, "autosaved");
                Ok(Some(draft))
            }
            Err(e) => {
                session.save_failed(now);
                Err(e)
            }
        }
    }

    /// Re-fetch canonical state into the session after commit or discard.
    pub fn refresh_session(&self, session: &mut EditorSession) -> Result<(), EngineError> {
        let stack = self.get_stack(session.project_id())?;
        let subsystems = self.list_subsystems(session.project_id())?;
        session.reload(&stack, &subsystems);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_secs(2);

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn set(items: &[&str]) -> BTreeSet<ItemId> {
        items.iter().map(|s| ItemId::from(*s)).collect()
    }

    fn stack(items: &[&str]) -> Stack {
        Stack {
            items: items.iter().map(|s| ItemId::from(*s)).collect(),
            providers: vec!["aws".into()],
            updated_at: ts(0),
            updated_by: "admin".into(),
        }
    }

    fn subsystem(id: &str, add: &[&str], excl: &[&str]) -> Subsystem {
        Subsystem {
            id: id.into(),
            project_id: ProjectId::new(),
            name: id.to_uppercase(),
            description: String::new(),
            additions: add.iter().map(|s| ItemId::from(*s)).collect(),
            exclusions: excl.iter().map(|s| ItemId::from(*s)).collect(),
            created_by: "admin".into(),
            created_at: ts(0),
            updated_at: ts(0),
        }
    }

    fn session(items: &[&str], subsystems: &[Subsystem]) -> EditorSession {
        EditorSession::open(ProjectId::new(), &stack(items), subsystems, None, DEBOUNCE)
    }

    #[test]
    fn opening_is_clean() {
        let s = session(&["a", "b"], &[]);
        assert!(!s.is_dirty());
        assert_eq!(s.effective_items(), &set(&["a", "b"]));
        assert_eq!(s.autosave_deadline(), None);
    }

    #[test]
    fn draft_overrides_committed_stack() {
        let draft = Draft {
            stack: DraftStack {
                items: vec!["z".into()],
                providers: vec![],
            },
            subsystems: BTreeMap::new(),
            locked_by: "alice".into(),
            locked_at: ts(0),
            updated_at: ts(0),
        };
        let s = EditorSession::open(ProjectId::new(), &stack(&["a"]), &[], Some(&draft), DEBOUNCE);
        assert_eq!(s.effective_items(), &set(&["z"]));
        assert!(s.providers().is_empty());
    }

    #[test]
    fn edits_are_debounced() {
        let mut s = session(&["a"], &[]);
        s.toggle_item(ts(1_000), "b".into());
        assert!(s.is_dirty());
        assert_eq!(s.poll_autosave(ts(2_999)), None);

        s.toggle_item(ts(2_500), "c".into());
        assert_eq!(s.poll_autosave(ts(3_000)), None);

        let content = s.poll_autosave(ts(4_500)).expect("debounce elapsed");
        assert_eq!(content.stack.items, vec![ItemId::from("a"), "b".into(), "c".into()]);
        s.mark_saved();
        assert!(!s.is_dirty());
        assert_eq!(s.poll_autosave(ts(10_000)), None);
    }

    #[test]
    fn toggling_back_is_not_dirty() {
        let mut s = session(&["a"], &[]);
        s.toggle_item(ts(0), "b".into());
        s.toggle_item(ts(10), "b".into());
        assert!(!s.is_dirty());
        assert_eq!(s.autosave_deadline(), None);
    }

    #[test]
    fn entering_subsystem_does_not_autosave() {
        let mut s = session(&["a", "b"], &[subsystem("web", &["c"], &["a"])]);
        s.enter_subsystem(&"web".into()).unwrap();
        assert_eq!(s.effective_items(), &set(&["b", "c"]));
        assert!(!s.is_dirty());
        assert_eq!(s.autosave_deadline(), None);

        s.exit_subsystem();
        assert_eq!(s.effective_items(), &set(&["a", "b"]));
        assert!(!s.is_dirty());
    }

    #[test]
    fn edits_inside_subsystem_update_its_delta() {
        let mut s = session(&["a", "b"], &[subsystem("web", &["c"], &["a"])]);
        s.enter_subsystem(&"web".into()).unwrap();
        s.toggle_item(ts(0), "b".into());
        s.toggle_item(ts(0), "a".into());

        let content = s.poll_autosave(ts(5_000)).unwrap();
        assert_eq!(content.stack.items, vec![ItemId::from("a"), "b".into()]);
        let web = &content.subsystems[&SubsystemId::from("web")];
        assert_eq!(web.additions, vec![ItemId::from("c")]);
        assert_eq!(web.exclusions, vec![ItemId::from("b")]);
    }

    #[test]
    fn pending_edit_survives_subsystem_switch() {
        let mut s = session(&["a"], &[subsystem("web", &[], &[])]);
        s.toggle_item(ts(0), "b".into());
        s.enter_subsystem(&"web".into()).unwrap();
        assert!(s.is_dirty());
        let content = s.poll_autosave(ts(2_000)).unwrap();
        assert_eq!(content.stack.items, vec![ItemId::from("a"), "b".into()]);
    }

    #[test]
    fn unknown_subsystem_is_not_found() {
        let mut s = session(&["a"], &[]);
        assert!(matches!(
            s.enter_subsystem(&"nope".into()),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn adding_subsystem_arms_autosave() {
        let mut s = session(&["a"], &[]);
        s.add_subsystem(ts(0), "api".into(), "API");
        assert!(s.is_dirty());
        let content = s.poll_autosave(ts(2_000)).unwrap();
        assert_eq!(content.subsystems[&SubsystemId::from("api")].name, "API");
    }

    #[test]
    fn subsystem_added_during_save_stays_dirty() {
        let mut s = session(&["a"], &[]);
        s.toggle_item(ts(0), "b".into());
        assert!(s.poll_autosave(ts(2_000)).is_some());

        s.add_subsystem(ts(2_500), "api".into(), "API");
        s.mark_saved();
        assert!(s.is_dirty());

        let content = s.poll_autosave(ts(10_000)).expect("structural edit pending");
        assert!(content.subsystems.contains_key(&SubsystemId::from("api")));
        s.mark_saved();
        assert!(!s.is_dirty());
    }

    #[test]
    fn huge_debounce_never_fires_early() {
        let huge = Duration::from_millis(u64::MAX);
        let mut s = EditorSession::open(ProjectId::new(), &stack(&["a"]), &[], None, huge);
        s.toggle_item(ts(1_000), "b".into());
        assert_eq!(s.autosave_deadline(), Some(ts(i64::MAX)));
        assert_eq!(s.poll_autosave(ts(1_000)), None);
    }

    #[test]
    fn failed_save_rearms() {
        let mut s = session(&["a"], &[]);
        s.toggle_item(ts(0), "b".into());
        assert!(s.poll_autosave(ts(2_000)).is_some());
        s.save_failed(ts(2_000));
        assert!(s.is_dirty());
        assert_eq!(s.autosave_deadline(), Some(ts(4_000)));
    }

    #[test]
    fn cancel_drops_pending_save() {
        let mut s = session(&["a"], &[]);
        s.toggle_item(ts(0), "b".into());
        s.cancel_autosave();
        assert_eq!(s.poll_autosave(ts(60_000)), None);
    }

    #[test]
    fn reload_rederives_active_subsystem() {
        let mut s = session(&["a", "b"], &[subsystem("web", &["c"], &[])]);
        s.enter_subsystem(&"web".into()).unwrap();
        s.toggle_item(ts(0), "d".into());

        s.reload(&stack(&["a", "b"]), &[subsystem("web", &["c"], &["b"])]);
        assert_eq!(s.active_subsystem(), Some(&SubsystemId::from("web")));
        assert_eq!(s.effective_items(), &set(&["a", "c"]));
        assert!(!s.is_dirty());
        assert_eq!(s.poll_autosave(ts(60_000)), None);
    }

    #[test]
    fn reload_leaves_deleted_subsystem() {
        let mut s = session(&["a"], &[subsystem("web", &["c"], &[])]);
        s.enter_subsystem(&"web".into()).unwrap();
        s.reload(&stack(&["a", "x"]), &[]);
        assert_eq!(s.active_subsystem(), None);
        assert_eq!(s.effective_items(), &set(&["a", "x"]));
    }
}
