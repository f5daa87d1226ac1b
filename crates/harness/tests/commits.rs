use std::time::Duration;

use stackdraft_core::{DraftSubsystem, Identity, SubsystemId};
use stackdraft_engine::{EngineError, ErrorKind, SubsystemUpdate};
use stackdraft_harness::{
    FailPoint, TestWorkspace, draft_content, item_ids, snapshot_subsystems,
};
use stackdraft_storage::SnapshotStore;

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn init_commit_publishes_draft() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine.save_draft(
        &u1,
        project,
        draft_content(&["a", "b"], &[("s1", "X", &["c"], &["a"])]),
    )?;
    ws.advance(Duration::from_secs(30));
    let commit = ws.engine.commit(&u1, project, "init")?;

    assert_eq!(ws.engine.get_stack(project)?.items, item_ids(&["a", "b"]));

    let subsystems = ws.engine.list_subsystems(project)?;
    assert_eq!(subsystems.len(), 1);
    assert_eq!(subsystems[0].id, SubsystemId::from("s1"));
    assert_eq!(subsystems[0].name, "X");
    assert_eq!(subsystems[0].additions, item_ids(&["c"]));
    assert_eq!(subsystems[0].exclusions, item_ids(&["a"]));
    assert_eq!(subsystems[0].created_by, u1.sub);

    assert_eq!(commit.message, "init");
    assert_eq!(commit.author, "Ursula");
    assert_eq!(commit.author_sub, u1.sub);
    assert_eq!(commit.timestamp, ws.now());
    assert_eq!(
        commit.snapshot.subsystems,
        snapshot_subsystems(&[("s1", "X", &["c"], &["a"])])
    );

    assert_eq!(ws.engine.list_commits(project)?, vec![commit]);
    assert_eq!(ws.engine.get_project(project)?.updated_at, ws.now());
    assert!(ws.engine.get_draft(&u1, project)?.is_none());
    Ok(())
}

#[test]
fn effective_items_follow_committed_subsystem() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine.save_draft(
        &u1,
        project,
        draft_content(&["a", "b"], &[("s1", "X", &["c"], &["a"])]),
    )?;
    ws.engine.commit(&u1, project, "init")?;

    let base = ws.engine.effective_items(project, None)?;
    assert_eq!(base.into_iter().collect::<Vec<_>>(), item_ids(&["a", "b"]));
    let s1 = ws
        .engine
        .effective_items(project, Some(&SubsystemId::from("s1")))?;
    assert_eq!(s1.into_iter().collect::<Vec<_>>(), item_ids(&["b", "c"]));

    let err = ws
        .engine
        .effective_items(project, Some(&SubsystemId::from("nope")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn commit_releases_lock_for_others() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");
    let u2 = ws.editor(project, "u2", "Umar");

    ws.engine
        .save_draft(&u1, project, draft_content(&["a"], &[]))?;
    assert!(ws.engine.get_draft(&u2, project).is_err());
    ws.engine.commit(&u1, project, "first")?;
    assert!(ws.engine.get_draft(&u2, project)?.is_none());
    Ok(())
}

// ============================================================================
// Subsystem reconciliation
// ============================================================================

#[test]
fn omitted_subsystem_is_deleted() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine.save_draft(
        &u1,
        project,
        draft_content(
            &["a"],
            &[("s1", "One", &["b"], &[]), ("s2", "Two", &[], &["a"])],
        ),
    )?;
    ws.engine.commit(&u1, project, "two subsystems")?;
    assert_eq!(ws.engine.list_subsystems(project)?.len(), 2);

    ws.engine.save_draft(
        &u1,
        project,
        draft_content(&["a"], &[("s2", "Two", &[], &["a"])]),
    )?;
    let commit = ws.engine.commit(&u1, project, "drop s1")?;

    let ids: Vec<SubsystemId> = ws
        .engine
        .list_subsystems(project)?
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![SubsystemId::from("s2")]);
    assert!(!commit.snapshot.subsystems.contains_key(&SubsystemId::from("s1")));
    Ok(())
}

#[test]
fn blank_name_keeps_stored_name_and_creation_fields() -> Result<(), Box<dyn std::error::Error>>
{
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");
    let u2 = ws.editor(project, "u2", "Umar");

    let created = ws.engine.create_subsystem(
        &u1,
        project,
        "Payments",
        "card flows",
        item_ids(&["stripe"]),
        vec![],
    )?;
    let created_at = created.created_at;

    ws.advance(Duration::from_secs(60));
    let mut content = draft_content(&["a"], &[]);
    content.subsystems.insert(
        created.id.clone(),
        DraftSubsystem {
            name: String::new(),
            additions: item_ids(&["adyen"]),
            exclusions: vec![],
            description: None,
        },
    );
    ws.engine.save_draft(&u2, project, content)?;
    let commit = ws.engine.commit(&u2, project, "switch processor")?;

    let stored = ws
        .engine
        .storage()
        .get_subsystem(project, &created.id)?
        .ok_or("subsystem missing")?;
    assert_eq!(stored.name, "Payments");
    assert_eq!(stored.description, "card flows");
    assert_eq!(stored.additions, item_ids(&["adyen"]));
    assert_eq!(stored.created_by, u1.sub);
    assert_eq!(stored.created_at, created_at);
    assert_eq!(stored.updated_at, ws.now());
    assert_eq!(commit.snapshot.subsystems[&created.id].name, "Payments");
    Ok(())
}

#[test]
fn direct_subsystem_edits_touch_project() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    let created = ws
        .engine
        .create_subsystem(&u1, project, "Search", "", vec![], vec![])?;
    ws.advance(Duration::from_secs(5));
    let updated = ws.engine.update_subsystem(
        &u1,
        project,
        &created.id,
        SubsystemUpdate {
            exclusions: Some(item_ids(&["solr"])),
            ..SubsystemUpdate::default()
        },
    )?;
    assert_eq!(updated.name, "Search");
    assert_eq!(updated.exclusions, item_ids(&["solr"]));
    assert_eq!(ws.engine.get_project(project)?.updated_at, ws.now());

    let err = ws
        .engine
        .update_subsystem(
            &u1,
            project,
            &created.id,
            SubsystemUpdate {
                name: Some("  ".into()),
                ..SubsystemUpdate::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    ws.engine.delete_subsystem(&u1, project, &created.id)?;
    let err = ws
        .engine
        .delete_subsystem(&u1, project, &created.id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn blank_message_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine
        .save_draft(&u1, project, draft_content(&["a"], &[]))?;
    for message in ["", "   \n"] {
        let err = ws.engine.commit(&u1, project, message).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
    assert!(ws.engine.list_commits(project)?.is_empty());
    assert!(ws.engine.get_draft(&u1, project)?.is_some());
    Ok(())
}

#[test]
fn commit_without_draft_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    let err = ws.engine.commit(&u1, project, "nothing").unwrap_err();
    assert!(matches!(err, EngineError::NoDraftToCommit(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    Ok(())
}

#[test]
fn non_editor_cannot_commit() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let outsider = Identity::new("viewer", "Vera");
    let err = ws.engine.commit(&outsider, project, "sneaky").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    Ok(())
}

#[test]
fn stale_draft_cannot_commit_over_new_holder() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::new()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");
    let u2 = ws.editor(project, "u2", "Umar");

    ws.engine
        .save_draft(&u1, project, draft_content(&["old"], &[]))?;
    ws.advance(Duration::from_secs(31 * 60));
    ws.engine
        .save_draft(&u2, project, draft_content(&["new"], &[]))?;

    let err = ws.engine.commit(&u1, project, "late").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Locked);
    assert!(ws.engine.get_stack(project)?.items.is_empty());
    Ok(())
}

// ============================================================================
// Partial failure
// ============================================================================

#[test]
fn failed_append_leaves_draft_for_retry() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::flaky()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine.save_draft(
        &u1,
        project,
        draft_content(&["a", "b"], &[("s1", "X", &["c"], &[])]),
    )?;
    ws.engine.storage_mut().fail_on(FailPoint::AppendCommit);

    let err = ws.engine.commit(&u1, project, "init").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    // Canonical state was already written; the log and draft were not touched.
    assert_eq!(ws.engine.get_stack(project)?.items, item_ids(&["a", "b"]));
    assert_eq!(ws.engine.list_subsystems(project)?.len(), 1);
    assert!(ws.engine.list_commits(project)?.is_empty());
    assert!(ws.engine.get_draft(&u1, project)?.is_some());

    ws.engine.storage_mut().heal();
    let commit = ws.engine.commit(&u1, project, "init")?;
    assert_eq!(ws.engine.list_commits(project)?, vec![commit]);
    assert_eq!(ws.engine.list_subsystems(project)?.len(), 1);
    assert!(ws.engine.get_draft(&u1, project)?.is_none());
    Ok(())
}

#[test]
fn failed_stack_write_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::flaky()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine
        .save_draft(&u1, project, draft_content(&["a"], &[("s1", "X", &[], &[])]))?;
    ws.engine.storage_mut().fail_on(FailPoint::PutStack);

    let err = ws.engine.commit(&u1, project, "init").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(ws.engine.get_stack(project)?.items.is_empty());
    assert!(ws.engine.list_subsystems(project)?.is_empty());
    assert!(ws.engine.get_draft(&u1, project)?.is_some());
    Ok(())
}

#[test]
fn failed_release_duplicates_commit_on_retry() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::flaky()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine
        .save_draft(&u1, project, draft_content(&["a"], &[]))?;
    ws.engine.storage_mut().fail_on(FailPoint::DeleteDraft);
    assert!(ws.engine.commit(&u1, project, "init").is_err());
    assert_eq!(ws.engine.list_commits(project)?.len(), 1);

    // At-least-once: the retry appends a second entry with the same content.
    ws.engine.storage_mut().heal();
    ws.advance(Duration::from_secs(1));
    ws.engine.commit(&u1, project, "init")?;
    let commits = ws.engine.list_commits(project)?;
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].snapshot, commits[1].snapshot);
    assert_ne!(commits[0].id, commits[1].id);
    assert!(ws.engine.get_draft(&u1, project)?.is_none());
    Ok(())
}

#[test]
fn failed_save_surfaces_storage_failure() -> Result<(), Box<dyn std::error::Error>> {
    let mut ws = TestWorkspace::flaky()?;
    let project = ws.project("Platform")?;
    let u1 = ws.editor(project, "u1", "Ursula");

    ws.engine.storage_mut().fail_on(FailPoint::PutDraft);
    let err = ws
        .engine
        .save_draft(&u1, project, draft_content(&["a"], &[]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(ws.engine.get_draft(&u1, project)?.is_none());
    Ok(())
}
