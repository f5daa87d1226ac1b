use rusqlite::{Connection, OptionalExtension};
use serde::{Serialize, de::DeserializeOwned};

use stackdraft_core::{
    ids::*,
    records::{Commit, Draft, DraftContent, DraftEntry, Project, Snapshot, Stack, Subsystem},
    time::Timestamp,
};

use crate::error::StorageError;
use crate::traits::SnapshotStore;

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec_named(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

type ProjectRow = (Vec<u8>, String, String, String, i64, i64);

fn read_project(row: ProjectRow) -> Result<Project, StorageError> {
    let (id_bytes, name, description, created_by, created_at, updated_at) = row;
    Ok(Project {
        id: ProjectId::from_bytes(to_array::<16>(id_bytes, "project_id")?),
        name,
        description,
        created_by: UserSub::from(created_by),
        created_at: Timestamp::from_millis(created_at),
        updated_at: Timestamp::from_millis(updated_at),
    })
}

type SubsystemRow = (Vec<u8>, String, String, String, Vec<u8>, Vec<u8>, String, i64, i64);

const SUBSYSTEM_COLUMNS: &str =
    "project_id, subsystem_id, name, description, additions, exclusions, \
     created_by, created_at, updated_at";

fn subsystem_row(row: &rusqlite::Row) -> rusqlite::Result<SubsystemRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn read_subsystem(row: SubsystemRow) -> Result<Subsystem, StorageError> {
    let (
        project_bytes,
        id,
        name,
        description,
        additions,
        exclusions,
        created_by,
        created_at,
        updated_at,
    ) = row;
    Ok(Subsystem {
        id: SubsystemId::from(id),
        project_id: ProjectId::from_bytes(to_array::<16>(project_bytes, "project_id")?),
        name,
        description,
        additions: decode(&additions)?,
        exclusions: decode(&exclusions)?,
        created_by: UserSub::from(created_by),
        created_at: Timestamp::from_millis(created_at),
        updated_at: Timestamp::from_millis(updated_at),
    })
}

type DraftRow = (Vec<u8>, String, Vec<u8>, String, i64, i64);

const DRAFT_COLUMNS: &str = "project_id, user_sub, content, locked_by, locked_at, updated_at";

fn draft_row(row: &rusqlite::Row) -> rusqlite::Result<DraftRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn read_draft(row: DraftRow) -> Result<DraftEntry, StorageError> {
    let (project_bytes, user_sub, content, locked_by, locked_at, updated_at) = row;
    let content: DraftContent = decode(&content)?;
    Ok(DraftEntry {
        project_id: ProjectId::from_bytes(to_array::<16>(project_bytes, "project_id")?),
        user_sub: UserSub::from(user_sub),
        draft: Draft {
            stack: content.stack,
            subsystems: content.subsystems,
            locked_by: UserSub::from(locked_by),
            locked_at: Timestamp::from_millis(locked_at),
            updated_at: Timestamp::from_millis(updated_at),
        },
    })
}

impl SnapshotStore for SqliteStorage {
    fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>, StorageError> {
        let row: Option<ProjectRow> = self
            .conn
            .query_row(
                "SELECT project_id, name, description, created_by, created_at, updated_at
                 FROM projects WHERE project_id = ?1",
                rusqlite::params![project_id.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;
        row.map(read_project).transpose()
    }

    fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, name, description, created_by, created_at, updated_at
             FROM projects ORDER BY created_at, name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(read_project(row?)?);
        }
        Ok(result)
    }

    fn put_project(&mut self, project: &Project) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO projects
                (project_id, name, description, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (project_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at",
            rusqlite::params![
                project.id.as_bytes().as_slice(),
                project.name,
                project.description,
                project.created_by.as_str(),
                project.created_at.as_millis(),
                project.updated_at.as_millis(),
            ],
        )?;
        Ok(())
    }

    fn delete_project(&mut self, project_id: ProjectId) -> Result<(), StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM projects WHERE project_id = ?1",
            rusqlite::params![project_id.as_bytes().as_slice()],
        )?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("project {project_id}")));
        }
        Ok(())
    }

    fn get_stack(&self, project_id: ProjectId) -> Result<Option<Stack>, StorageError> {
        let row: Option<(Vec<u8>, Vec<u8>, i64, String)> = self
            .conn
            .query_row(
                "SELECT items, providers, updated_at, updated_by FROM stacks WHERE project_id = ?1",
                rusqlite::params![project_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        match row {
            Some((items, providers, updated_at, updated_by)) => Ok(Some(Stack {
                items: decode(&items)?,
                providers: decode(&providers)?,
                updated_at: Timestamp::from_millis(updated_at),
                updated_by: UserSub::from(updated_by),
            })),
            None => Ok(None),
        }
    }

    fn put_stack(&mut self, project_id: ProjectId, stack: &Stack) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO stacks (project_id, items, providers, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (project_id) DO UPDATE SET
                items = excluded.items,
                providers = excluded.providers,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by",
            rusqlite::params![
                project_id.as_bytes().as_slice(),
                encode(&stack.items)?,
                encode(&stack.providers)?,
                stack.updated_at.as_millis(),
                stack.updated_by.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_subsystem(
        &self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<Option<Subsystem>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SUBSYSTEM_COLUMNS} FROM subsystems
                     WHERE project_id = ?1 AND subsystem_id = ?2"
                ),
                rusqlite::params![project_id.as_bytes().as_slice(), subsystem_id.as_str()],
                subsystem_row,
            )
            .optional()?;
        row.map(read_subsystem).transpose()
    }

    fn list_subsystems(&self, project_id: ProjectId) -> Result<Vec<Subsystem>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBSYSTEM_COLUMNS} FROM subsystems
             WHERE project_id = ?1 ORDER BY created_at, subsystem_id"
        ))?;
        let rows = stmt.query_map(
            rusqlite::params![project_id.as_bytes().as_slice()],
            subsystem_row,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(read_subsystem(row?)?);
        }
        Ok(result)
    }

    fn put_subsystem(&mut self, subsystem: &Subsystem) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO subsystems
                (project_id, subsystem_id, name, description, additions, exclusions,
                 created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (project_id, subsystem_id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                additions = excluded.additions,
                exclusions = excluded.exclusions,
                created_by = excluded.created_by,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                subsystem.project_id.as_bytes().as_slice(),
                subsystem.id.as_str(),
                subsystem.name,
                subsystem.description,
                encode(&subsystem.additions)?,
                encode(&subsystem.exclusions)?,
                subsystem.created_by.as_str(),
                subsystem.created_at.as_millis(),
                subsystem.updated_at.as_millis(),
            ],
        )?;
        Ok(())
    }

    fn delete_subsystem(
        &mut self,
        project_id: ProjectId,
        subsystem_id: &SubsystemId,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM subsystems WHERE project_id = ?1 AND subsystem_id = ?2",
            rusqlite::params![project_id.as_bytes().as_slice(), subsystem_id.as_str()],
        )?;
        Ok(())
    }

    fn get_draft(
        &self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<Option<Draft>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {DRAFT_COLUMNS} FROM drafts WHERE project_id = ?1 AND user_sub = ?2"
                ),
                rusqlite::params![project_id.as_bytes().as_slice(), user_sub.as_str()],
                draft_row,
            )
            .optional()?;
        Ok(row.map(read_draft).transpose()?.map(|entry| entry.draft))
    }

    fn list_project_drafts(&self, project_id: ProjectId) -> Result<Vec<DraftEntry>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts WHERE project_id = ?1 ORDER BY locked_at, user_sub"
        ))?;
        let rows = stmt.query_map(rusqlite::params![project_id.as_bytes().as_slice()], draft_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(read_draft(row?)?);
        }
        Ok(result)
    }

    fn list_all_drafts(&self) -> Result<Vec<DraftEntry>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts ORDER BY locked_at, user_sub"
        ))?;
        let rows = stmt.query_map([], draft_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(read_draft(row?)?);
        }
        Ok(result)
    }

    fn put_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
        draft: &Draft,
    ) -> Result<(), StorageError> {
        let content = encode(&draft.content())?;
        self.conn.execute(
            "INSERT INTO drafts (project_id, user_sub, content, locked_by, locked_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (project_id, user_sub) DO UPDATE SET
                content = excluded.content,
                locked_by = excluded.locked_by,
                locked_at = excluded.locked_at,
                updated_at = excluded.updated_at",
            rusqlite::params![
                project_id.as_bytes().as_slice(),
                user_sub.as_str(),
                content,
                draft.locked_by.as_str(),
                draft.locked_at.as_millis(),
                draft.updated_at.as_millis(),
            ],
        )?;
        Ok(())
    }

    fn delete_draft(
        &mut self,
        project_id: ProjectId,
        user_sub: &UserSub,
    ) -> Result<bool, StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM drafts WHERE project_id = ?1 AND user_sub = ?2",
            rusqlite::params![project_id.as_bytes().as_slice(), user_sub.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn append_commit(
        &mut self,
        project_id: ProjectId,
        commit: &Commit,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO commits
                (commit_id, project_id, message, author, author_sub, timestamp, snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                commit.id.as_bytes().as_slice(),
                project_id.as_bytes().as_slice(),
                commit.message,
                commit.author,
                commit.author_sub.as_str(),
                commit.timestamp.as_millis(),
                encode(&commit.snapshot)?,
            ],
        )?;
        Ok(())
    }

    fn list_commits(&self, project_id: ProjectId) -> Result<Vec<Commit>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT commit_id, message, author, author_sub, timestamp, snapshot FROM commits
             WHERE project_id = ?1 ORDER BY timestamp DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![project_id.as_bytes().as_slice()],
            |row| {
                let id_bytes: Vec<u8> = row.get(0)?;
                let message: String = row.get(1)?;
                let author: String = row.get(2)?;
                let author_sub: String = row.get(3)?;
                let timestamp: i64 = row.get(4)?;
                let snapshot: Vec<u8> = row.get(5)?;
                Ok((id_bytes, message, author, author_sub, timestamp, snapshot))
            },
        )?;
        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, message, author, author_sub, timestamp, snapshot) = row?;
            let snapshot: Snapshot = decode(&snapshot)?;
            result.push(Commit {
                id: CommitId::from_bytes(to_array::<16>(id_bytes, "commit_id")?),
                message,
                author,
                author_sub: UserSub::from(author_sub),
                timestamp: Timestamp::from_millis(timestamp),
                snapshot,
            });
        }
        Ok(result)
    }
}
