use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;

use super::schema::SCHEMA;
use super::{Store, WriteBatch};
use crate::error::{Error, Result};
use crate::types::*;

const LIFECYCLE_COLUMNS: &str =
    "archived, archived_by, archived_on, created_by, created_on, last_modified_by, updated_on";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database, already initialized.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn lifecycle_from_row(row: &Row<'_>, start: usize) -> rusqlite::Result<Lifecycle> {
    Ok(Lifecycle {
        archived: row.get(start)?,
        archived_by: row.get(start + 1)?,
        archived_on: row
            .get::<_, Option<String>>(start + 2)?
            .map(|s| parse_datetime(&s)),
        created_by: row.get(start + 3)?,
        created_on: parse_datetime(&row.get::<_, String>(start + 4)?),
        last_modified_by: row.get(start + 5)?,
        updated_on: parse_datetime(&row.get::<_, String>(start + 6)?),
    })
}

fn map_insert_error(err: rusqlite::Error, what: String) -> Error {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(format!("{what} already exists"))
        }
        other => Error::Database(other),
    }
}

// Organizations

fn org_select(filter: &str) -> String {
    format!("SELECT id, name, permissions, custom, {LIFECYCLE_COLUMNS} FROM organizations {filter}")
}

fn org_from_row(row: &Row<'_>) -> rusqlite::Result<Organization> {
    Ok(Organization {
        id: row.get(0)?,
        name: row.get(1)?,
        permissions: json_column(row, 2)?,
        custom: json_column(row, 3)?,
        lifecycle: lifecycle_from_row(row, 4)?,
    })
}

fn load_orgs(conn: &Connection) -> Result<Vec<Organization>> {
    let mut stmt = conn.prepare(&org_select("ORDER BY id"))?;
    let rows = stmt.query_map([], org_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn insert_org(conn: &Connection, org: &Organization) -> Result<()> {
    let lc = &org.lifecycle;
    conn.execute(
        &format!(
            "INSERT INTO organizations (id, name, permissions, custom, {LIFECYCLE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            org.id,
            org.name,
            serde_json::to_string(&org.permissions)?,
            serde_json::to_string(&org.custom)?,
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.created_by,
            format_datetime(&lc.created_on),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
        ],
    )
    .map_err(|e| map_insert_error(e, format!("organization {}", org.id)))?;
    Ok(())
}

fn update_org(conn: &Connection, org: &Organization) -> Result<()> {
    let lc = &org.lifecycle;
    let rows = conn.execute(
        "UPDATE organizations SET name = ?1, permissions = ?2, custom = ?3, archived = ?4,
             archived_by = ?5, archived_on = ?6, last_modified_by = ?7, updated_on = ?8
         WHERE id = ?9",
        params![
            org.name,
            serde_json::to_string(&org.permissions)?,
            serde_json::to_string(&org.custom)?,
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
            org.id,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(org.id.clone()));
    }
    Ok(())
}

// Projects

fn project_select(filter: &str) -> String {
    format!(
        "SELECT org_id, id, name, permissions, custom, visibility, {LIFECYCLE_COLUMNS}
         FROM projects {filter}"
    )
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    let visibility = match row.get::<_, String>(5)?.as_str() {
        "internal" => Visibility::Internal,
        _ => Visibility::Private,
    };
    Ok(Project {
        org: row.get(0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        permissions: json_column(row, 3)?,
        custom: json_column(row, 4)?,
        visibility,
        lifecycle: lifecycle_from_row(row, 6)?,
    })
}

fn load_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&project_select("ORDER BY org_id, id"))?;
    let rows = stmt.query_map([], project_from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    let lc = &project.lifecycle;
    conn.execute(
        &format!(
            "INSERT INTO projects (org_id, id, name, permissions, custom, visibility, {LIFECYCLE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            project.org,
            project.id,
            project.name,
            serde_json::to_string(&project.permissions)?,
            serde_json::to_string(&project.custom)?,
            project.visibility.as_str(),
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.created_by,
            format_datetime(&lc.created_on),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
        ],
    )
    .map_err(|e| map_insert_error(e, format!("project {}", project.full_id())))?;
    Ok(())
}

fn update_project(conn: &Connection, project: &Project) -> Result<()> {
    let lc = &project.lifecycle;
    let rows = conn.execute(
        "UPDATE projects SET name = ?1, permissions = ?2, custom = ?3, visibility = ?4,
             archived = ?5, archived_by = ?6, archived_on = ?7, last_modified_by = ?8,
             updated_on = ?9
         WHERE org_id = ?10 AND id = ?11",
        params![
            project.name,
            serde_json::to_string(&project.permissions)?,
            serde_json::to_string(&project.custom)?,
            project.visibility.as_str(),
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
            project.org,
            project.id,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(project.full_id()));
    }
    Ok(())
}

// Elements

fn insert_element(conn: &Connection, element: &Element) -> Result<()> {
    conn.execute(
        "INSERT INTO elements (org_id, project_id, id, name, parent_id, created_by, created_on)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            element.org,
            element.project,
            element.id,
            element.name,
            element.parent,
            element.created_by,
            format_datetime(&element.created_on),
        ],
    )
    .map_err(|e| {
        map_insert_error(
            e,
            format!("element {}:{}:{}", element.org, element.project, element.id),
        )
    })?;
    Ok(())
}

// Users

fn user_select(filter: &str) -> String {
    format!(
        "SELECT username, fname, lname, preferred_name, email, custom, admin, provider,
             {LIFECYCLE_COLUMNS}
         FROM users {filter}"
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        fname: row.get(1)?,
        lname: row.get(2)?,
        preferred_name: row.get(3)?,
        email: row.get(4)?,
        custom: json_column(row, 5)?,
        admin: row.get(6)?,
        provider: row.get(7)?,
        lifecycle: lifecycle_from_row(row, 8)?,
    })
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    let lc = &user.lifecycle;
    conn.execute(
        &format!(
            "INSERT INTO users (username, fname, lname, preferred_name, email, custom, admin,
                 provider, {LIFECYCLE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ),
        params![
            user.username,
            user.fname,
            user.lname,
            user.preferred_name,
            user.email,
            serde_json::to_string(&user.custom)?,
            user.admin,
            user.provider,
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.created_by,
            format_datetime(&lc.created_on),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
        ],
    )
    .map_err(|e| map_insert_error(e, format!("user {}", user.username)))?;
    Ok(())
}

fn update_user(conn: &Connection, user: &User) -> Result<()> {
    let lc = &user.lifecycle;
    let rows = conn.execute(
        "UPDATE users SET fname = ?1, lname = ?2, preferred_name = ?3, email = ?4, custom = ?5,
             admin = ?6, archived = ?7, archived_by = ?8, archived_on = ?9,
             last_modified_by = ?10, updated_on = ?11
         WHERE username = ?12",
        params![
            user.fname,
            user.lname,
            user.preferred_name,
            user.email,
            serde_json::to_string(&user.custom)?,
            user.admin,
            lc.archived,
            lc.archived_by,
            lc.archived_on.as_ref().map(format_datetime),
            lc.last_modified_by,
            format_datetime(&lc.updated_on),
            user.username,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(user.username.clone()));
    }
    Ok(())
}

// Tokens

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        username: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn commit(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for user in &batch.insert_users {
            insert_user(&tx, user)?;
        }
        for org in &batch.insert_orgs {
            insert_org(&tx, org)?;
        }
        for project in &batch.insert_projects {
            insert_project(&tx, project)?;
        }
        for element in &batch.insert_elements {
            insert_element(&tx, element)?;
        }
        for user in &batch.update_users {
            update_user(&tx, user)?;
        }
        for org in &batch.update_orgs {
            update_org(&tx, org)?;
        }
        for project in &batch.update_projects {
            update_project(&tx, project)?;
        }

        tx.commit()?;
        Ok(())
    }

    // Organization operations

    fn find_orgs(&self, ids: &[String]) -> Result<Vec<Organization>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&org_select("WHERE id = ?1"))?;
        let mut orgs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(org) = stmt.query_row(params![id], org_from_row).optional()? {
                orgs.push(org);
            }
        }
        Ok(orgs)
    }

    fn list_orgs(&self) -> Result<Vec<Organization>> {
        load_orgs(&self.conn())
    }

    fn delete_orgs(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute("DELETE FROM organizations WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    // Project operations

    fn find_projects(&self, org_id: &str, ids: &[String]) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&project_select("WHERE org_id = ?1 AND id = ?2"))?;
        let mut projects = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(project) = stmt
                .query_row(params![org_id, id], project_from_row)
                .optional()?
            {
                projects.push(project);
            }
        }
        Ok(projects)
    }

    fn list_org_projects(&self, org_id: &str) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&project_select("WHERE org_id = ?1 ORDER BY id"))?;
        let rows = stmt.query_map(params![org_id], project_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_projects(&self, org_id: &str, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute(
                "DELETE FROM projects WHERE org_id = ?1 AND id = ?2",
                params![org_id, id],
            )?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    // Element operations

    fn list_project_elements(&self, org_id: &str, project_id: &str) -> Result<Vec<Element>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT org_id, project_id, id, name, parent_id, created_by, created_on
             FROM elements WHERE org_id = ?1 AND project_id = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![org_id, project_id], |row| {
            Ok(Element {
                org: row.get(0)?,
                project: row.get(1)?,
                id: row.get(2)?,
                name: row.get(3)?,
                parent: row.get(4)?,
                created_by: row.get(5)?,
                created_on: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // User operations

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &user_select("WHERE username = ?1"),
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn find_users(&self, usernames: &[String]) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&user_select("WHERE username = ?1"))?;
        let mut users = Vec::with_capacity(usernames.len());
        for username in usernames {
            if let Some(user) = stmt.query_row(params![username], user_from_row).optional()? {
                users.push(user);
            }
        }
        Ok(users)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&user_select("ORDER BY username"))?;
        let rows = stmt.query_map([], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_users(&self, usernames: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for mut org in load_orgs(&tx)? {
            let before = org.permissions.len();
            org.permissions.retain(|u, _| !usernames.contains(u));
            if org.permissions.len() != before {
                update_org(&tx, &org)?;
            }
        }
        for mut project in load_projects(&tx)? {
            let before = project.permissions.len();
            project.permissions.retain(|u, _| !usernames.contains(u));
            if project.permissions.len() != before {
                update_project(&tx, &project)?;
            }
        }

        let mut deleted = 0;
        for username in usernames {
            deleted += tx.execute("DELETE FROM users WHERE username = ?1", params![username])?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, username, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.username,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::Database(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, username, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }
}
