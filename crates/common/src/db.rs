//! SQLite-backed profile store
//!
//! Enforces the server-side profile rules the control API promises: unique
//! case-sensitive names, exactly one default, at least one profile, and a
//! current profile that always resolves. Every mutating operation runs in a
//! single transaction so concurrent callers cannot break those rules.

use crate::types::*;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tracing::debug;

const PROFILE_COLUMNS: &str = "id, name, description, is_default, slide_style_id, deck_prompt_id, \
     genie_space, created_at, created_by, updated_at, updated_by";

const CURRENT_PROFILE_KEY: &str = "current_profile_id";

/// Actor recorded on rows the store seeds itself
const SYSTEM_ACTOR: &str = "system";

/// Slide style assigned when a create request names none
pub const DEFAULT_SLIDE_STYLE_ID: i64 = 1;

/// Profile store shared by the stub control API and the simulated UI
#[derive(Clone)]
pub struct ProfileStore {
    conn: Arc<Mutex<Connection>>,
}

impl ProfileStore {
    /// Open an in-memory store
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        store.seed()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slide_styles (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            -- AUTOINCREMENT keeps ids of deleted profiles from being reused
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                slide_style_id INTEGER REFERENCES slide_styles(id),
                deck_prompt_id INTEGER,
                genie_space TEXT,
                created_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_profiles_single_default
                ON profiles(is_default) WHERE is_default = 1;

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                profile_id INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        debug!("Profile schema initialized");
        Ok(())
    }

    /// Seed slide styles and the initial default profile on an empty store
    fn seed(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for (id, name) in [(1, "Default"), (2, "Corporate"), (3, "Minimal")] {
            tx.execute(
                "INSERT OR IGNORE INTO slide_styles (id, name) VALUES (?1, ?2)",
                params![id, name],
            )?;
        }

        let count: i64 = tx.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
        if count == 0 {
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO profiles (name, description, is_default, slide_style_id, \
                 created_at, created_by, updated_at, updated_by) \
                 VALUES ('Default', 'Default profile', 1, ?1, ?2, ?3, ?2, ?3)",
                params![DEFAULT_SLIDE_STYLE_ID, now, SYSTEM_ACTOR],
            )?;
            let id = tx.last_insert_rowid();
            set_current(&tx, id)?;
            debug!("Seeded default profile {}", id);
        }

        tx.commit()?;
        Ok(())
    }

    /// Defaults merged under every create request
    pub fn default_attributes() -> ProfileAttributes {
        ProfileAttributes {
            slide_style_id: Some(DEFAULT_SLIDE_STYLE_ID),
            ..Default::default()
        }
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    /// List all profiles in creation order
    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles ORDER BY id ASC",
            PROFILE_COLUMNS
        ))?;

        let rows = stmt.query_map([], RawProfile::from_row)?;
        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?.parse()?);
        }
        Ok(profiles)
    }

    /// Get a profile by id
    pub fn get_profile(&self, id: ProfileId) -> Result<Profile> {
        let conn = self.conn.lock();
        fetch_profile(&conn, id)?.ok_or_else(|| Error::not_found("profile", id))
    }

    /// Find a profile by exact name
    pub fn find_by_name(&self, name: &str) -> Result<Option<Profile>> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM profiles WHERE name = ?1", PROFILE_COLUMNS),
                params![name],
                RawProfile::from_row,
            )
            .optional()?;
        raw.map(RawProfile::parse).transpose()
    }

    /// Create a profile; fails with `Conflict` when the name is taken
    pub fn create_profile(&self, request: &NewProfile, actor: &str) -> Result<Profile> {
        let name = validate_name(&request.name)?;
        let attributes = request.attributes.merged_over(&Self::default_attributes());

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        if name_taken(&tx, name, None)? {
            return Err(Error::conflict(name));
        }
        check_slide_style(&tx, attributes.slide_style_id)?;

        let id = insert_profile(&tx, name, &attributes, actor)?;
        let profile = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        tx.commit()?;

        debug!("Created profile {} ({})", profile.id, profile.name);
        Ok(profile)
    }

    /// Apply the fields present in `update`
    pub fn update_profile(&self, id: ProfileId, update: &ProfileUpdate, actor: &str) -> Result<Profile> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        let name = match &update.name {
            Some(name) => {
                let name = validate_name(name)?;
                if name_taken(&tx, name, Some(id))? {
                    return Err(Error::conflict(name));
                }
                name.to_string()
            }
            None => existing.name.clone(),
        };
        let attributes = update.apply_to(&existing.attributes());
        check_slide_style(&tx, attributes.slide_style_id)?;

        tx.execute(
            "UPDATE profiles SET name = ?1, description = ?2, slide_style_id = ?3, \
             deck_prompt_id = ?4, genie_space = ?5, updated_at = ?6, updated_by = ?7 WHERE id = ?8",
            params![
                name,
                attributes.description,
                attributes.slide_style_id,
                attributes.deck_prompt_id,
                encode_genie_space(&attributes.genie_space)?,
                Utc::now().to_rfc3339(),
                actor,
                id,
            ],
        )?;
        let profile = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        tx.commit()?;

        debug!("Updated profile {}", id);
        Ok(profile)
    }

    /// Delete a profile
    ///
    /// The sole remaining profile is protected. Deleting the default promotes
    /// the oldest remaining profile; deleting the current profile makes the
    /// default current.
    pub fn delete_profile(&self, id: ProfileId) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
        if count <= 1 {
            return Err(Error::last_profile());
        }

        tx.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;

        if existing.is_default {
            tx.execute(
                "UPDATE profiles SET is_default = 1 WHERE id = (SELECT MIN(id) FROM profiles)",
                [],
            )?;
        }
        if current_id(&tx)? == Some(id) {
            let default_id = default_id(&tx)?;
            set_current(&tx, default_id)?;
        }

        tx.commit()?;
        debug!("Deleted profile {}", id);
        Ok(())
    }

    /// Move the default flag to `id`
    pub fn set_default(&self, id: ProfileId, actor: &str) -> Result<Profile> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        tx.execute("UPDATE profiles SET is_default = 0 WHERE is_default = 1", [])?;
        tx.execute(
            "UPDATE profiles SET is_default = 1, updated_at = ?1, updated_by = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), actor, id],
        )?;
        let profile = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        tx.commit()?;

        debug!("Default profile is now {}", id);
        Ok(profile)
    }

    /// Make `id` the current profile
    pub fn load_profile(&self, id: ProfileId) -> Result<LoadResponse> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        set_current(&tx, id)?;
        tx.commit()?;

        Ok(LoadResponse {
            status: "reloaded".to_string(),
            profile_id: id,
        })
    }

    /// Currently loaded profile
    pub fn current_profile(&self) -> Result<Profile> {
        let conn = self.conn.lock();
        if let Some(id) = current_id(&conn)? {
            if let Some(profile) = fetch_profile(&conn, id)? {
                return Ok(profile);
            }
        }
        let id = default_id(&conn)?;
        fetch_profile(&conn, id)?.ok_or_else(|| Error::Internal("no default profile".to_string()))
    }

    /// Copy attributes and associations of `id` under a new name
    pub fn duplicate_profile(&self, id: ProfileId, name: &str, actor: &str) -> Result<Profile> {
        let name = validate_name(name)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let source = fetch_profile(&tx, id)?.ok_or_else(|| Error::not_found("profile", id))?;
        if name_taken(&tx, name, None)? {
            return Err(Error::conflict(name));
        }

        let new_id = insert_profile(&tx, name, &source.attributes(), actor)?;
        let profile =
            fetch_profile(&tx, new_id)?.ok_or_else(|| Error::not_found("profile", new_id))?;
        tx.commit()?;

        debug!("Duplicated profile {} as {}", id, new_id);
        Ok(profile)
    }

    /// Slide styles offered by the wizard
    pub fn list_slide_styles(&self) -> Result<Vec<SlideStyle>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name FROM slide_styles ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(SlideStyle {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut styles = Vec::new();
        for row in rows {
            styles.push(row?);
        }
        Ok(styles)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Start a session bound to the current profile
    pub fn create_session(&self) -> Result<Session> {
        let profile = self.current_profile()?;
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            profile_id: profile.id,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (id, profile_id, created_at) VALUES (?1, ?2, ?3)",
            params![session.id, session.profile_id, session.created_at.to_rfc3339()],
        )?;

        debug!("Created session {} on profile {}", session.id, session.profile_id);
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Session> {
        let conn = self.conn.lock();
        fetch_session(&conn, id)?.ok_or_else(|| Error::not_found("session", id))
    }

    /// Restore a session, switching the current profile back to the
    /// session's profile when another one is loaded
    pub fn restore_session(&self, id: &str) -> Result<RestoreOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let session = fetch_session(&tx, id)?.ok_or_else(|| Error::not_found("session", id))?;
        if fetch_profile(&tx, session.profile_id)?.is_none() {
            return Err(Error::not_found("profile", session.profile_id));
        }

        let switched = current_id(&tx)? != Some(session.profile_id);
        if switched {
            set_current(&tx, session.profile_id)?;
        }
        tx.commit()?;

        Ok(RestoreOutcome {
            session_id: session.id,
            profile_id: session.profile_id,
            switched,
        })
    }
}

fn validate_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("name must not be empty".to_string()));
    }
    Ok(name)
}

fn name_taken(conn: &Connection, name: &str, except: Option<ProfileId>) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE name = ?1 AND id != ?2",
        params![name, except.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn check_slide_style(conn: &Connection, slide_style_id: Option<i64>) -> Result<()> {
    let Some(style_id) = slide_style_id else {
        return Ok(());
    };
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM slide_styles WHERE id = ?1",
        params![style_id],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(Error::InvalidInput(format!("unknown slide style {}", style_id)));
    }
    Ok(())
}

fn insert_profile(
    conn: &Connection,
    name: &str,
    attributes: &ProfileAttributes,
    actor: &str,
) -> Result<ProfileId> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO profiles (name, description, is_default, slide_style_id, deck_prompt_id, \
         genie_space, created_at, created_by, updated_at, updated_by) \
         VALUES (?1, ?2, 0, ?3, ?4, ?5, ?6, ?7, ?6, ?7)",
        params![
            name,
            attributes.description,
            attributes.slide_style_id,
            attributes.deck_prompt_id,
            encode_genie_space(&attributes.genie_space)?,
            now,
            actor,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn fetch_profile(conn: &Connection, id: ProfileId) -> Result<Option<Profile>> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
            params![id],
            RawProfile::from_row,
        )
        .optional()?;
    raw.map(RawProfile::parse).transpose()
}

fn fetch_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let row: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT id, profile_id, created_at FROM sessions WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        Some((id, profile_id, created_at)) => Ok(Some(Session {
            id,
            profile_id,
            created_at: parse_timestamp(&created_at)?,
        })),
        None => Ok(None),
    }
}

fn current_id(conn: &Connection) -> Result<Option<ProfileId>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![CURRENT_PROFILE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

fn set_current(conn: &Connection, id: ProfileId) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
        params![CURRENT_PROFILE_KEY, id.to_string(), Utc::now().timestamp()],
    )?;
    Ok(())
}

fn default_id(conn: &Connection) -> Result<ProfileId> {
    let id = conn
        .query_row("SELECT id FROM profiles WHERE is_default = 1", [], |row| row.get(0))
        .optional()?;
    id.ok_or_else(|| Error::Internal("no default profile".to_string()))
}

fn encode_genie_space(space: &Option<GenieSpace>) -> Result<Option<String>> {
    space.as_ref().map(serde_json::to_string).transpose().map_err(Error::from)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad timestamp {:?}: {}", value, e)))
}

/// Raw database row before parsing
struct RawProfile {
    id: i64,
    name: String,
    description: Option<String>,
    is_default: bool,
    slide_style_id: Option<i64>,
    deck_prompt_id: Option<i64>,
    genie_space: Option<String>,
    created_at: String,
    created_by: String,
    updated_at: String,
    updated_by: String,
}

impl RawProfile {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            is_default: row.get(3)?,
            slide_style_id: row.get(4)?,
            deck_prompt_id: row.get(5)?,
            genie_space: row.get(6)?,
            created_at: row.get(7)?,
            created_by: row.get(8)?,
            updated_at: row.get(9)?,
            updated_by: row.get(10)?,
        })
    }

    fn parse(self) -> Result<Profile> {
        Ok(Profile {
            id: self.id,
            name: self.name,
            description: self.description,
            is_default: self.is_default,
            slide_style_id: self.slide_style_id,
            deck_prompt_id: self.deck_prompt_id,
            genie_space: self
                .genie_space
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            created_by: self.created_by,
            updated_at: parse_timestamp(&self.updated_at)?,
            updated_by: self.updated_by,
        })
    }
}
