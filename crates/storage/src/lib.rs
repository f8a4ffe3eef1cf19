//! Sqlite-backed persistence for the reading session and settings.

use std::path::Path;

use anyhow::Context as _;
use folio_core::{ReadingPosition, SESSION_KEY, Session, SessionGateway, Settings};
use rusqlite::{Connection, OptionalExtension as _};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                json TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, json) VALUES (1, '{}');

            CREATE TABLE IF NOT EXISTS session (
                key TEXT PRIMARY KEY,
                content BLOB NOT NULL,
                name TEXT NOT NULL,
                page INTEGER NOT NULL CHECK (page >= 1),
                scale REAL NOT NULL,
                inverted INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );
            "#,
            )
            .context("migrate sqlite schema")?;
        Ok(())
    }

    /// Unknown or missing keys fall back to their defaults; the result is
    /// always normalized.
    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT json FROM settings WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let mut settings = match json {
            Some(json) => serde_json::from_str::<Settings>(&json).unwrap_or_else(|err| {
                tracing::warn!("stored settings unreadable, using defaults: {err}");
                Settings::default()
            }),
            None => Settings::default(),
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();
        let json = serde_json::to_string(&settings)?;

        self.conn.execute(
            r#"
            INSERT INTO settings (id, json) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET json = excluded.json
            "#,
            [json],
        )?;
        Ok(())
    }

    pub fn clear_session(&self) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM session WHERE key = ?", [SESSION_KEY])?;
        Ok(())
    }
}

impl SessionGateway for Storage {
    fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.conn
            .execute(
                r#"
            INSERT INTO session (key, content, name, page, scale, inverted, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content = excluded.content,
                name = excluded.name,
                page = excluded.page,
                scale = excluded.scale,
                inverted = excluded.inverted,
                timestamp = excluded.timestamp
            "#,
                (
                    SESSION_KEY,
                    &session.content,
                    &session.name,
                    i64::from(session.page.max(1)),
                    f64::from(session.scale),
                    session.inverted,
                    session.timestamp,
                ),
            )
            .context("save session")?;
        tracing::debug!(name = %session.name, page = session.page, "session saved");
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT content, name, page, scale, inverted, timestamp FROM session WHERE key = ?",
                [SESSION_KEY],
                |row| {
                    let page: i64 = row.get(2)?;
                    let scale: f64 = row.get(3)?;
                    Ok(Session {
                        content: row.get(0)?,
                        name: row.get(1)?,
                        page: u32::try_from(page).unwrap_or(1).max(1),
                        scale: scale as f32,
                        inverted: row.get(4)?,
                        timestamp: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("load session")?;
        Ok(session)
    }

    fn update_progress(&self, position: &ReadingPosition) -> anyhow::Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE session SET page = ?, scale = ?, inverted = ? WHERE key = ?",
                (
                    i64::from(position.page.max(1)),
                    f64::from(position.scale),
                    position.inverted,
                    SESSION_KEY,
                ),
            )
            .context("update reading progress")?;
        if updated == 0 {
            tracing::trace!("no saved session; progress not recorded");
        }
        Ok(())
    }
}
