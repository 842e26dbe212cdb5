use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use super::models::*;

/// Async-safe handle to the workplace database.
///
/// Wraps `WorkplaceDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<WorkplaceDb>>,
}

impl DbHandle {
    pub fn new(db: WorkplaceDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&WorkplaceDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

// ── Migrations ────────────────────────────────────────────────────────

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    up: &'static str,
    down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        up: "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                github_id TEXT UNIQUE,
                username TEXT UNIQUE,
                avatar_url TEXT,
                access_token TEXT
            );

            CREATE TABLE tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL DEFAULT 'task',
                priority TEXT NOT NULL DEFAULT 'MEDIUM'
                    CHECK (priority IN ('LOW', 'MEDIUM', 'HIGH', 'CRITICAL')),
                story_points INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'BACKLOG'
                    CHECK (status IN ('BACKLOG', 'TODO', 'IN_PROGRESS', 'CODE_REVIEW', 'DONE')),
                assignee_id INTEGER REFERENCES users(id),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                due_date TEXT,
                completed_at TEXT
            );

            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                content TEXT NOT NULL,
                sender_id INTEGER REFERENCES users(id),
                is_bot INTEGER NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE standups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                audio_url TEXT NOT NULL,
                date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                is_completed INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE retrospectives (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                video_url TEXT NOT NULL,
                consent_given INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_tickets_title ON tickets(title);
            CREATE INDEX idx_tickets_assignee ON tickets(assignee_id);
            CREATE INDEX idx_messages_channel ON messages(channel);
        ",
        down: "
            DROP TABLE retrospectives;
            DROP TABLE standups;
            DROP TABLE messages;
            DROP TABLE tickets;
            DROP TABLE users;
        ",
    },
    Migration {
        version: 2,
        name: "add_user_stats",
        up: "
            ALTER TABLE users ADD COLUMN xp INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE users ADD COLUMN level INTEGER NOT NULL DEFAULT 1;
            ALTER TABLE users ADD COLUMN truthfulness INTEGER NOT NULL DEFAULT 50;
            ALTER TABLE users ADD COLUMN effort INTEGER NOT NULL DEFAULT 50;
            ALTER TABLE users ADD COLUMN reliability INTEGER NOT NULL DEFAULT 50;
            ALTER TABLE users ADD COLUMN collaboration INTEGER NOT NULL DEFAULT 50;
            ALTER TABLE users ADD COLUMN quality INTEGER NOT NULL DEFAULT 50;
        ",
        down: "
            ALTER TABLE users DROP COLUMN quality;
            ALTER TABLE users DROP COLUMN collaboration;
            ALTER TABLE users DROP COLUMN reliability;
            ALTER TABLE users DROP COLUMN effort;
            ALTER TABLE users DROP COLUMN truthfulness;
            ALTER TABLE users DROP COLUMN level;
            ALTER TABLE users DROP COLUMN xp;
        ",
    },
    Migration {
        version: 3,
        name: "activity_tracking",
        up: "
            CREATE TABLE activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                activity_type TEXT NOT NULL CHECK (activity_type IN (
                    'TICKET_ASSIGNED', 'TICKET_COMPLETED', 'MESSAGE_SENT', 'MESSAGE_RECEIVED',
                    'REPO_CREATED', 'STANDUP_COMPLETED', 'CODE_REVIEW_SUBMITTED', 'ACHIEVEMENT_EARNED'
                )),
                description TEXT NOT NULL DEFAULT '',
                extra_data TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_activities_user ON activities(user_id, created_at);
        ",
        down: "
            DROP TABLE activities;
        ",
    },
    Migration {
        version: 4,
        name: "standup_transcripts",
        up: "ALTER TABLE standups ADD COLUMN transcript TEXT;",
        down: "ALTER TABLE standups DROP COLUMN transcript;",
    },
];

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: String,
    pub applied_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
}

/// Current time in the format every timestamp column uses.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

const USER_COLUMNS: &str = "id, github_id, username, avatar_url, access_token, xp, level, \
     truthfulness, effort, reliability, collaboration, quality";

const TICKET_COLUMNS: &str = "id, title, description, type, priority, story_points, status, \
     assignee_id, created_at, due_date, completed_at";

const MESSAGE_SELECT: &str = "SELECT m.id, m.channel, m.content, m.sender_id, m.is_bot, m.timestamp, \
     u.username, u.avatar_url FROM messages m LEFT JOIN users u ON m.sender_id = u.id";

pub struct WorkplaceDb {
    conn: Connection,
}

impl WorkplaceDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let db = Self::open(path)?;
        db.migrate().context("Failed to run migrations")?;
        Ok(db)
    }

    /// Open a database without applying pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        db.migrate().context("Failed to run migrations")?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS schema_migrations (
                     version INTEGER PRIMARY KEY,
                     name TEXT NOT NULL,
                     applied_at TEXT NOT NULL
                 );",
            )
            .context("Failed to initialize migration tracking")?;
        Ok(())
    }

    // ── Migrations ────────────────────────────────────────────────────

    fn applied_versions(&self) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")
            .context("Failed to prepare applied_versions")?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query schema_migrations")?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .context("Failed to read schema_migrations row")
    }

    /// Apply every pending migration in version order. Returns the names applied.
    pub fn migrate(&self) -> Result<Vec<&'static str>> {
        let applied = self.applied_versions()?;
        let mut names = Vec::new();
        for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
            let tx = self
                .conn
                .unchecked_transaction()
                .context("Failed to begin migration transaction")?;
            tx.execute_batch(migration.up)
                .with_context(|| format!("Migration {} ({}) failed", migration.version, migration.name))?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, now_timestamp()],
            )
            .context("Failed to record migration")?;
            tx.commit().context("Failed to commit migration")?;
            tracing::info!(version = migration.version, name = migration.name, "applied migration");
            names.push(migration.name);
        }
        Ok(names)
    }

    /// Revert the most recent `steps` applied migrations. Returns the names reverted.
    pub fn rollback(&self, steps: usize) -> Result<Vec<&'static str>> {
        let applied = self.applied_versions()?;
        let mut names = Vec::new();
        for version in applied.iter().rev().take(steps) {
            let migration = MIGRATIONS
                .iter()
                .find(|m| m.version == *version)
                .with_context(|| format!("Unknown applied migration version {}", version))?;
            let tx = self
                .conn
                .unchecked_transaction()
                .context("Failed to begin rollback transaction")?;
            tx.execute_batch(migration.down)
                .with_context(|| format!("Rollback of {} ({}) failed", migration.version, migration.name))?;
            tx.execute(
                "DELETE FROM schema_migrations WHERE version = ?1",
                params![migration.version],
            )
            .context("Failed to remove migration record")?;
            tx.commit().context("Failed to commit rollback")?;
            tracing::info!(version = migration.version, name = migration.name, "reverted migration");
            names.push(migration.name);
        }
        Ok(names)
    }

    pub fn migration_status(&self) -> Result<Vec<MigrationStatus>> {
        let mut stmt = self
            .conn
            .prepare("SELECT applied_at FROM schema_migrations WHERE version = ?1")
            .context("Failed to prepare migration_status")?;
        let mut statuses = Vec::new();
        for migration in MIGRATIONS {
            let applied_at: Option<String> = stmt
                .query_row(params![migration.version], |row| row.get(0))
                .optional()
                .context("Failed to query migration status")?;
            statuses.push(MigrationStatus {
                version: migration.version,
                name: migration.name.to_string(),
                applied_at,
            });
        }
        Ok(statuses)
    }

    /// Column names and declared types for a table, in declaration order.
    pub fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            anyhow::bail!("Invalid table name: {}", table);
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .context("Failed to prepare table_info")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    column_type: row.get(2)?,
                })
            })
            .context("Failed to query table_info")?;
        let columns = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read table_info row")?;
        if columns.is_empty() {
            anyhow::bail!("Table {} not found", table);
        }
        Ok(columns)
    }

    // ── Users ─────────────────────────────────────────────────────────

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            github_id: row.get(1)?,
            username: row.get(2)?,
            avatar_url: row.get(3)?,
            access_token: row.get(4)?,
            xp: row.get(5)?,
            level: row.get(6)?,
            stats: UserStats {
                truthfulness: row.get(7)?,
                effort: row.get(8)?,
                reliability: row.get(9)?,
                collaboration: row.get(10)?,
                quality: row.get(11)?,
            },
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                Self::user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn get_user_by_github_id(&self, github_id: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE github_id = ?1", USER_COLUMNS),
                params![github_id],
                Self::user_from_row,
            )
            .optional()
            .context("Failed to query user by github_id")
    }

    /// Insert a new GitHub user or refresh the access token of an existing one.
    pub fn upsert_github_user(
        &self,
        github_id: &str,
        username: &str,
        avatar_url: Option<&str>,
        access_token: &str,
    ) -> Result<User> {
        match self.get_user_by_github_id(github_id)? {
            Some(user) => {
                self.conn
                    .execute(
                        "UPDATE users SET access_token = ?1 WHERE id = ?2",
                        params![access_token, user.id],
                    )
                    .context("Failed to update access token")?;
                tracing::debug!(user_id = user.id, "refreshed GitHub access token");
                self.get_user(user.id)?
                    .context("User not found after token update")
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO users (github_id, username, avatar_url, access_token, xp, level)
                         VALUES (?1, ?2, ?3, ?4, 0, 1)",
                        params![github_id, username, avatar_url, access_token],
                    )
                    .context("Failed to insert user")?;
                let id = self.conn.last_insert_rowid();
                tracing::info!(user_id = id, username, "created user");
                self.get_user(id)?.context("User not found after insert")
            }
        }
    }

    pub fn update_progress(&self, user_id: i64, xp: i64, level: i64) -> Result<User> {
        self.conn
            .execute(
                "UPDATE users SET xp = ?1, level = ?2 WHERE id = ?3",
                params![xp, level, user_id],
            )
            .context("Failed to update user progress")?;
        self.get_user(user_id)?
            .context("User not found after progress update")
    }

    pub fn update_stats(&self, user_id: i64, stats: &UserStats) -> Result<User> {
        self.conn
            .execute(
                "UPDATE users SET truthfulness = ?1, effort = ?2, reliability = ?3,
                    collaboration = ?4, quality = ?5 WHERE id = ?6",
                params![
                    stats.truthfulness,
                    stats.effort,
                    stats.reliability,
                    stats.collaboration,
                    stats.quality,
                    user_id
                ],
            )
            .context("Failed to update user stats")?;
        self.get_user(user_id)?
            .context("User not found after stats update")
    }

    // ── Tickets ───────────────────────────────────────────────────────

    fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<TicketRow> {
        Ok(TicketRow {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            ticket_type: row.get(3)?,
            priority: row.get(4)?,
            story_points: row.get(5)?,
            status: row.get(6)?,
            assignee_id: row.get(7)?,
            created_at: row.get(8)?,
            due_date: row.get(9)?,
            completed_at: row.get(10)?,
        })
    }

    /// Insert a batch of tickets in a single transaction.
    pub fn create_tickets(&self, tickets: &[NewTicket]) -> Result<Vec<Ticket>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin ticket transaction")?;
        let created_at = now_timestamp();
        let mut ids = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            tx.execute(
                "INSERT INTO tickets (title, description, type, priority, story_points, status,
                    assignee_id, created_at, due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    ticket.title,
                    ticket.description,
                    ticket.ticket_type.as_str(),
                    ticket.priority.as_str(),
                    ticket.story_points,
                    ticket.status.as_str(),
                    ticket.assignee_id,
                    created_at,
                    ticket.due_date,
                ],
            )
            .context("Failed to insert ticket")?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().context("Failed to commit tickets")?;

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            created.push(self.get_ticket(id)?.context("Ticket not found after insert")?);
        }
        Ok(created)
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
                params![id],
                Self::ticket_from_row,
            )
            .optional()
            .context("Failed to query ticket")?;
        row.map(TicketRow::into_ticket).transpose()
    }

    pub fn list_tickets_for_user(&self, user_id: i64) -> Result<Vec<Ticket>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM tickets WHERE assignee_id = ?1 ORDER BY due_date, id",
                TICKET_COLUMNS
            ))
            .context("Failed to prepare list_tickets_for_user")?;
        let rows = stmt
            .query_map(params![user_id], Self::ticket_from_row)
            .context("Failed to query tickets")?;
        let mut tickets = Vec::new();
        for row in rows {
            let r = row.context("Failed to read ticket row")?;
            tickets.push(r.into_ticket()?);
        }
        Ok(tickets)
    }

    /// Move a ticket to `status`. Entering DONE stamps `completed_at`; leaving it clears the stamp.
    pub fn update_ticket_status(&self, id: i64, status: TicketStatus) -> Result<Ticket> {
        let completed_at = match status {
            TicketStatus::Done => Some(now_timestamp()),
            _ => None,
        };
        let changed = self
            .conn
            .execute(
                "UPDATE tickets SET status = ?1,
                    completed_at = CASE WHEN ?1 = 'DONE' THEN COALESCE(completed_at, ?2) ELSE NULL END
                 WHERE id = ?3",
                params![status.as_str(), completed_at, id],
            )
            .context("Failed to update ticket status")?;
        if changed == 0 {
            anyhow::bail!("Ticket {} not found", id);
        }
        self.get_ticket(id)?
            .context("Ticket not found after status update")
    }

    // ── Messages ──────────────────────────────────────────────────────

    fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
        let is_bot: bool = row.get(4)?;
        let sender_name: Option<String> = row.get(6)?;
        let sender_name = match sender_name {
            Some(name) => Some(name),
            None if is_bot => Some("Bot".to_string()),
            None => Some("Unknown".to_string()),
        };
        Ok(Message {
            id: row.get(0)?,
            channel: row.get(1)?,
            content: row.get(2)?,
            sender_id: row.get(3)?,
            is_bot,
            timestamp: row.get(5)?,
            sender_name,
            sender_avatar: row.get(7)?,
        })
    }

    pub fn create_message(
        &self,
        channel: Channel,
        content: &str,
        sender_id: Option<i64>,
        is_bot: bool,
    ) -> Result<Message> {
        let sender_id = if is_bot { None } else { sender_id };
        self.conn
            .execute(
                "INSERT INTO messages (channel, content, sender_id, is_bot, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel.as_str(), content, sender_id, is_bot, now_timestamp()],
            )
            .context("Failed to insert message")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                &format!("{} WHERE m.id = ?1", MESSAGE_SELECT),
                params![id],
                Self::message_from_row,
            )
            .context("Message not found after insert")
    }

    pub fn list_messages(&self, channel: Channel) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{} WHERE m.channel = ?1 ORDER BY m.timestamp ASC, m.id ASC",
                MESSAGE_SELECT
            ))
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![channel.as_str()], Self::message_from_row)
            .context("Failed to query messages")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read message row")
    }

    // ── Standups and retrospectives ───────────────────────────────────

    pub fn create_standup(
        &self,
        user_id: i64,
        audio_url: &str,
        transcript: Option<&str>,
    ) -> Result<Standup> {
        self.conn
            .execute(
                "INSERT INTO standups (user_id, audio_url, transcript, date, is_completed)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![user_id, audio_url, transcript, now_timestamp()],
            )
            .context("Failed to insert standup")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, user_id, audio_url, transcript, date, is_completed FROM standups WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Standup {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        audio_url: row.get(2)?,
                        transcript: row.get(3)?,
                        date: row.get(4)?,
                        is_completed: row.get(5)?,
                    })
                },
            )
            .context("Standup not found after insert")
    }

    pub fn create_retrospective(
        &self,
        user_id: i64,
        video_url: &str,
        consent_given: bool,
    ) -> Result<Retrospective> {
        self.conn
            .execute(
                "INSERT INTO retrospectives (user_id, video_url, consent_given, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, video_url, consent_given, now_timestamp()],
            )
            .context("Failed to insert retrospective")?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                "SELECT id, user_id, video_url, consent_given, created_at FROM retrospectives WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Retrospective {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        video_url: row.get(2)?,
                        consent_given: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .context("Retrospective not found after insert")
    }

    // ── Activities ────────────────────────────────────────────────────

    fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<ActivityRow> {
        Ok(ActivityRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            activity_type: row.get(2)?,
            description: row.get(3)?,
            extra_data: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn record_activity(
        &self,
        user_id: i64,
        activity_type: ActivityType,
        description: &str,
        extra_data: Option<&serde_json::Value>,
    ) -> Result<Activity> {
        let extra = extra_data.map(|v| v.to_string());
        self.conn
            .execute(
                "INSERT INTO activities (user_id, activity_type, description, extra_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, activity_type.as_str(), description, extra, now_timestamp()],
            )
            .context("Failed to insert activity")?;
        let id = self.conn.last_insert_rowid();
        let row = self
            .conn
            .query_row(
                "SELECT id, user_id, activity_type, description, extra_data, created_at
                 FROM activities WHERE id = ?1",
                params![id],
                Self::activity_from_row,
            )
            .context("Activity not found after insert")?;
        row.into_activity()
    }

    /// Most recent activities for a user, newest first.
    pub fn list_activities(&self, user_id: i64, limit: u32) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, activity_type, description, extra_data, created_at
                 FROM activities WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .context("Failed to prepare list_activities")?;
        let rows = stmt
            .query_map(params![user_id, limit], Self::activity_from_row)
            .context("Failed to query activities")?;
        let mut activities = Vec::new();
        for row in rows {
            let r = row.context("Failed to read activity row")?;
            activities.push(r.into_activity()?);
        }
        Ok(activities)
    }
}

// Internal row types for mapping text columns onto enums.

struct TicketRow {
    id: i64,
    title: String,
    description: String,
    ticket_type: String,
    priority: String,
    story_points: i64,
    status: String,
    assignee_id: Option<i64>,
    created_at: String,
    due_date: Option<String>,
    completed_at: Option<String>,
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket> {
        Ok(Ticket {
            id: self.id,
            title: self.title,
            description: self.description,
            ticket_type: TicketType::from_str(&self.ticket_type).map_err(|e| anyhow::anyhow!(e))?,
            priority: TicketPriority::from_str(&self.priority).map_err(|e| anyhow::anyhow!(e))?,
            story_points: self.story_points,
            status: TicketStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?,
            assignee_id: self.assignee_id,
            created_at: self.created_at,
            due_date: self.due_date,
            completed_at: self.completed_at,
        })
    }
}

struct ActivityRow {
    id: i64,
    user_id: i64,
    activity_type: String,
    description: String,
    extra_data: Option<String>,
    created_at: String,
}

impl ActivityRow {
    fn into_activity(self) -> Result<Activity> {
        let extra_data = match self.extra_data {
            Some(raw) => Some(
                serde_json::from_str(&raw).context("Failed to parse activity extra_data")?,
            ),
            None => None,
        };
        Ok(Activity {
            id: self.id,
            user_id: self.user_id,
            activity_type: ActivityType::from_str(&self.activity_type)
                .map_err(|e| anyhow::anyhow!(e))?,
            description: self.description,
            extra_data,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user() -> (WorkplaceDb, User) {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let user = db
            .upsert_github_user("1001", "octocat", Some("https://avatars/1"), "gho_first")
            .unwrap();
        (db, user)
    }

    fn sample_ticket(assignee_id: i64, title: &str, due: &str) -> NewTicket {
        NewTicket {
            title: title.to_string(),
            description: "desc".to_string(),
            ticket_type: TicketType::Bug,
            priority: TicketPriority::High,
            story_points: 2,
            status: TicketStatus::Todo,
            assignee_id,
            due_date: due.to_string(),
        }
    }

    #[test]
    fn test_migrations_apply_all_versions() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let statuses = db.migration_status().unwrap();
        assert_eq!(statuses.len(), MIGRATIONS.len());
        assert!(statuses.iter().all(|s| s.applied_at.is_some()));
        // Re-running is a no-op
        assert!(db.migrate().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_and_reapply() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let reverted = db.rollback(2).unwrap();
        assert_eq!(reverted, vec!["standup_transcripts", "activity_tracking"]);
        assert!(db.table_columns("activities").is_err());
        let standup_cols: Vec<String> = db
            .table_columns("standups")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(!standup_cols.contains(&"transcript".to_string()));

        let applied = db.migrate().unwrap();
        assert_eq!(applied, vec!["activity_tracking", "standup_transcripts"]);
    }

    #[test]
    fn test_rollback_everything() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let reverted = db.rollback(MIGRATIONS.len() + 3).unwrap();
        assert_eq!(reverted.len(), MIGRATIONS.len());
        assert!(db.table_columns("users").is_err());
        assert!(db.migration_status().unwrap().iter().all(|s| s.applied_at.is_none()));
    }

    #[test]
    fn test_open_does_not_migrate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.db");
        let db = WorkplaceDb::open(&path).unwrap();
        assert!(db.migration_status().unwrap().iter().all(|s| s.applied_at.is_none()));
    }

    #[test]
    fn test_table_columns_lists_user_stats() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let columns = db.table_columns("users").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names[0], "id");
        for stat in ["xp", "level", "truthfulness", "effort", "reliability", "collaboration", "quality"] {
            assert!(names.contains(&stat), "missing column {}", stat);
        }
        assert!(db.table_columns("users; DROP TABLE users").is_err());
    }

    #[test]
    fn test_upsert_creates_then_refreshes_token() {
        let (db, user) = db_with_user();
        assert_eq!(user.xp, 0);
        assert_eq!(user.level, 1);
        assert_eq!(user.stats, UserStats::default());

        let again = db
            .upsert_github_user("1001", "octocat", Some("https://avatars/1"), "gho_second")
            .unwrap();
        assert_eq!(again.id, user.id);
        assert_eq!(again.access_token.as_deref(), Some("gho_second"));
    }

    #[test]
    fn test_get_user_missing() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        assert!(db.get_user(42).unwrap().is_none());
    }

    #[test]
    fn test_create_and_list_tickets_ordered_by_due_date() {
        let (db, user) = db_with_user();
        let created = db
            .create_tickets(&[
                sample_ticket(user.id, "Later", "2026-01-03T00:00:00.000Z"),
                sample_ticket(user.id, "Sooner", "2026-01-01T00:00:00.000Z"),
            ])
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].status, TicketStatus::Todo);

        let listed = db.list_tickets_for_user(user.id).unwrap();
        assert_eq!(listed[0].title, "Sooner");
        assert_eq!(listed[1].title, "Later");
    }

    #[test]
    fn test_ticket_status_done_stamps_and_clears_completed_at() {
        let (db, user) = db_with_user();
        let ticket = db
            .create_tickets(&[sample_ticket(user.id, "Fix", "2026-01-01T00:00:00.000Z")])
            .unwrap()
            .remove(0);
        assert!(ticket.completed_at.is_none());

        let done = db.update_ticket_status(ticket.id, TicketStatus::Done).unwrap();
        assert!(done.completed_at.is_some());

        let reopened = db
            .update_ticket_status(ticket.id, TicketStatus::InProgress)
            .unwrap();
        assert_eq!(reopened.status, TicketStatus::InProgress);
        assert!(reopened.completed_at.is_none());
    }

    #[test]
    fn test_update_missing_ticket_fails() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        let err = db.update_ticket_status(99, TicketStatus::Done).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_messages_join_sender_and_label_bots() {
        let (db, user) = db_with_user();
        db.create_message(Channel::General, "hello", Some(user.id), false)
            .unwrap();
        db.create_message(Channel::General, "beep", Some(user.id), true)
            .unwrap();
        db.create_message(Channel::General, "who?", None, false).unwrap();
        db.create_message(Channel::Dev, "elsewhere", Some(user.id), false)
            .unwrap();

        let messages = db.list_messages(Channel::General).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].sender_name.as_deref(), Some("octocat"));
        assert_eq!(messages[0].sender_avatar.as_deref(), Some("https://avatars/1"));
        // Bot messages never keep a sender
        assert_eq!(messages[1].sender_id, None);
        assert_eq!(messages[1].sender_name.as_deref(), Some("Bot"));
        assert_eq!(messages[2].sender_name.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_standup_and_retrospective_rows() {
        let (db, user) = db_with_user();
        let standup = db
            .create_standup(user.id, "http://localhost:8000/static/a.webm", Some("did stuff"))
            .unwrap();
        assert!(standup.is_completed);
        assert_eq!(standup.transcript.as_deref(), Some("did stuff"));

        let retro = db
            .create_retrospective(user.id, "http://localhost:8000/static/b.webm", true)
            .unwrap();
        assert!(retro.consent_given);
        assert_eq!(retro.user_id, user.id);
    }

    #[test]
    fn test_standup_requires_existing_user() {
        let db = WorkplaceDb::new_in_memory().unwrap();
        assert!(db.create_standup(77, "url", None).is_err());
    }

    #[test]
    fn test_activities_newest_first_with_extra_data() {
        let (db, user) = db_with_user();
        db.record_activity(user.id, ActivityType::RepoCreated, "Created repo", None)
            .unwrap();
        let extra = serde_json::json!({"ticket_id": 7});
        db.record_activity(
            user.id,
            ActivityType::TicketCompleted,
            "Completed ticket",
            Some(&extra),
        )
        .unwrap();

        let activities = db.list_activities(user.id, 10).unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].activity_type, ActivityType::TicketCompleted);
        assert_eq!(activities[0].extra_data, Some(extra));
        assert_eq!(activities[1].activity_type, ActivityType::RepoCreated);

        assert_eq!(db.list_activities(user.id, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_progress_and_stats_updates() {
        let (db, user) = db_with_user();
        let updated = db.update_progress(user.id, 750, 2).unwrap();
        assert_eq!((updated.xp, updated.level), (750, 2));

        let stats = UserStats {
            truthfulness: 65,
            ..UserStats::default()
        };
        let updated = db.update_stats(user.id, &stats).unwrap();
        assert_eq!(updated.stats.truthfulness, 65);
        assert_eq!(updated.stats.quality, 50);
    }
}
