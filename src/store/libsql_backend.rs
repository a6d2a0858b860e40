//! libSQL backend: async `DurableStore` implementation.
//!
//! Supports remote (Turso/sqld), local file and in-memory databases.
//! Message windows and participant lists are stored as JSON text columns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::pipeline::types::{EmailDraft, Thread, ThreadMessage, ThreadType, User};
use crate::store::approvals::PendingApproval;
use crate::store::migrations;
use crate::store::traits::DurableStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, auth_token: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to connect to {url}: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(url = %url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Fixed-width UTC timestamps so stored values order correctly as text.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn thread_type_from_str(s: &str) -> ThreadType {
    match s {
        "group" => ThreadType::Group,
        "broadcast" => ThreadType::Broadcast,
        _ => ThreadType::Individual,
    }
}

/// Column order: 0:id, 1:messages, 2:participants
fn row_to_thread(row: &libsql::Row) -> Result<Thread, DatabaseError> {
    let id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("thread row: {e}")))?;
    let messages_json: String = row.get(1).unwrap_or_else(|_| "[]".into());
    let participants_json: String = row.get(2).unwrap_or_else(|_| "[]".into());

    let messages: Vec<ThreadMessage> = serde_json::from_str(&messages_json)
        .map_err(|e| DatabaseError::Serialization(format!("thread {id} messages: {e}")))?;
    let participants: Vec<String> = serde_json::from_str(&participants_json)
        .map_err(|e| DatabaseError::Serialization(format!("thread {id} participants: {e}")))?;

    Ok(Thread {
        id,
        messages,
        participants,
    })
}

/// Column order: 0:id, 1:name, 2:phone_number
fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        phone_number: row.get(2)?,
    })
}

/// Column order: 0:thread_id, 1:thread_type, 2:sender_number, 3:draft, 4:created_at, 5:expires_at
fn row_to_approval(row: &libsql::Row) -> Result<PendingApproval, DatabaseError> {
    let get_text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("approval row: {e}")))
    };
    let draft: EmailDraft = serde_json::from_str(&get_text(3)?)
        .map_err(|e| DatabaseError::Serialization(format!("approval draft: {e}")))?;

    Ok(PendingApproval {
        thread_id: get_text(0)?,
        thread_type: thread_type_from_str(&get_text(1)?),
        sender_number: get_text(2)?,
        draft,
        created_at: parse_datetime(&get_text(4)?),
        expires_at: parse_datetime(&get_text(5)?),
    })
}

#[async_trait]
impl DurableStore for LibSqlBackend {
    // ── Threads ─────────────────────────────────────────────────────

    async fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, messages, participants FROM threads WHERE id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_thread: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_thread(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_thread: {e}"))),
        }
    }

    async fn create_thread(&self, thread: &Thread) -> Result<String, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO threads (id, messages, participants, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    thread.id.as_str(),
                    to_json(&thread.messages)?,
                    to_json(&thread.participants)?,
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_thread: {e}")))?;

        debug!(thread_id = %thread.id, "Thread created");
        Ok(thread.id.clone())
    }

    async fn update_thread_messages(
        &self,
        thread_id: &str,
        messages: &[ThreadMessage],
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE threads SET messages = ?2, updated_at = ?3 WHERE id = ?1",
                params![thread_id, to_json(messages)?, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_thread_messages: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "thread".into(),
                id: thread_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_thread_participants(
        &self,
        thread_id: &str,
        participants: &[String],
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE threads SET participants = ?2, updated_at = ?3 WHERE id = ?1",
                params![thread_id, to_json(participants)?, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_thread_participants: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "thread".into(),
                id: thread_id.to_string(),
            });
        }
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_phone(&self, phone_number: i64) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, phone_number FROM users WHERE phone_number = ?1",
                params![phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_user(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_phone: {e}"))),
        }
    }

    async fn create_user(&self, name: &str, phone_number: i64) -> Result<User, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO users (id, name, phone_number, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id.clone(), name, phone_number, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_user: {e}")))?;

        debug!(user_id = %id, phone_number, "User created");
        Ok(User {
            id,
            name: name.to_string(),
            phone_number,
        })
    }

    async fn update_user_name(&self, phone_number: i64, name: &str) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE users SET name = ?2, updated_at = ?3 WHERE phone_number = ?1",
                params![phone_number, name, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_name: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: phone_number.to_string(),
            });
        }
        Ok(())
    }

    // ── Pending approvals ───────────────────────────────────────────

    async fn save_pending_approval(
        &self,
        approval: &PendingApproval,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO pending_approvals
                    (thread_id, thread_type, sender_number, draft, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    approval.thread_id.as_str(),
                    approval.thread_type.as_str(),
                    approval.sender_number.as_str(),
                    to_json(&approval.draft)?,
                    format_datetime(&approval.created_at),
                    format_datetime(&approval.expires_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_pending_approval: {e}")))?;
        Ok(())
    }

    async fn get_pending_approval(
        &self,
        thread_id: &str,
    ) -> Result<Option<PendingApproval>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT thread_id, thread_type, sender_number, draft, created_at, expires_at
                 FROM pending_approvals WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_pending_approval: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_approval(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_pending_approval: {e}"))),
        }
    }

    async fn delete_pending_approval(&self, thread_id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM pending_approvals WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_pending_approval: {e}")))?;
        Ok(())
    }

    async fn delete_expired_approvals(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM pending_approvals WHERE expires_at <= ?1",
                params![format_datetime(&now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_expired_approvals: {e}")))?;
        Ok(removed)
    }
}
