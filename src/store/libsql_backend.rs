//! libSQL backend — async `RegistrationStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{NewUser, RegisteredUser, RegistrationStore};

const USER_COLUMNS: &str =
    "id, first_name, last_name, age, phone_number, team_id, registered_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Access is
/// serialized through a mutex so a multi-row transaction never interleaves
/// with statements from another conversation.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Mutex<Connection>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
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

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn: Mutex::new(conn),
        })
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a RegisteredUser. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<RegisteredUser, libsql::Error> {
    let age: i64 = row.get(3)?;
    let registered_at: String = row.get(6)?;
    Ok(RegisteredUser {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        age: u32::try_from(age).unwrap_or_default(),
        phone_number: row.get(4)?,
        team_id: row.get::<String>(5).ok(),
        registered_at: parse_datetime(&registered_at),
    })
}

/// Insert one row on `conn` and return its rowid.
async fn insert_row(conn: &Connection, user: &NewUser) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (first_name, last_name, age, phone_number, team_id, registered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.first_name.as_str(),
            user.last_name.as_str(),
            i64::from(user.age),
            user.phone_number.as_str(),
            opt_text(user.team_id.as_deref()),
            Utc::now().to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_write("insert_user", e))?;
    Ok(conn.last_insert_rowid())
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RegistrationStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock().await;
        migrations::run_migrations(&conn).await
    }

    async fn insert_user(&self, user: &NewUser) -> Result<i64, DatabaseError> {
        let conn = self.conn.lock().await;
        let id = insert_row(&conn, user).await?;
        debug!(user_id = id, team_id = ?user.team_id, "User inserted into DB");
        Ok(id)
    }

    async fn insert_users(&self, users: &[NewUser]) -> Result<Vec<i64>, DatabaseError> {
        let conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_users: begin: {e}")))?;

        let mut ids = Vec::with_capacity(users.len());
        for user in users {
            match insert_row(&tx, user).await {
                Ok(id) => ids.push(id),
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!("insert_users: rollback failed: {rollback_err}");
                    }
                    return Err(e);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_users: commit: {e}")))?;

        debug!(count = ids.len(), "Users inserted into DB");
        Ok(ids)
    }

    async fn count_by_phone(&self, phone_number: &str) -> Result<i64, DatabaseError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM users WHERE phone_number = ?1",
                params![phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count_by_phone: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_by_phone: {e}"))),
        }
    }

    async fn team_members(&self, team_id: &str) -> Result<Vec<RegisteredUser>, DatabaseError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE team_id = ?1 ORDER BY id"),
                params![team_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("team_members: {e}")))?;

        let mut members = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("team_members: {e}")))?
        {
            members.push(
                row_to_user(&row).map_err(|e| DatabaseError::Query(format!("team_members: {e}")))?,
            );
        }
        Ok(members)
    }

    async fn count_users(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM users", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("count_users: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
            _ => Ok(0),
        }
    }
}
