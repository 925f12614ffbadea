use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use promptgate_common::{Error, Result};
use promptgate_config::ChatHistoryConfig;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DOC_CONVERSATION: &str = "conversation";
const DOC_MESSAGE: &str = "message";

/// Conversation document, partitioned by user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document store for conversation history backed by SQLite.
///
/// Every document lives in a single container table as a JSON body, with the
/// columns needed for lookups pulled out alongside it.
pub struct HistoryStore {
    conn: Mutex<Connection>,
    container: String,
    enable_feedback: bool,
}

impl HistoryStore {
    /// Open the store described by `config`. Any failure is a `HistoryStoreInit` error.
    pub fn open(config: &ChatHistoryConfig) -> Result<Self> {
        Self::open_inner(config).map_err(|e| match e {
            Error::HistoryStoreInit(_) => e,
            other => Error::HistoryStoreInit(other.to_string()),
        })
    }

    fn open_inner(config: &ChatHistoryConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            info!("opening in-memory history store");
            Connection::open_in_memory()
                .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?
        } else {
            let path = config.database_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            info!("opening history store at {}", path.display());
            let conn = Connection::open(&path)
                .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;
            conn
        };

        if config.account_key.is_some() {
            debug!("history store account key configured");
        }

        let store = Self::with_connection(
            conn,
            &config.conversations_container,
            config.enable_feedback,
        )?;
        store.ensure()?;
        Ok(store)
    }

    pub fn in_memory(container: &str, enable_feedback: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::with_connection(conn, container, enable_feedback)
    }

    fn with_connection(conn: Connection, container: &str, enable_feedback: bool) -> Result<Self> {
        let valid = !container.is_empty()
            && container
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::HistoryStoreInit(format!(
                "invalid container name: {container}"
            )));
        }

        let store = Self {
            conn: Mutex::new(conn),
            container: container.to_string(),
            enable_feedback,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let container = &self.container;
        self.conn()?
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {container} (
                    id TEXT PRIMARY KEY,
                    doc_type TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    conversation_id TEXT,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_{container}_user_conversation
                    ON {container}(user_id, conversation_id, doc_type);"
            ))
            .map_err(|e| Error::Database(format!("migration failed: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("history store lock poisoned".to_string()))
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn feedback_enabled(&self) -> bool {
        self.enable_feedback
    }

    /// Readiness probe: the container must exist and be queryable.
    pub fn ensure(&self) -> Result<()> {
        let sql = format!("SELECT count(*) FROM {} LIMIT 1", self.container);
        self.conn()?
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Database(format!("history container unavailable: {e}")))?;
        Ok(())
    }

    pub fn create_conversation(&self, user_id: &str, title: &str) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.insert_document(
            &conversation.id,
            DOC_CONVERSATION,
            user_id,
            None,
            &serde_json::to_string(&conversation)?,
        )?;
        debug!("created conversation {}", conversation.id);
        Ok(conversation)
    }

    pub fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let sql = format!(
            "SELECT body FROM {} WHERE id = ?1 AND user_id = ?2 AND doc_type = ?3",
            self.container
        );
        let body: Option<String> = self
            .conn()?
            .query_row(&sql, params![conversation_id, user_id, DOC_CONVERSATION], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| Error::Database(format!("failed to load conversation: {e}")))?;

        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    /// Append a message and bump the conversation's `updated_at`.
    pub fn create_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: &str,
        content: &str,
    ) -> Result<StoredMessage> {
        let Some(mut conversation) = self.get_conversation(user_id, conversation_id)? else {
            return Err(Error::Database(format!(
                "conversation {conversation_id} not found"
            )));
        };

        let now = Utc::now();
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            feedback: None,
            created_at: now,
            updated_at: now,
        };
        self.insert_document(
            &message.id,
            DOC_MESSAGE,
            user_id,
            Some(conversation_id),
            &serde_json::to_string(&message)?,
        )?;

        conversation.updated_at = now;
        self.update_document(&conversation.id, &serde_json::to_string(&conversation)?)?;
        Ok(message)
    }

    /// Messages of a conversation in insertion order.
    pub fn get_messages(&self, user_id: &str, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let sql = format!(
            "SELECT body FROM {}
             WHERE user_id = ?1 AND conversation_id = ?2 AND doc_type = ?3
             ORDER BY rowid ASC",
            self.container
        );
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare message query: {e}")))?;

        let rows = stmt
            .query_map(params![user_id, conversation_id, DOC_MESSAGE], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| Error::Database(format!("failed to load messages: {e}")))?;

        let mut messages = Vec::new();
        for row in rows {
            let body =
                row.map_err(|e| Error::Database(format!("failed to read message row: {e}")))?;
            messages.push(serde_json::from_str(&body)?);
        }
        Ok(messages)
    }

    pub fn update_message_feedback(
        &self,
        user_id: &str,
        message_id: &str,
        feedback: &str,
    ) -> Result<Option<StoredMessage>> {
        if !self.enable_feedback {
            return Err(Error::Database("message feedback is not enabled".to_string()));
        }

        let sql = format!(
            "SELECT body FROM {} WHERE id = ?1 AND user_id = ?2 AND doc_type = ?3",
            self.container
        );
        let body: Option<String> = self
            .conn()?
            .query_row(&sql, params![message_id, user_id, DOC_MESSAGE], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| Error::Database(format!("failed to load message: {e}")))?;

        let Some(body) = body else {
            return Ok(None);
        };
        let mut message: StoredMessage = serde_json::from_str(&body)?;
        message.feedback = Some(feedback.to_string());
        message.updated_at = Utc::now();
        self.update_document(&message.id, &serde_json::to_string(&message)?)?;
        Ok(Some(message))
    }

    /// Delete a conversation and all of its messages. Returns false when the
    /// conversation does not exist for this user.
    pub fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ?1 AND (id = ?2 OR conversation_id = ?2)",
            self.container
        );
        let exists = self.get_conversation(user_id, conversation_id)?.is_some();
        if !exists {
            return Ok(false);
        }
        self.conn()?
            .execute(&sql, params![user_id, conversation_id])
            .map_err(|e| Error::Database(format!("failed to delete conversation: {e}")))?;
        Ok(true)
    }

    fn insert_document(
        &self,
        id: &str,
        doc_type: &str,
        user_id: &str,
        conversation_id: Option<&str>,
        body: &str,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, doc_type, user_id, conversation_id, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.container
        );
        self.conn()?
            .execute(&sql, params![id, doc_type, user_id, conversation_id, body])
            .map_err(|e| Error::Database(format!("failed to insert {doc_type}: {e}")))?;
        Ok(())
    }

    fn update_document(&self, id: &str, body: &str) -> Result<()> {
        let sql = format!("UPDATE {} SET body = ?1 WHERE id = ?2", self.container);
        self.conn()?
            .execute(&sql, params![body, id])
            .map_err(|e| Error::Database(format!("failed to update document: {e}")))?;
        Ok(())
    }
}
