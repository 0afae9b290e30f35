//! Conversation and feedback log.
//!
//! Every answered question is stored with its full answer record; feedback
//! is attached by conversation id. Feedback for an id that was never
//! recorded is still accepted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConversationBackend, ConversationsConfig};
use crate::error::ConversationError;
use crate::types::{AnswerRecord, Relevance, TokenUsage};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub question: String,
    pub record: AnswerRecord,
}

impl Conversation {
    /// Wrap a record under a fresh random id.
    pub fn new(question: impl Into<String>, record: AnswerRecord) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.into(),
            record,
        }
    }
}

/// User feedback on a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub conversation_id: String,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(conversation_id: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            feedback: feedback.into(),
            created_at: Utc::now(),
        }
    }
}

/// Storage for conversations and their feedback.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn record_conversation(&self, conversation: &Conversation)
    -> Result<(), ConversationError>;

    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), ConversationError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ConversationError>;

    /// Feedback for `conversation_id`, oldest first.
    async fn feedback_for(&self, conversation_id: &str)
    -> Result<Vec<Feedback>, ConversationError>;
}

/// Create a conversation log from configuration.
pub fn create_conversation_log(
    config: &ConversationsConfig,
) -> Result<Arc<dyn ConversationLog>, ConversationError> {
    match config.backend {
        ConversationBackend::Sqlite => Ok(Arc::new(SqliteConversationLog::open(&config.db_path)?)),
        ConversationBackend::Memory => Ok(Arc::new(InMemoryConversationLog::new())),
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryConversationLog {
    conversations: Mutex<HashMap<String, Conversation>>,
    feedback: Mutex<Vec<Feedback>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationLog for InMemoryConversationLog {
    async fn record_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), ConversationError> {
        self.conversations
            .lock()
            .map_err(|_| ConversationError::Poisoned)?
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), ConversationError> {
        self.feedback
            .lock()
            .map_err(|_| ConversationError::Poisoned)?
            .push(feedback.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ConversationError> {
        Ok(self
            .conversations
            .lock()
            .map_err(|_| ConversationError::Poisoned)?
            .get(id)
            .cloned())
    }

    async fn feedback_for(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Feedback>, ConversationError> {
        Ok(self
            .feedback
            .lock()
            .map_err(|_| ConversationError::Poisoned)?
            .iter()
            .filter(|f| f.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    model_used TEXT NOT NULL,
    response_time REAL NOT NULL,
    relevance TEXT NOT NULL,
    relevance_explanation TEXT NOT NULL,
    prompt_tokens INTEGER NOT NULL,
    completion_tokens INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL,
    eval_prompt_tokens INTEGER NOT NULL,
    eval_completion_tokens INTEGER NOT NULL,
    eval_total_tokens INTEGER NOT NULL,
    cost REAL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL,
    feedback TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feedback_conversation ON feedback(conversation_id);
";

/// Conversation log persisted in a SQLite file.
///
/// Statements run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteConversationLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationLog {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, ConversationError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConversationError::Task {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened conversation log");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, ConversationError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ConversationError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, ConversationError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ConversationError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| ConversationError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| ConversationError::Task {
            message: e.to_string(),
        })?
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let relevance: String = row.get("relevance")?;
    let created_at: String = row.get("created_at")?;
    let usage = |p: &str, c: &str, t: &str| -> rusqlite::Result<TokenUsage> {
        Ok(TokenUsage {
            prompt_tokens: row.get::<_, i64>(p)? as u64,
            completion_tokens: row.get::<_, i64>(c)? as u64,
            total_tokens: row.get::<_, i64>(t)? as u64,
        })
    };
    Ok(Conversation {
        id: row.get("id")?,
        question: row.get("question")?,
        record: AnswerRecord {
            answer: row.get("answer")?,
            model_used: row.get("model_used")?,
            response_time: row.get("response_time")?,
            relevance: relevance.parse().unwrap_or(Relevance::Unknown),
            relevance_explanation: row.get("relevance_explanation")?,
            answer_usage: usage("prompt_tokens", "completion_tokens", "total_tokens")?,
            eval_usage: usage(
                "eval_prompt_tokens",
                "eval_completion_tokens",
                "eval_total_tokens",
            )?,
            cost: row.get("cost")?,
            created_at: parse_timestamp(&created_at),
        },
    })
}

#[async_trait]
impl ConversationLog for SqliteConversationLog {
    async fn record_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), ConversationError> {
        let c = conversation.clone();
        self.with_conn(move |conn| {
            let r = &c.record;
            conn.execute(
                "INSERT OR REPLACE INTO conversations (
                    id, question, answer, model_used, response_time, relevance,
                    relevance_explanation, prompt_tokens, completion_tokens, total_tokens,
                    eval_prompt_tokens, eval_completion_tokens, eval_total_tokens, cost, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    c.id,
                    c.question,
                    r.answer,
                    r.model_used,
                    r.response_time,
                    r.relevance.as_str(),
                    r.relevance_explanation,
                    r.answer_usage.prompt_tokens as i64,
                    r.answer_usage.completion_tokens as i64,
                    r.answer_usage.total_tokens as i64,
                    r.eval_usage.prompt_tokens as i64,
                    r.eval_usage.completion_tokens as i64,
                    r.eval_usage.total_tokens as i64,
                    r.cost,
                    r.created_at.to_rfc3339(),
                ],
            )?;
            debug!(id = %c.id, "Recorded conversation");
            Ok(())
        })
        .await
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<(), ConversationError> {
        let f = feedback.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO feedback (conversation_id, feedback, created_at) VALUES (?1, ?2, ?3)",
                params![f.conversation_id, f.feedback, f.created_at.to_rfc3339()],
            )?;
            debug!(conversation_id = %f.conversation_id, "Recorded feedback");
            Ok(())
        })
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ConversationError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT * FROM conversations WHERE id = ?1",
                    params![id],
                    row_to_conversation,
                )
                .optional()?)
        })
        .await
    }

    async fn feedback_for(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<Feedback>, ConversationError> {
        let conversation_id = conversation_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, feedback, created_at FROM feedback
                 WHERE conversation_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![conversation_id], |row| {
                let created_at: String = row.get(2)?;
                Ok(Feedback {
                    conversation_id: row.get(0)?,
                    feedback: row.get(1)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
