//! libSQL storage layer (local, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding conversation logs,
//! published articles, and generation records.
//!
//! **Access rules:**
//! - Pipeline and CLI: read-write via [`Storage::open`]
//! - Inspection tooling: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use socialflow_shared::{
    GenerationRecord, GenerationRequest, Message, MessageId, Operation, PublishedArticle, Result,
    Sender, SocialFlowError, TopicId,
};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> SocialFlowError {
    SocialFlowError::Persistence(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SocialFlowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SocialFlowError::Persistence(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SocialFlowError::Persistence(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conversation log
    // -----------------------------------------------------------------------

    /// Append a message to a topic's log.
    pub async fn append_message(&self, topic_id: &TopicId, message: &Message) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO messages (id, topic_id, sender, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id.to_string(),
                    topic_id.as_str(),
                    message.sender.as_str(),
                    message.content.as_str(),
                    message.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// All messages of a topic in insertion order. Empty for an unknown topic.
    pub async fn list_messages(&self, topic_id: &TopicId) -> Result<Vec<Message>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, sender, content, created_at
                 FROM messages WHERE topic_id = ?1 ORDER BY seq",
                params![topic_id.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_message(&row)?);
        }
        Ok(results)
    }

    /// Topics with at least one message, with their message counts.
    pub async fn list_topics(&self) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT topic_id, COUNT(*) FROM messages GROUP BY topic_id ORDER BY MIN(seq)",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let topic: String = row.get(0).map_err(storage_err)?;
            let count: i64 = row.get(1).map_err(storage_err)?;
            results.push((topic, count as u64));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Articles
    // -----------------------------------------------------------------------

    /// Insert an article, or replace title, language and content of the one
    /// with the same slug.
    /// Returns the stored row.
    pub async fn upsert_article(&self, article: &PublishedArticle) -> Result<PublishedArticle> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO articles (id, title, content, language, topic_id, slug, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(slug) DO UPDATE SET
                   title = excluded.title,
                   content = excluded.content,
                   language = excluded.language,
                   updated_at = excluded.updated_at",
                params![
                    article.id.as_str(),
                    article.title.as_str(),
                    article.content.as_str(),
                    article.language.as_str(),
                    article.topic_id.as_str(),
                    article.slug.as_str(),
                    article.created_at.to_rfc3339(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        self.get_article_by_slug(&article.slug)
            .await?
            .ok_or_else(|| {
                SocialFlowError::Persistence(format!("article {} vanished after write", article.slug))
            })
    }

    /// Look up an article by slug.
    pub async fn get_article_by_slug(&self, slug: &str) -> Result<Option<PublishedArticle>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, content, language, topic_id, slug, created_at
                 FROM articles WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_article(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Generation records
    // -----------------------------------------------------------------------

    /// Record a successful generation call.
    pub async fn insert_generation_record(&self, record: &GenerationRecord) -> Result<()> {
        self.check_writable()?;
        let request_json = serde_json::to_string(&record.request).map_err(storage_err)?;
        self.conn
            .execute(
                "INSERT INTO generation_records (fingerprint, operation, topic_id, request_json, response, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.fingerprint.as_str(),
                    record.operation.as_str(),
                    record.topic_id.as_ref().map(|t| t.as_str().to_string()),
                    request_json,
                    record.response.as_str(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// All records for a request fingerprint, oldest first.
    pub async fn generation_records(&self, fingerprint: &str) -> Result<Vec<GenerationRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint, operation, topic_id, request_json, response, created_at
                 FROM generation_records WHERE fingerprint = ?1 ORDER BY id",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_generation_record(&row)?);
        }
        Ok(results)
    }
}

/// Generate a fresh article id.
pub fn new_article_id() -> String {
    Uuid::now_v7().to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SocialFlowError::Persistence(format!("invalid date: {e}")))
}

/// Convert a database row to a [`Message`].
fn row_to_message(row: &libsql::Row) -> Result<Message> {
    let id: String = row.get(0).map_err(storage_err)?;
    let sender: String = row.get(1).map_err(storage_err)?;
    let created_at: String = row.get(3).map_err(storage_err)?;
    Ok(Message {
        id: id
            .parse::<MessageId>()
            .map_err(|e| SocialFlowError::Persistence(format!("invalid message id {id}: {e}")))?,
        content: row.get::<String>(2).map_err(storage_err)?,
        sender: Sender::parse(&sender)
            .ok_or_else(|| SocialFlowError::Persistence(format!("unknown sender {sender}")))?,
        timestamp: parse_timestamp(&created_at)?,
    })
}

/// Convert a database row to a [`PublishedArticle`].
fn row_to_article(row: &libsql::Row) -> Result<PublishedArticle> {
    let topic: String = row.get(4).map_err(storage_err)?;
    let created_at: String = row.get(6).map_err(storage_err)?;
    Ok(PublishedArticle {
        id: row.get::<String>(0).map_err(storage_err)?,
        title: row.get::<String>(1).map_err(storage_err)?,
        content: row.get::<String>(2).map_err(storage_err)?,
        language: row.get::<String>(3).map_err(storage_err)?,
        topic_id: TopicId::new(topic).map_err(|e| SocialFlowError::Persistence(e.cause()))?,
        slug: row.get::<String>(5).map_err(storage_err)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Convert a database row to a [`GenerationRecord`].
fn row_to_generation_record(row: &libsql::Row) -> Result<GenerationRecord> {
    let operation: String = row.get(1).map_err(storage_err)?;
    let request_json: String = row.get(3).map_err(storage_err)?;
    let created_at: String = row.get(5).map_err(storage_err)?;
    let request: GenerationRequest = serde_json::from_str(&request_json).map_err(storage_err)?;
    Ok(GenerationRecord {
        fingerprint: row.get::<String>(0).map_err(storage_err)?,
        operation: Operation::parse(&operation)
            .ok_or_else(|| SocialFlowError::Persistence(format!("unknown operation {operation}")))?,
        topic_id: row
            .get::<String>(2)
            .ok()
            .and_then(|t| TopicId::new(t).ok()),
        request,
        response: row.get::<String>(4).map_err(storage_err)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialflow_shared::{GenerationLimits, article_slug, article_title};

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn topic(id: &str) -> TopicId {
        TopicId::new(id).unwrap()
    }

    fn article(language: &str, topic_id: &TopicId, content: &str) -> PublishedArticle {
        PublishedArticle {
            id: new_article_id(),
            title: article_title(language),
            content: content.into(),
            language: language.into(),
            topic_id: topic_id.clone(),
            slug: article_slug(language, topic_id),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let storage = test_storage().await;
        let v1 = topic("v1");
        let v2 = topic("v2");

        let first = Message::user("What does it mean?");
        let second = Message::assistant("It means X.");
        storage.append_message(&v1, &first).await.unwrap();
        storage.append_message(&v2, &Message::user("other topic")).await.unwrap();
        storage.append_message(&v1, &second).await.unwrap();

        let log = storage.list_messages(&v1).await.unwrap();
        assert_eq!(log, vec![first, second]);

        let topics = storage.list_topics().await.unwrap();
        assert_eq!(topics, vec![("v1".to_string(), 2), ("v2".to_string(), 1)]);
    }

    #[tokio::test]
    async fn unknown_topic_lists_empty() {
        let storage = test_storage().await;
        let log = storage.list_messages(&topic("never-used")).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn duplicate_message_id_is_rejected() {
        let storage = test_storage().await;
        let v1 = topic("v1");
        let message = Message::user("once");
        storage.append_message(&v1, &message).await.unwrap();
        let result = storage.append_message(&v1, &message).await;
        assert!(matches!(result, Err(SocialFlowError::Persistence(_))));
    }

    #[tokio::test]
    async fn article_upsert_replaces_content() {
        let storage = test_storage().await;
        let v1 = topic("abc123");

        let first = storage
            .upsert_article(&article("Hindi", &v1, "pehla"))
            .await
            .unwrap();
        assert_eq!(first.slug, "blog-hindi-abc123");
        assert_eq!(first.title, "Summary in Hindi");

        let second = storage
            .upsert_article(&article("Hindi", &v1, "doosra"))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.content, "doosra");

        // Same slug, different spelling: the row follows the latest publish.
        let third = storage
            .upsert_article(&article("hindi", &v1, "teesra"))
            .await
            .unwrap();
        assert_eq!(third.id, first.id);
        assert_eq!(third.title, "Summary in hindi");
        assert_eq!(third.language, "hindi");

        assert!(storage.get_article_by_slug("blog-tamil-abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn generation_records_replay() {
        let storage = test_storage().await;
        let request = GenerationRequest {
            instruction: "Translate to French.".into(),
            primary_content: "Hello".into(),
            history: vec![],
            limits: GenerationLimits::new(256, 0.2).unwrap(),
        };
        let record = GenerationRecord::new(Operation::Translate, None, request.clone(), "Bonjour");
        storage.insert_generation_record(&record).await.unwrap();

        let records = storage.generation_records(&request.fingerprint()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request, request);
        assert_eq!(records[0].response, "Bonjour");
        assert_eq!(records[0].operation, Operation::Translate);
        assert!(records[0].topic_id.is_none());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sf_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.append_message(&topic("v1"), &Message::user("hi"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_messages(&topic("v1")).await.unwrap().len(), 1);
        let result = ro.append_message(&topic("v1"), &Message::user("again")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
