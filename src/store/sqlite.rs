//! SQLite-backed record store

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    ErrorRecord, KnowledgeRecord, LearningRecord, NewErrorRecord, StoreError, StoreResult,
    StoreStatistics, TeachingRecord,
};
use crate::types::{Strategy, Table};

/// The single long-lived store handle shared by all components
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the record database at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            -- Immutable reference data, one row per previously-seen question
            CREATE TABLE IF NOT EXISTS knowledge (
                table_id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                table_json TEXT NOT NULL,
                sql_skeleton TEXT NOT NULL DEFAULT '',
                question_skeleton TEXT NOT NULL DEFAULT '',
                skeleton_embedding BLOB,
                structure_signature TEXT NOT NULL DEFAULT '',
                cot TEXT NOT NULL DEFAULT '',
                column_sorting TEXT NOT NULL DEFAULT '',
                schema_linking TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            -- FTS5 over the two retrieval keys
            CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                table_id UNINDEXED,
                question,
                sql_skeleton,
                tokenize = 'porter unicode61'
            );

            -- Mutable per-question learning state
            CREATE TABLE IF NOT EXISTS learning (
                table_id TEXT PRIMARY KEY,
                flag INTEGER NOT NULL,
                rethink_summary TEXT,
                guidance_error_count INTEGER NOT NULL DEFAULT 0,
                first_answer_time TEXT,
                updated_at TEXT NOT NULL
            );

            -- Winning strategy bookkeeping, one row per flag-1 question
            CREATE TABLE IF NOT EXISTS teaching (
                table_id TEXT PRIMARY KEY,
                strategy_type TEXT NOT NULL,
                session_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Append-only error log for live-question failures
            CREATE TABLE IF NOT EXISTS errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                table_text TEXT NOT NULL,
                model_answer TEXT NOT NULL,
                true_answer TEXT NOT NULL,
                error_reflection TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_learning_flag ON learning(flag);
            CREATE INDEX IF NOT EXISTS idx_teaching_strategy ON teaching(strategy_type);
            CREATE INDEX IF NOT EXISTS idx_errors_created ON errors(created_at DESC);
        "#,
        )?;

        Ok(())
    }

    // ============ Knowledge records ============

    /// Insert or replace a knowledge record and refresh its FTS entry
    pub async fn put_knowledge(&self, record: &KnowledgeRecord) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        let table_json = serde_json::to_string(&record.table)?;
        let embedding_blob = if record.skeleton_embedding.is_empty() {
            None
        } else {
            Some(Self::embedding_to_blob(&record.skeleton_embedding))
        };

        conn.execute(
            r#"INSERT OR REPLACE INTO knowledge
               (table_id, question, answer, table_json, sql_skeleton, question_skeleton,
                skeleton_embedding, structure_signature, cot, column_sorting, schema_linking,
                created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            params![
                record.table_id,
                record.question,
                record.answer,
                table_json,
                record.sql_skeleton,
                record.question_skeleton,
                embedding_blob,
                record.structure_signature,
                record.cot,
                record.column_sorting,
                record.schema_linking,
                Utc::now().to_rfc3339(),
            ],
        )?;

        conn.execute(
            "DELETE FROM knowledge_fts WHERE table_id = ?1",
            params![record.table_id],
        )?;
        conn.execute(
            "INSERT INTO knowledge_fts (table_id, question, sql_skeleton) VALUES (?1, ?2, ?3)",
            params![record.table_id, record.question, record.sql_skeleton],
        )?;

        Ok(())
    }

    /// Look up a knowledge record by table id
    pub async fn get_knowledge(&self, table_id: &str) -> StoreResult<Option<KnowledgeRecord>> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                r#"SELECT table_id, question, answer, table_json, sql_skeleton,
                          question_skeleton, skeleton_embedding, structure_signature,
                          cot, column_sorting, schema_linking
                   FROM knowledge WHERE table_id = ?1"#,
                params![table_id],
                Self::row_to_knowledge,
            )
            .optional()?;
        Ok(record)
    }

    /// Like [`get_knowledge`](Self::get_knowledge) but a missing record
    /// is an error
    pub async fn require_knowledge(&self, table_id: &str) -> StoreResult<KnowledgeRecord> {
        self.get_knowledge(table_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("knowledge record {}", table_id)))
    }

    /// Fetch knowledge records for an id list, preserving input order;
    /// unresolvable ids are silently skipped
    pub async fn knowledge_by_ids(&self, ids: &[String]) -> StoreResult<Vec<KnowledgeRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            r#"SELECT table_id, question, answer, table_json, sql_skeleton,
                      question_skeleton, skeleton_embedding, structure_signature,
                      cot, column_sorting, schema_linking
               FROM knowledge WHERE table_id IN ({})"#,
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), Self::row_to_knowledge)?;

        let mut by_id: HashMap<String, KnowledgeRecord> = HashMap::new();
        for row in rows {
            let record = row?;
            by_id.insert(record.table_id.clone(), record);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Full-text search over stored SQL skeletons. Returns
    /// (table_id, sql_skeleton) pairs, best match first.
    pub async fn search_by_sql_skeleton(
        &self,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<(String, String)>> {
        self.search_fts("sql_skeleton", query, limit).await
    }

    /// Full-text search over stored question texts. Returns
    /// (table_id, question) pairs, best match first.
    pub async fn search_by_question(
        &self,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<(String, String)>> {
        self.search_fts("question", query, limit).await
    }

    async fn search_fts(
        &self,
        column: &str,
        query: &str,
        limit: usize,
    ) -> StoreResult<Vec<(String, String)>> {
        // Keep only alphanumeric word cores; FTS5 treats the rest as
        // separators and chokes on bare punctuation tokens
        let fts_terms = query
            .split_whitespace()
            .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
            .filter(|w| !w.is_empty())
            .map(|w| format!("{}*", w))
            .collect::<Vec<_>>()
            .join(" OR ");

        if fts_terms.is_empty() {
            return Ok(Vec::new());
        }
        let fts_query = format!("{} : ({})", column, fts_terms);

        let conn = self.conn.lock().await;
        let sql = format!(
            r#"SELECT k.table_id, k.{}
               FROM knowledge k
               JOIN knowledge_fts fts ON k.table_id = fts.table_id
               WHERE knowledge_fts MATCH ?1
               ORDER BY bm25(knowledge_fts)
               LIMIT ?2"#,
            column
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![fts_query, limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ============ Learning records ============

    pub async fn get_learning(&self, table_id: &str) -> StoreResult<Option<LearningRecord>> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                r#"SELECT table_id, flag, rethink_summary, guidance_error_count,
                          first_answer_time, updated_at
                   FROM learning WHERE table_id = ?1"#,
                params![table_id],
                Self::row_to_learning,
            )
            .optional()?;
        Ok(record)
    }

    /// Batch learning lookup keyed by table id
    pub async fn learning_by_ids(
        &self,
        ids: &[String],
    ) -> StoreResult<HashMap<String, LearningRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().await;

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            r#"SELECT table_id, flag, rethink_summary, guidance_error_count,
                      first_answer_time, updated_at
               FROM learning WHERE table_id IN ({})"#,
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), Self::row_to_learning)?;

        let mut by_id = HashMap::new();
        for row in rows {
            let record = row?;
            by_id.insert(record.table_id.clone(), record);
        }
        Ok(by_id)
    }

    /// Idempotent read-modify-upsert; last write wins per table id
    pub async fn upsert_learning(&self, record: &LearningRecord) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO learning
               (table_id, flag, rethink_summary, guidance_error_count, first_answer_time, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(table_id) DO UPDATE SET
                   flag = excluded.flag,
                   rethink_summary = excluded.rethink_summary,
                   guidance_error_count = excluded.guidance_error_count,
                   first_answer_time = excluded.first_answer_time,
                   updated_at = excluded.updated_at"#,
            params![
                record.table_id,
                record.flag,
                record.rethink_summary,
                record.guidance_error_count,
                record.first_answer_time.map(|t| t.to_rfc3339()),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ============ Teaching records ============

    pub async fn get_teaching(&self, table_id: &str) -> StoreResult<Option<TeachingRecord>> {
        let conn = self.conn.lock().await;
        let record = conn
            .query_row(
                "SELECT table_id, strategy_type, session_id, created_at FROM teaching WHERE table_id = ?1",
                params![table_id],
                Self::row_to_teaching,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn upsert_teaching(&self, record: &TeachingRecord) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO teaching (table_id, strategy_type, session_id, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(table_id) DO UPDATE SET
                   strategy_type = excluded.strategy_type,
                   session_id = excluded.session_id,
                   created_at = excluded.created_at"#,
            params![
                record.table_id,
                record.strategy.as_str(),
                record.session_id,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn delete_teaching(&self, table_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM teaching WHERE table_id = ?1", params![table_id])?;
        Ok(())
    }

    /// All teaching records joined with their knowledge question, for
    /// strategy recommendation
    pub async fn teaching_with_questions(&self) -> StoreResult<Vec<(TeachingRecord, String)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT t.table_id, t.strategy_type, t.session_id, t.created_at, k.question
               FROM teaching t
               JOIN knowledge k ON t.table_id = k.table_id"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let record = Self::row_to_teaching(row)?;
            let question: String = row.get(4)?;
            Ok((record, question))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ============ Error records ============

    /// Append an error record; returns its row id
    pub async fn add_error(&self, record: &NewErrorRecord) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO errors
               (question, table_text, model_answer, true_answer, error_reflection, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                record.question,
                record.table_text,
                record.model_answer,
                record.true_answer,
                record.error_reflection,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Full scan of the error log, oldest first
    pub async fn all_errors(&self) -> StoreResult<Vec<ErrorRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT id, question, table_text, model_answer, true_answer,
                      error_reflection, created_at
               FROM errors ORDER BY id"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let created_at: String = row.get(6)?;
            Ok(ErrorRecord {
                id: row.get(0)?,
                question: row.get(1)?,
                table_text: row.get(2)?,
                model_answer: row.get(3)?,
                true_answer: row.get(4)?,
                error_reflection: row.get(5)?,
                created_at: Self::parse_timestamp(&created_at),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ============ Statistics ============

    pub async fn statistics(&self) -> StoreResult<StoreStatistics> {
        let conn = self.conn.lock().await;

        let knowledge_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get(0))?;
        let error_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM errors", [], |row| row.get(0))?;

        let mut learning_by_flag = std::collections::BTreeMap::new();
        let mut stmt = conn.prepare("SELECT flag, COUNT(*) FROM learning GROUP BY flag")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (flag, count) = row?;
            learning_by_flag.insert(flag as u8, count as u64);
        }

        let mut teaching_by_strategy = std::collections::BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT strategy_type, COUNT(*) FROM teaching GROUP BY strategy_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (strategy, count) = row?;
            teaching_by_strategy.insert(strategy, count as u64);
        }

        Ok(StoreStatistics {
            knowledge_count: knowledge_count as u64,
            learning_by_flag,
            teaching_by_strategy,
            error_count: error_count as u64,
        })
    }

    // ============ Row mapping & blobs ============

    fn row_to_knowledge(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
        let table_json: String = row.get(3)?;
        let table: Table = serde_json::from_str(&table_json)
            .unwrap_or_else(|_| Table::new(Vec::new(), Vec::new()));
        let blob: Option<Vec<u8>> = row.get(6)?;
        Ok(KnowledgeRecord {
            table_id: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
            table,
            sql_skeleton: row.get(4)?,
            question_skeleton: row.get(5)?,
            skeleton_embedding: blob.map(|b| Self::blob_to_embedding(&b)).unwrap_or_default(),
            structure_signature: row.get(7)?,
            cot: row.get(8)?,
            column_sorting: row.get(9)?,
            schema_linking: row.get(10)?,
        })
    }

    fn row_to_learning(row: &rusqlite::Row<'_>) -> rusqlite::Result<LearningRecord> {
        let first_answer_time: Option<String> = row.get(4)?;
        let updated_at: String = row.get(5)?;
        Ok(LearningRecord {
            table_id: row.get(0)?,
            flag: row.get::<_, i64>(1)? as u8,
            rethink_summary: row.get(2)?,
            guidance_error_count: row.get::<_, i64>(3)? as u32,
            first_answer_time: first_answer_time.as_deref().map(Self::parse_timestamp),
            updated_at: Self::parse_timestamp(&updated_at),
        })
    }

    fn row_to_teaching(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeachingRecord> {
        let strategy: String = row.get(1)?;
        let created_at: String = row.get(3)?;
        Ok(TeachingRecord {
            table_id: row.get(0)?,
            strategy: Strategy::from_str_lossy(&strategy),
            session_id: row.get(2)?,
            created_at: Self::parse_timestamp(&created_at),
        })
    }

    fn parse_timestamp(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Convert embedding vector to binary blob
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        let mut blob = Vec::with_capacity(embedding.len() * 4);
        for &val in embedding {
            blob.extend_from_slice(&val.to_le_bytes());
        }
        blob
    }

    /// Convert binary blob to embedding vector
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge(table_id: &str, question: &str, skeleton: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            table_id: table_id.to_string(),
            question: question.to_string(),
            answer: "['yes']".to_string(),
            table: Table::new(
                vec!["A".to_string(), "B".to_string()],
                vec![vec!["1".to_string(), "x".to_string()]],
            ),
            sql_skeleton: skeleton.to_string(),
            question_skeleton: "what is _ ?".to_string(),
            skeleton_embedding: vec![0.1, 0.2, 0.3],
            structure_signature: "[int, string]".to_string(),
            cot: "step by step".to_string(),
            column_sorting: "B, A".to_string(),
            schema_linking: "A -> value".to_string(),
        }
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteRecordStore {
        SqliteRecordStore::new(dir.path().join("test.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_knowledge_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let record = knowledge("t1", "How many wins in 2001?", "SELECT COUNT(__) FROM __ WHERE __ = __");
        store.put_knowledge(&record).await.unwrap();

        let loaded = store.get_knowledge("t1").await.unwrap().unwrap();
        assert_eq!(loaded.question, record.question);
        assert_eq!(loaded.skeleton_embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(loaded.table.headers, vec!["A", "B"]);
        assert_eq!(loaded.structure_signature, "[int, string]");

        assert!(store.get_knowledge("missing").await.unwrap().is_none());
        let err = store.require_knowledge("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fts_search_both_columns() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .put_knowledge(&knowledge("t1", "How many employees are in Sales?", "SELECT COUNT(__) FROM __ WHERE __ = __"))
            .await
            .unwrap();
        store
            .put_knowledge(&knowledge("t2", "Which driver won the race?", "SELECT __ FROM __ ORDER BY __ LIMIT __"))
            .await
            .unwrap();

        let by_skeleton = store
            .search_by_sql_skeleton("SELECT COUNT(__) FROM __", 10)
            .await
            .unwrap();
        assert!(by_skeleton.iter().any(|(id, _)| id == "t1"));

        let by_question = store.search_by_question("driver race", 10).await.unwrap();
        assert!(by_question.iter().any(|(id, _)| id == "t2"));
        assert!(!by_question.iter().any(|(id, _)| id == "t1"));

        // placeholder-only query has no indexable terms
        let empty = store.search_by_sql_skeleton("__ __", 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_knowledge_by_ids_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        for id in ["t1", "t2", "t3"] {
            store
                .put_knowledge(&knowledge(id, "q", "SELECT __ FROM __"))
                .await
                .unwrap();
        }

        let ids: Vec<String> = ["t3", "missing", "t1"].iter().map(|s| s.to_string()).collect();
        let records = store.knowledge_by_ids(&ids).await.unwrap();
        let got: Vec<&str> = records.iter().map(|r| r.table_id.as_str()).collect();
        assert_eq!(got, vec!["t3", "t1"]);
    }

    #[tokio::test]
    async fn test_learning_upsert_and_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        let mut record = LearningRecord {
            table_id: "t1".to_string(),
            flag: 3,
            rethink_summary: None,
            guidance_error_count: 0,
            first_answer_time: Some(Utc::now()),
            updated_at: Utc::now(),
        };
        store.upsert_learning(&record).await.unwrap();

        record.flag = 1;
        record.rethink_summary = Some("learned it".to_string());
        store.upsert_learning(&record).await.unwrap();

        let loaded = store.get_learning("t1").await.unwrap().unwrap();
        assert_eq!(loaded.flag, 1);
        assert_eq!(loaded.rethink_summary.as_deref(), Some("learned it"));
        assert!(loaded.first_answer_time.is_some());

        let map = store
            .learning_by_ids(&["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("t1"));
    }

    #[tokio::test]
    async fn test_teaching_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .put_knowledge(&knowledge("t1", "How many wins?", "SELECT COUNT(__) FROM __"))
            .await
            .unwrap();

        let record = TeachingRecord {
            table_id: "t1".to_string(),
            strategy: Strategy::ColumnSorting,
            session_id: "s1".to_string(),
            created_at: Utc::now(),
        };
        store.upsert_teaching(&record).await.unwrap();

        let loaded = store.get_teaching("t1").await.unwrap().unwrap();
        assert_eq!(loaded.strategy, Strategy::ColumnSorting);

        let joined = store.teaching_with_questions().await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].1, "How many wins?");

        store.delete_teaching("t1").await.unwrap();
        assert!(store.get_teaching("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_log_and_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .put_knowledge(&knowledge("t1", "q", "SELECT __ FROM __"))
            .await
            .unwrap();
        store
            .upsert_learning(&LearningRecord {
                table_id: "t1".to_string(),
                flag: 2,
                rethink_summary: Some("err".to_string()),
                guidance_error_count: 0,
                first_answer_time: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let id = store
            .add_error(&NewErrorRecord {
                question: "Which year?".to_string(),
                table_text: "Year\n---\n2001".to_string(),
                model_answer: "<Answer>['2002']</Answer>".to_string(),
                true_answer: "['2001']".to_string(),
                error_reflection: "picked the wrong row".to_string(),
            })
            .await
            .unwrap();
        assert!(id > 0);

        let errors = store.all_errors().await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].question, "Which year?");

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.knowledge_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.learning_by_flag.get(&2), Some(&1));
    }
}
