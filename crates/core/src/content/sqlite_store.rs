//! SQLite-backed content store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::enricher::{ItemEnrichmentResult, ItemStatus};

use super::store::{ContentStore, StoreError};
use super::types::{ContentCounts, ContentItem, ContentQuery, ContentType, NewContentItem};

/// SQLite-backed content store.
pub struct SqliteContentStore {
    conn: Mutex<Connection>,
}

impl SqliteContentStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_type TEXT NOT NULL,
                text TEXT NOT NULL,
                language_hint TEXT,
                published_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS enrichment_results (
                content_type TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                overall_confidence REAL NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 1,
                result TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (content_type, item_id)
            );

            CREATE INDEX IF NOT EXISTS idx_content_items_type ON content_items(content_type, id);
            CREATE INDEX IF NOT EXISTS idx_content_items_published ON content_items(published_at);
            CREATE INDEX IF NOT EXISTS idx_enrichment_results_status ON enrichment_results(content_type, status);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<ContentItem> {
        let id: i64 = row.get(0)?;
        let content_type_str: String = row.get(1)?;
        let text: String = row.get(2)?;
        let language_hint: Option<String> = row.get(3)?;
        let published_at_str: Option<String> = row.get(4)?;

        let content_type = content_type_str.parse::<ContentType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?;

        let published_at = published_at_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(ContentItem {
            id,
            content_type,
            text,
            language_hint,
            published_at,
        })
    }
}

/// Fixed-width timestamps so that text comparison in SQL orders correctly.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ContentStore for SqliteContentStore {
    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO content_items (content_type, text, language_hint, published_at, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                item.content_type.as_str(),
                item.text,
                item.language_hint,
                item.published_at.as_ref().map(timestamp),
                timestamp(&Utc::now()),
            ],
        )?;

        Ok(ContentItem {
            id: conn.last_insert_rowid(),
            content_type: item.content_type,
            text: item.text,
            language_hint: item.language_hint,
            published_at: item.published_at,
        })
    }

    fn get(&self, content_type: ContentType, id: i64) -> Result<Option<ContentItem>, StoreError> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                "SELECT id, content_type, text, language_hint, published_at FROM content_items WHERE id = ? AND content_type = ?",
                params![id, content_type.as_str()],
                Self::row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    fn pending(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError> {
        let conn = self.conn()?;

        let mut conditions = vec!["i.content_type = ?".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(query.content_type.as_str().to_string())];

        if !query.force_reprocess {
            conditions.push("(r.item_id IS NULL OR r.status = 'failed')".to_string());
        }
        if let Some(ref ids) = query.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            conditions.push(format!("i.id IN ({})", placeholders));
            for id in ids {
                values.push(Box::new(*id));
            }
        }
        if let Some(ref since) = query.since {
            conditions.push("i.published_at IS NOT NULL AND i.published_at >= ?".to_string());
            values.push(Box::new(timestamp(since)));
        }
        if let Some(ref until) = query.until {
            conditions.push("i.published_at IS NOT NULL AND i.published_at <= ?".to_string());
            values.push(Box::new(timestamp(until)));
        }

        let mut sql = format!(
            "SELECT i.id, i.content_type, i.text, i.language_hint, i.published_at \
             FROM content_items i \
             LEFT JOIN enrichment_results r ON r.content_type = i.content_type AND r.item_id = i.id \
             WHERE {} ORDER BY i.id ASC",
            conditions.join(" AND ")
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let params: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params.as_slice(), Self::row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn save_result(&self, result: &ItemEnrichmentResult) -> Result<(), StoreError> {
        let json = serde_json::to_string(result)?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT OR REPLACE INTO enrichment_results (content_type, item_id, status, overall_confidence, attempts, result, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                result.content_type.as_str(),
                result.item_id,
                result.status.as_str(),
                f64::from(result.overall_confidence),
                result.attempts,
                json,
                timestamp(&result.completed_at),
            ],
        )?;
        Ok(())
    }

    fn get_result(
        &self,
        content_type: ContentType,
        item_id: i64,
    ) -> Result<Option<ItemEnrichmentResult>, StoreError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT result FROM enrichment_results WHERE content_type = ? AND item_id = ?",
                params![content_type.as_str(), item_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    fn counts(&self, content_type: ContentType) -> Result<ContentCounts, StoreError> {
        let conn = self.conn()?;
        let (total, enriched, failed): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN r.status IS NOT NULL AND r.status != ? THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN r.status = ? THEN 1 ELSE 0 END), 0) \
             FROM content_items i \
             LEFT JOIN enrichment_results r ON r.content_type = i.content_type AND r.item_id = i.id \
             WHERE i.content_type = ?",
            params![
                ItemStatus::Failed.as_str(),
                ItemStatus::Failed.as_str(),
                content_type.as_str()
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(ContentCounts {
            total: total as u64,
            enriched: enriched as u64,
            failed: failed as u64,
            pending: (total - enriched).max(0) as u64,
        })
    }
}
