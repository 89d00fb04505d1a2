// Document backend: per-record rows in SQLite.
//
// Each image/category is stored as one row keyed by its business id, with
// the serialized JSON document and an integer revision token bumped on every
// update. The token backs optimistic concurrency for callers that need it;
// migration upserts deliberately match by business id and ignore revisions.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, ShoeboxError};
use crate::model::{Category, MediaRecord};
use crate::store::PersistenceSink;

#[derive(Debug)]
pub struct DocumentStore {
    conn: Connection,
}

impl DocumentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Current revision token for a row, `None` when absent.
    pub fn revision(&self, table: Collection, id: &str) -> Result<Option<i64>> {
        let sql = format!("SELECT rev FROM {} WHERE id = ?1", table.table_name());
        let rev = self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        Ok(rev)
    }

    /// Update an image only if the caller's revision is still current.
    pub fn update_image_checked(
        &self,
        id: &str,
        record: &MediaRecord,
        expected_rev: i64,
    ) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        let changed = self.conn.execute(
            "UPDATE images SET doc = ?1, rev = rev + 1 WHERE id = ?2 AND rev = ?3",
            params![doc, id, expected_rev],
        )?;
        if changed == 0 {
            return Err(ShoeboxError::RevisionConflict(id.to_string(), expected_rev));
        }
        Ok(())
    }

    fn upsert_image_row(&self, record: &MediaRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO images (id, doc) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc, rev = rev + 1",
            params![record.id, doc],
        )?;
        Ok(())
    }

    fn upsert_category_row(&self, category: &Category) -> Result<()> {
        let doc = serde_json::to_string(category)?;
        self.conn.execute(
            "INSERT INTO categories (id, doc, ord) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET doc = excluded.doc, ord = excluded.ord, rev = rev + 1",
            params![category.id, doc, category.order],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Collection {
    Images,
    Categories,
}

impl Collection {
    fn table_name(self) -> &'static str {
        match self {
            Collection::Images => "images",
            Collection::Categories => "categories",
        }
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images (
                id  TEXT PRIMARY KEY,
                rev INTEGER NOT NULL DEFAULT 1,
                doc TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS categories (
                id  TEXT PRIMARY KEY,
                rev INTEGER NOT NULL DEFAULT 1,
                doc TEXT NOT NULL,
                ord INTEGER NOT NULL DEFAULT 0
            );
            PRAGMA user_version = 1;",
        )?;
    }

    Ok(())
}

impl PersistenceSink for DocumentStore {
    fn load_all(&self) -> Result<(Vec<MediaRecord>, Vec<Category>)> {
        let mut stmt = self.conn.prepare("SELECT doc FROM images")?;
        let images = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .iter()
            .map(|doc| serde_json::from_str(doc))
            .collect::<std::result::Result<Vec<MediaRecord>, _>>()?;

        // SQLite row order is not insertion order; the explicit ord column
        // keeps category iteration deterministic across backends.
        let mut stmt = self
            .conn
            .prepare("SELECT doc FROM categories ORDER BY ord, id")?;
        let categories = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .iter()
            .map(|doc| serde_json::from_str(doc))
            .collect::<std::result::Result<Vec<Category>, _>>()?;

        Ok((images, categories))
    }

    fn save_all(&self, images: &[MediaRecord], categories: &[Category]) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        let result = (|| -> Result<()> {
            for record in images {
                self.upsert_image_row(record)?;
            }
            for category in categories {
                self.upsert_category_row(category)?;
            }
            // save_all replaces the collections; drop rows with no
            // counterpart in the new state.
            delete_missing(&self.conn, "images", images.iter().map(|i| i.id.as_str()))?;
            delete_missing(
                &self.conn,
                "categories",
                categories.iter().map(|c| c.id.as_str()),
            )?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn get_image(&self, id: &str) -> Result<Option<MediaRecord>> {
        let doc: Option<String> = self
            .conn
            .query_row("SELECT doc FROM images WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn create_image(&self, record: &MediaRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        self.conn
            .execute(
                "INSERT INTO images (id, doc) VALUES (?1, ?2)",
                params![record.id, doc],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ShoeboxError::Other(format!("image already exists: {}", record.id))
                }
                other => other.into(),
            })?;
        Ok(())
    }

    fn update_image(&self, id: &str, record: &MediaRecord) -> Result<()> {
        let doc = serde_json::to_string(record)?;
        let changed = self.conn.execute(
            "UPDATE images SET doc = ?1, rev = rev + 1 WHERE id = ?2",
            params![doc, id],
        )?;
        if changed == 0 {
            return Err(ShoeboxError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_image(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let doc: Option<String> = self
            .conn
            .query_row(
                "SELECT doc FROM categories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    fn create_category(&self, category: &Category) -> Result<()> {
        let doc = serde_json::to_string(category)?;
        self.conn
            .execute(
                "INSERT INTO categories (id, doc, ord) VALUES (?1, ?2, ?3)",
                params![category.id, doc, category.order],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    ShoeboxError::Other(format!("category already exists: {}", category.id))
                }
                other => other.into(),
            })?;
        Ok(())
    }

    fn update_category(&self, id: &str, category: &Category) -> Result<()> {
        let doc = serde_json::to_string(category)?;
        let changed = self.conn.execute(
            "UPDATE categories SET doc = ?1, ord = ?2, rev = rev + 1 WHERE id = ?3",
            params![doc, category.order, id],
        )?;
        if changed == 0 {
            return Err(ShoeboxError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete_category(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(())
    }

}

fn delete_missing<'a>(
    conn: &Connection,
    table: &str,
    keep: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let ids: Vec<&str> = keep.collect();
    let existing: Vec<String> = {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {}", table))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };
    for id in existing {
        if !ids.contains(&id.as_str()) {
            conn.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])?;
        }
    }
    Ok(())
}
