use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::protocol::DocumentPath;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub path: DocumentPath,
    pub body: Value,
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own empty schema.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Replaces the whole document at `path` and bumps its revision.
    pub async fn put_document(&self, path: &DocumentPath, body: &Value) -> Result<StoredDocument> {
        let encoded = serde_json::to_string(body).context("failed to encode document body")?;
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO documents (path, body, revision, updated_at) VALUES (?, ?, 1, ?)
             ON CONFLICT(path) DO UPDATE SET
                body = excluded.body,
                revision = documents.revision + 1,
                updated_at = excluded.updated_at
             RETURNING revision",
        )
        .bind(path.as_str())
        .bind(encoded.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to store document '{path}'"))?;

        let revision = rec.get::<i64, _>(0);
        debug!(%path, revision, bytes = encoded.len(), "document stored");
        Ok(StoredDocument {
            path: path.clone(),
            body: body.clone(),
            revision,
            updated_at: now,
        })
    }

    pub async fn load_document(&self, path: &DocumentPath) -> Result<Option<StoredDocument>> {
        let row = sqlx::query(
            "SELECT body, revision, updated_at FROM documents WHERE path = ? AND body IS NOT NULL",
        )
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_body: String = row.get("body");
        let body = serde_json::from_str(&raw_body)
            .with_context(|| format!("stored document '{path}' is not valid JSON"))?;
        Ok(Some(StoredDocument {
            path: path.clone(),
            body,
            revision: row.get::<i64, _>("revision"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }))
    }

    /// Latest revision at `path`, including deletes. `0` if never written.
    pub async fn revision(&self, path: &DocumentPath) -> Result<i64> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM documents WHERE path = ?")
                .bind(path.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(revision.unwrap_or(0))
    }

    /// Clears the body and bumps the revision. Returns the new revision, or
    /// `None` if nothing was stored.
    pub async fn delete_document(&self, path: &DocumentPath) -> Result<Option<i64>> {
        let row = sqlx::query(
            "UPDATE documents SET body = NULL, revision = revision + 1, updated_at = ?
             WHERE path = ? AND body IS NOT NULL
             RETURNING revision",
        )
        .bind(Utc::now())
        .bind(path.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>(0)))
    }

    pub async fn list_paths(&self) -> Result<Vec<DocumentPath>> {
        let rows = sqlx::query("SELECT path FROM documents WHERE body IS NOT NULL ORDER BY path ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let raw: String = r.get(0);
                DocumentPath::parse(&raw).map_err(|e| anyhow::anyhow!(e.message))
            })
            .collect()
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
