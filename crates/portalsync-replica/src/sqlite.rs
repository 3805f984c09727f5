//! `SQLite`-backed implementation of [`ReplicaStore`].
//!
//! A credential handle names a `SQLite` database inside the credentials
//! directory; a replica container is a `SQLite` file of its own. Extraction
//! attaches the source to the container's connection and copies rows with a
//! single `CREATE TABLE ... AS SELECT`.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::{self, ReplicaError};
use crate::store::{ReplicaContainer, ReplicaStore, SourceTable};

const CONTAINER_EXTENSION: &str = "db";
const SOURCE_ALIAS: &str = "src";

/// `SQLite` replica storage rooted at a credentials directory.
pub struct SqliteReplicaStore {
    credentials_dir: PathBuf,
}

impl SqliteReplicaStore {
    #[must_use]
    pub fn new(credentials_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
        }
    }

    /// Path of the source database a credential resolves to.
    #[must_use]
    pub fn source_path(&self, source: &SourceTable) -> PathBuf {
        self.credentials_dir.join(source.credential.as_str())
    }

    /// Number of rows in `table` of `container`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicaError::Sqlite`] if the container or table cannot be read.
    pub fn count_rows(&self, container: &ReplicaContainer, table: &str) -> error::Result<u64> {
        let conn = Connection::open(&container.path)?;
        count_rows(&conn, "main", table)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn count_rows(conn: &Connection, schema: &str, table: &str) -> error::Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {schema}.{}", quote_ident(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

impl ReplicaStore for SqliteReplicaStore {
    fn create_container(&self, dir: &Path, name: &str) -> error::Result<ReplicaContainer> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.{CONTAINER_EXTENSION}"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        // Any write forces the file onto disk; an empty database is a valid container.
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "user_version", 1)?;
        tracing::debug!(container = name, path = %path.display(), "Created replica container");
        Ok(ReplicaContainer {
            name: name.to_string(),
            path,
        })
    }

    fn extract_rows(
        &self,
        source: &SourceTable,
        target: &ReplicaContainer,
        table: &str,
        row_filter: Option<&str>,
    ) -> error::Result<u64> {
        let source_path = self.source_path(source);
        if !source_path.exists() {
            return Err(ReplicaError::MissingSource {
                credential: source.credential.to_string(),
                path: source_path,
            });
        }

        let conn = Connection::open(&target.path)?;
        let source_file = source_path.to_string_lossy().into_owned();
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {SOURCE_ALIAS}"),
            [source_file.as_str()],
        )?;

        let target_table = quote_ident(table);
        let where_clause = row_filter
            .filter(|f| !f.trim().is_empty())
            .map(|f| format!(" WHERE {f}"))
            .unwrap_or_default();
        let extraction_err = |e: rusqlite::Error| ReplicaError::Extraction {
            dataset: source.dataset.clone(),
            message: e.to_string(),
        };
        // One statement per call; a filter cannot smuggle in a second one.
        conn.execute(&format!("DROP TABLE IF EXISTS main.{target_table}"), [])
            .map_err(extraction_err)?;
        conn.execute(
            &format!(
                "CREATE TABLE main.{target_table} AS SELECT * FROM {SOURCE_ALIAS}.{}{where_clause}",
                quote_ident(&source.dataset)
            ),
            [],
        )
        .map_err(extraction_err)?;

        let rows = count_rows(&conn, "main", table)?;
        tracing::debug!(
            dataset = source.dataset,
            table,
            container = target.name,
            rows,
            "Extracted rows into replica"
        );
        Ok(rows)
    }
}
