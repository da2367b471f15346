//! SQLite graph store.
//!
//! Keeps the entity graph in its own database so graph growth never
//! contends with the authoritative store.

use super::GraphStore;
use crate::models::ClaimId;
use crate::storage::{acquire_lock, configure_connection};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use std::sync::Mutex;

fn graph_error(operation: &str, e: &rusqlite::Error) -> Error {
    Error::GraphUnavailable(format!("{operation}: {e}"))
}

/// SQLite-backed graph store.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Opens (and if necessary creates) a graph store at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::GraphUnavailable(format!("create_graph_dir: {e}")))?;
            }
        }
        let conn = Connection::open(&db_path).map_err(|e| graph_error("open_graph", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory graph store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| graph_error("open_graph_memory", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_entities (
                id TEXT PRIMARY KEY,
                canonical TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS graph_aliases (
                alias TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL REFERENCES graph_entities(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS graph_entity_claims (
                entity_id TEXT NOT NULL,
                claim_id TEXT NOT NULL,
                PRIMARY KEY (entity_id, claim_id)
            );
            CREATE TABLE IF NOT EXISTS graph_entity_relations (
                entity_a TEXT NOT NULL,
                entity_b TEXT NOT NULL,
                PRIMARY KEY (entity_a, entity_b)
            );
            CREATE TABLE IF NOT EXISTS graph_claim_conflicts (
                claim_a TEXT NOT NULL,
                claim_b TEXT NOT NULL,
                PRIMARY KEY (claim_a, claim_b)
            );",
        )
        .map_err(|e| graph_error("initialize_graph_schema", &e))
    }
}

impl GraphStore for SqliteGraphStore {
    fn upsert_entity(&self, name: &str, canonical: &str) -> Result<String> {
        let conn = acquire_lock(&self.conn);
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM graph_entities WHERE canonical = ?1",
                params![canonical],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| graph_error("find_entity", &e))?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO graph_entities (id, canonical, display_name) VALUES (?1, ?2, ?3)",
                    params![id, canonical, name],
                )
                .map_err(|e| graph_error("insert_entity", &e))?;
                id
            },
        };

        conn.execute(
            "INSERT OR IGNORE INTO graph_aliases (alias, entity_id) VALUES (?1, ?2)",
            params![name.to_lowercase(), id],
        )
        .map_err(|e| graph_error("insert_alias", &e))?;
        Ok(id)
    }

    fn link_claim(&self, entity_id: &str, claim_id: &ClaimId) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO graph_entity_claims (entity_id, claim_id) VALUES (?1, ?2)",
            params![entity_id, claim_id.as_str()],
        )
        .map_err(|e| graph_error("link_claim", &e))?;
        Ok(())
    }

    fn relate_entities(&self, entity_a: &str, entity_b: &str) -> Result<()> {
        // Store once per unordered pair.
        let (first, second) = if entity_a <= entity_b {
            (entity_a, entity_b)
        } else {
            (entity_b, entity_a)
        };
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO graph_entity_relations (entity_a, entity_b) VALUES (?1, ?2)",
            params![first, second],
        )
        .map_err(|e| graph_error("relate_entities", &e))?;
        Ok(())
    }

    fn link_conflict(&self, claim_a: &ClaimId, claim_b: &ClaimId) -> Result<()> {
        let (first, second) = if claim_a.as_str() <= claim_b.as_str() {
            (claim_a, claim_b)
        } else {
            (claim_b, claim_a)
        };
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO graph_claim_conflicts (claim_a, claim_b) VALUES (?1, ?2)",
            params![first.as_str(), second.as_str()],
        )
        .map_err(|e| graph_error("link_conflict", &e))?;
        Ok(())
    }

    fn entity_count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM graph_entities", [], |row| row.get(0))
            .map_err(|e| graph_error("entity_count", &e))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_is_canonical() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let a = store.upsert_entity("PostgreSQL", "postgresql").unwrap();
        let b = store.upsert_entity("postgres", "postgresql").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.entity_count().unwrap(), 1);
    }

    #[test]
    fn test_links_are_idempotent() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let entity = store.upsert_entity("Redis", "redis").unwrap();
        let claim = ClaimId::generate();
        store.link_claim(&entity, &claim).unwrap();
        store.link_claim(&entity, &claim).unwrap();

        let other = store.upsert_entity("Kafka", "kafka").unwrap();
        store.relate_entities(&entity, &other).unwrap();
        store.relate_entities(&other, &entity).unwrap();

        let conn = acquire_lock(&store.conn);
        let relations: i64 = conn
            .query_row("SELECT COUNT(*) FROM graph_entity_relations", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(relations, 1);
    }
}
