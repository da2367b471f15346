//! The authoritative SQLite document store.
//!
//! Holds documents, sections, claims, vectors, and supersessions. A
//! document with its sections commits atomically; claims and vectors are
//! written after that commit, idempotently keyed by owner id, so a partial
//! enrichment failure never leaves a half-visible document (the
//! "best-effort enrichment" rule).
//!
//! # Concurrency Model
//!
//! Uses a `Mutex<Connection>` because `rusqlite::Connection` is not `Sync`.
//! WAL mode and `busy_timeout` mitigate contention; the unique index on
//! `content_hash` is the serialization point for concurrent duplicate
//! ingests.

use super::connection::{acquire_lock, configure_connection, is_transient, persistence_error};
use super::sql::{escape_like_wildcards, glob_to_like_pattern};
use crate::models::{
    Claim, ClaimId, Document, DocumentId, DocumentStatus, DocumentType, Section, SectionId,
    Supersession, VectorOwner,
};
use crate::{Error, Result, current_timestamp};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

/// SQLite-backed authoritative store.
pub struct DocumentStore {
    /// Connection to the SQLite database, serialized by a mutex.
    conn: Mutex<Connection>,
    /// Path to the database (`None` for in-memory).
    db_path: Option<PathBuf>,
}

impl DocumentStore {
    /// Opens (and if necessary creates) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Persistence {
                    operation: "create_data_dir".to_string(),
                    cause: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(&db_path)
            .map_err(|e| persistence_error("open_store", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| persistence_error("open_store_in_memory", &e))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (`None` for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Initializes the schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                document_type TEXT NOT NULL,
                authority_level INTEGER NOT NULL DEFAULT 5,
                tags TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active',
                raw_content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                modified_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sections (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                header TEXT NOT NULL,
                level INTEGER NOT NULL,
                content TEXT NOT NULL,
                byte_start INTEGER NOT NULL,
                byte_end INTEGER NOT NULL,
                ordinal INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS claims (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                section_id TEXT NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
                subject TEXT NOT NULL,
                predicate TEXT NOT NULL,
                object TEXT NOT NULL,
                qualifier TEXT,
                confidence REAL NOT NULL,
                span_start INTEGER,
                span_end INTEGER
            );
            CREATE TABLE IF NOT EXISTS vectors (
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                dim INTEGER NOT NULL,
                vals BLOB NOT NULL,
                PRIMARY KEY (owner_kind, owner_id)
            );
            CREATE TABLE IF NOT EXISTS supersessions (
                id TEXT PRIMARY KEY,
                old_document_id TEXT NOT NULL,
                new_document_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            CREATE INDEX IF NOT EXISTS idx_sections_document ON sections(document_id, ordinal);
            CREATE INDEX IF NOT EXISTS idx_claims_section ON claims(section_id);
            CREATE INDEX IF NOT EXISTS idx_claims_document ON claims(document_id);
            CREATE INDEX IF NOT EXISTS idx_supersessions_old ON supersessions(old_document_id);
            CREATE INDEX IF NOT EXISTS idx_supersessions_new ON supersessions(new_document_id);",
        )
        .map_err(|e| persistence_error("initialize_schema", &e))?;

        Ok(())
    }

    /// Runs `f` inside a transaction, retrying once on transient lock
    /// contention. The transaction rolls back if `f` fails.
    fn transaction<T>(
        &self,
        operation: &str,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = acquire_lock(&self.conn);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::transaction_once(&conn, &f) {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt == 1 => {
                    metrics::counter!("doctrine_store_transient_retry_total").increment(1);
                    tracing::debug!(operation, error = %e, "retrying transient persistence failure");
                    std::thread::sleep(std::time::Duration::from_millis(50));
                },
                Err(e) => return Err(map_sqlite_error(operation, &e)),
            }
        }
    }

    fn transaction_once<T>(
        conn: &Connection,
        f: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            },
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            },
        }
    }

    // ── Documents & sections ────────────────────────────────────────────

    /// Inserts a document and all its sections in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateContent`] when a document with the same
    /// content hash already exists (the caller converts this into an
    /// idempotent metadata update). A partial failure leaves no document
    /// row visible.
    #[instrument(skip(self, document, sections), fields(document.id = %document.id))]
    pub fn insert_document_with_sections(
        &self,
        document: &Document,
        sections: &[Section],
    ) -> Result<()> {
        let result = self.transaction("insert_document", |conn| {
            conn.execute(
                "INSERT INTO documents
                    (id, content_hash, title, document_type, authority_level, tags, status,
                     raw_content, created_at, modified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    document.id.as_str(),
                    document.content_hash,
                    document.title,
                    document.document_type.as_str(),
                    i64::from(document.authority_level),
                    join_tags(&document.tags),
                    document.status.as_str(),
                    document.raw_content,
                    to_i64(document.created_at),
                    to_i64(document.modified_at),
                ],
            )?;
            for section in sections {
                conn.execute(
                    "INSERT INTO sections
                        (id, document_id, header, level, content, byte_start, byte_end, ordinal)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        section.id.as_str(),
                        section.document_id.as_str(),
                        section.header,
                        i64::from(section.level),
                        section.content,
                        usize_to_i64(section.byte_range.0),
                        usize_to_i64(section.byte_range.1),
                        usize_to_i64(section.ordinal),
                    ],
                )?;
            }
            Ok(())
        });

        match result {
            Err(Error::Persistence { cause, .. }) if cause.contains("documents.content_hash") => {
                let existing = self.find_by_content_hash(&document.content_hash)?;
                existing.map_or_else(
                    || {
                        Err(Error::Persistence {
                            operation: "insert_document".to_string(),
                            cause,
                        })
                    },
                    |id| {
                        Err(Error::DuplicateContent {
                            document_id: id.as_str().to_string(),
                        })
                    },
                )
            },
            other => other,
        }
    }

    /// Looks a document up by content hash.
    pub fn find_by_content_hash(&self, content_hash: &str) -> Result<Option<DocumentId>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id FROM documents WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|opt| opt.map(DocumentId::from))
        .map_err(|e| persistence_error("find_by_content_hash", &e))
    }

    /// Fetches a document by id.
    pub fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT id, content_hash, title, document_type, authority_level, tags, status,
                    raw_content, created_at, modified_at
             FROM documents WHERE id = ?1",
            params![id.as_str()],
            document_from_row,
        )
        .optional()
        .map_err(|e| persistence_error("get_document", &e))
    }

    /// Lists documents, newest first. Hidden statuses (deprecated,
    /// archived) are excluded unless `include_hidden`.
    pub fn list_documents(&self, include_hidden: bool) -> Result<Vec<Document>> {
        let conn = acquire_lock(&self.conn);
        let sql = if include_hidden {
            "SELECT id, content_hash, title, document_type, authority_level, tags, status,
                    raw_content, created_at, modified_at
             FROM documents ORDER BY modified_at DESC"
        } else {
            "SELECT id, content_hash, title, document_type, authority_level, tags, status,
                    raw_content, created_at, modified_at
             FROM documents WHERE status IN ('active', 'superseded')
             ORDER BY modified_at DESC"
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| persistence_error("list_documents", &e))?;
        let rows = stmt
            .query_map([], document_from_row)
            .map_err(|e| persistence_error("list_documents", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("list_documents", &e))
    }

    /// Updates document metadata in place (the idempotent re-ingest path)
    /// and bumps `modified_at`.
    pub fn update_document_metadata(
        &self,
        id: &DocumentId,
        document_type: Option<DocumentType>,
        authority_level: Option<u8>,
        tags: Option<&BTreeSet<String>>,
        title: Option<&str>,
    ) -> Result<()> {
        let Some(current) = self.get_document(id)? else {
            return Err(Error::NotFound(format!("document {id}")));
        };

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE documents
             SET document_type = ?2, authority_level = ?3, tags = ?4, title = ?5, modified_at = ?6
             WHERE id = ?1",
            params![
                id.as_str(),
                document_type.unwrap_or(current.document_type).as_str(),
                i64::from(authority_level.unwrap_or(current.authority_level)),
                join_tags(tags.unwrap_or(&current.tags)),
                title.unwrap_or(&current.title),
                to_i64(current_timestamp()),
            ],
        )
        .map_err(|e| persistence_error("update_document_metadata", &e))?;
        Ok(())
    }

    /// Transitions a document's status.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown ids; [`Error::Validation`] for a
    /// transition back to `active` (transitions are monotonic).
    pub fn set_document_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<()> {
        let Some(current) = self.get_document(id)? else {
            return Err(Error::NotFound(format!("document {id}")));
        };
        if current.status == status {
            return Ok(());
        }
        if !current.status.can_transition_to(status) {
            return Err(Error::Validation(format!(
                "status: cannot transition {} -> {}",
                current.status, status
            )));
        }

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE documents SET status = ?2, modified_at = ?3 WHERE id = ?1",
            params![id.as_str(), status.as_str(), to_i64(current_timestamp())],
        )
        .map_err(|e| persistence_error("set_document_status", &e))?;
        Ok(())
    }

    /// Returns all sections of a document in ordinal order.
    pub fn sections_for_document(&self, id: &DocumentId) -> Result<Vec<Section>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, header, level, content, byte_start, byte_end, ordinal
                 FROM sections WHERE document_id = ?1 ORDER BY ordinal",
            )
            .map_err(|e| persistence_error("sections_for_document", &e))?;
        let rows = stmt
            .query_map(params![id.as_str()], section_from_row)
            .map_err(|e| persistence_error("sections_for_document", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("sections_for_document", &e))
    }

    /// Fetches sections by id, in the order given (missing ids are
    /// skipped).
    pub fn sections_by_ids(&self, ids: &[SectionId]) -> Result<Vec<Section>> {
        let mut by_id = HashMap::new();
        {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT id, document_id, header, level, content, byte_start, byte_end, ordinal
                     FROM sections WHERE id = ?1",
                )
                .map_err(|e| persistence_error("sections_by_ids", &e))?;
            for id in ids {
                let row = stmt
                    .query_row(params![id.as_str()], section_from_row)
                    .optional()
                    .map_err(|e| persistence_error("sections_by_ids", &e))?;
                if let Some(section) = row {
                    by_id.insert(id.clone(), section);
                }
            }
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    // ── Claims ──────────────────────────────────────────────────────────

    /// Replaces all claims of a section atomically (old claims and their
    /// vectors are removed first). Idempotent per section.
    pub fn replace_section_claims(&self, section_id: &SectionId, claims: &[Claim]) -> Result<()> {
        self.transaction("replace_section_claims", |conn| {
            conn.execute(
                "DELETE FROM vectors WHERE owner_kind = 'claim'
                 AND owner_id IN (SELECT id FROM claims WHERE section_id = ?1)",
                params![section_id.as_str()],
            )?;
            conn.execute(
                "DELETE FROM claims WHERE section_id = ?1",
                params![section_id.as_str()],
            )?;
            for claim in claims {
                conn.execute(
                    "INSERT INTO claims
                        (id, document_id, section_id, subject, predicate, object, qualifier,
                         confidence, span_start, span_end)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        claim.id.as_str(),
                        claim.document_id.as_str(),
                        claim.section_id.as_str(),
                        claim.subject,
                        claim.predicate,
                        claim.object,
                        claim.qualifier,
                        f64::from(claim.confidence),
                        claim.source_span.map(|(s, _)| usize_to_i64(s)),
                        claim.source_span.map(|(_, e)| usize_to_i64(e)),
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// Returns all claims of a section.
    pub fn claims_for_section(&self, section_id: &SectionId) -> Result<Vec<Claim>> {
        self.query_claims(
            "SELECT id, document_id, section_id, subject, predicate, object, qualifier,
                    confidence, span_start, span_end
             FROM claims WHERE section_id = ?1",
            section_id.as_str(),
        )
    }

    /// Returns all claims of a document.
    pub fn claims_for_document(&self, document_id: &DocumentId) -> Result<Vec<Claim>> {
        self.query_claims(
            "SELECT id, document_id, section_id, subject, predicate, object, qualifier,
                    confidence, span_start, span_end
             FROM claims WHERE document_id = ?1",
            document_id.as_str(),
        )
    }

    fn query_claims(&self, sql: &str, param: &str) -> Result<Vec<Claim>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| persistence_error("query_claims", &e))?;
        let rows = stmt
            .query_map(params![param], claim_from_row)
            .map_err(|e| persistence_error("query_claims", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("query_claims", &e))
    }

    // ── Vectors ─────────────────────────────────────────────────────────

    /// Inserts or replaces the vector for an owner.
    pub fn upsert_vector(
        &self,
        owner: VectorOwner,
        owner_id: &str,
        values: &[f32],
    ) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR REPLACE INTO vectors (owner_kind, owner_id, dim, vals)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                owner.as_str(),
                owner_id,
                usize_to_i64(values.len()),
                vector_to_blob(values),
            ],
        )
        .map_err(|e| persistence_error("upsert_vector", &e))?;
        metrics::counter!("doctrine_vectors_upserted_total").increment(1);
        Ok(())
    }

    /// Fetches the vector for an owner.
    pub fn get_vector(&self, owner: VectorOwner, owner_id: &str) -> Result<Option<Vec<f32>>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT vals FROM vectors WHERE owner_kind = ?1 AND owner_id = ?2",
            params![owner.as_str(), owner_id],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
        .map(|opt| opt.map(|blob| blob_to_vector(&blob)))
        .map_err(|e| persistence_error("get_vector", &e))
    }

    /// Fetches the vectors for many owners at once.
    pub fn vectors_for_owners(
        &self,
        owner: VectorOwner,
        owner_ids: &[String],
    ) -> Result<HashMap<String, Vec<f32>>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT vals FROM vectors WHERE owner_kind = ?1 AND owner_id = ?2")
            .map_err(|e| persistence_error("vectors_for_owners", &e))?;
        let mut out = HashMap::with_capacity(owner_ids.len());
        for id in owner_ids {
            let blob = stmt
                .query_row(params![owner.as_str(), id], |row| row.get::<_, Vec<u8>>(0))
                .optional()
                .map_err(|e| persistence_error("vectors_for_owners", &e))?;
            if let Some(blob) = blob {
                out.insert(id.clone(), blob_to_vector(&blob));
            }
        }
        Ok(out)
    }

    /// Returns the ids of sections of `document_id` that have no vector
    /// yet (used to back-fill enrichment on re-ingest).
    pub fn sections_missing_vectors(&self, document_id: &DocumentId) -> Result<Vec<SectionId>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT s.id FROM sections s
                 LEFT JOIN vectors v ON v.owner_kind = 'section' AND v.owner_id = s.id
                 WHERE s.document_id = ?1 AND v.owner_id IS NULL
                 ORDER BY s.ordinal",
            )
            .map_err(|e| persistence_error("sections_missing_vectors", &e))?;
        let rows = stmt
            .query_map(params![document_id.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| persistence_error("sections_missing_vectors", &e))?;
        rows.map(|r| r.map(SectionId::from))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("sections_missing_vectors", &e))
    }

    /// Cosine similarity search over stored vectors of one owner kind.
    ///
    /// Vectors are persisted L2-normalized, so the similarity is a plain
    /// dot product. Results are `(owner_id, similarity)` pairs sorted by
    /// descending similarity, truncated to `limit`. `scope` restricts the
    /// search to the given documents; hidden statuses are excluded unless
    /// `include_hidden`.
    pub fn search_vectors(
        &self,
        owner: VectorOwner,
        query: &[f32],
        scope: Option<&[DocumentId]>,
        include_hidden: bool,
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        let owner_table_join = match owner {
            VectorOwner::Section => {
                "JOIN sections o ON o.id = v.owner_id
                 JOIN documents d ON d.id = o.document_id"
            },
            VectorOwner::Claim => {
                "JOIN claims o ON o.id = v.owner_id
                 JOIN documents d ON d.id = o.document_id"
            },
        };
        let mut sql = format!(
            "SELECT v.owner_id, v.vals FROM vectors v {owner_table_join}
             WHERE v.owner_kind = ?1"
        );
        if !include_hidden {
            sql.push_str(" AND d.status IN ('active', 'superseded')");
        }
        let mut bind: Vec<String> = vec![owner.as_str().to_string()];
        if let Some(scope) = scope {
            if scope.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders: Vec<String> = (0..scope.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            sql.push_str(&format!(" AND d.id IN ({})", placeholders.join(",")));
            bind.extend(scope.iter().map(|id| id.as_str().to_string()));
        }

        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| persistence_error("search_vectors", &e))?;
        let rows = stmt
            .query_map(params_from_iter(bind.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| persistence_error("search_vectors", &e))?;

        let mut scored: Vec<(String, f32)> = Vec::new();
        for row in rows {
            let (owner_id, blob) = row.map_err(|e| persistence_error("search_vectors", &e))?;
            let vector = blob_to_vector(&blob);
            if vector.len() == query.len() {
                scored.push((owner_id, dot(query, &vector)));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    // ── Supersessions ───────────────────────────────────────────────────

    /// Appends a supersession record.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the two ids are equal or the link would
    /// create a cycle; [`Error::NotFound`] when either document is
    /// missing.
    pub fn append_supersession(
        &self,
        old_document_id: &DocumentId,
        new_document_id: &DocumentId,
        reason: &str,
    ) -> Result<Supersession> {
        if old_document_id == new_document_id {
            return Err(Error::Validation(
                "superseded_by: a document cannot supersede itself".to_string(),
            ));
        }
        if self.get_document(old_document_id)?.is_none() {
            return Err(Error::NotFound(format!("document {old_document_id}")));
        }
        if self.get_document(new_document_id)?.is_none() {
            return Err(Error::NotFound(format!("document {new_document_id}")));
        }
        if self.supersession_path_exists(new_document_id, old_document_id)? {
            return Err(Error::Validation(
                "superseded_by: supersession would create a cycle".to_string(),
            ));
        }

        let record = Supersession {
            id: uuid::Uuid::new_v4().to_string(),
            old_document_id: old_document_id.clone(),
            new_document_id: new_document_id.clone(),
            reason: reason.to_string(),
            created_at: current_timestamp(),
        };
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO supersessions (id, old_document_id, new_document_id, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.old_document_id.as_str(),
                record.new_document_id.as_str(),
                record.reason,
                to_i64(record.created_at),
            ],
        )
        .map_err(|e| persistence_error("append_supersession", &e))?;
        Ok(record)
    }

    /// Returns true if following supersession links from `from` reaches
    /// `to`.
    fn supersession_path_exists(&self, from: &DocumentId, to: &DocumentId) -> Result<bool> {
        let mut frontier = vec![from.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = frontier.pop() {
            if &current == to {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            let successors = {
                let conn = acquire_lock(&self.conn);
                let mut stmt = conn
                    .prepare(
                        "SELECT new_document_id FROM supersessions WHERE old_document_id = ?1",
                    )
                    .map_err(|e| persistence_error("supersession_path", &e))?;
                let rows = stmt
                    .query_map(params![current.as_str()], |row| row.get::<_, String>(0))
                    .map_err(|e| persistence_error("supersession_path", &e))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| persistence_error("supersession_path", &e))?
            };
            frontier.extend(successors.into_iter().map(DocumentId::from));
        }
        Ok(false)
    }

    /// Returns supersession records where the given document is the old
    /// side.
    pub fn supersessions_of(&self, document_id: &DocumentId) -> Result<Vec<Supersession>> {
        self.query_supersessions(
            "SELECT id, old_document_id, new_document_id, reason, created_at
             FROM supersessions WHERE old_document_id = ?1 ORDER BY created_at",
            document_id,
        )
    }

    /// Returns supersession records where the given document is the
    /// replacement side.
    pub fn supersessions_pointing_to(&self, document_id: &DocumentId) -> Result<Vec<Supersession>> {
        self.query_supersessions(
            "SELECT id, old_document_id, new_document_id, reason, created_at
             FROM supersessions WHERE new_document_id = ?1 ORDER BY created_at",
            document_id,
        )
    }

    fn query_supersessions(&self, sql: &str, document_id: &DocumentId) -> Result<Vec<Supersession>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| persistence_error("query_supersessions", &e))?;
        let rows = stmt
            .query_map(params![document_id.as_str()], supersession_from_row)
            .map_err(|e| persistence_error("query_supersessions", &e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("query_supersessions", &e))
    }

    // ── Scope resolution ────────────────────────────────────────────────

    /// Resolves scope entries into document ids.
    ///
    /// Each entry may be a document id (canonical UUID), a `tag:` filter,
    /// or a glob pattern matched case-insensitively against titles.
    /// Unknown ids resolve to nothing; order is preserved and duplicates
    /// removed.
    pub fn resolve_scope(
        &self,
        entries: &[String],
        include_hidden: bool,
    ) -> Result<Vec<DocumentId>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            let matched = if uuid::Uuid::parse_str(entry).is_ok() {
                let id = DocumentId::from(entry.as_str());
                match self.get_document(&id)? {
                    Some(doc) if include_hidden || doc.status.retrievable_by_default() => {
                        vec![id]
                    },
                    _ => Vec::new(),
                }
            } else if let Some(tag) = entry.strip_prefix("tag:") {
                self.documents_matching(
                    "(',' || tags || ',') LIKE ?1 ESCAPE '\\'",
                    &format!("%,{},%", escape_like_wildcards(tag)),
                    include_hidden,
                )?
            } else {
                self.documents_matching(
                    "LOWER(title) LIKE ?1 ESCAPE '\\'",
                    &glob_to_like_pattern(&entry.to_lowercase()),
                    include_hidden,
                )?
            };
            for id in matched {
                if seen.insert(id.clone()) {
                    out.push(id);
                }
            }
        }
        Ok(out)
    }

    fn documents_matching(
        &self,
        condition: &str,
        pattern: &str,
        include_hidden: bool,
    ) -> Result<Vec<DocumentId>> {
        let status_filter = if include_hidden {
            ""
        } else {
            " AND status IN ('active', 'superseded')"
        };
        let sql = format!(
            "SELECT id FROM documents WHERE {condition}{status_filter} ORDER BY modified_at DESC"
        );
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| persistence_error("documents_matching", &e))?;
        let rows = stmt
            .query_map(params![pattern], |row| row.get::<_, String>(0))
            .map_err(|e| persistence_error("documents_matching", &e))?;
        rows.map(|r| r.map(DocumentId::from))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| persistence_error("documents_matching", &e))
    }

    // ── Counters ────────────────────────────────────────────────────────

    /// Counts documents, optionally restricted to retrievable statuses.
    pub fn count_documents(&self, include_hidden: bool) -> Result<usize> {
        let sql = if include_hidden {
            "SELECT COUNT(*) FROM documents"
        } else {
            "SELECT COUNT(*) FROM documents WHERE status IN ('active', 'superseded')"
        };
        self.count(sql)
    }

    /// Counts documents with status `active`.
    pub fn count_active_documents(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM documents WHERE status = 'active'")
    }

    /// Counts all sections.
    pub fn count_sections(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM sections")
    }

    /// Counts all claims.
    pub fn count_claims(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM claims")
    }

    /// Counts all vectors.
    pub fn count_vectors(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM vectors")
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let n: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| persistence_error("count", &e))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let tags_str: String = row.get(5)?;
    let type_str: String = row.get(3)?;
    let status_str: String = row.get(6)?;
    Ok(Document {
        id: DocumentId::from(row.get::<_, String>(0)?),
        content_hash: row.get(1)?,
        title: row.get(2)?,
        document_type: DocumentType::parse(&type_str).unwrap_or_default(),
        authority_level: u8::try_from(row.get::<_, i64>(4)?).unwrap_or(5),
        tags: split_tags(&tags_str),
        status: DocumentStatus::parse(&status_str).unwrap_or_default(),
        raw_content: row.get(7)?,
        created_at: from_i64(row.get(8)?),
        modified_at: from_i64(row.get(9)?),
    })
}

fn section_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
    Ok(Section {
        id: SectionId::from(row.get::<_, String>(0)?),
        document_id: DocumentId::from(row.get::<_, String>(1)?),
        header: row.get(2)?,
        level: u8::try_from(row.get::<_, i64>(3)?).unwrap_or(1),
        content: row.get(4)?,
        byte_range: (
            i64_to_usize(row.get(5)?),
            i64_to_usize(row.get(6)?),
        ),
        ordinal: i64_to_usize(row.get(7)?),
    })
}

fn claim_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Claim> {
    let span_start: Option<i64> = row.get(8)?;
    let span_end: Option<i64> = row.get(9)?;
    #[allow(clippy::cast_possible_truncation)]
    let confidence = row.get::<_, f64>(7)? as f32;
    Ok(Claim {
        id: ClaimId::from(row.get::<_, String>(0)?),
        document_id: DocumentId::from(row.get::<_, String>(1)?),
        section_id: SectionId::from(row.get::<_, String>(2)?),
        subject: row.get(3)?,
        predicate: row.get(4)?,
        object: row.get(5)?,
        qualifier: row.get(6)?,
        confidence,
        source_span: match (span_start, span_end) {
            (Some(s), Some(e)) => Some((i64_to_usize(s), i64_to_usize(e))),
            _ => None,
        },
    })
}

fn supersession_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Supersession> {
    Ok(Supersession {
        id: row.get(0)?,
        old_document_id: DocumentId::from(row.get::<_, String>(1)?),
        new_document_id: DocumentId::from(row.get::<_, String>(2)?),
        reason: row.get(3)?,
        created_at: from_i64(row.get(4)?),
    })
}

fn map_sqlite_error(operation: &str, e: &rusqlite::Error) -> Error {
    Error::Persistence {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn join_tags(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(",")
}

fn split_tags(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Encodes a vector as little-endian f32 bytes.
fn vector_to_blob(values: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(values.len() * 4);
    for v in values {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decodes little-endian f32 bytes back into a vector.
fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[allow(clippy::cast_possible_wrap)]
const fn to_i64(v: u64) -> i64 {
    v as i64
}

#[allow(clippy::cast_sign_loss)]
const fn from_i64(v: i64) -> u64 {
    if v < 0 { 0 } else { v as u64 }
}

#[allow(clippy::cast_possible_wrap)]
const fn usize_to_i64(v: usize) -> i64 {
    v as i64
}

fn i64_to_usize(v: i64) -> usize {
    usize::try_from(v).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaimId, SectionId};

    fn sample_document(content: &str) -> (Document, Vec<Section>) {
        let id = DocumentId::generate();
        let document = Document {
            id: id.clone(),
            content_hash: {
                use sha2::{Digest, Sha256};
                hex::encode(Sha256::digest(content.as_bytes()))
            },
            title: "Auth Spec".to_string(),
            document_type: DocumentType::Spec,
            authority_level: 8,
            tags: ["auth", "security"].iter().map(|s| (*s).to_string()).collect(),
            status: DocumentStatus::Active,
            raw_content: content.to_string(),
            created_at: current_timestamp(),
            modified_at: current_timestamp(),
        };
        let sections = vec![
            Section {
                id: SectionId::generate(),
                document_id: id.clone(),
                header: "Tokens".to_string(),
                level: 1,
                content: "Access tokens expire after 1 hour.".to_string(),
                byte_range: (0, 45),
                ordinal: 0,
            },
            Section {
                id: SectionId::generate(),
                document_id: id,
                header: "Sessions".to_string(),
                level: 1,
                content: "Sessions last 24 hours.".to_string(),
                byte_range: (45, 80),
                ordinal: 1,
            },
        ];
        (document, sections)
    }

    fn sample_claim(document_id: &DocumentId, section_id: &SectionId) -> Claim {
        Claim {
            id: ClaimId::generate(),
            document_id: document_id.clone(),
            section_id: section_id.clone(),
            subject: "access tokens".to_string(),
            predicate: "expire after".to_string(),
            object: "1 hour".to_string(),
            qualifier: None,
            confidence: 0.9,
            source_span: Some((0, 34)),
        }
    }

    #[test]
    fn test_insert_and_fetch_document() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("# Tokens\n...");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        let fetched = store.get_document(&document.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Auth Spec");
        assert_eq!(fetched.authority_level, 8);
        assert_eq!(fetched.tags.len(), 2);

        let fetched_sections = store.sections_for_document(&document.id).unwrap();
        assert_eq!(fetched_sections.len(), 2);
        assert_eq!(fetched_sections[0].ordinal, 0);
        assert_eq!(fetched_sections[1].header, "Sessions");
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("same content");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        let (mut dup, dup_sections) = sample_document("same content");
        dup.title = "Different Title".to_string();
        let err = store
            .insert_document_with_sections(&dup, &dup_sections)
            .unwrap_err();
        match err {
            Error::DuplicateContent { document_id } => {
                assert_eq!(document_id, document.id.as_str());
            },
            other => panic!("expected DuplicateContent, got {other}"),
        }
        // The losing insert left nothing behind.
        assert_eq!(store.count_active_documents().unwrap(), 1);
    }

    #[test]
    fn test_status_transitions() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("x");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        store
            .set_document_status(&document.id, DocumentStatus::Deprecated)
            .unwrap();
        let fetched = store.get_document(&document.id).unwrap().unwrap();
        assert_eq!(fetched.status, DocumentStatus::Deprecated);

        // Back to active is forbidden.
        let err = store
            .set_document_status(&document.id, DocumentStatus::Active)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Unknown id is NotFound.
        let err = store
            .set_document_status(&DocumentId::generate(), DocumentStatus::Deprecated)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_claims_replace_is_idempotent() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("x");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        let section_id = sections[0].id.clone();
        let claim = sample_claim(&document.id, &section_id);
        store
            .replace_section_claims(&section_id, &[claim.clone()])
            .unwrap();
        assert_eq!(store.claims_for_section(&section_id).unwrap().len(), 1);

        // Replace with two new claims; the old one is gone.
        let c1 = sample_claim(&document.id, &section_id);
        let c2 = sample_claim(&document.id, &section_id);
        store.replace_section_claims(&section_id, &[c1, c2]).unwrap();
        let claims = store.claims_for_section(&section_id).unwrap();
        assert_eq!(claims.len(), 2);
        assert!(claims.iter().all(|c| c.id != claim.id));
    }

    #[test]
    fn test_vector_roundtrip_and_search() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("x");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        store
            .upsert_vector(VectorOwner::Section, sections[0].id.as_str(), &[1.0, 0.0])
            .unwrap();
        store
            .upsert_vector(VectorOwner::Section, sections[1].id.as_str(), &[0.0, 1.0])
            .unwrap();

        let got = store
            .get_vector(VectorOwner::Section, sections[0].id.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(got, vec![1.0, 0.0]);

        let hits = store
            .search_vectors(VectorOwner::Section, &[1.0, 0.0], None, false, 10)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, sections[0].id.as_str());
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_search_scope_and_status_filter() {
        let store = DocumentStore::in_memory().unwrap();
        let (doc_a, sections_a) = sample_document("doc a");
        store
            .insert_document_with_sections(&doc_a, &sections_a)
            .unwrap();
        let (mut doc_b, mut sections_b) = sample_document("doc b");
        doc_b.title = "Other".to_string();
        for s in &mut sections_b {
            s.document_id = doc_b.id.clone();
        }
        store
            .insert_document_with_sections(&doc_b, &sections_b)
            .unwrap();

        for s in sections_a.iter().chain(&sections_b) {
            store
                .upsert_vector(VectorOwner::Section, s.id.as_str(), &[1.0, 0.0])
                .unwrap();
        }

        // Scope to doc_a only.
        let scoped = store
            .search_vectors(
                VectorOwner::Section,
                &[1.0, 0.0],
                Some(std::slice::from_ref(&doc_a.id)),
                false,
                10,
            )
            .unwrap();
        assert_eq!(scoped.len(), 2);

        // Deprecate doc_a: hidden by default.
        store
            .set_document_status(&doc_a.id, DocumentStatus::Deprecated)
            .unwrap();
        let hits = store
            .search_vectors(VectorOwner::Section, &[1.0, 0.0], None, false, 10)
            .unwrap();
        assert!(hits.iter().all(|(id, _)| {
            sections_b.iter().any(|s| s.id.as_str() == id)
        }));

        // include_hidden brings it back.
        let hits = store
            .search_vectors(VectorOwner::Section, &[1.0, 0.0], None, true, 10)
            .unwrap();
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn test_supersession_cycle_rejected() {
        let store = DocumentStore::in_memory().unwrap();
        let (doc_a, sa) = sample_document("a");
        let (mut doc_b, mut sb) = sample_document("b");
        for s in &mut sb {
            s.document_id = doc_b.id.clone();
        }
        doc_b.title = "B".to_string();
        store.insert_document_with_sections(&doc_a, &sa).unwrap();
        store.insert_document_with_sections(&doc_b, &sb).unwrap();

        store
            .append_supersession(&doc_a.id, &doc_b.id, "merged")
            .unwrap();
        let err = store
            .append_supersession(&doc_b.id, &doc_a.id, "undo")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = store
            .append_supersession(&doc_a.id, &doc_a.id, "self")
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_resolve_scope_by_glob_and_tag() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("scoped");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        // Glob on title (case-insensitive).
        let hits = store.resolve_scope(&["auth*".to_string()], false).unwrap();
        assert_eq!(hits, vec![document.id.clone()]);

        // Tag filter.
        let hits = store
            .resolve_scope(&["tag:security".to_string()], false)
            .unwrap();
        assert_eq!(hits, vec![document.id.clone()]);

        // Direct id.
        let hits = store
            .resolve_scope(&[document.id.as_str().to_string()], false)
            .unwrap();
        assert_eq!(hits, vec![document.id.clone()]);

        // Unknown id resolves to nothing.
        let hits = store
            .resolve_scope(&[DocumentId::generate().as_str().to_string()], false)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_metadata_update_bumps_modified_at() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("meta");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        let new_tags: BTreeSet<String> = ["fresh"].iter().map(|s| (*s).to_string()).collect();
        store
            .update_document_metadata(
                &document.id,
                Some(DocumentType::Decision),
                Some(9),
                Some(&new_tags),
                None,
            )
            .unwrap();
        let fetched = store.get_document(&document.id).unwrap().unwrap();
        assert_eq!(fetched.document_type, DocumentType::Decision);
        assert_eq!(fetched.authority_level, 9);
        assert!(fetched.tags.contains("fresh"));
        assert_eq!(fetched.title, "Auth Spec");
    }

    #[test]
    fn test_sections_missing_vectors() {
        let store = DocumentStore::in_memory().unwrap();
        let (document, sections) = sample_document("missing");
        store
            .insert_document_with_sections(&document, &sections)
            .unwrap();

        assert_eq!(
            store.sections_missing_vectors(&document.id).unwrap().len(),
            2
        );
        store
            .upsert_vector(VectorOwner::Section, sections[0].id.as_str(), &[0.5, 0.5])
            .unwrap();
        let missing = store.sections_missing_vectors(&document.id).unwrap();
        assert_eq!(missing, vec![sections[1].id.clone()]);
    }

    #[test]
    fn test_blob_roundtrip() {
        let values = vec![0.25_f32, -1.5, 3.75];
        assert_eq!(blob_to_vector(&vector_to_blob(&values)), values);
    }
}
