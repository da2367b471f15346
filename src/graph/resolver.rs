//! Entity resolution over extracted claims.

use super::GraphStore;
use crate::models::{Claim, ConflictPair};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Capitalized word sequences ("Access Tokens", "PostgreSQL") are treated
/// as entity mentions.
#[allow(clippy::unwrap_used)]
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z][A-Za-z0-9+.#-]*(?:\s+[A-Z][A-Za-z0-9+.#-]*)*\b").unwrap()
});

/// Well-known technology names recognized regardless of casing.
static KNOWN_ENTITIES: &[&str] = &[
    "postgresql", "postgres", "sqlite", "redis", "kafka", "neo4j", "docker", "kubernetes",
    "linux", "macos", "windows", "rust", "python", "javascript", "typescript", "oauth", "jwt",
    "http", "https", "grpc", "graphql",
];

/// Result of linking a batch of claims into the graph.
#[derive(Debug, Default)]
pub struct LinkOutcome {
    /// Distinct entities linked.
    pub entities_linked: usize,
    /// Warnings (graph unavailability and the like).
    pub warnings: Vec<String>,
}

/// Detects and canonicalizes entities, writing relationships through the
/// graph store. A `None` store means the resolver is disabled and is
/// never contacted.
pub struct EntityResolver {
    store: Option<Box<dyn GraphStore>>,
}

impl EntityResolver {
    /// Creates a resolver. Pass `None` to disable graph building.
    #[must_use]
    pub fn new(store: Option<Box<dyn GraphStore>>) -> Self {
        Self { store }
    }

    /// Returns true when a graph store is attached.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Links the claims' entity mentions into the graph.
    ///
    /// Never fails: a store failure stops further writes for this call
    /// and is reported as a warning (ingest must not fail on graph
    /// unavailability).
    #[must_use]
    pub fn link_claims(&self, claims: &[Claim]) -> LinkOutcome {
        let Some(store) = &self.store else {
            return LinkOutcome::default();
        };

        let mut outcome = LinkOutcome::default();
        let mut linked: BTreeSet<String> = BTreeSet::new();

        for claim in claims {
            let mentions = extract_mentions(&format!("{} {}", claim.subject, claim.object));
            let mut entity_ids = Vec::new();
            for mention in &mentions {
                let canonical = canonicalize(mention);
                match store.upsert_entity(mention, &canonical) {
                    Ok(id) => {
                        if let Err(e) = store.link_claim(&id, &claim.id) {
                            outcome.warnings.push(e.to_string());
                            return outcome;
                        }
                        linked.insert(canonical);
                        entity_ids.push(id);
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "graph store unavailable, skipping entity linking");
                        outcome.warnings.push(e.to_string());
                        outcome.entities_linked = linked.len();
                        return outcome;
                    },
                }
            }
            // Entities co-occurring in one claim relate to each other.
            for (i, a) in entity_ids.iter().enumerate() {
                for b in entity_ids.iter().skip(i + 1) {
                    if let Err(e) = store.relate_entities(a, b) {
                        outcome.warnings.push(e.to_string());
                        outcome.entities_linked = linked.len();
                        return outcome;
                    }
                }
            }
        }

        outcome.entities_linked = linked.len();
        outcome
    }

    /// Records `CONFLICTS_WITH` edges for detected conflict pairs.
    /// Best-effort like [`Self::link_claims`].
    #[must_use]
    pub fn link_conflicts(&self, pairs: &[ConflictPair]) -> Vec<String> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let mut warnings = Vec::new();
        for pair in pairs {
            if let Err(e) = store.link_conflict(&pair.claim_a.id, &pair.claim_b.id) {
                warnings.push(e.to_string());
                break;
            }
        }
        warnings
    }
}

/// Extracts entity mentions from text.
fn extract_mentions(text: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for m in MENTION_RE.find_iter(text) {
        let mention = m.as_str().trim();
        // Single short capitalized words are usually sentence starts, not
        // entities; require length or multiple words.
        let word_count = mention.split_whitespace().count();
        if word_count == 1 && mention.len() < 4 && !mention.chars().all(char::is_uppercase) {
            continue;
        }
        if seen.insert(canonicalize(mention)) {
            mentions.push(mention.to_string());
        }
    }

    let lowered = text.to_lowercase();
    for known in KNOWN_ENTITIES {
        if lowered.contains(known) && seen.insert((*known).to_string()) {
            mentions.push((*known).to_string());
        }
    }
    mentions
}

/// Canonical form of a mention: lowercase with collapsed whitespace.
fn canonicalize(mention: &str) -> String {
    mention
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SqliteGraphStore;
    use crate::models::{ClaimId, DocumentId, SectionId};

    fn claim(subject: &str, object: &str) -> Claim {
        Claim {
            id: ClaimId::generate(),
            document_id: DocumentId::generate(),
            section_id: SectionId::generate(),
            subject: subject.to_string(),
            predicate: "uses".to_string(),
            object: object.to_string(),
            qualifier: None,
            confidence: 0.9,
            source_span: None,
        }
    }

    #[test]
    fn test_extract_mentions() {
        let mentions = extract_mentions("Access Tokens use PostgreSQL for storage");
        assert!(mentions.iter().any(|m| m == "Access Tokens"));
        assert!(mentions.iter().any(|m| canonicalize(m) == "postgresql"));
    }

    #[test]
    fn test_disabled_resolver_is_noop() {
        let resolver = EntityResolver::new(None);
        assert!(!resolver.enabled());
        let outcome = resolver.link_claims(&[claim("PostgreSQL", "Redis")]);
        assert_eq!(outcome.entities_linked, 0);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_link_claims_counts_entities() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let resolver = EntityResolver::new(Some(Box::new(store)));
        let outcome = resolver.link_claims(&[
            claim("The Auth Service", "PostgreSQL"),
            claim("The Auth Service", "Redis"),
        ]);
        assert!(outcome.warnings.is_empty());
        assert!(outcome.entities_linked >= 3);
    }

    /// A store that fails every operation, standing in for an
    /// unreachable graph database.
    struct DownStore;

    impl GraphStore for DownStore {
        fn upsert_entity(&self, _: &str, _: &str) -> crate::Result<String> {
            Err(crate::Error::GraphUnavailable("connection refused".to_string()))
        }
        fn link_claim(&self, _: &str, _: &ClaimId) -> crate::Result<()> {
            Err(crate::Error::GraphUnavailable("connection refused".to_string()))
        }
        fn relate_entities(&self, _: &str, _: &str) -> crate::Result<()> {
            Err(crate::Error::GraphUnavailable("connection refused".to_string()))
        }
        fn link_conflict(&self, _: &ClaimId, _: &ClaimId) -> crate::Result<()> {
            Err(crate::Error::GraphUnavailable("connection refused".to_string()))
        }
        fn entity_count(&self) -> crate::Result<usize> {
            Err(crate::Error::GraphUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_unreachable_store_degrades_to_warning() {
        let resolver = EntityResolver::new(Some(Box::new(DownStore)));
        let outcome = resolver.link_claims(&[claim("PostgreSQL", "Redis")]);
        assert_eq!(outcome.entities_linked, 0);
        assert!(!outcome.warnings.is_empty());
    }
}
