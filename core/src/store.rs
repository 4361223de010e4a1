//! In-memory relations of the search index, guarded for concurrent use.
//!
//! Three relations mirror the persistent schema: documents (`tl_search`),
//! terms (`tl_search_term`) and postings (`tl_search_index`). Writers take
//! the exclusive guard for the whole multi-statement unit; readers see the
//! last committed state.

use std::collections::{BTreeMap, HashMap, HashSet};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

pub type DocId = i64;
pub type TermId = i64;

/// One indexed page (`tl_search` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub pid: i64,
    pub tstamp: i64,
    pub url: String,
    pub title: String,
    pub language: String,
    pub protected: bool,
    pub filesize: f64,
    pub groups: Vec<i64>,
    pub text: String,
    pub checksum: String,
    pub vector_length: f64,
}

/// One dictionary entry (`tl_search_term` row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRow {
    pub id: TermId,
    pub term: String,
    pub document_frequency: u32,
}

#[derive(Default)]
struct Tables {
    documents: BTreeMap<DocId, Document>,
    terms: BTreeMap<TermId, TermRow>,
    /// `(doc, term) -> raw term frequency`; the primary key of `tl_search_index`.
    postings: BTreeMap<(DocId, TermId), u32>,
    next_doc_id: DocId,
    next_term_id: TermId,
    // Secondary indexes, rebuilt on snapshot load.
    by_url: HashMap<String, DocId>,
    term_ids: HashMap<String, TermId>,
    by_term: HashMap<TermId, HashSet<DocId>>,
}

/// Shared handle to the index relations.
#[derive(Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from persisted relation rows.
    pub fn from_rows(
        documents: Vec<Document>,
        terms: Vec<TermRow>,
        postings: Vec<(DocId, TermId, u32)>,
        next_doc_id: DocId,
        next_term_id: TermId,
    ) -> Self {
        let mut tables = Tables {
            next_doc_id,
            next_term_id,
            ..Tables::default()
        };
        for doc in documents {
            tables.by_url.insert(doc.url.clone(), doc.id);
            tables.next_doc_id = tables.next_doc_id.max(doc.id);
            tables.documents.insert(doc.id, doc);
        }
        for term in terms {
            tables.term_ids.insert(term.term.clone(), term.id);
            tables.next_term_id = tables.next_term_id.max(term.id);
            tables.terms.insert(term.id, term);
        }
        for (doc, term, tf) in postings {
            tables.by_term.entry(term).or_default().insert(doc);
            tables.postings.insert((doc, term), tf);
        }
        Store {
            tables: RwLock::new(tables),
        }
    }

    /// Exclusive write lock over all three relations.
    pub fn write(&self) -> StoreWriter<'_> {
        StoreWriter {
            tables: self.tables.write(),
        }
    }

    /// Read snapshot of the last committed state.
    pub fn read(&self) -> StoreReader<'_> {
        StoreReader {
            tables: self.tables.read(),
        }
    }

    pub fn document_count(&self) -> usize {
        self.tables.read().documents.len()
    }
}

/// Exclusive writer; holding it is the write critical section.
pub struct StoreWriter<'a> {
    tables: RwLockWriteGuard<'a, Tables>,
}

impl StoreWriter<'_> {
    pub fn document_count(&self) -> usize {
        self.tables.documents.len()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.tables.documents.get(&id)
    }

    pub fn document_by_url(&self, url: &str) -> Option<&Document> {
        let id = self.tables.by_url.get(url)?;
        self.tables.documents.get(id)
    }

    /// The live document sharing this content fingerprint within a group,
    /// if any. At most one exists at a time.
    pub fn document_by_checksum(&self, checksum: &str, pid: i64) -> Option<&Document> {
        self.tables
            .documents
            .values()
            .find(|d| d.checksum == checksum && d.pid == pid)
    }

    pub fn document_ids(&self) -> Vec<DocId> {
        self.tables.documents.keys().copied().collect()
    }

    pub fn id_bounds(&self) -> Option<(DocId, DocId)> {
        let min = self.tables.documents.keys().next()?;
        let max = self.tables.documents.keys().next_back()?;
        Some((*min, *max))
    }

    /// Insert a new document row (assigning the next id) or replace the
    /// row `id` in place, keeping the url index consistent either way.
    pub fn store_document(&mut self, id: Option<DocId>, mut doc: Document) -> DocId {
        let id = match id {
            Some(id) => {
                if let Some(old_url) = self.tables.documents.get(&id).map(|old| old.url.clone()) {
                    self.tables.by_url.remove(&old_url);
                }
                id
            }
            None => {
                self.tables.next_doc_id += 1;
                self.tables.next_doc_id
            }
        };
        doc.id = id;
        self.tables.by_url.insert(doc.url.clone(), id);
        self.tables.documents.insert(id, doc);
        id
    }

    pub fn remove_document(&mut self, id: DocId) {
        if let Some(doc) = self.tables.documents.remove(&id) {
            self.tables.by_url.remove(&doc.url);
        }
    }

    pub fn set_vector_length(&mut self, id: DocId, vector_length: f64) {
        if let Some(doc) = self.tables.documents.get_mut(&id) {
            doc.vector_length = vector_length;
        }
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.tables.term_ids.get(term).copied()
    }

    pub fn term(&self, id: TermId) -> Option<&TermRow> {
        self.tables.terms.get(&id)
    }

    /// Insert every term with a document frequency of 1, incrementing by 1
    /// on conflict.
    pub fn upsert_terms<'t>(&mut self, terms: impl IntoIterator<Item = &'t str>) {
        for term in terms {
            match self.tables.term_ids.get(term).copied() {
                Some(id) => {
                    if let Some(row) = self.tables.terms.get_mut(&id) {
                        row.document_frequency += 1;
                    }
                }
                None => {
                    self.tables.next_term_id += 1;
                    let id = self.tables.next_term_id;
                    self.tables.term_ids.insert(term.to_string(), id);
                    self.tables.terms.insert(
                        id,
                        TermRow {
                            id,
                            term: term.to_string(),
                            document_frequency: 1,
                        },
                    );
                }
            }
        }
    }

    /// Decrement the document frequency of every term the document is
    /// linked to, clamped so a corrupt counter cannot underflow.
    pub fn decrement_term_frequencies(&mut self, doc: DocId) {
        let term_ids: Vec<TermId> = self.postings_for(doc).map(|(term, _)| term).collect();
        for id in term_ids {
            if let Some(row) = self.tables.terms.get_mut(&id) {
                row.document_frequency = row.document_frequency.max(1) - 1;
            }
        }
    }

    /// Delete every term whose document frequency reached zero.
    pub fn purge_orphan_terms(&mut self) {
        let orphans: Vec<TermId> = self
            .tables
            .terms
            .values()
            .filter(|t| t.document_frequency == 0)
            .map(|t| t.id)
            .collect();
        for id in orphans {
            if let Some(row) = self.tables.terms.remove(&id) {
                self.tables.term_ids.remove(&row.term);
            }
            self.tables.by_term.remove(&id);
        }
    }

    pub fn postings_for(&self, doc: DocId) -> impl Iterator<Item = (TermId, u32)> + '_ {
        self.tables
            .postings
            .range((doc, TermId::MIN)..=(doc, TermId::MAX))
            .map(|(&(_, term), &tf)| (term, tf))
    }

    pub fn delete_postings(&mut self, doc: DocId) {
        let keys: Vec<(DocId, TermId)> = self
            .tables
            .postings
            .range((doc, TermId::MIN)..=(doc, TermId::MAX))
            .map(|(&key, _)| key)
            .collect();
        for key in keys {
            self.tables.postings.remove(&key);
            if let Some(docs) = self.tables.by_term.get_mut(&key.1) {
                docs.remove(&doc);
                if docs.is_empty() {
                    self.tables.by_term.remove(&key.1);
                }
            }
        }
    }

    pub fn insert_postings(&mut self, doc: DocId, rows: &[(TermId, u32)]) {
        for &(term, tf) in rows {
            self.tables.postings.insert((doc, term), tf);
            self.tables.by_term.entry(term).or_default().insert(doc);
        }
    }
}

/// Shared reader over the committed relations.
pub struct StoreReader<'a> {
    tables: RwLockReadGuard<'a, Tables>,
}

impl StoreReader<'_> {
    pub fn document_count(&self) -> usize {
        self.tables.documents.len()
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.tables.documents.get(&id)
    }

    pub fn document_by_url(&self, url: &str) -> Option<&Document> {
        let id = self.tables.by_url.get(url)?;
        self.tables.documents.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.tables.documents.values()
    }

    pub fn terms(&self) -> impl Iterator<Item = &TermRow> {
        self.tables.terms.values()
    }

    pub fn term(&self, id: TermId) -> Option<&TermRow> {
        self.tables.terms.get(&id)
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.tables.term_ids.get(term).copied()
    }

    /// Ids of the documents whose postings contain the term.
    pub fn docs_with_term(&self, term: TermId) -> Option<&HashSet<DocId>> {
        self.tables.by_term.get(&term)
    }

    pub fn postings_of_term(&self, term: TermId) -> Vec<(DocId, u32)> {
        match self.tables.by_term.get(&term) {
            Some(docs) => docs
                .iter()
                .filter_map(|&doc| self.tables.postings.get(&(doc, term)).map(|&tf| (doc, tf)))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn postings_for(&self, doc: DocId) -> impl Iterator<Item = (TermId, u32)> + '_ {
        self.tables
            .postings
            .range((doc, TermId::MIN)..=(doc, TermId::MAX))
            .map(|(&(_, term), &tf)| (term, tf))
    }

    pub fn posting_count(&self) -> usize {
        self.tables.postings.len()
    }

    pub fn all_postings(&self) -> impl Iterator<Item = (DocId, TermId, u32)> + '_ {
        self.tables
            .postings
            .iter()
            .map(|(&(doc, term), &tf)| (doc, term, tf))
    }

    pub fn id_watermarks(&self) -> (DocId, TermId) {
        (self.tables.next_doc_id, self.tables.next_term_id)
    }
}
