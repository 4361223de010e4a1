//! Orchestrates indexing a single page: dedupe by content fingerprint,
//! document upsert, term and posting maintenance, and the sampled
//! vector-length refresh.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;

use crate::error::Result;
use crate::extract::{extract_page, PageInput};
use crate::hooks::HookRegistry;
use crate::store::{DocId, Document, Store, StoreWriter, TermId};
use crate::tokenizer::Locale;
use crate::url::compare_urls;

/// Corpus sizes up to this bound get a full vector-length refresh on every
/// write; larger corpora fall back to random sampling.
const FULL_REFRESH_BOUND: usize = 200;

pub struct Indexer {
    store: Arc<Store>,
    hooks: HookRegistry,
}

impl Indexer {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            hooks: HookRegistry::new(),
        }
    }

    pub fn with_hooks(store: Arc<Store>, hooks: HookRegistry) -> Self {
        Self { store, hooks }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Index one page. Returns `true` iff a new document row was inserted;
    /// re-indexing unchanged content and canonical-URL relinking both
    /// return `false`.
    pub fn index_page(&self, page: PageInput) -> Result<bool> {
        // Locale problems must surface before the write lock is taken.
        let locale = Locale::parse(&page.language)?;
        let extracted = extract_page(&page, &self.hooks);
        let checksum = content_checksum(&extracted.text);
        let tstamp = time::OffsetDateTime::now_utc().unix_timestamp();

        let mut writer = self.store.write();

        if let Some(existing) = writer.document_by_checksum(&checksum, page.pid) {
            if existing.url == page.url {
                tracing::debug!(url = %page.url, "content unchanged, skipping");
                return Ok(false);
            }
            let (existing_id, existing_url, vector_length) =
                (existing.id, existing.url.clone(), existing.vector_length);
            if compare_urls(&page.url, &existing_url).is_lt() {
                // Same content under a better URL: move the surviving row
                // there, dropping whatever was indexed under the new URL.
                remove_entry_locked(&mut writer, &page.url);
                writer.store_document(
                    Some(existing_id),
                    Document {
                        id: existing_id,
                        pid: page.pid,
                        tstamp,
                        url: page.url.clone(),
                        title: page.title.clone(),
                        language: page.language.clone(),
                        protected: page.protected,
                        filesize: extracted.filesize,
                        groups: page.groups.clone(),
                        text: extracted.text,
                        checksum,
                        vector_length,
                    },
                );
                tracing::info!(from = %existing_url, to = %page.url, "relinked to canonical url");
            }
            return Ok(false);
        }

        let existing_id = writer.document_by_url(&page.url).map(|d| d.id);
        let is_new = existing_id.is_none();
        let doc_id = writer.store_document(
            existing_id,
            Document {
                id: 0,
                pid: page.pid,
                tstamp,
                url: page.url.clone(),
                title: page.title.clone(),
                language: page.language.clone(),
                protected: page.protected,
                filesize: extracted.filesize,
                groups: page.groups.clone(),
                text: extracted.text.clone(),
                checksum,
                vector_length: 0.0,
            },
        );

        let mut tf: HashMap<String, u32> = HashMap::new();
        for word in locale.words(&extracted.text) {
            *tf.entry(word).or_insert(0) += 1;
        }

        // Unlink the previous revision before re-counting.
        writer.decrement_term_frequencies(doc_id);
        writer.delete_postings(doc_id);

        writer.upsert_terms(tf.keys().map(String::as_str));
        writer.purge_orphan_terms();

        let rows: Vec<(TermId, u32)> = tf
            .iter()
            .filter_map(|(term, &count)| writer.term_id(term).map(|id| (id, count)))
            .collect();
        writer.insert_postings(doc_id, &rows);

        refresh_vector_lengths(&mut writer, doc_id);

        tracing::info!(url = %page.url, id = doc_id, new = is_new, terms = rows.len(), "page indexed");
        Ok(is_new)
    }

    /// Remove every document indexed under `url`, unlinking its terms and
    /// postings and purging terms that no longer occur anywhere.
    pub fn remove_entry(&self, url: &str) -> Result<()> {
        let mut writer = self.store.write();
        remove_entry_locked(&mut writer, url);
        Ok(())
    }
}

fn remove_entry_locked(writer: &mut StoreWriter<'_>, url: &str) {
    while let Some(id) = writer.document_by_url(url).map(|d| d.id) {
        writer.decrement_term_frequencies(id);
        writer.delete_postings(id);
        writer.remove_document(id);
        tracing::info!(url, id, "entry removed");
    }
    writer.purge_orphan_terms();
}

/// Checksum of the extracted text, with both backtick variants folded to a
/// plain apostrophe first.
fn content_checksum(text: &str) -> String {
    let normalized = text.replace('`', "'").replace('´', "'");
    format!("{:x}", md5::compute(normalized.as_bytes()))
}

/// Recompute the cached vector length for the just-indexed document plus a
/// random sample of others. Small corpora are refreshed wholesale, so their
/// lengths stay exact; large ones amortize the cost across writes.
fn refresh_vector_lengths(writer: &mut StoreWriter<'_>, just_indexed: DocId) {
    let count = writer.document_count();
    let n_idf = count as f64 + 1.0;

    let mut refresh: HashSet<DocId> = HashSet::new();
    refresh.insert(just_indexed);

    if count <= FULL_REFRESH_BOUND {
        refresh.extend(writer.document_ids());
    } else if let Some((min_id, max_id)) = writer.id_bounds() {
        let span = (max_id - min_id) as usize;
        let target = (span * 100 / count).min(span + 1);
        let mut rng = rand::thread_rng();
        let mut sampled: HashSet<DocId> = HashSet::new();
        while sampled.len() < target {
            sampled.insert(rng.gen_range(min_id..=max_id));
        }
        // Sampled ids that were never assigned or have been deleted simply
        // drop out of the refresh set.
        refresh.extend(sampled);
    }

    for id in refresh {
        refresh_one(writer, id, n_idf);
    }
}

fn refresh_one(writer: &mut StoreWriter<'_>, doc: DocId, n_idf: f64) {
    if writer.document(doc).is_none() {
        return;
    }
    let postings: Vec<(TermId, u32)> = writer.postings_for(doc).collect();
    let mut sum = 0.0f64;
    for (term, tf) in postings {
        let df = writer
            .term(term)
            .map(|t| t.document_frequency)
            .unwrap_or(1)
            .max(1) as f64;
        let weight = (1.0 + f64::from(tf).ln()) * (n_idf / df).ln();
        sum += weight * weight;
    }
    writer.set_vector_length(doc, sum.sqrt());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_folds_backtick_variants() {
        assert_eq!(content_checksum("it`s"), content_checksum("it´s"));
        assert_eq!(content_checksum("it`s"), content_checksum("it's"));
        assert_ne!(content_checksum("its"), content_checksum("it's"));
    }
}
