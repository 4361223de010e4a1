//! Snapshot persistence for the store relations.
//!
//! Each relation is written to its own bincode file named after the
//! persistent schema (`tl_search`, `tl_search_term`, `tl_search_index`),
//! next to a JSON meta file carrying the id watermarks.

use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use crate::error::Result;
use crate::store::{DocId, Document, Store, TermId, TermRow};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub document_count: u64,
    pub next_doc_id: DocId,
    pub next_term_id: TermId,
    pub created_at: String,
    pub version: u32,
}

pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn documents(&self) -> PathBuf {
        self.root.join("tl_search.bin")
    }

    fn terms(&self) -> PathBuf {
        self.root.join("tl_search_term.bin")
    }

    fn postings(&self) -> PathBuf {
        self.root.join("tl_search_index.bin")
    }

    fn meta(&self) -> PathBuf {
        self.root.join("meta.json")
    }

    pub fn exists(&self) -> bool {
        self.meta().is_file()
    }
}

/// Write the current committed state of `store` to `paths`.
pub fn save_store(paths: &StorePaths, store: &Store) -> Result<()> {
    create_dir_all(&paths.root)?;
    let reader = store.read();

    let documents: Vec<Document> = reader.documents().cloned().collect();
    let terms: Vec<TermRow> = reader.terms().cloned().collect();
    let postings: Vec<(DocId, TermId, u32)> = reader.all_postings().collect();
    let (next_doc_id, next_term_id) = reader.id_watermarks();
    drop(reader);

    write_bin(&paths.documents(), &documents)?;
    write_bin(&paths.terms(), &terms)?;
    write_bin(&paths.postings(), &postings)?;

    let meta = SnapshotMeta {
        document_count: documents.len() as u64,
        next_doc_id,
        next_term_id,
        created_at: time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    serde_json::to_writer_pretty(BufWriter::new(File::create(paths.meta())?), &meta)?;

    tracing::info!(
        root = %paths.root.display(),
        documents = documents.len(),
        terms = terms.len(),
        postings = postings.len(),
        "store snapshot saved"
    );
    Ok(())
}

/// Load a snapshot from `paths`, rebuilding the secondary indexes.
pub fn load_store(paths: &StorePaths) -> Result<Store> {
    let meta: SnapshotMeta = serde_json::from_reader(BufReader::new(File::open(paths.meta())?))?;
    let documents: Vec<Document> = read_bin(&paths.documents())?;
    let terms: Vec<TermRow> = read_bin(&paths.terms())?;
    let postings: Vec<(DocId, TermId, u32)> = read_bin(&paths.postings())?;

    tracing::info!(
        root = %paths.root.display(),
        documents = documents.len(),
        terms = terms.len(),
        postings = postings.len(),
        "store snapshot loaded"
    );
    Ok(Store::from_rows(
        documents,
        terms,
        postings,
        meta.next_doc_id,
        meta.next_term_id,
    ))
}

/// Load the snapshot at `paths` if one exists, otherwise start empty.
pub fn load_or_default(paths: &StorePaths) -> Result<Store> {
    if paths.exists() {
        load_store(paths)
    } else {
        Ok(Store::new())
    }
}

fn write_bin<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut file, value)?;
    Ok(())
}

fn read_bin<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Document;
    use tempfile::tempdir;

    fn doc(id: DocId, url: &str) -> Document {
        Document {
            id,
            pid: 1,
            tstamp: 1700000000,
            url: url.into(),
            title: "Title".into(),
            language: "en".into(),
            protected: false,
            filesize: 1.5,
            groups: vec![2, 3],
            text: "quick brown fox".into(),
            checksum: "abc".into(),
            vector_length: 1.25,
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_relations() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path());

        let term = TermRow {
            id: 1,
            term: "quick".into(),
            document_frequency: 1,
        };
        let store = Store::from_rows(vec![doc(4, "/a")], vec![term], vec![(4, 1, 2)], 4, 1);
        save_store(&paths, &store).unwrap();

        let loaded = load_store(&paths).unwrap();
        let reader = loaded.read();
        assert_eq!(reader.document_count(), 1);
        assert_eq!(reader.document_by_url("/a").map(|d| d.id), Some(4));
        assert_eq!(reader.term_id("quick"), Some(1));
        assert_eq!(reader.postings_of_term(1), vec![(4, 2)]);
        assert_eq!(reader.id_watermarks(), (4, 1));
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempdir().unwrap();
        let paths = StorePaths::new(dir.path().join("nothing-here"));
        let store = load_or_default(&paths).unwrap();
        assert_eq!(store.document_count(), 0);
    }
}
