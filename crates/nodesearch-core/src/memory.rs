//! In-process index backend. Keeps documents in a map and records every
//! write, which makes ordering guarantees observable in tests.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{Error, Result};
use crate::search::{document_text, finalize, query_terms, MatchingStrategy, ScoredDocument, SearchParameters, SearchResult};
use crate::traits::IndexBackend;
use crate::types::{fields, Document, DocumentId, Hit};

/// One write issued against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOperation {
    CreateIndex,
    Add(Vec<DocumentId>),
    Delete(Vec<DocumentId>),
    DeleteAll,
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: BTreeMap<DocumentId, Hit>,
    journal: Vec<IndexOperation>,
}

#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    state: RwLock<MemoryState>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), state: RwLock::new(MemoryState::default()) } }

    pub fn document(&self, id: &str) -> Option<Hit> { self.read().ok()?.documents.get(id).cloned() }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.read().map(|s| s.documents.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn len(&self) -> usize { self.read().map(|s| s.documents.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn journal(&self) -> Vec<IndexOperation> { self.read().map(|s| s.journal.clone()).unwrap_or_default() }

    pub fn clear_journal(&self) {
        if let Ok(mut state) = self.write() {
            state.journal.clear();
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| Error::Backend(format!("index '{}' lock poisoned", self.name)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| Error::Backend(format!("index '{}' lock poisoned", self.name)))
    }
}

fn score(document: &Hit, terms: &[String], strategy: MatchingStrategy) -> Option<f32> {
    if terms.is_empty() {
        return Some(0.0);
    }
    let words: Vec<String> = document_text(document).iter().flat_map(|t| query_terms(t)).collect();
    let mut matched = 0usize;
    let mut occurrences = 0usize;
    for term in terms {
        let count = words.iter().filter(|w| w.starts_with(term.as_str())).count();
        if count > 0 {
            matched += 1;
            occurrences += count;
        }
    }
    let accepted = match strategy {
        MatchingStrategy::All => matched == terms.len(),
        MatchingStrategy::Last => matched > 0,
    };
    accepted.then(|| matched as f32 + occurrences as f32 / (words.len() as f32 + 1.0))
}

impl IndexBackend for MemoryIndex {
    fn index_name(&self) -> &str { &self.name }

    fn create_index(&self) -> Result<()> {
        self.write()?.journal.push(IndexOperation::CreateIndex);
        Ok(())
    }

    fn add_documents(&self, documents: &[Document]) -> Result<()> {
        let mut state = self.write()?;
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            state.documents.insert(document.id.clone(), document.to_hit()?);
            ids.push(document.id.clone());
        }
        debug!(index = %self.name, count = ids.len(), "documents added");
        state.journal.push(IndexOperation::Add(ids));
        Ok(())
    }

    fn delete_documents(&self, ids: &[DocumentId]) -> Result<()> {
        let mut state = self.write()?;
        for id in ids {
            state.documents.remove(id);
        }
        state.journal.push(IndexOperation::Delete(ids.to_vec()));
        Ok(())
    }

    fn delete_all_documents(&self) -> Result<()> {
        let mut state = self.write()?;
        state.documents.clear();
        state.journal.push(IndexOperation::DeleteAll);
        Ok(())
    }

    fn search(&self, query: &str, parameters: &SearchParameters) -> Result<SearchResult> {
        let terms = query_terms(query);
        let strategy = parameters.matching_strategy();
        let mut candidates: Vec<ScoredDocument> = self
            .read()?
            .documents
            .values()
            .filter_map(|document| score(document, &terms, strategy).map(|score| ScoredDocument { score, document: document.clone() }))
            .collect();
        candidates.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| {
                let id = |h: &Hit| h.get(fields::ID).and_then(|v| v.as_str()).unwrap_or_default().to_string();
                id(&a.document).cmp(&id(&b.document))
            })
        });
        finalize(query, candidates, parameters)
    }
}
