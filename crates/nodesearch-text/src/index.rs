use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value as _};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::{debug, info, warn};

use nodesearch_core::error::{Error, Result};
use nodesearch_core::search::{document_text, finalize, query_terms, MatchingStrategy, ScoredDocument, SearchParameters, SearchResult};
use nodesearch_core::traits::IndexBackend;
use nodesearch_core::types::{fields, Document, DocumentId, Hit, NodeAggregateId};

use crate::tantivy_utils::{build_schema, register_tokenizer, IndexFields};

const WRITER_HEAP_BYTES: usize = 50_000_000;

struct OpenIndex {
	index: Index,
	reader: IndexReader,
	fields: IndexFields,
}

impl OpenIndex {
	fn from_index(index: Index) -> Result<Self> {
		register_tokenizer(&index);
		let fields = IndexFields::from_schema(&index.schema())?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::backend)?;
		Ok(Self { index, reader, fields })
	}

	fn open(dir: &Path) -> Result<Self> {
		if !dir.join("meta.json").exists() {
			return Err(Error::NotFound(format!("no index at {}", dir.display())));
		}
		Self::from_index(Index::open_in_dir(dir).map_err(Error::backend)?)
	}

	fn open_or_create(dir: &Path) -> Result<Self> {
		std::fs::create_dir_all(dir).map_err(|e| Error::Backend(format!("{}: {e}", dir.display())))?;
		let directory = MmapDirectory::open(dir).map_err(Error::backend)?;
		Self::from_index(Index::open_or_create(directory, build_schema()).map_err(Error::backend)?)
	}

	fn candidate_limit(searcher: &Searcher) -> usize { (searcher.num_docs() as usize).max(1) }

	fn ids_matching(&self, query: &dyn Query) -> Result<Vec<DocumentId>> {
		let searcher = self.reader.searcher();
		let top_docs = searcher.search(query, &TopDocs::with_limit(Self::candidate_limit(&searcher))).map_err(Error::backend)?;
		let mut ids = Vec::with_capacity(top_docs.len());
		for (_, address) in top_docs {
			let stored: TantivyDocument = searcher.doc(address).map_err(Error::backend)?;
			if let Some(id) = stored.get_first(self.fields.id).and_then(|v| v.as_str()) {
				ids.push(id.to_string());
			}
		}
		ids.sort();
		Ok(ids)
	}

	fn to_tantivy(&self, document: &Document) -> Result<TantivyDocument> {
		let hit = document.to_hit()?;
		let mut doc = TantivyDocument::default();
		doc.add_text(self.fields.id, &document.id);
		if let Some(identifier) = document.field(fields::IDENTIFIER).and_then(|v| v.as_str()) {
			doc.add_text(self.fields.identifier, identifier);
		}
		if let Some(hash) = document.field(fields::DIMENSIONS_HASH).and_then(|v| v.as_str()) {
			doc.add_text(self.fields.dimensions_hash, hash);
		}
		doc.add_text(self.fields.text, document_text(&hit).join("\n"));
		doc.add_text(self.fields.document, serde_json::to_string(&hit)?);
		Ok(doc)
	}
}

/// Index backend over an on-disk Tantivy index.
///
/// The index is opened lazily from `dir`; [`IndexBackend::create_index`]
/// creates it when missing. Every write batch is committed on success and
/// rolled back when any document in it fails.
pub struct TantivyIndex {
	name: String,
	dir: PathBuf,
	state: RwLock<Option<OpenIndex>>,
	writer_lock: Mutex<()>,
}

impl TantivyIndex {
	pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
		Self { name: name.into(), dir: dir.into(), state: RwLock::new(None), writer_lock: Mutex::new(()) }
	}

	pub fn dir(&self) -> &Path { &self.dir }

	pub fn num_docs(&self) -> Result<u64> { self.with_index(|open| Ok(open.reader.searcher().num_docs())) }

	fn poisoned(&self) -> Error { Error::Backend(format!("index '{}' lock poisoned", self.name)) }

	fn with_index<T>(&self, f: impl FnOnce(&OpenIndex) -> Result<T>) -> Result<T> {
		{
			let guard = self.state.read().map_err(|_| self.poisoned())?;
			if let Some(open) = guard.as_ref() {
				return f(open);
			}
		}
		let mut guard = self.state.write().map_err(|_| self.poisoned())?;
		if guard.is_none() {
			*guard = Some(OpenIndex::open(&self.dir)?);
		}
		match guard.as_ref() {
			Some(open) => f(open),
			None => Err(Error::NotFound(format!("index '{}'", self.name))),
		}
	}

	fn write(&self, operation: &str, f: impl FnOnce(&OpenIndex, &mut IndexWriter) -> Result<()>) -> Result<()> {
		let _exclusive = self.writer_lock.lock().map_err(|_| self.poisoned())?;
		self.with_index(|open| {
			let mut writer: IndexWriter = open.index.writer(WRITER_HEAP_BYTES).map_err(Error::backend)?;
			f(open, &mut writer)?;
			writer.commit().map_err(Error::backend)?;
			open.reader.reload().map_err(Error::backend)?;
			debug!(index = %self.name, operation, "committed");
			Ok(())
		})
	}
}

impl IndexBackend for TantivyIndex {
	fn index_name(&self) -> &str { &self.name }

	fn create_index(&self) -> Result<()> {
		let mut guard = self.state.write().map_err(|_| self.poisoned())?;
		if guard.is_none() {
			*guard = Some(OpenIndex::open_or_create(&self.dir)?);
		}
		info!(index = %self.name, dir = %self.dir.display(), "index ready");
		Ok(())
	}

	/// Removes the index directory, so an index written with another schema
	/// is replaced as well.
	fn recreate_index(&self) -> Result<()> {
		let _exclusive = self.writer_lock.lock().map_err(|_| self.poisoned())?;
		let mut guard = self.state.write().map_err(|_| self.poisoned())?;
		*guard = None;
		if self.dir.exists() {
			std::fs::remove_dir_all(&self.dir).map_err(|e| Error::Backend(format!("{}: {e}", self.dir.display())))?;
		}
		*guard = Some(OpenIndex::open_or_create(&self.dir)?);
		info!(index = %self.name, dir = %self.dir.display(), "index recreated");
		Ok(())
	}

	fn add_documents(&self, documents: &[Document]) -> Result<()> {
		self.write("add", |open, writer| {
			for document in documents {
				writer.delete_term(Term::from_field_text(open.fields.id, &document.id));
				writer.add_document(open.to_tantivy(document)?).map_err(Error::backend)?;
			}
			Ok(())
		})
	}

	fn delete_documents(&self, ids: &[DocumentId]) -> Result<()> {
		self.write("delete", |open, writer| {
			for id in ids {
				writer.delete_term(Term::from_field_text(open.fields.id, id));
			}
			Ok(())
		})
	}

	fn delete_all_documents(&self) -> Result<()> {
		self.write("delete_all", |_, writer| writer.delete_all_documents().map(|_| ()).map_err(Error::backend))
	}

	fn search(&self, query: &str, parameters: &SearchParameters) -> Result<SearchResult> {
		self.with_index(|open| {
			let searcher = open.reader.searcher();
			let terms = query_terms(query);
			let parsed: Box<dyn Query> = if terms.is_empty() {
				Box::new(AllQuery)
			} else {
				let mut parser = QueryParser::for_index(&open.index, vec![open.fields.text]);
				if parameters.matching_strategy() == MatchingStrategy::All {
					parser.set_conjunction_by_default();
				}
				let (parsed, errors) = parser.parse_query_lenient(&terms.join(" "));
				if !errors.is_empty() {
					warn!(index = %self.name, query, errors = errors.len(), "query partially parsed");
				}
				parsed
			};

			let top_docs = searcher
				.search(parsed.as_ref(), &TopDocs::with_limit(OpenIndex::candidate_limit(&searcher)))
				.map_err(Error::backend)?;
			let mut candidates = Vec::with_capacity(top_docs.len());
			for (score, address) in top_docs {
				let stored: TantivyDocument = searcher.doc(address).map_err(Error::backend)?;
				let Some(raw) = stored.get_first(open.fields.document).and_then(|v| v.as_str()) else {
					warn!(index = %self.name, "stored document without payload");
					continue;
				};
				let document: Hit = serde_json::from_str(raw)?;
				candidates.push(ScoredDocument { score, document });
			}
			finalize(query, candidates, parameters)
		})
	}

	fn find_identifiers_by_aggregate(&self, aggregate_id: &NodeAggregateId) -> Result<Vec<DocumentId>> {
		self.with_index(|open| {
			let term = Term::from_field_text(open.fields.identifier, aggregate_id.as_str());
			open.ids_matching(&TermQuery::new(term, IndexRecordOption::Basic))
		})
	}

	fn find_identifiers_by_aggregate_and_dimension_hash(
		&self,
		aggregate_id: &NodeAggregateId,
		dimensions_hash: &str,
	) -> Result<Vec<DocumentId>> {
		self.with_index(|open| {
			let identifier = Term::from_field_text(open.fields.identifier, aggregate_id.as_str());
			let hash = Term::from_field_text(open.fields.dimensions_hash, dimensions_hash);
			let query = BooleanQuery::intersection(vec![
				Box::new(TermQuery::new(identifier, IndexRecordOption::Basic)),
				Box::new(TermQuery::new(hash, IndexRecordOption::Basic)),
			]);
			open.ids_matching(&query)
		})
	}
}
