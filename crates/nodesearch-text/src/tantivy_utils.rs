use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use nodesearch_core::error::{Error, Result};

pub const TOKENIZER: &str = "text_with_stopwords";

pub const ID_FIELD: &str = "id";
pub const IDENTIFIER_FIELD: &str = "identifier";
pub const DIMENSIONS_HASH_FIELD: &str = "dimensions_hash";
pub const TEXT_FIELD: &str = "text";
pub const DOCUMENT_FIELD: &str = "document";

/// `id`, `identifier` and `dimensions_hash` are raw terms for exact lookups;
/// `text` holds the searchable text; `document` is the stored JSON payload.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field(ID_FIELD, STRING | STORED);
	schema_builder.add_text_field(IDENTIFIER_FIELD, STRING);
	schema_builder.add_text_field(DIMENSIONS_HASH_FIELD, STRING);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.add_text_field(DOCUMENT_FIELD, STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}

#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
	pub id: Field,
	pub identifier: Field,
	pub dimensions_hash: Field,
	pub text: Field,
	pub document: Field,
}

impl IndexFields {
	pub fn from_schema(schema: &Schema) -> Result<Self> {
		let field = |name: &str| schema.get_field(name).map_err(Error::backend);
		Ok(Self {
			id: field(ID_FIELD)?,
			identifier: field(IDENTIFIER_FIELD)?,
			dimensions_hash: field(DIMENSIONS_HASH_FIELD)?,
			text: field(TEXT_FIELD)?,
			document: field(DOCUMENT_FIELD)?,
		})
	}
}
