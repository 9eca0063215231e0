use tantivy::schema::{Schema, TEXT};
use tantivy::Index;
use tempfile::TempDir;

use nodesearch_core::search::{MatchingStrategy, SearchParameters};
use nodesearch_core::traits::IndexBackend;
use nodesearch_core::types::{fields, DimensionSpacePoint, Document, NodeAggregateId};
use nodesearch_text::TantivyIndex;

fn variant(aggregate: &str, language: &str, title: &str, status: &str) -> Document {
	let point = DimensionSpacePoint::from_pairs([("language", language)]);
	let mut document = Document::new(nodesearch_core::types::document_id(&NodeAggregateId::new(aggregate), &point));
	document.title = Some(title.to_string());
	document.fulltext.append("text", format!("{title} body text"));
	document.insert_field(fields::IDENTIFIER, aggregate.into());
	document.insert_field(fields::DIMENSIONS_HASH, point.hash().into());
	document.insert_field("status", status.into());
	document
}

#[test]
fn tantivy_full_flow() {
	let tmp = TempDir::new().unwrap();
	let index = TantivyIndex::new("test", tmp.path().join("index"));
	index.create_index().expect("create");

	index
		.add_documents(&[
			variant("a", "en", "Mountain hiking guide", "published"),
			variant("a", "de", "Bergwandern Ratgeber", "published"),
			variant("b", "en", "City guide", "draft"),
		])
		.expect("add");
	assert_eq!(index.num_docs().unwrap(), 3);

	let result = index.search("guide", &SearchParameters::default()).expect("search");
	assert_eq!(result.total(), 2);

	let published = SearchParameters { filter: vec![r#"status = "published""#.to_string()], ..Default::default() };
	let ids = index.search("guide", &published).unwrap().document_ids();
	assert_eq!(ids, vec![variant("a", "en", "", "").id]);

	let all = SearchParameters { matching_strategy: Some(MatchingStrategy::All), ..Default::default() };
	let ids = index.search("city guide", &all).unwrap().document_ids();
	assert_eq!(ids, vec![variant("b", "en", "", "").id]);

	let everything = index.search("", &SearchParameters::default()).unwrap();
	assert_eq!(everything.total(), 3);

	let variants = index.find_identifiers_by_aggregate(&NodeAggregateId::new("a")).unwrap();
	assert_eq!(variants.len(), 2);
	let de_hash = DimensionSpacePoint::from_pairs([("language", "de")]).hash();
	let de = index.find_identifiers_by_aggregate_and_dimension_hash(&NodeAggregateId::new("a"), &de_hash).unwrap();
	assert_eq!(de, vec![variant("a", "de", "", "").id]);
}

#[test]
fn re_adding_replaces_by_id() {
	let tmp = TempDir::new().unwrap();
	let index = TantivyIndex::new("test", tmp.path());
	index.create_index().unwrap();
	index.add_documents(&[variant("a", "en", "First title", "draft")]).unwrap();
	index.add_documents(&[variant("a", "en", "Second title", "published")]).unwrap();
	assert_eq!(index.num_docs().unwrap(), 1);

	let hits = index.search("second", &SearchParameters::default()).unwrap().hits;
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].get("status").and_then(|v| v.as_str()), Some("published"));
	assert!(index.search("first", &SearchParameters::default()).unwrap().hits.is_empty());
}

#[test]
fn deletes_and_reopens_from_disk() {
	let tmp = TempDir::new().unwrap();
	{
		let index = TantivyIndex::new("test", tmp.path());
		index.create_index().unwrap();
		index
			.add_documents(&[variant("a", "en", "One", "draft"), variant("b", "en", "Two", "draft"), variant("c", "en", "Three", "draft")])
			.unwrap();
		index.delete_documents(&[variant("b", "en", "", "").id]).unwrap();
	}

	let reopened = TantivyIndex::new("test", tmp.path());
	assert_eq!(reopened.num_docs().unwrap(), 2);
	assert!(reopened.find_identifiers_by_aggregate(&NodeAggregateId::new("b")).unwrap().is_empty());

	reopened.delete_all_documents().unwrap();
	assert_eq!(reopened.num_docs().unwrap(), 0);
}

#[test]
fn operations_before_create_fail() {
	let tmp = TempDir::new().unwrap();
	let index = TantivyIndex::new("test", tmp.path().join("missing"));
	assert!(index.search("anything", &SearchParameters::default()).is_err());
	assert!(index.add_documents(&[variant("a", "en", "One", "draft")]).is_err());
}

#[test]
fn recreate_replaces_index_with_foreign_schema() {
	let tmp = TempDir::new().unwrap();
	let dir = tmp.path().join("index");
	std::fs::create_dir_all(&dir).unwrap();
	let mut builder = Schema::builder();
	builder.add_text_field("body", TEXT);
	Index::create_in_dir(&dir, builder.build()).unwrap();

	let index = TantivyIndex::new("test", &dir);
	assert!(index.create_index().is_err());

	index.recreate_index().expect("recreate");
	index.add_documents(&[variant("a", "en", "Fresh start", "draft")]).unwrap();
	assert_eq!(index.num_docs().unwrap(), 1);
	assert_eq!(index.search("fresh", &SearchParameters::default()).unwrap().total(), 1);
}

#[test]
fn recreate_drops_existing_documents() {
	let tmp = TempDir::new().unwrap();
	let index = TantivyIndex::new("test", tmp.path().join("index"));
	index.create_index().unwrap();
	index.add_documents(&[variant("a", "en", "One", "draft"), variant("b", "en", "Two", "draft")]).unwrap();

	index.recreate_index().unwrap();
	assert_eq!(index.num_docs().unwrap(), 0);

	let reopened = TantivyIndex::new("test", tmp.path().join("index"));
	assert_eq!(reopened.num_docs().unwrap(), 0);
}
