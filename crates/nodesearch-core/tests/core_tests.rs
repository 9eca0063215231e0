use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use tempfile::TempDir;

use nodesearch_core::config::Config;
use nodesearch_core::dimensions::ContentDimensions;
use nodesearch_core::memory::{IndexOperation, MemoryIndex};
use nodesearch_core::schema::{FulltextExtractor, NodeTypeFilter};
use nodesearch_core::search::{MatchingStrategy, SearchParameters};
use nodesearch_core::traits::{DimensionSource, IndexBackend, NodeTypeSchema, TreeAccessor};
use nodesearch_core::tree::ContentGraph;
use nodesearch_core::types::{document_id, DimensionSpacePoint, Document, Node, NodeAggregateId, NodeTypeName, WorkspaceName};

const SCHEMA_TOML: &str = r#"
[index]
name = "site"

[dimensions]
language = ["en", "de"]
region = ["US", "EU"]

[node_types."Neos.Neos:Node"]

[node_types."Neos.Neos:Document"]
super_types = ["Neos.Neos:Node"]
search.fulltext.is_root = true
search.fulltext.enable = true
properties.title.search.fulltext_extractor = { kind = "into", bucket = "h1" }

[node_types."Neos.Neos:Content"]
super_types = ["Neos.Neos:Node"]
search.fulltext.enable = true

[node_types."Acme:Page"]
super_types = ["Neos.Neos:Document"]
properties.internalNotes.search.indexed = false
properties.location.search.index_as = "__geo"

[node_types."Acme:Text"]
super_types = ["Neos.Neos:Content"]
properties.text.search.fulltext_extractor = { kind = "html_content" }

[node_types."Acme:Teaser"]
super_types = ["Acme:Text"]
search.fulltext.enable = false
"#;

fn en() -> DimensionSpacePoint { DimensionSpacePoint::from_pairs([("language", "en")]) }

#[test]
fn dimension_hash_is_stable_and_order_independent() {
    let a = DimensionSpacePoint::from_pairs([("language", "en"), ("region", "US")]);
    let b = DimensionSpacePoint::without_dimensions().with("region", "US").with("language", "en");
    assert_eq!(a, b);
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.hash(), a.clone().hash());
    assert_eq!(a.to_json(), r#"{"language":"en","region":"US"}"#);
    assert_eq!(a.hash().len(), 32);
    assert_ne!(a.hash(), en().hash());
}

#[test]
fn dimension_json_matches_php_encoding() {
    let point = DimensionSpacePoint::from_pairs([("language", "fr_CA/ç")]);
    assert_eq!(point.to_json(), r#"{"language":"fr_CA\/\u00e7"}"#);
    let emoji = DimensionSpacePoint::from_pairs([("mood", "😀")]);
    assert_eq!(emoji.to_json(), r#"{"mood":"\ud83d\ude00"}"#);

    let empty = DimensionSpacePoint::without_dimensions();
    assert_eq!(empty.to_json(), "[]");
    assert_eq!(empty.hash(), "d751713988987e9331980363e24189ce");
}

#[test]
fn document_ids_differ_per_dimension_point() {
    let aggregate = NodeAggregateId::new("a1");
    let de = DimensionSpacePoint::from_pairs([("language", "de")]);
    assert_ne!(document_id(&aggregate, &en()), document_id(&aggregate, &de));
    assert!(document_id(&aggregate, &en()).starts_with("a1_"));
}

#[test]
fn expand_builds_cartesian_product() {
    let dims = ContentDimensions::new()
        .with_dimension("language", ["en", "de", "en"])
        .with_dimension("region", ["US", "EU"]);
    let points = dims.all_dimension_combinations();
    assert_eq!(points.len(), 4);
    assert!(points.contains(&DimensionSpacePoint::from_pairs([("language", "de"), ("region", "EU")])));

    let reordered = ContentDimensions::new()
        .with_dimension("region", ["EU", "US"])
        .with_dimension("language", ["de", "en"]);
    assert_eq!(points, reordered.expand());
}

#[test]
fn expand_without_dimensions_yields_single_empty_point() {
    let points = ContentDimensions::new().expand();
    assert_eq!(points, BTreeSet::from([DimensionSpacePoint::without_dimensions()]));
    let empty_values = ContentDimensions::new().with_dimension("language", Vec::<String>::new());
    assert!(empty_values.expand().is_empty());
}

#[test]
fn schema_resolves_inheritance() {
    let settings = Config::from_toml_str(SCHEMA_TOML).expect("config").settings().expect("settings");
    let schema = settings.node_type_registry().expect("schema");
    let page = NodeTypeName::new("Acme:Page");
    let teaser = NodeTypeName::new("Acme:Teaser");

    assert!(schema.is_fulltext_root(&page));
    assert!(schema.is_fulltext_enabled(&page));
    assert!(!schema.is_fulltext_root(&NodeTypeName::new("Acme:Text")));
    assert!(!schema.is_fulltext_enabled(&teaser));
    assert!(!schema.is_fulltext_root(&NodeTypeName::new("Unknown:Type")));

    assert_eq!(
        schema.extractors_for(&page),
        vec![("title".to_string(), FulltextExtractor::Into { bucket: "h1".to_string() })]
    );
    assert_eq!(schema.extractors_for(&teaser), vec![("text".to_string(), FulltextExtractor::HtmlContent)]);
    assert_eq!(
        schema.type_and_supertypes(&page),
        vec![page.clone(), NodeTypeName::new("Neos.Neos:Document"), NodeTypeName::new("Neos.Neos:Node")]
    );
    assert_eq!(schema.property_field(&page, "internalNotes"), None);
    assert_eq!(schema.property_field(&page, "location").as_deref(), Some("__geo"));
    assert_eq!(schema.property_field(&page, "anything").as_deref(), Some("anything"));

    let filter = schema.subtypes_of(&[NodeTypeName::new("Neos.Neos:Content")]);
    assert!(filter.matches(&teaser));
    assert!(filter.matches(&NodeTypeName::new("Acme:Text")));
    assert!(!filter.matches(&page));
}

#[test]
fn schema_rejects_cycles_and_unknown_supertypes() {
    let cyclic = r#"
[node_types."A"]
super_types = ["B"]
[node_types."B"]
super_types = ["A"]
"#;
    assert!(Config::from_toml_str(cyclic).is_err());
    let unknown = r#"
[node_types."A"]
super_types = ["Missing"]
"#;
    assert!(Config::from_toml_str(unknown).is_err());
}

#[test]
fn config_defaults_and_file_loading() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    let mut f = fs::File::create(&path).unwrap();
    writeln!(f, "[index]\nname = \"docs\"\npath = \"/tmp/docs-index\"\n[indexing]\nrequired_attributes = [\"title\"]").unwrap();

    let config = Config::load_file(&path).expect("load");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.index.name, "docs");
    assert_eq!(settings.index.resolved_path(), std::path::PathBuf::from("/tmp/docs-index"));
    assert_eq!(settings.indexing.required_attributes, vec!["title".to_string()]);
    assert_eq!(settings.indexing.workspace, WorkspaceName::live());
    assert_eq!(settings.indexing.title_property, "title");
    assert!(settings.dimensions.is_empty());

    let name: String = config.get("index.name").expect("get");
    assert_eq!(name, "docs");
}

#[test]
fn content_graph_navigation_and_removal() {
    let graph = ContentGraph::new();
    graph.insert_root(Node::new("root", "Neos.Neos:Sites", en()).named("sites")).unwrap();
    graph.insert_child(&"root".into(), Node::new("page", "Acme:Page", en()).named("page")).unwrap();
    graph.insert_child(&"page".into(), Node::new("c1", "Acme:Text", en())).unwrap();
    graph.insert_child(&"page".into(), Node::new("c2", "Acme:Teaser", en())).unwrap();
    assert!(graph.insert_child(&"missing".into(), Node::new("x", "Acme:Text", en())).is_err());

    let page = graph
        .find_by_aggregate_id_in_dimension(&WorkspaceName::live(), &"page".into(), &en())
        .unwrap()
        .expect("page");
    let children = graph.find_children(&page, &NodeTypeFilter::any()).unwrap();
    let ids: Vec<&str> = children.iter().map(|n| n.aggregate_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    let only_text = graph.find_children(&page, &NodeTypeFilter::only([NodeTypeName::new("Acme:Text")])).unwrap();
    assert_eq!(only_text.len(), 1);

    let parent = graph.find_parent(&children[0]).unwrap().expect("parent");
    assert_eq!(parent.aggregate_id.as_str(), "page");
    assert_eq!(graph.find_root_nodes(&WorkspaceName::live(), &en()).unwrap().len(), 1);

    graph.remove(&WorkspaceName::live(), &"page".into(), &en()).unwrap();
    assert_eq!(graph.len(), 1);
    let de = DimensionSpacePoint::from_pairs([("language", "de")]);
    assert!(graph.find_root_nodes(&WorkspaceName::live(), &de).unwrap().is_empty());
}

#[test]
fn content_graph_loads_unordered_snapshot() {
    let json = r#"[
        {"aggregateId": "c1", "nodeType": "Acme:Text", "parent": "page", "dimensions": {"language": "en"}, "properties": {"text": "<p>Hello</p>"}},
        {"aggregateId": "page", "nodeType": "Acme:Page", "name": "page", "parent": "root", "dimensions": {"language": "en"}},
        {"aggregateId": "root", "nodeType": "Neos.Neos:Sites", "name": "sites", "dimensions": {"language": "en"}}
    ]"#;
    let graph = ContentGraph::from_json_str(json).expect("graph");
    assert_eq!(graph.len(), 3);

    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.json"), json).unwrap();
    fs::write(tmp.path().join("ignored.txt"), "not json").unwrap();
    assert_eq!(ContentGraph::load(tmp.path()).expect("load dir").len(), 3);

    let orphan = r#"[{"aggregateId": "x", "nodeType": "Acme:Text", "parent": "nowhere"}]"#;
    assert!(ContentGraph::from_json_str(orphan).is_err());
}

#[test]
fn memory_index_filters_and_journals() {
    let index = MemoryIndex::new("test");
    let mut a = Document::new("a_1");
    a.title = Some("Mountain hiking guide".into());
    a.insert_field("__identifier", "a".into());
    a.insert_field("status", "published".into());
    let mut b = Document::new("b_1");
    b.title = Some("City guide".into());
    b.insert_field("__identifier", "b".into());
    b.insert_field("status", "draft".into());
    assert!(!b.insert_field("title", "shadowed".into()));

    index.create_index().unwrap();
    index.add_documents(&[a, b]).unwrap();
    assert_eq!(index.find_identifiers_by_aggregate(&"a".into()).unwrap(), vec!["a_1".to_string()]);

    let params = SearchParameters { filter: vec![r#"status = "published""#.into()], ..Default::default() };
    let result = index.search("guide", &params).unwrap();
    assert_eq!(result.document_ids(), vec!["a_1".to_string()]);

    let all = SearchParameters { matching_strategy: Some(MatchingStrategy::All), ..Default::default() };
    assert_eq!(index.search("city guide", &all).unwrap().document_ids(), vec!["b_1".to_string()]);
    assert_eq!(index.search("guide", &SearchParameters::default()).unwrap().total(), 2);

    index.delete_documents(&["a_1".to_string()]).unwrap();
    assert_eq!(index.document_ids(), vec!["b_1".to_string()]);
    assert_eq!(
        index.journal(),
        vec![
            IndexOperation::CreateIndex,
            IndexOperation::Add(vec!["a_1".into(), "b_1".into()]),
            IndexOperation::Delete(vec!["a_1".into()]),
        ]
    );
}
