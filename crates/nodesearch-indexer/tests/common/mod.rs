#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use nodesearch_core::config::{Config, Settings};
use nodesearch_core::link::UriPathSegmentResolver;
use nodesearch_core::memory::MemoryIndex;
use nodesearch_core::traits::{IndexBackend, TreeAccessor};
use nodesearch_core::tree::ContentGraph;
use nodesearch_core::types::{DimensionSpacePoint, Node, WorkspaceName};
use nodesearch_indexer::NodeIndexer;

pub const SCHEMA: &str = r#"
[node_types."Neos.Neos:Node"]

[node_types."Neos.Neos:Sites"]
super_types = ["Neos.Neos:Node"]

[node_types."Neos.Neos:Document"]
super_types = ["Neos.Neos:Node"]
search.fulltext.is_root = true
search.fulltext.enable = true
properties.title.search.fulltext_extractor = { kind = "into", bucket = "h1" }
properties.uriPathSegment.search.indexed = false

[node_types."Neos.Neos:Site"]
super_types = ["Neos.Neos:Document"]

[node_types."Acme:Page"]
super_types = ["Neos.Neos:Document"]
properties.location.search.index_as = "__geo"

[node_types."Neos.Neos:Content"]
super_types = ["Neos.Neos:Node"]
search.fulltext.enable = true

[node_types."Neos.Neos:ContentCollection"]
super_types = ["Neos.Neos:Node"]

[node_types."Acme:Text"]
super_types = ["Neos.Neos:Content"]
properties.text.search.fulltext_extractor = { kind = "html_content" }

[node_types."Acme:Embedded"]
super_types = ["Neos.Neos:Content"]
search.fulltext.is_root = true
"#;

pub struct Fixture {
    pub graph: Arc<ContentGraph>,
    pub index: Arc<MemoryIndex>,
    pub settings: Settings,
}

impl Fixture {
    /// `languages` become the `language` dimension; `extra` is appended to
    /// the configuration.
    pub fn new(languages: &[&str], extra: &str) -> Self {
        let dimensions = if languages.is_empty() {
            String::new()
        } else {
            let values: Vec<String> = languages.iter().map(|l| format!("\"{l}\"")).collect();
            format!("[dimensions]\nlanguage = [{}]\n", values.join(", "))
        };
        let toml = format!("{SCHEMA}\n{dimensions}\n{extra}\n");
        let settings = Config::from_toml_str(&toml).expect("config").settings().expect("settings");
        Self { graph: Arc::new(ContentGraph::new()), index: Arc::new(MemoryIndex::new("test")), settings }
    }

    pub fn indexer(&self) -> NodeIndexer {
        self.indexer_with(self.index.clone())
    }

    pub fn indexer_with(&self, index: Arc<dyn IndexBackend>) -> NodeIndexer {
        let tree: Arc<dyn TreeAccessor> = self.graph.clone();
        let links = Arc::new(UriPathSegmentResolver::new(tree.clone(), self.settings.links.clone()));
        NodeIndexer::new(
            index,
            tree,
            Arc::new(self.settings.node_type_registry().expect("schema")),
            links,
            Arc::new(self.settings.dimensions.clone()),
            self.settings.indexing.clone(),
        )
        .expect("indexer")
    }

    pub fn node(&self, aggregate: &str, lang: &str) -> Node {
        self.graph
            .find_by_aggregate_id_in_dimension(&WorkspaceName::live(), &aggregate.into(), &point(lang))
            .expect("lookup")
            .expect("node exists")
    }

    pub fn add_site(&self, lang: &str) {
        let p = point(lang);
        let g = &self.graph;
        g.insert_root(Node::new("sites", "Neos.Neos:Sites", p.clone()).named("sites")).unwrap();
        g.insert_child(
            &"sites".into(),
            Node::new("site", "Neos.Neos:Site", p.clone()).named("home").with_property("title", format!("Home {lang}")),
        )
        .unwrap();
        g.insert_child(&"site".into(), Node::new("site-main", "Neos.Neos:ContentCollection", p.clone()).named("main"))
            .unwrap();
        g.insert_child(
            &"site-main".into(),
            Node::new("welcome", "Acme:Text", p).with_property("text", "<h2>Welcome</h2><p>Hello world</p>"),
        )
        .unwrap();
    }

    pub fn add_about(&self, lang: &str) {
        let p = point(lang);
        let g = &self.graph;
        g.insert_child(
            &"site".into(),
            Node::new("about", "Acme:Page", p.clone())
                .named("about")
                .with_property("title", format!("About {lang}"))
                .with_property("uriPathSegment", "about")
                .with_property("status", "published")
                .with_property("location", json!({"lat": 52.52, "lng": 13.405})),
        )
        .unwrap();
        g.insert_child(&"about".into(), Node::new("about-main", "Neos.Neos:ContentCollection", p.clone()).named("main"))
            .unwrap();
        g.insert_child(
            &"about-main".into(),
            Node::new("about-text", "Acme:Text", p.clone()).with_property("text", format!("<p>About text {lang}</p>")),
        )
        .unwrap();
        g.insert_child(
            &"about-main".into(),
            Node::new("embedded", "Acme:Embedded", p.clone()).named("embedded").with_property("title", "Embedded"),
        )
        .unwrap();
        g.insert_child(
            &"embedded".into(),
            Node::new("secret", "Acme:Text", p).with_property("text", "<p>Secret embedded</p>"),
        )
        .unwrap();
    }

    pub fn add_team(&self, lang: &str) {
        let p = point(lang);
        let g = &self.graph;
        g.insert_child(
            &"site".into(),
            Node::new("team", "Acme:Page", p.clone())
                .named("team")
                .with_property("title", format!("Team {lang}"))
                .with_property("uriPathSegment", "team")
                .with_property("status", "draft")
                .with_property("location", json!({"lat": 48.137, "lng": 11.575})),
        )
        .unwrap();
        g.insert_child(&"team".into(), Node::new("team-main", "Neos.Neos:ContentCollection", p.clone()).named("main"))
            .unwrap();
        g.insert_child(&"team-main".into(), Node::new("team-text", "Acme:Text", p).with_property("text", "<p>Team text</p>"))
            .unwrap();
    }
}

pub fn point(lang: &str) -> DimensionSpacePoint {
    DimensionSpacePoint::from_pairs([("language", lang)])
}

pub fn doc_id(aggregate: &str, lang: &str) -> String {
    nodesearch_core::types::document_id(&aggregate.into(), &point(lang))
}
