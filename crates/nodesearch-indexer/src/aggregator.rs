//! Fulltext aggregation below a fulltext root.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use nodesearch_core::error::{Error, Result};
use nodesearch_core::schema::{FulltextExtractor, NodeTypeFilter};
use nodesearch_core::traits::{NodeTypeSchema, TreeAccessor};
use nodesearch_core::types::{value_text, FulltextBag, Node, NodeTypeName};

/// Bucket for text outside of headings.
pub const TEXT_BUCKET: &str = "text";

/// Turns property markup into plain text for the fulltext bag.
pub struct TextExtractor {
    heading: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl TextExtractor {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("extractor pattern: {e}")));
        Ok(Self {
            heading: compile(r"(?is)<(h[1-6])\b[^>]*>(.*?)</h[1-6]\s*>")?,
            tag: compile(r"(?s)<[^>]*>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Markup removed, common entities decoded, whitespace collapsed.
    pub fn strip(&self, html: &str) -> String {
        let without_tags = self.tag.replace_all(html, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&");
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    pub fn extract(&self, kind: &FulltextExtractor, value: &str, bag: &mut FulltextBag) {
        match kind {
            FulltextExtractor::Into { bucket } => bag.append(bucket, self.strip(value)),
            FulltextExtractor::HtmlContent => {
                for captures in self.heading.captures_iter(value) {
                    let level = captures[1].to_ascii_lowercase();
                    bag.append(&level, self.strip(&captures[2]));
                }
                let rest = self.heading.replace_all(value, " ");
                bag.append(TEXT_BUCKET, self.strip(&rest));
            }
        }
    }
}

/// Collects the text of the content below a fulltext root.
///
/// Only children whose type is (or inherits from) one of the content node
/// types are visited. A descendant that is itself a fulltext root belongs to
/// its own document; neither it nor anything below it contributes here.
pub struct FulltextAggregator {
    tree: Arc<dyn TreeAccessor>,
    schema: Arc<dyn NodeTypeSchema>,
    content_filter: NodeTypeFilter,
    extractor: TextExtractor,
}

impl FulltextAggregator {
    pub fn new(
        tree: Arc<dyn TreeAccessor>,
        schema: Arc<dyn NodeTypeSchema>,
        content_node_types: &[NodeTypeName],
    ) -> Result<Self> {
        let content_filter = schema.subtypes_of(content_node_types);
        Ok(Self { tree, schema, content_filter, extractor: TextExtractor::new()? })
    }

    /// Text of the descendants of `root`, in tree pre-order.
    pub fn aggregate(&self, root: &Node) -> Result<FulltextBag> {
        let mut bag = FulltextBag::new();
        self.aggregate_into(root, &mut bag)?;
        Ok(bag)
    }

    pub fn aggregate_into(&self, root: &Node, bag: &mut FulltextBag) -> Result<()> {
        let mut stack = self.tree.find_children(root, &self.content_filter)?;
        stack.reverse();
        while let Some(node) = stack.pop() {
            if self.schema.is_fulltext_root(&node.node_type) {
                debug!(root = %root.aggregate_id, nested = %node.aggregate_id, "skipping nested fulltext root");
                continue;
            }
            self.extract_into(&node, bag);
            let mut children = self.tree.find_children(&node, &self.content_filter)?;
            children.reverse();
            stack.extend(children);
        }
        Ok(())
    }

    /// Apply the extractors declared for the node's own type.
    pub fn extract_into(&self, node: &Node, bag: &mut FulltextBag) {
        if !self.schema.is_fulltext_enabled(&node.node_type) {
            return;
        }
        for (property, kind) in self.schema.extractors_for(&node.node_type) {
            if let Some(text) = node.property(&property).and_then(value_text) {
                self.extractor.extract(&kind, &text, bag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_removes_markup() {
        let extractor = TextExtractor::new().unwrap();
        assert_eq!(extractor.strip("<p>Fish &amp; <b>chips</b></p>\n\n<br/>"), "Fish & chips");
        assert_eq!(extractor.strip("   "), "");
    }

    #[test]
    fn html_content_splits_headings() {
        let extractor = TextExtractor::new().unwrap();
        let mut bag = FulltextBag::new();
        let html = "<h1>Welcome</h1><p>Intro text</p><H2 class=\"x\">Details</H2><p>More</p>";
        extractor.extract(&FulltextExtractor::HtmlContent, html, &mut bag);
        assert_eq!(bag.get("h1"), Some(&["Welcome".to_string()][..]));
        assert_eq!(bag.get("h2"), Some(&["Details".to_string()][..]));
        assert_eq!(bag.get(TEXT_BUCKET), Some(&["Intro text More".to_string()][..]));
    }

    #[test]
    fn into_uses_named_bucket() {
        let extractor = TextExtractor::new().unwrap();
        let mut bag = FulltextBag::new();
        extractor.extract(&FulltextExtractor::Into { bucket: "h3".into() }, "<i>Quote</i>", &mut bag);
        extractor.extract(&FulltextExtractor::Into { bucket: "h3".into() }, "", &mut bag);
        assert_eq!(bag.get("h3"), Some(&["Quote".to_string()][..]));
    }
}
