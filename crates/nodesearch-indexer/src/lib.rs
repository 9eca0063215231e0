//! nodesearch-indexer
//!
//! Keeps a search index in sync with a multi-dimension content tree:
//! fulltext-root location, text aggregation, per-variant document building,
//! delete-then-replace reconciliation and the read-side query builder.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod aggregator;
pub mod builder;
pub mod indexer;
pub mod locator;
pub mod query;

pub use aggregator::FulltextAggregator;
pub use builder::DocumentBuilder;
pub use indexer::{BuildReport, NodeIndexer};
pub use locator::find_fulltext_root;
pub use query::{QueryBuilder, ResolvedHit};
