//! nodesearch-core
//!
//! Domain types, capability traits and the shared plumbing (configuration,
//! node-type schema, dimensions, content graph, filter grammar, search
//! post-processing, in-memory backend) used by the indexer and the backends.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod dimensions;
pub mod error;
pub mod filter;
pub mod link;
pub mod memory;
pub mod schema;
pub mod search;
pub mod traits;
pub mod tree;
pub mod types;

pub use error::{Error, Result};
