//! nodesearch-text
//!
//! Embedded Tantivy backend for the node search engine. Documents are stored
//! as JSON next to a tokenized text field; filtering, sorting and formatting
//! run through the shared post-processing in `nodesearch_core::search`.

#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod index;
pub mod tantivy_utils;

pub use index::TantivyIndex;
