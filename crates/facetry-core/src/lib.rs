//! Facetry Core: filter trees, search state, and shared errors.
//!
//! This crate provides the foundational types used across all Facetry crates.
//! It has no internal Facetry dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`facet`]: Facet, result and sort vocabularies
//! - [`filter`]: Tri-state filter trees
//! - [`catalog`]: Static catalog metadata
//! - [`tree_builder`]: Filter trees from catalog and aggregation buckets
//! - [`state`]: Immutable per-result-type search state

pub mod catalog;
pub mod error;
pub mod facet;
pub mod filter;
pub mod state;
pub mod tree_builder;

// Re-export key types at crate root for convenience
pub use catalog::{Catalog, CatalogNode, TermLabel};
pub use error::{Error, Result};
pub use facet::{FacetType, FilterStrategy, ResultType, SortType};
pub use filter::{FilterForest, FilterNode, FilterNodeView, NodeId, SelectionState};
pub use state::{SearchState, SearchStateUpdate, StateField};
pub use tree_builder::{AggregationBucket, BuiltFilters, CommentaryRule, FilterTreeBuilder};
