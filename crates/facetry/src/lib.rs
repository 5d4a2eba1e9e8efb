//! Facetry faceted search client - umbrella crate.
//!
//! This crate re-exports all Facetry components for convenience.
//! Use feature flags to enable specific functionality.

#![doc = include_str!("../README.md")]

pub use facetry_core as core;
pub use facetry_query as query;

#[cfg(feature = "client")]
pub use facetry_client as client;
