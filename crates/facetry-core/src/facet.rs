//! Facet, result-set and sort vocabularies.
//!
//! These are closed sets: each variant knows its wire name and, for facets,
//! how the backend should filter on it. Anything that used to be looked up
//! by a type string is a `match` on one of these enums instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// FacetType
// ============================================================================

/// A family of filter values the backend can aggregate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetType {
    /// `/`-delimited catalog path (category → sub-category → text).
    Path,
    /// Topic tags on collections.
    #[serde(rename = "topics")]
    Topic,
    /// Collection membership.
    #[serde(rename = "collections")]
    Collection,
}

/// How a filter value is turned into a backend filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Match the key and every `/`-separated descendant of it.
    PathPrefix,
    /// Match the key exactly.
    ExactTerm,
}

impl FacetType {
    /// Every facet type, in wire order.
    pub const ALL: [FacetType; 3] = [FacetType::Path, FacetType::Topic, FacetType::Collection];

    /// Name used on the wire, in aggregation maps and in URL fragments.
    pub fn name(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Topic => "topics",
            Self::Collection => "collections",
        }
    }

    /// Filter-clause strategy for this facet.
    pub fn filter_strategy(self) -> FilterStrategy {
        match self {
            Self::Path => FilterStrategy::PathPrefix,
            Self::Topic | Self::Collection => FilterStrategy::ExactTerm,
        }
    }

    /// Whether keys of this facet form a `/`-delimited hierarchy.
    pub fn is_hierarchical(self) -> bool {
        self.filter_strategy() == FilterStrategy::PathPrefix
    }
}

impl fmt::Display for FacetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FacetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|facet| facet.name() == s)
            .ok_or_else(|| Error::UnknownFacetType(s.to_string()))
    }
}

// ============================================================================
// ResultType
// ============================================================================

/// An independent search domain with its own state, paging and facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// Canonical texts, faceted by catalog path.
    Documents,
    /// User-authored collections, faceted by topic and collection.
    Collections,
}

impl ResultType {
    /// Every result type.
    pub const ALL: [ResultType; 2] = [ResultType::Documents, ResultType::Collections];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Collections => "collections",
        }
    }

    /// Facet types the backend aggregates for this result type.
    pub fn facet_types(self) -> &'static [FacetType] {
        match self {
            Self::Documents => &[FacetType::Path],
            Self::Collections => &[FacetType::Topic, FacetType::Collection],
        }
    }

    /// Whether hits of this type are grouped by logical reference.
    pub fn deduplicates_hits(self) -> bool {
        matches!(self, Self::Documents)
    }

    /// Default sort for a fresh state.
    pub fn default_sort(self) -> SortType {
        SortType::Relevance
    }

    /// Default `(exact, broad)` backend field names.
    pub fn default_fields(self) -> (&'static str, &'static str) {
        match self {
            Self::Documents => ("exact", "naive_lemmatizer"),
            Self::Collections => ("content", "content"),
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResultType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| Error::UnknownResultType(s.to_string()))
    }
}

// ============================================================================
// SortType
// ============================================================================

/// User-facing sort choice. How it is realized is configured per result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortType {
    /// Engine relevance, optionally blended with a stored signal.
    #[default]
    Relevance,
    /// Composition date order.
    Chronological,
    /// Newest first.
    DateCreated,
}

impl SortType {
    /// Every sort type.
    pub const ALL: [SortType; 3] = [
        SortType::Relevance,
        SortType::Chronological,
        SortType::DateCreated,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Chronological => "chronological",
            Self::DateCreated => "date_created",
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|sort| sort.name() == s)
            .ok_or_else(|| Error::UnknownSortType(s.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
