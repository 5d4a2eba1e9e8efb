//! Backend response protocol.

use std::collections::BTreeMap;
use std::ops::Add;

use facetry_core::{AggregationBucket, FacetType};
use serde::{Deserialize, Serialize};

/// Whether a reported total is exact or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    #[default]
    Eq,
    Gte,
}

/// Server-reported hit count.
///
/// Totals compose by addition; the relation widens to `gte` if either side
/// is a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "TotalRepr")]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalRelation,
}

/// Older backends report the total as a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum TotalRepr {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: TotalRelation,
    },
}

impl From<TotalRepr> for TotalHits {
    fn from(repr: TotalRepr) -> Self {
        match repr {
            TotalRepr::Count(value) => TotalHits::exact(value),
            TotalRepr::Object { value, relation } => TotalHits { value, relation },
        }
    }
}

impl TotalHits {
    /// An exact total.
    pub fn exact(value: u64) -> Self {
        Self {
            value,
            relation: TotalRelation::Eq,
        }
    }

    /// A lower-bound total.
    pub fn at_least(value: u64) -> Self {
        Self {
            value,
            relation: TotalRelation::Gte,
        }
    }

    /// Sum of two totals.
    pub fn combine(self, other: TotalHits) -> TotalHits {
        let relation = if self.relation == TotalRelation::Gte
            || other.relation == TotalRelation::Gte
        {
            TotalRelation::Gte
        } else {
            TotalRelation::Eq
        };
        TotalHits {
            value: self.value.saturating_add(other.value),
            relation,
        }
    }
}

impl Add for TotalHits {
    type Output = TotalHits;

    fn add(self, other: TotalHits) -> TotalHits {
        self.combine(other)
    }
}

impl std::iter::Sum for TotalHits {
    fn sum<I: Iterator<Item = TotalHits>>(iter: I) -> TotalHits {
        iter.fold(TotalHits::default(), TotalHits::combine)
    }
}

/// One hit as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Backend document id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Relevance score; absent when sorting on fields.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    /// Stored document fields.
    #[serde(rename = "_source", default)]
    pub source: serde_json::Map<String, serde_json::Value>,
    /// Highlighted fragments per field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub highlight: BTreeMap<String, Vec<String>>,
}

impl Hit {
    /// Creates a hit with no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            score: None,
            source: serde_json::Map::new(),
            highlight: BTreeMap::new(),
        }
    }

    /// Adds a stored field.
    pub fn with_field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.source.insert(name.to_string(), value.into());
        self
    }

    /// A string field of the stored document.
    pub fn source_str(&self, field: &str) -> Option<&str> {
        self.source.get(field).and_then(serde_json::Value::as_str)
    }

    /// Logical reference shared by every version of the same passage.
    pub fn reference(&self) -> Option<&str> {
        self.source_str("ref")
    }

    /// Catalog path of the document.
    pub fn path(&self) -> Option<&str> {
        self.source_str("path")
    }

    /// Rank among versions of one reference; lower sorts first.
    pub fn version_priority(&self) -> i64 {
        self.source
            .get("version_priority")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0)
    }

    /// Highlighted fragments for `field`.
    pub fn fragments(&self, field: &str) -> &[String] {
        self.highlight.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

/// The `hits` envelope.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HitsEnvelope {
    pub total: TotalHits,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Buckets for one aggregated facet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    #[serde(default)]
    pub buckets: Vec<AggregationBucket>,
}

/// A backend response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: HitsEnvelope,
    /// Aggregations keyed by facet wire name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: BTreeMap<String, AggregationResult>,
}

impl SearchResponse {
    /// Buckets for `facet`, if it was aggregated.
    pub fn buckets(&self, facet: FacetType) -> Option<&[AggregationBucket]> {
        self.aggregations
            .get(facet.name())
            .map(|agg| agg.buckets.as_slice())
    }

    /// Buckets for each of `facets`, treating a missing aggregation as empty.
    pub fn aggregation_list(
        &self,
        facets: &[FacetType],
    ) -> Vec<(FacetType, Vec<AggregationBucket>)> {
        facets
            .iter()
            .map(|&facet| (facet, self.buckets(facet).map(<[_]>::to_vec).unwrap_or_default()))
            .collect()
    }

    /// Sets the buckets for `facet`.
    pub fn with_buckets(mut self, facet: FacetType, buckets: Vec<AggregationBucket>) -> Self {
        self.aggregations
            .insert(facet.name().to_string(), AggregationResult { buckets });
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
