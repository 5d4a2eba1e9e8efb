//! Backend request protocol.
//!
//! A [`SearchRequest`] is the language-neutral description of one backend
//! call. It is what gets cached (through [`SearchRequest::cache_key`]) and
//! what backends translate into their own query language.

use facetry_core::{FacetType, ResultType, Result};
use serde::{Deserialize, Serialize};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One field of a multi-field sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Document field, or `_score` for engine relevance.
    pub name: String,
    /// Direction.
    pub dir: SortDirection,
}

impl SortField {
    /// Creates a sort field.
    pub fn new(name: impl Into<String>, dir: SortDirection) -> Self {
        Self {
            name: name.into(),
            dir,
        }
    }
}

/// How hits are ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    /// Sort directly on fields, in order.
    Fields {
        /// Fields, most significant first.
        fields: Vec<SortField>,
    },
    /// Engine relevance multiplied by a stored numeric signal.
    ScoreBlended {
        /// Numeric field blended into the score.
        #[serde(rename = "scoreField", alias = "score_field")]
        score_field: String,
        /// Value used for documents that lack the field.
        #[serde(rename = "missingValue", alias = "missing_value")]
        missing_value: f64,
    },
}

/// Highlight settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Inserted before each highlighted term.
    #[serde(rename = "preTag", alias = "pre_tag", default = "default_pre_tag")]
    pub pre_tag: String,
    /// Inserted after each highlighted term.
    #[serde(rename = "postTag", alias = "post_tag", default = "default_post_tag")]
    pub post_tag: String,
    /// Maximum characters per fragment.
    #[serde(
        rename = "fragmentSize",
        alias = "fragment_size",
        default = "default_fragment_size"
    )]
    pub fragment_size: usize,
}

fn default_pre_tag() -> String {
    "<b>".to_string()
}

fn default_post_tag() -> String {
    "</b>".to_string()
}

fn default_fragment_size() -> usize {
    200
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            pre_tag: default_pre_tag(),
            post_tag: default_post_tag(),
            fragment_size: default_fragment_size(),
        }
    }
}

/// One backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Normalized free text.
    pub query: String,
    /// Result type searched.
    #[serde(rename = "type")]
    pub result_type: ResultType,
    /// Field matched against.
    pub field: String,
    /// True when matching is exact (no slop).
    pub exact: bool,
    /// Phrase slop; zero for exact matching.
    pub slop: u32,
    /// Page size.
    pub size: usize,
    /// Offset of the first hit.
    pub from: usize,
    /// Hit order.
    pub sort: SortSpec,
    /// Applied filter keys.
    pub applied_filters: Vec<String>,
    /// Facet type of each applied filter.
    pub applied_filter_facet_types: Vec<FacetType>,
    /// Facet types to aggregate on.
    pub aggregations_to_fetch: Vec<FacetType>,
    /// Highlighting.
    pub highlight: HighlightConfig,
}

impl SearchRequest {
    /// Canonical serialization used as the cache key.
    ///
    /// Applied filters and aggregations are sorted first, so requests that
    /// differ only in list order share a key.
    pub fn cache_key(&self) -> Result<String> {
        let mut canonical = self.clone();
        let mut pairs: Vec<(FacetType, String)> = canonical
            .applied_filter_facet_types
            .iter()
            .copied()
            .zip(canonical.applied_filters.drain(..))
            .collect();
        pairs.sort();
        let (facets, keys) = pairs.into_iter().unzip();
        canonical.applied_filter_facet_types = facets;
        canonical.applied_filters = keys;
        canonical.aggregations_to_fetch.sort();
        Ok(serde_json::to_string(&canonical)?)
    }

    /// The same request at another offset.
    pub fn at_offset(&self, from: usize) -> SearchRequest {
        SearchRequest {
            from,
            ..self.clone()
        }
    }

    /// Applied filters grouped by facet type, in order of first appearance.
    pub fn filters_by_facet(&self) -> Vec<(FacetType, Vec<&str>)> {
        let mut groups: Vec<(FacetType, Vec<&str>)> = Vec::new();
        for (key, facet) in self
            .applied_filters
            .iter()
            .zip(&self.applied_filter_facet_types)
        {
            match groups.iter_mut().find(|(f, _)| f == facet) {
                Some((_, keys)) => keys.push(key),
                None => groups.push((*facet, vec![key])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SearchRequest {
        SearchRequest {
            query: "Abraham".to_string(),
            result_type: ResultType::Documents,
            field: "naive_lemmatizer".to_string(),
            exact: false,
            slop: 10,
            size: 50,
            from: 0,
            sort: SortSpec::ScoreBlended {
                score_field: "pagesheetrank".to_string(),
                missing_value: 0.04,
            },
            applied_filters: Vec::new(),
            applied_filter_facet_types: Vec::new(),
            aggregations_to_fetch: vec![FacetType::Path],
            highlight: HighlightConfig::default(),
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(request()).unwrap();
        assert_eq!(json["type"], "documents");
        assert_eq!(json["aggregationsToFetch"][0], "path");
        assert_eq!(json["sort"]["scoreField"], "pagesheetrank");
        assert_eq!(json["highlight"]["preTag"], "<b>");
        assert_eq!(json["highlight"]["fragmentSize"], 200);
    }

    #[test]
    fn test_sort_spec_variants_parse() {
        let fields: SortSpec =
            serde_json::from_str(r#"{"fields":[{"name":"comp_date","dir":"asc"}]}"#).unwrap();
        assert_eq!(
            fields,
            SortSpec::Fields {
                fields: vec![SortField::new("comp_date", SortDirection::Asc)]
            }
        );
        let blended: SortSpec =
            serde_json::from_str(r#"{"scoreField":"pagesheetrank","missingValue":0.04}"#).unwrap();
        assert!(matches!(blended, SortSpec::ScoreBlended { .. }));
    }

    #[test]
    fn test_cache_key_ignores_filter_order() {
        let mut a = request();
        a.applied_filters = vec!["A".to_string(), "B".to_string()];
        a.applied_filter_facet_types = vec![FacetType::Path, FacetType::Path];
        let mut b = a.clone();
        b.applied_filters.reverse();
        assert_eq!(a.cache_key().unwrap(), b.cache_key().unwrap());
    }

    #[test]
    fn test_cache_key_distinguishes_content() {
        let a = request();
        assert_ne!(a.cache_key().unwrap(), a.at_offset(50).cache_key().unwrap());

        let mut exact = a.clone();
        exact.exact = true;
        assert_ne!(a.cache_key().unwrap(), exact.cache_key().unwrap());

        let mut no_aggs = a.clone();
        no_aggs.aggregations_to_fetch.clear();
        assert_ne!(a.cache_key().unwrap(), no_aggs.cache_key().unwrap());
    }

    #[test]
    fn test_filters_by_facet_groups_in_order() {
        let mut req = request();
        req.applied_filters = vec!["prayer".into(), "notes".into(), "shabbat".into()];
        req.applied_filter_facet_types =
            vec![FacetType::Topic, FacetType::Collection, FacetType::Topic];
        assert_eq!(
            req.filters_by_facet(),
            vec![
                (FacetType::Topic, vec!["prayer", "shabbat"]),
                (FacetType::Collection, vec!["notes"]),
            ]
        );
    }
}
