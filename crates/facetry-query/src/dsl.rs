//! Elasticsearch-style query DSL.
//!
//! Renders a [`SearchRequest`] as the JSON body of a `_search` call:
//!
//! ```text
//! function_score?                      (score-blended sort only)
//!   bool
//!     must:   match_phrase(field, query, slop?)
//!     filter: bool.must[
//!               bool.should[ clause(key) for key in facet ]   per facet type
//!             ]
//! ```
//!
//! With no applied filters the query is the bare `match_phrase`.

use facetry_core::{FacetType, FilterStrategy};
use serde_json::{Map, Value, json};

use crate::request::{SearchRequest, SortSpec};
use crate::types::QueryConfig;

/// Full `_search` body for `request`.
pub fn search_body(request: &SearchRequest, config: &QueryConfig) -> Value {
    let mut body = Map::new();
    body.insert("from".to_string(), json!(request.from));
    body.insert("size".to_string(), json!(request.size));
    body.insert("query".to_string(), query_clause(request));

    if let SortSpec::Fields { fields } = &request.sort {
        let sort: Vec<Value> = fields
            .iter()
            .map(|field| json!({ field.name.as_str(): { "order": field.dir.name() } }))
            .collect();
        body.insert("sort".to_string(), Value::Array(sort));
    }

    body.insert(
        "highlight".to_string(),
        json!({
            "pre_tags": [request.highlight.pre_tag],
            "post_tags": [request.highlight.post_tag],
            "fields": {
                request.field.as_str(): { "fragment_size": request.highlight.fragment_size }
            }
        }),
    );

    if !request.aggregations_to_fetch.is_empty() {
        body.insert(
            "aggs".to_string(),
            aggregations(&request.aggregations_to_fetch, config.aggregation_size),
        );
    }
    Value::Object(body)
}

/// The query part of the body, sort blending included.
pub fn query_clause(request: &SearchRequest) -> Value {
    let matched = match_clause(request);
    let filtered = if request.applied_filters.is_empty() {
        matched
    } else {
        let groups: Vec<Value> = request
            .filters_by_facet()
            .into_iter()
            .map(|(facet, keys)| {
                let should: Vec<Value> =
                    keys.into_iter().map(|key| filter_clause(facet, key)).collect();
                json!({ "bool": { "should": should } })
            })
            .collect();
        json!({
            "bool": {
                "must": [matched],
                "filter": { "bool": { "must": groups } }
            }
        })
    };

    match &request.sort {
        SortSpec::ScoreBlended {
            score_field,
            missing_value,
        } => json!({
            "function_score": {
                "query": filtered,
                "field_value_factor": {
                    "field": score_field,
                    "missing": missing_value
                }
            }
        }),
        SortSpec::Fields { .. } => filtered,
    }
}

fn match_clause(request: &SearchRequest) -> Value {
    let mut phrase = Map::new();
    phrase.insert("query".to_string(), json!(request.query));
    if request.slop > 0 {
        phrase.insert("slop".to_string(), json!(request.slop));
    }
    json!({ "match_phrase": { request.field.as_str(): phrase } })
}

/// Filter clause for one applied key.
///
/// Hierarchical facets match the key itself and every `/`-separated
/// descendant; flat facets match the key exactly.
pub fn filter_clause(facet: FacetType, key: &str) -> Value {
    match facet.filter_strategy() {
        FilterStrategy::PathPrefix => json!({
            "regexp": { facet.name(): format!("{}(/.*)?", escape_regexp(key)) }
        }),
        FilterStrategy::ExactTerm => json!({ "term": { facet.name(): key } }),
    }
}

fn aggregations(facets: &[FacetType], size: usize) -> Value {
    let aggs: Map<String, Value> = facets
        .iter()
        .map(|facet| {
            (
                facet.name().to_string(),
                json!({ "terms": { "field": facet.name(), "size": size } }),
            )
        })
        .collect();
    Value::Object(aggs)
}

/// Escapes Lucene regular-expression operators in a literal.
pub fn escape_regexp(literal: &str) -> String {
    const RESERVED: &[char] = &[
        '.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '<', '>',
        '~',
    ];
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// Tests
// ============================================================================
