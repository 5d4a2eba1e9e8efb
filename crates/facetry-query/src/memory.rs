//! In-memory search backend.
//!
//! Evaluates [`SearchRequest`]s over a small JSON corpus with the same
//! filter, aggregation and sort semantics an Elasticsearch-style engine
//! applies to the rendered DSL. Meant for demos, tests and offline use; it
//! scans every document on every request.
//!
//! # Corpus format
//!
//! ```json
//! {
//!   "documents": [
//!     {"id": "gen-12-1-en", "ref": "Genesis 12:1", "path": "Tanakh/Torah/Genesis",
//!      "version_priority": 0, "exact": "...", "naive_lemmatizer": "..."}
//!   ],
//!   "collections": [
//!     {"id": "sheet-7", "content": "...", "topics": ["shabbat"], "collections": ["notes"]}
//!   ]
//! }
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use facetry_core::{AggregationBucket, Error, FacetType, FilterStrategy, ResultType, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::SearchBackend;
use crate::request::{HighlightConfig, SearchRequest, SortDirection, SortSpec};
use crate::response::{AggregationResult, Hit, HitsEnvelope, SearchResponse, TotalHits};

/// Raw corpus file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryCorpus {
    /// Canonical text documents.
    #[serde(default)]
    pub documents: Vec<Map<String, Value>>,
    /// Collection documents.
    #[serde(default)]
    pub collections: Vec<Map<String, Value>>,
}

/// Search backend over an in-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    documents: HashMap<ResultType, Vec<Hit>>,
    total_cap: Option<u64>,
}

impl InMemoryBackend {
    /// Creates a backend over `corpus`.
    ///
    /// Each document's `id` field becomes the hit id; documents without one
    /// are numbered.
    pub fn new(corpus: MemoryCorpus) -> Self {
        let mut documents = HashMap::new();
        documents.insert(
            ResultType::Documents,
            into_hits(ResultType::Documents, corpus.documents),
        );
        documents.insert(
            ResultType::Collections,
            into_hits(ResultType::Collections, corpus.collections),
        );
        Self {
            documents,
            total_cap: None,
        }
    }

    /// Parses a corpus from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let corpus: MemoryCorpus = serde_json::from_str(json)?;
        Ok(Self::new(corpus))
    }

    /// Reads a corpus file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let backend = Self::from_json_str(&json)?;
        log::info!(
            "loaded in-memory corpus from {} ({} documents, {} collections)",
            path.display(),
            backend.len(ResultType::Documents),
            backend.len(ResultType::Collections)
        );
        Ok(backend)
    }

    /// Reports totals above `cap` as `gte cap`, like a backend that stops
    /// counting early.
    pub fn with_total_cap(mut self, cap: u64) -> Self {
        self.total_cap = Some(cap);
        self
    }

    /// Number of stored documents of one type.
    pub fn len(&self, result_type: ResultType) -> usize {
        self.documents.get(&result_type).map_or(0, Vec::len)
    }

    /// True when no documents of any type are stored.
    pub fn is_empty(&self) -> bool {
        self.documents.values().all(Vec::is_empty)
    }

    fn evaluate(&self, request: &SearchRequest) -> SearchResponse {
        let corpus = self
            .documents
            .get(&request.result_type)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let terms = query_terms(&request.query);
        let phrase = request.slop == 0;
        let groups = request.filters_by_facet();

        let mut matched: Vec<Hit> = corpus
            .iter()
            .filter(|doc| {
                groups
                    .iter()
                    .all(|(facet, keys)| keys.iter().any(|key| facet_matches(doc, *facet, key)))
            })
            .filter_map(|doc| {
                let text = doc.source_str(&request.field)?;
                let score = text_score(text, &terms, phrase)?;
                let mut hit = doc.clone();
                hit.score = Some(score);
                Some(hit)
            })
            .collect();

        let aggregations = request
            .aggregations_to_fetch
            .iter()
            .map(|facet| {
                (
                    facet.name().to_string(),
                    AggregationResult {
                        buckets: count_buckets(&matched, *facet),
                    },
                )
            })
            .collect();

        sort_hits(&mut matched, &request.sort);

        let count = matched.len() as u64;
        let total = match self.total_cap {
            Some(cap) if count > cap => TotalHits::at_least(cap),
            _ => TotalHits::exact(count),
        };

        let hits = matched
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|mut hit| {
                if let Some(text) = hit.source_str(&request.field)
                    && let Some(fragment) = highlight(text, &terms, &request.highlight)
                {
                    hit.highlight.insert(request.field.clone(), vec![fragment]);
                }
                hit
            })
            .collect();

        SearchResponse {
            hits: HitsEnvelope { total, hits },
            aggregations,
        }
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        log::debug!(
            "InMemoryBackend: query='{}', type={}, from={}, filters={:?}",
            request.query,
            request.result_type,
            request.from,
            request.applied_filters
        );
        Ok(self.evaluate(&request))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn into_hits(result_type: ResultType, docs: Vec<Map<String, Value>>) -> Vec<Hit> {
    docs.into_iter()
        .enumerate()
        .map(|(i, source)| {
            let id = source
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{result_type}-{i}"));
            Hit {
                id,
                score: None,
                source,
                highlight: BTreeMap::new(),
            }
        })
        .collect()
}

// ============================================================================
// Matching
// ============================================================================

/// Lowercased words of `text`.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn query_terms(query: &str) -> Vec<String> {
    words(&query.replace('"', " "))
}

/// Score of `text` for the query, or `None` if it does not match.
///
/// Phrase matching needs the terms contiguous and in order; otherwise every
/// term must appear somewhere. The score counts term occurrences.
fn text_score(text: &str, terms: &[String], phrase: bool) -> Option<f64> {
    if terms.is_empty() {
        return Some(1.0);
    }
    let text_words = words(text);
    let matches = if phrase {
        text_words.windows(terms.len()).any(|window| window == terms)
    } else {
        terms.iter().all(|term| text_words.contains(term))
    };
    if !matches {
        return None;
    }
    let occurrences = text_words.iter().filter(|w| terms.contains(w)).count();
    Some(occurrences as f64)
}

fn facet_values(hit: &Hit, facet: FacetType) -> Vec<&str> {
    match hit.source.get(facet.name()) {
        Some(Value::String(value)) => vec![value.as_str()],
        Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn facet_matches(hit: &Hit, facet: FacetType, key: &str) -> bool {
    facet_values(hit, facet).into_iter().any(|value| match facet.filter_strategy() {
        FilterStrategy::PathPrefix => {
            value == key
                || value
                    .strip_prefix(key)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
        FilterStrategy::ExactTerm => value == key,
    })
}

/// Buckets by exact facet value, largest first.
fn count_buckets(hits: &[Hit], facet: FacetType) -> Vec<AggregationBucket> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for hit in hits {
        let distinct: HashSet<&str> = facet_values(hit, facet).into_iter().collect();
        for value in distinct {
            *counts.entry(value).or_default() += 1;
        }
    }
    let mut buckets: Vec<AggregationBucket> = counts
        .into_iter()
        .map(|(key, count)| AggregationBucket::new(key, count))
        .collect();
    buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    buckets
}

// ============================================================================
// Sorting
// ============================================================================

fn sort_hits(hits: &mut [Hit], sort: &SortSpec) {
    match sort {
        SortSpec::Fields { fields } => hits.sort_by(|a, b| {
            fields
                .iter()
                .map(|field| {
                    let ordering = if field.name == "_score" {
                        compare_f64(a.score, b.score)
                    } else {
                        compare_values(a.source.get(&field.name), b.source.get(&field.name))
                    };
                    match field.dir {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        SortSpec::ScoreBlended {
            score_field,
            missing_value,
        } => {
            for hit in hits.iter_mut() {
                let factor = hit
                    .source
                    .get(score_field)
                    .and_then(Value::as_f64)
                    .unwrap_or(*missing_value);
                hit.score = hit.score.map(|score| score * factor);
            }
            hits.sort_by(|a, b| compare_f64(b.score, a.score));
        }
    }
}

fn compare_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(0.0).total_cmp(&b.unwrap_or(0.0))
}

/// Orders numbers numerically and strings lexically; missing values last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.as_str().unwrap_or_default().cmp(b.as_str().unwrap_or_default()),
        },
    }
}

// ============================================================================
// Highlighting
// ============================================================================

/// One fragment of at most `fragment_size` characters around the first
/// matching term, with every matching word wrapped in the highlight tags.
fn highlight(text: &str, terms: &[String], config: &HighlightConfig) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    let chars: Vec<char> = text.chars().collect();
    let spans = word_spans(&chars);
    let first = spans.iter().find(|(start, end)| {
        terms.contains(&chars[*start..*end].iter().collect::<String>().to_lowercase())
    })?;

    let size = config.fragment_size.max(1);
    let start = first.0.saturating_sub(size / 4).min(chars.len().saturating_sub(size));
    let end = (start + size).min(chars.len());

    let mut fragment = String::new();
    let mut cursor = start;
    for &(word_start, word_end) in spans.iter().filter(|(s, e)| *s >= start && *e <= end) {
        fragment.extend(&chars[cursor..word_start]);
        let word: String = chars[word_start..word_end].iter().collect();
        if terms.contains(&word.to_lowercase()) {
            fragment.push_str(&config.pre_tag);
            fragment.push_str(&word);
            fragment.push_str(&config.post_tag);
        } else {
            fragment.push_str(&word);
        }
        cursor = word_end;
    }
    fragment.extend(&chars[cursor..end]);
    Some(fragment)
}

/// `[start, end)` char ranges of alphanumeric runs.
fn word_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in chars.iter().enumerate() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, chars.len()));
    }
    spans
}

// ============================================================================
// Tests
// ============================================================================
