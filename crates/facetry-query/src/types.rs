//! Query configuration.
//!
//! How each result type is queried: which index, which fields, how large a
//! page is, and how each sort choice is realized. Loaded from TOML; every
//! field has a default so a partial file is enough.

use std::path::Path;

use facetry_core::{Error, ResultType, Result, SortType};
use serde::{Deserialize, Serialize};

use crate::request::{HighlightConfig, SortDirection, SortField, SortSpec};

/// One configured sort choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOption {
    /// User-facing sort this option implements.
    pub sort_type: SortType,
    /// How the backend realizes it.
    pub spec: SortSpec,
}

impl SortOption {
    /// Creates a sort option.
    pub fn new(sort_type: SortType, spec: SortSpec) -> Self {
        Self { sort_type, spec }
    }
}

/// Per-result-type query settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeProfile {
    /// Backend index name.
    pub index: String,

    /// Field matched when exact matching is on.
    pub exact_field: String,

    /// Field matched otherwise.
    pub broad_field: String,

    /// Hits per page.
    pub page_size: usize,

    /// Supported sorts. The first one is the fallback.
    pub sorts: Vec<SortOption>,
}

impl TypeProfile {
    /// Sort spec for `sort_type`, if configured.
    pub fn sort(&self, sort_type: SortType) -> Option<&SortSpec> {
        self.sorts
            .iter()
            .find(|option| option.sort_type == sort_type)
            .map(|option| &option.spec)
    }

    /// Sort types this profile supports, in configured order.
    pub fn sort_types(&self) -> Vec<SortType> {
        self.sorts.iter().map(|option| option.sort_type).collect()
    }
}

/// Query configuration shared by every result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Phrase slop used when matching against the broad field.
    #[serde(default = "default_slop")]
    pub slop: u32,

    /// Highlight tags and fragment size.
    #[serde(default)]
    pub highlight: HighlightConfig,

    /// Maximum buckets requested per facet aggregation.
    #[serde(default = "default_aggregation_size")]
    pub aggregation_size: usize,

    /// Settings for canonical documents.
    #[serde(default = "default_documents_profile")]
    pub documents: TypeProfile,

    /// Settings for collections.
    #[serde(default = "default_collections_profile")]
    pub collections: TypeProfile,
}

fn default_slop() -> u32 {
    10
}

fn default_aggregation_size() -> usize {
    10000
}

fn default_documents_profile() -> TypeProfile {
    TypeProfile {
        index: "text".to_string(),
        exact_field: "exact".to_string(),
        broad_field: "naive_lemmatizer".to_string(),
        page_size: 50,
        sorts: vec![
            SortOption::new(
                SortType::Relevance,
                SortSpec::ScoreBlended {
                    score_field: "pagesheetrank".to_string(),
                    missing_value: 0.04,
                },
            ),
            SortOption::new(
                SortType::Chronological,
                SortSpec::Fields {
                    fields: vec![
                        SortField::new("comp_date", SortDirection::Asc),
                        SortField::new("order", SortDirection::Asc),
                    ],
                },
            ),
        ],
    }
}

fn default_collections_profile() -> TypeProfile {
    TypeProfile {
        index: "sheet".to_string(),
        exact_field: "content".to_string(),
        broad_field: "content".to_string(),
        page_size: 20,
        sorts: vec![
            SortOption::new(
                SortType::Relevance,
                SortSpec::Fields {
                    fields: vec![SortField::new("_score", SortDirection::Desc)],
                },
            ),
            SortOption::new(
                SortType::DateCreated,
                SortSpec::Fields {
                    fields: vec![SortField::new("dateCreated", SortDirection::Desc)],
                },
            ),
        ],
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            slop: default_slop(),
            highlight: HighlightConfig::default(),
            aggregation_size: default_aggregation_size(),
            documents: default_documents_profile(),
            collections: default_collections_profile(),
        }
    }
}

impl QueryConfig {
    /// Settings for one result type.
    pub fn profile(&self, result_type: ResultType) -> &TypeProfile {
        match result_type {
            ResultType::Documents => &self.documents,
            ResultType::Collections => &self.collections,
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| Error::config(format!("invalid query config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        Self::from_toml_str(&content)
    }

    /// Rejects settings no request could be built from.
    pub fn validate(&self) -> Result<()> {
        for result_type in ResultType::ALL {
            let profile = self.profile(result_type);
            if profile.page_size == 0 {
                return Err(Error::config(format!("{result_type}: page_size must be positive")));
            }
            if profile.sorts.is_empty() {
                return Err(Error::config(format!("{result_type}: at least one sort is required")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_config_default() {
        let config = QueryConfig::default();
        assert_eq!(config.slop, 10);
        assert_eq!(config.aggregation_size, 10000);
        assert_eq!(config.highlight.fragment_size, 200);
        assert_eq!(config.documents.page_size, 50);
        assert_eq!(config.collections.page_size, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_sorts() {
        let config = QueryConfig::default();
        let Some(SortSpec::ScoreBlended {
            score_field,
            missing_value,
        }) = config.documents.sort(SortType::Relevance)
        else {
            unreachable!("Expected score-blended relevance sort");
        };
        assert_eq!(score_field, "pagesheetrank");
        assert!((missing_value - 0.04).abs() < f64::EPSILON);

        assert!(config.documents.sort(SortType::DateCreated).is_none());
        assert_eq!(
            config.collections.sort_types(),
            vec![SortType::Relevance, SortType::DateCreated]
        );
    }

    #[test]
    fn test_profile_lookup() {
        let config = QueryConfig::default();
        assert_eq!(config.profile(ResultType::Documents).exact_field, "exact");
        assert_eq!(config.profile(ResultType::Collections).index, "sheet");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = QueryConfig::from_toml_str(
            r#"
            slop = 4

            [highlight]
            pre_tag = "<em>"
            post_tag = "</em>"
            "#,
        )
        .unwrap();
        assert_eq!(config.slop, 4);
        assert_eq!(config.highlight.pre_tag, "<em>");
        assert_eq!(config.highlight.fragment_size, 200);
        assert_eq!(config.documents.broad_field, "naive_lemmatizer");
    }

    #[test]
    fn test_toml_profile_override() {
        let config = QueryConfig::from_toml_str(
            r#"
            [collections]
            index = "sheets-v2"
            exact_field = "content.exact"
            broad_field = "content"
            page_size = 10

            [[collections.sorts]]
            sort_type = "date_created"
            spec = { fields = [{ name = "dateCreated", dir = "desc" }] }
            "#,
        )
        .unwrap();
        assert_eq!(config.collections.index, "sheets-v2");
        assert_eq!(config.collections.sort_types(), vec![SortType::DateCreated]);
        assert_eq!(config.documents.page_size, 50);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let err = QueryConfig::from_toml_str(
            r#"
            [documents]
            index = "text"
            exact_field = "exact"
            broad_field = "naive_lemmatizer"
            page_size = 0
            sorts = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = QueryConfig::load("/nonexistent/query.toml").unwrap_err();
        assert!(matches!(err, Error::IoWithPath { .. }));
    }
}
