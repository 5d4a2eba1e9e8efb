//! Static catalog metadata.
//!
//! The catalog is the category → sub-category → text hierarchy that path
//! facets are laid over, plus a term table giving display titles for flat
//! facet keys. It is loaded once and shared read-only.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One entry of the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogNode {
    /// A category with nested entries.
    Category {
        /// Category name; also its path segment.
        category: String,
        /// Localized category name.
        #[serde(rename = "localizedCategory", alias = "heCategory", default)]
        localized_category: String,
        /// Nested categories and texts.
        #[serde(default)]
        contents: Vec<CatalogNode>,
    },
    /// A single text; always a leaf.
    Text {
        /// Text title; also its path segment.
        title: String,
        /// Localized title.
        #[serde(rename = "localizedTitle", alias = "heTitle", default)]
        localized_title: String,
    },
}

impl CatalogNode {
    /// Creates a category.
    pub fn category(name: impl Into<String>, contents: Vec<CatalogNode>) -> Self {
        CatalogNode::Category {
            category: name.into(),
            localized_category: String::new(),
            contents,
        }
    }

    /// Creates a text.
    pub fn text(title: impl Into<String>) -> Self {
        CatalogNode::Text {
            title: title.into(),
            localized_title: String::new(),
        }
    }

    /// Sets the localized name of either variant.
    pub fn localized(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            CatalogNode::Category {
                localized_category, ..
            } => *localized_category = name.into(),
            CatalogNode::Text {
                localized_title, ..
            } => *localized_title = name.into(),
        }
        self
    }

    /// Path segment and display title.
    pub fn name(&self) -> &str {
        match self {
            CatalogNode::Category { category, .. } => category,
            CatalogNode::Text { title, .. } => title,
        }
    }

    /// Localized display title.
    pub fn localized_name(&self) -> &str {
        match self {
            CatalogNode::Category {
                localized_category, ..
            } => localized_category,
            CatalogNode::Text {
                localized_title, ..
            } => localized_title,
        }
    }

    /// Nested entries; empty for texts.
    pub fn contents(&self) -> &[CatalogNode] {
        match self {
            CatalogNode::Category { contents, .. } => contents,
            CatalogNode::Text { .. } => &[],
        }
    }
}

/// Display labels for a flat facet key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermLabel {
    /// Display title.
    pub title: String,
    /// Localized display title.
    #[serde(rename = "localizedTitle", alias = "heTitle", default)]
    pub localized_title: String,
}

/// The catalog hierarchy plus the flat-facet term table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Top-level categories, in display order.
    #[serde(default)]
    pub categories: Vec<CatalogNode>,
    /// Labels for topic and collection keys.
    #[serde(default)]
    pub terms: HashMap<String, TermLabel>,
}

impl Catalog {
    /// Creates a catalog from top-level categories and no terms.
    pub fn new(categories: Vec<CatalogNode>) -> Self {
        Self {
            categories,
            terms: HashMap::new(),
        }
    }

    /// Adds a term label.
    pub fn with_term(
        mut self,
        key: impl Into<String>,
        title: impl Into<String>,
        localized: impl Into<String>,
    ) -> Self {
        self.terms.insert(
            key.into(),
            TermLabel {
                title: title.into(),
                localized_title: localized.into(),
            },
        );
        self
    }

    /// Parses a catalog from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a catalog file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let catalog = Self::from_json_str(&json)?;
        log::debug!(
            "loaded catalog from {} ({} top-level categories, {} terms)",
            path.display(),
            catalog.categories.len(),
            catalog.terms.len()
        );
        Ok(catalog)
    }

    /// Label for a flat facet key.
    pub fn term(&self, key: &str) -> Option<&TermLabel> {
        self.terms.get(key)
    }
}
