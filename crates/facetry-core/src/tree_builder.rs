//! Builds filter forests from catalog metadata and aggregation buckets.
//!
//! Path facets are laid over the static [`Catalog`]: a catalog branch only
//! appears when the backend reported documents under it (or a filter on it
//! is currently applied), counts come from the buckets, and titles come from
//! the catalog. Flat facets become one root per bucket, labelled from the
//! catalog's term table.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogNode};
use crate::facet::FacetType;
use crate::filter::{FilterForest, FilterNode, NodeId};

/// A `(key, count)` pair reported by the backend for one facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationBucket {
    /// Facet key; `/`-delimited for path facets.
    pub key: String,
    /// Matching documents under the current query.
    pub doc_count: u64,
}

impl AggregationBucket {
    /// Creates a bucket.
    pub fn new(key: impl Into<String>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
        }
    }
}

/// Output of a build: the forest plus applied keys that did not resolve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltFilters {
    /// Freshly built trees with applied selections replayed.
    pub forest: FilterForest,
    /// Applied keys with no node in `forest`.
    pub orphans: Vec<String>,
}

/// Folds the legacy commentary sub-trees into one node per top-level
/// category.
///
/// Commentary documents are indexed under two separate path roots
/// (`Commentary/<category>/...` and `Commentary2/<category>/...`). For every
/// top-level catalog category that has commentary hits, a synthetic root
/// titled `"<category> Commentary"` is placed right after the category's own
/// root. Its key is `Commentary/<category>`; [`CommentaryRule::expand`] maps
/// it back to both backend paths when filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentaryRule {
    /// Path root of the primary commentary sub-tree.
    pub primary: String,
    /// Path root of the secondary commentary sub-tree.
    pub secondary: String,
    /// Appended to the category title.
    pub title_suffix: String,
    /// Prepended to the localized category title.
    pub localized_prefix: String,
}

impl Default for CommentaryRule {
    fn default() -> Self {
        Self {
            primary: "Commentary".to_string(),
            secondary: "Commentary2".to_string(),
            title_suffix: " Commentary".to_string(),
            localized_prefix: "מפרשי ".to_string(),
        }
    }
}

impl CommentaryRule {
    /// Key of the synthetic node for a top-level category.
    pub fn synthetic_key(&self, category: &str) -> String {
        format!("{}/{}", self.primary, category)
    }

    /// Backend path keys a filter key stands for.
    ///
    /// Synthetic keys expand to both commentary roots; everything else maps
    /// to itself.
    pub fn expand(&self, key: &str) -> Vec<String> {
        match key.strip_prefix(&self.primary).and_then(|rest| rest.strip_prefix('/')) {
            Some(category) if !category.is_empty() && !category.contains('/') => {
                vec![key.to_string(), format!("{}/{}", self.secondary, category)]
            }
            _ => vec![key.to_string()],
        }
    }
}

// ============================================================================
// Raw count map
// ============================================================================

#[derive(Debug, Default)]
struct RawNode {
    count: u64,
    children: HashMap<String, RawNode>,
}

impl RawNode {
    fn insert(&mut self, key: &str, count: u64) {
        let mut node = self;
        for segment in key.split('/') {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.count = count;
    }

    /// Fills zero counts with the sum of their children, bottom-up.
    fn fill_counts(&mut self) -> u64 {
        let sum: u64 = self.children.values_mut().map(RawNode::fill_counts).sum();
        if self.count == 0 {
            self.count = sum;
        }
        self.count
    }

    fn get(&self, segment: &str) -> Option<&RawNode> {
        self.children.get(segment)
    }
}

// ============================================================================
// FilterTreeBuilder
// ============================================================================

/// Builds [`FilterForest`]s for one facet type at a time.
#[derive(Debug, Clone)]
pub struct FilterTreeBuilder {
    catalog: Arc<Catalog>,
    commentary: Option<CommentaryRule>,
}

impl FilterTreeBuilder {
    /// Creates a builder over a shared catalog.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            commentary: None,
        }
    }

    /// Enables the commentary folding rule for path facets.
    pub fn with_commentary(mut self, rule: CommentaryRule) -> Self {
        self.commentary = Some(rule);
        self
    }

    /// The catalog trees are laid over.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The commentary rule, if enabled.
    pub fn commentary(&self) -> Option<&CommentaryRule> {
        self.commentary.as_ref()
    }

    /// Builds the trees for one facet type.
    ///
    /// `applied` holds the currently applied keys of this facet type. They
    /// are kept in the tree with zero counts when the buckets lack them and
    /// re-selected afterwards; keys that still do not resolve are returned
    /// as orphans.
    pub fn build(
        &self,
        facet: FacetType,
        buckets: &[AggregationBucket],
        applied: &[String],
    ) -> BuiltFilters {
        let built = if facet.is_hierarchical() {
            self.build_path(facet, buckets, applied)
        } else {
            self.build_flat(facet, buckets, applied)
        };
        debug_assert!(built.forest.validate().is_ok());
        if !built.orphans.is_empty() {
            log::warn!(
                "{} applied {} filter(s) no longer in the tree: {:?}",
                built.orphans.len(),
                facet,
                built.orphans
            );
        }
        log::debug!(
            "built {} filter forest: {} roots, {} nodes from {} buckets",
            facet,
            built.forest.roots().len(),
            built.forest.len(),
            buckets.len()
        );
        built
    }

    /// Builds several facet types and concatenates their roots in order.
    ///
    /// `applied` pairs each applied key with its facet type; only the keys of
    /// the facet being built are replayed onto it.
    pub fn build_all(
        &self,
        aggregations: &[(FacetType, Vec<AggregationBucket>)],
        applied: &[(String, FacetType)],
    ) -> BuiltFilters {
        let mut combined = BuiltFilters::default();
        for (facet, buckets) in aggregations {
            let keys: Vec<String> = applied
                .iter()
                .filter(|(_, f)| f == facet)
                .map(|(key, _)| key.clone())
                .collect();
            let built = self.build(*facet, buckets, &keys);
            for &root in built.forest.roots() {
                combined.forest.graft(&built.forest, root);
            }
            combined.orphans.extend(built.orphans);
        }
        combined
    }

    fn build_path(
        &self,
        facet: FacetType,
        buckets: &[AggregationBucket],
        applied: &[String],
    ) -> BuiltFilters {
        let mut raw = RawNode::default();
        for key in applied {
            for expanded in self.expand(key) {
                raw.insert(&expanded, 0);
            }
        }
        for bucket in buckets {
            raw.insert(&bucket.key, bucket.doc_count);
        }
        raw.fill_counts();

        let mut forest = FilterForest::new();
        for category in &self.catalog.categories {
            let Some(counts) = raw.get(category.name()) else {
                self.push_commentary(&mut forest, facet, &raw, applied, category);
                continue;
            };
            let root = forest.push_root(path_node(facet, category, category.name(), counts.count));
            walk_catalog(&mut forest, facet, root, category, category.name(), counts);
            self.push_commentary(&mut forest, facet, &raw, applied, category);
        }

        let orphans = replay_selection(&mut forest, facet, applied);
        BuiltFilters { forest, orphans }
    }

    fn build_flat(
        &self,
        facet: FacetType,
        buckets: &[AggregationBucket],
        applied: &[String],
    ) -> BuiltFilters {
        let mut forest = FilterForest::new();
        for bucket in buckets {
            if forest.contains(facet, &bucket.key) {
                continue;
            }
            forest.push_root(self.term_node(facet, &bucket.key).with_doc_count(bucket.doc_count));
        }
        for key in applied {
            if !forest.contains(facet, key) {
                forest.push_root(self.term_node(facet, key));
            }
        }

        let orphans = replay_selection(&mut forest, facet, applied);
        BuiltFilters { forest, orphans }
    }

    fn term_node(&self, facet: FacetType, key: &str) -> FilterNode {
        match self.catalog.term(key) {
            Some(label) => FilterNode::new(facet, key, label.title.clone())
                .with_localized_title(label.localized_title.clone()),
            None => FilterNode::new(facet, key, key),
        }
    }

    fn expand(&self, key: &str) -> Vec<String> {
        match &self.commentary {
            Some(rule) => rule.expand(key),
            None => vec![key.to_string()],
        }
    }

    fn push_commentary(
        &self,
        forest: &mut FilterForest,
        facet: FacetType,
        raw: &RawNode,
        applied: &[String],
        category: &CatalogNode,
    ) {
        let Some(rule) = &self.commentary else {
            return;
        };
        let name = category.name();
        let count = [&rule.primary, &rule.secondary]
            .into_iter()
            .filter_map(|root| raw.get(root).and_then(|r| r.get(name)))
            .map(|node| node.count)
            .sum::<u64>();
        let key = rule.synthetic_key(name);
        if count == 0 && !applied.contains(&key) {
            return;
        }
        let localized = if category.localized_name().is_empty() {
            String::new()
        } else {
            format!("{}{}", rule.localized_prefix, category.localized_name())
        };
        forest.push_root(
            FilterNode::new(facet, key, format!("{}{}", name, rule.title_suffix))
                .with_localized_title(localized)
                .with_doc_count(count),
        );
    }
}

fn path_node(facet: FacetType, entry: &CatalogNode, key: &str, count: u64) -> FilterNode {
    FilterNode::new(facet, key, entry.name())
        .with_localized_title(entry.localized_name())
        .with_doc_count(count)
}

/// Adds `entry`'s catalog children under `parent`, pruning branches with no
/// counts.
fn walk_catalog(
    forest: &mut FilterForest,
    facet: FacetType,
    parent: NodeId,
    entry: &CatalogNode,
    path: &str,
    counts: &RawNode,
) {
    for child in entry.contents() {
        let Some(child_counts) = counts.get(child.name()) else {
            continue;
        };
        let child_path = format!("{}/{}", path, child.name());
        let id =
            forest.push_child(parent, path_node(facet, child, &child_path, child_counts.count));
        walk_catalog(forest, facet, id, child, &child_path, child_counts);
    }
}

/// Selects every applied key found in `forest` and returns the rest.
fn replay_selection(
    forest: &mut FilterForest,
    facet: FacetType,
    applied: &[String],
) -> Vec<String> {
    let mut orphans = Vec::new();
    for key in applied {
        match forest.find(facet, key) {
            Some(id) => forest.set_selected(id, true),
            None => orphans.push(key.clone()),
        }
    }
    orphans
}

#[cfg(test)]
impl RawNode {
    fn count_at(&self, key: &str) -> Option<u64> {
        key.split('/')
            .try_fold(self, |node, segment| node.get(segment))
            .map(|n| n.count)
    }
}

// ============================================================================
// Tests
// ============================================================================
