//! Tri-state facet filter trees.
//!
//! A [`FilterForest`] is an arena of [`FilterNode`]s. Children are owned by
//! the arena and listed in order on their parent; the parent link is a plain
//! [`NodeId`] used only to push re-derived selection states upward. Because
//! nothing owns upward, a forest can be cloned, compared and serialized
//! without walking back into a cycle: the serialized form is a list of nested
//! [`FilterNodeView`]s with no parent field at all.
//!
//! # Selection rules
//!
//! - A leaf is only ever `Selected` or `Unselected`.
//! - A parent is `Selected` iff all children are, `Unselected` iff none are,
//!   and `Partial` otherwise. [`FilterForest::derive_state`] re-evaluates
//!   this after every child mutation and walks upward while states change.
//! - Selecting or unselecting a node forces its whole subtree to match.
//!
//! # Example
//!
//! ```rust
//! use facetry_core::facet::FacetType;
//! use facetry_core::filter::{FilterForest, FilterNode, SelectionState};
//!
//! let mut forest = FilterForest::new();
//! let tanakh = forest.push_root(FilterNode::new(FacetType::Path, "Tanakh", "Tanakh"));
//! let torah = forest.push_child(
//!     tanakh,
//!     FilterNode::new(FacetType::Path, "Tanakh/Torah", "Torah"),
//! );
//! forest.push_child(tanakh, FilterNode::new(FacetType::Path, "Tanakh/Writings", "Writings"));
//!
//! forest.set_selected(torah, true);
//! assert_eq!(forest.node(tanakh).selection(), SelectionState::Partial);
//! assert_eq!(forest.applied_keys(), vec!["Tanakh/Torah"]);
//! ```

mod leaves;
mod proptests;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::facet::FacetType;

pub use leaves::Leaves;

// ============================================================================
// Node types
// ============================================================================

/// Index of a node inside its [`FilterForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Tri-state selection of a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    /// Neither this node nor any descendant is applied.
    #[default]
    Unselected,
    /// This node and every descendant are applied.
    Selected,
    /// Some, but not all, descendants are applied.
    Partial,
}

/// One facet value: a category, sub-category, text, topic or collection.
#[derive(Debug, Clone)]
pub struct FilterNode {
    title: String,
    localized_title: String,
    doc_count: u64,
    aggregation_key: String,
    facet_type: FacetType,
    selection: SelectionState,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl FilterNode {
    /// Creates an unselected, zero-count node.
    pub fn new(
        facet_type: FacetType,
        aggregation_key: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            localized_title: String::new(),
            doc_count: 0,
            aggregation_key: aggregation_key.into(),
            facet_type,
            selection: SelectionState::Unselected,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Sets the localized display title.
    pub fn with_localized_title(mut self, title: impl Into<String>) -> Self {
        self.localized_title = title.into();
        self
    }

    /// Sets the document count.
    pub fn with_doc_count(mut self, doc_count: u64) -> Self {
        self.doc_count = doc_count;
        self
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Localized display title (empty when unknown).
    pub fn localized_title(&self) -> &str {
        &self.localized_title
    }

    /// Number of matching documents under this node for the current query.
    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    /// `/`-delimited key identifying this node within its facet.
    pub fn aggregation_key(&self) -> &str {
        &self.aggregation_key
    }

    /// Facet family this node belongs to.
    pub fn facet_type(&self) -> FacetType {
        self.facet_type
    }

    /// Current selection state.
    pub fn selection(&self) -> SelectionState {
        self.selection
    }

    /// Child ids, in display order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Parent id; `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// True when the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True when the node is fully selected.
    pub fn is_selected(&self) -> bool {
        self.selection == SelectionState::Selected
    }
}

// ============================================================================
// FilterForest
// ============================================================================

/// An ordered list of filter trees plus a registry of every node by key.
///
/// The registry is keyed by `(facet type, aggregation key)` and always holds
/// exactly the nodes reachable from [`roots`](Self::roots); it is updated by
/// every operation that adds nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<FilterNodeView>", from = "Vec<FilterNodeView>")]
pub struct FilterForest {
    nodes: Vec<FilterNode>,
    roots: Vec<NodeId>,
    registry: HashMap<(FacetType, String), NodeId>,
}

impl FilterForest {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new root tree.
    pub fn push_root(&mut self, node: FilterNode) -> NodeId {
        let id = self.insert(node, None);
        self.roots.push(id);
        id
    }

    /// Appends `node` as the last child of `parent`.
    pub fn push_child(&mut self, parent: NodeId, node: FilterNode) -> NodeId {
        let id = self.insert(node, Some(parent));
        self.nodes[parent.0].children.push(id);
        id
    }

    fn insert(&mut self, mut node: FilterNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = parent;
        node.children.clear();
        let key = (node.facet_type, node.aggregation_key.clone());
        if self.registry.insert(key, id).is_some() {
            log::warn!(
                "duplicate filter key '{}' ({}) in filter forest",
                node.aggregation_key,
                node.facet_type
            );
        }
        self.nodes.push(node);
        id
    }

    /// Returns the node for `id`.
    ///
    /// Ids are only handed out by this forest, so an id from another forest
    /// is a caller bug and panics like an out-of-range slice index.
    pub fn node(&self, id: NodeId) -> &FilterNode {
        &self.nodes[id.0]
    }

    /// Root ids, in display order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of `id`.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Parent of `id`.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Looks a node up by facet and aggregation key.
    pub fn find(&self, facet: FacetType, key: &str) -> Option<NodeId> {
        self.registry.get(&(facet, key.to_string())).copied()
    }

    /// True when `(facet, key)` resolves to a node.
    pub fn contains(&self, facet: FacetType, key: &str) -> bool {
        self.find(facet, key).is_some()
    }

    /// Number of nodes in every tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the forest has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates every node with its id.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &FilterNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Sets the document count of a single node.
    pub fn set_doc_count(&mut self, id: NodeId, doc_count: u64) {
        self.nodes[id.0].doc_count = doc_count;
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Selects `id` and its whole subtree.
    ///
    /// With `propagate_up`, ancestors re-derive their state afterwards. Pass
    /// `false` only when the caller is itself driving propagation.
    pub fn set_selected(&mut self, id: NodeId, propagate_up: bool) {
        self.force_subtree(id, SelectionState::Selected);
        if propagate_up {
            self.propagate_from(id);
        }
    }

    /// Unselects `id` and its whole subtree.
    pub fn set_unselected(&mut self, id: NodeId, propagate_up: bool) {
        self.force_subtree(id, SelectionState::Unselected);
        if propagate_up {
            self.propagate_from(id);
        }
    }

    /// Marks `id` partial without touching its children, then propagates up.
    ///
    /// Leaves cannot be partial; the call is ignored for them.
    pub fn set_partial(&mut self, id: NodeId) {
        if self.nodes[id.0].is_leaf() {
            log::debug!(
                "ignoring partial state on leaf '{}'",
                self.nodes[id.0].aggregation_key
            );
            return;
        }
        self.nodes[id.0].selection = SelectionState::Partial;
        self.propagate_from(id);
    }

    /// Flips `id`: unselected nodes become selected, anything else unselected.
    pub fn toggle(&mut self, id: NodeId) {
        if self.nodes[id.0].selection == SelectionState::Unselected {
            self.set_selected(id, true);
        } else {
            self.set_unselected(id, true);
        }
    }

    /// Recomputes `id`'s state from its immediate children.
    ///
    /// If the state changes, the parent re-derives too, and so on up to the
    /// root. Leaves keep whatever state they have.
    pub fn derive_state(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(derived) = self.derived_state(id) else {
                return;
            };
            if derived == self.nodes[id.0].selection {
                return;
            }
            self.nodes[id.0].selection = derived;
            current = self.nodes[id.0].parent;
        }
    }

    /// The state `id` should have given its children, or `None` for a leaf.
    fn derived_state(&self, id: NodeId) -> Option<SelectionState> {
        let children = &self.nodes[id.0].children;
        if children.is_empty() {
            return None;
        }
        let selected = children
            .iter()
            .filter(|c| self.nodes[c.0].selection == SelectionState::Selected)
            .count();
        let unselected = children
            .iter()
            .filter(|c| self.nodes[c.0].selection == SelectionState::Unselected)
            .count();
        Some(if selected == children.len() {
            SelectionState::Selected
        } else if unselected == children.len() {
            SelectionState::Unselected
        } else {
            SelectionState::Partial
        })
    }

    fn propagate_from(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent {
            self.derive_state(parent);
        }
    }

    fn force_subtree(&mut self, id: NodeId, state: SelectionState) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.selection = state;
            stack.extend(node.children.iter().copied());
        }
    }

    // ------------------------------------------------------------------------
    // Applied filters
    // ------------------------------------------------------------------------

    /// Applied nodes under `id`, most compact first.
    ///
    /// A fully selected node stands for all its descendants, so recursion
    /// stops there; partial nodes recurse; unselected nodes contribute
    /// nothing.
    pub fn applied_nodes(&self, id: NodeId) -> Vec<NodeId> {
        let mut applied = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current.0];
            match node.selection {
                SelectionState::Selected => applied.push(current),
                SelectionState::Unselected => {}
                SelectionState::Partial => stack.extend(node.children.iter().rev().copied()),
            }
        }
        applied
    }

    /// Applied aggregation keys under `id`.
    pub fn applied_filter_keys(&self, id: NodeId) -> Vec<&str> {
        self.applied_nodes(id)
            .into_iter()
            .map(|n| self.nodes[n.0].aggregation_key.as_str())
            .collect()
    }

    /// Applied `(key, facet)` pairs across every root, in root order.
    pub fn applied_filters(&self) -> Vec<(String, FacetType)> {
        self.roots
            .iter()
            .flat_map(|&root| self.applied_nodes(root))
            .map(|n| {
                let node = &self.nodes[n.0];
                (node.aggregation_key.clone(), node.facet_type)
            })
            .collect()
    }

    /// Applied keys across every root.
    pub fn applied_keys(&self) -> Vec<&str> {
        self.roots
            .iter()
            .flat_map(|&root| self.applied_filter_keys(root))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Leaves
    // ------------------------------------------------------------------------

    /// Lazily walks the leaves under `id`.
    ///
    /// With a `text_filter`, only leaves whose own title, or some ancestor's
    /// title, has a word starting with the filter (case-insensitively) are
    /// yielded.
    pub fn leaves<'a>(&'a self, id: NodeId, text_filter: Option<&str>) -> Leaves<'a> {
        Leaves::new(self, vec![id], text_filter)
    }

    /// Lazily walks the leaves of every root.
    pub fn all_leaves<'a>(&'a self, text_filter: Option<&str>) -> Leaves<'a> {
        Leaves::new(self, self.roots.clone(), text_filter)
    }

    // ------------------------------------------------------------------------
    // Cloning and merging
    // ------------------------------------------------------------------------

    /// Deep-copies `other`'s subtree at `root` into this forest as a new root.
    pub fn graft(&mut self, other: &FilterForest, root: NodeId) -> NodeId {
        let new_root = self.push_root(other.detached_copy(root));
        let mut stack = vec![(root, new_root)];
        while let Some((source, target)) = stack.pop() {
            for &child in other.children(source) {
                let copied = self.push_child(target, other.detached_copy(child));
                stack.push((child, copied));
            }
        }
        new_root
    }

    /// Deep clone of the subtree at `id` as a standalone forest.
    ///
    /// The copy has no link back to `id`'s ancestors.
    pub fn subtree(&self, id: NodeId) -> FilterForest {
        let mut forest = FilterForest::new();
        forest.graft(self, id);
        forest
    }

    fn detached_copy(&self, id: NodeId) -> FilterNode {
        let mut node = self.nodes[id.0].clone();
        node.children = Vec::new();
        node.parent = None;
        node
    }

    /// Combines freshly built trees with the untouched part of `previous`.
    ///
    /// Roots of `refreshed` replace every previous root whose facet type is
    /// in `refreshed_facets`; previous roots of other facet types are kept
    /// and appended after them.
    pub fn merged(
        refreshed: &FilterForest,
        previous: &FilterForest,
        refreshed_facets: &[FacetType],
    ) -> FilterForest {
        let mut merged = refreshed.clone();
        for &root in previous.roots() {
            if !refreshed_facets.contains(&previous.node(root).facet_type) {
                merged.graft(previous, root);
            }
        }
        merged
    }

    /// Root trees as nested views, parents omitted.
    pub fn to_views(&self) -> Vec<FilterNodeView> {
        self.roots.iter().map(|&root| self.view(root)).collect()
    }

    fn view(&self, id: NodeId) -> FilterNodeView {
        let node = &self.nodes[id.0];
        FilterNodeView {
            title: node.title.clone(),
            localized_title: node.localized_title.clone(),
            doc_count: node.doc_count,
            aggregation_key: node.aggregation_key.clone(),
            facet_type: node.facet_type,
            selection: node.selection,
            children: node.children.iter().map(|&c| self.view(c)).collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------------

    /// Checks the structural invariants of the forest.
    ///
    /// A failure here is a bug in whatever mutated the forest, not a
    /// condition callers are expected to recover from.
    pub fn validate(&self) -> Result<()> {
        let mut reachable = 0usize;
        let mut stack: Vec<(NodeId, Option<NodeId>)> =
            self.roots.iter().map(|&root| (root, None)).collect();

        while let Some((id, expected_parent)) = stack.pop() {
            reachable += 1;
            let node = &self.nodes[id.0];
            if node.parent != expected_parent {
                return Err(Error::invariant(format!(
                    "node '{}' has a stale parent link",
                    node.aggregation_key
                )));
            }
            match self.derived_state(id) {
                None if node.selection == SelectionState::Partial => {
                    return Err(Error::invariant(format!(
                        "leaf '{}' is partial",
                        node.aggregation_key
                    )));
                }
                Some(derived) if derived != node.selection => {
                    return Err(Error::invariant(format!(
                        "node '{}' is {:?} but its children imply {:?}",
                        node.aggregation_key, node.selection, derived
                    )));
                }
                _ => {}
            }
            if self.find(node.facet_type, &node.aggregation_key) != Some(id) {
                return Err(Error::invariant(format!(
                    "node '{}' is missing from the registry",
                    node.aggregation_key
                )));
            }
            stack.extend(node.children.iter().map(|&c| (c, Some(id))));
        }

        if reachable != self.nodes.len() || self.registry.len() != self.nodes.len() {
            return Err(Error::invariant(format!(
                "{} nodes stored, {} reachable, {} registered",
                self.nodes.len(),
                reachable,
                self.registry.len()
            )));
        }
        Ok(())
    }
}

impl PartialEq for FilterForest {
    fn eq(&self, other: &Self) -> bool {
        self.to_views() == other.to_views()
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// A filter node with its children inlined and no parent link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterNodeView {
    /// Display title.
    pub title: String,
    /// Localized display title.
    #[serde(default)]
    pub localized_title: String,
    /// Document count.
    #[serde(default)]
    pub doc_count: u64,
    /// Aggregation key.
    pub aggregation_key: String,
    /// Facet family.
    pub facet_type: FacetType,
    /// Selection state.
    #[serde(default)]
    pub selection: SelectionState,
    /// Children in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FilterNodeView>,
}

impl FilterNodeView {
    fn to_node(&self) -> FilterNode {
        let mut node =
            FilterNode::new(self.facet_type, self.aggregation_key.clone(), self.title.clone())
                .with_localized_title(self.localized_title.clone())
            .with_doc_count(self.doc_count);
        node.selection = self.selection;
        node
    }
}

impl From<FilterForest> for Vec<FilterNodeView> {
    fn from(forest: FilterForest) -> Self {
        forest.to_views()
    }
}

impl From<Vec<FilterNodeView>> for FilterForest {
    fn from(views: Vec<FilterNodeView>) -> Self {
        let mut forest = FilterForest::new();
        for view in &views {
            let root = forest.push_root(view.to_node());
            let mut stack = vec![(view, root)];
            while let Some((view, id)) = stack.pop() {
                for child in &view.children {
                    let child_id = forest.push_child(id, child.to_node());
                    stack.push((child, child_id));
                }
            }
        }
        forest
    }
}

// ============================================================================
// Tests
// ============================================================================
