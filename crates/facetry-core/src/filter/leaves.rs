//! Lazy leaf traversal with optional title matching.

use super::{FilterForest, FilterNode, NodeId};

/// Depth-first iterator over the leaves of one or more trees.
///
/// Each call to [`FilterForest::leaves`] starts a fresh walk.
#[derive(Debug, Clone)]
pub struct Leaves<'a> {
    forest: &'a FilterForest,
    /// Pending nodes, each with whether an ancestor already matched.
    stack: Vec<(NodeId, bool)>,
    needle: Option<String>,
}

impl<'a> Leaves<'a> {
    pub(super) fn new(
        forest: &'a FilterForest,
        starts: Vec<NodeId>,
        text_filter: Option<&str>,
    ) -> Self {
        let needle = text_filter
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let stack = starts
            .into_iter()
            .rev()
            .map(|id| {
                let inherited = match &needle {
                    Some(needle) => ancestors_match(forest, id, needle),
                    None => true,
                };
                (id, inherited)
            })
            .collect();

        Self {
            forest,
            stack,
            needle,
        }
    }
}

impl<'a> Iterator for Leaves<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some((id, inherited)) = self.stack.pop() {
            let node = self.forest.node(id);
            let matched = inherited
                || self
                    .needle
                    .as_deref()
                    .is_some_and(|needle| title_matches(node, needle));
            if node.is_leaf() {
                if matched {
                    return Some(id);
                }
                continue;
            }
            self.stack
                .extend(node.children().iter().rev().map(|&child| (child, matched)));
        }
        None
    }
}

fn ancestors_match(forest: &FilterForest, id: NodeId, needle: &str) -> bool {
    let mut current = forest.parent(id);
    while let Some(ancestor) = current {
        if title_matches(forest.node(ancestor), needle) {
            return true;
        }
        current = forest.parent(ancestor);
    }
    false
}

fn title_matches(node: &FilterNode, needle: &str) -> bool {
    starts_a_word(&node.title().to_lowercase(), needle)
        || starts_a_word(&node.localized_title().to_lowercase(), needle)
}

/// True when `needle` occurs in `haystack` at the start of a word.
fn starts_a_word(haystack: &str, needle: &str) -> bool {
    let mut previous: Option<char> = None;
    for (i, c) in haystack.char_indices() {
        let at_boundary = previous.is_none_or(|p| !p.is_alphanumeric());
        if at_boundary && haystack[i..].starts_with(needle) {
            return true;
        }
        previous = Some(c);
    }
    false
}
