//! Property-based tests for filter trees.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use proptest::sample::Index;

    use crate::facet::FacetType;
    use crate::filter::{FilterForest, FilterNode, NodeId, SelectionState};

    /// Builds a forest where node `i` hangs under `parents[i - 1] % i`, or
    /// starts a new root when that choice is `None`.
    fn build(parents: &[Option<Index>]) -> (FilterForest, Vec<NodeId>) {
        let mut forest = FilterForest::new();
        let mut ids = vec![forest.push_root(FilterNode::new(FacetType::Path, "n0", "n0"))];
        for (offset, parent) in parents.iter().enumerate() {
            let i = offset + 1;
            let node = FilterNode::new(FacetType::Path, format!("n{i}"), format!("n{i}"));
            let id = match parent {
                Some(parent) => forest.push_child(ids[parent.index(i)], node),
                None => forest.push_root(node),
            };
            ids.push(id);
        }
        (forest, ids)
    }

    fn selected_leaves(forest: &FilterForest) -> BTreeSet<NodeId> {
        forest
            .all_leaves(None)
            .filter(|&id| forest.node(id).is_selected())
            .collect()
    }

    fn shapes() -> impl Strategy<Value = Vec<Option<Index>>> {
        prop::collection::vec(prop::option::weighted(0.85, any::<Index>()), 0..40)
    }

    proptest! {
        #[test]
        fn test_tri_state_invariant_holds_after_toggles(
            parents in shapes(),
            toggles in prop::collection::vec(any::<Index>(), 0..30),
        ) {
            let (mut forest, ids) = build(&parents);
            forest.validate().unwrap();
            for toggle in toggles {
                forest.toggle(ids[toggle.index(ids.len())]);
                forest.validate().unwrap();
            }
        }

        #[test]
        fn test_leaves_are_never_partial(
            parents in shapes(),
            toggles in prop::collection::vec(any::<Index>(), 0..30),
        ) {
            let (mut forest, ids) = build(&parents);
            for toggle in toggles {
                forest.toggle(ids[toggle.index(ids.len())]);
            }
            for leaf in forest.all_leaves(None) {
                prop_assert_ne!(forest.node(leaf).selection(), SelectionState::Partial);
            }
        }

        #[test]
        fn test_applied_filters_are_compact_and_complete(
            parents in shapes(),
            toggles in prop::collection::vec(any::<Index>(), 0..30),
        ) {
            let (mut forest, ids) = build(&parents);
            for toggle in toggles {
                forest.toggle(ids[toggle.index(ids.len())]);
            }

            let applied: Vec<NodeId> = forest
                .roots()
                .iter()
                .flat_map(|&root| forest.applied_nodes(root))
                .collect();

            let mut covered = BTreeSet::new();
            for &id in &applied {
                prop_assert!(forest.node(id).is_selected());
                if let Some(parent) = forest.parent(id) {
                    prop_assert!(!forest.node(parent).is_selected());
                }
                covered.extend(forest.leaves(id, None));
            }
            prop_assert_eq!(covered, selected_leaves(&forest));
        }

        #[test]
        fn test_serialization_preserves_forest(
            parents in shapes(),
            toggles in prop::collection::vec(any::<Index>(), 0..10),
        ) {
            let (mut forest, ids) = build(&parents);
            for toggle in toggles {
                forest.toggle(ids[toggle.index(ids.len())]);
            }
            let json = serde_json::to_string(&forest).unwrap();
            let restored: FilterForest = serde_json::from_str(&json).unwrap();
            restored.validate().unwrap();
            prop_assert_eq!(restored.applied_keys(), forest.applied_keys());
            prop_assert_eq!(restored, forest);
        }
    }
}
