#![forbid(unsafe_code)]

//! Property tests for layout invariants.
//!
//! Validates:
//! - Sibling subtrees never overlap after a full pass (balanced, symmetric).
//! - Strategies are deterministic for identical input.
//! - Incremental passes leave the tree exactly as a full pass would, for
//!   random edit streams under every strategy.
//! - The root always sits at the origin.

use arbor_core::bus::EventBus;
use arbor_core::geometry::{Position, Size};
use arbor_layout::{
    LayoutConfig, LayoutManager, LayoutStrategy, MapEvent, StrategyKind, TopicId, TopicTree,
};
use proptest::prelude::*;

// ============================================================================
// Strategy helpers
// ============================================================================

/// One node to add: `(parent selector, width, height)`.
type Spec = (usize, f64, f64);

fn node_strategy() -> impl Strategy<Value = Spec> {
    (any::<usize>(), 1.0f64..200.0, 1.0f64..120.0)
}

fn kind_strategy() -> impl Strategy<Value = StrategyKind> {
    prop_oneof![
        Just(StrategyKind::Balanced),
        Just(StrategyKind::Symmetric),
        Just(StrategyKind::Free),
    ]
}

fn build_tree(nodes: &[Spec]) -> TopicTree {
    let mut tree = TopicTree::new(Size::new(120.0, 40.0));
    let mut ids = vec![tree.root()];
    for &(sel, w, h) in nodes {
        let parent = ids[sel % ids.len()];
        let id = tree
            .insert(parent, None, Size::new(w, h))
            .expect("parent is live");
        ids.push(id);
    }
    tree
}

fn pick(tree: &TopicTree, sel: usize) -> TopicId {
    let ids: Vec<TopicId> = tree.ids().collect();
    ids[sel % ids.len()]
}

fn pick_non_root(tree: &TopicTree, sel: usize) -> Option<TopicId> {
    let ids: Vec<TopicId> = tree.ids().filter(|&id| id != tree.root()).collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[sel % ids.len()])
    }
}

/// Assert no two sibling subtrees under automatic layout intersect.
fn assert_no_sibling_overlap(tree: &TopicTree) -> Result<(), TestCaseError> {
    for parent in tree.ids() {
        if !tree.is_visible(parent) {
            continue;
        }
        let kids: Vec<TopicId> = tree.layout_children(parent).collect();
        for (i, &a) in kids.iter().enumerate() {
            for &b in &kids[i + 1..] {
                let ba = tree.subtree_bounds(a).expect("live");
                let bb = tree.subtree_bounds(b).expect("live");
                prop_assert!(
                    !ba.intersects(&bb),
                    "siblings {} and {} under {} overlap: {:?} vs {:?}",
                    a,
                    b,
                    parent,
                    ba,
                    bb
                );
            }
        }
    }
    Ok(())
}

// ============================================================================
// Invariant 1: No sibling overlap after a full pass
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn balanced_siblings_never_overlap(nodes in prop::collection::vec(node_strategy(), 0..40)) {
        let mut tree = build_tree(&nodes);
        let mut manager = LayoutManager::new(LayoutConfig::default());
        manager.recompute_all(&mut tree, &EventBus::new());
        assert_no_sibling_overlap(&tree)?;
    }

    #[test]
    fn symmetric_siblings_never_overlap(nodes in prop::collection::vec(node_strategy(), 0..40)) {
        let mut tree = build_tree(&nodes);
        let config = LayoutConfig::default().with_strategy(StrategyKind::Symmetric);
        let mut manager = LayoutManager::new(config);
        manager.recompute_all(&mut tree, &EventBus::new());
        assert_no_sibling_overlap(&tree)?;
    }

    #[test]
    fn collapsed_topics_do_not_break_separation(
        nodes in prop::collection::vec(node_strategy(), 1..40),
        collapse in prop::collection::vec(any::<usize>(), 0..5),
    ) {
        let mut tree = build_tree(&nodes);
        for sel in collapse {
            let id = pick(&tree, sel);
            tree.set_collapsed(id, true).unwrap();
        }
        let mut manager = LayoutManager::new(LayoutConfig::default());
        manager.recompute_all(&mut tree, &EventBus::new());
        assert_no_sibling_overlap(&tree)?;
    }
}

// ============================================================================
// Invariant 2: Determinism
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn compute_layout_is_deterministic(
        nodes in prop::collection::vec(node_strategy(), 0..40),
        kind in kind_strategy(),
    ) {
        let tree = build_tree(&nodes);
        let strategy = arbor_layout::Strategy::new(&LayoutConfig::default().with_strategy(kind));
        let first = strategy.compute_layout(&tree, tree.root()).unwrap();
        let second = strategy.compute_layout(&tree.clone(), tree.root()).unwrap();
        prop_assert_eq!(first.len(), second.len());
        for (id, pos) in &first {
            let other = second[id];
            prop_assert!(pos.bit_eq(&other), "{} differs: {:?} vs {:?}", id, pos, other);
        }
        prop_assert_eq!(first.get(&tree.root()).copied(), Some(Position::ORIGIN));
    }

    #[test]
    fn manager_agrees_with_compute_layout(
        nodes in prop::collection::vec(node_strategy(), 0..40),
        kind in prop_oneof![Just(StrategyKind::Balanced), Just(StrategyKind::Symmetric)],
    ) {
        let mut tree = build_tree(&nodes);
        let config = LayoutConfig::default().with_strategy(kind);
        let expected = arbor_layout::Strategy::new(&config).compute_layout(&tree, tree.root()).unwrap();

        let mut manager = LayoutManager::new(config);
        manager.recompute_all(&mut tree, &EventBus::new());
        for (id, pos) in expected {
            prop_assert!(tree.topic(id).unwrap().position().bit_eq(&pos));
        }
    }
}

// ============================================================================
// Invariant 3: Incremental equivalence
// ============================================================================

#[derive(Debug, Clone)]
enum Edit {
    Add(usize, f64, f64),
    Remove(usize),
    Resize(usize, f64, f64),
    Move(usize, usize, usize),
    Toggle(usize),
    Drag(usize, f64, f64),
    ClearManual(usize),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        4 => (any::<usize>(), -5.0f64..150.0, -5.0f64..80.0)
            .prop_map(|(p, w, h)| Edit::Add(p, w, h)),
        1 => any::<usize>().prop_map(Edit::Remove),
        2 => (any::<usize>(), 0.0f64..150.0, 0.0f64..80.0)
            .prop_map(|(p, w, h)| Edit::Resize(p, w, h)),
        1 => (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(a, b, i)| Edit::Move(a, b, i)),
        1 => any::<usize>().prop_map(Edit::Toggle),
        1 => (any::<usize>(), -300.0f64..300.0, -300.0f64..300.0)
            .prop_map(|(p, dx, dy)| Edit::Drag(p, dx, dy)),
        1 => any::<usize>().prop_map(Edit::ClearManual),
    ]
}

fn apply(
    tree: &mut TopicTree,
    manager: &mut LayoutManager,
    bus: &EventBus<MapEvent>,
    edit: &Edit,
) {
    match *edit {
        Edit::Add(sel, w, h) => {
            let parent = pick(tree, sel);
            let id = tree.insert(parent, None, Size::new(w, h)).unwrap();
            manager.on_node_added(tree, bus, id).unwrap();
        }
        Edit::Remove(sel) => {
            if let Some(id) = pick_non_root(tree, sel) {
                let cut = tree.detach(id).unwrap();
                manager.on_node_removed(tree, bus, &cut).unwrap();
            }
        }
        Edit::Resize(sel, w, h) => {
            let id = pick(tree, sel);
            tree.set_size(id, Size::new(w, h)).unwrap();
            manager.on_node_resized(tree, bus, id).unwrap();
        }
        Edit::Move(a, b, index) => {
            let Some(id) = pick_non_root(tree, a) else {
                return;
            };
            let target = pick(tree, b);
            if target == id || tree.is_ancestor_of(id, target) {
                return;
            }
            let old_parent = tree.parent(id).unwrap();
            let len = tree.children(target).len() - usize::from(old_parent == target);
            tree.move_to(id, target, index % (len + 1)).unwrap();
            manager.on_node_moved(tree, bus, id, old_parent).unwrap();
        }
        Edit::Toggle(sel) => {
            let id = pick(tree, sel);
            let collapsed = tree.topic(id).unwrap().is_collapsed();
            tree.set_collapsed(id, !collapsed).unwrap();
            manager.on_collapse_toggled(tree, bus, id).unwrap();
        }
        Edit::Drag(sel, dx, dy) => {
            let Some(id) = pick_non_root(tree, sel) else {
                return;
            };
            for t in tree.subtree(id) {
                let p = tree.topic(t).unwrap().position();
                tree.set_position(t, p.translate(dx, dy)).unwrap();
            }
            tree.set_manual(id, true).unwrap();
            manager.on_node_dragged(tree, bus, id).unwrap();
        }
        Edit::ClearManual(sel) => {
            let id = pick(tree, sel);
            if tree.topic(id).unwrap().has_manual_position() {
                tree.set_manual(id, false).unwrap();
                manager.on_manual_cleared(tree, bus, id).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn incremental_matches_full_recompute(
        nodes in prop::collection::vec(node_strategy(), 0..15),
        edits in prop::collection::vec(edit_strategy(), 1..30),
        kind in kind_strategy(),
    ) {
        let bus = EventBus::new();
        let config = LayoutConfig::default().with_strategy(kind);
        let mut tree = build_tree(&nodes);
        let mut manager = LayoutManager::new(config.clone());
        manager.recompute_all(&mut tree, &bus);

        for edit in &edits {
            apply(&mut tree, &mut manager, &bus, edit);

            let mut reference = tree.clone();
            LayoutManager::new(config.clone()).recompute_all(&mut reference, &EventBus::new());
            prop_assert_eq!(&reference, &tree, "diverged after {:?}", edit);
            prop_assert_eq!(
                tree.topic(tree.root()).unwrap().position(),
                Position::ORIGIN
            );
        }
    }
}
