#![forbid(unsafe_code)]

//! Place-once layout.
//!
//! Topics that already have a position keep it. A topic that was never
//! placed gets one spot next to its parent:
//!
//! - a child of the root goes to the side with fewer placed siblings (right
//!   on a tie); deeper topics grow away from the root on their parent's side;
//! - its inner edge sits `branch_spacing` beyond the parent's edge;
//! - it goes just below the lowest placed sibling on that side, or level with
//!   the parent's top edge when there is none.
//!
//! There is no overlap resolution afterwards. The same rule seeds new topics
//! inside manually positioned subtrees under every strategy.

use arbor_core::geometry::{Bounds, Position};

use super::{Extent, ExtentMap, Frame, LayoutStrategy, Slot, Spacing};
use crate::config::StrategyKind;
use crate::topic::{Side, TopicId, TopicTree};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Free {
    spacing: Spacing,
}

impl Free {
    #[must_use]
    pub fn new(spacing: Spacing) -> Self {
        Self { spacing }
    }
}

impl LayoutStrategy for Free {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Free
    }

    fn spacing(&self) -> &Spacing {
        &self.spacing
    }

    fn measure(&self, tree: &TopicTree, id: TopicId, _extents: &ExtentMap) -> Extent {
        Extent::leaf(self.spacing.floored(tree, id))
    }

    fn arrange(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        slot: &Slot,
        _frame: &Frame,
        _extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)> {
        let children: Vec<TopicId> = tree.layout_children(parent).collect();
        place_children(&self.spacing, tree, parent, slot, children, false)
    }
}

/// Side of `position` relative to `anchor`.
pub(crate) fn side_of(position: Position, anchor: Position) -> Side {
    if position.x < anchor.x {
        Side::Left
    } else {
        Side::Right
    }
}

/// Slots for `children` of `parent`: stored positions for placed topics, a
/// fresh spot for unplaced ones.
pub(crate) fn place_children(
    spacing: &Spacing,
    tree: &TopicTree,
    parent: TopicId,
    slot: &Slot,
    children: impl IntoIterator<Item = TopicId>,
    pinned: bool,
) -> Vec<(TopicId, Slot)> {
    let anchor = slot.position;
    let parent_size = spacing.floored(tree, parent);
    let is_root = parent == tree.root();
    let depth = slot.depth + 1;

    // Every placed sibling is an obstacle, whether or not it is in `children`.
    let mut occupied: Vec<(Side, Bounds)> = tree
        .children(parent)
        .iter()
        .filter_map(|&c| tree.get(c))
        .filter(|t| t.is_placed())
        .map(|t| {
            let size = t.size().floored(spacing.min_extent);
            (side_of(t.position(), anchor), Bounds::from_center(t.position(), size))
        })
        .collect();

    let mut out = Vec::new();
    for child in children {
        let Some(topic) = tree.get(child) else {
            continue;
        };
        if topic.is_placed() {
            out.push((
                child,
                Slot {
                    position: topic.position(),
                    side: side_of(topic.position(), anchor),
                    depth,
                    computed: false,
                    pinned,
                },
            ));
            continue;
        }

        let side = if is_root {
            let right = occupied.iter().filter(|(s, _)| *s == Side::Right).count();
            let left = occupied.len() - right;
            if left < right { Side::Left } else { Side::Right }
        } else {
            slot.side
        };
        let size = spacing.floored(tree, child);
        let x = anchor.x
            + side.sign() * (parent_size.width / 2.0 + spacing.branch_spacing + size.width / 2.0);
        let y = occupied
            .iter()
            .filter(|(s, _)| *s == side)
            .map(|(_, b)| b.max_y)
            .reduce(f64::max)
            .map_or(
                anchor.y - parent_size.height / 2.0 + size.height / 2.0,
                |bottom| bottom + spacing.sibling_gap + size.height / 2.0,
            );
        let position = Position::new(x, y);
        occupied.push((side, Bounds::from_center(position, size)));
        out.push((
            child,
            Slot {
                position,
                side,
                depth,
                computed: true,
                pinned,
            },
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::geometry::Size;

    fn spacing() -> Spacing {
        Spacing {
            sibling_gap: 10.0,
            branch_spacing: 40.0,
            min_extent: 1.0,
        }
    }

    #[test]
    fn unplaced_root_children_alternate_sides() {
        let mut tree = TopicTree::new(Size::new(100.0, 40.0));
        let root = tree.root();
        for _ in 0..3 {
            tree.insert(root, None, Size::new(50.0, 20.0)).unwrap();
        }
        let free = Free::new(spacing());
        let slots = free.arrange(&tree, root, &Slot::ROOT, &Frame::default(), &ExtentMap::default());
        let sides: Vec<Side> = slots.iter().map(|(_, s)| s.side).collect();
        assert_eq!(sides, vec![Side::Right, Side::Left, Side::Right]);

        assert_eq!(slots[0].1.position, Position::new(115.0, -10.0));
        assert_eq!(slots[1].1.position, Position::new(-115.0, -10.0));
        // Below the first right-hand child: bottom 0 + gap 10 + half height 10.
        assert_eq!(slots[2].1.position, Position::new(115.0, 20.0));
    }

    #[test]
    fn placed_children_keep_their_position() {
        let mut tree = TopicTree::new(Size::new(100.0, 40.0));
        let root = tree.root();
        let a = tree.insert(root, None, Size::new(50.0, 20.0)).unwrap();
        tree.set_position(a, Position::new(300.0, 300.0)).unwrap();
        let b = tree.insert(root, None, Size::new(50.0, 20.0)).unwrap();

        let free = Free::new(spacing());
        let slots = free.arrange(&tree, root, &Slot::ROOT, &Frame::default(), &ExtentMap::default());
        assert_eq!(slots[0], (a, Slot {
            position: Position::new(300.0, 300.0),
            side: Side::Right,
            depth: 1,
            computed: false,
            pinned: false,
        }));
        // One placed sibling on the right, so the new one goes left.
        assert_eq!(slots[1].0, b);
        assert_eq!(slots[1].1.side, Side::Left);
        assert!(slots[1].1.computed);
    }

    #[test]
    fn deeper_topics_follow_parent_side() {
        let mut tree = TopicTree::new(Size::new(100.0, 40.0));
        let root = tree.root();
        let a = tree.insert(root, None, Size::new(50.0, 20.0)).unwrap();
        tree.set_position(a, Position::new(-200.0, 0.0)).unwrap();
        tree.insert(a, None, Size::new(30.0, 10.0)).unwrap();

        let a_slot = Slot {
            position: Position::new(-200.0, 0.0),
            side: Side::Left,
            depth: 1,
            computed: false,
            pinned: false,
        };
        let free = Free::new(spacing());
        let slots = free.arrange(&tree, a, &a_slot, &Frame::default(), &ExtentMap::default());
        assert_eq!(slots[0].1.side, Side::Left);
        assert_eq!(slots[0].1.position, Position::new(-200.0 - 25.0 - 40.0 - 15.0, -5.0));
    }
}
