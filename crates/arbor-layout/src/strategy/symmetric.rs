#![forbid(unsafe_code)]

//! Two-sided layout at every fork.
//!
//! Each node may have children on both of its sides. A child's side is its
//! stored [`Side`] when it has one; otherwise children are dealt out in order
//! to whichever side of the parent currently has the shorter stack, the right
//! side winning ties.
//!
//! A child's center sits `branch_spacing` beyond its parent's edge plus the
//! child's own reach back towards the parent, so a child that itself grows
//! children on both sides never crosses over its parent.

use arbor_core::geometry::Position;

use super::{Extent, ExtentMap, Frame, LayoutStrategy, Slot, Spacing, extent_or_leaf};
use crate::config::StrategyKind;
use crate::topic::{Side, TopicId, TopicTree};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Symmetric {
    spacing: Spacing,
}

/// Running stack heights of both sides of one parent.
#[derive(Debug, Default)]
struct Stacks {
    right: f64,
    left: f64,
    right_count: usize,
    left_count: usize,
}

impl Stacks {
    fn shorter(&self) -> Side {
        if self.left < self.right {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn push(&mut self, side: Side, block: f64, gap: f64) {
        let (height, count) = match side {
            Side::Right => (&mut self.right, &mut self.right_count),
            Side::Left => (&mut self.left, &mut self.left_count),
        };
        if *count > 0 {
            *height += gap;
        }
        *height += block;
        *count += 1;
    }
}

impl Symmetric {
    #[must_use]
    pub fn new(spacing: Spacing) -> Self {
        Self { spacing }
    }

    /// Side of every layout child of `parent`, in child order, plus the
    /// final stack heights.
    fn sides(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        extents: &ExtentMap,
    ) -> (Vec<(TopicId, Side)>, Stacks) {
        let mut stacks = Stacks::default();
        let mut out = Vec::new();
        for child in tree.layout_children(parent) {
            let block = extent_or_leaf(extents, &self.spacing, tree, child).block;
            let side = tree
                .get(child)
                .and_then(|t| t.side())
                .unwrap_or_else(|| stacks.shorter());
            stacks.push(side, block, self.spacing.sibling_gap);
            out.push((child, side));
        }
        (out, stacks)
    }
}

impl LayoutStrategy for Symmetric {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Symmetric
    }

    fn spacing(&self) -> &Spacing {
        &self.spacing
    }

    fn measure(&self, tree: &TopicTree, id: TopicId, extents: &ExtentMap) -> Extent {
        let size = self.spacing.floored(tree, id);
        let (sides, stacks) = self.sides(tree, id, extents);

        let mut extent = Extent::leaf(size);
        extent.block = size.height.max(stacks.right).max(stacks.left);
        for (child, side) in sides {
            let Some(e) = extents.get(&child) else {
                continue;
            };
            let reach = size.width / 2.0
                + self.spacing.branch_spacing
                + e.reach_towards_parent(side)
                + e.reach_away_from_parent(side);
            match side {
                Side::Right => extent.reach_right = extent.reach_right.max(reach),
                Side::Left => extent.reach_left = extent.reach_left.max(reach),
            }
        }
        extent
    }

    fn arrange(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        slot: &Slot,
        _frame: &Frame,
        extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)> {
        let size = self.spacing.floored(tree, parent);
        let top = slot.position.y - size.height / 2.0;
        let (mut right_top, mut left_top) = (top, top);

        let (sides, _) = self.sides(tree, parent, extents);
        let mut out = Vec::with_capacity(sides.len());
        for (child, side) in sides {
            let Some(e) = extents.get(&child) else {
                continue;
            };
            let cursor = match side {
                Side::Right => &mut right_top,
                Side::Left => &mut left_top,
            };
            let y = *cursor + e.size.height / 2.0;
            *cursor += e.block + self.spacing.sibling_gap;
            let x = slot.position.x
                + side.sign()
                    * (size.width / 2.0 + self.spacing.branch_spacing + e.reach_towards_parent(side));
            out.push((
                child,
                Slot {
                    position: Position::new(x, y),
                    side,
                    depth: slot.depth + 1,
                    computed: true,
                    pinned: false,
                },
            ));
        }
        out
    }

    fn creation_side(&self, tree: &TopicTree, parent: TopicId, extents: &ExtentMap) -> Option<Side> {
        let (_, stacks) = self.sides(tree, parent, extents);
        Some(stacks.shorter())
    }
}
