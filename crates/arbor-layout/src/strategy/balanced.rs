#![forbid(unsafe_code)]

//! Two-branch layout around the root.
//!
//! The root's children are split into a right branch (the first `k`) and a
//! left branch (the rest), with `k` chosen so the two stacked branch heights
//! are as close as possible. On a tie the right branch takes the extra child.
//! Descendants stay on their top-level ancestor's side.
//!
//! Horizontally, every depth of a branch is a column: its inner edge sits one
//! `branch_spacing` beyond the widest node of the previous depth on that side,
//! and the first column starts `branch_spacing` beyond the root's edge.

use arbor_core::geometry::Position;

use super::{Extent, ExtentMap, Frame, LayoutStrategy, Slot, Spacing};
use crate::config::StrategyKind;
use crate::topic::{Side, TopicId, TopicTree};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Balanced {
    spacing: Spacing,
}

impl Balanced {
    #[must_use]
    pub fn new(spacing: Spacing) -> Self {
        Self { spacing }
    }

    /// Number of leading `blocks` that go right.
    fn split(&self, blocks: &[f64]) -> usize {
        let mut best = 0;
        let mut best_diff = f64::INFINITY;
        for k in 0..=blocks.len() {
            let right = self.spacing.stack_height(blocks[..k].iter().copied());
            let left = self.spacing.stack_height(blocks[k..].iter().copied());
            let diff = (right - left).abs();
            if diff <= best_diff {
                best = k;
                best_diff = diff;
            }
        }
        best
    }

    /// Widest floored node per depth of `branch`'s laid-out subtree.
    fn profile(&self, tree: &TopicTree, branch: TopicId) -> Vec<f64> {
        let mut widths: Vec<f64> = Vec::new();
        let mut stack = vec![(branch, 0)];
        while let Some((id, depth)) = stack.pop() {
            let width = self.spacing.floored(tree, id).width;
            match widths.get_mut(depth) {
                Some(widest) => *widest = widest.max(width),
                None => widths.push(width),
            }
            stack.extend(tree.layout_children(id).map(|c| (c, depth + 1)));
        }
        widths
    }

    /// Column edges for one branch whose top-level subtrees are `branch`.
    fn columns(&self, first: f64, branch: &[&Extent]) -> Vec<f64> {
        let depth = branch.iter().map(|e| e.widths.len()).max().unwrap_or(0);
        let mut columns = vec![0.0, first];
        for d in 1..depth {
            let widest = branch
                .iter()
                .filter_map(|e| e.widths.get(d - 1))
                .fold(0.0_f64, |acc, &w| acc.max(w));
            let next = columns[d] + widest + self.spacing.branch_spacing;
            columns.push(next);
        }
        columns
    }

    /// Stack `children` downward from `top` in the column at `depth`.
    fn stack(
        &self,
        children: &[TopicId],
        side: Side,
        depth: usize,
        top: f64,
        edge: f64,
        extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)> {
        let mut top = top;
        let mut out = Vec::with_capacity(children.len());
        for &child in children {
            let Some(e) = extents.get(&child) else {
                continue;
            };
            let x = side.sign() * (edge + e.size.width / 2.0);
            let y = top + e.size.height / 2.0;
            top += e.block + self.spacing.sibling_gap;
            out.push((
                child,
                Slot {
                    position: Position::new(x, y),
                    side,
                    depth,
                    computed: true,
                    pinned: false,
                },
            ));
        }
        out
    }
}

impl LayoutStrategy for Balanced {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Balanced
    }

    fn spacing(&self) -> &Spacing {
        &self.spacing
    }

    fn measure(&self, tree: &TopicTree, id: TopicId, extents: &ExtentMap) -> Extent {
        let size = self.spacing.floored(tree, id);
        let stack = self.spacing.stack_height(
            tree.layout_children(id)
                .filter_map(|c| extents.get(&c))
                .map(|e| e.block),
        );

        let mut extent = Extent::leaf(size);
        extent.block = size.height.max(stack);
        if tree.parent(id) == Some(tree.root()) {
            extent.widths = self.profile(tree, id);
        }
        extent
    }

    fn frame(&self, tree: &TopicTree, extents: &ExtentMap) -> Frame {
        let root = tree.root();
        let branches: Vec<&Extent> = tree
            .layout_children(root)
            .filter_map(|c| extents.get(&c))
            .collect();
        let blocks: Vec<f64> = branches.iter().map(|e| e.block).collect();
        let split = self.split(&blocks);

        let first = self.spacing.floored(tree, root).width / 2.0 + self.spacing.branch_spacing;
        let (right, left) = branches.split_at(split);
        Frame {
            split,
            right_columns: self.columns(first, right),
            left_columns: self.columns(first, left),
        }
    }

    fn arrange(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        slot: &Slot,
        frame: &Frame,
        extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)> {
        let children: Vec<TopicId> = tree.layout_children(parent).collect();
        let size = self.spacing.floored(tree, parent);
        let top = slot.position.y - size.height / 2.0;
        let depth = slot.depth + 1;
        // Only reached if the frame lacks a column for this depth.
        let fallback = slot.position.x.abs() + size.width / 2.0 + self.spacing.branch_spacing;
        let edge = |side| frame.column(side, depth).unwrap_or(fallback);

        if parent == tree.root() {
            let (right, left) = children.split_at(frame.split.min(children.len()));
            let mut out = self.stack(right, Side::Right, depth, top, edge(Side::Right), extents);
            out.extend(self.stack(left, Side::Left, depth, top, edge(Side::Left), extents));
            out
        } else {
            self.stack(&children, slot.side, depth, top, edge(slot.side), extents)
        }
    }
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
    fn split_prefers_right_on_ties() {
        let b = Balanced::new(spacing());
        assert_eq!(b.split(&[]), 0);
        assert_eq!(b.split(&[20.0]), 1);
        assert_eq!(b.split(&[20.0, 20.0]), 1);
        assert_eq!(b.split(&[20.0; 5]), 3);
        assert_eq!(b.split(&[100.0, 20.0, 20.0, 20.0]), 1);
    }

    #[test]
    fn widths_profile_tracks_widest_per_depth() {
        let mut tree = TopicTree::new(Size::new(100.0, 40.0));
        let root = tree.root();
        let a = tree.insert(root, None, Size::new(50.0, 20.0)).unwrap();
        let a1 = tree.insert(a, None, Size::new(30.0, 10.0)).unwrap();
        tree.insert(a, None, Size::new(70.0, 10.0)).unwrap();

        let b = Balanced::new(spacing());
        let mut extents = ExtentMap::default();
        for id in tree.subtree(root).into_iter().rev() {
            let e = b.measure(&tree, id, &extents);
            extents.insert(id, e);
        }
        assert_eq!(extents[&a].widths, vec![50.0, 70.0]);
        assert_eq!(extents[&a].block, 30.0);
        // Only branches carry a profile.
        assert!(extents[&root].widths.is_empty());
        assert!(extents[&a1].widths.is_empty());
    }

    #[test]
    fn degenerate_sizes_are_floored() {
        let mut tree = TopicTree::new(Size::new(100.0, 40.0));
        let root = tree.root();
        let a = tree.insert(root, None, Size::new(0.0, -5.0)).unwrap();
        let b = Balanced::new(spacing());
        let e = b.measure(&tree, a, &ExtentMap::default());
        assert_eq!(e.size, Size::new(1.0, 1.0));
        assert_eq!(e.block, 1.0);
    }

    #[test]
    fn columns_step_by_widest_node() {
        let b = Balanced::new(spacing());
        let x = Extent {
            widths: vec![50.0, 30.0, 10.0],
            ..Extent::leaf(Size::new(50.0, 20.0))
        };
        let y = Extent {
            widths: vec![80.0, 20.0],
            ..Extent::leaf(Size::new(80.0, 20.0))
        };
        let cols = b.columns(90.0, &[&x, &y]);
        assert_eq!(cols, vec![0.0, 90.0, 210.0, 280.0]);
    }
}
