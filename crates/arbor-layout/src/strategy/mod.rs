#![forbid(unsafe_code)]

//! Layout strategies.
//!
//! # Shape of a strategy
//!
//! A strategy is a pure function of the model, split into three phases so
//! that the [`LayoutManager`](crate::manager::LayoutManager) can cache and
//! reuse the expensive part:
//!
//! 1. **measure** (bottom-up): one node's [`Extent`] from its own floored
//!    size and its layout children's extents.
//! 2. **frame** (at the root): map-wide placement data such as the balanced
//!    branch split and its depth columns.
//! 3. **arrange** (top-down): the [`Slot`]s of one node's children, given
//!    the node's own slot.
//!
//! [`LayoutStrategy::compute_layout`] composes the three over the whole tree.
//! Identical model input always produces bit-identical output.
//!
//! # Layout authority
//!
//! A child carrying a manual position, and everything below it, is *pinned*:
//! its stored position is kept as-is. The only thing layout still does inside
//! a pinned subtree is give never-placed topics an initial spot next to their
//! parent, using the same rule as [`Free`].
//!
//! # Stacking
//!
//! Children on one side of a parent stack downward from the parent's top
//! edge, in child order, one subtree block after another separated by the
//! sibling gap. Removing a child therefore closes its gap without moving the
//! siblings above it.

mod balanced;
mod free;
mod symmetric;

pub use balanced::Balanced;
pub use free::Free;
pub use symmetric::Symmetric;

use std::borrow::Cow;

use arbor_core::geometry::{Position, Size};
use rustc_hash::FxHashMap;

use crate::config::{LayoutConfig, StrategyKind};
use crate::error::LayoutResult;
use crate::topic::{Side, TopicId, TopicTree};

/// Positions computed by a strategy.
pub type Layout = FxHashMap<TopicId, Position>;

/// Cached per-node extents.
pub type ExtentMap = FxHashMap<TopicId, Extent>;

// ============================================================================
// Spacing
// ============================================================================

/// Numeric parameters shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spacing {
    pub sibling_gap: f64,
    pub branch_spacing: f64,
    pub min_extent: f64,
}

impl Default for Spacing {
    fn default() -> Self {
        Self::from(&LayoutConfig::default())
    }
}

impl From<&LayoutConfig> for Spacing {
    fn from(config: &LayoutConfig) -> Self {
        Self {
            sibling_gap: config.sibling_gap,
            branch_spacing: config.branch_spacing,
            min_extent: config.min_extent,
        }
    }
}

impl Spacing {
    /// Size of `id` with degenerate dimensions replaced by the floor.
    pub fn floored(&self, tree: &TopicTree, id: TopicId) -> Size {
        tree.get(id)
            .map_or(Size::ZERO, |t| t.size())
            .floored(self.min_extent)
    }

    /// Height of `blocks` stacked with the sibling gap between them.
    pub fn stack_height(&self, blocks: impl IntoIterator<Item = f64>) -> f64 {
        let mut total = 0.0;
        let mut any = false;
        for block in blocks {
            if any {
                total += self.sibling_gap;
            }
            total += block;
            any = true;
        }
        total
    }
}

// ============================================================================
// Extent / Frame / Slot
// ============================================================================

/// Measured footprint of a subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct Extent {
    /// Own size after flooring.
    pub size: Size,
    /// Vertical room the subtree needs: own height or its children's stack,
    /// whichever is taller.
    pub block: f64,
    /// Horizontal reach left of the node's center.
    pub reach_left: f64,
    /// Horizontal reach right of the node's center.
    pub reach_right: f64,
    /// Widest node per depth of the laid-out subtree, `widths[0]` being the
    /// node itself. Only filled for the root's children under the balanced
    /// strategy, where the depth columns come from; empty everywhere else.
    pub widths: Vec<f64>,
}

impl Extent {
    /// Extent of a node with no laid-out children.
    pub fn leaf(size: Size) -> Self {
        Self {
            size,
            block: size.height,
            reach_left: size.width / 2.0,
            reach_right: size.width / 2.0,
            widths: Vec::new(),
        }
    }

    /// Reach facing the parent. A right-hand child faces its parent with its
    /// left reach.
    fn reach_towards_parent(&self, side: Side) -> f64 {
        match side {
            Side::Right => self.reach_left,
            Side::Left => self.reach_right,
        }
    }

    fn reach_away_from_parent(&self, side: Side) -> f64 {
        match side {
            Side::Right => self.reach_right,
            Side::Left => self.reach_left,
        }
    }
}

/// Map-wide placement data derived at the root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Number of leading root children on the right branch.
    pub split: usize,
    /// Distance from the origin to the inner edge of each right-hand depth
    /// column, indexed by depth (index 0 unused).
    pub right_columns: Vec<f64>,
    /// Same for the left branch, as positive distances.
    pub left_columns: Vec<f64>,
}

impl Frame {
    /// Inner edge distance of the column at `depth` on `side`.
    pub fn column(&self, side: Side, depth: usize) -> Option<f64> {
        match side {
            Side::Right => self.right_columns.get(depth).copied(),
            Side::Left => self.left_columns.get(depth).copied(),
        }
    }
}

/// Where one topic goes and how its own children should be placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// Center of the topic.
    pub position: Position,
    /// Branch side relative to the topic's parent.
    pub side: Side,
    /// Distance from the root.
    pub depth: usize,
    /// True when `position` was derived by layout; false when it is the
    /// stored position handed through unchanged.
    pub computed: bool,
    /// True inside a manually positioned subtree.
    pub pinned: bool,
}

impl Slot {
    /// Slot of the root: the origin, always.
    pub const ROOT: Slot = Slot {
        position: Position::ORIGIN,
        side: Side::Right,
        depth: 0,
        computed: true,
        pinned: false,
    };
}

// ============================================================================
// LayoutStrategy
// ============================================================================

/// One layout algorithm.
///
/// Implementations never mutate the tree; the layout manager commits what
/// they return.
pub trait LayoutStrategy {
    fn kind(&self) -> StrategyKind;

    fn spacing(&self) -> &Spacing;

    /// Extent of `id` from its layout children's extents in `extents`.
    fn measure(&self, tree: &TopicTree, id: TopicId, extents: &ExtentMap) -> Extent;

    /// Map-wide data derived from the root's children.
    fn frame(&self, _tree: &TopicTree, _extents: &ExtentMap) -> Frame {
        Frame::default()
    }

    /// Slots of `parent`'s layout children, in child order.
    fn arrange(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        slot: &Slot,
        frame: &Frame,
        extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)>;

    /// Side a new child of `parent` should store at creation time, if the
    /// strategy uses stored sides.
    fn creation_side(
        &self,
        _tree: &TopicTree,
        _parent: TopicId,
        _extents: &ExtentMap,
    ) -> Option<Side> {
        None
    }

    /// Positions of every topic in `scope`'s subtree that layout places:
    /// the root, topics under automatic layout, and never-placed topics.
    /// Topics hidden below a collapsed ancestor are not included.
    fn compute_layout(&self, tree: &TopicTree, scope: TopicId) -> LayoutResult<Layout> {
        tree.topic(scope)?;
        let root = tree.root();

        let mut extents = ExtentMap::default();
        for id in tree.subtree(root).into_iter().rev() {
            let extent = self.measure(tree, id, &extents);
            extents.insert(id, extent);
        }
        let frame = self.frame(tree, &extents);

        let mut out = Layout::default();
        if scope == root {
            out.insert(root, Slot::ROOT.position);
        }
        let mut stack = vec![(root, Slot::ROOT, scope == root)];
        while let Some((id, slot, in_scope)) = stack.pop() {
            for (child, child_slot) in child_slots(self, tree, id, &slot, &frame, &extents) {
                let child_in_scope = in_scope || child == scope;
                if child_in_scope && child_slot.computed {
                    out.insert(child, child_slot.position);
                }
                stack.push((child, child_slot, child_in_scope));
            }
        }
        Ok(out)
    }
}

/// Slots of every visible child of `parent`, in child order: the strategy's
/// arrangement for children under automatic layout, pinned slots for
/// manually positioned ones.
pub(crate) fn child_slots<S: LayoutStrategy + ?Sized>(
    strategy: &S,
    tree: &TopicTree,
    parent: TopicId,
    slot: &Slot,
    frame: &Frame,
    extents: &ExtentMap,
) -> Vec<(TopicId, Slot)> {
    let Some(topic) = tree.get(parent) else {
        return Vec::new();
    };
    if topic.is_collapsed() {
        return Vec::new();
    }
    if slot.pinned {
        return free::place_children(
            strategy.spacing(),
            tree,
            parent,
            slot,
            topic.children().iter().copied(),
            true,
        );
    }

    let mut auto = strategy
        .arrange(tree, parent, slot, frame, extents)
        .into_iter();
    let mut out = Vec::with_capacity(topic.children().len());
    for &child in topic.children() {
        let Some(c) = tree.get(child) else {
            continue;
        };
        if c.has_manual_position() {
            out.push((
                child,
                Slot {
                    position: c.position(),
                    side: free::side_of(c.position(), slot.position),
                    depth: slot.depth + 1,
                    computed: false,
                    pinned: true,
                },
            ));
        } else if let Some(placed) = auto.next() {
            out.push(placed);
        }
    }
    out
}

// ============================================================================
// Strategy
// ============================================================================

/// The closed set of layout strategies, selected by configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Balanced(Balanced),
    Symmetric(Symmetric),
    Free(Free),
}

impl Strategy {
    /// Build the strategy named in `config`.
    #[must_use]
    pub fn new(config: &LayoutConfig) -> Self {
        let spacing = Spacing::from(config);
        match config.strategy {
            StrategyKind::Balanced => Self::Balanced(Balanced::new(spacing)),
            StrategyKind::Symmetric => Self::Symmetric(Symmetric::new(spacing)),
            StrategyKind::Free => Self::Free(Free::new(spacing)),
        }
    }

    fn inner(&self) -> &dyn LayoutStrategy {
        match self {
            Self::Balanced(s) => s,
            Self::Symmetric(s) => s,
            Self::Free(s) => s,
        }
    }
}

impl LayoutStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }

    fn spacing(&self) -> &Spacing {
        self.inner().spacing()
    }

    fn measure(&self, tree: &TopicTree, id: TopicId, extents: &ExtentMap) -> Extent {
        self.inner().measure(tree, id, extents)
    }

    fn frame(&self, tree: &TopicTree, extents: &ExtentMap) -> Frame {
        self.inner().frame(tree, extents)
    }

    fn arrange(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        slot: &Slot,
        frame: &Frame,
        extents: &ExtentMap,
    ) -> Vec<(TopicId, Slot)> {
        self.inner().arrange(tree, parent, slot, frame, extents)
    }

    fn creation_side(
        &self,
        tree: &TopicTree,
        parent: TopicId,
        extents: &ExtentMap,
    ) -> Option<Side> {
        self.inner().creation_side(tree, parent, extents)
    }
}

/// Extent of `id` from the map, or its leaf extent when it was never
/// measured.
fn extent_or_leaf<'a>(
    extents: &'a ExtentMap,
    spacing: &Spacing,
    tree: &TopicTree,
    id: TopicId,
) -> Cow<'a, Extent> {
    match extents.get(&id) {
        Some(e) => Cow::Borrowed(e),
        None => Cow::Owned(Extent::leaf(spacing.floored(tree, id))),
    }
}
