#![forbid(unsafe_code)]

//! Topic node model: an arena-backed, single-rooted tree.
//!
//! # Design
//!
//! Topics live in a `Vec<Option<Topic>>` arena addressed by [`TopicId`].
//! Parent and child relations are stored as ids and resolved through the
//! arena, so there is no ownership cycle and parent/child lookup is O(1).
//!
//! Ids are handed out monotonically and **never recycled** within a session.
//! A removed subtree can therefore be restored later (undo of a removal,
//! redo of an insertion) under exactly the ids it had before, and commands
//! further up the history that refer to those ids stay valid.
//!
//! # Invariants
//!
//! 1. Exactly one root; every other live topic has exactly one live parent.
//! 2. `a` is in `parent(a).children` exactly once.
//! 3. No topic is its own ancestor.
//! 4. Every mutating method validates its inputs first and returns an error
//!    without touching the tree when they are invalid.

use std::fmt;
use std::iter::successors;

use arbor_core::geometry::{Bounds, Position, Size};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

// ============================================================================
// TopicId
// ============================================================================

/// Stable handle of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct TopicId(u32);

impl TopicId {
    /// Create a TopicId from a raw index.
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ============================================================================
// Side
// ============================================================================

/// Which side of its parent a branch grows towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// `+1.0` for right, `-1.0` for left.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }
}

// ============================================================================
// Topic
// ============================================================================

/// A node of the mind map.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    id: TopicId,
    parent: Option<TopicId>,
    children: Vec<TopicId>,
    size: Size,
    position: Position,
    manual: bool,
    collapsed: bool,
    side: Option<Side>,
    placed: bool,
}

impl Topic {
    fn new(id: TopicId, parent: Option<TopicId>, size: Size) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            size,
            position: Position::ORIGIN,
            manual: false,
            collapsed: false,
            side: None,
            placed: false,
        }
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Parent id; `None` only for the root.
    pub fn parent(&self) -> Option<TopicId> {
        self.parent
    }

    /// Children in layout order.
    pub fn children(&self) -> &[TopicId] {
        &self.children
    }

    /// Last measured content size, as given (not floored).
    pub fn size(&self) -> Size {
        self.size
    }

    /// Center of the topic in map space.
    pub fn position(&self) -> Position {
        self.position
    }

    /// True once a user dragged this topic; it and its descendants are then
    /// outside automatic layout authority.
    pub fn has_manual_position(&self) -> bool {
        self.manual
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// Stored branch side, consulted by the symmetric strategy.
    pub fn side(&self) -> Option<Side> {
        self.side
    }

    /// False until a layout pass (or a seed) gave the topic a position.
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Rough heap + inline footprint, for history budgeting.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.children.len() * std::mem::size_of::<TopicId>()
    }
}

// ============================================================================
// DetachedSubtree
// ============================================================================

/// A subtree cut out of the tree, with every field captured verbatim.
///
/// Produced by [`TopicTree::detach`] and consumed by [`TopicTree::restore`].
/// Never empty: it holds at least the topic that was detached.
#[derive(Debug, Clone, PartialEq)]
pub struct DetachedSubtree {
    root: TopicId,
    parent: TopicId,
    index: usize,
    /// Pre-order, starting with `root`.
    topics: Vec<Topic>,
}

impl DetachedSubtree {
    /// Root of the detached subtree.
    pub fn root(&self) -> TopicId {
        self.root
    }

    /// Former parent.
    pub fn parent(&self) -> TopicId {
        self.parent
    }

    /// Former index in the parent's child list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Ids in pre-order.
    pub fn ids(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.topics.iter().map(|t| t.id)
    }

    /// Captured topics in pre-order.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.topics.iter().map(Topic::size_bytes).sum::<usize>()
    }
}

// ============================================================================
// TopicRecord
// ============================================================================

/// Persisted shape of one topic, as owned by the external persistence layer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TopicRecord {
    pub id: TopicId,
    pub parent: Option<TopicId>,
    pub children: Vec<TopicId>,
    pub size: Size,
    /// Present exactly when the user placed the topic by hand.
    #[cfg_attr(feature = "serde", serde(default))]
    pub manual_position: Option<Position>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub collapsed: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub side: Option<Side>,
}

// ============================================================================
// TopicTree
// ============================================================================

/// Seeds may leave gaps in their ids (removed topics are never recycled),
/// but the highest id must stay below `records * MAX_ID_SPREAD +
/// MAX_ID_SLACK`, which bounds the arena a seed can allocate.
const MAX_ID_SPREAD: usize = 16;
const MAX_ID_SLACK: usize = 1 << 16;

/// Arena of topics forming a single rooted tree.
///
/// Two trees are equal when they hold the same live topics; vacated slots
/// left behind by removals do not count.
#[derive(Debug, Clone)]
pub struct TopicTree {
    slots: Vec<Option<Topic>>,
    root: TopicId,
    live: usize,
}

impl PartialEq for TopicTree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.live == other.live
            && self.slots.iter().flatten().eq(other.slots.iter().flatten())
    }
}

impl TopicTree {
    /// Create a tree holding only a root of `root_size`.
    #[must_use]
    pub fn new(root_size: Size) -> Self {
        let root = TopicId(0);
        Self {
            slots: vec![Some(Topic::new(root, None, root_size))],
            root,
            live: 1,
        }
    }

    /// Rebuild a tree from persisted records.
    ///
    /// Records may come in any order. Manually positioned topics keep their
    /// stored position; every other topic is left unplaced for the first
    /// layout pass.
    pub fn from_records(records: &[TopicRecord]) -> LayoutResult<Self> {
        let seed_err = |msg: String| LayoutError::InvalidSeed(msg);

        let max = records
            .iter()
            .map(|r| r.id.slot())
            .max()
            .ok_or_else(|| seed_err("no records".into()))?;
        let limit = records.len().saturating_mul(MAX_ID_SPREAD).saturating_add(MAX_ID_SLACK);
        if max >= limit {
            return Err(seed_err(format!(
                "id T{max} is too sparse for {} records",
                records.len()
            )));
        }
        let mut slots: Vec<Option<Topic>> = vec![None; max + 1];
        let mut root = None;

        for r in records {
            if slots[r.id.slot()].is_some() {
                return Err(seed_err(format!("duplicate id {}", r.id)));
            }
            if r.parent.is_none() {
                if let Some(prev) = root {
                    return Err(seed_err(format!("two roots: {prev} and {}", r.id)));
                }
                root = Some(r.id);
            }
            let mut topic = Topic::new(r.id, r.parent, r.size);
            topic.children = r.children.clone();
            topic.collapsed = r.collapsed;
            topic.side = r.side;
            if let Some(pos) = r.manual_position {
                topic.manual = true;
                topic.position = pos;
                topic.placed = true;
            }
            slots[r.id.slot()] = Some(topic);
        }
        let root = root.ok_or_else(|| seed_err("no root record".into()))?;

        // Parent/child links must agree in both directions.
        for topic in slots.iter().flatten() {
            for &child in &topic.children {
                let c = slots
                    .get(child.slot())
                    .and_then(Option::as_ref)
                    .ok_or_else(|| seed_err(format!("{} lists missing child {child}", topic.id)))?;
                if c.parent != Some(topic.id) {
                    return Err(seed_err(format!(
                        "{child} is listed by {} but names another parent",
                        topic.id
                    )));
                }
            }
            if let Some(p) = topic.parent {
                let parent = slots
                    .get(p.slot())
                    .and_then(Option::as_ref)
                    .ok_or_else(|| seed_err(format!("{} names missing parent {p}", topic.id)))?;
                let listed = parent.children.iter().filter(|&&c| c == topic.id).count();
                if listed != 1 {
                    return Err(seed_err(format!(
                        "{} appears {listed} times among the children of {p}",
                        topic.id
                    )));
                }
            }
        }

        let tree = Self {
            live: records.len(),
            slots,
            root,
        };

        // Consistent links plus full reachability from the root rule out cycles.
        let reachable = tree.subtree(root).len();
        if reachable != tree.live {
            return Err(seed_err(format!(
                "{} topics are not reachable from the root",
                tree.live - reachable
            )));
        }
        Ok(tree)
    }

    /// Export the persisted shape of every live topic, in id order.
    pub fn to_records(&self) -> Vec<TopicRecord> {
        self.slots
            .iter()
            .flatten()
            .map(|t| TopicRecord {
                id: t.id,
                parent: t.parent,
                children: t.children.clone(),
                size: t.size,
                manual_position: t.manual.then_some(t.position),
                collapsed: t.collapsed,
                side: t.side,
            })
            .collect()
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn root(&self) -> TopicId {
        self.root
    }

    /// Number of live topics (always at least one).
    pub fn topic_count(&self) -> usize {
        self.live
    }

    pub fn contains(&self, id: TopicId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: TopicId) -> Option<&Topic> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    /// Like [`get`](Self::get) but with an [`LayoutError::InvalidReference`].
    pub fn topic(&self, id: TopicId) -> LayoutResult<&Topic> {
        self.get(id).ok_or(LayoutError::InvalidReference(id))
    }

    fn topic_mut(&mut self, id: TopicId) -> LayoutResult<&mut Topic> {
        self.slots
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(LayoutError::InvalidReference(id))
    }

    pub fn parent(&self, id: TopicId) -> Option<TopicId> {
        self.get(id).and_then(|t| t.parent)
    }

    /// Children of `id`; empty for unknown ids.
    pub fn children(&self, id: TopicId) -> &[TopicId] {
        self.get(id).map_or(&[], |t| t.children.as_slice())
    }

    /// Index of `id` in its parent's child list.
    pub fn index_in_parent(&self, id: TopicId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// Iterate live ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = TopicId> + '_ {
        self.slots.iter().flatten().map(|t| t.id)
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: TopicId) -> impl Iterator<Item = TopicId> + '_ {
        successors(self.parent(id), move |&p| self.parent(p))
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: TopicId, id: TopicId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Distance from the root (root = 0).
    pub fn depth(&self, id: TopicId) -> usize {
        self.ancestors(id).count()
    }

    /// `id` and all its descendants in pre-order.
    pub fn subtree(&self, id: TopicId) -> Vec<TopicId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Strict descendants of `id` in pre-order.
    pub fn descendants(&self, id: TopicId) -> Vec<TopicId> {
        let mut all = self.subtree(id);
        if !all.is_empty() {
            all.remove(0);
        }
        all
    }

    /// Children that take part in automatic layout: none if `id` is
    /// collapsed, otherwise every child without a manual position.
    pub fn layout_children(&self, id: TopicId) -> impl Iterator<Item = TopicId> + '_ {
        let topic = self.get(id).filter(|t| !t.collapsed);
        topic
            .into_iter()
            .flat_map(|t| t.children.iter().copied())
            .filter(move |&c| self.get(c).is_some_and(|t| !t.manual))
    }

    /// True when no ancestor of `id` is collapsed.
    pub fn is_visible(&self, id: TopicId) -> bool {
        self.contains(id)
            && self
                .ancestors(id)
                .all(|a| self.get(a).is_some_and(|t| !t.collapsed))
    }

    /// True when `id` is under automatic layout authority: neither it nor an
    /// ancestor carries a manual position.
    pub fn is_auto_positioned(&self, id: TopicId) -> bool {
        self.get(id).is_some_and(|t| !t.manual)
            && self
                .ancestors(id)
                .all(|a| self.get(a).is_some_and(|t| !t.manual))
    }

    /// Visible descendants of `id` (not `id` itself), pre-order, stopping at
    /// collapsed topics.
    pub fn visible_descendants(&self, id: TopicId) -> Vec<TopicId> {
        let mut out = Vec::new();
        let Some(topic) = self.get(id) else {
            return out;
        };
        if topic.collapsed {
            return out;
        }
        let mut stack: Vec<TopicId> = topic.children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(t) = self.get(current).filter(|t| !t.collapsed) {
                stack.extend(t.children.iter().rev().copied());
            }
        }
        out
    }

    /// Box around `id` and its visible descendants.
    pub fn subtree_bounds(&self, id: TopicId) -> Option<Bounds> {
        let topic = self.get(id)?;
        let mut bounds = Bounds::from_center(topic.position, topic.size);
        for d in self.visible_descendants(id) {
            if let Some(t) = self.get(d) {
                bounds = bounds.union(&Bounds::from_center(t.position, t.size));
            }
        }
        Some(bounds)
    }

    // ── Structural mutation ─────────────────────────────────────────

    /// Id the next [`insert`](Self::insert) will hand out. Each insert
    /// advances it by one.
    #[must_use]
    pub fn next_id(&self) -> TopicId {
        TopicId(self.slots.len() as u32)
    }

    /// Insert a new leaf under `parent` at `index` (append when `None`).
    pub fn insert(
        &mut self,
        parent: TopicId,
        index: Option<usize>,
        size: Size,
    ) -> LayoutResult<TopicId> {
        let len = self.topic(parent)?.children.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(LayoutError::IndexOutOfBounds { parent, index, len });
        }
        let id = self.next_id();
        self.slots.push(Some(Topic::new(id, Some(parent), size)));
        self.topic_mut(parent)?.children.insert(index, id);
        self.live += 1;
        Ok(id)
    }

    /// Cut `id` and its whole subtree out of the tree.
    pub fn detach(&mut self, id: TopicId) -> LayoutResult<DetachedSubtree> {
        self.topic(id)?;
        if id == self.root {
            return Err(LayoutError::RootImmutable(id));
        }
        let parent = self.parent(id).ok_or(LayoutError::InvalidReference(id))?;
        let index = self
            .index_in_parent(id)
            .ok_or(LayoutError::InvalidReference(id))?;

        let ids = self.subtree(id);
        let topics: Vec<Topic> = ids
            .iter()
            .filter_map(|&t| self.slots[t.slot()].take())
            .collect();
        self.live -= topics.len();
        self.topic_mut(parent)?.children.remove(index);
        Ok(DetachedSubtree {
            root: id,
            parent,
            index,
            topics,
        })
    }

    /// Put a previously detached subtree back, exactly as it was captured.
    pub fn restore(&mut self, subtree: DetachedSubtree) -> LayoutResult<TopicId> {
        let DetachedSubtree {
            root,
            parent,
            index,
            topics,
        } = subtree;
        let len = self.topic(parent)?.children.len();
        if index > len {
            return Err(LayoutError::IndexOutOfBounds { parent, index, len });
        }
        if let Some(live) = topics.iter().find(|t| self.contains(t.id)) {
            return Err(LayoutError::StructuralViolation {
                topic: live.id,
                target: parent,
                reason: "id is already live",
            });
        }

        let needed = topics.iter().map(|t| t.id.slot() + 1).max().unwrap_or(0);
        if self.slots.len() < needed {
            self.slots.resize(needed, None);
        }
        self.live += topics.len();
        for topic in topics {
            let slot = topic.id.slot();
            self.slots[slot] = Some(topic);
        }
        self.topic_mut(parent)?.children.insert(index, root);
        Ok(root)
    }

    /// Reparent and/or reorder `id` to position `index` under `new_parent`.
    ///
    /// `index` is interpreted after `id` has been taken out of its current
    /// parent. Returns the former `(parent, index)`, which is exactly the
    /// argument pair that undoes the move.
    pub fn move_to(
        &mut self,
        id: TopicId,
        new_parent: TopicId,
        index: usize,
    ) -> LayoutResult<(TopicId, usize)> {
        self.topic(id)?;
        self.topic(new_parent)?;
        if id == self.root {
            return Err(LayoutError::RootImmutable(id));
        }
        if new_parent == id || self.is_ancestor_of(id, new_parent) {
            return Err(LayoutError::StructuralViolation {
                topic: id,
                target: new_parent,
                reason: "target is the topic itself or one of its descendants",
            });
        }
        let old_parent = self.parent(id).ok_or(LayoutError::InvalidReference(id))?;
        let old_index = self
            .index_in_parent(id)
            .ok_or(LayoutError::InvalidReference(id))?;
        let len_after_removal = if old_parent == new_parent {
            self.children(new_parent).len() - 1
        } else {
            self.children(new_parent).len()
        };
        if index > len_after_removal {
            return Err(LayoutError::IndexOutOfBounds {
                parent: new_parent,
                index,
                len: len_after_removal,
            });
        }

        self.topic_mut(old_parent)?.children.remove(old_index);
        self.topic_mut(new_parent)?.children.insert(index, id);
        self.topic_mut(id)?.parent = Some(new_parent);
        Ok((old_parent, old_index))
    }

    // ── Field mutation ──────────────────────────────────────────────

    /// Returns the previous size.
    pub fn set_size(&mut self, id: TopicId, size: Size) -> LayoutResult<Size> {
        let topic = self.topic_mut(id)?;
        Ok(std::mem::replace(&mut topic.size, size))
    }

    /// Store a position and mark the topic placed. Returns the previous one.
    pub fn set_position(&mut self, id: TopicId, position: Position) -> LayoutResult<Position> {
        let topic = self.topic_mut(id)?;
        topic.placed = true;
        Ok(std::mem::replace(&mut topic.position, position))
    }

    /// Restore a position together with its placed flag, verbatim.
    pub fn restore_position(
        &mut self,
        id: TopicId,
        position: Position,
        placed: bool,
    ) -> LayoutResult<()> {
        let topic = self.topic_mut(id)?;
        topic.position = position;
        topic.placed = placed;
        Ok(())
    }

    /// Returns the previous flag.
    pub fn set_manual(&mut self, id: TopicId, manual: bool) -> LayoutResult<bool> {
        let topic = self.topic_mut(id)?;
        Ok(std::mem::replace(&mut topic.manual, manual))
    }

    /// Returns the previous flag.
    pub fn set_collapsed(&mut self, id: TopicId, collapsed: bool) -> LayoutResult<bool> {
        let topic = self.topic_mut(id)?;
        Ok(std::mem::replace(&mut topic.collapsed, collapsed))
    }

    /// Returns the previous side.
    pub fn set_side(&mut self, id: TopicId, side: Option<Side>) -> LayoutResult<Option<Side>> {
        let topic = self.topic_mut(id)?;
        Ok(std::mem::replace(&mut topic.side, side))
    }
}
