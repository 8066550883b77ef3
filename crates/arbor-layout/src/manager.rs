#![forbid(unsafe_code)]

//! Incremental layout manager.
//!
//! Owns the active [`Strategy`], a per-topic [`Extent`] cache and a dirty
//! set. Every edit hook marks the touched topic and its ancestor chain dirty
//! and runs one pass:
//!
//! 1. **Measure.** Walk down from the root through dirty or uncached topics
//!    only; clean siblings are read from the cache.
//! 2. **Frame.** Re-derive the map-wide frame from the root's children.
//! 3. **Arrange.** Walk down from the root again, descending only into
//!    topics that were re-measured, moved, never placed, or still dirty. When
//!    the frame changed, everything is arranged.
//! 4. **Commit, then publish.** Positions are written to the tree during the
//!    walk; events go out afterwards, structural first, then sizes, then
//!    positions in tree pre-order.
//!
//! # Key Invariant
//!
//! Every position is computed from the same formula as a full pass, never by
//! applying deltas, so an incremental pass leaves the tree bit-identical to
//! [`LayoutManager::recompute_all`] on the same model.

use arbor_core::bus::EventBus;
use arbor_core::geometry::Size;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, debug_span};

use crate::config::{LayoutConfig, StrategyKind};
use crate::error::LayoutResult;
use crate::event::MapEvent;
use crate::strategy::{Extent, ExtentMap, Frame, LayoutStrategy, Slot, Strategy, child_slots};
use crate::topic::{DetachedSubtree, Side, Topic, TopicId, TopicTree};

// ============================================================================
// PassReport
// ============================================================================

/// What one layout pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// The frame changed (or the cache was cold), so every topic under
    /// automatic layout was arranged.
    pub full: bool,
    /// Topics whose extent was recomputed.
    pub measured: usize,
    /// Topics whose children were arranged.
    pub arranged: usize,
    /// Topics whose stored position changed.
    pub moved: usize,
    /// Topics whose size changed since observers last heard about it.
    pub resized: usize,
    /// Events delivered to the bus.
    pub published: usize,
}

// ============================================================================
// LayoutManager
// ============================================================================

/// Decides recomputation scope, runs the active strategy and commits its
/// output to the tree.
#[derive(Debug)]
pub struct LayoutManager {
    config: LayoutConfig,
    strategy: Strategy,
    extents: ExtentMap,
    dirty: FxHashSet<TopicId>,
    frame: Option<Frame>,
    /// Last size observers were told about, per topic.
    sizes: FxHashMap<TopicId, Size>,
    structural: Vec<MapEvent>,
    size_events: Vec<MapEvent>,
    /// Topics whose position (and visible subtree) is published next pass
    /// even if unchanged.
    announce: FxHashSet<TopicId>,
    /// Expanded topics whose visible descendants are published next pass.
    reveal: FxHashSet<TopicId>,
    force_full: bool,
    passes: u64,
    last: PassReport,
}

impl LayoutManager {
    #[must_use]
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            strategy: Strategy::new(&config),
            config,
            extents: ExtentMap::default(),
            dirty: FxHashSet::default(),
            frame: None,
            sizes: FxHashMap::default(),
            structural: Vec::new(),
            size_events: Vec::new(),
            announce: FxHashSet::default(),
            reveal: FxHashSet::default(),
            force_full: false,
            passes: 0,
            last: PassReport::default(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Cached extent of `id`, if measured.
    pub fn extent(&self, id: TopicId) -> Option<&Extent> {
        self.extents.get(&id)
    }

    pub fn is_dirty(&self, id: TopicId) -> bool {
        self.dirty.contains(&id)
    }

    pub fn cache_len(&self) -> usize {
        self.extents.len()
    }

    /// Report of the most recent pass.
    pub fn last_report(&self) -> &PassReport {
        &self.last
    }

    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    /// When enabled, every pass drops the cache and recomputes from scratch.
    pub fn set_force_full(&mut self, force: bool) {
        self.force_full = force;
    }

    #[must_use]
    pub fn force_full(&self) -> bool {
        self.force_full
    }

    /// Side a new child of `parent` should store at creation time. Only the
    /// symmetric strategy uses stored sides; the others return `None`.
    pub fn preferred_side(&self, tree: &TopicTree, parent: TopicId) -> LayoutResult<Option<Side>> {
        tree.topic(parent)?;
        Ok(self.strategy.creation_side(tree, parent, &self.extents))
    }

    // ── Edit hooks ──────────────────────────────────────────────────

    /// `id` (with any subtree it carries) was inserted or restored.
    pub fn on_node_added(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
    ) -> LayoutResult<PassReport> {
        tree.topic(id)?;
        for topic in tree.subtree(id) {
            if let Some(parent) = tree.parent(topic) {
                self.structural.push(MapEvent::Added { id: topic, parent });
            }
            self.extents.remove(&topic);
        }
        self.announce.insert(id);
        self.mark_dirty_with_ancestors(tree, id);
        Ok(self.run_pass(tree, bus, "added"))
    }

    /// `removed` was cut out of the tree.
    pub fn on_node_removed(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        removed: &DetachedSubtree,
    ) -> LayoutResult<PassReport> {
        let parent = removed.parent();
        tree.topic(parent)?;
        for id in removed.ids() {
            self.structural.push(MapEvent::Removed { id });
            self.forget(id);
        }
        self.mark_dirty_with_ancestors(tree, parent);
        Ok(self.run_pass(tree, bus, "removed"))
    }

    /// `id`'s size was set.
    pub fn on_node_resized(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
    ) -> LayoutResult<PassReport> {
        let size = tree.topic(id)?.size();
        self.note_size(id, size);
        self.mark_dirty_with_ancestors(tree, id);
        Ok(self.run_pass(tree, bus, "resized"))
    }

    /// `parent`'s child order changed.
    pub fn on_node_reordered(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        parent: TopicId,
    ) -> LayoutResult<PassReport> {
        tree.topic(parent)?;
        self.mark_dirty_with_ancestors(tree, parent);
        Ok(self.run_pass(tree, bus, "reordered"))
    }

    /// `id` was reparented away from `old_parent`.
    pub fn on_node_moved(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
        old_parent: TopicId,
    ) -> LayoutResult<PassReport> {
        tree.topic(id)?;
        tree.topic(old_parent)?;
        self.mark_dirty_with_ancestors(tree, old_parent);
        self.mark_dirty_with_ancestors(tree, id);
        Ok(self.run_pass(tree, bus, "moved"))
    }

    /// `id` was collapsed or expanded.
    pub fn on_collapse_toggled(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
    ) -> LayoutResult<PassReport> {
        if !tree.topic(id)?.is_collapsed() {
            self.reveal.insert(id);
        }
        self.mark_dirty_with_ancestors(tree, id);
        Ok(self.run_pass(tree, bus, "collapse"))
    }

    /// Positions in `id`'s subtree were set by hand (a drag, or undoing
    /// one). The whole visible subtree is republished.
    pub fn on_node_dragged(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
    ) -> LayoutResult<PassReport> {
        self.positions_overridden(tree, bus, id, "dragged")
    }

    /// `id` lost its manual position and returns to automatic layout.
    pub fn on_manual_cleared(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
    ) -> LayoutResult<PassReport> {
        self.positions_overridden(tree, bus, id, "manual_cleared")
    }

    /// Switch strategy and recompute the whole tree.
    pub fn set_strategy(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        kind: StrategyKind,
    ) -> PassReport {
        self.config.strategy = kind;
        self.strategy = Strategy::new(&self.config);
        self.recompute_all(tree, bus)
    }

    /// Full recomputation: drop every cached extent and arrange everything.
    pub fn recompute_all(&mut self, tree: &mut TopicTree, bus: &EventBus<MapEvent>) -> PassReport {
        self.invalidate_all();
        self.run_pass(tree, bus, "all")
    }

    // ── Internals ───────────────────────────────────────────────────

    fn positions_overridden(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        id: TopicId,
        scope: &'static str,
    ) -> LayoutResult<PassReport> {
        tree.topic(id)?;
        self.announce.insert(id);
        self.mark_dirty_with_ancestors(tree, id);
        Ok(self.run_pass(tree, bus, scope))
    }

    fn invalidate_all(&mut self) {
        self.extents.clear();
        self.dirty.clear();
        self.frame = None;
    }

    fn mark_dirty_with_ancestors(&mut self, tree: &TopicTree, id: TopicId) {
        self.dirty.insert(id);
        self.dirty.extend(tree.ancestors(id));
    }

    fn forget(&mut self, id: TopicId) {
        self.extents.remove(&id);
        self.dirty.remove(&id);
        self.sizes.remove(&id);
        self.announce.remove(&id);
        self.reveal.remove(&id);
    }

    /// Record `size` as current; queue an event if observers knew another.
    fn note_size(&mut self, id: TopicId, size: Size) {
        match self.sizes.insert(id, size) {
            Some(prev) if !prev.bit_eq(&size) => {
                self.size_events.push(MapEvent::SizeChanged { id, size });
            }
            _ => {}
        }
    }

    /// Re-measure every dirty or uncached topic under `root`, children
    /// before their parent.
    fn refresh(&mut self, tree: &TopicTree, root: TopicId, measured: &mut FxHashSet<TopicId>) {
        let mut stack = vec![(root, false)];
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                let extent = self.strategy.measure(tree, id, &self.extents);
                self.extents.insert(id, extent);
                self.dirty.remove(&id);
                measured.insert(id);
                if let Some(topic) = tree.get(id) {
                    self.note_size(id, topic.size());
                }
                continue;
            }
            if !self.dirty.contains(&id) && self.extents.contains_key(&id) {
                continue;
            }
            stack.push((id, true));
            let children: Vec<TopicId> = tree.layout_children(id).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, false)));
        }
    }

    fn run_pass(
        &mut self,
        tree: &mut TopicTree,
        bus: &EventBus<MapEvent>,
        scope: &'static str,
    ) -> PassReport {
        if self.force_full {
            self.invalidate_all();
        }
        let span = debug_span!(
            "layout.pass",
            scope,
            strategy = %self.strategy.kind(),
            full = tracing::field::Empty,
            measured = tracing::field::Empty,
            arranged = tracing::field::Empty,
            moved = tracing::field::Empty,
            resized = tracing::field::Empty
        );
        let _guard = span.enter();

        let root = tree.root();
        let mut measured = FxHashSet::default();
        self.refresh(tree, root, &mut measured);

        let frame = self.strategy.frame(tree, &self.extents);
        let full = self.frame.as_ref() != Some(&frame);

        let mut arrange = Arrange {
            strategy: &self.strategy,
            extents: &self.extents,
            frame: &frame,
            measured: &measured,
            dirty: &self.dirty,
            announce: &self.announce,
            reveal: &self.reveal,
            full,
            arranged: 0,
            moved: 0,
            positions: Vec::new(),
        };
        arrange.run(tree, root);
        let Arrange {
            arranged,
            moved,
            positions,
            ..
        } = arrange;
        self.frame = Some(frame);

        // The model is fully committed; only now do observers hear about it.
        let resized = self.size_events.len();
        let mut published = 0;
        for event in self
            .structural
            .drain(..)
            .chain(self.size_events.drain(..))
            .chain(positions)
        {
            bus.publish(&event);
            published += 1;
        }
        self.announce.clear();
        self.reveal.clear();
        self.passes += 1;

        span.record("full", full);
        span.record("measured", measured.len());
        span.record("arranged", arranged);
        span.record("moved", moved);
        span.record("resized", resized);
        debug!(
            scope,
            measured = measured.len(),
            moved,
            published,
            "layout pass complete"
        );

        self.last = PassReport {
            full,
            measured: measured.len(),
            arranged,
            moved,
            resized,
            published,
        };
        self.last.clone()
    }
}

// ============================================================================
// Arrange walk
// ============================================================================

/// State of one top-down arrange walk.
struct Arrange<'a> {
    strategy: &'a Strategy,
    extents: &'a ExtentMap,
    frame: &'a Frame,
    measured: &'a FxHashSet<TopicId>,
    dirty: &'a FxHashSet<TopicId>,
    announce: &'a FxHashSet<TopicId>,
    reveal: &'a FxHashSet<TopicId>,
    full: bool,
    arranged: usize,
    moved: usize,
    positions: Vec<MapEvent>,
}

impl Arrange<'_> {
    /// Write `slot` to `id` if layout computed it and it differs. Returns
    /// true when the stored position changed.
    fn commit(&mut self, tree: &mut TopicTree, id: TopicId, slot: &Slot, announced: bool) -> bool {
        let Some(topic) = tree.get(id) else {
            return false;
        };
        let changed = slot.computed
            && (!topic.is_placed() || !topic.position().bit_eq(&slot.position))
            && tree.set_position(id, slot.position).is_ok();
        if changed {
            self.moved += 1;
        }
        if changed || announced {
            self.positions.push(MapEvent::PositionChanged {
                id,
                position: slot.position,
            });
        }
        changed
    }

    /// Commit the root, then walk down in pre-order. A child's subtree is
    /// only entered when something below it may have to move.
    fn run(&mut self, tree: &mut TopicTree, root: TopicId) {
        let root_announced = self.announce.contains(&root);
        self.commit(tree, root, &Slot::ROOT, root_announced);
        let mut pending = Vec::new();
        self.expand(tree, root, &Slot::ROOT, root_announced, &mut pending);

        while let Some((child, slot, forced)) = pending.pop() {
            let was_placed = tree.get(child).is_some_and(Topic::is_placed);
            let announced = forced || self.announce.contains(&child);
            let moved = self.commit(tree, child, &slot, announced);
            let descend = announced
                || moved
                || !was_placed
                || self.full
                || self.measured.contains(&child)
                || self.dirty.contains(&child);
            if descend {
                self.expand(tree, child, &slot, announced, &mut pending);
            }
        }
    }

    /// Arrange `id`'s children and queue them so they pop in child order.
    fn expand(
        &mut self,
        tree: &TopicTree,
        id: TopicId,
        slot: &Slot,
        forced: bool,
        pending: &mut Vec<(TopicId, Slot, bool)>,
    ) {
        self.arranged += 1;
        let forced = forced || self.reveal.contains(&id);
        let slots = child_slots(self.strategy, tree, id, slot, self.frame, self.extents);
        pending.extend(
            slots
                .into_iter()
                .rev()
                .map(|(child, child_slot)| (child, child_slot, forced)),
        );
    }
}
