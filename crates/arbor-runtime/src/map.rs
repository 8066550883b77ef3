#![forbid(unsafe_code)]

//! The document session.
//!
//! A [`MindMap`] is one open map: its topic tree, layout manager, event bus
//! and undo history. Every edit goes through the history as an
//! [`UndoableCmd`], so each one can be undone and redone. Dropping the
//! `MindMap` closes the document and ends its bus.
//!
//! ```rust,ignore
//! let mut map = MindMap::new(Size::new(120.0, 40.0), MapConfig::default())?;
//! let _sub = map.subscribe(MapEventKind::PositionChanged, |ev| render(ev));
//! let idea = map.add_topic(map.tree().root(), Size::new(80.0, 24.0))?;
//! map.resize_topic(idea, Size::new(96.0, 24.0))?;
//! map.undo();
//! ```

use std::fmt;

use arbor_core::bus::{EventBus, Subscription};
use arbor_core::geometry::{Position, Size};
use arbor_layout::{
    LayoutConfig, LayoutError, LayoutManager, MapEvent, MapEventKind, StrategyKind, Topic,
    TopicId, TopicRecord, TopicTree,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::{ConfigError, MapConfig};
use crate::measure::ContentMeasurer;
use crate::undo::{
    CommandBatch, CommandError, CommandMetadata, CommandResult, CommandSource, HistoryManager,
    TopicCmd, TopicEdit, UndoableCmd,
};

// ============================================================================
// MapState
// ============================================================================

/// Everything a command edits: the tree, the manager that lays it out, and
/// the bus the manager publishes on.
#[derive(Debug)]
pub struct MapState {
    pub tree: TopicTree,
    pub layout: LayoutManager,
    pub bus: EventBus<MapEvent>,
}

impl MapState {
    /// A map holding only a root, fully laid out.
    #[must_use]
    pub fn new(root_size: Size, config: LayoutConfig) -> Self {
        Self::from_tree(TopicTree::new(root_size), config)
    }

    /// Wrap an existing tree and run a full layout pass over it.
    #[must_use]
    pub fn from_tree(mut tree: TopicTree, config: LayoutConfig) -> Self {
        let bus = EventBus::new();
        let mut layout = LayoutManager::new(config);
        layout.recompute_all(&mut tree, &bus);
        Self { tree, layout, bus }
    }
}

// ============================================================================
// MapError
// ============================================================================

/// Errors opening a map.
#[derive(Debug)]
pub enum MapError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// The persisted records do not form a valid tree.
    Layout(LayoutError),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "map configuration: {e}"),
            Self::Layout(e) => write!(f, "map contents: {e}"),
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Layout(e) => Some(e),
        }
    }
}

impl From<ConfigError> for MapError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LayoutError> for MapError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

// ============================================================================
// SubtreeTemplate
// ============================================================================

/// Shape and sizes of a subtree, detached from any map. Used as clipboard
/// contents for [`MindMap::paste_subtree`].
///
/// Nodes are kept in pre-order; node 0 is the template root and every other
/// node names an earlier node as its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeTemplate {
    nodes: Vec<(Option<usize>, Size)>,
}

impl SubtreeTemplate {
    /// A template holding only a root.
    #[must_use]
    pub fn new(root_size: Size) -> Self {
        Self {
            nodes: vec![(None, root_size)],
        }
    }

    /// Append a child of node `parent`. Returns the new node's index, or
    /// `None` if `parent` is not in the template.
    pub fn push(&mut self, parent: usize, size: Size) -> Option<usize> {
        if parent >= self.nodes.len() {
            return None;
        }
        self.nodes.push((Some(parent), size));
        Some(self.nodes.len() - 1)
    }

    /// Copy the shape of `id`'s subtree out of `tree`.
    pub fn from_tree(tree: &TopicTree, id: TopicId) -> Result<Self, LayoutError> {
        let root = tree.topic(id)?;
        let mut template = Self::new(root.size());
        let mut index: FxHashMap<TopicId, usize> = FxHashMap::default();
        index.insert(id, 0);
        for topic in tree.descendants(id) {
            let parent = tree
                .parent(topic)
                .and_then(|p| index.get(&p).copied())
                .ok_or(LayoutError::InvalidReference(topic))?;
            let size = tree.topic(topic)?.size();
            template.nodes.push((Some(parent), size));
            index.insert(topic, template.nodes.len() - 1);
        }
        Ok(template)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; a template has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Size of node `index`.
    #[must_use]
    pub fn size(&self, index: usize) -> Option<Size> {
        self.nodes.get(index).map(|&(_, size)| size)
    }

    /// Parent of node `index`; `None` for the root.
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.nodes.get(index).and_then(|&(parent, _)| parent)
    }
}

// ============================================================================
// MindMap
// ============================================================================

/// One open mind-map document.
#[derive(Debug)]
pub struct MindMap {
    state: MapState,
    history: HistoryManager,
    config: MapConfig,
}

impl MindMap {
    // ── Lifecycle ───────────────────────────────────────────────────

    /// New map holding only a root of `root_size`.
    pub fn new(root_size: Size, config: MapConfig) -> Result<Self, MapError> {
        let config = config.validated()?;
        Ok(Self::with_state(
            MapState::new(root_size, config.layout.clone()),
            config,
        ))
    }

    /// Open a map from persisted records and lay it out.
    pub fn open(records: &[TopicRecord], config: MapConfig) -> Result<Self, MapError> {
        let config = config.validated()?;
        let tree = TopicTree::from_records(records)?;
        debug!(topics = tree.topic_count(), "map opened");
        Ok(Self::with_state(
            MapState::from_tree(tree, config.layout.clone()),
            config,
        ))
    }

    fn with_state(state: MapState, config: MapConfig) -> Self {
        Self {
            state,
            history: HistoryManager::new(config.history.clone()),
            config,
        }
    }

    /// Persisted shape of every topic, for the persistence layer.
    #[must_use]
    pub fn to_records(&self) -> Vec<TopicRecord> {
        self.state.tree.to_records()
    }

    // ── Edits ───────────────────────────────────────────────────────

    /// Execute `cmd` and record it in history.
    pub fn submit(&mut self, cmd: Box<dyn UndoableCmd>) -> CommandResult {
        self.history.execute(cmd, &mut self.state)
    }

    fn edit(&mut self, edit: TopicEdit) -> CommandResult {
        self.submit(Box::new(TopicCmd::new(edit)))
    }

    /// Append a new leaf under `parent`.
    pub fn add_topic(&mut self, parent: TopicId, size: Size) -> CommandResult<TopicId> {
        self.insert_topic(parent, None, size)
    }

    /// Insert a new leaf under `parent` at `index` (append when `None`).
    pub fn insert_topic(
        &mut self,
        parent: TopicId,
        index: Option<usize>,
        size: Size,
    ) -> CommandResult<TopicId> {
        let id = self.state.tree.next_id();
        self.edit(TopicEdit::AddTopic {
            parent,
            index,
            size,
            side: None,
        })?;
        Ok(id)
    }

    /// Remove `id` and its subtree.
    pub fn remove_topic(&mut self, id: TopicId) -> CommandResult {
        self.edit(TopicEdit::RemoveTopic { id })
    }

    /// Reparent or reorder `id`.
    pub fn move_topic(&mut self, id: TopicId, new_parent: TopicId, index: usize) -> CommandResult {
        self.edit(TopicEdit::MoveTopic {
            id,
            new_parent,
            index,
        })
    }

    pub fn resize_topic(&mut self, id: TopicId, size: Size) -> CommandResult {
        self.edit(TopicEdit::ResizeTopic { id, size })
    }

    /// Drop `id` at `position` (its center), carrying its subtree along.
    pub fn drag_topic(&mut self, id: TopicId, position: Position) -> CommandResult {
        self.edit(TopicEdit::DragTopic { id, position })
    }

    /// Return a dragged topic to automatic layout.
    pub fn reset_position(&mut self, id: TopicId) -> CommandResult {
        self.edit(TopicEdit::ResetManualPosition { id })
    }

    pub fn set_collapsed(&mut self, id: TopicId, collapsed: bool) -> CommandResult {
        self.edit(TopicEdit::SetCollapsed { id, collapsed })
    }

    /// Flip `id`'s collapsed flag. Returns the new value.
    pub fn toggle_collapsed(&mut self, id: TopicId) -> CommandResult<bool> {
        let collapsed = !self.state.tree.topic(id)?.is_collapsed();
        self.set_collapsed(id, collapsed)?;
        Ok(collapsed)
    }

    pub fn set_strategy(&mut self, kind: StrategyKind) -> CommandResult {
        self.edit(TopicEdit::SetStrategy { kind })
    }

    /// Copy `id`'s subtree shape for a later paste.
    pub fn copy_subtree(&self, id: TopicId) -> CommandResult<SubtreeTemplate> {
        Ok(SubtreeTemplate::from_tree(&self.state.tree, id)?)
    }

    /// Insert a copy of `template` under `parent` as one undoable step.
    /// Returns the id of the pasted root.
    pub fn paste_subtree(
        &mut self,
        parent: TopicId,
        template: &SubtreeTemplate,
    ) -> CommandResult<TopicId> {
        self.state.tree.topic(parent)?;
        // Each add in the batch takes the next id in turn.
        let base = self.state.tree.next_id().raw();
        let id_of = |index: usize| TopicId::from_raw(base + index as u32);

        let mut batch = CommandBatch::new("Paste subtree");
        for &(node_parent, size) in &template.nodes {
            let parent = node_parent.map_or(parent, id_of);
            batch.push(Box::new(TopicCmd::new(TopicEdit::AddTopic {
                parent,
                index: None,
                size,
                side: None,
            })));
        }
        self.submit(Box::new(batch))?;
        Ok(id_of(0))
    }

    /// Re-measure `id`'s content and record a resize if it changed.
    /// Returns whether a resize was recorded.
    pub fn content_changed(
        &mut self,
        id: TopicId,
        measurer: &dyn ContentMeasurer,
    ) -> CommandResult<bool> {
        let current = self.state.tree.topic(id)?.size();
        let Some(size) = measurer.natural_size(id) else {
            return Ok(false);
        };
        if size.bit_eq(&current) {
            return Ok(false);
        }
        // Measured resizes only merge with each other, never with a user's.
        let edit = TopicEdit::ResizeTopic { id, size };
        let metadata = CommandMetadata::new(edit.label()).with_source(CommandSource::Programmatic);
        self.submit(Box::new(TopicCmd::new(edit).with_metadata(metadata)))?;
        Ok(true)
    }

    // ── History ─────────────────────────────────────────────────────

    /// Undo the last edit. `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<Result<String, CommandError>> {
        self.history.undo(&mut self.state)
    }

    /// Redo the last undone edit. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<Result<String, CommandError>> {
        self.history.redo(&mut self.state)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    #[must_use]
    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Center of `id`, if it exists.
    #[must_use]
    pub fn position(&self, id: TopicId) -> Option<Position> {
        self.state.tree.get(id).map(Topic::position)
    }

    /// Stored content size of `id`, if it exists.
    #[must_use]
    pub fn size(&self, id: TopicId) -> Option<Size> {
        self.state.tree.get(id).map(Topic::size)
    }

    #[must_use]
    pub fn topic(&self, id: TopicId) -> Option<&Topic> {
        self.state.tree.get(id)
    }

    #[must_use]
    pub fn tree(&self) -> &TopicTree {
        &self.state.tree
    }

    #[must_use]
    pub fn layout(&self) -> &LayoutManager {
        &self.state.layout
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus<MapEvent> {
        &self.state.bus
    }

    #[must_use]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Register `handler` for events of `kind`. Dropping the returned
    /// guard unsubscribes.
    pub fn subscribe(&self, kind: MapEventKind, handler: impl Fn(&MapEvent) + 'static) -> Subscription {
        self.state.bus.subscribe(kind, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn map() -> MindMap {
        MindMap::new(Size::new(100.0, 40.0), MapConfig::default()).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = MapConfig::default();
        config.history.max_depth = 0;
        let err = MindMap::new(Size::new(10.0, 10.0), config).unwrap_err();
        assert!(matches!(err, MapError::Config(ConfigError::Validation(_))));
        assert!(err.to_string().starts_with("map configuration"));
    }

    #[test]
    fn root_sits_at_the_origin() {
        let map = map();
        assert_eq!(map.position(map.tree().root()), Some(Position::ORIGIN));
        assert!(!map.can_undo());
    }

    #[test]
    fn add_returns_the_assigned_id() {
        let mut map = map();
        let root = map.tree().root();
        let a = map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        let b = map.insert_topic(root, Some(0), Size::new(40.0, 20.0)).unwrap();
        assert_eq!(map.tree().children(root), &[b, a]);
        assert_eq!(map.history().undo_depth(), 2);
    }

    #[test]
    fn failed_add_is_not_recorded() {
        let mut map = map();
        let before = map.tree().clone();
        let err = map
            .add_topic(TopicId::from_raw(42), Size::new(1.0, 1.0))
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Layout(LayoutError::InvalidReference(TopicId::from_raw(42)))
        );
        assert_eq!(map.tree(), &before);
        assert!(!map.can_undo());
    }

    #[test]
    fn toggle_flips_and_undoes() {
        let mut map = map();
        let root = map.tree().root();
        map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        assert_eq!(map.toggle_collapsed(root), Ok(true));
        assert!(map.topic(root).unwrap().is_collapsed());
        assert_eq!(map.undo(), Some(Ok("Collapse topic".to_string())));
        assert!(!map.topic(root).unwrap().is_collapsed());
    }

    #[test]
    fn copy_then_paste_reproduces_the_shape() {
        let mut map = map();
        let root = map.tree().root();
        let a = map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        let a1 = map.add_topic(a, Size::new(30.0, 10.0)).unwrap();
        map.add_topic(a1, Size::new(20.0, 10.0)).unwrap();
        map.add_topic(a, Size::new(25.0, 10.0)).unwrap();

        let template = map.copy_subtree(a).unwrap();
        assert_eq!(template.len(), 4);
        assert_eq!(template.parent(2), Some(1));
        assert_eq!(template.parent(3), Some(0));

        let pasted = map.paste_subtree(root, &template).unwrap();
        assert_eq!(map.tree().parent(pasted), Some(root));
        assert_eq!(SubtreeTemplate::from_tree(map.tree(), pasted).unwrap(), template);
        assert_eq!(map.history().next_undo_description(), Some("Paste subtree"));
    }

    #[test]
    fn template_push_checks_the_parent() {
        let mut template = SubtreeTemplate::new(Size::new(10.0, 10.0));
        assert_eq!(template.push(0, Size::new(5.0, 5.0)), Some(1));
        assert_eq!(template.push(7, Size::new(5.0, 5.0)), None);
        assert_eq!(template.size(1), Some(Size::new(5.0, 5.0)));
        assert!(!template.is_empty());
    }

    #[test]
    fn content_changed_only_records_real_changes() {
        let mut map = map();
        let root = map.tree().root();
        let same = |_: TopicId| Some(Size::new(100.0, 40.0));
        assert_eq!(map.content_changed(root, &same), Ok(false));
        let unknown = |_: TopicId| -> Option<Size> { None };
        assert_eq!(map.content_changed(root, &unknown), Ok(false));
        assert!(!map.can_undo());

        let wider = |_: TopicId| Some(Size::new(140.0, 40.0));
        assert_eq!(map.content_changed(root, &wider), Ok(true));
        assert_eq!(map.size(root), Some(Size::new(140.0, 40.0)));
        assert_eq!(map.history().next_undo_description(), Some("Resize topic"));

        // A user resize right after a measured one stays its own entry.
        map.resize_topic(root, Size::new(150.0, 40.0)).unwrap();
        assert_eq!(map.history().undo_depth(), 2);
        map.undo().unwrap().unwrap();
        assert_eq!(map.size(root), Some(Size::new(140.0, 40.0)));
    }

    #[test]
    fn subscribers_see_edits() {
        let map_events = Rc::new(RefCell::new(Vec::new()));
        let mut map = map();
        let sink = map_events.clone();
        let sub = map.subscribe(MapEventKind::Added, move |ev| sink.borrow_mut().push(*ev));
        let root = map.tree().root();
        let a = map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        assert_eq!(
            map_events.borrow().as_slice(),
            &[MapEvent::Added { id: a, parent: root }]
        );
        drop(sub);
        map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        assert_eq!(map_events.borrow().len(), 1);
    }

    #[test]
    fn records_round_trip_through_open() {
        let mut map = map();
        let root = map.tree().root();
        let a = map.add_topic(root, Size::new(40.0, 20.0)).unwrap();
        map.add_topic(a, Size::new(30.0, 10.0)).unwrap();
        let at = map.position(a).unwrap().translate(0.0, 50.0);
        map.drag_topic(a, at).unwrap();

        let reopened = MindMap::open(&map.to_records(), MapConfig::default()).unwrap();
        assert_eq!(reopened.to_records(), map.to_records());
        assert_eq!(reopened.position(a), Some(at));
        assert!(!reopened.can_undo());
    }

    #[test]
    fn open_rejects_bad_records() {
        let err = MindMap::open(&[], MapConfig::default()).unwrap_err();
        assert!(matches!(err, MapError::Layout(LayoutError::InvalidSeed(_))));
    }
}
