#![forbid(unsafe_code)]

//! Built-in map edits.
//!
//! A [`TopicCmd`] pairs one [`TopicEdit`] (the forward parameters) with an
//! inverse snapshot captured the first time the edit applies. Undo replays
//! the snapshot and then asks the layout manager for the same scoped pass
//! the forward edit ran; it never re-derives old positions from layout.
//!
//! | Edit                  | Captured inverse                              |
//! |-----------------------|-----------------------------------------------|
//! | `AddTopic`            | assigned id; detached topic while undone       |
//! | `RemoveTopic`         | the whole detached subtree, verbatim           |
//! | `MoveTopic`           | former parent, index and subtree positions     |
//! | `ResizeTopic`         | former size                                    |
//! | `DragTopic`           | every subtree position and the manual flag     |
//! | `ResetManualPosition` | every subtree position                         |
//! | `SetCollapsed`        | former flag and subtree positions              |
//! | `SetStrategy`         | former strategy and every position             |

use std::any::Any;
use std::fmt;
use std::time::Duration;

use arbor_core::geometry::{Position, Size};
use arbor_layout::{DetachedSubtree, LayoutError, Side, StrategyKind, TopicId, TopicTree};

use super::command::{CommandError, CommandMetadata, CommandResult, MergeConfig, UndoableCmd};
use crate::map::MapState;

// ============================================================================
// TopicEdit
// ============================================================================

/// Forward parameters of a built-in edit.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEdit {
    /// Insert a leaf under `parent` at `index` (append when `None`). With no
    /// `side`, the active strategy picks one.
    AddTopic {
        parent: TopicId,
        index: Option<usize>,
        size: Size,
        side: Option<Side>,
    },
    /// Remove a topic and its whole subtree.
    RemoveTopic { id: TopicId },
    /// Reparent and/or reorder. `index` counts siblings after `id` has left
    /// its current parent.
    MoveTopic {
        id: TopicId,
        new_parent: TopicId,
        index: usize,
    },
    /// Set a topic's measured content size.
    ResizeTopic { id: TopicId, size: Size },
    /// Put a topic's center at `position`, carrying its subtree along, and
    /// take it out of automatic layout.
    DragTopic { id: TopicId, position: Position },
    /// Hand a dragged topic back to automatic layout.
    ResetManualPosition { id: TopicId },
    /// Collapse or expand a topic.
    SetCollapsed { id: TopicId, collapsed: bool },
    /// Switch the map's layout strategy.
    SetStrategy { kind: StrategyKind },
}

impl TopicEdit {
    /// UI label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::AddTopic { .. } => "Add topic",
            Self::RemoveTopic { .. } => "Remove topic",
            Self::MoveTopic { .. } => "Move topic",
            Self::ResizeTopic { .. } => "Resize topic",
            Self::DragTopic { .. } => "Drag topic",
            Self::ResetManualPosition { .. } => "Reset topic position",
            Self::SetCollapsed {
                collapsed: true, ..
            } => "Collapse topic",
            Self::SetCollapsed { .. } => "Expand topic",
            Self::SetStrategy { .. } => "Change layout strategy",
        }
    }

    /// Topic named by the edit, if any.
    #[must_use]
    pub fn topic(&self) -> Option<TopicId> {
        match *self {
            Self::RemoveTopic { id }
            | Self::MoveTopic { id, .. }
            | Self::ResizeTopic { id, .. }
            | Self::DragTopic { id, .. }
            | Self::ResetManualPosition { id }
            | Self::SetCollapsed { id, .. } => Some(id),
            Self::AddTopic { .. } | Self::SetStrategy { .. } => None,
        }
    }

    /// Apply the edit for the first time and capture what undoes it.
    fn apply(&self, map: &mut MapState) -> CommandResult<Inverse> {
        let MapState { tree, layout, bus } = map;
        let inverse = match *self {
            Self::AddTopic {
                parent,
                index,
                size,
                side,
            } => {
                let side = match side {
                    Some(side) => Some(side),
                    None => layout.preferred_side(tree, parent)?,
                };
                let id = tree.insert(parent, index, size)?;
                if side.is_some() {
                    tree.set_side(id, side)?;
                }
                layout.on_node_added(tree, bus, id)?;
                Inverse::Added { id, detached: None }
            }
            Self::RemoveTopic { id } => {
                let subtree = tree.detach(id)?;
                layout.on_node_removed(tree, bus, &subtree)?;
                Inverse::Removed { subtree }
            }
            Self::MoveTopic {
                id,
                new_parent,
                index,
            } => {
                let prior = capture(tree, tree.subtree(id));
                let (old_parent, old_index) = tree.move_to(id, new_parent, index)?;
                layout.on_node_moved(tree, bus, id, old_parent)?;
                Inverse::Moved {
                    old_parent,
                    old_index,
                    prior,
                }
            }
            Self::ResizeTopic { id, size } => {
                let old = tree.set_size(id, size)?;
                layout.on_node_resized(tree, bus, id)?;
                Inverse::Resized { old }
            }
            Self::DragTopic { id, position } => {
                let topic = tree.topic(id)?;
                if id == tree.root() {
                    return Err(LayoutError::RootImmutable(id).into());
                }
                if !(position.x.is_finite() && position.y.is_finite()) {
                    return Err(CommandError::InvalidState(format!(
                        "drag target for {id} is not finite"
                    )));
                }
                let was_manual = topic.has_manual_position();
                let (dx, dy) = topic.position().delta_to(position);
                let prior = capture(tree, tree.subtree(id));
                for p in &prior {
                    let at = if p.id == id {
                        position
                    } else {
                        p.position.translate(dx, dy)
                    };
                    tree.set_position(p.id, at)?;
                }
                tree.set_manual(id, true)?;
                layout.on_node_dragged(tree, bus, id)?;
                Inverse::Positions { prior, was_manual }
            }
            Self::ResetManualPosition { id } => {
                if !tree.topic(id)?.has_manual_position() {
                    return Err(CommandError::InvalidState(format!(
                        "{id} has no manual position"
                    )));
                }
                let prior = capture(tree, tree.subtree(id));
                tree.set_manual(id, false)?;
                layout.on_manual_cleared(tree, bus, id)?;
                Inverse::Positions {
                    prior,
                    was_manual: true,
                }
            }
            Self::SetCollapsed { id, collapsed } => {
                let prior = capture(tree, tree.subtree(id));
                let previous = tree.set_collapsed(id, collapsed)?;
                layout.on_collapse_toggled(tree, bus, id)?;
                Inverse::Collapsed { previous, prior }
            }
            Self::SetStrategy { kind } => {
                let previous = layout.strategy_kind();
                let prior = capture(tree, tree.ids().collect::<Vec<_>>());
                layout.set_strategy(tree, bus, kind);
                Inverse::Strategy { previous, prior }
            }
        };
        Ok(inverse)
    }
}

// ============================================================================
// Inverse snapshots
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct PriorPosition {
    id: TopicId,
    position: Position,
    placed: bool,
}

fn capture(tree: &TopicTree, ids: impl IntoIterator<Item = TopicId>) -> Vec<PriorPosition> {
    ids.into_iter()
        .filter_map(|id| tree.get(id))
        .map(|t| PriorPosition {
            id: t.id(),
            position: t.position(),
            placed: t.is_placed(),
        })
        .collect()
}

fn restore_positions(tree: &mut TopicTree, prior: &[PriorPosition]) -> CommandResult {
    for p in prior {
        tree.restore_position(p.id, p.position, p.placed)
            .map_err(|e| CommandError::drift(format!("{} live", p.id), e))?;
    }
    Ok(())
}

/// Put back prior positions the forward edit's layout pass changed and the
/// reverse pass did not recompute: topics it first exposed, and place-once
/// topics. Returns whether a visible topic changed.
fn settle_positions(tree: &mut TopicTree, prior: &[PriorPosition]) -> CommandResult<bool> {
    let mut visible_changed = false;
    for p in prior {
        let topic = tree
            .topic(p.id)
            .map_err(|e| CommandError::drift(format!("{} live", p.id), e))?;
        if topic.is_placed() == p.placed && topic.position().bit_eq(&p.position) {
            continue;
        }
        tree.restore_position(p.id, p.position, p.placed)?;
        visible_changed |= tree.is_visible(p.id);
    }
    Ok(visible_changed)
}

fn restore_subtree(map: &mut MapState, subtree: &DetachedSubtree) -> CommandResult {
    let MapState { tree, layout, bus } = map;
    let root = tree
        .restore(subtree.clone())
        .map_err(|e| CommandError::drift(format!("room for {}", subtree.root()), e))?;
    layout.on_node_added(tree, bus, root)?;
    Ok(())
}

#[derive(Debug, Clone)]
enum Inverse {
    /// `detached` holds the topic while the add is undone.
    Added {
        id: TopicId,
        detached: Option<DetachedSubtree>,
    },
    Removed {
        subtree: DetachedSubtree,
    },
    Moved {
        old_parent: TopicId,
        old_index: usize,
        prior: Vec<PriorPosition>,
    },
    Resized {
        old: Size,
    },
    Positions {
        prior: Vec<PriorPosition>,
        was_manual: bool,
    },
    Collapsed {
        previous: bool,
        prior: Vec<PriorPosition>,
    },
    Strategy {
        previous: StrategyKind,
        prior: Vec<PriorPosition>,
    },
}

impl Inverse {
    fn revert(&mut self, edit: &TopicEdit, map: &mut MapState) -> CommandResult {
        let target = edit.topic();
        if let Self::Removed { subtree } = self {
            return restore_subtree(map, subtree);
        }
        let MapState { tree, layout, bus } = map;
        match self {
            Self::Added { id, detached } => {
                if detached.is_some() {
                    return Err(CommandError::drift(format!("{id} live"), "already undone"));
                }
                let cut = tree
                    .detach(*id)
                    .map_err(|e| CommandError::drift(format!("{id} live"), e))?;
                layout.on_node_removed(tree, bus, &cut)?;
                *detached = Some(cut);
            }
            Self::Removed { .. } => {}
            Self::Moved {
                old_parent,
                old_index,
                prior,
            } => {
                let id = target.ok_or_else(|| CommandError::drift("move target", "none"))?;
                let current = tree
                    .parent(id)
                    .ok_or_else(|| CommandError::drift(format!("{id} attached"), "detached"))?;
                tree.move_to(id, *old_parent, *old_index)
                    .map_err(|e| CommandError::drift(format!("{id} movable back"), e))?;
                layout.on_node_moved(tree, bus, id, current)?;
                if settle_positions(tree, prior)? {
                    layout.on_node_dragged(tree, bus, id)?;
                }
            }
            Self::Resized { old } => {
                let id = target.ok_or_else(|| CommandError::drift("resize target", "none"))?;
                tree.set_size(id, *old)
                    .map_err(|e| CommandError::drift(format!("{id} live"), e))?;
                layout.on_node_resized(tree, bus, id)?;
            }
            Self::Positions { prior, was_manual } => {
                let id = target.ok_or_else(|| CommandError::drift("dragged topic", "none"))?;
                tree.topic(id)
                    .map_err(|e| CommandError::drift(format!("{id} live"), e))?;
                restore_positions(tree, prior)?;
                tree.set_manual(id, *was_manual)?;
                layout.on_node_dragged(tree, bus, id)?;
            }
            Self::Collapsed { previous, prior } => {
                let id = target.ok_or_else(|| CommandError::drift("collapse target", "none"))?;
                tree.set_collapsed(id, *previous)
                    .map_err(|e| CommandError::drift(format!("{id} live"), e))?;
                layout.on_collapse_toggled(tree, bus, id)?;
                if settle_positions(tree, prior)? {
                    layout.on_node_dragged(tree, bus, id)?;
                }
            }
            Self::Strategy { previous, prior } => {
                restore_positions(tree, prior)?;
                layout.set_strategy(tree, bus, *previous);
                // Restored positions were written directly; publish them.
                let root = tree.root();
                layout.on_node_dragged(tree, bus, root)?;
            }
        }
        Ok(())
    }

    fn heap_bytes(&self) -> usize {
        match self {
            Self::Added { detached, .. } => detached.as_ref().map_or(0, DetachedSubtree::size_bytes),
            Self::Removed { subtree } => subtree.size_bytes(),
            Self::Positions { prior, .. }
            | Self::Strategy { prior, .. }
            | Self::Moved { prior, .. }
            | Self::Collapsed { prior, .. } => prior.len() * std::mem::size_of::<PriorPosition>(),
            Self::Resized { .. } => 0,
        }
    }
}

// ============================================================================
// TopicCmd
// ============================================================================

/// An undoable [`TopicEdit`].
pub struct TopicCmd {
    edit: TopicEdit,
    inverse: Option<Inverse>,
    metadata: CommandMetadata,
}

impl fmt::Debug for TopicCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicCmd")
            .field("edit", &self.edit)
            .field("applied", &self.inverse.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl TopicCmd {
    /// Wrap `edit` with default metadata.
    #[must_use]
    pub fn new(edit: TopicEdit) -> Self {
        let metadata = CommandMetadata::new(edit.label());
        Self {
            edit,
            inverse: None,
            metadata,
        }
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CommandMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// The forward edit.
    #[must_use]
    pub fn edit(&self) -> &TopicEdit {
        &self.edit
    }

    /// Id assigned by an executed `AddTopic`.
    #[must_use]
    pub fn created(&self) -> Option<TopicId> {
        match self.inverse {
            Some(Inverse::Added { id, .. }) => Some(id),
            _ => None,
        }
    }
}

impl UndoableCmd for TopicCmd {
    fn execute(&mut self, map: &mut MapState) -> CommandResult {
        let inverse = match self.inverse.take() {
            // Redo of an add brings the topic back under its original id.
            Some(Inverse::Added {
                id,
                detached: Some(subtree),
            }) => match restore_subtree(map, &subtree) {
                Ok(()) => Inverse::Added { id, detached: None },
                Err(e) => {
                    self.inverse = Some(Inverse::Added {
                        id,
                        detached: Some(subtree),
                    });
                    return Err(e);
                }
            },
            _ => self.edit.apply(map)?,
        };
        self.inverse = Some(inverse);
        Ok(())
    }

    fn undo(&mut self, map: &mut MapState) -> CommandResult {
        let Some(inverse) = self.inverse.as_mut() else {
            return Err(CommandError::InvalidState(format!(
                "{} was never executed",
                self.edit.label()
            )));
        };
        inverse.revert(&self.edit, map)
    }

    fn description(&self) -> &str {
        &self.metadata.description
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + self.inverse.as_ref().map_or(0, Inverse::heap_bytes)
    }

    fn can_merge(&self, other: &dyn UndoableCmd, config: &MergeConfig) -> bool {
        if !config.merge_resizes {
            return false;
        }
        let TopicEdit::ResizeTopic { id, .. } = self.edit else {
            return false;
        };
        let Some(other) = other.as_any().downcast_ref::<TopicCmd>() else {
            return false;
        };
        let same_topic = matches!(other.edit, TopicEdit::ResizeTopic { id: o, .. } if o == id);
        let elapsed = other
            .metadata
            .timestamp
            .saturating_duration_since(self.metadata.timestamp);
        same_topic
            && self.inverse.is_some()
            && other.metadata.source == self.metadata.source
            && elapsed <= Duration::from_millis(config.max_delay_ms)
    }

    fn accept_merge(&mut self, other: &dyn UndoableCmd) -> bool {
        let Some(other) = other.as_any().downcast_ref::<TopicCmd>() else {
            return false;
        };
        match (&mut self.edit, &other.edit) {
            (TopicEdit::ResizeTopic { id, size }, TopicEdit::ResizeTopic { id: o, size: s })
                if *id == *o =>
            {
                // Keep the oldest inverse; take the newest size.
                *size = *s;
                self.metadata.timestamp = other.metadata.timestamp;
                true
            }
            _ => false,
        }
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn target(&self) -> Option<TopicId> {
        self.edit.topic().or_else(|| self.created())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn debug_name(&self) -> &'static str {
        "TopicCmd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapState;
    use arbor_layout::LayoutConfig;

    fn state() -> MapState {
        MapState::new(Size::new(100.0, 40.0), LayoutConfig::default())
    }

    fn run(map: &mut MapState, edit: TopicEdit) -> TopicCmd {
        let mut cmd = TopicCmd::new(edit);
        cmd.execute(map).unwrap();
        cmd
    }

    #[test]
    fn add_undo_redo_keeps_the_id() {
        let mut map = state();
        let root = map.tree.root();
        let before = map.tree.clone();
        let mut cmd = run(&mut map, TopicEdit::AddTopic {
            parent: root,
            index: None,
            size: Size::new(50.0, 20.0),
            side: None,
        });
        let id = cmd.created().unwrap();
        let after = map.tree.clone();

        cmd.undo(&mut map).unwrap();
        assert_eq!(map.tree, before);
        assert!(!map.tree.contains(id));

        cmd.redo(&mut map).unwrap();
        assert_eq!(map.tree, after);
        assert_eq!(cmd.created(), Some(id));
    }

    #[test]
    fn undo_before_execute_is_rejected() {
        let mut map = state();
        let mut cmd = TopicCmd::new(TopicEdit::SetStrategy {
            kind: StrategyKind::Free,
        });
        assert!(matches!(cmd.undo(&mut map), Err(CommandError::InvalidState(_))));
    }

    #[test]
    fn dragging_the_root_is_rejected() {
        let mut map = state();
        let root = map.tree.root();
        let before = map.tree.clone();
        let mut cmd = TopicCmd::new(TopicEdit::DragTopic {
            id: root,
            position: Position::new(5.0, 5.0),
        });
        assert_eq!(
            cmd.execute(&mut map),
            Err(CommandError::Layout(LayoutError::RootImmutable(root)))
        );
        assert_eq!(map.tree, before);
    }

    #[test]
    fn drag_translates_subtree_and_undo_restores_it() {
        let mut map = state();
        let root = map.tree.root();
        let a = run(&mut map, TopicEdit::AddTopic {
            parent: root,
            index: None,
            size: Size::new(50.0, 20.0),
            side: None,
        })
        .created()
        .unwrap();
        let a1 = run(&mut map, TopicEdit::AddTopic {
            parent: a,
            index: None,
            size: Size::new(30.0, 10.0),
            side: None,
        })
        .created()
        .unwrap();
        let before = map.tree.clone();
        let a_pos = map.tree.topic(a).unwrap().position();
        let a1_pos = map.tree.topic(a1).unwrap().position();

        let mut drag = run(&mut map, TopicEdit::DragTopic {
            id: a,
            position: a_pos.translate(10.0, -20.0),
        });
        assert!(map.tree.topic(a).unwrap().has_manual_position());
        assert_eq!(
            map.tree.topic(a1).unwrap().position(),
            a1_pos.translate(10.0, -20.0)
        );

        drag.undo(&mut map).unwrap();
        assert_eq!(map.tree, before);
    }

    #[test]
    fn reset_requires_a_manual_position() {
        let mut map = state();
        let root = map.tree.root();
        let a = run(&mut map, TopicEdit::AddTopic {
            parent: root,
            index: None,
            size: Size::new(50.0, 20.0),
            side: None,
        })
        .created()
        .unwrap();
        let mut reset = TopicCmd::new(TopicEdit::ResetManualPosition { id: a });
        assert!(matches!(
            reset.execute(&mut map),
            Err(CommandError::InvalidState(_))
        ));
    }

    #[test]
    fn labels_and_targets() {
        let id = TopicId::from_raw(3);
        let edit = TopicEdit::SetCollapsed {
            id,
            collapsed: true,
        };
        assert_eq!(edit.label(), "Collapse topic");
        assert_eq!(edit.topic(), Some(id));
        let cmd = TopicCmd::new(edit);
        assert_eq!(cmd.description(), "Collapse topic");
        assert_eq!(cmd.target(), Some(id));
        assert!(cmd.size_bytes() >= std::mem::size_of::<TopicCmd>());
    }

    #[test]
    fn resizes_of_one_topic_merge() {
        let mut map = state();
        let root = map.tree.root();
        let config = MergeConfig::default();
        let first = run(&mut map, TopicEdit::ResizeTopic {
            id: root,
            size: Size::new(110.0, 40.0),
        });
        let second = run(&mut map, TopicEdit::ResizeTopic {
            id: root,
            size: Size::new(120.0, 40.0),
        });
        assert!(first.can_merge(&second, &config));

        let off = MergeConfig {
            merge_resizes: false,
            ..config
        };
        assert!(!first.can_merge(&second, &off));

        let other = run(&mut map, TopicEdit::SetCollapsed {
            id: root,
            collapsed: false,
        });
        assert!(!first.can_merge(&other, &config));
    }
}
