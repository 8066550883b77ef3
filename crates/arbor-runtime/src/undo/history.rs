#![forbid(unsafe_code)]

//! Per-map edit history.
//!
//! [`HistoryManager`] holds the map's applied edits on an undo stack and the
//! undone ones on a redo stack. Each entry is one user-visible step: a single
//! topic edit, a merged run of resizes, or a whole paste.
//!
//! - Only the newest `max_depth` steps can be undone; older ones fall off.
//! - Captured inverses (detached subtrees, prior positions) count against
//!   `max_bytes`. Undone steps are evicted before applied ones.
//! - Any new edit after an undo discards the redo stack.
//! - A resize of the same topic arriving within the merge window folds into
//!   the previous resize instead of adding a step.
//!
//! # Invariants
//!
//! 1. `total_bytes` always equals the sum of `size_bytes()` over both stacks
//! 2. `undo_stack.len() <= config.max_depth` after any operation
//! 3. `total_bytes <= config.max_bytes` after any push, if enforced
//! 4. An edit the map rejects is never pushed
//!
//! ```text
//! add A, add B, drag A
//!   undo: [add A, add B, drag A]   redo: []
//! undo x2
//!   undo: [add A]                  redo: [drag A, add B]
//! resize A                         <-- discards the redo stack
//!   undo: [add A, resize A]        redo: []
//! ```

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, warn};

#[cfg(feature = "config-files")]
use serde::{Deserialize, Serialize};

use super::command::{CommandError, CommandResult, MergeConfig, UndoableCmd};
use crate::map::MapState;

/// Limits of one map's edit history.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config-files", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config-files", serde(default))]
pub struct HistoryConfig {
    /// Most undoable steps kept. Default: 100.
    pub max_depth: usize,
    /// Byte budget for captured inverses on both stacks (0 = unlimited).
    /// Default: 10 MiB.
    pub max_bytes: usize,
    /// When consecutive resizes fold into one step.
    pub merge_config: MergeConfig,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_bytes: 10 * 1024 * 1024,
            merge_config: MergeConfig::default(),
        }
    }
}

impl HistoryConfig {
    /// Limits of `max_depth` steps and `max_bytes` bytes.
    #[must_use]
    pub fn new(max_depth: usize, max_bytes: usize) -> Self {
        Self {
            max_depth,
            max_bytes,
            merge_config: MergeConfig::default(),
        }
    }

    /// Set the merge configuration.
    #[must_use]
    pub fn with_merge_config(mut self, config: MergeConfig) -> Self {
        self.merge_config = config;
        self
    }

    /// No depth or byte limit.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: usize::MAX,
            max_bytes: 0,
            merge_config: MergeConfig::default(),
        }
    }

    /// Validate constraints. Returns a list of human-readable errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_depth == 0 {
            errors.push("history.max_depth must be >= 1".into());
        }
        errors
    }
}

/// Undo and redo stacks of one map.
pub struct HistoryManager {
    /// Applied edits (newest at back).
    undo_stack: VecDeque<Box<dyn UndoableCmd>>,
    /// Undone edits (newest at back).
    redo_stack: VecDeque<Box<dyn UndoableCmd>>,
    config: HistoryConfig,
    total_bytes: usize,
}

impl fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryManager")
            .field("undo_depth", &self.undo_stack.len())
            .field("redo_depth", &self.redo_stack.len())
            .field("total_bytes", &self.total_bytes)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl HistoryManager {
    /// Empty history under `config`.
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            config,
            total_bytes: 0,
        }
    }

    // ========================================================================
    // Core Operations
    // ========================================================================

    /// Execute `cmd` against `map` and record it.
    ///
    /// A command that fails is dropped; history and redo are left as they
    /// were.
    pub fn execute(&mut self, mut cmd: Box<dyn UndoableCmd>, map: &mut MapState) -> CommandResult {
        if let Err(err) = cmd.execute(map) {
            warn!(command = cmd.description(), error = %err, "command rejected");
            return Err(err);
        }
        debug!(
            command = cmd.description(),
            target = ?cmd.target(),
            "command executed"
        );
        self.push(cmd);
        Ok(())
    }

    /// Record an edit that was already applied to the map.
    ///
    /// Discards the redo stack, folds a quick follow-up resize into the
    /// previous one, and evicts the oldest steps past the limits.
    pub fn push(&mut self, cmd: Box<dyn UndoableCmd>) {
        self.clear_redo();

        let cmd = match self.try_merge(cmd) {
            Ok(()) => {
                self.enforce_limits();
                return;
            }
            Err(cmd) => cmd,
        };

        self.total_bytes += cmd.size_bytes();
        self.undo_stack.push_back(cmd);
        self.enforce_limits();
    }

    /// Revert the newest applied edit on `map`.
    ///
    /// Returns the edit's description, the error it hit (the edit then
    /// stays on the undo stack), or `None` when there is nothing to undo.
    pub fn undo(&mut self, map: &mut MapState) -> Option<Result<String, CommandError>> {
        let mut cmd = self.undo_stack.pop_back()?;
        let description = cmd.description().to_string();
        let size_before = cmd.size_bytes();

        let result = cmd.undo(map);
        // Captured inverses grow or shrink as an edit changes direction.
        self.total_bytes = self.total_bytes.saturating_sub(size_before) + cmd.size_bytes();
        match result {
            Ok(()) => {
                debug!(command = %description, "command undone");
                self.redo_stack.push_back(cmd);
                Some(Ok(description))
            }
            Err(e) => {
                warn!(command = %description, error = %e, "undo failed");
                self.undo_stack.push_back(cmd);
                Some(Err(e))
            }
        }
    }

    /// Re-apply the newest undone edit on `map`. Same returns as
    /// [`undo`](Self::undo), with a failed edit staying on the redo stack.
    pub fn redo(&mut self, map: &mut MapState) -> Option<Result<String, CommandError>> {
        let mut cmd = self.redo_stack.pop_back()?;
        let description = cmd.description().to_string();
        let size_before = cmd.size_bytes();

        let result = cmd.redo(map);
        // Captured inverses grow or shrink as an edit changes direction.
        self.total_bytes = self.total_bytes.saturating_sub(size_before) + cmd.size_bytes();
        match result {
            Ok(()) => {
                debug!(command = %description, "command redone");
                self.undo_stack.push_back(cmd);
                Some(Ok(description))
            }
            Err(e) => {
                warn!(command = %description, error = %e, "redo failed");
                self.redo_stack.push_back(cmd);
                Some(Err(e))
            }
        }
    }

    /// Check if undo is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    // ========================================================================
    // Info
    // ========================================================================

    /// Get the undo stack depth.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Get the redo stack depth.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Descriptions of undo entries, most recent first.
    pub fn undo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.undo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|c| c.description())
            .collect()
    }

    /// Descriptions of redo entries, most recent first.
    pub fn redo_descriptions(&self, limit: usize) -> Vec<&str> {
        self.redo_stack
            .iter()
            .rev()
            .take(limit)
            .map(|c| c.description())
            .collect()
    }

    #[must_use]
    pub fn next_undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|c| c.description())
    }

    #[must_use]
    pub fn next_redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// Most recent undo entry.
    #[must_use]
    pub fn last(&self) -> Option<&dyn UndoableCmd> {
        self.undo_stack.back().map(|c| c.as_ref())
    }

    /// Bytes held by both stacks, as reported by `size_bytes()`.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Forget every step, undone ones included.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_bytes = 0;
    }

    fn clear_redo(&mut self) {
        for cmd in self.redo_stack.drain(..) {
            self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
        }
    }

    /// Evict the oldest steps until the depth and byte limits hold.
    fn enforce_limits(&mut self) {
        while self.undo_stack.len() > self.config.max_depth {
            if let Some(cmd) = self.undo_stack.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
            }
        }

        if self.config.max_bytes > 0 {
            while self.total_bytes > self.config.max_bytes {
                // Redo entries go first.
                if let Some(cmd) = self.redo_stack.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
                    continue;
                }
                if let Some(cmd) = self.undo_stack.pop_front() {
                    self.total_bytes = self.total_bytes.saturating_sub(cmd.size_bytes());
                } else {
                    break;
                }
            }
        }
    }

    /// Fold `cmd` into the last undo entry. Returns `Err(cmd)` if not merged.
    fn try_merge(&mut self, cmd: Box<dyn UndoableCmd>) -> Result<(), Box<dyn UndoableCmd>> {
        let Some(last) = self.undo_stack.back_mut() else {
            return Err(cmd);
        };
        if !last.can_merge(cmd.as_ref(), &self.config.merge_config) {
            return Err(cmd);
        }

        let old_size = last.size_bytes();
        if !last.accept_merge(cmd.as_ref()) {
            return Err(cmd);
        }
        let new_size = last.size_bytes();
        self.total_bytes = self.total_bytes.saturating_sub(old_size) + new_size;
        debug!(command = last.description(), "command merged");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::undo::{TopicCmd, TopicEdit};
    use arbor_core::geometry::Size;
    use arbor_layout::{LayoutConfig, TopicId};

    fn state() -> MapState {
        MapState::new(Size::new(100.0, 40.0), LayoutConfig::default())
    }

    fn add(map: &MapState) -> Box<dyn UndoableCmd> {
        Box::new(TopicCmd::new(TopicEdit::AddTopic {
            parent: map.tree.root(),
            index: None,
            size: Size::new(40.0, 20.0),
            side: None,
        }))
    }

    #[test]
    fn test_new_manager() {
        let mgr = HistoryManager::default();
        assert!(!mgr.can_undo());
        assert!(!mgr.can_redo());
        assert_eq!(mgr.undo_depth(), 0);
        assert_eq!(mgr.redo_depth(), 0);
    }

    #[test]
    fn test_execute_enables_undo() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        mgr.execute(add(&map), &mut map).unwrap();
        assert!(mgr.can_undo());
        assert!(!mgr.can_redo());
        assert_eq!(map.tree.topic_count(), 2);
    }

    #[test]
    fn test_rejected_command_is_not_pushed() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        mgr.execute(add(&map), &mut map).unwrap();
        mgr.undo(&mut map);
        assert!(mgr.can_redo());

        let bogus = Box::new(TopicCmd::new(TopicEdit::RemoveTopic {
            id: TopicId::from_raw(99),
        }));
        assert!(mgr.execute(bogus, &mut map).is_err());
        assert_eq!(mgr.undo_depth(), 0);
        // A rejected command does not start a new branch.
        assert!(mgr.can_redo());
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        for _ in 0..3 {
            mgr.execute(add(&map), &mut map).unwrap();
        }
        assert_eq!(map.tree.topic_count(), 4);

        for _ in 0..3 {
            assert_eq!(mgr.undo(&mut map), Some(Ok("Add topic".to_string())));
        }
        assert_eq!(map.tree.topic_count(), 1);
        assert!(mgr.undo(&mut map).is_none());

        for _ in 0..3 {
            assert!(mgr.redo(&mut map).unwrap().is_ok());
        }
        assert_eq!(map.tree.topic_count(), 4);
        assert!(mgr.redo(&mut map).is_none());
    }

    #[test]
    fn test_execute_clears_redo() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        mgr.execute(add(&map), &mut map).unwrap();
        mgr.undo(&mut map);
        mgr.execute(add(&map), &mut map).unwrap();
        assert!(!mgr.can_redo());
        assert_eq!(mgr.redo_depth(), 0);
    }

    #[test]
    fn test_max_depth_enforced() {
        let mut map = state();
        let mut mgr = HistoryManager::new(HistoryConfig::new(3, 0));
        for _ in 0..5 {
            mgr.execute(add(&map), &mut map).unwrap();
        }
        assert_eq!(mgr.undo_depth(), 3);
    }

    #[test]
    fn test_memory_byte_limit_evicts_old_commands() {
        let mut map = state();
        let mut mgr = HistoryManager::new(HistoryConfig::new(100, 1));
        for _ in 0..5 {
            mgr.execute(add(&map), &mut map).unwrap();
        }
        assert!(mgr.undo_depth() < 5, "depth={}", mgr.undo_depth());
        assert!(mgr.memory_usage() <= 1 || mgr.undo_depth() == 0);
    }

    #[test]
    fn test_memory_tracking_after_undo_redo() {
        let mut map = state();
        let mut mgr = HistoryManager::new(HistoryConfig::unlimited());
        let remove = |id| Box::new(TopicCmd::new(TopicEdit::RemoveTopic { id }));
        mgr.execute(add(&map), &mut map).unwrap();
        let id = map.tree.children(map.tree.root())[0];
        let before = mgr.memory_usage();
        mgr.execute(remove(id), &mut map).unwrap();
        let with_remove = mgr.memory_usage();
        assert!(with_remove > before);

        // The add holds its detached topic while undone.
        mgr.undo(&mut map);
        mgr.undo(&mut map);
        assert_eq!(mgr.redo_depth(), 2);
        assert!(mgr.memory_usage() > with_remove);
        mgr.redo(&mut map);
        mgr.redo(&mut map);
        assert_eq!(mgr.memory_usage(), with_remove);
        mgr.clear();
        assert_eq!(mgr.memory_usage(), 0);
    }

    #[test]
    fn test_descriptions() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        mgr.execute(add(&map), &mut map).unwrap();
        let root = map.tree.root();
        mgr.execute(
            Box::new(TopicCmd::new(TopicEdit::SetCollapsed {
                id: root,
                collapsed: true,
            })),
            &mut map,
        )
        .unwrap();

        assert_eq!(mgr.undo_descriptions(5), vec!["Collapse topic", "Add topic"]);
        assert_eq!(mgr.undo_descriptions(1).len(), 1);
        assert_eq!(mgr.next_undo_description(), Some("Collapse topic"));
        mgr.undo(&mut map);
        assert_eq!(mgr.next_redo_description(), Some("Collapse topic"));
        assert_eq!(mgr.redo_descriptions(5), vec!["Collapse topic"]);
    }

    #[test]
    fn test_resizes_merge_into_one_entry() {
        let mut map = state();
        let mut mgr = HistoryManager::default();
        let root = map.tree.root();
        let original = map.tree.topic(root).unwrap().size();
        for w in [110.0, 120.0, 130.0] {
            let cmd = TopicCmd::new(TopicEdit::ResizeTopic {
                id: root,
                size: Size::new(w, 40.0),
            });
            mgr.execute(Box::new(cmd), &mut map).unwrap();
        }
        assert_eq!(mgr.undo_depth(), 1);
        assert_eq!(map.tree.topic(root).unwrap().size(), Size::new(130.0, 40.0));

        mgr.undo(&mut map).unwrap().unwrap();
        assert_eq!(map.tree.topic(root).unwrap().size(), original);
        mgr.redo(&mut map).unwrap().unwrap();
        assert_eq!(map.tree.topic(root).unwrap().size(), Size::new(130.0, 40.0));
    }

    #[test]
    fn test_merging_can_be_disabled() {
        let mut map = state();
        let merge = MergeConfig {
            merge_resizes: false,
            ..MergeConfig::default()
        };
        let mut mgr = HistoryManager::new(HistoryConfig::default().with_merge_config(merge));
        let root = map.tree.root();
        for w in [110.0, 120.0] {
            let cmd = TopicCmd::new(TopicEdit::ResizeTopic {
                id: root,
                size: Size::new(w, 40.0),
            });
            mgr.execute(Box::new(cmd), &mut map).unwrap();
        }
        assert_eq!(mgr.undo_depth(), 2);
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = HistoryConfig::default();
        assert_eq!(config.max_depth, 100);
        assert_eq!(config.max_bytes, 10 * 1024 * 1024);
        assert!(config.validate().is_empty());
        assert_eq!(HistoryConfig::new(0, 0).validate().len(), 1);
        assert_eq!(HistoryConfig::unlimited().max_depth, usize::MAX);
    }

    #[test]
    fn test_debug_impl() {
        let mgr = HistoryManager::default();
        let debug_str = format!("{mgr:?}");
        assert!(debug_str.contains("HistoryManager"));
        assert!(debug_str.contains("undo_depth"));
    }
}
