#![forbid(unsafe_code)]

//! Reversible map edits.
//!
//! [`UndoableCmd`] is one step of a map's history. [`TopicCmd`] implements it
//! for single topic edits and [`CommandBatch`] for compound ones such as a
//! paste.
//!
//! [`TopicCmd`]: super::TopicCmd
//!
//! # Invariants
//!
//! - `execute()` followed by `undo()` restores the prior [`MapState`] exactly
//! - `undo()` followed by `redo()` restores the executed state exactly
//! - A command whose `execute()` fails has not touched the state
//! - `size_bytes()` is accurate enough for history budgeting
//!
//! # Failure Modes
//!
//! - **Invalid reference / structural violation**: the edit names a missing
//!   topic or would break the tree. Rejected before any mutation.
//! - **State drift**: captured inverse state no longer matches the model.
//!   This only happens when commands are composed incorrectly; it is logged
//!   at error level and surfaces as [`CommandError::StateDrift`].

use std::any::Any;
use std::fmt;

use arbor_layout::{LayoutError, TopicId};
use web_time::Instant;

use crate::map::MapState;

/// What asked for an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandSource {
    /// A user gesture: typing, dragging, menu actions.
    #[default]
    User,
    /// Issued by application code, such as a content re-measure.
    Programmatic,
}

/// Description, time and origin of one history step.
#[derive(Debug, Clone)]
pub struct CommandMetadata {
    /// Menu label of the step, e.g. "Add topic".
    pub description: String,
    /// When the edit was requested; merging measures its window from here.
    pub timestamp: Instant,
    /// Who/what triggered the command. Only edits from the same source
    /// merge.
    pub source: CommandSource,
}

impl CommandMetadata {
    /// User metadata stamped now.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            timestamp: Instant::now(),
            source: CommandSource::User,
        }
    }

    /// Attribute the edit to `source`.
    #[must_use]
    pub fn with_source(mut self, source: CommandSource) -> Self {
        self.source = source;
        self
    }

    /// Bytes counted against the history budget.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>() + self.description.len()
    }
}

impl Default for CommandMetadata {
    fn default() -> Self {
        Self::new("Unknown")
    }
}

/// Outcome of applying or reverting an edit.
pub type CommandResult<T = ()> = Result<T, CommandError>;

/// Why an edit could not be applied or reverted.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandError {
    /// The topic model rejected the edit.
    Layout(LayoutError),
    /// The edit does not apply to the map as it is, e.g. resetting a topic
    /// that was never dragged.
    InvalidState(String),
    /// Captured inverse state no longer matches the model.
    StateDrift { expected: String, actual: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(e) => write!(f, "{e}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::StateDrift { expected, actual } => {
                write!(f, "state drift: expected '{expected}', got '{actual}'")
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LayoutError> for CommandError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl CommandError {
    /// Report inverse state that no longer fits the model.
    pub(crate) fn drift(expected: impl Into<String>, actual: impl fmt::Display) -> Self {
        let err = Self::StateDrift {
            expected: expected.into(),
            actual: actual.to_string(),
        };
        tracing::error!(error = %err, "undo state drift");
        err
    }
}

/// When quick successive resizes of one topic fold into a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "config-files", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config-files", serde(default))]
pub struct MergeConfig {
    /// Longest gap between two resizes that still merge (milliseconds).
    pub max_delay_ms: u64,
    /// Whether consecutive resizes of one topic collapse into one entry.
    pub merge_resizes: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: 500,
            merge_resizes: true,
        }
    }
}

/// A reversible edit of a [`MapState`].
///
/// Commands capture all state needed to execute, undo, and redo an edit.
/// The state they act on is passed in on every call, so commands are plain
/// owned data and can sit in history indefinitely.
pub trait UndoableCmd {
    /// Apply the edit and let the layout manager react.
    fn execute(&mut self, map: &mut MapState) -> CommandResult;

    /// Revert the edit and let the layout manager react.
    fn undo(&mut self, map: &mut MapState) -> CommandResult;

    /// Re-apply after an undo. Defaults to `execute`.
    fn redo(&mut self, map: &mut MapState) -> CommandResult {
        self.execute(map)
    }

    /// Label shown in undo/redo menus.
    fn description(&self) -> &str;

    /// Bytes held, captured inverse included.
    fn size_bytes(&self) -> usize;

    /// True when `other`, already applied, can fold into this step.
    fn can_merge(&self, _other: &dyn UndoableCmd, _config: &MergeConfig) -> bool {
        false
    }

    /// Fold `other` into this command. Returns false if nothing changed.
    fn accept_merge(&mut self, _other: &dyn UndoableCmd) -> bool {
        false
    }

    fn metadata(&self) -> &CommandMetadata;

    /// Topic the edit is about, if any. Logged with every history event.
    fn target(&self) -> Option<TopicId> {
        None
    }

    /// Downcast for `can_merge`.
    fn as_any(&self) -> &dyn Any;

    /// Type name shown by `Debug`.
    fn debug_name(&self) -> &'static str {
        "UndoableCmd"
    }
}

impl fmt::Debug for dyn UndoableCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.debug_name())
            .field("description", &self.description())
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

// ============================================================================
// CommandBatch
// ============================================================================

/// Several edits recorded as one history step, e.g. every topic of a paste.
///
/// Constituents apply in order and undo in reverse order. If one fails to
/// execute, the ones already applied are rolled back, so a failed batch
/// leaves the state as it found it. A rollback step that fails itself is
/// logged and reported as [`CommandError::StateDrift`].
pub struct CommandBatch {
    /// Edits in application order.
    commands: Vec<Box<dyn UndoableCmd>>,
    metadata: CommandMetadata,
    /// Number of leading edits currently applied.
    executed_to: usize,
}

impl fmt::Debug for CommandBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBatch")
            .field("commands_count", &self.commands.len())
            .field("metadata", &self.metadata)
            .field("executed_to", &self.executed_to)
            .finish()
    }
}

impl CommandBatch {
    /// Empty batch shown in history as `description`.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            metadata: CommandMetadata::new(description),
            executed_to: 0,
        }
    }

    /// Append an edit; it applies after the ones already pushed.
    pub fn push(&mut self, cmd: Box<dyn UndoableCmd>) {
        self.commands.push(cmd);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn run_forward(&mut self, map: &mut MapState, redo: bool) -> CommandResult {
        for i in 0..self.commands.len() {
            let result = if redo {
                self.commands[i].redo(map)
            } else {
                self.commands[i].execute(map)
            };
            if let Err(e) = result {
                self.executed_to = i;
                return Err(self.roll_back(map, e));
            }
            self.executed_to = i + 1;
        }
        Ok(())
    }

    /// Undo the applied prefix after `cause` stopped the batch. Returns
    /// `cause`, or a drift error naming the step that could not be undone.
    fn roll_back(&mut self, map: &mut MapState, cause: CommandError) -> CommandError {
        while self.executed_to > 0 {
            let step = self.executed_to - 1;
            if let Err(err) = self.commands[step].undo(map) {
                tracing::error!(
                    batch = %self.metadata.description,
                    step,
                    command = self.commands[step].description(),
                    error = %err,
                    "batch rollback failed"
                );
                return CommandError::drift(
                    format!(
                        "step {step} ({}) rolled back after: {cause}",
                        self.commands[step].description()
                    ),
                    err,
                );
            }
            self.executed_to = step;
        }
        cause
    }
}

impl UndoableCmd for CommandBatch {
    fn execute(&mut self, map: &mut MapState) -> CommandResult {
        self.run_forward(map, false)
    }

    fn undo(&mut self, map: &mut MapState) -> CommandResult {
        for i in (0..self.executed_to).rev() {
            self.commands[i].undo(map)?;
            self.executed_to = i;
        }
        Ok(())
    }

    fn redo(&mut self, map: &mut MapState) -> CommandResult {
        self.run_forward(map, true)
    }

    fn description(&self) -> &str {
        &self.metadata.description
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.metadata.size_bytes()
            + self.commands.iter().map(|c| c.size_bytes()).sum::<usize>()
    }

    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn debug_name(&self) -> &'static str {
        "CommandBatch"
    }
}
