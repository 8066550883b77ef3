#![forbid(unsafe_code)]

//! Undo/redo for map edits.
//!
//! - [`UndoableCmd`]: the trait every reversible edit implements
//! - [`TopicCmd`]: the built-in edits ([`TopicEdit`]) with lazily captured
//!   inverses
//! - [`CommandBatch`]: several commands recorded as one history entry
//! - [`HistoryManager`]: the undo/redo stacks with depth and memory budgets
//!
//! Commands act on a [`MapState`](crate::MapState) passed in on every call.
//! Each forward or backward step runs the layout pass its edit needs, so
//! the renderer sees the same events for an undo as for the original edit.

pub mod command;
pub mod history;
pub mod topic_cmd;

pub use command::{
    CommandBatch, CommandError, CommandMetadata, CommandResult, CommandSource, MergeConfig,
    UndoableCmd,
};
pub use history::{HistoryConfig, HistoryManager};
pub use topic_cmd::{TopicCmd, TopicEdit};
