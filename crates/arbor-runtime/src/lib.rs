#![forbid(unsafe_code)]

//! Document session and undo history for Arbor mind maps.
//!
//! # Role in Arbor
//! `arbor-runtime` turns the topic model and layout manager from
//! `arbor-layout` into an editable document. Every edit is an
//! [`UndoableCmd`] recorded in a [`HistoryManager`].
//!
//! # Primary responsibilities
//! - **MindMap**: owns one map's tree, layout manager, event bus and history.
//! - **Commands**: [`TopicCmd`] for single edits, [`CommandBatch`] for
//!   compound ones, each reversible bit for bit.
//! - **Configuration**: [`MapConfig`] loaded from TOML or JSON.
//! - **Measurement**: the [`ContentMeasurer`] seam through which the host
//!   reports content sizes.

pub mod config;
pub mod map;
pub mod measure;
pub mod undo;

pub use config::{ConfigError, MapConfig};
pub use map::{MapError, MapState, MindMap, SubtreeTemplate};
pub use measure::{ContentMeasurer, FixedMeasurer};
pub use undo::{
    CommandBatch, CommandError, CommandMetadata, CommandResult, CommandSource, HistoryConfig,
    HistoryManager, MergeConfig, TopicCmd, TopicEdit, UndoableCmd,
};
