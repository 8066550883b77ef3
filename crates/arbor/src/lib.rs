#![forbid(unsafe_code)]

//! Arbor public facade crate.
//!
//! Arbor keeps a mind map's topics laid out automatically: it decides where
//! every topic goes, keeps that layout current as the map is edited, lets
//! users drag topics by hand, and makes every edit undoable.
//!
//! This crate re-exports the stable surface of the internal crates and
//! offers a prelude for day-to-day usage.
//!
//! ```rust,ignore
//! use arbor::prelude::*;
//!
//! let mut map = MindMap::new(Size::new(120.0, 40.0), MapConfig::default())?;
//! let _sub = map.subscribe(MapEventKind::PositionChanged, |ev| println!("{ev:?}"));
//! let root = map.tree().root();
//! let idea = map.add_topic(root, Size::new(80.0, 24.0))?;
//! map.set_strategy(StrategyKind::Symmetric)?;
//! map.undo();
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use arbor_core::{Bounds, BusEvent, EventBus, Position, Size, Subscription};

// --- Layout re-exports -----------------------------------------------------

pub use arbor_layout::{
    DetachedSubtree, LayoutConfig, LayoutError, LayoutManager, LayoutStrategy, MapEvent,
    MapEventKind, PassReport, Side, StrategyKind, Topic, TopicId, TopicRecord, TopicTree,
    UnknownStrategy,
};

// --- Runtime re-exports ----------------------------------------------------

pub use arbor_runtime::{
    CommandBatch, CommandError, CommandMetadata, CommandSource, ConfigError, ContentMeasurer,
    FixedMeasurer, HistoryConfig, HistoryManager, MapConfig, MapError, MapState, MergeConfig,
    MindMap, SubtreeTemplate, TopicCmd, TopicEdit, UndoableCmd,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for Arbor callers.
#[derive(Debug)]
pub enum Error {
    /// The topic model rejected an operation.
    Layout(LayoutError),
    /// An edit could not be applied or reverted.
    Command(CommandError),
    /// Configuration could not be loaded.
    Config(ConfigError),
    /// A map could not be opened.
    Map(MapError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(err) => write!(f, "{err}"),
            Self::Command(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Map(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            Self::Command(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Map(err) => Some(err),
        }
    }
}

impl From<LayoutError> for Error {
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<MapError> for Error {
    fn from(err: MapError) -> Self {
        Self::Map(err)
    }
}

/// Standard result type for Arbor APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        ContentMeasurer, Error, MapConfig, MapEvent, MapEventKind, MindMap, Position, Result,
        Size, StrategyKind, Subscription, TopicId,
    };

    pub use crate::{core, layout, runtime};
}

pub use arbor_core as core;
pub use arbor_layout as layout;
pub use arbor_runtime as runtime;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_convert_and_keep_their_source() {
        let err: Error = LayoutError::RootImmutable(TopicId::from_raw(0)).into();
        assert!(err.to_string().contains("T0"));
        assert!(std::error::Error::source(&err).is_some());

        let err: Error = CommandError::InvalidState("nothing to reset".into()).into();
        assert_eq!(err.to_string(), "invalid state: nothing to reset");

        let err: Error = ConfigError::Validation(vec!["history.max_depth must be >= 1".into()]).into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn question_mark_lifts_every_layer() {
        fn session() -> Result<TopicId> {
            let mut map = MindMap::new(Size::new(100.0, 40.0), MapConfig::default())?;
            let root = map.tree().root();
            Ok(map.add_topic(root, Size::new(40.0, 20.0))?)
        }
        assert!(session().is_ok());
    }
}
