#![forbid(unsafe_code)]

//! Change notifications published by the layout manager.

use arbor_core::bus::BusEvent;
use arbor_core::geometry::{Position, Size};

use crate::topic::TopicId;

/// Payload delivered to renderers and other map observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    /// A topic's stored center moved.
    PositionChanged { id: TopicId, position: Position },
    /// A topic's stored size changed.
    SizeChanged { id: TopicId, size: Size },
    /// A topic (and any subtree it carries) entered the map.
    Added { id: TopicId, parent: TopicId },
    /// A topic and its whole subtree left the map.
    Removed { id: TopicId },
}

/// Routing key for [`MapEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapEventKind {
    PositionChanged,
    SizeChanged,
    Added,
    Removed,
}

impl MapEvent {
    /// Topic the event is about.
    pub fn topic(&self) -> TopicId {
        match *self {
            Self::PositionChanged { id, .. }
            | Self::SizeChanged { id, .. }
            | Self::Added { id, .. }
            | Self::Removed { id } => id,
        }
    }
}

impl BusEvent for MapEvent {
    type Kind = MapEventKind;

    fn kind(&self) -> MapEventKind {
        match self {
            Self::PositionChanged { .. } => MapEventKind::PositionChanged,
            Self::SizeChanged { .. } => MapEventKind::SizeChanged,
            Self::Added { .. } => MapEventKind::Added,
            Self::Removed { .. } => MapEventKind::Removed,
        }
    }
}
