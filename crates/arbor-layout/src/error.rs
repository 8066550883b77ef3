#![forbid(unsafe_code)]

//! Error taxonomy for the topic model and layout manager.
//!
//! Only reference and structural problems surface here. Degenerate geometry
//! (zero or negative sizes) is healed locally by the strategies and never
//! becomes an error.

use std::fmt;

use crate::topic::TopicId;

/// Result alias used throughout the layout crate.
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Errors raised by the topic tree and the layout manager.
///
/// Every operation that returns one of these has left the model untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The operation named a topic that is not in the tree.
    InvalidReference(TopicId),
    /// The operation would break the single-rooted tree shape.
    StructuralViolation {
        topic: TopicId,
        target: TopicId,
        reason: &'static str,
    },
    /// The root cannot be removed, moved, or reparented.
    RootImmutable(TopicId),
    /// Child index past the end of a parent's child list.
    IndexOutOfBounds {
        parent: TopicId,
        index: usize,
        len: usize,
    },
    /// Persisted records do not describe a valid tree.
    InvalidSeed(String),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidReference(id) => write!(f, "topic {id} does not exist"),
            Self::StructuralViolation {
                topic,
                target,
                reason,
            } => write!(f, "cannot attach {topic} under {target}: {reason}"),
            Self::RootImmutable(id) => write!(f, "root topic {id} cannot be removed or moved"),
            Self::IndexOutOfBounds { parent, index, len } => write!(
                f,
                "child index {index} out of bounds for {parent} ({len} children)"
            ),
            Self::InvalidSeed(msg) => write!(f, "invalid topic records: {msg}"),
        }
    }
}

impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_ids() {
        let err = LayoutError::InvalidReference(TopicId::from_raw(42));
        assert!(err.to_string().contains("T42"));

        let err = LayoutError::StructuralViolation {
            topic: TopicId::from_raw(1),
            target: TopicId::from_raw(2),
            reason: "target is a descendant",
        };
        let msg = err.to_string();
        assert!(msg.contains("T1"));
        assert!(msg.contains("T2"));
        assert!(msg.contains("descendant"));

        let err = LayoutError::IndexOutOfBounds {
            parent: TopicId::from_raw(0),
            index: 9,
            len: 3,
        };
        assert!(err.to_string().contains('9'));
    }
}
