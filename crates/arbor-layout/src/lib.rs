#![forbid(unsafe_code)]

//! Topic model and automatic layout for Arbor mind maps.
//!
//! # Role in Arbor
//! `arbor-layout` owns the topic tree and everything that decides where its
//! topics go. It knows nothing about undo or documents; `arbor-runtime`
//! drives it through the [`LayoutManager`] edit hooks.
//!
//! # Primary responsibilities
//! - **TopicTree**: arena-backed single-rooted tree with stable [`TopicId`]s.
//! - **Strategies**: the closed set [`Balanced`], [`Symmetric`] and [`Free`]
//!   behind one [`LayoutStrategy`] trait.
//! - **LayoutManager**: incremental recomputation with an extent cache, and
//!   change notifications on an [`EventBus`](arbor_core::EventBus).
//!
//! # How it fits in the system
//! The session in `arbor-runtime` mutates the tree, then calls the matching
//! `on_*` hook. The manager measures and arranges only what the edit can have
//! affected, writes the positions back, and publishes [`MapEvent`]s to the
//! renderer.

pub mod config;
pub mod error;
pub mod event;
pub mod manager;
pub mod strategy;
pub mod topic;

pub use config::{LayoutConfig, StrategyKind, UnknownStrategy};
pub use error::{LayoutError, LayoutResult};
pub use event::{MapEvent, MapEventKind};
pub use manager::{LayoutManager, PassReport};
pub use strategy::{
    Balanced, Extent, Frame, Free, Layout, LayoutStrategy, Slot, Spacing, Strategy, Symmetric,
};
pub use topic::{DetachedSubtree, Side, Topic, TopicId, TopicRecord, TopicTree};
