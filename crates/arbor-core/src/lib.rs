#![forbid(unsafe_code)]

//! Core: geometry primitives and the map-scoped event bus.
//!
//! # Role in Arbor
//! `arbor-core` is the leaf layer. It owns the value types every other crate
//! speaks in ([`Size`], [`Position`], [`Bounds`]) and the synchronous
//! publish/subscribe [`EventBus`] that the layout manager uses to tell an
//! external renderer which topics moved or resized.
//!
//! # How it fits in the system
//! `arbor-layout` builds the topic tree and layout strategies on top of these
//! primitives and publishes its notifications through an [`EventBus`] owned
//! by the document session in `arbor-runtime`. Nothing here knows about
//! topics; the bus is generic over any [`BusEvent`].

pub mod bus;
pub mod geometry;

pub use bus::{BusEvent, EventBus, Subscription};
pub use geometry::{Bounds, Position, Size};
