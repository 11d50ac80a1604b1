//! The layout expression engine.
//!
//! Widgets (or anything else with a rectangle) register as sources with a
//! [`LayoutEngine`]; expressions over those sources are held as
//! [`LayoutHandle`]s that recompute lazily and notify on change. Expressions
//! come from three places: parsed strings ([`LayoutEngine::expression`]),
//! operator composition over existing handles, and the `bind_*` constructors
//! in [`bind`].

pub mod bind;
mod engine;
mod handle;
mod parse;

pub use engine::{Axis, ConnectContext, LayoutEngine, Property, SourceId};
pub use handle::{Layout2d, LayoutHandle, Operand};
