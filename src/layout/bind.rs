//! Programmatic binding constructors.
//!
//! These build the same measurement nodes the expression parser produces,
//! except the source is fixed at construction instead of being looked up by
//! name when the handle is connected. They are the API of choice when the
//! caller already holds a [`SourceId`].

use crate::layout::engine::{Binding, LayoutEngine, NodeOp, Property, SourceId};
use crate::layout::handle::{Layout2d, LayoutHandle, Operand};

fn measurement(engine: &LayoutEngine, source: SourceId, prop: Property) -> LayoutHandle {
    let node = engine.inner.borrow_mut().alloc(NodeOp::Measurement {
        binding: Binding::Source(source),
        resolved: Some(source),
        prop,
    });
    LayoutHandle::from_node(engine.clone(), node)
}

pub fn bind_left(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    measurement(engine, source, Property::Left)
}

pub fn bind_top(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    measurement(engine, source, Property::Top)
}

pub fn bind_width(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    measurement(engine, source, Property::Width)
}

pub fn bind_height(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    measurement(engine, source, Property::Height)
}

pub fn bind_right(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    &bind_left(engine, source) + &bind_width(engine, source)
}

pub fn bind_bottom(engine: &LayoutEngine, source: SourceId) -> LayoutHandle {
    &bind_top(engine, source) + &bind_height(engine, source)
}

pub fn bind_position(engine: &LayoutEngine, source: SourceId) -> Layout2d {
    Layout2d::new(bind_left(engine, source), bind_top(engine, source))
}

pub fn bind_size(engine: &LayoutEngine, source: SourceId) -> Layout2d {
    Layout2d::new(bind_width(engine, source), bind_height(engine, source))
}

pub fn bind_min(a: &LayoutHandle, b: &LayoutHandle) -> LayoutHandle {
    a.min_of(b)
}

pub fn bind_max(a: &LayoutHandle, b: &LayoutHandle) -> LayoutHandle {
    a.max_of(b)
}

/// Clamp `value` into `[lo, hi]`.
pub fn bind_range<'a, 'b>(
    value: &LayoutHandle,
    lo: impl Into<Operand<'a>>,
    hi: impl Into<Operand<'b>>,
) -> LayoutHandle {
    value.clamped(lo, hi)
}

/// Choose between two values based on a condition handle. Only the taken
/// branch is evaluated, so the untaken branch never pulls its sources.
pub fn bind_if<'a, 'b>(
    condition: &LayoutHandle,
    then: impl Into<Operand<'a>>,
    otherwise: impl Into<Operand<'b>>,
) -> LayoutHandle {
    condition.when(then, otherwise)
}

#[cfg(test)]
mod tests {
    use kurbo::Rect;

    use super::*;

    #[test]
    fn source_bindings_track_geometry() {
        let engine = LayoutEngine::new();
        let w = engine.register_source(None);
        engine.set_source_rect(w, Rect::new(10.0, 20.0, 110.0, 70.0));

        assert_eq!(bind_left(&engine, w).value(), 10.0);
        assert_eq!(bind_top(&engine, w).value(), 20.0);
        assert_eq!(bind_width(&engine, w).value(), 100.0);
        assert_eq!(bind_height(&engine, w).value(), 50.0);
        assert_eq!(bind_right(&engine, w).value(), 110.0);
        assert_eq!(bind_bottom(&engine, w).value(), 70.0);
    }

    #[test]
    fn bound_position_follows_moves() {
        let engine = LayoutEngine::new();
        let w = engine.register_source(None);
        let pos = bind_position(&engine, w);
        engine.set_source_rect(w, Rect::new(3.0, 4.0, 13.0, 14.0));
        assert_eq!(pos.value(), kurbo::Point::new(3.0, 4.0));
        engine.set_source_rect(w, Rect::new(30.0, 40.0, 40.0, 50.0));
        assert_eq!(pos.value(), kurbo::Point::new(30.0, 40.0));
    }

    #[test]
    fn bind_if_short_circuits() {
        let engine = LayoutEngine::new();
        let gone = engine.register_source(None);
        let cond = engine.constant(0.0);
        let dangling = bind_width(&engine, gone);
        engine.remove_source(gone);
        // The untaken branch is dangling but never pulled.
        let choice = bind_if(&cond, &dangling, 7.0);
        assert_eq!(choice.value(), 7.0);
    }

    #[test]
    fn removed_source_keeps_last_value() {
        let engine = LayoutEngine::new();
        let w = engine.register_source(None);
        let width = bind_width(&engine, w);
        engine.set_source_rect(w, Rect::new(0.0, 0.0, 64.0, 8.0));
        assert_eq!(width.value(), 64.0);
        engine.remove_source(w);
        assert_eq!(width.value(), 64.0);
    }
}
