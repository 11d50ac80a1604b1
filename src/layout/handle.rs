use std::fmt;
use std::rc::Rc;

use kurbo::Point;
use tracing::warn;

use crate::foundation::error::{ReflowError, ReflowResult};
use crate::layout::engine::{
    Axis, BinOp, ConnectContext, LayoutEngine, NodeId, NodeOp, SourceId,
};
use crate::layout::parse;

/// A live scalar layout value.
///
/// Handles are cheap references into the engine's expression arena. Cloning
/// a handle shares the underlying node, so extending a clone with operators
/// never mutates the original. Dropping the last handle to a subtree frees
/// its nodes.
pub struct LayoutHandle {
    engine: LayoutEngine,
    node: NodeId,
    /// Distinguishes this handle's callback slot from clones sharing the node.
    id: u64,
}

impl LayoutHandle {
    pub(crate) fn from_node(engine: LayoutEngine, node: NodeId) -> Self {
        let id = {
            let mut inner = engine.inner.borrow_mut();
            inner.acquire(node);
            inner.next_handle_id()
        };
        Self { engine, node, id }
    }

    /// Current value, recomputing lazily if an input changed.
    pub fn value(&self) -> f64 {
        self.engine.inner.borrow_mut().value_of(self.node)
    }

    /// Register the callback invoked when this handle's value changes.
    /// Each handle has one slot; setting again replaces the previous
    /// callback. The callback fires at most once per geometry change.
    pub fn on_change(&self, f: impl FnMut() + 'static) {
        // Bind the replaced slot so its closure (which may own handles that
        // re-borrow the engine on drop) is dropped after the borrow ends.
        let _old = self
            .engine
            .inner
            .borrow_mut()
            .set_callback(self.id, self.node, Box::new(f));
    }

    pub fn clear_on_change(&self) {
        let _old = self.engine.inner.borrow_mut().clear_callback(self.id);
    }

    /// Attach the expression to a widget: bare properties measure `owner`,
    /// `parent.*` and percent literals measure `parent`. May be called again
    /// whenever the widget is reparented; bindings re-resolve each time and
    /// the change callback fires if the value moved.
    pub fn connect(&self, ctx: ConnectContext) {
        self.engine.connect_node(self.node, &ctx);
    }

    /// Render the expression back into parseable string form.
    pub fn to_expression_string(&self) -> String {
        self.engine.inner.borrow().expr_string(self.node)
    }

    pub fn engine(&self) -> &LayoutEngine {
        &self.engine
    }

    // ---- combinators -------------------------------------------------------

    pub fn min_of<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Min, self, other.into())
    }

    pub fn max_of<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Max, self, other.into())
    }

    pub fn clamped<'a, 'b>(
        &self,
        lo: impl Into<Operand<'a>>,
        hi: impl Into<Operand<'b>>,
    ) -> LayoutHandle {
        let lo = operand_node(&self.engine, lo.into());
        let hi = operand_node(&self.engine, hi.into());
        let node = self.engine.inner.borrow_mut().alloc(NodeOp::Clamp {
            value: self.node,
            lo,
            hi,
        });
        LayoutHandle::from_node(self.engine.clone(), node)
    }

    /// Treat this handle as a condition (non-zero is true) and choose
    /// between two values. Only the taken branch is evaluated.
    pub fn when<'a, 'b>(
        &self,
        then: impl Into<Operand<'a>>,
        otherwise: impl Into<Operand<'b>>,
    ) -> LayoutHandle {
        let then = operand_node(&self.engine, then.into());
        let otherwise = operand_node(&self.engine, otherwise.into());
        let node = self.engine.inner.borrow_mut().alloc(NodeOp::Conditional {
            cond: self.node,
            then,
            otherwise,
        });
        LayoutHandle::from_node(self.engine.clone(), node)
    }

    pub fn less_than<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Lt, self, other.into())
    }

    pub fn at_most<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Le, self, other.into())
    }

    pub fn greater_than<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Gt, self, other.into())
    }

    pub fn at_least<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Ge, self, other.into())
    }

    pub fn equals<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Eq, self, other.into())
    }

    pub fn differs<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Ne, self, other.into())
    }

    pub fn and<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::And, self, other.into())
    }

    pub fn or<'a>(&self, other: impl Into<Operand<'a>>) -> LayoutHandle {
        binary(BinOp::Or, self, other.into())
    }
}

impl Clone for LayoutHandle {
    /// The clone shares the node (and therefore the value) but owns its own
    /// callback slot, which starts empty.
    fn clone(&self) -> Self {
        LayoutHandle::from_node(self.engine.clone(), self.node)
    }
}

impl Drop for LayoutHandle {
    fn drop(&mut self) {
        let removed = {
            let mut inner = self.engine.inner.borrow_mut();
            let removed = inner.clear_callback(self.id);
            inner.release(self.node);
            removed
        };
        drop(removed);
    }
}

impl fmt::Debug for LayoutHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutHandle")
            .field("expr", &self.to_expression_string())
            .finish()
    }
}

/// Right-hand side of a combinator: another handle or a plain number.
pub enum Operand<'a> {
    Handle(&'a LayoutHandle),
    Value(f64),
}

impl<'a> From<&'a LayoutHandle> for Operand<'a> {
    fn from(h: &'a LayoutHandle) -> Self {
        Operand::Handle(h)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Value(v)
    }
}

/// Resolve an operand to a node in `engine`'s arena. A handle from a
/// different engine cannot participate in the graph, so its current value
/// is frozen into a constant instead.
fn operand_node(engine: &LayoutEngine, operand: Operand<'_>) -> NodeId {
    match operand {
        Operand::Value(v) => engine.inner.borrow_mut().alloc(NodeOp::Value(v)),
        Operand::Handle(h) => {
            if Rc::ptr_eq(&engine.inner, &h.engine.inner) {
                h.node
            } else {
                warn!("combining layout handles from different engines; freezing the foreign value");
                let v = h.value();
                engine.inner.borrow_mut().alloc(NodeOp::Value(v))
            }
        }
    }
}

fn binary(op: BinOp, left: &LayoutHandle, right: Operand<'_>) -> LayoutHandle {
    let right = operand_node(&left.engine, right);
    let node = left
        .engine
        .inner
        .borrow_mut()
        .alloc(NodeOp::Binary(op, left.node, right));
    LayoutHandle::from_node(left.engine.clone(), node)
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for &LayoutHandle {
            type Output = LayoutHandle;
            fn $method(self, rhs: &LayoutHandle) -> LayoutHandle {
                binary($op, self, Operand::Handle(rhs))
            }
        }

        impl std::ops::$trait<f64> for &LayoutHandle {
            type Output = LayoutHandle;
            fn $method(self, rhs: f64) -> LayoutHandle {
                binary($op, self, Operand::Value(rhs))
            }
        }

        impl std::ops::$trait<&LayoutHandle> for f64 {
            type Output = LayoutHandle;
            fn $method(self, rhs: &LayoutHandle) -> LayoutHandle {
                let lhs = rhs.engine.constant(self);
                binary($op, &lhs, Operand::Handle(rhs))
            }
        }

        impl std::ops::$trait for LayoutHandle {
            type Output = LayoutHandle;
            fn $method(self, rhs: LayoutHandle) -> LayoutHandle {
                binary($op, &self, Operand::Handle(&rhs))
            }
        }

        impl std::ops::$trait<f64> for LayoutHandle {
            type Output = LayoutHandle;
            fn $method(self, rhs: f64) -> LayoutHandle {
                binary($op, &self, Operand::Value(rhs))
            }
        }

        impl std::ops::$trait<LayoutHandle> for f64 {
            type Output = LayoutHandle;
            fn $method(self, rhs: LayoutHandle) -> LayoutHandle {
                let lhs = rhs.engine.constant(self);
                binary($op, &lhs, Operand::Handle(&rhs))
            }
        }
    };
}

impl_arith!(Add, add, BinOp::Add);
impl_arith!(Sub, sub, BinOp::Sub);
impl_arith!(Mul, mul, BinOp::Mul);
impl_arith!(Div, div, BinOp::Div);
impl_arith!(Rem, rem, BinOp::Rem);

impl std::ops::Neg for &LayoutHandle {
    type Output = LayoutHandle;
    fn neg(self) -> LayoutHandle {
        let node = self.engine.inner.borrow_mut().alloc(NodeOp::Neg(self.node));
        LayoutHandle::from_node(self.engine.clone(), node)
    }
}

impl std::ops::Neg for LayoutHandle {
    type Output = LayoutHandle;
    fn neg(self) -> LayoutHandle {
        -&self
    }
}

impl std::ops::Not for &LayoutHandle {
    type Output = LayoutHandle;
    fn not(self) -> LayoutHandle {
        let node = self.engine.inner.borrow_mut().alloc(NodeOp::Not(self.node));
        LayoutHandle::from_node(self.engine.clone(), node)
    }
}

impl std::ops::Not for LayoutHandle {
    type Output = LayoutHandle;
    fn not(self) -> LayoutHandle {
        !&self
    }
}

/// A pair of scalar layouts driving a 2-d position or size.
///
/// The x component resolves percent literals against the parent's width,
/// the y component against its height.
pub struct Layout2d {
    pub x: LayoutHandle,
    pub y: LayoutHandle,
}

impl Layout2d {
    pub fn new(x: LayoutHandle, y: LayoutHandle) -> Self {
        Self { x, y }
    }

    pub fn value(&self) -> Point {
        Point::new(self.x.value(), self.y.value())
    }

    pub fn connect(&self, owner: Option<SourceId>, parent: Option<SourceId>) {
        self.x.connect(ConnectContext {
            owner,
            parent,
            axis: Axis::Horizontal,
        });
        self.y.connect(ConnectContext {
            owner,
            parent,
            axis: Axis::Vertical,
        });
    }

    pub fn to_expression_string(&self) -> String {
        format!(
            "({}, {})",
            self.x.to_expression_string(),
            self.y.to_expression_string()
        )
    }
}

impl LayoutEngine {
    /// Parse a `"(x, y)"` pair into a two-dimensional layout.
    pub fn expression_pair(&self, src: &str) -> ReflowResult<Layout2d> {
        let (x, y) = parse::parse_pair(src).map_err(|e| ReflowError::parse(e.to_string()))?;
        let mut inner = self.inner.borrow_mut();
        let x = inner.lower(&x);
        let y = inner.lower(&y);
        drop(inner);
        Ok(Layout2d::new(
            LayoutHandle::from_node(self.clone(), x),
            LayoutHandle::from_node(self.clone(), y),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_compose_constants() {
        let engine = LayoutEngine::new();
        let a = engine.constant(10.0);
        let b = engine.constant(4.0);
        assert_eq!((&a + &b).value(), 14.0);
        assert_eq!((&a - &b).value(), 6.0);
        assert_eq!((&a * &b).value(), 40.0);
        assert_eq!((&a / &b).value(), 2.5);
        assert_eq!((&a % &b).value(), 2.0);
        assert_eq!((-&a).value(), -10.0);
        assert_eq!((2.0 * &a + 1.0).value(), 21.0);
    }

    #[test]
    fn comparisons_yield_zero_or_one() {
        let engine = LayoutEngine::new();
        let a = engine.constant(10.0);
        assert_eq!(a.less_than(20.0).value(), 1.0);
        assert_eq!(a.greater_than(20.0).value(), 0.0);
        assert_eq!(a.equals(10.0).value(), 1.0);
        assert_eq!(a.differs(10.0).value(), 0.0);
        assert_eq!((!a.equals(10.0)).value(), 0.0);
    }

    #[test]
    fn clamp_and_min_max() {
        let engine = LayoutEngine::new();
        let v = engine.constant(150.0);
        assert_eq!(v.clamped(0.0, 100.0).value(), 100.0);
        assert_eq!(v.min_of(100.0).value(), 100.0);
        assert_eq!(v.max_of(200.0).value(), 200.0);
    }

    #[test]
    fn clone_shares_value_but_not_callback() {
        let engine = LayoutEngine::new();
        let source = engine.register_source(Some("w"));
        let a = engine.expression("&w.width").unwrap();
        a.connect(ConnectContext {
            owner: None,
            parent: None,
            axis: Axis::Horizontal,
        });
        let b = a.clone();
        engine.set_source_rect(source, kurbo::Rect::new(0.0, 0.0, 42.0, 10.0));
        assert_eq!(a.value(), 42.0);
        assert_eq!(b.value(), 42.0);
    }

    #[test]
    fn cross_engine_operand_is_frozen() {
        let first = LayoutEngine::new();
        let second = LayoutEngine::new();
        let a = first.constant(5.0);
        let b = second.constant(7.0);
        let sum = &a + &b;
        assert_eq!(sum.value(), 12.0);
    }

    #[test]
    fn division_by_zero_propagates_ieee() {
        let engine = LayoutEngine::new();
        let one = engine.constant(1.0);
        let zero = engine.constant(0.0);
        assert!((&one / &zero).value().is_infinite());
        assert!((&zero / &zero).value().is_nan());
    }

    #[test]
    fn pair_connects_each_axis() {
        let engine = LayoutEngine::new();
        let parent = engine.register_source(Some("panel"));
        engine.set_source_rect(parent, kurbo::Rect::new(0.0, 0.0, 200.0, 100.0));
        let pos = engine.expression_pair("(25%, 50%)").unwrap();
        pos.connect(None, Some(parent));
        assert_eq!(pos.value(), Point::new(50.0, 50.0));
        assert_eq!(pos.to_expression_string(), "(25%, 50%)");
    }
}
