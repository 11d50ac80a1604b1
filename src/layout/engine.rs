use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use kurbo::Rect;
use tracing::{debug, trace, warn};

use crate::foundation::error::{ReflowError, ReflowResult};
use crate::layout::handle::LayoutHandle;
use crate::layout::parse::{self, Expr, RefTarget};

/// Index of a node inside the engine's arena.
pub(crate) type NodeId = u32;

/// Identifier of a registered measurable source (a widget or the viewport).
///
/// Sources are never deallocated, only marked dead, so a stale id can always
/// be checked for liveness instead of dereferencing freed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) u32);

/// Scalar geometry property a binding pulls from a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Property {
    Left,
    Top,
    Width,
    Height,
}

/// Axis a percent literal resolves against (parent width or height).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

/// Context supplied when a layout expression is (re)attached to a widget.
///
/// Percent literals and `parent.*` references resolve against `parent`;
/// bare property names (`"width"`) resolve against `owner`. The same parsed
/// expression can be connected repeatedly with different contexts and will
/// re-resolve each time.
#[derive(Clone, Copy, Debug)]
pub struct ConnectContext {
    pub owner: Option<SourceId>,
    pub parent: Option<SourceId>,
    pub axis: Axis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Min,
    Max,
}

/// How a measurement node refers to its source. `Source` is fixed at
/// construction (the `bind_*` functions); the other variants are resolved
/// each time the owning handle is connected.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Binding {
    Source(SourceId),
    Named(String),
    Parent,
    Owner,
}

#[derive(Clone, Debug)]
pub(crate) enum NodeOp {
    Value(f64),
    Binary(BinOp, NodeId, NodeId),
    Neg(NodeId),
    Not(NodeId),
    Clamp {
        value: NodeId,
        lo: NodeId,
        hi: NodeId,
    },
    Conditional {
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    },
    Measurement {
        binding: Binding,
        resolved: Option<SourceId>,
        prop: Property,
    },
    Percent {
        fraction: f64,
        resolved: Option<(SourceId, Axis)>,
    },
}

/// Operand ids of a node, in evaluation order.
pub(crate) fn operands(op: &NodeOp) -> [Option<NodeId>; 3] {
    match *op {
        NodeOp::Value(_) | NodeOp::Measurement { .. } | NodeOp::Percent { .. } => {
            [None, None, None]
        }
        NodeOp::Binary(_, l, r) => [Some(l), Some(r), None],
        NodeOp::Neg(c) | NodeOp::Not(c) => [Some(c), None, None],
        NodeOp::Clamp { value, lo, hi } => [Some(value), Some(lo), Some(hi)],
        NodeOp::Conditional {
            cond,
            then,
            otherwise,
        } => [Some(cond), Some(then), Some(otherwise)],
    }
}

pub(crate) struct Node {
    pub(crate) op: NodeOp,
    pub(crate) value: f64,
    pub(crate) dirty: bool,
    in_recalc: bool,
    refs: u32,
    /// Notify edges back to parents. Plain indices, never used for lifetime.
    dependents: Vec<NodeId>,
    warned_dangling: bool,
}

struct SourceSlot {
    rect: Rect,
    alive: bool,
    name: Option<String>,
}

pub(crate) struct CallbackSlot {
    handle: u64,
    node: NodeId,
    f: Option<Box<dyn FnMut()>>,
}

pub(crate) struct EngineInner {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    sources: Vec<SourceSlot>,
    names: HashMap<String, SourceId>,
    /// Measurement/percent nodes to seed-invalidate when a source moves.
    source_deps: HashMap<u32, Vec<NodeId>>,
    callbacks: Vec<CallbackSlot>,
    next_handle: u64,
    cycle_warned: bool,
}

impl EngineInner {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            sources: Vec::new(),
            names: HashMap::new(),
            source_deps: HashMap::new(),
            callbacks: Vec::new(),
            next_handle: 0,
            cycle_warned: false,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes[id as usize]
            .as_ref()
            .expect("layout node id refers to freed slot")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id as usize]
            .as_mut()
            .expect("layout node id refers to freed slot")
    }

    pub(crate) fn next_handle_id(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    // ---- arena ----------------------------------------------------------

    /// Allocate a node with refcount 0. Operand edges take one reference on
    /// each child and register the new node in each child's dependent set.
    /// The caller takes the first reference on the returned node (a handle
    /// or a parent operand edge).
    pub(crate) fn alloc(&mut self, op: NodeOp) -> NodeId {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.nodes.push(None);
                (self.nodes.len() - 1) as NodeId
            }
        };
        for child in operands(&op).into_iter().flatten() {
            let c = self.node_mut(child);
            c.refs += 1;
            c.dependents.push(id);
        }
        self.register_source_dep(&op, id);
        self.nodes[id as usize] = Some(Node {
            op,
            value: 0.0,
            dirty: true,
            in_recalc: false,
            refs: 0,
            dependents: Vec::new(),
            warned_dangling: false,
        });
        id
    }

    pub(crate) fn acquire(&mut self, id: NodeId) {
        self.node_mut(id).refs += 1;
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        let refs = {
            let n = self.node_mut(id);
            n.refs = n.refs.saturating_sub(1);
            n.refs
        };
        if refs > 0 {
            return;
        }
        let node = self.nodes[id as usize]
            .take()
            .expect("releasing freed layout node");
        self.unregister_source_dep(&node.op, id);
        for child in operands(&node.op).into_iter().flatten() {
            let c = self.node_mut(child);
            if let Some(pos) = c.dependents.iter().position(|&d| d == id) {
                c.dependents.swap_remove(pos);
            }
            self.release(child);
        }
        self.free.push(id);
    }

    fn register_source_dep(&mut self, op: &NodeOp, id: NodeId) {
        let source = match op {
            NodeOp::Measurement { resolved, .. } => *resolved,
            NodeOp::Percent { resolved, .. } => resolved.map(|(s, _)| s),
            _ => None,
        };
        if let Some(sid) = source {
            self.source_deps.entry(sid.0).or_default().push(id);
        }
    }

    fn unregister_source_dep(&mut self, op: &NodeOp, id: NodeId) {
        let source = match op {
            NodeOp::Measurement { resolved, .. } => *resolved,
            NodeOp::Percent { resolved, .. } => resolved.map(|(s, _)| s),
            _ => None,
        };
        if let Some(sid) = source
            && let Some(deps) = self.source_deps.get_mut(&sid.0)
            && let Some(pos) = deps.iter().position(|&d| d == id)
        {
            deps.swap_remove(pos);
        }
    }

    // ---- evaluation ------------------------------------------------------

    /// Lazy pull-based recompute. A node pulled while it is already being
    /// recomputed (a user-built cycle) returns its cached value instead of
    /// recursing forever.
    pub(crate) fn value_of(&mut self, id: NodeId) -> f64 {
        {
            let n = self.node(id);
            if !n.dirty {
                return n.value;
            }
            if n.in_recalc {
                let value = n.value;
                if !self.cycle_warned {
                    warn!(node = id, "cyclic layout dependency; using cached value");
                    self.cycle_warned = true;
                }
                return value;
            }
        }
        self.node_mut(id).in_recalc = true;
        let op = self.node(id).op.clone();
        let old = self.node(id).value;
        let v = match op {
            NodeOp::Value(v) => v,
            NodeOp::Binary(op, l, r) => {
                let a = self.value_of(l);
                let b = self.value_of(r);
                apply_bin(op, a, b)
            }
            NodeOp::Neg(c) => -self.value_of(c),
            NodeOp::Not(c) => {
                if self.value_of(c) != 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            NodeOp::Clamp { value, lo, hi } => {
                let v = self.value_of(value);
                let lo = self.value_of(lo);
                let hi = self.value_of(hi);
                v.max(lo).min(hi)
            }
            // Only the taken branch is pulled, so the untaken branch never
            // triggers a measurement pull.
            NodeOp::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.value_of(cond) != 0.0 {
                    self.value_of(then)
                } else {
                    self.value_of(otherwise)
                }
            }
            NodeOp::Measurement {
                ref binding,
                resolved,
                prop,
            } => match resolved {
                Some(sid) if self.sources[sid.0 as usize].alive => {
                    let rect = self.sources[sid.0 as usize].rect;
                    match prop {
                        Property::Left => rect.x0,
                        Property::Top => rect.y0,
                        Property::Width => rect.width(),
                        Property::Height => rect.height(),
                    }
                }
                _ => {
                    self.warn_dangling(id, binding);
                    old
                }
            },
            NodeOp::Percent {
                fraction,
                resolved,
            } => match resolved {
                Some((sid, axis)) if self.sources[sid.0 as usize].alive => {
                    let rect = self.sources[sid.0 as usize].rect;
                    let span = match axis {
                        Axis::Horizontal => rect.width(),
                        Axis::Vertical => rect.height(),
                    };
                    fraction * span
                }
                _ => {
                    trace!(node = id, "percent literal not resolved yet");
                    old
                }
            },
        };
        let n = self.node_mut(id);
        n.value = v;
        n.dirty = false;
        n.in_recalc = false;
        v
    }

    fn warn_dangling(&mut self, id: NodeId, binding: &Binding) {
        if self.node(id).warned_dangling {
            return;
        }
        match binding {
            Binding::Named(name) => {
                warn!(widget = %name, "layout binding refers to an unknown or dead widget; keeping last value")
            }
            _ => warn!(node = id, "layout binding source is gone; keeping last value"),
        }
        self.node_mut(id).warned_dangling = true;
    }

    // ---- invalidation ----------------------------------------------------

    fn mark_dirty_from(&mut self, seeds: &[NodeId]) {
        let mut stack: Vec<NodeId> = seeds.to_vec();
        while let Some(id) = stack.pop() {
            let n = self.node_mut(id);
            if n.dirty {
                continue;
            }
            n.dirty = true;
            stack.extend(n.dependents.iter().copied());
        }
    }

    /// Recompute every dirty node that has a registered callback and return
    /// the handle ids whose value actually changed. Shared nodes are
    /// recomputed once; each handle still gets its own notification.
    fn settle(&mut self) -> Vec<u64> {
        let watched: Vec<(u64, NodeId)> = self
            .callbacks
            .iter()
            .filter(|s| s.f.is_some())
            .map(|s| (s.handle, s.node))
            .collect();
        let mut changed_nodes: HashMap<NodeId, bool> = HashMap::new();
        let mut fire = Vec::new();
        for (hid, nid) in watched {
            let changed = match changed_nodes.get(&nid) {
                Some(&c) => c,
                None => {
                    let c = if self.node(nid).dirty {
                        let old = self.node(nid).value;
                        let new = self.value_of(nid);
                        new != old
                    } else {
                        false
                    };
                    changed_nodes.insert(nid, c);
                    c
                }
            };
            if changed {
                fire.push(hid);
            }
        }
        fire
    }

    // ---- sources ---------------------------------------------------------

    fn register_source(&mut self, name: Option<&str>) -> SourceId {
        let id = SourceId(self.sources.len() as u32);
        if let Some(name) = name
            && self.names.insert(name.to_owned(), id).is_some()
        {
            warn!(widget = %name, "duplicate widget name; later registration wins");
        }
        self.sources.push(SourceSlot {
            rect: Rect::ZERO,
            alive: true,
            name: name.map(str::to_owned),
        });
        id
    }

    fn set_source_rect(&mut self, sid: SourceId, rect: Rect) -> Vec<u64> {
        let slot = &mut self.sources[sid.0 as usize];
        let old = slot.rect;
        slot.rect = rect;
        let changed = [
            old.x0 != rect.x0,
            old.y0 != rect.y0,
            old.width() != rect.width(),
            old.height() != rect.height(),
        ];
        if !changed.iter().any(|&c| c) {
            return Vec::new();
        }
        let mut seeds = Vec::new();
        if let Some(deps) = self.source_deps.get(&sid.0) {
            for &nid in deps {
                let relevant = match &self.node(nid).op {
                    NodeOp::Measurement { prop, .. } => match prop {
                        Property::Left => changed[0],
                        Property::Top => changed[1],
                        Property::Width => changed[2],
                        Property::Height => changed[3],
                    },
                    NodeOp::Percent {
                        resolved: Some((_, axis)),
                        ..
                    } => match axis {
                        Axis::Horizontal => changed[2],
                        Axis::Vertical => changed[3],
                    },
                    _ => false,
                };
                if relevant {
                    seeds.push(nid);
                }
            }
        }
        self.mark_dirty_from(&seeds);
        self.settle()
    }

    fn remove_source(&mut self, sid: SourceId) {
        let slot = &mut self.sources[sid.0 as usize];
        slot.alive = false;
        if let Some(name) = slot.name.take() {
            self.names.remove(&name);
        }
    }

    pub(crate) fn source_name(&self, sid: SourceId) -> Option<&str> {
        self.sources[sid.0 as usize].name.as_deref()
    }

    // ---- connect ---------------------------------------------------------

    /// Re-resolve name/parent/owner bindings and percent spans in the tree
    /// rooted at `root` against a new context.
    fn connect(&mut self, root: NodeId, ctx: &ConnectContext) -> Vec<u64> {
        let mut stack = vec![root];
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut seeds = Vec::new();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            stack.extend(operands(&self.node(id).op).into_iter().flatten());

            let new_resolution = match &self.node(id).op {
                NodeOp::Measurement { binding, .. } => match binding {
                    Binding::Source(_) => continue,
                    Binding::Owner => Some(ctx.owner),
                    Binding::Parent => Some(ctx.parent),
                    Binding::Named(name) => {
                        let found = self.names.get(name.as_str()).copied();
                        if found.is_none() {
                            // The widget may simply not exist yet; the
                            // binding stays unresolved until reconnected.
                            warn!(widget = %name, "bound widget not found while connecting layout");
                        }
                        Some(found)
                    }
                },
                NodeOp::Percent { .. } => None,
                _ => continue,
            };

            match new_resolution {
                Some(new) => {
                    let NodeOp::Measurement { resolved, .. } = &mut self.node_mut(id).op else {
                        unreachable!()
                    };
                    if *resolved != new {
                        let old_op = self.node(id).op.clone();
                        self.unregister_source_dep(&old_op, id);
                        let NodeOp::Measurement { resolved, .. } = &mut self.node_mut(id).op
                        else {
                            unreachable!()
                        };
                        *resolved = new;
                        let new_op = self.node(id).op.clone();
                        self.register_source_dep(&new_op, id);
                        self.node_mut(id).warned_dangling = false;
                        seeds.push(id);
                    }
                }
                None => {
                    let new = ctx.parent.map(|p| (p, ctx.axis));
                    let NodeOp::Percent { resolved, .. } = &mut self.node_mut(id).op else {
                        unreachable!()
                    };
                    if *resolved != new {
                        let old_op = self.node(id).op.clone();
                        self.unregister_source_dep(&old_op, id);
                        let NodeOp::Percent { resolved, .. } = &mut self.node_mut(id).op else {
                            unreachable!()
                        };
                        *resolved = new;
                        let new_op = self.node(id).op.clone();
                        self.register_source_dep(&new_op, id);
                        seeds.push(id);
                    }
                }
            }
        }
        self.mark_dirty_from(&seeds);
        self.settle()
    }

    // ---- callbacks -------------------------------------------------------

    /// Returns the replaced slot, if any; the caller must drop it after
    /// releasing the engine borrow because the closure may own handles.
    pub(crate) fn set_callback(
        &mut self,
        handle: u64,
        node: NodeId,
        f: Box<dyn FnMut()>,
    ) -> Option<CallbackSlot> {
        let old = self.clear_callback(handle);
        self.callbacks.push(CallbackSlot {
            handle,
            node,
            f: Some(f),
        });
        old
    }

    /// Returns the removed slot, if any; the caller must drop it after
    /// releasing the engine borrow because the closure may own handles.
    pub(crate) fn clear_callback(&mut self, handle: u64) -> Option<CallbackSlot> {
        self.callbacks
            .iter()
            .position(|s| s.handle == handle)
            .map(|i| self.callbacks.remove(i))
    }

    // ---- lowering --------------------------------------------------------

    /// Build arena nodes for a parsed expression tree and return the root.
    /// The root has refcount 0; the caller takes the first reference.
    pub(crate) fn lower(&mut self, expr: &Expr) -> NodeId {
        match expr {
            Expr::Number(v) => self.alloc(NodeOp::Value(*v)),
            Expr::Percent(f) => self.alloc(NodeOp::Percent {
                fraction: *f,
                resolved: None,
            }),
            Expr::Neg(e) => {
                let c = self.lower(e);
                self.alloc(NodeOp::Neg(c))
            }
            Expr::Not(e) => {
                let c = self.lower(e);
                self.alloc(NodeOp::Not(c))
            }
            Expr::Binary { op, left, right } => {
                let l = self.lower(left);
                let r = self.lower(right);
                self.alloc(NodeOp::Binary(*op, l, r))
            }
            Expr::Clamp(v, lo, hi) => {
                let value = self.lower(v);
                let lo = self.lower(lo);
                let hi = self.lower(hi);
                self.alloc(NodeOp::Clamp { value, lo, hi })
            }
            Expr::If(c, t, f) => {
                let cond = self.lower(c);
                let then = self.lower(t);
                let otherwise = self.lower(f);
                self.alloc(NodeOp::Conditional {
                    cond,
                    then,
                    otherwise,
                })
            }
            Expr::Ref { target, prop } => match prop {
                // right/bottom desugar into left+width / top+height so a
                // single measurement vocabulary covers them.
                parse::PropertyRef::Right => {
                    let l = self.measurement(target, Property::Left);
                    let w = self.measurement(target, Property::Width);
                    self.alloc(NodeOp::Binary(BinOp::Add, l, w))
                }
                parse::PropertyRef::Bottom => {
                    let t = self.measurement(target, Property::Top);
                    let h = self.measurement(target, Property::Height);
                    self.alloc(NodeOp::Binary(BinOp::Add, t, h))
                }
                parse::PropertyRef::Left => self.measurement(target, Property::Left),
                parse::PropertyRef::Top => self.measurement(target, Property::Top),
                parse::PropertyRef::Width => self.measurement(target, Property::Width),
                parse::PropertyRef::Height => self.measurement(target, Property::Height),
            },
        }
    }

    fn measurement(&mut self, target: &RefTarget, prop: Property) -> NodeId {
        let binding = match target {
            RefTarget::Owner => Binding::Owner,
            RefTarget::Parent => Binding::Parent,
            RefTarget::Named(name) => Binding::Named(name.clone()),
        };
        self.alloc(NodeOp::Measurement {
            binding,
            resolved: None,
            prop,
        })
    }

    // ---- stringification ---------------------------------------------------

    /// Render a node back into parseable expression syntax.
    pub(crate) fn expr_string(&self, id: NodeId) -> String {
        match &self.node(id).op {
            NodeOp::Value(v) => fmt_number(*v),
            NodeOp::Binary(op, l, r) => match op {
                BinOp::Min => format!("min({}, {})", self.expr_string(*l), self.expr_string(*r)),
                BinOp::Max => format!("max({}, {})", self.expr_string(*l), self.expr_string(*r)),
                _ => format!(
                    "{} {} {}",
                    self.operand_string(*l),
                    bin_symbol(*op),
                    self.operand_string(*r)
                ),
            },
            NodeOp::Neg(c) => format!("-{}", self.operand_string(*c)),
            NodeOp::Not(c) => format!("!{}", self.operand_string(*c)),
            NodeOp::Clamp { value, lo, hi } => format!(
                "clamp({}, {}, {})",
                self.expr_string(*value),
                self.expr_string(*lo),
                self.expr_string(*hi)
            ),
            NodeOp::Conditional {
                cond,
                then,
                otherwise,
            } => format!(
                "if({}, {}, {})",
                self.expr_string(*cond),
                self.expr_string(*then),
                self.expr_string(*otherwise)
            ),
            NodeOp::Measurement {
                binding,
                resolved,
                prop,
            } => {
                let prop = match prop {
                    Property::Left => "left",
                    Property::Top => "top",
                    Property::Width => "width",
                    Property::Height => "height",
                };
                match binding {
                    Binding::Owner => prop.to_owned(),
                    Binding::Parent => format!("parent.{prop}"),
                    Binding::Named(name) => format!("&{name}.{prop}"),
                    Binding::Source(_) => match resolved.and_then(|s| self.source_name(s)) {
                        Some(name) => format!("&{name}.{prop}"),
                        None => prop.to_owned(),
                    },
                }
            }
            NodeOp::Percent { fraction, .. } => format!("{}%", fmt_number(fraction * 100.0)),
        }
    }

    /// Like `expr_string` but parenthesizes composite operands so the
    /// round-tripped string keeps the original grouping.
    fn operand_string(&self, id: NodeId) -> String {
        let composite = matches!(
            self.node(id).op,
            NodeOp::Binary(
                BinOp::Add
                    | BinOp::Sub
                    | BinOp::Mul
                    | BinOp::Div
                    | BinOp::Rem
                    | BinOp::Lt
                    | BinOp::Le
                    | BinOp::Gt
                    | BinOp::Ge
                    | BinOp::Eq
                    | BinOp::Ne
                    | BinOp::And
                    | BinOp::Or,
                ..
            )
        );
        if composite {
            format!("({})", self.expr_string(id))
        } else {
            self.expr_string(id)
        }
    }
}

fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn bin_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::And => "&&",
        BinOp::Or => "||",
        BinOp::Min | BinOp::Max => unreachable!("rendered as calls"),
    }
}

fn apply_bin(op: BinOp, a: f64, b: f64) -> f64 {
    // Division and modulus follow IEEE semantics (inf/NaN propagation);
    // comparisons and boolean operators yield 1.0/0.0 so they compose
    // arithmetically.
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        BinOp::Lt => truth(a < b),
        BinOp::Le => truth(a <= b),
        BinOp::Gt => truth(a > b),
        BinOp::Ge => truth(a >= b),
        BinOp::Eq => truth(a == b),
        BinOp::Ne => truth(a != b),
        BinOp::And => truth(a != 0.0 && b != 0.0),
        BinOp::Or => truth(a != 0.0 || b != 0.0),
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
    }
}

fn truth(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

/// The layout expression engine: an arena of expression nodes plus the
/// registry of measurable sources they bind to.
///
/// Single-threaded by design; handles share the engine through `Rc`. All
/// invalidation propagation completes synchronously before the mutating call
/// returns, so a `value()` read immediately afterward observes a fully
/// settled graph.
#[derive(Clone)]
pub struct LayoutEngine {
    pub(crate) inner: Rc<RefCell<EngineInner>>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EngineInner::new())),
        }
    }

    /// Register a widget or viewport as a measurable source. Named sources
    /// can be referenced from expressions as `&name.prop`.
    pub fn register_source(&self, name: Option<&str>) -> SourceId {
        self.inner.borrow_mut().register_source(name)
    }

    /// Push a source's current geometry. Dependent expressions are
    /// invalidated eagerly and change callbacks fire (each exactly once)
    /// before this returns.
    pub fn set_source_rect(&self, id: SourceId, rect: Rect) {
        let fire = self.inner.borrow_mut().set_source_rect(id, rect);
        self.run_callbacks(fire);
    }

    /// Current geometry of a source, if it is still alive.
    pub fn source_rect(&self, id: SourceId) -> Option<Rect> {
        let inner = self.inner.borrow();
        let slot = &inner.sources[id.0 as usize];
        slot.alive.then_some(slot.rect)
    }

    /// Mark a source dead. Bindings that still reference it keep returning
    /// their last computed value.
    pub fn remove_source(&self, id: SourceId) {
        self.inner.borrow_mut().remove_source(id);
    }

    /// A handle holding a plain constant.
    pub fn constant(&self, value: f64) -> LayoutHandle {
        let node = self.inner.borrow_mut().alloc(NodeOp::Value(value));
        LayoutHandle::from_node(self.clone(), node)
    }

    /// Parse a layout expression string into a handle. Syntax errors fail
    /// here; unknown widget names are reported when the handle is connected.
    pub fn expression(&self, src: &str) -> ReflowResult<LayoutHandle> {
        let expr = parse::parse_expr(src).map_err(|e| ReflowError::parse(e.to_string()))?;
        let node = self.inner.borrow_mut().lower(&expr);
        Ok(LayoutHandle::from_node(self.clone(), node))
    }

    pub(crate) fn connect_node(&self, root: NodeId, ctx: &ConnectContext) {
        debug!(node = root, "connecting layout expression");
        let fire = self.inner.borrow_mut().connect(root, ctx);
        self.run_callbacks(fire);
    }

    /// Invoke change callbacks outside the engine borrow so a callback may
    /// freely call back into the engine.
    fn run_callbacks(&self, fire: Vec<u64>) {
        for hid in fire {
            let taken = {
                let mut inner = self.inner.borrow_mut();
                inner
                    .callbacks
                    .iter_mut()
                    .find(|s| s.handle == hid)
                    .and_then(|s| s.f.take())
            };
            if let Some(mut f) = taken {
                f();
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.callbacks.iter_mut().find(|s| s.handle == hid)
                    && slot.f.is_none()
                {
                    slot.f = Some(f);
                }
            }
        }
    }
}
