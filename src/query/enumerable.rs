//! Lazy evaluation nodes.
//!
//! The node graph is built top-down from the compiled query, and the data
//! source is attached afterwards with [`QueryEnumerable::set_payload`]. Items
//! are pulled through the graph one at a time, so a host loop can interleave
//! evaluation with progress reporting.
//!
//! Which enumerable a node becomes is decided by a map keyed by [`NodeKind`].

use std::rc::Rc;

use ahash::AHashMap;

use crate::query::ast::NodeKind;
use crate::query::compiled::{CompiledNested, CompiledNode, EvalContext};

/// Upstream sequence of an enumerable.
pub type Payload<'a, T> = Box<dyn Iterator<Item = &'a T> + 'a>;

/// A lazily filtered sequence whose source is set after construction.
pub trait QueryEnumerable<'a, T: 'a>: Iterator<Item = &'a T> {
    fn set_payload(&mut self, payload: Payload<'a, T>);
}

pub type BoxedEnumerable<'a, T> = Box<dyn QueryEnumerable<'a, T> + 'a>;

type Constructor<'a, T> =
    fn(&'a CompiledNode<T>, &EnumerableFactory<'a, T>) -> BoxedEnumerable<'a, T>;

// ── Where ───────────────────────────────────────────────────────────

/// Yields payload items for which the node's predicate holds.
pub struct WhereEnumerable<'a, T> {
    node: &'a CompiledNode<T>,
    context: Rc<EvalContext<'a, T>>,
    payload: Option<Payload<'a, T>>,
}

impl<'a, T> Iterator for WhereEnumerable<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let payload = self.payload.as_mut()?;
        payload.find(|item| self.node.evaluate(item, &self.context))
    }
}

impl<'a, T: 'a> QueryEnumerable<'a, T> for WhereEnumerable<'a, T> {
    fn set_payload(&mut self, payload: Payload<'a, T>) {
        self.payload = Some(payload);
    }
}

// ── And ─────────────────────────────────────────────────────────────

/// Chains its children: each child filters the output of the previous one.
pub struct AndEnumerable<'a, T> {
    stages: Vec<BoxedEnumerable<'a, T>>,
    output: Option<Payload<'a, T>>,
}

impl<'a, T> Iterator for AndEnumerable<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        self.output.as_mut()?.next()
    }
}

impl<'a, T: 'a> QueryEnumerable<'a, T> for AndEnumerable<'a, T> {
    fn set_payload(&mut self, payload: Payload<'a, T>) {
        let mut upstream = payload;
        for mut stage in self.stages.drain(..) {
            stage.set_payload(upstream);
            upstream = Box::new(stage);
        }
        self.output = Some(upstream);
    }
}

// ── Nested ──────────────────────────────────────────────────────────

/// Materializes the sub-query values on first pull, then filters the payload
/// with the semi-join.
pub struct NestedQueryEnumerable<'a, T> {
    nested: &'a CompiledNested<T>,
    context: Rc<EvalContext<'a, T>>,
    payload: Option<Payload<'a, T>>,
}

impl<'a, T> Iterator for NestedQueryEnumerable<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let payload = self.payload.as_mut()?;
        payload.find(|item| self.nested.evaluate(item, &self.context))
    }
}

impl<'a, T: 'a> QueryEnumerable<'a, T> for NestedQueryEnumerable<'a, T> {
    fn set_payload(&mut self, payload: Payload<'a, T>) {
        self.payload = Some(payload);
    }
}

// ── Factory ─────────────────────────────────────────────────────────

fn create_where<'a, T: 'a>(
    node: &'a CompiledNode<T>,
    factory: &EnumerableFactory<'a, T>,
) -> BoxedEnumerable<'a, T> {
    Box::new(WhereEnumerable {
        node,
        context: factory.context.clone(),
        payload: None,
    })
}

fn create_and<'a, T: 'a>(
    node: &'a CompiledNode<T>,
    factory: &EnumerableFactory<'a, T>,
) -> BoxedEnumerable<'a, T> {
    match node {
        CompiledNode::And(children) => Box::new(AndEnumerable {
            stages: children.iter().map(|child| factory.create(child)).collect(),
            output: None,
        }),
        _ => create_where(node, factory),
    }
}

fn create_nested<'a, T: 'a>(
    node: &'a CompiledNode<T>,
    factory: &EnumerableFactory<'a, T>,
) -> BoxedEnumerable<'a, T> {
    match node {
        CompiledNode::Nested(nested) => Box::new(NestedQueryEnumerable {
            nested,
            context: factory.context.clone(),
            payload: None,
        }),
        _ => create_where(node, factory),
    }
}

/// Builds enumerables for compiled nodes.
pub struct EnumerableFactory<'a, T> {
    constructors: AHashMap<NodeKind, Constructor<'a, T>>,
    context: Rc<EvalContext<'a, T>>,
}

impl<'a, T: 'a> EnumerableFactory<'a, T> {
    /// `And` chains, `FilterIn` materializes; everything else is a `Where`.
    pub fn new(context: Rc<EvalContext<'a, T>>) -> Self {
        let mut constructors: AHashMap<NodeKind, Constructor<'a, T>> = AHashMap::new();
        constructors.insert(NodeKind::And, create_and);
        constructors.insert(NodeKind::FilterIn, create_nested);
        for kind in [NodeKind::Or, NodeKind::Not, NodeKind::Filter, NodeKind::Search] {
            constructors.insert(kind, create_where);
        }
        EnumerableFactory {
            constructors,
            context,
        }
    }

    pub fn context(&self) -> &Rc<EvalContext<'a, T>> {
        &self.context
    }

    pub(crate) fn create(&self, node: &'a CompiledNode<T>) -> BoxedEnumerable<'a, T> {
        let constructor = self
            .constructors
            .get(&node.kind())
            .copied()
            .unwrap_or(create_where);
        constructor(node, self)
    }

    /// Build the graph for `node` and attach `payload` as its source.
    pub(crate) fn enumerate(&self, node: &'a CompiledNode<T>, payload: Payload<'a, T>) -> BoxedEnumerable<'a, T> {
        let mut enumerable = self.create(node);
        enumerable.set_payload(payload);
        enumerable
    }
}
