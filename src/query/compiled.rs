//! Executable form of a query: filters resolved, values parsed, handlers bound.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;

use crate::query::ast::NodeKind;
use crate::query::filter::Accessor;
use crate::query::operator::{CompareOptions, FilterOperator, OperatorHandler, compare_values};
use crate::query::value::FilterValue;

pub type SearchWords<T> = Arc<dyn Fn(&T) -> Vec<String> + Send + Sync>;

pub(crate) struct CompiledFilter<T> {
    pub accessor: Accessor<T>,
    pub op: FilterOperator,
    pub value: FilterValue,
    pub handler: OperatorHandler,
    pub options: CompareOptions,
}

pub(crate) struct CompiledNested<T> {
    /// Key of the memoized sub-query values in [`EvalContext`].
    pub id: usize,
    pub accessor: Accessor<T>,
    pub op: FilterOperator,
    pub handler: OperatorHandler,
    pub transformer: Accessor<T>,
    /// `None` for an empty sub-query, which matches every entity.
    pub inner: Option<Box<CompiledNode<T>>>,
    pub options: CompareOptions,
}

pub(crate) struct CompiledSearch<T> {
    pub words: SearchWords<T>,
    /// Lower-cased when matching ignores case.
    pub text: String,
    pub exact: bool,
    pub ignore_case: bool,
}

pub(crate) enum CompiledNode<T> {
    And(Vec<CompiledNode<T>>),
    Or(Vec<CompiledNode<T>>),
    Not(Box<CompiledNode<T>>),
    Filter(CompiledFilter<T>),
    Nested(CompiledNested<T>),
    Search(CompiledSearch<T>),
}

/// Per-evaluation state: the data set sub-queries run over, and their
/// materialized values.
pub struct EvalContext<'a, T> {
    data: &'a [T],
    nested: RefCell<AHashMap<usize, Rc<Vec<FilterValue>>>>,
}

impl<'a, T> EvalContext<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        EvalContext {
            data,
            nested: RefCell::new(AHashMap::new()),
        }
    }

    pub fn data(&self) -> &'a [T] {
        self.data
    }
}

impl<T> CompiledNode<T> {
    pub fn kind(&self) -> NodeKind {
        match self {
            CompiledNode::And(_) => NodeKind::And,
            CompiledNode::Or(_) => NodeKind::Or,
            CompiledNode::Not(_) => NodeKind::Not,
            CompiledNode::Filter(_) => NodeKind::Filter,
            CompiledNode::Nested(_) => NodeKind::FilterIn,
            CompiledNode::Search(_) => NodeKind::Search,
        }
    }

    pub fn evaluate(&self, item: &T, context: &EvalContext<'_, T>) -> bool {
        match self {
            CompiledNode::And(children) => children.iter().all(|c| c.evaluate(item, context)),
            CompiledNode::Or(children) => children.iter().any(|c| c.evaluate(item, context)),
            CompiledNode::Not(child) => !child.evaluate(item, context),
            CompiledNode::Filter(filter) => filter.evaluate(item),
            CompiledNode::Nested(nested) => nested.evaluate(item, context),
            CompiledNode::Search(search) => search.evaluate(item),
        }
    }
}

impl<T> CompiledFilter<T> {
    fn evaluate(&self, item: &T) -> bool {
        let lhs = (self.accessor)(item);
        compare_values(&self.handler, self.op, &lhs, &self.value, &self.options)
    }
}

impl<T> CompiledNested<T> {
    /// Transformed values of every entity the sub-query matches, computed
    /// once per evaluation.
    pub fn values(&self, context: &EvalContext<'_, T>) -> Rc<Vec<FilterValue>> {
        if let Some(values) = context.nested.borrow().get(&self.id) {
            return values.clone();
        }

        // The sub-query may itself hold nested filters, so no borrow is held here
        let values: Vec<FilterValue> = context
            .data
            .iter()
            .filter(|candidate| {
                self.inner
                    .as_ref()
                    .is_none_or(|inner| inner.evaluate(candidate, context))
            })
            .map(|candidate| (self.transformer)(candidate))
            .collect();
        let values = Rc::new(values);
        context.nested.borrow_mut().insert(self.id, values.clone());
        values
    }

    /// Semi-join: true as soon as one sub-query value satisfies the operator.
    pub fn evaluate(&self, item: &T, context: &EvalContext<'_, T>) -> bool {
        let values = self.values(context);
        if values.is_empty() {
            return false;
        }
        let lhs = (self.accessor)(item);
        values.iter().any(|rhs| match rhs {
            FilterValue::List(items) => items
                .iter()
                .any(|rhs| compare_values(&self.handler, self.op, &lhs, rhs, &self.options)),
            rhs => compare_values(&self.handler, self.op, &lhs, rhs, &self.options),
        })
    }
}

impl<T> CompiledSearch<T> {
    fn evaluate(&self, item: &T) -> bool {
        (self.words)(item).iter().any(|word| {
            let word = if self.ignore_case {
                word.to_lowercase()
            } else {
                word.clone()
            };
            if self.exact {
                word == self.text
            } else {
                word.contains(&self.text)
            }
        })
    }
}
