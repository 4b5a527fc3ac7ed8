//! Filter operators and the type-directed handler table.
//!
//! A comparison `lhs op rhs` is resolved by looking up the handler registered
//! for `(lhs kind, rhs kind, op)`. Adding a handler for a new pair of types
//! never touches existing ones.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::index::entry::approx_eq;
use crate::query::value::{FilterValue, ValueKind};

/// Comparison operator of a filter term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// `:`
    Contains,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 7] = [
        FilterOperator::Contains,
        FilterOperator::Equal,
        FilterOperator::NotEqual,
        FilterOperator::Less,
        FilterOperator::LessOrEqual,
        FilterOperator::Greater,
        FilterOperator::GreaterOrEqual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Contains => ":",
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::Less => "<",
            FilterOperator::LessOrEqual => "<=",
            FilterOperator::Greater => ">",
            FilterOperator::GreaterOrEqual => ">=",
        }
    }

    /// Match the longest operator at the start of `text`.
    pub fn parse_prefix(text: &str) -> Option<(FilterOperator, usize)> {
        for (symbol, op) in [
            ("!=", FilterOperator::NotEqual),
            ("<=", FilterOperator::LessOrEqual),
            (">=", FilterOperator::GreaterOrEqual),
            (":", FilterOperator::Contains),
            ("=", FilterOperator::Equal),
            ("<", FilterOperator::Less),
            (">", FilterOperator::Greater),
        ] {
            if text.starts_with(symbol) {
                return Some((op, symbol.len()));
            }
        }
        None
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options passed to every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    pub ignore_case: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions { ignore_case: true }
    }
}

pub type OperatorHandler =
    Arc<dyn Fn(&FilterValue, &FilterValue, &CompareOptions) -> bool + Send + Sync>;

/// `(lhs kind, rhs kind, op)` → handler.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: AHashMap<(ValueKind, ValueKind, FilterOperator), OperatorHandler>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

const NUMBER_KINDS: [ValueKind; 2] = [ValueKind::Int, ValueKind::Float];

fn text_eq(a: &str, b: &str, options: &CompareOptions) -> bool {
    if options.ignore_case {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

fn text_contains(haystack: &str, needle: &str, options: &CompareOptions) -> bool {
    if options.ignore_case {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

impl HandlerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for booleans, numbers, number ranges and text.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();

        for op in [FilterOperator::Contains, FilterOperator::Equal] {
            table.register(ValueKind::Bool, ValueKind::Bool, op, |a, b, _| a == b);
        }
        table.register(
            ValueKind::Bool,
            ValueKind::Bool,
            FilterOperator::NotEqual,
            |a, b, _| a != b,
        );

        for lhs in NUMBER_KINDS {
            for rhs in NUMBER_KINDS {
                for op in FilterOperator::ALL {
                    table.register(lhs, rhs, op, move |a, b, _| {
                        let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) else {
                            return false;
                        };
                        match op {
                            FilterOperator::Contains | FilterOperator::Equal => approx_eq(a, b),
                            FilterOperator::NotEqual => !approx_eq(a, b),
                            FilterOperator::Less => a < b,
                            FilterOperator::LessOrEqual => a <= b,
                            FilterOperator::Greater => a > b,
                            FilterOperator::GreaterOrEqual => a >= b,
                        }
                    });
                }
            }

            // Ordering compares against the bound on the operator's side; `:`/`=` mean inclusive containment
            for op in FilterOperator::ALL {
                table.register(lhs, ValueKind::Range, op, move |a, b, _| {
                    let (Some(v), FilterValue::Range(r)) = (a.as_f64(), b) else {
                        return false;
                    };
                    match op {
                        FilterOperator::Contains | FilterOperator::Equal => {
                            v >= r.min && v <= r.max
                        }
                        FilterOperator::NotEqual => v < r.min || v > r.max,
                        FilterOperator::Less => v < r.min,
                        FilterOperator::LessOrEqual => v <= r.min,
                        FilterOperator::Greater => v > r.max,
                        FilterOperator::GreaterOrEqual => v >= r.max,
                    }
                });
            }
        }

        table.register(
            ValueKind::Text,
            ValueKind::Text,
            FilterOperator::Contains,
            |a, b, o| match (a.as_text(), b.as_text()) {
                (Some(a), Some(b)) => text_contains(a, b, o),
                _ => false,
            },
        );
        table.register(
            ValueKind::Text,
            ValueKind::Text,
            FilterOperator::Equal,
            |a, b, o| match (a.as_text(), b.as_text()) {
                (Some(a), Some(b)) => text_eq(a, b, o),
                _ => false,
            },
        );
        table.register(
            ValueKind::Text,
            ValueKind::Text,
            FilterOperator::NotEqual,
            |a, b, o| match (a.as_text(), b.as_text()) {
                (Some(a), Some(b)) => !text_eq(a, b, o),
                _ => false,
            },
        );

        table
    }

    pub fn register<F>(&mut self, lhs: ValueKind, rhs: ValueKind, op: FilterOperator, handler: F)
    where
        F: Fn(&FilterValue, &FilterValue, &CompareOptions) -> bool + Send + Sync + 'static,
    {
        self.handlers.insert((lhs, rhs, op), Arc::new(handler));
    }

    pub fn get(&self, lhs: ValueKind, rhs: ValueKind, op: FilterOperator) -> Option<OperatorHandler> {
        self.handlers.get(&(lhs, rhs, op)).cloned()
    }

    pub fn contains(&self, lhs: ValueKind, rhs: ValueKind, op: FilterOperator) -> bool {
        self.handlers.contains_key(&(lhs, rhs, op))
    }

    /// Operators with at least one handler for `lhs`.
    pub fn operators_for(&self, lhs: ValueKind) -> Vec<FilterOperator> {
        FilterOperator::ALL
            .into_iter()
            .filter(|op| self.handlers.keys().any(|(l, _, o)| *l == lhs && o == op))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Apply `handler` to `lhs`, which may be a list: a list satisfies the
/// comparison if any element does, except for `!=`, which must hold for all.
pub fn compare_values(
    handler: &OperatorHandler,
    op: FilterOperator,
    lhs: &FilterValue,
    rhs: &FilterValue,
    options: &CompareOptions,
) -> bool {
    match lhs {
        FilterValue::List(items) if op == FilterOperator::NotEqual => items
            .iter()
            .all(|item| compare_values(handler, op, item, rhs, options)),
        FilterValue::List(items) => items
            .iter()
            .any(|item| compare_values(handler, op, item, rhs, options)),
        _ => handler(lhs, rhs, options),
    }
}
