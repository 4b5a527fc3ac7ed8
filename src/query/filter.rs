//! Named filters over an entity type.

use std::fmt;
use std::sync::Arc;

use crate::query::operator::FilterOperator;
use crate::query::value::{FilterValue, IntoFilterValue, ValueKind};

pub type Accessor<T> = Arc<dyn Fn(&T) -> FilterValue + Send + Sync>;
pub type ValueParser = Arc<dyn Fn(&str) -> Option<FilterValue> + Send + Sync>;

/// A named, typed predicate source: `token op value` reads the entity through
/// `accessor` and compares with the parsed value.
///
/// # Example
///
/// ```
/// use quarry::query::{Filter, FilterOperator};
///
/// struct Asset { id: String, refs: Vec<String> }
///
/// let filter = Filter::new("ref", |a: &Asset| a.refs.clone())
///     .with_operators(&[FilterOperator::Equal])
///     .with_transformer(|a: &Asset| a.id.clone());
/// assert_eq!(filter.token(), "ref");
/// assert!(filter.supports_nested());
/// ```
pub struct Filter<T> {
    token: String,
    kind: ValueKind,
    accessor: Accessor<T>,
    operators: Option<Vec<FilterOperator>>,
    parser: Option<ValueParser>,
    transformer: Option<(ValueKind, Accessor<T>)>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Filter {
            token: self.token.clone(),
            kind: self.kind,
            accessor: self.accessor.clone(),
            operators: self.operators.clone(),
            parser: self.parser.clone(),
            transformer: self.transformer.clone(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("token", &self.token)
            .field("kind", &self.kind)
            .field("operators", &self.operators)
            .field("nested", &self.transformer.is_some())
            .finish()
    }
}

impl<T: 'static> Filter<T> {
    pub fn new<V, F>(token: &str, accessor: F) -> Self
    where
        V: IntoFilterValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Filter {
            token: token.to_lowercase(),
            kind: V::value_kind(),
            accessor: Arc::new(move |entity: &T| accessor(entity).into_filter_value()),
            operators: None,
            parser: None,
            transformer: None,
        }
    }

    /// A filter whose accessor yields host-defined values of one kind.
    pub fn with_kind<F>(token: &str, kind: ValueKind, accessor: F) -> Self
    where
        F: Fn(&T) -> FilterValue + Send + Sync + 'static,
    {
        Filter {
            token: token.to_lowercase(),
            kind,
            accessor: Arc::new(accessor),
            operators: None,
            parser: None,
            transformer: None,
        }
    }

    /// Restrict the operators accepted by this filter. Without this, any
    /// operator with a registered handler is accepted.
    pub fn with_operators(mut self, operators: &[FilterOperator]) -> Self {
        self.operators = Some(operators.to_vec());
        self
    }

    /// Parse query values for this filter before the built-in parsers.
    pub fn with_parser<P>(mut self, parser: P) -> Self
    where
        P: Fn(&str) -> Option<FilterValue> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Enable `token op (sub-query)`: each entity matched by the sub-query is
    /// mapped through `transformer` and compared with this filter's value.
    pub fn with_transformer<V, F>(mut self, transformer: F) -> Self
    where
        V: IntoFilterValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let transformer: Accessor<T> =
            Arc::new(move |entity: &T| transformer(entity).into_filter_value());
        self.transformer = Some((V::value_kind(), transformer));
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn supports(&self, op: FilterOperator) -> bool {
        self.operators.as_ref().is_none_or(|ops| ops.contains(&op))
    }

    pub fn supports_nested(&self) -> bool {
        self.transformer.is_some()
    }

    pub fn value(&self, entity: &T) -> FilterValue {
        (self.accessor)(entity)
    }

    pub(crate) fn accessor(&self) -> &Accessor<T> {
        &self.accessor
    }

    pub(crate) fn parser(&self) -> Option<&ValueParser> {
        self.parser.as_ref()
    }

    pub(crate) fn transformer(&self) -> Option<&(ValueKind, Accessor<T>)> {
        self.transformer.as_ref()
    }
}
