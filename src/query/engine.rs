//! Query engine over in-memory entities.

use std::num::NonZeroUsize;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::query::ast::{self, FilterNode, NestedFilterNode, ParsedQuery, QueryNode, SearchNode};
use crate::query::compiled::{
    CompiledFilter, CompiledNested, CompiledNode, CompiledSearch, EvalContext, SearchWords,
};
use crate::query::enumerable::{EnumerableFactory, Payload};
use crate::query::error::QueryError;
use crate::query::filter::{Filter, ValueParser};
use crate::query::operator::{CompareOptions, FilterOperator, HandlerTable};
use crate::query::tokenizer::{FilterOperand, Span};
use crate::query::value::{FilterValue, IntoFilterValue, RangeValue, ValueKind};

/// Sub-queries nested deeper than this are rejected.
const MAX_NESTING: usize = 8;

/// Behavior switches of a [`QueryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryEngineOptions {
    /// Report unknown filter tokens as errors. When false they are searched
    /// as plain text instead.
    pub validate_filters: bool,
    /// Case-insensitive text comparison and free-text search.
    pub ignore_case: bool,
    /// Number of parsed query strings kept; 0 disables the cache.
    pub cache_size: usize,
}

impl Default for QueryEngineOptions {
    fn default() -> Self {
        QueryEngineOptions {
            validate_filters: true,
            ignore_case: true,
            cache_size: 64,
        }
    }
}

/// Compiles query strings into predicates over `T`.
///
/// # Example
///
/// ```
/// use quarry::QueryEngine;
///
/// struct Asset { name: String, size: u64 }
///
/// let mut engine = QueryEngine::new();
/// engine
///     .add_filter("size", |a: &Asset| a.size as i64)
///     .set_search_words(|a: &Asset| vec![a.name.clone()]);
///
/// let assets = vec![
///     Asset { name: "tree".into(), size: 10 },
///     Asset { name: "rock".into(), size: 30 },
/// ];
/// let found = engine.filter("size>=20", &assets);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].name, "rock");
/// ```
pub struct QueryEngine<T> {
    options: QueryEngineOptions,
    filters: AHashMap<String, Filter<T>>,
    parsers: Vec<ValueParser>,
    handlers: HandlerTable,
    search_words: Option<SearchWords<T>>,
    cache: Option<Mutex<LruCache<String, Arc<ParsedQuery>>>>,
}

impl<T: 'static> Default for QueryEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> QueryEngine<T> {
    pub fn new() -> Self {
        Self::with_options(QueryEngineOptions::default())
    }

    pub fn with_options(options: QueryEngineOptions) -> Self {
        let cache = NonZeroUsize::new(options.cache_size).map(|size| Mutex::new(LruCache::new(size)));
        QueryEngine {
            options,
            filters: AHashMap::new(),
            parsers: Vec::new(),
            handlers: HandlerTable::with_defaults(),
            search_words: None,
            cache,
        }
    }

    pub fn options(&self) -> &QueryEngineOptions {
        &self.options
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register `token` accepting every operator its value type has a handler for.
    pub fn add_filter<V, F>(&mut self, token: &str, accessor: F) -> &mut Self
    where
        V: IntoFilterValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.add_filter_def(Filter::new(token, accessor))
    }

    /// Register `token` restricted to `operators`.
    pub fn add_filter_with_ops<V, F>(
        &mut self,
        token: &str,
        operators: &[FilterOperator],
        accessor: F,
    ) -> &mut Self
    where
        V: IntoFilterValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.add_filter_def(Filter::new(token, accessor).with_operators(operators))
    }

    /// Register `token` so it also accepts `token op (sub-query)`.
    pub fn add_nested_filter<V, F, W, G>(&mut self, token: &str, accessor: F, transformer: G) -> &mut Self
    where
        V: IntoFilterValue + 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
        W: IntoFilterValue + 'static,
        G: Fn(&T) -> W + Send + Sync + 'static,
    {
        self.add_filter_def(Filter::new(token, accessor).with_transformer(transformer))
    }

    /// Register a fully configured filter, replacing one with the same token.
    pub fn add_filter_def(&mut self, filter: Filter<T>) -> &mut Self {
        self.filters.insert(filter.token().to_string(), filter);
        self.clear_cache();
        self
    }

    pub fn filter_def(&self, token: &str) -> Option<&Filter<T>> {
        self.filters.get(&token.to_lowercase())
    }

    /// Registered tokens, sorted.
    pub fn filter_tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        tokens.sort_unstable();
        tokens
    }

    /// Add a value parser tried, in registration order, before the built-in ones.
    pub fn add_parser<P>(&mut self, parser: P) -> &mut Self
    where
        P: Fn(&str) -> Option<FilterValue> + Send + Sync + 'static,
    {
        self.parsers.push(Arc::new(parser));
        self
    }

    /// Add or replace the handler for `(lhs, rhs, op)`.
    pub fn add_handler<H>(
        &mut self,
        lhs: ValueKind,
        rhs: ValueKind,
        op: FilterOperator,
        handler: H,
    ) -> &mut Self
    where
        H: Fn(&FilterValue, &FilterValue, &CompareOptions) -> bool + Send + Sync + 'static,
    {
        self.handlers.register(lhs, rhs, op, handler);
        self
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Words free-text terms are matched against.
    pub fn set_search_words<F>(&mut self, words: F) -> &mut Self
    where
        F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
    {
        self.search_words = Some(Arc::new(words));
        self
    }

    // ── Parsing ─────────────────────────────────────────────────────

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    /// Syntax tree of `text`, from the cache when possible.
    pub fn parse_syntax(&self, text: &str) -> Arc<ParsedQuery> {
        let Some(cache) = &self.cache else {
            return Arc::new(ast::parse(text));
        };

        if let Some(parsed) = cache.lock().get(text) {
            return parsed.clone();
        }
        let parsed = Arc::new(ast::parse(text));
        cache.lock().put(text.to_string(), parsed.clone());
        parsed
    }

    /// Parse and compile `text`.
    ///
    /// The returned query carries every syntax and type error found. An
    /// invalid query yields no results.
    pub fn parse(&self, text: &str) -> Query<T> {
        let parsed = self.parse_syntax(text);
        let mut compiler = Compiler {
            engine: self,
            errors: parsed.errors.clone(),
            next_nested: 0,
        };
        let root = parsed
            .root
            .as_ref()
            .and_then(|node| compiler.compile(node, 0, 0));

        if !compiler.errors.is_empty() {
            log::debug!("query '{text}': {} error(s)", compiler.errors.len());
        }
        Query {
            text: text.to_string(),
            root: root.map(Arc::new),
            errors: compiler.errors,
            empty: parsed.root.is_none(),
        }
    }

    /// Parse `text` and collect the matching entities of `data`, in order.
    pub fn filter<'a>(&self, text: &str, data: &'a [T]) -> Vec<&'a T> {
        let query = self.parse(text);
        if !query.is_valid() {
            return Vec::new();
        }
        match &query.root {
            None => data.iter().collect(),
            Some(root) => {
                let context = EvalContext::new(data);
                data.iter()
                    .filter(|item| root.evaluate(item, &context))
                    .collect()
            }
        }
    }
}

// ── Compilation ─────────────────────────────────────────────────────

struct Compiler<'e, T> {
    engine: &'e QueryEngine<T>,
    errors: Vec<QueryError>,
    next_nested: usize,
}

impl<T: 'static> Compiler<'_, T> {
    fn options(&self) -> CompareOptions {
        CompareOptions {
            ignore_case: self.engine.options.ignore_case,
        }
    }

    fn error(&mut self, span: Span, offset: usize, message: String) {
        self.errors
            .push(QueryError::new(span.position + offset, span.length, message));
    }

    /// Compile `node`; `offset` shifts spans of sub-query text back into the
    /// outer query.
    fn compile(&mut self, node: &QueryNode, offset: usize, depth: usize) -> Option<CompiledNode<T>> {
        match node {
            QueryNode::And(children) => {
                let children = self.compile_all(children, offset, depth)?;
                Some(CompiledNode::And(children))
            }
            QueryNode::Or(children) => {
                let children = self.compile_all(children, offset, depth)?;
                Some(CompiledNode::Or(children))
            }
            QueryNode::Not(child) => self
                .compile(child, offset, depth)
                .map(|c| CompiledNode::Not(Box::new(c))),
            QueryNode::Filter(filter) => self.compile_filter(filter, offset),
            QueryNode::FilterIn(nested) => self.compile_nested(nested, offset, depth),
            QueryNode::Search(search) => self.compile_search(search, offset),
        }
    }

    fn compile_all(
        &mut self,
        children: &[QueryNode],
        offset: usize,
        depth: usize,
    ) -> Option<Vec<CompiledNode<T>>> {
        // Compile every child so all errors are reported
        let compiled: Vec<Option<CompiledNode<T>>> = children
            .iter()
            .map(|child| self.compile(child, offset, depth))
            .collect();
        compiled.into_iter().collect()
    }

    fn unknown_filter(&mut self, token: &str, text: String, span: Span, offset: usize) -> Option<CompiledNode<T>> {
        if self.engine.options.validate_filters {
            self.error(span, offset, format!("Unknown filter '{token}'"));
            return None;
        }
        self.compile_search(
            &SearchNode {
                text,
                exact: false,
                span,
            },
            offset,
        )
    }

    fn candidates(&self, filter: &Filter<T>, operand: &FilterOperand) -> Vec<FilterValue> {
        let mut values = Vec::new();
        let text = operand.text().trim();
        if let Some(parser) = filter.parser() {
            values.extend(parser(text));
        }
        if let FilterOperand::Quoted(quoted) = operand {
            values.push(FilterValue::Text(quoted.clone()));
            return values;
        }

        values.extend(self.engine.parsers.iter().filter_map(|parser| parser(text)));
        match text.to_lowercase().as_str() {
            "true" => values.push(FilterValue::Bool(true)),
            "false" => values.push(FilterValue::Bool(false)),
            _ => {}
        }
        if let Ok(i) = text.parse::<i64>() {
            values.push(FilterValue::Int(i));
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                values.push(FilterValue::Float(f));
            }
        }
        if let Some(range) = RangeValue::parse(text) {
            values.push(FilterValue::Range(range));
        }
        values.push(FilterValue::Text(text.to_string()));
        values
    }

    fn compile_filter(&mut self, node: &FilterNode, offset: usize) -> Option<CompiledNode<T>> {
        let Some(filter) = self.engine.filters.get(&node.token) else {
            let text = format!("{}{}{}", node.token, node.op, node.operand.text());
            return self.unknown_filter(&node.token, text, node.span, offset);
        };
        if !filter.supports(node.op) {
            self.error(
                node.span,
                offset,
                format!("Operator '{}' is not supported by filter '{}'", node.op, node.token),
            );
            return None;
        }

        let handlers = &self.engine.handlers;
        let resolved = self
            .candidates(filter, &node.operand)
            .into_iter()
            .find_map(|value| {
                let kind = value.kind()?;
                handlers
                    .get(filter.kind(), kind, node.op)
                    .map(|handler| (value, handler))
            });

        match resolved {
            Some((value, handler)) => Some(CompiledNode::Filter(CompiledFilter {
                accessor: filter.accessor().clone(),
                op: node.op,
                value,
                handler,
                options: self.options(),
            })),
            None => {
                let message = if handlers.operators_for(filter.kind()).contains(&node.op) {
                    format!(
                        "Invalid value '{}' for filter '{}'",
                        node.operand.text(),
                        node.token
                    )
                } else {
                    format!(
                        "Operator '{}' is not supported by filter '{}'",
                        node.op, node.token
                    )
                };
                self.error(node.span, offset, message);
                None
            }
        }
    }

    fn compile_nested(
        &mut self,
        node: &NestedFilterNode,
        offset: usize,
        depth: usize,
    ) -> Option<CompiledNode<T>> {
        let Some(filter) = self.engine.filters.get(&node.token) else {
            let text = format!("{}{}({})", node.token, node.op, node.query);
            return self.unknown_filter(&node.token, text, node.span, offset);
        };
        let Some((transformed_kind, transformer)) = filter.transformer() else {
            self.error(
                node.span,
                offset,
                format!("Filter '{}' does not support nested queries", node.token),
            );
            return None;
        };
        let Some(handler) = self
            .engine
            .handlers
            .get(filter.kind(), *transformed_kind, node.op)
            .filter(|_| filter.supports(node.op))
        else {
            self.error(
                node.span,
                offset,
                format!("Operator '{}' is not supported by filter '{}'", node.op, node.token),
            );
            return None;
        };
        if depth >= MAX_NESTING {
            self.error(node.span, offset, "Nested query is too deep".to_string());
            return None;
        }

        // Sub-query text starts after `token`, the operator and `(`
        let inner_offset = offset
            + node.span.position
            + node.token.chars().count()
            + node.op.as_str().len()
            + 1;
        let parsed = self.engine.parse_syntax(&node.query);
        for error in &parsed.errors {
            self.errors.push(QueryError::new(
                error.position + inner_offset,
                error.length,
                error.message.clone(),
            ));
        }
        if !parsed.errors.is_empty() {
            return None;
        }
        let inner = match &parsed.root {
            Some(root) => Some(Box::new(self.compile(root, inner_offset, depth + 1)?)),
            None => None,
        };

        let id = self.next_nested;
        self.next_nested += 1;
        Some(CompiledNode::Nested(CompiledNested {
            id,
            accessor: filter.accessor().clone(),
            op: node.op,
            handler,
            transformer: transformer.clone(),
            inner,
            options: self.options(),
        }))
    }

    fn compile_search(&mut self, node: &SearchNode, offset: usize) -> Option<CompiledNode<T>> {
        let Some(words) = &self.engine.search_words else {
            self.error(
                node.span,
                offset,
                format!("Free-text search is not available for '{}'", node.text),
            );
            return None;
        };
        let ignore_case = self.engine.options.ignore_case;
        let text = if ignore_case {
            node.text.to_lowercase()
        } else {
            node.text.clone()
        };
        Some(CompiledNode::Search(CompiledSearch {
            words: words.clone(),
            text,
            exact: node.exact,
            ignore_case,
        }))
    }
}

// ── Query ───────────────────────────────────────────────────────────

/// A compiled query.
pub struct Query<T> {
    text: String,
    root: Option<Arc<CompiledNode<T>>>,
    errors: Vec<QueryError>,
    /// No terms at all: every entity matches.
    empty: bool,
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("errors", &self.errors)
            .finish()
    }
}

impl<T> Query<T> {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn errors(&self) -> &[QueryError] {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && (self.root.is_some() || self.empty)
    }

    /// Lazily filter `data`. Sub-queries run over the same `data`.
    pub fn apply<'a>(&'a self, data: &'a [T]) -> Payload<'a, T>
    where
        T: 'a,
    {
        if !self.is_valid() {
            return Box::new(std::iter::empty());
        }
        match &self.root {
            None => Box::new(data.iter()),
            Some(root) => {
                let context = Rc::new(EvalContext::new(data));
                let factory = EnumerableFactory::new(context);
                Box::new(factory.enumerate(root, Box::new(data.iter())))
            }
        }
    }

    /// Whether `item` matches, with sub-queries evaluated over `data`.
    pub fn matches(&self, item: &T, data: &[T]) -> bool {
        if !self.is_valid() {
            return false;
        }
        match &self.root {
            None => true,
            Some(root) => root.evaluate(item, &EvalContext::new(data)),
        }
    }
}
