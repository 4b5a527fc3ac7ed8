//! Typed query engine over in-memory entities.
//!
//! A query string such as `t:prefab size>=20 -ref=(t:texture)` is tokenized,
//! parsed into a boolean tree, and compiled against the filters a host has
//! registered on a [`QueryEngine`]. Comparison operators are dispatched by the
//! runtime kinds of both sides through a [`HandlerTable`], which hosts can
//! extend with their own value kinds.
//!
//! # Module Structure
//!
//! - `tokenizer`: query lexer with source spans
//! - `ast`: syntax tree and recursive-descent parser
//! - `value`: value kinds and filter values
//! - `operator`: operators and the handler table
//! - `filter`: named filters over an entity type
//! - `engine`: filter registry, compiler and compiled queries
//! - `enumerable`: lazy evaluation nodes
//! - `error`: query diagnostics

pub mod ast;
mod compiled;
pub mod engine;
pub mod enumerable;
pub mod error;
pub mod filter;
pub mod operator;
pub mod tokenizer;
pub mod value;

pub use ast::{NodeKind, ParsedQuery, QueryNode};
pub use compiled::{EvalContext, SearchWords};
pub use engine::{Query, QueryEngine, QueryEngineOptions};
pub use enumerable::{EnumerableFactory, Payload, QueryEnumerable};
pub use error::QueryError;
pub use filter::Filter;
pub use operator::{CompareOptions, FilterOperator, HandlerTable};
pub use value::{FilterValue, IntoFilterValue, RangeValue, ValueKind};
