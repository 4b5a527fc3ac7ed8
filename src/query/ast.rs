//! Query syntax tree and parser.

use crate::query::error::QueryError;
use crate::query::operator::FilterOperator;
use crate::query::tokenizer::{FilterOperand, Span, Token, TokenKind, tokenize};

/// Node type tag, used to key the enumerable factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    And,
    Or,
    Not,
    Filter,
    FilterIn,
    Search,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub token: String,
    pub op: FilterOperator,
    pub operand: FilterOperand,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedFilterNode {
    pub token: String,
    pub op: FilterOperator,
    /// Sub-query text, parsed on its own.
    pub query: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchNode {
    pub text: String,
    /// Quoted: match whole words only.
    pub exact: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    Filter(FilterNode),
    FilterIn(NestedFilterNode),
    Search(SearchNode),
}

impl QueryNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            QueryNode::And(_) => NodeKind::And,
            QueryNode::Or(_) => NodeKind::Or,
            QueryNode::Not(_) => NodeKind::Not,
            QueryNode::Filter(_) => NodeKind::Filter,
            QueryNode::FilterIn(_) => NodeKind::FilterIn,
            QueryNode::Search(_) => NodeKind::Search,
        }
    }
}

/// Result of parsing one query string.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedQuery {
    /// `None` for an empty query.
    pub root: Option<QueryNode>,
    pub errors: Vec<QueryError>,
}

/// Parse `text` into a syntax tree, collecting every syntax error.
pub fn parse(text: &str) -> ParsedQuery {
    let (tokens, mut errors) = tokenize(text);
    let mut parser = Parser {
        tokens,
        position: 0,
        errors: Vec::new(),
    };

    let mut root = parser.parse_or();
    while let Some(token) = parser.peek().cloned() {
        // Only a stray `)` can stop the top-level loop early
        parser.errors.push(token.span.error("Unexpected ')'"));
        parser.position += 1;
        if let Some(rest) = parser.parse_or() {
            root = Some(match root {
                Some(node) => QueryNode::And(vec![node, rest]),
                None => rest,
            });
        }
    }

    errors.append(&mut parser.errors);
    errors.sort_by_key(|e| e.position);
    ParsedQuery { root, errors }
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<QueryError>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Option<QueryNode> {
        let mut operands = Vec::new();
        if let Some(node) = self.parse_and() {
            operands.push(node);
        }

        while let Some(TokenKind::Or) = self.peek_kind() {
            let Some(or) = self.next() else { break };
            match self.parse_and() {
                Some(node) => operands.push(node),
                None => self.errors.push(or.span.error("Missing operand after 'or'")),
            }
        }

        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(QueryNode::Or(operands)),
        }
    }

    fn parse_and(&mut self) -> Option<QueryNode> {
        let mut operands = Vec::new();
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::Or) | Some(TokenKind::RightParen) => break,
                Some(TokenKind::And) => {
                    let and = self.next();
                    if operands.is_empty()
                        || matches!(
                            self.peek_kind(),
                            None | Some(TokenKind::Or) | Some(TokenKind::RightParen)
                        )
                    {
                        if let Some(and) = and {
                            self.errors.push(and.span.error("Missing operand for 'and'"));
                        }
                    }
                }
                Some(_) => {
                    if let Some(node) = self.parse_unary() {
                        operands.push(node);
                    }
                }
            }
        }

        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(QueryNode::And(operands)),
        }
    }

    fn parse_unary(&mut self) -> Option<QueryNode> {
        if let Some(TokenKind::Not) = self.peek_kind() {
            let not = self.next()?;
            return match self.peek_kind() {
                None | Some(TokenKind::Or) | Some(TokenKind::And) | Some(TokenKind::RightParen) => {
                    self.errors.push(not.span.error("Missing operand for 'not'"));
                    None
                }
                Some(_) => self
                    .parse_unary()
                    .map(|node| QueryNode::Not(Box::new(node))),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<QueryNode> {
        let token = self.next()?;
        match token.kind {
            TokenKind::LeftParen => {
                let inner = self.parse_or();
                match self.peek_kind() {
                    Some(TokenKind::RightParen) => {
                        self.position += 1;
                    }
                    _ => self
                        .errors
                        .push(token.span.error("Missing closing parenthesis")),
                }
                if inner.is_none() {
                    self.errors.push(token.span.error("Empty group"));
                }
                inner
            }
            TokenKind::Word(text) => Some(QueryNode::Search(SearchNode {
                text,
                exact: false,
                span: token.span,
            })),
            TokenKind::Quoted(text) => {
                if text.is_empty() {
                    return None;
                }
                Some(QueryNode::Search(SearchNode {
                    text,
                    exact: true,
                    span: token.span,
                }))
            }
            TokenKind::Filter { name, op, operand } => Some(match operand {
                FilterOperand::Nested(query) => QueryNode::FilterIn(NestedFilterNode {
                    token: name,
                    op,
                    query,
                    span: token.span,
                }),
                operand => QueryNode::Filter(FilterNode {
                    token: name,
                    op,
                    operand,
                    span: token.span,
                }),
            }),
            // Handled by the callers
            TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::RightParen => None,
        }
    }
}
