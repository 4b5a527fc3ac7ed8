//! Lexer for the query language.
//!
//! ```text
//! query    := or
//! or       := and ("or" and)*
//! and      := unary (["and"] unary)*
//! unary    := ("-" | "!" | "not") unary | primary
//! primary  := "(" query ")" | filter | word | "\"" text "\""
//! filter   := name op (word | "\"" text "\"" | "(" query ")" | "[" min "," max "]")
//! op       := ":" | "=" | "!=" | "<" | "<=" | ">" | ">="
//! ```

use crate::query::error::QueryError;
use crate::query::operator::FilterOperator;

/// Character span in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub position: usize,
    pub length: usize,
}

impl Span {
    pub fn new(position: usize, length: usize) -> Self {
        Span { position, length }
    }

    pub fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::new(self.position, self.length, message)
    }
}

/// Right-hand side of a filter term as written.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOperand {
    /// Unquoted value.
    Text(String),
    /// Quoted value; never parsed as a number or boolean.
    Quoted(String),
    /// `( ... )` sub-query, without the parentheses.
    Nested(String),
}

impl FilterOperand {
    pub fn text(&self) -> &str {
        match self {
            FilterOperand::Text(s) | FilterOperand::Quoted(s) | FilterOperand::Nested(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(String),
    Quoted(String),
    Filter {
        name: String,
        op: FilterOperator,
        operand: FilterOperand,
    },
    And,
    Or,
    Not,
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Character-based lexer. Problems are collected, never raised.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    errors: Vec<QueryError>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            errors: Vec::new(),
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<QueryError>) {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        (tokens, self.errors)
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.current().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn is_name_char(c: char) -> bool {
        c.is_alphanumeric() || matches!(c, '_' | '.' | '#' | '$' | '@')
    }

    fn is_word_end(c: char) -> bool {
        c.is_whitespace() || c == '(' || c == ')'
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: Span::new(start, self.position - start),
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let start = self.position;
        let c = self.current()?;

        let token = match c {
            '(' => {
                self.position += 1;
                self.token(TokenKind::LeftParen, start)
            }
            ')' => {
                self.position += 1;
                self.token(TokenKind::RightParen, start)
            }
            '-' | '!' if self.peek(1).is_some_and(|n| !n.is_whitespace() && n != '=') => {
                self.position += 1;
                self.token(TokenKind::Not, start)
            }
            '"' => {
                let text = self.read_quoted();
                self.token(TokenKind::Quoted(text), start)
            }
            _ => self.read_word_or_filter(start),
        };
        Some(token)
    }

    /// Read `"..."` starting at the opening quote.
    fn read_quoted(&mut self) -> String {
        let start = self.position;
        self.position += 1;
        let mut text = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.position += 1;
                    return text;
                }
                Some('\\') if self.peek(1) == Some('"') => {
                    text.push('"');
                    self.position += 2;
                }
                Some(c) => {
                    text.push(c);
                    self.position += 1;
                }
                None => {
                    self.errors.push(QueryError::new(
                        start,
                        self.position - start,
                        "Missing closing quote",
                    ));
                    return text;
                }
            }
        }
    }

    /// Read `( ... )` starting at the opening parenthesis, honoring nesting
    /// and quotes. Returns the text between the parentheses.
    fn read_nested(&mut self) -> String {
        let start = self.position;
        self.position += 1;
        let content_start = self.position;
        let mut depth = 1;
        let mut in_quotes = false;
        while let Some(c) = self.current() {
            match c {
                '"' => in_quotes = !in_quotes,
                '(' if !in_quotes => depth += 1,
                ')' if !in_quotes => {
                    depth -= 1;
                    if depth == 0 {
                        let text = self.input[content_start..self.position].iter().collect();
                        self.position += 1;
                        return text;
                    }
                }
                _ => {}
            }
            self.position += 1;
        }
        self.errors.push(QueryError::new(
            start,
            self.position - start,
            "Missing closing parenthesis in nested query",
        ));
        self.input[content_start..].iter().collect()
    }

    fn read_until(&mut self, stop: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.current() {
            if stop(c) {
                break;
            }
            text.push(c);
            self.position += 1;
        }
        text
    }

    fn read_word_or_filter(&mut self, start: usize) -> Token {
        let name = self.read_until(|c| !Self::is_name_char(c));
        let rest: String = self.input[self.position..self.input.len().min(self.position + 2)]
            .iter()
            .collect();

        if !name.is_empty() {
            if let Some((op, len)) = FilterOperator::parse_prefix(&rest) {
                self.position += len;
                let operand = match self.current() {
                    Some('"') => FilterOperand::Quoted(self.read_quoted()),
                    Some('(') => FilterOperand::Nested(self.read_nested()),
                    Some('[') => {
                        // A range may contain spaces; without a closing bracket it ends like a word
                        let close = self.input[self.position..].iter().position(|&c| c == ']');
                        let text = match close {
                            Some(offset) => {
                                let end = self.position + offset + 1;
                                let text = self.input[self.position..end].iter().collect();
                                self.position = end;
                                text
                            }
                            None => self.read_until(Self::is_word_end),
                        };
                        FilterOperand::Text(text)
                    }
                    _ => FilterOperand::Text(self.read_until(Self::is_word_end)),
                };
                let token = self.token(
                    TokenKind::Filter {
                        name: name.to_lowercase(),
                        op,
                        operand,
                    },
                    start,
                );
                if token_operand_is_empty(&token) {
                    self.errors
                        .push(token.span.error(format!("Missing value for filter '{name}'")));
                }
                return token;
            }
        }

        let mut word = name;
        word.push_str(&self.read_until(Self::is_word_end));
        let kind = match word.to_lowercase().as_str() {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            _ => TokenKind::Word(word),
        };
        self.token(kind, start)
    }
}

fn token_operand_is_empty(token: &Token) -> bool {
    matches!(&token.kind, TokenKind::Filter { operand, .. } if operand.text().trim().is_empty())
}

/// Tokenize `input`.
pub fn tokenize(input: &str) -> (Vec<Token>, Vec<QueryError>) {
    Lexer::new(input).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "{errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn filter(name: &str, op: FilterOperator, operand: FilterOperand) -> TokenKind {
        TokenKind::Filter {
            name: name.to_string(),
            op,
            operand,
        }
    }

    #[test]
    fn test_words_and_keywords() {
        assert_eq!(
            kinds("tree AND -rock or \"big oak\""),
            vec![
                TokenKind::Word("tree".into()),
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Word("rock".into()),
                TokenKind::Or,
                TokenKind::Quoted("big oak".into()),
            ]
        );
    }

    #[test]
    fn test_filters() {
        assert_eq!(
            kinds("size>=20 T:Prefab name=\"Main Camera\" size:[1,5] id!=3"),
            vec![
                filter("size", FilterOperator::GreaterOrEqual, FilterOperand::Text("20".into())),
                filter("t", FilterOperator::Contains, FilterOperand::Text("Prefab".into())),
                filter("name", FilterOperator::Equal, FilterOperand::Quoted("Main Camera".into())),
                filter("size", FilterOperator::Contains, FilterOperand::Text("[1,5]".into())),
                filter("id", FilterOperator::NotEqual, FilterOperand::Text("3".into())),
            ]
        );
    }

    #[test]
    fn test_range_operand_may_contain_spaces() {
        assert_eq!(
            kinds("size:[1, 5] tree"),
            vec![
                filter("size", FilterOperator::Contains, FilterOperand::Text("[1, 5]".into())),
                TokenKind::Word("tree".into()),
            ]
        );
        assert_eq!(
            kinds("size:[1, tree"),
            vec![
                filter("size", FilterOperator::Contains, FilterOperand::Text("[1,".into())),
                TokenKind::Word("tree".into()),
            ]
        );
    }

    #[test]
    fn test_nested_filter() {
        assert_eq!(
            kinds("ref=(t:prefab (a or b)) x"),
            vec![
                filter(
                    "ref",
                    FilterOperator::Equal,
                    FilterOperand::Nested("t:prefab (a or b)".into())
                ),
                TokenKind::Word("x".into()),
            ]
        );
    }

    #[test]
    fn test_spans_and_errors() {
        let (tokens, errors) = tokenize("ab  size>2");
        assert_eq!(tokens[1].span, Span::new(4, 6));
        assert!(errors.is_empty());

        let (_, errors) = tokenize("name=\"open");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].position, 5);

        let (_, errors) = tokenize("size> tree");
        assert_eq!(errors[0].message, "Missing value for filter 'size'");

        let (_, errors) = tokenize("ref=(t:prefab");
        assert_eq!(errors[0].position, 4);
    }

    #[test]
    fn test_grouping() {
        assert_eq!(
            kinds("(a b)"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Word("a".into()),
                TokenKind::Word("b".into()),
                TokenKind::RightParen,
            ]
        );
    }
}
