//! Derived predicate expressions
//!
//! Expressions are nested `and(...)` / `or(...)` calls over predicate names,
//! for example `or(discharge, and(death, icu))`. They are parsed once at
//! configuration time and then bound to column indices, so evaluating a row
//! never touches the expression text again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Deepest `and` / `or` nesting accepted by the parser
pub const MAX_NESTING: usize = 64;

/// Parsed expression tree over predicate names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateExpr {
    Predicate(String),
    And(Vec<PredicateExpr>),
    Or(Vec<PredicateExpr>),
}

/// Expression bound to column positions in a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundExpr {
    Column(usize),
    And(Vec<BoundExpr>),
    Or(Vec<BoundExpr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character {:?} at offset {}", other, pos)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {}, found {}", expected, token)),
            None => Err(format!("expected {}, found end of expression", expected)),
        }
    }

    fn parse_expr(&mut self, depth: usize) -> Result<PredicateExpr, String> {
        let name = match self.advance() {
            Some(Token::Ident(name)) => name,
            Some(token) => return Err(format!("expected a predicate name, found {}", token)),
            None => return Err("unexpected end of expression".to_string()),
        };

        if self.peek() != Some(&Token::LParen) {
            return Ok(PredicateExpr::Predicate(name));
        }

        let is_and = match name.as_str() {
            "and" => true,
            "or" => false,
            other => return Err(format!("unknown function '{}' (expected 'and' or 'or')", other)),
        };

        if depth >= MAX_NESTING {
            return Err(format!("expression nested deeper than {} levels", MAX_NESTING));
        }

        self.expect(Token::LParen)?;
        let mut children = vec![self.parse_expr(depth + 1)?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            children.push(self.parse_expr(depth + 1)?);
        }
        self.expect(Token::RParen)?;

        if children.len() < 2 {
            return Err(format!("'{}' needs at least two arguments", name));
        }

        Ok(if is_and {
            PredicateExpr::And(children)
        } else {
            PredicateExpr::Or(children)
        })
    }
}

impl PredicateExpr {
    /// Parse expression text such as `or(discharge, death)`
    pub fn parse(input: &str) -> Result<Self, String> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err("empty expression".to_string());
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr(0)?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected trailing {}", token));
        }
        Ok(expr)
    }

    /// All predicate names referenced anywhere in the expression
    pub fn references(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            PredicateExpr::Predicate(name) => {
                names.insert(name.as_str());
            }
            PredicateExpr::And(children) | PredicateExpr::Or(children) => {
                for child in children {
                    child.collect_references(names);
                }
            }
        }
    }

    /// Replace names with column positions
    ///
    /// Returns the first name missing from `columns` as the error.
    pub fn bind(&self, columns: &HashMap<String, usize>) -> Result<BoundExpr, String> {
        match self {
            PredicateExpr::Predicate(name) => columns
                .get(name)
                .map(|&idx| BoundExpr::Column(idx))
                .ok_or_else(|| name.clone()),
            PredicateExpr::And(children) => Ok(BoundExpr::And(
                children.iter().map(|c| c.bind(columns)).collect::<Result<_, _>>()?,
            )),
            PredicateExpr::Or(children) => Ok(BoundExpr::Or(
                children.iter().map(|c| c.bind(columns)).collect::<Result<_, _>>()?,
            )),
        }
    }
}

impl fmt::Display for PredicateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (op, children) = match self {
            PredicateExpr::Predicate(name) => return write!(f, "{}", name),
            PredicateExpr::And(children) => ("and", children),
            PredicateExpr::Or(children) => ("or", children),
        };
        write!(f, "{}(", op)?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", child)?;
        }
        write!(f, ")")
    }
}

impl BoundExpr {
    /// Evaluate as boolean presence: a column is true when its count is > 0
    pub fn is_true(&self, counts: &[u64]) -> bool {
        match self {
            BoundExpr::Column(idx) => counts[*idx] > 0,
            BoundExpr::And(children) => children.iter().all(|c| c.is_true(counts)),
            BoundExpr::Or(children) => children.iter().any(|c| c.is_true(counts)),
        }
    }

    /// Evaluate to the 0/1 value stored in a derived column
    pub fn evaluate(&self, counts: &[u64]) -> u64 {
        u64::from(self.is_true(counts))
    }
}
