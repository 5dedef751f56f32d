//! The top-level expression that combines rule outcomes into a verdict,
//! e.g. `r0() && (r1 || r2)`.
//!
//! `&&` binds tighter than `||`, parentheses group, and a rule may be written
//! bare (`r0`) or call-style (`r0()`). A rule with no recorded outcome counts
//! as `false`.

use std::collections::HashMap;

use tracing::debug;

use super::literal::strip_comment;
use crate::errors::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Bool(bool),
    And,
    Or,
    LParen,
    RParen,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ProbeError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '&' | '|' => match chars.next() {
                Some((_, next)) if next == c => {
                    tokens.push(if c == '&' { Token::And } else { Token::Or });
                }
                _ => {
                    return Err(ProbeError::parse(
                        expr,
                        format!("expected '{}{}' at offset {}", c, c, idx),
                    ))
                }
            },
            c if is_ident_char(c) => {
                let mut end = idx + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                let word = &expr[idx..end];

                // Call-style reference: `r0()`.
                let rest = expr[end..].trim_start();
                if rest.starts_with("()") {
                    let skip = expr[end..].len() - rest.len() + 2;
                    while let Some(&(i, _)) = chars.peek() {
                        if i >= end + skip {
                            break;
                        }
                        chars.next();
                    }
                    tokens.push(Token::Ident(word.to_string()));
                    continue;
                }

                tokens.push(match word {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => {
                return Err(ProbeError::parse(
                    expr,
                    format!("unexpected character '{}' at offset {}", other, idx),
                ))
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Rule(String),
    Literal(bool),
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Node {
    fn evaluate(&self, results: &HashMap<String, bool>) -> bool {
        match self {
            Node::Literal(b) => *b,
            Node::Rule(name) => match results.get(name) {
                Some(outcome) => *outcome,
                None => {
                    debug!(rule = %name, "Aggregate expression references a rule with no result, treating as false");
                    false
                }
            },
            Node::And(children) => children.iter().all(|c| c.evaluate(results)),
            Node::Or(children) => children.iter().any(|c| c.evaluate(results)),
        }
    }

    fn collect_rules<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Node::Rule(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Node::Literal(_) => {}
            Node::And(children) | Node::Or(children) => {
                for child in children {
                    child.collect_rules(out);
                }
            }
        }
    }
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Node, ProbeError> {
        let mut children = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 { children.remove(0) } else { Node::Or(children) })
    }

    fn and_expr(&mut self) -> Result<Node, ProbeError> {
        let mut children = vec![self.primary()?];
        while self.peek() == Some(&Token::And) {
            self.advance();
            children.push(self.primary()?);
        }
        Ok(if children.len() == 1 { children.remove(0) } else { Node::And(children) })
    }

    fn primary(&mut self) -> Result<Node, ProbeError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Node::Rule(name)),
            Some(Token::Bool(b)) => Ok(Node::Literal(b)),
            Some(Token::LParen) => {
                let node = self.or_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err(ProbeError::parse(self.expr, "unbalanced parentheses")),
                }
            }
            Some(token) => Err(ProbeError::parse(self.expr, format!("unexpected token {:?}", token))),
            None => Err(ProbeError::parse(self.expr, "unexpected end of expression")),
        }
    }
}

/// Parsed aggregate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateExpression {
    root: Node,
}

impl AggregateExpression {
    pub fn parse(expr: &str) -> Result<Self, ProbeError> {
        let text = strip_comment(expr).trim();
        if text.is_empty() {
            return Err(ProbeError::parse(expr, "empty expression"));
        }

        let mut parser = Parser { expr: text, tokens: tokenize(text)?, pos: 0 };
        let root = parser.or_expr()?;
        if let Some(token) = parser.peek() {
            return Err(ProbeError::parse(text, format!("unexpected trailing token {:?}", token)));
        }

        Ok(Self { root })
    }

    /// Whether `expr` declares anything once comments and whitespace are removed.
    pub fn is_declared(expr: Option<&str>) -> bool {
        expr.is_some_and(|e| !strip_comment(e).trim().is_empty())
    }

    /// Rule names referenced, in order of first appearance.
    pub fn referenced_rules(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.collect_rules(&mut out);
        out
    }

    pub fn evaluate(&self, results: &HashMap<String, bool>) -> bool {
        self.root.evaluate(results)
    }
}
