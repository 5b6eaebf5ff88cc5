//! Boolean update rules.
//!
//! Rules use the usual network notation: `&` for AND, `|` for OR, `!` for
//! NOT, parentheses for grouping, `0`/`1` for constants.
//! `!` binds tighter than `&`, which binds tighter than `|`.

use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LogicParseError {
    #[error("unexpected end of rule")]
    UnexpectedEof,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
}

/// Boolean expression over node names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Logic {
    Const(bool),
    Node(String),
    Not(Box<Logic>),
    And(Vec<Logic>),
    Or(Vec<Logic>),
}

impl Logic {
    pub fn parse(input: &str) -> Result<Self, LogicParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(LogicParseError::UnexpectedToken(token.to_string())),
        }
    }

    /// Replace node names by indices for fast evaluation.
    ///
    /// Returns the first unresolvable name on failure.
    pub(crate) fn compile<F>(&self, resolve: &F) -> Result<CompiledLogic, String>
    where
        F: Fn(&str) -> Option<usize>,
    {
        Ok(match self {
            Logic::Const(value) => CompiledLogic::Const(*value),
            Logic::Node(name) => CompiledLogic::Node(resolve(name.as_str()).ok_or_else(|| name.clone())?),
            Logic::Not(inner) => CompiledLogic::Not(Box::new(inner.compile(resolve)?)),
            Logic::And(items) => CompiledLogic::And(
                items
                    .iter()
                    .map(|item| item.compile(resolve))
                    .collect::<Result<_, _>>()?,
            ),
            Logic::Or(items) => CompiledLogic::Or(
                items
                    .iter()
                    .map(|item| item.compile(resolve))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn fmt_operand(&self, f: &mut std::fmt::Formatter<'_>, parent_is_and: bool) -> std::fmt::Result {
        let needs_parens = match self {
            Logic::Or(_) => true,
            Logic::And(_) => !parent_is_and,
            _ => false,
        };
        if needs_parens {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl std::fmt::Display for Logic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Logic::Const(true) => write!(f, "1"),
            Logic::Const(false) => write!(f, "0"),
            Logic::Node(name) => write!(f, "{}", name),
            Logic::Not(inner) => {
                write!(f, "!")?;
                inner.fmt_operand(f, false)
            }
            Logic::And(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    item.fmt_operand(f, true)?;
                }
                Ok(())
            }
            Logic::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl TryFrom<String> for Logic {
    type Error = LogicParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Logic::parse(&value)
    }
}

impl From<Logic> for String {
    fn from(logic: Logic) -> Self {
        logic.to_string()
    }
}

/// Rule with node names resolved to state indices.
#[derive(Clone, Debug)]
pub(crate) enum CompiledLogic {
    Const(bool),
    Node(usize),
    Not(Box<CompiledLogic>),
    And(Vec<CompiledLogic>),
    Or(Vec<CompiledLogic>),
}

impl CompiledLogic {
    pub(crate) fn eval(&self, state: &[bool]) -> bool {
        match self {
            CompiledLogic::Const(value) => *value,
            CompiledLogic::Node(idx) => state[*idx],
            CompiledLogic::Not(inner) => !inner.eval(state),
            CompiledLogic::And(items) => items.iter().all(|item| item.eval(state)),
            CompiledLogic::Or(items) => items.iter().any(|item| item.eval(state)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Symbol(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "{}", name),
            Token::Symbol(ch) => write!(f, "{}", ch),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, LogicParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_alphanumeric() || ch == '_' {
            let mut value = String::new();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(value));
            continue;
        }

        if matches!(ch, '&' | '|' | '!' | '(' | ')') {
            tokens.push(Token::Symbol(ch));
            chars.next();
            continue;
        }

        return Err(LogicParseError::UnexpectedToken(ch.to_string()));
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

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Logic, LogicParseError> {
        let mut items = vec![self.parse_and()?];
        while self.eat('|') {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Logic::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Logic, LogicParseError> {
        let mut items = vec![self.parse_unary()?];
        while self.eat('&') {
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Logic::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Logic, LogicParseError> {
        match self.next() {
            None => Err(LogicParseError::UnexpectedEof),
            Some(Token::Symbol('!')) => Ok(Logic::Not(Box::new(self.parse_unary()?))),
            Some(Token::Symbol('(')) => {
                let inner = self.parse_or()?;
                if self.eat(')') {
                    Ok(inner)
                } else {
                    match self.peek() {
                        None => Err(LogicParseError::UnexpectedEof),
                        Some(token) => Err(LogicParseError::UnexpectedToken(token.to_string())),
                    }
                }
            }
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "0" => Logic::Const(false),
                "1" => Logic::Const(true),
                _ => Logic::Node(name),
            }),
            Some(token) => Err(LogicParseError::UnexpectedToken(token.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let logic = Logic::parse("A | B & !C").unwrap();
        assert_eq!(
            logic,
            Logic::Or(vec![
                Logic::Node("A".into()),
                Logic::And(vec![
                    Logic::Node("B".into()),
                    Logic::Not(Box::new(Logic::Node("C".into()))),
                ]),
            ])
        );
    }

    #[test]
    fn test_display_round_trip() {
        let text = "!(A | B) & (C | D) & E";
        let logic = Logic::parse(text).unwrap();
        assert_eq!(logic.to_string(), text);
        assert_eq!(Logic::parse(&logic.to_string()).unwrap(), logic);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Logic::parse("A &"), Err(LogicParseError::UnexpectedEof));
        assert_eq!(
            Logic::parse("A B"),
            Err(LogicParseError::UnexpectedToken("B".into()))
        );
        assert!(Logic::parse("(A | B").is_err());
        assert!(Logic::parse("A + B").is_err());
    }

    #[test]
    fn test_compiled_eval() {
        let logic = Logic::parse("A & !B").unwrap();
        let names = ["A", "B"];
        let compiled = logic
            .compile(&|name: &str| names.iter().position(|n| *n == name))
            .unwrap();
        assert!(compiled.eval(&[true, false]));
        assert!(!compiled.eval(&[true, true]));

        let missing = Logic::parse("A & Z").unwrap();
        let err = missing
            .compile(&|name: &str| names.iter().position(|n| *n == name))
            .unwrap_err();
        assert_eq!(err, "Z");
    }
}
