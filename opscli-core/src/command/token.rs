//! Word matchers used as grammar leaves and match-tree edges.
//!
//! A [`Token`] answers two questions about one input word: whether the word
//! may occupy this position ([`Token::matches`]) and what typed value it
//! stands for ([`Token::convert`]). Placeholder tokens accept any word while
//! matching so that completion and dispatch see the same candidates; their
//! validation happens during conversion.

use core::fmt;
use std::borrow::Cow;
use std::net::{Ipv4Addr, Ipv6Addr};

use regex::Regex;
use thiserror::Error;

/// One position in a command's word grammar.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// Keyword matched by case-insensitive prefix; converts to its full text.
    Literal(Cow<'static, str>),
    /// Dotted-quad IPv4 address.
    Ipv4,
    /// Colon-separated IPv6 address.
    Ipv6,
    /// Regular expression, compiled on conversion.
    Regex,
    /// Any single word.
    Text,
    /// Decimal integer within an inclusive range.
    Integer { min: i64, max: i64 },
}

impl Token {
    #[must_use]
    pub fn literal(text: impl Into<Cow<'static, str>>) -> Self {
        Token::Literal(text.into())
    }

    #[must_use]
    pub const fn integer(min: i64, max: i64) -> Self {
        Token::Integer { min, max }
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Token::Literal(_))
    }

    /// Keyword text for literals, `None` for placeholders.
    #[must_use]
    pub fn keyword(&self) -> Option<&str> {
        match self {
            Token::Literal(text) => Some(text.as_ref()),
            _ => None,
        }
    }

    /// Returns true when `word` may occupy this token's position.
    #[must_use]
    pub fn matches(&self, word: &str) -> bool {
        match self {
            Token::Literal(text) => !word.is_empty() && starts_with_ignore_ascii_case(text, word),
            Token::Ipv4 | Token::Ipv6 | Token::Regex | Token::Text => true,
            Token::Integer { .. } => word.parse::<i64>().is_ok(),
        }
    }

    /// Converts a matched word into its typed value.
    pub fn convert(&self, word: &str) -> Result<Value, ConvertError> {
        match self {
            Token::Literal(text) => Ok(Value::Keyword(text.to_string())),
            Token::Text => Ok(Value::Text(word.to_owned())),
            Token::Ipv4 => word
                .parse::<Ipv4Addr>()
                .map(Value::Ipv4)
                .map_err(|_| ConvertError::new(self, word, "not an IPv4 address")),
            Token::Ipv6 => word
                .parse::<Ipv6Addr>()
                .map(Value::Ipv6)
                .map_err(|_| ConvertError::new(self, word, "not an IPv6 address")),
            Token::Regex => Regex::new(word)
                .map(Value::Regex)
                .map_err(|err| ConvertError::new(self, word, err.to_string())),
            Token::Integer { min, max } => {
                let value = word
                    .parse::<i64>()
                    .map_err(|_| ConvertError::new(self, word, "not a number"))?;
                if (*min..=*max).contains(&value) {
                    Ok(Value::Integer(value))
                } else {
                    Err(ConvertError::new(
                        self,
                        word,
                        format!("out of range {min} to {max}"),
                    ))
                }
            }
        }
    }

    /// Short description shown next to placeholders in help listings.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Literal(_) => "Keyword",
            Token::Ipv4 => "IPv4 address",
            Token::Ipv6 => "IPv6 address",
            Token::Regex => "Regular expression",
            Token::Text => "Text string",
            Token::Integer { .. } => "Number",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => f.write_str(text),
            Token::Ipv4 => f.write_str("A.B.C.D"),
            Token::Ipv6 => f.write_str("X:X::X:X"),
            Token::Regex => f.write_str("REGEX"),
            Token::Text => f.write_str("WORD"),
            Token::Integer { min, max } => write!(f, "<{min}-{max}>"),
        }
    }
}

/// Typed option value handed to command handlers.
#[derive(Clone, Debug)]
pub enum Value {
    Keyword(String),
    Text(String),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Regex(Regex),
    Integer(i64),
}

impl Value {
    /// Text of keyword and free-text values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Keyword(text) | Value::Text(text) => Some(text.as_str()),
            Value::Regex(regex) => Some(regex.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Keyword(lhs), Value::Keyword(rhs)) | (Value::Text(lhs), Value::Text(rhs)) => {
                lhs == rhs
            }
            (Value::Ipv4(lhs), Value::Ipv4(rhs)) => lhs == rhs,
            (Value::Ipv6(lhs), Value::Ipv6(rhs)) => lhs == rhs,
            (Value::Regex(lhs), Value::Regex(rhs)) => lhs.as_str() == rhs.as_str(),
            (Value::Integer(lhs), Value::Integer(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Keyword(text) | Value::Text(text) => f.write_str(text),
            Value::Ipv4(addr) => write!(f, "{addr}"),
            Value::Ipv6(addr) => write!(f, "{addr}"),
            Value::Regex(regex) => f.write_str(regex.as_str()),
            Value::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// A word matched a token's position but failed its conversion.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid {expected} `{word}`: {reason}")]
pub struct ConvertError {
    pub expected: String,
    pub word: String,
    pub reason: String,
}

impl ConvertError {
    fn new(token: &Token, word: &str, reason: impl Into<String>) -> Self {
        ConvertError {
            expected: token.to_string(),
            word: word.to_owned(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn starts_with_ignore_ascii_case(candidate: &str, prefix: &str) -> bool {
    if prefix.len() > candidate.len() {
        return false;
    }

    candidate
        .as_bytes()
        .iter()
        .zip(prefix.as_bytes())
        .all(|(c, p)| c.eq_ignore_ascii_case(p))
}
