//! Option grammar algebra.
//!
//! Commands describe the words they accept after their keywords as an
//! [`Expression`] built from [`Token`]s with [`Expression::one_of`],
//! [`Expression::in_order`] and [`Expression::optional`]. Enumerating an
//! expression yields every concrete token sequence it accepts, in a fixed
//! order: alternatives in declaration order, the empty form of an optional
//! before its filled forms, and sequences as a left-major product.

use core::fmt;
use core::iter;

use super::token::Token;

/// One concrete token sequence accepted by an expression.
pub type Combination = Vec<Token>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Leaf(Token),
    OneOf(Vec<Expression>),
    InOrder(Vec<Expression>),
    Optional(Box<Expression>),
}

impl Expression {
    /// Alternation. Nested alternations are spliced into this one.
    pub fn one_of<I, E>(operands: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        let mut flat = Vec::new();
        for operand in operands {
            match operand.into() {
                Expression::OneOf(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Expression::OneOf(flat)
    }

    /// Sequence. Nested sequences are spliced into this one.
    pub fn in_order<I, E>(operands: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        let mut flat = Vec::new();
        for operand in operands {
            match operand.into() {
                Expression::InOrder(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Expression::InOrder(flat)
    }

    pub fn optional(inner: impl Into<Expression>) -> Self {
        Expression::Optional(Box::new(inner.into()))
    }

    /// The expression accepting only the empty sequence.
    #[must_use]
    pub const fn empty() -> Self {
        Expression::InOrder(Vec::new())
    }

    /// Normalizes a registration operand; a bare token becomes a one-element
    /// sequence.
    pub fn construct(operand: impl Into<Expression>) -> Self {
        match operand.into() {
            Expression::Leaf(token) => Expression::InOrder(vec![Expression::Leaf(token)]),
            other => other,
        }
    }

    /// Lazily enumerates the accepted token sequences. Each call starts over.
    #[must_use]
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            inner: enumerate(self),
        }
    }

    fn is_empty_sequence(&self) -> bool {
        matches!(self, Expression::InOrder(operands) if operands.is_empty())
    }
}

impl Default for Expression {
    fn default() -> Self {
        Expression::empty()
    }
}

impl From<Token> for Expression {
    fn from(token: Token) -> Self {
        Expression::Leaf(token)
    }
}

/// Iterator returned by [`Expression::combinations`].
pub struct Combinations<'a> {
    inner: Box<dyn Iterator<Item = Combination> + 'a>,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

fn enumerate(expression: &Expression) -> Box<dyn Iterator<Item = Combination> + '_> {
    match expression {
        Expression::Leaf(token) => Box::new(iter::once(vec![token.clone()])),
        Expression::OneOf(operands) => Box::new(operands.iter().flat_map(enumerate)),
        Expression::Optional(inner) => Box::new(iter::once(Vec::new()).chain(enumerate(inner))),
        Expression::InOrder(operands) => enumerate_in_order(operands),
    }
}

fn enumerate_in_order(operands: &[Expression]) -> Box<dyn Iterator<Item = Combination> + '_> {
    match operands.split_first() {
        None => Box::new(iter::once(Vec::new())),
        Some((first, rest)) => Box::new(enumerate(first).flat_map(move |head| {
            enumerate_in_order(rest).map(move |tail| {
                let mut combination = head.clone();
                combination.extend(tail);
                combination
            })
        })),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Leaf(token) => write!(f, "{token}"),
            Expression::OneOf(operands) => write_joined(f, operands, " | "),
            Expression::InOrder(operands) => {
                let mut first = true;
                for operand in operands.iter().filter(|operand| !operand.is_empty_sequence()) {
                    if !first {
                        f.write_str(" ")?;
                    }
                    first = false;
                    if matches!(operand, Expression::OneOf(_)) {
                        write!(f, "{{ {operand} }}")?;
                    } else {
                        write!(f, "{operand}")?;
                    }
                }
                Ok(())
            }
            Expression::Optional(inner) => write!(f, "[ {inner} ]"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Expression], separator: &str) -> fmt::Result {
    for (index, operand) in operands.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{operand}")?;
    }
    Ok(())
}
