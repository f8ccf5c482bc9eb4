//! Expression trees and their evaluation.
//!
//! A tree is built from text that [`crate::parser`] has already accepted:
//! parentheses and line feeds are stripped, then a single left-to-right scan
//! turns each operator into an interior node with exactly two children and
//! each digit run into a leaf. Trees are owned by the call that builds them
//! and dropped as soon as the value is known.

use std::fmt;

/// Longest decimal literal accepted as a leaf.
pub const MAX_NUMBER_DIGITS: usize = 10;

/// One of the four binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'+' => Some(Self::Add),
            b'-' => Some(Self::Sub),
            b'*' => Some(Self::Mul),
            b'/' => Some(Self::Div),
            _ => None,
        }
    }

    fn apply(self, left: i64, right: i64) -> Result<i64, ComputeError> {
        match self {
            Self::Add => left.checked_add(right),
            Self::Sub => left.checked_sub(right),
            Self::Mul => left.checked_mul(right),
            Self::Div => {
                if right == 0 {
                    return Err(ComputeError::DivisionByZero);
                }
                left.checked_div(right)
            }
        }
        .ok_or(ComputeError::Overflow)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        };
        f.write_str(symbol)
    }
}

/// A node is either a numeric leaf or an operator owning both operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Number(i64),
    Binary {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Computation outcomes that are not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("negative result")]
    NegativeResult,

    #[error("integer overflow")]
    Overflow,
}

impl ComputeError {
    /// Human-readable text sent back to UDP peers.
    pub fn message(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "Calculation failed (division by zero).",
            Self::NegativeResult => "Calculation failed (negative result).",
            Self::Overflow => "Calculation failed (overflow).",
        }
    }
}

/// Tree construction ran into input that validation should have rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("expression ended early at offset {0}")]
    UnexpectedEnd(usize),

    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },

    #[error("number literal longer than {MAX_NUMBER_DIGITS} digits")]
    NumberTooLong,

    #[error("trailing input after expression at offset {0}")]
    Trailing(usize),
}

/// Either stage of turning text into a value can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolveError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

struct Builder {
    tokens: Vec<u8>,
    pos: usize,
}

impl Builder {
    fn node(&mut self) -> Result<Expr, BuildError> {
        if self.tokens.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
        let &first = self
            .tokens
            .get(self.pos)
            .ok_or(BuildError::UnexpectedEnd(self.pos))?;

        if first.is_ascii_digit() {
            let start = self.pos;
            while self.tokens.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
            if self.pos - start > MAX_NUMBER_DIGITS {
                return Err(BuildError::NumberTooLong);
            }
            // At most ten ASCII digits always fit in an i64.
            let value = self.tokens[start..self.pos]
                .iter()
                .fold(0i64, |acc, d| acc * 10 + i64::from(d - b'0'));
            return Ok(Expr::Number(value));
        }

        let op = Operator::from_byte(first).ok_or(BuildError::UnexpectedByte {
            byte: first,
            offset: self.pos,
        })?;
        self.pos += 1;
        let left = self.node()?;
        let right = self.node()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }
}

impl Expr {
    /// Build a tree from a validated expression such as `(+ 1 (* 2 3))`.
    pub fn build(expression: &[u8]) -> Result<Self, BuildError> {
        let tokens: Vec<u8> = expression
            .iter()
            .copied()
            .filter(|b| !matches!(b, b'(' | b')' | b'\n'))
            .collect();
        let mut builder = Builder { tokens, pos: 0 };
        let tree = builder.node()?;
        if builder.pos != builder.tokens.len() {
            return Err(BuildError::Trailing(builder.pos));
        }
        Ok(tree)
    }

    /// Compute the value of this tree.
    ///
    /// Intermediate values may be negative; only [`solve`] rejects a
    /// negative final result.
    pub fn evaluate(&self) -> Result<i64, ComputeError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Binary { op, left, right } => {
                let l = left.evaluate()?;
                let r = right.evaluate()?;
                op.apply(l, r)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Binary { op, left, right } => write!(f, "({op} {left} {right})"),
        }
    }
}

/// Build, evaluate and drop the tree for one validated expression.
///
/// A negative final value is a [`ComputeError::NegativeResult`].
pub fn solve(expression: &[u8]) -> Result<i64, SolveError> {
    let tree = Expr::build(expression)?;
    tracing::trace!(%tree, "built expression tree");
    let value = tree.evaluate()?;
    if value < 0 {
        return Err(ComputeError::NegativeResult.into());
    }
    Ok(value)
}
