//! Syntactic validation of IPKCP queries.
//!
//! ```text
//! message  = "SOLVE" SP expr LF           (TCP)
//! expr     = "(" operator SP expr SP expr ")" / 1*DIGIT
//! operator = "+" / "-" / "*" / "/"
//! ```
//!
//! A single recursive descent with one cursor and one byte of lookahead. The
//! parser only answers "well formed or not"; building the expression tree is
//! done separately by [`crate::expr`].

/// Prefix of every TCP query line.
pub const SOLVE_PREFIX: &str = "SOLVE ";

/// Deepest parenthesis nesting accepted.
///
/// Tree construction, evaluation and drop all recurse once per level, so
/// this bounds their stack use whatever the configured line length.
pub const MAX_NESTING: usize = 256;

/// Why a query was rejected, and where.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("query does not start with \"SOLVE \"")]
    MissingSolve,

    #[error("expected {expected} at offset {offset}")]
    Unexpected {
        expected: &'static str,
        offset: usize,
    },

    #[error("trailing input at offset {offset}")]
    Trailing { offset: usize },

    #[error("nesting deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8], pos: usize) -> Self {
        Self {
            input,
            pos,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn fail(&self, expected: &'static str) -> ParseError {
        ParseError::Unexpected {
            expected,
            offset: self.pos,
        }
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), ParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.fail(expected))
        }
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(b'+' | b'-' | b'*' | b'/') => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.fail("operator")),
        }
    }

    fn expr(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b.is_ascii_digit() => {
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
                Ok(())
            }
            Some(b'(') => {
                if self.depth == MAX_NESTING {
                    return Err(ParseError::TooDeep {
                        limit: MAX_NESTING,
                        offset: self.pos,
                    });
                }
                self.depth += 1;
                self.pos += 1;
                self.operator()?;
                self.expect(b' ', "space")?;
                self.expr()?;
                self.expect(b' ', "space")?;
                self.expr()?;
                self.expect(b')', "\")\"")?;
                self.depth -= 1;
                Ok(())
            }
            _ => Err(self.fail("digit or \"(\"")),
        }
    }
}

/// Validate a full TCP query line, terminator included.
///
/// The line must be `SOLVE `, one expression, and a single `\n` with nothing
/// after it.
pub fn validate_query(line: &[u8]) -> Result<(), ParseError> {
    if !line.starts_with(SOLVE_PREFIX.as_bytes()) {
        return Err(ParseError::MissingSolve);
    }
    let mut cursor = Cursor::new(line, SOLVE_PREFIX.len());
    cursor.expr()?;
    cursor.expect(b'\n', "line feed")?;
    if cursor.pos != line.len() {
        return Err(ParseError::Trailing { offset: cursor.pos });
    }
    Ok(())
}

/// Validate a bare expression, as carried in a UDP request payload.
///
/// The expression must span the whole payload. A single trailing `\n` is
/// tolerated since some clients forward the raw input line.
pub fn validate_expr(payload: &[u8]) -> Result<(), ParseError> {
    let mut cursor = Cursor::new(payload, 0);
    cursor.expr()?;
    if cursor.peek() == Some(b'\n') {
        cursor.pos += 1;
    }
    if cursor.pos != payload.len() {
        return Err(ParseError::Trailing { offset: cursor.pos });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_queries() {
        for line in [
            "SOLVE (+ 1 1)\n",
            "SOLVE 7\n",
            "SOLVE (- 10 3)\n",
            "SOLVE (* (+ 1 2) (/ 100 5))\n",
            "SOLVE (/ (- 90 (* 2 3)) (+ 1 (+ 1 1)))\n",
            "SOLVE (+ 1234567890 0)\n",
        ] {
            assert_eq!(validate_query(line.as_bytes()), Ok(()), "{line:?}");
        }
    }

    #[test]
    fn test_missing_operand_is_rejected() {
        assert!(validate_query(b"SOLVE (+ 1)\n").is_err());
    }

    #[test]
    fn test_spacing_must_be_exact() {
        for line in [
            "SOLVE (+1 1)\n",
            "SOLVE (+ 1  1)\n",
            "SOLVE (+  1 1)\n",
            "SOLVE ( + 1 1)\n",
            "SOLVE (+ 1 1 )\n",
            "SOLVE  (+ 1 1)\n",
            "SOLVE(+ 1 1)\n",
        ] {
            assert!(validate_query(line.as_bytes()).is_err(), "{line:?}");
        }
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(validate_query(b"SOLVE (+ 1 1\n").is_err());
        assert!(validate_query(b"SOLVE (+ 1 1))\n").is_err());
        assert!(validate_query(b"SOLVE (+ (* 2 3) 1\n").is_err());
    }

    #[test]
    fn test_unknown_operator_and_characters() {
        assert!(validate_query(b"SOLVE (% 1 1)\n").is_err());
        assert!(validate_query(b"SOLVE (+ a 1)\n").is_err());
        assert!(validate_query(b"SOLVE (+ -1 1)\n").is_err());
    }

    #[test]
    fn test_terminator_rules() {
        assert!(validate_query(b"SOLVE (+ 1 1)").is_err());
        assert!(validate_query(b"SOLVE (+ 1 1) \n").is_err());
        assert!(validate_query(b"SOLVE (+ 1 1)\r\n").is_err());
        assert_eq!(
            validate_query(b"SOLVE (+ 1 1)\nX"),
            Err(ParseError::Trailing { offset: 14 })
        );
    }

    #[test]
    fn test_missing_solve_keyword() {
        assert_eq!(validate_query(b"solve (+ 1 1)\n"), Err(ParseError::MissingSolve));
        assert_eq!(validate_query(b"HELLO\n"), Err(ParseError::MissingSolve));
    }

    #[test]
    fn test_error_offset_points_at_failure() {
        assert_eq!(
            validate_query(b"SOLVE (+ 1)\n"),
            Err(ParseError::Unexpected {
                expected: "space",
                offset: 10
            })
        );
    }

    #[test]
    fn test_removing_any_required_byte_breaks_the_query() {
        let line = b"SOLVE (* (+ 12 3) 4)\n";
        assert!(validate_query(line).is_ok());
        for (i, &b) in line.iter().enumerate() {
            if matches!(b, b' ' | b'(' | b')') || (b.is_ascii_digit() && is_lone_digit(line, i)) {
                let mut mutated = line.to_vec();
                mutated.remove(i);
                assert!(validate_query(&mutated).is_err(), "removed byte {i}");
            }
        }
    }

    fn is_lone_digit(line: &[u8], i: usize) -> bool {
        let before = i.checked_sub(1).map(|j| line[j].is_ascii_digit());
        let after = line.get(i + 1).map(|b| b.is_ascii_digit());
        before != Some(true) && after != Some(true)
    }

    fn nested(depth: usize) -> Vec<u8> {
        let mut line = SOLVE_PREFIX.as_bytes().to_vec();
        line.extend("(+ 1 ".repeat(depth).bytes());
        line.push(b'1');
        line.extend(")".repeat(depth).bytes());
        line.push(b'\n');
        line
    }

    #[test]
    fn test_nesting_limit() {
        assert_eq!(validate_query(&nested(MAX_NESTING)), Ok(()));
        assert!(matches!(
            validate_query(&nested(MAX_NESTING + 1)),
            Err(ParseError::TooDeep { limit: MAX_NESTING, .. })
        ));
    }

    #[test]
    fn test_very_deep_line_is_rejected_without_recursing() {
        // Far deeper than a 2 MiB stack could follow.
        let line = nested(20_000);
        assert!(matches!(
            validate_query(&line),
            Err(ParseError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_deepest_accepted_query_solves() {
        let line = nested(MAX_NESTING);
        let value = crate::expr::solve(&line[SOLVE_PREFIX.len()..]).unwrap();
        assert_eq!(value, MAX_NESTING as i64 + 1);
    }

    #[test]
    fn test_validate_expr() {
        assert_eq!(validate_expr(b"(+ 1 2)"), Ok(()));
        assert_eq!(validate_expr(b"42"), Ok(()));
        assert_eq!(validate_expr(b"(+ 1 2)\n"), Ok(()));
        assert!(validate_expr(b"").is_err());
        assert!(validate_expr(b"(+ 1 2)\n\n").is_err());
        assert!(validate_expr(b"(+ 1 2) ").is_err());
        assert!(validate_expr(b"SOLVE (+ 1 2)").is_err());
    }
}
