//! Fuzz target for TCP query lines.
//!
//! Run with: cargo +nightly fuzz run fuzz_query_parser
//!
//! Any line the grammar accepts must build into a tree, and evaluating it
//! must either succeed with a non-negative value or fail cleanly.

#![no_main]

use ipkcp_core::expr::{SolveError, solve};
use ipkcp_core::parser::{SOLVE_PREFIX, validate_query};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|line: &[u8]| {
    if validate_query(line).is_err() {
        return;
    }
    match solve(&line[SOLVE_PREFIX.len()..]) {
        Ok(value) => assert!(value >= 0),
        Err(SolveError::Compute(_)) => {}
        // Over-long literals are the only thing the grammar lets through.
        Err(SolveError::Build(e)) => {
            assert_eq!(e, ipkcp_core::expr::BuildError::NumberTooLong)
        }
    }
});
