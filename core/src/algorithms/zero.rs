//! Single-pass zero fill (NIST SP 800-88 Clear).
//!
//! Fast sanitization for drives staying within the same organization; not
//! sufficient where the threat model includes lab recovery of magnetic
//! remanence.

use super::PatternPass;

pub const PASS_COUNT: usize = 1;

pub fn passes() -> Vec<PatternPass> {
    vec![PatternPass::fixed(0x00)]
}
