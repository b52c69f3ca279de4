//! Single-pass random fill (NIST SP 800-88 Clear).
//!
//! Random bytes come from the CSPRNG in `crypto::secure_rng`; the pipeline
//! refreshes the buffer before every write so no block of the device ever
//! repeats another block's fill.

use super::PatternPass;

pub const PASS_COUNT: usize = 1;

pub fn passes() -> Vec<PatternPass> {
    vec![PatternPass::random()]
}
