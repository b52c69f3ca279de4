//! Gutmann 35-pass overwrite: 29 fixed patterns targeting legacy MFM/RLL
//! encodings, followed by 6 cryptographically random passes.

use super::PatternPass;

pub const PASS_COUNT: usize = 35;
pub const RANDOM_PASS_COUNT: usize = 6;

/// Fixed pattern bytes for passes 1-29. Passes 30-35 are random.
pub const FIXED_PATTERNS: [u8; 29] = [
    0x55, 0xAA, 0x92, 0x49, 0x24, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99,
    0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x92, 0x49, 0x24, 0x6D, 0xB6, 0xDB, 0xFF, 0x00,
];

pub fn passes() -> Vec<PatternPass> {
    let mut passes: Vec<PatternPass> = FIXED_PATTERNS.iter().map(|&b| PatternPass::fixed(b)).collect();
    passes.extend(std::iter::repeat(PatternPass::random()).take(RANDOM_PASS_COUNT));
    passes
}
