//! DoD 5220.22-M three-pass overwrite.

use super::PatternPass;

/// DoD 5220.22-M standard pass 1 pattern (all zeros)
pub const PASS_1_PATTERN: u8 = 0x00;

/// DoD 5220.22-M standard pass 2 pattern (all ones)
pub const PASS_2_PATTERN: u8 = 0xFF;

/// DoD 5220.22-M requires exactly 3 passes
pub const PASS_COUNT: usize = 3;

pub fn passes() -> Vec<PatternPass> {
    vec![
        PatternPass::fixed(PASS_1_PATTERN),
        PatternPass::fixed(PASS_2_PATTERN),
        PatternPass::random(),
    ]
}
