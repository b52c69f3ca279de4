pub mod dod;
pub mod gutmann;
pub mod random;
pub mod zero;

use crate::ClearMethod;
use serde::{Deserialize, Serialize};

/// One overwrite pass: a constant byte pattern, or a cryptographically
/// random fill when `randomize` is set (the byte is ignored then).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPass {
    pub pattern: u8,
    pub randomize: bool,
}

impl PatternPass {
    pub const fn fixed(pattern: u8) -> Self {
        Self {
            pattern,
            randomize: false,
        }
    }

    pub const fn random() -> Self {
        Self {
            pattern: 0x00,
            randomize: true,
        }
    }
}

/// Ordered pass sequence for a Clear method. Every LBA receives exactly
/// `len()` writes, in pass order.
pub fn schedule(method: ClearMethod) -> Vec<PatternPass> {
    match method {
        ClearMethod::Zero => zero::passes(),
        ClearMethod::Random => random::passes(),
        ClearMethod::DoD5220 => dod::passes(),
        ClearMethod::Gutmann => gutmann::passes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_lengths() {
        assert_eq!(schedule(ClearMethod::Zero).len(), 1);
        assert_eq!(schedule(ClearMethod::Random).len(), 1);
        assert_eq!(schedule(ClearMethod::DoD5220).len(), 3);
        assert_eq!(schedule(ClearMethod::Gutmann).len(), 35);
    }

    #[test]
    fn test_single_pass_schedules() {
        assert_eq!(schedule(ClearMethod::Zero), vec![PatternPass::fixed(0x00)]);
        assert_eq!(schedule(ClearMethod::Random), vec![PatternPass::random()]);
    }
}
