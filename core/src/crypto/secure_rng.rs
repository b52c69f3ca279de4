//! Cryptographically secure randomness for overwrite passes.
//!
//! Random fills must be unpredictable to an adversary with read access to
//! the sanitized media, so a CSPRNG backed by OS entropy is mandatory here.
//! The primary source is `ring`'s `SystemRandom`; on Unix `/dev/urandom` is
//! kept as a fallback for the rare case where the primary fails mid-run.

use anyhow::{anyhow, Result};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Mutex;

/// Trait for entropy sources
pub trait EntropySource: Send + Sync {
    /// Fill buffer with random bytes
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
    /// Check if source is available
    fn is_available(&self) -> bool;
    /// Get source name for error reporting
    fn name(&self) -> &str;
}

/// Ring-based system random (uses OS facilities)
pub struct RingSystemRng {
    rng: SystemRandom,
}

impl Default for RingSystemRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RingSystemRng {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl EntropySource for RingSystemRng {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        self.rng
            .fill(dest)
            .map_err(|_| anyhow!("ring SystemRandom failed"))?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "RingSystemRng"
    }
}

/// OS urandom entropy source (Unix fallback)
#[cfg(unix)]
pub struct URandom {
    available: bool,
}

#[cfg(unix)]
impl Default for URandom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl URandom {
    pub fn new() -> Self {
        let available = std::path::Path::new("/dev/urandom").exists();
        Self { available }
    }
}

#[cfg(unix)]
impl EntropySource for URandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        use std::io::Read;

        if !self.available {
            return Err(anyhow!("/dev/urandom not available"));
        }

        let mut file = std::fs::File::open("/dev/urandom")
            .map_err(|e| anyhow!("Failed to open /dev/urandom: {}", e))?;

        file.read_exact(dest)
            .map_err(|e| anyhow!("Failed to read from /dev/urandom: {}", e))?;

        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "URandom"
    }
}

/// FIPS 140-2 continuous random number generator test: two consecutive
/// 16-byte output blocks must never be identical.
struct ContinuousTest {
    last_block: Option<[u8; 16]>,
}

impl ContinuousTest {
    fn new() -> Self {
        Self { last_block: None }
    }

    fn test(&mut self, data: &[u8]) -> bool {
        if data.len() < 16 {
            return true; // Skip test for small blocks
        }

        let mut block = [0u8; 16];
        block.copy_from_slice(&data[..16]);

        if let Some(last) = self.last_block {
            if last == block {
                return false;
            }
        }

        self.last_block = Some(block);
        true
    }
}

/// Secure RNG with a primary and a fallback entropy source.
pub struct SecureRng {
    primary: Box<dyn EntropySource>,
    #[cfg(unix)]
    fallback: Box<dyn EntropySource>,
    continuous_test: Mutex<ContinuousTest>,
}

impl SecureRng {
    pub fn new() -> Self {
        Self {
            primary: Box::new(RingSystemRng::new()),
            #[cfg(unix)]
            fallback: Box::new(URandom::new()),
            continuous_test: Mutex::new(ContinuousTest::new()),
        }
    }

    /// Fill `dest` with cryptographically secure random bytes.
    pub fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        let mut filled = self.primary.fill_bytes(dest).is_ok();

        #[cfg(unix)]
        if !filled && self.fallback.is_available() {
            self.fallback.fill_bytes(dest)?;
            filled = true;
        }

        if !filled {
            return Err(anyhow!("no entropy source available"));
        }

        let mut test = self.continuous_test.lock().unwrap();
        if !test.test(dest) {
            return Err(anyhow!("FIPS 140-2 continuous test failed"));
        }

        Ok(())
    }
}

impl Default for SecureRng {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_RNG: SecureRng = SecureRng::new();
}

/// Convenience function to fill bytes using the process-wide RNG.
pub fn secure_random_bytes(dest: &mut [u8]) -> Result<()> {
    GLOBAL_RNG.fill_bytes(dest)
}

/// Shannon entropy in bits per byte, used by tests to sanity-check random
/// fills.
pub fn calculate_entropy(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let length = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &counts {
        if count > 0 {
            let probability = count as f64 / length;
            entropy -= probability * probability.log2();
        }
    }

    entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_bytes_produces_output() {
        let rng = SecureRng::new();
        let mut buf = [0u8; 64];
        rng.fill_bytes(&mut buf).unwrap();
        // All-zero output after a fill is astronomically unlikely
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_consecutive_fills_differ() {
        let rng = SecureRng::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        rng.fill_bytes(&mut a).unwrap();
        rng.fill_bytes(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_global_rng_entropy() {
        let mut buf = vec![0u8; 64 * 1024];
        secure_random_bytes(&mut buf).unwrap();
        let entropy = calculate_entropy(&buf);
        assert!(entropy > 7.5, "entropy too low: {:.2} bits/byte", entropy);
    }

    #[test]
    fn test_continuous_test_rejects_repeat() {
        let mut test = ContinuousTest::new();
        let block = [0xABu8; 32];
        assert!(test.test(&block));
        assert!(!test.test(&block));
    }

    #[test]
    fn test_entropy_of_constant_data() {
        let data = vec![0x00u8; 4096];
        assert_eq!(calculate_entropy(&data), 0.0);
    }
}
