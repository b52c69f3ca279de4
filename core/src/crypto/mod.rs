pub mod secure_rng;

pub use secure_rng::{secure_random_bytes, SecureRng};
