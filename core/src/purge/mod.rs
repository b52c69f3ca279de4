// Hardware purge drivers (NIST 800-88 Purge tier)
//
// - ata.rs: ATA Security Erase state machine
// - nvme.rs: NVMe Sanitize + Format NVM crypto erase
// - crypto_erase.rs: strategy selection across the two, with the TCG Opal
//   stub

pub mod ata;
pub mod crypto_erase;
pub mod nvme;

pub use ata::{AtaSecureEraseDriver, EraseState};
pub use crypto_erase::{select_strategy, CryptoEraseStrategy};
pub use nvme::NvmeSanitizeDriver;
