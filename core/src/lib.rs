// Allow uppercase acronyms for industry-standard terms like ATA, NVMe, SED
#![allow(clippy::upper_case_acronyms)]

pub mod algorithms;
pub mod crypto;
pub mod dispatcher;
pub mod drives;
pub mod io;
pub mod overwrite;
pub mod purge;
pub mod ui;

// Re-export the engine entry points for convenience
pub use dispatcher::{
    ata_secure_erase, crypto_erase, destroy, device_info, nvme_sanitize, wipe, wipe_with,
    WipeOptions,
};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised inside the engine. Drivers convert every failure into a
/// populated [`PurgeResult`] before returning to the caller; this type only
/// travels between internal layers.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("device is security-frozen: {0}")]
    Frozen(String),

    #[error("device is security-locked: {0}")]
    Locked(String),

    #[error("hardware command failed: {0}")]
    CommandFailed(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Numeric OS error code, when one is attached.
    pub fn os_error_code(&self) -> u32 {
        match self {
            EngineError::Io(e) => e.raw_os_error().unwrap_or(0) as u32,
            _ => 0,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Per-invocation cancellation token. The host hands one to the overwrite
/// pipeline; it is polled at every progress emission. Purge commands (ATA
/// Secure Erase, NVMe Sanitize) cannot be cancelled once submitted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Bus classification of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "USB")]
    Usb,
    #[serde(rename = "SATA_HDD")]
    SataHdd,
    #[serde(rename = "SATA_SSD")]
    SataSsd,
    #[serde(rename = "NVMe")]
    Nvme,
    #[serde(rename = "SCSI")]
    Scsi,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl DeviceType {
    /// USB bridges swallow ATA/NVMe pass-through, so hardware purge is never
    /// attempted on them; unknown devices are likewise excluded.
    pub fn is_purge_supported(&self) -> bool {
        matches!(
            self,
            DeviceType::SataHdd | DeviceType::SataSsd | DeviceType::Nvme
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Usb => "USB",
            DeviceType::SataHdd => "SATA_HDD",
            DeviceType::SataSsd => "SATA_SSD",
            DeviceType::Nvme => "NVMe",
            DeviceType::Scsi => "SCSI",
            DeviceType::Unknown => "Unknown",
        }
    }

    pub fn unsupported_reason(&self) -> String {
        match self {
            DeviceType::Usb => "USB devices do not support ATA Secure Erase or NVMe Sanitize. \
                 Use software overwrite (Clear) methods instead."
                .to_string(),
            DeviceType::Unknown => {
                "Device type could not be determined. Cannot perform hardware purge.".to_string()
            }
            _ => "This device type does not support hardware purge operations.".to_string(),
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitization method attempted or used, as recorded in [`PurgeResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurgeMethod {
    #[serde(rename = "CLEAR_ZERO")]
    ClearZero,
    #[serde(rename = "CLEAR_RANDOM")]
    ClearRandom,
    #[serde(rename = "DOD_5220_22_M")]
    DoD5220,
    #[serde(rename = "GUTMANN")]
    Gutmann,
    #[serde(rename = "ATA_SECURE_ERASE")]
    AtaSecureErase,
    #[serde(rename = "ATA_SECURE_ERASE_ENHANCED")]
    AtaSecureEraseEnhanced,
    #[serde(rename = "NVME_SANITIZE_CRYPTO")]
    NvmeSanitizeCrypto,
    #[serde(rename = "NVME_SANITIZE_BLOCK")]
    NvmeSanitizeBlock,
    #[serde(rename = "NVME_SANITIZE_OVERWRITE")]
    NvmeSanitizeOverwrite,
    #[serde(rename = "NVME_FORMAT_CRYPTO")]
    NvmeFormatCrypto,
    #[serde(rename = "CRYPTO_ERASE")]
    CryptoErase,
    #[serde(rename = "TCG_OPAL_REVERT")]
    TcgOpalRevert,
    #[serde(rename = "DESTROY")]
    Destroy,
    #[serde(rename = "NOT_APPLICABLE")]
    NotApplicable,
}

/// Outcome classification for a sanitization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStatus {
    Success,
    DryRun,
    Unsupported,
    Blocked,
    Error,
    Timeout,
}

/// Structured outcome of one engine invocation, suitable for audit.
///
/// Invariants enforced by the constructors:
/// - `executed` implies the call was not a dry run
/// - `supported == false` implies `executed == false`
/// - `status == Success` iff `success && executed`
/// - `status == DryRun` iff `success && !executed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResult {
    pub success: bool,
    pub supported: bool,
    pub executed: bool,
    pub device_type: DeviceType,
    pub method: PurgeMethod,
    pub status: PurgeStatus,
    pub message: String,
    pub reason: String,
    pub device_path: String,
    pub error_code: u32,
    pub duration_seconds: f64,
}

impl PurgeResult {
    fn base(path: &str, device_type: DeviceType, method: PurgeMethod) -> Self {
        Self {
            success: false,
            supported: false,
            executed: false,
            device_type,
            method,
            status: PurgeStatus::Error,
            message: String::new(),
            reason: String::new(),
            device_path: path.to_string(),
            error_code: 0,
            duration_seconds: 0.0,
        }
    }

    pub fn completed(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        message: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            success: true,
            supported: true,
            executed: true,
            status: PurgeStatus::Success,
            message: message.into(),
            duration_seconds,
            ..Self::base(path, device_type, method)
        }
    }

    pub fn dry_run(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            supported: true,
            executed: false,
            status: PurgeStatus::DryRun,
            message: "Dry run: no destructive commands were issued".to_string(),
            reason: reason.into(),
            ..Self::base(path, device_type, method)
        }
    }

    pub fn unsupported(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: PurgeStatus::Unsupported,
            message: "Sanitization method not supported for this device".to_string(),
            reason: reason.into(),
            ..Self::base(path, device_type, method)
        }
    }

    pub fn blocked(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            supported: true,
            status: PurgeStatus::Blocked,
            message: "Device precondition prevents sanitization".to_string(),
            reason: reason.into(),
            ..Self::base(path, device_type, method)
        }
    }

    pub fn error(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        reason: impl Into<String>,
        error_code: u32,
    ) -> Self {
        Self {
            supported: true,
            status: PurgeStatus::Error,
            message: "Sanitization failed".to_string(),
            reason: reason.into(),
            error_code,
            ..Self::base(path, device_type, method)
        }
    }

    /// Timeout of a purge command that was already submitted: the operation
    /// ran (`executed` stays true) but completion was never observed.
    pub fn timeout(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        reason: impl Into<String>,
        duration_seconds: f64,
    ) -> Self {
        Self {
            supported: true,
            executed: true,
            status: PurgeStatus::Timeout,
            message: "Sanitization did not complete within the time bound".to_string(),
            reason: reason.into(),
            duration_seconds,
            ..Self::base(path, device_type, method)
        }
    }

    pub fn from_engine_error(
        path: &str,
        device_type: DeviceType,
        method: PurgeMethod,
        err: &EngineError,
    ) -> Self {
        match err {
            EngineError::Unsupported(msg) => Self::unsupported(path, device_type, method, msg),
            EngineError::Frozen(msg) | EngineError::Locked(msg) => {
                Self::blocked(path, device_type, method, msg)
            }
            EngineError::Timeout(msg) => Self::timeout(path, device_type, method, msg, 0.0),
            EngineError::Cancelled => Self::error(path, device_type, method, "cancelled", 0),
            other => Self::error(
                path,
                device_type,
                method,
                other.to_string(),
                other.os_error_code(),
            ),
        }
    }

    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = duration_seconds;
        self
    }
}

/// ATA security state decoded from IDENTIFY DEVICE word 128.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtaSecurity {
    pub supported: bool,
    pub enabled: bool,
    pub locked: bool,
    pub frozen: bool,
    pub enhanced_supported: bool,
    pub raw_security_word: u16,
}

impl AtaSecurity {
    pub const SUPPORTED: u16 = 0x0001;
    pub const ENABLED: u16 = 0x0002;
    pub const LOCKED: u16 = 0x0004;
    pub const FROZEN: u16 = 0x0008;
    pub const ENHANCED_ERASE: u16 = 0x0020;

    pub fn from_security_word(word: u16) -> Self {
        Self {
            supported: word & Self::SUPPORTED != 0,
            enabled: word & Self::ENABLED != 0,
            locked: word & Self::LOCKED != 0,
            frozen: word & Self::FROZEN != 0,
            enhanced_supported: word & Self::ENHANCED_ERASE != 0,
            raw_security_word: word,
        }
    }
}

/// NVMe sanitize capabilities. SANICAP decoding is deferred: all three
/// actions are assumed supported, which overestimates capability and may
/// surface as an execution-time failure on controllers that reject an
/// action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvmeSanitizeCaps {
    pub crypto_supported: bool,
    pub block_supported: bool,
    pub overwrite_supported: bool,
    pub sanitize_in_progress: bool,
}

impl Default for NvmeSanitizeCaps {
    fn default() -> Self {
        Self {
            crypto_supported: true,
            block_supported: true,
            overwrite_supported: true,
            sanitize_in_progress: false,
        }
    }
}

/// NVMe Sanitize action (CDW10 bits 0-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeAction {
    Block,
    Overwrite,
    Crypto,
}

impl SanitizeAction {
    pub fn code(&self) -> u32 {
        match self {
            SanitizeAction::Block => 1,
            SanitizeAction::Overwrite => 2,
            SanitizeAction::Crypto => 3,
        }
    }

    pub fn method(&self) -> PurgeMethod {
        match self {
            SanitizeAction::Block => PurgeMethod::NvmeSanitizeBlock,
            SanitizeAction::Overwrite => PurgeMethod::NvmeSanitizeOverwrite,
            SanitizeAction::Crypto => PurgeMethod::NvmeSanitizeCrypto,
        }
    }
}

impl std::str::FromStr for SanitizeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(SanitizeAction::Block),
            "overwrite" => Ok(SanitizeAction::Overwrite),
            "crypto" => Ok(SanitizeAction::Crypto),
            other => Err(format!(
                "invalid sanitize action '{}' (expected crypto, block or overwrite)",
                other
            )),
        }
    }
}

/// Software overwrite (Clear tier) method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearMethod {
    Zero,
    Random,
    DoD5220,
    Gutmann,
}

impl ClearMethod {
    pub fn method(&self) -> PurgeMethod {
        match self {
            ClearMethod::Zero => PurgeMethod::ClearZero,
            ClearMethod::Random => PurgeMethod::ClearRandom,
            ClearMethod::DoD5220 => PurgeMethod::DoD5220,
            ClearMethod::Gutmann => PurgeMethod::Gutmann,
        }
    }
}

/// Compact device description returned by `device_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub path: String,
    pub size_bytes: u64,
    pub size_gb: f64,
    pub bus_type: DeviceType,
}
