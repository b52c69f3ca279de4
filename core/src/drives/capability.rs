//! Non-destructive capability queries: ATA IDENTIFY DEVICE and the NVMe
//! sanitize-status log.
//!
//! Frozen and locked drives are not errors here; the states are decoded
//! into the capability records and consumed by the secure-erase driver's
//! preflight.

use crate::drives::raw::{AtaCommand, NvmeAdminCommand, RawDevice};
use crate::{AtaSecurity, EngineResult, NvmeSanitizeCaps};

/// ATA command set
pub const ATA_CMD_IDENTIFY_DEVICE: u8 = 0xEC;

/// IDENTIFY DEVICE word index holding the security status
pub const ATA_ID_SECURITY_STATUS: usize = 128;

/// NVMe admin command set
pub const NVME_ADMIN_GET_LOG_PAGE: u8 = 0x02;

/// Sanitize Status log page
pub const NVME_LOG_SANITIZE_STATUS: u8 = 0x81;

/// All namespaces
pub const NVME_NSID_ALL: u32 = 0xFFFF_FFFF;

const SANITIZE_LOG_LEN: u32 = 512;
const IDENTIFY_TIMEOUT_SECS: u32 = 10;

/// Decoded NVMe Sanitize Status log page (log ID 0x81).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStatusLog {
    /// SPROG: progress as a fraction of 65536
    pub progress: u16,
    /// SSTAT: bits 0-2 encode the state of the most recent operation
    pub status: u16,
}

impl SanitizeStatusLog {
    const SSTAT_STATE_IN_PROGRESS: u16 = 2;

    pub fn parse(raw: &[u8]) -> Self {
        if raw.len() < 4 {
            return Self::default();
        }
        Self {
            progress: u16::from_le_bytes([raw[0], raw[1]]),
            status: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    /// No sanitize operation is in progress (completion condition for the
    /// poll loop).
    pub fn is_idle(&self) -> bool {
        self.status & 0x07 == 0
    }

    pub fn in_progress(&self) -> bool {
        self.status & 0x07 == Self::SSTAT_STATE_IN_PROGRESS
    }

    pub fn percent(&self) -> f64 {
        self.progress as f64 / 65535.0 * 100.0
    }
}

/// CDW10 for GET LOG PAGE: LID in bits 0-7, zero-based dword count in bits
/// 16-27.
pub fn get_log_page_cdw10(lid: u8, byte_len: u32) -> u32 {
    let numd = byte_len / 4;
    (lid as u32) | (numd.saturating_sub(1) << 16)
}

pub struct CapabilityQuery;

impl CapabilityQuery {
    /// Issue IDENTIFY DEVICE and decode security word 128.
    pub fn ata_security(dev: &mut dyn RawDevice) -> EngineResult<AtaSecurity> {
        let cmd = AtaCommand::data_in(ATA_CMD_IDENTIFY_DEVICE, IDENTIFY_TIMEOUT_SECS);
        let mut identify = [0u8; 512];
        dev.ata_command(&cmd, None, Some(&mut identify))?;
        Ok(decode_identify_security(&identify))
    }

    /// Read the sanitize-status log. Action support bits come from SANICAP
    /// in IDENTIFY CONTROLLER, which this engine does not parse; all three
    /// actions are assumed supported (a deliberate overestimate), so only
    /// `sanitize_in_progress` is observed.
    pub fn nvme_sanitize(dev: &mut dyn RawDevice) -> EngineResult<NvmeSanitizeCaps> {
        let log = Self::nvme_sanitize_status(dev)?;
        Ok(NvmeSanitizeCaps {
            sanitize_in_progress: log.in_progress(),
            ..NvmeSanitizeCaps::default()
        })
    }

    /// Raw sanitize-status read, shared with the sanitize driver's poll
    /// loop.
    pub fn nvme_sanitize_status(dev: &mut dyn RawDevice) -> EngineResult<SanitizeStatusLog> {
        let cmd = NvmeAdminCommand {
            opcode: NVME_ADMIN_GET_LOG_PAGE,
            nsid: NVME_NSID_ALL,
            cdw10: get_log_page_cdw10(NVME_LOG_SANITIZE_STATUS, SANITIZE_LOG_LEN),
            cdw11: 0,
            data_len: SANITIZE_LOG_LEN,
            timeout_secs: IDENTIFY_TIMEOUT_SECS,
        };
        let mut raw = [0u8; SANITIZE_LOG_LEN as usize];
        dev.nvme_admin(&cmd, Some(&mut raw))?;
        Ok(SanitizeStatusLog::parse(&raw))
    }
}

/// Word 128 of the 256-word IDENTIFY DEVICE block, little-endian on the
/// wire.
pub fn decode_identify_security(identify: &[u8; 512]) -> AtaSecurity {
    let offset = ATA_ID_SECURITY_STATUS * 2;
    let word = u16::from_le_bytes([identify[offset], identify[offset + 1]]);
    AtaSecurity::from_security_word(word)
}
