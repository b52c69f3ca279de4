//! NVMe Sanitize driver.
//!
//! The Sanitize admin command returns as soon as the controller accepts it;
//! completion is observed by polling the sanitize-status log until no
//! operation is in progress. A sanitize cannot be cancelled once started.
//! Format NVM with cryptographic erase is carried as the fallback channel
//! for controllers that reject the Sanitize opcode.

use crate::drives::capability::{CapabilityQuery, NVME_NSID_ALL};
use crate::drives::probe::DeviceProfile;
use crate::drives::raw::{open_device, NvmeAdminCommand, OpenMode, RawDevice};
use crate::{EngineError, EngineResult, PurgeResult, SanitizeAction};
use std::time::{Duration, Instant};

pub const NVME_ADMIN_FORMAT_NVM: u8 = 0x80;
pub const NVME_ADMIN_SANITIZE: u8 = 0x84;

/// Format NVM CDW10: SES bits 11-13 = 010, cryptographic erase
pub const FORMAT_CDW10_CRYPTO_ERASE: u32 = 0x0000_1000;

pub const SANITIZE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// 2880 polls at 5 s = 4 hours
pub const SANITIZE_MAX_POLLS: u32 = 2880;

const SUBMIT_TIMEOUT_SECS: u32 = 60;
const FORMAT_TIMEOUT_SECS: u32 = 600;

pub type SanitizeProgressFn<'a> = &'a mut dyn FnMut(f64);

pub struct NvmeSanitizeDriver {
    poll_interval: Duration,
    max_polls: u32,
}

impl Default for NvmeSanitizeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NvmeSanitizeDriver {
    pub fn new() -> Self {
        Self {
            poll_interval: SANITIZE_POLL_INTERVAL,
            max_polls: SANITIZE_MAX_POLLS,
        }
    }

    #[cfg(test)]
    fn with_poll(poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            poll_interval,
            max_polls,
        }
    }

    /// Issue the Sanitize admin command. CDW10 bits 0-2 carry the action;
    /// AUSE and NDAS stay zero.
    pub fn submit(&self, dev: &mut dyn RawDevice, action: SanitizeAction) -> EngineResult<()> {
        let cmd = NvmeAdminCommand {
            opcode: NVME_ADMIN_SANITIZE,
            nsid: NVME_NSID_ALL,
            cdw10: action.code() & 0x07,
            cdw11: 0,
            data_len: 0,
            timeout_secs: SUBMIT_TIMEOUT_SECS,
        };
        dev.nvme_admin(&cmd, None)?;
        Ok(())
    }

    /// Poll the sanitize-status log until the controller reports no
    /// operation in progress, or the 4-hour bound runs out.
    pub fn wait_complete(
        &self,
        dev: &mut dyn RawDevice,
        mut progress: Option<SanitizeProgressFn<'_>>,
    ) -> EngineResult<()> {
        for _poll in 0..self.max_polls {
            std::thread::sleep(self.poll_interval);

            let log = match CapabilityQuery::nvme_sanitize_status(dev) {
                Ok(log) => log,
                // A failed status read is not fatal; the next poll may
                // succeed while the controller is busy sanitizing
                Err(_) => continue,
            };

            if log.is_idle() {
                return Ok(());
            }

            if let Some(ref mut callback) = progress {
                callback(log.percent());
            }
        }

        Err(EngineError::Timeout(format!(
            "sanitize did not complete after {} polls",
            self.max_polls
        )))
    }

    pub fn run(
        &self,
        dev: &mut dyn RawDevice,
        action: SanitizeAction,
        progress: Option<SanitizeProgressFn<'_>>,
    ) -> EngineResult<()> {
        self.submit(dev, action)?;
        self.wait_complete(dev, progress)
    }
}

/// Format NVM with cryptographic erase (SES = 010) across all namespaces.
pub fn format_crypto(dev: &mut dyn RawDevice) -> EngineResult<()> {
    let cmd = NvmeAdminCommand {
        opcode: NVME_ADMIN_FORMAT_NVM,
        nsid: NVME_NSID_ALL,
        cdw10: FORMAT_CDW10_CRYPTO_ERASE,
        cdw11: 0,
        data_len: 0,
        timeout_secs: FORMAT_TIMEOUT_SECS,
    };
    dev.nvme_admin(&cmd, None)?;
    Ok(())
}

/// Full sanitize run: open, submit, poll, shape the result.
pub fn sanitize(profile: &DeviceProfile, action: SanitizeAction) -> PurgeResult {
    let method = action.method();
    let path = profile.path.as_str();
    let started = Instant::now();

    let mut dev = match open_device(path, OpenMode::ExclusiveWrite) {
        Ok(dev) => dev,
        Err(e) => return PurgeResult::from_engine_error(path, profile.device_type, method, &e),
    };

    let driver = NvmeSanitizeDriver::new();
    if let Err(e) = driver.submit(dev.as_mut(), action) {
        return PurgeResult::from_engine_error(path, profile.device_type, method, &e);
    }

    match driver.wait_complete(dev.as_mut(), None) {
        Ok(()) => PurgeResult::completed(
            path,
            profile.device_type,
            method,
            "NVMe Sanitize completed",
            started.elapsed().as_secs_f64(),
        ),
        Err(EngineError::Timeout(reason)) => PurgeResult::timeout(
            path,
            profile.device_type,
            method,
            reason,
            started.elapsed().as_secs_f64(),
        ),
        Err(e) => PurgeResult::from_engine_error(path, profile.device_type, method, &e),
    }
}
