//! ATA Security Erase driver.
//!
//! Three-step command sequence against the drive's security feature set:
//! SECURITY SET PASSWORD, SECURITY ERASE PREPARE, SECURITY ERASE UNIT.
//! Completion is attested by the ERASE UNIT command returning; no read-back
//! verification is performed. A drive frozen by the BIOS or locked by a
//! previous password cannot be erased until the operator intervenes.

use crate::drives::capability::CapabilityQuery;
use crate::drives::probe::DeviceProfile;
use crate::drives::raw::{open_device, AtaCommand, OpenMode, RawDevice};
use crate::{AtaSecurity, EngineError, EngineResult, PurgeMethod, PurgeResult};
use std::time::Instant;

pub const ATA_CMD_SECURITY_SET_PASSWORD: u8 = 0xF1;
pub const ATA_CMD_SECURITY_ERASE_PREPARE: u8 = 0xF3;
pub const ATA_CMD_SECURITY_ERASE_UNIT: u8 = 0xF4;

const SET_PASSWORD_TIMEOUT_SECS: u32 = 15;
const ERASE_PREPARE_TIMEOUT_SECS: u32 = 10;
const ERASE_UNIT_TIMEOUT_SECS: u32 = 4 * 60 * 60;

/// Byte 0 of the password block: user-level password
const PASSWORD_LEVEL_USER: u8 = 0x00;

/// Byte 0 of the ERASE UNIT block: bit 1 selects Enhanced mode
const ERASE_MODE_ENHANCED: u8 = 0x02;
const ERASE_MODE_NORMAL: u8 = 0x00;

/// Driver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseState {
    Idle,
    Probed,
    PasswordSet,
    PreparedToErase,
    Erasing,
    Done,
    Blocked,
    Failed,
}

pub struct AtaSecureEraseDriver {
    state: EraseState,
}

impl Default for AtaSecureEraseDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaSecureEraseDriver {
    pub fn new() -> Self {
        Self {
            state: EraseState::Idle,
        }
    }

    pub fn state(&self) -> EraseState {
        self.state
    }

    /// Check security preconditions and resolve the erase mode. Enhanced is
    /// silently demoted to Normal when the drive does not support it; the
    /// demotion is visible through the returned mode.
    pub fn preflight(
        &mut self,
        security: &AtaSecurity,
        enhanced_requested: bool,
    ) -> EngineResult<bool> {
        if !security.supported {
            self.state = EraseState::Failed;
            return Err(EngineError::Unsupported(
                "drive does not support the ATA security feature set".to_string(),
            ));
        }

        if security.frozen {
            self.state = EraseState::Blocked;
            return Err(EngineError::Frozen(
                "BIOS security-frozen; power-cycle required".to_string(),
            ));
        }

        if security.locked {
            self.state = EraseState::Blocked;
            return Err(EngineError::Locked(
                "drive is security-locked; unlock before erasing".to_string(),
            ));
        }

        self.state = EraseState::Probed;
        Ok(enhanced_requested && security.enhanced_supported)
    }

    /// Run the three-command sequence. Any step failure closes out in
    /// `Failed` with the OS error preserved.
    pub fn execute(&mut self, dev: &mut dyn RawDevice, use_enhanced: bool) -> EngineResult<()> {
        debug_assert_eq!(self.state, EraseState::Probed);

        // Step 1: SECURITY SET PASSWORD, zeroed 512-byte block, user level
        let mut password_block = [0u8; 512];
        password_block[0] = PASSWORD_LEVEL_USER;

        let set_password =
            AtaCommand::data_out(ATA_CMD_SECURITY_SET_PASSWORD, SET_PASSWORD_TIMEOUT_SECS);
        if let Err(e) = dev.ata_command(&set_password, Some(&password_block), None) {
            self.state = EraseState::Failed;
            return Err(e);
        }
        self.state = EraseState::PasswordSet;

        // Step 2: SECURITY ERASE PREPARE, no data
        let prepare =
            AtaCommand::non_data(ATA_CMD_SECURITY_ERASE_PREPARE, ERASE_PREPARE_TIMEOUT_SECS);
        if let Err(e) = dev.ata_command(&prepare, None, None) {
            self.state = EraseState::Failed;
            return Err(e);
        }
        self.state = EraseState::PreparedToErase;

        // Step 3: SECURITY ERASE UNIT; the command blocks until the drive
        // finishes, possibly hours later
        let mut erase_block = [0u8; 512];
        erase_block[0] = if use_enhanced {
            ERASE_MODE_ENHANCED
        } else {
            ERASE_MODE_NORMAL
        };

        self.state = EraseState::Erasing;
        let erase = AtaCommand::data_out(ATA_CMD_SECURITY_ERASE_UNIT, ERASE_UNIT_TIMEOUT_SECS);
        if let Err(e) = dev.ata_command(&erase, Some(&erase_block), None) {
            self.state = EraseState::Failed;
            return Err(e);
        }

        self.state = EraseState::Done;
        Ok(())
    }
}

/// The method a request resolves to after Enhanced demotion.
pub fn effective_method(security: &AtaSecurity, enhanced_requested: bool) -> PurgeMethod {
    if enhanced_requested && security.enhanced_supported {
        PurgeMethod::AtaSecureEraseEnhanced
    } else {
        PurgeMethod::AtaSecureErase
    }
}

/// Full secure-erase run: open, preflight, execute, shape the result.
pub fn secure_erase(profile: &DeviceProfile, enhanced_requested: bool) -> PurgeResult {
    let requested_method = if enhanced_requested {
        PurgeMethod::AtaSecureEraseEnhanced
    } else {
        PurgeMethod::AtaSecureErase
    };
    let path = profile.path.as_str();
    let started = Instant::now();

    let mut dev = match open_device(path, OpenMode::ExclusiveWrite) {
        Ok(dev) => dev,
        Err(e) => {
            return PurgeResult::from_engine_error(path, profile.device_type, requested_method, &e)
        }
    };

    let security = match CapabilityQuery::ata_security(dev.as_mut()) {
        Ok(security) => security,
        Err(e) => {
            return PurgeResult::from_engine_error(path, profile.device_type, requested_method, &e)
        }
    };

    let mut driver = AtaSecureEraseDriver::new();
    let use_enhanced = match driver.preflight(&security, enhanced_requested) {
        Ok(use_enhanced) => use_enhanced,
        Err(e) => {
            return PurgeResult::from_engine_error(path, profile.device_type, requested_method, &e)
        }
    };
    let method = effective_method(&security, enhanced_requested);

    if let Err(e) = driver.execute(dev.as_mut(), use_enhanced) {
        return PurgeResult::from_engine_error(path, profile.device_type, method, &e);
    }

    let mut result = PurgeResult::completed(
        path,
        profile.device_type,
        method,
        "ATA Secure Erase completed",
        started.elapsed().as_secs_f64(),
    );
    if enhanced_requested && !use_enhanced {
        result.reason = "enhanced erase not supported by drive; demoted to normal erase".to_string();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drives::raw::{AtaProtocol, NvmeAdminCommand};
    use crate::PurgeStatus;

    /// Scripted device that records issued taskfile commands.
    #[derive(Debug)]
    struct MockAta {
        issued: Vec<(u8, AtaProtocol, Option<[u8; 512]>)>,
        fail_opcode: Option<u8>,
    }

    impl MockAta {
        fn new() -> Self {
            Self {
                issued: Vec::new(),
                fail_opcode: None,
            }
        }

        fn failing_at(opcode: u8) -> Self {
            Self {
                issued: Vec::new(),
                fail_opcode: Some(opcode),
            }
        }
    }

    impl RawDevice for MockAta {
        fn path(&self) -> &str {
            "/dev/mock"
        }
        fn size(&self) -> u64 {
            1 << 30
        }
        fn sector_size(&self) -> u64 {
            4096
        }
        fn is_block_device(&self) -> bool {
            true
        }
        fn read_at(&mut self, _buf: &mut [u8], _offset: u64) -> EngineResult<usize> {
            Ok(0)
        }
        fn write_at(&mut self, _buf: &[u8], _offset: u64) -> EngineResult<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn ata_command(
            &mut self,
            cmd: &AtaCommand,
            data_out: Option<&[u8; 512]>,
            _data_in: Option<&mut [u8; 512]>,
        ) -> EngineResult<()> {
            self.issued.push((cmd.opcode, cmd.protocol, data_out.copied()));
            if self.fail_opcode == Some(cmd.opcode) {
                return Err(EngineError::CommandFailed(format!(
                    "ATA opcode 0x{:02X}: injected failure",
                    cmd.opcode
                )));
            }
            Ok(())
        }
        fn nvme_admin(
            &mut self,
            _cmd: &NvmeAdminCommand,
            _data_in: Option<&mut [u8]>,
        ) -> EngineResult<u32> {
            Err(EngineError::Unsupported("not an NVMe device".to_string()))
        }
    }

    fn supported_security() -> AtaSecurity {
        AtaSecurity::from_security_word(AtaSecurity::SUPPORTED | AtaSecurity::ENHANCED_ERASE)
    }

    #[test]
    fn test_preflight_unsupported() {
        let mut driver = AtaSecureEraseDriver::new();
        let security = AtaSecurity::from_security_word(0);
        assert!(matches!(
            driver.preflight(&security, false),
            Err(EngineError::Unsupported(_))
        ));
        assert_eq!(driver.state(), EraseState::Failed);
    }

    #[test]
    fn test_preflight_frozen_blocks() {
        let mut driver = AtaSecureEraseDriver::new();
        let security =
            AtaSecurity::from_security_word(AtaSecurity::SUPPORTED | AtaSecurity::FROZEN);
        let err = driver.preflight(&security, false).unwrap_err();
        assert!(matches!(err, EngineError::Frozen(_)));
        assert!(err.to_string().contains("power-cycle"));
        assert_eq!(driver.state(), EraseState::Blocked);
    }

    #[test]
    fn test_preflight_locked_blocks() {
        let mut driver = AtaSecureEraseDriver::new();
        let security =
            AtaSecurity::from_security_word(AtaSecurity::SUPPORTED | AtaSecurity::LOCKED);
        assert!(matches!(
            driver.preflight(&security, false),
            Err(EngineError::Locked(_))
        ));
        assert_eq!(driver.state(), EraseState::Blocked);
    }

    #[test]
    fn test_enhanced_demotion() {
        let mut driver = AtaSecureEraseDriver::new();
        let security = AtaSecurity::from_security_word(AtaSecurity::SUPPORTED);
        // Enhanced requested but unsupported: demoted, not an error
        assert_eq!(driver.preflight(&security, true).unwrap(), false);
        assert_eq!(
            effective_method(&security, true),
            PurgeMethod::AtaSecureErase
        );

        let supported = supported_security();
        let mut driver = AtaSecureEraseDriver::new();
        assert_eq!(driver.preflight(&supported, true).unwrap(), true);
        assert_eq!(
            effective_method(&supported, true),
            PurgeMethod::AtaSecureEraseEnhanced
        );
    }

    #[test]
    fn test_command_sequence_and_frames() {
        let mut mock = MockAta::new();
        let mut driver = AtaSecureEraseDriver::new();
        driver.preflight(&supported_security(), false).unwrap();
        driver.execute(&mut mock, false).unwrap();
        assert_eq!(driver.state(), EraseState::Done);

        assert_eq!(mock.issued.len(), 3);
        let (op1, proto1, data1) = &mock.issued[0];
        assert_eq!(*op1, ATA_CMD_SECURITY_SET_PASSWORD);
        assert_eq!(*proto1, AtaProtocol::PioOut);
        // zeroed password block, user level
        assert!(data1.unwrap().iter().all(|&b| b == 0));

        let (op2, proto2, data2) = &mock.issued[1];
        assert_eq!(*op2, ATA_CMD_SECURITY_ERASE_PREPARE);
        assert_eq!(*proto2, AtaProtocol::NonData);
        assert!(data2.is_none());

        let (op3, _proto3, data3) = &mock.issued[2];
        assert_eq!(*op3, ATA_CMD_SECURITY_ERASE_UNIT);
        assert_eq!(data3.unwrap()[0], ERASE_MODE_NORMAL);
    }

    #[test]
    fn test_enhanced_bit_in_erase_unit_block() {
        let mut mock = MockAta::new();
        let mut driver = AtaSecureEraseDriver::new();
        let use_enhanced = driver.preflight(&supported_security(), true).unwrap();
        driver.execute(&mut mock, use_enhanced).unwrap();

        let (_, _, data) = &mock.issued[2];
        assert_eq!(data.unwrap()[0], ERASE_MODE_ENHANCED);
    }

    #[test]
    fn test_step_failure_stops_sequence() {
        let mut mock = MockAta::failing_at(ATA_CMD_SECURITY_ERASE_PREPARE);
        let mut driver = AtaSecureEraseDriver::new();
        driver.preflight(&supported_security(), false).unwrap();

        assert!(driver.execute(&mut mock, false).is_err());
        assert_eq!(driver.state(), EraseState::Failed);
        // ERASE UNIT never issued after the prepare failed
        assert_eq!(mock.issued.len(), 2);
    }

    #[test]
    fn test_frozen_result_shape() {
        // Route the Frozen engine error through the result shaper
        let err = EngineError::Frozen("BIOS security-frozen; power-cycle required".to_string());
        let result = PurgeResult::from_engine_error(
            "/dev/sda",
            crate::DeviceType::SataSsd,
            PurgeMethod::AtaSecureErase,
            &err,
        );
        assert_eq!(result.status, PurgeStatus::Blocked);
        assert!(result.supported);
        assert!(!result.executed);
        assert!(result.reason.contains("frozen"));
    }
}
