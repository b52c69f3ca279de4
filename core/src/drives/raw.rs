//! Raw block-device access behind a single platform seam.
//!
//! Drivers depend only on the [`RawDevice`] trait: open, positioned
//! read/write, flush, size, and the two vendor pass-through channels (ATA
//! taskfile commands and NVMe admin commands). One variant per OS lives
//! behind it; regular files are accepted as targets so the overwrite
//! pipeline can be exercised against disk images.

use crate::{EngineError, EngineResult};

/// ATA pass-through data transfer protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaProtocol {
    NonData,
    PioIn,
    PioOut,
}

/// One ATA taskfile command. The opcode lands in TaskFile[6]; data, when
/// present, is a single 512-byte sector.
#[derive(Debug, Clone)]
pub struct AtaCommand {
    pub opcode: u8,
    pub features: u8,
    pub sector_count: u8,
    pub protocol: AtaProtocol,
    pub timeout_secs: u32,
}

impl AtaCommand {
    pub fn data_in(opcode: u8, timeout_secs: u32) -> Self {
        Self {
            opcode,
            features: 0,
            sector_count: 1,
            protocol: AtaProtocol::PioIn,
            timeout_secs,
        }
    }

    pub fn data_out(opcode: u8, timeout_secs: u32) -> Self {
        Self {
            opcode,
            features: 0,
            sector_count: 1,
            protocol: AtaProtocol::PioOut,
            timeout_secs,
        }
    }

    pub fn non_data(opcode: u8, timeout_secs: u32) -> Self {
        Self {
            opcode,
            features: 0,
            sector_count: 0,
            protocol: AtaProtocol::NonData,
            timeout_secs,
        }
    }
}

/// One NVMe admin command (64-byte submission queue entry, minus the data
/// pointers which the OS fills in).
#[derive(Debug, Clone)]
pub struct NvmeAdminCommand {
    pub opcode: u8,
    pub nsid: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub data_len: u32,
    pub timeout_secs: u32,
}

/// How the device is opened. Probing is shared and read-only; writing takes
/// the device exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Probe,
    ExclusiveWrite,
}

/// Scoped raw-device handle. Released on drop on every exit path; owned by
/// exactly one driver at a time.
pub trait RawDevice: Send + std::fmt::Debug {
    fn path(&self) -> &str;

    /// Declared byte length of the device (file length for image targets).
    fn size(&self) -> u64;

    /// Logical sector size for write alignment; 1 for regular files, where
    /// writes are buffered and need no rounding.
    fn sector_size(&self) -> u64;

    fn is_block_device(&self) -> bool;

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> EngineResult<usize>;

    fn write_at(&mut self, buf: &[u8], offset: u64) -> EngineResult<usize>;

    fn flush(&mut self) -> EngineResult<()>;

    /// Issue an ATA taskfile command through the OS pass-through ioctl.
    /// `data_out`/`data_in` carry the single 512-byte data sector when the
    /// protocol requires one.
    fn ata_command(
        &mut self,
        cmd: &AtaCommand,
        data_out: Option<&[u8; 512]>,
        data_in: Option<&mut [u8; 512]>,
    ) -> EngineResult<()>;

    /// Issue an NVMe admin command; returns the command-specific completion
    /// dword.
    fn nvme_admin(
        &mut self,
        cmd: &NvmeAdminCommand,
        data_in: Option<&mut [u8]>,
    ) -> EngineResult<u32>;
}

/// Open `path` with the platform variant.
pub fn open_device(path: &str, mode: OpenMode) -> EngineResult<Box<dyn RawDevice>> {
    #[cfg(unix)]
    {
        Ok(Box::new(unix::UnixDevice::open(path, mode)?))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(windows::WindowsDevice::open(path, mode)?))
    }
}

// ============= UNIX IMPLEMENTATION =============

#[cfg(unix)]
pub mod unix {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::{FileExt, FileTypeExt, OpenOptionsExt};
    use std::os::unix::io::AsRawFd;

    /// Logical sector granularity used for direct-I/O alignment. 4 KiB is
    /// safe for both 512e and 4Kn drives.
    pub const BLOCK_SECTOR_SIZE: u64 = 4096;

    #[cfg(target_os = "linux")]
    const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;
    #[cfg(target_os = "linux")]
    const SG_IO: libc::c_ulong = 0x2285;
    #[cfg(target_os = "linux")]
    const NVME_IOCTL_ADMIN_CMD: libc::c_ulong = 0xC048_4E41;

    #[cfg(target_os = "linux")]
    const SG_DXFER_NONE: i32 = -1;
    #[cfg(target_os = "linux")]
    const SG_DXFER_TO_DEV: i32 = -2;
    #[cfg(target_os = "linux")]
    const SG_DXFER_FROM_DEV: i32 = -3;

    /// sg_io_hdr from <scsi/sg.h>
    #[cfg(target_os = "linux")]
    #[repr(C)]
    struct SgIoHdr {
        interface_id: i32,
        dxfer_direction: i32,
        cmd_len: u8,
        mx_sb_len: u8,
        iovec_count: u16,
        dxfer_len: u32,
        dxferp: *mut libc::c_void,
        cmdp: *mut u8,
        sbp: *mut u8,
        timeout: u32,
        flags: u32,
        pack_id: i32,
        usr_ptr: *mut libc::c_void,
        status: u8,
        masked_status: u8,
        msg_status: u8,
        sb_len_wr: u8,
        host_status: u16,
        driver_status: u16,
        resid: i32,
        duration: u32,
        info: u32,
    }

    /// nvme_passthru_cmd from <linux/nvme_ioctl.h>
    #[cfg(target_os = "linux")]
    #[repr(C)]
    struct NvmePassthruCmd {
        opcode: u8,
        flags: u8,
        rsvd1: u16,
        nsid: u32,
        cdw2: u32,
        cdw3: u32,
        metadata: u64,
        addr: u64,
        metadata_len: u32,
        data_len: u32,
        cdw10: u32,
        cdw11: u32,
        cdw12: u32,
        cdw13: u32,
        cdw14: u32,
        cdw15: u32,
        timeout_ms: u32,
        result: u32,
    }

    #[derive(Debug)]
    pub struct UnixDevice {
        file: File,
        path: String,
        size: u64,
        is_block: bool,
    }

    impl UnixDevice {
        pub fn open(path: &str, mode: OpenMode) -> EngineResult<Self> {
            let meta = std::fs::metadata(path)
                .map_err(|e| EngineError::OpenFailed(format!("{}: {}", path, e)))?;
            let is_block = meta.file_type().is_block_device();

            let mut opts = OpenOptions::new();
            match mode {
                OpenMode::Probe => {
                    opts.read(true);
                }
                OpenMode::ExclusiveWrite => {
                    opts.read(true).write(true);
                    if is_block {
                        // O_EXCL on a block device makes the kernel refuse
                        // the open while any filesystem holds the device;
                        // O_DIRECT | O_SYNC gives write-through semantics.
                        #[cfg(target_os = "linux")]
                        opts.custom_flags(libc::O_DIRECT | libc::O_SYNC | libc::O_EXCL);
                        #[cfg(not(target_os = "linux"))]
                        opts.custom_flags(libc::O_SYNC | libc::O_EXCL);
                    }
                }
            }

            let file = opts
                .open(path)
                .map_err(|e| EngineError::OpenFailed(format!("{}: {}", path, e)))?;

            let size = if is_block {
                Self::block_device_size(&file, path)?
            } else {
                meta.len()
            };

            Ok(Self {
                file,
                path: path.to_string(),
                size,
                is_block,
            })
        }

        #[cfg(target_os = "linux")]
        fn block_device_size(file: &File, path: &str) -> EngineResult<u64> {
            let mut size: u64 = 0;
            let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
            if rc != 0 {
                return Err(EngineError::OpenFailed(format!(
                    "{}: BLKGETSIZE64 failed: {}",
                    path,
                    std::io::Error::last_os_error()
                )));
            }
            Ok(size)
        }

        #[cfg(not(target_os = "linux"))]
        fn block_device_size(_file: &File, path: &str) -> EngineResult<u64> {
            Err(EngineError::Unsupported(format!(
                "{}: block device sizing not implemented on this platform",
                path
            )))
        }
    }

    impl RawDevice for UnixDevice {
        fn path(&self) -> &str {
            &self.path
        }

        fn size(&self) -> u64 {
            self.size
        }

        fn sector_size(&self) -> u64 {
            if self.is_block {
                BLOCK_SECTOR_SIZE
            } else {
                1
            }
        }

        fn is_block_device(&self) -> bool {
            self.is_block
        }

        fn read_at(&mut self, buf: &mut [u8], offset: u64) -> EngineResult<usize> {
            self.file.read_at(buf, offset).map_err(EngineError::from)
        }

        fn write_at(&mut self, buf: &[u8], offset: u64) -> EngineResult<usize> {
            self.file.write_at(buf, offset).map_err(EngineError::from)
        }

        fn flush(&mut self) -> EngineResult<()> {
            self.file.sync_all().map_err(EngineError::from)
        }

        #[cfg(target_os = "linux")]
        fn ata_command(
            &mut self,
            cmd: &AtaCommand,
            data_out: Option<&[u8; 512]>,
            data_in: Option<&mut [u8; 512]>,
        ) -> EngineResult<()> {
            if !self.is_block {
                return Err(EngineError::Unsupported(
                    "ATA pass-through requires a block device".to_string(),
                ));
            }

            // ATA-16 pass-through CDB (SAT, opcode 0x85)
            let mut cdb = [0u8; 16];
            cdb[0] = 0x85;
            cdb[1] = match cmd.protocol {
                AtaProtocol::NonData => 3 << 1,
                AtaProtocol::PioIn => 4 << 1,
                AtaProtocol::PioOut => 5 << 1,
            };
            // t_length = sector count field, byt_blok = blocks, t_dir per
            // transfer direction
            cdb[2] = match cmd.protocol {
                AtaProtocol::NonData => 0x00,
                AtaProtocol::PioIn => 0x0E,
                AtaProtocol::PioOut => 0x06,
            };
            cdb[4] = cmd.features;
            cdb[6] = cmd.sector_count;
            cdb[14] = cmd.opcode;

            let mut sense = [0u8; 32];
            let (direction, dxferp, dxfer_len): (i32, *mut libc::c_void, u32) =
                match cmd.protocol {
                    AtaProtocol::NonData => (SG_DXFER_NONE, std::ptr::null_mut(), 0),
                    AtaProtocol::PioIn => {
                        let buf = data_in.ok_or_else(|| {
                            EngineError::CommandFailed("PIO-in command without buffer".into())
                        })?;
                        (
                            SG_DXFER_FROM_DEV,
                            buf.as_mut_ptr() as *mut libc::c_void,
                            512,
                        )
                    }
                    AtaProtocol::PioOut => {
                        let buf = data_out.ok_or_else(|| {
                            EngineError::CommandFailed("PIO-out command without buffer".into())
                        })?;
                        (SG_DXFER_TO_DEV, buf.as_ptr() as *mut libc::c_void, 512)
                    }
                };

            let mut hdr = SgIoHdr {
                interface_id: 'S' as i32,
                dxfer_direction: direction,
                cmd_len: cdb.len() as u8,
                mx_sb_len: sense.len() as u8,
                iovec_count: 0,
                dxfer_len,
                dxferp,
                cmdp: cdb.as_mut_ptr(),
                sbp: sense.as_mut_ptr(),
                timeout: cmd.timeout_secs.saturating_mul(1000),
                flags: 0,
                pack_id: 0,
                usr_ptr: std::ptr::null_mut(),
                status: 0,
                masked_status: 0,
                msg_status: 0,
                sb_len_wr: 0,
                host_status: 0,
                driver_status: 0,
                resid: 0,
                duration: 0,
                info: 0,
            };

            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), SG_IO, &mut hdr) };
            if rc != 0 {
                return Err(EngineError::Io(std::io::Error::last_os_error()));
            }

            if hdr.status != 0 || hdr.host_status != 0 || hdr.driver_status != 0 {
                return Err(EngineError::CommandFailed(format!(
                    "ATA opcode 0x{:02X}: status=0x{:02X} host=0x{:04X} driver=0x{:04X}",
                    cmd.opcode, hdr.status, hdr.host_status, hdr.driver_status
                )));
            }

            Ok(())
        }

        #[cfg(not(target_os = "linux"))]
        fn ata_command(
            &mut self,
            _cmd: &AtaCommand,
            _data_out: Option<&[u8; 512]>,
            _data_in: Option<&mut [u8; 512]>,
        ) -> EngineResult<()> {
            Err(EngineError::Unsupported(
                "ATA pass-through not implemented on this platform".to_string(),
            ))
        }

        #[cfg(target_os = "linux")]
        fn nvme_admin(
            &mut self,
            cmd: &NvmeAdminCommand,
            data_in: Option<&mut [u8]>,
        ) -> EngineResult<u32> {
            if !self.is_block {
                return Err(EngineError::Unsupported(
                    "NVMe admin commands require a block device".to_string(),
                ));
            }

            let (addr, data_len) = match data_in {
                Some(buf) => {
                    if (buf.len() as u32) < cmd.data_len {
                        return Err(EngineError::CommandFailed(
                            "NVMe data buffer shorter than declared transfer".into(),
                        ));
                    }
                    (buf.as_mut_ptr() as u64, cmd.data_len)
                }
                None => (0u64, 0u32),
            };

            let mut passthru = NvmePassthruCmd {
                opcode: cmd.opcode,
                flags: 0,
                rsvd1: 0,
                nsid: cmd.nsid,
                cdw2: 0,
                cdw3: 0,
                metadata: 0,
                addr,
                metadata_len: 0,
                data_len,
                cdw10: cmd.cdw10,
                cdw11: cmd.cdw11,
                cdw12: 0,
                cdw13: 0,
                cdw14: 0,
                cdw15: 0,
                timeout_ms: cmd.timeout_secs.saturating_mul(1000),
                result: 0,
            };

            let rc =
                unsafe { libc::ioctl(self.file.as_raw_fd(), NVME_IOCTL_ADMIN_CMD, &mut passthru) };
            if rc < 0 {
                return Err(EngineError::Io(std::io::Error::last_os_error()));
            }
            if rc > 0 {
                // Positive return carries the NVMe completion status code
                return Err(EngineError::CommandFailed(format!(
                    "NVMe opcode 0x{:02X}: controller status 0x{:X}",
                    cmd.opcode, rc
                )));
            }

            Ok(passthru.result)
        }

        #[cfg(not(target_os = "linux"))]
        fn nvme_admin(
            &mut self,
            _cmd: &NvmeAdminCommand,
            _data_in: Option<&mut [u8]>,
        ) -> EngineResult<u32> {
            Err(EngineError::Unsupported(
                "NVMe admin commands not implemented on this platform".to_string(),
            ))
        }
    }
}

// ============= WINDOWS IMPLEMENTATION =============

#[cfg(windows)]
pub mod windows {
    use super::*;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::minwinbase::OVERLAPPED;
    use winapi::um::winbase::{FILE_FLAG_NO_BUFFERING, FILE_FLAG_WRITE_THROUGH};
    use winapi::um::winnt::{
        FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE,
    };

    pub const BLOCK_SECTOR_SIZE: u64 = 4096;

    const IOCTL_DISK_GET_LENGTH_INFO: u32 = 0x0007_405C;
    const IOCTL_STORAGE_QUERY_PROPERTY: u32 = 0x002D_1400;
    const IOCTL_ATA_PASS_THROUGH: u32 = 0x0004_D02C;
    const IOCTL_STORAGE_PROTOCOL_COMMAND: u32 = 0x002D_D3C0;

    const ATA_FLAGS_DATA_IN: u16 = 0x02;
    const ATA_FLAGS_DATA_OUT: u16 = 0x04;

    const PROTOCOL_TYPE_NVME: u32 = 3;
    const STORAGE_PROTOCOL_STRUCTURE_VERSION: u32 = 1;
    const STORAGE_PROTOCOL_COMMAND_LENGTH_NVME: u32 = 0x40;
    const STORAGE_PROTOCOL_COMMAND_FLAG_ADAPTER_REQUEST: u32 = 0x8000_0000;
    const STORAGE_PROTOCOL_SPECIFIC_NVME_ADMIN_COMMAND: u32 = 0x01;
    const NVME_ERROR_INFO_LOG_SIZE: usize = 64;

    #[repr(C)]
    struct GetLengthInformation {
        length: i64,
    }

    #[repr(C)]
    pub(crate) struct StoragePropertyQuery {
        pub property_id: u32,
        pub query_type: u32,
        pub additional_parameters: [u8; 1],
    }

    /// STORAGE_ADAPTER_DESCRIPTOR (BusType is a BYTE here)
    #[repr(C)]
    pub(crate) struct StorageAdapterDescriptor {
        pub version: u32,
        pub size: u32,
        pub maximum_transfer_length: u32,
        pub maximum_physical_pages: u32,
        pub alignment_mask: u32,
        pub adapter_uses_pio: u8,
        pub adapter_scans_down: u8,
        pub command_queueing: u8,
        pub accelerated_transfer: u8,
        pub bus_type: u8,
        pub bus_major_version: u16,
        pub bus_minor_version: u16,
        pub srb_type: u8,
        pub address_type: u8,
    }

    /// DEVICE_SEEK_PENALTY_DESCRIPTOR
    #[repr(C)]
    pub(crate) struct DeviceSeekPenaltyDescriptor {
        pub version: u32,
        pub size: u32,
        pub incurs_seek_penalty: u8,
    }

    /// ATA_PASS_THROUGH_EX from <ntddscsi.h>
    #[repr(C)]
    struct AtaPassThroughEx {
        length: u16,
        ata_flags: u16,
        path_id: u8,
        target_id: u8,
        lun: u8,
        reserved_as_uchar: u8,
        data_transfer_length: u32,
        timeout_value: u32,
        reserved_as_ulong: u32,
        data_buffer_offset: usize,
        previous_task_file: [u8; 8],
        current_task_file: [u8; 8],
    }

    #[repr(C)]
    struct AtaPassThroughWithBuffer {
        apt: AtaPassThroughEx,
        buffer: [u8; 512],
    }

    /// STORAGE_PROTOCOL_COMMAND header from <winioctl.h>
    #[repr(C)]
    struct StorageProtocolCommand {
        version: u32,
        length: u32,
        protocol_type: u32,
        flags: u32,
        return_status: u32,
        error_code: u32,
        command_length: u32,
        error_info_length: u32,
        data_to_device_transfer_length: u32,
        data_from_device_transfer_length: u32,
        timeout_value: u32,
        error_info_offset: u32,
        data_to_device_buffer_offset: u32,
        data_from_device_buffer_offset: u32,
        command_specific: u32,
        reserved0: u32,
        fixed_protocol_return_data: u32,
        reserved1: [u32; 3],
    }

    /// 64-byte NVMe submission queue entry
    #[repr(C)]
    struct NvmeCommand {
        cdw0: u32,
        nsid: u32,
        cdw2: u32,
        cdw3: u32,
        mptr: u64,
        prp1: u64,
        prp2: u64,
        cdw10: u32,
        cdw11: u32,
        cdw12: u32,
        cdw13: u32,
        cdw14: u32,
        cdw15: u32,
    }

    fn wide(path: &str) -> Vec<u16> {
        OsStr::new(path).encode_wide().chain(Some(0)).collect()
    }

    fn last_error() -> EngineError {
        let code = unsafe { GetLastError() };
        EngineError::Io(std::io::Error::from_raw_os_error(code as i32))
    }

    #[derive(Debug)]
    pub struct WindowsDevice {
        handle: HANDLE,
        path: String,
        size: u64,
        is_physical_drive: bool,
    }

    // HANDLE is only touched from the owning driver
    unsafe impl Send for WindowsDevice {}

    impl WindowsDevice {
        pub fn open(path: &str, mode: OpenMode) -> EngineResult<Self> {
            let is_physical_drive = path.starts_with("\\\\.\\");
            let wide_path = wide(path);

            let (access, share, flags) = match mode {
                OpenMode::Probe => (
                    GENERIC_READ,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    0,
                ),
                OpenMode::ExclusiveWrite => (
                    GENERIC_READ | GENERIC_WRITE,
                    0,
                    // Unbuffered write-through applies to raw drives only;
                    // image-file targets need byte-granular writes
                    if is_physical_drive {
                        FILE_FLAG_NO_BUFFERING | FILE_FLAG_WRITE_THROUGH
                    } else {
                        0
                    },
                ),
            };

            let handle = unsafe {
                CreateFileW(
                    wide_path.as_ptr(),
                    access,
                    share,
                    std::ptr::null_mut(),
                    OPEN_EXISTING,
                    flags,
                    std::ptr::null_mut(),
                )
            };

            if handle == INVALID_HANDLE_VALUE {
                let code = unsafe { GetLastError() };
                return Err(EngineError::OpenFailed(format!(
                    "{}: Win32 error {}",
                    path, code
                )));
            }

            let size = if is_physical_drive {
                let mut info = GetLengthInformation { length: 0 };
                let mut returned = 0u32;
                let ok = unsafe {
                    DeviceIoControl(
                        handle,
                        IOCTL_DISK_GET_LENGTH_INFO,
                        std::ptr::null_mut(),
                        0,
                        &mut info as *mut _ as *mut _,
                        std::mem::size_of::<GetLengthInformation>() as u32,
                        &mut returned,
                        std::ptr::null_mut(),
                    )
                };
                if ok == 0 {
                    unsafe { CloseHandle(handle) };
                    let code = unsafe { GetLastError() };
                    return Err(EngineError::OpenFailed(format!(
                        "{}: IOCTL_DISK_GET_LENGTH_INFO failed: {}",
                        path, code
                    )));
                }
                info.length as u64
            } else {
                std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
            };

            Ok(Self {
                handle,
                path: path.to_string(),
                size,
                is_physical_drive,
            })
        }

        fn ioctl(
            &self,
            code: u32,
            input: *mut std::ffi::c_void,
            input_len: u32,
            output: *mut std::ffi::c_void,
            output_len: u32,
        ) -> EngineResult<u32> {
            let mut returned = 0u32;
            let ok = unsafe {
                DeviceIoControl(
                    self.handle,
                    code,
                    input,
                    input_len,
                    output,
                    output_len,
                    &mut returned,
                    std::ptr::null_mut(),
                )
            };
            if ok == 0 {
                let err = unsafe { GetLastError() };
                return Err(EngineError::Io(std::io::Error::from_raw_os_error(
                    err as i32,
                )));
            }
            Ok(returned)
        }

        /// StorageAdapterProperty / StorageDeviceSeekPenaltyProperty query
        /// used by the probe.
        pub(crate) fn query_property<T>(
            &self,
            property_id: u32,
            descriptor: &mut T,
        ) -> EngineResult<()> {
            let mut query = StoragePropertyQuery {
                property_id,
                query_type: 0, // PropertyStandardQuery
                additional_parameters: [0],
            };
            self.ioctl(
                IOCTL_STORAGE_QUERY_PROPERTY,
                &mut query as *mut _ as *mut _,
                std::mem::size_of::<StoragePropertyQuery>() as u32,
                descriptor as *mut T as *mut _,
                std::mem::size_of::<T>() as u32,
            )?;
            Ok(())
        }
    }

    impl RawDevice for WindowsDevice {
        fn path(&self) -> &str {
            &self.path
        }

        fn size(&self) -> u64 {
            self.size
        }

        fn sector_size(&self) -> u64 {
            if self.is_physical_drive {
                BLOCK_SECTOR_SIZE
            } else {
                1
            }
        }

        fn is_block_device(&self) -> bool {
            self.is_physical_drive
        }

        fn read_at(&mut self, buf: &mut [u8], offset: u64) -> EngineResult<usize> {
            use winapi::um::fileapi::ReadFile;

            let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
            unsafe {
                overlapped.u.s_mut().Offset = (offset & 0xFFFF_FFFF) as u32;
                overlapped.u.s_mut().OffsetHigh = (offset >> 32) as u32;
            }
            let mut read = 0u32;
            let ok = unsafe {
                ReadFile(
                    self.handle,
                    buf.as_mut_ptr() as *mut _,
                    buf.len() as u32,
                    &mut read,
                    &mut overlapped,
                )
            };
            if ok == 0 {
                return Err(last_error());
            }
            Ok(read as usize)
        }

        fn write_at(&mut self, buf: &[u8], offset: u64) -> EngineResult<usize> {
            use winapi::um::fileapi::WriteFile;

            let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
            unsafe {
                overlapped.u.s_mut().Offset = (offset & 0xFFFF_FFFF) as u32;
                overlapped.u.s_mut().OffsetHigh = (offset >> 32) as u32;
            }
            let mut written = 0u32;
            let ok = unsafe {
                WriteFile(
                    self.handle,
                    buf.as_ptr() as *const _,
                    buf.len() as u32,
                    &mut written,
                    &mut overlapped,
                )
            };
            if ok == 0 {
                return Err(EngineError::Io(std::io::Error::last_os_error()));
            }
            Ok(written as usize)
        }

        fn flush(&mut self) -> EngineResult<()> {
            use winapi::um::fileapi::FlushFileBuffers;

            let ok = unsafe { FlushFileBuffers(self.handle) };
            if ok == 0 {
                return Err(last_error());
            }
            Ok(())
        }

        fn ata_command(
            &mut self,
            cmd: &AtaCommand,
            data_out: Option<&[u8; 512]>,
            data_in: Option<&mut [u8; 512]>,
        ) -> EngineResult<()> {
            let mut packet: AtaPassThroughWithBuffer = unsafe { std::mem::zeroed() };
            packet.apt.length = std::mem::size_of::<AtaPassThroughEx>() as u16;
            packet.apt.timeout_value = cmd.timeout_secs;
            packet.apt.data_buffer_offset = std::mem::size_of::<AtaPassThroughEx>();
            packet.apt.current_task_file[0] = cmd.features;
            packet.apt.current_task_file[1] = cmd.sector_count;
            packet.apt.current_task_file[6] = cmd.opcode;

            match cmd.protocol {
                AtaProtocol::NonData => {
                    packet.apt.data_transfer_length = 0;
                    packet.apt.data_buffer_offset = 0;
                }
                AtaProtocol::PioIn => {
                    packet.apt.ata_flags = ATA_FLAGS_DATA_IN;
                    packet.apt.data_transfer_length = 512;
                }
                AtaProtocol::PioOut => {
                    packet.apt.ata_flags = ATA_FLAGS_DATA_OUT;
                    packet.apt.data_transfer_length = 512;
                    if let Some(data) = data_out {
                        packet.buffer.copy_from_slice(data);
                    }
                }
            }

            let len = std::mem::size_of::<AtaPassThroughWithBuffer>() as u32;
            self.ioctl(
                IOCTL_ATA_PASS_THROUGH,
                &mut packet as *mut _ as *mut _,
                len,
                &mut packet as *mut _ as *mut _,
                len,
            )
            .map_err(|e| match e {
                EngineError::Io(io) => EngineError::CommandFailed(format!(
                    "ATA opcode 0x{:02X}: {}",
                    cmd.opcode, io
                )),
                other => other,
            })?;

            if let Some(data) = data_in {
                data.copy_from_slice(&packet.buffer);
            }

            Ok(())
        }

        fn nvme_admin(
            &mut self,
            cmd: &NvmeAdminCommand,
            data_in: Option<&mut [u8]>,
        ) -> EngineResult<u32> {
            let data_len = cmd.data_len as usize;
            let header = std::mem::size_of::<StorageProtocolCommand>();
            let command_offset = header;
            let error_offset = header + 64; // command slot is 64 bytes
            let data_offset = error_offset + NVME_ERROR_INFO_LOG_SIZE;
            let total = data_offset + data_len;

            let mut packet = vec![0u8; total];

            let spc = StorageProtocolCommand {
                version: STORAGE_PROTOCOL_STRUCTURE_VERSION,
                length: header as u32,
                protocol_type: PROTOCOL_TYPE_NVME,
                flags: STORAGE_PROTOCOL_COMMAND_FLAG_ADAPTER_REQUEST,
                return_status: 0,
                error_code: 0,
                command_length: STORAGE_PROTOCOL_COMMAND_LENGTH_NVME,
                error_info_length: NVME_ERROR_INFO_LOG_SIZE as u32,
                data_to_device_transfer_length: 0,
                data_from_device_transfer_length: cmd.data_len,
                timeout_value: cmd.timeout_secs,
                error_info_offset: error_offset as u32,
                data_to_device_buffer_offset: 0,
                data_from_device_buffer_offset: if data_len > 0 { data_offset as u32 } else { 0 },
                command_specific: STORAGE_PROTOCOL_SPECIFIC_NVME_ADMIN_COMMAND,
                reserved0: 0,
                fixed_protocol_return_data: 0,
                reserved1: [0; 3],
            };

            let nvme = NvmeCommand {
                cdw0: cmd.opcode as u32,
                nsid: cmd.nsid,
                cdw2: 0,
                cdw3: 0,
                mptr: 0,
                prp1: 0,
                prp2: 0,
                cdw10: cmd.cdw10,
                cdw11: cmd.cdw11,
                cdw12: 0,
                cdw13: 0,
                cdw14: 0,
                cdw15: 0,
            };

            unsafe {
                std::ptr::copy_nonoverlapping(
                    &spc as *const _ as *const u8,
                    packet.as_mut_ptr(),
                    header,
                );
                std::ptr::copy_nonoverlapping(
                    &nvme as *const _ as *const u8,
                    packet.as_mut_ptr().add(command_offset),
                    std::mem::size_of::<NvmeCommand>(),
                );
            }

            self.ioctl(
                IOCTL_STORAGE_PROTOCOL_COMMAND,
                packet.as_mut_ptr() as *mut _,
                total as u32,
                packet.as_mut_ptr() as *mut _,
                total as u32,
            )
            .map_err(|e| match e {
                EngineError::Io(io) => EngineError::CommandFailed(format!(
                    "NVMe opcode 0x{:02X}: {}",
                    cmd.opcode, io
                )),
                other => other,
            })?;

            if let Some(buf) = data_in {
                let n = buf.len().min(data_len);
                buf[..n].copy_from_slice(&packet[data_offset..data_offset + n]);
            }

            Ok(0)
        }
    }

    impl Drop for WindowsDevice {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}
