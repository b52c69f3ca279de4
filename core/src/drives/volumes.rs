//! Volume preparation before raw writes.
//!
//! Windows refuses writes to a physical drive while filesystems are mounted
//! on it, so every volume whose first disk extent lives on the target drive
//! is locked and dismounted first. Busy locks and dismounts are warnings,
//! not failures. On other platforms the kernel already enforces exclusion
//! through the exclusive device open, so preparation is a no-op.

use crate::EngineResult;

/// Recover the drive index from a `\\.\PhysicalDriveN` path.
pub fn parse_physical_drive_index(path: &str) -> Option<u32> {
    const MARKER: &str = "PhysicalDrive";
    let start = path.find(MARKER)? + MARKER.len();
    let digits: String = path[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub struct VolumePreparer;

impl VolumePreparer {
    /// Dismount all volumes hosted on the target physical device. Returns
    /// the warnings gathered along the way.
    #[cfg(windows)]
    pub fn prepare(device_path: &str) -> EngineResult<Vec<String>> {
        let Some(drive_index) = parse_physical_drive_index(device_path) else {
            return Ok(vec![format!(
                "{}: not a PhysicalDrive path, skipping volume dismount",
                device_path
            )]);
        };
        windows::dismount_volumes_on_drive(drive_index)
    }

    #[cfg(not(windows))]
    pub fn prepare(_device_path: &str) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use winapi::um::errhandlingapi::GetLastError;
    use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::ioapiset::DeviceIoControl;
    use winapi::um::winnt::{
        FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE, HANDLE,
    };

    const IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS: u32 = 0x0056_0000;
    const FSCTL_LOCK_VOLUME: u32 = 0x0009_0018;
    const FSCTL_DISMOUNT_VOLUME: u32 = 0x0009_0020;

    #[repr(C)]
    struct DiskExtent {
        disk_number: u32,
        starting_offset: i64,
        extent_length: i64,
    }

    #[repr(C)]
    struct VolumeDiskExtents {
        number_of_disk_extents: u32,
        extents: [DiskExtent; 1],
    }

    fn fsctl(handle: HANDLE, code: u32) -> bool {
        let mut returned = 0u32;
        unsafe {
            DeviceIoControl(
                handle,
                code,
                std::ptr::null_mut(),
                0,
                std::ptr::null_mut(),
                0,
                &mut returned,
                std::ptr::null_mut(),
            ) != 0
        }
    }

    pub(super) fn dismount_volumes_on_drive(drive_index: u32) -> EngineResult<Vec<String>> {
        let mut warnings = Vec::new();

        for letter in b'A'..=b'Z' {
            let volume_path = format!("\\\\.\\{}:", letter as char);
            let wide: Vec<u16> = OsStr::new(&volume_path)
                .encode_wide()
                .chain(Some(0))
                .collect();

            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    std::ptr::null_mut(),
                    OPEN_EXISTING,
                    0,
                    std::ptr::null_mut(),
                )
            };

            if handle == INVALID_HANDLE_VALUE {
                continue; // volume does not exist
            }

            let mut extents: VolumeDiskExtents = unsafe { std::mem::zeroed() };
            let mut returned = 0u32;
            let got_extents = unsafe {
                DeviceIoControl(
                    handle,
                    IOCTL_VOLUME_GET_VOLUME_DISK_EXTENTS,
                    std::ptr::null_mut(),
                    0,
                    &mut extents as *mut _ as *mut _,
                    std::mem::size_of::<VolumeDiskExtents>() as u32,
                    &mut returned,
                    std::ptr::null_mut(),
                )
            } != 0;

            if got_extents
                && extents.number_of_disk_extents > 0
                && extents.extents[0].disk_number == drive_index
            {
                if fsctl(handle, FSCTL_LOCK_VOLUME) {
                    if !fsctl(handle, FSCTL_DISMOUNT_VOLUME) {
                        warnings.push(format!(
                            "could not dismount {}: (error {})",
                            letter as char,
                            unsafe { GetLastError() }
                        ));
                    }
                } else {
                    warnings.push(format!(
                        "could not lock {}: (error {})",
                        letter as char,
                        unsafe { GetLastError() }
                    ));
                }
            }

            unsafe {
                CloseHandle(handle);
            }
        }

        Ok(warnings)
    }
}
