// Device access and identification
//
// - raw.rs: the RawDevice platform seam (open/read/write/ioctl/size)
// - probe.rs: read-only device classification (C1)
// - capability.rs: IDENTIFY / sanitize-status decoding (C2)
// - volumes.rs: volume lock + dismount before raw writes (C3)

pub mod capability;
pub mod probe;
pub mod raw;
pub mod volumes;

pub use capability::{CapabilityQuery, SanitizeStatusLog};
pub use probe::{DeviceProbe, DeviceProfile};
pub use raw::{open_device, AtaCommand, AtaProtocol, NvmeAdminCommand, OpenMode, RawDevice};
pub use volumes::{parse_physical_drive_index, VolumePreparer};
