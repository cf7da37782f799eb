//! Hypervisor device probe.
//!
//! A device is usable when it can be opened read-write and exclusively, and
//! what was opened really is a character device. The handle is dropped as
//! soon as the probe returns; the probe never reserves the device.
//!
//! [`Kvm`] keeps the handle open for the few KVM queries the checker needs
//! (`KVM_GET_API_VERSION`, `KVM_CHECK_EXTENSION`).

use std::os::fd::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use rustix::fs::{FileType, Mode, OFlags};
use rustix::io::Errno;
use serde::Serialize;
use thiserror::Error;

use crate::last_errno;

/// Default hypervisor device.
pub const DEV_KVM: &str = "/dev/kvm";

/// API version every KVM since 2.6.22 reports.
pub const KVM_API_VERSION: i32 = 12;

// _IO(KVMIO, 0x00) and _IO(KVMIO, 0x03)
const KVM_GET_API_VERSION: u64 = 0xAE00;
const KVM_CHECK_EXTENSION: u64 = 0xAE03;

/// Coarse classification of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeResult {
    Usable,
    NotPresent,
    PermissionDenied,
    Busy,
    /// Exists but can't be used as a device.
    Unusable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("no permission to open device {}", .0.display())]
    NotPermitted(PathBuf),

    #[error("device {} is busy", .0.display())]
    Busy(PathBuf),

    #[error("{} is not a character device", .0.display())]
    NotCharDevice(PathBuf),

    #[error("cannot open device {}: {source}", .path.display())]
    Open { path: PathBuf, source: Errno },
}

impl DeviceError {
    pub fn probe_result(&self) -> ProbeResult {
        match self {
            DeviceError::NotFound(_) => ProbeResult::NotPresent,
            DeviceError::NotPermitted(_) => ProbeResult::PermissionDenied,
            DeviceError::Busy(_) => ProbeResult::Busy,
            DeviceError::NotCharDevice(_) | DeviceError::Open { .. } => ProbeResult::Unusable,
        }
    }

    fn from_errno(path: &Path, errno: Errno) -> Self {
        let path = path.to_path_buf();
        match errno {
            Errno::NOENT => DeviceError::NotFound(path),
            Errno::ACCESS | Errno::PERM => DeviceError::NotPermitted(path),
            Errno::BUSY => DeviceError::Busy(path),
            source => DeviceError::Open { path, source },
        }
    }
}

/// Check that `path` can be opened as a hypervisor device.
pub fn device_usable(path: &Path) -> Result<(), DeviceError> {
    open_device(path).map(drop)
}

/// Same as [`device_usable`], folded into a [`ProbeResult`].
pub fn probe_device(path: &Path) -> ProbeResult {
    match device_usable(path) {
        Ok(()) => ProbeResult::Usable,
        Err(e) => e.probe_result(),
    }
}

fn open_device(path: &Path) -> Result<OwnedFd, DeviceError> {
    let fd = rustix::fs::open(
        path,
        OFlags::RDWR | OFlags::EXCL | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| DeviceError::from_errno(path, e))?;

    let stat = rustix::fs::fstat(&fd).map_err(|e| DeviceError::from_errno(path, e))?;
    if FileType::from_raw_mode(stat.st_mode as _) != FileType::CharacterDevice {
        return Err(DeviceError::NotCharDevice(path.to_path_buf()));
    }

    Ok(fd)
}

/// Open handle on a KVM device.
#[derive(Debug)]
pub struct Kvm {
    fd: OwnedFd,
}

impl Kvm {
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        open_device(path).map(|fd| Self { fd })
    }

    pub fn api_version(&self) -> Result<i32, Errno> {
        self.ioctl(KVM_GET_API_VERSION, 0)
    }

    /// Whether the kernel supports capability `cap` (a `KVM_CAP_*` number).
    pub fn check_extension(&self, cap: u32) -> Result<bool, Errno> {
        self.ioctl(KVM_CHECK_EXTENSION, cap as libc::c_ulong)
            .map(|ret| ret > 0)
    }

    fn ioctl(&self, request: u64, arg: libc::c_ulong) -> Result<i32, Errno> {
        // SAFETY: both requests take an integer argument and touch no memory.
        let ret = unsafe { libc::ioctl(self.fd.as_raw_fd(), request as _, arg) };
        if ret < 0 {
            return Err(last_errno());
        }
        Ok(ret)
    }
}
