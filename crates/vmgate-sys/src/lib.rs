//! Host probes for vmgate.
//!
//! Everything in this crate only observes the host; nothing is written and
//! nothing is cached. Each probe takes its path explicitly so callers (and
//! tests) can point it at a fixture tree.
//!
//! ## Modules
//!
//! - **cpuinfo** - Parse `/proc/cpuinfo` into vendor, model, flags, attributes
//! - **module** - Kernel module registry (`/sys/module`)
//! - **device** - Hypervisor device probe and KVM queries (`/dev/kvm`)
//! - **vmm** - Detect whether the host is itself a guest
//! - **host** - Kernel release and architecture
//!
//! # Safety
//!
//! The KVM queries are raw `ioctl` calls on an owned descriptor.

pub mod cpuinfo;
pub mod device;
pub mod host;
pub mod module;
pub mod vmm;

pub use cpuinfo::{CpuDetails, CpuFields, ParseError};
pub use device::{DeviceError, Kvm, ProbeResult, device_usable, probe_device};
pub use host::HostInfo;
pub use module::{ModuleInspectionError, ModuleRegistry};
pub use vmm::VmmDetection;

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
