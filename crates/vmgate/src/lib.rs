//! vmgate: can this host run VM-based containers?
//!
//! Checks CPU virtualization flags and identity, the kernel modules a
//! lightweight VM sandbox needs (with their parameters), and access to the
//! hypervisor device. The result is a single verdict listing every unmet
//! requirement, so an operator can fix them all before running again.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vmgate::{CheckConfig, host_is_vm_container_capable};
//!
//! let verdict = host_is_vm_container_capable(CheckConfig::default())?;
//! if !verdict.capable {
//!     for line in verdict.failure_lines() {
//!         eprintln!("{line}");
//!     }
//! }
//! ```
//!
//! ## Explicit policy and fixture paths
//!
//! ```ignore
//! use vmgate::{CheckConfig, Checker, policy};
//!
//! let checker = Checker::new(
//!     CheckConfig::builder()
//!         .cpuinfo("/tmp/fixture/cpuinfo")
//!         .module_root("/tmp/fixture/sys/module")
//!         .device("/tmp/fixture/kvm")
//!         .build(),
//! );
//! let policy = policy::lookup("s390x", None).unwrap();
//! let verdict = checker.evaluate(policy)?;
//! ```
//!
//! ## Requirements checked
//!
//! | Check | Source |
//! |-------|--------|
//! | CPU flags and attributes | `/proc/cpuinfo` |
//! | Kernel modules and parameters | `/sys/module` |
//! | Running on a VMM | cpuinfo `hypervisor` flag, `/proc/sysinfo` on s390x |
//! | Hypervisor device, KVM extensions | `/dev/kvm` |

mod checker;
mod config;
mod error;
pub mod policy;
mod verdict;

pub use checker::{Checker, host_is_vm_container_capable};
pub use config::{CheckConfig, CheckConfigBuilder};
pub use error::{CapabilityCheckError, Error, Result};
pub use policy::{ParamHandler, RequirementPolicy};
pub use verdict::{CapabilityVerdict, Failure, Found};

// Re-export the host probes for callers that only need one of them
pub use vmgate_sys::{CpuDetails, CpuFields, DeviceError, ParseError, ProbeResult, VmmDetection};
