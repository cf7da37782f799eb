//! Detect whether the host itself runs under a hypervisor.
//!
//! x86 guests see the `hypervisor` CPUID bit as a cpuinfo flag. On s390x every
//! LPAR is technically virtualized, so the signal is a `VM00` block in
//! `/proc/sysinfo`, which only a second-level guest (z/VM, KVM) has.

use std::io;
use std::path::Path;

use serde::Serialize;

use crate::cpuinfo::CpuDetails;

/// Default location of the s390x system information file.
pub const PROC_SYSINFO: &str = "/proc/sysinfo";

/// How a given architecture tells bare metal from a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VmmDetection {
    /// No reliable signal; always treated as bare metal.
    None,
    /// The named cpuinfo flag is set inside a guest.
    CpuFlag(&'static str),
    /// `/proc/sysinfo` lists a `VM00` level.
    SysInfo,
}

impl VmmDetection {
    /// Returns `Ok(true)` when running on a VMM.
    ///
    /// A missing sysinfo file means bare metal; other read errors are
    /// returned so the caller can decide how loud to be.
    pub fn detect(self, cpu: &CpuDetails, sysinfo: &Path) -> io::Result<bool> {
        match self {
            VmmDetection::None => Ok(false),
            VmmDetection::CpuFlag(flag) => Ok(cpu.has_flag(flag)),
            VmmDetection::SysInfo => match std::fs::read_to_string(sysinfo) {
                Ok(text) => Ok(sysinfo_has_vm_level(&text)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e),
            },
        }
    }
}

fn sysinfo_has_vm_level(text: &str) -> bool {
    text.lines().any(|line| line.trim_start().starts_with("VM00"))
}
