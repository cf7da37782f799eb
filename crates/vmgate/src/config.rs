//! Checker configuration.
//!
//! Every host path the checker touches lives here, so tests and embedders can
//! point a [`Checker`](crate::Checker) at a fixture tree without any global
//! state.

use std::path::PathBuf;

use vmgate_sys::cpuinfo::PROC_CPUINFO;
use vmgate_sys::device::DEV_KVM;
use vmgate_sys::module::SYS_MODULE;
use vmgate_sys::vmm::PROC_SYSINFO;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckConfig {
    pub cpuinfo: PathBuf,
    pub module_root: PathBuf,
    pub device: PathBuf,
    pub sysinfo: PathBuf,
    /// Report every module parameter mismatch, even ones the policy would
    /// downgrade to a warning.
    pub strict: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            cpuinfo: PathBuf::from(PROC_CPUINFO),
            module_root: PathBuf::from(SYS_MODULE),
            device: PathBuf::from(DEV_KVM),
            sysinfo: PathBuf::from(PROC_SYSINFO),
            strict: false,
        }
    }
}

impl CheckConfig {
    pub fn builder() -> CheckConfigBuilder {
        CheckConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct CheckConfigBuilder {
    config: CheckConfig,
}

impl CheckConfigBuilder {
    pub fn cpuinfo(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cpuinfo = path.into();
        self
    }

    pub fn module_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.module_root = path.into();
        self
    }

    pub fn device(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.device = path.into();
        self
    }

    pub fn sysinfo(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sysinfo = path.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn build(self) -> CheckConfig {
        self.config
    }
}
