//! Fixture host for checker tests.
//!
//! Builds a fake cpuinfo, `sys/module` tree, device node and sysinfo under a
//! temporary directory and hands out a [`CheckConfig`] pointing at them.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use vmgate::CheckConfig;

pub const S390X_CPUINFO: &str = "\
vendor_id       : IBM/S390
# processors    : 2
features\t: esan3 zarch stfle msa ldisp eimm dfp edat etf3eh highgprs te vx sie
processor 0: version = FF,  identification = 3FC047,  machine = 2964
processor 1: version = FF,  identification = 3FC047,  machine = 2964
";

pub const INTEL_CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model name\t: Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz
flags\t\t: fpu vme de pse tsc msr pae vmx lm sse4_1 sse4_2
";

pub struct FakeHost {
    dir: TempDir,
}

impl FakeHost {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        fs::create_dir_all(dir.path().join("sys/module")).expect("create module root");
        Self { dir }
    }

    pub fn with_cpuinfo(self, text: &str) -> Self {
        fs::write(self.cpuinfo(), text).expect("write cpuinfo");
        self
    }

    pub fn with_module(self, name: &str) -> Self {
        fs::create_dir_all(self.module_root().join(name)).expect("create module");
        self
    }

    pub fn with_module_param(self, name: &str, parameter: &str, value: &str) -> Self {
        let params = self.module_root().join(name).join("parameters");
        fs::create_dir_all(&params).expect("create parameters");
        fs::write(params.join(parameter), format!("{value}\n")).expect("write parameter");
        self
    }

    /// A parameter entry that exists but can't be read as a file.
    pub fn with_unreadable_param(self, name: &str, parameter: &str) -> Self {
        let path = self.module_root().join(name).join("parameters").join(parameter);
        fs::create_dir_all(path).expect("create parameter dir");
        self
    }

    /// A regular file where the device should be.
    pub fn with_fake_device(self) -> Self {
        fs::write(self.device(), b"").expect("write device");
        self
    }

    pub fn with_sysinfo(self, text: &str) -> Self {
        fs::write(self.sysinfo(), text).expect("write sysinfo");
        self
    }

    pub fn cpuinfo(&self) -> PathBuf {
        self.dir.path().join("cpuinfo")
    }

    pub fn module_root(&self) -> PathBuf {
        self.dir.path().join("sys/module")
    }

    pub fn device(&self) -> PathBuf {
        self.dir.path().join("kvm")
    }

    pub fn sysinfo(&self) -> PathBuf {
        self.dir.path().join("sysinfo")
    }

    pub fn config(&self) -> CheckConfig {
        CheckConfig::builder()
            .cpuinfo(self.cpuinfo())
            .module_root(self.module_root())
            .device(self.device())
            .sysinfo(self.sysinfo())
            .build()
    }
}
