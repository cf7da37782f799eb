//! Result of one capability check.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use vmgate_sys::{CpuDetails, HostInfo, ProbeResult};

/// One unmet requirement.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("CPU flag {flag} ({description}) not found")]
    MissingCpuFlag { flag: String, description: String },

    #[error("CPU attribute {attribute} ({description}) not found")]
    MissingCpuAttribute {
        attribute: String,
        description: String,
    },

    #[error("kernel module {module} ({description}) not loaded")]
    ModuleNotLoaded { module: String, description: String },

    #[error("kernel module {module}: {reason}")]
    ModuleInspection { module: String, reason: String },

    #[error(
        "kernel module {module} parameter {parameter} is {}, expected {expected}",
        .actual.as_deref().unwrap_or("unset")
    )]
    ModuleParameter {
        module: String,
        parameter: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("{reason}")]
    Device {
        path: PathBuf,
        result: ProbeResult,
        reason: String,
    },

    #[error("KVM API version {found}, expected {expected}")]
    KvmApiVersion { found: i32, expected: i32 },

    #[error("KVM extension {name} ({id}) not supported")]
    KvmExtension { name: String, id: u32 },

    #[error("KVM query {query} failed: {reason}")]
    KvmQuery { query: String, reason: String },
}

/// One requirement the host meets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Found {
    CpuFlag { flag: String, description: String },
    CpuAttribute {
        attribute: String,
        description: String,
    },
    Module { module: String, description: String },
    ModuleParameter {
        module: String,
        parameter: String,
        value: String,
    },
    Device { path: PathBuf },
    KvmApiVersion { version: i32 },
    KvmExtension { name: String, id: u32 },
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Found::CpuFlag { flag, description } => {
                write!(f, "CPU flag {flag} ({description}) found")
            }
            Found::CpuAttribute { attribute, description } => {
                write!(f, "CPU attribute {attribute} ({description}) found")
            }
            Found::Module { module, description } => {
                write!(f, "kernel module {module} ({description}) loaded")
            }
            Found::ModuleParameter { module, parameter, value } => {
                write!(f, "kernel module {module} parameter {parameter} is {value}")
            }
            Found::Device { path } => write!(f, "device {} usable", path.display()),
            Found::KvmApiVersion { version } => write!(f, "KVM API version {version}"),
            Found::KvmExtension { name, id } => {
                write!(f, "KVM extension {name} ({id}) supported")
            }
        }
    }
}

/// Aggregate verdict for one host.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityVerdict {
    /// `true` exactly when `failures` is empty.
    pub capable: bool,
    /// Requirements met, in check order.
    pub found: Vec<Found>,
    pub failures: Vec<Failure>,
    pub cpu: CpuDetails,
    pub on_vmm: bool,
    pub host: HostInfo,
}

impl CapabilityVerdict {
    pub fn new(
        found: Vec<Found>,
        failures: Vec<Failure>,
        cpu: CpuDetails,
        on_vmm: bool,
        host: HostInfo,
    ) -> Self {
        Self {
            capable: failures.is_empty(),
            found,
            failures,
            cpu,
            on_vmm,
            host,
        }
    }

    pub fn found_lines(&self) -> Vec<String> {
        self.found.iter().map(ToString::to_string).collect()
    }

    /// One human-readable line per unmet requirement, in check order.
    pub fn failure_lines(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}
