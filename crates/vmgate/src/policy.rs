//! Per-architecture requirement policies.
//!
//! One [`RequirementPolicy`] per architecture (and per CPU vendor on
//! x86_64), kept in the static [`POLICIES`] table. Adding an architecture
//! means adding a row here; the checker itself has no architecture logic.
//!
//! ## Parameter handlers
//!
//! Some module parameters only matter on bare metal. Inside a guest the outer
//! hypervisor already provides what the parameter would enable, so a mismatch
//! there is a warning rather than a failure. Each policy decides this with
//! its [`ParamHandler`]:
//!
//! | on VMM | `parameter` field | ignore? |
//! |--------|-------------------|---------|
//! | no | anything | no |
//! | yes | `"unrestricted_guest"` | yes |
//! | yes | `"nested"` | yes |
//! | yes | anything else | no |
//! | any | missing or not a string | no |

use serde_json::{Map, Value};
use vmgate_sys::{CpuFields, VmmDetection};

/// Context passed to a [`ParamHandler`]: `module`, `parameter`, `expected`,
/// `actual`.
pub type Fields = Map<String, Value>;

/// Returns `true` when a module parameter mismatch should be ignored.
///
/// Must be pure: no I/O besides logging.
pub type ParamHandler = fn(on_vmm: bool, fields: &Fields, msg: &str) -> bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleParameter {
    pub name: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRequirement {
    pub name: &'static str,
    pub description: &'static str,
    pub parameter: Option<ModuleParameter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KvmExtension {
    pub name: &'static str,
    pub id: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RequirementPolicy {
    pub arch: &'static str,
    /// Restricts the policy to one `vendor_id`; `None` matches any vendor.
    pub vendor: Option<&'static str>,
    pub cpu_fields: CpuFields,
    pub required_flags: &'static [Requirement],
    pub required_attributes: &'static [Requirement],
    pub required_modules: &'static [ModuleRequirement],
    /// Probe the hypervisor device.
    pub hypervisor_device: bool,
    /// Checked only when the device probe succeeded.
    pub required_kvm_extensions: &'static [KvmExtension],
    pub vmm_detection: VmmDetection,
    pub param_handler: ParamHandler,
}

impl RequirementPolicy {
    /// A policy that requires nothing. Any host with a parsable cpuinfo
    /// passes it.
    pub const fn empty(cpu_fields: CpuFields) -> Self {
        Self {
            arch: "",
            vendor: None,
            cpu_fields,
            required_flags: &[],
            required_attributes: &[],
            required_modules: &[],
            hypervisor_device: false,
            required_kvm_extensions: &[],
            vmm_detection: VmmDetection::None,
            param_handler: strict_param_handler,
        }
    }
}

/// Ignore `unrestricted_guest` and `nested` mismatches when running on a VMM.
pub fn vmm_param_handler(on_vmm: bool, fields: &Fields, msg: &str) -> bool {
    // Anything but a string is malformed and never ignored.
    let Some(Value::String(parameter)) = fields.get("parameter") else {
        return false;
    };

    if !on_vmm {
        return false;
    }

    match parameter.as_str() {
        "unrestricted_guest" => {
            tracing::warn!(parameter = %parameter, "{msg}: not required when running on a VMM");
            true
        }
        "nested" => {
            tracing::warn!(parameter = %parameter, "{msg}: nesting is up to the outer hypervisor");
            true
        }
        _ => false,
    }
}

/// Never ignore a mismatch.
pub fn strict_param_handler(_on_vmm: bool, _fields: &Fields, _msg: &str) -> bool {
    false
}

const X86_64_FIELDS: CpuFields = CpuFields {
    vendor: "vendor_id",
    model: "model name",
    flags: Some("flags"),
};

const VHOST_MODULES: [ModuleRequirement; 3] = [
    module("vhost", "Host kernel accelerator for virtio"),
    module("vhost_net", "Host kernel accelerator for virtio network"),
    module("vhost_vsock", "Host Support for Linux VM Sockets"),
];

const X86_64_KVM_EXTENSIONS: &[KvmExtension] = &[
    KvmExtension {
        name: "KVM_CAP_IRQFD",
        id: 32,
    },
    KvmExtension {
        name: "KVM_CAP_IOEVENTFD",
        id: 36,
    },
];

const fn flag(name: &'static str, description: &'static str) -> Requirement {
    Requirement { name, description }
}

const fn module(name: &'static str, description: &'static str) -> ModuleRequirement {
    ModuleRequirement {
        name,
        description,
        parameter: None,
    }
}

const fn module_with(
    name: &'static str,
    description: &'static str,
    parameter: &'static str,
    value: &'static str,
) -> ModuleRequirement {
    ModuleRequirement {
        name,
        description,
        parameter: Some(ModuleParameter {
            name: parameter,
            value,
        }),
    }
}

pub static POLICIES: &[RequirementPolicy] = &[
    RequirementPolicy {
        arch: "x86_64",
        vendor: Some("GenuineIntel"),
        cpu_fields: X86_64_FIELDS,
        required_flags: &[
            flag("vmx", "Virtualization support"),
            flag("lm", "64Bit CPU"),
            flag("sse4_1", "SSE4.1"),
        ],
        required_attributes: &[flag("GenuineIntel", "Intel Architecture CPU")],
        required_modules: &[
            module("kvm", "Kernel-based Virtual Machine"),
            module_with("kvm_intel", "Intel KVM", "unrestricted_guest", "Y"),
            VHOST_MODULES[0],
            VHOST_MODULES[1],
            VHOST_MODULES[2],
        ],
        hypervisor_device: true,
        required_kvm_extensions: X86_64_KVM_EXTENSIONS,
        vmm_detection: VmmDetection::CpuFlag("hypervisor"),
        param_handler: vmm_param_handler,
    },
    RequirementPolicy {
        arch: "x86_64",
        vendor: Some("AuthenticAMD"),
        cpu_fields: X86_64_FIELDS,
        required_flags: &[
            flag("svm", "Virtualization support"),
            flag("lm", "64Bit CPU"),
            flag("sse4_1", "SSE4.1"),
        ],
        required_attributes: &[flag("AuthenticAMD", "AMD Architecture CPU")],
        required_modules: &[
            module("kvm", "Kernel-based Virtual Machine"),
            module_with("kvm_amd", "AMD KVM", "nested", "1"),
            VHOST_MODULES[0],
            VHOST_MODULES[1],
            VHOST_MODULES[2],
        ],
        hypervisor_device: true,
        required_kvm_extensions: X86_64_KVM_EXTENSIONS,
        vmm_detection: VmmDetection::CpuFlag("hypervisor"),
        param_handler: vmm_param_handler,
    },
    RequirementPolicy {
        arch: "aarch64",
        vendor: None,
        cpu_fields: CpuFields {
            vendor: "CPU implementer",
            model: "CPU architecture",
            flags: Some("Features"),
        },
        required_flags: &[],
        required_attributes: &[],
        required_modules: &[
            module("kvm", "Kernel-based Virtual Machine"),
            VHOST_MODULES[0],
            VHOST_MODULES[1],
            VHOST_MODULES[2],
        ],
        hypervisor_device: true,
        required_kvm_extensions: &[],
        vmm_detection: VmmDetection::None,
        param_handler: strict_param_handler,
    },
    RequirementPolicy {
        arch: "powerpc64",
        vendor: None,
        cpu_fields: CpuFields {
            vendor: "platform",
            model: "cpu",
            flags: None,
        },
        required_flags: &[],
        required_attributes: &[],
        required_modules: &[
            module("kvm", "Kernel-based Virtual Machine"),
            module("kvm_hv", "KVM for POWER hypervisor mode"),
            VHOST_MODULES[0],
            VHOST_MODULES[1],
            VHOST_MODULES[2],
        ],
        hypervisor_device: true,
        required_kvm_extensions: &[],
        vmm_detection: VmmDetection::None,
        param_handler: strict_param_handler,
    },
    RequirementPolicy {
        arch: "s390x",
        vendor: None,
        cpu_fields: CpuFields {
            vendor: "vendor_id",
            model: "machine",
            flags: Some("features"),
        },
        required_flags: &[flag("sie", "Virtualization support")],
        required_attributes: &[],
        required_modules: &[module("kvm", "Kernel-based Virtual Machine")],
        hypervisor_device: true,
        required_kvm_extensions: &[],
        vmm_detection: VmmDetection::SysInfo,
        param_handler: vmm_param_handler,
    },
];

/// Find the policy for `arch`, preferring none over a vendor mismatch.
pub fn lookup(arch: &str, vendor: Option<&str>) -> Option<&'static RequirementPolicy> {
    POLICIES
        .iter()
        .find(|p| p.arch == arch && (p.vendor.is_none() || p.vendor == vendor))
}

/// cpuinfo labels for `arch`, needed to read the vendor before a
/// vendor-specific policy can be picked.
pub fn fields_for(arch: &str) -> Option<CpuFields> {
    POLICIES.iter().find(|p| p.arch == arch).map(|p| p.cpu_fields)
}
