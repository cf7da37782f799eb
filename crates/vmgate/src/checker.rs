//! Capability evaluation.
//!
//! [`Checker::evaluate`] runs one policy against the host in a single pass:
//!
//! 1. Parse cpuinfo. Unreadable or unparsable cpuinfo aborts the check.
//! 2. Required CPU flags, then required CPU attributes.
//! 3. Required kernel modules in policy order. A module's parameter is only
//!    looked at once the module is known to be loaded; mismatches go through
//!    the policy's parameter handler unless the config is strict.
//! 4. The hypervisor device and its KVM API version, then KVM extensions.
//!
//! Every requirement is checked regardless of earlier failures, so the verdict
//! lists everything that needs fixing.

use serde_json::Value;
use vmgate_sys::device::KVM_API_VERSION;
use vmgate_sys::{CpuDetails, CpuFields, HostInfo, Kvm, ModuleRegistry, cpuinfo};

use crate::config::CheckConfig;
use crate::error::CapabilityCheckError;
use crate::policy::{self, Fields, ModuleRequirement, RequirementPolicy};
use crate::verdict::{CapabilityVerdict, Failure, Found};

#[derive(Debug, Clone)]
pub struct Checker {
    config: CheckConfig,
    modules: ModuleRegistry,
}

/// Outcomes collected during one evaluation.
#[derive(Default)]
struct Tally {
    found: Vec<Found>,
    failures: Vec<Failure>,
}

impl Tally {
    fn pass(&mut self, found: Found) {
        tracing::debug!("{found}");
        self.found.push(found);
    }

    fn fail(&mut self, failure: Failure) {
        tracing::debug!("{failure}");
        self.failures.push(failure);
    }
}

impl Checker {
    pub fn new(config: CheckConfig) -> Self {
        let modules = ModuleRegistry::new(&config.module_root);
        Self { config, modules }
    }

    /// Pick the policy for `arch`, reading the CPU vendor from cpuinfo for
    /// architectures with vendor-specific policies.
    pub fn select_policy(
        &self,
        arch: &str,
    ) -> Result<&'static RequirementPolicy, CapabilityCheckError> {
        self.identify(arch).map(|(policy, _)| policy)
    }

    /// Select the policy for `arch` and evaluate it, reading cpuinfo once.
    pub fn check(&self, arch: &str) -> Result<CapabilityVerdict, CapabilityCheckError> {
        let (policy, cpu) = self.identify(arch)?;
        Ok(self.evaluate_with(policy, cpu))
    }

    pub fn evaluate(
        &self,
        policy: &RequirementPolicy,
    ) -> Result<CapabilityVerdict, CapabilityCheckError> {
        let cpu = self.read_cpu(&policy.cpu_fields)?;
        Ok(self.evaluate_with(policy, cpu))
    }

    fn identify(
        &self,
        arch: &str,
    ) -> Result<(&'static RequirementPolicy, CpuDetails), CapabilityCheckError> {
        let Some(fields) = policy::fields_for(arch) else {
            return Err(CapabilityCheckError::UnsupportedArch {
                arch: arch.to_string(),
                vendor: None,
            });
        };
        let cpu = self.read_cpu(&fields)?;

        match policy::lookup(arch, Some(cpu.vendor_id.as_str())) {
            Some(policy) => Ok((policy, cpu)),
            None => Err(CapabilityCheckError::UnsupportedArch {
                arch: arch.to_string(),
                vendor: Some(cpu.vendor_id),
            }),
        }
    }

    fn evaluate_with(&self, policy: &RequirementPolicy, cpu: CpuDetails) -> CapabilityVerdict {
        let on_vmm = self.on_vmm(policy, &cpu);

        tracing::debug!(
            vendor = %cpu.vendor_id,
            model = %cpu.model,
            on_vmm,
            "evaluating {} policy",
            policy.arch
        );

        let mut tally = Tally::default();
        check_cpu(policy, &cpu, &mut tally);
        for requirement in policy.required_modules {
            self.check_module(policy, requirement, on_vmm, &mut tally);
        }
        if policy.hypervisor_device {
            self.check_device(policy, &mut tally);
        }

        let verdict =
            CapabilityVerdict::new(tally.found, tally.failures, cpu, on_vmm, HostInfo::detect());
        tracing::info!(
            capable = verdict.capable,
            failures = verdict.failures.len(),
            "capability check complete"
        );
        verdict
    }

    fn read_cpu(&self, fields: &CpuFields) -> Result<CpuDetails, CapabilityCheckError> {
        let path = &self.config.cpuinfo;
        cpuinfo::read(path, fields)
            .map_err(|source| CapabilityCheckError::CpuInfoUnreadable {
                path: path.clone(),
                source,
            })?
            .map_err(|source| CapabilityCheckError::Parse {
                path: path.clone(),
                source,
            })
    }

    fn on_vmm(&self, policy: &RequirementPolicy, cpu: &CpuDetails) -> bool {
        policy
            .vmm_detection
            .detect(cpu, &self.config.sysinfo)
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "cannot tell whether running on a VMM, assuming not");
                false
            })
    }

    fn check_module(
        &self,
        policy: &RequirementPolicy,
        requirement: &ModuleRequirement,
        on_vmm: bool,
        tally: &mut Tally,
    ) {
        let module = requirement.name;

        match self.modules.is_loaded(module) {
            Ok(true) => tally.pass(Found::Module {
                module: module.to_string(),
                description: requirement.description.to_string(),
            }),
            Ok(false) => {
                tally.fail(Failure::ModuleNotLoaded {
                    module: module.to_string(),
                    description: requirement.description.to_string(),
                });
                return;
            }
            Err(e) => {
                tally.fail(Failure::ModuleInspection {
                    module: module.to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        }

        let Some(parameter) = requirement.parameter else {
            return;
        };

        let actual = match self.modules.parameter(module, parameter.name) {
            Ok(actual) => actual,
            Err(e) => {
                tally.fail(Failure::ModuleInspection {
                    module: module.to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        if actual.as_deref() == Some(parameter.value) {
            tally.pass(Found::ModuleParameter {
                module: module.to_string(),
                parameter: parameter.name.to_string(),
                value: parameter.value.to_string(),
            });
            return;
        }

        let failure = Failure::ModuleParameter {
            module: module.to_string(),
            parameter: parameter.name.to_string(),
            expected: parameter.value.to_string(),
            actual: actual.clone(),
        };

        if !self.config.strict {
            let fields = param_fields(module, parameter.name, parameter.value, actual);
            let msg = failure.to_string();
            if (policy.param_handler)(on_vmm, &fields, &msg) {
                return;
            }
        }

        tally.fail(failure);
    }

    fn check_device(&self, policy: &RequirementPolicy, tally: &mut Tally) {
        let path = &self.config.device;

        let kvm = match Kvm::open(path) {
            Ok(kvm) => kvm,
            Err(e) => {
                tally.fail(Failure::Device {
                    path: path.clone(),
                    result: e.probe_result(),
                    reason: e.to_string(),
                });
                return;
            }
        };
        tally.pass(Found::Device { path: path.clone() });

        // Any character device opens; only a KVM device answers this.
        match kvm.api_version() {
            Ok(KVM_API_VERSION) => tally.pass(Found::KvmApiVersion {
                version: KVM_API_VERSION,
            }),
            Ok(found) => {
                tally.fail(Failure::KvmApiVersion {
                    found,
                    expected: KVM_API_VERSION,
                });
                return;
            }
            Err(e) => {
                tally.fail(Failure::KvmQuery {
                    query: "KVM_GET_API_VERSION".to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        }

        for extension in policy.required_kvm_extensions {
            match kvm.check_extension(extension.id) {
                Ok(true) => tally.pass(Found::KvmExtension {
                    name: extension.name.to_string(),
                    id: extension.id,
                }),
                Ok(false) => tally.fail(Failure::KvmExtension {
                    name: extension.name.to_string(),
                    id: extension.id,
                }),
                Err(e) => tally.fail(Failure::KvmQuery {
                    query: format!("KVM_CHECK_EXTENSION({})", extension.name),
                    reason: e.to_string(),
                }),
            }
        }
    }
}

fn check_cpu(policy: &RequirementPolicy, cpu: &CpuDetails, tally: &mut Tally) {
    for flag in policy.required_flags {
        if cpu.has_flag(flag.name) {
            tally.pass(Found::CpuFlag {
                flag: flag.name.to_string(),
                description: flag.description.to_string(),
            });
        } else {
            tally.fail(Failure::MissingCpuFlag {
                flag: flag.name.to_string(),
                description: flag.description.to_string(),
            });
        }
    }

    for attribute in policy.required_attributes {
        if cpu.has_attribute(attribute.name) {
            tally.pass(Found::CpuAttribute {
                attribute: attribute.name.to_string(),
                description: attribute.description.to_string(),
            });
        } else {
            tally.fail(Failure::MissingCpuAttribute {
                attribute: attribute.name.to_string(),
                description: attribute.description.to_string(),
            });
        }
    }
}

fn param_fields(module: &str, parameter: &str, expected: &str, actual: Option<String>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("module".to_string(), Value::from(module));
    fields.insert("parameter".to_string(), Value::from(parameter));
    fields.insert("expected".to_string(), Value::from(expected));
    fields.insert("actual".to_string(), actual.map_or(Value::Null, Value::String));
    fields
}

/// Check the running host against the policy for its own architecture.
///
/// This is what a runtime preflight calls before starting a VM sandbox.
pub fn host_is_vm_container_capable(
    config: CheckConfig,
) -> Result<CapabilityVerdict, CapabilityCheckError> {
    Checker::new(config).check(std::env::consts::ARCH)
}
