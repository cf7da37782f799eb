//! vmgate CLI - Check whether this host can run VM-based containers

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::filter::Directive;
use vmgate::policy::{self, POLICIES};
use vmgate::{CapabilityVerdict, CheckConfig, Checker};

#[derive(Parser)]
#[command(name = "vmgate")]
#[command(author, version, about = "Check host support for VM-based containers")]
struct Cli {
    /// Log every requirement as it is checked
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the host against its architecture's requirements
    Check {
        /// Architecture policy to use
        #[arg(long, default_value = std::env::consts::ARCH)]
        arch: String,

        /// Treat every module parameter mismatch as a failure
        #[arg(long)]
        strict: bool,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        paths: HostPaths,
    },

    /// List the built-in requirement policies
    Policies,
}

#[derive(Args)]
struct HostPaths {
    /// CPU description file
    #[arg(long, env = "VMGATE_CPUINFO", default_value = vmgate_sys::cpuinfo::PROC_CPUINFO)]
    cpuinfo: PathBuf,

    /// Kernel module registry root
    #[arg(long, env = "VMGATE_MODULE_ROOT", default_value = vmgate_sys::module::SYS_MODULE)]
    module_root: PathBuf,

    /// Hypervisor device
    #[arg(long, env = "VMGATE_DEVICE", default_value = vmgate_sys::device::DEV_KVM)]
    device: PathBuf,

    /// s390x system information file
    #[arg(long, env = "VMGATE_SYSINFO", default_value = vmgate_sys::vmm::PROC_SYSINFO)]
    sysinfo: PathBuf,
}

const CAPABLE: &str = "System is capable of running VM-based containers";
const NOT_CAPABLE: &str = "System is not capable of running VM-based containers";

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match format!("vmgate={level}").parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check {
            arch,
            strict,
            json,
            paths,
        } => {
            let config = CheckConfig::builder()
                .cpuinfo(paths.cpuinfo)
                .module_root(paths.module_root)
                .device(paths.device)
                .sysinfo(paths.sysinfo)
                .strict(strict)
                .build();

            match check(config, &arch, json) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => ExitCode::from(1),
                Err(e) => {
                    tracing::error!("{e}");
                    ExitCode::from(2)
                }
            }
        }

        Commands::Policies => {
            print_policies();
            ExitCode::SUCCESS
        }
    }
}

fn check(config: CheckConfig, arch: &str, json: bool) -> vmgate::Result<bool> {
    let verdict = Checker::new(config).check(arch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        write_verdict(&mut io::stdout().lock(), &verdict)?;
    }

    Ok(verdict.capable)
}

fn write_verdict(out: &mut impl Write, verdict: &CapabilityVerdict) -> io::Result<()> {
    writeln!(out, "CPU vendor: {}", verdict.cpu.vendor_id)?;
    writeln!(out, "CPU model:  {}", verdict.cpu.model)?;
    writeln!(out, "Kernel:     {} ({})", verdict.host.kernel_release, verdict.host.arch)?;
    if verdict.on_vmm {
        writeln!(out, "Running on a VMM")?;
    }

    for line in verdict.found_lines() {
        writeln!(out, "{line}")?;
    }
    for line in verdict.failure_lines() {
        writeln!(out, "ERROR: {line}")?;
    }

    writeln!(out, "{}", if verdict.capable { CAPABLE } else { NOT_CAPABLE })
}

fn print_policies() {
    for policy in POLICIES {
        println!("{} ({})", policy.arch, policy.vendor.unwrap_or("any vendor"));
        print_list("flags", policy.required_flags.iter().map(|r| r.name));
        print_list("attributes", policy.required_attributes.iter().map(|r| r.name));
        print_list("modules", policy.required_modules.iter().map(module_summary));
        print_list(
            "kvm extensions",
            policy.required_kvm_extensions.iter().map(|e| e.name.to_string()),
        );
        println!("  device:         {}", policy.hypervisor_device);
        println!();
    }
}

fn module_summary(module: &policy::ModuleRequirement) -> String {
    match module.parameter {
        Some(p) => format!("{}({}={})", module.name, p.name, p.value),
        None => module.name.to_string(),
    }
}

fn print_list<T: std::fmt::Display>(label: &str, items: impl Iterator<Item = T>) {
    let items: Vec<String> = items.map(|i| i.to_string()).collect();
    if items.is_empty() {
        return;
    }
    println!("  {:<15} {}", format!("{label}:"), items.join(" "));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmgate::{Failure, Found};
    use vmgate_sys::{CpuDetails, HostInfo};

    fn render(verdict: &CapabilityVerdict) -> String {
        let mut out = Vec::new();
        write_verdict(&mut out, verdict).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn s390x_host() -> (CpuDetails, HostInfo) {
        let cpu = CpuDetails {
            vendor_id: "IBM/S390".to_string(),
            model: "2964".to_string(),
            ..CpuDetails::default()
        };
        let host = HostInfo {
            kernel_release: "6.6.52".to_string(),
            kernel_version: Some((6, 6, 52)),
            arch: "s390x",
        };
        (cpu, host)
    }

    #[test]
    fn test_output_names_checked_modules() {
        let (cpu, host) = s390x_host();
        let found = vec![Found::Module {
            module: "kvm".to_string(),
            description: "Kernel-based Virtual Machine".to_string(),
        }];
        let output = render(&CapabilityVerdict::new(found, vec![], cpu, false, host));

        assert!(output.contains("kernel module kvm (Kernel-based Virtual Machine) loaded"));
        assert!(output.ends_with(&format!("{CAPABLE}\n")));
        assert!(!output.contains("ERROR"));
    }

    #[test]
    fn test_output_lists_failures() {
        let (cpu, host) = s390x_host();
        let failures = vec![Failure::ModuleNotLoaded {
            module: "kvm".to_string(),
            description: "Kernel-based Virtual Machine".to_string(),
        }];
        let output = render(&CapabilityVerdict::new(vec![], failures, cpu, true, host));

        assert!(output.contains("Running on a VMM\n"));
        assert!(
            output.contains("ERROR: kernel module kvm (Kernel-based Virtual Machine) not loaded\n")
        );
        assert!(output.ends_with(&format!("{NOT_CAPABLE}\n")));
    }
}
