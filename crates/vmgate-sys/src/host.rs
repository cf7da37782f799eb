//! Host identity: kernel release and architecture.

use rustix::system::uname;
use serde::Serialize;
use thiserror::Error;

/// Kernel and architecture of the running host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub kernel_release: String,
    pub kernel_version: Option<(u32, u32, u32)>,
    pub arch: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse kernel release {0:?}")]
pub struct KernelVersionError(pub String);

impl HostInfo {
    pub fn detect() -> Self {
        let uts = uname();
        let kernel_release = uts.release().to_string_lossy().into_owned();
        let kernel_version = parse_kernel_version(&kernel_release).ok();

        Self {
            kernel_release,
            kernel_version,
            arch: std::env::consts::ARCH,
        }
    }
}

/// Parse `major.minor[.patch][-suffix]` into a version triple.
pub fn parse_kernel_version(release: &str) -> Result<(u32, u32, u32), KernelVersionError> {
    let invalid = || KernelVersionError(release.to_string());

    let mut parts = release.split('.');
    let major = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(invalid)?;
    let minor = parts
        .next()
        .and_then(|p| p.split(['-', '+']).next())
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(invalid)?;

    // Patch might carry a suffix like "0-150-generic"
    let patch = parts
        .next()
        .and_then(|p| p.split(['-', '+']).next())
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(0);

    Ok((major, minor, patch))
}
