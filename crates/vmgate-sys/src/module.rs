//! Kernel module registry (`/sys/module`).
//!
//! Every loaded module (and every built-in module that has parameters) has a
//! directory under the registry root. Parameters are files under
//! `<module>/parameters/`, each holding the current value followed by a
//! newline.
//!
//! Nothing is cached: module state can change between calls.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Default registry root.
pub const SYS_MODULE: &str = "/sys/module";

/// The registry could not be read for a reason other than "not there".
#[derive(Debug, Error)]
#[error("cannot inspect module {module} at {}: {source}", .path.display())]
pub struct ModuleInspectionError {
    pub module: String,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    root: PathBuf,
}

impl ModuleRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether the registry has an entry for `name`.
    pub fn is_loaded(&self, name: &str) -> Result<bool, ModuleInspectionError> {
        let path = self.module_dir(name);
        match std::fs::metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ModuleInspectionError {
                module: name.to_string(),
                path,
                source,
            }),
        }
    }

    /// Current value of a module parameter, or `None` if the module or the
    /// parameter doesn't exist.
    pub fn parameter(
        &self,
        name: &str,
        parameter: &str,
    ) -> Result<Option<String>, ModuleInspectionError> {
        let path = self.module_dir(name).join("parameters").join(parameter);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ModuleInspectionError {
                module: name.to_string(),
                path,
                source,
            }),
        }
    }

    // modprobe accepts dashes, sysfs always uses underscores
    fn module_dir(&self, name: &str) -> PathBuf {
        self.root.join(name.replace('-', "_"))
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(SYS_MODULE)
    }
}
