//! Parser for `/proc/cpuinfo`.
//!
//! The file is a list of `label : value` lines, one block per processor. The
//! labels that carry the vendor, model and feature flags differ per
//! architecture, so callers supply them through [`CpuFields`].
//!
//! | Arch | Vendor | Model | Flags |
//! |------|--------|-------|-------|
//! | x86_64 | `vendor_id` | `model name` | `flags` |
//! | aarch64 | `CPU implementer` | `CPU architecture` | `Features` |
//! | powerpc64 | `platform` | `cpu` | - |
//! | s390x | `vendor_id` | `machine` | `features` |
//!
//! On s390x the model is not a line of its own but one `key = value` pair in
//! the per-processor line:
//!
//! ```text
//! processor 0: version = 00,  identification = 3FC047, machine = 2964
//! processor 0: version=00 identification=3FC047 machine=2964
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Default location of the CPU description.
pub const PROC_CPUINFO: &str = "/proc/cpuinfo";

/// Labels to look for in the CPU description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFields {
    pub vendor: &'static str,
    pub model: &'static str,
    /// `None` on architectures that don't publish a flags line.
    pub flags: Option<&'static str>,
}

/// Structured view of the CPU description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuDetails {
    pub vendor_id: String,
    pub model: String,
    pub flags: BTreeSet<String>,
    /// Identity values (vendor and model strings) seen across all processors.
    pub attributes: BTreeSet<String>,
}

impl CpuDetails {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains(attribute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("cpu info is empty")]
    Empty,

    #[error("cpu vendor field {field:?} not found")]
    MissingVendor { field: &'static str },

    #[error("cpu model field {field:?} not found")]
    MissingModel { field: &'static str },
}

/// Read and parse a CPU description file.
pub fn read(path: &Path, fields: &CpuFields) -> std::io::Result<Result<CpuDetails, ParseError>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse(&text, fields))
}

/// Parse CPU description text.
pub fn parse(text: &str, fields: &CpuFields) -> Result<CpuDetails, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut vendor: Option<&str> = None;
    let mut model: Option<&str> = None;
    let mut details = CpuDetails::default();

    for line in text.lines() {
        let Some((label, value)) = split_label(line) else {
            continue;
        };

        if label == fields.vendor && !value.is_empty() {
            if vendor.is_none() {
                vendor = Some(value);
            }
            details.attributes.insert(value.to_string());
        }

        if let Some(found) = model_value(label, value, fields.model) {
            if model.is_none() {
                model = Some(found);
            }
            details.attributes.insert(found.to_string());
        }

        if fields.flags == Some(label) {
            details
                .flags
                .extend(value.split_whitespace().map(str::to_string));
        }
    }

    details.vendor_id = vendor
        .ok_or(ParseError::MissingVendor {
            field: fields.vendor,
        })?
        .to_string();
    details.model = model
        .ok_or(ParseError::MissingModel {
            field: fields.model,
        })?
        .to_string();

    Ok(details)
}

fn split_label(line: &str) -> Option<(&str, &str)> {
    let (label, value) = line.split_once(':')?;
    Some((label.trim(), value.trim()))
}

/// Model is either the value of a `model : ...` line or one of the
/// `key = value` pairs embedded in the value. Pairs are separated by commas
/// (`version = 00, machine = 2964`) or by whitespace (`version=00 machine=2964`).
fn model_value<'a>(label: &str, value: &'a str, field: &str) -> Option<&'a str> {
    if label == field {
        return Some(value).filter(|v| !v.is_empty());
    }

    value
        .split(',')
        .find_map(|chunk| pair_value(chunk, field))
        .filter(|v| !v.is_empty())
}

fn pair_value<'a>(chunk: &'a str, key: &str) -> Option<&'a str> {
    // A single pair may have a value with spaces in it.
    if chunk.matches('=').count() == 1 {
        let (k, v) = chunk.split_once('=')?;
        return (k.trim() == key).then_some(v.trim());
    }

    let tokens: Vec<&str> = chunk.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        let Some((k, v)) = token.split_once('=') else {
            continue;
        };
        // `key = value` splits into three tokens, `key= value` and `key =value` into two
        let k = if k.is_empty() {
            i.checked_sub(1).map(|j| tokens[j])
        } else {
            Some(k)
        };
        if k == Some(key) {
            return if v.is_empty() {
                tokens.get(i + 1).copied()
            } else {
                Some(v)
            };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const X86: CpuFields = CpuFields {
        vendor: "vendor_id",
        model: "model name",
        flags: Some("flags"),
    };

    const S390X: CpuFields = CpuFields {
        vendor: "vendor_id",
        model: "machine",
        flags: Some("features"),
    };

    const X86_CPUINFO: &str = "\
processor\t: 0
vendor_id\t: GenuineIntel
cpu family\t: 6
model\t\t: 85
model name\t: Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz
flags\t\t: fpu vme de pse vmx lm sse4_1 hypervisor

processor\t: 1
vendor_id\t: GenuineIntel
model name\t: Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz
flags\t\t: fpu vme de pse vmx lm sse4_1 hypervisor
";

    #[test]
    fn test_parse_x86() {
        let cpu = parse(X86_CPUINFO, &X86).unwrap();
        assert_eq!(cpu.vendor_id, "GenuineIntel");
        assert_eq!(cpu.model, "Intel(R) Xeon(R) Gold 6148 CPU @ 2.40GHz");
        assert!(cpu.has_flag("vmx"));
        assert!(cpu.has_flag("sse4_1"));
        assert!(!cpu.has_flag("svm"));
        assert!(cpu.has_attribute("GenuineIntel"));
        assert_eq!(cpu.flags.len(), 8);
    }

    #[test]
    fn test_model_label_is_exact() {
        // "model : 85" must not be taken for "model name".
        let text = "vendor_id : GenuineIntel\nmodel : 85\n";
        assert_eq!(
            parse(text, &X86),
            Err(ParseError::MissingModel { field: "model name" })
        );
    }

    #[test]
    fn test_model_embedded_in_line() {
        let text = "\
a       : b
vendor_id  : a vendor
foo     : bar
processor 0: version = 00,  identification = XXXXX, machine = some CPU model
";
        let cpu = parse(text, &S390X).unwrap();
        assert_eq!(cpu.vendor_id, "a vendor");
        assert_eq!(cpu.model, "some CPU model");
        assert!(cpu.flags.is_empty());
    }

    #[test]
    fn test_model_in_space_separated_pairs() {
        let text = "vendor_id : a vendor\nprocessor 0: version=00 identification=XXXXX machine=2964\n";
        assert_eq!(parse(text, &S390X).unwrap().model, "2964");

        let text = "vendor_id : a vendor\nprocessor 0: version = 00 identification = XXXXX machine = 2964\n";
        assert_eq!(parse(text, &S390X).unwrap().model, "2964");

        let text = "vendor_id : a vendor\nprocessor 0: version=00 machine= 2964 identification=XXXXX\n";
        assert_eq!(parse(text, &S390X).unwrap().model, "2964");
    }

    #[test]
    fn test_model_in_comma_separated_pairs() {
        let text = "vendor_id : a vendor\nprocessor 0: version=00,identification=XXXXX,machine=2964\n";
        assert_eq!(parse(text, &S390X).unwrap().model, "2964");

        // A key that only appears as another key's suffix doesn't count
        let text = "vendor_id : a vendor\nprocessor 0: version = 00, submachine = 2964\n";
        assert_eq!(
            parse(text, &S390X),
            Err(ParseError::MissingModel { field: "machine" })
        );
    }

    #[test]
    fn test_s390x_features() {
        let text = "\
vendor_id       : IBM/S390
features\t: esan3 zarch stfle msa ldisp eimm dfp edat etf3eh highgprs te vx sie
processor 0: version = FF,  identification = 3FC047,  machine = 2964
";
        let cpu = parse(text, &S390X).unwrap();
        assert_eq!(cpu.model, "2964");
        assert!(cpu.has_flag("sie"));
    }

    #[test]
    fn test_invalid_inputs() {
        let vendor = "vendor_id  : a vendor";
        let model = "processor 0: version = 00,  identification = XXXXX, machine = some CPU model";

        assert_eq!(parse("", &S390X), Err(ParseError::Empty));
        assert_eq!(parse("  \n\t\n", &S390X), Err(ParseError::Empty));
        assert_eq!(
            parse("invalid", &S390X),
            Err(ParseError::MissingVendor { field: "vendor_id" })
        );
        assert_eq!(
            parse("vendor_id", &S390X),
            Err(ParseError::MissingVendor { field: "vendor_id" })
        );
        assert_eq!(
            parse("vendor_id :", &S390X),
            Err(ParseError::MissingVendor { field: "vendor_id" })
        );
        assert_eq!(
            parse(vendor, &S390X),
            Err(ParseError::MissingModel { field: "machine" })
        );
        assert_eq!(
            parse(model, &S390X),
            Err(ParseError::MissingVendor { field: "vendor_id" })
        );
    }

    #[test]
    fn test_first_vendor_wins() {
        let text = "vendor_id : first\nvendor_id : second\nmodel name : m\n";
        let cpu = parse(text, &X86).unwrap();
        assert_eq!(cpu.vendor_id, "first");
        assert!(cpu.has_attribute("second"));
    }

    #[test]
    fn test_no_flags_label() {
        let fields = CpuFields {
            vendor: "platform",
            model: "cpu",
            flags: None,
        };
        let text = "processor : 0\ncpu : POWER9, altivec supported\nplatform : PowerNV\n";
        let cpu = parse(text, &fields).unwrap();
        assert_eq!(cpu.vendor_id, "PowerNV");
        assert_eq!(cpu.model, "POWER9, altivec supported");
        assert!(cpu.flags.is_empty());
    }

    #[test]
    fn test_read_nonexistent() {
        let result = read(Path::new("/nonexistent/cpuinfo"), &X86);
        assert!(result.is_err());
    }
}
