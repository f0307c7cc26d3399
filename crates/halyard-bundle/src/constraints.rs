//! Machine constraints, parsed syntactically.
//!
//! Constraints are space-separated `key=value` pairs over a closed key set.
//! The engine only needs to parse and re-serialize them; interpreting the
//! values is the control plane's business.

use std::fmt;

use crate::error::BundleError;

/// A parsed constraints value. Absent keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub arch: Option<String>,
    pub container: Option<String>,
    pub cpu_cores: Option<u64>,
    pub cpu_power: Option<u64>,
    /// Memory in mebibytes.
    pub mem: Option<u64>,
    /// Root disk in mebibytes.
    pub root_disk: Option<u64>,
    pub instance_type: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl Constraints {
    /// Parse a constraints string. The empty string parses to the empty
    /// value.
    pub fn parse(s: &str) -> Result<Constraints, BundleError> {
        let mut cons = Constraints::default();
        for raw in s.split_whitespace() {
            let (key, value) = raw.split_once('=').ok_or_else(|| malformed(raw))?;
            match key {
                "arch" => cons.arch = Some(value.to_string()),
                "container" => cons.container = Some(value.to_string()),
                "cpu-cores" => cons.cpu_cores = Some(parse_uint(raw, value)?),
                "cpu-power" => cons.cpu_power = Some(parse_uint(raw, value)?),
                "mem" => cons.mem = Some(parse_size(raw, value)?),
                "root-disk" => cons.root_disk = Some(parse_size(raw, value)?),
                "instance-type" => cons.instance_type = Some(value.to_string()),
                "tags" => {
                    cons.tags = Some(value.split(',').map(str::to_string).collect());
                }
                _ => return Err(malformed(raw)),
            }
        }
        Ok(cons)
    }

    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = &self.arch {
            parts.push(format!("arch={v}"));
        }
        if let Some(v) = &self.container {
            parts.push(format!("container={v}"));
        }
        if let Some(v) = self.cpu_cores {
            parts.push(format!("cpu-cores={v}"));
        }
        if let Some(v) = self.cpu_power {
            parts.push(format!("cpu-power={v}"));
        }
        if let Some(v) = self.mem {
            parts.push(format!("mem={v}M"));
        }
        if let Some(v) = self.root_disk {
            parts.push(format!("root-disk={v}M"));
        }
        if let Some(v) = &self.instance_type {
            parts.push(format!("instance-type={v}"));
        }
        if let Some(v) = &self.tags {
            parts.push(format!("tags={}", v.join(",")));
        }
        write!(f, "{}", parts.join(" "))
    }
}

fn malformed(constraint: &str) -> BundleError {
    BundleError::MalformedConstraint {
        constraint: constraint.to_string(),
    }
}

fn parse_uint(raw: &str, value: &str) -> Result<u64, BundleError> {
    value.parse().map_err(|_| malformed(raw))
}

/// Parse a size with an optional `M`/`G`/`T`/`P` suffix into mebibytes.
/// A bare number is already in mebibytes.
fn parse_size(raw: &str, value: &str) -> Result<u64, BundleError> {
    let (number, multiplier) = match value.as_bytes().last() {
        Some(b'M') => (&value[..value.len() - 1], 1.0),
        Some(b'G') => (&value[..value.len() - 1], 1024.0),
        Some(b'T') => (&value[..value.len() - 1], 1024.0 * 1024.0),
        Some(b'P') => (&value[..value.len() - 1], 1024.0 * 1024.0 * 1024.0),
        _ => (value, 1.0),
    };
    let number: f64 = number.parse().map_err(|_| malformed(raw))?;
    if number < 0.0 {
        return Err(malformed(raw));
    }
    Ok((number * multiplier).ceil() as u64)
}
