//! The bundle data model and YAML decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BundleError;

/// A decoded bundle: the declarative description of an application
/// topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleData {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
    #[serde(default, deserialize_with = "machines_map")]
    pub machines: BTreeMap<String, MachineSpec>,
    #[serde(default)]
    pub relations: Vec<Vec<String>>,
}

/// One service entry: a charm, how many units, and where they go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub charm: String,
    /// Desired unit count. Decoded signed so that a negative count can be
    /// reported as a validation error rather than a decode error.
    #[serde(default)]
    pub num_units: i64,
    /// Placement directives, one per unit; the last one is repeated when
    /// units outnumber directives.
    #[serde(default, deserialize_with = "directive_list")]
    pub to: Vec<String>,
    #[serde(default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// One declared machine entry. All attributes are optional; a bare
/// `2:` line declares a machine with defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineSpec {
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl BundleData {
    /// Decode a bundle from YAML text. Semantic checks are a separate
    /// step, see [`BundleData::validate`].
    pub fn from_yaml(text: &str) -> Result<BundleData, BundleError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Desired unit count for a service, clamped for use after
    /// validation has rejected negative counts.
    pub fn unit_count(&self, service: &str) -> usize {
        self.services
            .get(service)
            .map_or(0, |s| s.num_units.max(0) as usize)
    }
}

/// Placement directives referring to machine labels are written as bare
/// YAML integers more often than not (`to: [1, "lxc:2"]`). Decode
/// scalars to strings.
fn directive_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<serde_yaml::Value> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|value| match value {
            serde_yaml::Value::String(s) => Ok(s),
            serde_yaml::Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "invalid placement directive {other:?}"
            ))),
        })
        .collect()
}

/// Machine labels are written as bare YAML integers more often than not
/// (`1:`), and a machine entry may be null. Decode keys to strings and
/// null entries to defaults.
fn machines_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, MachineSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: std::collections::HashMap<serde_yaml::Value, Option<MachineSpec>> =
        std::collections::HashMap::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        let label = match key {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "invalid machine label {other:?}"
                )));
            }
        };
        out.insert(label, value.unwrap_or_default());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_bundle() {
        let data = BundleData::from_yaml(
            r#"
services:
    mysql:
        charm: cs:trusty/mysql-42
        num_units: 1
    wordpress:
        charm: cs:trusty/wordpress-47
        num_units: 1
relations:
    - ["wordpress:db", "mysql:server"]
"#,
        )
        .unwrap();
        assert_eq!(data.services.len(), 2);
        assert_eq!(data.services["mysql"].charm, "cs:trusty/mysql-42");
        assert_eq!(data.services["mysql"].num_units, 1);
        assert_eq!(data.relations.len(), 1);
        assert_eq!(data.relations[0], vec!["wordpress:db", "mysql:server"]);
    }

    #[test]
    fn decode_machines_with_integer_labels() {
        let data = BundleData::from_yaml(
            r#"
services:
    wp:
        charm: cs:trusty/wordpress-0
        num_units: 2
        to: [1, "lxc:2"]
machines:
    1:
        series: trusty
    2:
"#,
        )
        .unwrap();
        assert_eq!(data.machines.len(), 2);
        assert_eq!(data.machines["1"].series.as_deref(), Some("trusty"));
        assert_eq!(data.machines["2"].series, None);
        // The bare `1` directive decodes to a string label.
        assert_eq!(data.services["wp"].to, ["1", "lxc:2"]);
    }

    #[test]
    fn decode_options_and_annotations() {
        let data = BundleData::from_yaml(
            r#"
services:
    customized:
        charm: precise/dummy-0
        num_units: 1
        options:
            username: who
            skill-level: 47
        annotations:
            key: value
"#,
        )
        .unwrap();
        let spec = &data.services["customized"];
        assert_eq!(spec.options.len(), 2);
        assert_eq!(spec.annotations["key"], "value");
    }

    #[test]
    fn unit_count_defaults_to_zero() {
        let data = BundleData::from_yaml("services:\n    up:\n        charm: vivid/upgrade-1\n")
            .unwrap();
        assert_eq!(data.services["up"].num_units, 0);
        assert_eq!(data.unit_count("up"), 0);
        assert_eq!(data.unit_count("missing"), 0);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = BundleData::from_yaml("!").unwrap_err();
        assert!(err.to_string().starts_with("cannot unmarshal bundle data:"));
    }
}
