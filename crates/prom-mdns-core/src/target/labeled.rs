// Labeled target groups.
//
// The labeled form keeps every target as its own label set, with the address
// stored under the reserved `__address__` label, and remembers which service
// query produced the group. On the wire it uses the simplified address-list
// shape shared with `TargetGroup`, so the two forms convert losslessly.

use super::{ADDRESS_LABEL, TargetGroup};
use serde::de::{self, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A set of label names and values
pub type LabelSet = BTreeMap<String, String>;

/// A set of targets, each identified by a label set, with a common label set
///
/// Decoding is strict in every format: keys other than `targets` and
/// `labels` fail with `unknown fields in target_group: ...`. Prometheus
/// only applies that check to YAML and silently ignores extra JSON keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabeledGroup {
    /// Targets, each uniquely identified in the group by its address label
    pub targets: Vec<LabelSet>,

    /// Labels common to every target in the group
    pub labels: LabelSet,

    /// Identifier of the query that produced the group
    pub source: String,
}

impl LabeledGroup {
    /// Lift a plain group into the labeled form
    pub fn from_target_group(group: TargetGroup, source: impl Into<String>) -> Self {
        Self {
            targets: group.targets.into_iter().map(address_set).collect(),
            labels: group.labels,
            source: source.into(),
        }
    }

    /// Addresses of all targets, in order
    ///
    /// A target without an address label yields an empty string.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .map(|t| t.get(ADDRESS_LABEL).map(String::as_str).unwrap_or_default())
    }
}

impl From<LabeledGroup> for TargetGroup {
    fn from(group: LabeledGroup) -> Self {
        let targets = group.addresses().map(str::to_string).collect();
        TargetGroup::new(targets, group.labels)
    }
}

impl fmt::Display for LabeledGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn address_set(address: String) -> LabelSet {
    LabelSet::from([(ADDRESS_LABEL.to_string(), address)])
}

#[derive(Serialize)]
struct SimplifiedRef<'a> {
    targets: Vec<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: &'a LabelSet,
}

#[derive(Deserialize)]
struct Simplified {
    #[serde(default)]
    targets: Vec<String>,
    #[serde(default)]
    labels: LabelSet,
    #[serde(flatten)]
    unknown: BTreeMap<String, IgnoredAny>,
}

impl Serialize for LabeledGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SimplifiedRef {
            targets: self.addresses().collect(),
            labels: &self.labels,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LabeledGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Simplified::deserialize(deserializer)?;
        if !raw.unknown.is_empty() {
            let keys: Vec<&str> = raw.unknown.keys().map(String::as_str).collect();
            return Err(de::Error::custom(format!(
                "unknown fields in target_group: {}",
                keys.join(", ")
            )));
        }

        Ok(Self {
            targets: raw.targets.into_iter().map(address_set).collect(),
            labels: raw.labels,
            source: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LabeledGroup {
        let mut labels = LabelSet::new();
        labels.insert("instance".to_string(), "a.local".to_string());
        labels.insert("__scheme__".to_string(), "https".to_string());

        LabeledGroup::from_target_group(
            TargetGroup::new(
                vec!["10.0.0.1:9100".to_string(), "10.0.0.2:9100".to_string()],
                labels,
            ),
            "_prometheus-https._tcp",
        )
    }

    #[test]
    fn test_targets_keyed_by_address_label() {
        let group = sample();
        assert_eq!(group.targets.len(), 2);
        assert_eq!(group.targets[0][ADDRESS_LABEL], "10.0.0.1:9100");
        assert_eq!(group.to_string(), "_prometheus-https._tcp");
    }

    #[test]
    fn test_yaml_uses_simplified_form() {
        let yaml = serde_yaml::to_string(&sample()).unwrap();
        assert!(yaml.contains("- 10.0.0.1:9100"));
        assert!(!yaml.contains(ADDRESS_LABEL));

        let decoded: LabeledGroup = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(decoded.targets, sample().targets);
        assert_eq!(decoded.labels, sample().labels);
        assert_eq!(serde_yaml::to_string(&decoded).unwrap(), yaml);
    }

    #[test]
    fn test_json_decodes_simple_schema() {
        let json = r#"{"targets": ["10.0.0.1:9100", "10.0.0.2:9100"], "labels": {"instance": "a.local", "__scheme__": "https"}}"#;
        let decoded: LabeledGroup = serde_json::from_str(json).unwrap();

        assert_eq!(decoded.targets, sample().targets);
        assert_eq!(decoded.labels, sample().labels);
        assert!(decoded.source.is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = "targets: ['a:1']\nfoo: 1\nbar: x\n";
        let err = serde_yaml::from_str::<LabeledGroup>(yaml).unwrap_err();
        assert!(
            err.to_string().contains("unknown fields in target_group: bar, foo"),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_unknown_json_fields_rejected() {
        let json = r#"{"targets": ["a:1"], "source": "x"}"#;
        let err = serde_json::from_str::<LabeledGroup>(json).unwrap_err();
        assert!(
            err.to_string().contains("unknown fields in target_group: source"),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_converts_back_to_target_group() {
        let plain: TargetGroup = sample().into();
        assert_eq!(plain.targets, vec!["10.0.0.1:9100", "10.0.0.2:9100"]);
        assert_eq!(plain.labels, sample().labels);
    }
}
