//! Target group model
//!
//! A [`TargetGroup`] is one discovered group of scrape targets sharing a
//! common label set. Groups are built from service browser responses by
//! [`TargetGroup::from_entry`], sorted into canonical order by
//! [`canonicalize`], and encoded with [`encode`] into the file format read
//! by Prometheus file-based service discovery:
//!
//! ```json
//! [
//! 	{
//! 		"targets": ["10.0.0.5:9100"],
//! 		"labels": {"__scheme__": "http", "instance": "host.local"}
//! 	}
//! ]
//! ```
//!
//! Empty `targets` and `labels` are omitted from the encoding.

mod labeled;

pub use labeled::{LabelSet, LabeledGroup};

use crate::error::Result;
use crate::traits::ServiceEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Label holding the scraped instance name
pub const INSTANCE_LABEL: &str = "instance";

/// Label selecting `http` or `https` for the scrape
pub const SCHEME_LABEL: &str = "__scheme__";

/// Label overriding the metrics path for the scrape
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

/// Prefix for labels carrying discovery metadata
pub const META_LABEL_PREFIX: &str = "__meta_";

/// Reserved label holding a target's address in the labeled form
pub const ADDRESS_LABEL: &str = "__address__";

/// Info field key that maps onto [`METRICS_PATH_LABEL`]
const PATH_FIELD: &str = "path";

/// A set of targets with a common label set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Target addresses (`host:port` or `[ipv6]:port`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Labels common to every target in the group
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl TargetGroup {
    /// Create a group from its targets and labels
    pub fn new(targets: Vec<String>, labels: BTreeMap<String, String>) -> Self {
        Self { targets, labels }
    }

    /// Build the group describing one discovered service instance
    ///
    /// `secure_marker` is the substring of the service name that selects the
    /// `https` scheme (e.g. `_prometheus-https._tcp`).
    pub fn from_entry(entry: &ServiceEntry, secure_marker: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            INSTANCE_LABEL.to_string(),
            entry.host.trim_end_matches('.').to_string(),
        );

        let scheme = if entry.name.contains(secure_marker) {
            "https"
        } else {
            "http"
        };
        labels.insert(SCHEME_LABEL.to_string(), scheme.to_string());

        for field in &entry.info_fields {
            let (key, value) = field.split_once('=').unwrap_or((field.as_str(), ""));
            let name = if key == PATH_FIELD {
                METRICS_PATH_LABEL.to_string()
            } else {
                format!("{META_LABEL_PREFIX}{key}")
            };
            labels.insert(name, value.to_string());
        }

        let address = match (entry.addr_v4, entry.addr_v6) {
            (Some(v4), _) => format!("{}:{}", v4, entry.port),
            (None, Some(v6)) => format!("[{}]:{}", v6, entry.port),
            (None, None) => format!("{}:{}", entry.host, entry.port),
        };

        Self {
            targets: vec![address],
            labels,
        }
    }

    /// First target address, the group's sort key
    pub fn first_target(&self) -> Option<&str> {
        self.targets.first().map(String::as_str)
    }
}

/// Canonical ordering of target groups
///
/// Groups compare by their first target address. A group without targets is
/// greater than any group with targets; two empty groups are equal.
pub fn canonical_cmp(a: &TargetGroup, b: &TargetGroup) -> Ordering {
    match (a.first_target(), b.first_target()) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort an aggregate into canonical order (stable)
pub fn canonicalize(groups: &mut [TargetGroup]) {
    groups.sort_by(canonical_cmp);
}

/// Wire format for committed output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-indented JSON array
    #[default]
    Json,
    /// YAML sequence of the same shape
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(crate::Error::config(format!(
                "Unknown output format '{}'. Supported formats: json, yaml",
                other
            ))),
        }
    }
}

/// Encode an aggregate in the given format
pub fn encode(groups: &[TargetGroup], format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Json => {
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            groups.serialize(&mut serializer)?;
            Ok(buf)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(groups)?.into_bytes()),
    }
}

/// Decode an aggregate previously produced by [`encode`]
pub fn decode(bytes: &[u8], format: OutputFormat) -> Result<Vec<TargetGroup>> {
    match format {
        OutputFormat::Json => Ok(serde_json::from_slice(bytes)?),
        OutputFormat::Yaml => Ok(serde_yaml::from_slice(bytes)?),
    }
}
