//! Operator configuration.
//!
//! ```text
//! Config
//!   ├── cidrs: IndexMap<cidr, NamedRange>   (named external ranges)
//!   └── filter: Option<ResourceFilter>      (tag filter applied before placement)
//! ```
//!
//! The `cidrs` map keeps file order (IndexMap) because the collapser breaks
//! equal-size ties by first match in configuration order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cidrs: IndexMap<String, NamedRange>,
    #[serde(default)]
    pub filter: Option<ResourceFilter>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NamedRange {
    pub name: String,
}

/// Keep only resources whose tag `key` has a value matching `value_regex`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResourceFilter {
    pub key: String,
    pub value_regex: String,
}

/// Output-shaping options, normally taken from CLI flags.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutputOptions {
    /// Include resource-to-resource edges; when false only Internet-origin
    /// edges survive projection.
    pub internal_edges: bool,
    /// Include edges where both endpoints are database instances.
    pub inter_rds_edges: bool,
    /// Show availability zones as a hierarchy level.
    pub show_azs: bool,
    /// Merge leaves under the same parent that share this tag's value.
    pub collapse_by_tag: Option<String>,
    /// Attach raw per-resource attribute payloads to exported nodes.
    pub node_data: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            internal_edges: true,
            inter_rds_edges: false,
            show_azs: true,
            collapse_by_tag: None,
            node_data: true,
        }
    }
}

pub fn load_config(content: &str) -> Result<Config, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

/// Starter configuration written by `cloudscope init`.
pub fn sample_config() -> &'static str {
    r#"# Named external ranges; discovered Internet ranges collapse to the
# smallest named range that contains them.
cidrs:
  "0.0.0.0/0":
    name: Public
  "203.0.113.0/24":
    name: Office
# Optional tag filter; only resources whose tag matches are audited.
# filter:
#   key: environment
#   value_regex: "^prod.*"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialization() {
        let yaml_str = r#"
cidrs:
  "1.1.1.0/24":
    name: Wide
  "1.1.1.0/28":
    name: Narrow
filter:
  key: team
  value_regex: "^payments$"
"#;
        let config: Config = load_config(yaml_str).unwrap();
        assert_eq!(config.cidrs.len(), 2);
        // File order is preserved
        let names: Vec<_> = config.cidrs.values().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Wide", "Narrow"]);
        assert_eq!(config.filter.unwrap().key, "team");
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = load_config(sample_config()).unwrap();
        assert_eq!(config.cidrs.len(), 2);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_empty_config() {
        let config: Config = load_config("{}").unwrap();
        assert!(config.cidrs.is_empty());
    }
}
