//! Collapses discovered external ranges into operator-named ranges.
//!
//! Runs once per account, after every network has contributed edges. The
//! context is threaded through explicitly; there is no ambient state.

use indexmap::IndexMap;
use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::cidr;
use crate::config::Config;
use crate::errors::Finding;
use crate::reachability::{EdgeSet, ExternalRange, ExternalRanges};

/// Named ranges from configuration, in file order, plus nothing else: the
/// collapser reads only the configuration present at the start of the run.
pub struct CollapseContext {
    named: Vec<(Ipv4Network, String)>,
}

impl CollapseContext {
    pub fn from_config(config: &Config, findings: &mut Vec<Finding>) -> Self {
        let mut named = Vec::new();
        for (cidr_str, range) in &config.cidrs {
            match cidr::parse(cidr_str) {
                Ok(net) => named.push((net, range.name.clone())),
                Err(e) => findings.push(Finding::error(
                    "config",
                    format!("named range '{}' ignored: {}", range.name, e),
                )),
            }
        }
        Self { named }
    }

    /// The most specific named range containing `range`. Equal-size ties go
    /// to the first match in configuration order.
    fn best_named_range(&self, range: &Ipv4Network) -> Option<(Ipv4Network, &str)> {
        self.named
            .iter()
            .filter(|(net, _)| cidr::contains(net, range))
            .min_by_key(|(net, _)| cidr::size(net))
            .map(|(net, name)| (*net, name.as_str()))
    }
}

/// Collapse used ranges onto their named identity, merge ranges landing on
/// the same name, re-point edge sources, and drop unused ranges.
pub fn collapse_external_ranges(
    externals: ExternalRanges,
    edges: &mut EdgeSet,
    context: &CollapseContext,
) -> IndexMap<String, ExternalRange> {
    let mut renames: IndexMap<String, String> = IndexMap::new();
    let mut collapsed: IndexMap<String, ExternalRange> = IndexMap::new();

    for (id, range) in externals.ranges {
        if !range.is_used {
            debug!("Dropping unused external range {}", id);
            continue;
        }
        match context.best_named_range(&range.cidr) {
            Some((net, name)) => {
                let new_id = net.to_string();
                if new_id != id {
                    renames.insert(id, new_id.clone());
                }
                collapsed.entry(new_id).or_insert(ExternalRange {
                    cidr: net,
                    name: name.to_string(),
                    is_used: true,
                });
            }
            None => {
                collapsed.insert(id, range);
            }
        }
    }

    edges.repoint_sources(&renames);
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Config};

    fn context(yaml: &str) -> CollapseContext {
        let config: Config = load_config(yaml).unwrap();
        let mut findings = Vec::new();
        let context = CollapseContext::from_config(&config, &mut findings);
        assert!(findings.is_empty());
        context
    }

    fn externals_with(used: &[&str]) -> ExternalRanges {
        let mut externals = ExternalRanges::default();
        for cidr_str in used {
            let net = crate::cidr::parse(cidr_str).unwrap();
            externals.ranges.insert(
                net.to_string(),
                ExternalRange { cidr: net, name: net.to_string(), is_used: true },
            );
        }
        externals
    }

    #[test]
    fn smallest_containing_named_range_wins() {
        let context = context(
            r#"
cidrs:
  "1.1.1.0/24":
    name: Wide
  "1.1.1.0/28":
    name: Narrow
"#,
        );
        let mut edges = EdgeSet::default();
        edges.add("1.1.1.1/32", "target-1", None);
        let collapsed =
            collapse_external_ranges(externals_with(&["1.1.1.1/32"]), &mut edges, &context);

        assert_eq!(collapsed.len(), 1);
        let range = &collapsed["1.1.1.0/28"];
        assert_eq!(range.name, "Narrow");
        let connections = edges.into_connections();
        assert_eq!(connections[0].source, "1.1.1.0/28");
    }

    #[test]
    fn equal_size_tie_breaks_on_config_order() {
        // Both /0 entries contain everything; first in the file wins
        let context = context(
            r#"
cidrs:
  "0.0.0.0/0":
    name: First
"#,
        );
        let mut edges = EdgeSet::default();
        let collapsed =
            collapse_external_ranges(externals_with(&["9.9.9.9/32"]), &mut edges, &context);
        assert_eq!(collapsed["0.0.0.0/0"].name, "First");
    }

    #[test]
    fn ranges_merging_to_one_name_share_a_node() {
        let context = context(
            r#"
cidrs:
  "203.0.113.0/24":
    name: Office
"#,
        );
        let mut edges = EdgeSet::default();
        edges.add("203.0.113.5/32", "lb-1", None);
        edges.add("203.0.113.9/32", "lb-1", None);
        let collapsed = collapse_external_ranges(
            externals_with(&["203.0.113.5/32", "203.0.113.9/32"]),
            &mut edges,
            &context,
        );

        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed["203.0.113.0/24"].name, "Office");
        // The two edges merged onto one pair
        let connections = edges.into_connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].source, "203.0.113.0/24");
    }

    #[test]
    fn unused_and_unnamed_ranges() {
        let context = context("{}");
        let mut externals = externals_with(&["8.8.8.8/32"]);
        externals.ranges.insert(
            "7.7.7.7/32".to_string(),
            ExternalRange {
                cidr: crate::cidr::parse("7.7.7.7/32").unwrap(),
                name: "7.7.7.7/32".to_string(),
                is_used: false,
            },
        );
        let mut edges = EdgeSet::default();
        let collapsed = collapse_external_ranges(externals, &mut edges, &context);
        // Unused dropped; used-but-unnamed kept under its own identity
        assert_eq!(collapsed.len(), 1);
        assert!(collapsed.contains_key("8.8.8.8/32"));
    }

    #[test]
    fn malformed_named_range_is_a_finding() {
        let config: Config = load_config(
            r#"
cidrs:
  "not-a-range":
    name: Broken
"#,
        )
        .unwrap();
        let mut findings = Vec::new();
        let context = CollapseContext::from_config(&config, &mut findings);
        assert_eq!(findings.len(), 1);
        assert!(context.named.is_empty());
    }
}
