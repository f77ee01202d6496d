//! Derives the directed edge set: "resource A may initiate a connection to
//! resource B", justified by the firewall rules that permit it.
//!
//! Edges are identified by the ordered `(source, target)` pair; multiple
//! rules between the same pair accumulate as reasons on one edge, never as a
//! multi-edge.

use indexmap::IndexMap;
use ipnetwork::Ipv4Network;
use tracing::{debug, info, warn};

use crate::cidr;
use crate::errors::Finding;
use crate::resource::{IngressRule, NodeKind};
use crate::topology::Topology;

/// One directed reachability assertion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Connection {
    pub source: String,
    pub target: String,
    /// Empty for unconditional edges (gateway endpoints).
    pub reasons: Vec<IngressRule>,
}

/// Edge accumulator keyed on the ordered endpoint pair.
#[derive(Default)]
pub struct EdgeSet {
    edges: IndexMap<(String, String), Vec<IngressRule>>,
}

impl EdgeSet {
    pub fn add(&mut self, source: &str, target: &str, reason: Option<&IngressRule>) {
        let entry = self
            .edges
            .entry((source.to_string(), target.to_string()))
            .or_default();
        if let Some(rule) = reason {
            entry.push(rule.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.edges.retain(|(source, target), _| keep(source, target));
    }

    pub fn into_connections(self) -> Vec<Connection> {
        self.edges
            .into_iter()
            .map(|((source, target), reasons)| Connection {
                source,
                target,
                reasons,
            })
            .collect()
    }

    /// Re-point the sources named in `renames`, merging reason lists when
    /// two edges collapse onto the same pair.
    pub fn repoint_sources(&mut self, renames: &IndexMap<String, String>) {
        let old = std::mem::take(&mut self.edges);
        for ((source, target), reasons) in old {
            let source = renames.get(&source).cloned().unwrap_or(source);
            self.edges.entry((source, target)).or_default().extend(reasons);
        }
    }
}

/// A pseudo-node standing in for addresses outside the private space.
/// Always a source, never a target.
#[derive(Debug, Clone)]
pub struct ExternalRange {
    pub cidr: Ipv4Network,
    pub name: String,
    pub is_used: bool,
}

/// Discovered external ranges for one account, keyed by the prefix string
/// that doubles as the pseudo-node id.
#[derive(Default)]
pub struct ExternalRanges {
    pub ranges: IndexMap<String, ExternalRange>,
}

impl ExternalRanges {
    /// Get or lazily create the pseudo-node for a range, marking it used.
    fn touch(&mut self, net: Ipv4Network) -> String {
        let key = net.to_string();
        let entry = self.ranges.entry(key.clone()).or_insert(ExternalRange {
            cidr: net,
            name: key.clone(),
            is_used: false,
        });
        entry.is_used = true;
        key
    }

    pub fn used(&self) -> impl Iterator<Item = (&String, &ExternalRange)> {
        self.ranges.iter().filter(|(_, r)| r.is_used)
    }
}

pub struct EngineOptions {
    pub inter_rds_edges: bool,
}

/// Derive the full connection set for one account. Runs after the topology
/// is complete; the result still references pre-collapse external ranges.
pub fn derive_edges(
    topology: &Topology,
    options: &EngineOptions,
    findings: &mut Vec<Finding>,
) -> (EdgeSet, ExternalRanges) {
    let mut edges = EdgeSet::default();
    let mut externals = ExternalRanges::default();

    for vpc_id in topology.vpc_ids() {
        derive_vpc_edges(topology, &vpc_id, options, &mut edges, &mut externals, findings);
    }

    // Targets-only kinds never initiate connections. Database-to-database
    // edges survive when the operator opted in to seeing them.
    edges.retain(|source, target| {
        let source_node = topology.get(source);
        let can_egress = source_node
            .and_then(|n| n.record.as_ref())
            .map(|r| r.can_egress())
            // External-range pseudo-nodes are always valid sources
            .unwrap_or(true);
        can_egress
            || (options.inter_rds_edges
                && source_node.map(|n| n.kind) == Some(NodeKind::Rds)
                && topology.get(target).map(|n| n.kind) == Some(NodeKind::Rds))
    });

    edges.retain(|source, target| source != target);

    info!(
        "Derived {} edges, {} external ranges",
        edges.len(),
        externals.ranges.len()
    );
    (edges, externals)
}

fn derive_vpc_edges(
    topology: &Topology,
    vpc_id: &str,
    options: &EngineOptions,
    edges: &mut EdgeSet,
    externals: &mut ExternalRanges,
    findings: &mut Vec<Finding>,
) {
    let Some(vpc) = topology.get(vpc_id) else { return };

    // Index: firewall group id → member resource nodes in this vpc
    let members = topology.leaves_under(vpc_id);
    let mut group_index: IndexMap<&str, Vec<&crate::topology::Node>> = IndexMap::new();
    for node in &members {
        if let Some(record) = &node.record {
            for group_id in &record.security_groups {
                group_index.entry(group_id.as_str()).or_default().push(node);
            }
        }
    }

    // Networks whose members an internal rule source may match
    let mut scope: Vec<&crate::topology::Node> = vec![vpc];
    for peer in topology.peers_of(vpc_id) {
        if let Some(peer_node) = topology.get(&peer) {
            scope.push(peer_node);
        }
    }

    for group in topology.firewall_groups.values() {
        let in_this_vpc = group.vpc_id.as_deref() == Some(&vpc.local_id)
            || (group.vpc_id.is_none() && group_index.contains_key(group.id.as_str()));
        if !in_this_vpc {
            continue;
        }
        let Some(targets) = group_index.get(group.id.as_str()) else {
            debug!("Firewall group {} has no members in {}", group.id, vpc_id);
            continue;
        };

        for rule in &group.ingress {
            for cidr_str in &rule.cidrs {
                let range = match cidr::parse(cidr_str) {
                    Ok(range) => range,
                    Err(e) => {
                        findings.push(Finding::error(
                            "reachability",
                            format!("rule in {} skipped: {}", group.id, e),
                        ));
                        continue;
                    }
                };

                if !cidr::is_external(&range) {
                    add_internal_edges(topology, &scope, &range, targets, rule, edges);
                } else {
                    add_external_edges(
                        &members, &range, targets, rule, edges, externals,
                    );
                }
            }

            for source_group in &rule.source_groups {
                let Some(sources) = group_index.get(source_group.as_str()) else {
                    debug!(
                        "Rule in {} references group {} with no members here",
                        group.id, source_group
                    );
                    continue;
                };
                for source in sources {
                    for target in targets.iter() {
                        let both_databases = source.kind == NodeKind::Rds
                            && target.kind == NodeKind::Rds;
                        if both_databases && !options.inter_rds_edges {
                            continue;
                        }
                        edges.add(&source.id, &target.id, Some(rule));
                    }
                }
            }
        }
    }

    // Gateway endpoints accept traffic from everything co-located or peered,
    // with no firewall rule to cite
    for node in &members {
        let unrestricted = node
            .record
            .as_ref()
            .map(|r| r.has_unrestricted_ingress)
            .unwrap_or(false);
        if !unrestricted {
            continue;
        }
        for network in &scope {
            for source in topology.leaves_under(&network.id) {
                edges.add(&source.id, &node.id, None);
            }
        }
    }
}

/// Internal rule source: every resource in the vpc or its peers whose
/// address falls inside the rule's range may reach the group's members.
fn add_internal_edges(
    topology: &Topology,
    scope: &[&crate::topology::Node],
    range: &Ipv4Network,
    targets: &[&crate::topology::Node],
    rule: &IngressRule,
    edges: &mut EdgeSet,
) {
    for network in scope {
        let overlaps = network
            .cidr
            .map(|net| cidr::overlaps(&net, range))
            .unwrap_or(false);
        if !overlaps {
            continue;
        }
        for source in topology.leaves_under(&network.id) {
            let in_range = source
                .record
                .as_ref()
                .map(|r| r.ips.iter().any(|ip| cidr::contains_ip(range, ip)))
                .unwrap_or(false);
            if !in_range {
                continue;
            }
            for target in targets {
                edges.add(&source.id, &target.id, Some(rule));
            }
        }
    }
}

/// External rule source: public members get an edge from the range's
/// pseudo-node. A non-public member behind an any-address rule is instead
/// modeled as reachable from every co-located resource; that over-reports
/// rather than hiding a hole.
fn add_external_edges(
    members: &[&crate::topology::Node],
    range: &Ipv4Network,
    targets: &[&crate::topology::Node],
    rule: &IngressRule,
    edges: &mut EdgeSet,
    externals: &mut ExternalRanges,
) {
    for target in targets {
        let is_public = target
            .record
            .as_ref()
            .map(|r| r.is_public)
            .unwrap_or(false);
        if is_public {
            if !cidr::is_unblockable(range) {
                warn!(
                    "{} accepts ingress from {} on {:?}",
                    target.id,
                    range,
                    rule.port_range()
                );
            }
            let range_id = externals.touch(*range);
            edges.add(&range_id, &target.id, Some(rule));
        } else if cidr::is_any(range) {
            for source in members {
                edges.add(&source.id, &target.id, Some(rule));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{FirewallGroup, ResourceRecord};
    use crate::topology::Node;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn options() -> EngineOptions {
        EngineOptions { inter_rds_edges: false }
    }

    fn leaf(kind: NodeKind, id: &str, ips: &[&str], groups: &[&str], public: bool) -> Node {
        let record = ResourceRecord {
            kind,
            local_id: id.to_string(),
            name: id.to_string(),
            vpc_id: Some("vpc-1".into()),
            candidate_subnets: vec![],
            security_groups: groups.iter().map(|s| s.to_string()).collect(),
            ips: ips.iter().map(|s| s.parse().unwrap()).collect(),
            is_public: public,
            has_unrestricted_ingress: false,
            tags: HashMap::new(),
            attributes: serde_json::Value::Null,
        };
        Node {
            id: id.to_string(),
            local_id: id.to_string(),
            name: id.to_string(),
            kind,
            parent: Some("subnet-a".into()),
            children: IndexMap::new(),
            cidr: None,
            record: Some(Arc::new(record)),
        }
    }

    fn rule(group: &str, cidrs: &[&str], source_groups: &[&str], from: i64, to: i64) -> IngressRule {
        IngressRule {
            group_id: group.to_string(),
            protocol: "tcp".into(),
            from_port: Some(from),
            to_port: Some(to),
            cidrs: cidrs.iter().map(|s| s.to_string()).collect(),
            source_groups: source_groups.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn base_topology() -> Topology {
        let mut t = Topology::new("acct");
        t.insert_child(Node::container(
            "acct/us-east-1".into(),
            "us-east-1".into(),
            "us-east-1".into(),
            NodeKind::Region,
            Some("acct".into()),
        ));
        let mut vpc = Node::container(
            "vpc-1".into(),
            "vpc-1".into(),
            "vpc-1".into(),
            NodeKind::Vpc,
            Some("acct/us-east-1".into()),
        );
        vpc.cidr = Some(crate::cidr::parse("10.0.0.0/16").unwrap());
        t.insert_child(vpc);
        t.insert_child(Node::container(
            "vpc-1/az-a".into(),
            "az-a".into(),
            "az-a".into(),
            NodeKind::Az,
            Some("vpc-1".into()),
        ));
        t.insert_child(Node::container(
            "subnet-a".into(),
            "subnet-a".into(),
            "subnet-a".into(),
            NodeKind::Subnet,
            Some("vpc-1/az-a".into()),
        ));
        t
    }

    fn add_group(t: &mut Topology, id: &str, ingress: Vec<IngressRule>) {
        t.firewall_groups.insert(
            id.to_string(),
            FirewallGroup {
                id: id.to_string(),
                name: id.to_string(),
                vpc_id: Some("vpc-1".into()),
                ingress,
            },
        );
    }

    fn pairs(edges: &EdgeSet) -> Vec<(String, String)> {
        edges.edges.keys().cloned().collect()
    }

    #[test]
    fn internal_rule_matches_member_by_address() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-web", &["10.0.0.5"], &["sg-web"], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-app", &["10.0.1.9"], &["sg-app"], false));
        add_group(&mut t, "sg-app", vec![rule("sg-app", &["10.0.0.0/24"], &[], 443, 443)]);
        add_group(&mut t, "sg-web", vec![]);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        // Only i-web's address is inside 10.0.0.0/24
        assert_eq!(pairs(&edges), vec![("i-web".to_string(), "i-app".to_string())]);
    }

    #[test]
    fn internal_rule_reaches_across_peering() {
        let mut t = base_topology();
        let mut vpc2 = Node::container(
            "vpc-2".into(),
            "vpc-2".into(),
            "vpc-2".into(),
            NodeKind::Vpc,
            Some("acct/us-east-1".into()),
        );
        vpc2.cidr = Some(crate::cidr::parse("10.1.0.0/16").unwrap());
        t.insert_child(vpc2);
        let mut peer_leaf = leaf(NodeKind::Ec2, "i-peer", &["10.1.0.7"], &[], false);
        peer_leaf.parent = Some("vpc-2".into());
        t.insert_child(peer_leaf);
        t.insert_child(leaf(NodeKind::Ec2, "i-app", &["10.0.1.9"], &["sg-app"], false));
        t.add_peering("vpc-1", "vpc-2");
        // Rule range covers the peer network even though it is a strict
        // superset of neither vpc cidr
        add_group(&mut t, "sg-app", vec![rule("sg-app", &["10.1.0.0/24"], &[], 22, 22)]);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        assert_eq!(pairs(&edges), vec![("i-peer".to_string(), "i-app".to_string())]);
    }

    #[test]
    fn external_rule_creates_pseudo_node_for_public_target() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Elb, "lb-1", &[], &["sg-lb"], true));
        add_group(&mut t, "sg-lb", vec![rule("sg-lb", &["0.0.0.0/0"], &[], 443, 443)]);

        let mut findings = Vec::new();
        let (edges, externals) = derive_edges(&t, &options(), &mut findings);
        assert_eq!(pairs(&edges), vec![("0.0.0.0/0".to_string(), "lb-1".to_string())]);
        let used: Vec<_> = externals.used().map(|(id, _)| id.clone()).collect();
        assert_eq!(used, vec!["0.0.0.0/0"]);
    }

    #[test]
    fn any_address_rule_on_private_target_approximates_colocated_sources() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-quiet", &["10.0.0.8"], &["sg-open"], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-other", &["10.0.0.9"], &[], false));
        add_group(&mut t, "sg-open", vec![rule("sg-open", &["0.0.0.0/0"], &[], 8080, 8080)]);

        let mut findings = Vec::new();
        let (edges, externals) = derive_edges(&t, &options(), &mut findings);
        // No pseudo-node: the target is not public
        assert_eq!(externals.used().count(), 0);
        assert_eq!(pairs(&edges), vec![("i-other".to_string(), "i-quiet".to_string())]);
    }

    #[test]
    fn narrower_external_rule_on_private_target_yields_nothing() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-quiet", &["10.0.0.8"], &["sg-x"], false));
        add_group(&mut t, "sg-x", vec![rule("sg-x", &["8.8.8.0/24"], &[], 53, 53)]);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        assert!(edges.is_empty());
    }

    #[test]
    fn group_reference_edges_and_database_suppression() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-app", &["10.0.0.5"], &["sg-app"], false));
        t.insert_child(leaf(NodeKind::Rds, "db-1", &[], &["sg-db"], false));
        t.insert_child(leaf(NodeKind::Rds, "db-2", &[], &["sg-db"], false));
        add_group(
            &mut t,
            "sg-db",
            vec![rule("sg-db", &[], &["sg-app", "sg-db"], 5432, 5432)],
        );
        add_group(&mut t, "sg-app", vec![]);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        let got = pairs(&edges);
        // app can reach both databases; database-to-database is suppressed
        assert!(got.contains(&("i-app".to_string(), "db-1".to_string())));
        assert!(got.contains(&("i-app".to_string(), "db-2".to_string())));
        assert_eq!(got.len(), 2);

        let (edges, _) = derive_edges(
            &t,
            &EngineOptions { inter_rds_edges: true },
            &mut findings,
        );
        let got = pairs(&edges);
        assert!(got.contains(&("db-1".to_string(), "db-2".to_string())));
        assert!(got.contains(&("db-2".to_string(), "db-1".to_string())));
        // Self-loops are still removed
        assert!(!got.contains(&("db-1".to_string(), "db-1".to_string())));
    }

    #[test]
    fn gateway_endpoint_reachable_from_everything_with_no_reasons() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-a", &["10.0.0.5"], &[], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-b", &["10.0.0.6"], &[], false));
        let mut endpoint = leaf(NodeKind::VpcEndpoint, "vpce-1", &[], &[], false);
        {
            let record = Arc::get_mut(endpoint.record.as_mut().unwrap()).unwrap();
            record.has_unrestricted_ingress = true;
        }
        endpoint.parent = Some("vpc-1".into());
        t.insert_child(endpoint);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        let connections = edges.into_connections();
        assert_eq!(connections.len(), 2);
        for connection in &connections {
            assert_eq!(connection.target, "vpce-1");
            assert!(connection.reasons.is_empty());
        }
    }

    #[test]
    fn egress_invariant_holds() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Rds, "db-1", &["10.0.0.4"], &[], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-a", &["10.0.0.5"], &["sg-a"], false));
        // The rule range covers the database's address, but databases never
        // initiate connections
        add_group(&mut t, "sg-a", vec![rule("sg-a", &["10.0.0.0/16"], &[], 443, 443)]);

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        for (source, _) in edges.edges.keys() {
            let can_egress = t
                .get(source)
                .and_then(|n| n.record.as_ref())
                .map(|r| r.can_egress())
                .unwrap_or(true);
            assert!(can_egress, "{} must not be an edge source", source);
        }
        assert!(!pairs(&edges).iter().any(|(s, _)| s == "db-1"));
    }

    #[test]
    fn malformed_rule_cidr_excludes_only_that_rule() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-a", &["10.0.0.5"], &["sg-a"], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-b", &["10.0.0.6"], &[], false));
        add_group(
            &mut t,
            "sg-a",
            vec![
                rule("sg-a", &["bogus/99"], &[], 80, 80),
                rule("sg-a", &["10.0.0.0/16"], &[], 443, 443),
            ],
        );

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        assert_eq!(findings.len(), 1);
        assert_eq!(pairs(&edges), vec![("i-b".to_string(), "i-a".to_string())]);
    }

    #[test]
    fn duplicate_rules_accumulate_on_one_edge() {
        let mut t = base_topology();
        t.insert_child(leaf(NodeKind::Ec2, "i-a", &["10.0.0.5"], &["sg-a"], false));
        t.insert_child(leaf(NodeKind::Ec2, "i-b", &["10.0.0.6"], &[], false));
        add_group(
            &mut t,
            "sg-a",
            vec![
                rule("sg-a", &["10.0.0.0/16"], &[], 80, 80),
                rule("sg-a", &["10.0.0.0/24"], &[], 443, 443),
            ],
        );

        let mut findings = Vec::new();
        let (edges, _) = derive_edges(&t, &options(), &mut findings);
        let connections = edges.into_connections();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].reasons.len(), 2);
    }
}
