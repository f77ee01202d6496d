//! The ownership tree for one account.
//!
//! account → region → vpc → az → subnet → resource, held as an arena of
//! nodes keyed by id. Peering is deliberately not a second parent pointer;
//! it lives in a separate adjacency set keyed by the vpc node id.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use ipnetwork::Ipv4Network;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cidr;
use crate::errors::Finding;
use crate::resource::{self, CompiledFilter, FirewallGroup, NodeKind, ResourceRecord};
use crate::snapshot::SnapshotSource;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub local_id: String,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<String>,
    /// Children keyed by local id; insertion order is not significant but
    /// IndexMap keeps runs deterministic.
    pub children: IndexMap<String, String>,
    /// Address range for vpc and subnet nodes.
    pub cidr: Option<Ipv4Network>,
    /// Shared attribute snapshot for leaf resources.
    pub record: Option<Arc<ResourceRecord>>,
}

impl Node {
    pub(crate) fn container(
        id: String,
        local_id: String,
        name: String,
        kind: NodeKind,
        parent: Option<String>,
    ) -> Self {
        Self {
            id,
            local_id,
            name,
            kind,
            parent,
            children: IndexMap::new(),
            cidr: None,
            record: None,
        }
    }
}

/// The assembled tree plus the peering relation and firewall-group catalog
/// for one account.
pub struct Topology {
    pub account: String,
    pub nodes: IndexMap<String, Node>,
    /// vpc node id → peer vpc node ids (symmetric).
    pub peering: HashMap<String, BTreeSet<String>>,
    /// Firewall groups by id, account-wide.
    pub firewall_groups: IndexMap<String, FirewallGroup>,
    pending_peerings: Vec<(String, String)>,
}

impl Topology {
    pub fn new(account: &str) -> Self {
        let mut nodes = IndexMap::new();
        nodes.insert(
            account.to_string(),
            Node::container(
                account.to_string(),
                account.to_string(),
                account.to_string(),
                NodeKind::Account,
                None,
            ),
        );
        Self {
            account: account.to_string(),
            nodes,
            peering: HashMap::new(),
            firewall_groups: IndexMap::new(),
            pending_peerings: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn insert_child(&mut self, node: Node) {
        if let Some(parent_id) = &node.parent {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                debug_assert!(parent.kind.is_container());
                parent.children.insert(node.local_id.clone(), node.id.clone());
            }
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn find_by_kind_and_local_id(&self, kind: NodeKind, local_id: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.kind == kind && n.local_id == local_id)
    }

    pub fn vpc_node_id(&self, vpc_local_id: &str) -> Option<String> {
        self.find_by_kind_and_local_id(NodeKind::Vpc, vpc_local_id)
            .map(|n| n.id.clone())
    }

    /// All vpc node ids, account-wide.
    pub fn vpc_ids(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.kind == NodeKind::Vpc)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Leaf resource nodes in the subtree rooted at `id`.
    pub fn leaves_under(&self, id: &str) -> Vec<&Node> {
        let mut leaves = Vec::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                if node.record.is_some() {
                    leaves.push(node);
                }
                stack.extend(node.children.values().cloned());
            }
        }
        leaves
    }

    pub fn peers_of(&self, vpc_id: &str) -> BTreeSet<String> {
        self.peering.get(vpc_id).cloned().unwrap_or_default()
    }

    /// Place one logical resource, duplicating it across every candidate
    /// subnet that exists. All copies share `record`; only the node identity
    /// differs. A resource with no placeable subnet but a known network
    /// attaches directly to that network.
    pub fn place_resource(&mut self, record: Arc<ResourceRecord>, findings: &mut Vec<Finding>) {
        let mut subnet_ids: Vec<(String, String)> = Vec::new(); // (subnet local id, node id)
        for subnet in &record.candidate_subnets {
            match self.find_by_kind_and_local_id(NodeKind::Subnet, subnet) {
                Some(node) => subnet_ids.push((subnet.clone(), node.id.clone())),
                None => {
                    findings.push(Finding::warning(
                        record.kind.as_str(),
                        format!(
                            "{} references unknown subnet {}, placement skipped",
                            record.local_id, subnet
                        ),
                    ));
                }
            }
        }

        if subnet_ids.is_empty() {
            // Fall back to direct network attachment (e.g. gateway endpoints)
            let vpc_node_id = record.vpc_id.as_deref().and_then(|v| self.vpc_node_id(v));
            match vpc_node_id {
                Some(parent) => {
                    self.insert_child(Node {
                        id: record.local_id.clone(),
                        local_id: record.local_id.clone(),
                        name: record.name.clone(),
                        kind: record.kind,
                        parent: Some(parent),
                        children: IndexMap::new(),
                        cidr: None,
                        record: Some(record),
                    });
                }
                None => {
                    warn!(
                        "Dropping {} {}: no resolvable subnet or network",
                        record.kind.as_str(),
                        record.local_id
                    );
                    findings.push(Finding::warning(
                        record.kind.as_str(),
                        format!("{} dropped: no resolvable subnet or network", record.local_id),
                    ));
                }
            }
            return;
        }

        let duplicate = subnet_ids.len() > 1;
        for (subnet_local_id, subnet_node_id) in subnet_ids {
            let id = if duplicate {
                format!("{}.{}", record.local_id, subnet_local_id)
            } else {
                record.local_id.clone()
            };
            self.insert_child(Node {
                local_id: id.clone(),
                id,
                name: record.name.clone(),
                kind: record.kind,
                parent: Some(subnet_node_id),
                children: IndexMap::new(),
                cidr: None,
                record: Some(Arc::clone(&record)),
            });
        }
    }

    /// Link two vpcs symmetrically once an accepted peering names both.
    pub fn add_peering(&mut self, a: &str, b: &str) {
        self.peering
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.peering
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    /// Resolve peering records collected during region builds. Runs after
    /// all regions so cross-region peerings find both endpoints.
    pub fn resolve_peerings(&mut self, findings: &mut Vec<Finding>) {
        let pending = std::mem::take(&mut self.pending_peerings);
        for (requester, accepter) in pending {
            match (self.vpc_node_id(&requester), self.vpc_node_id(&accepter)) {
                (Some(a), Some(b)) => self.add_peering(&a, &b),
                _ => findings.push(Finding::warning(
                    "peering",
                    format!("peering {} <-> {} names a vpc outside the snapshot", requester, accepter),
                )),
            }
        }
    }
}

fn str_of(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

fn name_from_tags(item: &Value, fallback: &str) -> String {
    item.get("Tags")
        .and_then(Value::as_array)
        .and_then(|tags| {
            tags.iter().find_map(|t| {
                (t.get("Key")?.as_str()? == "Name")
                    .then(|| t.get("Value")?.as_str().map(str::to_string))
                    .flatten()
            })
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Build one region's branch of the tree: vpcs, zones, subnets, then every
/// resource kind, then record peering for later resolution.
pub fn build_region(
    topology: &mut Topology,
    snapshot: &dyn SnapshotSource,
    region: &str,
    filter: &Option<CompiledFilter>,
    findings: &mut Vec<Finding>,
) {
    let account = topology.account.clone();
    let region_id = format!("{}/{}", account, region);
    topology.insert_child(Node::container(
        region_id.clone(),
        region.to_string(),
        region.to_string(),
        NodeKind::Region,
        Some(account.clone()),
    ));

    // Networks
    let vpcs = snapshot.query(&account, region, "ec2", "describe-vpcs");
    let mut vpc_count = 0usize;
    for item in vpcs
        .as_ref()
        .and_then(|v| v.get("Vpcs"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(vpc_id) = str_of(item, "VpcId") else {
            findings.push(Finding::warning("vpc", "vpc without VpcId skipped"));
            continue;
        };
        let vpc_cidr = match str_of(item, "CidrBlock").as_deref().map(cidr::parse) {
            Some(Ok(net)) => Some(net),
            Some(Err(e)) => {
                findings.push(Finding::error("vpc", format!("{}: {}", vpc_id, e)));
                None
            }
            None => None,
        };
        let mut node = Node::container(
            vpc_id.clone(),
            vpc_id.clone(),
            name_from_tags(item, &vpc_id),
            NodeKind::Vpc,
            Some(region_id.clone()),
        );
        node.cidr = vpc_cidr;
        topology.insert_child(node);
        vpc_count += 1;
    }

    // Subnets, creating the zone level from each subnet's declared membership
    let subnets = snapshot.query(&account, region, "ec2", "describe-subnets");
    for item in subnets
        .as_ref()
        .and_then(|v| v.get("Subnets"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(subnet_id) = str_of(item, "SubnetId") else {
            findings.push(Finding::warning("subnet", "subnet without SubnetId skipped"));
            continue;
        };
        let Some(vpc_id) = str_of(item, "VpcId").filter(|v| topology.nodes.contains_key(v)) else {
            warn!("Subnet {} references an unknown vpc, dropped", subnet_id);
            findings.push(Finding::warning(
                "subnet",
                format!("{} references an unknown vpc, dropped", subnet_id),
            ));
            continue;
        };
        let az_name = str_of(item, "AvailabilityZone").unwrap_or_else(|| "no-az".to_string());
        let az_id = format!("{}/{}", vpc_id, az_name);
        if !topology.nodes.contains_key(&az_id) {
            topology.insert_child(Node::container(
                az_id.clone(),
                az_name.clone(),
                az_name,
                NodeKind::Az,
                Some(vpc_id.clone()),
            ));
        }
        let subnet_cidr = match str_of(item, "CidrBlock").as_deref().map(cidr::parse) {
            Some(Ok(net)) => Some(net),
            Some(Err(e)) => {
                findings.push(Finding::error("subnet", format!("{}: {}", subnet_id, e)));
                None
            }
            None => None,
        };
        let mut node = Node::container(
            subnet_id.clone(),
            subnet_id.clone(),
            name_from_tags(item, &subnet_id),
            NodeKind::Subnet,
            Some(az_id),
        );
        node.cidr = subnet_cidr;
        topology.insert_child(node);
    }

    // Every modeled resource kind
    let mut records: Vec<ResourceRecord> = Vec::new();
    records.extend(resource::parse_instances(
        &snapshot.query(&account, region, "ec2", "describe-instances"),
        findings,
    ));
    records.extend(resource::parse_classic_load_balancers(
        &snapshot.query(&account, region, "elb", "describe-load-balancers"),
        findings,
    ));
    records.extend(resource::parse_modern_load_balancers(
        &snapshot.query(&account, region, "elbv2", "describe-load-balancers"),
        findings,
    ));
    records.extend(resource::parse_db_instances(
        &snapshot.query(&account, region, "rds", "describe-db-instances"),
        findings,
    ));
    records.extend(resource::parse_vpc_endpoints(
        &snapshot.query(&account, region, "ec2", "describe-vpc-endpoints"),
        findings,
    ));
    records.extend(resource::parse_ecs_tasks(
        &snapshot.query(&account, region, "ecs", "describe-tasks"),
        findings,
    ));
    records.extend(resource::parse_functions(
        &snapshot.query(&account, region, "lambda", "list-functions"),
        findings,
    ));
    records.extend(resource::parse_warehouse_clusters(
        &snapshot.query(&account, region, "redshift", "describe-clusters"),
        findings,
    ));
    if let Some(domains) = snapshot.query(&account, region, "es", "list-domain-names") {
        for entry in domains
            .get("DomainNames")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let Some(domain) = str_of(entry, "DomainName") else { continue };
            if let Some(detail) =
                snapshot.query_param(&account, region, "es", "describe-elasticsearch-domain", &domain)
            {
                if let Some(record) = resource::parse_search_domain(&detail, findings) {
                    records.push(record);
                }
            }
        }
    }

    let mut placed = 0usize;
    let total = records.len();
    for record in records {
        if !record.matches_filter(filter) {
            debug!("{} {} filtered out", record.kind.as_str(), record.local_id);
            continue;
        }
        topology.place_resource(Arc::new(record), findings);
        placed += 1;
    }

    // Firewall groups feed the reachability engine, not the tree
    let mut group_findings = Vec::new();
    for group in resource::parse_firewall_groups(
        &snapshot.query(&account, region, "ec2", "describe-security-groups"),
        &mut group_findings,
    ) {
        topology.firewall_groups.insert(group.id.clone(), group);
    }
    findings.append(&mut group_findings);

    // Peering records; resolution waits until all regions are in
    for item in snapshot
        .query(&account, region, "ec2", "describe-vpc-peering-connections")
        .as_ref()
        .and_then(|v| v.get("VpcPeeringConnections"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let active = item
            .get("Status")
            .and_then(|s| s.get("Code"))
            .and_then(Value::as_str)
            == Some("active");
        if !active {
            continue;
        }
        let requester = item
            .get("RequesterVpcInfo")
            .and_then(|i| str_of(i, "VpcId"));
        let accepter = item.get("AccepterVpcInfo").and_then(|i| str_of(i, "VpcId"));
        if let (Some(requester), Some(accepter)) = (requester, accepter) {
            topology.pending_peerings.push((requester, accepter));
        }
    }

    info!(
        "Region {}: {} vpcs, {} of {} resources placed",
        region, vpc_count, placed, total
    );
}
