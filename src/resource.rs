//! The modeled resource hierarchy.
//!
//! Every auditable resource kind is a variant of [`NodeKind`], so the
//! per-kind handling in the projector and the exposure summary stays an
//! exhaustive match. Parsed resources share one immutable
//! [`ResourceRecord`]; placement later creates one lightweight tree node per
//! candidate subnet without copying the record.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ResourceFilter;
use crate::errors::Finding;

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    // Containers
    Account,
    Region,
    Vpc,
    Az,
    Subnet,
    // Leaf resources
    Ec2,
    Elb,
    Elbv2,
    Rds,
    VpcEndpoint,
    EcsTask,
    Lambda,
    Redshift,
    Elasticsearch,
    // Pseudo-node for discovered external ranges
    ExternalCidr,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Account => "account",
            NodeKind::Region => "region",
            NodeKind::Vpc => "vpc",
            NodeKind::Az => "az",
            NodeKind::Subnet => "subnet",
            NodeKind::Ec2 => "ec2",
            NodeKind::Elb => "elb",
            NodeKind::Elbv2 => "elbv2",
            NodeKind::Rds => "rds",
            NodeKind::VpcEndpoint => "vpc_endpoint",
            NodeKind::EcsTask => "ecs_task",
            NodeKind::Lambda => "lambda",
            NodeKind::Redshift => "redshift",
            NodeKind::Elasticsearch => "elasticsearch",
            NodeKind::ExternalCidr => "ip",
        }
    }

    /// Only containers may own children; resource kinds are always leaves.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Account | NodeKind::Region | NodeKind::Vpc | NodeKind::Az | NodeKind::Subnet
        )
    }

    /// Kinds that can only be reachability targets, never sources.
    pub fn can_egress(&self) -> bool {
        !matches!(
            self,
            NodeKind::Rds | NodeKind::Redshift | NodeKind::Elasticsearch | NodeKind::VpcEndpoint
        )
    }
}

/// The immutable attribute snapshot behind one logical resource.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub kind: NodeKind,
    /// Provider identifier, unique within the account.
    pub local_id: String,
    pub name: String,
    pub vpc_id: Option<String>,
    /// Subnets the resource could occupy; more than one triggers placement
    /// duplication.
    pub candidate_subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub ips: Vec<Ipv4Addr>,
    pub is_public: bool,
    /// Gateway endpoints bypass firewall groups entirely.
    pub has_unrestricted_ingress: bool,
    pub tags: HashMap<String, String>,
    /// The captured item as-is, for export and per-kind endpoint lookup.
    pub attributes: Value,
}

impl ResourceRecord {
    pub fn can_egress(&self) -> bool {
        self.kind.can_egress()
    }

    pub fn matches_filter(&self, filter: &Option<CompiledFilter>) -> bool {
        match filter {
            None => true,
            Some(f) => self
                .tags
                .get(&f.key)
                .map(|v| f.value.is_match(v))
                .unwrap_or(false),
        }
    }
}

/// A firewall group attached to one or more resources.
#[derive(Debug, Clone)]
pub struct FirewallGroup {
    pub id: String,
    pub name: String,
    pub vpc_id: Option<String>,
    pub ingress: Vec<IngressRule>,
}

/// One ingress rule inside a firewall group.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngressRule {
    pub group_id: String,
    pub protocol: String,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    pub cidrs: Vec<String>,
    pub source_groups: Vec<String>,
}

impl IngressRule {
    /// The port interval this rule opens; protocol `-1` means all protocols
    /// and expands to the full range.
    pub fn port_range(&self) -> crate::ports::PortRange {
        if self.protocol == "-1" {
            return crate::ports::PortRange::all();
        }
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) => crate::ports::PortRange::new(from, to),
            _ => crate::ports::PortRange::all(),
        }
    }
}

pub struct CompiledFilter {
    pub key: String,
    pub value: Regex,
}

pub fn compile_filter(filter: &Option<ResourceFilter>) -> Result<Option<CompiledFilter>, regex::Error> {
    match filter {
        None => Ok(None),
        Some(f) => Ok(Some(CompiledFilter {
            key: f.key.clone(),
            value: Regex::new(&f.value_regex)?,
        })),
    }
}

fn tags_of(item: &Value) -> HashMap<String, String> {
    item.get("Tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| {
                    Some((
                        t.get("Key")?.as_str()?.to_string(),
                        t.get("Value")?.as_str()?.to_string(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_of(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

fn str_list(item: &Value, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn items<'a>(listing: &'a Option<Value>, key: &str) -> Vec<&'a Value> {
    listing
        .as_ref()
        .and_then(|v| v.get(key))
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

fn parse_ip(s: &str) -> Option<Ipv4Addr> {
    s.parse().ok()
}

/// `ec2-describe-instances`
pub fn parse_instances(listing: &Option<Value>, findings: &mut Vec<Finding>) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for reservation in items(listing, "Reservations") {
        let instances = reservation
            .get("Instances")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for item in instances {
            let Some(id) = str_of(item, "InstanceId") else {
                findings.push(Finding::warning("ec2", "instance without InstanceId skipped"));
                continue;
            };
            let mut ips = Vec::new();
            let mut is_public = false;
            if let Some(private) = str_of(item, "PrivateIpAddress").as_deref().and_then(parse_ip) {
                ips.push(private);
            }
            if let Some(public) = str_of(item, "PublicIpAddress").as_deref().and_then(parse_ip) {
                ips.push(public);
                is_public = true;
            }
            let tags = tags_of(item);
            let name = tags.get("Name").cloned().unwrap_or_else(|| id.clone());
            let security_groups = item
                .get("SecurityGroups")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|g| str_of(g, "GroupId"))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            records.push(ResourceRecord {
                kind: NodeKind::Ec2,
                local_id: id,
                name,
                vpc_id: str_of(item, "VpcId"),
                candidate_subnets: str_of(item, "SubnetId").into_iter().collect(),
                security_groups,
                ips,
                is_public,
                has_unrestricted_ingress: false,
                tags,
                attributes: item.clone(),
            });
        }
    }
    records
}

/// `elb-describe-load-balancers`
pub fn parse_classic_load_balancers(
    listing: &Option<Value>,
    findings: &mut Vec<Finding>,
) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "LoadBalancerDescriptions") {
        let Some(name) = str_of(item, "LoadBalancerName") else {
            findings.push(Finding::warning("elb", "load balancer without a name skipped"));
            continue;
        };
        records.push(ResourceRecord {
            kind: NodeKind::Elb,
            local_id: name.clone(),
            name,
            vpc_id: str_of(item, "VPCId"),
            candidate_subnets: str_list(item, "Subnets"),
            security_groups: str_list(item, "SecurityGroups"),
            ips: Vec::new(),
            is_public: str_of(item, "Scheme").as_deref() == Some("internet-facing"),
            has_unrestricted_ingress: false,
            tags: tags_of(item),
            attributes: item.clone(),
        });
    }
    records
}

/// `elbv2-describe-load-balancers`
pub fn parse_modern_load_balancers(
    listing: &Option<Value>,
    findings: &mut Vec<Finding>,
) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "LoadBalancers") {
        let Some(name) = str_of(item, "LoadBalancerName") else {
            findings.push(Finding::warning("elbv2", "load balancer without a name skipped"));
            continue;
        };
        let zones = item
            .get("AvailabilityZones")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect::<Vec<_>>())
            .unwrap_or_default();
        let candidate_subnets: Vec<String> =
            zones.iter().filter_map(|z| str_of(z, "SubnetId")).collect();
        let mut ips = Vec::new();
        for zone in &zones {
            for address in zone
                .get("LoadBalancerAddresses")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                for key in ["IpAddress", "PrivateIPv4Address"] {
                    if let Some(ip) = str_of(address, key).as_deref().and_then(parse_ip) {
                        ips.push(ip);
                    }
                }
            }
        }
        records.push(ResourceRecord {
            kind: NodeKind::Elbv2,
            local_id: name.clone(),
            name,
            vpc_id: str_of(item, "VpcId"),
            candidate_subnets,
            security_groups: str_list(item, "SecurityGroups"),
            ips,
            is_public: str_of(item, "Scheme").as_deref() == Some("internet-facing"),
            has_unrestricted_ingress: false,
            tags: tags_of(item),
            attributes: item.clone(),
        });
    }
    records
}

/// `rds-describe-db-instances`
pub fn parse_db_instances(listing: &Option<Value>, findings: &mut Vec<Finding>) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "DBInstances") {
        let Some(id) = str_of(item, "DBInstanceIdentifier") else {
            findings.push(Finding::warning("rds", "DB instance without an identifier skipped"));
            continue;
        };
        let subnet_group = item.get("DBSubnetGroup");
        let candidate_subnets = subnet_group
            .and_then(|g| g.get("Subnets"))
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|s| str_of(s, "SubnetIdentifier"))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let security_groups = item
            .get("VpcSecurityGroups")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|g| str_of(g, "VpcSecurityGroupId"))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        records.push(ResourceRecord {
            kind: NodeKind::Rds,
            local_id: id.clone(),
            name: id,
            vpc_id: subnet_group.and_then(|g| str_of(g, "VpcId")),
            candidate_subnets,
            security_groups,
            ips: Vec::new(),
            is_public: item
                .get("PubliclyAccessible")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            has_unrestricted_ingress: false,
            tags: tags_of(item),
            attributes: item.clone(),
        });
    }
    records
}

/// `ec2-describe-vpc-endpoints`
pub fn parse_vpc_endpoints(listing: &Option<Value>, findings: &mut Vec<Finding>) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "VpcEndpoints") {
        let Some(id) = str_of(item, "VpcEndpointId") else {
            findings.push(Finding::warning("vpc_endpoint", "endpoint without an id skipped"));
            continue;
        };
        let is_gateway = str_of(item, "VpcEndpointType").as_deref() == Some("Gateway");
        let security_groups = item
            .get("Groups")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|g| str_of(g, "GroupId"))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let name = str_of(item, "ServiceName").unwrap_or_else(|| id.clone());
        records.push(ResourceRecord {
            kind: NodeKind::VpcEndpoint,
            local_id: id,
            name,
            vpc_id: str_of(item, "VpcId"),
            candidate_subnets: str_list(item, "SubnetIds"),
            security_groups,
            ips: Vec::new(),
            is_public: false,
            has_unrestricted_ingress: is_gateway,
            tags: tags_of(item),
            attributes: item.clone(),
        });
    }
    records
}

/// `ecs-describe-tasks` (the one listing with lower-camel response keys)
pub fn parse_ecs_tasks(listing: &Option<Value>, findings: &mut Vec<Finding>) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "tasks") {
        let Some(arn) = str_of(item, "taskArn") else {
            findings.push(Finding::warning("ecs", "task without an ARN skipped"));
            continue;
        };
        let mut subnet = None;
        let mut ips = Vec::new();
        for attachment in item
            .get("attachments")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            for detail in attachment
                .get("details")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                match str_of(detail, "name").as_deref() {
                    Some("subnetId") => subnet = str_of(detail, "value"),
                    Some("privateIPv4Address") => {
                        if let Some(ip) = str_of(detail, "value").as_deref().and_then(parse_ip) {
                            ips.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }
        let name = str_of(item, "group").unwrap_or_else(|| arn.clone());
        records.push(ResourceRecord {
            kind: NodeKind::EcsTask,
            local_id: arn,
            name,
            vpc_id: None,
            candidate_subnets: subnet.into_iter().collect(),
            security_groups: str_list(item, "securityGroups"),
            ips,
            is_public: false,
            has_unrestricted_ingress: false,
            tags: HashMap::new(),
            attributes: item.clone(),
        });
    }
    records
}

/// `lambda-list-functions`; functions without a VPC configuration are not in
/// any network and are skipped.
pub fn parse_functions(listing: &Option<Value>, _findings: &mut Vec<Finding>) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "Functions") {
        let Some(name) = str_of(item, "FunctionName") else {
            continue;
        };
        let Some(vpc_config) = item.get("VpcConfig").filter(|v| !v.is_null()) else {
            debug!("Function {} has no VPC configuration, skipping", name);
            continue;
        };
        let candidate_subnets = str_list(vpc_config, "SubnetIds");
        if candidate_subnets.is_empty() {
            debug!("Function {} has an empty VPC configuration, skipping", name);
            continue;
        }
        records.push(ResourceRecord {
            kind: NodeKind::Lambda,
            local_id: str_of(item, "FunctionArn").unwrap_or_else(|| name.clone()),
            name,
            vpc_id: str_of(vpc_config, "VpcId"),
            candidate_subnets,
            security_groups: str_list(vpc_config, "SecurityGroupIds"),
            ips: Vec::new(),
            is_public: false,
            has_unrestricted_ingress: false,
            tags: HashMap::new(),
            attributes: item.clone(),
        });
    }
    records
}

/// `redshift-describe-clusters`; the listing names a subnet group but not the
/// member subnets, so clusters attach directly to their network.
pub fn parse_warehouse_clusters(
    listing: &Option<Value>,
    findings: &mut Vec<Finding>,
) -> Vec<ResourceRecord> {
    let mut records = Vec::new();
    for item in items(listing, "Clusters") {
        let Some(id) = str_of(item, "ClusterIdentifier") else {
            findings.push(Finding::warning("redshift", "cluster without an identifier skipped"));
            continue;
        };
        let security_groups = item
            .get("VpcSecurityGroups")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|g| str_of(g, "VpcSecurityGroupId"))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        records.push(ResourceRecord {
            kind: NodeKind::Redshift,
            local_id: id.clone(),
            name: id,
            vpc_id: str_of(item, "VpcId"),
            candidate_subnets: Vec::new(),
            security_groups,
            ips: Vec::new(),
            is_public: item
                .get("PubliclyAccessible")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            has_unrestricted_ingress: false,
            tags: tags_of(item),
            attributes: item.clone(),
        });
    }
    records
}

/// `es-list-domain-names` plus the per-domain describe call. Domains without
/// VPC options live outside any modeled network and are skipped.
pub fn parse_search_domain(detail: &Value, findings: &mut Vec<Finding>) -> Option<ResourceRecord> {
    let status = detail.get("DomainStatus")?;
    let Some(name) = str_of(status, "DomainName") else {
        findings.push(Finding::warning("elasticsearch", "domain without a name skipped"));
        return None;
    };
    let Some(vpc_options) = status.get("VPCOptions").filter(|v| !v.is_null()) else {
        debug!("Search domain {} is not VPC-attached, skipping", name);
        return None;
    };
    Some(ResourceRecord {
        kind: NodeKind::Elasticsearch,
        local_id: str_of(status, "ARN").unwrap_or_else(|| name.clone()),
        name,
        vpc_id: str_of(vpc_options, "VPCId"),
        candidate_subnets: str_list(vpc_options, "SubnetIds"),
        security_groups: str_list(vpc_options, "SecurityGroupIds"),
        ips: Vec::new(),
        is_public: false,
        has_unrestricted_ingress: false,
        tags: HashMap::new(),
        attributes: status.clone(),
    })
}

/// `ec2-describe-security-groups`
pub fn parse_firewall_groups(listing: &Option<Value>, findings: &mut Vec<Finding>) -> Vec<FirewallGroup> {
    let mut groups = Vec::new();
    for item in items(listing, "SecurityGroups") {
        let Some(id) = str_of(item, "GroupId") else {
            findings.push(Finding::warning("security_group", "group without an id skipped"));
            continue;
        };
        let mut ingress = Vec::new();
        for permission in item
            .get("IpPermissions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let cidrs = permission
                .get("IpRanges")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|r| str_of(r, "CidrIp"))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let source_groups = permission
                .get("UserIdGroupPairs")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|p| str_of(p, "GroupId"))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            ingress.push(IngressRule {
                group_id: id.clone(),
                protocol: str_of(permission, "IpProtocol").unwrap_or_else(|| "-1".to_string()),
                from_port: permission.get("FromPort").and_then(Value::as_i64),
                to_port: permission.get("ToPort").and_then(Value::as_i64),
                cidrs,
                source_groups,
            });
        }
        groups.push(FirewallGroup {
            name: str_of(item, "GroupName").unwrap_or_else(|| id.clone()),
            vpc_id: str_of(item, "VpcId"),
            id,
            ingress,
        });
    }
    if groups.is_empty() {
        warn!("No firewall groups in listing; reachability will be sparse");
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instance_parsing_extracts_capabilities() {
        let listing = Some(json!({
            "Reservations": [{"Instances": [{
                "InstanceId": "i-1234",
                "PrivateIpAddress": "10.0.0.5",
                "PublicIpAddress": "54.1.2.3",
                "VpcId": "vpc-1",
                "SubnetId": "subnet-a",
                "SecurityGroups": [{"GroupId": "sg-1"}, {"GroupId": "sg-2"}],
                "Tags": [{"Key": "Name", "Value": "web"}]
            }]}]
        }));
        let mut findings = Vec::new();
        let records = parse_instances(&listing, &mut findings);
        assert!(findings.is_empty());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.kind, NodeKind::Ec2);
        assert_eq!(r.name, "web");
        assert_eq!(r.ips.len(), 2);
        assert!(r.is_public);
        assert!(r.can_egress());
        assert_eq!(r.security_groups, vec!["sg-1", "sg-2"]);
        assert_eq!(r.candidate_subnets, vec!["subnet-a"]);
    }

    #[test]
    fn malformed_item_is_a_finding_not_an_abort() {
        let listing = Some(json!({
            "Reservations": [{"Instances": [
                {"NotAnInstance": true},
                {"InstanceId": "i-ok", "SubnetId": "subnet-a"}
            ]}]
        }));
        let mut findings = Vec::new();
        let records = parse_instances(&listing, &mut findings);
        assert_eq!(records.len(), 1);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn absent_listing_is_empty() {
        let mut findings = Vec::new();
        assert!(parse_instances(&None, &mut findings).is_empty());
        assert!(parse_db_instances(&None, &mut findings).is_empty());
        assert!(findings.is_empty());
    }

    #[test]
    fn load_balancer_spanning_subnets() {
        let listing = Some(json!({
            "LoadBalancerDescriptions": [{
                "LoadBalancerName": "public-lb",
                "DNSName": "public-lb.example.elb.amazonaws.com",
                "Scheme": "internet-facing",
                "VPCId": "vpc-1",
                "Subnets": ["subnet-a", "subnet-b", "subnet-c"],
                "SecurityGroups": ["sg-lb"]
            }]
        }));
        let mut findings = Vec::new();
        let records = parse_classic_load_balancers(&listing, &mut findings);
        assert_eq!(records[0].candidate_subnets.len(), 3);
        assert!(records[0].is_public);
    }

    #[test]
    fn database_cannot_egress() {
        let listing = Some(json!({
            "DBInstances": [{
                "DBInstanceIdentifier": "db-1",
                "PubliclyAccessible": false,
                "VpcSecurityGroups": [{"VpcSecurityGroupId": "sg-db"}],
                "DBSubnetGroup": {
                    "VpcId": "vpc-1",
                    "Subnets": [{"SubnetIdentifier": "subnet-a"}]
                }
            }]
        }));
        let mut findings = Vec::new();
        let records = parse_db_instances(&listing, &mut findings);
        assert!(!records[0].can_egress());
        assert_eq!(records[0].vpc_id.as_deref(), Some("vpc-1"));
    }

    #[test]
    fn gateway_endpoint_bypasses_firewalls() {
        let listing = Some(json!({
            "VpcEndpoints": [{
                "VpcEndpointId": "vpce-1",
                "VpcEndpointType": "Gateway",
                "ServiceName": "com.amazonaws.us-east-1.s3",
                "VpcId": "vpc-1"
            }]
        }));
        let mut findings = Vec::new();
        let records = parse_vpc_endpoints(&listing, &mut findings);
        assert!(records[0].has_unrestricted_ingress);
        assert!(!records[0].can_egress());
        assert!(records[0].candidate_subnets.is_empty());
    }

    #[test]
    fn lambda_outside_vpc_is_skipped() {
        let listing = Some(json!({
            "Functions": [
                {"FunctionName": "edge-fn"},
                {"FunctionName": "vpc-fn", "FunctionArn": "arn:fn:vpc-fn",
                 "VpcConfig": {"VpcId": "vpc-1", "SubnetIds": ["subnet-a"],
                               "SecurityGroupIds": ["sg-fn"]}}
            ]
        }));
        let mut findings = Vec::new();
        let records = parse_functions(&listing, &mut findings);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vpc-fn");
    }

    #[test]
    fn firewall_rule_port_ranges() {
        let rule = IngressRule {
            group_id: "sg-1".into(),
            protocol: "tcp".into(),
            from_port: Some(443),
            to_port: Some(445),
            cidrs: vec![],
            source_groups: vec![],
        };
        assert_eq!(rule.port_range(), crate::ports::PortRange::new(443, 445));

        let all = IngressRule {
            group_id: "sg-1".into(),
            protocol: "-1".into(),
            from_port: None,
            to_port: None,
            cidrs: vec![],
            source_groups: vec![],
        };
        assert_eq!(all.port_range(), crate::ports::PortRange::all());
    }

    #[test]
    fn filter_matches_on_tag_value() {
        let filter = compile_filter(&Some(crate::config::ResourceFilter {
            key: "env".into(),
            value_regex: "^prod".into(),
        }))
        .unwrap();

        let mut record = ResourceRecord {
            kind: NodeKind::Ec2,
            local_id: "i-1".into(),
            name: "i-1".into(),
            vpc_id: None,
            candidate_subnets: vec![],
            security_groups: vec![],
            ips: vec![],
            is_public: false,
            has_unrestricted_ingress: false,
            tags: HashMap::from([("env".to_string(), "production".to_string())]),
            attributes: Value::Null,
        };
        assert!(record.matches_filter(&filter));
        record.tags.insert("env".into(), "staging".into());
        assert!(!record.matches_filter(&filter));
        assert!(record.matches_filter(&None));
    }
}
