//! Projects the tree and edge set into the output graph.
//!
//! The projection prunes branches that hold no resources, optionally hides
//! the availability-zone level, optionally merges tag-sharing leaves, and
//! serializes what is left as an ordered element list. That element list is
//! the sole interface to downstream reporting.

pub mod to_dot;
pub mod to_json;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::OutputOptions;
use crate::errors::AuditError;
use crate::reachability::{Connection, ExternalRange};
use crate::resource::{IngressRule, NodeKind};
use crate::topology::{Node, Topology};

/// Heuristic defaults beyond which the rendered graph stops being readable.
const NODE_WARN_THRESHOLD: usize = 200;
const EDGE_WARN_THRESHOLD: usize = 500;

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NodeElement {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EdgeElement {
    pub source_id: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<IngressRule>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct ProjectedGraph {
    pub nodes: Vec<NodeElement>,
    pub edges: Vec<EdgeElement>,
}

impl ProjectedGraph {
    pub fn node(&self, id: &str) -> Option<&NodeElement> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes first, then edges, as one ordered element sequence.
    pub fn elements(&self) -> Vec<Value> {
        let mut elements: Vec<Value> = self.nodes.iter().map(|n| json!(n)).collect();
        elements.extend(self.edges.iter().map(|e| json!(e)));
        elements
    }

    pub fn stats(&self) -> String {
        format!("Nodes: {}, Edges: {}", self.nodes.len(), self.edges.len())
    }
}

/// Ids of nodes that are, or contain, a leaf resource.
fn retained_ids(topology: &Topology) -> HashSet<String> {
    fn visit(topology: &Topology, id: &str, retained: &mut HashSet<String>) -> bool {
        let Some(node) = topology.get(id) else { return false };
        let mut keep = node.record.is_some();
        for child in node.children.values() {
            if visit(topology, child, retained) {
                keep = true;
            }
        }
        if keep {
            retained.insert(id.to_string());
        }
        keep
    }

    let mut retained = HashSet::new();
    visit(topology, &topology.account, &mut retained);
    retained
}

/// Per-kind display payload for a leaf node. The match is exhaustive over
/// the closed kind set; anything else in the tree is an export bug.
fn leaf_payload(node: &Node) -> Result<Value, AuditError> {
    let record = node.record.as_ref().ok_or_else(|| AuditError::UnknownKind {
        id: node.id.clone(),
        kind: node.kind.as_str().to_string(),
    })?;
    let base = match record.kind {
        NodeKind::Ec2
        | NodeKind::Elb
        | NodeKind::Elbv2
        | NodeKind::Rds
        | NodeKind::VpcEndpoint
        | NodeKind::EcsTask
        | NodeKind::Lambda
        | NodeKind::Redshift
        | NodeKind::Elasticsearch => record.attributes.clone(),
        NodeKind::Account
        | NodeKind::Region
        | NodeKind::Vpc
        | NodeKind::Az
        | NodeKind::Subnet
        | NodeKind::ExternalCidr => {
            return Err(AuditError::UnknownKind {
                id: node.id.clone(),
                kind: record.kind.as_str().to_string(),
            })
        }
    };
    Ok(json!({
        "ips": record.ips,
        "is_public": record.is_public,
        "raw": base,
    }))
}

fn visible_parent(topology: &Topology, node: &Node, options: &OutputOptions) -> Option<String> {
    let mut parent = node.parent.clone();
    while let Some(parent_id) = parent {
        let Some(parent_node) = topology.get(&parent_id) else { return None };
        if parent_node.kind == NodeKind::Az && !options.show_azs {
            parent = parent_node.parent.clone();
            continue;
        }
        return Some(parent_id);
    }
    None
}

/// Leaves under one parent sharing a tag value merge into one synthetic
/// node; returns member id → synthetic element.
fn tag_merges(
    topology: &Topology,
    retained: &HashSet<String>,
    tag: &str,
) -> IndexMap<String, NodeElement> {
    let mut groups: IndexMap<(Option<String>, String), Vec<&Node>> = IndexMap::new();
    for node in topology.nodes.values() {
        let Some(record) = &node.record else { continue };
        if !retained.contains(&node.id) {
            continue;
        }
        if let Some(value) = record.tags.get(tag) {
            groups
                .entry((node.parent.clone(), value.clone()))
                .or_default()
                .push(node);
        }
    }

    let mut merges = IndexMap::new();
    for ((parent, value), nodes) in groups {
        if nodes.len() < 2 {
            continue;
        }
        let synthetic = NodeElement {
            id: format!("grouped:{}", value),
            name: format!("{} ({} nodes)", value, nodes.len()),
            kind: nodes[0].kind.as_str().to_string(),
            parent_id: parent,
            attributes: None,
        };
        for node in nodes {
            merges.insert(node.id.clone(), synthetic.clone());
        }
    }
    merges
}

/// Project the topology plus the collapsed edge set into the output graph.
pub fn project(
    topology: &Topology,
    connections: &[Connection],
    external_ranges: &IndexMap<String, ExternalRange>,
    options: &OutputOptions,
) -> Result<ProjectedGraph, AuditError> {
    let retained = retained_ids(topology);
    let merges = match &options.collapse_by_tag {
        Some(tag) => tag_merges(topology, &retained, tag),
        None => IndexMap::new(),
    };

    let mut graph = ProjectedGraph::default();
    let mut emitted_synthetic: HashSet<String> = HashSet::new();

    for node in topology.nodes.values() {
        if !retained.contains(&node.id) {
            continue;
        }
        if node.kind == NodeKind::Az && !options.show_azs {
            continue;
        }
        if let Some(synthetic) = merges.get(&node.id) {
            if emitted_synthetic.insert(synthetic.id.clone()) {
                let mut synthetic = synthetic.clone();
                synthetic.parent_id = synthetic
                    .parent_id
                    .as_deref()
                    .and_then(|p| topology.get(p))
                    .and_then(|p| {
                        if p.kind == NodeKind::Az && !options.show_azs {
                            p.parent.clone()
                        } else {
                            Some(p.id.clone())
                        }
                    });
                graph.nodes.push(synthetic);
            }
            continue;
        }
        let attributes = if node.record.is_some() && options.node_data {
            Some(leaf_payload(node)?)
        } else {
            None
        };
        graph.nodes.push(NodeElement {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind.as_str().to_string(),
            parent_id: visible_parent(topology, node, options),
            attributes,
        });
    }

    // External ranges surviving the collapse become parentless source nodes
    for (id, range) in external_ranges {
        graph.nodes.push(NodeElement {
            id: id.clone(),
            name: range.name.clone(),
            kind: NodeKind::ExternalCidr.as_str().to_string(),
            parent_id: None,
            attributes: None,
        });
    }

    // Edges, re-pointed through tag merges and deduplicated
    let mut edge_map: IndexMap<(String, String), Vec<IngressRule>> = IndexMap::new();
    for connection in connections {
        let is_external_origin = external_ranges.contains_key(&connection.source);
        if !options.internal_edges && !is_external_origin {
            continue;
        }
        let source = merges
            .get(&connection.source)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| connection.source.clone());
        let target = merges
            .get(&connection.target)
            .map(|s| s.id.clone())
            .unwrap_or_else(|| connection.target.clone());
        if source == target {
            continue;
        }
        edge_map
            .entry((source, target))
            .or_default()
            .extend(connection.reasons.iter().cloned());
    }
    for ((source_id, target_id), reasons) in edge_map {
        graph.edges.push(EdgeElement {
            source_id,
            target_id,
            reasons: if options.node_data { reasons } else { Vec::new() },
        });
    }

    if graph.nodes.len() > NODE_WARN_THRESHOLD {
        warn!(
            "Projected graph has {} nodes (> {}); consider filtering or collapsing",
            graph.nodes.len(),
            NODE_WARN_THRESHOLD
        );
    }
    if graph.edges.len() > EDGE_WARN_THRESHOLD {
        warn!(
            "Projected graph has {} edges (> {}); consider filtering",
            graph.edges.len(),
            EDGE_WARN_THRESHOLD
        );
    }
    info!("Projected graph: {}", graph.stats());

    Ok(graph)
}
