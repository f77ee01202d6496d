//! Public-exposure summary: which resources the Internet can reach, and on
//! which ports.
//!
//! A read-only view over the projected graph, limited to edges whose source
//! is the unrestricted external range. Each resource kind publishes its
//! public endpoint under a different attribute path; the extraction match is
//! deliberately exhaustive so a new kind cannot slip through unnoticed.

use serde::Serialize;
use serde_json::Value;

use crate::errors::AuditError;
use crate::export::ProjectedGraph;
use crate::ports::{self, PortRange};

/// The identity the unrestricted range keeps through collapsing.
const ANY_ADDRESS: &str = "0.0.0.0/0";

#[derive(Serialize, Clone, Debug)]
pub struct ExposureEntry {
    pub resource_id: String,
    pub name: String,
    pub kind: String,
    /// Public hostname or address, when the snapshot recorded one.
    pub hostname: Option<String>,
    /// Merged, human-readable port ranges, e.g. `"80,443-445"`.
    pub ports: String,
}

fn raw<'a>(attributes: &'a Option<Value>, path: &[&str]) -> Option<&'a Value> {
    let mut value = attributes.as_ref()?.get("raw")?;
    for key in path {
        value = value.get(key)?;
    }
    Some(value)
}

fn raw_str(attributes: &Option<Value>, path: &[&str]) -> Option<String> {
    raw(attributes, path)?.as_str().map(str::to_string)
}

/// Per-kind public endpoint lookup. Kinds with no routable endpoint of
/// their own resolve to `None`.
fn hostname_of(kind: &str, id: &str, attributes: &Option<Value>) -> Result<Option<String>, AuditError> {
    let hostname = match kind {
        "ec2" => raw_str(attributes, &["PublicDnsName"])
            .filter(|s| !s.is_empty())
            .or_else(|| raw_str(attributes, &["PublicIpAddress"])),
        "elb" | "elbv2" => raw_str(attributes, &["DNSName"]),
        "rds" => raw_str(attributes, &["Endpoint", "Address"]),
        "redshift" => raw_str(attributes, &["Endpoint", "Address"]),
        "elasticsearch" => raw_str(attributes, &["Endpoint"]),
        "lambda" | "ecs_task" | "vpc_endpoint" => None,
        _ => {
            return Err(AuditError::UnknownKind {
                id: id.to_string(),
                kind: kind.to_string(),
            })
        }
    };
    Ok(hostname)
}

/// Extract the exposure entries from a projected graph.
pub fn summarize(graph: &ProjectedGraph) -> Result<Vec<ExposureEntry>, AuditError> {
    let mut entries = Vec::new();

    for edge in &graph.edges {
        let from_any = graph
            .node(&edge.source_id)
            .map(|n| n.kind == "ip" && n.id == ANY_ADDRESS)
            .unwrap_or(false);
        if !from_any {
            continue;
        }
        let Some(target) = graph.node(&edge.target_id) else { continue };

        let ranges: Vec<PortRange> = edge.reasons.iter().map(|r| r.port_range()).collect();
        entries.push(ExposureEntry {
            resource_id: target.id.clone(),
            name: target.name.clone(),
            kind: target.kind.clone(),
            hostname: hostname_of(&target.kind, &target.id, &target.attributes)?,
            ports: ports::render_ranges(&ports::merge_ranges(ranges)),
        });
    }

    entries.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
    Ok(entries)
}
