//! Runs one account's audit end to end: topology, edges, collapse,
//! projection.

use tracing::{debug, info, warn};

use crate::collapse::{self, CollapseContext};
use crate::config::{Config, OutputOptions};
use crate::errors::{AuditError, Finding, FindingSeverity};
use crate::export::{self, ProjectedGraph};
use crate::reachability::{self, EngineOptions};
use crate::resource;
use crate::snapshot::SnapshotSource;
use crate::topology::{self, Topology};

pub struct AuditResult {
    pub graph: ProjectedGraph,
    pub findings: Vec<Finding>,
}

/// Audit one account from its snapshot. Everything is built fresh; the
/// snapshot is never written to.
pub fn run_audit(
    snapshot: &dyn SnapshotSource,
    account: &str,
    config: &Config,
    options: &OutputOptions,
) -> Result<AuditResult, AuditError> {
    info!("Auditing account {}", account);
    let mut findings: Vec<Finding> = Vec::new();

    let filter = resource::compile_filter(&config.filter)
        .map_err(|e| AuditError::Config(format!("filter regex: {}", e)))?;

    let mut topology = Topology::new(account);
    for region in snapshot.regions(account)? {
        debug!("Building topology for {}", region);
        topology::build_region(&mut topology, snapshot, &region, &filter, &mut findings);
    }
    topology.resolve_peerings(&mut findings);

    let engine_options = EngineOptions {
        inter_rds_edges: options.inter_rds_edges,
    };
    let (mut edges, externals) =
        reachability::derive_edges(&topology, &engine_options, &mut findings);

    // Per-account barrier: collapse only after every region contributed
    let context = CollapseContext::from_config(config, &mut findings);
    let external_ranges = collapse::collapse_external_ranges(externals, &mut edges, &context);

    let connections = edges.into_connections();
    let graph = export::project(&topology, &connections, &external_ranges, options)?;

    for finding in &findings {
        match finding.severity {
            FindingSeverity::Warning => debug!("[{}] {}", finding.context, finding.message),
            FindingSeverity::Error => warn!("[{}] {}", finding.context, finding.message),
        }
    }
    info!(
        "Audit of {} complete: {} ({} findings)",
        account,
        graph.stats(),
        findings.len()
    );

    Ok(AuditResult { graph, findings })
}
