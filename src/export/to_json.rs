use std::error::Error;

use crate::export::ProjectedGraph;

/// The primary output format: one ordered array of node and edge elements.
pub fn render(graph: &ProjectedGraph) -> Result<String, Box<dyn Error>> {
    Ok(serde_json::to_string_pretty(&graph.elements())?)
}
