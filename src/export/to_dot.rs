use std::error::Error;

use serde_json::json;

use crate::export::ProjectedGraph;

pub fn render(graph: &ProjectedGraph) -> Result<String, Box<dyn Error>> {
    let handlebars = crate::common::get_handlebars();

    let res = handlebars.render_template(
        &get_template(),
        &json!({
            "nodes": graph.nodes,
            "edges": graph.edges,
        }),
    )?;
    Ok(res)
}

pub fn get_template() -> String {
    include_str!("to_dot.hbs").to_string()
}
