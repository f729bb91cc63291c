use log::{info, warn};
use std::collections::HashMap;

use crate::model::{Directional, Edge, Location, RoadGraph};

/// Table rows derived from a road graph
#[derive(Debug, Default)]
pub struct GraphRecords {
    pub locations: Vec<Location>,
    pub edges: Vec<Edge>,
    /// OSM node id -> generated location id
    pub node_ids: HashMap<i64, String>,
    /// Edges dropped because an endpoint had no location
    pub skipped_edges: usize,
}

/// Convert the graph into `location` and `edges` rows, giving every node a fresh id
pub fn project_graph(graph: &RoadGraph) -> GraphRecords {
    let mut records = GraphRecords::default();

    info!("Processing graph nodes (locations)");
    for node in &graph.nodes {
        let location = Location::road_node(node.osm_id, node.lat, node.lon);
        records.node_ids.insert(node.osm_id, location.id.clone());
        records.locations.push(location);
    }
    info!("Extracted {} locations", records.locations.len());

    info!("Processing graph edges (connections)");
    for edge in &graph.edges {
        let (Some(from), Some(to)) = (
            records.node_ids.get(&edge.source),
            records.node_ids.get(&edge.target),
        ) else {
            records.skipped_edges += 1;
            continue;
        };

        let directional = if edge.oneway {
            Directional::Oneway
        } else {
            Directional::Bidirectional
        };

        records.edges.push(Edge {
            from_location_id: from.clone(),
            to_location_id: to.clone(),
            weight: edge.length_m / 1000.0,
            directional,
            osm_id: Some(edge.osm_way_id.to_string()),
        });
    }

    if records.skipped_edges > 0 {
        warn!(
            "Skipped {} edges whose endpoints are not graph nodes",
            records.skipped_edges
        );
    }
    info!("Extracted {} edges", records.edges.len());

    records
}
