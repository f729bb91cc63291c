use anyhow::Result;
use log::{debug, info};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};

use crate::download::overpass::OverpassResponse;
use crate::model::distance::haversine_m;
use crate::model::{GraphEdge, GraphNode, RoadGraph, TravelMode};

/// Which way(s) a way may be travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Forward,
    Reverse,
    Both,
}

/// Helper struct to store OSM way data
struct OsmWay {
    id: i64,
    node_ids: Vec<i64>,
    tags: HashMap<String, String>,
}

/// Build a simplified road graph from an Overpass response.
///
/// Graph nodes are way endpoints and nodes shared between ways; every other
/// node is folded into the length of the edge passing through it. Unless
/// `retain_all` is set, only the largest weakly connected component is kept.
pub fn build_graph(response: &OverpassResponse, mode: TravelMode, retain_all: bool) -> Result<RoadGraph> {
    // First pass: collect all nodes and ways
    let mut osm_nodes = HashMap::new();
    for element in &response.elements {
        if element.elem_type == "node" {
            if let (Some(lat), Some(lon)) = (element.lat, element.lon) {
                osm_nodes.insert(element.id, (lat, lon));
            }
        }
    }

    let mut osm_ways = Vec::new();
    for element in &response.elements {
        if element.elem_type != "way" {
            continue;
        }
        let Some(refs) = &element.nodes else {
            continue;
        };
        let node_ids: Vec<i64> = refs
            .iter()
            .copied()
            .filter(|id| osm_nodes.contains_key(id))
            .collect();
        if node_ids.len() < 2 {
            debug!("Ignoring way {} with fewer than two known nodes", element.id);
            continue;
        }
        osm_ways.push(OsmWay {
            id: element.id,
            node_ids,
            tags: element.tags.clone().unwrap_or_default(),
        });
    }

    info!("Collected {} nodes and {} ways", osm_nodes.len(), osm_ways.len());

    // Second pass: identify intersections (shared nodes or way endpoints)
    let mut node_way_count: HashMap<i64, usize> = HashMap::new();
    for way in &osm_ways {
        for &node_id in &way.node_ids {
            *node_way_count.entry(node_id).or_insert(0) += 1;
        }
    }

    let mut intersection_node_ids = HashSet::new();
    for way in &osm_ways {
        for (idx, &node_id) in way.node_ids.iter().enumerate() {
            let is_endpoint = idx == 0 || idx == way.node_ids.len() - 1;
            if is_endpoint || node_way_count.get(&node_id).copied().unwrap_or(0) >= 2 {
                intersection_node_ids.insert(node_id);
            }
        }
    }

    info!("Identified {} intersection nodes", intersection_node_ids.len());

    let mut graph = RoadGraph::new();
    for way in &osm_ways {
        for &node_id in &way.node_ids {
            if intersection_node_ids.contains(&node_id) {
                let (lat, lon) = osm_nodes[&node_id];
                graph.add_node(GraphNode { osm_id: node_id, lat, lon });
            }
        }
    }

    info!("Creating edges between intersections");
    for way in &osm_ways {
        process_way(&mut graph, way, &osm_nodes, &intersection_node_ids, mode);
    }

    if graph.node_count() == 0 {
        anyhow::bail!("No street network nodes found for the requested place");
    }

    let graph = if retain_all {
        graph
    } else {
        largest_component(graph)
    };

    info!(
        "Built graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    Ok(graph)
}

/// Split a way at its intersections and add the resulting edges
fn process_way(
    graph: &mut RoadGraph,
    way: &OsmWay,
    osm_nodes: &HashMap<i64, (f64, f64)>,
    intersection_node_ids: &HashSet<i64>,
    mode: TravelMode,
) {
    let flow = if mode.ignores_oneway() {
        Flow::Both
    } else {
        way_flow(&way.tags)
    };

    let mut current_path: Vec<(f64, f64)> = Vec::new();
    let mut current_source_id: Option<i64> = None;

    for &node_id in &way.node_ids {
        let point = osm_nodes[&node_id];
        current_path.push(point);

        if !intersection_node_ids.contains(&node_id) {
            continue;
        }

        if let Some(source_id) = current_source_id {
            let length_m = path_length(&current_path);
            let (source, target, oneway) = match flow {
                Flow::Forward => (source_id, node_id, true),
                Flow::Reverse => (node_id, source_id, true),
                Flow::Both => (source_id, node_id, false),
            };

            graph.add_edge(GraphEdge {
                source,
                target,
                osm_way_id: way.id,
                length_m,
                oneway,
            });
            if flow == Flow::Both {
                graph.add_edge(GraphEdge {
                    source: target,
                    target: source,
                    osm_way_id: way.id,
                    length_m,
                    oneway,
                });
            }
        }

        // Start a new path from this intersection
        current_source_id = Some(node_id);
        current_path.clear();
        current_path.push(point);
    }
}

/// Determine the allowed direction of travel from the way's tags
fn way_flow(tags: &HashMap<String, String>) -> Flow {
    match tags.get("oneway").map(|s| s.as_str()) {
        Some("yes") | Some("true") | Some("1") => Flow::Forward,
        Some("-1") | Some("reverse") => Flow::Reverse,
        Some("no") | Some("false") | Some("0") => Flow::Both,
        _ => {
            if tags.get("junction").map(|s| s.as_str()) == Some("roundabout") {
                Flow::Forward
            } else {
                Flow::Both
            }
        }
    }
}

fn path_length(path: &[(f64, f64)]) -> f64 {
    path.windows(2)
        .map(|w| haversine_m(w[0].0, w[0].1, w[1].0, w[1].1))
        .sum()
}

/// Keep only the largest weakly connected component of the graph.
/// Ties keep the component found first in node order.
fn largest_component(graph: RoadGraph) -> RoadGraph {
    let mut components = UnionFind::<usize>::new(graph.node_count());
    for edge in &graph.edges {
        if let (Some(a), Some(b)) = (graph.index_of(edge.source), graph.index_of(edge.target)) {
            components.union(a, b);
        }
    }

    let labels = components.into_labeling();
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for &label in &labels {
        *sizes.entry(label).or_insert(0) += 1;
    }

    let mut best: Option<(usize, usize)> = None;
    for &label in &labels {
        let size = sizes[&label];
        if best.is_none_or(|(_, best_size)| size > best_size) {
            best = Some((label, size));
        }
    }
    let Some((best_label, best_size)) = best else {
        return graph;
    };

    let dropped = graph.node_count() - best_size;
    if dropped > 0 {
        info!("Dropping {} nodes outside the largest connected component", dropped);
    }

    let mut retained = RoadGraph::new();
    for (node, &label) in graph.nodes.into_iter().zip(&labels) {
        if label == best_label {
            retained.add_node(node);
        }
    }
    for edge in graph.edges {
        if retained.contains_node(edge.source) && retained.contains_node(edge.target) {
            retained.add_edge(edge);
        }
    }
    retained
}
