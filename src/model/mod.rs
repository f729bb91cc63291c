use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub mod distance;
pub mod processor;
pub mod records;

/// Travel modes selecting which ways make up the street network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Walk,
    Bike,
    Drive,
    All,
    AllPrivate,
}

impl TravelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walk => "walk",
            TravelMode::Bike => "bike",
            TravelMode::Drive => "drive",
            TravelMode::All => "all",
            TravelMode::AllPrivate => "all_private",
        }
    }

    pub fn all() -> Vec<TravelMode> {
        vec![
            TravelMode::Walk,
            TravelMode::Bike,
            TravelMode::Drive,
            TravelMode::All,
            TravelMode::AllPrivate,
        ]
    }

    /// Overpass tag filter applied to `way` elements for this mode
    pub fn way_filter(&self) -> &'static str {
        match self {
            TravelMode::Walk => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|bus_guideway|construction|cycleway|motor|no|planned|platform|proposed|raceway|razed"]"#,
                r#"["foot"!~"no"]["service"!~"private"]"#,
            ),
            TravelMode::Bike => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|bus_guideway|construction|corridor|elevator|escalator|footway|motor|no|planned|platform|proposed|raceway|razed|steps"]"#,
                r#"["bicycle"!~"no"]["service"!~"private"]"#,
            ),
            TravelMode::Drive => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|bridleway|bus_guideway|construction|corridor|cycleway|elevator|escalator|footway|no|path|pedestrian|planned|platform|proposed|raceway|razed|service|steps|track"]"#,
                r#"["motor_vehicle"!~"no"]["motorcar"!~"no"]"#,
                r#"["service"!~"alley|driveway|emergency_access|parking|parking_aisle|private"]"#,
            ),
            TravelMode::All => concat!(
                r#"["highway"]["area"!~"yes"]["access"!~"private"]"#,
                r#"["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#,
            ),
            TravelMode::AllPrivate => concat!(
                r#"["highway"]["area"!~"yes"]"#,
                r#"["highway"!~"abandoned|construction|no|planned|platform|proposed|raceway|razed"]"#,
            ),
        }
    }

    /// Pedestrians may walk either way down a one-way street
    pub fn ignores_oneway(&self) -> bool {
        matches!(self, TravelMode::Walk)
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        TravelMode::all()
            .into_iter()
            .find(|mode| mode.as_str() == input)
            .ok_or_else(|| format!("unknown network type '{}'", input))
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a stored location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    RoadNode,
    EvacuationCenter,
}

/// Traversal direction of a stored edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directional {
    Oneway,
    Bidirectional,
}

/// A row of the `location` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub location_type: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<String>,
}

impl Location {
    /// A road node named after its OSM node id
    pub fn road_node(osm_node_id: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: osm_node_id.to_string(),
            latitude,
            longitude,
            location_type: LocationType::RoadNode,
            osm_id: Some(osm_node_id.to_string()),
        }
    }

    pub fn evacuation_center(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            latitude,
            longitude,
            location_type: LocationType::EvacuationCenter,
            osm_id: None,
        }
    }
}

/// A row of the `edges` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from_location_id: String,
    pub to_location_id: String,
    /// Kilometers
    pub weight: f64,
    pub directional: Directional,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<String>,
}

/// An intersection or dead end of the downloaded street network
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub osm_id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// A directed, simplified stretch of a way between two graph nodes
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    pub osm_way_id: i64,
    /// Meters along the way geometry
    pub length_m: f64,
    pub oneway: bool,
}

/// The street network of a place, keyed by OSM node ids
#[derive(Debug, Clone, Default)]
pub struct RoadGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    index: HashMap<i64, usize>,
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node unless one with the same OSM id is already present
    pub fn add_node(&mut self, node: GraphNode) {
        if !self.index.contains_key(&node.osm_id) {
            self.index.insert(node.osm_id, self.nodes.len());
            self.nodes.push(node);
        }
    }

    pub fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.push(edge);
    }

    /// Position of the node in `nodes`
    pub fn index_of(&self, osm_id: i64) -> Option<usize> {
        self.index.get(&osm_id).copied()
    }

    pub fn contains_node(&self, osm_id: i64) -> bool {
        self.index.contains_key(&osm_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_mode_parse() {
        for mode in TravelMode::all() {
            assert_eq!(mode.as_str().parse::<TravelMode>(), Ok(mode));
        }
        assert!("fly".parse::<TravelMode>().is_err());
        assert!(TravelMode::Walk.ignores_oneway());
        assert!(!TravelMode::Drive.ignores_oneway());
    }

    #[test]
    fn test_location_serialization() {
        let node = Location::road_node(42, 14.8, 120.7);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "road_node");
        assert_eq!(value["name"], "42");
        assert_eq!(value["osm_id"], "42");

        let center = Location::evacuation_center("Hall", 14.8, 120.7);
        let value = serde_json::to_value(&center).unwrap();
        assert_eq!(value["type"], "evacuation_center");
        assert!(value.get("osm_id").is_none());
        assert_ne!(node.id, center.id);
    }

    #[test]
    fn test_edge_serialization() {
        let edge = Edge {
            from_location_id: "a".to_string(),
            to_location_id: "b".to_string(),
            weight: 0.5,
            directional: Directional::Oneway,
            osm_id: None,
        };
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["directional"], "oneway");
        assert!(value.get("osm_id").is_none());
    }

    #[test]
    fn test_graph_dedups_nodes() {
        let mut graph = RoadGraph::new();
        graph.add_node(GraphNode { osm_id: 1, lat: 0.0, lon: 0.0 });
        graph.add_node(GraphNode { osm_id: 1, lat: 5.0, lon: 5.0 });
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.nodes[0].lat, 0.0);
        assert!(graph.contains_node(1));
        assert!(!graph.contains_node(2));
    }
}
