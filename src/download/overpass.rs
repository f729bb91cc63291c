use serde::Deserialize;
use std::collections::HashMap;

use crate::model::TravelMode;

/// Offset turning an OSM relation id into an Overpass area id
const AREA_ID_OFFSET: i64 = 3_600_000_000;

/// Server-side timeout for a query, in seconds
const QUERY_TIMEOUT_S: u32 = 180;

// ============================================================================
// Nominatim
// ============================================================================

/// A single Nominatim search hit
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeHit {
    pub osm_type: String,
    pub osm_id: i64,
    pub display_name: String,
    /// south, north, west, east as strings
    pub boundingbox: [String; 4],
}

/// Where to look for ways
#[derive(Debug, Clone, PartialEq)]
pub enum SearchArea {
    /// An OSM relation boundary
    Area(i64),
    /// south, west, north, east
    BoundingBox(f64, f64, f64, f64),
}

impl GeocodeHit {
    pub fn search_area(&self) -> Result<SearchArea, std::num::ParseFloatError> {
        if self.osm_type == "relation" {
            return Ok(SearchArea::Area(AREA_ID_OFFSET + self.osm_id));
        }
        let south = self.boundingbox[0].parse()?;
        let north = self.boundingbox[1].parse()?;
        let west = self.boundingbox[2].parse()?;
        let east = self.boundingbox[3].parse()?;
        Ok(SearchArea::BoundingBox(south, west, north, east))
    }
}

// ============================================================================
// Overpass
// ============================================================================

/// Build the Overpass QL query for the ways of a travel mode inside an area
pub fn build_query(area: &SearchArea, mode: TravelMode) -> String {
    let filter = mode.way_filter();
    match area {
        SearchArea::Area(area_id) => format!(
            "[out:json][timeout:{}];area({})->.searchArea;(way{}(area.searchArea););(._;>;);out body;",
            QUERY_TIMEOUT_S, area_id, filter
        ),
        SearchArea::BoundingBox(south, west, north, east) => format!(
            "[out:json][timeout:{}];(way{}({},{},{},{}););(._;>;);out body;",
            QUERY_TIMEOUT_S, filter, south, west, north, east
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type")]
    pub elem_type: String,
    pub id: i64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub nodes: Option<Vec<i64>>,
    pub tags: Option<HashMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(osm_type: &str) -> GeocodeHit {
        GeocodeHit {
            osm_type: osm_type.to_string(),
            osm_id: 1234,
            display_name: "Hagonoy, Bulacan".to_string(),
            boundingbox: [
                "14.80".to_string(),
                "14.90".to_string(),
                "120.70".to_string(),
                "120.80".to_string(),
            ],
        }
    }

    #[test]
    fn test_relation_becomes_area() {
        assert_eq!(hit("relation").search_area().unwrap(), SearchArea::Area(3_600_001_234));
    }

    #[test]
    fn test_other_types_use_bbox() {
        assert_eq!(
            hit("way").search_area().unwrap(),
            SearchArea::BoundingBox(14.80, 120.70, 14.90, 120.80)
        );
    }

    #[test]
    fn test_query_shape() {
        let query = build_query(&SearchArea::Area(3_600_001_234), TravelMode::Walk);
        assert!(query.starts_with("[out:json]"));
        assert!(query.contains("area(3600001234)->.searchArea;"));
        assert!(query.contains(r#"["foot"!~"no"]"#));
        assert!(query.ends_with("out body;"));

        let query = build_query(&SearchArea::BoundingBox(1.0, 2.0, 3.0, 4.0), TravelMode::Drive);
        assert!(query.contains("(1,2,3,4)"));
        assert!(query.contains(r#"["motorcar"!~"no"]"#));
    }

    #[test]
    fn test_parse_response() {
        let json = r#"{
            "version": 0.6,
            "elements": [
                {"type": "node", "id": 1, "lat": 14.8, "lon": 120.7},
                {"type": "way", "id": 9, "nodes": [1, 2], "tags": {"highway": "residential"}}
            ]
        }"#;
        let response: OverpassResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.elements.len(), 2);
        assert_eq!(response.elements[1].nodes.as_deref(), Some(&[1, 2][..]));
        assert_eq!(
            response.elements[1].tags.as_ref().and_then(|t| t.get("highway")).map(|s| s.as_str()),
            Some("residential")
        );
    }
}
