//! Evacuation centers are not part of the street network, so each one is
//! stored as its own location and wired to the closest road node with a pair
//! of edges. Every step checks what is already stored so the stage can be
//! re-run safely.

use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

use crate::model::distance::haversine_km;
use crate::model::{Directional, Edge, Location, LocationType};
use crate::store::{StoreError, TableStore, EDGES_TABLE, LOCATION_TABLE};

/// A manually listed point of interest
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EvacuationCenter {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl EvacuationCenter {
    pub fn new(name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }
}

/// The centers seeded when no list is supplied
pub fn default_centers() -> Vec<EvacuationCenter> {
    vec![
        EvacuationCenter::new(
            "Santa Monica National High School - Main",
            14.839295564617862,
            120.73736897910136,
        ),
        EvacuationCenter::new("Santa Monica Elementary School", 14.838881, 120.737676),
        EvacuationCenter::new(
            "Santa Monica Barangay Hall",
            14.839561347969248,
            120.73877010982662,
        ),
    ]
}

/// Read a JSON array of `{name, latitude, longitude}` objects
pub fn load_centers<P: AsRef<Path>>(path: P) -> Result<Vec<EvacuationCenter>> {
    let path = path.as_ref();
    let data = fs::read(path)
        .with_context(|| format!("Failed to read centers file {}", path.display()))?;
    serde_json::from_slice(&data)
        .with_context(|| format!("Failed to parse centers file {}", path.display()))
}

/// The columns of a stored location needed for snapping
#[derive(Debug, Clone, Deserialize)]
pub struct StoredNode {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "type")]
    pub location_type: LocationType,
}

/// Read every road node currently in the location table
pub fn fetch_road_nodes<S: TableStore + ?Sized>(store: &S) -> Result<Vec<StoredNode>> {
    let rows = store
        .select(LOCATION_TABLE, "id,latitude,longitude,type", &[("type", "road_node")])
        .context("Failed to fetch road nodes")?;

    rows.into_iter()
        .map(|row| serde_json::from_value(row).context("Malformed location row"))
        .collect()
}

/// The road node closest to the given point and its distance in km.
/// Ties keep the first node seen.
pub fn nearest_road_node(nodes: &[StoredNode], latitude: f64, longitude: f64) -> Option<(&StoredNode, f64)> {
    let mut best: Option<(&StoredNode, f64)> = None;
    for node in nodes {
        if node.location_type != LocationType::RoadNode {
            continue;
        }
        let dist = haversine_km(latitude, longitude, node.latitude, node.longitude);
        if best.is_none_or(|(_, min)| dist < min) {
            best = Some((node, dist));
        }
    }
    best
}

/// Whether the center's location row was created or refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CenterReport {
    pub inserted: usize,
    pub updated: usize,
    /// Centers with no road node to attach to
    pub skipped: usize,
    pub failed: usize,
    pub edges_added: usize,
}

/// Attach every center to the road network, logging and moving on when one fails
pub fn attach_centers<S: TableStore + ?Sized>(store: &S, centers: &[EvacuationCenter]) -> CenterReport {
    info!("Adding/Updating {} evacuation centers", centers.len());
    let mut report = CenterReport::default();

    for center in centers {
        match attach_center(store, center) {
            Ok(Some((upsert, edges_added))) => {
                match upsert {
                    Upsert::Inserted => report.inserted += 1,
                    Upsert::Updated => report.updated += 1,
                }
                report.edges_added += edges_added;
            }
            Ok(None) => report.skipped += 1,
            Err(e) => {
                error!("Error adding/updating evacuation center {}: {:#}", center.name, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Evacuation centers: {} inserted, {} updated, {} skipped, {} failed, {} edges added",
        report.inserted, report.updated, report.skipped, report.failed, report.edges_added
    );
    report
}

/// Upsert one center and its edges to the nearest road node.
/// Returns `None` when there is no road node to attach to.
pub fn attach_center<S: TableStore + ?Sized>(
    store: &S,
    center: &EvacuationCenter,
) -> Result<Option<(Upsert, usize)>> {
    // Re-read so nodes inserted earlier in this run are included
    let nodes = fetch_road_nodes(store)?;
    let Some((nearest, distance)) = nearest_road_node(&nodes, center.latitude, center.longitude) else {
        warn!("Could not find a closest road node for {}. Skipping.", center.name);
        return Ok(None);
    };
    info!("  Adding/Updating {} (closest node: {}, {:.3} km)", center.name, nearest.id, distance);

    let (center_id, upsert) = upsert_location(store, center)?;

    let mut edges_added = 0;
    for (from, to) in [(&center_id, &nearest.id), (&nearest.id, &center_id)] {
        if edge_exists(store, from, to)? {
            continue;
        }
        let edge = Edge {
            from_location_id: from.clone(),
            to_location_id: to.clone(),
            weight: distance,
            directional: Directional::Bidirectional,
            osm_id: None,
        };
        match insert_one(store, EDGES_TABLE, serde_json::to_value(&edge)?) {
            Ok(_) => {
                info!("    Added edge {} -> {}", from, to);
                edges_added += 1;
            }
            Err(e) => warn!("    Failed to insert edge {} -> {} for {}: {}", from, to, center.name, e),
        }
    }

    Ok(Some((upsert, edges_added)))
}

/// Update the location named after the center, or insert it when missing
fn upsert_location<S: TableStore + ?Sized>(store: &S, center: &EvacuationCenter) -> Result<(String, Upsert)> {
    let existing = store
        .select(LOCATION_TABLE, "id", &[("name", center.name.as_str())])
        .context("Failed to look up existing center")?;

    if let Some(id) = existing.first().and_then(row_id) {
        let patch = json!({
            "name": center.name,
            "latitude": center.latitude,
            "longitude": center.longitude,
            "type": LocationType::EvacuationCenter,
        });
        let updated = store
            .update(LOCATION_TABLE, &[("id", id.as_str())], &patch)
            .context("Failed to update existing center")?;
        if updated.is_empty() {
            return Err(StoreError::EmptyResponse {
                table: LOCATION_TABLE.to_string(),
            })
            .context("Failed to update existing center");
        }
        info!("  Updated existing evacuation center: {}", center.name);
        return Ok((id, Upsert::Updated));
    }

    let location = Location::evacuation_center(&center.name, center.latitude, center.longitude);
    let inserted = insert_one(store, LOCATION_TABLE, serde_json::to_value(&location)?)
        .context("Failed to insert new center")?;
    let id = row_id(&inserted).unwrap_or(location.id);
    info!("  Inserted new evacuation center: {}", center.name);
    Ok((id, Upsert::Inserted))
}

fn edge_exists<S: TableStore + ?Sized>(store: &S, from: &str, to: &str) -> Result<bool> {
    let rows = store
        .select(
            EDGES_TABLE,
            "id",
            &[("from_location_id", from), ("to_location_id", to)],
        )
        .context("Failed to look up existing edge")?;
    Ok(!rows.is_empty())
}

/// Insert a single row, treating an empty reply as a failure
fn insert_one<S: TableStore + ?Sized>(store: &S, table: &str, row: Value) -> Result<Value, StoreError> {
    store
        .insert(table, std::slice::from_ref(&row))?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::EmptyResponse {
            table: table.to_string(),
        })
}

fn row_id(row: &Value) -> Option<String> {
    row.get("id").and_then(Value::as_str).map(str::to_string)
}
