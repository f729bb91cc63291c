use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::model::records::GraphRecords;
use crate::store::{StoreError, TableStore, EDGES_TABLE, LOCATION_TABLE};

pub mod centers;

/// Rows per insert request; keeps payloads under the backend's size limit
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to insert {table} in batch {batch}")]
    Batch {
        table: String,
        batch: usize,
        #[source]
        source: StoreError,
    },

    #[error("failed to serialize {table} row")]
    Serialize {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of a batched upload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub inserted: usize,
    /// Batches rejected as duplicates of existing rows
    pub conflicts: usize,
}

/// Insert `rows` into `table` in chunks of `batch_size`.
///
/// A conflicting batch is logged and skipped; any other failure stops the
/// upload and is returned.
pub fn upload_in_batches<S, T>(
    store: &S,
    table: &str,
    rows: &[T],
    batch_size: usize,
) -> Result<BatchReport, UploadError>
where
    S: TableStore + ?Sized,
    T: Serialize,
{
    let batch_size = batch_size.max(1);
    let total_batches = rows.len().div_ceil(batch_size);
    let mut report = BatchReport::default();

    for (idx, chunk) in rows.chunks(batch_size).enumerate() {
        let batch = idx + 1;
        info!("  Inserting {} batch {} of {}", table, batch, total_batches);

        let values = chunk
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| UploadError::Serialize {
                table: table.to_string(),
                source,
            })?;

        report.batches += 1;
        match store.insert(table, &values) {
            Ok(inserted) if inserted.is_empty() => {
                return Err(UploadError::Batch {
                    table: table.to_string(),
                    batch,
                    source: StoreError::EmptyResponse {
                        table: table.to_string(),
                    },
                });
            }
            Ok(inserted) => report.inserted += inserted.len(),
            Err(e) if e.is_conflict() => {
                warn!(
                    "  Skipping duplicate {} in batch {}. Data likely already exists.",
                    table, batch
                );
                report.conflicts += 1;
            }
            Err(source) => {
                return Err(UploadError::Batch {
                    table: table.to_string(),
                    batch,
                    source,
                });
            }
        }
    }

    info!("Successfully inserted/processed {} {} rows", rows.len(), table);
    Ok(report)
}

/// Upload all road-node locations, then all road edges
pub fn seed_graph<S: TableStore + ?Sized>(
    store: &S,
    records: &GraphRecords,
    batch_size: usize,
) -> Result<(BatchReport, BatchReport), UploadError> {
    info!("Inserting {} locations", records.locations.len());
    let locations = upload_in_batches(store, LOCATION_TABLE, &records.locations, batch_size)?;

    // Edges reference locations, so they only go up once every location has
    info!("Inserting {} edges", records.edges.len());
    let edges = upload_in_batches(store, EDGES_TABLE, &records.edges, batch_size)?;

    Ok((locations, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::records::project_graph;
    use crate::model::{GraphEdge, GraphNode, Location, RoadGraph};
    use crate::store::memory::MemoryStore;

    fn locations(count: usize) -> Vec<Location> {
        (0..count)
            .map(|i| Location::road_node(i as i64, 14.0, 120.0 + i as f64 * 1e-5))
            .collect()
    }

    fn conflict() -> StoreError {
        StoreError::Conflict {
            table: LOCATION_TABLE.to_string(),
            body: "duplicate key".to_string(),
        }
    }

    #[test]
    fn test_single_row() {
        let store = MemoryStore::new();
        let report = upload_in_batches(&store, LOCATION_TABLE, &locations(1), DEFAULT_BATCH_SIZE).unwrap();

        assert_eq!(report, BatchReport { batches: 1, inserted: 1, conflicts: 0 });
        assert_eq!(store.rows(LOCATION_TABLE).len(), 1);
    }

    #[test]
    fn test_exact_chunk_boundary() {
        let store = MemoryStore::new();
        let rows = locations(DEFAULT_BATCH_SIZE);
        let report = upload_in_batches(&store, LOCATION_TABLE, &rows, DEFAULT_BATCH_SIZE).unwrap();

        assert_eq!(report.batches, 1);
        assert_eq!(report.inserted, 1000);
        assert_eq!(*store.inserts.borrow(), vec![(LOCATION_TABLE.to_string(), 1000)]);

        let stored = store.rows(LOCATION_TABLE);
        assert_eq!(stored.len(), 1000);
        assert_eq!(stored[999]["id"], rows[999].id.as_str());
    }

    #[test]
    fn test_one_past_boundary() {
        let store = MemoryStore::new();
        let report = upload_in_batches(&store, LOCATION_TABLE, &locations(1001), DEFAULT_BATCH_SIZE).unwrap();

        assert_eq!(report.batches, 2);
        assert_eq!(
            *store.inserts.borrow(),
            vec![(LOCATION_TABLE.to_string(), 1000), (LOCATION_TABLE.to_string(), 1)]
        );
        assert_eq!(store.rows(LOCATION_TABLE).len(), 1001);
    }

    #[test]
    fn test_empty_input_makes_no_requests() {
        let store = MemoryStore::new();
        let report = upload_in_batches::<_, Location>(&store, LOCATION_TABLE, &[], DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(report, BatchReport::default());
        assert!(store.inserts.borrow().is_empty());
    }

    #[test]
    fn test_conflict_is_tolerated() {
        let store = MemoryStore::new();
        store.fail_next_insert(conflict());

        let report = upload_in_batches(&store, LOCATION_TABLE, &locations(5), 2).unwrap();
        assert_eq!(report, BatchReport { batches: 3, inserted: 3, conflicts: 1 });
        assert_eq!(store.rows(LOCATION_TABLE).len(), 3);
    }

    #[test]
    fn test_other_failure_aborts() {
        let store = MemoryStore::new();
        store.fail_next_insert(StoreError::Status {
            table: LOCATION_TABLE.to_string(),
            status: 500,
            body: "boom".to_string(),
        });

        let err = upload_in_batches(&store, LOCATION_TABLE, &locations(5), 2).unwrap_err();
        match err {
            UploadError::Batch { batch, source, .. } => {
                assert_eq!(batch, 1);
                assert!(!source.is_conflict());
            }
            other => panic!("unexpected error: {}", other),
        }
        // Nothing after the failing batch is attempted
        assert_eq!(store.inserts.borrow().len(), 1);
        assert!(store.rows(LOCATION_TABLE).is_empty());
    }

    #[test]
    fn test_seed_graph_uploads_locations_first() {
        let mut graph = RoadGraph::new();
        for id in 1..=3 {
            graph.add_node(GraphNode { osm_id: id, lat: 14.0, lon: 120.0 + id as f64 * 1e-3 });
        }
        for (source, target) in [(1, 2), (2, 3)] {
            graph.add_edge(GraphEdge {
                source,
                target,
                osm_way_id: 7,
                length_m: 100.0,
                oneway: false,
            });
        }
        let records = project_graph(&graph);

        let store = MemoryStore::new();
        let (locations, edges) = seed_graph(&store, &records, 2).unwrap();
        assert_eq!(locations.inserted, 3);
        assert_eq!(edges.inserted, 2);

        let tables: Vec<String> = store.inserts.borrow().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(tables, vec![LOCATION_TABLE, LOCATION_TABLE, EDGES_TABLE]);
    }

    #[test]
    fn test_failed_locations_stop_edges() {
        let store = MemoryStore::new();
        store.fail_next_insert(StoreError::Status {
            table: LOCATION_TABLE.to_string(),
            status: 400,
            body: "bad request".to_string(),
        });
        let records = GraphRecords {
            locations: locations(2),
            ..GraphRecords::default()
        };

        assert!(seed_graph(&store, &records, DEFAULT_BATCH_SIZE).is_err());
        assert!(store.rows(EDGES_TABLE).is_empty());
        assert_eq!(store.inserts.borrow().len(), 1);
    }
}
