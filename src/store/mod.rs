use serde_json::Value;
use thiserror::Error;

#[cfg(test)]
pub mod memory;
pub mod rest;

pub const LOCATION_TABLE: &str = "location";
pub const EDGES_TABLE: &str = "edges";

/// Status code the store answers with when a unique constraint is violated
pub const CONFLICT_STATUS: u16 = 409;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conflict in table '{table}': {body}")]
    Conflict { table: String, body: String },

    #[error("request on table '{table}' failed with status {status}: {body}")]
    Status { table: String, status: u16, body: String },

    #[error("empty response from table '{table}'")]
    EmptyResponse { table: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    /// A duplicate row, usually left behind by an earlier run
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// The tabular operations the seeder needs from its backend.
/// Filters are `(column, value)` equality pairs.
pub trait TableStore {
    /// Insert rows and return them as stored
    fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError>;

    /// Apply `patch` to every row matching `filters` and return the updated rows
    fn update(&self, table: &str, filters: &[(&str, &str)], patch: &Value) -> Result<Vec<Value>, StoreError>;

    /// Read `columns` (comma separated) of every row matching `filters`
    fn select(&self, table: &str, columns: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>, StoreError>;
}
