use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::store::{StoreError, TableStore};

/// In-process table store for exercising the pipeline without a backend
#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Vec<Value>>>,
    /// Errors returned by upcoming inserts, oldest first
    insert_failures: RefCell<VecDeque<StoreError>>,
    /// Table and row count of every insert call
    pub inserts: RefCell<Vec<(String, usize)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_insert(&self, error: StoreError) {
        self.insert_failures.borrow_mut().push_back(error);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.borrow().get(table).cloned().unwrap_or_default()
    }
}

fn matches(row: &Value, filters: &[(&str, &str)]) -> bool {
    filters.iter().all(|(column, value)| match row.get(*column) {
        Some(Value::String(s)) => s == value,
        Some(other) => other.to_string() == *value,
        None => false,
    })
}

fn project(row: &Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row.clone();
    }
    let mut projected = Map::new();
    for column in columns.split(',').map(str::trim) {
        if let Some(value) = row.get(column) {
            projected.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(projected)
}

impl TableStore for MemoryStore {
    fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError> {
        self.inserts.borrow_mut().push((table.to_string(), rows.len()));
        if let Some(error) = self.insert_failures.borrow_mut().pop_front() {
            return Err(error);
        }
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.to_vec())
    }

    fn update(&self, table: &str, filters: &[(&str, &str)], patch: &Value) -> Result<Vec<Value>, StoreError> {
        let mut tables = self.tables.borrow_mut();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if !matches(row, filters) {
                continue;
            }
            if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    fn select(&self, table: &str, columns: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .get(table)
            .into_iter()
            .flatten()
            .filter(|row| matches(row, filters))
            .map(|row| project(row, columns))
            .collect())
    }
}
