use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::store::{StoreError, TableStore, CONFLICT_STATUS};

/// Rows asked for per select request. Servers may return fewer than this
const PAGE_SIZE: usize = 1000;

/// Table store speaking the PostgREST dialect used by Supabase
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.service_role_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    /// Send the request and decode the returned rows
    fn execute(&self, table: &str, request: RequestBuilder) -> Result<Vec<Value>, StoreError> {
        let response = self.authorized(request).send()?;
        decode_rows(table, response)
    }
}

/// Turn equality filters into PostgREST query parameters
fn filter_params(filters: &[(&str, &str)]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(column, value)| (column.to_string(), format!("eq.{}", value)))
        .collect()
}

fn decode_rows(table: &str, response: Response) -> Result<Vec<Value>, StoreError> {
    let status = response.status();
    let body = response.text()?;
    decode_body(table, status, body)
}

/// Map a PostgREST reply to rows: 409 is a conflict, any other failure keeps its status and body
fn decode_body(table: &str, status: StatusCode, body: String) -> Result<Vec<Value>, StoreError> {
    if status.as_u16() == CONFLICT_STATUS {
        return Err(StoreError::Conflict {
            table: table.to_string(),
            body,
        });
    }
    if !status.is_success() {
        return Err(StoreError::Status {
            table: table.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(row) => Ok(vec![row]),
        Err(_) => Err(StoreError::Status {
            table: table.to_string(),
            status: status.as_u16(),
            body,
        }),
    }
}

impl TableStore for RestStore {
    fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>, StoreError> {
        debug!("POST {} rows to {}", rows.len(), table);
        let request = self.client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(rows);
        self.execute(table, request)
    }

    fn update(&self, table: &str, filters: &[(&str, &str)], patch: &Value) -> Result<Vec<Value>, StoreError> {
        debug!("PATCH {} where {:?}", table, filters);
        let request = self.client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(patch);
        self.execute(table, request)
    }

    fn select(&self, table: &str, columns: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>, StoreError> {
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            debug!("GET {} where {:?} (offset {})", table, filters, offset);
            let request = self.client
                .get(self.table_url(table))
                .query(&[("select", columns), ("order", "id.asc")])
                .query(&filter_params(filters))
                .query(&[("limit", PAGE_SIZE), ("offset", offset)]);

            // A server row cap below PAGE_SIZE shortens every page, so only an empty page ends the scan
            let page = self.execute(table, request)?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            rows.extend(page);
        }

        Ok(rows)
    }
}
