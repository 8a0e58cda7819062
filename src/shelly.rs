use crate::error::AppError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One block of minute-spaced sample rows starting at `ts`.
#[derive(Debug, Deserialize)]
pub struct DataBlock {
    pub ts: i64,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct GetDataResponse {
    pub keys: Vec<String>,
    pub data: Vec<DataBlock>,
    pub next_record_ts: Option<i64>,
}

/// The flat keys/values table for one closed window.
#[derive(Debug)]
pub struct RawWindow {
    pub keys: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

/// RPC client for the meter's local HTTP endpoint.
pub struct ShellyClient {
    base_url: String,
    http: reqwest::Client,
}

impl ShellyClient {
    pub fn new(addr: &str) -> Self {
        Self {
            base_url: format!("http://{addr}/rpc"),
            http: reqwest::Client::new(),
        }
    }

    /// Fetches the cumulative counters snapshot. Every numeric field of the
    /// status object is a counter except the meter id.
    pub async fn get_status(&self) -> Result<BTreeMap<String, f64>, AppError> {
        let url = format!("{}/EMData.GetStatus?id=0", self.base_url);
        let status: serde_json::Value = self.get_json(&url).await?;

        let mut counters = BTreeMap::new();
        if let Some(object) = status.as_object() {
            for (key, value) in object {
                if key == "id" {
                    continue;
                }
                if let Some(number) = value.as_f64() {
                    counters.insert(key.clone(), number);
                }
            }
        }
        Ok(counters)
    }

    /// Collects the history table for `[from_ts, to_ts)`, following the
    /// device's record pagination. Keys come from the first page.
    pub async fn fetch_window(&self, from_ts: i64, to_ts: i64) -> Result<RawWindow, AppError> {
        let mut keys: Option<Vec<String>> = None;
        let mut values: Vec<Vec<f64>> = Vec::new();

        let mut current = from_ts;
        while current != 0 {
            let url = format!(
                "{}/EMData.GetData?id=0&ts={}&end_ts={}",
                self.base_url, current, to_ts
            );
            let page: GetDataResponse = self.get_json(&url).await?;

            if keys.is_none() {
                keys = Some(page.keys);
            }
            for block in page.data {
                append_block_rows(&mut values, block.ts, block.values, from_ts, to_ts);
            }

            current = page.next_record_ts.unwrap_or(0);
        }

        let keys = keys.filter(|k| !k.is_empty()).ok_or(AppError::MissingKeys)?;
        if values.is_empty() {
            return Err(AppError::EmptyWindow);
        }
        Ok(RawWindow { keys, values })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)
    }
}

fn http_err(e: reqwest::Error) -> AppError {
    AppError::Http(e.to_string())
}

/// Appends the rows of one block that fall inside `[from_ts, to_ts)`. Rows
/// are one minute apart starting at `block_ts`.
fn append_block_rows(
    values: &mut Vec<Vec<f64>>,
    block_ts: i64,
    rows: Vec<Vec<f64>>,
    from_ts: i64,
    to_ts: i64,
) {
    for (i, row) in rows.into_iter().enumerate() {
        let row_ts = block_ts + 60 * i as i64;
        if row_ts < from_ts {
            continue;
        }
        values.push(row);
        if row_ts + 60 >= to_ts {
            break;
        }
    }
}
