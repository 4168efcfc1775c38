use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::auth::Identity;
use crate::models::{SpreadsheetInfo, WorksheetInfo};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetResponse {
    spreadsheet_id: String,
    properties: SpreadsheetProperties,
    spreadsheet_url: String,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    index: i64,
}

impl From<SpreadsheetResponse> for SpreadsheetInfo {
    fn from(data: SpreadsheetResponse) -> Self {
        Self {
            spreadsheet_id: data.spreadsheet_id,
            title: data.properties.title,
            url: data.spreadsheet_url,
            sheets: data
                .sheets
                .into_iter()
                .map(|s| WorksheetInfo {
                    sheet_id: s.properties.sheet_id,
                    title: s.properties.title,
                    index: s.properties.index,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Thin pass-through client for the Google Sheets API, bound to one
/// spreadsheet. No retry or batching; failures carry the HTTP status and
/// response body.
pub struct SheetsClient {
    http: reqwest::Client,
    token: String,
    spreadsheet_id: String,
}

impl SheetsClient {
    /// Authenticate the identity and bind to a spreadsheet.
    pub async fn connect(identity: &Identity, spreadsheet_id: String) -> Result<Self> {
        let http = reqwest::Client::new();
        let token = identity.access_token(&http).await?;

        Ok(Self {
            http,
            token,
            spreadsheet_id,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(SHEETS_API_BASE).context("Invalid API base URL")?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| anyhow::anyhow!("API base URL cannot be a base"))?;
            path.push(&self.spreadsheet_id);
            path.extend(segments);
        }
        Ok(url)
    }

    /// Spreadsheet metadata: title, URL, and the contained worksheets.
    pub async fn spreadsheet_info(&self) -> Result<SpreadsheetInfo> {
        let url = self.url(&[])?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let data: SpreadsheetResponse = check(response)
            .await?
            .json()
            .await
            .context("Failed to parse spreadsheet metadata")?;

        Ok(data.into())
    }

    /// Read a range and re-key each data row by the header row. The header
    /// row itself is not returned.
    pub async fn worksheet_records(&self, range: &str) -> Result<Vec<Map<String, Value>>> {
        let values = self.range_values(range).await?;

        let Some((header, rows)) = values.split_first() else {
            return Ok(Vec::new());
        };

        let headers: Vec<String> = header.iter().map(cell_text).collect();
        let records = rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, cell)| (name.clone(), cell.clone()))
                    .collect()
            })
            .collect();

        Ok(records)
    }

    /// Read a range as the raw 2-D value grid.
    pub async fn range_values(&self, range: &str) -> Result<Vec<Vec<Value>>> {
        let url = self.url(&["values", range])?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let data: ValueRange = check(response)
            .await?
            .json()
            .await
            .context("Failed to parse range values")?;

        Ok(data.values)
    }

    /// Write a single cell.
    pub async fn update_cell(&self, range: &str, value: &str) -> Result<()> {
        self.update_cells(range, vec![vec![Value::String(value.to_string())]])
            .await
    }

    /// Write a grid of values starting at the given range.
    pub async fn update_cells(&self, range: &str, values: Vec<Vec<Value>>) -> Result<()> {
        let url = self.url(&["values", range])?;
        let response = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": values }))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    /// Append rows after the last row of data in the range's table.
    pub async fn append_rows(&self, range: &str, values: Vec<Vec<Value>>) -> Result<()> {
        let url = self.url(&["values", &format!("{range}:append")])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": values }))
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    /// Add a new worksheet to the spreadsheet.
    pub async fn create_worksheet(&self, title: &str) -> Result<()> {
        // batchUpdate hangs off the spreadsheet id segment itself.
        let mut url = Url::parse(SHEETS_API_BASE).context("Invalid API base URL")?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("API base URL cannot be a base"))?
            .push(&format!("{}:batchUpdate", self.spreadsheet_id));
        let body = json!({
            "requests": [
                { "addSheet": { "properties": { "title": title } } }
            ]
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;

        Ok(())
    }

    pub async fn list_worksheets(&self) -> Result<Vec<WorksheetInfo>> {
        Ok(self.spreadsheet_info().await?.sheets)
    }
}

/// Create a brand new spreadsheet owned by the identity.
pub async fn create_spreadsheet(identity: &Identity, title: &str) -> Result<SpreadsheetInfo> {
    let http = reqwest::Client::new();
    let token = identity.access_token(&http).await?;

    let body = json!({
        "properties": { "title": title },
        "sheets": [ { "properties": { "title": "Sheet1" } } ]
    });
    let response = http
        .post(SHEETS_API_BASE)
        .bearer_auth(&token)
        .json(&body)
        .send()
        .await?;
    let data: SpreadsheetResponse = check(response)
        .await?
        .json()
        .await
        .context("Failed to parse created spreadsheet")?;

    Ok(data.into())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Sheets API returned {status}: {body}");
    }
    Ok(response)
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
