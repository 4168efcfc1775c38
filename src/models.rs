use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single commit as retrieved from a repository's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub date: DateTime<Utc>,
    /// First line of the commit message.
    pub message: String,
    pub author: String,
    /// Directory name of the owning repository.
    pub repository: String,
}

/// Synthesized summary of one calendar day's commit activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyNote {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub note: String,
    pub commit_count: usize,
    pub first_commit: DateTime<Utc>,
    pub last_commit: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub start_date: String,
    pub end_date: String,
    pub repos_dir: String,
    pub repository_count: usize,
    pub total_commits: usize,
}

/// The persisted JSON artifact handed from an analysis run to the
/// spreadsheet-update workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub metadata: AnalysisMetadata,
    pub daily_notes: Vec<DailyNote>,
    pub commits: Vec<Commit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorksheetInfo {
    pub sheet_id: i64,
    pub title: String,
    pub index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetInfo {
    pub spreadsheet_id: String,
    pub title: String,
    pub url: String,
    pub sheets: Vec<WorksheetInfo>,
}

/// Service account key material, as found in the credentials JSON.
/// Only the fields needed for the token exchange are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

/// Response from a Google OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
