use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::models::{AnalysisResult, DailyNote};
use crate::sheets::SheetsClient;

/// Sheet and column the daily notes land in.
const NOTES_SHEET: &str = "daily";
const NOTES_COLUMN: &str = "C";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn load_analysis(path: &Path) -> Result<AnalysisResult> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read analysis file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse analysis file: {}", path.display()))
}

/// The date→row table is injected, never baked in; the CLI loads it from a
/// JSON object of the form `{"2025-10-01": 3}`.
pub fn load_row_mapping(path: &Path) -> Result<HashMap<String, u32>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read row mapping file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse row mapping file: {}", path.display()))
}

/// Pair each daily note with its target row. Notes without a mapped row are
/// skipped, which is a no-op rather than an error.
fn plan_updates<'a>(
    notes: &'a [DailyNote],
    date_to_row: &HashMap<String, u32>,
) -> (Vec<(u32, &'a DailyNote)>, usize) {
    let mut planned = Vec::new();
    let mut skipped = 0;

    for note in notes {
        match date_to_row.get(&note.date) {
            Some(&row) => planned.push((row, note)),
            None => {
                tracing::info!("No row mapping for {}", note.date);
                skipped += 1;
            }
        }
    }

    (planned, skipped)
}

/// Push each day's note into its spreadsheet row. A failed row update is
/// counted and the remaining rows are still attempted.
pub async fn update_tracker(
    client: &SheetsClient,
    analysis: &AnalysisResult,
    date_to_row: &HashMap<String, u32>,
) -> UpdateSummary {
    let (planned, skipped) = plan_updates(&analysis.daily_notes, date_to_row);

    let mut summary = UpdateSummary {
        skipped,
        ..UpdateSummary::default()
    };

    for (row, note) in planned {
        let range = format!("{NOTES_SHEET}!{NOTES_COLUMN}{row}");
        match client.update_cell(&range, &note.note).await {
            Ok(()) => {
                tracing::info!("Updated {} (row {})", note.date, row);
                summary.updated += 1;
            }
            Err(e) => {
                tracing::error!("Failed to update {}: {:#}", note.date, e);
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    fn note(date: &str, text: &str) -> DailyNote {
        let stamp = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        DailyNote {
            date: date.to_string(),
            note: text.to_string(),
            commit_count: 1,
            first_commit: stamp,
            last_commit: stamp,
        }
    }

    #[test]
    fn test_plan_skips_unmapped_dates() {
        let notes = vec![
            note("2025-10-01", "feat: 2"),
            note("2025-10-02", "1 commit"),
            note("2025-10-03", "fix: 1"),
        ];
        let mapping: HashMap<String, u32> =
            [("2025-10-01".to_string(), 3), ("2025-10-03".to_string(), 5)]
                .into_iter()
                .collect();

        let (planned, skipped) = plan_updates(&notes, &mapping);

        assert_eq!(skipped, 1);
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].0, 3);
        assert_eq!(planned[0].1.note, "feat: 2");
        assert_eq!(planned[1].0, 5);
    }

    #[test]
    fn test_plan_with_empty_mapping_skips_everything() {
        let notes = vec![note("2025-10-01", "feat: 2")];
        let (planned, skipped) = plan_updates(&notes, &HashMap::new());
        assert!(planned.is_empty());
        assert_eq!(skipped, 1);
    }
}
