use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use git2::Repository;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{AnalysisMetadata, AnalysisResult, Commit, DailyNote};

/// Conventional-commit prefixes that mark a commit as significant.
/// Matching is a literal starts-with test, so `feature` matches `feat`;
/// intentional, kept from the existing behavior.
const SIGNIFICANT_PREFIXES: &[&str] = &[
    "feat", "fix", "merge", "refactor", "chore:", "perf", "docs", "test", "break",
];

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub repos_dir: PathBuf,
    /// Exact names or single-`*` wildcard patterns.
    pub patterns: Vec<String>,
}

pub struct GitAnalyzer {
    options: AnalyzerOptions,
}

impl GitAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self { options }
    }

    /// List immediate subdirectories of the repos dir that match a
    /// configured pattern and contain a `.git` marker. A missing repos dir
    /// is reported and yields an empty list. Result order follows
    /// filesystem enumeration order.
    pub fn discover_repositories(&self) -> Vec<PathBuf> {
        let mut repositories = Vec::new();

        let entries = match std::fs::read_dir(&self.options.repos_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    "Repositories directory is not readable: {}: {}",
                    self.options.repos_dir.display(),
                    e
                );
                return repositories;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join(".git").is_dir() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if self.options.patterns.iter().any(|p| pattern_matches(p, &name)) {
                repositories.push(path);
            }
        }

        repositories
    }

    /// Retrieve commits from one repository whose timestamp falls within
    /// the configured window, inclusive at both ends. The log is walked
    /// newest-first (git's time order), but every commit is tested
    /// individually so a clock-skewed timestamp cannot hide its ancestors.
    pub fn collect_commits(&self, repo_path: &Path) -> Result<Vec<Commit>> {
        let repo = Repository::open(repo_path)
            .with_context(|| format!("Failed to open repository: {}", repo_path.display()))?;

        let mut revwalk = repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let start_ts = self
            .options
            .start_date
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        let end_ts = self
            .options
            .end_date
            .and_hms_opt(23, 59, 59)
            .unwrap()
            .and_utc()
            .timestamp();

        let repository = repo_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| repo_path.display().to_string());

        let mut commits = Vec::new();

        for oid in revwalk.flatten() {
            let commit = repo.find_commit(oid)?;
            let time = commit.time().seconds();

            if time > end_ts || time < start_ts {
                continue;
            }

            let message = commit.message().unwrap_or("");
            let author = commit.author();

            commits.push(Commit {
                hash: oid.to_string(),
                date: Utc.timestamp_opt(time, 0).unwrap(),
                message: message.lines().next().unwrap_or("").to_string(),
                author: author.name().unwrap_or("").to_string(),
                repository: repository.clone(),
            });
        }

        Ok(commits)
    }

    /// Analyze every discovered repository. A retrieval failure in one
    /// repository is logged and contributes zero commits; it never aborts
    /// the run.
    pub fn analyze_all_repos(&self) -> AnalysisResult {
        let repositories = self.discover_repositories();

        let mut all_commits = Vec::new();
        for repo_path in &repositories {
            match self.collect_commits(repo_path) {
                Ok(commits) => {
                    tracing::info!(
                        "{}: {} commits in range",
                        repo_path.display(),
                        commits.len()
                    );
                    all_commits.extend(commits);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", repo_path.display(), e);
                }
            }
        }

        let daily_notes = generate_daily_notes(&all_commits);

        AnalysisResult {
            metadata: AnalysisMetadata {
                start_date: self.options.start_date.to_string(),
                end_date: self.options.end_date.to_string(),
                repos_dir: self.options.repos_dir.to_string_lossy().to_string(),
                repository_count: repositories.len(),
                total_commits: all_commits.len(),
            },
            daily_notes,
            commits: all_commits,
        }
    }
}

/// `*` in a pattern is a wildcard; the rest must match literally and the
/// whole name must be covered. Without `*`, the name must match exactly.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern.contains('*') {
        let anchored = format!(
            "^{}$",
            pattern
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*")
        );
        Regex::new(&anchored)
            .map(|re| re.is_match(name))
            .unwrap_or(false)
    } else {
        pattern == name
    }
}

fn is_significant(message: &str) -> bool {
    let lower = message.to_lowercase();
    SIGNIFICANT_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// One-line summary of a day's commits. Commits without a recognized
/// prefix only contribute to the plain count.
fn synthesize_note(day_commits: &[Commit]) -> String {
    if day_commits.is_empty() {
        // Days are only created from commits, but keep the guard.
        return "No activity".to_string();
    }

    let significant: Vec<&Commit> = day_commits
        .iter()
        .filter(|c| is_significant(&c.message))
        .collect();

    if significant.is_empty() {
        let n = day_commits.len();
        return format!("{} commit{}", n, if n > 1 { "s" } else { "" });
    }

    // Tally by type in first-seen order.
    let mut by_type: Vec<(String, usize)> = Vec::new();
    for commit in significant {
        let kind = commit
            .message
            .split_once(':')
            .map(|(t, _)| t.to_lowercase())
            .unwrap_or_else(|| "other".to_string());

        match by_type.iter_mut().find(|(t, _)| *t == kind) {
            Some((_, count)) => *count += 1,
            None => by_type.push((kind, 1)),
        }
    }

    by_type
        .iter()
        .map(|(kind, count)| format!("{kind}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Partition commits by calendar day and synthesize one note per day,
/// sorted ascending by date.
pub fn generate_daily_notes(commits: &[Commit]) -> Vec<DailyNote> {
    let mut daily: BTreeMap<String, Vec<Commit>> = BTreeMap::new();
    for commit in commits {
        daily
            .entry(commit.date.format("%Y-%m-%d").to_string())
            .or_default()
            .push(commit.clone());
    }

    daily
        .into_iter()
        .map(|(date, mut day_commits)| {
            day_commits.sort_by_key(|c| c.date);
            let note = synthesize_note(&day_commits);

            DailyNote {
                date,
                note,
                commit_count: day_commits.len(),
                first_commit: day_commits[0].date,
                last_commit: day_commits[day_commits.len() - 1].date,
            }
        })
        .collect()
}

/// Persist the analysis artifact as pretty-printed JSON.
pub fn save_analysis(result: &AnalysisResult, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write analysis to {}", path.display()))?;
    tracing::info!("Analysis saved to {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use git2::{Signature, Time};
    use tempfile::TempDir;

    fn ts(date: &str, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        let day: NaiveDate = date.parse().unwrap();
        day.and_hms_opt(h, m, s).unwrap().and_utc()
    }

    fn commit(date: DateTime<Utc>, message: &str) -> Commit {
        Commit {
            hash: "0000000".to_string(),
            date,
            message: message.to_string(),
            author: "Dev".to_string(),
            repository: "repo".to_string(),
        }
    }

    #[test]
    fn test_note_groups_types_in_first_seen_order() {
        let day = vec![
            commit(ts("2025-10-01", 9, 0, 0), "feat: a"),
            commit(ts("2025-10-01", 10, 0, 0), "random note"),
            commit(ts("2025-10-01", 11, 0, 0), "fix: b"),
            commit(ts("2025-10-01", 12, 0, 0), "feat: c"),
        ];
        assert_eq!(synthesize_note(&day), "feat: 2, fix: 1");
    }

    #[test]
    fn test_note_counts_when_nothing_significant() {
        let day = vec![
            commit(ts("2025-10-01", 9, 0, 0), "update readme"),
            commit(ts("2025-10-01", 10, 0, 0), "tweak css"),
        ];
        assert_eq!(synthesize_note(&day), "2 commits");

        let single = vec![commit(ts("2025-10-01", 9, 0, 0), "update readme")];
        assert_eq!(synthesize_note(&single), "1 commit");
    }

    #[test]
    fn test_note_for_empty_day() {
        assert_eq!(synthesize_note(&[]), "No activity");
    }

    #[test]
    fn test_prefix_match_is_not_tokenized() {
        // "feature" starts with "feat", so it is significant.
        assert!(is_significant("feature: improve layout"));
        assert!(is_significant("Fix crash on startup"));
        assert!(is_significant("Merge branch 'main'"));
        assert!(!is_significant("update readme"));
        // "chore" requires the colon.
        assert!(!is_significant("chore without colon"));
        assert!(is_significant("chore: bump deps"));
    }

    #[test]
    fn test_significant_commit_without_colon_is_typed_other() {
        let day = vec![commit(ts("2025-10-01", 9, 0, 0), "feat add widget")];
        assert_eq!(synthesize_note(&day), "other: 1");
    }

    #[test]
    fn test_daily_notes_sorted_and_counted() {
        // Input deliberately out of order across days.
        let commits = vec![
            commit(ts("2025-10-03", 15, 0, 0), "fix: late"),
            commit(ts("2025-10-01", 18, 0, 0), "docs: evening"),
            commit(ts("2025-10-01", 9, 0, 0), "feat: morning"),
            commit(ts("2025-10-02", 12, 0, 0), "plain work"),
        ];

        let notes = generate_daily_notes(&commits);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].date, "2025-10-01");
        assert_eq!(notes[1].date, "2025-10-02");
        assert_eq!(notes[2].date, "2025-10-03");

        assert_eq!(notes[0].commit_count, 2);
        assert_eq!(notes[0].note, "docs: 1, feat: 1");
        assert_eq!(notes[0].first_commit, ts("2025-10-01", 9, 0, 0));
        assert_eq!(notes[0].last_commit, ts("2025-10-01", 18, 0, 0));

        assert_eq!(notes[1].note, "1 commit");
    }

    #[test]
    fn test_daily_notes_empty_input() {
        assert!(generate_daily_notes(&[]).is_empty());
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("proj-*", "proj-api"));
        assert!(pattern_matches("proj-*", "proj-web"));
        assert!(!pattern_matches("proj-*", "otherproj-api"));
        assert!(pattern_matches("exact-name", "exact-name"));
        assert!(!pattern_matches("exact-name", "exact-name-2"));
        assert!(pattern_matches("*", "anything"));
        // Literal pieces are escaped, not treated as regex syntax.
        assert!(!pattern_matches("a.b-*", "axb-test"));
        assert!(pattern_matches("a.b-*", "a.b-test"));
    }

    fn add_commit(repo: &Repository, message: &str, when: DateTime<Utc>) {
        let sig =
            Signature::new("Test", "test@example.com", &Time::new(when.timestamp(), 0)).unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents = repo
            .head()
            .ok()
            .map(|h| h.peel_to_commit().unwrap())
            .into_iter()
            .collect::<Vec<_>>();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap();
    }

    fn options(root: &Path, start: &str, end: &str, patterns: &[&str]) -> AnalyzerOptions {
        AnalyzerOptions {
            start_date: start.parse().unwrap(),
            end_date: end.parse().unwrap(),
            repos_dir: root.to_path_buf(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_discovery_requires_marker_and_pattern() {
        let root = TempDir::new().unwrap();
        Repository::init(root.path().join("proj-api")).unwrap();
        Repository::init(root.path().join("proj-web")).unwrap();
        Repository::init(root.path().join("scratch")).unwrap();
        // Matches the pattern but is not a repository.
        std::fs::create_dir(root.path().join("proj-notes")).unwrap();

        let analyzer = GitAnalyzer::new(options(root.path(), "2025-10-01", "2025-10-09", &["proj-*"]));
        let mut found: Vec<String> = analyzer
            .discover_repositories()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        found.sort();

        assert_eq!(found, vec!["proj-api", "proj-web"]);
    }

    #[test]
    fn test_discovery_missing_root_is_empty() {
        let analyzer = GitAnalyzer::new(options(
            Path::new("/nonexistent/repos"),
            "2025-10-01",
            "2025-10-09",
            &["*"],
        ));
        assert!(analyzer.discover_repositories().is_empty());
    }

    #[test]
    fn test_collect_commits_respects_window() {
        let root = TempDir::new().unwrap();
        let repo_path = root.path().join("proj-api");
        let repo = Repository::init(&repo_path).unwrap();

        add_commit(&repo, "chore: before window", ts("2025-09-29", 12, 0, 0));
        add_commit(&repo, "feat: in window", ts("2025-10-01", 9, 0, 0));
        add_commit(&repo, "fix: last second", ts("2025-10-09", 23, 59, 59));
        add_commit(&repo, "docs: after window", ts("2025-10-10", 8, 0, 0));

        let analyzer = GitAnalyzer::new(options(root.path(), "2025-10-01", "2025-10-09", &["*"]));
        let commits = analyzer.collect_commits(&repo_path).unwrap();

        let messages: Vec<&str> = commits.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["fix: last second", "feat: in window"]);
        assert!(commits.iter().all(|c| c.repository == "proj-api"));
    }

    #[test]
    fn test_collect_commits_survives_clock_skew() {
        let root = TempDir::new().unwrap();
        let repo_path = root.path().join("proj-api");
        let repo = Repository::init(&repo_path).unwrap();

        // The middle commit was made on a machine with a wrong clock: it
        // is newer in history but stamped older than the window start.
        add_commit(&repo, "feat: in window", ts("2025-10-05", 9, 0, 0));
        add_commit(&repo, "chore: wrong clock", ts("2025-09-20", 9, 0, 0));
        add_commit(&repo, "fix: also in window", ts("2025-10-06", 9, 0, 0));

        let analyzer = GitAnalyzer::new(options(root.path(), "2025-10-01", "2025-10-09", &["*"]));
        let commits = analyzer.collect_commits(&repo_path).unwrap();

        let messages: Vec<&str> = commits.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["fix: also in window", "feat: in window"]);
    }

    #[test]
    fn test_analyze_isolates_broken_repositories() {
        let root = TempDir::new().unwrap();
        let good = root.path().join("proj-api");
        let repo = Repository::init(&good).unwrap();
        add_commit(&repo, "feat: works", ts("2025-10-02", 10, 0, 0));

        // Looks like a repository to discovery, but cannot be opened.
        std::fs::create_dir_all(root.path().join("proj-broken/.git")).unwrap();

        let analyzer = GitAnalyzer::new(options(root.path(), "2025-10-01", "2025-10-09", &["proj-*"]));
        let result = analyzer.analyze_all_repos();

        assert_eq!(result.metadata.repository_count, 2);
        assert_eq!(result.metadata.total_commits, 1);
        assert_eq!(result.daily_notes.len(), 1);
        assert_eq!(result.daily_notes[0].note, "feat: 1");
    }

    #[test]
    fn test_analysis_round_trips_through_save() {
        let root = TempDir::new().unwrap();
        let repo_path = root.path().join("proj-api");
        let repo = Repository::init(&repo_path).unwrap();
        add_commit(&repo, "feat: a", ts("2025-10-02", 10, 0, 0));
        add_commit(&repo, "fix: b", ts("2025-10-02", 14, 0, 0));

        let analyzer = GitAnalyzer::new(options(root.path(), "2025-10-01", "2025-10-09", &["*"]));
        let result = analyzer.analyze_all_repos();

        let out = root.path().join("analysis.json");
        save_analysis(&result, &out).unwrap();

        let raw = std::fs::read_to_string(&out).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.metadata.total_commits, 2);
        assert_eq!(parsed.daily_notes[0].note, "feat: 1, fix: 1");
        assert_eq!(parsed.commits.len(), 2);
    }
}
