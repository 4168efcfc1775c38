use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod git;
mod models;
mod sheets;
mod tracker;

use auth::{ConfigError, Identity, OauthConfig};
use git::{AnalyzerOptions, GitAnalyzer};
use sheets::SheetsClient;

#[derive(Parser, Debug)]
#[command(
    name = "sheets-tracker",
    version,
    about = "Programmatic Google Sheets access and git activity tracking"
)]
struct Cli {
    /// Spreadsheet to operate on
    #[arg(long, env = "GOOGLE_SHEET_ID", value_name = "ID", global = true)]
    sheet_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Get spreadsheet information
    Info,
    /// Get data from the sheet, keyed by the header row
    Get {
        /// Cell range
        #[arg(default_value = "Sheet1!A1:Z1000")]
        range: String,
    },
    /// Get raw cell values from a range
    GetRaw {
        /// Cell range
        range: String,
    },
    /// Update a cell
    Update {
        /// Cell range (e.g. Sheet1!A1)
        range: String,
        /// Value to set
        value: String,
    },
    /// Update the notes column for a specific row
    UpdateNotes {
        /// Row number
        row: u32,
        /// Notes content
        notes: String,
    },
    /// Append a row of cells after the last row of a range
    Append {
        /// Cell range identifying the table
        range: String,
        /// Cell values, left to right
        #[arg(required = true)]
        cells: Vec<String>,
    },
    /// Create a new worksheet
    Create {
        /// Name of the new sheet
        name: String,
    },
    /// List all worksheets
    ListSheets,
    /// Create a brand new spreadsheet
    CreateSpreadsheet {
        /// Title of the new spreadsheet
        title: String,
    },
    /// Print the OAuth consent URL, or exchange an authorization code
    OauthSetup {
        /// Authorization code from the consent redirect
        #[arg(long, value_name = "CODE")]
        code: Option<String>,
    },
    /// Analyze git commits across repositories
    Analyze(AnalyzeArgs),
    /// Run the analysis and push daily notes into the spreadsheet
    Track(TrackArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Start of the date window (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    start_date: NaiveDate,

    /// End of the date window (YYYY-MM-DD), inclusive
    #[arg(long, value_name = "DATE")]
    end_date: NaiveDate,

    /// Directory scanned for repositories
    #[arg(long, env = "REPOS_DIR", value_name = "PATH")]
    repos_dir: PathBuf,

    /// Repository name pattern; repeatable, `*` is a wildcard
    #[arg(long = "pattern", value_name = "PATTERN", default_value = "*")]
    patterns: Vec<String>,

    /// Output file for the analysis artifact
    #[arg(long, value_name = "FILE", default_value = "git_analysis.json")]
    output: PathBuf,

    /// Only list discovered repositories, no analysis
    #[arg(long)]
    discover: bool,
}

#[derive(Args, Debug)]
struct TrackArgs {
    /// Start of the date window (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", required_unless_present = "update_only")]
    start_date: Option<NaiveDate>,

    /// End of the date window (YYYY-MM-DD), inclusive
    #[arg(long, value_name = "DATE", required_unless_present = "update_only")]
    end_date: Option<NaiveDate>,

    /// Directory scanned for repositories
    #[arg(
        long,
        env = "REPOS_DIR",
        value_name = "PATH",
        required_unless_present = "update_only"
    )]
    repos_dir: Option<PathBuf>,

    /// Repository name pattern; repeatable, `*` is a wildcard
    #[arg(long = "pattern", value_name = "PATTERN", default_value = "*")]
    patterns: Vec<String>,

    /// Analysis artifact to write, or to read with --update-only
    #[arg(long, value_name = "FILE", default_value = "git_analysis.json")]
    output: PathBuf,

    /// JSON file mapping dates to spreadsheet rows, e.g. {"2025-10-01": 3}
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Run the analysis but skip the spreadsheet update
    #[arg(long, conflicts_with = "update_only")]
    analyze_only: bool,

    /// Update the spreadsheet from an existing analysis file
    #[arg(long)]
    update_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Info => {
            let client = connect(cli.sheet_id).await?;
            let info = client.spreadsheet_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Get { range } => {
            let client = connect(cli.sheet_id).await?;
            let records = client.worksheet_records(&range).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::GetRaw { range } => {
            let client = connect(cli.sheet_id).await?;
            let values = client.range_values(&range).await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Command::Update { range, value } => {
            let client = connect(cli.sheet_id).await?;
            client.update_cell(&range, &value).await?;
            println!("Updated {range} to \"{value}\"");
        }
        Command::UpdateNotes { row, notes } => {
            let client = connect(cli.sheet_id).await?;
            client.update_cell(&format!("daily!C{row}"), &notes).await?;
            println!("Updated notes for row {row}");
        }
        Command::Append { range, cells } => {
            let client = connect(cli.sheet_id).await?;
            let row: Vec<Value> = cells.into_iter().map(Value::String).collect();
            client.append_rows(&range, vec![row]).await?;
            println!("Appended 1 row to {range}");
        }
        Command::Create { name } => {
            let client = connect(cli.sheet_id).await?;
            client.create_worksheet(&name).await?;
            println!("Created worksheet: {name}");
        }
        Command::ListSheets => {
            let client = connect(cli.sheet_id).await?;
            println!("Worksheets:");
            for sheet in client.list_worksheets().await? {
                println!("  - {} (ID: {})", sheet.title, sheet.sheet_id);
            }
        }
        Command::CreateSpreadsheet { title } => {
            let identity = Identity::from_env()?;
            let info = sheets::create_spreadsheet(&identity, &title).await?;
            println!("Created spreadsheet:");
            println!("  Title: {}", info.title);
            println!("  ID: {}", info.spreadsheet_id);
            println!("  URL: {}", info.url);
        }
        Command::OauthSetup { code } => run_oauth_setup(code).await?,
        Command::Analyze(args) if args.discover => {
            println!("Discovered repositories:");
            for repo in build_analyzer(&args).discover_repositories() {
                println!("  - {}", repo.display());
            }
        }
        Command::Analyze(args) => {
            run_analysis(&args)?;
        }
        Command::Track(args) => run_track(cli.sheet_id, args).await?,
    }

    Ok(())
}

async fn connect(sheet_id: Option<String>) -> Result<SheetsClient> {
    let sheet_id = sheet_id.ok_or(ConfigError::MissingSheetId)?;
    let identity = Identity::from_env()?;
    SheetsClient::connect(&identity, sheet_id).await
}

async fn run_oauth_setup(code: Option<String>) -> Result<()> {
    let config = OauthConfig::from_env()?;

    match code {
        None => {
            println!("Open this URL in your browser and authorize the application:");
            println!();
            println!("  {}", auth::consent_url(&config)?);
            println!();
            println!("Then rerun with --code <CODE> from the redirect.");
        }
        Some(code) => {
            let http = reqwest::Client::new();
            let tokens = auth::exchange_code(&http, &config, &code).await?;

            println!("Store these secrets in your environment:");
            if let Some(refresh_token) = &tokens.refresh_token {
                println!("  GOOGLE_OAUTH_REFRESH_TOKEN={refresh_token}");
            }
            println!("  GOOGLE_OAUTH_ACCESS_TOKEN={}", tokens.access_token);
            let expiry_ms =
                chrono::Utc::now().timestamp_millis() + tokens.expires_in * 1000;
            println!("  GOOGLE_OAUTH_TOKEN_EXPIRY={expiry_ms}");
        }
    }

    Ok(())
}

fn build_analyzer(args: &AnalyzeArgs) -> GitAnalyzer {
    GitAnalyzer::new(AnalyzerOptions {
        start_date: args.start_date,
        end_date: args.end_date,
        repos_dir: args.repos_dir.clone(),
        patterns: args.patterns.clone(),
    })
}

/// Run the analysis end to end and save the artifact.
fn run_analysis(args: &AnalyzeArgs) -> Result<models::AnalysisResult> {
    let result = build_analyzer(args).analyze_all_repos();
    git::save_analysis(&result, &args.output)?;

    println!();
    println!("--- Git Analysis Summary ---");
    println!(
        "Period: {} to {}",
        result.metadata.start_date, result.metadata.end_date
    );
    println!("Repositories: {}", result.metadata.repository_count);
    println!("Total commits: {}", result.metadata.total_commits);
    println!("Days with activity: {}", result.daily_notes.len());

    Ok(result)
}

async fn run_track(sheet_id: Option<String>, args: TrackArgs) -> Result<()> {
    let analysis = if args.update_only {
        tracker::load_analysis(&args.output)?
    } else {
        let window = AnalyzeArgs {
            start_date: args.start_date.context("--start-date is required")?,
            end_date: args.end_date.context("--end-date is required")?,
            repos_dir: args
                .repos_dir
                .clone()
                .context("--repos-dir (or REPOS_DIR) is required")?,
            patterns: args.patterns.clone(),
            output: args.output.clone(),
            discover: false,
        };
        run_analysis(&window)?
    };

    if args.analyze_only {
        return Ok(());
    }

    let mapping_path = args
        .mapping
        .context("--mapping is required to update the spreadsheet")?;
    let date_to_row = tracker::load_row_mapping(&mapping_path)?;

    let client = connect(sheet_id).await?;
    let summary = tracker::update_tracker(&client, &analysis, &date_to_row).await;

    println!(
        "Summary: {} updated, {} failed, {} skipped",
        summary.updated, summary.failed, summary.skipped
    );

    Ok(())
}
