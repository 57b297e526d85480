use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use scmbridge_ingest::RawParams;
use scmbridge_store::SqliteStore;
use scmbridge_types::{IssueDetails, RepoPolicy};

#[derive(Parser)]
#[command(name = "scmbridge", about = "Bridge SCM commit hooks into an issue tracker's commit store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Init {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Register a repository and its branch allow patterns.
    AddRepo {
        scm_name: String,
        /// Glob pattern for an allowed branch; repeatable. No patterns
        /// means every branch is allowed.
        #[arg(long = "branch")]
        branches: Vec<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Seed a tracker issue used for status-line emission.
    AddIssue {
        issue_id: i64,
        summary: String,
        #[arg(long, default_value = "open")]
        status: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Ingest one hook ping given as a urlencoded parameter string.
    Ingest {
        params: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    Show {
        scm_name: String,
        changeset: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    Status {
        #[arg(long)]
        db: Option<PathBuf>,
    },
    Serve {
        #[arg(long, default_value = "127.0.0.1:8471")]
        addr: String,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn resolve_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(v) = std::env::var("SCMBRIDGE_DB") {
        return PathBuf::from(v);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".scmbridge").join("db.sqlite3")
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore> {
    let db_path = resolve_db_path(db);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))
}

/// Unix seconds to a UTC `YYYY-MM-DD HH:MM:SS` string. Civil-from-days
/// Gregorian arithmetic; the status table is the only date consumer, so
/// no calendar crate is pulled in.
fn format_timestamp(ts: i64) -> String {
    if ts <= 0 {
        return "never".to_string();
    }
    let secs = ts as u64;
    let days_since_epoch = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    // Shift the epoch to 0000-03-01 so leap days land at year end.
    let z = days_since_epoch as i64 + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        y, m, d, hours, minutes, seconds
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db } => {
            let db_path = resolve_db_path(db.clone());
            open_store(db)?;
            println!("Initialized scmbridge database at {}", db_path.display());
        }

        Commands::AddRepo { scm_name, branches, db } => {
            let store = open_store(db)?;
            store
                .upsert_repo(&RepoPolicy {
                    scm_name: scm_name.clone(),
                    allowed_branches: branches.clone(),
                })
                .with_context(|| format!("Failed to register repo '{}'", scm_name))?;
            if branches.is_empty() {
                println!("Registered repo '{}' (all branches allowed)", scm_name);
            } else {
                println!("Registered repo '{}' with branches: {}", scm_name, branches.join(", "));
            }
        }

        Commands::AddIssue { issue_id, summary, status, db } => {
            let store = open_store(db)?;
            store
                .upsert_issue(&IssueDetails {
                    issue_id,
                    summary: summary.clone(),
                    status_title: status,
                })
                .with_context(|| format!("Failed to seed issue #{}", issue_id))?;
            println!("Seeded issue #{} - {}", issue_id, summary);
        }

        Commands::Ingest { params, db } => {
            let store = open_store(db)?;
            let raw = RawParams::parse(&params);
            let outcome =
                scmbridge_ingest::ingest_params(&raw, &store, &store, &store, &store)
                    .context("Ingestion failed")?;
            // Hook scripts relay these lines back to the committer.
            for line in &outcome.status_lines {
                println!("{}", line);
            }
            eprintln!(
                "changeset {} ({}, {} files, {} new issue links)",
                outcome.changeset,
                if outcome.created { "created" } else { "existing" },
                outcome.files_added,
                outcome.issues_linked
            );
        }

        Commands::Show { scm_name, changeset, db } => {
            let store = open_store(db)?;
            match store
                .get_commit_detail(&scm_name, &changeset)
                .context("Failed to get commit")?
            {
                None => {
                    eprintln!("Commit not found");
                    std::process::exit(1);
                }
                Some(detail) => {
                    let json = serde_json::to_string_pretty(&detail)
                        .context("Failed to serialize commit to JSON")?;
                    println!("{}", json);
                }
            }
        }

        Commands::Status { db } => {
            let store = open_store(db)?;
            let stats = store.list_repo_stats().context("Failed to list repos")?;
            println!("{:<20} {:>8}  LAST COMMIT", "REPO", "COMMITS");
            for s in &stats {
                let last = s
                    .last_commit_date
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string());
                println!("{:<20} {:>8}  {}", s.scm_name, s.commit_count, last);
            }
        }

        Commands::Serve { addr, db } => {
            let store = Arc::new(open_store(db)?);
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime
                .block_on(scmbridge_server::run_server(store, &addr))
                .context("Webhook server error")?;
        }
    }

    Ok(())
}
