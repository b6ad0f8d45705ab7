//! Command-line console
//!
//! `droplite list | upload | delete | download` on top of [`FileConsole`].

use crate::api::{FileRecord, FileStatus, ListQuery};
use crate::config::{ClientConfig, CredentialConfig};
use crate::console::{FileConsole, FileRow};
use crate::deletion::{Confirm, DeleteOutcome};
use crate::download::DownloadProgress;
use crate::error::{ClientError, ClientResult};
use crate::logging::LogFormat;
use crate::upload::{UploadStatus, UploadTask};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::debug;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    #[default]
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// droplite - console client for the DropLite file service
#[derive(Debug, Parser)]
#[command(name = "droplite", version, about = "Console client for the DropLite file service")]
pub struct Cli {
    /// API base URL (overrides DROPLITE_API_BASE)
    #[arg(long = "api-base", global = true, value_name = "URL")]
    pub api_base: Option<String>,

    /// API key for `ApiKey` authorization (overrides DROPLITE_API_KEY)
    #[arg(long = "api-key", global = true, conflicts_with = "token")]
    pub api_key: Option<String>,

    /// Session token; switches to `Bearer` authorization
    #[arg(long = "token", global = true)]
    pub token: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long = "log-format", value_enum, default_value_t = CliLogFormat::Text, global = true)]
    pub log_format: CliLogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// List server files, newest first
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
        /// Only files with this status (repeatable)
        #[arg(long = "status")]
        statuses: Vec<String>,
    },
    /// Upload one or more files concurrently
    Upload {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Delete a file by id
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Download a stored file by id
    Download {
        id: String,
        /// Target file or directory (defaults to the current directory)
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> ClientResult<ClientConfig> {
        self.apply_overrides(ClientConfig::from_env()?)
    }

    pub fn apply_overrides(&self, mut config: ClientConfig) -> ClientResult<ClientConfig> {
        if let Some(base) = &self.api_base {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(token) = &self.token {
            config.credential = CredentialConfig::Bearer {
                token: Some(token.clone()),
            };
        } else if let Some(key) = &self.api_key {
            config.credential = CredentialConfig::ApiKey { key: key.clone() };
        }
        config.validate()?;
        Ok(config)
    }

    fn list_query(&self) -> ListQuery {
        match &self.command {
            Command::List {
                limit,
                offset,
                statuses,
            } => ListQuery {
                limit: *limit,
                offset: *offset,
                statuses: statuses.iter().map(|s| FileStatus::from(s.as_str())).collect(),
            },
            _ => ListQuery::default(),
        }
    }
}

/// Asks on stdin; anything but `y`/`yes` declines.
struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm_delete(&self, file: &FileRecord) -> bool {
        eprint!("Delete {} ({})? [y/N] ", file.original_name, file.id);
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

pub async fn run(cli: Cli) -> ClientResult<ExitCode> {
    let config = cli.config()?;
    debug!("cli: api_base={}", config.api_base);
    let console = FileConsole::from_config(&config, cli.list_query())?;

    match cli.command {
        Command::List { .. } => {
            console.refresh().await?;
            print_rows(&console.rows());
            Ok(ExitCode::SUCCESS)
        }
        Command::Upload { paths } => upload(&console, &paths).await,
        Command::Delete { id, yes } => {
            let file = lookup(&console, &id).await?;
            let outcome = if yes {
                console.deletions().delete(&file, &|_: &FileRecord| true).await?
            } else {
                console.deletions().delete(&file, &PromptConfirm).await?
            };
            match outcome {
                DeleteOutcome::Deleted => println!("deleted {}", id),
                DeleteOutcome::Declined => println!("kept {}", id),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Download { id, output } => {
            let file = lookup(&console, &id).await?;
            let destination = output.unwrap_or_else(|| PathBuf::from("."));
            let report = console
                .downloads()
                .download(
                    &file,
                    &destination,
                    Some(Box::new(|p: &DownloadProgress| {
                        eprintln!("{} {:>3}% {} bytes", p.file_id, p.percent, p.downloaded_bytes)
                    })),
                )
                .await?;
            println!(
                "saved {} ({} bytes) to {}",
                report.file_id,
                report.bytes_written,
                report.destination.display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn lookup(console: &FileConsole, id: &str) -> ClientResult<FileRecord> {
    console.refresh().await?;
    console
        .find(id)
        .ok_or_else(|| ClientError::Precondition(format!("no file with id {}", id)))
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn upload(console: &FileConsole, paths: &[PathBuf]) -> ClientResult<ExitCode> {
    let registry = console.uploads().registry().clone();
    let mut updates = registry.subscribe();
    let printer = AbortOnDrop(tokio::spawn(async move {
        let mut printed: HashMap<String, (UploadStatus, u8)> = HashMap::new();
        while updates.changed().await.is_ok() {
            let tasks = updates.borrow_and_update().clone();
            for task in tasks.iter() {
                let state = (task.status, task.progress);
                if printed.get(&task.id) != Some(&state) {
                    eprintln!("{} {} {:>3}% {}", task.id, task.filename, task.progress, task.status);
                    printed.insert(task.id.clone(), state);
                }
            }
        }
    }));

    let mut failed = 0;
    let mut handles = Vec::new();
    for (path, submitted) in paths.iter().zip(console.uploads().submit_paths(paths).await?) {
        match submitted {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                eprintln!("{}: {}", path.display(), e.user_message());
                failed += 1;
            }
        }
    }

    let mut finished: Vec<UploadTask> = Vec::new();
    for handle in handles {
        let task_id = handle.task_id().to_string();
        handle.finished().await;
        if let Some(task) = registry.get(&task_id) {
            finished.push(task);
        }
    }
    drop(printer);

    for task in &finished {
        match &task.status {
            UploadStatus::Success => println!("{} {} uploaded", task.id, task.filename),
            _ => {
                failed += 1;
                println!(
                    "{} {} failed at {}%: {}",
                    task.id,
                    task.filename,
                    task.progress,
                    task.error.as_deref().unwrap_or("upload failed")
                );
            }
        }
    }

    print_rows(&console.rows());
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_rows(rows: &[FileRow]) {
    if rows.is_empty() {
        println!("no files");
        return;
    }
    println!(
        "{:<36}  {:<32}  {:>10}  {:<8}  {:<19}",
        "ID", "NAME", "SIZE", "STATUS", "CREATED"
    );
    for row in rows {
        println!(
            "{:<36}  {:<32}  {:>10}  {:<8}  {:<19}{}",
            row.id,
            row.name,
            row.size,
            row.status,
            row.created_at,
            if row.controls.deleting { "  (deleting)" } else { "" }
        );
    }
}
