//! vdrive CLI - path-addressed cloud drive access.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::glob;
use tracing_subscriber::EnvFilter;

use vdrive::{Drive, DriveConfig, EntityRecord, ListFilter, Principal, Role, Target};

/// Work with a cloud drive by path instead of by id.
#[derive(Parser)]
#[command(name = "vdrive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Container that anchors virtual paths (defaults to the drive root).
    #[arg(long, env = "GDRIVE_ROOT_ID")]
    root: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    All,
    Files,
    Folders,
}

impl From<Kind> for ListFilter {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::All => ListFilter::All,
            Kind::Files => ListFilter::FilesOnly,
            Kind::Folders => ListFilter::ContainersOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List a folder.
    List {
        /// Folder path, URL or ID (root when omitted).
        folder: Option<String>,

        #[arg(long, short = 'n')]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value = "all")]
        kind: Kind,
    },

    /// Find entities whose name contains a fragment.
    Search {
        fragment: String,

        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Upload local files.
    Upload {
        /// File patterns to upload (supports glob patterns like *.tar, file_{1,2,3}.txt).
        #[arg(required = true)]
        patterns: Vec<String>,

        /// Destination folder path; missing folders are created.
        #[arg(long, short = 't', default_value = "")]
        to: String,
    },

    /// Download a file to the local filesystem.
    Download {
        /// File name, path, URL or ID.
        file: String,

        /// Local destination path (file or directory).
        #[arg(long, short = 't', default_value = ".")]
        to: PathBuf,
    },

    /// Delete entities by name, path, URL or ID.
    Delete {
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Create a folder.
    Mkdir { path: String },

    /// Copy a file.
    Copy {
        source: String,
        name: String,

        /// Destination folder ID (next to the source when omitted).
        #[arg(long)]
        parent: Option<String>,
    },

    /// Move an entity into another folder.
    Move {
        target: String,

        /// Destination folder path, URL or ID.
        folder: String,
    },

    /// Rename an entity.
    Rename { target: String, name: String },

    /// Grant access to an entity.
    Share {
        target: String,

        /// E-mail address, or `anyone`.
        #[arg(long)]
        with: String,

        #[arg(long, default_value = "reader")]
        role: String,
    },

    /// Copy every file of a folder to a local directory.
    Backup {
        /// Folder path, URL or ID (root when omitted).
        folder: Option<String>,

        #[arg(long, short = 't', default_value = "backup")]
        to: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = DriveConfig::from_env().context("Failed to read drive configuration")?;
    if let Some(root) = cli.root {
        config.root_id = root;
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }
    let drive = Drive::from_config(&config).context("Failed to set up drive client")?;

    match cli.command {
        Commands::List { folder, limit, kind } => {
            let parent = folder.as_deref().map(Target::parse);
            let records = drive
                .list(parent, limit, kind.into())
                .await
                .context("Failed to list folder")?;
            print_records(&records, cli.json)?;
        }

        Commands::Search { fragment, limit } => {
            let records = drive
                .search(&fragment, limit)
                .await
                .with_context(|| format!("Failed to search for {:?}", fragment))?;
            print_records(&records, cli.json)?;
        }

        Commands::Upload { patterns, to } => {
            let files = expand_patterns(&patterns)?;
            if files.is_empty() {
                anyhow::bail!("No files to upload");
            }

            let mut items = Vec::with_capacity(files.len());
            for path in &files {
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                let content = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {:?}", path))?;
                let remote_path = if to.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", to.trim_end_matches('/'), name)
                };
                items.push((remote_path, content));
            }

            println!("Uploading {} file(s)...", items.len());
            let results = drive.batch_upload(items).await;
            report_batch(&results, cli.json)?;
        }

        Commands::Download { file, to } => {
            if to.to_string_lossy().ends_with('/') {
                std::fs::create_dir_all(&to)
                    .with_context(|| format!("Failed to create directory: {:?}", to))?;
            } else if let Some(parent) = to.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create directory: {:?}", parent))?;
                }
            }

            match drive
                .download_to_file(Target::parse(&file), &to)
                .await
                .with_context(|| format!("Failed to download {}", file))?
            {
                Some(path) => println!("Saved to: {:?}", path),
                None => anyhow::bail!("Not found: {}", file),
            }
        }

        Commands::Delete { targets } => {
            if let [single] = targets.as_slice() {
                let deleted = drive.delete(Target::parse(single)).await?;
                println!("{}", if deleted { "Deleted." } else { "Nothing to delete." });
            } else {
                let results = drive.batch_delete(targets).await;
                report_batch(&results, cli.json)?;
            }
        }

        Commands::Mkdir { path } => {
            let id = drive.make_dir(&path, None).await?;
            println!("{}", id);
        }

        Commands::Copy {
            source,
            name,
            parent,
        } => {
            let id = drive
                .copy(Target::parse(&source), &name, parent.as_deref())
                .await?;
            println!("{}", id);
        }

        Commands::Move { target, folder } => {
            let destination = drive
                .stat(Target::parse(&folder))
                .await?
                .with_context(|| format!("Destination folder not found: {}", folder))?;
            drive.move_to(Target::parse(&target), &destination.id).await?;
            println!("Moved.");
        }

        Commands::Rename { target, name } => {
            drive.rename(Target::parse(&target), &name).await?;
            println!("Renamed.");
        }

        Commands::Share { target, with, role } => {
            let role: Role = role.parse()?;
            let target = Target::parse(&target);
            let principal = Principal::parse(&with);
            if principal == Principal::Anyone && role == Role::Reader {
                match drive.public_link(target).await? {
                    Some(link) => println!("{}", link),
                    None => println!("Shared."),
                }
            } else {
                drive.share(target, principal, role).await?;
                println!("Shared.");
            }
        }

        Commands::Backup { folder, to } => {
            let results = drive
                .backup(folder.as_deref().map(Target::parse), &to)
                .await
                .context("Backup failed")?;
            report_batch(&results, cli.json)?;
        }
    }

    Ok(())
}

fn print_records(records: &[EntityRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
    } else if records.is_empty() {
        println!("No files found.");
    } else {
        println!("{:<44} {:>10} {:<30} {}", "ID", "SIZE", "TYPE", "NAME");
        println!("{}", "-".repeat(100));
        for record in records {
            println!("{}", record);
        }
    }
    Ok(())
}

fn report_batch(results: &[vdrive::BatchItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for item in results {
        match (&item.id, &item.error) {
            (Some(id), _) if item.success => println!("{}: OK ({})", item.name, id),
            (_, Some(error)) => println!("{}: FAILED ({})", item.name, error),
            _ => println!("{}: FAILED", item.name),
        }
    }
    let failed = results.iter().filter(|i| !i.success).count();
    println!("Done: {} ok, {} failed.", results.len() - failed, failed);
    Ok(())
}

/// Expand glob and brace patterns into existing local files, sorted and
/// deduplicated. A pattern that matches nothing is used as a literal path.
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        for expanded in expand_braces(pattern) {
            let matches: Vec<PathBuf> = glob(&expanded)
                .with_context(|| format!("Invalid glob pattern: {}", expanded))?
                .filter_map(|r| r.ok())
                .filter(|p| p.is_file())
                .collect();

            if matches.is_empty() {
                let path = PathBuf::from(&expanded);
                if path.is_file() {
                    files.push(path);
                } else {
                    tracing::warn!(pattern = %expanded, "no files matched");
                }
            } else {
                files.extend(matches);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand brace patterns like file_{1,2,3}.txt into multiple patterns.
fn expand_braces(pattern: &str) -> Vec<String> {
    if let Some(start) = pattern.find('{') {
        if let Some(end) = pattern[start..].find('}') {
            let end = start + end;
            let prefix = &pattern[..start];
            let suffix = &pattern[end + 1..];

            return pattern[start + 1..end]
                .split(',')
                .flat_map(|alt| expand_braces(&format!("{}{}{}", prefix, alt.trim(), suffix)))
                .collect();
        }
    }

    vec![pattern.to_string()]
}
