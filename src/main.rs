/*!
 * Satchel CLI - Command Line Interface
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures::TryStreamExt;
use satchel::{
    backend::StorageConfig,
    config::SatchelConfig,
    error::{FileServiceError, EXIT_FATAL, EXIT_SUCCESS},
    logging, DatasetVersion, FileService, FileType, LogLevel, ManifestKind,
};
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Parser)]
#[command(name = "satchel")]
#[command(version, about = "Versioned dataset file storage with BagIt checksum manifests", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Storage root directory (overrides the configured root)
    #[arg(long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Dataset version namespace
#[derive(Args)]
struct VersionArgs {
    /// Dataset identifier
    dataset: String,

    /// Version number
    version: String,
}

impl VersionArgs {
    fn dataset_version(&self) -> DatasetVersion {
        DatasetVersion::new(&self.dataset, &self.version)
    }
}

/// A file within a dataset version
#[derive(Args)]
struct FileArgs {
    #[command(flatten)]
    version: VersionArgs,

    /// File type (decides the data/ or documentation/ directory)
    #[arg(value_enum)]
    file_type: FileType,

    /// Path relative to the file type directory
    path: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and record its checksum
    Store {
        #[command(flatten)]
        file: FileArgs,

        /// Read content from this file instead of stdin
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Content type (guessed from the path when omitted)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Write a stored file to stdout or a file
    Get {
        #[command(flatten)]
        file: FileArgs,

        /// Write content to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Delete a file and its checksum
    Delete {
        #[command(flatten)]
        file: FileArgs,
    },

    /// List the files of a dataset version
    List {
        #[command(flatten)]
        version: VersionArgs,

        /// Print one RO-Crate JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Export files as a zip archive
    Zip {
        #[command(flatten)]
        version: VersionArgs,

        /// Paths relative to the version root (e.g. data/a.txt)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Archive file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Print a checksum manifest
    Manifest {
        #[command(flatten)]
        version: VersionArgs,

        /// Print the tag manifest instead of the payload manifest
        #[arg(long)]
        tag: bool,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<FileServiceError>()
                .map_or(EXIT_FATAL, FileServiceError::exit_code)
        }
    };
    std::process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => SatchelConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => SatchelConfig {
            storage: StorageConfig::from_env()?,
            ..Default::default()
        },
    };

    if let Some(root) = cli.root {
        config.storage.root = Some(root);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.verbose |= cli.verbose;

    logging::init_logging(&config.logging)?;

    let backend = config.storage.build()?;
    let service = FileService::new(backend, config.service_config());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(execute(&service, cli.command))
}

async fn execute(service: &FileService, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Store {
            file,
            input,
            content_type,
        } => {
            let version = file.version.dataset_version();
            let content_type = content_type.or_else(|| {
                mime_guess::from_path(&file.path)
                    .first_raw()
                    .map(str::to_string)
            });

            let stored = match input {
                Some(path) => {
                    let handle = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    let length = handle.metadata().await?.len();
                    service
                        .store_file(
                            &version,
                            file.file_type,
                            &file.path,
                            handle,
                            Some(length),
                            content_type,
                        )
                        .await?
                }
                None => {
                    service
                        .store_file(
                            &version,
                            file.file_type,
                            &file.path,
                            tokio::io::stdin(),
                            None,
                            content_type,
                        )
                        .await?
                }
            };

            println!(
                "{}  {} bytes  {}",
                stored.path,
                stored.content_size,
                stored.sha256.as_deref().unwrap_or("-")
            );
        }

        Commands::Get { file, output } => {
            let version = file.version.dataset_version();
            let data = service
                .get_file_data(&version, file.file_type, &file.path, false)
                .await?;

            match output {
                Some(path) => {
                    let mut handle = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    copy_stream(data.stream, &mut handle).await?;
                }
                None => copy_stream(data.stream, &mut tokio::io::stdout()).await?,
            }
        }

        Commands::Delete { file } => {
            let version = file.version.dataset_version();
            service
                .delete_file(&version, file.file_type, &file.path)
                .await?;
        }

        Commands::List { version, json } => {
            let version = version.dataset_version();
            let mut files = service.list_files(&version).await?;

            while let Some(file) = files.try_next().await? {
                if json {
                    println!("{}", file.to_ro_crate_json());
                } else {
                    println!(
                        "{:<64}  {:>12}  {}",
                        file.sha256.as_deref().unwrap_or("-"),
                        file.content_size,
                        file.path
                    );
                }
            }
        }

        Commands::Zip {
            version,
            paths,
            output,
        } => {
            let version = version.dataset_version();
            let handle = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("Failed to create {}", output.display()))?;

            let summary = service
                .write_file_data_as_zip(&version, &paths, handle)
                .await?;

            eprintln!(
                "Wrote {} entries ({} bytes), skipped {} missing",
                summary.entries_written, summary.bytes_written, summary.entries_skipped
            );
        }

        Commands::Manifest { version, tag } => {
            let version = version.dataset_version();
            let kind = if tag {
                ManifestKind::Tag
            } else {
                ManifestKind::Payload
            };

            let manifest = service.manifest(&version, kind).await?;
            if !manifest.is_empty() {
                println!("{}", manifest.to_manifest_string());
            }
        }
    }

    Ok(())
}

/// Copy an object stream into a writer chunk by chunk
async fn copy_stream<W>(mut stream: satchel::backend::ReadStream, writer: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = stream.try_next().await? {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}
