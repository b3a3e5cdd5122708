//! CLI binary for pageput.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `UploadConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pageput::{
    snapshot, spawn_upload, Document, HttpUploadService, ProgressCallback, RetryPolicy,
    UploadConfig, UploadFailure, UploadProgressCallback, UploadService, UploadType,
    UPLOAD_XML_NAME,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Name of the document manifest inside a staging folder.
const MANIFEST_NAME: &str = "document.json";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a percent bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn begin_task(&self, description: &str, total_units: u32) {
        self.bar.set_length(u64::from(total_units));
        self.bar.set_prefix("Uploading");
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(description)));
    }

    fn update_status(&self, text: &str) {
        self.bar.set_message(text.to_string());
    }

    fn update_percent(&self, percent: u32) {
        // Declared page numbers may push past 100; the bar caps itself.
        self.bar.set_position(u64::from(percent));
    }

    fn on_page_uploaded(&self, page_nr: u32, total_pages: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}",
            green("✓"),
            page_nr,
            total_pages
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Upload a staged document into collection 42
  pageput --server https://ingest.example.org/api upload --collection 42 ./staging/letters

  # Same, with checksums and the JSON structure encoding
  pageput upload --collection 42 --checksums --type json ./staging/letters

  # Query the server for an upload's state
  pageput status 1234

  # Show the recovery snapshot left behind by a failed or cancelled upload
  pageput inspect ./staging/letters

STAGING FOLDER:
  A staging folder holds the page images, optional transcripts, and a
  document.json manifest. Relative paths in the manifest are resolved
  against the folder.

ENVIRONMENT VARIABLES:
  PAGEPUT_SERVER_URL    Base URL of the ingestion service
  PAGEPUT_TOKEN         Bearer token sent with every request
  PAGEPUT_COLLECTION    Default target collection id
  PAGEPUT_TYPE          Structure encoding: mets, json
  RUST_LOG              Overrides the log filter
"#;

/// Upload staged multi-page documents to an ingestion service.
#[derive(Parser, Debug)]
#[command(
    name = "pageput",
    version,
    about = "Upload staged multi-page documents to an ingestion service, page by page",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Base URL of the ingestion service.
    #[arg(long, global = true, env = "PAGEPUT_SERVER_URL")]
    server: Option<String>,

    /// Bearer token for the ingestion service.
    #[arg(long, global = true, env = "PAGEPUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// HTTP request timeout in seconds.
    #[arg(long, global = true, env = "PAGEPUT_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEPUT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGEPUT_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload the document staged in DIR.
    Upload {
        /// Staging folder containing document.json.
        dir: PathBuf,

        /// Target collection id.
        #[arg(short, long, env = "PAGEPUT_COLLECTION")]
        collection: i64,

        /// Structure encoding sent when the session is opened.
        #[arg(long = "type", env = "PAGEPUT_TYPE", value_enum, default_value = "mets")]
        upload_type: TypeArg,

        /// Compute MD5 checksums before uploading.
        #[arg(long, env = "PAGEPUT_CHECKSUMS")]
        checksums: bool,

        /// Retries per page after the first attempt.
        #[arg(long, env = "PAGEPUT_MAX_RETRIES", default_value_t = 3)]
        max_retries: u32,

        /// HTTP download timeout in seconds, for remote page resources.
        #[arg(long, env = "PAGEPUT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,

        /// Disable progress bar.
        #[arg(long, env = "PAGEPUT_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print the server's view of an upload.
    Status {
        upload_id: i64,
    },

    /// Print the recovery snapshot stored in DIR.
    Inspect {
        dir: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum TypeArg {
    Mets,
    Json,
}

impl From<TypeArg> for UploadType {
    fn from(v: TypeArg) -> Self {
        match v {
            TypeArg::Mets => UploadType::Mets,
            TypeArg::Json => UploadType::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar covers INFO-level feedback during uploads.
    let show_progress = !cli.quiet
        && matches!(cli.command, Command::Upload { no_progress: false, .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Upload {
            dir,
            collection,
            upload_type,
            checksums,
            max_retries,
            download_timeout,
            ..
        } => {
            let service = build_service(&cli)?;
            let document = load_document(dir).await?;

            let progress = show_progress.then(CliProgressCallback::new);
            let mut builder = UploadConfig::builder()
                .service(service)
                .collection_id(*collection)
                .upload_type(upload_type.clone().into())
                .compute_checksums(*checksums)
                .retry(RetryPolicy::immediate(*max_retries))
                .download_timeout_secs(*download_timeout);
            if let Some(ref cb) = progress {
                builder = builder.progress_callback(cb.clone() as ProgressCallback);
            }
            let config = builder.build().context("Invalid configuration")?;

            let handle = spawn_upload(document, config);

            // Ctrl-C stops the run at the next page boundary.
            let token = handle.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel();
                }
            });

            let result = handle.join().await;
            if let Some(ref cb) = progress {
                cb.finish();
            }

            match result {
                Ok(session) => {
                    if !cli.quiet {
                        eprintln!(
                            "{} upload {}  {} pages  job {}",
                            green("✔"),
                            bold(&session.upload_id.to_string()),
                            session.pages_uploaded(),
                            session.job_id.as_deref().unwrap_or("-"),
                        );
                    }
                    print_json(&session)?;
                }
                Err(failure) if failure.is_cancelled() => {
                    if !cli.quiet {
                        eprintln!("{} {}", cyan("⚠"), cancel_notice(&failure, dir));
                    }
                }
                Err(failure) => {
                    eprintln!("{} {}", red("✘"), failure);
                    return Err(failure).context("Upload failed");
                }
            }
        }

        Command::Status { upload_id } => {
            let service = build_service(&cli)?;
            let session = service
                .get_upload_status(*upload_id)
                .await
                .with_context(|| format!("Failed to query upload {upload_id}"))?;
            print_json(&session)?;
        }

        Command::Inspect { dir } => {
            let session = snapshot::read_snapshot(dir)
                .await
                .with_context(|| format!("No readable snapshot in {}", dir.display()))?;
            println!("Upload ID:    {}", session.upload_id);
            if let Some(c) = session.col_id {
                println!("Collection:   {}", c);
            }
            if let Some(ref j) = session.job_id {
                println!("Job ID:       {}", j);
            }
            println!("Complete:     {}", session.upload_complete);
            println!(
                "Pages:        {}/{} uploaded",
                session.pages_uploaded(),
                session.pages().len()
            );
            for page in session.pages() {
                println!(
                    "  {} {:>4}  {}",
                    if page.page_uploaded { green("✓") } else { dim("·") },
                    page.page_nr,
                    page.file_name
                );
            }
        }
    }

    Ok(())
}

/// User-facing line for a cancelled upload. Names the snapshot only when
/// one was written, i.e. when the session had been opened.
fn cancel_notice(failure: &UploadFailure, dir: &Path) -> String {
    match failure.last_session {
        Some(_) => format!(
            "upload canceled; state saved in {}",
            dim(&dir.join(UPLOAD_XML_NAME).display().to_string())
        ),
        None => "upload canceled before it started; nothing was sent".to_string(),
    }
}

/// Map global CLI args to an HTTP upload service.
fn build_service(cli: &Cli) -> Result<Arc<dyn UploadService>> {
    let server = cli
        .server
        .as_deref()
        .context("No server URL given (use --server or PAGEPUT_SERVER_URL)")?;
    let mut service =
        HttpUploadService::new(server, cli.api_timeout).context("Failed to create HTTP client")?;
    if let Some(ref token) = cli.token {
        service = service.with_bearer_token(token);
    }
    Ok(Arc::new(service))
}

/// Read `<dir>/document.json` and anchor it to `dir`.
async fn load_document(dir: &Path) -> Result<Document> {
    let path = dir.join(MANIFEST_NAME);
    let json = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut document: Document = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    document.local_folder = dir.to_path_buf();
    document.resolve_relative_paths();
    Ok(document)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    );
    Ok(())
}
