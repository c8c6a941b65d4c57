use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use autorelate_core::error::ExitCode;
use autorelate_core::{AppConfig, Document, ItemEvent, JsonLibraryStore};
use autorelate_science::{
    BatchReport, OpenAlexSource, ProgressReporter, SelectionSource, Session, normalize_doi,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "autorelate",
    about = "Link library items that cite each other, using OpenAlex",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting AUTORELATE_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Log more (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Find and link related items for the given item keys.
    Relate {
        keys: Vec<String>,
        /// Relate every item in the library.
        #[arg(long, conflicts_with = "keys")]
        all: bool,
    },

    /// Read item events as JSON lines from stdin and relate new items in
    /// debounced batches until interrupted.
    Watch,

    /// Show the DOI index of the library.
    Index,

    /// Print the normalized form of a DOI.
    Doi { raw: String },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration.
    Show,
    /// Print the config file path.
    Path,
    /// Write a default config file if none exists.
    Init,
}

// ─── Terminal surfaces ──────────────────────────────────────────────────────

struct TerminalProgress {
    quiet: bool,
}

impl ProgressReporter for TerminalProgress {
    fn headline(&self, text: &str) {
        if !self.quiet {
            eprintln!("{text}");
        }
    }

    fn line(&self, text: &str, percent: u8) {
        if !self.quiet {
            eprintln!("  [{percent:>3}%] {text}");
        }
    }

    fn notice(&self, text: &str) {
        eprintln!("{text}");
    }

    // Terminal output stays on screen.
    fn close_after(&self, _delay: Duration) {}
}

struct KeySelection(Vec<Document>);

impl SelectionSource for KeySelection {
    fn selected_documents(&self) -> Vec<Document> {
        self.0.clone()
    }
}

// ─── Main ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json_output = cli.json || std::env::var("AUTORELATE_JSON").as_deref() == Ok("1");
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Relate { keys, all } => {
            let store = Arc::new(JsonLibraryStore::open(config.library_path())?);
            let library = store.snapshot().await?;

            let documents = if all {
                library.documents
            } else {
                if keys.is_empty() {
                    eprintln!("Nothing to relate: pass item keys or --all");
                    std::process::exit(ExitCode::InvalidArgs as i32);
                }
                let mut found = Vec::with_capacity(keys.len());
                let mut unknown = Vec::new();
                for key in &keys {
                    match library.document_by_key(key) {
                        Some(doc) => found.push(doc.clone()),
                        None => unknown.push(key.as_str()),
                    }
                }
                if !unknown.is_empty() {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "error",
                            "error": "not_found",
                            "message": format!("Unknown item keys: {}", unknown.join(", ")),
                            "meta": { "duration_ms": start.elapsed().as_millis() }
                        }))?;
                    } else {
                        eprintln!("Unknown item keys: {}", unknown.join(", "));
                    }
                    std::process::exit(ExitCode::NotFound as i32);
                }
                found
            };

            let session = open_session(&config, store)?;
            let progress = TerminalProgress { quiet: json_output };
            let report = session
                .process_selected(&KeySelection(documents), &progress)
                .await;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "processed": report.processed,
                        "relations_added": report.relations_added,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            }
        }

        Commands::Watch => {
            let store = Arc::new(JsonLibraryStore::open(config.library_path())?);
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BatchReport>();
            let mut session = open_session(&config, store)?.with_reports(tx);
            session.start();

            let printer = tokio::spawn(async move {
                while let Some(report) = rx.recv().await {
                    if json_output {
                        let _ = print_json(&batch_json(&report));
                    } else {
                        println!(
                            "batch: {} queued, {} processed, {} skipped, {} failed, {} relations added",
                            report.queued,
                            report.processed,
                            report.skipped,
                            report.failed,
                            report.relations_added
                        );
                    }
                }
            });

            // Every exit from this loop must reach `session.shutdown()`.
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut input_closed = false;
            loop {
                let read = tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    read = lines.next_line() => read,
                };
                match input_step(read) {
                    InputStep::Line(line) => match serde_json::from_str::<ItemEvent>(&line) {
                        Ok(event) => {
                            if !session.notify(&event) {
                                tracing::debug!(action = ?event.action, kind = ?event.kind, "event ignored");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "unreadable event line"),
                    },
                    InputStep::Skip => {}
                    InputStep::Closed => {
                        input_closed = true;
                        break;
                    }
                    InputStep::Stop => break,
                }
            }
            if input_closed {
                tracing::info!("input closed; waiting for Ctrl-C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C; stopping");
                }
            }

            session.shutdown().await;
            drop(session);
            printer.await?;
        }

        Commands::Index => {
            let store = Arc::new(JsonLibraryStore::open(config.library_path())?);
            let session = open_session(&config, store)?;
            let index = session.index_snapshot().await?;
            let dur = start.elapsed().as_millis();

            let mut entries: Vec<_> = index.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            if json_output {
                let items: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|(doi, doc)| serde_json::json!({"doi": doi, "key": doc.key, "title": doc.title}))
                    .collect();
                let conflicts: Vec<serde_json::Value> = index
                    .conflicts()
                    .iter()
                    .map(|c| serde_json::json!({"doi": c.doi, "kept": c.kept, "replaced": c.replaced}))
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": items, "total": index.len(), "conflicts": conflicts },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if index.is_empty() {
                println!("No items with a DOI in {}", config.library_path().display());
            } else {
                for (doi, doc) in &entries {
                    println!("{key:<10}  {doi:<40}  {title}", key = doc.key, title = doc.short_title(60));
                }
                println!("\n{} items indexed", index.len());
                for conflict in index.conflicts() {
                    println!(
                        "conflict: {} claimed by items {} and {}; using {}",
                        conflict.doi, conflict.replaced, conflict.kept, conflict.kept
                    );
                }
            }
        }

        Commands::Doi { raw } => match normalize_doi(Some(&raw)) {
            Some(doi) => {
                if json_output {
                    print_json(&serde_json::json!({"status": "ok", "data": {"doi": doi, "url": doi.url()}}))?;
                } else {
                    println!("{doi}");
                }
            }
            None => {
                eprintln!("Not a DOI: {raw:?}");
                std::process::exit(ExitCode::InvalidArgs as i32);
            }
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if json_output {
                    print_json(&serde_json::json!({"status": "ok", "data": serde_json::to_value(&config)?}))?;
                } else {
                    print!("{}", toml::to_string_pretty(&config)?);
                }
            }
            ConfigAction::Path => println!("{}", AppConfig::config_path().display()),
            ConfigAction::Init => {
                let path = AppConfig::config_path();
                if path.exists() {
                    println!("Config already exists at {}", path.display());
                } else {
                    AppConfig::default().save()?;
                    println!("Wrote default config to {}", path.display());
                }
            }
        },

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            if json_output {
                print_json(&serde_json::json!({"status": "ok", "data": {"version": version}}))?;
            } else {
                println!("autorelate {version}");
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// What the watch loop does with one read from stdin.
#[derive(Debug, PartialEq, Eq)]
enum InputStep {
    Line(String),
    Skip,
    Closed,
    Stop,
}

fn input_step(read: std::io::Result<Option<String>>) -> InputStep {
    match read {
        Ok(Some(line)) if line.trim().is_empty() => InputStep::Skip,
        Ok(Some(line)) => InputStep::Line(line),
        Ok(None) => InputStep::Closed,
        // The offending bytes are consumed; the next line is readable.
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            tracing::warn!(error = %e, "skipping input line that is not UTF-8");
            InputStep::Skip
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot read input; stopping");
            InputStep::Stop
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "autorelate_core={level},autorelate_science={level},autorelate_cli={level}"
        ))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_session(config: &AppConfig, store: Arc<JsonLibraryStore>) -> Result<Session> {
    let graph = Arc::new(OpenAlexSource::new(&config.openalex)?);
    Ok(Session::new(config, store, graph))
}

fn batch_json(report: &BatchReport) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "data": {
            "queued": report.queued,
            "processed": report.processed,
            "skipped": report.skipped,
            "failed": report.failed,
            "relations_added": report.relations_added,
        }
    })
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}
