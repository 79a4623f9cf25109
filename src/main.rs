use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use codeseek_core::completion::{CompletionPipeline, CompletionService, DocumentSnapshot};
use codeseek_core::config::{CompletionMode, Config, StoreBackend};
use codeseek_index::indexer::{BulkReport, CodeIndexer, IndexEvent};
use codeseek_index::store::CodeStore;
use codeseek_index::watcher::IndexWatcher;
use codeseek_llm::ollama::OllamaProvider;

#[derive(Parser, Debug)]
#[command(name = "codeseek", version, about = "Semantic code index and inline completion")]
struct Cli {
    /// Configuration file (defaults to $CODESEEK_CONFIG, then config/default.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index every project root once.
    Index(RootArgs),
    /// Index, then keep the index current as files change.
    Watch(RootArgs),
    /// Print one completion for a cursor position.
    Complete(CompleteArgs),
    /// Check that Ollama is reachable.
    Health,
}

#[derive(Args, Debug)]
struct RootArgs {
    /// Project roots; overrides the configured roots.
    roots: Vec<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CompleteArgs {
    #[arg(long)]
    file: PathBuf,

    /// One-based line.
    #[arg(long, default_value_t = 1)]
    line: usize,

    /// One-based column, in characters.
    #[arg(long, default_value_t = 1)]
    column: usize,

    /// Override the configured mode: `retrieval` or `local-context`.
    #[arg(long)]
    mode: Option<String>,

    /// Project roots; overrides the configured roots.
    #[arg(long = "root")]
    roots: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let provider = Arc::new(OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    ));

    match cli.command {
        Command::Health => health(&config, &provider).await,
        Command::Index(args) => {
            require_ollama(&config, &provider).await?;
            let indexer = build_indexer(&config, provider, &args.roots)?;
            let report = indexer.index_all().await?;
            print_report(&report, args.json)
        }
        Command::Watch(args) => {
            require_ollama(&config, &provider).await?;
            watch(&config, provider, &args).await
        }
        Command::Complete(args) => {
            require_ollama(&config, &provider).await?;
            complete(config, provider, args).await
        }
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODESEEK_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

async fn health(config: &Config, provider: &OllamaProvider) -> anyhow::Result<()> {
    match provider.health_check().await {
        Ok(()) => {
            tracing::info!(
                url = %config.llm.base_url,
                model = provider.model(),
                embedding_model = provider.embedding_model(),
                "ollama is reachable"
            );
            Ok(())
        }
        Err(e) => bail!("ollama is not reachable at {}: {e}", config.llm.base_url),
    }
}

async fn require_ollama(config: &Config, provider: &OllamaProvider) -> anyhow::Result<()> {
    provider.health_check().await.with_context(|| {
        format!(
            "ollama is not reachable at {}; start it and pull {} and {}",
            config.llm.base_url, config.llm.model, config.llm.embedding_model
        )
    })
}

/// CLI roots, else configured roots, else the current directory; canonicalized.
fn resolve_roots(config: &Config, cli_roots: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let roots = if cli_roots.is_empty() {
        config.roots_or(&cwd)
    } else {
        cli_roots.to_vec()
    };
    roots
        .into_iter()
        .map(|root| {
            std::fs::canonicalize(&root)
                .with_context(|| format!("project root {} does not exist", root.display()))
        })
        .collect()
}

fn open_store(config: &Config) -> anyhow::Result<CodeStore> {
    match config.store.backend {
        StoreBackend::Qdrant => CodeStore::qdrant(&config.store.qdrant_url)
            .with_context(|| format!("connecting to qdrant at {}", config.store.qdrant_url)),
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; the index is lost on exit");
            Ok(CodeStore::in_memory())
        }
    }
}

fn build_indexer(
    config: &Config,
    provider: Arc<OllamaProvider>,
    cli_roots: &[PathBuf],
) -> anyhow::Result<CodeIndexer<OllamaProvider>> {
    let roots = resolve_roots(config, cli_roots)?;
    let store = open_store(config)?;
    Ok(CodeIndexer::new(store, provider, roots, config.indexer_config())?)
}

fn print_report(report: &BulkReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for project in &report.projects {
        if let Some(err) = &project.error {
            tracing::error!(project = %project.project, "project skipped: {err}");
            continue;
        }
        tracing::info!(
            project = %project.project,
            indexed = project.files_indexed,
            unchanged = project.files_unchanged,
            failed = project.files_failed,
            chunks = project.chunks_created,
            evicted = project.chunks_removed,
            "project indexed"
        );
    }
    tracing::info!(
        files = report.files_total,
        duration_ms = report.duration_ms,
        "indexing complete"
    );
    Ok(())
}

async fn watch(
    config: &Config,
    provider: Arc<OllamaProvider>,
    args: &RootArgs,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let indexer = Arc::new(build_indexer(config, provider, &args.roots)?.with_events(tx));

    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                IndexEvent::Started { total } => tracing::info!(total, "indexing workspace"),
                IndexEvent::Progress { project, processed, total } => {
                    tracing::debug!(project = %project, progress = format_args!("{processed}/{total}"));
                }
                IndexEvent::ProjectDone { project, indexed, failed } => {
                    tracing::info!(project = %project, indexed, failed, "project indexed");
                }
                IndexEvent::FileUpdated { file, outcome } => {
                    tracing::debug!(file = %file.display(), ?outcome, "file updated");
                }
            }
        }
    });

    let report = indexer.index_all().await?;
    print_report(&report, args.json)?;

    if !config.index.watch {
        tracing::info!("watching disabled in configuration");
        progress.abort();
        return Ok(());
    }

    let watcher = IndexWatcher::start(Arc::clone(&indexer))?;
    tracing::info!("watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("received shutdown signal");
    watcher.stop();
    progress.abort();
    Ok(())
}

async fn complete(
    mut config: Config,
    provider: Arc<OllamaProvider>,
    args: CompleteArgs,
) -> anyhow::Result<()> {
    if let Some(mode) = &args.mode {
        config.completion.mode = parse_mode(mode)?;
    }
    let file = std::fs::canonicalize(&args.file)
        .with_context(|| format!("cannot open {}", args.file.display()))?;
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let roots = resolve_roots(&config, &args.roots)?;
    let store = open_store(&config)?;

    if config.completion.mode == CompletionMode::Retrieval
        && config.store.backend == StoreBackend::Memory
    {
        // Nothing persists between runs, so build the index for this request.
        let indexer = CodeIndexer::new(
            store.clone(),
            Arc::clone(&provider),
            roots.clone(),
            config.indexer_config(),
        )?;
        indexer.index_all().await?;
    }

    let service = CompletionService::new(CompletionPipeline::new(
        provider,
        store,
        roots,
        config.completion.clone(),
    ));
    if !service.is_enabled() {
        tracing::warn!("completion is disabled in configuration");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let doc = DocumentSnapshot::new(
        file,
        text,
        args.line.saturating_sub(1),
        args.column.saturating_sub(1),
    );
    match service.request(doc, cancel).await {
        Some(completion) => println!("{completion}"),
        None => tracing::info!("no suggestion"),
    }
    Ok(())
}

fn parse_mode(raw: &str) -> anyhow::Result<CompletionMode> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .with_context(|| format!("unknown completion mode `{raw}`"))
}
