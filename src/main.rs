use casefile::cli::{Cli, Commands, ConfigAction};
use casefile::config::Config;
use casefile::embedding::{create_provider, BatchEmbedder};
use casefile::error::{CasefileError, Result};
use casefile::generation::{create_generator, AnswerKind, ConversationHistory, Detective};
use casefile::ingest::{chunk_documents, load_evidence};
use casefile::retrieval::Retriever;
use casefile::retry::{RetryOutcome, UNAVAILABLE_MESSAGE};
use casefile::store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "casefile=debug" } else { "casefile=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, action),
        command => {
            let config = Config::load_or_default(cli.config.as_deref(), cli.profile.as_deref())?;
            tracing::debug!("Configuration loaded");

            match command {
                Commands::Ingest { evidence } => cmd_ingest(&config, evidence).await,
                Commands::Search { query, k, json } => cmd_search(&config, &query, k, json).await,
                Commands::Ask { question, k } => cmd_ask(&config, &question, k).await,
                Commands::Chat => cmd_chat(&config).await,
                Commands::Timeline { json } => cmd_timeline(&config, json).await,
                Commands::Status => cmd_status(&config),
                Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn build_retriever(config: &Config) -> Result<Retriever> {
    let provider = create_provider(&config.embedding)?;
    let embedder = BatchEmbedder::new(provider, config.embedding.batch_size, config.retry.policy()?);
    Ok(Retriever::new(embedder, config.store_path()))
}

fn build_detective(config: &Config) -> Result<Detective> {
    let retriever = Arc::new(build_retriever(config)?);
    let generator = create_generator(&config.llm)?;
    Ok(Detective::new(
        retriever,
        generator,
        config.retry.policy()?,
        config.retrieval.top_k,
    ))
}

async fn cmd_ingest(config: &Config, evidence: Option<PathBuf>) -> Result<()> {
    let evidence_dir = evidence.unwrap_or_else(|| config.evidence_dir());
    let documents = load_evidence(&evidence_dir)?;
    let chunks = chunk_documents(
        &documents,
        config.chunking.chunk_size,
        config.chunking.overlap,
    )?;

    println!(
        "Loaded {} evidence files from {}",
        documents.len(),
        evidence_dir.display()
    );

    let retriever = build_retriever(config)?;
    let report = retriever.build_store(chunks).await?;

    println!("✓ Vector store built");
    println!("  Chunks:      {}", report.chunks);
    println!("  Dimension:   {}", report.dimension);
    println!("  Fingerprint: {}", report.fingerprint);
    println!("  Store:       {}", retriever.store_path().display());
    println!("  Took:        {}ms", report.duration_ms);

    Ok(())
}

async fn cmd_search(config: &Config, query: &str, k: Option<usize>, json: bool) -> Result<()> {
    let retriever = build_retriever(config)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let result = match retriever.search(query, k).await? {
        RetryOutcome::Succeeded(result) => result,
        RetryOutcome::Exhausted { .. } => {
            println!("{UNAVAILABLE_MESSAGE}");
            return Ok(());
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&result).map_err(|e| CasefileError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{out}");
        return Ok(());
    }

    if result.is_empty() {
        println!("No matching evidence.");
        return Ok(());
    }

    for (rank, hit) in result.iter().enumerate() {
        println!("{}. [{}] (distance {:.4})", rank + 1, hit.source, hit.distance);
        println!("   {}", hit.text.trim().replace('\n', "\n   "));
    }

    Ok(())
}

async fn cmd_ask(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    let mut detective = build_detective(config)?;
    if let Some(k) = k {
        detective = detective.with_top_k(k);
    }

    let answer = detective.ask(question, &[]).await?;
    println!("{}", answer.text);
    print_sources(&answer.sources, answer.kind);

    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let detective = build_detective(config)?;
    let mut history = ConversationHistory::new(config.llm.history_turns);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Casefile chat. Type 'exit' to quit, 'clear' to forget the conversation.");

    loop {
        stdout.write_all(b"\n> ").await.map_err(|e| io_error(e, "stdout"))?;
        stdout.flush().await.map_err(|e| io_error(e, "stdout"))?;

        let Some(line) = lines.next_line().await.map_err(|e| io_error(e, "stdin"))? else {
            break;
        };
        let question = line.trim();

        match question {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                history.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let answer = detective.converse(question, &mut history).await;
        println!("{}", answer.text);
        print_sources(&answer.sources, answer.kind);
    }

    Ok(())
}

async fn cmd_timeline(config: &Config, json: bool) -> Result<()> {
    let documents = load_evidence(&config.evidence_dir())?;
    let detective = build_detective(config)?;

    let events = match detective.extract_timeline(&documents).await? {
        RetryOutcome::Succeeded(events) => events,
        RetryOutcome::Exhausted { .. } => {
            println!("{UNAVAILABLE_MESSAGE}");
            return Ok(());
        }
    };

    if json {
        let out = serde_json::to_string_pretty(&events).map_err(|e| CasefileError::Json {
            source: e,
            context: "Failed to serialize timeline".to_string(),
        })?;
        println!("{out}");
        return Ok(());
    }

    if events.is_empty() {
        println!("No timeline could be extracted.");
        return Ok(());
    }

    for event in &events {
        println!("{:<20} {} [{}]", event.time, event.event, event.source);
    }

    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let store_path = config.store_path();

    println!("Casefile Status");
    println!("===============");
    println!("\nEvidence: {}", config.evidence_dir().display());
    println!(
        "Embedding: {} ({})",
        config.embedding.model, config.embedding.provider
    );

    match Store::load(&store_path) {
        Ok(store) => {
            let manifest = store.manifest();
            println!("\nStore: {}", store_path.display());
            println!("  Chunks:    {}", store.len());
            println!("  Model:     {}", manifest.model);
            println!("  Dimension: {}", manifest.dimension);
            println!("  Built:     {}", manifest.built_at.format("%Y-%m-%d %H:%M:%S"));
            if manifest.model != config.embedding.model {
                println!("  ⚠ Built with a different model; run 'casefile ingest' to rebuild");
            }
        }
        Err(CasefileError::StoreNotFound { .. }) => {
            println!("\nStore: not built yet (run 'casefile ingest')");
        }
        Err(e) => {
            println!("\nStore: unusable ({e})");
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path.as_deref(), None)?;
            let out = toml::to_string_pretty(&config)?;
            println!("{out}");
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CasefileError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn print_sources(sources: &[casefile::retrieval::EvidenceHit], kind: AnswerKind) {
    if kind != AnswerKind::Generated || sources.is_empty() {
        return;
    }

    let mut files: Vec<&str> = Vec::new();
    for hit in sources {
        if !files.contains(&hit.source.as_str()) {
            files.push(&hit.source);
        }
    }
    println!("\nSources: {}", files.join(", "));
}

fn io_error(source: std::io::Error, stream: &str) -> CasefileError {
    CasefileError::Io {
        source,
        context: format!("Failed to use {stream}"),
    }
}
