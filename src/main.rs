use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use marcel_core::chat::{encode_chunk, respond};
use marcel_core::config::Config;
use marcel_core::pipeline::{ConversationTurn, HybridPipeline, PipelineConfig, RunResult};
use marcel_evidence::loader::{load_documents, load_faqs};
use marcel_evidence::{EvidenceStore, faq_embedder};
use marcel_llm::http::build_client;
use marcel_llm::openai::OpenAiProvider;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

type Pipeline = HybridPipeline<OpenAiProvider, EvidenceStore>;

/// Admissions assistant with hybrid lexical/FAQ retrieval and streamed answers.
#[derive(Parser)]
#[command(name = "marcel", version, about)]
struct Cli {
    /// Path to the TOML config file. Falls back to `MARCEL_CONFIG`, then
    /// `config/default.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question.
    Ask {
        query: String,

        /// Emit newline-delimited JSON chunks instead of plain text.
        #[arg(long)]
        json: bool,

        /// Print the classifier verdict, retrieval branches and prompt to stderr.
        #[arg(long)]
        debug: bool,
    },

    /// Interactive conversation. Ctrl-C cancels the answer in progress.
    Chat,

    /// Show the fused evidence for a query without generating an answer.
    Search {
        query: String,
    },

    /// Show whether a query would trigger retrieval.
    Classify {
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let pipeline = build_pipeline(&config).await?;

    match cli.command {
        Commands::Ask { query, json, debug } => ask(&pipeline, &query, json, debug).await,
        Commands::Chat => chat(&pipeline).await,
        Commands::Search { query } => search(&pipeline, &query).await,
        Commands::Classify { query } => {
            let verdict = pipeline.classify(&query).await;
            println!("{}", serde_json::to_string(&verdict)?);
            Ok(())
        }
    }
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if let Ok(path) = std::env::var("MARCEL_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

fn create_provider(config: &Config) -> anyhow::Result<OpenAiProvider> {
    let api_key = config
        .secrets
        .llm_api_key
        .as_ref()
        .map(|s| s.expose().to_owned())
        .unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("MARCEL_LLM_API_KEY is not set, requests are sent without a key");
    }

    let request_timeout = (config.llm.request_timeout_secs > 0)
        .then(|| Duration::from_secs(config.llm.request_timeout_secs));
    let client = build_client(
        Duration::from_secs(config.llm.connect_timeout_secs),
        request_timeout,
    )?;

    Ok(
        OpenAiProvider::new(api_key, config.llm.base_url.clone(), config.llm.model.clone())?
            .with_client(client)
            .with_max_tokens(config.llm.max_tokens)
            .with_embedding_model(config.llm.embedding_model.clone())
            .with_max_retries(config.llm.max_retries),
    )
}

async fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let provider = Arc::new(create_provider(config)?);
    tracing::info!(model = provider.model(), "using OpenAI-compatible provider");

    let documents = load_documents(&config.data.documents_path).with_context(|| {
        format!(
            "failed to load documents from {}",
            config.data.documents_path.display()
        )
    })?;
    let faqs = match &config.data.faqs_path {
        Some(path) if path.exists() => load_faqs(path)
            .with_context(|| format!("failed to load faqs from {}", path.display()))?,
        Some(path) => {
            tracing::warn!(path = %path.display(), "faq file not found, continuing without faqs");
            Vec::new()
        }
        None => Vec::new(),
    };

    let embedder = faq_embedder(&provider, config.retrieval.faq.backend)
        .context("faq backend `embedding` needs llm.embedding_model")?;
    let store = EvidenceStore::build(
        documents,
        faqs,
        config.retrieval.faq.clone(),
        config.data.domain_map.clone(),
        embedder,
    )
    .await
    .context("failed to build evidence store")?;

    Ok(HybridPipeline::new(
        provider,
        Arc::new(store),
        PipelineConfig::from(config),
    ))
}

async fn ask(pipeline: &Pipeline, query: &str, json: bool, debug: bool) -> anyhow::Result<()> {
    let mut run = pipeline.run(query, &[], debug).await;
    if let Some(raw) = run.raw.take() {
        eprintln!("verdict: {:?}", raw.verdict);
        for r in &raw.lexical {
            eprintln!("lexical {:.3} {}", r.relevance_score, r.document.url);
        }
        for r in &raw.faq {
            eprintln!("faq     {:.3} {}", r.relevance_score, r.document.url);
        }
        for e in &raw.branch_errors {
            eprintln!("branch error: {e}");
        }
        for m in &raw.prompt {
            eprintln!("--- {} ---\n{}", m.role.as_str(), m.content);
        }
    }

    if json {
        let mut stdout = tokio::io::stdout();
        let mut chunks = pin!(respond(run));
        while let Some(chunk) = chunks.next().await {
            stdout.write_all(encode_chunk(&chunk)?.as_bytes()).await?;
            stdout.flush().await?;
        }
        return Ok(());
    }

    stream_plain(run).await?;
    Ok(())
}

/// Print the answer as it streams, then its sources. Returns the answer text when the
/// stream completed.
async fn stream_plain(run: RunResult) -> anyhow::Result<Option<String>> {
    let RunResult {
        mut generated_answer,
        evidence,
        answer_strategy,
        ..
    } = run;
    let mut stdout = tokio::io::stdout();

    while let Some(fragment) = generated_answer.next().await {
        match fragment {
            Ok(text) => {
                stdout.write_all(text.as_bytes()).await?;
                stdout.flush().await?;
            }
            Err(e) => {
                tracing::error!("could not generate response: {e:#}");
                stdout
                    .write_all(b"\n[Could not generate response. Please retry.]\n")
                    .await?;
                return Ok(None);
            }
        }
    }

    let done = generated_answer.finish()?;
    if !done.links_block.is_empty() {
        stdout
            .write_all(format!("\n\n{}", done.links_block).as_bytes())
            .await?;
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    eprintln!("strategy: {answer_strategy}, non_answer: {}", done.non_answer);
    for r in &evidence {
        eprintln!("  {:.3} {} ({})", r.relevance_score, r.document.title, r.document.url);
    }
    Ok(Some(done.text))
}

async fn chat(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ConversationTurn> = Vec::new();

    eprintln!("Type a question, or 'exit' to quit.");
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        let run = pipeline.run(query, &history, false).await;
        let answer = tokio::select! {
            result = stream_plain(run) => result?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n[cancelled]");
                None
            }
        };

        if let Some(answer) = answer {
            history.push(ConversationTurn::user(query));
            history.push(ConversationTurn::assistant(answer));
        }
    }
    Ok(())
}

async fn search(pipeline: &Pipeline, query: &str) -> anyhow::Result<()> {
    let retrieval = pipeline.retrieve(query).await;
    for e in &retrieval.errors {
        eprintln!("branch error: {e}");
    }
    for r in &retrieval.evidence {
        let line = serde_json::json!({
            "score": r.relevance_score,
            "origin": r.origin,
            "title": r.document.title,
            "url": r.document.url,
            "fingerprint": r.document.fingerprint,
        });
        println!("{line}");
    }
    Ok(())
}
