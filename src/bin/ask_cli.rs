use std::fs;
use std::io::{self, Read as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use isoground::prompt::{
    analysis_prompt, evaluation_prompt, render_context, DEFAULT_CONTEXT_CHAR_BUDGET,
};
use isoground::{
    extract_evaluation, ChunkerConfig, Document, GeminiGenerator, GenerationRequest,
    OpenAiEmbedder, OpenAiGenerator, PdfTextSource, Retriever, RetrieverConfig, TextGenerator,
    TextSource,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "isoground-ask",
    about = "Ground a case study in an ISO standard PDF and generate an analysis"
)]
struct AskCli {
    /// Path to the reference standard PDF
    #[arg(long, env = "ISOGROUND_PDF")]
    pdf: PathBuf,

    /// Case study text to analyze (read from stdin when omitted)
    #[arg(long)]
    case: Option<String>,

    /// Chunks of grounding context retrieved for the case
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// Pages grouped into one retrievable chunk
    #[arg(long, env = "ISOGROUND_BLOCK_SIZE", default_value_t = 2)]
    block_size: usize,

    /// Character budget for rendered grounding context
    #[arg(long, env = "ISOGROUND_CONTEXT_CHARS", default_value_t = DEFAULT_CONTEXT_CHAR_BUDGET)]
    context_chars: usize,

    /// API key used for query and chunk embeddings
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier
    #[arg(
        long,
        env = "ISOGROUND_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embed_model: String,

    /// Optional embedding dimension override
    #[arg(long, env = "ISOGROUND_EMBED_DIMENSIONS")]
    embed_dimensions: Option<usize>,

    /// Base URL for OpenAI-compatible embedding endpoints
    #[arg(
        long,
        env = "ISOGROUND_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Seconds before embedding requests time out
    #[arg(long, env = "ISOGROUND_EMBED_TIMEOUT_SECS", default_value_t = 30)]
    embed_timeout_secs: u64,

    /// Retry attempts for transient embedding errors
    #[arg(long, env = "ISOGROUND_EMBED_MAX_RETRIES", default_value_t = 5)]
    embed_max_retries: usize,

    /// Inputs per embedding request during index builds
    #[arg(long, env = "ISOGROUND_EMBED_BATCH", default_value_t = 16)]
    embed_batch: usize,

    /// Concurrent embedding workers during index builds
    #[arg(long, env = "ISOGROUND_EMBED_WORKERS", default_value_t = 2)]
    embed_workers: usize,

    /// Target LLM provider (gemini or openai)
    #[arg(long, env = "ISOGROUND_LLM_PROVIDER", default_value = "gemini")]
    llm_provider: String,

    /// Gemini API key (required when --llm-provider gemini)
    #[arg(long, env = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,

    /// Gemini model identifier
    #[arg(
        long,
        env = "ISOGROUND_GEMINI_MODEL",
        default_value = "gemini-2.0-flash"
    )]
    gemini_model: String,

    /// OpenAI chat model used when --llm-provider openai
    #[arg(long, env = "ISOGROUND_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    openai_model: String,

    /// Sampling temperature for generation
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Maximum tokens requested from the generation model
    #[arg(long, default_value_t = 2048)]
    max_completion_tokens: usize,

    /// Only print the retrieved context (skip the LLM call)
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Path to a user analysis to evaluate against the generated one
    #[arg(long)]
    evaluate: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = AskCli::parse();

    let case = match &cli.case {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read case study from stdin")?;
            buffer
        }
    };
    anyhow::ensure!(!case.trim().is_empty(), "case study text must not be empty");

    let bytes = fs::read(&cli.pdf).with_context(|| format!("failed to read {:?}", cli.pdf))?;
    let pages = PdfTextSource.extract_pages(&bytes)?;
    let document = Document::from_pages(pages);

    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key.clone(),
        cli.openai_base_url.clone(),
        cli.embed_model.clone(),
        cli.embed_dimensions,
        Duration::from_secs(cli.embed_timeout_secs.max(1)),
        cli.embed_max_retries.max(1),
    )?;
    let retriever = Retriever::new(
        embedder,
        RetrieverConfig {
            chunker: ChunkerConfig {
                block_size: cli.block_size.max(1),
            },
            batch_size: cli.embed_batch.max(1),
            worker_threads: cli.embed_workers.max(1),
        },
    );

    let document_index = retriever.index_document(&document)?;
    if document_index.skipped_chunks() > 0 {
        eprintln!(
            "warning: {} chunk(s) skipped after embedding failures",
            document_index.skipped_chunks()
        );
    }
    let hits = retriever.query_top_k(&document_index, &case, cli.top_k.max(1))?;
    let context = render_context(&hits, cli.context_chars.max(1));
    println!("--- Retrieved Context ---\n{context}\n");
    if cli.dry_run {
        println!("dry-run enabled; skipping LLM call.");
        return Ok(());
    }

    let generator = build_generator(&cli)?;
    let prompt = analysis_prompt(&context, &case);
    let analysis = generator.generate(&GenerationRequest {
        prompt: &prompt,
        temperature: cli.temperature,
        max_tokens: cli.max_completion_tokens,
    })?;
    println!("--- Analysis ---\n{analysis}");

    if let Some(path) = &cli.evaluate {
        let user_analysis = fs::read_to_string(path)
            .with_context(|| format!("failed to read user analysis from {path:?}"))?;
        let prompt = evaluation_prompt(&analysis, &user_analysis);
        let verdict = generator.generate(&GenerationRequest {
            prompt: &prompt,
            temperature: cli.temperature,
            max_tokens: cli.max_completion_tokens,
        })?;
        let record = extract_evaluation(&verdict);
        println!(
            "--- Evaluation ---\n{}",
            serde_json::to_string_pretty(&record).context("failed to render evaluation record")?
        );
    }
    Ok(())
}

fn build_generator(cli: &AskCli) -> Result<Box<dyn TextGenerator>> {
    match cli.llm_provider.to_lowercase().as_str() {
        "gemini" => {
            let key = cli
                .gemini_api_key
                .clone()
                .ok_or_else(|| anyhow!("GEMINI_API_KEY must be set for the Gemini provider"))?;
            Ok(Box::new(GeminiGenerator::new(key, cli.gemini_model.clone())?))
        }
        "openai" => Ok(Box::new(OpenAiGenerator::new(
            cli.openai_api_key.clone(),
            cli.openai_model.clone(),
        )?)),
        other => bail!("unsupported llm provider '{}'; use gemini or openai", other),
    }
}
