use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use isoground::prompt::{
    analysis_prompt, evaluation_prompt, render_context, DEFAULT_CONTEXT_CHAR_BUDGET,
};
use isoground::{
    extract_evaluation, CachedEmbedder, ChunkerConfig, Document, DocumentReceipt, Embedder,
    EvaluationRecord, FileSessionStore, GeminiGenerator, GenerationRequest, OpenAiEmbedder,
    OpenAiGenerator, PdfTextSource, RetrievalError, Retriever, RetrieverConfig, SessionError,
    SessionStore, TextGenerator, TextSource, DEFAULT_SESSION,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Matches the original service's 16 MB upload ceiling.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "isoground-api",
    about = "HTTP service for ISO-grounded case analysis and structured evaluation"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "ISOGROUND_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Directory holding per-session document and analysis files
    #[arg(long, env = "ISOGROUND_UPLOADS", default_value = "uploads")]
    uploads_dir: PathBuf,

    /// Pages grouped into one retrievable chunk
    #[arg(long, env = "ISOGROUND_BLOCK_SIZE", default_value_t = 2)]
    block_size: usize,

    /// Chunks of grounding context retrieved per case analysis
    #[arg(long, env = "ISOGROUND_TOP_K", default_value_t = 4)]
    top_k: usize,

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

    /// Max cached text embeddings kept in-memory (0 disables caching)
    #[arg(long, default_value_t = 256)]
    embedding_cache_size: usize,

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
}

#[derive(Clone)]
struct AppState {
    store: Arc<FileSessionStore>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    retriever_config: RetrieverConfig,
    top_k: usize,
    context_chars: usize,
    temperature: f32,
    max_completion_tokens: usize,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    success: bool,
    message: String,
    #[serde(flatten)]
    receipt: DocumentReceipt,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    caso: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis: String,
    grounding: GroundingMeta,
}

#[derive(Debug, Serialize)]
struct GroundingMeta {
    chunks: usize,
    skipped_chunks: usize,
    context_chars: usize,
    latency_ms: f64,
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    #[serde(rename = "userResponse")]
    user_response: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

enum PipelineFailure {
    Retrieval(RetrievalError),
    Generation(anyhow::Error),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = ApiCli::parse();

    let store = Arc::new(
        FileSessionStore::new(&cli.uploads_dir)
            .with_context(|| format!("failed to open session store at {:?}", cli.uploads_dir))?,
    );
    let embedder = build_embedder(&cli)?;
    let generator = build_generator(&cli)?;
    let state = AppState {
        store,
        embedder,
        generator,
        retriever_config: RetrieverConfig {
            chunker: ChunkerConfig {
                block_size: cli.block_size.max(1),
            },
            batch_size: cli.embed_batch.max(1),
            worker_threads: cli.embed_workers.max(1),
        },
        top_k: cli.top_k.max(1),
        context_chars: cli.context_chars.max(1),
        temperature: cli.temperature,
        max_completion_tokens: cli.max_completion_tokens,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/upload-iso", post(upload_iso))
        .route("/analyze-case", post(analyze_case))
        .route("/evaluate-response", post(evaluate_response))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    info!("isoground-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

fn build_embedder(cli: &ApiCli) -> Result<Arc<dyn Embedder>> {
    let inner = OpenAiEmbedder::new(
        cli.openai_api_key.clone(),
        cli.openai_base_url.clone(),
        cli.embed_model.clone(),
        cli.embed_dimensions,
        Duration::from_secs(cli.embed_timeout_secs.max(1)),
        cli.embed_max_retries.max(1),
    )?;
    Ok(match NonZeroUsize::new(cli.embedding_cache_size) {
        Some(capacity) => Arc::new(CachedEmbedder::new(inner, capacity)),
        None => Arc::new(inner),
    })
}

fn build_generator(cli: &ApiCli) -> Result<Arc<dyn TextGenerator>> {
    match cli.llm_provider.to_lowercase().as_str() {
        "gemini" => {
            let key = cli
                .gemini_api_key
                .clone()
                .ok_or_else(|| anyhow!("GEMINI_API_KEY must be set for the Gemini provider"))?;
            Ok(Arc::new(GeminiGenerator::new(key, cli.gemini_model.clone())?))
        }
        "openai" => Ok(Arc::new(OpenAiGenerator::new(
            cli.openai_api_key.clone(),
            cli.openai_model.clone(),
        )?)),
        other => bail!("unsupported llm provider '{}'; use gemini or openai", other),
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn upload_iso(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ErrorBody>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut session_id: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("invalid multipart payload: {err}")))?
    {
        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(format!("failed to read file part: {err}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("session_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| bad_request(format!("failed to read session id: {err}")))?;
                session_id = Some(text);
            }
            _ => {}
        }
    }
    let bytes = file_bytes.ok_or_else(|| bad_request("missing file part"))?;
    let session = session_or_default(session_id);

    let extracted = tokio::task::spawn_blocking(move || -> Result<(Document, DocumentReceipt)> {
        let pages = PdfTextSource.extract_pages(&bytes)?;
        let document = Document::from_pages(pages);
        let receipt = DocumentReceipt::new(&document, &bytes);
        Ok((document, receipt))
    })
    .await
    .map_err(|err| internal_error(anyhow!("extraction task join error: {err}")))?;
    let (document, receipt) =
        extracted.map_err(|err| bad_request(format!("could not extract text from PDF: {err}")))?;

    if document.is_empty() {
        return Err(bad_request(
            "no usable text could be extracted from the PDF",
        ));
    }
    state
        .store
        .put_document_text(&session, &document.to_storage())
        .map_err(|err| internal_error(err.into()))?;
    info!(
        session = %session,
        pages = receipt.pages,
        chars = receipt.chars,
        "reference document stored"
    );
    Ok(Json(UploadResponse {
        success: true,
        message: format!(
            "PDF processed: {} characters across {} pages",
            receipt.chars, receipt.pages
        ),
        receipt,
    }))
}

async fn analyze_case(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, Json<ErrorBody>)> {
    let case = request.caso.trim().to_string();
    if case.is_empty() {
        return Err(bad_request("case study text must not be empty"));
    }
    let session = session_or_default(request.session_id);
    let stored = match state.store.document_text(&session) {
        Ok(text) => text,
        Err(SessionError::NotFound { .. }) => {
            return Err(bad_request(
                "no reference document has been uploaded for this session",
            ))
        }
        Err(err) => return Err(internal_error(err.into())),
    };

    let start = Instant::now();
    let worker_state = state.clone();
    let worker_case = case;
    let outcome = tokio::task::spawn_blocking(
        move || -> Result<(String, GroundingMeta), PipelineFailure> {
            let document = Document::from_storage(&stored);
            let retriever = Retriever::new(
                worker_state.embedder.clone(),
                worker_state.retriever_config,
            );
            let document_index = retriever
                .index_document(&document)
                .map_err(PipelineFailure::Retrieval)?;
            let hits = retriever
                .query_top_k(&document_index, &worker_case, worker_state.top_k)
                .map_err(PipelineFailure::Retrieval)?;
            let context = render_context(&hits, worker_state.context_chars);
            let prompt = analysis_prompt(&context, &worker_case);
            let generation = GenerationRequest {
                prompt: &prompt,
                temperature: worker_state.temperature,
                max_tokens: worker_state.max_completion_tokens,
            };
            let analysis = worker_state
                .generator
                .generate(&generation)
                .map_err(PipelineFailure::Generation)?;
            let meta = GroundingMeta {
                chunks: document_index.len(),
                skipped_chunks: document_index.skipped_chunks(),
                context_chars: context.len(),
                latency_ms: 0.0,
            };
            Ok((analysis, meta))
        },
    )
    .await
    .map_err(|err| internal_error(anyhow!("analysis task join error: {err}")))?;

    let (analysis, mut meta) = outcome.map_err(pipeline_error)?;
    meta.latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    state
        .store
        .put_analysis_text(&session, &analysis)
        .map_err(|err| internal_error(err.into()))?;
    info!(
        session = %session,
        chunks = meta.chunks,
        skipped = meta.skipped_chunks,
        "case analysis generated"
    );
    Ok(Json(AnalyzeResponse {
        analysis,
        grounding: meta,
    }))
}

async fn evaluate_response(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluationRecord>, (StatusCode, Json<ErrorBody>)> {
    let user_response = request.user_response.trim().to_string();
    if user_response.is_empty() {
        return Err(bad_request("user response text must not be empty"));
    }
    let session = session_or_default(request.session_id);
    let reference = match state.store.analysis_text(&session) {
        Ok(text) => text,
        Err(SessionError::NotFound { .. }) => {
            return Err(bad_request(
                "no prior analysis has been generated for this session",
            ))
        }
        Err(err) => return Err(internal_error(err.into())),
    };

    let worker_state = state.clone();
    let verdict = tokio::task::spawn_blocking(move || -> Result<String> {
        let prompt = evaluation_prompt(&reference, &user_response);
        let generation = GenerationRequest {
            prompt: &prompt,
            temperature: worker_state.temperature,
            max_tokens: worker_state.max_completion_tokens,
        };
        worker_state.generator.generate(&generation)
    })
    .await
    .map_err(|err| internal_error(anyhow!("evaluation task join error: {err}")))?
    .map_err(|err| bad_gateway(format!("generation failed: {err}")))?;

    // Extraction never fails; malformed output degrades to the default record.
    let record = extract_evaluation(&verdict);
    Ok(Json(record))
}

fn session_or_default(session_id: Option<String>) -> String {
    match session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => DEFAULT_SESSION.to_string(),
    }
}

fn pipeline_error(failure: PipelineFailure) -> (StatusCode, Json<ErrorBody>) {
    match failure {
        PipelineFailure::Retrieval(RetrievalError::NoUsableContent) => {
            bad_request("cannot retrieve: the reference document has no usable content")
        }
        PipelineFailure::Retrieval(RetrievalError::NoEmbeddableContent { .. }) => {
            bad_gateway("cannot retrieve: no chunk could be embedded")
        }
        PipelineFailure::Retrieval(RetrievalError::EmbeddingService(_)) => {
            bad_gateway("cannot answer: retrieval unavailable")
        }
        PipelineFailure::Retrieval(err) => internal_error(err.into()),
        PipelineFailure::Generation(err) => bad_gateway(format!("generation failed: {err}")),
    }
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn bad_gateway(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}
