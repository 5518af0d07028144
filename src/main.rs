//! docbridge - medical document translation pipeline engine.
//!
//! Serves the HTTP API, runs a worker pool against the Redis queue, or applies
//! schema migrations, depending on the subcommand.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docbridge::api::{self, ApiContext};
use docbridge::clients::{guideline::DifyGuidelineClient, llm::HttpLlmClient, ocr::HttpOcrClient, pii::HttpPiiClient, GuidelineClient};
use docbridge::db::pool::open_pool;
use docbridge::jobs::CancelRegistry;
use docbridge::ocr_router::{OcrRouter, OcrRouterConfig};
use docbridge::pipeline::PipelineExecutor;
use docbridge::processor::DocumentProcessor;
use docbridge::queue::feedback::InMemoryFeedbackQueue;
use docbridge::queue::memory::InMemoryTaskQueue;
use docbridge::resilience::BreakerRegistry;
use docbridge::feedback::FeedbackAnalyzer;
use docbridge::Config;

#[derive(Parser)]
#[command(name = "docbridge")]
#[command(about = "Medical document translation pipeline engine")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations and exit
    Migrate,

    /// Run the HTTP API (upload/process/feedback/admin) and an in-process worker
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Run a standalone worker pool draining the Redis task queue
    Worker {
        /// Number of parallel drain loops
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },
}

/// `None` unless both `USE_DIFY_RAG` and `DIFY_RAG_URL` are set, in which case
/// steps whose model provider is `"dify"` dispatch to the guideline RAG service.
fn guideline_client(config: &Config) -> Option<Arc<dyn GuidelineClient>> {
    if !config.use_dify_rag {
        return None;
    }
    let url = config.dify_rag_url.clone()?;
    Some(Arc::new(DifyGuidelineClient::new(url, config.dify_rag_api_key.clone().unwrap_or_default())))
}

fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if is_verbose() { "docbridge=debug" } else { "docbridge=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Migrate => cmd_migrate(&config),
        Commands::Serve { bind } => cmd_serve(&config, &bind).await,
        Commands::Worker { workers } => cmd_worker(&config, workers).await,
    }
}

fn cmd_migrate(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(&config.database_url)?;
    let mut conn = pool.get()?;
    docbridge::db::run_migrations(&mut conn)?;
    tracing::info!("migrations applied");
    Ok(())
}

async fn cmd_serve(config: &Config, bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pool = open_pool(&config.database_url)?;
    let cipher = config.build_cipher()?;
    let breakers = Arc::new(BreakerRegistry::new());

    let llm: Arc<dyn docbridge::clients::LlmClient> =
        Arc::new(HttpLlmClient::new(config.llm_service_url.clone(), config.llm_api_key.clone()));
    let ocr: Arc<dyn docbridge::clients::OcrClient> = Arc::new(HttpOcrClient::new(config.ocr_service_url.clone(), config.ocr_api_key.clone().unwrap_or_default()));
    let pii: Arc<dyn docbridge::clients::PiiClient> = if config.use_external_pii {
        Arc::new(HttpPiiClient::new(config.pii_service_url.clone(), config.external_pii_api_key.clone()))
    } else {
        Arc::new(HttpPiiClient::new(config.pii_service_url.clone(), None))
    };
    let ocr_router = OcrRouter::new(OcrRouterConfig::default(), ocr, llm.clone(), breakers.clone());
    let mut executor = PipelineExecutor::new(llm.clone(), breakers.clone());
    if let Some(guideline) = guideline_client(config) {
        executor = executor.with_guideline_client(guideline);
    }
    let cancel = CancelRegistry::new();

    let cache = if config.cache_enabled {
        Some(Arc::new(docbridge::cache::Cache::new(
            config.cache_key_prefix.clone(),
            std::time::Duration::from_secs(config.cache_default_ttl_seconds),
        )))
    } else {
        None
    };

    let mut processor = DocumentProcessor::new(
        pool.clone(),
        cipher.clone(),
        ocr_router,
        pii,
        config.feature_flag("pii_regex_fallback"),
        executor,
        cancel.clone(),
        "inline-worker",
    );
    if let Some(cache) = cache.clone() {
        processor = processor.with_cache(cache);
    }
    let processor = Arc::new(processor);

    let task_queue: Arc<dyn docbridge::queue::TaskQueue> = if config.use_redis_queue {
        redis_task_queue(config)?
    } else {
        Arc::new(InMemoryTaskQueue::new(processor.clone()))
    };

    let analyzer = Arc::new(FeedbackAnalyzer::new(llm, breakers));
    let feedback_queue = Arc::new(InMemoryFeedbackQueue::new(pool.clone(), cipher.clone(), analyzer));

    let mut ctx = ApiContext::new(pool, cipher, task_queue, feedback_queue, cancel, 50 * 1024 * 1024);
    if let Some(cache) = cache {
        ctx = ctx.with_cache(cache);
    }
    let addr: SocketAddr = bind.parse()?;
    let mut handle = api::serve(addr, ctx).await?;
    tracing::info!(addr = %handle.local_addr, "docbridge listening");

    tokio::signal::ctrl_c().await?;
    handle.shutdown();
    Ok(())
}

#[cfg(feature = "redis-backend")]
fn redis_task_queue(config: &Config) -> Result<Arc<dyn docbridge::queue::TaskQueue>, Box<dyn std::error::Error>> {
    let redis_url = config.redis_url.as_deref().ok_or("USE_REDIS_QUEUE is set but REDIS_URL is missing")?;
    Ok(Arc::new(docbridge::queue::RedisTaskQueue::new(redis_url)?))
}

#[cfg(not(feature = "redis-backend"))]
fn redis_task_queue(_config: &Config) -> Result<Arc<dyn docbridge::queue::TaskQueue>, Box<dyn std::error::Error>> {
    Err("USE_REDIS_QUEUE is set but this binary was built without the `redis-backend` feature".into())
}

#[cfg(feature = "redis-backend")]
async fn cmd_worker(config: &Config, workers: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !config.use_redis_queue {
        return Err("a standalone worker pool requires USE_REDIS_QUEUE=true; the in-memory queue runs jobs inline in `serve`".into());
    }
    let redis_url = config.redis_url.as_deref().ok_or("USE_REDIS_QUEUE is set but REDIS_URL is missing")?;

    let pool = open_pool(&config.database_url)?;
    let cipher = config.build_cipher()?;
    let breakers = Arc::new(BreakerRegistry::new());

    let llm: Arc<dyn docbridge::clients::LlmClient> =
        Arc::new(HttpLlmClient::new(config.llm_service_url.clone(), config.llm_api_key.clone()));
    let ocr: Arc<dyn docbridge::clients::OcrClient> = Arc::new(HttpOcrClient::new(config.ocr_service_url.clone(), config.ocr_api_key.clone().unwrap_or_default()));
    let pii: Arc<dyn docbridge::clients::PiiClient> = Arc::new(HttpPiiClient::new(config.pii_service_url.clone(), config.external_pii_api_key.clone()));

    let ocr_router = OcrRouter::new(OcrRouterConfig::default(), ocr, llm.clone(), breakers.clone());
    let mut executor = PipelineExecutor::new(llm, breakers);
    if let Some(guideline) = guideline_client(config) {
        executor = executor.with_guideline_client(guideline);
    }

    let mut worker_processor = DocumentProcessor::new(
        pool,
        cipher,
        ocr_router,
        pii,
        config.feature_flag("pii_regex_fallback"),
        executor,
        CancelRegistry::new(),
        format!("worker-pool-{}", uuid::Uuid::new_v4()),
    );
    if config.cache_enabled {
        worker_processor = worker_processor.with_cache(Arc::new(docbridge::cache::Cache::new(
            config.cache_key_prefix.clone(),
            std::time::Duration::from_secs(config.cache_default_ttl_seconds),
        )));
    }
    let processor: Arc<dyn docbridge::queue::JobHandler> = Arc::new(worker_processor);

    docbridge::queue::redis_backend::run_worker_pool(
        redis_url,
        "ocr_queue",
        workers,
        processor,
        docbridge::queue::worker::DEFAULT_JOB_TIMEOUT,
    )
    .await?;
    Ok(())
}

#[cfg(not(feature = "redis-backend"))]
async fn cmd_worker(_config: &Config, _workers: usize) -> Result<(), Box<dyn std::error::Error>> {
    Err("this binary was built without the `redis-backend` feature; rebuild with --features redis-backend".into())
}
