use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use book_assist::api::{AppState, routes};
use book_assist::config::AppConfig;
use book_assist::intent::IntentClassifier;
use book_assist::llm::{LlmProvider, OpenAiCompatibleProvider, process_env};
use book_assist::prompts::PromptStore;
use book_assist::retrieval::{BookRetriever, HttpBookRetriever};
use book_assist::search::WebSearchClient;
use book_assist::workflow::ResearchWorkflow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    eprintln!("📚 Book Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Model: {}",
        config.llm.model.as_deref().unwrap_or("(per request)")
    );
    eprintln!("   Classifier: {}", config.classifier_model);
    eprintln!("   Prompts: {}", config.prompts_dir.display());
    eprintln!("   Retrieval: {}", config.retrieval.base_url);
    eprintln!(
        "   Web search: {}",
        if config.search.use_hosted_search {
            "tavily → duckduckgo"
        } else {
            "duckduckgo only"
        }
    );
    eprintln!("   API: http://0.0.0.0:{}/api\n", config.port);

    if config.search.use_hosted_search && config.search.tavily_api_key.is_none() {
        tracing::warn!("TAVILY_API_KEY not set, every search will fall back to DuckDuckGo");
    }

    let env = process_env();
    let prompts = PromptStore::from_dir(&config.prompts_dir);
    let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new());
    let search = Arc::new(WebSearchClient::from_config(&config.search));
    let retriever: Arc<dyn BookRetriever> =
        Arc::new(HttpBookRetriever::from_config(&config.retrieval));

    let classifier = Arc::new(IntentClassifier::new(
        Arc::clone(&prompts),
        Arc::clone(&llm),
        config.llm.clone(),
        config.classifier_model.clone(),
        Arc::clone(&env),
    ));
    let workflow = Arc::new(ResearchWorkflow::new(
        prompts,
        llm,
        search,
        retriever,
        config.llm.clone(),
        env,
    ));

    let app = routes(AppState {
        classifier,
        workflow,
    });

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Book Assist listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
