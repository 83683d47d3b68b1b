use std::sync::Arc;
use std::time::Duration;

use riskradar::assistant::{AssistantClient, AssistantsApi, OpenAiAssistantsApi};
use riskradar::config::AppConfig;
use riskradar::session::{self, SessionController, SessionRegistry};
use riskradar::web::app_routes;

/// How often the idle-session sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

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

    let config = AppConfig::from_env()?;

    eprintln!("🦺 RiskRadar v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   UI: http://{}:{}/", config.bind_addr, config.port);
    eprintln!("   API base: {}", config.api_base);
    for profile in config.assistants.profiles() {
        eprintln!(
            "   Assistant: {} ({}){}",
            profile.label,
            profile.assistant_id,
            if profile.accepts_uploads { " [uploads]" } else { "" }
        );
    }
    eprintln!(
        "   Polling: every {}ms, max wait {}",
        config.client.poll_interval.as_millis(),
        config
            .client
            .max_wait
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "unbounded".to_string())
    );
    eprintln!(
        "   Default API key: {}\n",
        if config.default_api_key.is_some() { "from OPENAI_API_KEY" } else { "none (users must enter one)" }
    );

    let api: Arc<dyn AssistantsApi> = Arc::new(OpenAiAssistantsApi::new(config.api_base.clone()));
    let client = AssistantClient::new(api, config.client);

    let registry = SessionRegistry::new();
    let _sweep_handle = session::spawn_idle_sweep(
        Arc::clone(&registry),
        config.session_idle_timeout,
        SWEEP_INTERVAL,
    );

    let controller = Arc::new(SessionController::new(
        config.assistants.clone(),
        client,
        registry,
        config.default_api_key.clone(),
    ));

    let app = app_routes(controller);
    let listener = tokio::net::TcpListener::bind((config.bind_addr.as_str(), config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "RiskRadar server started");
    axum::serve(listener, app).await?;

    Ok(())
}
