use std::sync::Arc;

use anyhow::Context;

use inbox_brain::api::api_routes;
use inbox_brain::config::AppConfig;
use inbox_brain::inbox::Inbox;
use inbox_brain::llm::{LlmConfig, ModelClient, create_provider};
use inbox_brain::pipeline::Orchestrator;
use inbox_brain::templates::TemplateStore;

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
    let llm_config = LlmConfig::from_env()?;
    let llm = create_provider(&llm_config)?;

    let templates = match &config.templates_path {
        Some(path) => TemplateStore::open(path.clone())
            .await
            .with_context(|| format!("Failed to load templates from {}", path.display()))?,
        None => TemplateStore::with_defaults(),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(Inbox::mock()),
        Arc::new(templates),
        ModelClient::new(llm, config.retry.clone()),
        config.pipeline.clone(),
    ));

    eprintln!("📬 Inbox Brain v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Model: {} (up to {:.0?} per call)",
        orchestrator.model_name(),
        config.retry.max_call_time()
    );
    eprintln!("   Labels: {}", config.pipeline.labels);
    match &config.templates_path {
        Some(path) => eprintln!("   Templates: {}", path.display()),
        None => eprintln!("   Templates: in memory"),
    }
    eprintln!("   API: http://0.0.0.0:{}/api/emails\n", config.http_port);

    // ── Initial triage ──────────────────────────────────────────────────
    for result in orchestrator.triage_all().await {
        match result {
            Ok(report) => {
                let email = orchestrator.inbox().get(report.email_id);
                let subject = email.map(|e| e.subject.as_str()).unwrap_or_default();
                eprintln!(
                    "   #{} [{} {:.0}%] {}",
                    report.email_id,
                    report.category.label,
                    report.category.confidence * 100.0,
                    subject
                );
                for action in &report.actions {
                    let due = action
                        .due_date
                        .map(|d| format!("due {d}, "))
                        .unwrap_or_default();
                    eprintln!("      - {} ({due}{})", action.description, action.priority);
                }
            }
            Err(failure) => eprintln!("   #{} failed: {}", failure.email_id, failure),
        }
    }

    let overview = orchestrator.overview().await;
    eprintln!(
        "\n   {} emails, {} categorized: {:?}",
        overview.stats.total, overview.stats.categorized, overview.stats.by_label
    );
    for recommendation in &overview.recommendations {
        eprintln!("   • {recommendation}");
    }
    eprintln!();

    // ── HTTP API ────────────────────────────────────────────────────────
    let app = api_routes(orchestrator);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "API server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
