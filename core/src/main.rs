/*
briefing_core - single-binary entrypoint for the fetch/enrich/brief
background pipelines. No HTTP surface lives here: the public trigger API,
auth and DTOs are an external collaborator's concern.
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::{init_db_pool, run_migrations, Config};
use tokio::sync::Notify;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use briefing_core::brief::BriefPipeline;
use briefing_core::enrich::EnrichPipeline;
use briefing_core::enricher::remote::RemoteEnricher;
use briefing_core::enricher::{Enricher, NoopEnricher, TrackingEnricher};
use briefing_core::fetch::fetchers::{
    email::EmailFetcher, reddit::RedditFetcher, rss::RssFetcher, web::WebFetcher, FetcherRegistry,
};
use briefing_core::fetch::FetchPipeline;
use briefing_core::mailer::{NoopMailer, ReportMailer};
use briefing_core::recovery;
use briefing_core::store::Store;
use briefing_core::webfetch::WebBodyFetcher;

#[derive(Parser, Debug)]
#[command(name = "briefing-core", about = "Fetch / enrich / brief background pipelines")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            return Err(anyhow::anyhow!("Config file not found: {}", p.display()));
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() { Some(p) } else { None }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    let db_path_abs = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path_abs, "resolved DB path");

    let pool = init_db_pool(&db_path_abs).await?;

    if config.admin.as_ref().and_then(|a| a.auto_migrate).unwrap_or(false) {
        info!("auto-migrate enabled, running migrations");
        run_migrations(&pool).await?;
    }

    let store = Store::new(pool);

    let enricher = build_enricher(&config, &store);
    let http_timeout = Duration::from_secs(config.http.fetch_timeout_sec);

    let registry = Arc::new(FetcherRegistry::new(
        RssFetcher::new(http_timeout),
        WebFetcher::new(http_timeout, enricher.clone(), config.fetch.web_body_max_chars),
        EmailFetcher,
        RedditFetcher::new(http_timeout, config.reddit.clone()),
    ));

    let webfetch = Arc::new(WebBodyFetcher::new(Duration::from_secs(5)));
    let mailer: Arc<dyn ReportMailer> = Arc::new(NoopMailer);

    let shutdown = Arc::new(Notify::new());

    let (fetch_pipeline, mut handles) =
        FetchPipeline::spawn(store.clone(), registry, config.fetch.clone(), shutdown.clone());

    let (enrich_pipeline, enrich_handles) = EnrichPipeline::spawn(
        store.clone(),
        enricher.clone(),
        webfetch,
        None,
        config.enrich.clone(),
        shutdown.clone(),
    );
    handles.extend(enrich_handles);

    let (brief_pipeline, brief_handles) =
        BriefPipeline::spawn(store.clone(), mailer, config.brief.clone(), shutdown.clone());
    handles.extend(brief_handles);

    let recovery_store = store.clone();
    let recovery_config = config.recovery.clone();
    let recovery_shutdown = shutdown.clone();
    let fetch_threshold = config.fetch.stuck_threshold_min;
    let enrich_threshold = config.enrich.stuck_threshold_min;
    let brief_threshold = config.brief.stuck_threshold_min;
    handles.push(tokio::spawn(async move {
        recovery::run(
            recovery_store,
            recovery_config,
            fetch_threshold,
            enrich_threshold,
            brief_threshold,
            recovery_shutdown,
        )
        .await;
    }));

    info!("briefing core started: fetch/enrich/brief pipelines and recovery sweep running");

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, signaling graceful shutdown");
    shutdown.notify_waiters();
    fetch_pipeline.queue.shut_down();
    enrich_pipeline.queue.shut_down();
    brief_pipeline.queue.shut_down();

    let grace = tokio::time::timeout(Duration::from_secs(30), async {
        for handle in handles {
            let _ = handle.await;
        }
    });
    if grace.await.is_err() {
        info!("shutdown grace period elapsed, exiting");
    }

    info!("shutdown complete");
    Ok(())
}

fn build_enricher(config: &Config, store: &Store) -> Arc<dyn Enricher> {
    let Some(llm) = &config.llm else {
        return Arc::new(NoopEnricher);
    };

    match llm.adapter.as_deref() {
        Some("remote") => {
            let Some(remote) = &llm.remote else {
                error!("llm.adapter = \"remote\" but no [llm.remote] section present");
                return Arc::new(NoopEnricher);
            };
            let api_key = remote
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .unwrap_or_default();
            let model = remote.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
            let api_url = remote
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
            let timeout = remote.timeout_seconds.unwrap_or(30);
            let max_tokens = remote.max_tokens.unwrap_or(800);

            let provider = RemoteEnricher::new(api_url, api_key, model.clone())
                .with_defaults(timeout, max_tokens, 0.3)
                .with_extraction_caps(config.enrich.max_web_extraction_items, config.enrich.max_email_extraction_items);

            Arc::new(TrackingEnricher::new(provider, store.clone(), model))
        }
        _ => Arc::new(NoopEnricher),
    }
}
