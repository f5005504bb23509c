mod api;
mod attempt_log;
#[allow(unused_imports)]
mod db;
mod delivery;
mod generator;
mod manager;
mod model;
mod plagiarism;
mod store;
#[cfg(test)]
mod test_utils;
mod upstream;
mod worker;

use crate::delivery::{HttpResultSink, ResultSink};
use crate::generator::LlmFeedbackGenerator;
use crate::manager::{LifecycleManager, RetryPolicy};
use crate::plagiarism::HttpPlagiarismScorer;
use crate::store::FeedbackStore;
use crate::worker::{Dispatcher, DispatcherConfig};
use anyhow::{Context, bail};
use env_logger::Env;
use log::{LevelFilter, error, info};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use serde::Deserialize;
use std::future::IntoFuture;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_redoc::{Redoc, Servable};

fn get_default_port() -> u16 {
    8080
}

fn get_default_max_attempts() -> i32 {
    3
}

fn get_default_service_timeout_secs() -> u64 {
    120
}

fn get_default_max_concurrent() -> usize {
    5
}

fn get_default_poll_interval_secs() -> u64 {
    10
}

fn get_default_stalled_after_secs() -> u64 {
    900
}

fn get_default_archive_after_days() -> u64 {
    30
}

fn get_default_true() -> bool {
    true
}

#[derive(Deserialize, Debug)]
struct Config {
    database_url: String,
    plagiarism_url: String,
    llm_base_url: String,
    openai_api_key: String,
    delivery_url: Option<String>,
    #[serde(default = "get_default_port")]
    port: u16,
    #[serde(default = "get_default_max_attempts")]
    max_attempts: i32,
    #[serde(default = "get_default_service_timeout_secs")]
    service_timeout_secs: u64,
    #[serde(default = "get_default_max_concurrent")]
    max_concurrent: usize,
    #[serde(default = "get_default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default = "get_default_true")]
    auto_retry: bool,
    #[serde(default = "get_default_stalled_after_secs")]
    stalled_after_secs: u64,
    #[serde(default = "get_default_archive_after_days")]
    archive_after_days: u64,
    #[serde(default = "get_default_true")]
    run_migrations: bool,
}

#[derive(Clone)]
struct AppState {
    manager: Arc<LifecycleManager>,
}

#[derive(OpenApi)]
#[openapi(info(
    description = "API for plagiarism scoring and LLM feedback on student submissions"
))]
struct ApiDoc;

async fn run() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = envy::from_env::<Config>()?;

    let mut opt = ConnectOptions::new(&config.database_url);
    opt.sqlx_logging_level(LevelFilter::Debug);

    let db = Database::connect(opt).await?;
    if config.run_migrations {
        Migrator::up(&db, None).await?;
    }

    let client = reqwest::Client::new();
    let sink = match &config.delivery_url {
        Some(url) => Some(Arc::new(HttpResultSink::new(client.clone(), url.parse()?))
            as Arc<dyn ResultSink>),
        None => None,
    };
    let manager = Arc::new(LifecycleManager::new(
        FeedbackStore::new(db),
        Arc::new(HttpPlagiarismScorer::new(
            client.clone(),
            config.plagiarism_url.parse()?,
        )),
        Arc::new(LlmFeedbackGenerator::new(
            client,
            config.llm_base_url.clone(),
            config.openai_api_key.clone(),
        )),
        sink,
        RetryPolicy {
            max_attempts: config.max_attempts,
            service_timeout: Duration::from_secs(config.service_timeout_secs),
            auto_retry: config.auto_retry,
        },
    ));

    let dispatcher = Dispatcher::new(
        manager.clone(),
        DispatcherConfig {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_concurrent: config.max_concurrent,
            stalled_after: Duration::from_secs(config.stalled_after_secs),
            archive_after: Duration::from_secs(config.archive_after_days * 24 * 3600),
        },
    )
    .context("invalid dispatcher configuration")?;
    let dispatcher = tokio::spawn(dispatcher.run());

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(api::submit, api::list))
        .routes(routes!(api::get))
        .routes(routes!(api::status))
        .routes(routes!(api::process))
        .routes(routes!(api::retry))
        .routes(routes!(api::archive))
        .split_for_parts();

    info!("Starting on port {}", config.port);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let server = axum::serve(
        listener,
        router
            .merge(Redoc::with_url("/redoc", api))
            .with_state(AppState { manager }),
    )
    .into_future();

    tokio::select! {
        res = server => res?,
        res = dispatcher => {
            res.context("dispatcher crashed")?;
            bail!("dispatcher stopped");
        }
    }

    Ok(())
}

fn main() {
    let rt = tokio::runtime::Runtime::new().unwrap();

    if let Err(err) = rt.block_on(run()) {
        error!("{}", err);
        exit(1)
    }
}
