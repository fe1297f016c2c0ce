use crate::bot::Bot;
use crate::config::Config;
use crate::omdb::OmdbClient;
use crate::pipeline::Pipeline;
use crate::telegram::{ChatApi, TelegramClient, Update, SECRET_TOKEN_HEADER};
use crate::yts::{MovieIndex, YtsClient};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use constant_time_eq::constant_time_eq;
use std::future::Future;
use std::time::Duration;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tokio::sync::Semaphore;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 1024 * 1024; // 1MB safety cap
const DEDUPE_TTL_SECS: i64 = 600; // 10 minutes
const MAX_CONCURRENT_JOBS: usize = 8;
const MAX_DEDUPE_ENTRIES: usize = 10_000;
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
    pub secret: String,
    pub recent_updates: Arc<Mutex<HashMap<i64, i64>>>,
    pub processing_sem: Arc<Semaphore>,
}

impl AppState {
    pub fn new(bot: Arc<Bot>, secret: String) -> Self {
        Self {
            bot,
            secret,
            recent_updates: Arc::new(Mutex::new(HashMap::new())),
            processing_sem: Arc::new(Semaphore::new(MAX_CONCURRENT_JOBS)),
        }
    }
}

/// Wires the index, optional ratings source and pipeline into a bot.
pub fn build_bot(config: &Config, chat: Arc<dyn ChatApi>) -> Result<Bot> {
    let index: Arc<dyn MovieIndex> =
        Arc::new(YtsClient::new(&config.yts_base_url, config.index_timeout)?);
    let mut pipeline = Pipeline::new(index, config.search.clone())
        .with_deadline(config.index_timeout + Duration::from_secs(1));
    if let Some(key) = &config.omdb_api_key {
        info!("OMDb ratings enabled");
        pipeline = pipeline.with_ratings(Arc::new(OmdbClient::new(
            key.clone(),
            config.index_timeout,
        )?));
    }
    info!(
        "Search settings: min rating {:.1}, max results {}, mode {:?}",
        config.search.min_rating, config.search.max_results, config.search.mode
    );
    Ok(Bot::new(pipeline, chat))
}

/// Runs until Ctrl+C / SIGTERM, receiving updates by webhook when a secret
/// is configured and by long polling otherwise.
pub async fn run(config: Config) -> Result<()> {
    let telegram = Arc::new(TelegramClient::new(&config.bot_token)?);
    let chat: Arc<dyn ChatApi> = telegram.clone();
    let bot = Arc::new(build_bot(&config, chat.clone())?);

    match &config.webhook {
        Some(webhook) => {
            if let Some(url) = &webhook.public_url {
                telegram
                    .set_webhook(url, &webhook.secret)
                    .await
                    .context("Failed to register Telegram webhook")?;
                info!("Registered webhook at {}", url);
            }
            let app = build_router(AppState::new(bot, webhook.secret.clone()));
            info!("Listening on {}", config.listen_addr);
            let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        None => {
            telegram
                .delete_webhook()
                .await
                .context("Failed to clear Telegram webhook before polling")?;
            info!("Polling Telegram for updates");
            run_polling(bot, chat.as_ref(), shutdown_signal()).await;
        }
    }
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/telegram", post(handle_telegram))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_telegram(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !verify_secret_token(&headers, &state.secret) {
        warn!("Webhook secret token verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let content_type_ok = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        == Some(true);
    if !content_type_ok {
        warn!(
            "Rejecting request: unsupported content-type {:?}",
            headers.get(header::CONTENT_TYPE)
        );
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!("Rejecting request: invalid update JSON: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if !dedupe_update(&state, update.update_id).await {
        return StatusCode::OK;
    }

    // Telegram only needs the 200; replies go out through the Bot API.
    let state_for_task = state.clone();
    tokio::spawn(async move {
        let _permit = match state_for_task.processing_sem.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => return,
        };
        state_for_task.bot.handle_update(update).await;
    });

    StatusCode::OK
}

/// Long-polls `getUpdates` until `shutdown` resolves. Updates are handled
/// on spawned tasks with the same concurrency cap as the webhook; in-flight
/// ones are awaited before returning.
pub async fn run_polling<S>(bot: Arc<Bot>, chat: &dyn ChatApi, shutdown: S)
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let processing_sem = Arc::new(Semaphore::new(MAX_CONCURRENT_JOBS));
    let mut offset = 0i64;
    loop {
        let batch = tokio::select! {
            _ = &mut shutdown => break,
            res = chat.get_updates(offset, POLL_TIMEOUT_SECS) => res,
        };
        match batch {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let permit = match processing_sem.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let bot = bot.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        bot.handle_update(update).await;
                    });
                }
            }
            Err(e) => {
                error!("getUpdates failed: {:#}", e);
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
            }
        }
    }
    // Every permit back means no update is still being handled.
    let _ = processing_sem.acquire_many(MAX_CONCURRENT_JOBS as u32).await;
    info!("Polling stopped");
}

fn verify_secret_token(headers: &HeaderMap, secret: &str) -> bool {
    let Some(token) = headers
        .get(SECRET_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    token.len() == secret.len() && constant_time_eq(token.as_bytes(), secret.as_bytes())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

async fn dedupe_update(state: &AppState, update_id: i64) -> bool {
    let now = Utc::now().timestamp();
    let mut guard = state.recent_updates.lock().await;
    guard.retain(|_, ts| now - *ts <= DEDUPE_TTL_SECS);
    if guard.len() > MAX_DEDUPE_ENTRIES {
        guard.clear();
    }
    if guard.contains_key(&update_id) {
        return false;
    }
    guard.insert(update_id, now);
    true
}
