// Gastos Bot - Webhook Server
// Telegram POSTea cada update acá en vez de que el bot haga polling

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use gastos_bot::{
    logging, open_worksheet, shutdown_signal, Config, ExpenseBot, InFlight, RowAppender, TelegramClient, Update,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared application state
struct AppState<A: RowAppender> {
    bot: Arc<ExpenseBot<A>>,
    telegram: Arc<TelegramClient>,
    secret: Option<String>,
    /// Replies still being worked on; drained before the process exits
    in_flight: InFlight,
}

impl<A: RowAppender> Clone for AppState<A> {
    fn clone(&self) -> Self {
        AppState {
            bot: Arc::clone(&self.bot),
            telegram: Arc::clone(&self.telegram),
            secret: self.secret.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /telegram - One update from Telegram.
///
/// Answers 200 right away; the reply is sent from a background task so a slow
/// append never makes Telegram redeliver the update.
async fn receive_update<A: RowAppender + 'static>(
    State(state): State<AppState<A>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(expected) = &state.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!(update_id = update.update_id, "webhook call with wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    debug!(update_id = update.update_id, "webhook update");
    let (bot, telegram) = (Arc::clone(&state.bot), Arc::clone(&state.telegram));
    state.in_flight.spawn(async move {
        bot.dispatch(&telegram, update).await;
    });

    StatusCode::OK
}

fn router<A: RowAppender + 'static>(state: AppState<A>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/telegram", post(receive_update::<A>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(err) = run().await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    info!(schema = %config.schema, sheet = %config.sheet, "starting gastos-webhook {}", gastos_bot::VERSION);

    let worksheet = open_worksheet(&config)
        .await
        .context("Could not open Google Sheets")?;
    info!(target_sheet = %worksheet.label(), "worksheet ready");

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token)?);

    match &config.webhook.public_url {
        Some(url) => {
            telegram
                .set_webhook(url, config.webhook.secret.as_deref())
                .await
                .context("Failed to register webhook with Telegram")?;
            info!(url = %url, "webhook registered");
        }
        None => info!("WEBHOOK_URL not set; assuming the webhook is registered elsewhere"),
    }

    let state = AppState {
        bot: Arc::new(ExpenseBot::new(
            Arc::new(worksheet),
            config.schema,
            config.append_timeout,
        )),
        telegram,
        secret: config.webhook.secret.clone(),
        in_flight: InFlight::new(),
    };
    let in_flight = state.in_flight.clone();

    let listener = tokio::net::TcpListener::bind(config.webhook.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.webhook.bind_addr))?;
    info!(addr = %config.webhook.bind_addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // axum ya no acepta requests; los appends en curso todavía tienen que terminar
    in_flight.drain().await;
    info!("stopped");

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
