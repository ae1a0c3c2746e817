// Gastos Bot - Core Library
// Telegram → parser → Google Sheets, shared by the polling and webhook binaries

pub mod expense;
pub mod config;
pub mod sheets;
pub mod telegram;
pub mod bot;
pub mod polling;
pub mod logging;

// Re-export commonly used types
pub use expense::{
    ExpenseRecord, ExpenseParser, Rejection, Schema,
    parse_expense, normalize_amount,
    DEFAULT_CATEGORY, DEFAULT_PLACE,
};
pub use config::{Config, CredentialsSource, SheetTarget, WebhookConfig};
pub use sheets::{RowAppender, SheetsClient, SheetsError, ServiceAccountKey, Worksheet};
pub use telegram::{Chat, Message, TelegramClient, TelegramError, Update, User};
pub use bot::{ExpenseBot, failure_reply};
pub use polling::{run_polling, shutdown_signal, InFlight};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open the configured worksheet: credentials → client → spreadsheet → tab.
///
/// Called once at startup; any error here is fatal.
pub async fn open_worksheet(config: &Config) -> Result<Worksheet, SheetsError> {
    let client = std::sync::Arc::new(SheetsClient::from_source(&config.credentials)?);
    tracing::info!(service_account = client.client_email(), "Google credentials loaded");
    client.open(&config.sheet, config.worksheet.as_deref()).await
}
