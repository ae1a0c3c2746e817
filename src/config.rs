// ⚙️ Configuration - todo desde el entorno (+ .env opcional)
// Nada hardcodeado: token, credenciales y planilla llegan por variables.

use crate::expense::Schema;
use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CREDENTIALS_FILE: &str = "google_credentials.json";
pub const DEFAULT_APPEND_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;
pub const DEFAULT_WEBHOOK_ADDR: &str = "0.0.0.0:8080";

// ============================================================================
// TYPES
// ============================================================================

/// Where the service-account key comes from
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    File(PathBuf),
    /// Raw JSON, usually injected as a secret
    Inline(String),
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::File(path) => f.debug_tuple("File").field(path).finish(),
            CredentialsSource::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

/// Which spreadsheet to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetTarget {
    /// Name as it appears in Drive (resolved through the Drive API)
    Name(String),
    Id(String),
}

impl fmt::Display for SheetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetTarget::Name(name) => write!(f, "{}", name),
            SheetTarget::Id(id) => write!(f, "id:{}", id),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub bind_addr: SocketAddr,
    /// Public URL registered with Telegram (None = registered elsewhere)
    pub public_url: Option<String>,
    pub secret: Option<String>,
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("bind_addr", &self.bind_addr)
            .field("public_url", &self.public_url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub telegram_token: String,
    pub credentials: CredentialsSource,
    pub sheet: SheetTarget,
    /// Worksheet tab; None = first tab
    pub worksheet: Option<String>,
    pub schema: Schema,
    pub append_timeout: Duration,
    pub poll_timeout_secs: u32,
    pub webhook: WebhookConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"<redacted>")
            .field("credentials", &self.credentials)
            .field("sheet", &self.sheet)
            .field("worksheet", &self.worksheet)
            .field("schema", &self.schema)
            .field("append_timeout", &self.append_timeout)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("webhook", &self.webhook)
            .finish()
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        // .env es opcional; las variables reales del proceso ganan
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key → value lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let telegram_token = get("TELEGRAM_BOT_TOKEN")
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;

        let credentials = match get("GOOGLE_CREDENTIALS_JSON") {
            Some(json) => CredentialsSource::Inline(json),
            None => CredentialsSource::File(PathBuf::from(
                get("GOOGLE_CREDENTIALS_FILE")
                    .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string()),
            )),
        };

        let sheet = match (get("SPREADSHEET_ID"), get("SHEET_NAME")) {
            (Some(id), _) => SheetTarget::Id(id),
            (None, Some(name)) => SheetTarget::Name(name),
            (None, None) => bail!("either SHEET_NAME or SPREADSHEET_ID must be set"),
        };

        let schema = match get("EXPENSE_COLUMNS") {
            Some(raw) => raw
                .parse::<Schema>()
                .map_err(|e| anyhow!("EXPENSE_COLUMNS: {}", e))?,
            None => Schema::default(),
        };

        let append_timeout_secs: u64 = match get("APPEND_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("APPEND_TIMEOUT_SECS is not a number: {:?}", raw))?,
            None => DEFAULT_APPEND_TIMEOUT_SECS,
        };
        if append_timeout_secs == 0 {
            bail!("APPEND_TIMEOUT_SECS must be greater than zero");
        }

        let poll_timeout_secs: u32 = match get("POLL_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("POLL_TIMEOUT_SECS is not a number: {:?}", raw))?,
            None => DEFAULT_POLL_TIMEOUT_SECS,
        };

        let bind_raw = get("WEBHOOK_ADDR").unwrap_or_else(|| DEFAULT_WEBHOOK_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw
            .parse()
            .with_context(|| format!("WEBHOOK_ADDR is not a socket address: {:?}", bind_raw))?;

        Ok(Config {
            telegram_token,
            credentials,
            sheet,
            worksheet: get("WORKSHEET_NAME"),
            schema,
            append_timeout: Duration::from_secs(append_timeout_secs),
            poll_timeout_secs,
            webhook: WebhookConfig {
                bind_addr,
                public_url: get("WEBHOOK_URL"),
                secret: get("WEBHOOK_SECRET"),
            },
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
