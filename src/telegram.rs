// 💬 Telegram Bot API - cliente mínimo sobre reqwest
// Sólo lo que el bot usa: getMe, getUpdates, sendMessage, set/deleteWebhook

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra time on top of the long-poll timeout before the HTTP call gives up
const LONG_POLL_MARGIN: Duration = Duration::from_secs(10);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram API error {code}: {description}")]
    Api {
        code: i64,
        description: String,
        retry_after: Option<u64>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TelegramError {
    /// Flood-control wait requested by Telegram, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TelegramError::Api {
                retry_after: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Command name for `/start`, `/help@MiBot args`, ... (without slash or bot suffix)
    pub fn command(&self) -> Option<&str> {
        let text = self.text.as_deref()?.trim_start();
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        Some(name.split('@').next().unwrap_or(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// `{ok, result, description, error_code, parameters}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, TelegramError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (ok, _) => Err(TelegramError::Api {
                code: self.error_code.unwrap_or(0),
                description: self.description.unwrap_or_else(|| {
                    if ok {
                        "response without result".to_string()
                    } else {
                        "no description".to_string()
                    }
                }),
                retry_after: self.parameters.and_then(|p| p.retry_after),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct GetUpdatesParams<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u32,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
}

#[derive(Debug, Serialize)]
struct ReplyParameters {
    message_id: i64,
    allow_sending_without_reply: bool,
}

#[derive(Debug, Serialize)]
struct SetWebhookParams<'a> {
    url: &'a str,
    allowed_updates: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct DeleteWebhookParams {
    drop_pending_updates: bool,
}

#[derive(Debug, Serialize)]
struct NoParams {}

const ALLOWED_UPDATES: &[&str] = &["message"];

// ============================================================================
// CLIENT
// ============================================================================

pub struct TelegramClient {
    http: Client,
    /// `https://api.telegram.org/bot<token>`; contains the secret
    base: String,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TelegramClient { token: <redacted> }")
    }
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(TelegramClient {
            http,
            base: format!("{}/bot{}", API_BASE, token),
        })
    }

    async fn call<P, T>(&self, method: &str, params: &P, timeout: Option<Duration>) -> Result<T, TelegramError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base, method))
            .json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Telegram answers errors with a JSON envelope and a 4xx/5xx status
        let envelope: Envelope<T> = request.send().await?.json().await?;
        envelope.into_result()
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &NoParams {}, None).await
    }

    /// Long-poll for new messages
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u32) -> Result<Vec<Update>, TelegramError> {
        let params = GetUpdatesParams {
            offset,
            timeout: timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let http_timeout = Duration::from_secs(u64::from(timeout_secs)) + LONG_POLL_MARGIN;
        self.call("getUpdates", &params, Some(http_timeout)).await
    }

    /// Send `text` to `chat_id`, as a reply to `reply_to` when given
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<Message, TelegramError> {
        let params = SendMessageParams {
            chat_id,
            text,
            reply_parameters: reply_to.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
        };
        self.call("sendMessage", &params, None).await
    }

    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<bool, TelegramError> {
        let params = SetWebhookParams {
            url,
            allowed_updates: ALLOWED_UPDATES,
            secret_token,
        };
        self.call("setWebhook", &params, None).await
    }

    /// Needed before polling: getUpdates fails while a webhook is registered
    pub async fn delete_webhook(&self) -> Result<bool, TelegramError> {
        self.call(
            "deleteWebhook",
            &DeleteWebhookParams {
                drop_pending_updates: false,
            },
            None,
        )
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(text: &str) -> Message {
        Message {
            message_id: 7,
            chat: Chat {
                id: 42,
                kind: "private".to_string(),
                username: None,
            },
            from: None,
            date: 0,
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_decode_updates_envelope() {
        let body = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 100,
                    "message": {
                        "message_id": 5,
                        "date": 1710460800,
                        "chat": {"id": 42, "type": "private", "first_name": "Ana"},
                        "from": {"id": 42, "is_bot": false, "first_name": "Ana", "language_code": "es"},
                        "text": "super 450 comida"
                    }
                },
                {"update_id": 101, "edited_message": {"message_id": 5}}
            ]
        }"#;

        let envelope: Envelope<Vec<Update>> = serde_json::from_str(body).unwrap();
        let updates = envelope.into_result().unwrap();

        assert_eq!(updates.len(), 2);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.chat.kind, "private");
        assert_eq!(message.text.as_deref(), Some("super 450 comida"));
        assert_eq!(message.from.as_ref().unwrap().first_name, "Ana");
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn test_decode_error_envelope() {
        let body = r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3","parameters":{"retry_after":3}}"#;
        let envelope: Envelope<Vec<Update>> = serde_json::from_str(body).unwrap();
        let err = envelope.into_result().unwrap_err();

        assert!(matches!(err, TelegramError::Api { code: 429, .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(err.to_string().contains("Too Many Requests"));
    }

    #[test]
    fn test_error_without_retry_after() {
        let body = r#"{"ok":false,"error_code":409,"description":"Conflict: terminated by other getUpdates request"}"#;
        let envelope: Envelope<Vec<Update>> = serde_json::from_str(body).unwrap();
        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_command_extraction() {
        assert_eq!(text_message("/start").command(), Some("start"));
        assert_eq!(text_message("/help@GastosBot extra").command(), Some("help"));
        assert_eq!(text_message("  /ayuda").command(), Some("ayuda"));
        assert_eq!(text_message("/").command(), Some(""));
        assert_eq!(text_message("super 450 comida").command(), None);

        let mut no_text = text_message("");
        no_text.text = None;
        assert_eq!(no_text.command(), None);
    }

    #[test]
    fn test_send_message_params() {
        let params = SendMessageParams {
            chat_id: 42,
            text: "Guardado ✅",
            reply_parameters: Some(ReplyParameters {
                message_id: 7,
                allow_sending_without_reply: true,
            }),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chat_id"], 42);
        assert_eq!(json["reply_parameters"]["message_id"], 7);

        let params = GetUpdatesParams {
            offset: None,
            timeout: 30,
            allowed_updates: ALLOWED_UPDATES,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("offset").is_none());
        assert_eq!(json["allowed_updates"], serde_json::json!(["message"]));
    }

    #[test]
    fn test_client_debug_hides_token() {
        let client = TelegramClient::new("123:very-secret").unwrap();
        assert!(!format!("{:?}", client).contains("very-secret"));
    }
}
