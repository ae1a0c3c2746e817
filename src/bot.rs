// 🤖 Expense Bot - mensaje → parseo → append → respuesta
// Todo error termina en una respuesta al usuario; nada se propaga fuera del handler.

use crate::expense::{ExpenseParser, Schema};
use crate::sheets::{RowAppender, SheetsError};
use crate::telegram::{Message, TelegramClient, Update};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handler for inbound messages.
///
/// The spreadsheet handle is injected once at construction and shared by
/// every message.
pub struct ExpenseBot<A: RowAppender> {
    appender: Arc<A>,
    parser: ExpenseParser,
    append_timeout: Duration,
}

impl<A: RowAppender> ExpenseBot<A> {
    pub fn new(appender: Arc<A>, schema: Schema, append_timeout: Duration) -> Self {
        ExpenseBot {
            appender,
            parser: ExpenseParser::new(schema),
            append_timeout,
        }
    }

    pub fn schema(&self) -> Schema {
        self.parser.schema()
    }

    /// Reply for `/start` and `/help`
    pub fn usage(&self) -> String {
        let schema = self.schema();
        format!(
            "Envía cada gasto en un mensaje:\n{}\nEjemplo: {}\nEl monto usa punto decimal (ej: 450 o 12.50).",
            schema.usage(),
            schema.example()
        )
    }

    /// Reply for one message, or None when the message is ignored
    /// (non-text, unknown commands).
    pub async fn respond(&self, message: &Message) -> Option<String> {
        let text = message.text.as_deref()?;

        if let Some(command) = message.command() {
            return match command {
                "start" | "help" => Some(self.usage()),
                other => {
                    debug!(command = other, chat_id = message.chat.id, "ignoring command");
                    None
                }
            };
        }

        Some(self.handle_text(text).await)
    }

    /// Parse, append and build the user-facing reply
    pub async fn handle_text(&self, text: &str) -> String {
        let record = match self.parser.parse(text) {
            Ok(record) => record,
            Err(rejection) => {
                debug!(reason = ?rejection, "message rejected");
                return rejection.to_string();
            }
        };

        let append = self.appender.append_row(record.to_row());
        let outcome = match tokio::time::timeout(self.append_timeout, append).await {
            Ok(result) => result,
            Err(_) => Err(SheetsError::Timeout(self.append_timeout)),
        };

        match outcome {
            Ok(()) => {
                info!(
                    target_sheet = %self.appender.label(),
                    amount = record.amount(),
                    category = record.category(),
                    "expense saved"
                );
                record.confirmation()
            }
            Err(err) => {
                error!(target_sheet = %self.appender.label(), error = %err, "append failed");
                failure_reply(&err)
            }
        }
    }

    /// Handle one update end to end: build the reply and send it back
    pub async fn dispatch(&self, telegram: &TelegramClient, update: Update) {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "update without message");
            return;
        };

        let Some(reply) = self.respond(&message).await else {
            return;
        };

        if let Err(err) = telegram
            .send_message(message.chat.id, &reply, Some(message.message_id))
            .await
        {
            warn!(chat_id = message.chat.id, error = %err, "could not send reply");
        }
    }
}

/// User-facing text for a failed append
pub fn failure_reply(err: &SheetsError) -> String {
    match err {
        SheetsError::SpreadsheetNotFound(name) => format!(
            "Error: la planilla '{}' no se encontró. Revisa el nombre del Sheet en la configuración.",
            name
        ),
        SheetsError::WorksheetNotFound { .. }
        | SheetsError::Api { .. }
        | SheetsError::Auth(_)
        | SheetsError::Credentials(_) => {
            "Error al acceder a Google Sheets (API). Revisa credenciales y permisos.".to_string()
        }
        SheetsError::Timeout(_) => {
            "Google Sheets tardó demasiado en responder. El gasto no se guardó; vuelve a enviarlo."
                .to_string()
        }
        SheetsError::Http(_) => "Error inesperado al guardar. Revisa los logs del bot.".to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
