// 🧾 Expense Parser - Texto libre → fila de planilla
// "super 450 comida carrefour" → [fecha, descripción, monto, categoría, lugar]

use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Sólo dígitos, opcionalmente con decimales después de un punto (450, 12.50)
static AMOUNT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("amount pattern is valid"));

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_PLACE: &str = "N/A";

/// Longest field echoed back in a confirmation (Telegram caps messages at 4096)
pub const MAX_ECHO_CHARS: usize = 500;

// ============================================================================
// SCHEMA
// ============================================================================

/// Column layout of the target sheet.
///
/// One schema per deployment. The same token count means different things in
/// each layout, so messages are never parsed against both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    /// `[fecha, descripción, monto, categoría]`
    FourColumn,
    /// `[fecha, descripción, monto, categoría, lugar]`
    #[default]
    FiveColumn,
}

impl Schema {
    pub fn column_count(&self) -> usize {
        match self {
            Schema::FourColumn => 4,
            Schema::FiveColumn => 5,
        }
    }

    /// Format line shown to the user
    pub fn usage(&self) -> &'static str {
        match self {
            Schema::FourColumn => "descripcion monto [categoria]",
            Schema::FiveColumn => "descripcion monto [categoria] [lugar]",
        }
    }

    pub fn example(&self) -> &'static str {
        match self {
            Schema::FourColumn => "super 450 comida",
            Schema::FiveColumn => "super 450 comida carrefour",
        }
    }
}

impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "4" | "four" => Ok(Schema::FourColumn),
            "5" | "five" => Ok(Schema::FiveColumn),
            other => Err(format!("unknown column layout '{}' (expected 4 or 5)", other)),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column_count())
    }
}

// ============================================================================
// REJECTION
// ============================================================================

/// Why a message could not become an [`ExpenseRecord`].
///
/// `Display` is the exact reply sent back to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Mensaje vacío. Envía: {}\nEjemplo: {}", .0.usage(), .0.example())]
    EmptyMessage(Schema),

    #[error(
        "Error: formato inválido. Debes enviar al menos descripción y monto.\nEjemplo válido: {}",
        .0.example()
    )]
    TooFewTokens(Schema),

    #[error(
        "Monto inválido. Usa sólo dígitos o decimal con punto (ej: 450 o 12.50).\nEjemplo: {}",
        .schema.example()
    )]
    InvalidAmount { token: String, schema: Schema },

    #[error("No se pudo procesar el monto. Asegúrate de enviar números (ej: 450 o 12.50).")]
    UnprocessableAmount { token: String },
}

// ============================================================================
// EXPENSE RECORD
// ============================================================================

/// One parsed expense. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    date: NaiveDate,
    description: String,
    amount: String,
    category: String,
    place: Option<String>, // sólo en FiveColumn
}

impl ExpenseRecord {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Amount with exactly two fractional digits
    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn place(&self) -> Option<&str> {
        self.place.as_deref()
    }

    pub fn schema(&self) -> Schema {
        if self.place.is_some() {
            Schema::FiveColumn
        } else {
            Schema::FourColumn
        }
    }

    /// Ordered column values for the sheet
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.date.format("%Y-%m-%d").to_string(),
            self.description.clone(),
            self.amount.clone(),
            self.category.clone(),
        ];
        if let Some(place) = &self.place {
            row.push(place.clone());
        }
        row
    }

    /// Success reply echoing every field (long fields cut with "…")
    pub fn confirmation(&self) -> String {
        let mut text = format!(
            "Guardado ✅\nFecha: {}\nDescripción: {}\nMonto: {}\nCategoría: {}",
            self.date.format("%Y-%m-%d"),
            echo(&self.description),
            self.amount,
            echo(&self.category)
        );
        if let Some(place) = &self.place {
            text.push_str(&format!("\nLugar: {}", echo(place)));
        }
        text
    }
}

fn echo(field: &str) -> String {
    match field.char_indices().nth(MAX_ECHO_CHARS) {
        Some((cut, _)) => format!("{}…", &field[..cut]),
        None => field.to_string(),
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Parse a free-text message into an expense dated `today`.
///
/// Fields are assigned from the right: the last one to three tokens are
/// place/category/amount depending on the schema and token count, everything
/// before them is the description (re-joined with single spaces).
pub fn parse_expense(text: &str, schema: Schema, today: NaiveDate) -> Result<ExpenseRecord, Rejection> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    if tokens.is_empty() {
        return Err(Rejection::EmptyMessage(schema));
    }
    if tokens.len() < 2 {
        return Err(Rejection::TooFewTokens(schema));
    }

    let (description, amount_token, category, place) = match schema {
        Schema::FourColumn => {
            if tokens.len() == 2 {
                (tokens[0].to_string(), tokens[1], DEFAULT_CATEGORY, None)
            } else {
                let n = tokens.len();
                (tokens[..n - 2].join(" "), tokens[n - 2], tokens[n - 1], None)
            }
        }
        Schema::FiveColumn => match tokens.len() {
            2 => (tokens[0].to_string(), tokens[1], DEFAULT_CATEGORY, Some(DEFAULT_PLACE)),
            3 => (tokens[0].to_string(), tokens[1], tokens[2], Some(DEFAULT_PLACE)),
            n => (
                tokens[..n - 3].join(" "),
                tokens[n - 3],
                tokens[n - 2],
                Some(tokens[n - 1]),
            ),
        },
    };

    let amount = normalize_amount(amount_token, schema)?;

    Ok(ExpenseRecord {
        date: today,
        description,
        amount,
        category: category.to_string(),
        place: place.map(str::to_string),
    })
}

/// Validate the amount shape and render it with two decimals ("12.5" → "12.50")
pub fn normalize_amount(token: &str, schema: Schema) -> Result<String, Rejection> {
    if !AMOUNT_REGEX.is_match(token) {
        return Err(Rejection::InvalidAmount {
            token: token.to_string(),
            schema,
        });
    }

    // El regex garantiza la forma, pero un número con demasiados dígitos
    // no cabe en un Decimal de 96 bits.
    let mut value = Decimal::from_str(token)
        .map_err(|_| Rejection::UnprocessableAmount {
            token: token.to_string(),
        })?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(2);
    // rescale se queda corto sin avisar si la mantisa ×100 no cabe en 96 bits
    if value.scale() != 2 {
        return Err(Rejection::UnprocessableAmount {
            token: token.to_string(),
        });
    }

    Ok(value.to_string())
}

/// Parser bound to one schema and the local clock
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpenseParser {
    schema: Schema,
}

impl ExpenseParser {
    pub fn new(schema: Schema) -> Self {
        ExpenseParser { schema }
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    /// Parse using today's local date
    pub fn parse(&self, text: &str) -> Result<ExpenseRecord, Rejection> {
        self.parse_on(text, Local::now().date_naive())
    }

    pub fn parse_on(&self, text: &str, today: NaiveDate) -> Result<ExpenseRecord, Rejection> {
        parse_expense(text, self.schema, today)
    }
}

// ============================================================================
// TESTS
// ============================================================================
