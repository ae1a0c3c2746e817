use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

use gastos_bot::{logging, open_worksheet, run_polling, Config, ExpenseBot, RowAppender, TelegramClient};

#[tokio::main]
async fn main() {
    logging::init();

    let args: Vec<String> = env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        None | Some("run") => run_bot().await,
        Some("check") => run_check().await,
        Some(other) => Err(anyhow::anyhow!(
            "unknown command '{}'. Usage: gastos-bot [run|check]",
            other
        )),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

/// Polling mode (default)
async fn run_bot() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;
    info!(schema = %config.schema, sheet = %config.sheet, "starting gastos-bot {}", gastos_bot::VERSION);

    // Sin planilla no arrancamos: el bot no sirve sin dónde guardar
    let worksheet = open_worksheet(&config)
        .await
        .context("Could not open Google Sheets")?;

    let telegram = Arc::new(TelegramClient::new(&config.telegram_token)?);
    let me = telegram
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;
    info!(
        bot = me.username.as_deref().unwrap_or(&me.first_name),
        target_sheet = %worksheet.label(),
        "bot ready"
    );

    let bot = Arc::new(ExpenseBot::new(
        Arc::new(worksheet),
        config.schema,
        config.append_timeout,
    ));

    run_polling(bot, telegram, config.poll_timeout_secs).await?;

    info!("bye");
    Ok(())
}

/// Verify configuration, Google access and the bot token, then exit
async fn run_check() -> Result<()> {
    println!("🔍 gastos-bot check");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = Config::from_env().context("Invalid configuration")?;
    println!("✓ Configuration loaded ({}-column schema)", config.schema);

    let worksheet = open_worksheet(&config)
        .await
        .context("Could not open Google Sheets")?;
    println!("✓ Worksheet: {} ({})", worksheet.label(), worksheet.spreadsheet_id());

    let telegram = TelegramClient::new(&config.telegram_token)?;
    let me = telegram.get_me().await.context("Telegram rejected the bot token")?;
    if !me.is_bot {
        bail!("token belongs to a user account, not a bot");
    }
    println!(
        "✓ Telegram bot: @{}",
        me.username.as_deref().unwrap_or(&me.first_name)
    );

    println!("\n✅ Ready to log expenses");
    Ok(())
}
