//! Club Kdrama Bot - Entry Point

use clubkdrama_bot::{Config, LogFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Club Kdrama Bot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: clubkdrama-bot");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN         Telegram bot token (required)");
        println!("  DATABASE_URL               sqlite://<path> of the catalog (required)");
        println!("  CATALOG_QUERY_TIMEOUT_MS   Bound on each catalog query (default: 5000)");
        println!("  AIRING_CACHE_TTL_SECS      Airing list cache TTL, 0 disables (default: 60)");
        println!("  RATE_LIMIT_PER_MINUTE      Messages per user per minute, 0 disables (default: 20)");
        println!("  CHANNEL_URL, CHAT_URL      Links shown by the Channel/Chat buttons");
        println!("  LOG_FORMAT                 pretty | json (default: pretty)");
        println!("  RUST_LOG                   Log filter (default: info)");
        return Ok(());
    }

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .json()
            .init(),
    }

    info!("Club Kdrama Bot v{}", env!("CARGO_PKG_VERSION"));
    clubkdrama_bot::telegram::run_telegram_bot(config).await?;

    Ok(())
}
