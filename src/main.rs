use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use rental_scout::config::ScraperConfig;
use rental_scout::scheduler::ScrapeScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let run_once = std::env::args().skip(1).any(|arg| arg == "--once");

    let config = ScraperConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_BOT_TOKEN=...");
        eprintln!("  export MISTRAL_API_KEY=...");
        std::process::exit(1);
    });

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    eprintln!("🏠 Rental Scout v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {}", config.channel_name);
    eprintln!("   Model: {}", config.mistral_model);
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!(
        "   Schedule: every {} min, looking back {} min, max {} messages\n",
        config.scrape_interval.as_secs() / 60,
        config.lookback.as_secs() / 60,
        config.max_messages
    );

    let app = rental_scout::app::build(&config)
        .await
        .context("Failed to start Rental Scout")?;
    let (pipeline, store) = (app.pipeline, app.store);

    if run_once {
        let result = pipeline.run_cycle().await;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    // ── Scheduler ────────────────────────────────────────────────────────
    let scheduler = Arc::new(ScrapeScheduler::new(pipeline, config.scrape_interval));
    scheduler.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    scheduler.stop().await;

    let total = store.count_rentals().await?;
    info!(total, "Rental Scout stopped");
    Ok(())
}
