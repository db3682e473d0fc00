// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! audiotag Telegram bot
//!
//! Watches the configured source channel and republishes re-tagged audio.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use audiotag::config::AppConfig;
use audiotag::telegram;
use audiotag::Result;

#[derive(Parser, Debug)]
#[command(name = "audiotag-bot")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.0.0")]
#[command(about = "Telegram channel auto-processor for audiotag")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Bot token (overrides config and TELEGRAM_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    config.apply_env()?;
    if let Some(token) = args.token {
        config.telegram.token = token;
    }

    let filter = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("audiotag bot v1.0.0");
    telegram::run_bot(config).await
}
