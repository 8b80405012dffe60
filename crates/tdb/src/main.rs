use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tdb_core::{
    config::Config,
    dispatcher::Dispatcher,
    fetch::MediaFetcher,
    job::JobLimits,
    limiter::RateLimiter,
    messaging::port::MessagingPort,
    pool::WorkerPool,
};
use tdb_telegram::TelegramMessenger;
use tdb_ytdlp::YtDlpFetcher;

#[tokio::main]
async fn main() -> Result<(), tdb_core::Error> {
    tdb_core::logging::init("tdb")?;

    let cfg = Arc::new(Config::load()?);
    info!(work_dir = %cfg.work_dir.display(), "starting");

    let bot = Bot::new(cfg.bot_token.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let fetcher: Arc<dyn MediaFetcher> = Arc::new(YtDlpFetcher::new(cfg.ytdlp_path.clone()));

    let dispatcher = Arc::new(Dispatcher::new(
        messenger,
        fetcher,
        RateLimiter::new(cfg.rate_limit_requests, cfg.rate_limit_window),
        WorkerPool::new(cfg.worker_count),
        cfg.work_dir.clone(),
        JobLimits {
            max_duration: cfg.max_duration,
            max_bytes: cfg.max_filesize,
        },
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    match &cfg.webhook {
        Some(webhook) => {
            info!(host = %webhook.host, port = webhook.port, "webhook mode selected");
            tdb_telegram::webhook::run(
                bot,
                dispatcher,
                &cfg.bot_token,
                webhook,
                &cfg.work_dir,
                shutdown,
            )
            .await?;
        }
        None => {
            info!("long-poll mode selected");
            tdb_telegram::polling::run(bot, dispatcher, cfg.poll_timeout, shutdown).await;
        }
    }

    Ok(())
}
