//! Webhook transport: a TLS listener receiving pushed updates on a secret
//! path, registered with Telegram at startup.
//!
//! The path contains the bot token, which is the unguessable segment — any
//! request outside it is answered with 403 and never reaches the dispatcher.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use teloxide::{prelude::*, requests::Request, types::InputFile};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tdb_core::{config::WebhookConfig, dispatcher::Dispatcher, errors::Error, Result};

use crate::{certs, update::inbound_from_update};

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Serve the webhook listener until `shutdown` fires.
///
/// Registers `https://<host>:<port>/<token>/` with Telegram, uploading the
/// self-signed certificate, then accepts pushed updates on that path.
pub async fn run(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    token: &str,
    cfg: &WebhookConfig,
    work_dir: &Path,
    shutdown: CancellationToken,
) -> Result<()> {
    let (cert_path, key_path) = certs::get_or_create(work_dir, &cfg.host)?;

    let url = format!("https://{}:{}/{}/", cfg.host, cfg.port, token)
        .parse::<url::Url>()
        .map_err(|e| Error::Config(format!("invalid webhook url: {e}")))?;

    bot.delete_webhook()
        .send()
        .await
        .map_err(|e| Error::Transport(format!("failed to delete old webhook: {e}")))?;
    bot.set_webhook(url)
        .certificate(InputFile::file(cert_path.clone()))
        .send()
        .await
        .map_err(|e| Error::Transport(format!("failed to set webhook: {e}")))?;

    let app = router(dispatcher, token);
    let tls = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let handle = Handle::new();

    {
        let handle = handle.clone();
        let bot = bot.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            // Jobs still running may keep editing their ack messages; their
            // sends fail soft once the process exits.
            if let Err(e) = bot.delete_webhook().send().await {
                warn!(error = %e, "failed to remove webhook during shutdown");
            }
            handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });
    }

    info!(addr = %addr, "webhook listener starting");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    info!("webhook listener stopped");

    Ok(())
}

/// Build the router: POST on the secret path dispatches, anything else 403.
fn router(dispatcher: Arc<Dispatcher>, token: &str) -> Router {
    Router::new()
        .route(&format!("/{token}/"), post(handle_update))
        .fallback(forbidden)
        .method_not_allowed_fallback(forbidden)
        .with_state(AppState { dispatcher })
}

async fn handle_update(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let update: teloxide::types::Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "rejecting malformed webhook update");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Some(msg) = inbound_from_update(&update) {
        state.dispatcher.on_message(msg).await;
    }
    StatusCode::OK
}

async fn forbidden() -> StatusCode {
    StatusCode::FORBIDDEN
}
