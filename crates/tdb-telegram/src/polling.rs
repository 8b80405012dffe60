//! Long-poll transport: repeatedly drains `getUpdates` and feeds the
//! dispatcher, until cancelled.

use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;
use teloxide::requests::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tdb_core::dispatcher::Dispatcher;

use crate::update::inbound_from_update;

/// Run the poll loop until `shutdown` fires.
///
/// The poll timeout bounds shutdown latency: cancellation is observed at the
/// next iteration boundary, and an in-flight poll returns within the timeout.
pub async fn run(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    poll_timeout: Duration,
    shutdown: CancellationToken,
) {
    // A webhook left over from a previous run blocks getUpdates.
    if let Err(e) = bot.delete_webhook().send().await {
        warn!(error = %e, "failed to delete stale webhook");
    }

    let timeout_secs = poll_timeout.as_secs().min(u64::from(u32::MAX)) as u32;
    let mut offset: i32 = 0;

    info!("long polling started");
    loop {
        let poll = bot.get_updates().offset(offset).timeout(timeout_secs).send();

        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = poll => match res {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.id + 1);
                        match inbound_from_update(&update) {
                            Some(msg) => dispatcher.on_message(msg).await,
                            None => debug!(update = update.id, "ignoring non-message update"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "poll failed; backing off");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            },
        }
    }
    info!("long polling stopped");
}
