use std::{path::PathBuf, sync::Arc};

use regex::Regex;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    domain::InboundMessage,
    fetch::MediaFetcher,
    job::{DownloadJob, JobLimits},
    limiter::{Admission, RateLimiter},
    messaging::port::MessagingPort,
    pool::WorkerPool,
};

const FALLBACK_REPLY: &str = "Send me a link";
const ACK_REPLY: &str = "Link detected, processing";

/// Routes inbound messages: URL-ish texts go down the download path,
/// everything else gets the fallback reply.
///
/// Safe to invoke concurrently from multiple transports — the only mutable
/// state is the rate limiter, which sits behind a mutex. The dispatcher never
/// touches the filesystem; that is the jobs' business.
pub struct Dispatcher {
    messenger: Arc<dyn MessagingPort>,
    fetcher: Arc<dyn MediaFetcher>,
    limiter: Mutex<RateLimiter>,
    pool: WorkerPool,
    work_dir: PathBuf,
    limits: JobLimits,
    link_re: Regex,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        fetcher: Arc<dyn MediaFetcher>,
        limiter: RateLimiter,
        pool: WorkerPool,
        work_dir: PathBuf,
        limits: JobLimits,
    ) -> Self {
        Self {
            messenger,
            fetcher,
            limiter: Mutex::new(limiter),
            pool,
            work_dir,
            limits,
            link_re: Regex::new(r"https?://\S+\.\S+").expect("valid regex"),
        }
    }

    pub async fn on_message(&self, msg: InboundMessage) {
        if !self.link_re.is_match(&msg.text) {
            if let Err(e) = self.messenger.send_text(msg.chat_id, FALLBACK_REPLY).await {
                warn!(chat = msg.chat_id.0, error = %e, "failed to send fallback reply");
            }
            return;
        }

        // Rate limit before any heavy work.
        let admission = self.limiter.lock().await.admit(msg.user_id);
        if let Admission::Limited { retry_after } = admission {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            let reply = format!("Rate limited. Try again in {secs} seconds");
            if let Err(e) = self.messenger.send_text(msg.chat_id, &reply).await {
                warn!(chat = msg.chat_id.0, error = %e, "failed to send rate-limit reply");
            }
            return;
        }

        let ack = match self.messenger.send_text(msg.chat_id, ACK_REPLY).await {
            Ok(r) => r,
            Err(e) => {
                warn!(chat = msg.chat_id.0, error = %e, "failed to acknowledge link message");
                return;
            }
        };

        let job = DownloadJob::new(
            msg.text.clone(),
            msg.chat_id,
            ack,
            self.work_dir.clone(),
            self.limits,
        );
        info!(job = %job.id, user = msg.user_id.0, "download job queued");

        let messenger = self.messenger.clone();
        let fetcher = self.fetcher.clone();
        self.pool.submit(async move {
            job.run(messenger, fetcher).await;
        });
    }
}
