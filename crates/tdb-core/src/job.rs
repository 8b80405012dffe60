use std::{path::PathBuf, sync::Arc, time::Duration};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    domain::{ChatId, MessageRef},
    fetch::{FetchError, FetchPolicy, MediaFetcher},
    messaging::port::MessagingPort,
};

/// Limits a job enforces before and while fetching.
#[derive(Clone, Copy, Debug)]
pub struct JobLimits {
    pub max_duration: Duration,
    pub max_bytes: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Unsupported,
    TooLong,
    Download,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    CheckingMetadata,
    Downloading,
    Uploading,
    Succeeded,
    Failed(FailureKind),
}

/// One link-to-audio conversion: metadata pre-check, fetch, upload, cleanup.
///
/// A job owns its ack message exclusively — all status edits for that message
/// come from this job, sequentially, so the transport observes them in order.
/// Failures are translated into a final status edit and never escape the job.
pub struct DownloadJob {
    pub id: Uuid,
    pub url: String,
    pub chat_id: ChatId,
    pub ack: MessageRef,
    pub work_dir: PathBuf,
    limits: JobLimits,
    status: JobStatus,
}

impl DownloadJob {
    pub fn new(
        url: String,
        chat_id: ChatId,
        ack: MessageRef,
        work_dir: PathBuf,
        limits: JobLimits,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            chat_id,
            ack,
            work_dir,
            limits,
            status: JobStatus::Pending,
        }
    }

    /// Output path template for the fetch engine. The job uuid keeps
    /// concurrent jobs in the same work directory from colliding.
    pub fn output_template(&self) -> String {
        format!("{}/%(title)s-{}.%(ext)s", self.work_dir.display(), self.id)
    }

    /// Drive the job to a terminal status, reporting progress by editing the
    /// ack message. Edits are best-effort: a failing edit is logged and the
    /// job carries on.
    pub async fn run(
        mut self,
        messenger: Arc<dyn MessagingPort>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> JobStatus {
        self.status = JobStatus::CheckingMetadata;

        let probe = match fetcher.probe(&self.url).await {
            Ok(p) => p,
            Err(e) => return self.fail_from_fetch(messenger.as_ref(), e, "probe").await,
        };

        if Duration::from_secs(probe.duration_secs) > self.limits.max_duration {
            info!(
                job = %self.id,
                duration = probe.duration_secs,
                "source exceeds the duration limit"
            );
            self.edit_status(messenger.as_ref(), "Source too long").await;
            self.status = JobStatus::Failed(FailureKind::TooLong);
            return self.status;
        }

        self.status = JobStatus::Downloading;
        self.edit_status(messenger.as_ref(), "Downloading").await;

        let policy = FetchPolicy {
            max_bytes: self.limits.max_bytes,
            audio_codec: "mp3".to_string(),
            no_playlist: true,
            output_template: self.output_template(),
        };

        let media = match fetcher.fetch(&self.url, &policy).await {
            Ok(m) => m,
            Err(e) => {
                let status = self.fail_from_fetch(messenger.as_ref(), e, "fetch").await;
                self.remove_job_files();
                return status;
            }
        };

        self.status = JobStatus::Uploading;
        self.edit_status(messenger.as_ref(), "Uploading").await;

        match messenger
            .send_audio(self.ack, &media.local_path, &media.title)
            .await
        {
            Ok(_) => {
                self.status = JobStatus::Succeeded;
            }
            Err(e) => {
                error!(job = %self.id, url = %self.url, error = %e, "audio upload failed");
                self.edit_status(messenger.as_ref(), "Unknown error").await;
                self.status = JobStatus::Failed(FailureKind::Unknown);
            }
        }

        if let Err(e) = std::fs::remove_file(&media.local_path) {
            warn!(
                job = %self.id,
                path = %media.local_path.display(),
                error = %e,
                "failed to remove produced file"
            );
        }
        self.remove_job_files();
        self.status
    }

    async fn fail_from_fetch(
        &mut self,
        messenger: &dyn MessagingPort,
        err: FetchError,
        stage: &str,
    ) -> JobStatus {
        let (text, kind) = match &err {
            FetchError::Unsupported => ("Unsupported URL", FailureKind::Unsupported),
            FetchError::DownloadFailed(_) => ("Download error", FailureKind::Download),
            FetchError::Other(_) => ("Unknown error", FailureKind::Unknown),
        };
        match kind {
            // The generic failure keeps its detail out of chat; operators get it here.
            FailureKind::Unknown => {
                error!(job = %self.id, url = %self.url, stage, error = %err, "job failed unexpectedly")
            }
            _ => warn!(job = %self.id, url = %self.url, stage, error = %err, "job failed"),
        }
        self.edit_status(messenger, text).await;
        self.status = JobStatus::Failed(kind);
        self.status
    }

    async fn edit_status(&self, messenger: &dyn MessagingPort, text: &str) {
        if let Err(e) = messenger.edit_text(self.ack, text).await {
            warn!(job = %self.id, error = %e, "failed to edit status message");
        }
    }

    /// Remove anything in the work directory carrying this job's uuid —
    /// partial downloads, intermediate transcode outputs.
    fn remove_job_files(&self) {
        let marker = self.id.to_string();
        let Ok(entries) = std::fs::read_dir(&self.work_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(&marker) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!(job = %self.id, file = %name, error = %e, "failed to remove job file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::MessageId;
    use crate::errors::Error;
    use crate::fetch::{FetchedMedia, ProbeInfo};

    #[derive(Clone, Debug, PartialEq)]
    enum Sent {
        Text(String),
        Edit(String),
        Audio { title: String },
    }

    #[derive(Default)]
    struct RecordingMessenger {
        calls: Mutex<Vec<Sent>>,
        fail_all: bool,
    }

    impl RecordingMessenger {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_all: true,
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_text(&self, _chat_id: ChatId, text: &str) -> crate::Result<MessageRef> {
            if self.fail_all {
                return Err(Error::Transport("offline".to_string()));
            }
            self.calls.lock().unwrap().push(Sent::Text(text.to_string()));
            Ok(MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(100),
            })
        }

        async fn edit_text(&self, _msg: MessageRef, text: &str) -> crate::Result<()> {
            if self.fail_all {
                return Err(Error::Transport("offline".to_string()));
            }
            self.calls.lock().unwrap().push(Sent::Edit(text.to_string()));
            Ok(())
        }

        async fn send_audio(
            &self,
            _reply_to: MessageRef,
            _file: &Path,
            title: &str,
        ) -> crate::Result<MessageRef> {
            if self.fail_all {
                return Err(Error::Transport("offline".to_string()));
            }
            self.calls.lock().unwrap().push(Sent::Audio {
                title: title.to_string(),
            });
            Ok(MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(101),
            })
        }
    }

    struct StubFetcher {
        probe_result: std::result::Result<ProbeInfo, FetchError>,
        fetch_result: std::result::Result<FetchedMedia, FetchError>,
        write_partial_to: Option<PathBuf>,
        fetch_calls: AtomicU32,
    }

    impl StubFetcher {
        fn new(
            probe_result: std::result::Result<ProbeInfo, FetchError>,
            fetch_result: std::result::Result<FetchedMedia, FetchError>,
        ) -> Self {
            Self {
                probe_result,
                fetch_result,
                write_partial_to: None,
                fetch_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for StubFetcher {
        async fn probe(&self, _url: &str) -> std::result::Result<ProbeInfo, FetchError> {
            self.probe_result.clone()
        }

        async fn fetch(
            &self,
            _url: &str,
            _policy: &FetchPolicy,
        ) -> std::result::Result<FetchedMedia, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(p) = &self.write_partial_to {
                std::fs::write(p, b"partial").unwrap();
            }
            self.fetch_result.clone()
        }
    }

    fn tmp_dir(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn limits() -> JobLimits {
        JobLimits {
            max_duration: Duration::from_secs(900),
            max_bytes: 50 * 1024 * 1024,
        }
    }

    fn job(work_dir: &Path) -> DownloadJob {
        DownloadJob::new(
            "https://example.com/video".to_string(),
            ChatId(1),
            MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(100),
            },
            work_dir.to_path_buf(),
            limits(),
        )
    }

    fn probe_ok(duration_secs: u64) -> std::result::Result<ProbeInfo, FetchError> {
        Ok(ProbeInfo {
            duration_secs,
            title: Some("My Song".to_string()),
        })
    }

    #[tokio::test]
    async fn successful_job_edits_in_order_and_removes_the_file() {
        let dir = tmp_dir("tdb-job-ok");
        let job = job(&dir);
        let produced = dir.join(format!("My Song-{}.mp3", job.id));
        std::fs::write(&produced, b"audio").unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let fetcher = Arc::new(StubFetcher::new(
            probe_ok(120),
            Ok(FetchedMedia {
                local_path: produced.clone(),
                title: "My Song".to_string(),
            }),
        ));

        let status = job.run(messenger.clone(), fetcher).await;

        assert_eq!(status, JobStatus::Succeeded);
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Edit("Downloading".to_string()),
                Sent::Edit("Uploading".to_string()),
                Sent::Audio {
                    title: "My Song".to_string()
                },
            ]
        );
        assert!(!produced.exists(), "produced file must be cleaned up");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn too_long_source_is_rejected_before_any_fetch() {
        let dir = tmp_dir("tdb-job-long");
        let messenger = Arc::new(RecordingMessenger::default());
        let fetcher = Arc::new(StubFetcher::new(
            probe_ok(1000),
            Err(FetchError::Other("fetch must not run".to_string())),
        ));

        let status = job(&dir).run(messenger.clone(), fetcher.clone()).await;

        assert_eq!(status, JobStatus::Failed(FailureKind::TooLong));
        assert_eq!(messenger.sent(), vec![Sent::Edit("Source too long".to_string())]);
        assert_eq!(fetcher.fetch_calls.load(Ordering::SeqCst), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn probing_the_same_url_twice_gives_the_same_decision() {
        let dir = tmp_dir("tdb-job-idem");
        let fetcher = Arc::new(StubFetcher::new(
            probe_ok(1000),
            Err(FetchError::Other("unused".to_string())),
        ));

        for _ in 0..2 {
            let messenger = Arc::new(RecordingMessenger::default());
            let status = job(&dir).run(messenger, fetcher.clone()).await;
            assert_eq!(status, JobStatus::Failed(FailureKind::TooLong));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unsupported_url_edits_and_stops() {
        let dir = tmp_dir("tdb-job-unsup");
        let messenger = Arc::new(RecordingMessenger::default());
        let fetcher = Arc::new(StubFetcher::new(
            Err(FetchError::Unsupported),
            Err(FetchError::Other("unused".to_string())),
        ));

        let status = job(&dir).run(messenger.clone(), fetcher).await;

        assert_eq!(status, JobStatus::Failed(FailureKind::Unsupported));
        assert_eq!(messenger.sent(), vec![Sent::Edit("Unsupported URL".to_string())]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn download_error_edits_and_removes_the_partial_file() {
        let dir = tmp_dir("tdb-job-dlerr");
        let job = job(&dir);
        let partial = dir.join(format!("My Song-{}.part", job.id));

        let messenger = Arc::new(RecordingMessenger::default());
        let mut fetcher = StubFetcher::new(
            probe_ok(120),
            Err(FetchError::DownloadFailed("403 from origin".to_string())),
        );
        fetcher.write_partial_to = Some(partial.clone());

        let status = job.run(messenger.clone(), Arc::new(fetcher)).await;

        assert_eq!(status, JobStatus::Failed(FailureKind::Download));
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Edit("Downloading".to_string()),
                Sent::Edit("Download error".to_string()),
            ]
        );
        assert!(!partial.exists(), "partial file must be cleaned up");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unexpected_failure_shows_a_generic_message() {
        let dir = tmp_dir("tdb-job-unk");
        let messenger = Arc::new(RecordingMessenger::default());
        let fetcher = Arc::new(StubFetcher::new(
            probe_ok(120),
            Err(FetchError::Other("ffmpeg exploded: SIGSEGV".to_string())),
        ));

        let status = job(&dir).run(messenger.clone(), fetcher).await;

        assert_eq!(status, JobStatus::Failed(FailureKind::Unknown));
        assert_eq!(
            messenger.sent(),
            vec![
                Sent::Edit("Downloading".to_string()),
                Sent::Edit("Unknown error".to_string()),
            ]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn transport_failures_never_panic_the_job() {
        let dir = tmp_dir("tdb-job-offline");
        let job = job(&dir);
        let produced = dir.join(format!("My Song-{}.mp3", job.id));
        std::fs::write(&produced, b"audio").unwrap();

        let messenger = Arc::new(RecordingMessenger::failing());
        let fetcher = Arc::new(StubFetcher::new(
            probe_ok(120),
            Ok(FetchedMedia {
                local_path: produced.clone(),
                title: "My Song".to_string(),
            }),
        ));

        // Every send/edit fails; the job still reaches a terminal status and
        // still cleans up after itself.
        let status = job.run(messenger, fetcher).await;
        assert_eq!(status, JobStatus::Failed(FailureKind::Unknown));
        assert!(!produced.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn output_templates_are_unique_per_job() {
        let dir = tmp_dir("tdb-job-templates");
        let a = job(&dir);
        let b = job(&dir);
        assert_ne!(a.output_template(), b.output_template());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
