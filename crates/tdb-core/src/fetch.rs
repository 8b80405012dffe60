use std::path::PathBuf;

use async_trait::async_trait;

/// Why a probe or fetch failed, as far as the job boundary cares.
///
/// `Unsupported` and `DownloadFailed` become user-visible status edits;
/// `Other` is surfaced to the user as a generic failure and logged with
/// detail for operators.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("unsupported url")]
    Unsupported,

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("{0}")]
    Other(String),
}

/// Source metadata resolved without downloading anything.
#[derive(Clone, Debug)]
pub struct ProbeInfo {
    pub duration_secs: u64,
    pub title: Option<String>,
}

/// Constraints for one fetch.
#[derive(Clone, Debug)]
pub struct FetchPolicy {
    pub max_bytes: u64,
    pub audio_codec: String,
    pub no_playlist: bool,
    /// Output path template. Must be unique per job so concurrent fetches
    /// into the same work directory never collide.
    pub output_template: String,
}

/// A completed fetch: the produced local file and the source's title.
#[derive(Clone, Debug)]
pub struct FetchedMedia {
    pub local_path: PathBuf,
    pub title: String,
}

/// Media-fetch engine port.
///
/// `probe` resolves a URL to metadata without downloading; `fetch` produces
/// a local audio file under the given policy.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn probe(&self, url: &str) -> std::result::Result<ProbeInfo, FetchError>;

    async fn fetch(
        &self,
        url: &str,
        policy: &FetchPolicy,
    ) -> std::result::Result<FetchedMedia, FetchError>;
}
