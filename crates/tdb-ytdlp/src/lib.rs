//! yt-dlp adapter: implements the media-fetch port by driving the `yt-dlp`
//! CLI as a child process.
//!
//! Probing dumps the source metadata as JSON without downloading; fetching
//! downloads the best audio stream and extracts it to the requested codec,
//! printing the final file path and title for the caller.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;

use serde::Deserialize;

use tokio::process::Command;
use tracing::debug;

use tdb_core::fetch::{FetchError, FetchPolicy, FetchedMedia, MediaFetcher, ProbeInfo};

#[derive(Clone, Debug)]
pub struct YtDlpFetcher {
    bin: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ProbeDump {
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    title: Option<String>,
}

impl YtDlpFetcher {
    pub fn new(bin: PathBuf) -> Self {
        Self { bin }
    }

    async fn run(&self, args: &[String]) -> Result<String, FetchError> {
        debug!(bin = %self.bin.display(), ?args, "invoking yt-dlp");
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                FetchError::Other(format!("failed to spawn {}: {e}", self.bin.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, FetchError> {
        let args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            url.to_string(),
        ];
        let stdout = self.run(&args).await?;
        parse_probe(&stdout)
    }

    async fn fetch(&self, url: &str, policy: &FetchPolicy) -> Result<FetchedMedia, FetchError> {
        let mut args = Vec::new();
        if policy.no_playlist {
            args.push("--no-playlist".to_string());
        }
        args.extend([
            "-f".to_string(),
            "bestaudio".to_string(),
            "--max-filesize".to_string(),
            policy.max_bytes.to_string(),
            "-x".to_string(),
            "--audio-format".to_string(),
            policy.audio_codec.clone(),
            "-o".to_string(),
            policy.output_template.clone(),
            "--no-progress".to_string(),
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--print".to_string(),
            "after_move:title".to_string(),
            url.to_string(),
        ]);
        let stdout = self.run(&args).await?;
        parse_fetch_output(&stdout)
    }
}

/// Map yt-dlp stderr onto the fetch error taxonomy.
fn classify_stderr(stderr: &str) -> FetchError {
    if stderr.contains("Unsupported URL") || stderr.contains("is not a valid URL") {
        return FetchError::Unsupported;
    }
    if let Some(line) = stderr.lines().find(|l| l.starts_with("ERROR:")) {
        return FetchError::DownloadFailed(line.trim_start_matches("ERROR:").trim().to_string());
    }
    FetchError::Other(last_non_empty_line(stderr))
}

fn last_non_empty_line(s: &str) -> String {
    s.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("yt-dlp failed without output")
        .to_string()
}

fn parse_probe(stdout: &str) -> Result<ProbeInfo, FetchError> {
    let dump: ProbeDump = serde_json::from_str(stdout)
        .map_err(|e| FetchError::Other(format!("unreadable yt-dlp metadata: {e}")))?;

    // Live streams report no duration; treat that as zero rather than failing.
    let duration_secs = dump.duration.unwrap_or(0.0).max(0.0).round() as u64;
    Ok(ProbeInfo {
        duration_secs,
        title: dump.title,
    })
}

fn parse_fetch_output(stdout: &str) -> Result<FetchedMedia, FetchError> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let path = lines
        .next()
        .ok_or_else(|| FetchError::Other("yt-dlp reported no output file".to_string()))?;
    let local_path = PathBuf::from(path);

    let title = lines
        .next()
        .map(str::to_string)
        .or_else(|| {
            local_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "audio".to_string());

    Ok(FetchedMedia { local_path, title })
}
