use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Webhook listener settings. Presence selects webhook mode; absence selects
/// long polling. Fixed for the process lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    pub host: String,
    pub port: u16,
}

/// Typed runtime configuration, read from the environment (with `.env` file
/// support) once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub work_dir: PathBuf,
    pub webhook: Option<WebhookConfig>,

    // Rate limiting
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Job execution
    pub worker_count: usize,
    pub max_duration: Duration,
    pub max_filesize: u64,

    // Transport
    pub poll_timeout: Duration,

    // Fetch engine
    pub ytdlp_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let work_dir =
            PathBuf::from(env_str("WORK_DIR").unwrap_or_else(|| "/tmp/tdb-work".to_string()));
        fs::create_dir_all(&work_dir)?;

        let webhook = webhook_from(env_str("WEBHOOK_HOST"), env_str("WEBHOOK_PORT"))?;

        let rate_limit_requests = env_u32("RATE_LIMIT_REQUESTS").unwrap_or(5);
        let rate_limit_window =
            Duration::from_secs(60 * env_u64("RATE_LIMIT_WINDOW_MINUTES").unwrap_or(5));

        let worker_count = env_usize("WORKER_COUNT").unwrap_or(10);
        let max_duration = Duration::from_secs(env_u64("MAX_DURATION_SECS").unwrap_or(900));
        let max_filesize = env_u64("MAX_FILESIZE_BYTES").unwrap_or(50 * 1024 * 1024);
        let poll_timeout = Duration::from_secs(env_u64("POLL_TIMEOUT_SECS").unwrap_or(5));

        let ytdlp_path = env_path("YTDLP_PATH")
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        Ok(Self {
            bot_token,
            work_dir,
            webhook,
            rate_limit_requests,
            rate_limit_window,
            worker_count,
            max_duration,
            max_filesize,
            poll_timeout,
            ytdlp_path,
        })
    }
}

fn webhook_from(host: Option<String>, port: Option<String>) -> Result<Option<WebhookConfig>> {
    match (host.and_then(non_empty), port.and_then(non_empty)) {
        (None, None) => Ok(None),
        (Some(host), Some(port)) => {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("WEBHOOK_PORT is not a valid port: {port}")))?;
            Ok(Some(WebhookConfig { host, port }))
        }
        _ => Err(Error::Config(
            "WEBHOOK_HOST and WEBHOOK_PORT must be set together".to_string(),
        )),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_requires_both_host_and_port() {
        assert_eq!(webhook_from(None, None).unwrap(), None);
        assert_eq!(
            webhook_from(Some("bot.example.org".into()), Some("8443".into())).unwrap(),
            Some(WebhookConfig {
                host: "bot.example.org".into(),
                port: 8443,
            })
        );
        assert!(webhook_from(Some("bot.example.org".into()), None).is_err());
        assert!(webhook_from(None, Some("8443".into())).is_err());
    }

    #[test]
    fn webhook_port_must_parse() {
        assert!(webhook_from(Some("h".into()), Some("not-a-port".into())).is_err());
    }

    #[test]
    fn dotenv_sets_missing_keys_and_strips_quotes() {
        let pid = std::process::id();
        let path = PathBuf::from(format!("/tmp/tdb-dotenv-{pid}"));
        let key = format!("TDB_TEST_DOTENV_{pid}");
        fs::write(&path, format!("# comment\n{key}='quoted value'\n")).unwrap();

        load_dotenv_if_present(&path);
        assert_eq!(env::var(&key).unwrap(), "quoted value");

        env::remove_var(&key);
        let _ = fs::remove_file(&path);
    }
}
