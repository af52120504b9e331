use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded once at startup from the environment plus an
/// optional `.env` file.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub bot_token: String,
    /// The single operator allowed to drive the bot.
    pub operator_id: i64,

    // Corpus
    pub corpus_dir: PathBuf,
    /// Name of the source the merge operation writes.
    pub merged_source: String,

    // Workers. Paths arrive platform-qualified (suffix on Windows,
    // unqualified elsewhere); the core never computes this.
    pub fetcher_path: PathBuf,
    pub attachment_fetcher_path: PathBuf,

    // Persisted state
    pub channel_id_file: PathBuf,
    pub keywords_file: PathBuf,
    pub default_channel_id: i64,

    // Transfer + retry policy
    pub large_transfer_threshold: u64,
    pub rename_retries: u32,
    pub rename_retry_delay: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let operator_id = env_i64("OPERATOR_ID").ok_or_else(|| {
            Error::Config("OPERATOR_ID environment variable is required".to_string())
        })?;

        let corpus_dir = env_path("CORPUS_DIR").unwrap_or_else(|| PathBuf::from("worker"));
        let merged_source = env_str("MERGED_SOURCE")
            .and_then(non_empty)
            .unwrap_or_else(|| "result".to_string());

        let fetcher_path =
            env_path("FETCHER_PATH").unwrap_or_else(|| default_worker_path("FileFetcher"));
        let attachment_fetcher_path = env_path("ATTACHMENT_FETCHER_PATH")
            .unwrap_or_else(|| default_worker_path("AttachmentFetcher"));

        let channel_id_file =
            env_path("CHANNEL_ID_FILE").unwrap_or_else(|| PathBuf::from("channel_id"));
        let keywords_file =
            env_path("KEYWORDS_FILE").unwrap_or_else(|| PathBuf::from("keywords.json"));
        let default_channel_id = env_i64("DEFAULT_CHANNEL_ID").unwrap_or(0);

        let large_transfer_threshold = env_u64("LARGE_TRANSFER_MB").unwrap_or(50) * 1024 * 1024;
        let rename_retries = env_u32("RENAME_RETRIES").unwrap_or(5);
        let rename_retry_delay =
            Duration::from_millis(env_u64("RENAME_RETRY_DELAY_MS").unwrap_or(1000));

        fs::create_dir_all(&corpus_dir)?;

        Ok(Self {
            bot_token,
            operator_id,
            corpus_dir,
            merged_source,
            fetcher_path,
            attachment_fetcher_path,
            channel_id_file,
            keywords_file,
            default_channel_id,
            large_transfer_threshold,
            rename_retries,
            rename_retry_delay,
        })
    }
}

fn default_worker_path(name: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(format!("{name}.exe"))
    } else {
        PathBuf::from(format!("./{name}"))
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

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
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
