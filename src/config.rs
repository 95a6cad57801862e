use log::warn;
use std::path::PathBuf;

pub const DB_ENV: &str = "LADDER_DB";
/// Read by `env_logger` in the binary.
pub const LOG_ENV: &str = "LADDER_LOG";
pub const DUE_LIMIT_ENV: &str = "LADDER_DUE_LIMIT";

const DEFAULT_DB_NAME: &str = "ladder.db";
pub const DEFAULT_LOG_FILTER: &str = "warn";
const DEFAULT_DUE_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub due_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup(DB_ENV)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let due_limit = match lookup(DUE_LIMIT_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!("ignoring {}={:?}, using {}", DUE_LIMIT_ENV, raw, DEFAULT_DUE_LIMIT);
                    DEFAULT_DUE_LIMIT
                }
            },
            None => DEFAULT_DUE_LIMIT,
        };

        Self { db_path, due_limit }
    }

    /// Create the database's parent directory if it is missing.
    pub fn prepare_db_dir(&self) -> std::io::Result<()> {
        match self.db_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
            _ => Ok(()),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ladder")
        .join(DEFAULT_DB_NAME)
}
