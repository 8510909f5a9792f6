use crate::error::AppError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Process-wide symmetric master key. Loaded once at startup, never
    /// rotated during a run.
    pub master_key: [u8; 32],
    /// Upper bound on system-scheme plaintext, in characters.
    pub max_plaintext_chars: usize,
    /// Upper bound on custom-scheme ciphertext, in decoded bytes.
    pub max_ciphertext_bytes: usize,
    /// Interval between scheduled-destroy sweeps.
    pub burn_sweep_interval: Duration,
    /// Maximum number of messages returned by one incremental fetch.
    pub fetch_batch_limit: i64,
}

const DEFAULT_MAX_PLAINTEXT_CHARS: usize = 500;
const DEFAULT_BURN_SWEEP_SECONDS: u64 = 30;
const DEFAULT_FETCH_BATCH_LIMIT: i64 = 50;

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let master_key_b64 = env::var("CHAT_ENCRYPTION_KEY")
            .map_err(|_| AppError::Config("CHAT_ENCRYPTION_KEY missing".into()))?;
        let master_key = decode_master_key(&master_key_b64)?;

        let max_plaintext_chars = env::var("CHAT_MAX_PLAINTEXT_CHARS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PLAINTEXT_CHARS);
        // Decoded-byte bound for custom-scheme ciphertext, 4x the plaintext bound.
        let max_ciphertext_bytes = env::var("CHAT_MAX_CIPHERTEXT_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(max_plaintext_chars * 4);

        let burn_sweep_interval = Duration::from_secs(
            env::var("CHAT_BURN_SWEEP_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BURN_SWEEP_SECONDS),
        );

        let fetch_batch_limit = env::var("CHAT_FETCH_BATCH_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FETCH_BATCH_LIMIT);

        Ok(Self {
            database_url,
            port,
            master_key,
            max_plaintext_chars,
            max_ciphertext_bytes,
            burn_sweep_interval,
            fetch_batch_limit,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3000,
            master_key: [0u8; 32],
            max_plaintext_chars: DEFAULT_MAX_PLAINTEXT_CHARS,
            max_ciphertext_bytes: DEFAULT_MAX_PLAINTEXT_CHARS * 4,
            burn_sweep_interval: Duration::from_secs(DEFAULT_BURN_SWEEP_SECONDS),
            fetch_batch_limit: DEFAULT_FETCH_BATCH_LIMIT,
        }
    }
}

fn decode_master_key(b64: &str) -> Result<[u8; 32], AppError> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|_| AppError::Config("CHAT_ENCRYPTION_KEY invalid base64".into()))?;
    if bytes.len() != 32 {
        return Err(AppError::Config(
            "CHAT_ENCRYPTION_KEY must decode to 32 bytes".into(),
        ));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
