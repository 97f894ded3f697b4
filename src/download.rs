use std::future::Future;
use std::time::Duration;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use teloxide::{DownloadError, RequestError};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("download failed: {0}")]
    Fatal(String),
}

impl From<RequestError> for FetchError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(after) => FetchError::RateLimited(after.duration()),
            RequestError::Network(err) => FetchError::Network(err.to_string()),
            RequestError::Io(err) => FetchError::Network(err.to_string()),
            other => FetchError::Fatal(other.to_string()),
        }
    }
}

impl From<DownloadError> for FetchError {
    fn from(err: DownloadError) -> Self {
        FetchError::Network(err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Единица экспоненциальной паузы: перед попыткой `n + 1` ждём `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Повторяет `op` по политике:
/// - `RateLimited(d)`: ждём `d` и пробуем снова, попытка не засчитывается;
/// - `Network`: экспоненциальная пауза, после `max_attempts` отдаём последнюю ошибку;
/// - `Fatal`: сразу наверх.
pub async fn fetch_with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(FetchError::RateLimited(wait)) => {
                warn!(wait_secs = wait.as_secs(), attempt, "download: rate limited");
                tokio::time::sleep(wait).await;
            }
            Err(FetchError::Network(reason)) => {
                if attempt >= policy.max_attempts {
                    warn!(attempt, %reason, "download: attempts exhausted");
                    return Err(FetchError::Network(reason));
                }
                let delay = policy.base_delay * 2u32.saturating_pow(attempt);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %reason,
                    "download: network error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(fatal) => return Err(fatal),
        }
    }
}

/// Скачивает файл Telegram в память.
pub async fn download_telegram_file(bot: &Bot, file_id: &FileId) -> Result<Vec<u8>, FetchError> {
    let file = bot.get_file(file_id.clone()).await?;
    let mut bytes = Vec::new();
    bot.download_file(&file.path, &mut bytes).await?;
    info!(size = bytes.len(), "download: file fetched");
    Ok(bytes)
}
