//! Bounded fetch: every upstream call runs under a timeout and the
//! caller's cancellation token, and always resolves to a `Result`.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ApiError;

pub type FetchResult<T> = Result<T, ApiError>;

/// Upstream calls default to this bound when no config overrides it.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Run `fetch` under `timeout`, giving up early if `cancel` fires.
pub async fn bounded<T, F>(timeout: Duration, cancel: &CancellationToken, fetch: F) -> FetchResult<T>
where
    F: Future<Output = FetchResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        outcome = tokio::time::timeout(timeout, fetch) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        },
    }
}

/// Collapse a failed fetch to an empty value so callers merge "no new data".
pub fn or_empty<T: Default>(what: &str, result: FetchResult<T>) -> T {
    match result {
        Ok(data) => data,
        Err(e) if e.is_cancelled() => {
            debug!(fetch = what, "Fetch cancelled, discarding");
            T::default()
        }
        Err(e) => {
            warn!(fetch = what, error = %e, "Fetch failed, using empty result");
            T::default()
        }
    }
}
