use std::future::Future;
use std::time::Duration;

use crate::providers::traits::ProviderError;

/// Bounds a model call by `limit`, mapping expiry to [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
