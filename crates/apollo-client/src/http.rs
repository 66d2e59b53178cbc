//! Plain GET helpers shared by the directory and the engine.

use bytes::Bytes;
use reqwest::Client;

use crate::config::RetryPolicy;
use crate::error::{ClientError, ClientResult};

/// Single GET; any non-2xx status becomes [`ClientError::Status`].
pub(crate) async fn get_once(client: &Client, url: &str) -> ClientResult<Bytes> {
    let resp = client.get(url).send().await?;
    let status = resp.status();

    if !status.is_success() {
        return Err(ClientError::Status { status: status.as_u16(), url: url.to_string() });
    }

    Ok(resp.bytes().await?)
}

/// GET with a bounded, fixed-delay retry.
///
/// Only connection and read failures are retried; a non-success status is
/// returned on the first occurrence.
pub(crate) async fn get_with_retry(
    client: &Client,
    url: &str,
    policy: RetryPolicy,
) -> ClientResult<Bytes> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match get_once(client, url).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                tracing::info!(
                    "HTTP GET {} failed: {}, retrying in {:?} (attempt {}/{})",
                    url,
                    e,
                    policy.delay,
                    attempts,
                    max_attempts
                );
                tokio::time::sleep(policy.delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}
