//! Shared plumbing for the JSON-over-HTTP collaborators.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{Result, ToonError};

/// Build the HTTP client used by the image and similarity collaborators.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ToonError::from)
}

/// Read a response body, mapping non-success statuses to [`ToonError::Api`].
pub async fn read_json<T: DeserializeOwned>(service: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(ToonError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            retry_after_secs,
        });
    }

    trace!(service, bytes = bytes.len(), "Received response body");
    serde_json::from_slice(&bytes)
        .map_err(|e| ToonError::parse_error(e, &String::from_utf8_lossy(&bytes)))
}
