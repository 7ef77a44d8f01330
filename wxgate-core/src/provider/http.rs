//! Request plumbing shared by every upstream adapter.
//!
//! Responses are decoded in two steps: first into a generic JSON value, then
//! into the adapter's own shape. A failure in the first step is a transport
//! problem, a failure in the second one is a mapping problem.

use std::time::Duration;

use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderError, Stage};

pub const DEFAULT_USER_AGENT: &str = concat!("wxgate/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(ProviderError::Client)
}

/// GET `url`, require a 200 and return the body as untyped JSON.
pub(crate) async fn fetch_json(
    http: &Client,
    url: &str,
    query: &[(&str, &str)],
    stage: Stage,
    cancel: &CancellationToken,
) -> Result<Value, ProviderError> {
    if cancel.is_cancelled() {
        return Err(ProviderError::Cancelled { stage });
    }

    let request = async {
        let res = http
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ProviderError::Transport { stage, source })?;

        let status = res.status();
        let body = res
            .bytes()
            .await
            .map_err(|source| ProviderError::Transport { stage, source })?;

        if status != StatusCode::OK {
            tracing::debug!(
                %url,
                status = status.as_u16(),
                body = %truncate_body(&String::from_utf8_lossy(&body)),
                "upstream returned non-200"
            );
            return Err(ProviderError::Status { stage, status: status.as_u16() });
        }

        serde_json::from_slice::<Value>(&body)
            .map_err(|source| ProviderError::MalformedBody { stage, source })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled { stage }),
        res = request => res,
    }
}

/// Second decoding step: map the generic envelope onto a concrete type.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, stage: Stage) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|source| ProviderError::Decode { stage, source })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
