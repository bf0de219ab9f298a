use bytes::Bytes;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::{GatewayError, Result};

pub(crate) const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
pub(crate) const MAX_RESPONSE_BODY_BYTES: usize = 32 * 1024 * 1024;

pub(crate) async fn response_text_truncated(
    response: reqwest::Response,
    max_bytes: usize,
) -> String {
    let (bytes, truncated) = response_bytes_truncated(response, max_bytes).await;
    let mut body = String::from_utf8_lossy(&bytes).to_string();
    if truncated {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str("...(truncated)");
    }
    body
}

async fn response_bytes_truncated(
    response: reqwest::Response,
    max_bytes: usize,
) -> (Vec<u8>, bool) {
    let max_bytes = max_bytes.max(1);
    let mut out = Vec::<u8>::new();
    let mut truncated = false;

    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let Ok(chunk) = next else {
            break;
        };
        let remaining = max_bytes.saturating_sub(out.len());
        if remaining == 0 {
            truncated = true;
            break;
        }
        if chunk.len() <= remaining {
            out.extend_from_slice(chunk.as_ref());
        } else {
            out.extend_from_slice(&chunk.as_ref()[..remaining]);
            truncated = true;
            break;
        }
    }
    (out, truncated)
}

/// Sends `req` and turns any non-2xx status into [`GatewayError::Api`]
/// tagged with `provider`. The upstream body is kept (truncated) for logs.
pub(crate) async fn send_checked(
    provider: &str,
    req: reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let response = req.send().await?;
    let status = response.status();
    tracing::debug!(provider, status = status.as_u16(), "upstream responded");
    if !status.is_success() {
        let body = response_text_truncated(response, MAX_ERROR_BODY_BYTES).await;
        tracing::warn!(provider, status = status.as_u16(), body = %body, "upstream error response");
        return Err(GatewayError::Api {
            provider: provider.to_string(),
            status,
            body,
        });
    }
    Ok(response)
}

pub(crate) async fn send_checked_json<T: DeserializeOwned>(
    provider: &str,
    req: reqwest::RequestBuilder,
) -> Result<T> {
    let bytes = send_checked_bytes(provider, req).await?;
    Ok(serde_json::from_slice::<T>(&bytes)?)
}

pub(crate) async fn send_checked_bytes(
    provider: &str,
    req: reqwest::RequestBuilder,
) -> Result<Bytes> {
    let response = send_checked(provider, req).await?;
    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BODY_BYTES as u64)
    {
        return Err(oversized_response(provider));
    }
    match response_bytes_capped(response, MAX_RESPONSE_BODY_BYTES).await? {
        Some(bytes) => Ok(bytes),
        None => Err(oversized_response(provider)),
    }
}

fn oversized_response(provider: &str) -> GatewayError {
    GatewayError::invalid_response(
        provider,
        format!("response exceeded max bytes ({MAX_RESPONSE_BODY_BYTES})"),
    )
}

/// Streams the body, giving up as soon as it grows past `max_bytes`
/// (`Ok(None)`). Chunk errors, deadline hits included, are returned as is.
pub(crate) async fn response_bytes_capped(
    response: reqwest::Response,
    max_bytes: usize,
) -> std::result::Result<Option<Bytes>, reqwest::Error> {
    let mut out = Vec::<u8>::new();
    let mut stream = response.bytes_stream();
    while let Some(next) = stream.next().await {
        let chunk = next?;
        if chunk.len() > max_bytes.saturating_sub(out.len()) {
            return Ok(None);
        }
        out.extend_from_slice(chunk.as_ref());
    }
    Ok(Some(Bytes::from(out)))
}
