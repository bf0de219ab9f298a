use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::{GatewayError, Result};

pub(super) fn header_map_from_pairs(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            GatewayError::Config(format!("invalid http header name {name:?}: {err}"))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            GatewayError::Config(format!("invalid http header value for {name:?}: {err}"))
        })?;
        out.insert(header_name, header_value);
    }
    Ok(out)
}

/// Builds the one client shared by every adapter and the content resolver.
///
/// No client-wide timeout is set: each outbound call carries its own deadline
/// via `RequestBuilder::timeout`, so a slow provider cannot borrow another
/// stage's budget.
pub fn build_http_client(
    connect_timeout: Duration,
    headers: &BTreeMap<String, String>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("svg-gateway/", env!("CARGO_PKG_VERSION")));
    if !headers.is_empty() {
        builder = builder.default_headers(header_map_from_pairs(headers)?);
    }
    builder.build().map_err(GatewayError::Http)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pairs_skip_blank_names() {
        let headers = BTreeMap::from([
            ("x-team".to_string(), "graphics".to_string()),
            ("  ".to_string(), "ignored".to_string()),
        ]);
        let map = header_map_from_pairs(&headers).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["x-team"], "graphics");
    }

    #[test]
    fn invalid_header_name_is_config_error() {
        let headers = BTreeMap::from([("bad header".to_string(), "v".to_string())]);
        let err = header_map_from_pairs(&headers).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
