//! Browser header presets and per-request header overrides.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};

/// User-Agent matching the Chrome 112 TLS fingerprint.
pub const CHROME_112_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

/// Chrome 112 navigation headers used when a request carries no overrides.
pub fn chrome_112_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
        ("accept-language", "en,zh-CN;q=0.9,zh;q=0.8"),
        ("user-agent", CHROME_112_USER_AGENT),
    ]
}

/// Per-request options.
///
/// When `headers` is set it replaces the client's default header set
/// entirely; nothing is merged, so callers must include anything they still
/// want sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub headers: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    /// Options that replace the default headers with `headers`.
    pub fn with_headers<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: Some(
                headers
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

/// Pick the header set for one request: overrides if present, defaults otherwise.
pub fn resolve<'a>(
    defaults: &'a [(String, String)],
    opts: Option<&'a RequestOptions>,
) -> &'a [(String, String)] {
    match opts.and_then(|o| o.headers.as_deref()) {
        Some(custom) => custom,
        None => defaults,
    }
}

/// Build a `HeaderMap`, later entries replacing earlier ones with the same name.
pub fn to_header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| Error::configuration(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|e| {
            Error::configuration(format!("invalid header value for {}: {}", name, e))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Convert static headers to owned.
pub fn headers_to_owned(headers: Vec<(&'static str, &'static str)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
