use may_minihttp::Request;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, info};

/// Parsed HTTP request data used by `AppService`.
///
/// The body is fully buffered here; per-route decoding (JSON, multipart)
/// happens later, once a route has been matched.
#[derive(Debug, PartialEq)]
pub struct ParsedRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Request path with the query string stripped.
    pub path: String,
    /// Original request target, kept for the access log.
    pub raw_path: String,
    /// Protocol version as `<major>.<minor>`.
    pub http_version: String,
    /// HTTP headers (lowercase keys).
    pub headers: HashMap<String, String>,
    /// Parsed cookies from the Cookie header.
    pub cookies: HashMap<String, String>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Remote address for the access log. The transport does not expose the
    /// peer address, so this is the first `X-Forwarded-For` entry or `-`.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        self.headers
            .get("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("-")
    }

    #[must_use]
    pub fn referer(&self) -> &str {
        self.headers.get("referer").map(String::as_str).unwrap_or("")
    }
}

/// Split the Cookie header into name/value pairs.
pub fn parse_cookies(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .get("cookie")
        .map(|c| {
            c.split(';')
                .filter_map(|pair| {
                    let mut parts = pair.trim().splitn(2, '=');
                    let name = parts.next()?.trim().to_string();
                    let value = parts.next().unwrap_or("").trim().to_string();
                    Some((name, value))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn normalize_version(raw: &str) -> String {
    match raw.trim_start_matches("HTTP/") {
        "0" => "1.0".to_string(),
        "1" => "1.1".to_string(),
        other => other.to_string(),
    }
}

/// Extract method, path, headers, cookies, and the buffered body from a
/// `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req.method().to_string();
    let raw_path = req.path().to_string();
    let path = raw_path.split('?').next().unwrap_or("/").to_string();
    let http_version = normalize_version(&format!("{:?}", req.version()));

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    debug!(
        header_count = headers.len(),
        header_names = ?headers.keys().take(20).collect::<Vec<_>>(),
        "Headers extracted"
    );

    let cookies = parse_cookies(&headers);

    let mut body = Vec::new();
    if let Ok(size) = req.body().read_to_end(&mut body) {
        if size > 0 {
            debug!(body_size_bytes = size, "Request body read");
        }
    }

    info!(
        method = %method,
        path = %path,
        http_version = %http_version,
        "HTTP request parsed"
    );

    ParsedRequest {
        method,
        path,
        raw_path,
        http_version,
        headers,
        cookies,
        body,
    }
}
