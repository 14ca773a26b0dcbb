//! Access logging.
//!
//! One fixed-format line per completed exchange, recorded at the moment the
//! final response is written - after internal redirects have settled, with
//! the final status code. The sink is pluggable; the default forwards to
//! `tracing`.
//!
//! Line format:
//! `<remoteAddr> - [<RFC1123 date>] - "<METHOD> <path> HTTP/<maj>.<min>" - <status> - "<referer>"`

use super::request::ParsedRequest;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Single-argument logging function invoked once per completed response.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct AccessLog {
    sink: LogSink,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self {
            sink: Arc::new(|line| info!(target: "basehttp::access", "{line}")),
        }
    }
}

impl AccessLog {
    #[must_use]
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    pub fn record(&self, parsed: &ParsedRequest, status: u16) {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        let line = format!(
            "{} - [{}] - \"{} {} HTTP/{}\" - {} - \"{}\"",
            parsed.remote_addr(),
            date,
            parsed.method,
            parsed.raw_path,
            parsed.http_version,
            status,
            parsed.referer(),
        );
        (self.sink)(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn sample_request() -> ParsedRequest {
        let mut headers = HashMap::new();
        headers.insert("referer".to_string(), "http://example.com/".to_string());
        headers.insert("x-forwarded-for".to_string(), "10.1.2.3".to_string());
        ParsedRequest {
            method: "GET".to_string(),
            path: "/pets".to_string(),
            raw_path: "/pets?limit=2".to_string(),
            http_version: "1.1".to_string(),
            headers,
            cookies: HashMap::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_line_format() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let log = AccessLog::new(Arc::new(move |line| {
            captured.lock().unwrap().push(line.to_string());
        }));
        log.record(&sample_request(), 404);
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with("10.1.2.3 - ["));
        assert!(line.ends_with("\"GET /pets?limit=2 HTTP/1.1\" - 404 - \"http://example.com/\""));
    }
}
