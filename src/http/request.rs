//! Request-line, query-string and header parsing for the debug HTTP
//! servers.
//!
//! Grounded on `DebugHttpConnection::parseHttpRequest`/`parseQueryString`
//! (see `original_source/src/debugger/DebugHttpConnection.cc`): only
//! `GET`/`HEAD` are accepted, query parameters and headers are simple
//! `key=value`/`key: value` pairs with no percent-decoding or multi-value
//! support — this protocol is a debug surface, not a public API.

use std::collections::HashMap;

/// A parsed HTTP request line plus headers and query parameters.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
}

impl HttpRequest {
    /// Parse a raw request up to and including the blank line that ends
    /// the headers. Returns `None` for anything that doesn't look like a
    /// minimal, well-formed `GET`/`HEAD` request line.
    #[must_use]
    pub fn parse(raw: &str) -> Option<HttpRequest> {
        let mut lines = raw.split("\r\n");
        let first_line = lines.next()?;

        let mut parts = first_line.split_whitespace();
        let method = parts.next()?.to_string();
        let mut path = parts.next()?.to_string();
        let _version = parts.next()?;

        if method != "GET" && method != "HEAD" {
            return None;
        }

        let mut query = HashMap::new();
        if let Some(qpos) = path.find('?') {
            let query_str = path[qpos + 1..].to_string();
            path.truncate(qpos);
            parse_query_string(&query_str, &mut query);
        }

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some(colon) = line.find(':') {
                let key = line[..colon].trim().to_ascii_lowercase();
                let value = line[colon + 1..].trim().to_string();
                headers.insert(key, value);
            }
        }

        Some(HttpRequest { method, path, query, headers })
    }

    #[must_use]
    pub fn accepts_html(&self) -> bool {
        self.headers.get("accept").is_some_and(|accept| accept.contains("text/html"))
    }
}

fn parse_query_string(query: &str, out: &mut HashMap<String, String>) {
    for pair in query.split('&') {
        if let Some(eq) = pair.find('=') {
            out.insert(pair[..eq].to_string(), pair[eq + 1..].to_string());
        }
    }
}
