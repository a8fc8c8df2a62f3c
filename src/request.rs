//! The request parser collaborator: a small `create`/`parse`/`header_get`/
//! `header_set`/`unparse_headers`/`destroy` contract modeled on
//! `proxy_parse.h` from the original C proxy. Tokenizes with `httparse`, then
//! additionally splits an absolute-form request URI into host/port/path the
//! way `ParsedRequest_parse` does in `proxy_server_with_cache.c`.

use bytes::BytesMut;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    Malformed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// A parsed HTTP/1.x request: method, absolute-URI components, version, and
/// an ordered header list supporting get/set/unparse.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    pub method: String,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: String,
    pub version: String,
    headers: Vec<(String, String)>,
}

impl ParsedRequest {
    /// `create()` — an empty, unparsed request.
    pub fn create() -> Self {
        Self::default()
    }

    /// `parse(request, bytes, len)` — tokenizes `data` and fills in `self`.
    pub fn parse(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut raw_headers);

        let status = req.parse(data).map_err(|_| ParseError::Malformed)?;
        if !status.is_complete() {
            return Err(ParseError::Incomplete);
        }

        let method = req.method.ok_or(ParseError::Malformed)?.to_string();
        let uri = req.path.ok_or(ParseError::Malformed)?;
        // httparse accepts any single digit after the "HTTP/1." prefix, not
        // just 0 or 1 — preserve that here rather than rejecting it outright,
        // so callers can distinguish "unparseable" from "parses fine, but
        // names a version we don't support".
        let version = match req.version {
            Some(0) => "HTTP/1.0".to_string(),
            Some(1) => "HTTP/1.1".to_string(),
            Some(n) => format!("HTTP/1.{n}"),
            None => return Err(ParseError::Malformed),
        };

        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect();

        let (host, port, path) = split_absolute_uri(uri);

        self.method = method;
        self.version = version;
        self.host = host;
        self.port = port;
        self.path = path;
        self.headers = headers;

        // Fall back to the Host header when the request line used origin
        // form (no absolute URI) rather than the proxy's required form.
        if self.host.is_none() {
            if let Some(host_header) = self.header_get("Host") {
                let (h, p) = split_host_header(host_header);
                self.host = Some(h);
                self.port = p;
            }
        }

        Ok(())
    }

    /// `header_get(request, name)` — case-insensitive lookup.
    pub fn header_get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `header_set(request, name, value)` — overwrite in place, or append.
    pub fn header_set(&mut self, name: &str, value: &str) -> Result<(), ParseError> {
        if let Some(existing) = self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            existing.1 = value.to_string();
        } else {
            self.headers.push((name.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// `unparse_headers(request, out_buffer, capacity)` — serializes
    /// `Name: value\r\n` pairs into `out`, stopping (and reporting overflow)
    /// once `capacity` would be exceeded. Whatever fit remains in `out`.
    pub fn unparse_headers(&self, out: &mut BytesMut, capacity: usize) -> Result<(), Overflow> {
        for (name, value) in &self.headers {
            let line_len = name.len() + 2 + value.len() + 2;
            if out.len() + line_len > capacity {
                return Err(Overflow);
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Ok(())
    }

    /// `destroy(request)` — no-op; `ParsedRequest` owns no external resource,
    /// kept for interface parity with the C collaborator this mirrors.
    pub fn destroy(self) {}
}

/// Splits `http://host[:port]/path` (or a bare `/path` origin-form target)
/// into `(host, port, path)`. `path` always defaults to `/`.
fn split_absolute_uri(uri: &str) -> (Option<String>, Option<String>, String) {
    let Some(after_scheme) = uri.strip_prefix("http://") else {
        return (None, None, uri.to_string());
    };

    let (authority, path) = match after_scheme.find('/') {
        Some(idx) => (&after_scheme[..idx], after_scheme[idx..].to_string()),
        None => (after_scheme, "/".to_string()),
    };

    let (host, port) = split_host_header(authority);
    (Some(host), port, path)
}

/// Splits a `host[:port]` authority or `Host:` header value.
fn split_host_header(value: &str) -> (String, Option<String>) {
    match value.rfind(':') {
        Some(idx) => (value[..idx].to_string(), Some(value[idx + 1..].to_string())),
        None => (value.to_string(), None),
    }
}
