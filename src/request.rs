use crate::entry::Entry;
use crate::fields;
use std::collections::BTreeMap;

/// Separator between headers in the `http_headers` field.
pub const HEADER_SEPARATOR: &str = " · ";

/// Read-only view of an HTTP request, used to enrich entries.
///
/// Implemented for [`http::Request`]; implement it for other request types
/// to use [`Entry::fields_request`] with them.
pub trait RequestInfo {
    fn method(&self) -> String;

    fn url(&self) -> String;

    /// Host the request was sent to, including the port if given.
    fn host(&self) -> String;

    /// Header name/value pairs, in any order; names may repeat.
    fn headers(&self) -> Vec<(String, String)>;

    /// Parsed form values. Empty unless the request type has already
    /// decoded its body.
    fn form(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn user_agent(&self) -> String {
        self.headers()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .map(|(_, v)| v)
            .unwrap_or_default()
    }
}

impl<B> RequestInfo for http::Request<B> {
    fn method(&self) -> String {
        self.method().as_str().to_string()
    }

    fn url(&self) -> String {
        self.uri().to_string()
    }

    fn host(&self) -> String {
        self.uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default()
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

impl Entry {
    /// Add information about an HTTP request as fields.
    ///
    /// Sets `http_method`, `http_url`, `http_form`, `http_host`,
    /// `http_headers` and `http_user_agent`.
    pub fn fields_request<R: RequestInfo + ?Sized>(&self, r: &R) -> Entry {
        self.fields(fields! {
            "http_method" => r.method(),
            "http_url" => r.url(),
            "http_form" => encode_form(r.form()),
            "http_host" => r.host(),
            "http_headers" => join_headers(r.headers()),
            "http_user_agent" => r.user_agent(),
        })
    }
}

/// URL-encode form values, sorted by key.
fn encode_form(mut form: Vec<(String, String)>) -> String {
    form.sort_by(|a, b| a.0.cmp(&b.0));
    form.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `Name: value` pairs sorted by canonical header name. Repeated headers
/// are merged into one comma-separated value.
fn join_headers(headers: Vec<(String, String)>) -> String {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in headers {
        merged.entry(canonical_header(&k)).or_default().push(v);
    }
    merged
        .into_iter()
        .map(|(k, v)| format!("{}: {}", k, v.join(", ")))
        .collect::<Vec<_>>()
        .join(HEADER_SEPARATOR)
}

/// `user-agent` -> `User-Agent`.
fn canonical_header(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
