//! Core request types shared across the engine.
//!
//! A [`RequestDescriptor`] is created per fallthrough request, classified
//! immediately, handed once to storage, then consumed by the responder.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

use crate::flags::{AttackType, RequestType};

/// Declared HTTP method of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
    Pri,
    Other,
}

impl RequestMethod {
    /// Parse a method from its wire form. Unrecognized methods map to `Other`.
    pub fn from_str(method: &str) -> Self {
        match method {
            "GET" => RequestMethod::Get,
            "POST" => RequestMethod::Post,
            "PUT" => RequestMethod::Put,
            "DELETE" => RequestMethod::Delete,
            "HEAD" => RequestMethod::Head,
            "OPTIONS" => RequestMethod::Options,
            "PATCH" => RequestMethod::Patch,
            "TRACE" => RequestMethod::Trace,
            "CONNECT" => RequestMethod::Connect,
            "PRI" => RequestMethod::Pri,
            _ => RequestMethod::Other,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Get => write!(f, "GET"),
            RequestMethod::Post => write!(f, "POST"),
            RequestMethod::Put => write!(f, "PUT"),
            RequestMethod::Delete => write!(f, "DELETE"),
            RequestMethod::Head => write!(f, "HEAD"),
            RequestMethod::Options => write!(f, "OPTIONS"),
            RequestMethod::Patch => write!(f, "PATCH"),
            RequestMethod::Trace => write!(f, "TRACE"),
            RequestMethod::Connect => write!(f, "CONNECT"),
            RequestMethod::Pri => write!(f, "PRI"),
            RequestMethod::Other => write!(f, "OTHER"),
        }
    }
}

/// The resolved origin address of an actor. Opaque identity key; no
/// validation beyond what the origin resolver already did.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteHost {
    address: String,
}

impl RemoteHost {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into() }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// A normalized inbound request that fell through to the error handlers.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub host: RemoteHost,
    pub method: RequestMethod,
    /// Headers as received; look them up through [`RequestDescriptor::header`]
    /// for case-insensitive access.
    pub headers: HashMap<String, String>,
    pub path: String,
    pub query: Option<String>,
    /// JSON object body, when the request carried one.
    pub body: Option<Map<String, Value>>,
    /// Port the listener accepted this request on.
    pub port: u16,
    pub timestamp: DateTime<Local>,
    /// Assigned by storage once the record is inserted.
    pub request_id: Option<i64>,
}

impl RequestDescriptor {
    pub fn new(
        host: RemoteHost,
        method: RequestMethod,
        headers: HashMap<String, String>,
        path: impl Into<String>,
        query: Option<String>,
        body: Option<Map<String, Value>>,
        port: u16,
    ) -> Self {
        Self {
            host,
            method,
            headers,
            path: path.into(),
            query,
            body,
            port,
            timestamp: Local::now(),
            request_id: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Benign probes answered plainly so the deception layer never shows
    /// itself to normal traffic: GET `/` and GET `/robots.txt`.
    pub fn is_acceptable(&self) -> bool {
        self.method == RequestMethod::Get && (self.path == "/" || self.path == "/robots.txt")
    }

    /// The final path segment, used as the honeypot lookup key.
    pub fn payload_file(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }
}

/// Outcome of classifying a request. Immutable once attached.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Summary score, always in [0, 10].
    pub threat_level: u8,
    /// Never empty; `[OTHER]` when no flag matched. Most-frequent tag first.
    pub request_types: Vec<RequestType>,
    /// May be empty. Most-frequent tag first.
    pub attack_types: Vec<AttackType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(method: RequestMethod, path: &str) -> RequestDescriptor {
        RequestDescriptor::new(
            RemoteHost::new("203.0.113.7"),
            method,
            HashMap::new(),
            path,
            None,
            None,
            8080,
        )
    }

    #[test]
    fn method_parsing_covers_the_closed_set() {
        for m in ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE", "CONNECT", "PRI"] {
            assert_eq!(RequestMethod::from_str(m).to_string(), m);
        }
        assert_eq!(RequestMethod::from_str("BREW"), RequestMethod::Other);
        // Wire methods are case-sensitive uppercase
        assert_eq!(RequestMethod::from_str("get"), RequestMethod::Other);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "curl/8.5".to_string());
        let mut req = descriptor(RequestMethod::Get, "/x");
        req.headers = headers;
        assert_eq!(req.header("user-agent"), Some("curl/8.5"));
        assert_eq!(req.header("USER-AGENT"), Some("curl/8.5"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn acceptable_requests_are_get_root_and_robots() {
        assert!(descriptor(RequestMethod::Get, "/").is_acceptable());
        assert!(descriptor(RequestMethod::Get, "/robots.txt").is_acceptable());
        assert!(!descriptor(RequestMethod::Post, "/").is_acceptable());
        assert!(!descriptor(RequestMethod::Get, "/index.php").is_acceptable());
        assert!(!descriptor(RequestMethod::Head, "/robots.txt").is_acceptable());
    }

    #[test]
    fn payload_file_is_the_final_segment() {
        assert_eq!(descriptor(RequestMethod::Get, "/cms/wp-includes/wlwmanifest.xml").payload_file(), "wlwmanifest.xml");
        assert_eq!(descriptor(RequestMethod::Get, "/config.php").payload_file(), "config.php");
        assert_eq!(descriptor(RequestMethod::Get, "/").payload_file(), "");
    }

    #[test]
    fn empty_body_map_counts_as_no_body() {
        let mut req = descriptor(RequestMethod::Post, "/x");
        assert!(!req.has_body());
        req.body = Some(Map::new());
        assert!(!req.has_body());
        let mut map = Map::new();
        map.insert("user".to_string(), Value::String("admin".to_string()));
        req.body = Some(map);
        assert!(req.has_body());
    }
}
