use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, header, request::Parts};
use reqwest::Url;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Framework-neutral view of an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub method: String,
    /// Origin-relative (`/path?query`) or absolute url, as received.
    pub url: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<IpAddr>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        RequestDescriptor {
            method: method.into(),
            url: url.into(),
            ..RequestDescriptor::default()
        }
    }

    /// Reads method, uri and headers, and the peer address when the server
    /// was started with connect info.
    #[must_use]
    pub fn from_parts(parts: &Parts) -> Self {
        RequestDescriptor {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            headers: parts.headers.clone(),
            remote_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip()),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: IpAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.header(header::USER_AGENT).unwrap_or_default()
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST)
    }

    fn parsed_url(&self) -> Option<Url> {
        if self.url.starts_with("http") {
            return Url::parse(&self.url).ok();
        }
        let base = format!("http://{}", self.host().unwrap_or("localhost"));
        Url::parse(&base)
            .or_else(|_| Url::parse("http://localhost"))
            .and_then(|base| base.join(&self.url))
            .ok()
    }

    /// Path component of the url, without query or fragment.
    #[must_use]
    pub fn pathname(&self) -> String {
        self.parsed_url()
            .map_or_else(|| "/".to_string(), |url| url.path().to_string())
    }

    #[must_use]
    pub fn query(&self) -> Option<String> {
        self.parsed_url()
            .and_then(|url| url.query().map(str::to_string))
    }

    /// First `x-forwarded-for` entry, else the transport peer, else empty.
    #[must_use]
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self
            .header(FORWARDED_FOR_HEADER)
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return forwarded.to_string();
        }

        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }
}
