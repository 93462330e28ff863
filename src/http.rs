use core::time::Duration;
use std::error::Error;
use std::net::IpAddr;

use axum::extract::{FromRequest, Request};
use axum::http::request::Parts;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::error;

use crate::config;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[must_use]
pub fn get_client(config: &config::Config) -> reqwest::Client {
    build_client(config).unwrap_or_else(|e| {
        error!("Unable to build the http client: {}, using defaults", e);
        reqwest::Client::new()
    })
}

fn build_client(config: &config::Config) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("metronome-rs/{}", crate::METRONOME_VERSION))?,
    );

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.flush_timeout))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Enable TCP keepalive
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()?)
}

pub async fn extract_request_body(
    request: Request,
) -> Result<(Parts, Bytes), Box<dyn Error + Send + Sync>> {
    let (parts, body) = request.into_parts();
    let bytes = Bytes::from_request(Request::from_parts(parts.clone(), body), &()).await?;

    Ok((parts, bytes))
}

/// Loopback, unspecified and `localhost` hosts count as local.
#[must_use]
pub fn is_local_endpoint(endpoint: &str) -> bool {
    let Ok(url) = Url::parse(endpoint) else {
        return false;
    };

    let Some(host) = url.host_str() else {
        return false;
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) => is_local_ip(ip),
        Err(_) => {
            let host = host.to_ascii_lowercase();
            host == "localhost" || host.ends_with(".localhost")
        }
    }
}

fn is_local_ip(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}
