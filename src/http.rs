//! Shared HTTP helpers.
//!
//! All upstream requests go through one [`reqwest::Client`] with a per
//! request timeout. A 404 becomes [`CrawlError::NotFound`]; any other
//! non-success status becomes [`CrawlError::Http`].

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use anyhow::Context;
use reqwest::{Client, Proxy, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::CrawlError;

const AGENT: &str = concat!("docwalker/", env!("CARGO_PKG_VERSION"));

/// Build the upstream client, optionally routed through `proxy`.
pub fn build_client(timeout: Duration, proxy: Option<&str>) -> anyhow::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
    let mut builder = Client::builder().default_headers(headers).timeout(timeout);
    if let Some(url) = proxy {
        builder = builder.proxy(
            Proxy::all(url).with_context(|| format!("Invalid server.upstream_proxy: {}", url))?,
        );
    }
    Ok(builder.build()?)
}

/// Basic-auth credentials attached to API requests, if configured.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user: Option<String>,
    pub secret: Option<String>,
}

impl Credentials {
    pub fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match (&self.user, &self.secret) {
            (Some(user), secret) => req.basic_auth(user, secret.as_ref()),
            _ => req,
        }
    }
}

/// Send a request and map the status onto [`CrawlError`].
pub async fn send(req: RequestBuilder, url: &str) -> Result<Response, CrawlError> {
    let resp = req.send().await?;
    check_status(resp, url)
}

fn check_status(resp: Response, url: &str) -> Result<Response, CrawlError> {
    match resp.status() {
        s if s.is_success() => Ok(resp),
        StatusCode::NOT_FOUND => Err(CrawlError::NotFound(url.to_string())),
        s => Err(CrawlError::Http {
            status: s.as_u16(),
            url: url.to_string(),
        }),
    }
}

pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    creds: &Credentials,
) -> Result<T, CrawlError> {
    let req = creds.apply(client.get(url).header(ACCEPT, "application/vnd.github+json"));
    let resp = send(req, url).await?;
    Ok(resp.json::<T>().await?)
}

pub async fn get_text(
    client: &Client,
    url: &str,
    accept: &str,
    creds: &Credentials,
) -> Result<String, CrawlError> {
    let req = creds.apply(client.get(url).header(ACCEPT, accept));
    let resp = send(req, url).await?;
    Ok(resp.text().await?)
}

pub async fn get_bytes(client: &Client, url: &str) -> Result<Vec<u8>, CrawlError> {
    let resp = send(client.get(url), url).await?;
    Ok(resp.bytes().await?.to_vec())
}
