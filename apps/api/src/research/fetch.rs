//! `fetch_page` tool: lets research calls read a public web page.
//!
//! The URL comes from model output, so every hop (including redirects) must
//! resolve only to public addresses, and the connection is pinned to the
//! address that was checked.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{redirect, Url};
use serde_json::json;
use tracing::warn;

use crate::llm_client::ToolSpec;

pub const FETCH_TOOL_NAME: &str = "fetch_page";

/// Page text handed back to the model is cut at this many characters.
const MAX_PAGE_CHARS: usize = 6000;
/// Bytes read from a response body before the rest is discarded.
const MAX_BODY_BYTES: usize = 512 * 1024;
const MAX_REDIRECTS: usize = 5;
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("valid regex");
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]+>").expect("valid regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid regex");
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the visible text of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpPageFetcher;

impl HttpPageFetcher {
    /// One client per hop, resolving the checked host to the checked address.
    fn pinned_client(host: &str, addr: SocketAddr) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("hireflow/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::none())
            .resolve(host, addr)
            .build()
            .context("build page fetch client")
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut url = Url::parse(url).with_context(|| format!("invalid URL {url}"))?;

        for _ in 0..=MAX_REDIRECTS {
            let (host, addr) = resolve_public(&url).await?;
            let response = Self::pinned_client(&host, addr)?
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("fetch {url}"))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| anyhow!("{url} redirected without a location"))?;
                url = url
                    .join(location)
                    .with_context(|| format!("invalid redirect target {location}"))?;
                continue;
            }
            if !status.is_success() {
                bail!("{url} returned HTTP {status}");
            }

            let body = read_capped(response.bytes_stream(), MAX_BODY_BYTES).await?;
            return Ok(page_text(&String::from_utf8_lossy(&body)));
        }
        bail!("too many redirects fetching {url}")
    }
}

/// Resolves the URL's host and refuses it unless every address is public.
async fn resolve_public(url: &Url) -> Result<(String, SocketAddr)> {
    if !matches!(url.scheme(), "http" | "https") {
        bail!("only http(s) URLs can be fetched");
    }
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("URL has no host"))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("URL has no port"))?;

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
        .await
        .with_context(|| format!("resolve {host}"))?
        .collect();
    if let Some(blocked) = addrs.iter().find(|a| !is_public_address(a.ip())) {
        warn!(host = %host, address = %blocked.ip(), "Refusing fetch of non-public address");
        bail!("{host} resolves to a non-public address");
    }
    let addr = addrs
        .first()
        .copied()
        .ok_or_else(|| anyhow!("{host} did not resolve"))?;
    Ok((host, addr))
}

pub fn is_public_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19)))
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80)
}

/// Collects at most `limit` bytes from a body stream and drops the rest.
async fn read_capped<S, E>(stream: S, limit: usize) -> Result<Bytes>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    futures_util::pin_mut!(stream);
    let mut body = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("read page body")?;
        let remaining = limit - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Strips markup and collapses whitespace, truncated to `MAX_PAGE_CHARS`.
pub fn page_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    let collapsed = WHITESPACE.replace_all(&without_tags, " ");
    collapsed.trim().chars().take(MAX_PAGE_CHARS).collect()
}

pub fn fetch_tool() -> ToolSpec {
    ToolSpec {
        name: FETCH_TOOL_NAME.to_string(),
        description: "Fetch a public web page and return its visible text. \
            Use it to read the company's website, careers page or news coverage."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL of the page to read"
                }
            },
            "required": ["url"]
        }),
    }
}
