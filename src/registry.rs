//! Remote tag lookup against an image registry.
//!
//! Two protocol generations answer the same question with incompatible shapes:
//!
//! - v2 `GET /v2/<repo>/tags/list` returns `{"name": .., "tags": [..]}`
//! - v1 `GET /v1/repositories/<repo>/tags` returns `[{"name": ..}, ..]`
//!
//! v2 is tried first; any request-level failure falls back to v1 on the same host.
//! Bodies may hold several concatenated JSON documents; all of them are decoded.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, LINK, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

use crate::error::DrmError;

/// Registry host used when no repository prefix is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://index.docker.io";

/// Answers whether a tag exists remotely.
pub trait TagLookup {
    /// `Ok(false)` means the registry answered and the tag is absent.
    fn tag_exists(&self, tag: &str) -> Result<bool>;

    /// Human-readable registry location for messages
    fn describe(&self) -> String;
}

/// Where the tags of one image live, for both protocol generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryLocation {
    pub base_url: String,
    pub v2_repository: String,
    pub v1_repository: String,
}

impl RegistryLocation {
    /// Work out the registry for an image under an optional repository prefix.
    ///
    /// No prefix means Docker Hub's official images (`library/<image>` on v2).
    /// A prefix whose first segment looks like a host (`registry.local:5000/team`)
    /// names that registry; otherwise it is a Docker Hub namespace (`myorg`).
    /// `base_url` overrides the derived host, scheme included.
    pub fn for_prefix(prefix: Option<&str>, image: &str, base_url: Option<&str>) -> Self {
        let prefix = prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty());

        let (host, namespace) = match prefix {
            None => (None, None),
            Some(p) => {
                let (first, rest) = match p.split_once('/') {
                    Some((first, rest)) => (first, Some(rest)),
                    None => (p, None),
                };
                if looks_like_host(first) {
                    (Some(first), rest)
                } else {
                    (None, Some(p))
                }
            }
        };

        let base_url = match (base_url, host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("https://{}", host),
            (None, None) => DEFAULT_REGISTRY_URL.to_string(),
        };

        let (v2_repository, v1_repository) = match (host, namespace) {
            (_, Some(ns)) => (format!("{}/{}", ns, image), format!("{}/{}", ns, image)),
            (Some(_), None) => (image.to_string(), image.to_string()),
            (None, None) => (format!("library/{}", image), image.to_string()),
        };

        Self {
            base_url,
            v2_repository,
            v1_repository,
        }
    }

    fn url_for(&self, generation: Generation) -> String {
        match generation {
            Generation::V2 => format!("{}/v2/{}/tags/list", self.base_url, self.v2_repository),
            Generation::V1 => format!(
                "{}/v1/repositories/{}/tags",
                self.base_url, self.v1_repository
            ),
        }
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    V2,
    V1,
}

#[derive(Debug, Deserialize)]
struct V2TagList {
    /// Required, so bodies of any other shape are rejected.
    name: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct V1Tag {
    name: String,
}

/// A decoded tags response, shaped by the generation that produced it.
#[derive(Debug)]
enum TagListing {
    V2(Vec<V2TagList>),
    V1(Vec<Vec<V1Tag>>),
}

impl TagListing {
    /// Decode every JSON document in `body`. An empty body is malformed.
    fn decode(generation: Generation, body: &[u8]) -> Result<Self> {
        let listing = match generation {
            Generation::V2 => TagListing::V2(decode_all(body)?),
            Generation::V1 => TagListing::V1(decode_all(body)?),
        };
        Ok(listing)
    }

    /// Union of the tags of all decoded documents.
    fn into_tags(self) -> Vec<String> {
        match self {
            TagListing::V2(docs) => docs
                .into_iter()
                .flat_map(|d| {
                    trace!(repository = %d.name, "registry:decoded v2 tag list");
                    d.tags.unwrap_or_default()
                })
                .collect(),
            TagListing::V1(docs) => docs.into_iter().flatten().map(|t| t.name).collect(),
        }
    }
}

fn decode_all<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<Vec<T>> {
    let docs = serde_json::Deserializer::from_slice(body)
        .into_iter::<T>()
        .collect::<Result<Vec<_>, _>>()
        .context("Malformed tags response")?;
    if docs.is_empty() {
        bail!("Empty tags response");
    }
    Ok(docs)
}

/// One fetched page of tags plus where the next one lives.
struct Page {
    tags: Vec<String>,
    next: Option<String>,
}

/// Queries a registry over HTTP.
pub struct RegistryProbe {
    client: Client,
    location: RegistryLocation,
}

impl RegistryProbe {
    pub fn new(location: RegistryLocation) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("drm/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<std::time::Duration>)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, location })
    }

    /// Open the tag sequence of one generation. Request-level failures of the first
    /// page surface here; later pages are fetched lazily while iterating.
    pub fn tags(&self, generation: Generation) -> Result<RegistryTagSet<'_>> {
        let url = self.location.url_for(generation);
        debug!(%url, ?generation, "registry:fetching tags");
        let mut token = None;
        let page = self.fetch_page(&url, generation, &mut token)?;
        Ok(RegistryTagSet {
            probe: self,
            generation,
            pending: page.tags.into(),
            next: page.next,
            token,
        })
    }

    fn fetch_page(
        &self,
        url: &str,
        generation: Generation,
        token: &mut Option<String>,
    ) -> Result<Page> {
        let mut response = self.get(url, token.as_deref())?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            && generation == Generation::V2
            && token.is_none()
        {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(BearerChallenge::parse)
                .ok_or_else(|| anyhow!("{} returned 401 without a bearer challenge", url))?;
            let fetched = self.fetch_token(&challenge)?;
            response = self.get(url, Some(&fetched))?;
            *token = Some(fetched);
        }

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {}", url, status);
        }

        let next = next_link(response.headers(), url);
        let body = response
            .bytes()
            .with_context(|| format!("Failed to read response from {}", url))?;
        let tags = TagListing::decode(generation, &body)
            .with_context(|| format!("Unexpected response from {}", url))?
            .into_tags();
        Ok(Page { tags, next })
    }

    fn get(&self, url: &str, token: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
            .send()
            .with_context(|| format!("Failed to connect to {}", url))
    }

    /// Anonymous token exchange for a bearer challenge.
    fn fetch_token(&self, challenge: &BearerChallenge) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            token: Option<String>,
            access_token: Option<String>,
        }

        let mut params = Vec::new();
        if let Some(service) = &challenge.service {
            params.push(("service", service.as_str()));
        }
        if let Some(scope) = &challenge.scope {
            params.push(("scope", scope.as_str()));
        }

        debug!(realm = %challenge.realm, "registry:requesting anonymous token");
        let response = self
            .client
            .get(&challenge.realm)
            .query(&params)
            .send()
            .with_context(|| format!("Failed to connect to {}", challenge.realm))?;
        if !response.status().is_success() {
            bail!(
                "Token endpoint {} returned HTTP {}",
                challenge.realm,
                response.status()
            );
        }
        let body: TokenResponse = response.json().context("Malformed token response")?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| anyhow!("Token response from {} carried no token", challenge.realm))
    }
}

impl RegistryProbe {
    /// Look for `tag` across every page of one generation. A failure on any page
    /// fails the whole scan.
    fn scan(&self, generation: Generation, tag: &str) -> Result<bool> {
        for candidate in self.tags(generation)? {
            if candidate? == tag {
                debug!(tag, ?generation, "registry:tag found");
                return Ok(true);
            }
        }
        debug!(tag, ?generation, "registry:tag not found");
        Ok(false)
    }
}

impl TagLookup for RegistryProbe {
    fn tag_exists(&self, tag: &str) -> Result<bool> {
        let v2_err = match self.scan(Generation::V2, tag) {
            Ok(found) => return Ok(found),
            Err(e) => e,
        };
        warn!(error = %format!("{:#}", v2_err), "registry:v2 failed, falling back to v1");

        self.scan(Generation::V1, tag).map_err(|v1_err| {
            DrmError::RegistryUnreachable {
                registry: self.describe(),
                v2: format!("{:#}", v2_err),
                v1: format!("{:#}", v1_err),
            }
            .into()
        })
    }

    fn describe(&self) -> String {
        self.location.base_url.clone()
    }
}

/// Lazily produced tag names of one repository from one protocol generation.
///
/// Further v2 pages (advertised by a `Link: <..>; rel="next"` header) are only
/// fetched once the buffered page is exhausted.
pub struct RegistryTagSet<'a> {
    probe: &'a RegistryProbe,
    generation: Generation,
    pending: VecDeque<String>,
    next: Option<String>,
    token: Option<String>,
}

impl Iterator for RegistryTagSet<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tag) = self.pending.pop_front() {
                return Some(Ok(tag));
            }
            let url = self.next.take()?;
            match self.probe.fetch_page(&url, self.generation, &mut self.token) {
                Ok(page) => {
                    self.pending = page.tags.into();
                    self.next = page.next;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Parsed `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let params = header.trim().strip_prefix("Bearer ")?;
        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in split_auth_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }
        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// Split `k="v",k2="v,2"` into pairs, honoring quotes.
fn split_auth_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    for c in params.chars() {
        match c {
            '"' if in_value => in_quotes = !in_quotes,
            '=' if !in_value => in_value = true,
            ',' if !in_quotes => {
                if !key.trim().is_empty() {
                    pairs.push((key.trim().to_string(), std::mem::take(&mut value)));
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    if !key.trim().is_empty() {
        pairs.push((key.trim().to_string(), value));
    }
    pairs
}

/// Resolve the `rel="next"` target of a `Link` header against the current URL.
fn next_link(headers: &HeaderMap, current: &str) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    let target = link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .map(str::trim)
            .any(|p| p == "rel=\"next\"" || p == "rel=next")
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })?;
    Url::parse(current).ok()?.join(&target).ok().map(String::from)
}
