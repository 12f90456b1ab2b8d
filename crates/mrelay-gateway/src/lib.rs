//! HTTP gateway adapter.
//!
//! A bridge process owns the user-account session and exposes channel reads
//! and media re-sends as JSON endpoints. This crate implements the core's
//! source and destination ports on top of it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER},
    StatusCode,
};
use serde::{Deserialize, Serialize};

use mrelay_core::{
    config::Config,
    domain::{Media, MediaKind, MessageDescriptor, Position, SourceId, SourceRef},
    errors::Error,
    links::ChannelLink,
    ports::{DestinationTransport, SourceTransport},
    Result,
};

/// Used when a 429 carries no usable wait hint.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct GatewayClient {
    base_url: String,
    target_channel: i64,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invite_hash: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    id: i64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: i64,
    #[serde(default)]
    media: Option<WireMedia>,
    #[serde(default)]
    noforwards: bool,
    #[serde(default)]
    service: bool,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    kind: String,
    #[serde(default)]
    file_ref: String,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    file_ref: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    retry_after: Option<u64>,
}

impl GatewayClient {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &cfg.gateway_token {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        if let Some(id) = cfg.api_id {
            headers.insert("x-api-id", header_value(&id.to_string())?);
        }
        if let Some(hash) = &cfg.api_hash {
            headers.insert("x-api-hash", header_value(hash)?);
        }
        if let Some(session) = &cfg.session_string {
            headers.insert("x-session-string", header_value(session)?);
        }

        let http = reqwest::Client::builder()
            .timeout(cfg.gateway_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("gateway client build failed: {e}")))?;

        Ok(Self {
            base_url: cfg.gateway_url.trim_end_matches('/').to_string(),
            target_channel: cfg.target_channel,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Option<T>> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Error::External(format!("gateway request error: {e}")))?;
        let Some(resp) = check_status(resp).await? else {
            return Ok(None);
        };
        resp.json::<Option<T>>()
            .await
            .map_err(|e| Error::External(format!("gateway json error: {e}")))
    }
}

fn header_value(v: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(v).map_err(|e| Error::Config(format!("invalid gateway header: {e}")))
}

/// Map gateway status codes onto the core error model. 404 becomes `None`.
async fn check_status(resp: reqwest::Response) -> Result<Option<reqwest::Response>> {
    let status = resp.status();
    if status.is_success() {
        return Ok(Some(resp));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let header = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::RateLimited(retry_after(header.as_deref(), &body)));
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::External(format!(
        "gateway error: {status} {}",
        body.chars().take(200).collect::<String>()
    )))
}

/// Wait hint from a 429: `Retry-After` seconds first, then `{"retry_after": n}`.
fn retry_after(header: Option<&str>, body: &str) -> Duration {
    if let Some(secs) = header.and_then(|h| h.trim().parse::<u64>().ok()) {
        return Duration::from_secs(secs);
    }
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.retry_after)
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn media_kind(kind: &str) -> MediaKind {
    match kind.to_ascii_lowercase().as_str() {
        "photo" => MediaKind::Photo,
        "document" => MediaKind::Document,
        "video" => MediaKind::Video,
        "webpage" | "web_page" => MediaKind::WebPage,
        "unsupported" => MediaKind::Unsupported,
        other => MediaKind::Other(other.to_string()),
    }
}

impl From<WireMessage> for MessageDescriptor {
    fn from(m: WireMessage) -> Self {
        MessageDescriptor {
            position: Position(m.id),
            media: m.media.map(|w| Media {
                kind: media_kind(&w.kind),
                file_ref: w.file_ref,
            }),
            no_forwards: m.noforwards,
            is_service: m.service,
        }
    }
}

fn resolve_request(link: &ChannelLink) -> ResolveRequest<'_> {
    match link {
        ChannelLink::Invite { url, hash } => ResolveRequest {
            link: url.clone(),
            channel_id: None,
            invite_hash: Some(hash),
        },
        ChannelLink::Public { username, .. } => ResolveRequest {
            link: format!("https://t.me/{username}"),
            channel_id: None,
            invite_hash: None,
        },
        ChannelLink::Private { channel_id, .. } => ResolveRequest {
            link: String::new(),
            channel_id: Some(*channel_id),
            invite_hash: None,
        },
    }
}

#[async_trait]
impl SourceTransport for GatewayClient {
    async fn resolve(&self, link: &ChannelLink) -> Result<SourceRef> {
        let resp = self
            .http
            .post(self.url("/resolve"))
            .json(&resolve_request(link))
            .send()
            .await
            .map_err(|e| Error::External(format!("gateway request error: {e}")))?;
        let Some(resp) = check_status(resp).await? else {
            return Err(Error::External("channel not found".to_string()));
        };
        let r: ResolveResponse = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("gateway json error: {e}")))?;
        tracing::debug!(id = r.id, title = %r.title, "resolved channel");
        let name = if r.title.is_empty() {
            r.id.to_string()
        } else {
            r.title
        };
        Ok(SourceRef::new(r.id, name))
    }

    async fn fetch_message(
        &self,
        source: SourceId,
        position: Position,
    ) -> Result<Option<MessageDescriptor>> {
        let m: Option<WireMessage> = self
            .get_json(&format!("/channels/{source}/messages/{position}"))
            .await?;
        Ok(m.map(Into::into))
    }

    async fn fetch_latest(&self, source: SourceId) -> Result<Option<MessageDescriptor>> {
        let m: Option<WireMessage> = self
            .get_json(&format!("/channels/{source}/messages/latest"))
            .await?;
        Ok(m.map(Into::into))
    }

    async fn recent_messages(
        &self,
        source: SourceId,
        limit: usize,
    ) -> Result<Vec<MessageDescriptor>> {
        let list: Option<Vec<WireMessage>> = self
            .get_json(&format!("/channels/{source}/messages?limit={limit}"))
            .await?;
        Ok(list
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect())
    }
}

#[async_trait]
impl DestinationTransport for GatewayClient {
    async fn relay_media(&self, media: &Media) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/channels/{}/media", self.target_channel)))
            .json(&RelayRequest {
                file_ref: &media.file_ref,
            })
            .send()
            .await
            .map_err(|e| Error::External(format!("gateway request error: {e}")))?;
        match check_status(resp).await? {
            Some(_) => Ok(()),
            None => Err(Error::External("destination not found".to_string())),
        }
    }
}
