use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use shared::{
    error::ApiError,
    protocol::{DocumentEvent, DocumentPath, WriteAck},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{document_path, DocumentStore, RemoteEvent, Subscription};
use crate::{
    config::{ConfigError, RemoteConfig},
    error::RemoteError,
};

pub const API_KEY_HEADER: &str = "x-api-key";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Store backed by the relay server: `PUT /documents/<path>` to publish and a
/// WebSocket at `/ws?path=<path>` to subscribe.
///
/// A subscription that loses its socket reports the failure once, then keeps
/// reconnecting; the relay resends the current value on every new socket.
#[derive(Debug, Clone)]
pub struct RelayDocumentStore {
    http: Client,
    base: Url,
    api_key: Option<String>,
    reconnect_delay: Duration,
}

impl RelayDocumentStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, ConfigError> {
        let mut base = config.database_url()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base,
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            reconnect_delay: RECONNECT_DELAY,
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn document_url(&self, path: &DocumentPath) -> Result<Url, RemoteError> {
        self.base
            .join(&format!("documents/{path}"))
            .map_err(|err| RemoteError::Rejected(format!("invalid document url: {err}")))
    }

    fn subscribe_url(&self, path: &DocumentPath) -> Result<Url, RemoteError> {
        let mut url = self
            .base
            .join("ws")
            .map_err(|err| RemoteError::Rejected(format!("invalid websocket url: {err}")))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| RemoteError::Rejected(format!("cannot use {scheme} for {url}")))?;
        url.query_pairs_mut().append_pair("path", path.as_str());
        Ok(url)
    }
}

async fn open_socket(url: &Url, api_key: Option<&str>) -> Result<WsStream, RemoteError> {
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|err| RemoteError::Rejected(err.to_string()))?;
    if let Some(key) = api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|err| RemoteError::Rejected(format!("invalid api key: {err}")))?;
        request.headers_mut().insert(API_KEY_HEADER, value);
    }
    let (ws_stream, _) = connect_async(request)
        .await
        .map_err(|err| RemoteError::Unreachable(format!("failed to connect {url}: {err}")))?;
    Ok(ws_stream)
}

/// Forwards one socket's events until it ends. Returns why it ended, or
/// `None` once nobody is listening.
///
/// Changes are only forwarded in increasing revision order; a late event for
/// an older revision would otherwise replace a newer value.
async fn forward_events(
    path: &DocumentPath,
    mut ws_stream: WsStream,
    tx: &mpsc::UnboundedSender<RemoteEvent>,
) -> Option<RemoteError> {
    let mut last_revision = None;
    while let Some(msg) = ws_stream.next().await {
        let event = match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<DocumentEvent>(&text) {
                Ok(DocumentEvent::Changed {
                    path: changed,
                    revision,
                    value,
                }) => {
                    if last_revision.is_some_and(|last| revision <= last) {
                        debug!(path = %changed, revision, ?last_revision, "skipping stale relay snapshot");
                        continue;
                    }
                    last_revision = Some(revision);
                    debug!(path = %changed, revision, "relay snapshot");
                    RemoteEvent::Snapshot(value)
                }
                Ok(DocumentEvent::Error(err)) => {
                    RemoteEvent::Failed(RemoteError::Rejected(err.message))
                }
                Err(error) => {
                    warn!(%path, %error, "ignoring unreadable relay event");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => return Some(RemoteError::Unreachable(error.to_string())),
        };
        if tx.send(event).is_err() {
            return None;
        }
    }
    Some(RemoteError::Closed)
}

#[async_trait]
impl DocumentStore for RelayDocumentStore {
    async fn subscribe(&self, path: &str) -> Result<Subscription, RemoteError> {
        let path = document_path(path)?;
        let url = self.subscribe_url(&path)?;
        let api_key = self.api_key.clone();
        let delay = self.reconnect_delay;

        let mut ws_stream = open_socket(&url, api_key.as_deref()).await?;
        debug!(%path, %url, "relay subscription opened");

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            loop {
                let Some(err) = forward_events(&path, ws_stream, &tx).await else {
                    return;
                };
                warn!(%path, %err, "relay subscription lost");
                if tx.send(RemoteEvent::Failed(err)).is_err() {
                    return;
                }
                ws_stream = loop {
                    tokio::time::sleep(delay).await;
                    if tx.is_closed() {
                        return;
                    }
                    match open_socket(&url, api_key.as_deref()).await {
                        Ok(ws_stream) => break ws_stream,
                        Err(err) => debug!(%path, %err, "relay still unreachable"),
                    }
                };
                info!(%path, "relay subscription reopened");
            }
        });

        Ok(Subscription::new(rx, Some(task)))
    }

    async fn publish(&self, path: &str, value: Value) -> Result<(), RemoteError> {
        let path = document_path(path)?;
        let url = self.document_url(&path)?;
        let mut request = self.http.put(url).json(&value);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| RemoteError::Unreachable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiError>().await {
                Ok(err) => err.message,
                Err(_) => status.to_string(),
            };
            return Err(RemoteError::Rejected(message));
        }

        let ack: WriteAck = response
            .json()
            .await
            .map_err(|err| RemoteError::Rejected(format!("invalid write ack: {err}")))?;
        debug!(path = %ack.path, revision = ack.revision, "document published");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/relay_tests.rs"]
mod tests;
