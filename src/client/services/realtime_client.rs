use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::client::services::realtime_message::{
    self, is_private, parse_frame, ChannelGrant, Frame, RealtimeEvent,
};
use crate::client::services::service_api::QuickAssistApi;
use crate::common::error::{ClientError, Result};

const PROTOCOL_VERSION: u8 = 7;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub app_key: String,
    pub cluster: String,
    pub host: Option<String>,
}

impl RealtimeConfig {
    pub fn url(&self) -> Result<Url> {
        let host = self.host.clone().unwrap_or_else(|| format!("ws-{}.pusher.com", self.cluster));
        let base = if host.contains("://") { host } else { format!("wss://{}", host) };
        let raw = format!(
            "{}/app/{}?protocol={}&client=quickassist-rs&version={}&flash=false",
            base.trim_end_matches('/'),
            self.app_key,
            PROTOCOL_VERSION,
            env!("CARGO_PKG_VERSION")
        );
        Url::parse(&raw).map_err(|e| ClientError::Realtime(format!("invalid realtime url: {}", e)))
    }
}

/// Exchanges a socket id and channel name for a subscription grant.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelGrant>;
}

/// Authorizes through the backend's `communications/pusher/auth/` endpoint.
pub struct ApiAuthorizer(pub Arc<dyn QuickAssistApi>);

#[async_trait]
impl ChannelAuthorizer for ApiAuthorizer {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelGrant> {
        self.0.authorize_channel(socket_id, channel).await
    }
}

pub type BindingId = Uuid;
type Handler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

struct Binding {
    id: BindingId,
    /// `None` receives every event on the channel.
    event: Option<String>,
    handler: Handler,
}

#[derive(Default)]
struct ChannelState {
    subscribers: usize,
    bindings: Vec<Binding>,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, ChannelState>,
}

/// One live connection to the pub/sub service. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeClient {
    socket_id: String,
    outgoing: mpsc::UnboundedSender<String>,
    registry: Arc<Mutex<Registry>>,
    authorizer: Arc<dyn ChannelAuthorizer>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RealtimeClient {
    pub async fn connect(config: &RealtimeConfig, authorizer: Arc<dyn ChannelAuthorizer>) -> Result<Self> {
        let url = config.url()?;
        info!("Connecting to realtime service at {}", url.host_str().unwrap_or("?"));
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Realtime(format!("Failed to connect: {}", e)))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let socket_id = match timeout(HANDSHAKE_TIMEOUT, ws_receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match parse_frame(&text) {
                Ok(Frame::ConnectionEstablished { socket_id, .. }) => socket_id,
                Ok(Frame::Error { code, message }) => {
                    return Err(ClientError::Realtime(format!("connection refused ({:?}): {}", code, message)))
                }
                Ok(other) => return Err(ClientError::Realtime(format!("unexpected handshake frame: {:?}", other))),
                Err(e) => return Err(ClientError::Realtime(e)),
            },
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                return Err(ClientError::Realtime("connection closed during handshake".to_string()))
            }
            Ok(Some(Ok(_))) => return Err(ClientError::Realtime("unexpected message type during handshake".to_string())),
            Ok(Some(Err(e))) => return Err(ClientError::Realtime(format!("websocket error during handshake: {}", e))),
            Err(_) => return Err(ClientError::Realtime("handshake timed out".to_string())),
        };
        info!("Realtime connection established");

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let client = Self::from_parts(socket_id, outgoing_tx, authorizer);

        let writer_state = client.connected.clone();
        let mut writer_shutdown = client.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = outgoing_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = ws_sender.send(Message::Text(frame)).await {
                            error!("Failed to send realtime frame: {}", e);
                            break;
                        }
                    }
                    _ = writer_shutdown.changed() => {
                        let _ = ws_sender.close().await;
                        break;
                    }
                }
            }
            writer_state.store(false, Ordering::SeqCst);
            debug!("Realtime writer ended");
        });

        let reader = client.clone();
        let mut reader_shutdown = client.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    message = ws_receiver.next() => message,
                    _ = reader_shutdown.changed() => break,
                };
                match message {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Ok(frame) => reader.handle_frame(frame),
                        Err(e) => warn!("Ignoring realtime frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Realtime connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Realtime connection error: {}", e);
                        break;
                    }
                }
            }
            reader.connected.store(false, Ordering::SeqCst);
        });

        Ok(client)
    }

    /// Builds a client around an existing outgoing frame queue.
    pub fn from_parts(
        socket_id: String,
        outgoing: mpsc::UnboundedSender<String>,
        authorizer: Arc<dyn ChannelAuthorizer>,
    ) -> Self {
        Self {
            socket_id,
            outgoing,
            registry: Arc::new(Mutex::new(Registry::default())),
            authorizer,
            connected: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Closes the socket. Every handle on this connection goes quiet.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
        if let Ok(mut registry) = self.registry.lock() {
            registry.channels.clear();
        }
    }

    pub fn socket_id(&self) -> &str {
        &self.socket_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outgoing.is_closed()
    }

    fn send(&self, frame: String) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| ClientError::Realtime("connection is closed".to_string()))
    }

    /// Joins `channel`, authorizing it first when private. Several handles
    /// may share a channel; the server subscription lives while any does.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        // the slot is taken before any await so concurrent callers join once
        let first = {
            let mut registry = self.registry.lock().map_err(|_| ClientError::Realtime("registry poisoned".to_string()))?;
            let state = registry.channels.entry(channel.to_string()).or_default();
            state.subscribers += 1;
            state.subscribers == 1
        };
        if first {
            if let Err(e) = self.join(channel).await {
                self.abandon(channel);
                return Err(e);
            }
            debug!("Subscribed to {}", channel);
        }
        Ok(Subscription { channel: channel.to_string(), client: self.clone(), bindings: Vec::new(), released: false })
    }

    async fn join(&self, channel: &str) -> Result<()> {
        let grant = if is_private(channel) {
            Some(self.authorizer.authorize(&self.socket_id, channel).await?)
        } else {
            None
        };
        self.send(realtime_message::subscribe_frame(channel, grant.as_ref()))
    }

    /// Gives back a slot taken by a subscribe that never reached the server.
    fn abandon(&self, channel: &str) {
        if let Ok(mut registry) = self.registry.lock() {
            let empty = match registry.channels.get_mut(channel) {
                Some(state) => {
                    state.subscribers = state.subscribers.saturating_sub(1);
                    state.subscribers == 0
                }
                None => false,
            };
            if empty {
                registry.channels.remove(channel);
            }
        }
    }

    /// Leaves `channel` for every holder and drops all of its handlers.
    pub fn unsubscribe(&self, channel: &str) {
        let existed = match self.registry.lock() {
            Ok(mut registry) => registry.channels.remove(channel).is_some(),
            Err(_) => false,
        };
        if existed {
            let _ = self.send(realtime_message::unsubscribe_frame(channel));
            debug!("Unsubscribed from {}", channel);
        }
    }

    fn bind(&self, channel: &str, event: Option<&str>, handler: Handler) -> BindingId {
        let id = Uuid::new_v4();
        if let Ok(mut registry) = self.registry.lock() {
            registry.channels.entry(channel.to_string()).or_default().bindings.push(Binding {
                id,
                event: event.map(str::to_string),
                handler,
            });
        }
        id
    }

    fn unbind(&self, channel: &str, id: BindingId) {
        if let Ok(mut registry) = self.registry.lock() {
            if let Some(state) = registry.channels.get_mut(channel) {
                state.bindings.retain(|b| b.id != id);
            }
        }
    }

    fn release(&self, channel: &str, ids: &[BindingId]) {
        let last = match self.registry.lock() {
            Ok(mut registry) => match registry.channels.get_mut(channel) {
                Some(state) => {
                    state.bindings.retain(|b| !ids.contains(&b.id));
                    state.subscribers = state.subscribers.saturating_sub(1);
                    if state.subscribers == 0 {
                        registry.channels.remove(channel);
                        true
                    } else {
                        false
                    }
                }
                // already force-unsubscribed
                None => false,
            },
            Err(_) => false,
        };
        if last {
            let _ = self.send(realtime_message::unsubscribe_frame(channel));
            debug!("Unsubscribed from {}", channel);
        }
    }

    /// Routes one inbound frame. Handlers run outside the registry lock, in
    /// binding order.
    pub fn handle_frame(&self, frame: Frame) {
        match frame {
            Frame::Event { channel, event } => {
                let handlers: Vec<Handler> = match self.registry.lock() {
                    Ok(registry) => registry
                        .channels
                        .get(&channel)
                        .map(|state| {
                            state
                                .bindings
                                .iter()
                                .filter(|b| b.event.as_deref().map(|e| e == event.name()).unwrap_or(true))
                                .map(|b| b.handler.clone())
                                .collect()
                        })
                        .unwrap_or_default(),
                    Err(_) => Vec::new(),
                };
                if handlers.is_empty() {
                    debug!("No handler for '{}' on {}", event.name(), channel);
                }
                for handler in handlers {
                    handler(&event);
                }
            }
            Frame::Ping => {
                let _ = self.send(realtime_message::pong_frame());
            }
            Frame::SubscriptionSucceeded { channel } => debug!("Subscription to {} confirmed", channel),
            Frame::SubscriptionError { channel, message } => {
                warn!("Subscription to {} failed: {}", channel.as_deref().unwrap_or("?"), message)
            }
            Frame::Error { code, message } => warn!("Realtime error {:?}: {}", code, message),
            Frame::ConnectionEstablished { .. } | Frame::Pong => {}
        }
    }
}

/// Disposable handle on a channel subscription. Dropping it unbinds its
/// handlers and leaves the channel once no other handle holds it.
pub struct Subscription {
    channel: String,
    client: RealtimeClient,
    bindings: Vec<BindingId>,
    released: bool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Calls `handler` once per inbound `event` on this channel, in arrival order.
    pub fn bind<F>(&mut self, event: &str, handler: F) -> BindingId
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let id = self.client.bind(&self.channel, Some(event), Arc::new(handler));
        self.bindings.push(id);
        id
    }

    pub fn bind_all<F>(&mut self, handler: F) -> BindingId
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let id = self.client.bind(&self.channel, None, Arc::new(handler));
        self.bindings.push(id);
        id
    }

    pub fn unbind(&mut self, id: BindingId) {
        self.client.unbind(&self.channel, id);
        self.bindings.retain(|b| *b != id);
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.client.release(&self.channel, &self.bindings);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::realtime_message::{request_channel, NEW_MESSAGE, STATUS_UPDATE};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    struct StaticGrant;

    #[async_trait]
    impl ChannelAuthorizer for StaticGrant {
        async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelGrant> {
            Ok(ChannelGrant { auth: format!("key:{}:{}", socket_id, channel), channel_data: None })
        }
    }

    struct Denied;

    #[async_trait]
    impl ChannelAuthorizer for Denied {
        async fn authorize(&self, _: &str, _: &str) -> Result<ChannelGrant> {
            Err(ClientError::Forbidden("You are not authorized to access this channel.".into()))
        }
    }

    fn client(authorizer: Arc<dyn ChannelAuthorizer>) -> (RealtimeClient, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RealtimeClient::from_parts("1.2".into(), tx, authorizer), rx)
    }

    fn sent(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    fn status_event(channel: &str) -> Frame {
        Frame::Event { channel: channel.into(), event: RealtimeEvent::StatusUpdate(json!({"status": "ACCEPTED"})) }
    }

    #[tokio::test]
    async fn private_subscribe_sends_grant() {
        let (client, mut rx) = client(Arc::new(StaticGrant));
        let _sub = client.subscribe(&request_channel(4)).await.unwrap();
        let frames = sent(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["data"]["auth"], "key:1.2:private-request-4");
    }

    #[tokio::test]
    async fn denied_grant_fails_subscribe() {
        let (client, mut rx) = client(Arc::new(Denied));
        assert!(client.subscribe("private-user-1").await.is_err());
        assert!(sent(&mut rx).is_empty());
    }

    struct CountingGrant(AtomicUsize);

    #[async_trait]
    impl ChannelAuthorizer for CountingGrant {
        async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelGrant> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(ChannelGrant { auth: format!("key:{}:{}", socket_id, channel), channel_data: None })
        }
    }

    #[tokio::test]
    async fn concurrent_subscribes_join_once() {
        let grants = Arc::new(CountingGrant(AtomicUsize::new(0)));
        let (client, mut rx) = client(grants.clone());
        let (first, second) = tokio::join!(client.subscribe("private-request-3"), client.subscribe("private-request-3"));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(grants.0.load(Ordering::SeqCst), 1);
        assert_eq!(sent(&mut rx).len(), 1);

        drop(first);
        assert!(sent(&mut rx).is_empty());
        drop(second);
        assert_eq!(sent(&mut rx)[0]["event"], "pusher:unsubscribe");
    }

    #[tokio::test]
    async fn denied_grant_leaves_no_slot_behind() {
        let (client, _rx) = client(Arc::new(Denied));
        assert!(client.subscribe("private-user-1").await.is_err());
        assert!(client.subscribe("private-user-1").await.is_err(), "a retry authorizes again");
        assert!(client.registry.lock().unwrap().channels.get("private-user-1").is_none());
    }

    #[tokio::test]
    async fn handlers_filter_by_event_name() {
        let (client, _rx) = client(Arc::new(StaticGrant));
        let mut sub = client.subscribe("private-user-1").await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        sub.bind(STATUS_UPDATE, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.bind(NEW_MESSAGE, |_| panic!("wrong event"));

        client.handle_frame(status_event("private-user-1"));
        client.handle_frame(status_event("private-user-1"));
        client.handle_frame(status_event("private-user-2"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shared_channel_unsubscribes_after_last_handle() {
        let (client, mut rx) = client(Arc::new(StaticGrant));
        let first = client.subscribe("private-request-7").await.unwrap();
        let second = client.subscribe("private-request-7").await.unwrap();
        assert_eq!(sent(&mut rx).len(), 1, "second holder reuses the server subscription");

        drop(first);
        assert!(sent(&mut rx).is_empty());
        second.unsubscribe();
        let frames = sent(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "pusher:unsubscribe");
    }

    #[tokio::test]
    async fn dropped_handle_stops_delivery() {
        let (client, _rx) = client(Arc::new(StaticGrant));
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let mut sub = client.subscribe("private-user-9").await.unwrap();
            let counter = hits.clone();
            sub.bind_all(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            client.handle_frame(status_event("private-user-9"));
        }
        client.handle_frame(status_event("private-user-9"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ping_is_answered() {
        let (client, mut rx) = client(Arc::new(StaticGrant));
        client.handle_frame(Frame::Ping);
        assert_eq!(sent(&mut rx)[0]["event"], "pusher:pong");
    }

    #[test]
    fn url_uses_cluster_or_override() {
        let mut cfg = RealtimeConfig { app_key: "abc".into(), cluster: "ap2".into(), host: None };
        let url = cfg.url().unwrap();
        assert_eq!(url.host_str(), Some("ws-ap2.pusher.com"));
        assert_eq!(url.path(), "/app/abc");
        assert!(url.query().unwrap().contains("protocol=7"));
        cfg.host = Some("ws://127.0.0.1:6001".into());
        assert_eq!(cfg.url().unwrap().scheme(), "ws");
    }
}
