// Pusher protocol 7 frames, inbound and outbound
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::models::{ChatMessage, Coordinates, JobId, ServiceRequest, UserId};

pub const REQUEST_ACCEPTED: &str = "request-accepted";
pub const STATUS_UPDATE: &str = "status-update";
pub const NEW_MESSAGE: &str = "new-message";
pub const PROVIDER_LOCATION_UPDATE: &str = "provider-location-update";

pub fn user_channel(user: UserId) -> String {
    format!("private-user-{}", user)
}

pub fn request_channel(job: JobId) -> String {
    format!("private-request-{}", job)
}

pub fn is_private(channel: &str) -> bool {
    channel.starts_with("private-") || channel.starts_with("presence-")
}

/// Signed subscription grant issued by the backend for a private channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelGrant {
    pub auth: String,
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// A named application event, decoded where the client knows the shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Carries the full updated record.
    RequestAccepted(Box<ServiceRequest>),
    /// Generic change notice; the payload is not trusted to be complete.
    StatusUpdate(Value),
    NewMessage(Box<ChatMessage>),
    ProviderLocation(Coordinates),
    Other { event: String, data: Value },
}

impl RealtimeEvent {
    pub fn name(&self) -> &str {
        match self {
            RealtimeEvent::RequestAccepted(_) => REQUEST_ACCEPTED,
            RealtimeEvent::StatusUpdate(_) => STATUS_UPDATE,
            RealtimeEvent::NewMessage(_) => NEW_MESSAGE,
            RealtimeEvent::ProviderLocation(_) => PROVIDER_LOCATION_UPDATE,
            RealtimeEvent::Other { event, .. } => event,
        }
    }

    pub fn decode(event: &str, data: Value) -> Self {
        match event {
            REQUEST_ACCEPTED => match data.get("request").cloned().map(serde_json::from_value::<ServiceRequest>) {
                Some(Ok(request)) => RealtimeEvent::RequestAccepted(Box::new(request)),
                _ => {
                    // an incomplete record is still a change notice
                    warn!("request-accepted without a decodable record, treating as status change");
                    RealtimeEvent::StatusUpdate(data)
                }
            },
            STATUS_UPDATE => RealtimeEvent::StatusUpdate(data),
            NEW_MESSAGE => match data.get("message").cloned().map(serde_json::from_value::<ChatMessage>) {
                Some(Ok(message)) => RealtimeEvent::NewMessage(Box::new(message)),
                _ => RealtimeEvent::Other { event: event.to_string(), data },
            },
            PROVIDER_LOCATION_UPDATE => match data.get("location").cloned().map(serde_json::from_value::<Coordinates>) {
                Some(Ok(at)) => RealtimeEvent::ProviderLocation(at),
                _ => RealtimeEvent::Other { event: event.to_string(), data },
            },
            _ => RealtimeEvent::Other { event: event.to_string(), data },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ConnectionEstablished { socket_id: String, activity_timeout: Option<u64> },
    SubscriptionSucceeded { channel: String },
    SubscriptionError { channel: Option<String>, message: String },
    Ping,
    Pong,
    Error { code: Option<u64>, message: String },
    Event { channel: String, event: RealtimeEvent },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Pusher double-encodes `data` as a JSON string; unwrap that when present.
fn unwrap_data(data: Value) -> Value {
    match data {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

pub fn parse_frame(text: &str) -> Result<Frame, String> {
    let raw: RawFrame = serde_json::from_str(text).map_err(|e| format!("Invalid JSON frame: {}", e))?;
    let data = unwrap_data(raw.data);
    match raw.event.as_str() {
        "pusher:connection_established" => {
            let socket_id = data
                .get("socket_id")
                .and_then(|v| v.as_str())
                .ok_or("Missing socket_id in connection_established")?
                .to_string();
            let activity_timeout = data.get("activity_timeout").and_then(|v| v.as_u64());
            Ok(Frame::ConnectionEstablished { socket_id, activity_timeout })
        }
        "pusher_internal:subscription_succeeded" => {
            Ok(Frame::SubscriptionSucceeded { channel: raw.channel.ok_or("Missing channel in subscription_succeeded")? })
        }
        "pusher:subscription_error" => Ok(Frame::SubscriptionError {
            channel: raw.channel,
            message: data
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
        }),
        "pusher:ping" => Ok(Frame::Ping),
        "pusher:pong" => Ok(Frame::Pong),
        "pusher:error" => Ok(Frame::Error {
            code: data.get("code").and_then(|v| v.as_u64()),
            message: data.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error").to_string(),
        }),
        name if name.starts_with("pusher:") || name.starts_with("pusher_internal:") => {
            Err(format!("Unhandled protocol event: {}", name))
        }
        name => {
            let channel = raw.channel.ok_or_else(|| format!("Event '{}' without channel", name))?;
            Ok(Frame::Event { channel, event: RealtimeEvent::decode(name, data) })
        }
    }
}

pub fn subscribe_frame(channel: &str, grant: Option<&ChannelGrant>) -> String {
    let mut data = json!({ "channel": channel });
    if let Some(grant) = grant {
        data["auth"] = Value::String(grant.auth.clone());
        if let Some(channel_data) = &grant.channel_data {
            data["channel_data"] = Value::String(channel_data.clone());
        }
    }
    json!({ "event": "pusher:subscribe", "data": data }).to_string()
}

pub fn unsubscribe_frame(channel: &str) -> String {
    json!({ "event": "pusher:unsubscribe", "data": { "channel": channel } }).to_string()
}

pub fn pong_frame() -> String {
    json!({ "event": "pusher:pong", "data": {} }).to_string()
}
