use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Error, Result};

/// Feed channel tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Status,
    Heartbeat,
    Book,
    /// Method responses (`subscribe`, `unsubscribe`, `pong`) carry no
    /// channel on the wire; they are routed here.
    Subscription,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Status => "status",
            Channel::Heartbeat => "heartbeat",
            Channel::Book => "book",
            Channel::Subscription => "subscription",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{price, qty}` pair from a book message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

/// One update batch: every changed level on both sides for a symbol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub checksum: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The `type` field of a book message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookKind {
    Snapshot,
    Update,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BookMessage {
    pub kind: BookKind,
    pub data: Vec<BookUpdate>,
}

/// Payload of a `status` message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub system: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub connection_id: Option<u64>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub data: Vec<SystemStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResult {
    pub channel: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub snapshot: Option<bool>,
}

/// Response to a request sent on the connection, e.g. the subscribe ack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    pub method: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<SubscriptionResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub req_id: Option<u64>,
    #[serde(default)]
    pub time_in: Option<String>,
    #[serde(default)]
    pub time_out: Option<String>,
}

/// Every message the feed can deliver.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedMessage {
    Status(StatusMessage),
    Heartbeat,
    Book(BookMessage),
    SubscriptionAck(SubscriptionAck),
}

/// Just enough of a frame to pick the variant; `data` stays raw so each
/// channel deserializes its own payload shape.
#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default, borrow)]
    data: Option<&'a RawValue>,
    #[serde(default)]
    method: Option<String>,
}

impl FeedMessage {
    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Malformed JSON, an unrecognized channel or book `type`, and payloads
    /// of the wrong shape are all errors; the caller drops the frame.
    pub fn decode(text: &str) -> Result<FeedMessage> {
        let envelope: Envelope<'_> = serde_json::from_str(text)?;

        let channel = match (envelope.channel.as_deref(), envelope.method.as_deref()) {
            (Some(channel), _) => channel,
            (None, Some(_)) => {
                let ack: SubscriptionAck = serde_json::from_str(text)?;
                return Ok(FeedMessage::SubscriptionAck(ack));
            }
            (None, None) => {
                return Err(Error::Decode("frame has neither channel nor method".into()))
            }
        };

        match channel {
            "heartbeat" => Ok(FeedMessage::Heartbeat),
            "status" => {
                let data = payload::<Vec<SystemStatus>>(envelope.data, channel)?;
                Ok(FeedMessage::Status(StatusMessage { data }))
            }
            "book" => {
                let kind = match envelope.kind.as_deref() {
                    Some("snapshot") => BookKind::Snapshot,
                    Some("update") => BookKind::Update,
                    Some(other) => {
                        return Err(Error::Decode(format!("unknown book message type: {other}")))
                    }
                    None => return Err(Error::Decode("book message without type".into())),
                };
                let data = payload::<Vec<BookUpdate>>(envelope.data, channel)?;
                Ok(FeedMessage::Book(BookMessage { kind, data }))
            }
            other => Err(Error::UnknownChannel(other.to_string())),
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            FeedMessage::Status(_) => Channel::Status,
            FeedMessage::Heartbeat => Channel::Heartbeat,
            FeedMessage::Book(_) => Channel::Book,
            FeedMessage::SubscriptionAck(_) => Channel::Subscription,
        }
    }
}

fn payload<T: for<'de> Deserialize<'de>>(data: Option<&RawValue>, channel: &str) -> Result<T> {
    let raw = data.ok_or_else(|| Error::Decode(format!("{channel} message without data")))?;
    Ok(serde_json::from_str(raw.get())?)
}

/// The request sent once the connection opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    pub method: String,
    pub params: SubscribeParams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscribeParams {
    pub channel: String,
    pub symbol: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl SubscribeRequest {
    /// `{"method":"subscribe","params":{"channel":"book","symbol":[..]}}`
    pub fn book(symbols: &[String], depth: Option<u32>) -> Self {
        Self {
            method: "subscribe".into(),
            params: SubscribeParams {
                channel: Channel::Book.as_str().into(),
                symbol: symbols.to_vec(),
                depth,
            },
        }
    }
}
